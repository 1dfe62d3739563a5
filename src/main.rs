//! custforge: customer value analytics CLI
//!
//! Loads the transaction log once, then runs the requested analyses, prints
//! their reports and optionally exports tables and charts.

use anyhow::Result;
use clap::Parser;
use custforge::config::AnalysisConfig;
use custforge::{
    compute_rfm_features, load_transactions, logging, report, run_churn, run_clv,
    segment_customers, viz, Args, Command, RfmRecord, TransactionLog,
};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.verbose)?;

    let config = args.resolve_config()?;
    debug!(?config, "Configuration resolved");

    let start_time = Instant::now();
    let log = load_transactions(Path::new(&args.input))?;
    info!(
        rows = log.len(),
        observation_end = %log.observation_end(),
        elapsed_s = start_time.elapsed().as_secs_f64(),
        "Transactions loaded"
    );

    match &args.command {
        Command::Rfm { plot } => {
            let records = compute_rfm_features(&log)?;
            run_rfm_stage(&records, &config, args.output_dir.as_deref(), plot.as_deref())?;
        }
        Command::Clv { plot, .. } => {
            run_clv_stage(&log, &config, args.output_dir.as_deref(), plot.as_deref())?;
        }
        Command::Churn { plot, .. } => {
            let records = compute_rfm_features(&log)?;
            run_churn_stage(&records, &config, args.output_dir.as_deref(), plot.as_deref())?;
        }
        Command::All => run_all(&log, &config, args.output_dir.as_deref())?,
    }

    info!(elapsed_s = start_time.elapsed().as_secs_f64(), "Done");
    Ok(())
}

fn run_all(log: &TransactionLog, config: &AnalysisConfig, output_dir: Option<&Path>) -> Result<()> {
    let records = compute_rfm_features(log)?;
    let chart = |name: &str| output_dir.map(|dir| dir.join(name));

    run_rfm_stage(&records, config, output_dir, chart("rfm_monetary.png").as_deref())?;
    run_clv_stage(log, config, output_dir, chart("clv_status.png").as_deref())?;
    run_churn_stage(&records, config, output_dir, chart("churn_status.png").as_deref())?;
    Ok(())
}

fn run_rfm_stage(
    records: &[RfmRecord],
    config: &AnalysisConfig,
    output_dir: Option<&Path>,
    plot: Option<&Path>,
) -> Result<()> {
    let stage_start = Instant::now();
    let segments = segment_customers(records, &config.rfm);
    report::print_rfm_report(&segments);

    if let Some(dir) = output_dir {
        report::write_csv(&mut report::rfm_frame(&segments)?, dir, report::RFM_FILE)?;
    }
    if let Some(path) = plot {
        let dist = custforge::rfm::distribution(&segments);
        viz::create_distribution_chart(
            "Monetary status",
            &report::labelled(&dist.monetary),
            &path_str(path)?,
        )?;
    }
    debug!(elapsed_s = stage_start.elapsed().as_secs_f64(), "RFM stage finished");
    Ok(())
}

fn run_clv_stage(
    log: &TransactionLog,
    config: &AnalysisConfig,
    output_dir: Option<&Path>,
    plot: Option<&Path>,
) -> Result<()> {
    let stage_start = Instant::now();
    let clv = run_clv(log, &config.clv)?;
    report::print_clv_report(&clv);

    if let Some(dir) = output_dir {
        report::write_csv(&mut report::clv_frame(&clv)?, dir, report::CLV_FILE)?;
    }
    if let Some(path) = plot {
        viz::create_distribution_chart(
            "CLV status",
            &report::labelled(&clv.distribution()),
            &path_str(path)?,
        )?;
    }
    debug!(elapsed_s = stage_start.elapsed().as_secs_f64(), "CLV stage finished");
    Ok(())
}

fn run_churn_stage(
    records: &[RfmRecord],
    config: &AnalysisConfig,
    output_dir: Option<&Path>,
    plot: Option<&Path>,
) -> Result<()> {
    let stage_start = Instant::now();
    let churn = run_churn(records, &config.churn)?;
    report::print_churn_report(&churn);

    if let Some(dir) = output_dir {
        report::write_csv(&mut report::churn_frame(&churn)?, dir, report::CHURN_FILE)?;
    }
    if let Some(path) = plot {
        viz::create_distribution_chart(
            "Churn status",
            &report::labelled(&churn.distribution()),
            &path_str(path)?,
        )?;
    }
    debug!(elapsed_s = stage_start.elapsed().as_secs_f64(), "Churn stage finished");
    Ok(())
}

fn path_str(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Output path is not valid UTF-8: {}", path.display()))
}
