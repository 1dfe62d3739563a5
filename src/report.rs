//! Console reports and CSV export of result tables

use crate::churn::ChurnReport;
use crate::clv::ClvReport;
use crate::rfm::{distribution, RfmSegment};
use anyhow::Context;
use polars::prelude::*;
use std::fmt::Display;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

pub const RFM_FILE: &str = "rfm_segments.csv";
pub const CLV_FILE: &str = "clv_results.csv";
pub const CHURN_FILE: &str = "churn_results.csv";

/// Render counts with display labels, keeping their order
pub fn labelled<L: Display>(counts: &[(L, usize)]) -> Vec<(String, usize)> {
    counts.iter().map(|(label, n)| (label.to_string(), *n)).collect()
}

pub fn print_distribution<L: Display>(title: &str, counts: &[(L, usize)]) {
    let total: usize = counts.iter().map(|(_, n)| n).sum();
    println!("\n{title}:");
    for (label, n) in counts {
        let share = if total > 0 {
            *n as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        println!("  {:<16} {:>7} ({:.1}%)", label.to_string(), n, share);
    }
}

pub fn print_rfm_report(segments: &[RfmSegment]) {
    println!("\n=== RFM Segmentation ===");
    println!("Customers: {}", segments.len());

    let dist = distribution(segments);
    print_distribution("Recency status", &dist.recency);
    print_distribution("Monetary status", &dist.monetary);
    print_distribution("Frequency status", &dist.frequency);
}

pub fn print_clv_report(report: &ClvReport) {
    println!("\n=== Customer Lifetime Value ===");
    println!("Calibration end: {}", report.window.calibration_end);
    println!("Observation end: {}", report.window.observation_end);
    println!(
        "Customers in calibration: {} ({} excluded by filter, {} modelled)",
        report.calibration_customers,
        report.excluded_customers,
        report.results.len()
    );

    let bg = report.lifetime.params;
    println!(
        "\nBG/NBD: r={:.4} alpha={:.4} a={:.4} b={:.4}",
        bg.r, bg.alpha, bg.a, bg.b
    );
    let gg = report.spend.params;
    println!("Gamma-Gamma: p={:.4} q={:.4} v={:.4}", gg.p, gg.q, gg.v);

    let v = &report.validation;
    println!(
        "\nHoldout check over {} days: predicted {:.3} vs actual {:.3} purchases per customer (MAE {:.3})",
        v.duration_days, v.mean_predicted, v.mean_actual, v.mean_absolute_error
    );

    println!("\nAverage CLV: {:.2}", report.average_clv);
    println!("CLV:CAC ratio: {:.2}", report.clv_to_cac);
    print_distribution("CLV status", &report.distribution());

    let mut top: Vec<_> = report.results.iter().collect();
    top.sort_by(|a, b| b.clv.total_cmp(&a.clv));
    println!("\nTop customers:");
    println!("  {:<12} | {:>10} | {:>8} | {:>9}", "Customer", "CLV", "P(alive)", "Exp. buys");
    for r in top.iter().take(10) {
        println!(
            "  {:<12} | {:>10.2} | {:>8.3} | {:>9.2}",
            r.customer_id, r.clv, r.probability_alive, r.expected_purchases
        );
    }
}

pub fn print_churn_report(report: &ChurnReport) {
    println!("\n=== Churn Prediction ===");
    println!("Total customers: {}", report.total_customers);
    println!("Repeat buyers: {}", report.repeat_buyers);
    println!("One-time buyers: {}", report.one_time_buyers);
    println!("Churn rate (repeat buyers): {:.1}%", report.churn_rate * 100.0);
    println!("Train/test rows: {}/{}", report.train_size, report.test_size);

    println!("\nClassification report (test split):");
    println!("  {:>5} | {:>9} | {:>6} | {:>6} | {:>7}", "class", "precision", "recall", "f1", "support");
    for m in &report.evaluation.classes {
        println!(
            "  {:>5} | {:>9.2} | {:>6.2} | {:>6.2} | {:>7}",
            m.class, m.precision, m.recall, m.f1, m.support
        );
    }
    println!("  accuracy: {:.2} ({} rows)", report.evaluation.accuracy, report.evaluation.total);

    println!("\nFeature importance:");
    for (feature, importance) in &report.feature_importances {
        println!("  {feature:<24} {importance:.3}");
    }

    print_distribution("Churn status", &report.distribution());
}

pub fn rfm_frame(segments: &[RfmSegment]) -> PolarsResult<DataFrame> {
    df!(
        "customer_id" => segments.iter().map(|s| s.customer_id.as_str()).collect::<Vec<_>>(),
        "recency_status" => segments.iter().map(|s| s.recency_status.to_string()).collect::<Vec<_>>(),
        "monetary_status" => segments.iter().map(|s| s.monetary_status.to_string()).collect::<Vec<_>>(),
        "frequency_status" => segments.iter().map(|s| s.frequency_status.to_string()).collect::<Vec<_>>(),
    )
}

pub fn clv_frame(report: &ClvReport) -> PolarsResult<DataFrame> {
    let r = &report.results;
    df!(
        "customer_id" => r.iter().map(|c| c.customer_id.as_str()).collect::<Vec<_>>(),
        "frequency" => r.iter().map(|c| c.frequency).collect::<Vec<_>>(),
        "recency" => r.iter().map(|c| c.recency).collect::<Vec<_>>(),
        "T" => r.iter().map(|c| c.t).collect::<Vec<_>>(),
        "monetary_value" => r.iter().map(|c| c.monetary_value).collect::<Vec<_>>(),
        "clv_6mo" => r.iter().map(|c| c.clv).collect::<Vec<_>>(),
        "probability_alive" => r.iter().map(|c| c.probability_alive).collect::<Vec<_>>(),
        "expected_purchases" => r.iter().map(|c| c.expected_purchases).collect::<Vec<_>>(),
        "clv_status" => r.iter().map(|c| c.clv_status.to_string()).collect::<Vec<_>>(),
    )
}

pub fn churn_frame(report: &ChurnReport) -> PolarsResult<DataFrame> {
    let r = &report.results;
    df!(
        "customer_id" => r.iter().map(|c| c.customer_id.as_str()).collect::<Vec<_>>(),
        "recency" => r.iter().map(|c| c.recency).collect::<Vec<_>>(),
        "frequency" => r.iter().map(|c| c.frequency).collect::<Vec<_>>(),
        "monetary" => r.iter().map(|c| c.monetary).collect::<Vec<_>>(),
        "customer_lifetime_days" => r.iter().map(|c| c.customer_lifetime_days).collect::<Vec<_>>(),
        "is_repeat_buyer" => r.iter().map(|c| c.is_repeat_buyer).collect::<Vec<_>>(),
        "churn" => r.iter().map(|c| c.churn.map(i32::from)).collect::<Vec<_>>(),
        "churn_prob" => r.iter().map(|c| c.churn_prob).collect::<Vec<_>>(),
        "churn_status" => r.iter().map(|c| c.churn_status.to_string()).collect::<Vec<_>>(),
    )
}

/// Write `df` to `dir/file_name`, creating `dir` if needed.
pub fn write_csv(df: &mut DataFrame, dir: &Path, file_name: &str) -> crate::Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = dir.join(file_name);
    let mut file =
        File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;

    info!(path = %path.display(), rows = df.height(), "Exported");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{FrequencyTier, RecencyTier, ValueTier};
    use tempfile::tempdir;

    fn segments() -> Vec<RfmSegment> {
        vec![
            RfmSegment {
                customer_id: "12346".into(),
                recency_status: RecencyTier::Churned,
                monetary_status: ValueTier::High,
                frequency_status: FrequencyTier::OneTime,
            },
            RfmSegment {
                customer_id: "12347".into(),
                recency_status: RecencyTier::Recent,
                monetary_status: ValueTier::Average,
                frequency_status: FrequencyTier::Frequent,
            },
        ]
    }

    #[test]
    fn test_rfm_frame_uses_display_labels() {
        let df = rfm_frame(&segments()).unwrap();
        assert_eq!(df.shape(), (2, 4));
        let monetary = df.column("monetary_status").unwrap().str().unwrap();
        assert_eq!(monetary.get(0), Some("High Value"));
        assert_eq!(monetary.get(1), Some("Average Value"));
    }

    #[test]
    fn test_write_csv_creates_directory() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("reports");
        let mut df = rfm_frame(&segments()).unwrap();

        let path = write_csv(&mut df, &out, RFM_FILE).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("customer_id,recency_status,monetary_status,frequency_status")
        );
        assert_eq!(lines.next(), Some("12346,Churned,High Value,One-Time"));
    }

    #[test]
    fn test_labelled_keeps_order() {
        let counts = vec![(ValueTier::Low, 5), (ValueTier::High, 2)];
        assert_eq!(
            labelled(&counts),
            vec![("Low Value".to_string(), 5), ("High Value".to_string(), 2)]
        );
    }
}
