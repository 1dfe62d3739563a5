//! Command-line interface definitions and argument parsing

use crate::config::AnalysisConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Customer value analytics: RFM segments, lifetime value and churn risk
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the transaction CSV file
    #[arg(short, long, default_value = "data.csv", global = true)]
    pub input: String,

    /// TOML file overriding analysis constants
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for CSV exports; nothing is written when omitted
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Threshold-based recency, frequency and monetary segments
    Rfm {
        /// Save a bar chart of the monetary status distribution
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// BG/NBD + Gamma-Gamma lifetime value with a holdout check
    Clv {
        /// Projection horizon in days
        #[arg(long)]
        horizon_days: Option<i64>,

        /// Days between calibration end and the last transaction
        #[arg(long)]
        calibration_days: Option<i64>,

        /// Save a bar chart of the CLV status distribution
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Churn classifier trained on repeat buyers
    Churn {
        /// Days without a purchase after which a customer counts as churned
        #[arg(long)]
        threshold_days: Option<i64>,

        /// Seed for the train/test split and bootstrap samples
        #[arg(long)]
        seed: Option<u64>,

        /// Save a bar chart of the churn status distribution
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Run rfm, clv and churn over one loaded log
    All,
}

impl Args {
    /// Load the config file (or defaults) and apply subcommand overrides
    pub fn resolve_config(&self) -> crate::Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_file(path)?,
            None => AnalysisConfig::default(),
        };

        match &self.command {
            Command::Clv {
                horizon_days,
                calibration_days,
                ..
            } => {
                if let Some(days) = horizon_days {
                    config.clv.horizon_days = *days;
                }
                if let Some(days) = calibration_days {
                    config.clv.calibration_offset_days = *days;
                }
            }
            Command::Churn {
                threshold_days,
                seed,
                ..
            } => {
                if let Some(days) = threshold_days {
                    config.churn.threshold_days = *days;
                }
                if let Some(seed) = seed {
                    config.churn.seed = *seed;
                }
            }
            Command::Rfm { .. } | Command::All => {}
        }

        config.validate()?;
        Ok(config)
    }
}
