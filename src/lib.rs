//! custforge: customer value analytics over retail transaction logs
//!
//! Three analyses share one loaded transaction log: threshold RFM
//! segmentation, BG/NBD + Gamma-Gamma lifetime value with a calibration /
//! holdout split, and a churn classifier trained on repeat buyers.

pub mod calibration;
pub mod churn;
pub mod cli;
pub mod clv;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod lifetime_model;
pub mod logging;
pub mod model;
pub mod optimize;
pub mod projection;
pub mod report;
pub mod rfm;
pub mod segment;
pub mod spend_model;
pub mod viz;

// Re-export public items for easier access
pub use churn::{run_churn, ChurnReport, ChurnResult};
pub use cli::{Args, Command};
pub use clv::{run_clv, ClvReport, ClvResult};
pub use config::AnalysisConfig;
pub use data::{load_transactions, Transaction, TransactionLog};
pub use error::AnalysisError;
pub use features::{compute_rfm_features, RfmRecord};
pub use rfm::{segment_customers, RfmSegment};
pub use viz::create_distribution_chart;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
