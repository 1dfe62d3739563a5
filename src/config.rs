//! Analysis constants, loadable from a TOML file
//!
//! Every threshold the pipelines use lives here so nothing is hard-coded at
//! the call site. All sections default to the values the retail analysis was
//! tuned with; a TOML file only needs to name the fields it changes:
//!
//! ```toml
//! [clv]
//! horizon_days = 90
//!
//! [churn]
//! threshold_days = 60
//! ```

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub clv: ClvConfig,
    pub rfm: RfmThresholds,
    pub churn: ChurnConfig,
}

/// Calibration split, model fitting and projection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClvConfig {
    /// Days between calibration end and observation end
    pub calibration_offset_days: i64,
    /// Projection horizon in days
    pub horizon_days: i64,
    /// Length of one discounting period in days
    pub period_days: i64,
    /// Discount rate applied per period
    pub discount_rate: f64,
    /// Exclusive lower bound on calibration monetary value
    pub monetary_min: f64,
    /// Exclusive upper bound on calibration monetary value
    pub monetary_max: f64,
    pub lifetime_penalizer: f64,
    pub spend_penalizer: f64,
    /// Percentile at or above which a customer is High Value
    pub high_percentile: f64,
    /// Percentile at or above which a customer is Average Value
    pub average_percentile: f64,
    /// Customer acquisition cost used for the CLV:CAC ratio
    pub acquisition_cost: f64,
    /// Iteration cap for the Nelder-Mead likelihood search
    pub max_iterations: u64,
}

impl Default for ClvConfig {
    fn default() -> Self {
        Self {
            calibration_offset_days: 180,
            horizon_days: 180,
            period_days: 30,
            discount_rate: 0.01,
            monetary_min: 0.1,
            monetary_max: 10_000.0,
            lifetime_penalizer: 0.001,
            spend_penalizer: 0.01,
            high_percentile: 0.80,
            average_percentile: 0.50,
            acquisition_cost: 50.0,
            max_iterations: 5_000,
        }
    }
}

/// Absolute cutoffs for the RFM status columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RfmThresholds {
    /// High / Average / Low value floors, descending
    pub monetary: [f64; 3],
    /// One-Time / Few / Occasional ceilings, ascending
    pub frequency: [f64; 3],
    /// Recent / Needs Attention / At Risk ceilings in days, ascending
    pub recency: [f64; 3],
}

impl Default for RfmThresholds {
    fn default() -> Self {
        Self {
            monetary: [5000.0, 1000.0, 300.0],
            frequency: [1.0, 3.0, 5.0],
            recency: [30.0, 90.0, 180.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnConfig {
    /// A repeat buyer silent for more than this many days is churned
    pub threshold_days: i64,
    /// Low / Medium / High / Churned probability ceilings, ascending
    pub risk_cutoffs: [f64; 4],
    /// Fraction of repeat buyers held out for evaluation
    pub test_size: f64,
    pub seed: u64,
    pub n_trees: usize,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            threshold_days: 90,
            risk_cutoffs: [0.3, 0.7, 0.9, 1.0],
            test_size: 0.3,
            seed: 42,
            n_trees: 100,
        }
    }
}

impl AnalysisConfig {
    /// Read a TOML file; missing sections and fields keep their defaults.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipelines cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        let clv = &self.clv;
        if clv.calibration_offset_days <= 0 || clv.horizon_days <= 0 || clv.period_days <= 0 {
            return Err(invalid("calibration offset, horizon and period must be positive"));
        }
        if clv.monetary_min >= clv.monetary_max {
            return Err(invalid("monetary_min must be below monetary_max"));
        }
        if clv.lifetime_penalizer < 0.0 || clv.spend_penalizer < 0.0 {
            return Err(invalid("penalizer coefficients must be non-negative"));
        }
        let percentiles = [clv.high_percentile, clv.average_percentile];
        if percentiles.iter().any(|p| !(0.0..=1.0).contains(p))
            || clv.high_percentile < clv.average_percentile
        {
            return Err(invalid(
                "CLV percentiles must lie in [0, 1] with high >= average",
            ));
        }
        if clv.acquisition_cost <= 0.0 {
            return Err(invalid("acquisition_cost must be positive"));
        }

        if !is_descending(&self.rfm.monetary) {
            return Err(invalid("RFM monetary thresholds must be descending"));
        }
        if !is_ascending(&self.rfm.frequency) || !is_ascending(&self.rfm.recency) {
            return Err(invalid(
                "RFM frequency and recency thresholds must be ascending",
            ));
        }

        let churn = &self.churn;
        if churn.threshold_days < 0 {
            return Err(invalid("churn threshold must be non-negative"));
        }
        if !is_ascending(&churn.risk_cutoffs) {
            return Err(invalid("churn risk cutoffs must be ascending"));
        }
        if !(churn.test_size > 0.0 && churn.test_size < 1.0) {
            return Err(invalid("test_size must lie strictly between 0 and 1"));
        }
        if churn.n_trees == 0 {
            return Err(invalid("n_trees must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> anyhow::Error {
    AnalysisError::InvalidConfig(message.to_string()).into()
}

fn is_ascending(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

fn is_descending(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] >= w[1])
}
