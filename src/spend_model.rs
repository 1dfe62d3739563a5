//! Gamma-Gamma model of average transaction value
//!
//! Spend per transaction is Gamma(p, ν) with customer-level rate
//! `ν ~ Gamma(q, v)`. The model assumes spend is independent of purchase
//! frequency and is undefined for customers without repeat purchases, so
//! callers filter those out first.

use crate::calibration::CustomerSummary;
use crate::error::AnalysisError;
use crate::optimize::{minimize, LogLikelihood};
use statrs::function::gamma::ln_gamma;
use tracing::{info, warn};

const INITIAL_PARAMS: [f64; 3] = [1.0, 1.0, 1.0];

/// Repeat-purchase count and mean spend per repeat purchase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpendObservation {
    pub frequency: f64,
    pub monetary_value: f64,
}

impl From<&CustomerSummary> for SpendObservation {
    fn from(s: &CustomerSummary) -> Self {
        Self {
            frequency: s.frequency as f64,
            monetary_value: s.monetary_value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaGammaParams {
    pub p: f64,
    pub q: f64,
    pub v: f64,
}

/// Fitted Gamma-Gamma model
#[derive(Debug, Clone)]
pub struct GammaGammaModel {
    pub params: GammaGammaParams,
    pub penalizer: f64,
    pub negative_log_likelihood: f64,
    pub n_customers: usize,
}

struct GammaGammaObjective<'a> {
    observations: &'a [SpendObservation],
    penalizer: f64,
}

impl LogLikelihood for GammaGammaObjective<'_> {
    fn negative_log_likelihood(&self, params: &[f64]) -> f64 {
        let (p, q, v) = (params[0], params[1], params[2]);
        let total: f64 = self
            .observations
            .iter()
            .map(|o| {
                let x = o.frequency;
                let m = o.monetary_value;
                ln_gamma(p * x + q) - ln_gamma(p * x) - ln_gamma(q) + q * v.ln()
                    + (p * x - 1.0) * m.ln()
                    + (p * x) * x.ln()
                    - (p * x + q) * (x * m + v).ln()
            })
            .sum();

        let penalty: f64 = params.iter().map(|p| p * p).sum::<f64>() * self.penalizer;
        -total / self.observations.len() as f64 + penalty
    }
}

/// Fit the Gamma-Gamma model
///
/// # Errors
/// Empty input, any customer without repeat purchases, or non-positive spend.
pub fn fit_gamma_gamma(
    observations: &[SpendObservation],
    penalizer: f64,
    max_iterations: u64,
) -> crate::Result<GammaGammaModel> {
    if observations.is_empty() {
        return Err(AnalysisError::DegenerateInput("no customers to fit".into()).into());
    }
    if let Some(o) = observations.iter().find(|o| !(o.frequency > 0.0)) {
        return Err(AnalysisError::DegenerateInput(format!(
            "spend model needs repeat buyers, got frequency {}",
            o.frequency
        ))
        .into());
    }
    if let Some(o) = observations
        .iter()
        .find(|o| !(o.monetary_value > 0.0 && o.monetary_value.is_finite()))
    {
        return Err(AnalysisError::DegenerateInput(format!(
            "monetary value must be positive, got {}",
            o.monetary_value
        ))
        .into());
    }

    let objective = GammaGammaObjective {
        observations,
        penalizer,
    };
    let minimum = minimize(&objective, &INITIAL_PARAMS, max_iterations)?;
    let params = GammaGammaParams {
        p: minimum.params[0],
        q: minimum.params[1],
        v: minimum.params[2],
    };

    info!(p = params.p, q = params.q, v = params.v, "Gamma-Gamma fitted");
    if params.q <= 1.0 {
        warn!(q = params.q, "q <= 1: population mean spend is unbounded, projections are unreliable");
    }

    Ok(GammaGammaModel {
        params,
        penalizer,
        negative_log_likelihood: minimum.cost,
        n_customers: observations.len(),
    })
}

impl GammaGammaModel {
    /// Expected spend per future transaction, shrunk from the customer's
    /// observed mean towards the population mean.
    pub fn conditional_expected_average_profit(&self, frequency: f64, monetary_value: f64) -> f64 {
        let GammaGammaParams { p, q, v } = self.params;
        let individual_weight = p * frequency / (p * frequency + q - 1.0);
        let population_mean = v * p / (q - 1.0);
        (1.0 - individual_weight) * population_mean + individual_weight * monetary_value
    }

    /// Mean spend per transaction across the population
    pub fn population_mean(&self) -> f64 {
        let GammaGammaParams { p, q, v } = self.params;
        v * p / (q - 1.0)
    }
}
