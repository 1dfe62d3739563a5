//! BG/NBD purchase and dropout model
//!
//! While alive, a customer purchases as a Poisson process with rate
//! `λ ~ Gamma(r, α)`; after every purchase they drop out with probability
//! `p ~ Beta(a, b)`. Parameters are fitted by penalised maximum likelihood over
//! (frequency, recency, T) triples measured in days.

use crate::calibration::{CustomerSummary, HoldoutSummary};
use crate::error::AnalysisError;
use crate::optimize::{minimize, LogLikelihood};
use statrs::function::gamma::ln_gamma;
use tracing::{debug, info};

const INITIAL_PARAMS: [f64; 4] = [0.1, 0.1, 0.1, 0.1];

/// Ages are rescaled so the oldest customer sits at this value while fitting
const FIT_TIME_SCALE: f64 = 10.0;

/// Purchase history of one customer inside a calibration period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PurchaseHistory {
    /// Repeat purchases
    pub frequency: f64,
    /// Time of the last purchase, measured from the first
    pub recency: f64,
    /// Time from the first purchase to the end of the period
    pub age: f64,
}

impl From<&CustomerSummary> for PurchaseHistory {
    fn from(s: &CustomerSummary) -> Self {
        Self {
            frequency: s.frequency as f64,
            recency: s.recency as f64,
            age: s.t as f64,
        }
    }
}

impl From<&HoldoutSummary> for PurchaseHistory {
    fn from(s: &HoldoutSummary) -> Self {
        Self {
            frequency: s.frequency_cal as f64,
            recency: s.recency_cal as f64,
            age: s.t_cal as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BgNbdParams {
    pub r: f64,
    pub alpha: f64,
    pub a: f64,
    pub b: f64,
}

/// Fitted BG/NBD model
#[derive(Debug, Clone)]
pub struct BgNbdModel {
    pub params: BgNbdParams,
    pub penalizer: f64,
    /// Penalised mean negative log-likelihood at the optimum (fit time scale)
    pub negative_log_likelihood: f64,
    pub n_customers: usize,
}

struct BgNbdObjective<'a> {
    histories: &'a [PurchaseHistory],
    penalizer: f64,
}

impl LogLikelihood for BgNbdObjective<'_> {
    fn negative_log_likelihood(&self, params: &[f64]) -> f64 {
        let (r, alpha, a, b) = (params[0], params[1], params[2], params[3]);
        let shared = ln_gamma(a + b) - ln_gamma(b) - ln_gamma(r) + r * alpha.ln();

        let total: f64 = self
            .histories
            .iter()
            .map(|h| {
                let x = h.frequency;
                let a1 = ln_gamma(r + x);
                let a2 = ln_gamma(b + x) - ln_gamma(a + b + x);
                let a3 = -(r + x) * (alpha + h.age).ln();
                let ll = if x > 0.0 {
                    let a4 = a.ln() - (b + x - 1.0).ln() - (r + x) * (alpha + h.recency).ln();
                    let max = a3.max(a4);
                    ((a3 - max).exp() + (a4 - max).exp()).ln() + max
                } else {
                    a3
                };
                shared + a1 + a2 + ll
            })
            .sum();

        let penalty: f64 = params.iter().map(|p| p * p).sum::<f64>() * self.penalizer;
        -total / self.histories.len() as f64 + penalty
    }
}

/// Fit the BG/NBD model
///
/// # Arguments
/// * `histories` - One (frequency, recency, age) triple per customer, in days
/// * `penalizer` - L2 coefficient on the parameters
/// * `max_iterations` - Iteration cap for the likelihood search
///
/// # Errors
/// Empty input, negative or fractional frequency, recency beyond age, or a
/// search that ends on a non-finite likelihood.
pub fn fit_bg_nbd(
    histories: &[PurchaseHistory],
    penalizer: f64,
    max_iterations: u64,
) -> crate::Result<BgNbdModel> {
    validate_histories(histories)?;

    let max_age = histories.iter().map(|h| h.age).fold(0.0, f64::max);
    if max_age <= 0.0 {
        return Err(AnalysisError::DegenerateInput(
            "every customer has zero age; nothing to fit".into(),
        )
        .into());
    }
    let scale = FIT_TIME_SCALE / max_age;
    let scaled: Vec<PurchaseHistory> = histories
        .iter()
        .map(|h| PurchaseHistory {
            frequency: h.frequency,
            recency: h.recency * scale,
            age: h.age * scale,
        })
        .collect();

    debug!(customers = histories.len(), penalizer, scale, "Fitting BG/NBD");
    let objective = BgNbdObjective {
        histories: &scaled,
        penalizer,
    };
    let minimum = minimize(&objective, &INITIAL_PARAMS, max_iterations)?;

    let params = BgNbdParams {
        r: minimum.params[0],
        alpha: minimum.params[1] / scale,
        a: minimum.params[2],
        b: minimum.params[3],
    };
    info!(
        r = params.r,
        alpha = params.alpha,
        a = params.a,
        b = params.b,
        "BG/NBD fitted"
    );

    Ok(BgNbdModel {
        params,
        penalizer,
        negative_log_likelihood: minimum.cost,
        n_customers: histories.len(),
    })
}

fn validate_histories(histories: &[PurchaseHistory]) -> crate::Result<()> {
    if histories.is_empty() {
        return Err(AnalysisError::DegenerateInput("no customers to fit".into()).into());
    }
    for h in histories {
        if !(h.frequency.is_finite() && h.recency.is_finite() && h.age.is_finite()) {
            return Err(AnalysisError::DegenerateInput("non-finite purchase history".into()).into());
        }
        if h.frequency < 0.0 || h.frequency.fract() != 0.0 {
            return Err(AnalysisError::DegenerateInput(format!(
                "frequency must be a non-negative integer, got {}",
                h.frequency
            ))
            .into());
        }
        if h.recency < 0.0 || h.recency > h.age {
            return Err(AnalysisError::DegenerateInput(format!(
                "recency {} outside [0, T = {}]",
                h.recency, h.age
            ))
            .into());
        }
    }
    Ok(())
}

impl BgNbdModel {
    /// Expected purchases in the `t` days after the end of the customer's period
    pub fn expected_purchases(&self, t: f64, history: &PurchaseHistory) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        let BgNbdParams { r, alpha, a, b } = self.params;
        let x = history.frequency;
        let age = history.age;

        let hyp_a = r + x;
        let hyp_b = b + x;
        let hyp_c = a + b + x - 1.0;
        let z = t / (alpha + age + t);

        let mut ln_hyp = ln_hyp2f1(hyp_a, hyp_b, hyp_c, z);
        if !ln_hyp.is_finite() {
            // Euler transformation
            ln_hyp = ln_hyp2f1(hyp_c - hyp_a, hyp_c - hyp_b, hyp_c, z)
                + (hyp_c - hyp_a - hyp_b) * (1.0 - z).ln();
        }

        let first = (a + b + x - 1.0) / (a - 1.0);
        let second = 1.0 - (ln_hyp + (r + x) * ((alpha + age) / (alpha + t + age)).ln()).exp();
        let numerator = first * second;

        let denominator = if x > 0.0 {
            1.0 + (a / (b + x - 1.0)) * ((alpha + age) / (alpha + history.recency)).powf(r + x)
        } else {
            1.0
        };
        numerator / denominator
    }

    /// Probability the customer has not dropped out by the end of their period
    pub fn probability_alive(&self, history: &PurchaseHistory) -> f64 {
        let x = history.frequency;
        if x == 0.0 {
            return 1.0;
        }
        let BgNbdParams { r, alpha, a, b } = self.params;
        let log_div = (r + x) * ((alpha + history.age) / (alpha + history.recency)).ln()
            + (a / (b + x - 1.0)).ln();
        1.0 / (1.0 + log_div.exp())
    }
}

/// Natural log of the Gauss hypergeometric function 2F1(a, b; c; z) for 0 <= z < 1
///
/// Plain power series; NaN when it fails to converge so callers can fall back.
fn ln_hyp2f1(a: f64, b: f64, c: f64, z: f64) -> f64 {
    const MAX_TERMS: usize = 200_000;
    if z == 0.0 {
        return 0.0;
    }
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 0..MAX_TERMS {
        let k = k as f64;
        term *= (a + k) * (b + k) / ((c + k) * (k + 1.0)) * z;
        sum += term;
        if !sum.is_finite() {
            return f64::NAN;
        }
        if term.abs() <= 1e-15 * sum.abs() {
            return sum.ln();
        }
    }
    f64::NAN
}
