//! Customer lifetime value pipeline
//!
//! Splits the log at calibration end, fits the purchase model on the
//! calibration triples and the spend model on the filtered calibration
//! summary, then projects and tiers every modelled customer. The holdout
//! period is used only to check the purchase model.

use crate::calibration::{split_calibration_holdout, CalibrationWindow, HoldoutSummary};
use crate::config::ClvConfig;
use crate::data::TransactionLog;
use crate::lifetime_model::{fit_bg_nbd, BgNbdModel, PurchaseHistory};
use crate::projection::ValueProjector;
use crate::segment::{clv_segmenter, value_counts, ValueTier};
use crate::spend_model::{fit_gamma_gamma, GammaGammaModel, SpendObservation};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct ClvResult {
    pub customer_id: String,
    pub frequency: i64,
    pub recency: i64,
    pub t: i64,
    pub monetary_value: f64,
    pub clv: f64,
    pub probability_alive: f64,
    pub expected_purchases: f64,
    pub clv_status: ValueTier,
}

/// Purchase model predictions over the holdout period against what happened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldoutValidation {
    pub customers: usize,
    pub duration_days: i64,
    pub mean_predicted: f64,
    pub mean_actual: f64,
    pub mean_absolute_error: f64,
}

#[derive(Debug, Clone)]
pub struct ClvReport {
    pub window: CalibrationWindow,
    pub results: Vec<ClvResult>,
    pub calibration_customers: usize,
    pub excluded_customers: usize,
    pub lifetime: BgNbdModel,
    pub spend: GammaGammaModel,
    pub validation: HoldoutValidation,
    pub average_clv: f64,
    /// Average CLV divided by the acquisition cost
    pub clv_to_cac: f64,
}

impl ClvReport {
    pub fn distribution(&self) -> Vec<(ValueTier, usize)> {
        value_counts(self.results.iter().map(|r| r.clv_status))
    }
}

pub fn run_clv(log: &TransactionLog, config: &ClvConfig) -> crate::Result<ClvReport> {
    let split = split_calibration_holdout(log, config);

    let histories: Vec<PurchaseHistory> = split.holdout.iter().map(PurchaseHistory::from).collect();
    let lifetime = fit_bg_nbd(&histories, config.lifetime_penalizer, config.max_iterations)?;

    let observations: Vec<SpendObservation> =
        split.calibration.iter().map(SpendObservation::from).collect();
    let spend = fit_gamma_gamma(&observations, config.spend_penalizer, config.max_iterations)?;
    debug!(population_mean = spend.population_mean(), "Spend model ready");

    let projector = ValueProjector::new(
        &lifetime,
        &spend,
        config.horizon_days,
        config.period_days,
        config.discount_rate,
    );
    let projections = projector.project(&split.calibration);

    let scores: Vec<f64> = projections.iter().map(|p| p.clv).collect();
    let segmenter = clv_segmenter(&scores, config.high_percentile, config.average_percentile);

    let results: Vec<ClvResult> = split
        .calibration
        .iter()
        .zip(projections)
        .map(|(summary, projection)| ClvResult {
            customer_id: summary.customer_id.clone(),
            frequency: summary.frequency,
            recency: summary.recency,
            t: summary.t,
            monetary_value: summary.monetary_value,
            clv: projection.clv,
            probability_alive: projection.probability_alive,
            expected_purchases: projection.expected_purchases,
            clv_status: segmenter.assign(projection.clv),
        })
        .collect();

    let (average_clv, clv_to_cac) = average_and_cac_ratio(&scores, config.acquisition_cost);
    let validation = validate_holdout(&lifetime, &split.holdout);

    info!(
        customers = results.len(),
        average_clv,
        clv_to_cac,
        holdout_mae = validation.mean_absolute_error,
        "CLV projected"
    );

    Ok(ClvReport {
        window: split.window,
        results,
        calibration_customers: split.calibration_customers,
        excluded_customers: split.excluded_customers,
        lifetime,
        spend,
        validation,
        average_clv,
        clv_to_cac,
    })
}

/// Mean CLV and its ratio to the acquisition cost, both unrounded
pub fn average_and_cac_ratio(clv: &[f64], acquisition_cost: f64) -> (f64, f64) {
    if clv.is_empty() {
        return (0.0, 0.0);
    }
    let average = clv.iter().sum::<f64>() / clv.len() as f64;
    (average, average / acquisition_cost)
}

/// Compare expected holdout purchases with observed holdout purchase days
pub fn validate_holdout(model: &BgNbdModel, holdout: &[HoldoutSummary]) -> HoldoutValidation {
    let duration_days = holdout.first().map_or(0, |h| h.duration_holdout);
    if holdout.is_empty() {
        return HoldoutValidation {
            customers: 0,
            duration_days,
            mean_predicted: 0.0,
            mean_actual: 0.0,
            mean_absolute_error: 0.0,
        };
    }

    let (mut predicted, mut actual, mut error) = (0.0, 0.0, 0.0);
    for h in holdout {
        let expected = model.expected_purchases(h.duration_holdout as f64, &PurchaseHistory::from(h));
        let observed = h.frequency_holdout as f64;
        predicted += expected;
        actual += observed;
        error += (expected - observed).abs();
    }
    let n = holdout.len() as f64;
    HoldoutValidation {
        customers: holdout.len(),
        duration_days,
        mean_predicted: predicted / n,
        mean_actual: actual / n,
        mean_absolute_error: error / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Transaction, TransactionLog};
    use crate::error::AnalysisError;
    use crate::lifetime_model::BgNbdParams;
    use crate::projection::round_to_cents;
    use chrono::{Duration, NaiveDate};

    /// Staggered customers buying at regular, customer-specific intervals
    fn retail_log() -> TransactionLog {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let mut transactions = Vec::new();
        for c in 0..90i64 {
            let first = (c * 7) % 240;
            let gap = 12 + (c % 9) * 6;
            let purchases = 1 + (c % 8);
            for k in 0..purchases {
                let day = first + k * gap;
                transactions.push(Transaction {
                    customer_id: format!("{}", 10_000 + c),
                    invoice_no: format!("INV-{c}-{k}"),
                    invoice_date: start + Duration::days(day),
                    quantity: 1.0 + (k % 3) as f64,
                    unit_price: 15.0 + ((c * 13) % 50) as f64,
                });
            }
        }
        TransactionLog::new(transactions).unwrap()
    }

    #[test]
    fn test_run_clv_projects_filtered_customers() {
        let log = retail_log();
        let config = ClvConfig::default();
        let report = run_clv(&log, &config).unwrap();

        assert!(!report.results.is_empty());
        assert_eq!(
            report.results.len() + report.excluded_customers,
            report.calibration_customers
        );
        for r in &report.results {
            assert!(r.frequency > 0);
            assert!(r.monetary_value > config.monetary_min && r.monetary_value < config.monetary_max);
            assert_eq!(round_to_cents(r.clv), r.clv);
            assert!((0.0..=1.0).contains(&r.probability_alive));
            assert!(r.expected_purchases >= 0.0);
        }

        let tiered: usize = report.distribution().iter().map(|(_, n)| n).sum();
        assert_eq!(tiered, report.results.len());
        assert!((report.clv_to_cac - report.average_clv / config.acquisition_cost).abs() < 1e-12);
        assert_eq!(report.validation.customers, report.results.len());
        assert_eq!(report.validation.duration_days, 180);
    }

    #[test]
    fn test_run_clv_is_deterministic() {
        let log = retail_log();
        let first = run_clv(&log, &ClvConfig::default()).unwrap();
        let second = run_clv(&log, &ClvConfig::default()).unwrap();
        assert_eq!(first.results, second.results);
    }

    #[test]
    fn test_cac_ratio_uses_unrounded_mean() {
        let (average, ratio) = average_and_cac_ratio(&[10.0, 10.008], 50.0);
        assert!((average - 10.004).abs() < 1e-12);
        assert!((ratio - 0.20008).abs() < 1e-12);
        assert_eq!(average_and_cac_ratio(&[], 50.0), (0.0, 0.0));
    }

    #[test]
    fn test_run_clv_fails_when_filter_removes_everyone() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        // one-time buyers, plus a repeat buyer whose spend is below the floor
        let mut transactions: Vec<Transaction> = (0..20i64)
            .map(|c| Transaction {
                customer_id: format!("{}", 20_000 + c),
                invoice_no: format!("INV-{c}"),
                invoice_date: start + Duration::days(c * 10),
                quantity: 1.0,
                unit_price: 25.0,
            })
            .collect();
        for k in 0..3i64 {
            transactions.push(Transaction {
                customer_id: "29999".into(),
                invoice_no: format!("LOW-{k}"),
                invoice_date: start + Duration::days(k * 20),
                quantity: 1.0,
                unit_price: 0.05,
            });
        }
        transactions.push(Transaction {
            customer_id: "30000".into(),
            invoice_no: "LAST".into(),
            invoice_date: start + Duration::days(500),
            quantity: 1.0,
            unit_price: 25.0,
        });
        let log = TransactionLog::new(transactions).unwrap();

        let err = run_clv(&log, &ClvConfig::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_validate_holdout_means() {
        let model = BgNbdModel {
            params: BgNbdParams {
                r: 0.8,
                alpha: 60.0,
                a: 1.5,
                b: 2.5,
            },
            penalizer: 0.0,
            negative_log_likelihood: 0.0,
            n_customers: 0,
        };
        let holdout = vec![
            HoldoutSummary {
                customer_id: "A".into(),
                frequency_cal: 3,
                recency_cal: 100,
                t_cal: 120,
                frequency_holdout: 2,
                duration_holdout: 90,
            },
            HoldoutSummary {
                customer_id: "B".into(),
                frequency_cal: 0,
                recency_cal: 0,
                t_cal: 60,
                frequency_holdout: 0,
                duration_holdout: 90,
            },
        ];
        let validation = validate_holdout(&model, &holdout);
        assert_eq!(validation.customers, 2);
        assert_eq!(validation.duration_days, 90);
        assert!((validation.mean_actual - 1.0).abs() < 1e-12);
        assert!(validation.mean_predicted > 0.0);
        assert!(validation.mean_absolute_error >= 0.0);

        let empty = validate_holdout(&model, &[]);
        assert_eq!(empty.customers, 0);
    }
}
