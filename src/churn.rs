//! Churn labelling, training and risk scoring for repeat buyers

use crate::config::ChurnConfig;
use crate::features::RfmRecord;
use crate::model::{classification_report, fit_forest, train_test_split, ClassificationReport};
use crate::segment::{churn_risk_segmenter, value_counts, ChurnRisk};
use linfa::prelude::Records;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use tracing::{debug, info};

pub const FEATURE_NAMES: [&str; 3] = ["frequency", "monetary", "customer_lifetime_days"];

#[derive(Debug, Clone, PartialEq)]
pub struct ChurnResult {
    pub customer_id: String,
    pub recency: i64,
    pub frequency: i64,
    pub monetary: f64,
    pub customer_lifetime_days: i64,
    pub is_repeat_buyer: bool,
    /// Observed label, repeat buyers only
    pub churn: Option<u8>,
    /// Model probability, repeat buyers only
    pub churn_prob: Option<f64>,
    pub churn_status: ChurnRisk,
}

#[derive(Debug, Clone)]
pub struct ChurnReport {
    /// Every customer; one-time buyers carry no label and an Unknown status
    pub results: Vec<ChurnResult>,
    pub total_customers: usize,
    pub repeat_buyers: usize,
    pub one_time_buyers: usize,
    /// Share of repeat buyers labelled churned
    pub churn_rate: f64,
    pub train_size: usize,
    pub test_size: usize,
    /// Scores on the held-out split
    pub evaluation: ClassificationReport,
    /// (feature, importance), most important first
    pub feature_importances: Vec<(&'static str, f64)>,
}

impl ChurnReport {
    pub fn distribution(&self) -> Vec<(ChurnRisk, usize)> {
        value_counts(self.results.iter().map(|r| r.churn_status))
    }
}

/// 1 when the customer has been silent for longer than the threshold
pub fn label_churn(recency: i64, threshold_days: i64) -> u8 {
    u8::from(recency > threshold_days)
}

/// Train on a seeded split of the repeat buyers, then score all of them.
pub fn run_churn(records: &[RfmRecord], config: &ChurnConfig) -> crate::Result<ChurnReport> {
    let repeat: Vec<&RfmRecord> = records.iter().filter(|r| r.is_repeat_buyer()).collect();
    let one_time_buyers = records.iter().filter(|r| r.frequency == 1).count();

    let labels: Array1<usize> = repeat
        .iter()
        .map(|r| usize::from(label_churn(r.recency, config.threshold_days)))
        .collect();
    let churn_rate = if repeat.is_empty() {
        0.0
    } else {
        labels.sum() as f64 / repeat.len() as f64
    };
    info!(
        customers = records.len(),
        repeat_buyers = repeat.len(),
        one_time_buyers,
        churn_rate,
        "Churn labels assigned"
    );

    let features = feature_matrix(&repeat)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let (train, test) = train_test_split(&features, &labels, config.test_size, &mut rng)?;
    debug!(train = train.nsamples(), test = test.nsamples(), "Split repeat buyers");

    let forest = fit_forest(&train, config.n_trees, &mut rng)?;
    let evaluation = classification_report(test.targets(), &forest.predict(test.records())?);

    // production scoring covers the whole repeat-buyer population
    let probabilities = forest.predict_proba(&features)?;
    let segmenter = churn_risk_segmenter(&config.risk_cutoffs);

    let mut scored = repeat
        .iter()
        .zip(labels.iter())
        .zip(probabilities.iter())
        .map(|((record, &label), &prob)| (record.customer_id.as_str(), (label as u8, prob)))
        .collect::<HashMap<_, _>>();

    let results = records
        .iter()
        .map(|record| {
            let (churn, churn_prob) = match scored.remove(record.customer_id.as_str()) {
                Some((label, prob)) => (Some(label), Some(prob)),
                None => (None, None),
            };
            ChurnResult {
                customer_id: record.customer_id.clone(),
                recency: record.recency,
                frequency: record.frequency,
                monetary: record.monetary,
                customer_lifetime_days: record.customer_lifetime_days,
                is_repeat_buyer: record.is_repeat_buyer(),
                churn,
                churn_prob,
                churn_status: churn_prob.map_or(ChurnRisk::Unknown, |p| segmenter.assign(p)),
            }
        })
        .collect();

    let mut feature_importances: Vec<(&'static str, f64)> = FEATURE_NAMES
        .iter()
        .copied()
        .zip(forest.feature_importances())
        .collect();
    feature_importances.sort_by(|a, b| b.1.total_cmp(&a.1));

    Ok(ChurnReport {
        results,
        total_customers: records.len(),
        repeat_buyers: repeat.len(),
        one_time_buyers,
        churn_rate,
        train_size: train.nsamples(),
        test_size: test.nsamples(),
        evaluation,
        feature_importances,
    })
}

fn feature_matrix(records: &[&RfmRecord]) -> crate::Result<Array2<f64>> {
    let mut values = Vec::with_capacity(records.len() * FEATURE_NAMES.len());
    for r in records {
        values.extend_from_slice(&[
            r.frequency as f64,
            r.monetary,
            r.customer_lifetime_days as f64,
        ]);
    }
    Ok(Array2::from_shape_vec((records.len(), FEATURE_NAMES.len()), values)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;

    fn record(id: usize, recency: i64, frequency: i64, lifetime: i64) -> RfmRecord {
        RfmRecord {
            customer_id: format!("C{id:03}"),
            recency,
            frequency,
            monetary: 50.0 * frequency as f64,
            customer_lifetime_days: lifetime,
            purchase_days: frequency,
        }
    }

    fn population() -> Vec<RfmRecord> {
        let mut records = Vec::new();
        for i in 0..60 {
            if i % 3 == 0 {
                records.push(record(i, 200 + i as i64, 1, 0));
            } else if i % 3 == 1 {
                records.push(record(i, 120 + i as i64, 2 + (i % 2) as i64, 15 + (i % 4) as i64));
            } else {
                records.push(record(i, 5 + (i % 20) as i64, 8 + (i % 5) as i64, 200 + i as i64));
            }
        }
        records
    }

    #[test]
    fn test_label_churn_threshold() {
        assert_eq!(label_churn(95, 90), 1);
        assert_eq!(label_churn(50, 90), 0);
        assert_eq!(label_churn(90, 90), 0);
    }

    #[test]
    fn test_run_churn_scores_every_repeat_buyer() {
        let records = population();
        let report = run_churn(&records, &ChurnConfig::default()).unwrap();

        assert_eq!(report.total_customers, 60);
        assert_eq!(report.one_time_buyers, 20);
        assert_eq!(report.repeat_buyers, 40);
        assert_eq!(report.train_size + report.test_size, 40);
        assert_eq!(report.test_size, 12);
        assert!((report.churn_rate - 0.5).abs() < 1e-12);
        assert_eq!(report.results.len(), 60);

        for result in &report.results {
            if result.is_repeat_buyer {
                let prob = result.churn_prob.unwrap();
                assert!((0.0..=1.0).contains(&prob));
                assert!(result.churn.is_some());
                assert_ne!(result.churn_status, ChurnRisk::Unknown);
            } else {
                assert_eq!(result.churn, None);
                assert_eq!(result.churn_status, ChurnRisk::Unknown);
            }
        }

        let importances: Vec<f64> = report.feature_importances.iter().map(|(_, i)| *i).collect();
        assert!(importances.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_run_churn_is_reproducible() {
        let records = population();
        let first = run_churn(&records, &ChurnConfig::default()).unwrap();
        let second = run_churn(&records, &ChurnConfig::default()).unwrap();
        assert_eq!(first.results, second.results);
        assert_eq!(first.evaluation, second.evaluation);
    }

    #[test]
    fn test_run_churn_needs_repeat_buyers() {
        let records = vec![record(1, 10, 1, 0), record(2, 100, 1, 0)];
        let err = run_churn(&records, &ChurnConfig::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::DegenerateInput(_))
        ));
    }
}
