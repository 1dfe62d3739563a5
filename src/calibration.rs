//! Calibration / holdout split of the transaction history
//!
//! Purchases are counted per calendar day: several invoices on one day form a
//! single purchase occasion whose spend is summed. Within a period, a
//! customer's first purchase day anchors recency and age and is left out of
//! the repeat-purchase frequency and average spend.

use crate::config::ClvConfig;
use crate::data::{Transaction, TransactionLog};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Boundaries of the calibration and holdout periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationWindow {
    pub calibration_end: NaiveDateTime,
    pub observation_end: NaiveDateTime,
}

impl CalibrationWindow {
    pub fn new(observation_end: NaiveDateTime, offset_days: i64) -> Self {
        Self {
            calibration_end: observation_end - Duration::days(offset_days),
            observation_end,
        }
    }

    /// Length of the holdout period in days
    pub fn holdout_days(&self) -> i64 {
        (self.observation_end.date() - self.calibration_end.date()).num_days()
    }

    pub fn in_calibration(&self, t: &Transaction) -> bool {
        t.invoice_date <= self.calibration_end
    }

    pub fn in_holdout(&self, t: &Transaction) -> bool {
        t.invoice_date > self.calibration_end && t.invoice_date <= self.observation_end
    }
}

/// Lifetime-model view of one customer over a single period
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerSummary {
    pub customer_id: String,
    /// Repeat purchase days
    pub frequency: i64,
    /// Days from first to last purchase
    pub recency: i64,
    /// Days from first purchase to the end of the period
    pub t: i64,
    /// Mean spend per repeat purchase day, 0 without repeats
    pub monetary_value: f64,
}

/// Calibration triple paired with what the customer did afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct HoldoutSummary {
    pub customer_id: String,
    pub frequency_cal: i64,
    pub recency_cal: i64,
    pub t_cal: i64,
    /// Distinct purchase days inside the holdout period
    pub frequency_holdout: i64,
    pub duration_holdout: i64,
}

/// Both summaries, already restricted to the customers the models may see
#[derive(Debug, Clone)]
pub struct CalibrationSplit {
    pub window: CalibrationWindow,
    /// Calibration summaries passing the monetary and frequency filter
    pub calibration: Vec<CustomerSummary>,
    /// Holdout summaries of exactly the customers in `calibration`
    pub holdout: Vec<HoldoutSummary>,
    /// Customers with calibration purchases before filtering
    pub calibration_customers: usize,
    /// Customers removed by the filter policy
    pub excluded_customers: usize,
}

/// Summarise transactions dated on or before `period_end`.
pub fn summarize<'a, I>(transactions: I, period_end: NaiveDate) -> Vec<CustomerSummary>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut spend_by_day: BTreeMap<&str, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for t in transactions {
        let day = t.purchase_day();
        if day > period_end {
            continue;
        }
        *spend_by_day
            .entry(t.customer_id.as_str())
            .or_default()
            .entry(day)
            .or_insert(0.0) += t.total_spend();
    }

    spend_by_day
        .into_iter()
        .filter_map(|(customer_id, days)| {
            let (&first_day, &first_spend) = days.iter().next()?;
            let (&last_day, _) = days.iter().next_back()?;
            let frequency = days.len() as i64 - 1;
            let monetary_value = if frequency > 0 {
                let total: f64 = days.values().sum();
                (total - first_spend) / frequency as f64
            } else {
                0.0
            };
            Some(CustomerSummary {
                customer_id: customer_id.to_string(),
                frequency,
                recency: (last_day - first_day).num_days(),
                t: (period_end - first_day).num_days(),
                monetary_value,
            })
        })
        .collect()
}

/// Calibration summary of every customer with a purchase on or before calibration end
pub fn calibration_summary(log: &TransactionLog, window: &CalibrationWindow) -> Vec<CustomerSummary> {
    summarize(
        log.transactions().iter().filter(|t| window.in_calibration(t)),
        window.calibration_end.date(),
    )
}

/// Calibration triples joined with holdout purchase counts
///
/// Customers whose first purchase falls in the holdout period are absent:
/// the models have nothing to condition on for them.
pub fn calibration_and_holdout(log: &TransactionLog, window: &CalibrationWindow) -> Vec<HoldoutSummary> {
    let calibration = calibration_summary(log, window);

    let mut holdout_days: BTreeMap<&str, BTreeSet<NaiveDate>> = BTreeMap::new();
    for t in log.transactions().iter().filter(|t| window.in_holdout(t)) {
        holdout_days
            .entry(t.customer_id.as_str())
            .or_default()
            .insert(t.purchase_day());
    }

    let duration_holdout = window.holdout_days();
    calibration
        .into_iter()
        .map(|summary| {
            let frequency_holdout = holdout_days
                .get(summary.customer_id.as_str())
                .map_or(0, |days| days.len() as i64);
            HoldoutSummary {
                frequency_cal: summary.frequency,
                recency_cal: summary.recency,
                t_cal: summary.t,
                frequency_holdout,
                duration_holdout,
                customer_id: summary.customer_id,
            }
        })
        .collect()
}

/// Keep customers with `min < monetary_value < max` and at least one repeat purchase.
///
/// Returns the survivors and the number removed. Removal is a modelling
/// policy: those customers receive no lifetime value at all.
pub fn apply_value_filter(
    summaries: Vec<CustomerSummary>,
    monetary_min: f64,
    monetary_max: f64,
) -> (Vec<CustomerSummary>, usize) {
    let before = summaries.len();
    let kept: Vec<CustomerSummary> = summaries
        .into_iter()
        .filter(|s| s.monetary_value > monetary_min && s.monetary_value < monetary_max && s.frequency > 0)
        .collect();
    let excluded = before - kept.len();
    (kept, excluded)
}

/// Split the log at calibration end, filter, and align both summaries
pub fn split_calibration_holdout(log: &TransactionLog, config: &ClvConfig) -> CalibrationSplit {
    let window = CalibrationWindow::new(log.observation_end(), config.calibration_offset_days);

    let raw = calibration_summary(log, &window);
    let calibration_customers = raw.len();
    let (calibration, excluded_customers) =
        apply_value_filter(raw, config.monetary_min, config.monetary_max);

    let kept: BTreeSet<&str> = calibration.iter().map(|s| s.customer_id.as_str()).collect();
    let holdout: Vec<HoldoutSummary> = calibration_and_holdout(log, &window)
        .into_iter()
        .filter(|h| kept.contains(h.customer_id.as_str()))
        .collect();

    info!(
        calibration_end = %window.calibration_end,
        calibration_customers,
        excluded_customers,
        modelled = calibration.len(),
        "Calibration split"
    );

    CalibrationSplit {
        window,
        calibration,
        holdout,
        calibration_customers,
        excluded_customers,
    }
}
