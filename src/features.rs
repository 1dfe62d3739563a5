//! Per-customer RFM feature computation using Polars

use crate::data::{TransactionLog, CUSTOMER_ID, INVOICE_NO, QUANTITY, UNIT_PRICE};
use crate::error::AnalysisError;
use polars::prelude::*;

const SECONDS_PER_DAY: i64 = 86_400;

/// Aggregated purchase behaviour of one customer over the full window
#[derive(Debug, Clone, PartialEq)]
pub struct RfmRecord {
    pub customer_id: String,
    /// Whole days between the customer's last purchase and the observation end
    pub recency: i64,
    /// Distinct invoices
    pub frequency: i64,
    /// Sum of quantity * unit_price over every line
    pub monetary: f64,
    /// Whole days between first and last purchase, 0 for a single purchase
    pub customer_lifetime_days: i64,
    /// Distinct calendar days with a purchase
    pub purchase_days: i64,
}

impl RfmRecord {
    /// Repeat purchases in the lifetime-model sense: purchase days after the first.
    ///
    /// Not interchangeable with `frequency`, which counts invoices.
    pub fn repeat_purchases(&self) -> i64 {
        (self.purchase_days - 1).max(0)
    }

    pub fn is_repeat_buyer(&self) -> bool {
        self.frequency > 1
    }
}

/// Compute RFM features for every customer in the log
///
/// # Returns
/// * One `RfmRecord` per customer, ordered by customer id
pub fn compute_rfm_features(log: &TransactionLog) -> crate::Result<Vec<RfmRecord>> {
    let observation_end = log.observation_end().and_utc().timestamp();

    let rfm_df = log
        .to_frame()?
        .lazy()
        .with_columns([(col(QUANTITY) * col(UNIT_PRICE)).alias("total_spend")])
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col("invoice_ts").max().alias("last_ts"),
            col("invoice_ts").min().alias("first_ts"),
            col(INVOICE_NO).n_unique().alias("frequency"),
            col("invoice_day").n_unique().alias("purchase_days"),
            col("total_spend").sum().alias("monetary"),
        ])
        .collect()?;

    if rfm_df.height() == 0 {
        return Err(AnalysisError::EmptyInput("no customers found after RFM computation".into()).into());
    }

    let mut records = records_from_frame(&rfm_df, observation_end)?;
    records.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));
    Ok(records)
}

/// Flatten the grouped frame into named records
fn records_from_frame(df: &DataFrame, observation_end: i64) -> crate::Result<Vec<RfmRecord>> {
    let customer_ids = df.column(CUSTOMER_ID)?.str()?;
    let last_ts = df.column("last_ts")?.i64()?;
    let first_ts = df.column("first_ts")?.i64()?;
    let frequency = df.column("frequency")?.cast(&DataType::Int64)?;
    let frequency = frequency.i64()?;
    let purchase_days = df.column("purchase_days")?.cast(&DataType::Int64)?;
    let purchase_days = purchase_days.i64()?;
    let monetary = df.column("monetary")?.f64()?;

    let records = customer_ids
        .into_no_null_iter()
        .zip(last_ts.into_no_null_iter())
        .zip(first_ts.into_no_null_iter())
        .zip(frequency.into_no_null_iter())
        .zip(purchase_days.into_no_null_iter())
        .zip(monetary.into_no_null_iter())
        .map(
            |(((((customer_id, last), first), frequency), purchase_days), monetary)| RfmRecord {
                customer_id: customer_id.to_string(),
                recency: (observation_end - last).div_euclid(SECONDS_PER_DAY),
                frequency,
                monetary,
                customer_lifetime_days: (last - first).div_euclid(SECONDS_PER_DAY),
                purchase_days,
            },
        )
        .collect();

    Ok(records)
}
