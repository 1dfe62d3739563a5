//! Transaction loading using Polars
//!
//! The CSV is read to completion with Polars, the five required columns are
//! resolved (case and separator insensitive, so `CustomerID` matches
//! `customer_id`), and every row becomes an immutable [`Transaction`].

use crate::error::AnalysisError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, warn};

pub const CUSTOMER_ID: &str = "customer_id";
pub const INVOICE_NO: &str = "invoice_no";
pub const INVOICE_DATE: &str = "invoice_date";
pub const QUANTITY: &str = "quantity";
pub const UNIT_PRICE: &str = "unit_price";

const REQUIRED_COLUMNS: [&str; 5] = [CUSTOMER_ID, INVOICE_NO, INVOICE_DATE, QUANTITY, UNIT_PRICE];

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// A single invoice line
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub customer_id: String,
    pub invoice_no: String,
    pub invoice_date: NaiveDateTime,
    pub quantity: f64,
    pub unit_price: f64,
}

impl Transaction {
    pub fn total_spend(&self) -> f64 {
        self.quantity * self.unit_price
    }

    /// Calendar day of the purchase, the unit the lifetime models count in
    pub fn purchase_day(&self) -> NaiveDate {
        self.invoice_date.date()
    }
}

/// All loaded transactions plus the end of the observation window
#[derive(Debug, Clone)]
pub struct TransactionLog {
    transactions: Vec<Transaction>,
    observation_end: NaiveDateTime,
}

impl TransactionLog {
    /// Wrap a set of transactions; the observation window ends at the latest one.
    pub fn new(transactions: Vec<Transaction>) -> crate::Result<Self> {
        let observation_end = transactions
            .iter()
            .map(|t| t.invoice_date)
            .max()
            .ok_or_else(|| AnalysisError::EmptyInput("transaction log has no rows".into()))?;

        Ok(Self {
            transactions,
            observation_end,
        })
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn observation_end(&self) -> NaiveDateTime {
        self.observation_end
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Tabular view used by the grouped aggregations.
    ///
    /// Timestamps become `invoice_ts` (unix seconds) and `invoice_day`
    /// (days since the common era) so the aggregation stays in integer columns.
    pub fn to_frame(&self) -> crate::Result<DataFrame> {
        let customer_ids: Vec<&str> = self
            .transactions
            .iter()
            .map(|t| t.customer_id.as_str())
            .collect();
        let invoice_nos: Vec<&str> = self
            .transactions
            .iter()
            .map(|t| t.invoice_no.as_str())
            .collect();
        let timestamps: Vec<i64> = self
            .transactions
            .iter()
            .map(|t| t.invoice_date.and_utc().timestamp())
            .collect();
        let days: Vec<i64> = self
            .transactions
            .iter()
            .map(|t| i64::from(chrono::Datelike::num_days_from_ce(&t.purchase_day())))
            .collect();
        let quantities: Vec<f64> = self.transactions.iter().map(|t| t.quantity).collect();
        let prices: Vec<f64> = self.transactions.iter().map(|t| t.unit_price).collect();

        let df = df!(
            CUSTOMER_ID => customer_ids,
            INVOICE_NO => invoice_nos,
            "invoice_ts" => timestamps,
            "invoice_day" => days,
            QUANTITY => quantities,
            UNIT_PRICE => prices,
        )?;
        Ok(df)
    }
}

/// Load a transaction CSV
///
/// # Arguments
/// * `file_path` - Path to the CSV file
///
/// # Returns
/// * `TransactionLog` with every row that carries a customer id
///
/// Rows without a customer id are dropped with a warning. Any other missing
/// or unparseable required value is a schema error.
pub fn load_transactions(file_path: &Path) -> crate::Result<TransactionLog> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", file_path.display(), e))?
        .finish()
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file_path.display(), e))?;

    debug!(rows = df.height(), columns = df.width(), "CSV read");

    let transactions = transactions_from_frame(&df)?;
    if transactions.is_empty() {
        return Err(AnalysisError::EmptyInput(format!(
            "no rows with a customer id in {}",
            file_path.display()
        ))
        .into());
    }

    TransactionLog::new(transactions)
}

/// Convert a raw frame into transactions, validating the schema first.
pub fn transactions_from_frame(df: &DataFrame) -> crate::Result<Vec<Transaction>> {
    let available: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut resolved = Vec::with_capacity(REQUIRED_COLUMNS.len());
    for required in REQUIRED_COLUMNS {
        let actual = resolve_column(&available, required).ok_or_else(|| {
            AnalysisError::MissingColumn {
                column: required.to_string(),
                available: available.join(", "),
            }
        })?;
        resolved.push(actual);
    }

    let customer_ids = string_values(df, &resolved[0])?;
    let invoice_nos = string_values(df, &resolved[1])?;
    let invoice_dates = string_values(df, &resolved[2])?;
    let quantities = numeric_values(df, &resolved[3], QUANTITY)?;
    let prices = numeric_values(df, &resolved[4], UNIT_PRICE)?;

    let mut transactions = Vec::with_capacity(df.height());
    let mut missing_customer = 0usize;

    for row in 0..df.height() {
        let Some(customer_id) = customer_ids[row].clone() else {
            missing_customer += 1;
            continue;
        };
        let invoice_no = invoice_nos[row]
            .clone()
            .ok_or_else(|| malformed(INVOICE_NO, row, ""))?;
        let raw_date = invoice_dates[row]
            .as_deref()
            .ok_or_else(|| malformed(INVOICE_DATE, row, ""))?;
        let invoice_date =
            parse_timestamp(raw_date).ok_or_else(|| malformed(INVOICE_DATE, row, raw_date))?;
        let quantity = quantities[row].ok_or_else(|| malformed(QUANTITY, row, ""))?;
        let unit_price = prices[row].ok_or_else(|| malformed(UNIT_PRICE, row, ""))?;

        transactions.push(Transaction {
            customer_id,
            invoice_no,
            invoice_date,
            quantity,
            unit_price,
        });
    }

    if missing_customer > 0 {
        warn!(rows = missing_customer, "Dropped rows without a customer id");
    }

    Ok(transactions)
}

/// Parse the timestamp layouts retail exports commonly use
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    let without_zone = raw.trim_end_matches('Z');
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(without_zone, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(without_zone, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('\u{feff}')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn resolve_column(available: &[String], required: &str) -> Option<String> {
    let wanted = normalize_name(required);
    available
        .iter()
        .find(|name| normalize_name(name) == wanted)
        .cloned()
}

fn malformed(column: &str, row: usize, value: &str) -> AnalysisError {
    AnalysisError::MalformedValue {
        column: column.to_string(),
        row,
        value: value.to_string(),
    }
}

/// Read a column as optional strings; float ids such as `17850.0` lose their fraction.
fn string_values(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<String>>> {
    let column = df.column(name)?;
    let column = match column.dtype() {
        DataType::Float32 | DataType::Float64 => column.cast(&DataType::Int64)?,
        _ => column.clone(),
    };
    let strings = column.cast(&DataType::String)?;
    let values = strings
        .str()?
        .into_iter()
        .map(|value| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .collect();
    Ok(values)
}

/// Read a numeric column; a present value that does not parse is a schema error.
fn numeric_values(df: &DataFrame, name: &str, canonical: &str) -> crate::Result<Vec<Option<f64>>> {
    let column = df.column(name)?;
    let raw = column.cast(&DataType::String)?;
    let numeric = column.cast(&DataType::Float64)?;

    let mut values = Vec::with_capacity(df.height());
    for (row, (text, value)) in raw
        .str()?
        .into_iter()
        .zip(numeric.f64()?.into_iter())
        .enumerate()
    {
        match (text, value) {
            (Some(text), None) if !text.trim().is_empty() => {
                return Err(malformed(canonical, row, text).into());
            }
            (_, Some(v)) if !v.is_finite() => {
                return Err(malformed(canonical, row, &v.to_string()).into());
            }
            (_, value) => values.push(value),
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country").unwrap();
        writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01T08:26:00Z,2.55,17850,United Kingdom").unwrap();
        writeln!(file, "536365,71053,WHITE METAL LANTERN,6,2010-12-01T08:26:00Z,3.39,17850,United Kingdom").unwrap();
        writeln!(file, "536366,22633,HAND WARMER UNION JACK,6,2010-12-01T08:28:00Z,1.85,17850,United Kingdom").unwrap();
        writeln!(file, "536367,84406B,CREAM CUPID HEARTS COAT HANGER,8,2010-12-01T08:34:00Z,2.75,13047,United Kingdom").unwrap();
        writeln!(file, "536368,22752,SET 7 BABUSHKA NESTING BOXES,2,2010-12-02T10:15:00Z,7.65,,United Kingdom").unwrap();
        file
    }

    #[test]
    fn test_load_transactions() {
        let test_file = create_test_csv();
        let log = load_transactions(test_file.path()).unwrap();

        // the row without a customer id is dropped
        assert_eq!(log.len(), 4);
        assert_eq!(log.transactions()[0].customer_id, "17850");
        assert_eq!(log.transactions()[0].invoice_no, "536365");
        assert!((log.transactions()[0].total_spend() - 15.3).abs() < 1e-9);
        assert_eq!(
            log.observation_end(),
            parse_timestamp("2010-12-01 08:34:00").unwrap()
        );
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "customer_id,invoice_no,invoice_date,quantity").unwrap();
        writeln!(file, "1,A1,2011-01-01,2").unwrap();

        let err = load_transactions(file.path()).unwrap_err();
        match err.downcast_ref::<AnalysisError>() {
            Some(AnalysisError::MissingColumn { column, .. }) => assert_eq!(column, UNIT_PRICE),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_quantity_is_schema_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "customer_id,invoice_no,invoice_date,quantity,unit_price").unwrap();
        writeln!(file, "1,A1,2011-01-01,2,1.5").unwrap();
        writeln!(file, "1,A2,2011-01-02,lots,1.5").unwrap();

        let err = load_transactions(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::MalformedValue { row: 1, .. })
        ));
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        let expected = NaiveDate::from_ymd_opt(2011, 12, 9)
            .unwrap()
            .and_hms_opt(12, 50, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2011-12-09 12:50:00"), Some(expected));
        assert_eq!(parse_timestamp("2011-12-09T12:50:00Z"), Some(expected));
        assert_eq!(parse_timestamp("12/9/2011 12:50"), Some(expected));
        assert_eq!(
            parse_timestamp("2011-12-09").map(|dt| dt.date()),
            NaiveDate::from_ymd_opt(2011, 12, 9)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_empty_log_rejected() {
        assert!(TransactionLog::new(Vec::new()).is_err());
    }
}
