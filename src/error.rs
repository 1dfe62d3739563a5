//! Typed failures raised by the analysis stages

use thiserror::Error;

/// Errors that halt an analysis run.
///
/// Stages return `crate::Result`, so these travel inside `anyhow::Error`;
/// callers that care about the kind can `downcast_ref::<AnalysisError>()`.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Required column '{column}' not found (available: {available})")]
    MissingColumn { column: String, available: String },

    #[error("Malformed value in column '{column}' at row {row}: {value:?}")]
    MalformedValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("No usable rows: {0}")]
    EmptyInput(String),

    #[error("Degenerate model input: {0}")]
    DegenerateInput(String),

    #[error("Model fit failed: {0}")]
    FitFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
