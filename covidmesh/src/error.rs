//! Error types.

use std::path::PathBuf;

/// Errors that abort a run or reject a value outright.
#[derive(thiserror::Error, Debug)]
pub enum MeshError {
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Missing or unreadable source file '{}': {source}", path.display())]
    MissingSource {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid header in '{}': {reason}", path.display())]
    InvalidHeader { path: PathBuf, reason: String },
    #[error("Invalid date label: {0}")]
    InvalidDate(String),
    #[error("Invalid geo-code: {0}")]
    InvalidGeoCode(String),
    #[error("Missing required source: {0}")]
    MissingDataset(&'static str),
    #[error("Wrapped CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Wrapped serde JSON error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type MeshResult<T> = Result<T, MeshError>;

/// Reasons a single input line is skipped. These never abort a run.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("no date in line")]
    MissingDate,
    #[error("no state in line")]
    MissingState,
    #[error("unknown state abbreviation '{0}'")]
    UnknownState(String),
    #[error("missing column '{0}'")]
    MissingColumn(String),
    #[error("invalid number '{value}' in column '{column}'")]
    InvalidNumber { column: String, value: String },
    #[error("invalid date '{0}'")]
    InvalidDate(String),
    #[error("mismatching codes between paired lines: '{0}' and '{1}'")]
    MismatchedCodes(String, String),
    #[error("duplicate line for code {0}, keeping the first")]
    DuplicateCode(String),
    #[error("malformed record: {0}")]
    Malformed(String),
}
