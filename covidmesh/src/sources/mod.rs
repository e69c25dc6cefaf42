//! Readers for every input dataset.
//!
//! Each reader owns everything it needs so it can run on a blocking thread,
//! and returns owned records plus a [`ReadReport`]. A missing file aborts the
//! run; a malformed line is skipped and recorded.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use enum_dispatch::enum_dispatch;

use crate::error::{LineError, MeshError, MeshResult};
use crate::summary::ReadReport;

pub mod jhu;
pub mod mobility;
pub mod testing;
pub mod votes;

pub use jhu::{CaseData, CaseSource};
pub use mobility::{MobilityData, MobilitySource};
pub use testing::{TestingData, TestingSeries, TestingSource};
pub use votes::{VotesData, VotesSource};

#[enum_dispatch]
pub trait SourceReader {
    /// Short name used in logs and the run summary.
    fn name(&self) -> &'static str;
    fn read(&self) -> MeshResult<SourceData>;
}

#[enum_dispatch(SourceReader)]
#[derive(Debug, Clone)]
pub enum Source {
    CaseSource,
    MobilitySource,
    TestingSource,
    VotesSource,
}

#[derive(Debug, Clone)]
pub enum SourceData {
    Cases(CaseData),
    Mobility(MobilityData),
    Testing(TestingData),
    Votes(VotesData),
}

impl SourceData {
    pub fn report(&self) -> &ReadReport {
        match self {
            SourceData::Cases(data) => &data.report,
            SourceData::Mobility(data) => &data.report,
            SourceData::Testing(data) => &data.report,
            SourceData::Votes(data) => &data.report,
        }
    }
}

pub(crate) fn open(path: &Path) -> MeshResult<File> {
    File::open(path).map_err(|source| MeshError::MissingSource {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn open_csv(path: &Path) -> MeshResult<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(open(path)?))
}

/// Column name to index.
#[derive(Debug, Clone)]
pub(crate) struct HeaderMap {
    path: PathBuf,
    columns: HashMap<String, usize>,
}

impl HeaderMap {
    pub fn new(path: &Path, headers: &StringRecord) -> Self {
        let columns = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_string(), idx))
            .collect();
        Self {
            path: path.to_path_buf(),
            columns,
        }
    }

    pub fn index(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }

    /// Fail the whole source when a column it cannot do without is absent.
    pub fn require(&self, names: &[&str]) -> MeshResult<()> {
        match names.iter().find(|name| !self.columns.contains_key(**name)) {
            Some(name) => Err(MeshError::InvalidHeader {
                path: self.path.clone(),
                reason: format!("no '{name}' column"),
            }),
            None => Ok(()),
        }
    }

    pub fn get_required<'a>(
        &self,
        record: &'a StringRecord,
        name: &str,
    ) -> Result<&'a str, LineError> {
        self.get_optional(record, name)
            .ok_or_else(|| LineError::MissingColumn(name.to_string()))
    }

    pub fn get_optional<'a>(&self, record: &'a StringRecord, name: &str) -> Option<&'a str> {
        record
            .get(self.index(name)?)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Parse an integer cell. Float-formatted integers such as `0.0` are
/// accepted and truncated.
pub(crate) fn parse_int(column: &str, value: &str) -> Result<i64, LineError> {
    let value = value.trim();
    if let Ok(parsed) = value.parse::<i64>() {
        return Ok(parsed);
    }
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Ok(parsed.trunc() as i64),
        _ => Err(LineError::InvalidNumber {
            column: column.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Like [`parse_int`], with a missing or empty cell read as 0.
pub(crate) fn parse_int_or_zero(column: &str, value: Option<&str>) -> Result<i64, LineError> {
    value.map_or(Ok(0), |v| parse_int(column, v))
}

/// Line number of the `idx`-th data record, counting the header as line 1.
pub(crate) fn line_number(idx: usize) -> usize {
    idx + 2
}
