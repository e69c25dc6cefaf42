//! Daily testing statistics per state.

use std::collections::BTreeMap;
use std::path::PathBuf;

use csv::StringRecord;
use log::info;

use super::{line_number, open_csv, parse_int_or_zero, HeaderMap, SourceData, SourceReader};
use crate::dates;
use crate::error::{LineError, MeshResult};
use crate::geo::{state_code_for_abbreviation, GeoCode};
use crate::summary::ReadReport;
use crate::timeseries::TimeSeries;

const SOURCE: &str = "testing";

#[derive(Debug, Clone)]
pub struct TestingSource {
    path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestingSeries {
    /// Positive plus negative results.
    pub settled_cases: TimeSeries<i64>,
    /// Percentage of settled results that were positive, two decimals.
    pub positive_rate: TimeSeries<f64>,
    pub pending_cases: TimeSeries<i64>,
    pub positive_cases: TimeSeries<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct TestingData {
    pub states: BTreeMap<GeoCode, TestingSeries>,
    pub report: ReadReport,
}

/// `floor(10000 * positive / settled) / 100`, or 0 without settled results.
pub fn positive_rate(positive: i64, settled: i64) -> f64 {
    if settled <= 0 {
        return 0.0;
    }
    (i128::from(positive) * 10_000).div_euclid(i128::from(settled)) as f64 / 100.0
}

impl TestingSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn parse_line(
        header: &HeaderMap,
        record: &StringRecord,
    ) -> Result<(GeoCode, chrono::NaiveDate, i64, i64, i64), LineError> {
        let date = header
            .get_optional(record, "date")
            .ok_or(LineError::MissingDate)?;
        let date = dates::from_yyyymmdd(date).map_err(|_| LineError::InvalidDate(date.to_string()))?;
        let state = header
            .get_optional(record, "state")
            .ok_or(LineError::MissingState)?;
        let code = state_code_for_abbreviation(state)
            .ok_or_else(|| LineError::UnknownState(state.to_string()))?;
        let number = |column: &str| parse_int_or_zero(column, header.get_optional(record, column));
        let positive = number("positive")?;
        let negative = number("negative")?;
        let pending = number("pending")?;
        Ok((code, date, positive, negative, pending))
    }

    pub fn read_testing(&self) -> MeshResult<TestingData> {
        let mut reader = open_csv(&self.path)?;
        let header = HeaderMap::new(&self.path, reader.headers()?);
        let mut data = TestingData::default();
        for (idx, record) in reader.records().enumerate() {
            let line = line_number(idx);
            data.report.lines_read += 1;
            let parsed = record
                .map_err(|e| LineError::Malformed(e.to_string()))
                .and_then(|r| Self::parse_line(&header, &r));
            let (code, date, positive, negative, pending) = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    data.report.skip(SOURCE, line, e);
                    continue;
                }
            };
            let settled = positive + negative;
            let series = data.states.entry(code).or_default();
            series.settled_cases.insert(date, settled);
            series.positive_rate.insert(date, positive_rate(positive, settled));
            series.pending_cases.insert(date, pending);
            series.positive_cases.insert(date, positive);
        }
        info!("Read testing for {} state(s)", data.states.len());
        Ok(data)
    }
}

impl SourceReader for TestingSource {
    fn name(&self) -> &'static str {
        SOURCE
    }

    fn read(&self) -> MeshResult<SourceData> {
        self.read_testing().map(SourceData::Testing)
    }
}
