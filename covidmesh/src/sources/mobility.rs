//! Mobility indices, one JSON object per line.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use log::info;
use serde::Deserialize;

use super::{open, SourceData, SourceReader};
use crate::dates;
use crate::error::{LineError, MeshResult};
use crate::geo::GeoCode;
use crate::model::MobilitySeries;
use crate::summary::ReadReport;

const SOURCE: &str = "mobility";

#[derive(Debug, Clone)]
pub struct MobilitySource {
    path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct MobilityData {
    /// Sparse series per state or county code.
    pub series: BTreeMap<GeoCode, MobilitySeries>,
    pub report: ReadReport,
}

#[derive(Deserialize, Debug)]
struct MobilityLine {
    fips: String,
    date: Vec<String>,
    m50: Vec<f64>,
    m50_index: Vec<f64>,
}

impl MobilityLine {
    fn into_series(self) -> Result<(GeoCode, MobilitySeries), LineError> {
        if self.date.len() != self.m50.len() || self.date.len() != self.m50_index.len() {
            return Err(LineError::Malformed(format!(
                "{} dates but {} m50 and {} m50_index values",
                self.date.len(),
                self.m50.len(),
                self.m50_index.len()
            )));
        }
        let code: GeoCode = self
            .fips
            .parse()
            .map_err(|_| LineError::Malformed(format!("invalid code '{}'", self.fips)))?;
        let mut series = MobilitySeries::default();
        for ((date, m50), m50_index) in self.date.iter().zip(self.m50).zip(self.m50_index) {
            let date = dates::from_iso(date).map_err(|_| LineError::InvalidDate(date.clone()))?;
            series.m50.insert(date, m50);
            series.m50_index.insert(date, m50_index);
        }
        Ok((code, series))
    }
}

impl MobilitySource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn read_mobility(&self) -> MeshResult<MobilityData> {
        let reader = BufReader::new(open(&self.path)?);
        let mut data = MobilityData::default();
        // Raw bytes, so a line that is not UTF-8 is skipped like any other
        // malformed line.
        for (idx, line) in reader.split(b'\n').enumerate() {
            let line_no = idx + 1;
            let line = line?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            data.report.lines_read += 1;
            let parsed = serde_json::from_slice::<MobilityLine>(&line)
                .map_err(|e| LineError::Malformed(e.to_string()))
                .and_then(MobilityLine::into_series);
            match parsed {
                Ok((code, series)) => {
                    data.series.insert(code, series);
                }
                Err(e) => data.report.skip(SOURCE, line_no, e),
            }
        }
        info!("Read mobility for {} code(s)", data.series.len());
        Ok(data)
    }
}

impl SourceReader for MobilitySource {
    fn name(&self) -> &'static str {
        SOURCE
    }

    fn read(&self) -> MeshResult<SourceData> {
        self.read_mobility().map(SourceData::Mobility)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;
    use crate::sources::test_util::write;

    #[test]
    fn reads_ndjson() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "mobility.ndjson",
            concat!(
                r#"{"fips":"06","country_code":"US","date":["2020-03-01","2020-03-03"],"m50":[10.5,3.0],"m50_index":[90,30]}"#,
                "\n",
                r#"{"fips":"06085","date":["2020-03-02"],"m50":[1.0],"m50_index":[12]}"#,
                "\n\n",
                r#"{"fips":"06001","date":["2020-03-02"],"m50":[],"m50_index":[12]}"#,
                "\n",
                "not json\n",
            ),
        );
        let data = MobilitySource::new(path).read_mobility().unwrap();
        assert_eq!(data.series.len(), 2);
        let california = &data.series[&"06".parse::<GeoCode>().unwrap()];
        let first = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        assert_eq!(california.m50.get(&first), Some(&10.5));
        assert_eq!(california.m50_index.len(), 2);
        assert_eq!(data.report.lines_read, 4);
        assert_eq!(data.report.skipped.len(), 2);
        assert_eq!(data.report.skipped[0].line, 4);
    }

    #[test]
    fn skips_lines_that_are_not_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mobility.ndjson");
        let mut content = Vec::new();
        content.extend_from_slice(
            br#"{"fips":"06","date":["2020-03-01"],"m50":[1.0],"m50_index":[10]}"#,
        );
        content.extend_from_slice(b"\n\xff\xfe bad line\r\n");
        content.extend_from_slice(
            br#"{"fips":"36","date":["2020-03-01"],"m50":[2.0],"m50_index":[20]}"#,
        );
        content.extend_from_slice(b"\r\n");
        std::fs::write(&path, content).unwrap();

        let data = MobilitySource::new(path).read_mobility().unwrap();
        assert_eq!(data.series.len(), 2);
        assert_eq!(data.report.lines_read, 3);
        assert_eq!(data.report.skipped.len(), 1);
        assert_eq!(data.report.skipped[0].line, 2);
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        assert!(MobilitySource::new(dir.path().join("none.ndjson"))
            .read_mobility()
            .is_err());
    }
}
