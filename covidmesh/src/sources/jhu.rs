//! County case and death counts.
//!
//! Two CSVs with one line per reporting unit and one column per day. The
//! files are read in lockstep: line `n` of the confirmed file and line `n` of
//! the deaths file describe the same unit.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use log::{debug, info, warn};

use super::{line_number, open_csv, parse_int, parse_int_or_zero, HeaderMap, SourceData, SourceReader};
use crate::dates::{self, DateRange};
use crate::error::{LineError, MeshError, MeshResult};
use crate::model::{ByCase, CaseType, CountyRecord};
use crate::resolver::{CodeResolver, RawIdentifier, Resolution};
use crate::summary::ReadReport;
use crate::timeseries::TimeSeries;

const SOURCE: &str = "cases";

const FIPS: &str = "FIPS";
const COUNTY: &str = "Admin2";
const STATE: &str = "Province_State";
const COMBINED_KEY: &str = "Combined_Key";
const POPULATION: &str = "Population";

#[derive(Debug, Clone)]
pub struct CaseSource {
    confirmed: PathBuf,
    deaths: PathBuf,
    resolver: CodeResolver,
}

#[derive(Debug, Clone)]
pub struct CaseData {
    /// First to last date column of the confirmed header.
    pub date_range: DateRange,
    pub records: Vec<CountyRecord>,
    pub report: ReadReport,
}

/// Header of one file: the identifier columns plus the date columns.
struct CaseHeader {
    columns: HeaderMap,
    dates: Vec<(chrono::NaiveDate, usize)>,
}

impl CaseHeader {
    fn read(path: &Path, headers: &StringRecord, required: &[&str]) -> MeshResult<Self> {
        let columns = HeaderMap::new(path, headers);
        columns.require(required)?;
        let dates: Vec<_> = headers
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| dates::from_label(name).ok().map(|d| (d, idx)))
            .collect();
        if dates.is_empty() {
            return Err(MeshError::InvalidHeader {
                path: path.to_path_buf(),
                reason: "no date columns".to_string(),
            });
        }
        Ok(Self { columns, dates })
    }

    fn date_range(&self, path: &Path) -> MeshResult<DateRange> {
        match (self.dates.first(), self.dates.last()) {
            (Some((first, _)), Some((last, _))) => DateRange::new(*first, *last),
            _ => Err(MeshError::InvalidHeader {
                path: path.to_path_buf(),
                reason: "no date columns".to_string(),
            }),
        }
    }

    fn series(&self, record: &StringRecord) -> Result<TimeSeries<i64>, LineError> {
        self.dates
            .iter()
            .map(|(date, idx)| {
                let cell = record.get(*idx).map(str::trim).filter(|s| !s.is_empty());
                Ok((*date, parse_int_or_zero(&dates::to_label(*date), cell)?))
            })
            .collect()
    }
}

impl CaseSource {
    pub fn new(confirmed: PathBuf, deaths: PathBuf, resolver: CodeResolver) -> Self {
        Self {
            confirmed,
            deaths,
            resolver,
        }
    }

    fn resolve(&self, header: &HeaderMap, record: &StringRecord) -> Resolution {
        self.resolver.resolve(RawIdentifier {
            fips: header.get_optional(record, FIPS).unwrap_or_default(),
            combined_key: header.get_optional(record, COMBINED_KEY).unwrap_or_default(),
            province_state: header.get_optional(record, STATE).unwrap_or_default(),
        })
    }

    fn parse_pair(
        &self,
        confirmed: (&CaseHeader, &StringRecord),
        deaths: (&CaseHeader, &StringRecord),
        report: &mut ReadReport,
    ) -> Result<Option<CountyRecord>, LineError> {
        let (c_header, c_record) = confirmed;
        let (d_header, d_record) = deaths;

        let resolution = self.resolve(&c_header.columns, c_record);
        let deaths_resolution = self.resolve(&d_header.columns, d_record);
        if resolution != deaths_resolution {
            return Err(LineError::MismatchedCodes(
                c_header.columns.get_optional(c_record, FIPS).unwrap_or_default().to_string(),
                d_header.columns.get_optional(d_record, FIPS).unwrap_or_default().to_string(),
            ));
        }

        let columns = &d_header.columns;
        let state_name = columns.get_optional(d_record, STATE).unwrap_or_default().to_string();
        let (code, name) = match resolution {
            Resolution::County(code) => {
                let name = columns.get_optional(d_record, COUNTY).unwrap_or_default();
                (code, name.to_string())
            }
            Resolution::Territory(code) => (code, state_name.clone()),
            Resolution::Unresolved(key) => {
                report.unresolved.push(key);
                return Ok(None);
            }
            Resolution::Ignored(code) => {
                debug!("Ignoring line with code {code}");
                return Ok(None);
            }
        };

        let population = match self.resolver.population_override(&code) {
            Some(population) => population,
            None => {
                let raw = parse_int(POPULATION, columns.get_required(d_record, POPULATION)?)?;
                u64::try_from(raw).map_err(|_| LineError::InvalidNumber {
                    column: POPULATION.to_string(),
                    value: raw.to_string(),
                })?
            }
        };

        Ok(Some(CountyRecord {
            code,
            name,
            state_name,
            combined_key: columns
                .get_optional(d_record, COMBINED_KEY)
                .unwrap_or_default()
                .to_string(),
            population,
            cases: ByCase {
                confirmed: c_header.series(c_record)?,
                deaths: d_header.series(d_record)?,
            },
        }))
    }

    pub fn read_cases(&self) -> MeshResult<CaseData> {
        let mut confirmed = open_csv(&self.confirmed)?;
        let mut deaths = open_csv(&self.deaths)?;
        let c_header = CaseHeader::read(
            &self.confirmed,
            confirmed.headers()?,
            &[FIPS, STATE, COMBINED_KEY],
        )?;
        let d_header = CaseHeader::read(
            &self.deaths,
            deaths.headers()?,
            &[FIPS, STATE, COMBINED_KEY, POPULATION],
        )?;
        let date_range = c_header.date_range(&self.confirmed)?;
        let deaths_range = d_header.date_range(&self.deaths)?;
        if date_range != deaths_range {
            return Err(MeshError::InvalidHeader {
                path: self.deaths.clone(),
                reason: format!(
                    "dates {} to {} do not match the confirmed file",
                    dates::to_label(deaths_range.least_recent),
                    dates::to_label(deaths_range.most_recent)
                ),
            });
        }
        info!(
            "Case history runs from {} to {}",
            dates::to_label(date_range.least_recent),
            dates::to_label(date_range.most_recent)
        );

        let mut report = ReadReport::default();
        let mut records = vec![];
        let mut seen = HashSet::new();
        let mut confirmed_lines = confirmed.records();
        let mut deaths_lines = deaths.records();
        let mut idx = 0;
        loop {
            let (c_line, d_line) = match (confirmed_lines.next(), deaths_lines.next()) {
                (Some(c), Some(d)) => (c, d),
                (None, None) => break,
                _ => {
                    warn!("Confirmed and deaths files have a different number of lines");
                    break;
                }
            };
            let line = line_number(idx);
            idx += 1;
            report.lines_read += 1;
            let (c_record, d_record) = match (c_line, d_line) {
                (Ok(c), Ok(d)) => (c, d),
                (Err(e), _) | (_, Err(e)) => {
                    report.skip(SOURCE, line, LineError::Malformed(e.to_string()));
                    continue;
                }
            };
            match self.parse_pair((&c_header, &c_record), (&d_header, &d_record), &mut report) {
                Ok(Some(record)) => {
                    if seen.insert(record.code.clone()) {
                        records.push(record);
                    } else {
                        report.skip(SOURCE, line, LineError::DuplicateCode(record.code.to_string()));
                    }
                }
                Ok(None) => {}
                Err(e) => report.skip(SOURCE, line, e),
            }
        }
        info!(
            "Read {} case record(s) from {} line(s)",
            records.len(),
            report.lines_read
        );
        Ok(CaseData {
            date_range,
            records,
            report,
        })
    }
}

impl SourceReader for CaseSource {
    fn name(&self) -> &'static str {
        SOURCE
    }

    fn read(&self) -> MeshResult<SourceData> {
        self.read_cases().map(SourceData::Cases)
    }
}

impl CaseData {
    /// Sum of one case type over every record on `date`.
    pub fn total(&self, case_type: CaseType, date: &chrono::NaiveDate) -> i64 {
        self.records
            .iter()
            .filter_map(|r| r.cases[case_type].get(date))
            .sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;
    use crate::config::{Config, NEW_YORK_COUNTY_POPULATION};
    use crate::sources::test_util::write;

    pub const CONFIRMED: &str = "\
UID,iso2,FIPS,Admin2,Province_State,Country_Region,Combined_Key,3/1/20,3/2/20,3/3/20
84006085,US,6085.0,Santa Clara,California,US,\"Santa Clara, California, US\",1,2,4
84036061,US,36061.0,New York,New York,US,\"New York City, New York, US\",10,20,40
84000066,US,66.0,,Guam,US,\"Guam, US\",0,1,1
84029555,US,,Kansas City,Missouri,US,\"Kansas City,Missouri,US\",3,3,5
84099999,US,,Nowhere,Missouri,US,\"Nowhere,Missouri,US\",1,1,1
84000016,US,16,,American Samoa,US,\"American Samoa, US\",0,0,0
84006001,US,6001,Alameda,California,US,\"Alameda, California, US\",1,x,1
";

    pub const DEATHS: &str = "\
UID,iso2,FIPS,Admin2,Province_State,Country_Region,Combined_Key,Population,3/1/20,3/2/20,3/3/20
84006085,US,6085.0,Santa Clara,California,US,\"Santa Clara, California, US\",1927852,0,0.0,1
84036061,US,36061.0,New York,New York,US,\"New York City, New York, US\",8336817,1,2,3
84000066,US,66.0,,Guam,US,\"Guam, US\",168485,0,0,0
84029555,US,,Kansas City,Missouri,US,\"Kansas City,Missouri,US\",0,0,0,1
84099999,US,,Nowhere,Missouri,US,\"Nowhere,Missouri,US\",0,0,0,0
84000016,US,16,,American Samoa,US,\"American Samoa, US\",55641,0,0,0
84006001,US,6001,Alameda,California,US,\"Alameda, California, US\",1671329,0,0,0
";

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
    }

    fn read(confirmed: &str, deaths: &str) -> (TempDir, MeshResult<CaseData>) {
        let dir = TempDir::new().unwrap();
        let source = CaseSource::new(
            write(dir.path(), "confirmed.csv", confirmed),
            write(dir.path(), "deaths.csv", deaths),
            CodeResolver::from_config(&Config::default()).unwrap(),
        );
        let data = source.read_cases();
        (dir, data)
    }

    #[test]
    fn reads_both_files_in_lockstep() {
        let (_dir, data) = read(CONFIRMED, DEATHS);
        let data = data.unwrap();
        assert_eq!(data.date_range, DateRange::new(date(1), date(3)).unwrap());
        let codes: Vec<&str> = data.records.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["06085", "36061", "66001", "29555"]);

        let santa_clara = &data.records[0];
        assert_eq!(santa_clara.name, "Santa Clara");
        assert_eq!(santa_clara.population, 1927852);
        assert_eq!(santa_clara.cases.confirmed.get(&date(3)), Some(&4));
        assert_eq!(santa_clara.cases.deaths.get(&date(2)), Some(&0));
        assert!(santa_clara.cases.confirmed.is_contiguous());

        assert_eq!(data.records[1].population, NEW_YORK_COUNTY_POPULATION);
        assert_eq!(data.records[2].name, "Guam");
        assert_eq!(data.total(CaseType::Confirmed, &date(2)), 2 + 20 + 1 + 3);
    }

    #[test]
    fn bad_lines_are_recorded() {
        let (_dir, data) = read(CONFIRMED, DEATHS);
        let report = data.unwrap().report;
        assert_eq!(report.lines_read, 7);
        assert_eq!(report.unresolved, vec!["Nowhere,Missouri,US".to_string()]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].line, 8);
        assert!(report.skipped[0].reason.contains("'x'"));
    }

    #[test]
    fn mismatched_lines_are_skipped() {
        let deaths = DEATHS.replace("6085.0,Santa Clara", "6087,Santa Clara");
        let (_dir, data) = read(CONFIRMED, &deaths);
        let data = data.unwrap();
        assert!(data.records.iter().all(|r| r.code.as_str() != "06085"));
        assert!(data.report.skipped[0].reason.contains("mismatching"));
    }

    #[test]
    fn duplicate_codes_keep_the_first_line() {
        let confirmed = format!(
            "{CONFIRMED}84006085,US,6085,Santa Clara,California,US,\"Santa Clara, California, US\",9,9,9\n"
        );
        let deaths = format!(
            "{DEATHS}84006085,US,6085,Santa Clara,California,US,\"Santa Clara, California, US\",5,0,0,0\n"
        );
        let (_dir, data) = read(&confirmed, &deaths);
        let data = data.unwrap();
        let santa_clara: Vec<&CountyRecord> = data
            .records
            .iter()
            .filter(|r| r.code.as_str() == "06085")
            .collect();
        assert_eq!(santa_clara.len(), 1);
        assert_eq!(santa_clara[0].cases.confirmed.get(&date(3)), Some(&4));
        assert_eq!(santa_clara[0].population, 1927852);
        let duplicate = data.report.skipped.last().unwrap();
        assert_eq!(duplicate.line, 9);
        assert!(duplicate.reason.contains("duplicate line for code 06085"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = TempDir::new().unwrap();
        let source = CaseSource::new(
            write(dir.path(), "confirmed.csv", CONFIRMED),
            dir.path().join("deaths.csv"),
            CodeResolver::from_config(&Config::default()).unwrap(),
        );
        let err = source.read_cases().unwrap_err();
        assert!(err.to_string().contains("deaths.csv"));
    }

    #[test]
    fn header_without_dates_is_rejected() {
        let (_dir, data) = read("FIPS,Province_State,Combined_Key\n", DEATHS);
        assert!(matches!(data, Err(MeshError::InvalidHeader { .. })));
    }
}
