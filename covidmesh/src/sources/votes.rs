//! 2016 presidential election results per county.
//!
//! Each line names three candidates in `candidate1..3`. The column named
//! after a candidate holds that candidate's index `i`, and `c{i}v` their
//! votes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use csv::StringRecord;
use log::info;

use super::{line_number, open_csv, parse_int, HeaderMap, SourceData, SourceReader};
use crate::error::{LineError, MeshResult};
use crate::geo::GeoCode;
use crate::model::{merge_votes, Votes};
use crate::resolver::{CodeResolver, Resolution};
use crate::summary::ReadReport;

const SOURCE: &str = "votes";

/// Key of the total vote count.
pub const TOTAL_VOTES: &str = "v";

const CANDIDATES: [&str; 3] = ["candidate1", "candidate2", "candidate3"];

#[derive(Debug, Clone)]
pub struct VotesSource {
    path: PathBuf,
    resolver: CodeResolver,
}

#[derive(Debug, Clone, Default)]
pub struct VotesData {
    pub counties: BTreeMap<GeoCode, Votes>,
    pub report: ReadReport,
}

impl VotesSource {
    pub fn new(path: PathBuf, resolver: CodeResolver) -> Self {
        Self { path, resolver }
    }

    fn parse_line(header: &HeaderMap, record: &StringRecord) -> Result<Votes, LineError> {
        let mut votes = Votes::new();
        votes.insert(
            TOTAL_VOTES.to_string(),
            parse_int("votes", header.get_required(record, "votes")?)?,
        );
        for column in CANDIDATES {
            let name = header.get_required(record, column)?;
            let index = header.get_required(record, name)?;
            let count_column = format!("c{index}v");
            let count = parse_int(&count_column, header.get_required(record, &count_column)?)?;
            votes.insert(name.to_string(), count);
        }
        Ok(votes)
    }

    pub fn read_votes(&self) -> MeshResult<VotesData> {
        let mut reader = open_csv(&self.path)?;
        let header = HeaderMap::new(&self.path, reader.headers()?);
        header.require(&["cod", "votes"])?;
        let mut data = VotesData::default();
        for (idx, record) in reader.records().enumerate() {
            let line = line_number(idx);
            data.report.lines_read += 1;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    data.report.skip(SOURCE, line, LineError::Malformed(e.to_string()));
                    continue;
                }
            };
            let fips = header.get_optional(&record, "cod").unwrap_or_default();
            let code = match self.resolver.resolve_code(fips) {
                Resolution::County(code) | Resolution::Territory(code) => code,
                Resolution::Unresolved(_) | Resolution::Ignored(_) => {
                    data.report.skip(SOURCE, line, LineError::Malformed(format!("invalid code '{fips}'")));
                    continue;
                }
            };
            match Self::parse_line(&header, &record) {
                Ok(votes) => merge_votes(data.counties.entry(code).or_default(), &votes),
                Err(e) => data.report.skip(SOURCE, line, e),
            }
        }
        info!("Read votes for {} county(ies)", data.counties.len());
        Ok(data)
    }
}

impl SourceReader for VotesSource {
    fn name(&self) -> &'static str {
        SOURCE
    }

    fn read(&self) -> MeshResult<SourceData> {
        self.read_votes().map(SourceData::Votes)
    }
}
