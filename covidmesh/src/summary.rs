//! Bookkeeping of everything a run skipped, dropped or could not verify.

use std::fmt::Display;

use log::warn;
use serde::Serialize;

use crate::error::LineError;
use crate::geo::GeoCode;
use crate::model::CaseType;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedLine {
    pub source: &'static str,
    pub line: usize,
    pub reason: String,
}

/// What a single reader saw.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadReport {
    pub lines_read: usize,
    pub skipped: Vec<SkippedLine>,
    /// Combined keys that could not be mapped to a code.
    pub unresolved: Vec<String>,
}

impl ReadReport {
    pub fn skip(&mut self, source: &'static str, line: usize, reason: LineError) {
        warn!("{source}: skipping line {line}: {reason}");
        self.skipped.push(SkippedLine {
            source,
            line,
            reason: reason.to_string(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ViolationKind {
    /// No aggregate line was found for the region.
    MissingAggregate,
    /// Fewer members than configured were allocated a share.
    MembersRemaining(usize),
    /// Some of the aggregate was never handed out.
    CasesRemaining { dates: usize, total: i64 },
    /// A member line arrived after every member had been allocated.
    ExtraMember(GeoCode),
}

impl Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::MissingAggregate => write!(f, "no regional line found"),
            ViolationKind::MembersRemaining(n) => write!(f, "{n} member(s) never allocated"),
            ViolationKind::CasesRemaining { dates, total } => {
                write!(f, "{total} case(s) left over on {dates} date(s)")
            }
            ViolationKind::ExtraMember(code) => {
                write!(f, "{code} was left out, every member was already allocated")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityViolation {
    pub region: GeoCode,
    pub case_type: Option<CaseType>,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub reports: Vec<(&'static str, ReadReport)>,
    pub integrity_violations: Vec<IntegrityViolation>,
    /// Unit/date pairs left out of per-capita extrema for lack of population.
    pub zero_population_skips: usize,
    pub name_hash_collisions: Vec<(GeoCode, GeoCode)>,
    /// Codes whose mobility series had no value in range.
    pub empty_mobility: Vec<GeoCode>,
    pub counties: usize,
    pub states: usize,
    pub files_written: usize,
}

impl RunSummary {
    pub fn add_report(&mut self, source: &'static str, report: ReadReport) {
        self.reports.push((source, report));
    }

    pub fn skipped_lines(&self) -> usize {
        self.reports.iter().map(|(_, r)| r.skipped.len()).sum()
    }

    pub fn unresolved_keys(&self) -> impl Iterator<Item = &String> {
        self.reports.iter().flat_map(|(_, r)| r.unresolved.iter())
    }

    /// Whether anything recoverable went wrong.
    pub fn is_clean(&self) -> bool {
        self.skipped_lines() == 0
            && self.unresolved_keys().next().is_none()
            && self.integrity_violations.is_empty()
            && self.zero_population_skips == 0
    }
}
