//! Special regions: groups of counties whose cases are only reported as one
//! aggregate line. The aggregate is spread over the member counties in
//! proportion to their population.
//!
//! Redistribution takes two passes over every case/death record.
//! [`RegionDiscovery`] collects aggregates and member populations, and only
//! once it has seen every record can it be turned into a [`RegionAllocator`]
//! that hands out the shares.

use std::collections::BTreeMap;

use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{MeshError, MeshResult};
use crate::geo::GeoCode;
use crate::model::{ByCase, CaseType, CountyRecord};
use crate::summary::{IntegrityViolation, ViolationKind};
use crate::timeseries::TimeSeries;

/// Configured form of a region.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegionDefinition {
    /// Member county codes, in allocation order.
    pub members: Vec<String>,
    /// Member whose own line carries the aggregate of the whole region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_under: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RegionDefinition {
    fn new(description: &str, members: &[&str]) -> Self {
        Self {
            members: members.iter().map(|m| m.to_string()).collect(),
            reported_under: None,
            description: Some(description.to_string()),
        }
    }
}

pub fn default_regions() -> BTreeMap<String, RegionDefinition> {
    let mut new_york = RegionDefinition::new(
        "New York City",
        &["36005", "36047", "36061", "36081", "36085"],
    );
    new_york.reported_under = Some("36061".to_string());
    [
        (
            "25555",
            RegionDefinition::new("Dukes and Nantucket", &["25007", "25019"]),
        ),
        (
            "29555",
            RegionDefinition::new("Kansas City", &["29037", "29047", "29095", "29165"]),
        ),
        ("36555", new_york),
        (
            "49555",
            RegionDefinition::new("Bear River", &["49003", "49005", "49033"]),
        ),
        (
            "49556",
            RegionDefinition::new(
                "Central Utah",
                &["49023", "49027", "49031", "49039", "49041", "49055"],
            ),
        ),
        (
            "49557",
            RegionDefinition::new("Southeast Utah", &["49007", "49015", "49019"]),
        ),
        (
            "49558",
            RegionDefinition::new(
                "Southwest Utah",
                &["49001", "49017", "49021", "49025", "49053"],
            ),
        ),
        (
            "49559",
            RegionDefinition::new("Weber-Morgan", &["49029", "49057"]),
        ),
        (
            "49560",
            RegionDefinition::new("TriCounty", &["49009", "49013", "49047"]),
        ),
    ]
    .into_iter()
    .map(|(code, definition)| (code.to_string(), definition))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Region {
    members: Vec<GeoCode>,
    reported_under: Option<GeoCode>,
}

/// Validated region membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionTable {
    regions: BTreeMap<GeoCode, Region>,
    region_of: BTreeMap<GeoCode, GeoCode>,
}

impl RegionTable {
    pub fn from_definitions(definitions: &BTreeMap<String, RegionDefinition>) -> MeshResult<Self> {
        let mut table = RegionTable::default();
        for (code, definition) in definitions {
            let region: GeoCode = code.parse()?;
            let members = definition
                .members
                .iter()
                .map(|m| m.parse::<GeoCode>())
                .collect::<MeshResult<Vec<_>>>()?;
            let reported_under = definition
                .reported_under
                .as_deref()
                .map(str::parse::<GeoCode>)
                .transpose()?;

            if let Some(bad) = std::iter::once(&region)
                .chain(&members)
                .find(|c| !c.is_county())
            {
                return Err(MeshError::InvalidGeoCode(format!(
                    "region {region}: {bad} is not a county code"
                )));
            }
            if members.is_empty() {
                return Err(MeshError::InvalidGeoCode(format!(
                    "region {region} has no members"
                )));
            }
            if let Some(carrier) = reported_under.as_ref().filter(|c| !members.contains(c)) {
                return Err(MeshError::InvalidGeoCode(format!(
                    "region {region} is reported under {carrier}, which is not a member"
                )));
            }
            for member in &members {
                if let Some(other) = table.region_of.insert(member.clone(), region.clone()) {
                    return Err(MeshError::InvalidGeoCode(format!(
                        "{member} belongs to both {other} and {region}"
                    )));
                }
            }
            table.regions.insert(
                region,
                Region {
                    members,
                    reported_under,
                },
            );
        }
        Ok(table)
    }

    pub fn is_region(&self, code: &GeoCode) -> bool {
        self.regions.contains_key(code)
    }

    pub fn region_of(&self, member: &GeoCode) -> Option<&GeoCode> {
        self.region_of.get(member)
    }

    pub fn members(&self, region: &GeoCode) -> Option<&[GeoCode]> {
        self.regions.get(region).map(|r| r.members.as_slice())
    }

    pub fn reported_under(&self, region: &GeoCode) -> Option<&GeoCode> {
        self.regions.get(region)?.reported_under.as_ref()
    }

    pub fn regions(&self) -> impl Iterator<Item = &GeoCode> {
        self.regions.keys()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggregateSource {
    RegionLine,
    Carrier,
}

/// Redistribution state of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionGroup {
    pub code: GeoCode,
    pub member_codes: Vec<GeoCode>,
    /// Sum of the populations of the members seen so far.
    pub population: u64,
    pub raw_aggregate: Option<ByCase<TimeSeries<i64>>>,
    pub remaining_members: ByCase<usize>,
    pub remaining_cases: ByCase<TimeSeries<i64>>,
    /// Members seen once the counter had reached zero. They get no share.
    pub extra_members: ByCase<Vec<GeoCode>>,
    aggregate_source: Option<AggregateSource>,
    carrier: Option<GeoCode>,
}

impl RegionGroup {
    fn new(code: GeoCode, member_codes: Vec<GeoCode>, carrier: Option<GeoCode>) -> Self {
        let count = member_codes.len();
        Self {
            code,
            member_codes,
            population: 0,
            raw_aggregate: None,
            remaining_members: ByCase::from_fn(|_| count),
            remaining_cases: ByCase::default(),
            extra_members: ByCase::default(),
            aggregate_source: None,
            carrier,
        }
    }

    fn set_aggregate(&mut self, record: &CountyRecord, source: AggregateSource) {
        if self.aggregate_source == Some(AggregateSource::RegionLine) {
            debug!(
                "Keeping the regional line of {} over '{}'",
                self.code, record.combined_key
            );
            return;
        }
        self.raw_aggregate = Some(record.cases.clone());
        self.aggregate_source = Some(source);
    }

    /// Whether `member`'s own counts are already part of the aggregate.
    fn carries_aggregate(&self, member: &GeoCode) -> bool {
        self.aggregate_source == Some(AggregateSource::Carrier) && self.carrier.as_ref() == Some(member)
    }

    fn share(&self, aggregate: i64, member_population: u64) -> i64 {
        if self.population == 0 {
            return 0;
        }
        let share = i128::from(aggregate) * i128::from(member_population) / i128::from(self.population);
        share as i64
    }

    fn allocate(&mut self, record: &mut CountyRecord) {
        let Some(aggregate) = self.raw_aggregate.take() else {
            return;
        };
        let carrier = self.carries_aggregate(&record.code);
        for (case_type, raw) in aggregate.iter() {
            let before = self.remaining_members[case_type];
            if before == 0 {
                self.extra_members[case_type].push(record.code.clone());
                continue;
            }
            self.remaining_members[case_type] = before - 1;
            let last = before == 1;
            let own = &mut record.cases[case_type];
            for (date, &reported) in raw {
                if reported <= 0 {
                    continue;
                }
                let mut share = self.share(reported, record.population);
                let remaining = self.remaining_cases[case_type]
                    .entry(*date)
                    .or_insert(reported);
                *remaining -= share;
                if last {
                    share += *remaining;
                    *remaining = 0;
                }
                let base = if carrier {
                    0
                } else {
                    own.get(date).copied().unwrap_or(0)
                };
                own.insert(*date, base + share);
            }
        }
        self.raw_aggregate = Some(aggregate);
    }

    fn verify(&self) -> Vec<IntegrityViolation> {
        if self.raw_aggregate.is_none() {
            return vec![IntegrityViolation {
                region: self.code.clone(),
                case_type: None,
                kind: ViolationKind::MissingAggregate,
            }];
        }
        let mut violations = vec![];
        for case_type in [CaseType::Confirmed, CaseType::Deaths] {
            let members = self.remaining_members[case_type];
            if members != 0 {
                violations.push(IntegrityViolation {
                    region: self.code.clone(),
                    case_type: Some(case_type),
                    kind: ViolationKind::MembersRemaining(members),
                });
            }
            violations.extend(self.extra_members[case_type].iter().map(|code| {
                IntegrityViolation {
                    region: self.code.clone(),
                    case_type: Some(case_type),
                    kind: ViolationKind::ExtraMember(code.clone()),
                }
            }));
            let left: Vec<i64> = self.remaining_cases[case_type]
                .values()
                .copied()
                .filter(|v| *v != 0)
                .collect();
            if !left.is_empty() {
                violations.push(IntegrityViolation {
                    region: self.code.clone(),
                    case_type: Some(case_type),
                    kind: ViolationKind::CasesRemaining {
                        dates: left.len(),
                        total: left.iter().sum(),
                    },
                });
            }
        }
        violations
    }
}

/// What the first pass made of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovered {
    /// The record is a regional line; its counts live on in the members.
    Aggregate,
    Member,
    Unrelated,
}

/// First pass: collect aggregates and member populations.
#[derive(Debug)]
pub struct RegionDiscovery {
    table: RegionTable,
    groups: BTreeMap<GeoCode, RegionGroup>,
}

impl RegionDiscovery {
    pub fn new(table: RegionTable) -> Self {
        let groups = table
            .regions
            .iter()
            .map(|(code, region)| {
                (
                    code.clone(),
                    RegionGroup::new(
                        code.clone(),
                        region.members.clone(),
                        region.reported_under.clone(),
                    ),
                )
            })
            .collect();
        Self { table, groups }
    }

    pub fn observe(&mut self, record: &CountyRecord) -> Discovered {
        if let Some(group) = self.groups.get_mut(&record.code) {
            debug!("Found regional line '{}' for {}", record.combined_key, record.code);
            group.set_aggregate(record, AggregateSource::RegionLine);
            return Discovered::Aggregate;
        }
        let Some(region) = self.table.region_of(&record.code) else {
            return Discovered::Unrelated;
        };
        let Some(group) = self.groups.get_mut(region) else {
            return Discovered::Unrelated;
        };
        group.population += record.population;
        if group.carrier.as_ref() == Some(&record.code) {
            debug!("{} carries the aggregate of {}", record.code, group.code);
            group.set_aggregate(record, AggregateSource::Carrier);
        }
        Discovered::Member
    }

    /// Ends the first pass. Call only after every record was observed.
    pub fn finish(self) -> RegionAllocator {
        for group in self.groups.values() {
            if group.raw_aggregate.is_some() && group.population == 0 {
                warn!(
                    "Region {} has no member population, its last member takes every case",
                    group.code
                );
            }
        }
        RegionAllocator {
            table: self.table,
            groups: self.groups,
        }
    }
}

/// Second pass: add each member's share to its own counts.
#[derive(Debug)]
pub struct RegionAllocator {
    table: RegionTable,
    groups: BTreeMap<GeoCode, RegionGroup>,
}

impl RegionAllocator {
    /// Add the member's share of its region's aggregate. Non-members are
    /// left untouched.
    pub fn allocate(&mut self, record: &mut CountyRecord) {
        let Some(region) = self.table.region_of(&record.code) else {
            return;
        };
        match self.groups.get_mut(region) {
            Some(group) if group.raw_aggregate.is_some() => group.allocate(record),
            _ => debug!("No regional line for {} (member {})", region, record.code),
        }
    }

    pub fn group(&self, region: &GeoCode) -> Option<&RegionGroup> {
        self.groups.get(region)
    }

    /// Check that every aggregate was fully handed out. Violations are
    /// logged and returned, never raised.
    pub fn verify(&self) -> Vec<IntegrityViolation> {
        let violations = self
            .groups
            .values()
            .flat_map(RegionGroup::verify)
            .collect::<Vec<_>>();
        for violation in &violations {
            let case_type = violation
                .case_type
                .map(|c| format!(" ({c})"))
                .unwrap_or_default();
            warn!("Region {}{case_type}: {}", violation.region, violation.kind);
        }
        violations
    }
}

/// Both passes over `records`. Regional lines are consumed; the returned
/// records are every other record with shares added.
pub fn redistribute(
    table: RegionTable,
    records: Vec<CountyRecord>,
) -> (Vec<CountyRecord>, Vec<IntegrityViolation>) {
    let mut discovery = RegionDiscovery::new(table);
    let kept = records
        .into_iter()
        .filter(|record| discovery.observe(record) != Discovered::Aggregate)
        .collect::<Vec<_>>();
    let mut allocator = discovery.finish();
    let records = kept
        .into_iter()
        .map(|mut record| {
            allocator.allocate(&mut record);
            record
        })
        .collect::<Vec<_>>();
    let violations = allocator.verify();
    info!(
        "Redistributed {} region(s): {}",
        allocator.groups.len(),
        allocator.groups.keys().join(", ")
    );
    (records, violations)
}
