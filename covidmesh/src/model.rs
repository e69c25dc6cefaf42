//! Typed records for every entity of the geo tree.
//!
//! The tree is owned by one run: built by [`crate::aggregate`], enriched by
//! [`crate::enrich`] and written out by [`crate::export`]. Serde attributes
//! here define the exported JSON documents.

use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::dates::DateRange;
use crate::geo::GeoCode;
use crate::timeseries::TimeSeries;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Display,
    AsRefStr,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CaseType {
    Confirmed,
    Deaths,
}

/// One value per case type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ByCase<T> {
    pub confirmed: T,
    pub deaths: T,
}

impl<T> ByCase<T> {
    pub fn from_fn(mut f: impl FnMut(CaseType) -> T) -> Self {
        Self {
            confirmed: f(CaseType::Confirmed),
            deaths: f(CaseType::Deaths),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CaseType, &T)> {
        [
            (CaseType::Confirmed, &self.confirmed),
            (CaseType::Deaths, &self.deaths),
        ]
        .into_iter()
    }
}

impl<T> Index<CaseType> for ByCase<T> {
    type Output = T;

    fn index(&self, case_type: CaseType) -> &T {
        match case_type {
            CaseType::Confirmed => &self.confirmed,
            CaseType::Deaths => &self.deaths,
        }
    }
}

impl<T> IndexMut<CaseType> for ByCase<T> {
    fn index_mut(&mut self, case_type: CaseType) -> &mut T {
        match case_type {
            CaseType::Confirmed => &mut self.confirmed,
            CaseType::Deaths => &mut self.deaths,
        }
    }
}

/// A node of the geo tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoUnit {
    pub code: GeoCode,
    pub name: String,
    /// Code of the enclosing unit. Not an ownership link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<GeoCode>,
    #[serde(flatten)]
    pub date_range: DateRange,
}

impl GeoUnit {
    pub fn new(code: GeoCode, name: impl Into<String>, date_range: DateRange) -> Self {
        Self {
            parent: code.parent(),
            code,
            name: name.into(),
            date_range,
        }
    }
}

/// One meshed line of the case/death source, before aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct CountyRecord {
    pub code: GeoCode,
    pub name: String,
    pub state_name: String,
    pub combined_key: String,
    pub population: u64,
    pub cases: ByCase<TimeSeries<i64>>,
}

/// Per-date values of a state or the nation: each child's count plus the
/// extrema across children used to scale map colours.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCaseRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_cases: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cases: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_per_capita: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_per_capita: Option<i64>,
    #[serde(flatten)]
    pub children: BTreeMap<GeoCode, i64>,
}

impl DailyCaseRecord {
    pub fn observe_cases(&mut self, cases: i64) {
        self.min_cases = Some(self.min_cases.map_or(cases, |m| m.min(cases)));
        self.max_cases = Some(self.max_cases.map_or(cases, |m| m.max(cases)));
    }

    pub fn observe_per_capita(&mut self, per_capita: i64) {
        self.min_per_capita = Some(self.min_per_capita.map_or(per_capita, |m| m.min(per_capita)));
        self.max_per_capita = Some(self.max_per_capita.map_or(per_capita, |m| m.max(per_capita)));
    }
}

/// Case counts of a state or the nation: the summed series plus the daily
/// breakdown, flattened next to it under date labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaseRollup {
    pub time_series: TimeSeries<i64>,
    #[serde(flatten)]
    pub daily: TimeSeries<DailyCaseRecord>,
}

/// A rolled up signal plus each child's value per date.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Breakdown<V> {
    pub time_series: TimeSeries<V>,
    #[serde(flatten)]
    pub daily: TimeSeries<BTreeMap<GeoCode, V>>,
}

/// Both mobility signals of one code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MobilitySeries {
    pub m50: TimeSeries<f64>,
    pub m50_index: TimeSeries<f64>,
}

/// Testing statistics of one state, or of the nation with per-state values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestingRollup {
    pub settled_cases: Breakdown<i64>,
    pub positive_rate: Breakdown<f64>,
    pub pending_cases: Breakdown<i64>,
}

/// Total votes under `"v"` plus one entry per candidate.
pub type Votes = BTreeMap<String, i64>;

pub fn merge_votes(into: &mut Votes, from: &Votes) {
    for (key, count) in from {
        *into.entry(key.clone()).or_insert(0) += count;
    }
}

/// Votes summed over a unit, next to each child's votes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VotesRollup {
    #[serde(flatten)]
    pub totals: Votes,
    #[serde(flatten)]
    pub children: BTreeMap<GeoCode, Votes>,
}

/// Exported county document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct County {
    #[serde(flatten)]
    pub unit: GeoUnit,
    pub population: u64,
    #[serde(default)]
    pub hash: Option<u32>,
    #[serde(flatten)]
    pub cases: ByCase<TimeSeries<i64>>,
    /// The m50 index series, the signal shown on maps.
    #[serde(default)]
    pub mobility: TimeSeries<f64>,
    #[serde(default)]
    pub m50: TimeSeries<f64>,
    #[serde(rename = "votes2016", default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<Votes>,
}

/// Exported state or nation document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rollup {
    #[serde(flatten)]
    pub unit: GeoUnit,
    #[serde(flatten)]
    pub cases: ByCase<CaseRollup>,
    pub mobility: Breakdown<f64>,
    pub m50: TimeSeries<f64>,
    /// Sum over the children. Documents carry the per-child map instead.
    #[serde(skip)]
    pub population: u64,
    #[serde(rename = "population")]
    pub populations: BTreeMap<GeoCode, u64>,
    pub names: BTreeMap<GeoCode, String>,
    /// Name hash to the child that carries the name.
    pub hashes: BTreeMap<u32, GeoCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testing: Option<TestingRollup>,
    #[serde(rename = "votes2016", skip_serializing_if = "Option::is_none")]
    pub votes: Option<VotesRollup>,
}

impl Rollup {
    pub fn new(code: GeoCode, name: impl Into<String>, date_range: DateRange) -> Self {
        Self {
            unit: GeoUnit::new(code, name, date_range),
            cases: ByCase::default(),
            mobility: Breakdown::default(),
            m50: TimeSeries::new(),
            population: 0,
            populations: BTreeMap::new(),
            names: BTreeMap::new(),
            hashes: BTreeMap::new(),
            testing: None,
            votes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub rollup: Rollup,
    pub counties: BTreeMap<GeoCode, County>,
}

/// The full meshed dataset of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTree {
    pub nation: Rollup,
    pub states: BTreeMap<GeoCode, State>,
}

impl GeoTree {
    pub fn new(date_range: DateRange) -> Self {
        Self {
            nation: Rollup::new(GeoCode::nation(), "United States", date_range),
            states: BTreeMap::new(),
        }
    }

    pub fn county(&self, code: &GeoCode) -> Option<&County> {
        self.states.get(&code.state_code()?)?.counties.get(code)
    }

    pub fn county_count(&self) -> usize {
        self.states.values().map(|s| s.counties.len()).sum()
    }
}
