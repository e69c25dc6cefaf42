use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::regions::RegionDefinition;

/// Number of days past the most recent date that sparse signals are held
/// flat for.
pub const DEFAULT_DAYS_TO_PREDICT: u32 = 14;

/// New York County population. The case/death source reports the whole
/// city's population under this county.
pub const NEW_YORK_COUNTY_POPULATION: u64 = 1_628_706;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub days_to_predict: u32,
    pub sources: SourcePaths,
    pub include_testing: bool,
    pub include_votes: bool,
    /// Exact combined-key text to code, for lines without a usable code.
    pub key_overrides: BTreeMap<String, String>,
    /// Code to population, replacing the population reported by the source.
    pub population_overrides: BTreeMap<String, u64>,
    /// Region code to its definition.
    pub regions: BTreeMap<String, RegionDefinition>,
}

/// Paths of every source, relative to `Config::source_dir`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SourcePaths {
    pub confirmed: PathBuf,
    pub deaths: PathBuf,
    pub mobility: PathBuf,
    pub testing: PathBuf,
    pub votes: PathBuf,
}

impl Default for SourcePaths {
    fn default() -> Self {
        let jhu = PathBuf::from("COVID-19/csse_covid_19_data/csse_covid_19_time_series");
        SourcePaths {
            confirmed: jhu.join("time_series_covid19_confirmed_US.csv"),
            deaths: jhu.join("time_series_covid19_deaths_US.csv"),
            mobility: "DL-COVID-19/DL-us-mobility.ndjson".into(),
            testing: "covid-tracking-data/data/states_daily_4pm_et.csv".into(),
            votes: "2016-election-county-results/counties.csv".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_dir: "../covid-data-sources".into(),
            target_dir: "./data/covid".into(),
            days_to_predict: DEFAULT_DAYS_TO_PREDICT,
            sources: SourcePaths::default(),
            include_testing: true,
            include_votes: true,
            key_overrides: default_key_overrides(),
            population_overrides: BTreeMap::from([(
                "36061".to_string(),
                NEW_YORK_COUNTY_POPULATION,
            )]),
            regions: crate::regions::default_regions(),
        }
    }
}

impl Config {
    pub fn source_path(&self, relative: &std::path::Path) -> PathBuf {
        self.source_dir.join(relative)
    }
}

fn default_key_overrides() -> BTreeMap<String, String> {
    [
        // Dukes and Nantucket are reported together
        ("Dukes and Nantucket,Massachusetts,US", "25555"),
        // Cass, Clay, Jackson and Platte
        ("Kansas City,Missouri,US", "29555"),
        ("Michigan Department of Corrections (MDOC), Michigan, US", "26555"),
        ("Federal Correctional Institution (FCI), Michigan, US", "26556"),
        // Utah local health districts
        ("Bear River, Utah, US", "49555"),
        ("Central Utah, Utah, US", "49556"),
        ("Southeast Utah, Utah, US", "49557"),
        ("Southwest Utah, Utah, US", "49558"),
        ("Weber-Morgan, Utah, US", "49559"),
        ("TriCounty, Utah, US", "49560"),
    ]
    .into_iter()
    .map(|(key, code)| (key.to_string(), code.to_string()))
    .collect()
}
