//! Rolls county records up into states and the nation.

use std::collections::btree_map::Entry;

use log::{debug, info, warn};

use crate::dates::DateRange;
use crate::geo::GeoCode;
use crate::model::{
    ByCase, CaseRollup, CaseType, County, CountyRecord, DailyCaseRecord, GeoTree, GeoUnit, Rollup,
    State,
};
use crate::summary::RunSummary;
use crate::timeseries::TimeSeries;

const HASH_MODULUS: u64 = 9_999_999;

/// Seven digit hash of a county name, used by clients to look counties up
/// by name. Short names and out-of-state placeholders get none.
pub fn name_hash(name: &str) -> Option<u32> {
    if name.chars().count() <= 2 || name.starts_with("Out of ") {
        return None;
    }
    let hash = name
        .to_lowercase()
        .chars()
        .fold(1u64, |hash, c| (hash * u64::from(c)) % HASH_MODULUS);
    u32::try_from(hash).ok()
}

/// Cases per million, rounded down. `None` without population.
pub fn per_capita(count: i64, population: u64) -> Option<i64> {
    if population == 0 {
        return None;
    }
    let rate = (i128::from(count) * 1_000_000).div_euclid(i128::from(population));
    i64::try_from(rate).ok()
}

/// Build the tree from the redistributed case records.
pub fn build_tree(
    date_range: DateRange,
    records: Vec<CountyRecord>,
    summary: &mut RunSummary,
) -> GeoTree {
    let mut tree = GeoTree::new(date_range);
    for record in records {
        add_county(&mut tree, record, summary);
    }
    for state in tree.states.values_mut() {
        roll_up_state(state, summary);
    }
    roll_up_nation(&mut tree, summary);
    summary.counties = tree.county_count();
    summary.states = tree.states.len();
    info!(
        "Aggregated {} counties into {} states",
        summary.counties, summary.states
    );
    tree
}

fn add_county(tree: &mut GeoTree, record: CountyRecord, summary: &mut RunSummary) {
    let Some(state_code) = record.code.state_code() else {
        return;
    };
    let date_range = tree.nation.unit.date_range;
    let state = tree.states.entry(state_code.clone()).or_insert_with(|| State {
        rollup: Rollup::new(state_code.clone(), record.state_name.clone(), date_range),
        counties: Default::default(),
    });
    if state.counties.contains_key(&record.code) {
        warn!(
            "Duplicate line for {} ('{}'), keeping the first",
            record.code, record.combined_key
        );
        return;
    }

    let hash = name_hash(&record.name);
    let rollup = &mut state.rollup;
    rollup.population += record.population;
    rollup.populations.insert(record.code.clone(), record.population);
    rollup.names.insert(record.code.clone(), record.name.clone());
    if let Some(hash) = hash {
        match rollup.hashes.entry(hash) {
            Entry::Occupied(mut existing) => {
                let other = existing.get().clone();
                if rollup.names.get(&other) != Some(&record.name) {
                    warn!("Hash conflict between {other} and {}", record.code);
                    summary.name_hash_collisions.push((other, record.code.clone()));
                }
                existing.insert(record.code.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(record.code.clone());
            }
        }
    }

    let nation = &mut tree.nation;
    nation.population += record.population;
    *nation.populations.entry(state_code.clone()).or_insert(0) += record.population;
    nation
        .names
        .entry(state_code)
        .or_insert_with(|| record.state_name.clone());

    let unit = GeoUnit::new(record.code.clone(), record.name, date_range);
    state.counties.insert(
        record.code,
        County {
            unit,
            population: record.population,
            hash,
            cases: record.cases,
            mobility: TimeSeries::new(),
            m50: TimeSeries::new(),
            votes: None,
        },
    );
}

/// Sum `children` into one rollup per date, tracking extrema over the
/// children for which `ranked` holds.
fn roll_up<'a>(
    date_range: &DateRange,
    children: impl Iterator<Item = (&'a GeoCode, &'a TimeSeries<i64>, u64)> + Clone,
    ranked: impl Fn(&GeoCode) -> bool,
    summary: &mut RunSummary,
) -> CaseRollup {
    let mut rollup = CaseRollup::default();
    for date in date_range.days() {
        let mut total = 0;
        let mut daily = DailyCaseRecord::default();
        for (code, series, population) in children.clone() {
            let count = series.get(&date).copied().unwrap_or(0);
            total += count;
            daily.children.insert(code.clone(), count);
            if !ranked(code) {
                continue;
            }
            daily.observe_cases(count);
            match per_capita(count, population) {
                Some(rate) => daily.observe_per_capita(rate),
                None => {
                    debug!("No population for {code}, leaving it out of per-capita extrema");
                    summary.zero_population_skips += 1;
                }
            }
        }
        rollup.time_series.insert(date, total);
        rollup.daily.insert(date, daily);
    }
    rollup
}

fn roll_up_state(state: &mut State, summary: &mut RunSummary) {
    let date_range = state.rollup.unit.date_range;
    let counties = &state.counties;
    let cases = ByCase::from_fn(|case_type| {
        let children = counties
            .values()
            .map(move |c| (&c.unit.code, &c.cases[case_type], c.population));
        roll_up(&date_range, children, |code| !code.is_synthetic(), summary)
    });
    state.rollup.cases = cases;
}

fn roll_up_nation(tree: &mut GeoTree, summary: &mut RunSummary) {
    let date_range = tree.nation.unit.date_range;
    let states = &tree.states;
    let populations = &tree.nation.populations;
    let cases = ByCase::from_fn(|case_type: CaseType| {
        let children = states.iter().map(move |(code, state)| {
            (
                code,
                &state.rollup.cases[case_type].time_series,
                populations.get(code).copied().unwrap_or(0),
            )
        });
        roll_up(&date_range, children, GeoCode::is_real_state, summary)
    });
    tree.nation.cases = cases;
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
    }

    fn code(s: &str) -> GeoCode {
        s.parse().unwrap()
    }

    fn record(c: &str, name: &str, state: &str, population: u64, confirmed: &[i64]) -> CountyRecord {
        let series = |values: &[i64]| -> TimeSeries<i64> {
            values
                .iter()
                .enumerate()
                .map(|(i, v)| (date(i as u32 + 1), *v))
                .collect()
        };
        CountyRecord {
            code: code(c),
            name: name.to_string(),
            state_name: state.to_string(),
            combined_key: format!("{name}, {state}, US"),
            population,
            cases: ByCase {
                confirmed: series(confirmed),
                deaths: series(&vec![0; confirmed.len()]),
            },
        }
    }

    fn tree(summary: &mut RunSummary) -> GeoTree {
        let records = vec![
            record("06085", "Santa Clara", "California", 200_000, &[50, 60]),
            record("06001", "Alameda", "California", 100_000, &[10, 20]),
            record("06900", "Unassigned", "California", 0, &[1000, 0]),
            record("36061", "New York", "New York", 1_000_000, &[100, 200]),
            record("72001", "Puerto Rico", "Puerto Rico", 1_000, &[5000, 5000]),
        ];
        build_tree(DateRange::new(date(1), date(2)).unwrap(), records, summary)
    }

    #[test]
    fn hashes() {
        assert_eq!(name_hash("NY"), None);
        assert_eq!(name_hash("Out of AL"), None);
        // 1 * 97 * 98 * 99 mod 9999999
        assert_eq!(name_hash("ABC"), Some(941_094));
        assert_eq!(name_hash("abc"), name_hash("ABC"));
    }

    #[test]
    fn per_capita_rounds_down() {
        assert_eq!(per_capita(50, 200_000), Some(250));
        assert_eq!(per_capita(1, 3), Some(333_333));
        assert_eq!(per_capita(1, 0), None);
    }

    #[test]
    fn states_sum_their_counties() {
        let mut summary = RunSummary::default();
        let tree = tree(&mut summary);
        let california = &tree.states[&code("06")];
        assert_eq!(california.rollup.unit.name, "California");
        assert_eq!(california.rollup.population, 300_000);
        assert_eq!(california.rollup.cases.confirmed.time_series.get(&date(1)), Some(&1060));

        let daily = california.rollup.cases.confirmed.daily.get(&date(1)).unwrap();
        assert_eq!(daily.children[&code("06900")], 1000);
        // the unassigned placeholder is summed but not ranked
        assert_eq!(daily.max_cases, Some(50));
        assert_eq!(daily.min_cases, Some(10));
        assert_eq!(daily.max_per_capita, Some(250));
        assert_eq!(daily.min_per_capita, Some(100));
        assert_eq!(summary.zero_population_skips, 0);
        assert_eq!(summary.counties, 5);
        assert_eq!(summary.states, 3);
    }

    #[test]
    fn nation_ranks_real_states_only() {
        let mut summary = RunSummary::default();
        let tree = tree(&mut summary);
        let nation = &tree.nation;
        assert_eq!(nation.population, 1_301_000);
        assert_eq!(nation.populations[&code("72")], 1_000);
        assert_eq!(nation.names[&code("36")], "New York");
        assert_eq!(nation.cases.confirmed.time_series.get(&date(2)), Some(&5280));
        let daily = nation.cases.confirmed.daily.get(&date(2)).unwrap();
        assert_eq!(daily.children[&code("72")], 5000);
        assert_eq!(daily.max_cases, Some(200));
        assert_eq!(daily.min_cases, Some(80));
    }

    #[test]
    fn counties_keep_their_series() {
        let mut summary = RunSummary::default();
        let tree = tree(&mut summary);
        let county = tree.county(&code("06085")).unwrap();
        assert_eq!(county.unit.parent, Some(code("06")));
        assert_eq!(county.hash, name_hash("Santa Clara"));
        assert_eq!(county.cases.confirmed.get(&date(2)), Some(&60));
        let california = &tree.states[&code("06")];
        assert_eq!(california.rollup.hashes[&name_hash("Alameda").unwrap()], code("06001"));
    }

    #[test]
    fn zero_population_is_counted() {
        let mut summary = RunSummary::default();
        let records = vec![record("01001", "Autauga", "Alabama", 0, &[1])];
        build_tree(DateRange::new(date(1), date(1)).unwrap(), records, &mut summary);
        // once per case type for the county, and again for the state
        assert_eq!(summary.zero_population_skips, 4);
    }
}
