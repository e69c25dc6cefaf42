//! Attaches the secondary signals to an aggregated tree.
//!
//! Each stage writes its own fields only: mobility writes `mobility` and
//! `m50`, testing writes `testing` and votes writes `votes`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::{debug, info};

use crate::averager::weighted_national_average;
use crate::dates::DateRange;
use crate::gap_fill::fill_gaps;
use crate::geo::GeoCode;
use crate::model::{merge_votes, Breakdown, GeoTree, MobilitySeries, TestingRollup, VotesRollup};
use crate::sources::testing::positive_rate;
use crate::sources::{MobilityData, TestingData, VotesData};
use crate::summary::RunSummary;
use crate::timeseries::TimeSeries;

/// Dense mobility of one code over the history plus the prediction window.
fn patch(series: &MobilitySeries, range: &DateRange, days_to_predict: u32) -> MobilitySeries {
    MobilitySeries {
        m50: fill_gaps(&series.m50, range, days_to_predict),
        m50_index: fill_gaps(&series.m50_index, range, days_to_predict),
    }
}

fn record_child<V: Clone>(
    daily: &mut TimeSeries<BTreeMap<GeoCode, V>>,
    child: &GeoCode,
    series: &TimeSeries<V>,
) {
    for (date, value) in series {
        daily
            .entry(*date)
            .or_default()
            .insert(child.clone(), value.clone());
    }
}

/// Writes `mobility` and `m50` of every unit.
///
/// The nation gets the population weighted average of the 50 states and DC;
/// territories keep their own series only. Counties without their own
/// series use their state's.
pub fn add_mobility(
    tree: &mut GeoTree,
    data: &MobilityData,
    days_to_predict: u32,
    summary: &mut RunSummary,
) {
    let range = tree.nation.unit.date_range;
    let populations = &tree.nation.populations;
    let state_series = |pick: fn(&MobilitySeries) -> &TimeSeries<f64>| {
        tree.states
            .keys()
            .filter(|code| code.is_real_state())
            .filter_map(|code| Some((code.clone(), pick(data.series.get(code)?).clone())))
            .collect::<BTreeMap<_, _>>()
    };
    let national = MobilitySeries {
        m50: weighted_national_average(&state_series(|s| &s.m50), populations),
        m50_index: weighted_national_average(&state_series(|s| &s.m50_index), populations),
    };
    let national = patch(&national, &range, days_to_predict);
    if national.m50_index.is_empty() {
        summary.empty_mobility.push(GeoCode::nation());
    }
    tree.nation.mobility.time_series = national.m50_index;
    tree.nation.m50 = national.m50;

    for (state_code, state) in tree.states.iter_mut() {
        let raw_state = data.series.get(state_code);
        let patched = raw_state.map(|s| patch(s, &range, days_to_predict));
        match &patched {
            Some(patched) if !patched.m50_index.is_empty() => {
                record_child(&mut tree.nation.mobility.daily, state_code, &patched.m50_index);
                state.rollup.mobility.time_series = patched.m50_index.clone();
                state.rollup.m50 = patched.m50.clone();
            }
            _ => summary.empty_mobility.push(state_code.clone()),
        }

        for (county_code, county) in state.counties.iter_mut() {
            let patched_county = match data.series.get(county_code) {
                Some(own) => patch(own, &range, days_to_predict),
                None => match &patched {
                    Some(patched) => patched.clone(),
                    None => continue,
                },
            };
            if patched_county.m50_index.is_empty() {
                summary.empty_mobility.push(county_code.clone());
                continue;
            }
            record_child(
                &mut state.rollup.mobility.daily,
                county_code,
                &patched_county.m50_index,
            );
            county.mobility = patched_county.m50_index;
            county.m50 = patched_county.m50;
        }
    }
    info!(
        "Attached mobility, {} code(s) without any",
        summary.empty_mobility.len()
    );
}

/// Writes `testing` of the states and the nation. The nation sums the
/// states and keeps each state's value per date.
pub fn add_testing(tree: &mut GeoTree, data: &TestingData) {
    let mut nation = TestingRollup::default();
    let mut positive: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for (code, series) in &data.states {
        let Some(state) = tree.states.get_mut(code) else {
            debug!("No cases for state {code}, dropping its testing data");
            continue;
        };
        state.rollup.testing = Some(TestingRollup {
            settled_cases: Breakdown {
                time_series: series.settled_cases.clone(),
                daily: TimeSeries::new(),
            },
            positive_rate: Breakdown {
                time_series: series.positive_rate.clone(),
                daily: TimeSeries::new(),
            },
            pending_cases: Breakdown {
                time_series: series.pending_cases.clone(),
                daily: TimeSeries::new(),
            },
        });

        record_child(&mut nation.settled_cases.daily, code, &series.settled_cases);
        record_child(&mut nation.positive_rate.daily, code, &series.positive_rate);
        record_child(&mut nation.pending_cases.daily, code, &series.pending_cases);
        for (date, settled) in &series.settled_cases {
            *nation.settled_cases.time_series.entry(*date).or_insert(0) += settled;
        }
        for (date, pending) in &series.pending_cases {
            *nation.pending_cases.time_series.entry(*date).or_insert(0) += pending;
        }
        for (date, count) in &series.positive_cases {
            *positive.entry(*date).or_insert(0) += count;
        }
    }
    nation.positive_rate.time_series = nation
        .settled_cases
        .time_series
        .iter()
        .map(|(date, settled)| {
            let positive = positive.get(date).copied().unwrap_or(0);
            (*date, positive_rate(positive, *settled))
        })
        .collect();
    tree.nation.testing = Some(nation);
}

/// Writes `votes` of counties, states and the nation.
pub fn add_votes(tree: &mut GeoTree, data: &VotesData) {
    let mut nation = VotesRollup::default();
    for (code, votes) in &data.counties {
        let Some(state_code) = code.state_code() else {
            continue;
        };
        merge_votes(&mut nation.totals, votes);
        merge_votes(nation.children.entry(state_code.clone()).or_default(), votes);

        let Some(state) = tree.states.get_mut(&state_code) else {
            debug!("No cases for state {state_code}, votes of {code} only count nationally");
            continue;
        };
        let state_votes = state.rollup.votes.get_or_insert_with(VotesRollup::default);
        merge_votes(&mut state_votes.totals, votes);
        merge_votes(state_votes.children.entry(code.clone()).or_default(), votes);
        match state.counties.get_mut(code) {
            Some(county) => merge_votes(county.votes.get_or_insert_with(Default::default), votes),
            None => debug!("No county {code} in the tree for its votes"),
        }
    }
    tree.nation.votes = Some(nation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::build_tree;
    use crate::model::{ByCase, CountyRecord, Votes};
    use crate::sources::TestingSeries;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
    }

    fn code(s: &str) -> GeoCode {
        s.parse().unwrap()
    }

    fn record(c: &str, population: u64) -> CountyRecord {
        let zeros: TimeSeries<i64> = [(date(1), 0), (date(2), 0)].into_iter().collect();
        CountyRecord {
            code: code(c),
            name: format!("County {c}"),
            state_name: format!("State {}", &c[..2]),
            combined_key: c.to_string(),
            population,
            cases: ByCase {
                confirmed: zeros.clone(),
                deaths: zeros,
            },
        }
    }

    fn tree() -> GeoTree {
        let records = vec![
            record("01001", 100),
            record("01003", 100),
            record("02013", 300),
        ];
        let mut summary = RunSummary::default();
        build_tree(DateRange::new(date(1), date(2)).unwrap(), records, &mut summary)
    }

    fn mobility(points: &[(u32, f64)]) -> MobilitySeries {
        let series: TimeSeries<f64> = points.iter().map(|(d, v)| (date(*d), *v)).collect();
        MobilitySeries {
            m50: series.clone(),
            m50_index: series,
        }
    }

    #[test]
    fn mobility_falls_back_to_the_state() {
        let mut tree = tree();
        let data = MobilityData {
            series: BTreeMap::from([
                (code("01"), mobility(&[(1, 10.0)])),
                (code("02"), mobility(&[(1, 20.0), (2, 30.0)])),
                (code("01003"), mobility(&[(2, 4.0)])),
            ]),
            report: Default::default(),
        };
        let mut summary = RunSummary::default();
        add_mobility(&mut tree, &data, 1, &mut summary);
        assert!(summary.empty_mobility.is_empty());

        let values = |s: &TimeSeries<f64>| s.values().copied().collect::<Vec<_>>();
        // (10 * 200 + 20 * 300) / 500 on the first day
        assert_eq!(values(&tree.nation.mobility.time_series), vec![16.0, 30.0, 30.0]);
        assert_eq!(values(&tree.county(&code("01001")).unwrap().mobility), vec![10.0, 10.0, 10.0]);
        assert_eq!(values(&tree.county(&code("01003")).unwrap().m50), vec![4.0, 4.0, 4.0]);

        let alabama = &tree.states[&code("01")].rollup;
        assert_eq!(alabama.mobility.daily.get(&date(3)).unwrap()[&code("01003")], 4.0);
        assert_eq!(tree.nation.mobility.daily.get(&date(2)).unwrap()[&code("02")], 30.0);
    }

    #[test]
    fn territories_stay_out_of_the_national_average() {
        let mut records = vec![record("01001", 100), record("72001", 900)];
        records[1].state_name = "Puerto Rico".to_string();
        let mut summary = RunSummary::default();
        let mut tree = build_tree(DateRange::new(date(1), date(1)).unwrap(), records, &mut summary);
        let data = MobilityData {
            series: BTreeMap::from([
                (code("01"), mobility(&[(1, 10.0)])),
                (code("72"), mobility(&[(1, 90.0)])),
            ]),
            report: Default::default(),
        };
        add_mobility(&mut tree, &data, 0, &mut summary);
        assert_eq!(tree.nation.mobility.time_series.get(&date(1)), Some(&10.0));
        assert_eq!(tree.states[&code("72")].rollup.mobility.time_series.get(&date(1)), Some(&90.0));
    }

    #[test]
    fn missing_mobility_is_reported() {
        let mut tree = tree();
        let data = MobilityData {
            series: BTreeMap::from([(code("02"), mobility(&[(1, 20.0)]))]),
            report: Default::default(),
        };
        let mut summary = RunSummary::default();
        add_mobility(&mut tree, &data, 0, &mut summary);
        assert_eq!(summary.empty_mobility, vec![code("01")]);
        assert!(tree.county(&code("01001")).unwrap().mobility.is_empty());
        assert_eq!(tree.county(&code("02013")).unwrap().mobility.len(), 2);
    }

    #[test]
    fn testing_rolls_up_to_the_nation() {
        let mut tree = tree();
        let series = |settled: i64, positive: i64| TestingSeries {
            settled_cases: [(date(1), settled)].into_iter().collect(),
            positive_rate: [(date(1), positive_rate(positive, settled))].into_iter().collect(),
            pending_cases: [(date(1), 1)].into_iter().collect(),
            positive_cases: [(date(1), positive)].into_iter().collect(),
        };
        let data = TestingData {
            states: BTreeMap::from([
                (code("01"), series(10, 1)),
                (code("02"), series(30, 9)),
                (code("66"), series(5, 5)),
            ]),
            report: Default::default(),
        };
        add_testing(&mut tree, &data);
        let nation = tree.nation.testing.as_ref().unwrap();
        assert_eq!(nation.settled_cases.time_series.get(&date(1)), Some(&40));
        assert_eq!(nation.pending_cases.time_series.get(&date(1)), Some(&2));
        assert_eq!(nation.positive_rate.time_series.get(&date(1)), Some(&25.0));
        assert_eq!(nation.positive_rate.daily.get(&date(1)).unwrap()[&code("02")], 30.0);
        let alabama = tree.states[&code("01")].rollup.testing.as_ref().unwrap();
        assert_eq!(alabama.positive_rate.time_series.get(&date(1)), Some(&10.0));
    }

    #[test]
    fn votes_merge_at_every_level() {
        let mut tree = tree();
        let votes = |total: i64, trump: i64| -> Votes {
            [("v".to_string(), total), ("Trump".to_string(), trump)].into()
        };
        let data = VotesData {
            counties: BTreeMap::from([
                (code("01001"), votes(10, 7)),
                (code("01003"), votes(20, 15)),
                (code("02013"), votes(5, 2)),
            ]),
            report: Default::default(),
        };
        add_votes(&mut tree, &data);
        let nation = tree.nation.votes.as_ref().unwrap();
        assert_eq!(nation.totals["v"], 35);
        assert_eq!(nation.children[&code("01")]["Trump"], 22);
        let alabama = tree.states[&code("01")].rollup.votes.as_ref().unwrap();
        assert_eq!(alabama.totals["v"], 30);
        assert_eq!(alabama.children[&code("01003")]["v"], 20);
        assert_eq!(tree.county(&code("02013")).unwrap().votes.as_ref().unwrap()["Trump"], 2);
    }
}
