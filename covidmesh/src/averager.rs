//! Population weighted national average of per-state signals.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::geo::GeoCode;
use crate::timeseries::TimeSeries;

/// Per date `round(Σ value * pop / Σ pop)` over the states that have a value
/// on that date. States without population carry no weight.
pub fn weighted_national_average(
    states: &BTreeMap<GeoCode, TimeSeries<f64>>,
    populations: &BTreeMap<GeoCode, u64>,
) -> TimeSeries<f64> {
    let mut sums: BTreeMap<NaiveDate, (f64, u64)> = BTreeMap::new();
    for (code, series) in states {
        let population = populations.get(code).copied().unwrap_or(0);
        if population == 0 {
            continue;
        }
        for (date, value) in series {
            let (weighted, total) = sums.entry(*date).or_insert((0.0, 0));
            *weighted += value * population as f64;
            *total += population;
        }
    }
    sums.into_iter()
        .map(|(date, (weighted, total))| (date, (weighted / total as f64).round()))
        .collect()
}
