//! Turns sparse daily signals into dense ones.

use log::warn;

use crate::dates::{self, DateRange};
use crate::timeseries::TimeSeries;

/// Fill every day of `range`, then hold the last value for `extension` more
/// days.
///
/// Leading gaps take the first value in range, later gaps the most recent
/// value seen before them. Values outside `range` are dropped. A series with
/// nothing in range comes back empty.
pub fn fill_gaps<V: Clone>(
    series: &TimeSeries<V>,
    range: &DateRange,
    extension: u32,
) -> TimeSeries<V> {
    let Some(first) = range.days().find_map(|d| series.get(&d)) else {
        warn!(
            "No value between {} and {}, nothing to fill",
            dates::to_label(range.least_recent),
            dates::to_label(range.most_recent)
        );
        return TimeSeries::new();
    };

    let mut last = first.clone();
    let mut filled = TimeSeries::new();
    for date in range.days() {
        if let Some(value) = series.get(&date) {
            last = value.clone();
        }
        filled.insert(date, last.clone());
    }
    for date in range.extended(extension).days().skip(range.len()) {
        filled.insert(date, last.clone());
    }
    filled
}
