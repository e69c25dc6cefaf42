//! Date labels as used by the sources and the exported documents.
//!
//! The case/death source and every produced document key their series by
//! a `m/d/yy` label without zero padding (`3/1/20`). The testing source uses
//! `YYYYMMDD` and the mobility source `YYYY-MM-DD`.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{MeshError, MeshResult};

/// Format a date as a `m/d/yy` label.
pub fn to_label(date: NaiveDate) -> String {
    format!("{}/{}/{:02}", date.month(), date.day(), date.year().rem_euclid(100))
}

/// Parse a `m/d/yy` label. Two digit years are taken as 20yy.
pub fn from_label(label: &str) -> MeshResult<NaiveDate> {
    let label = label.trim();
    let two_digit_year = label.rsplit_once('/').is_some_and(|(_, yy)| yy.len() == 2);
    if !two_digit_year {
        return Err(MeshError::InvalidDate(label.to_string()));
    }
    NaiveDate::parse_from_str(label, "%m/%d/%y")
        .map_err(|_| MeshError::InvalidDate(label.to_string()))
}

/// Parse a `YYYYMMDD` date.
pub fn from_yyyymmdd(value: &str) -> MeshResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d")
        .map_err(|_| MeshError::InvalidDate(value.to_string()))
}

/// Parse a `YYYY-MM-DD` date.
pub fn from_iso(value: &str) -> MeshResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| MeshError::InvalidDate(value.to_string()))
}

pub fn serialize_label<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&to_label(*date))
}

pub fn deserialize_label<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let label = String::deserialize(deserializer)?;
    from_label(&label).map_err(serde::de::Error::custom)
}

/// Inclusive range of days, `least_recent..=most_recent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(
        rename = "least_recent_date",
        serialize_with = "serialize_label",
        deserialize_with = "deserialize_label"
    )]
    pub least_recent: NaiveDate,
    #[serde(
        rename = "most_recent_date",
        serialize_with = "serialize_label",
        deserialize_with = "deserialize_label"
    )]
    pub most_recent: NaiveDate,
}

impl DateRange {
    pub fn new(least_recent: NaiveDate, most_recent: NaiveDate) -> MeshResult<Self> {
        if least_recent > most_recent {
            return Err(MeshError::InvalidDate(format!(
                "range {} to {} is reversed",
                to_label(least_recent),
                to_label(most_recent)
            )));
        }
        Ok(Self {
            least_recent,
            most_recent,
        })
    }

    /// Every day in the range, oldest first.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.most_recent;
        self.least_recent.iter_days().take_while(move |d| *d <= end)
    }

    pub fn len(&self) -> usize {
        (self.most_recent - self.least_recent).num_days() as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.least_recent <= date && date <= self.most_recent
    }

    /// The same range pushed `days` days into the future.
    pub fn extended(&self, days: u32) -> Self {
        Self {
            least_recent: self.least_recent,
            most_recent: self
                .most_recent
                .checked_add_days(Days::new(days.into()))
                .unwrap_or(NaiveDate::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn labels_are_unpadded() {
        assert_eq!(to_label(date(2020, 3, 1)), "3/1/20");
        assert_eq!(to_label(date(2021, 12, 25)), "12/25/21");
        assert_eq!(to_label(date(2005, 1, 9)), "1/9/05");
    }

    #[test]
    fn labels_parse_back() {
        assert_eq!(from_label("2/29/20").unwrap(), date(2020, 2, 29));
        assert_eq!(from_label("12/31/20").unwrap(), date(2020, 12, 31));
        assert!(from_label("2/30/20").is_err());
        assert!(from_label("Population").is_err());
        assert!(from_label("1/22/2020").is_err());
        assert!(from_label("3/1").is_err());
        assert_eq!(from_label(" 03/01/20 ").unwrap(), date(2020, 3, 1));
    }

    #[test]
    fn other_source_formats() {
        assert_eq!(to_label(from_yyyymmdd("20200301").unwrap()), "3/1/20");
        assert_eq!(to_label(from_iso("2020-03-01").unwrap()), "3/1/20");
        assert!(from_yyyymmdd("2020-03-01").is_err());
    }

    #[test]
    fn range_covers_leap_day() {
        let range = DateRange::new(date(2020, 2, 28), date(2020, 3, 1)).unwrap();
        let labels: Vec<String> = range.days().map(to_label).collect();
        assert_eq!(labels, vec!["2/28/20", "2/29/20", "3/1/20"]);
        assert_eq!(range.len(), 3);
    }

    #[test]
    fn extended_range() {
        let range = DateRange::new(date(2020, 3, 1), date(2020, 3, 5)).unwrap();
        let extended = range.extended(2);
        assert_eq!(extended.most_recent, date(2020, 3, 7));
        assert_eq!(extended.len(), 7);
        assert!(DateRange::new(date(2020, 3, 5), date(2020, 3, 1)).is_err());
    }
}
