use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::marker::PhantomData;

use chrono::NaiveDate;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::dates::{self, DateRange};

/// A date-indexed series, always iterated oldest first.
///
/// Serialized as a JSON object keyed by `m/d/yy` labels in chronological
/// order (not lexical order, `10/1/20` comes after `9/30/20`).
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries<V>(BTreeMap<NaiveDate, V>);

impl<V> Default for TimeSeries<V> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<V> TimeSeries<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, value: V) -> Option<V> {
        self.0.insert(date, value)
    }

    pub fn get(&self, date: &NaiveDate) -> Option<&V> {
        self.0.get(date)
    }

    pub fn get_mut(&mut self, date: &NaiveDate) -> Option<&mut V> {
        self.0.get_mut(date)
    }

    pub fn entry(&mut self, date: NaiveDate) -> btree_map::Entry<'_, NaiveDate, V> {
        self.0.entry(date)
    }

    pub fn contains(&self, date: &NaiveDate) -> bool {
        self.0.contains_key(date)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, NaiveDate, V> {
        self.0.iter()
    }

    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.0.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<(&NaiveDate, &V)> {
        self.0.first_key_value()
    }

    pub fn last(&self) -> Option<(&NaiveDate, &V)> {
        self.0.last_key_value()
    }

    /// True when there is a value for every day between the first and last
    /// date.
    pub fn is_contiguous(&self) -> bool {
        match (self.first(), self.last()) {
            (Some((first, _)), Some((last, _))) => {
                (*last - *first).num_days() as usize + 1 == self.len()
            }
            _ => true,
        }
    }

    /// True when the series holds exactly one value per day of `range`.
    pub fn covers(&self, range: &DateRange) -> bool {
        self.len() == range.len() && range.days().all(|d| self.contains(&d))
    }
}

impl<V> FromIterator<(NaiveDate, V)> for TimeSeries<V> {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<V> IntoIterator for TimeSeries<V> {
    type Item = (NaiveDate, V);
    type IntoIter = btree_map::IntoIter<NaiveDate, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, V> IntoIterator for &'a TimeSeries<V> {
    type Item = (&'a NaiveDate, &'a V);
    type IntoIter = btree_map::Iter<'a, NaiveDate, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<V: Serialize> Serialize for TimeSeries<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (date, value) in &self.0 {
            map.serialize_entry(&dates::to_label(*date), value)?;
        }
        map.end()
    }
}

struct TimeSeriesVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for TimeSeriesVisitor<V> {
    type Value = TimeSeries<V>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map keyed by m/d/yy date labels")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut series = TimeSeries::new();
        while let Some((label, value)) = access.next_entry::<String, V>()? {
            let date = dates::from_label(&label).map_err(serde::de::Error::custom)?;
            series.insert(date, value);
        }
        Ok(series)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for TimeSeries<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TimeSeriesVisitor(PhantomData))
    }
}
