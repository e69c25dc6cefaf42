//! Geographic codes for the three levels of the tree.
//!
//! A code's length determines its level: `"0"` is the nation, two digits a
//! state (or territory) and five digits a county. County codes are the state
//! code followed by a three digit county part.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::MeshError;

pub const NATION_CODE: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum GeoLevel {
    Nation,
    State,
    County,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GeoCode(String);

impl GeoCode {
    pub fn nation() -> Self {
        Self(NATION_CODE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn level(&self) -> GeoLevel {
        match self.0.len() {
            1 => GeoLevel::Nation,
            2 => GeoLevel::State,
            _ => GeoLevel::County,
        }
    }

    pub fn is_nation(&self) -> bool {
        self.level() == GeoLevel::Nation
    }

    pub fn is_state(&self) -> bool {
        self.level() == GeoLevel::State
    }

    pub fn is_county(&self) -> bool {
        self.level() == GeoLevel::County
    }

    /// The code one level up: county → state → nation.
    pub fn parent(&self) -> Option<GeoCode> {
        match self.level() {
            GeoLevel::Nation => None,
            GeoLevel::State => Some(Self::nation()),
            GeoLevel::County => Some(Self(self.0[..2].to_string())),
        }
    }

    /// The state a county belongs to, or the state itself.
    pub fn state_code(&self) -> Option<GeoCode> {
        match self.level() {
            GeoLevel::Nation => None,
            GeoLevel::State => Some(self.clone()),
            GeoLevel::County => self.parent(),
        }
    }

    /// Three digit county part of a county code.
    pub fn county_part(&self) -> Option<&str> {
        self.is_county().then(|| &self.0[2..])
    }

    /// Placeholder counties that do not correspond to a real county:
    /// out-of-state (`800`), unassigned (`900`), cruise ships (`888`, `999`)
    /// and made up health districts and facilities (`555`-`599`).
    pub fn is_synthetic(&self) -> bool {
        let Some(part) = self.county_part() else {
            return false;
        };
        match part {
            "800" | "900" | "888" | "999" => true,
            _ => part
                .parse::<u16>()
                .map(|n| (555..600).contains(&n))
                .unwrap_or(false),
        }
    }

    /// One of the 50 states or DC, as opposed to territories and the
    /// cruise-ship pseudo states.
    pub fn is_real_state(&self) -> bool {
        self.is_state() && real_states().any(|s| s == *self)
    }
}

impl fmt::Display for GeoCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GeoCode {
    type Err = MeshError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let valid = match value.len() {
            1 => value == NATION_CODE,
            2 | 5 => value.bytes().all(|b| b.is_ascii_digit()),
            _ => false,
        };
        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(MeshError::InvalidGeoCode(value.to_string()))
        }
    }
}

impl TryFrom<String> for GeoCode {
    type Error = MeshError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GeoCode> for String {
    fn from(value: GeoCode) -> Self {
        value.0
    }
}

/// Postal abbreviations to state codes, territories included.
pub const STATE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("AK", "02"),
    ("AL", "01"),
    ("AR", "05"),
    ("AS", "60"),
    ("AZ", "04"),
    ("CA", "06"),
    ("CO", "08"),
    ("CT", "09"),
    ("DC", "11"),
    ("DE", "10"),
    ("FL", "12"),
    ("GA", "13"),
    ("GU", "66"),
    ("HI", "15"),
    ("IA", "19"),
    ("ID", "16"),
    ("IL", "17"),
    ("IN", "18"),
    ("KS", "20"),
    ("KY", "21"),
    ("LA", "22"),
    ("MA", "25"),
    ("MD", "24"),
    ("ME", "23"),
    ("MI", "26"),
    ("MN", "27"),
    ("MO", "29"),
    ("MP", "69"),
    ("MS", "28"),
    ("MT", "30"),
    ("NC", "37"),
    ("ND", "38"),
    ("NE", "31"),
    ("NH", "33"),
    ("NJ", "34"),
    ("NM", "35"),
    ("NV", "32"),
    ("NY", "36"),
    ("OH", "39"),
    ("OK", "40"),
    ("OR", "41"),
    ("PA", "42"),
    ("PR", "72"),
    ("RI", "44"),
    ("SC", "45"),
    ("SD", "46"),
    ("TN", "47"),
    ("TX", "48"),
    ("UT", "49"),
    ("VA", "51"),
    ("VI", "78"),
    ("VT", "50"),
    ("WA", "53"),
    ("WI", "55"),
    ("WV", "54"),
    ("WY", "56"),
];

/// Territories reported without county breakdown.
pub const TERRITORY_CODES: &[&str] = &["60", "66", "69", "72", "78"];

pub fn state_code_for_abbreviation(abbreviation: &str) -> Option<GeoCode> {
    let abbreviation = abbreviation.trim();
    STATE_ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| abbr.eq_ignore_ascii_case(abbreviation))
        .map(|(_, code)| GeoCode(code.to_string()))
}

/// The 50 states and DC in code order. Codes 03, 07, 14, 43 and 52 are
/// unassigned.
pub fn real_states() -> impl Iterator<Item = GeoCode> {
    (1..=56u8)
        .filter(|n| ![3, 7, 14, 43, 52].contains(n))
        .map(|n| GeoCode(format!("{n:02}")))
}
