//! Canonicalizes raw source identifiers into [`GeoCode`]s.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::config::Config;
use crate::error::{MeshError, MeshResult};
use crate::geo::{GeoCode, TERRITORY_CODES};

/// Identifier fields of one source line.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawIdentifier<'a> {
    pub fips: &'a str,
    pub combined_key: &'a str,
    pub province_state: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A county, real or synthetic.
    County(GeoCode),
    /// A territory reported as a whole, mapped to its single `xx001`
    /// pseudo-county. The territory name doubles as the county name.
    Territory(GeoCode),
    /// No usable code and no override for this combined key.
    Unresolved(String),
    /// A code that is deliberately dropped.
    Ignored(String),
}

impl Resolution {
    pub fn code(&self) -> Option<&GeoCode> {
        match self {
            Resolution::County(code) | Resolution::Territory(code) => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodeResolver {
    key_overrides: BTreeMap<String, GeoCode>,
    population_overrides: BTreeMap<GeoCode, u64>,
}

impl CodeResolver {
    pub fn from_config(config: &Config) -> MeshResult<Self> {
        let key_overrides = config
            .key_overrides
            .iter()
            .map(|(key, code)| Ok((key.clone(), code.parse::<GeoCode>()?)))
            .collect::<MeshResult<BTreeMap<_, _>>>()?;
        let population_overrides = config
            .population_overrides
            .iter()
            .map(|(code, population)| Ok((code.parse::<GeoCode>()?, *population)))
            .collect::<MeshResult<BTreeMap<_, _>>>()?;
        if let Some((key, code)) = key_overrides.iter().find(|(_, code)| !code.is_county()) {
            return Err(MeshError::InvalidGeoCode(format!(
                "override for '{key}' must be a county code, got {code}"
            )));
        }
        Ok(Self {
            key_overrides,
            population_overrides,
        })
    }

    pub fn resolve(&self, raw: RawIdentifier<'_>) -> Resolution {
        let fips = raw.fips.trim();
        let fips = fips.strip_suffix(".0").unwrap_or(fips);

        if fips.is_empty() || !fips.bytes().all(|b| b.is_ascii_digit()) || fips.len() > 5 {
            return match self.key_overrides.get(raw.combined_key) {
                Some(code) => {
                    debug!("Resolved '{}' through override to {code}", raw.combined_key);
                    Resolution::County(code.clone())
                }
                None => {
                    warn!(
                        "No code found, ignoring '{}' in '{}' (reported code was '{}')",
                        raw.combined_key, raw.province_state, raw.fips
                    );
                    Resolution::Unresolved(raw.combined_key.to_string())
                }
            };
        }

        if TERRITORY_CODES.contains(&fips) {
            return match format!("{fips}001").parse() {
                Ok(code) => Resolution::Territory(code),
                Err(_) => Resolution::Unresolved(raw.combined_key.to_string()),
            };
        }

        let padded = format!("{fips:0>5}");
        if padded.starts_with("000") {
            debug!("Ignoring code {padded} for '{}'", raw.combined_key);
            return Resolution::Ignored(padded);
        }
        let padded = relocate_placeholder(&padded).unwrap_or(padded);
        match padded.parse() {
            Ok(code) => Resolution::County(code),
            Err(_) => Resolution::Unresolved(raw.combined_key.to_string()),
        }
    }

    /// Resolve a bare code field (no combined key available).
    pub fn resolve_code(&self, fips: &str) -> Resolution {
        self.resolve(RawIdentifier {
            fips,
            combined_key: fips,
            province_state: "",
        })
    }

    /// Corrected population for codes whose source population is wrong.
    pub fn population_override(&self, code: &GeoCode) -> Option<u64> {
        self.population_overrides.get(code).copied()
    }

    pub fn key_overrides(&self) -> impl Iterator<Item = (&String, &GeoCode)> {
        self.key_overrides.iter()
    }
}

/// Out-of-state (`800SS`) and unassigned (`900SS`) codes carry the state in
/// the last two digits. Move it to the front so they land in their state.
fn relocate_placeholder(padded: &str) -> Option<String> {
    let (prefix, state) = padded.split_at(3);
    matches!(prefix, "800" | "900").then(|| format!("{state}{prefix}"))
}
