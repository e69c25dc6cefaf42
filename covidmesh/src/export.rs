//! Writes the tree as one JSON document per unit:
//! `us/0.json`, `us/<SS>.json` and `us/<SS>/<CCC>.json`.
//!
//! Everything is written below `us.staging` first and only moved to `us`
//! once every document is on disk.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::{MeshError, MeshResult};
use crate::geo::GeoCode;
use crate::model::GeoTree;

const COUNTRY_DIR: &str = "us";
const STAGING_DIR: &str = "us.staging";
const PREVIOUS_DIR: &str = "us.previous";

#[derive(Debug, Clone)]
pub struct Exporter {
    root: PathBuf,
}

fn write_json<T: Serialize>(path: &Path, document: &T) -> MeshResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
    document.serialize(&mut serializer)?;
    writer.flush()?;
    Ok(())
}

fn file_name(code: &GeoCode) -> String {
    format!("{}.json", code.county_part().unwrap_or(code.as_str()))
}

impl Exporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the published documents.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(COUNTRY_DIR)
    }

    pub fn document_path(&self, code: &GeoCode) -> PathBuf {
        let dir = self.output_dir();
        match code.state_code() {
            Some(state) if code.is_county() => dir.join(state.as_str()).join(file_name(code)),
            _ => dir.join(file_name(code)),
        }
    }

    fn write_all(&self, tree: &GeoTree, staging: &Path) -> MeshResult<usize> {
        let mut written = 0;
        write_json(&staging.join(file_name(&tree.nation.unit.code)), &tree.nation)?;
        written += 1;
        for (state_code, state) in &tree.states {
            write_json(&staging.join(file_name(state_code)), &state.rollup)?;
            written += 1;
            let state_dir = staging.join(state_code.as_str());
            fs::create_dir_all(&state_dir)?;
            for (county_code, county) in &state.counties {
                write_json(&state_dir.join(file_name(county_code)), county)?;
                written += 1;
            }
            debug!("Wrote {} with {} counties", state_code, state.counties.len());
        }
        Ok(written)
    }

    /// Write every document and publish them. Returns the number of files
    /// written. On error nothing is published.
    pub fn export(&self, tree: &GeoTree) -> MeshResult<usize> {
        let staging = self.root.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        let written = self.write_all(tree, &staging).map_err(|e| {
            MeshError::AnyhowError(anyhow::anyhow!(
                "Failed to write documents to '{}': {e}",
                staging.display()
            ))
        })?;

        let output = self.output_dir();
        let previous = self.root.join(PREVIOUS_DIR);
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }
        if output.exists() {
            fs::rename(&output, &previous)?;
        }
        fs::rename(&staging, &output)?;
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }
        info!("Published {written} documents to {}", output.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;
    use crate::aggregate::build_tree;
    use crate::dates::DateRange;
    use crate::model::{ByCase, County, CountyRecord};
    use crate::summary::RunSummary;
    use crate::timeseries::TimeSeries;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
    }

    fn code(s: &str) -> GeoCode {
        s.parse().unwrap()
    }

    fn tree() -> GeoTree {
        let series: TimeSeries<i64> = [(date(1), 1), (date(2), 3)].into_iter().collect();
        let record = CountyRecord {
            code: code("06085"),
            name: "Santa Clara".to_string(),
            state_name: "California".to_string(),
            combined_key: "Santa Clara, California, US".to_string(),
            population: 1927852,
            cases: ByCase {
                confirmed: series.clone(),
                deaths: series,
            },
        };
        let mut summary = RunSummary::default();
        let mut tree = build_tree(
            DateRange::new(date(1), date(2)).unwrap(),
            vec![record],
            &mut summary,
        );
        let county = tree
            .states
            .get_mut(&code("06"))
            .and_then(|s| s.counties.get_mut(&code("06085")))
            .unwrap();
        county.mobility = [(date(1), 80.5), (date(2), 81.0)].into_iter().collect();
        county.m50 = [(date(1), 2.25), (date(2), 2.5)].into_iter().collect();
        tree
    }

    #[test]
    fn layout() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path());
        let written = exporter.export(&tree()).unwrap();
        assert_eq!(written, 3);
        assert!(dir.path().join("us/0.json").is_file());
        assert!(dir.path().join("us/06.json").is_file());
        assert!(dir.path().join("us/06/085.json").is_file());
        assert!(!dir.path().join("us.staging").exists());
        assert_eq!(
            exporter.document_path(&code("06085")),
            dir.path().join("us/06/085.json")
        );
        assert_eq!(exporter.document_path(&GeoCode::nation()), dir.path().join("us/0.json"));
    }

    #[test]
    fn documents_are_pretty_printed() {
        let dir = TempDir::new().unwrap();
        Exporter::new(dir.path()).export(&tree()).unwrap();
        let state = fs::read_to_string(dir.path().join("us/06.json")).unwrap();
        assert!(state.starts_with("{\n    \"code\": \"06\""));
        let value: serde_json::Value = serde_json::from_str(&state).unwrap();
        assert_eq!(value["confirmed"]["time_series"]["3/2/20"], 3);
        assert_eq!(value["population"]["06085"], 1927852);
        // counties have their own documents
        assert!(value.get("counties").is_none());
    }

    #[test]
    fn county_round_trip() {
        let dir = TempDir::new().unwrap();
        let tree = tree();
        let exporter = Exporter::new(dir.path());
        exporter.export(&tree).unwrap();
        let json = fs::read_to_string(exporter.document_path(&code("06085"))).unwrap();
        let county: County = serde_json::from_str(&json).unwrap();
        assert_eq!(&county, tree.county(&code("06085")).unwrap());
    }

    #[test]
    fn republishing_replaces_old_output() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path());
        fs::create_dir_all(dir.path().join("us/99")).unwrap();
        exporter.export(&tree()).unwrap();
        exporter.export(&tree()).unwrap();
        assert!(!dir.path().join("us/99").exists());
        assert!(!dir.path().join("us.previous").exists());
        assert!(dir.path().join("us/06/085.json").is_file());
    }
}
