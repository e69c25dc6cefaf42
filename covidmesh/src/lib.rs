use anyhow::{Context, Result};
use futures::future::join_all;
use log::{debug, info};

use crate::config::Config;
use crate::error::MeshError;
use crate::export::Exporter;
use crate::model::GeoTree;
use crate::regions::RegionTable;
use crate::resolver::CodeResolver;
use crate::sources::{
    CaseData, CaseSource, MobilityData, MobilitySource, Source, SourceData, SourceReader,
    TestingData, TestingSource, VotesData, VotesSource,
};
use crate::summary::RunSummary;

// Modules
pub mod aggregate;
pub mod averager;
pub mod config;
pub mod dates;
pub mod enrich;
pub mod error;
pub mod export;
pub mod gap_fill;
pub mod geo;
pub mod model;
pub mod regions;
pub mod resolver;
pub mod sources;
pub mod summary;
pub mod timeseries;

/// Everything the readers produced, before meshing.
#[derive(Debug, Clone)]
pub struct SourceBundle {
    pub cases: CaseData,
    pub mobility: MobilityData,
    pub testing: Option<TestingData>,
    pub votes: Option<VotesData>,
}

/// Type for one meshing run over a set of sources
pub struct Mesher {
    pub config: Config,
    resolver: CodeResolver,
    regions: RegionTable,
}

impl Mesher {
    /// Setup the Mesher object with default configuration
    pub fn new() -> Result<Self> {
        Self::new_with_config(Config::default())
    }

    /// Setup the Mesher object with custom configuration
    pub fn new_with_config(config: Config) -> Result<Self> {
        debug!("config: {config:?}");
        let resolver = CodeResolver::from_config(&config).context("Invalid key overrides")?;
        let regions =
            RegionTable::from_definitions(&config.regions).context("Invalid region table")?;
        Ok(Self {
            config,
            resolver,
            regions,
        })
    }

    pub fn resolver(&self) -> &CodeResolver {
        &self.resolver
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    /// Readers for every enabled source.
    pub fn sources(&self) -> Vec<Source> {
        let config = &self.config;
        let paths = &config.sources;
        let mut sources: Vec<Source> = vec![
            CaseSource::new(
                config.source_path(&paths.confirmed),
                config.source_path(&paths.deaths),
                self.resolver.clone(),
            )
            .into(),
            MobilitySource::new(config.source_path(&paths.mobility)).into(),
        ];
        if config.include_testing {
            sources.push(TestingSource::new(config.source_path(&paths.testing)).into());
        }
        if config.include_votes {
            sources.push(VotesSource::new(config.source_path(&paths.votes), self.resolver.clone()).into());
        }
        sources
    }

    /// Run every reader on its own blocking task.
    pub async fn read_sources(&self, summary: &mut RunSummary) -> Result<SourceBundle> {
        let readers = self.sources().into_iter().map(|source| async move {
            let name = source.name();
            let data = tokio::task::spawn_blocking(move || source.read())
                .await
                .with_context(|| format!("Reader for {name} did not finish"))?
                .with_context(|| format!("Failed to read {name} source"))?;
            anyhow::Ok((name, data))
        });
        let results: Vec<(&'static str, SourceData)> = join_all(readers)
            .await
            .into_iter()
            .collect::<Result<_>>()?;

        let (mut cases, mut mobility, mut testing, mut votes) = (None, None, None, None);
        for (name, data) in results {
            summary.add_report(name, data.report().clone());
            match data {
                SourceData::Cases(data) => cases = Some(data),
                SourceData::Mobility(data) => mobility = Some(data),
                SourceData::Testing(data) => testing = Some(data),
                SourceData::Votes(data) => votes = Some(data),
            }
        }
        Ok(SourceBundle {
            cases: cases.ok_or(MeshError::MissingDataset("cases"))?,
            mobility: mobility.ok_or(MeshError::MissingDataset("mobility"))?,
            testing,
            votes,
        })
    }

    /// Mesh the read sources into one tree.
    pub fn build_tree(&self, bundle: SourceBundle, summary: &mut RunSummary) -> GeoTree {
        let (records, violations) = regions::redistribute(self.regions.clone(), bundle.cases.records);
        summary.integrity_violations = violations;
        let mut tree = aggregate::build_tree(bundle.cases.date_range, records, summary);
        enrich::add_mobility(&mut tree, &bundle.mobility, self.config.days_to_predict, summary);
        if let Some(testing) = &bundle.testing {
            enrich::add_testing(&mut tree, testing);
        }
        if let Some(votes) = &bundle.votes {
            enrich::add_votes(&mut tree, votes);
        }
        tree
    }

    /// Read, mesh and publish. Recoverable problems end up in the returned
    /// summary; anything else aborts before output is published.
    pub async fn mesh(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let bundle = self.read_sources(&mut summary).await?;
        let tree = self.build_tree(bundle, &mut summary);
        summary.files_written = Exporter::new(&self.config.target_dir)
            .export(&tree)
            .with_context(|| {
                format!("Failed to export to '{}'", self.config.target_dir.display())
            })?;
        info!(
            "Meshed {} counties in {} states, {} line(s) skipped",
            summary.counties,
            summary.states,
            summary.skipped_lines()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    use super::*;
    use crate::geo::GeoCode;
    use crate::sources::jhu::tests::{CONFIRMED, DEATHS};
    use crate::sources::test_util::write;
    use crate::summary::ViolationKind;

    const MOBILITY: &str = concat!(
        r#"{"fips":"06","date":["2020-03-01","2020-03-03"],"m50":[4.0,2.0],"m50_index":[80,40]}"#,
        "\n",
        r#"{"fips":"36","date":["2020-03-02"],"m50":[1.0],"m50_index":[20]}"#,
        "\n",
    );

    const TESTING: &str = "\
date,state,positive,negative,pending
20200302,CA,10,90,3
20200302,NY,50,50,
";

    const VOTES: &str = "\
cod,votes,candidate1,candidate2,candidate3,Clinton,Trump,Johnson,c1v,c2v,c3v
06085,200,Clinton,Trump,Johnson,1,2,3,150,40,10
";

    fn config(source: &Path, target: &Path) -> Config {
        write(source, "confirmed.csv", CONFIRMED);
        write(source, "deaths.csv", DEATHS);
        write(source, "mobility.ndjson", MOBILITY);
        write(source, "testing.csv", TESTING);
        write(source, "votes.csv", VOTES);
        let mut config = Config {
            source_dir: source.to_path_buf(),
            target_dir: target.to_path_buf(),
            days_to_predict: 2,
            ..Config::default()
        };
        config.sources.confirmed = PathBuf::from("confirmed.csv");
        config.sources.deaths = PathBuf::from("deaths.csv");
        config.sources.mobility = PathBuf::from("mobility.ndjson");
        config.sources.testing = PathBuf::from("testing.csv");
        config.sources.votes = PathBuf::from("votes.csv");
        config
    }

    #[tokio::test]
    async fn meshes_all_sources() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let mesher = Mesher::new_with_config(config(source.path(), target.path())).unwrap();
        let summary = mesher.mesh().await.unwrap();

        assert_eq!(summary.reports.len(), 4);
        assert_eq!(summary.counties, 3);
        assert_eq!(summary.states, 3);
        assert_eq!(summary.files_written, 7);
        assert_eq!(
            summary.unresolved_keys().collect::<Vec<_>>(),
            vec!["Nowhere,Missouri,US"]
        );
        // Kansas City has no member lines in the fixture
        assert!(summary.integrity_violations.iter().any(|v| {
            v.region.as_str() == "29555" && matches!(v.kind, ViolationKind::MembersRemaining(4))
        }));

        let county = std::fs::read_to_string(target.path().join("us/06/085.json")).unwrap();
        let county: serde_json::Value = serde_json::from_str(&county).unwrap();
        assert_eq!(county["confirmed"]["3/3/20"], 4);
        assert_eq!(county["mobility"]["3/5/20"], 40.0);
        assert_eq!(county["votes2016"]["Clinton"], 150);

        let nation = std::fs::read_to_string(target.path().join("us/0.json")).unwrap();
        let nation: serde_json::Value = serde_json::from_str(&nation).unwrap();
        assert_eq!(nation["most_recent_date"], "3/3/20");
        assert_eq!(nation["testing"]["settled_cases"]["time_series"]["3/2/20"], 200);
        assert_eq!(nation["testing"]["positive_rate"]["3/2/20"]["36"], 50.0);
    }

    #[tokio::test]
    async fn missing_source_aborts_without_output() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let mut config = config(source.path(), target.path());
        config.sources.mobility = PathBuf::from("absent.ndjson");
        let mesher = Mesher::new_with_config(config).unwrap();
        let err = mesher.mesh().await.unwrap_err();
        assert!(format!("{err:#}").contains("absent.ndjson"));
        assert!(!target.path().join("us").exists());
    }

    #[tokio::test]
    async fn optional_sources_can_be_disabled() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let mut config = config(source.path(), target.path());
        config.include_testing = false;
        config.include_votes = false;
        let mesher = Mesher::new_with_config(config).unwrap();
        let mut summary = RunSummary::default();
        let bundle = mesher.read_sources(&mut summary).await.unwrap();
        assert!(bundle.testing.is_none());
        let tree = mesher.build_tree(bundle, &mut summary);
        assert!(tree.nation.testing.is_none());
        assert!(tree.nation.votes.is_none());
        let new_york: GeoCode = "36061".parse().unwrap();
        assert_eq!(
            tree.county(&new_york).unwrap().mobility.values().next(),
            Some(&20.0)
        );
    }
}
