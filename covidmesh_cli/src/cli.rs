use std::path::PathBuf;

use clap::{command, Args, Parser, Subcommand};
use covidmesh::config::Config;
use covidmesh::resolver::RawIdentifier;
use covidmesh::Mesher;
use enum_dispatch::enum_dispatch;
use log::info;
use serde::Serialize;
use spinners::{Spinner, Spinners};

use crate::display::{describe_resolution, display_regions, display_summary};
use crate::error::CovidmeshCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const MESHING_STRING: &str = "Reading and meshing sources";

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> CovidmeshCliResult<()>;
}

/// The `mesh` command reads every source and writes the JSON tree.
#[derive(Args, Debug)]
pub struct MeshCommand {
    #[arg(short = 's', long, help = "Directory holding the source datasets")]
    source: Option<PathBuf>,
    #[arg(short = 't', long, help = "Directory the `us` tree is written to")]
    target: Option<PathBuf>,
    #[arg(long, help = "Days past the most recent date to hold mobility flat for")]
    days_to_predict: Option<u32>,
    #[arg(long = "no-testing", help = "Skip the testing source")]
    no_testing: bool,
    #[arg(long = "no-votes", help = "Skip the votes source")]
    no_votes: bool,
    #[arg(from_global)]
    quiet: bool,
}

impl MeshCommand {
    /// Command line values take precedence over the config file.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(source) = &self.source {
            config.source_dir = source.clone();
        }
        if let Some(target) = &self.target {
            config.target_dir = target.clone();
        }
        if let Some(days) = self.days_to_predict {
            config.days_to_predict = days;
        }
        config.include_testing &= !self.no_testing;
        config.include_votes &= !self.no_votes;
        config
    }
}

impl RunCommand for MeshCommand {
    async fn run(&self, config: Config) -> CovidmeshCliResult<()> {
        info!("Running `mesh` subcommand");
        let mesher = Mesher::new_with_config(self.apply(config))?;
        let sp = (!self.quiet).then(|| {
            Spinner::with_timer(
                DEFAULT_PROGRESS_SPINNER,
                MESHING_STRING.to_string() + RUNNING_TAIL_STRING,
            )
        });
        let result = mesher.mesh().await;
        if let Some(mut s) = sp {
            s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
        }
        let summary = result?;
        display_summary(&summary)?;
        Ok(())
    }
}

/// The `resolve` command shows which code a source identifier maps to.
#[derive(Args, Debug)]
pub struct ResolveCommand {
    #[arg(index = 1, help = "Combined key, e.g. \"Kansas City,Missouri,US\"")]
    combined_key: String,
    #[arg(short = 'f', long, default_value = "", help = "Reported FIPS code")]
    fips: String,
    #[arg(short = 'p', long, default_value = "", help = "Reported province or state")]
    province_state: String,
    #[arg(long, help = "Print the result as JSON")]
    json: bool,
}

#[derive(Serialize, Debug, PartialEq)]
struct ResolveOutput {
    combined_key: String,
    code: Option<String>,
    resolution: String,
    region: Option<String>,
    population_override: Option<u64>,
}

impl ResolveCommand {
    fn resolve(&self, mesher: &Mesher) -> ResolveOutput {
        let resolution = mesher.resolver().resolve(RawIdentifier {
            fips: &self.fips,
            combined_key: &self.combined_key,
            province_state: &self.province_state,
        });
        let code = resolution.code();
        ResolveOutput {
            combined_key: self.combined_key.clone(),
            code: code.map(ToString::to_string),
            resolution: describe_resolution(&resolution),
            region: code
                .and_then(|c| mesher.regions().region_of(c))
                .map(ToString::to_string),
            population_override: code.and_then(|c| mesher.resolver().population_override(c)),
        }
    }
}

impl RunCommand for ResolveCommand {
    async fn run(&self, config: Config) -> CovidmeshCliResult<()> {
        info!("Running `resolve` subcommand");
        let mesher = Mesher::new_with_config(config)?;
        let output = self.resolve(&mesher);
        if self.json {
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }
        println!("'{}' resolves to {}", output.combined_key, output.resolution);
        if let Some(region) = &output.region {
            println!("Member of region {region}");
        }
        if let Some(population) = output.population_override {
            println!("Population is overridden to {population}");
        }
        Ok(())
    }
}

/// The `regions` command lists the regions whose cases are redistributed.
#[derive(Args, Debug)]
pub struct RegionsCommand {
    #[arg(long, help = "Print the table as JSON")]
    json: bool,
}

impl RunCommand for RegionsCommand {
    async fn run(&self, config: Config) -> CovidmeshCliResult<()> {
        info!("Running `regions` subcommand");
        // validates the table
        Mesher::new_with_config(config.clone())?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&config.regions)?);
        } else {
            display_regions(&config.regions)?;
        }
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="covidmesh meshes COVID-19 datasets into one JSON tree per state and county", long_about = None, name="covidmesh")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress bar to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
    #[arg(
        short = 'c',
        long = "config",
        help = "Config file to use instead of the one in the user config directory",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short = 'v',
        long = "verbose",
        help = "Log at info level when `RUST_LOG` is not set",
        global = true
    )]
    pub verbose: bool,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Read every source and write the meshed JSON tree
    Mesh(MeshCommand),
    /// Show which code a source identifier resolves to
    Resolve(ResolveCommand),
    /// List the regions whose cases are spread over member counties
    Regions(RegionsCommand),
}
