mod cli;
mod display;
mod error;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, RunCommand};
use covidmesh::config::Config;
use error::{CovidmeshCliError, CovidmeshCliResult};
use log::debug;

const DEFAULT_LOGGING_LEVEL: &str = "warn";
const VERBOSE_LOGGING_LEVEL: &str = "info";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    // Set RUST_LOG to `DEFAULT_LOGGING_LEVEL` if not set
    if std::env::var("RUST_LOG").is_err() {
        let level = if args.verbose {
            VERBOSE_LOGGING_LEVEL
        } else {
            DEFAULT_LOGGING_LEVEL
        };
        std::env::set_var("RUST_LOG", level);
    }
    pretty_env_logger::init_timed();
    debug!("args: {args:?}");
    let config = read_config_from_toml(args.config.as_deref())?;
    debug!("config: {config:?}");

    if let Some(command) = args.command {
        command.run(config).await?;
    }
    Ok(())
}

fn default_config_path() -> Option<PathBuf> {
    // macOS: ~/Library/Application Support/covidmesh/config.toml
    dirs::config_dir().map(|dir| dir.join("covidmesh").join("config.toml"))
}

/// Config from `path` when given, else from the user config directory when a
/// file exists there, else the defaults.
fn read_config_from_toml(path: Option<&Path>) -> CovidmeshCliResult<Config> {
    let (file_path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(Config::default()),
        },
    };
    match std::fs::read_to_string(&file_path) {
        Ok(contents) => toml::from_str(&contents).map_err(|source| CovidmeshCliError::ConfigError {
            path: file_path.display().to_string(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => Ok(Config::default()),
        Err(e) => Err(e.into()),
    }
}
