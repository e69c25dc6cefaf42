use covidmesh::error::MeshError;

#[derive(thiserror::Error, Debug)]
pub enum CovidmeshCliError {
    #[error("Anyhow error: {0:#}")]
    Anyhow(#[from] anyhow::Error),
    #[error("serde JSON error")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("Invalid TOML in config file '{path}': {source}")]
    ConfigError {
        path: String,
        source: toml::de::Error,
    },
    #[error("covidmesh error: {0}")]
    MeshError(#[from] MeshError),
    #[error("std IO error")]
    IOError(#[from] std::io::Error),
}

pub type CovidmeshCliResult<T> = Result<T, CovidmeshCliError>;
