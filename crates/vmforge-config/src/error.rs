use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse toml config at {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("failed to merge configuration: {0}")]
    Merge(String),

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("xdg directory error: {0}")]
    Xdg(String),
}
