use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("missing home directory for config paths")]
    MissingHome,
    #[error("api base URL `{0}` must start with http:// or https://")]
    InvalidBaseUrl(String),
    #[error("logging.rotate_keep must be at least 1")]
    NoLogFilesKept,
}
