use std::fs;
use std::path::{Path, PathBuf};

use lexchat::config::{ApiConfig, API_URL_ENV};

use super::error::ConfigError;
use super::paths::ConfigPaths;
use super::types::AppConfig;

#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub paths: ConfigPaths,
}

/// Loads the config file, then lets `LEXCHAT_API_URL` override its base URL.
pub fn load_config(path_override: Option<PathBuf>) -> Result<LoadedConfig, ConfigError> {
    let paths = ConfigPaths::resolve(path_override)?;
    fs::create_dir_all(&paths.config_dir)?;
    fs::create_dir_all(&paths.logs_dir)?;
    let mut config = read_config(&paths.config_file)?;
    secure_file_permissions(&paths.config_file)?;
    if std::env::var_os(API_URL_ENV).is_some() {
        config.api = ApiConfig {
            timeout_seconds: config.api.timeout_seconds,
            ..ApiConfig::from_env()
        };
    }
    validate(&config)?;
    Ok(LoadedConfig { config, paths })
}

fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    let base_url = &config.api.base_url;
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl(base_url.clone()));
    }
    if config.logging.rotate_keep == 0 {
        return Err(ConfigError::NoLogFilesKept);
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(err) => Err(ConfigError::Io(err)),
    }
}

fn secure_file_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(path) {
            let mut perms = metadata.permissions();
            let mode = perms.mode() & 0o777;
            if mode & 0o077 != 0 {
                perms.set_mode(0o600);
                fs::set_permissions(path, perms)?;
            }
        }
    }
    Ok(())
}
