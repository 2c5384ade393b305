use std::path::PathBuf;

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming};

use crate::config::{ConfigPaths, LoggingConfig};

/// HTTP stack crates that stay at `warn` unless the config names them.
const QUIET_CRATES: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Starts the rotating file logger. The returned handle must outlive the run.
pub fn init_logging(config: &LoggingConfig, paths: &ConfigPaths) -> anyhow::Result<LoggerHandle> {
    let log_path = config
        .path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.logs_dir.join("lexchat.log"));
    let directory = log_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or(paths.logs_dir.clone());
    let basename = log_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("lexchat")
        .to_string();
    let handle = Logger::try_with_env_or_str(log_spec(&config.level))?
        .log_to_file(FileSpec::default().directory(directory).basename(basename))
        .rotate(
            Criterion::Size(config.rotate_size),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config.rotate_keep),
        )
        .start()?;
    log::info!("lexchat {} logging at `{}`", env!("CARGO_PKG_VERSION"), config.level);
    Ok(handle)
}

/// Expands a bare level such as `debug` so that per-event trace lines from
/// the chat client don't drown in connection-pool chatter. A level that
/// already carries module directives is used as written.
fn log_spec(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let mut spec = level.to_string();
    for krate in QUIET_CRATES {
        spec.push_str(&format!(", {krate}=warn"));
    }
    spec
}
