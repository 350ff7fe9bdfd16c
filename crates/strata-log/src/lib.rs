//! `tracing` subscriber setup for strata binaries.
//!
//! Console output is human-readable with uptime stamps and thread names (the
//! generation workers are named `chunk-gen-N`). Debug builds can also write
//! JSON lines to `strata.log` for later inspection.

use std::path::{Path, PathBuf};

use strata_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "info";

/// Name of the JSON log file inside the log directory.
pub const LOG_FILE: &str = "strata.log";

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `config.debug.log_level`, which wins over
/// [`DEFAULT_FILTER`]. The JSON file layer is only added when `debug_build`
/// is set and `log_dir` can be created.
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter_str = filter_string(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(path) = log_file_path(log_dir)
        && let Ok(log_file) = std::fs::File::create(&path)
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        tracing::debug!("writing JSON log to {}", path.display());
        return;
    }

    subscriber.init();
}

/// Filter directives taken from the config, or [`DEFAULT_FILTER`].
pub fn filter_string(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => {
            config.debug.log_level.trim().to_string()
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Creates `log_dir` and returns the log file path inside it.
fn log_file_path(log_dir: Option<&Path>) -> Option<PathBuf> {
    let log_dir = log_dir?;
    std::fs::create_dir_all(log_dir).ok()?;
    Some(log_dir.join(LOG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_without_config() {
        assert_eq!(filter_string(None), "info");
    }

    #[test]
    fn test_config_level_overrides_default() {
        let mut config = Config::default();
        config.debug.log_level = " debug,strata_world=trace ".to_string();
        assert_eq!(filter_string(Some(&config)), "debug,strata_world=trace");
    }

    #[test]
    fn test_empty_config_level_falls_back() {
        let mut config = Config::default();
        config.debug.log_level = String::new();
        assert_eq!(filter_string(Some(&config)), DEFAULT_FILTER);
    }

    #[test]
    fn test_subsystem_filters_parse() {
        for filter in ["info", "warn,strata_lighting=debug", "error,strata_voxel=trace"] {
            assert!(EnvFilter::try_new(filter).is_ok(), "failed to parse {filter}");
        }
    }

    #[test]
    fn test_log_file_path_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs").join("run");
        let path = log_file_path(Some(&nested)).unwrap();
        assert!(nested.is_dir());
        assert_eq!(path.file_name().unwrap(), LOG_FILE);
        assert!(log_file_path(None).is_none());
    }
}
