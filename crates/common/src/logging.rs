// RDB - Replay Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Logging configuration for RDB components
//!
//! Provides centralized logging setup with:
//! - Structured console output on stderr, so stdout stays free for program output
//! - Optional file logging to a temporary directory with daily rotation
//! - Environment variable support (RUST_LOG)
//!
//! The player runs as a child process whose stdout is the control channel, so it
//! must never log to the console; it uses [`init_file_logging`].

use eyre::Result;
use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Once,
};
use tracing::Level;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Default console level when RUST_LOG is not set
const DEFAULT_CONSOLE_LEVEL: &str = "warn";

/// Default file level when RUST_LOG is not set
const DEFAULT_FILE_LEVEL: &str = "info";

/// Initialize logging for RDB components
///
/// This function sets up:
/// - Console logging on stderr, `warn` and above unless RUST_LOG says otherwise
/// - File logging to a temporary directory with daily rotation, when enabled
///
/// # Arguments
/// * `component_name` - Name of the component (e.g., "rdb", "rdb-tui")
/// * `enable_file_logging` - Whether to also log to a file
///
/// # Examples
/// ```rust
/// use rdb_common::logging;
///
/// fn main() -> eyre::Result<()> {
///     logging::init_logging("rdb", false)?;
///     tracing::info!("Application started");
///     Ok(())
/// }
/// ```
pub fn init_logging(component_name: &str, enable_file_logging: bool) -> Result<()> {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(true)
        .with_writer(io::stderr)
        .compact()
        .with_filter(filter_with_default(DEFAULT_CONSOLE_LEVEL)?);

    if enable_file_logging {
        let log_dir = create_log_directory(component_name)?;
        let file_layer = file_layer(component_name, &log_dir)?;

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| eyre::eyre!("Failed to initialize tracing subscriber: {}", e))?;

        tracing::info!(
            component = component_name,
            log_dir = %log_dir.display(),
            "Logging initialized with console and file output"
        );
    } else {
        tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .map_err(|e| eyre::eyre!("Failed to initialize tracing subscriber: {}", e))?;

        tracing::info!(component = component_name, "Logging initialized with console output only");
    }

    log_environment_info(component_name);

    Ok(())
}

/// Initialize file-only logging
///
/// Used by processes that own the terminal or whose stdout is a protocol stream:
/// the full-screen front end and the player child.
pub fn init_file_logging(component_name: &str) -> Result<PathBuf> {
    let log_dir = create_log_directory(component_name)?;
    let file_layer = file_layer(component_name, &log_dir)?;

    tracing_subscriber::registry()
        .with(file_layer)
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(
        component = component_name,
        log_dir = %log_dir.display(),
        "Logging initialized with file output only"
    );
    log_environment_info(component_name);

    Ok(log_dir)
}

fn file_layer<S>(
    component_name: &str,
    log_dir: &Path,
) -> Result<impl Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let file_appender = rolling::daily(log_dir, format!("{component_name}.log"));
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    // The writer must outlive every log call in the process.
    std::mem::forget(guard);

    Ok(fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .with_filter(filter_with_default(DEFAULT_FILE_LEVEL)?))
}

/// Create log directory in system temp folder
fn create_log_directory(component_name: &str) -> Result<PathBuf> {
    let log_dir = env::temp_dir().join("rdb-logs").join(component_name);
    fs::create_dir_all(&log_dir)?;
    Ok(log_dir)
}

/// RUST_LOG if set, otherwise `default`
fn filter_with_default(default: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .map_err(|e| eyre::eyre!("Failed to create environment filter: {}", e))
}

/// Log useful environment and system information
fn log_environment_info(component_name: &str) {
    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let args: Vec<String> = env::args().collect();

    tracing::info!(
        component = component_name,
        rust_log = %rust_log,
        args = ?args,
        "Environment information"
    );

    if let Ok(current_dir) = env::current_dir() {
        tracing::debug!(working_directory = %current_dir.display(), "Working directory");
    }
}

/// Initialize simple logging (console only, no fancy formatting)
///
/// This is useful for tests or simple utilities that don't need
/// the full logging setup.
pub fn init_simple_logging(level: Level) -> Result<()> {
    let env_filter = filter_with_default(level.as_str())?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_test_writer()
        .compact()
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to initialize simple logging: {}", e))?;

    Ok(())
}

// Global test logging initialization - ensures logging is only set up once across all tests
static TEST_LOGGING_INIT: Once = Once::new();

/// Safe logging initialization for tests - can be called multiple times without crashing
///
/// Uses `std::sync::Once` so initialization happens only once per test process.
/// Defaults to INFO but respects RUST_LOG.
///
/// # Usage
/// ```rust
/// use rdb_common::logging;
/// use tracing::info;
///
/// logging::ensure_test_logging(None);
/// info!("This will work safely in any test!");
/// ```
pub fn ensure_test_logging(default_level: Option<Level>) {
    TEST_LOGGING_INIT.call_once(|| {
        let default_level = default_level.unwrap_or(Level::INFO);
        // A subscriber may already be installed by another harness; that is fine.
        let _ = init_simple_logging(default_level);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, error, info, warn};

    fn init_test_logging() {
        ensure_test_logging(None);
    }

    #[test]
    fn test_logging_functions_work() {
        init_test_logging();

        info!("Test info message");
        warn!("Test warning message");
        debug!("Test debug message");
        error!("Test error message");
    }

    #[test]
    fn test_log_directory_creation() {
        let log_dir = create_log_directory("test-component").unwrap();
        assert!(log_dir.exists());
        assert!(log_dir.to_string_lossy().contains("rdb-logs"));
        assert!(log_dir.to_string_lossy().contains("test-component"));
    }

    #[test]
    fn test_default_filters() {
        assert!(!filter_with_default(DEFAULT_CONSOLE_LEVEL).unwrap().to_string().is_empty());
        assert!(!filter_with_default(DEFAULT_FILE_LEVEL).unwrap().to_string().is_empty());
    }

    #[test]
    fn test_repeated_initialization_is_harmless() {
        init_test_logging();

        // A second global subscriber cannot be installed; both calls must fail cleanly.
        let first = init_logging("test-repeat-1", false);
        let second = init_file_logging("test-repeat-2");
        assert!(first.is_err() || second.is_err());

        info!("Test logging after repeated init attempts");
    }
}
