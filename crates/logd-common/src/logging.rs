//! ---
//! logd_section: "03-persistence-logging"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Tracing bootstrap shared by every logd process."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "LOGD_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Output format for the stdout layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Install the global tracing subscriber.
///
/// The filter comes from `LOGD_LOG`, then `RUST_LOG`, then `info`. Stdout
/// receives the configured format; a daily rolling JSON file is written under
/// `config.directory`. Calling this twice keeps the first subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;
    let prefix = config
        .file_prefix
        .clone()
        .unwrap_or_else(|| service_name.to_owned());

    let file_appender = daily(&config.directory, format!("{prefix}.log"));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    let filter = resolve_filter(std::env::var(LOG_ENV).ok());

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .boxed();

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        "tracing initialised"
    );
    Ok(())
}

fn resolve_filter(directive: Option<String>) -> EnvFilter {
    match directive {
        Some(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); defaulting to {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_directive_wins() {
        let filter = resolve_filter(Some("logd_msg=debug".into()));
        assert!(filter.to_string().contains("logd_msg=debug"));
    }

    #[test]
    fn invalid_directive_falls_back() {
        let filter = resolve_filter(Some("logd=notalevel".into()));
        assert_eq!(filter.to_string(), DEFAULT_DIRECTIVE);
    }

    #[test]
    fn init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("nested"),
            format: LogFormat::Pretty,
            file_prefix: Some("logd-test".into()),
        };
        init_tracing("logd", &config).unwrap();
        assert!(config.directory.is_dir());
    }

    #[test]
    fn format_names_are_kebab_case() {
        let parsed: LoggingConfig = toml::from_str("format = \"pretty\"").unwrap();
        assert_eq!(parsed.format, LogFormat::Pretty);
        let parsed: LoggingConfig = toml::from_str("format = \"structured-json\"").unwrap();
        assert_eq!(parsed.format, LogFormat::StructuredJson);
    }
}
