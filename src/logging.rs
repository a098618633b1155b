use tracing_subscriber::{fmt::time::UtcTime, layer::Identity, prelude::*, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Directive used when the relay runs with `debug = true` and no explicit level.
const DEBUG_DIRECTIVE: &str = "info,helix_relay=debug";

/// Pick the filter directive.
///
/// Precedence: `logging.level` from config, then the `debug` flag, then
/// `RUST_LOG`, then `info`. Returns `None` when `RUST_LOG` should be used.
pub fn filter_directive(cfg: &LoggingConfig, debug: bool) -> Option<String> {
    if let Some(level) = cfg.level {
        return Some(level.as_str().to_string());
    }
    if debug {
        return Some(DEBUG_DIRECTIVE.to_string());
    }
    None
}

/// Initialize logging: stdout plus an optional rolling file appender.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_with_config(cfg: &LoggingConfig, debug: bool) {
    let env_filter = match filter_directive(cfg, debug) {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    match cfg.format {
        LogFormat::Json => init_json_logging(cfg, env_filter),
        LogFormat::Text => init_text_logging(cfg, env_filter),
    }
}

fn init_json_logging(cfg: &LoggingConfig, env_filter: EnvFilter) {
    let registry = tracing_subscriber::registry().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(std::io::stdout),
    );

    let file_layer = cfg.enable_file_logging.then(|| {
        build_file_layer(cfg, |writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer)
        })
    });

    match file_layer.flatten() {
        Some(layer) => {
            let _ = registry.with(layer).try_init();
        }
        None => {
            let _ = registry.with(Identity::new()).try_init();
        }
    }
}

fn init_text_logging(cfg: &LoggingConfig, env_filter: EnvFilter) {
    let registry = tracing_subscriber::registry().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(std::io::stdout),
    );

    let file_layer = cfg.enable_file_logging.then(|| {
        build_file_layer(cfg, |writer| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer)
        })
    });

    match file_layer.flatten() {
        Some(layer) => {
            let _ = registry.with(layer).try_init();
        }
        None => {
            let _ = registry.with(Identity::new()).try_init();
        }
    }
}

fn rotation_for(name: &str) -> tracing_appender::rolling::Rotation {
    match name.to_lowercase().as_str() {
        "hourly" => tracing_appender::rolling::Rotation::HOURLY,
        "never" => tracing_appender::rolling::Rotation::NEVER,
        _ => tracing_appender::rolling::Rotation::DAILY,
    }
}

fn build_file_layer<F, L>(cfg: &LoggingConfig, build_layer: F) -> Option<L>
where
    F: FnOnce(tracing_appender::non_blocking::NonBlocking) -> L,
{
    if let Err(err) = std::fs::create_dir_all(&cfg.dir) {
        eprintln!(
            "Failed to create log directory '{}' ({err}), continuing with stdout logs",
            cfg.dir
        );
        return None;
    }

    let file_appender = tracing_appender::rolling::RollingFileAppender::new(
        rotation_for(&cfg.rotation),
        &cfg.dir,
        &cfg.filename,
    );
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    // Keep guard alive for process lifetime
    let _leaked: &'static _ = Box::leak(Box::new(file_guard));

    Some(build_layer(non_blocking))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn explicit_level_beats_debug_flag() {
        let cfg = LoggingConfig {
            level: Some(LogLevel::Warn),
            ..LoggingConfig::default()
        };
        assert_eq!(filter_directive(&cfg, true).as_deref(), Some("warn"));
    }

    #[test]
    fn debug_flag_raises_relay_logs() {
        let cfg = LoggingConfig::default();
        assert_eq!(
            filter_directive(&cfg, true).as_deref(),
            Some(DEBUG_DIRECTIVE)
        );
        assert_eq!(filter_directive(&cfg, false), None);
    }

    #[test]
    fn rotation_names() {
        use tracing_appender::rolling::Rotation;
        assert_eq!(rotation_for("HOURLY"), Rotation::HOURLY);
        assert_eq!(rotation_for("never"), Rotation::NEVER);
        assert_eq!(rotation_for("something"), Rotation::DAILY);
    }
}
