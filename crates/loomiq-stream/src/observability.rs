use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn observability_enabled() -> bool {
    match std::env::var("LOOMIQ_OBSERVABILITY_ENABLED") {
        Ok(value) => parse_bool_env(&value).unwrap_or(true),
        Err(_) => true,
    }
}

/// Targets raised to the requested level by default: this library and the
/// `loomiq` binary.
const OWN_TARGETS: &[&str] = &["loomiq_stream", "loomiq"];

/// `warn` for dependencies (hyper and reqwest are chatty at `debug`), the
/// requested level for our own targets.
fn default_directives(default_level: &str) -> String {
    std::iter::once("warn".to_string())
        .chain(
            OWN_TARGETS
                .iter()
                .map(|target| format!("{target}={default_level}")),
        )
        .collect::<Vec<_>>()
        .join(",")
}

/// `LOOMIQ_LOG_LEVEL` accepts a bare level, which then applies to our targets
/// only, or a full filter expression.
fn level_directives(value: &str) -> String {
    let value = value.trim();
    if value.parse::<tracing::Level>().is_ok() || value.eq_ignore_ascii_case("off") {
        default_directives(&value.to_ascii_lowercase())
    } else {
        value.to_string()
    }
}

fn resolve_env_filter(default_level: &str) -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("LOOMIQ_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level_directives(&level))
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::try_new(default_directives(default_level))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    })
}

/// Initialize logging once per process. `default_level` applies to the loomiq
/// targets; dependencies log at `warn`.
///
/// Console output goes to stderr so it never interleaves with rendered log
/// lines on stdout.
///
/// Environment variables:
/// - `LOOMIQ_OBSERVABILITY_ENABLED`: optional enable/disable flag (default enabled).
/// - `LOOMIQ_LOG_LEVEL`: optional level (`info`, `debug`, etc.) for the loomiq targets,
///   or a full filter expression.
/// - `LOOMIQ_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
/// - `RUST_LOG`: optional filter override.
pub fn init_observability(default_level: &str) {
    INIT.get_or_init(|| {
        if !observability_enabled() {
            return;
        }

        let env_filter = resolve_env_filter(default_level);
        if let Ok(path_raw) = std::env::var("LOOMIQ_JSON_LOG_PATH") {
            let path = std::path::PathBuf::from(path_raw);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = std::fs::create_dir_all(parent);
            }
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("loomiq.logs.jsonl");
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
