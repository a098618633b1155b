//! Configuration loading and environment parsing.

use super::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::env;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Prefix for per-field environment overrides, e.g. `HELIX__PORT=8443`.
pub const ENV_OVERRIDE_PREFIX: &str = "HELIX__";

/// Load configuration with the following precedence (highest first):
/// 1) `HELIX__SECTION__KEY=value` per-field environment overrides
/// 2) `HELIX_CONFIG_JSON` env var containing raw JSON
/// 3) If `HELIX_CONFIG_STDIN=true/1`, JSON read from stdin
/// 4) File pointed to by `HELIX_CONFIG_PATH`
/// 5) `config.json` in the current working directory
/// 6) `config.json` next to the executable
/// 7) Defaults compiled into the binary
///
/// Sources are deep-merged, so a file only needs the keys it changes. Absent
/// files and empty documents are skipped. A source that exists but cannot be
/// read or parsed, or a merged document that does not deserialize, is an error
/// naming the source. Callers run [`validate_config`](super::validate_config)
/// on the result.
pub fn load() -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())
        .context("failed to serialize default configuration")?;

    // Lowest precedence first; each later merge wins.
    if let Ok(exe_path) = env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            merge_file_source(&mut merged, &exe_dir.join("config.json"))?;
        }
    }

    merge_file_source(&mut merged, Path::new("config.json"))?;

    if let Ok(path) = env::var("HELIX_CONFIG_PATH") {
        merge_file_source(&mut merged, &PathBuf::from(path))?;
    }

    if env::var("HELIX_CONFIG_STDIN").is_ok_and(|val| env_var_truthy(&val)) {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read config from stdin")?;
        if let Some(value) = parse_json_document(&buf, "stdin")? {
            merge_values(&mut merged, value);
        }
    }

    if let Ok(json) = env::var("HELIX_CONFIG_JSON") {
        if let Some(value) = parse_json_document(&json, "HELIX_CONFIG_JSON")? {
            merge_values(&mut merged, value);
        }
    }

    apply_env_overrides(&mut merged, env::vars());

    serde_json::from_value::<Config>(merged).context("invalid configuration after merging sources")
}

fn parse_json_document(raw: &str, label: &str) -> Result<Option<Value>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(raw)
        .map(Some)
        .with_context(|| format!("failed to parse config from {label}"))
}

fn merge_file_source(target: &mut Value, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || !path.exists() {
        return Ok(());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config from {}", path.display()))?;
    if let Some(value) = parse_json_document(&contents, &format!("file {}", path.display()))? {
        merge_values(target, value);
    }
    Ok(())
}

pub(crate) fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value;
        }
    }
}

pub(crate) fn apply_env_overrides<I>(root: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, raw_value) in vars {
        let Some(stripped) = key.strip_prefix(ENV_OVERRIDE_PREFIX) else {
            continue;
        };

        let segments: Vec<String> = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();

        if segments.is_empty() {
            continue;
        }

        set_nested_value(root, &segments, parse_env_value(&raw_value));
    }
}

fn env_var_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn parse_env_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.contains(',') {
        let items = trimmed
            .split(',')
            .map(|segment| parse_scalar(segment.trim()))
            .collect::<Vec<_>>();
        return Value::Array(items);
    }

    parse_scalar(trimmed)
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested_value(target: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    let map = ensure_object(target);
    if rest.is_empty() {
        map.insert(head.clone(), value);
        return;
    }

    let entry = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    set_nested_value(entry, rest, value);
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }

    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was coerced into an object above"),
    }
}
