//! Layered configuration for every core component (spec §1.1 ambient
//! stack): defaults, an optional TOML file, then `SYNAPSE_`-prefixed
//! environment variables, in that override order.
//!
//! Scaled down from the teacher's `config::loader::ConfigLoader` per
//! spec.md §1 ("Configuration loading ... injected; the core treats them
//! as opaque services" — meaning secrets vaults, hot-reload watcher
//! threads, and encrypted sources are not reimplemented here). What stays
//! is the layering itself: every tunable named in spec.md §9 ("pick
//! defaults and expose them as configuration") is reachable from a single
//! `AppConfig::load`.

mod error;

pub use error::ConfigError;

use serde::{Deserialize, Serialize};

use synapse_broker::BrokerConfig;
use synapse_monitor::MonitorConfig;
use synapse_scheduler::SchedulerConfig;

/// Environment variable prefix recognized by [`AppConfig::load`], mirroring
/// the teacher's `AGENT_AGENCY_` convention (`config/src/loader.rs`).
pub const ENV_PREFIX: &str = "SYNAPSE";

/// The complete tunable surface of the orchestration core, aggregating the
/// per-crate config structs that already carry their own `Default` impls
/// (spec §9: "Fair-share tokens and aging boost constants are not explicit
/// in the source; pick defaults and expose them as configuration").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub broker: BrokerConfig,
    pub monitor: MonitorConfig,
}

impl AppConfig {
    /// Load layered configuration: built-in [`Default`] values, overridden
    /// by `path` if it exists, overridden again by any `SYNAPSE__*`
    /// environment variable (double-underscore section separator, e.g.
    /// `SYNAPSE__BROKER__MAX_CONCURRENT=8`).
    ///
    /// A missing `path` is not an error — defaults plus environment
    /// overrides are a complete, valid configuration on their own. The
    /// file and environment layers are parsed by the `config` crate into a
    /// partial document (only the keys an operator actually set), which is
    /// then deep-merged onto the in-process [`Default`] so a config file
    /// naming only `broker.maxConcurrent` never has to repeat every other
    /// field.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
                tracing::info!(path = %path.display(), "loaded configuration file");
            } else {
                tracing::debug!(path = %path.display(), "configuration file not found, using defaults");
            }
        }

        let builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let overrides: serde_json::Value = builder
            .build()
            .map_err(ConfigError::Build)?
            .try_deserialize()
            .map_err(ConfigError::Build)?;

        let defaults = serde_json::to_value(AppConfig::default())
            .map_err(|source| ConfigError::Serialize { source })?;

        // The `config` crate lower-cases every environment-derived key
        // (`MAX_BURST` -> `max_burst`), while every config struct here
        // spells its fields `camelCase` to match the wire envelopes (spec
        // §6). Re-camel-case environment-sourced keys before merging so
        // `SYNAPSE__SCHEDULER__MAX_BURST` lands on the same key as the
        // struct's own `maxBurst` field; TOML-file keys are written
        // camelCase by the operator already and pass through unchanged.
        let overrides = camel_case_keys(overrides);

        let merged = if overrides.is_object() {
            merge_json(defaults, overrides)
        } else {
            defaults
        };
        serde_json::from_value(merged).map_err(|source| ConfigError::Serialize { source })
    }

    /// Load using only built-in defaults and environment overrides, no file.
    pub fn load_defaults() -> Result<Self, ConfigError> {
        Self::load(None)
    }
}

/// Recursively overlay `overrides` onto `base`: objects merge key by key,
/// any other value (including arrays) replaces the base value wholesale.
fn merge_json(base: serde_json::Value, overrides: serde_json::Value) -> serde_json::Value {
    match (base, overrides) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_value) in override_map {
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => merge_json(base_value, override_value),
                    None => override_value,
                };
                base_map.insert(key, merged_value);
            }
            serde_json::Value::Object(base_map)
        }
        (_, overrides) => overrides,
    }
}

/// Recursively rewrite every object key from `snake_case` to `camelCase`;
/// keys with no underscore (already camelCase, or single-word) pass
/// through unchanged.
fn camel_case_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let rewritten = map
                .into_iter()
                .map(|(key, value)| (to_camel_case(&key), camel_case_keys(value)))
                .collect();
            serde_json::Value::Object(rewritten)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(camel_case_keys).collect())
        }
        other => other,
    }
}

fn to_camel_case(key: &str) -> String {
    let mut parts = key.split('_');
    let Some(first) = parts.next() else {
        return key.to_string();
    };
    let mut camel = first.to_string();
    for part in parts {
        let mut chars = part.chars();
        match chars.next() {
            Some(c) => {
                camel.push(c.to_ascii_uppercase());
                camel.push_str(chars.as_str());
            }
            None => {}
        }
    }
    camel
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_round_trip_through_the_builder() {
        let config = AppConfig::load_defaults().expect("defaults must deserialize");
        assert_eq!(config.broker.max_concurrent, BrokerConfig::default().max_concurrent);
        assert_eq!(config.scheduler.aging_cap, SchedulerConfig::default().aging_cap);
    }

    #[test]
    fn toml_file_overrides_a_default() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[broker]\nmaxConcurrent = 9").unwrap();
        writeln!(file, "[scheduler]\nagingCap = 45.0").unwrap();

        let config = AppConfig::load(Some(file.path())).expect("file config must load");
        assert_eq!(config.broker.max_concurrent, 9);
        assert_eq!(config.scheduler.aging_cap, 45.0);
        // Untouched fields keep their defaults.
        assert_eq!(config.broker.command, BrokerConfig::default().command);
    }

    #[test]
    fn environment_variable_overrides_file_and_defaults() {
        std::env::set_var("SYNAPSE__SCHEDULER__MAX_BURST", "9.5");
        let config = AppConfig::load_defaults().expect("env-only config must load");
        std::env::remove_var("SYNAPSE__SCHEDULER__MAX_BURST");
        assert_eq!(config.scheduler.max_burst, 9.5);
    }
}
