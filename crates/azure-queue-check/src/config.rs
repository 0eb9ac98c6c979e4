// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Check configuration.
//!
//! The check is configured like any Datadog agent check, with an `init_config` section shared by
//! every instance and a list of `instances`:
//!
//! ```yaml
//! init_config:
//!   namespace: custom.azure_queue
//!   max_workers: 5
//!   min_collection_interval: 15
//! instances:
//!   - connection_string: DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=...
//!     proxy_url: http://proxy.internal:3128
//!     tags:
//!       - env:prod
//!     queues:
//!       - orders
//!       - name: payments
//!         tags:
//!           - team:billing
//! ```
//!
//! Sources are applied in priority order:
//! 1. Defaults
//! 2. YAML file
//! 3. Environment variables prefixed with `DD_AZURE_QUEUE_`, with nested keys separated by
//!    `__` (e.g. `DD_AZURE_QUEUE_INIT_CONFIG__MAX_WORKERS=8`)

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{error, warn};

use crate::constants::{DEFAULT_MAX_WORKERS, DEFAULT_MIN_COLLECTION_INTERVAL, DEFAULT_NAMESPACE};
use crate::errors::ConfigError;
use crate::planner::QueueSpec;
use crate::service::ConnectionIdentity;
use crate::util::parse_metric_namespace;

pub const ENV_PREFIX: &str = "DD_AZURE_QUEUE_";

/// Process-level variables sharing [`ENV_PREFIX`] that are not check settings.
const RESERVED_ENV_KEYS: [&str; 2] = ["config", "run_once"];

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct CheckConfig {
    #[serde(deserialize_with = "deserialize_null_default")]
    pub init_config: InitConfig,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub namespace: Option<String>,
    pub max_workers: usize,
    /// Seconds between two runs of an instance
    pub min_collection_interval: u64,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            max_workers: DEFAULT_MAX_WORKERS,
            min_collection_interval: DEFAULT_MIN_COLLECTION_INTERVAL,
        }
    }
}

impl InitConfig {
    /// The validated metric namespace, or the default one.
    pub fn namespace(&self) -> String {
        match self.namespace.as_deref() {
            None => DEFAULT_NAMESPACE.to_string(),
            Some(raw) => parse_metric_namespace(raw).unwrap_or_else(|| {
                warn!("Invalid namespace '{raw}', using {DEFAULT_NAMESPACE}");
                DEFAULT_NAMESPACE.to_string()
            }),
        }
    }
}

#[derive(Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct InstanceConfig {
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub connection_string: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub proxy_url: Option<String>,
    #[serde(deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub queues: Vec<QueueSpec>,
    /// Overrides `init_config.min_collection_interval` for this instance
    pub min_collection_interval: Option<u64>,
}

impl InstanceConfig {
    /// The connection identity of this instance, or `None` when no connection string is set.
    pub fn connection_identity(&self) -> Option<ConnectionIdentity> {
        let connection_string = self
            .connection_string
            .as_deref()
            .filter(|s| !s.trim().is_empty())?;
        Some(ConnectionIdentity::new(
            connection_string,
            self.proxy_url.clone(),
        ))
    }

    pub fn collection_interval(&self, init_config: &InitConfig) -> Duration {
        let secs = self
            .min_collection_interval
            .unwrap_or(init_config.min_collection_interval);
        Duration::from_secs(secs.max(1))
    }
}

impl std::fmt::Debug for InstanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceConfig")
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "<redacted>"),
            )
            .field("proxy_url", &self.proxy_url)
            .field("tags", &self.tags)
            .field("queues", &self.queues)
            .field("min_collection_interval", &self.min_collection_interval)
            .finish()
    }
}

/// Loads the check configuration from `path`, then from `DD_AZURE_QUEUE_*` variables.
///
/// A missing file is not an error; it yields the defaults (and no instances).
pub fn load(path: &Path) -> Result<CheckConfig, ConfigError> {
    Figment::new()
        .merge(Yaml::file(path))
        .merge(
            Env::prefixed(ENV_PREFIX)
                .split("__")
                .ignore(&RESERVED_ENV_KEYS),
        )
        .extract::<CheckConfig>()
        .map_err(|e| ConfigError::Load(Box::new(e)))
}

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Null => Ok(None),
        other => {
            error!(
                "Failed to parse value, expected a string, got: {}, ignoring",
                other
            );
            Ok(None)
        }
    }
}

/// Accepts a list of tags, or a single string of comma or space separated tags.
pub fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(values) => Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                other => {
                    error!("Failed to parse tag, expected a string, got: {other}, ignoring");
                    None
                }
            })
            .collect()),
        Value::String(s) => Ok(s
            .replace(',', " ")
            .split_whitespace()
            .map(str::to_string)
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => {
            error!("Failed to parse tags, expected a list, got: {other}, ignoring");
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_FILE: &str = "azure_queue.yaml";

    #[test]
    fn test_missing_file_yields_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();

            let config = load(Path::new(CONFIG_FILE)).expect("failed to load");

            assert_eq!(config, CheckConfig::default());
            assert_eq!(config.init_config.max_workers, DEFAULT_MAX_WORKERS);
            assert_eq!(config.init_config.namespace(), DEFAULT_NAMESPACE);
            Ok(())
        });
    }

    #[test]
    fn test_load_full_yaml() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                CONFIG_FILE,
                r#"
init_config:
  namespace: azure.queues
  max_workers: 8
  min_collection_interval: 30
instances:
  - connection_string: AccountName=acct;AccountKey=a2V5
    proxy_url: http://proxy.internal:3128
    tags:
      - env:prod
    queues:
      - orders
      - name: payments
        tags:
          - team:billing
      - name: ""
    min_collection_interval: 60
"#,
            )?;

            let config = load(Path::new(CONFIG_FILE)).expect("failed to load");

            assert_eq!(config.init_config.namespace(), "azure.queues");
            assert_eq!(config.init_config.max_workers, 8);
            assert_eq!(config.instances.len(), 1);
            let instance = &config.instances[0];
            assert_eq!(
                instance.connection_identity(),
                Some(ConnectionIdentity::new(
                    "AccountName=acct;AccountKey=a2V5",
                    Some("http://proxy.internal:3128".to_string()),
                ))
            );
            assert_eq!(instance.tags, vec!["env:prod".to_string()]);
            assert_eq!(
                instance.queues,
                vec![
                    QueueSpec::Name("orders".to_string()),
                    QueueSpec::Record {
                        name: Some("payments".to_string()),
                        tags: vec!["team:billing".to_string()],
                    },
                    QueueSpec::Record {
                        name: Some(String::new()),
                        tags: Vec::new(),
                    },
                ]
            );
            assert_eq!(
                instance.collection_interval(&config.init_config),
                Duration::from_secs(60)
            );
            Ok(())
        });
    }

    #[test]
    fn test_empty_sections_are_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                CONFIG_FILE,
                r#"
init_config:
instances:
  - connection_string: AccountName=acct;AccountKey=a2V5
    tags:
    queues:
"#,
            )?;

            let config = load(Path::new(CONFIG_FILE)).expect("failed to load");

            assert_eq!(config.init_config, InitConfig::default());
            let instance = &config.instances[0];
            assert!(instance.tags.is_empty());
            assert!(instance.queues.is_empty());
            assert_eq!(
                instance.collection_interval(&config.init_config),
                Duration::from_secs(DEFAULT_MIN_COLLECTION_INTERVAL)
            );
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_yaml() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                CONFIG_FILE,
                r#"
init_config:
  max_workers: 8
"#,
            )?;
            jail.set_env("DD_AZURE_QUEUE_INIT_CONFIG__MAX_WORKERS", 2);
            jail.set_env("DD_AZURE_QUEUE_RUN_ONCE", "true");

            let config = load(Path::new(CONFIG_FILE)).expect("failed to load");

            assert_eq!(config.init_config.max_workers, 2);
            Ok(())
        });
    }

    #[test]
    fn test_blank_connection_string_has_no_identity() {
        let instance = InstanceConfig {
            connection_string: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(instance.connection_identity(), None);
        assert_eq!(InstanceConfig::default().connection_identity(), None);
    }

    #[test]
    fn test_tags_as_string() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                CONFIG_FILE,
                r#"
instances:
  - connection_string: AccountName=acct;AccountKey=a2V5
    tags: "env:prod, team:x"
"#,
            )?;

            let config = load(Path::new(CONFIG_FILE)).expect("failed to load");

            assert_eq!(
                config.instances[0].tags,
                vec!["env:prod".to_string(), "team:x".to_string()]
            );
            Ok(())
        });
    }

    #[test]
    fn test_invalid_namespace_falls_back_to_default() {
        let init_config = InitConfig {
            namespace: Some("azure-queue".to_string()),
            ..Default::default()
        };
        assert_eq!(init_config.namespace(), DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_debug_redacts_connection_string() {
        let instance = InstanceConfig {
            connection_string: Some("AccountName=acct;AccountKey=secret".to_string()),
            ..Default::default()
        };
        assert!(!format!("{instance:?}").contains("secret"));
    }
}
