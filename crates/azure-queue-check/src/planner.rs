// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Expands the configured queue list into work items.
//!
//! Each configured queue is either a bare name or a `{name, tags}` record. Planning resolves
//! every entry into a [`WorkItem`] whose tags are the instance tags, then the queue's own tags,
//! then a synthesized `queue:<name>` tag, in that order.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error};

use crate::constants::QUEUE_TAG_PREFIX;

/// A queue entry as written in the instance configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueSpec {
    Name(String),
    Record {
        name: Option<String>,
        tags: Vec<String>,
    },
}

impl QueueSpec {
    fn name(&self) -> Option<&str> {
        match self {
            QueueSpec::Name(name) => Some(name.as_str()),
            QueueSpec::Record { name, .. } => name.as_deref(),
        }
    }

    fn tags(&self) -> &[String] {
        match self {
            QueueSpec::Name(_) => &[],
            QueueSpec::Record { tags, .. } => tags,
        }
    }
}

impl From<&str> for QueueSpec {
    fn from(name: &str) -> Self {
        QueueSpec::Name(name.to_string())
    }
}

impl<'de> Deserialize<'de> for QueueSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(name) => Ok(QueueSpec::Name(name)),
            Value::Number(n) => Ok(QueueSpec::Name(n.to_string())),
            // An empty entry in the list disables it
            Value::Null => Ok(QueueSpec::Name(String::new())),
            Value::Object(mut map) => {
                let name = map.remove("name").and_then(value_to_string);
                let tags = match map.remove("tags") {
                    Some(Value::Array(values)) => {
                        values.into_iter().filter_map(value_to_string).collect()
                    }
                    Some(Value::Null) | None => Vec::new(),
                    Some(other) => {
                        error!("Failed to parse queue tags, expected a list, got: {other}, ignoring");
                        Vec::new()
                    }
                };
                Ok(QueueSpec::Record { name, tags })
            }
            other => Err(serde::de::Error::custom(format!(
                "expected a queue name or a mapping with a name, got: {other}"
            ))),
        }
    }
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => {
            error!("Failed to parse value, expected a string, got: {other}, ignoring");
            None
        }
    }
}

/// A queue to probe along with the full set of tags its gauges carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub queue: String,
    pub tags: Vec<String>,
}

/// Resolves the configured queues into work items, preserving their order.
///
/// Entries without a name are skipped. Duplicated names are kept and get probed twice.
pub fn plan(queue_specs: &[QueueSpec], default_tags: &[String]) -> Vec<WorkItem> {
    queue_specs
        .iter()
        .filter_map(|spec| {
            let name = match spec.name() {
                Some(name) if !name.is_empty() => name,
                _ => {
                    debug!("Skipping queue entry without a name: {spec:?}");
                    return None;
                }
            };

            let local_tags = spec.tags();
            let mut tags = Vec::with_capacity(default_tags.len() + local_tags.len() + 1);
            tags.extend_from_slice(default_tags);
            tags.extend_from_slice(local_tags);
            tags.push(format!("{QUEUE_TAG_PREFIX}{name}"));

            Some(WorkItem {
                queue: name.to_string(),
                tags,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tags_are_default_then_local_then_queue() {
        let specs = vec![QueueSpec::Record {
            name: Some("orders".to_string()),
            tags: strings(&["team:x"]),
        }];

        let items = plan(&specs, &strings(&["env:prod"]));

        assert_eq!(
            items,
            vec![WorkItem {
                queue: "orders".to_string(),
                tags: strings(&["env:prod", "team:x", "queue:orders"]),
            }]
        );
    }

    #[test]
    fn test_bare_name_gets_only_default_and_queue_tags() {
        let items = plan(&[QueueSpec::from("payments")], &strings(&["env:prod"]));
        assert_eq!(items[0].tags, strings(&["env:prod", "queue:payments"]));
    }

    #[test]
    fn test_entries_without_name_are_skipped() {
        let specs = vec![
            QueueSpec::from("a"),
            QueueSpec::from(""),
            QueueSpec::Record {
                name: None,
                tags: strings(&["team:x"]),
            },
            QueueSpec::Record {
                name: Some(String::new()),
                tags: Vec::new(),
            },
            QueueSpec::from("b"),
        ];

        let items = plan(&specs, &[]);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].queue, "a");
        assert_eq!(items[1].queue, "b");
    }

    #[test]
    fn test_input_order_and_duplicates_are_preserved() {
        let specs = vec![
            QueueSpec::from("c"),
            QueueSpec::from("a"),
            QueueSpec::from("c"),
        ];

        let queues: Vec<String> = plan(&specs, &[]).into_iter().map(|i| i.queue).collect();

        assert_eq!(queues, strings(&["c", "a", "c"]));
    }

    #[test]
    fn test_empty_input_plans_nothing() {
        assert!(plan(&[], &strings(&["env:prod"])).is_empty());
    }

    #[test]
    fn test_deserialize_mixed_queue_list() {
        let raw = serde_json::json!([
            "orders",
            42,
            null,
            {"name": "payments", "tags": ["team:billing", 7]},
            {"name": "no-tags"},
            {"tags": ["team:ghost"]}
        ]);

        let specs: Vec<QueueSpec> = serde_json::from_value(raw).expect("failed to deserialize");

        assert_eq!(
            specs,
            vec![
                QueueSpec::Name("orders".to_string()),
                QueueSpec::Name("42".to_string()),
                QueueSpec::Name(String::new()),
                QueueSpec::Record {
                    name: Some("payments".to_string()),
                    tags: strings(&["team:billing", "7"]),
                },
                QueueSpec::Record {
                    name: Some("no-tags".to_string()),
                    tags: Vec::new(),
                },
                QueueSpec::Record {
                    name: None,
                    tags: strings(&["team:ghost"]),
                },
            ]
        );
        assert_eq!(plan(&specs, &[]).len(), 4);
    }

    #[test]
    fn test_deserialize_rejects_nested_list() {
        let raw = serde_json::json!([["orders"]]);
        assert!(serde_json::from_value::<Vec<QueueSpec>>(raw).is_err());
    }
}
