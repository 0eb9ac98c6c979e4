// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Storage account connection string parsing.
//!
//! A connection string is a `;`-separated list of `Key=Value` pairs, e.g.
//! ```text
//! DefaultEndpointsProtocol=https;AccountName=myaccount;AccountKey=base64key==;EndpointSuffix=core.windows.net
//! ```
//! Keys are matched case-insensitively. Values may themselves contain `=` (account keys and SAS
//! tokens usually do), so only the first `=` of a pair separates key from value.

use crate::constants::{
    DEFAULT_ENDPOINT_PROTOCOL, DEFAULT_ENDPOINT_SUFFIX, DEVELOPMENT_ACCOUNT_KEY,
    DEVELOPMENT_ACCOUNT_NAME, DEVELOPMENT_QUEUE_ENDPOINT,
};
use crate::errors::ServiceError;

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    SharedKey { account_name: String, key: String },
    SharedAccessSignature(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::SharedKey { account_name, .. } => f
                .debug_struct("SharedKey")
                .field("account_name", account_name)
                .finish_non_exhaustive(),
            Credential::SharedAccessSignature(_) => write!(f, "SharedAccessSignature"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    /// Base URL of the queue service, without a trailing slash
    pub queue_endpoint: String,
    pub credential: Credential,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let mut protocol = None;
        let mut account_name = None;
        let mut account_key = None;
        let mut endpoint_suffix = None;
        let mut queue_endpoint = None;
        let mut sas = None;
        let mut development = false;

        for pair in raw.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((key, value)) = pair.split_once('=') else {
                return Err(ServiceError::InvalidConnectionString(format!(
                    "expected Key=Value, got segment without '=' near '{}'",
                    key_hint(pair)
                )));
            };
            let value = value.trim().to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "defaultendpointsprotocol" => protocol = Some(value),
                "accountname" => account_name = Some(value),
                "accountkey" => account_key = Some(value),
                "endpointsuffix" => endpoint_suffix = Some(value),
                "queueendpoint" => queue_endpoint = Some(value),
                "sharedaccesssignature" => sas = Some(value),
                "usedevelopmentstorage" => development = value.eq_ignore_ascii_case("true"),
                // BlobEndpoint, TableEndpoint, ... are irrelevant for queues
                _ => {}
            }
        }

        if development {
            return Ok(Self {
                queue_endpoint: DEVELOPMENT_QUEUE_ENDPOINT.to_string(),
                credential: Credential::SharedKey {
                    account_name: DEVELOPMENT_ACCOUNT_NAME.to_string(),
                    key: DEVELOPMENT_ACCOUNT_KEY.to_string(),
                },
            });
        }

        let credential = match (account_name.clone(), account_key, sas) {
            (Some(account_name), Some(key), _) if !key.is_empty() => {
                Credential::SharedKey { account_name, key }
            }
            (_, _, Some(sas)) if !sas.is_empty() => {
                Credential::SharedAccessSignature(sas.trim_start_matches('?').to_string())
            }
            _ => {
                return Err(ServiceError::InvalidConnectionString(
                    "expected AccountName and AccountKey, or SharedAccessSignature".to_string(),
                ))
            }
        };

        let queue_endpoint = match queue_endpoint {
            Some(endpoint) if !endpoint.is_empty() => endpoint,
            _ => {
                let account_name = account_name.filter(|name| !name.is_empty()).ok_or_else(|| {
                    ServiceError::InvalidConnectionString(
                        "expected AccountName or QueueEndpoint".to_string(),
                    )
                })?;
                format!(
                    "{}://{}.queue.{}",
                    protocol.as_deref().unwrap_or(DEFAULT_ENDPOINT_PROTOCOL),
                    account_name,
                    endpoint_suffix
                        .as_deref()
                        .unwrap_or(DEFAULT_ENDPOINT_SUFFIX)
                )
            }
        };

        Ok(Self {
            queue_endpoint: queue_endpoint.trim_end_matches('/').to_string(),
            credential,
        })
    }
}

// Only the first few characters, the segment may be a secret
fn key_hint(segment: &str) -> String {
    segment.chars().take(4).collect::<String>() + "..."
}
