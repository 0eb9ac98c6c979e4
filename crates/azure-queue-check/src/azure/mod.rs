// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Azure Storage Queue client.
//!
//! Implements [`QueueService`] on top of the queue service REST API: a peek of a single message
//! for the oldest message age, and the queue metadata for the approximate message count.

pub mod auth;
pub mod connection_string;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::HeaderMap, Response, Url};
use tracing::debug;

use crate::constants::{AZURE_STORAGE_API_VERSION, CONNECT_TIMEOUT, READ_TIMEOUT};
use crate::errors::ServiceError;
use crate::http::{build_client, Timeouts};
use crate::service::{ConnectionIdentity, PeekedMessage, QueueService, ServiceFactory};
use auth::SharedKeySigner;
use connection_string::{ConnectionString, Credential};

const APPROXIMATE_MESSAGES_COUNT_HEADER: &str = "x-ms-approximate-messages-count";
const ERROR_CODE_HEADER: &str = "x-ms-error-code";

#[derive(Debug, Clone)]
enum Authorization {
    SharedKey(SharedKeySigner),
    SharedAccessSignature(String),
}

#[derive(Debug, Clone)]
pub struct AzureQueueService {
    client: reqwest::Client,
    endpoint: Url,
    authorization: Authorization,
}

impl AzureQueueService {
    pub fn new(
        connection_string: &str,
        proxy_url: Option<&str>,
        timeouts: Timeouts,
    ) -> Result<Self, ServiceError> {
        let parsed = ConnectionString::parse(connection_string)?;
        let endpoint = Url::parse(&parsed.queue_endpoint)
            .map_err(|e| ServiceError::Url(format!("{}: {e}", parsed.queue_endpoint)))?;
        if endpoint.cannot_be_a_base() {
            return Err(ServiceError::Url(format!(
                "{} cannot be used as a base url",
                parsed.queue_endpoint
            )));
        }
        let authorization = match parsed.credential {
            Credential::SharedKey { account_name, key } => {
                Authorization::SharedKey(SharedKeySigner::new(&account_name, &key)?)
            }
            Credential::SharedAccessSignature(token) => Authorization::SharedAccessSignature(token),
        };
        let client = build_client(proxy_url, timeouts)?;

        Ok(Self {
            client,
            endpoint,
            authorization,
        })
    }

    fn queue_url(&self, queue: &str, path: &[&str], query: &str) -> Result<Url, ServiceError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| ServiceError::Url(format!("{} has no path", self.endpoint)))?;
            segments.pop_if_empty().push(queue);
            segments.extend(path);
        }
        let query = match &self.authorization {
            Authorization::SharedAccessSignature(token) => format!("{query}&{token}"),
            Authorization::SharedKey(_) => query.to_string(),
        };
        url.set_query(Some(&query));
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Response, ServiceError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let mut request = self
            .client
            .get(url.clone())
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_STORAGE_API_VERSION);
        if let Authorization::SharedKey(signer) = &self.authorization {
            let authorization = signer.authorization(
                "GET",
                &url,
                &[
                    ("x-ms-date", date.as_str()),
                    ("x-ms-version", AZURE_STORAGE_API_VERSION),
                ],
            )?;
            request = request.header(reqwest::header::AUTHORIZATION, authorization);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let code = error_code(response.headers());
        let message = response.text().await.unwrap_or_default();
        Err(ServiceError::Status {
            status,
            code,
            message: error_message(&message),
        })
    }
}

#[async_trait]
impl QueueService for AzureQueueService {
    async fn peek_oldest(&self, queue: &str) -> Result<Option<PeekedMessage>, ServiceError> {
        let url = self.queue_url(queue, &["messages"], "numofmessages=1&peekonly=true")?;
        let body = self.get(url).await?.text().await?;
        parse_peek_response(&body)
    }

    async fn approximate_depth(&self, queue: &str) -> Result<Option<u64>, ServiceError> {
        let url = self.queue_url(queue, &[], "comp=metadata")?;
        let response = self.get(url).await?;
        let Some(count) = response.headers().get(APPROXIMATE_MESSAGES_COUNT_HEADER) else {
            debug!("Queue {queue} did not report {APPROXIMATE_MESSAGES_COUNT_HEADER}");
            return Ok(None);
        };
        count
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Some)
            .ok_or_else(|| {
                ServiceError::Response(format!(
                    "invalid {APPROXIMATE_MESSAGES_COUNT_HEADER} header: {count:?}"
                ))
            })
    }
}

/// Builds [`AzureQueueService`] clients with the given timeouts.
#[derive(Debug, Clone, Copy)]
pub struct AzureServiceFactory {
    pub timeouts: Timeouts,
}

impl Default for AzureServiceFactory {
    fn default() -> Self {
        Self {
            timeouts: Timeouts {
                connect: CONNECT_TIMEOUT,
                read: READ_TIMEOUT,
            },
        }
    }
}

impl ServiceFactory for AzureServiceFactory {
    type Service = AzureQueueService;

    fn build(&self, identity: &ConnectionIdentity) -> Result<AzureQueueService, ServiceError> {
        AzureQueueService::new(
            &identity.connection_string,
            identity.proxy_url.as_deref(),
            self.timeouts,
        )
    }
}

/// Extracts the insertion time of the first message of a `QueueMessagesList` document.
fn parse_peek_response(body: &str) -> Result<Option<PeekedMessage>, ServiceError> {
    let Some(message) = element_text(body, "QueueMessage") else {
        return Ok(None);
    };
    let insertion_time = element_text(message, "InsertionTime").ok_or_else(|| {
        ServiceError::Response("peeked message has no InsertionTime".to_string())
    })?;
    let insertion_time = DateTime::parse_from_rfc2822(insertion_time.trim())
        .map_err(|e| {
            ServiceError::Response(format!("invalid InsertionTime '{insertion_time}': {e}"))
        })?
        .with_timezone(&Utc);
    Ok(Some(PeekedMessage { insertion_time }))
}

/// Returns the text between the first `<tag>` and the following `</tag>`.
fn element_text<'a>(document: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = document.find(&open)? + open.len();
    let end = document[start..].find(&close)? + start;
    Some(&document[start..end])
}

fn error_code(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ERROR_CODE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn error_message(body: &str) -> String {
    element_text(body, "Message")
        .map(|message| message.lines().next().unwrap_or(message).to_string())
        .unwrap_or_else(|| body.trim().to_string())
}
