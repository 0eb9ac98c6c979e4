// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the Azure Storage Queue check.

use reqwest::StatusCode;

/// Errors returned by the queue service, either while building a client or while probing a
/// queue.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("invalid proxy url '{url}': {source}")]
    InvalidProxy {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid queue url: {0}")]
    Url(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("queue service returned {status} ({}): {message}", .code.as_deref().unwrap_or("no error code"))]
    Status {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },

    #[error("unexpected response: {0}")]
    Response(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(err.to_string())
        } else {
            ServiceError::Transport(err)
        }
    }
}

/// Failures that abort a whole check run before any queue is probed.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("connection_string is required")]
    MissingConnectionString,

    #[error("failed to initialize queue service client: {0}")]
    ClientConstruction(#[source] ServiceError),
}

/// Failure to probe a single queue. Isolated to that queue; sibling probes continue.
#[derive(Debug, thiserror::Error)]
#[error("error processing queue {queue}: {source}")]
pub struct ProbeError {
    pub queue: String,
    #[source]
    pub source: ServiceError,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to send to dogstatsd: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize series payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("failed to ship series: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("series intake returned {0}: {1}")]
    Status(StatusCode, String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}
