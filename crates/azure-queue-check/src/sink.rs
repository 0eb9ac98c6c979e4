// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destinations for the gauges produced by a run.
//!
//! [`DogStatsdSink`] writes DogStatsD datagrams to a local Datadog agent. [`SeriesApiSink`]
//! buffers gauges and ships them to the v2 series intake on flush, for hosts without an agent.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, error};

use crate::constants::SERIES_GAUGE_TYPE;
use crate::errors::SinkError;

/// A single point-in-time observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Gauge {
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
}

impl Gauge {
    pub fn new(name: impl Into<String>, value: f64, tags: Vec<String>) -> Self {
        Self {
            name: name.into(),
            value,
            tags,
        }
    }

    /// DogStatsD text format, e.g. `custom.azure_queue.depth:3|g|#env:prod,queue:orders`
    ///
    /// Characters that delimit tags, fields or lines are replaced by `_` in each tag.
    pub fn to_dogstatsd(&self) -> String {
        if self.tags.is_empty() {
            format!("{}:{}|g", self.name, self.value)
        } else {
            let tags = self
                .tags
                .iter()
                .map(|tag| sanitize_tag(tag))
                .collect::<Vec<_>>()
                .join(",");
            format!("{}:{}|g|#{tags}", self.name, self.value)
        }
    }
}

fn sanitize_tag(tag: &str) -> String {
    tag.trim()
        .chars()
        .map(|ch| match ch {
            ',' | '|' | '\n' | '\r' => '_',
            ch => ch,
        })
        .collect()
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Submits gauges that belong together; they are delivered in order.
    async fn submit(&self, gauges: Vec<Gauge>) -> Result<(), SinkError>;

    /// Delivers anything the sink buffered. Called once at the end of every run.
    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

pub struct DogStatsdSink {
    socket: UdpSocket,
}

impl DogStatsdSink {
    pub async fn new(host: &str, port: u16) -> Result<Self, SinkError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((host, port)).await?;
        debug!("dogstatsd sink sending to {host}:{port}");
        Ok(Self { socket })
    }
}

#[async_trait]
impl MetricsSink for DogStatsdSink {
    async fn submit(&self, gauges: Vec<Gauge>) -> Result<(), SinkError> {
        if gauges.is_empty() {
            return Ok(());
        }
        let payload = gauges
            .iter()
            .map(Gauge::to_dogstatsd)
            .collect::<Vec<_>>()
            .join("\n");
        self.socket.send(payload.as_bytes()).await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct SeriesPayload<'a> {
    series: Vec<SeriesEntry<'a>>,
}

#[derive(Serialize)]
struct SeriesEntry<'a> {
    metric: &'a str,
    #[serde(rename = "type")]
    kind: u8,
    points: [Point; 1],
    tags: &'a [String],
}

#[derive(Serialize)]
struct Point {
    timestamp: i64,
    value: f64,
}

pub struct SeriesApiSink {
    client: reqwest::Client,
    api_key: String,
    series_url: String,
    buffer: Mutex<Vec<(i64, Gauge)>>,
}

impl SeriesApiSink {
    /// `intake_url` is the site prefix, e.g. `https://api.datadoghq.com`.
    pub fn new(
        api_key: &str,
        intake_url: &str,
        https_proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let mut builder = reqwest::Client::builder().use_rustls_tls().timeout(timeout);
        if let Some(proxy) = https_proxy {
            builder = builder.proxy(reqwest::Proxy::https(proxy)?);
        }
        Ok(Self {
            client: builder.build()?,
            api_key: api_key.to_string(),
            series_url: format!("{}/api/v2/series", intake_url.trim_end_matches('/')),
            buffer: Mutex::new(Vec::new()),
        })
    }

    pub fn intake_url_for_site(site: &str) -> String {
        format!("https://api.{site}")
    }

    fn take_buffer(&self) -> Vec<(i64, Gauge)> {
        match self.buffer.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl MetricsSink for SeriesApiSink {
    async fn submit(&self, gauges: Vec<Gauge>) -> Result<(), SinkError> {
        let timestamp = chrono::Utc::now().timestamp();
        let mut guard = match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.extend(gauges.into_iter().map(|gauge| (timestamp, gauge)));
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let buffered = self.take_buffer();
        if buffered.is_empty() {
            return Ok(());
        }
        let payload = SeriesPayload {
            series: buffered
                .iter()
                .map(|(timestamp, gauge)| SeriesEntry {
                    metric: &gauge.name,
                    kind: SERIES_GAUGE_TYPE,
                    points: [Point {
                        timestamp: *timestamp,
                        value: gauge.value,
                    }],
                    tags: &gauge.tags,
                })
                .collect(),
        };
        let body = serde_json::to_vec(&payload)?;

        debug!("Flushing {} series", buffered.len());
        let response = self
            .client
            .post(&self.series_url)
            .header("DD-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        match response.status() {
            StatusCode::ACCEPTED => Ok(()),
            status => {
                let message = response.text().await.unwrap_or_default();
                error!("{status}: Failed to push series to API: {message:?}");
                Err(SinkError::Status(status, message))
            }
        }
    }
}
