// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;

use crate::errors::ServiceError;

/// Timeouts applied to every request made by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

/// Creates a reqwest client routed through `proxy_url` (for both http and https traffic) when
/// one is given.
pub fn build_client(
    proxy_url: Option<&str>,
    timeouts: Timeouts,
) -> Result<reqwest::Client, ServiceError> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read);
    if let Some(proxy) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy).map_err(|source| ServiceError::InvalidProxy {
            url: proxy.to_string(),
            source,
        })?;
        builder = builder.proxy(proxy);
    }
    builder.build().map_err(ServiceError::Client)
}
