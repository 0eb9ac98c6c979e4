// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::ServiceError;

/// The head of a queue as seen by a non-destructive peek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeekedMessage {
    pub insertion_time: DateTime<Utc>,
}

/// Read-only view of a queue backend. Implementations are shared across concurrent probes.
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Returns the message at the head of the queue without changing its visibility, or
    /// `None` when the queue is empty.
    async fn peek_oldest(&self, queue: &str) -> Result<Option<PeekedMessage>, ServiceError>;

    /// Returns the approximate number of pending messages, if the backend reports one.
    async fn approximate_depth(&self, queue: &str) -> Result<Option<u64>, ServiceError>;
}

/// Everything a queue service client is built from. Two equal identities always yield
/// interchangeable clients.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionIdentity {
    pub connection_string: String,
    pub proxy_url: Option<String>,
}

impl ConnectionIdentity {
    pub fn new(connection_string: impl Into<String>, proxy_url: Option<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            proxy_url,
        }
    }
}

// The connection string carries the account key, never print it
impl std::fmt::Debug for ConnectionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionIdentity")
            .field("connection_string", &"<redacted>")
            .field("proxy_url", &self.proxy_url)
            .finish()
    }
}

pub trait ServiceFactory: Send + Sync {
    type Service: QueueService + 'static;

    fn build(&self, identity: &ConnectionIdentity) -> Result<Self::Service, ServiceError>;
}

/// Holds at most one queue service client, rebuilt only when the connection identity changes.
pub struct ClientCache<F: ServiceFactory> {
    factory: F,
    current: Option<(ConnectionIdentity, Arc<F::Service>)>,
}

impl<F: ServiceFactory> ClientCache<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            current: None,
        }
    }

    /// Returns the cached client for `identity`, building a new one first if nothing is cached
    /// yet or the cached client was built from a different identity.
    ///
    /// On failure the previously cached client, if any, is left in place.
    pub fn ensure_client(
        &mut self,
        identity: &ConnectionIdentity,
    ) -> Result<Arc<F::Service>, ServiceError> {
        if let Some((cached_identity, service)) = &self.current {
            if cached_identity == identity {
                debug!("Reusing cached queue service client");
                return Ok(Arc::clone(service));
            }
        }

        info!("Initializing queue service client");
        if let Some(proxy) = &identity.proxy_url {
            info!("Using proxy: {proxy}");
        }
        let service = Arc::new(self.factory.build(identity)?);
        self.current = Some((identity.clone(), Arc::clone(&service)));
        Ok(service)
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn current(&self) -> Option<Arc<F::Service>> {
        self.current
            .as_ref()
            .map(|(_, service)| Arc::clone(service))
    }
}
