// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Instant;
use tracing::{debug, info};

use crate::azure::AzureServiceFactory;
use crate::config::{InitConfig, InstanceConfig};
use crate::errors::CheckError;
use crate::planner::plan;
use crate::poller::{Poller, RunSummary};
use crate::service::{ClientCache, ServiceFactory};
use crate::sink::MetricsSink;

/// One check session. Owns the cached queue service client so that consecutive runs of the
/// same instance reuse it.
pub struct AzureQueueCheck<F: ServiceFactory = AzureServiceFactory> {
    cache: ClientCache<F>,
    poller: Poller,
}

impl AzureQueueCheck<AzureServiceFactory> {
    pub fn new(init_config: &InitConfig) -> Self {
        Self::with_factory(AzureServiceFactory::default(), init_config)
    }
}

impl<F: ServiceFactory> AzureQueueCheck<F> {
    pub fn with_factory(factory: F, init_config: &InitConfig) -> Self {
        Self {
            cache: ClientCache::new(factory),
            poller: Poller::new(init_config.namespace(), init_config.max_workers),
        }
    }

    /// Runs the check once for `instance`, submitting gauges to `sink`.
    ///
    /// Fails without probing anything when the instance has no connection string or the
    /// queue service client cannot be built. Failures of individual queues are logged and
    /// only show up in the returned summary.
    pub async fn check(
        &mut self,
        instance: &InstanceConfig,
        sink: &dyn MetricsSink,
    ) -> Result<RunSummary, CheckError> {
        info!("AzureQueueCheck: starting check()");

        let identity = instance
            .connection_identity()
            .ok_or(CheckError::MissingConnectionString)?;
        let service = self
            .cache
            .ensure_client(&identity)
            .map_err(CheckError::ClientConstruction)?;

        let work_items = plan(&instance.queues, &instance.tags);
        debug!("AzureQueueCheck: planned {} queues", work_items.len());

        let start_time = Instant::now();
        let summary = self.poller.run(work_items, service, sink).await;
        info!(
            "AzureQueueCheck finished in {:.2}s ({} succeeded, {} failed)",
            start_time.elapsed().as_secs_f64(),
            summary.succeeded,
            summary.failed
        );
        Ok(summary)
    }
}
