// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, path::PathBuf, process::ExitCode, sync::Arc};
use tokio::{
    task::JoinSet,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use azure_queue_check::{
    check::AzureQueueCheck,
    config::{self, CheckConfig, InitConfig, InstanceConfig},
    constants::{DEFAULT_DOGSTATSD_HOST, DEFAULT_DOGSTATSD_PORT, DEFAULT_SITE},
    sink::{DogStatsdSink, MetricsSink, SeriesApiSink},
};

const DEFAULT_CONFIG_PATH: &str = "azure_queue.yaml";
const SERIES_API_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("DD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    init_logging(&log_level);

    let config_path = env::var("DD_AZURE_QUEUE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let run_once = env::var("DD_AZURE_QUEUE_RUN_ONCE")
        .map(|val| matches!(val.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false);

    info!("Loading check configuration from {}", config_path.display());
    let CheckConfig {
        init_config,
        instances,
    } = match config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to load configuration: {e}. Shutting down.");
            return ExitCode::FAILURE;
        }
    };
    if instances.is_empty() {
        warn!("No instances configured. Shutting down.");
        return ExitCode::SUCCESS;
    }
    debug!("Loaded {} instances", instances.len());

    let sink = match build_sink().await {
        Ok(sink) => sink,
        Err(e) => {
            error!("Unable to start metrics sink: {e}. Shutting down.");
            return ExitCode::FAILURE;
        }
    };

    if run_once {
        return if run_all_once(&init_config, &instances, sink.as_ref()).await {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let mut set = JoinSet::new();
    for (index, instance) in instances.into_iter().enumerate() {
        let init_config = init_config.clone();
        let sink = Arc::clone(&sink);
        set.spawn(async move { run_forever(index, init_config, instance, sink).await });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping checks");
            set.abort_all();
        }
        Some(joined) = set.join_next() => {
            if let Err(e) = joined {
                error!("Check task ended unexpectedly: {e}");
            }
            set.abort_all();
        }
    }
    if let Err(e) = sink.flush().await {
        warn!("Failed to flush metrics on shutdown: {e}");
    }
    ExitCode::SUCCESS
}

fn init_logging(log_level: &str) {
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");
    let filter = EnvFilter::try_new(&env_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {e}");
    }
    debug!("Logging subsystem enabled");
}

/// Submits through the series API when an API key is set, otherwise through a local DogStatsD.
async fn build_sink() -> Result<Arc<dyn MetricsSink>, azure_queue_check::errors::SinkError> {
    if let Ok(api_key) = env::var("DD_API_KEY") {
        let site = env::var("DD_SITE").unwrap_or(DEFAULT_SITE.to_string());
        let https_proxy = env::var("DD_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();
        info!("Submitting metrics to the series API on {site}");
        let sink = SeriesApiSink::new(
            &api_key,
            &SeriesApiSink::intake_url_for_site(&site),
            https_proxy.as_deref(),
            SERIES_API_TIMEOUT,
        )?;
        return Ok(Arc::new(sink));
    }

    let host = env::var("DD_AGENT_HOST").unwrap_or(DEFAULT_DOGSTATSD_HOST.to_string());
    let port = env::var("DD_DOGSTATSD_PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(DEFAULT_DOGSTATSD_PORT);
    info!("Submitting metrics to DogStatsD on {host}:{port}");
    Ok(Arc::new(DogStatsdSink::new(&host, port).await?))
}

/// Runs every instance once. Returns false if any instance run was aborted; queues that
/// failed inside a run are only logged.
async fn run_all_once(
    init_config: &InitConfig,
    instances: &[InstanceConfig],
    sink: &dyn MetricsSink,
) -> bool {
    let mut healthy = true;
    for (index, instance) in instances.iter().enumerate() {
        let mut check = AzureQueueCheck::new(init_config);
        match check.check(instance, sink).await {
            Ok(summary) => {
                if summary.failed > 0 {
                    warn!("Instance {index}: {} queues failed", summary.failed);
                }
            }
            Err(e) => {
                error!("Instance {index}: {e}");
                healthy = false;
            }
        }
    }
    healthy
}

async fn run_forever(
    index: usize,
    init_config: InitConfig,
    instance: InstanceConfig,
    sink: Arc<dyn MetricsSink>,
) {
    let period = instance.collection_interval(&init_config);
    info!("Instance {index}: running every {}s", period.as_secs());

    let mut check = AzureQueueCheck::new(&init_config);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = check.check(&instance, sink.as_ref()).await {
            error!("Instance {index}: {e}");
        }
    }
}
