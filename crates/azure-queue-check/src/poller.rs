// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded fan-out over the planned work items.
//!
//! Every work item is probed in its own task, with at most `max_workers` probes in flight.
//! A probe that fails only drops its own queue: the error is logged and the remaining queues
//! are still probed and reported. A run returns once every item has either succeeded or
//! failed.

use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::constants::{DEPTH_METRIC, OLDEST_MESSAGE_AGE_METRIC};
use crate::errors::{ProbeError, ServiceError};
use crate::planner::WorkItem;
use crate::service::QueueService;
use crate::sink::{Gauge, MetricsSink};

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub queue: String,
    pub age_seconds: f64,
    pub depth: u64,
    pub tags: Vec<String>,
}

/// Outcome counts of a run. Failed queues are only visible here and in the logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Poller {
    namespace: String,
    max_workers: usize,
}

impl Poller {
    /// `max_workers` is clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn new(namespace: impl Into<String>, max_workers: usize) -> Self {
        let clamped = max_workers.clamp(1, Semaphore::MAX_PERMITS);
        if clamped != max_workers {
            warn!("max_workers {max_workers} is out of range, using {clamped}");
        }
        Self {
            namespace: namespace.into(),
            max_workers: clamped,
        }
    }

    /// Probes every work item and submits a gauge pair to `sink` for each queue probed
    /// successfully, as soon as that queue completes.
    pub async fn run<S>(
        &self,
        work_items: Vec<WorkItem>,
        service: Arc<S>,
        sink: &dyn MetricsSink,
    ) -> RunSummary
    where
        S: QueueService + ?Sized + 'static,
    {
        let mut summary = RunSummary::default();
        if work_items.is_empty() {
            debug!("No queues to probe");
            return summary;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut set = JoinSet::new();
        for item in work_items {
            let service = Arc::clone(&service);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                process_queue(service.as_ref(), item).await
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(result)) => {
                    summary.succeeded += 1;
                    self.emit(sink, result).await;
                }
                Ok(Err(e)) => {
                    summary.failed += 1;
                    error!("AzureQueueCheck: {e}, details: {:?}", e.source);
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("AzureQueueCheck: probe task failed: {e}");
                }
            }
        }

        if let Err(e) = sink.flush().await {
            warn!("Failed to flush metrics: {e}");
        }
        summary
    }

    async fn emit(&self, sink: &dyn MetricsSink, result: ProbeResult) {
        info!(
            "AzureQueueCheck: sending age={}, depth={} for {}",
            result.age_seconds, result.depth, result.queue
        );
        let ProbeResult {
            queue,
            age_seconds,
            depth,
            tags,
        } = result;
        let gauges = vec![
            Gauge::new(
                format!("{}.{OLDEST_MESSAGE_AGE_METRIC}", self.namespace),
                age_seconds,
                tags.clone(),
            ),
            Gauge::new(
                format!("{}.{DEPTH_METRIC}", self.namespace),
                depth as f64,
                tags,
            ),
        ];
        if let Err(e) = sink.submit(gauges).await {
            warn!("Failed to submit metrics for queue {queue}: {e}");
        }
    }
}

/// Probes the age and depth of a single queue.
pub async fn process_queue<S>(service: &S, item: WorkItem) -> Result<ProbeResult, ProbeError>
where
    S: QueueService + ?Sized,
{
    debug!("AzureQueueCheck: processing {}", item.queue);
    match probe(service, &item.queue).await {
        Ok((age_seconds, depth)) => Ok(ProbeResult {
            queue: item.queue,
            age_seconds,
            depth,
            tags: item.tags,
        }),
        Err(source) => Err(ProbeError {
            queue: item.queue,
            source,
        }),
    }
}

async fn probe<S>(service: &S, queue: &str) -> Result<(f64, u64), ServiceError>
where
    S: QueueService + ?Sized,
{
    let age_seconds = match service.peek_oldest(queue).await? {
        Some(message) => age_seconds(Utc::now() - message.insertion_time),
        None => {
            debug!("Queue {queue} is empty. Posting age as 0.");
            0.0
        }
    };
    let depth = service.approximate_depth(queue).await?.unwrap_or(0);
    Ok((age_seconds, depth))
}

/// Fractional seconds with microsecond resolution.
fn age_seconds(age: TimeDelta) -> f64 {
    match age.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => age.num_milliseconds() as f64 / 1000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::PeekedMessage;
    use crate::sink::tests::RecordingSink;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing_test::traced_test;

    #[derive(Clone)]
    enum Behavior {
        Ready {
            age: Option<ChronoDuration>,
            depth: Option<u64>,
        },
        Timeout,
    }

    #[derive(Default)]
    struct FakeService {
        queues: HashMap<String, Behavior>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeService {
        fn with(queues: &[(&str, Behavior)]) -> Self {
            Self {
                queues: queues
                    .iter()
                    .map(|(name, behavior)| (name.to_string(), behavior.clone()))
                    .collect(),
                ..Default::default()
            }
        }

        fn behavior(&self, queue: &str) -> Behavior {
            self.queues.get(queue).cloned().unwrap_or(Behavior::Ready {
                age: None,
                depth: Some(0),
            })
        }
    }

    #[async_trait]
    impl QueueService for FakeService {
        async fn peek_oldest(&self, queue: &str) -> Result<Option<PeekedMessage>, ServiceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.behavior(queue) {
                Behavior::Ready { age, .. } => Ok(age.map(|age| PeekedMessage {
                    insertion_time: Utc::now() - age,
                })),
                Behavior::Timeout => Err(ServiceError::Timeout("operation timed out".to_string())),
            }
        }

        async fn approximate_depth(&self, queue: &str) -> Result<Option<u64>, ServiceError> {
            match self.behavior(queue) {
                Behavior::Ready { depth, .. } => Ok(depth),
                Behavior::Timeout => Err(ServiceError::Timeout("operation timed out".to_string())),
            }
        }
    }

    fn item(queue: &str) -> WorkItem {
        WorkItem {
            queue: queue.to_string(),
            tags: vec![format!("queue:{queue}")],
        }
    }

    #[tokio::test]
    async fn test_empty_queue_reports_zero_age() {
        let service = FakeService::with(&[(
            "orders",
            Behavior::Ready {
                age: None,
                depth: Some(0),
            },
        )]);

        let result = process_queue(&service, item("orders"))
            .await
            .expect("probe failed");

        assert_eq!(result.age_seconds, 0.0);
        assert_eq!(result.depth, 0);
    }

    #[tokio::test]
    async fn test_missing_depth_reports_zero() {
        let service = FakeService::with(&[(
            "orders",
            Behavior::Ready {
                age: Some(ChronoDuration::seconds(90)),
                depth: None,
            },
        )]);

        let result = process_queue(&service, item("orders"))
            .await
            .expect("probe failed");

        assert_eq!(result.depth, 0);
        assert!(result.age_seconds >= 90.0 && result.age_seconds < 100.0);
    }

    #[tokio::test]
    async fn test_emits_age_then_depth_with_item_tags() {
        let service = Arc::new(FakeService::with(&[(
            "orders",
            Behavior::Ready {
                age: None,
                depth: Some(12),
            },
        )]));
        let sink = RecordingSink::default();
        let tags = vec![
            "env:prod".to_string(),
            "team:x".to_string(),
            "queue:orders".to_string(),
        ];

        let summary = Poller::new("custom.azure_queue", 5)
            .run(
                vec![WorkItem {
                    queue: "orders".to_string(),
                    tags: tags.clone(),
                }],
                service,
                &sink,
            )
            .await;

        assert_eq!(
            summary,
            RunSummary {
                succeeded: 1,
                failed: 0
            }
        );
        assert_eq!(
            sink.gauges(),
            vec![
                Gauge::new("custom.azure_queue.oldest_message_age", 0.0, tags.clone()),
                Gauge::new("custom.azure_queue.depth", 12.0, tags),
            ]
        );
        assert_eq!(sink.flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_queue_is_isolated() {
        let service = Arc::new(FakeService::with(&[
            ("a", Behavior::Timeout),
            (
                "b",
                Behavior::Ready {
                    age: None,
                    depth: Some(3),
                },
            ),
        ]));
        let sink = RecordingSink::default();

        let summary = Poller::new("ns", 5)
            .run(vec![item("a"), item("b")], service, &sink)
            .await;

        assert_eq!(
            summary,
            RunSummary {
                succeeded: 1,
                failed: 1
            }
        );
        let gauges = sink.gauges();
        assert_eq!(gauges.len(), 2);
        assert!(gauges.iter().all(|g| g.tags == vec!["queue:b".to_string()]));
        assert!(logs_contain("error processing queue a"));
    }

    #[tokio::test]
    async fn test_empty_work_list_emits_nothing() {
        let service = Arc::new(FakeService::default());
        let sink = RecordingSink::default();

        let summary = Poller::new("ns", 5).run(Vec::new(), service, &sink).await;

        assert_eq!(summary, RunSummary::default());
        assert!(sink.gauges().is_empty());
    }

    #[tokio::test]
    async fn test_never_more_probes_in_flight_than_workers() {
        let service = Arc::new(FakeService {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let sink = RecordingSink::default();
        let items = (0..12).map(|i| item(&format!("q{i}"))).collect();

        let summary = Poller::new("ns", 5)
            .run(items, Arc::clone(&service), &sink)
            .await;

        assert_eq!(summary.succeeded, 12);
        assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 5);
        assert_eq!(sink.gauges().len(), 24);
    }

    #[tokio::test]
    async fn test_huge_worker_count_is_clamped() {
        let service = Arc::new(FakeService::default());
        let sink = RecordingSink::default();

        let summary = Poller::new("ns", usize::MAX)
            .run(vec![item("a")], service, &sink)
            .await;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(sink.gauges().len(), 2);
    }

    #[test]
    fn test_age_keeps_microseconds() {
        assert_eq!(age_seconds(TimeDelta::microseconds(1_500_250)), 1.50025);
        assert_eq!(age_seconds(TimeDelta::zero()), 0.0);
        assert_eq!(age_seconds(TimeDelta::days(200_000_000)), 17_280_000_000_000.0);
    }

    #[tokio::test]
    async fn test_zero_workers_still_makes_progress() {
        let service = Arc::new(FakeService::default());
        let sink = RecordingSink::default();

        let summary = Poller::new("ns", 0)
            .run(vec![item("a"), item("b")], Arc::clone(&service), &sink)
            .await;

        assert_eq!(summary.succeeded, 2);
        assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 1);
    }
}
