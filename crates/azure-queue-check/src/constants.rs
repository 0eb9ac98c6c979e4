// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Namespace prepended to every gauge when the configuration does not set one.
pub const DEFAULT_NAMESPACE: &str = "custom.azure_queue";

pub const OLDEST_MESSAGE_AGE_METRIC: &str = "oldest_message_age";
pub const DEPTH_METRIC: &str = "depth";

/// Prefix of the tag synthesized for every queue, e.g. `queue:orders`.
pub const QUEUE_TAG_PREFIX: &str = "queue:";

/// Maximum number of queues probed concurrently during a run.
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Seconds between two runs of the same instance.
pub const DEFAULT_MIN_COLLECTION_INTERVAL: u64 = 15;

// Kept short so a single unreachable queue cannot stall the whole batch
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Storage service REST version sent with every request
pub const AZURE_STORAGE_API_VERSION: &str = "2021-12-02";

pub const DEFAULT_ENDPOINT_PROTOCOL: &str = "https";
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

// Well-known Azurite credentials, see
// https://learn.microsoft.com/en-us/azure/storage/common/storage-use-azurite#well-known-storage-account-and-key
pub const DEVELOPMENT_ACCOUNT_NAME: &str = "devstoreaccount1";
pub const DEVELOPMENT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
pub const DEVELOPMENT_QUEUE_ENDPOINT: &str = "http://127.0.0.1:10001/devstoreaccount1";

pub const DEFAULT_DOGSTATSD_HOST: &str = "127.0.0.1";
pub const DEFAULT_DOGSTATSD_PORT: u16 = 8125;
pub const DEFAULT_SITE: &str = "datadoghq.com";

/// Datadog v2 series intake metric type for gauges
pub const SERIES_GAUGE_TYPE: u8 = 3;
