// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Azure Storage Queue check.
//!
//! Polls a configured set of queues for the age of their oldest pending message and their
//! approximate depth, and reports both as gauges to Datadog. A single run plans the work from
//! the instance configuration, probes every queue on a bounded worker pool using a cached
//! queue service client, and emits one gauge pair per queue that was probed successfully.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod azure;
pub mod check;
pub mod config;
pub mod constants;
pub mod errors;
pub mod http;
pub mod planner;
pub mod poller;
pub mod service;
pub mod sink;
pub mod util;
