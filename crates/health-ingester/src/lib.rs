// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous, retrying delivery of Health Auto Export payloads to pluggable
//! destinations.
//!
//! Every registered [`Destination`] gets its own [`queue::DestinationQueue`]
//! and worker task, so a slow destination never holds up another one. The
//! [`Ingester`] decodes incoming bytes and hands them to the right queue.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod destination;
pub mod destinations;
pub mod error;
pub mod ingester;
pub mod queue;
pub mod rate_limiter;

pub use destination::Destination;
pub use error::{BoxError, IngestError, WriteError};
pub use ingester::{Ingester, IngesterConfig};
pub use rate_limiter::BackoffConfig;
