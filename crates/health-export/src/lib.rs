// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Health Export
//!
//! Decoding and encoding of the JSON documents produced by the Health Auto
//! Export iOS app.
//!
//! - [`time`]: multi-format timestamp parsing with a last-format hint
//! - [`payload`]: the in-memory model, including open field capture and
//!   sleep layout resolution
//! - [`codec`]: byte-level entry points

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod codec;
pub mod errors;
pub mod payload;
pub mod time;

pub use codec::{decode, encode};
pub use errors::{DecodeError, EncodeError, TimeParseError};
pub use payload::{
    AggregatedSleep, Datapoint, DatapointWithUnit, Elevation, Field, FieldValue, Metric,
    MetricData, Payload, PayloadData, QtyWithUnit, RouteDatapoint, SleepEvent, Workout,
};
pub use time::{parse_time, Time};
