// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities and mock destinations for integration tests

pub mod mocks;

use std::time::Duration;

pub const METRICS_PAYLOAD: &[u8] = br#"{"data":{"metrics":[{"name":"active_energy","units":"kJ","data":[{"qty":0.7685677437484512,"date":"2021-12-24 00:04:00 +0800"},{"qty":0.377848256251549,"date":"2021-12-24 00:05:00 +0800"}]},{"name":"basal_body_temperature","units":"degC","data":null}]}}"#;

/// Polls `condition` every few milliseconds until it holds or `limit` passes.
#[allow(dead_code)]
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
