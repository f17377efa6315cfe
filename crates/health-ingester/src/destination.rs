// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use health_export::Payload;

use crate::error::WriteError;

/// A storage target for decoded payloads.
///
/// `write` may be called many times with the same payload when earlier
/// attempts returned [`WriteError::Retryable`], so implementations must
/// tolerate repeated delivery. The payload is only borrowed for the duration
/// of the call.
#[async_trait]
pub trait Destination: Send + Sync + 'static {
    /// Stable identifier used for queue binding, routing and logging.
    fn name(&self) -> &str;

    async fn write(&self, payload: &Payload, target: &str) -> Result<(), WriteError>;
}
