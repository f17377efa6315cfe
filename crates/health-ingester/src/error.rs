// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use health_export::DecodeError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Synchronous errors returned to callers of the [`Ingester`](crate::Ingester).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("ingester is not yet started")]
    NotStarted,

    #[error("ingester is already started")]
    AlreadyStarted,

    #[error("cannot add destination {0} when already started")]
    RegisterAfterStart(String),

    #[error("destination {0} is already registered")]
    DuplicateDestination(String),

    #[error("invalid destination {0}")]
    UnregisteredDestination(String),

    #[error("no destinations registered")]
    NoDestinations,

    #[error("unmarshal error: {0}")]
    Decode(#[from] DecodeError),

    #[error("queue for destination {0} is shutting down")]
    QueueShutDown(String),
}

/// Failure reported by a [`Destination`](crate::Destination) write.
///
/// Only [`WriteError::Retryable`] is retried. Everything else drops the item.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("temporary error writing to destination, will retry again later: {0}")]
    Retryable(#[source] BoxError),

    #[error("{0}")]
    Permanent(#[source] BoxError),

    #[error("recovered from panic in destination: {0}")]
    Panicked(String),
}

impl WriteError {
    pub fn retryable(error: impl Into<BoxError>) -> Self {
        WriteError::Retryable(error.into())
    }

    pub fn permanent(error: impl Into<BoxError>) -> Self {
        WriteError::Permanent(error.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, WriteError::Retryable(_))
    }
}
