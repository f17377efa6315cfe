// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use health_export::{codec, Payload};

use crate::destination::Destination;
use crate::error::WriteError;

pub const STDOUT_NAME: &str = "Stdout";

/// Prints each payload for debugging: a summary line followed by the payload
/// in its canonical encoding.
pub struct Stdout {
    writer: Mutex<Box<dyn Write + Send>>,
    written: AtomicU64,
}

impl Stdout {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            written: AtomicU64::new(0),
        }
    }

    /// Payloads printed so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

impl Default for Stdout {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Destination for Stdout {
    fn name(&self) -> &str {
        STDOUT_NAME
    }

    async fn write(&self, payload: &Payload, target: &str) -> Result<(), WriteError> {
        // encoding a decoded payload cannot be fixed by retrying
        let encoded = codec::encode_to_string(payload).map_err(WriteError::permanent)?;

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(
            writer,
            "target={target:?} metrics={} workouts={}",
            payload.metrics().len(),
            payload.workouts().len()
        )
        .and_then(|_| writeln!(writer, "{encoded}"))
        .and_then(|_| writer.flush())
        .map_err(WriteError::retryable)?;

        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
