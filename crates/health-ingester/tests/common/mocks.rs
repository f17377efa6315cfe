// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock destinations with scripted failures

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use health_export::Payload;
use health_ingester::{Destination, WriteError};

/// Successful write as seen by a mock.
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub payload: Payload,
    pub target: String,
}

#[derive(Default)]
struct Recorder {
    writes: Mutex<Vec<RecordedWrite>>,
    calls: AtomicUsize,
}

impl Recorder {
    fn call(&self) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record(&self, payload: &Payload, target: &str) {
        self.writes.lock().unwrap().push(RecordedWrite {
            payload: payload.clone(),
            target: target.to_string(),
        });
    }
}

/// Records every write; fails permanently while `should_error` is set.
pub struct MockDestination {
    name: String,
    recorder: Recorder,
    should_error: AtomicBool,
    delay: Duration,
}

impl MockDestination {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            recorder: Recorder::default(),
            should_error: AtomicBool::new(false),
            delay: Duration::ZERO,
        }
    }

    /// Every write takes `delay` before it succeeds.
    pub fn slow(name: &str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(name)
        }
    }

    pub fn set_should_error(&self, should_error: bool) {
        self.should_error.store(should_error, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.recorder.writes.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.recorder.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Destination for MockDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, payload: &Payload, target: &str) -> Result<(), WriteError> {
        self.recorder.call();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.should_error.load(Ordering::SeqCst) {
            return Err(WriteError::permanent("mock destination error"));
        }
        self.recorder.record(payload, target);
        Ok(())
    }
}

/// Fails with a retryable error for the first `failures` calls, then
/// succeeds.
pub struct FlakyDestination {
    failures: usize,
    recorder: Recorder,
}

impl FlakyDestination {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            recorder: Recorder::default(),
        }
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.recorder.writes.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.recorder.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Destination for FlakyDestination {
    fn name(&self) -> &str {
        "Flaky"
    }

    async fn write(&self, payload: &Payload, target: &str) -> Result<(), WriteError> {
        if self.recorder.call() <= self.failures {
            return Err(WriteError::retryable("service unavailable"));
        }
        self.recorder.record(payload, target);
        Ok(())
    }
}

/// Panics on every write whose target is `"panic"`, records the rest.
#[derive(Default)]
pub struct PanickingDestination {
    recorder: Recorder,
}

impl PanickingDestination {
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.recorder.writes.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.recorder.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Destination for PanickingDestination {
    fn name(&self) -> &str {
        "Panicking"
    }

    async fn write(&self, payload: &Payload, target: &str) -> Result<(), WriteError> {
        self.recorder.call();
        if target == "panic" {
            panic!("mock destination panicked");
        }
        self.recorder.record(payload, target);
        Ok(())
    }
}
