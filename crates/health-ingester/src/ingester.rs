// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, trace};

use crate::destination::Destination;
use crate::error::IngestError;
use crate::queue::DestinationQueue;
use crate::rate_limiter::BackoffConfig;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngesterConfig {
    pub backoff: BackoffConfig,
}

/// Routes decoded payloads to the queue of a named destination.
///
/// Destinations are registered up front, then [`Ingester::start`] spawns one
/// worker per destination. [`Ingester::ingest`] only decodes and enqueues;
/// delivery happens on the workers.
pub struct Ingester {
    config: IngesterConfig,
    queues: RwLock<HashMap<String, Arc<DestinationQueue>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Ingester {
    pub fn new(config: IngesterConfig) -> Self {
        Self {
            config,
            queues: RwLock::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn register_destination(&self, destination: Arc<dyn Destination>) -> Result<(), IngestError> {
        let name = destination.name().to_string();
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        if self.started.load(Ordering::Acquire) {
            return Err(IngestError::RegisterAfterStart(name));
        }
        if queues.contains_key(&name) {
            return Err(IngestError::DuplicateDestination(name));
        }

        debug!(destination = %name, "registered destination");
        let queue = DestinationQueue::new(destination, &self.config.backoff);
        queues.insert(name, Arc::new(queue));
        Ok(())
    }

    /// Spawns one worker per registered destination on the current tokio
    /// runtime.
    pub fn start(&self) -> Result<(), IngestError> {
        let queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        if self.started.load(Ordering::Acquire) {
            return Err(IngestError::AlreadyStarted);
        }
        if queues.is_empty() {
            return Err(IngestError::NoDestinations);
        }

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for queue in queues.values() {
            workers.push(tokio::spawn(Arc::clone(queue).run()));
        }
        self.started.store(true, Ordering::Release);

        let mut names: Vec<&str> = queues.keys().map(String::as_str).collect();
        names.sort_unstable();
        info!(destinations = ?names, "ingester started");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Decodes `bytes` and enqueues the payload for `destination`. Returns
    /// once the payload is queued, not once it is written.
    pub fn ingest(&self, bytes: &[u8], destination: &str, target: &str) -> Result<(), IngestError> {
        if !self.is_started() {
            return Err(IngestError::NotStarted);
        }

        let queue = self
            .queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(destination)
            .cloned()
            .ok_or_else(|| IngestError::UnregisteredDestination(destination.to_string()))?;

        let payload = health_export::decode(bytes)?;
        trace!(
            destination,
            target,
            metrics = payload.metrics().len(),
            workouts = payload.workouts().len(),
            "enqueueing payload"
        );
        queue.enqueue(payload, target)
    }

    /// Registered destination names, sorted.
    pub fn destinations(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    /// Items accepted for `destination` and not yet delivered or dropped.
    pub fn pending(&self, destination: &str) -> Option<usize> {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(destination)
            .map(|queue| queue.len())
    }

    /// Drains every queue concurrently, then waits for all workers to exit.
    ///
    /// New payloads are rejected as soon as their queue starts draining.
    /// Retryable failures keep being retried until they succeed, so this only
    /// returns once every accepted item has been delivered or dropped.
    pub async fn shutdown(&self) {
        let queues: Vec<Arc<DestinationQueue>> = self
            .queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        info!(destinations = queues.len(), "ingester shutting down");
        let mut drains = JoinSet::new();
        for queue in queues {
            drains.spawn(async move { queue.shutdown_with_drain().await });
        }
        while let Some(result) = drains.join_next().await {
            if let Err(e) = result {
                error!("destination queue drain failed: {e}");
            }
        }

        let workers: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                error!("destination queue worker failed: {e}");
            }
        }
        info!("ingester shut down");
    }
}

impl Default for Ingester {
    fn default() -> Self {
        Self::new(IngesterConfig::default())
    }
}
