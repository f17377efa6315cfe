// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retrying delivery queue bound to a single destination.
//!
//! Items move between three places: `ready` (waiting for the worker),
//! `processing` (inside a `write` call) and `waiting` (sleeping out a retry
//! delay before going back to `ready`). The queue is drained once all three
//! are empty.

use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};
use std::time::{Duration, Instant};

use health_export::Payload;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::destination::Destination;
use crate::error::{IngestError, WriteError};
use crate::rate_limiter::{BackoffConfig, RetryRateLimiter};

type BacktraceSlot = Arc<Mutex<Option<String>>>;

tokio::task_local! {
    /// Where the panic hook leaves the backtrace of a panicking `write`.
    static WRITE_BACKTRACE: BacktraceSlot;
}

static PANIC_HOOK: Once = Once::new();

/// Chains a panic hook that records a backtrace for panics raised inside a
/// destination write. Other panics go to the previous hook unchanged.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let captured = WRITE_BACKTRACE.try_with(|slot| {
                *slot.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(Backtrace::force_capture().to_string());
            });
            if captured.is_err() {
                previous(info);
            }
        }));
    });
}

/// A decoded payload waiting for delivery.
///
/// Retries re-deliver the same instance; `id` keys its backoff state.
#[derive(Debug)]
pub struct QueueItem {
    id: u64,
    payload: Payload,
    target: String,
}

impl QueueItem {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Arc<QueueItem>>,
    waiting: usize,
    processing: usize,
    shutting_down: bool,
}

impl QueueState {
    fn is_drained(&self) -> bool {
        self.ready.is_empty() && self.waiting == 0 && self.processing == 0
    }
}

pub struct DestinationQueue {
    name: String,
    destination: Arc<dyn Destination>,
    limiter: RetryRateLimiter,
    state: Mutex<QueueState>,
    next_id: AtomicU64,
    item_ready: Notify,
    drained: Notify,
}

impl DestinationQueue {
    pub fn new(destination: Arc<dyn Destination>, backoff: &BackoffConfig) -> Self {
        Self {
            name: destination.name().to_string(),
            destination,
            limiter: RetryRateLimiter::new(backoff),
            state: Mutex::new(QueueState::default()),
            next_id: AtomicU64::new(0),
            item_ready: Notify::new(),
            drained: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a new item behind everything already ready. Rejected once the
    /// queue has started shutting down.
    pub fn enqueue(&self, payload: Payload, target: &str) -> Result<(), IngestError> {
        let item = Arc::new(QueueItem {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            payload,
            target: target.to_string(),
        });

        let mut state = self.state();
        if state.shutting_down {
            return Err(IngestError::QueueShutDown(self.name.clone()));
        }
        state.ready.push_back(item);
        drop(state);

        self.item_ready.notify_one();
        Ok(())
    }

    /// Items not yet delivered or dropped, including ones in flight or
    /// waiting out a retry delay.
    pub fn len(&self) -> usize {
        let state = self.state();
        state.ready.len() + state.waiting + state.processing
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Puts `item` back on the ready list after `delay`.
    ///
    /// Counted as waiting immediately, so the queue is not considered drained
    /// while the delay runs. Allowed during shutdown.
    fn enqueue_after(self: &Arc<Self>, item: Arc<QueueItem>, delay: Duration) {
        self.state().waiting += 1;

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = queue.state();
            state.waiting -= 1;
            state.ready.push_back(item);
            drop(state);
            queue.item_ready.notify_one();
        });
    }

    /// Waits for the next ready item. Returns `None` once the queue is
    /// shutting down and fully drained.
    async fn next_item(&self) -> Option<Arc<QueueItem>> {
        loop {
            let notified = self.item_ready.notified();
            {
                let mut state = self.state();
                if let Some(item) = state.ready.pop_front() {
                    state.processing += 1;
                    return Some(item);
                }
                if state.shutting_down && state.is_drained() {
                    return None;
                }
            }
            notified.await;
        }
    }

    fn done(&self) {
        let mut state = self.state();
        state.processing -= 1;
        let drained = state.is_drained();
        drop(state);

        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Stops accepting new items and waits until every item already accepted
    /// has been delivered or dropped. Retries keep running until then.
    pub async fn shutdown_with_drain(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            {
                let mut state = self.state();
                if !state.shutting_down {
                    debug!(destination = %self.name, "destination queue shutting down");
                    state.shutting_down = true;
                }
                if state.is_drained() {
                    break;
                }
            }
            // the worker may be parked on an empty queue
            self.item_ready.notify_one();
            drained.await;
        }
        self.item_ready.notify_one();
        debug!(destination = %self.name, "destination queue drained");
    }

    /// Worker loop. Runs until [`DestinationQueue::shutdown_with_drain`] has
    /// been called and the queue is drained.
    pub async fn run(self: Arc<Self>) {
        debug!(destination = %self.name, "destination queue worker started");
        while let Some(item) = self.next_item().await {
            self.process(&item).await;
            self.done();
        }
        debug!(destination = %self.name, "destination queue worker stopped");
    }

    async fn process(self: &Arc<Self>, item: &Arc<QueueItem>) {
        let started = Instant::now();
        let result = self.deliver(item).await;
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                self.limiter.forget(item.id);
                info!(
                    destination = %self.name,
                    target = %item.target,
                    ?elapsed,
                    "write data success"
                );
            }
            Err(e) if e.is_retryable() => {
                let delay = self.limiter.when(item.id);
                warn!(
                    destination = %self.name,
                    target = %item.target,
                    retries = self.limiter.num_requeues(item.id),
                    ?delay,
                    ?elapsed,
                    error = %e,
                    "write data error"
                );
                self.enqueue_after(Arc::clone(item), delay);
            }
            Err(e) => {
                self.limiter.forget(item.id);
                error!(
                    destination = %self.name,
                    target = %item.target,
                    ?elapsed,
                    error = %e,
                    "write data error, dropping item"
                );
            }
        }
    }

    /// Calls the destination on its own task so that a panic inside `write`
    /// surfaces as a [`WriteError::Panicked`] instead of killing the worker.
    /// The panic is logged with the backtrace taken where it was raised.
    async fn deliver(&self, item: &Arc<QueueItem>) -> Result<(), WriteError> {
        install_panic_hook();
        let backtrace: BacktraceSlot = Arc::default();
        let destination = Arc::clone(&self.destination);
        let task_item = Arc::clone(item);
        let handle = tokio::spawn(WRITE_BACKTRACE.scope(Arc::clone(&backtrace), async move {
            destination.write(&task_item.payload, &task_item.target).await
        }));

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                let backtrace = backtrace
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .unwrap_or_else(|| "unavailable".to_string());
                error!(
                    destination = %self.name,
                    target = %item.target,
                    panic = %message,
                    %backtrace,
                    "recovered from panic in destination"
                );
                Err(WriteError::Panicked(message))
            }
            Err(e) => Err(WriteError::Panicked(e.to_string())),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}
