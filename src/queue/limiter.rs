use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout, Instant};

use crate::{Result, ScribeError};

/// One request every two seconds
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(2);

/// Pause after every operation, success or failure
pub const DEFAULT_SAFETY_BUFFER: Duration = Duration::from_millis(100);

/// Upper bound on a single queued operation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Type-erased unit of work that settles exactly one caller
trait Job: Send {
    fn run(self: Box<Self>, limit: Option<Duration>) -> BoxFuture<'static, ()>;
    fn reject(self: Box<Self>, error: anyhow::Error);
}

struct PendingJob<F, T> {
    key: String,
    operation: F,
    tx: oneshot::Sender<Result<T>>,
}

impl<F, Fut, T> Job for PendingJob<F, T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    fn run(self: Box<Self>, limit: Option<Duration>) -> BoxFuture<'static, ()> {
        let PendingJob { key, operation, tx } = *self;

        async move {
            let guarded = AssertUnwindSafe(async move { operation().await }).catch_unwind();

            let outcome = match limit {
                Some(limit) => match timeout(limit, guarded).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::warn!(key = %key, timeout_secs = limit.as_secs(), "Queued operation timed out");
                        Ok(Err(ScribeError::Timeout {
                            key: key.clone(),
                            seconds: limit.as_secs(),
                        }
                        .into()))
                    }
                },
                None => guarded.await,
            };

            let result = outcome.unwrap_or_else(|_| {
                tracing::error!(key = %key, "Queued operation panicked");
                Err(ScribeError::OperationAborted(key.clone()).into())
            });

            // Caller may have gone away; nothing to do then
            let _ = tx.send(result);
        }
        .boxed()
    }

    fn reject(self: Box<Self>, error: anyhow::Error) {
        let _ = self.tx.send(Err(error));
    }
}

/// An operation waiting for its turn
struct QueuedOperation {
    key: String,
    job: Box<dyn Job>,
    enqueued_at: Instant,
}

struct RateLimiterState {
    queue: VecDeque<QueuedOperation>,
    is_processing: bool,
    last_request_time: Option<Instant>,
}

struct Inner {
    name: String,
    min_interval: Duration,
    safety_buffer: Duration,
    operation_timeout: Option<Duration>,
    state: Mutex<RateLimiterState>,
}

/// Single-flight FIFO request queue with a minimum interval between operation starts.
///
/// One instance should exist per upstream provider; clones share the same queue. Ordering
/// holds within an instance only. The queue state is in-memory and dies with the process.
///
/// Must be used from within a tokio runtime: the first enqueue on an idle queue spawns the
/// processing loop.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl RateLimiter {
    /// Create a limiter that starts at most one operation per `min_interval`
    pub fn new(name: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                min_interval,
                safety_buffer: DEFAULT_SAFETY_BUFFER,
                operation_timeout: Some(DEFAULT_OPERATION_TIMEOUT),
                state: Mutex::new(RateLimiterState {
                    queue: VecDeque::new(),
                    is_processing: false,
                    last_request_time: None,
                }),
            }),
        }
    }

    /// Create a limiter from a target request rate (0.5 = one request every two seconds)
    pub fn per_second(name: impl Into<String>, requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            DEFAULT_MIN_INTERVAL
        };
        Self::new(name, min_interval)
    }

    /// Set the fixed pause that follows every operation.
    ///
    /// Only valid before the limiter is shared.
    pub fn with_safety_buffer(self, safety_buffer: Duration) -> Self {
        self.reconfigure(|inner| inner.safety_buffer = safety_buffer)
    }

    /// Set the per-operation timeout; `None` disables it.
    ///
    /// Only valid before the limiter is shared.
    pub fn with_operation_timeout(self, operation_timeout: Option<Duration>) -> Self {
        self.reconfigure(|inner| inner.operation_timeout = operation_timeout)
    }

    fn reconfigure(self, apply: impl FnOnce(&mut Inner)) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                apply(&mut inner);
                Self { inner: Arc::new(inner) }
            }
            Err(shared) => {
                tracing::warn!(limiter = %shared.name, "Limiter already shared, ignoring reconfiguration");
                Self { inner: shared }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn min_interval(&self) -> Duration {
        self.inner.min_interval
    }

    /// Number of operations waiting to start (the in-flight one is not counted)
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.lock().is_processing
    }

    /// Queue `operation` and settle with its own outcome.
    ///
    /// The operation is placed in the queue when this is called, not when the returned
    /// future is first polled, so call order is start order.
    pub fn enqueue<F, Fut, T>(&self, operation: F, key: &str) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let key = key.to_string();
        let (tx, rx) = oneshot::channel();

        let start_loop = {
            let mut state = self.inner.lock();
            state.queue.push_back(QueuedOperation {
                key: key.clone(),
                job: Box::new(PendingJob {
                    key: key.clone(),
                    operation,
                    tx,
                }),
                enqueued_at: Instant::now(),
            });
            tracing::debug!(
                limiter = %self.inner.name,
                key = %key,
                pending = state.queue.len(),
                "Operation enqueued"
            );

            if state.is_processing {
                false
            } else {
                state.is_processing = true;
                true
            }
        };

        if start_loop {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.process_queue());
        }

        async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(ScribeError::OperationAborted(key).into()),
            }
        }
    }

    /// Reject every pending (not in-flight) operation with [`ScribeError::QueueCleared`].
    ///
    /// The in-flight operation, if any, runs to completion; the loop then finds the queue
    /// empty and returns to idle. Returns how many operations were rejected.
    pub fn clear_queue(&self) -> usize {
        let drained: Vec<QueuedOperation> = self.inner.lock().queue.drain(..).collect();
        let count = drained.len();

        for op in drained {
            let key = op.key;
            op.job.reject(ScribeError::QueueCleared(key).into());
        }

        if count > 0 {
            tracing::info!(limiter = %self.inner.name, rejected = count, "Queue cleared");
        }
        count
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, RateLimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn process_queue(self: Arc<Self>) {
        tracing::debug!(limiter = %self.name, "Queue processing started");

        loop {
            let wait = {
                let mut state = self.lock();
                if state.queue.is_empty() {
                    state.is_processing = false;
                    break;
                }
                state
                    .last_request_time
                    .map(|last| self.min_interval.saturating_sub(last.elapsed()))
                    .unwrap_or(Duration::ZERO)
            };

            if !wait.is_zero() {
                tracing::debug!(limiter = %self.name, wait_ms = wait.as_millis() as u64, "Pacing next request");
                sleep(wait).await;
            }

            // Re-check: the queue may have been cleared while we were pacing
            let op = {
                let mut state = self.lock();
                match state.queue.pop_front() {
                    Some(op) => {
                        state.last_request_time = Some(Instant::now());
                        op
                    }
                    None => {
                        state.is_processing = false;
                        break;
                    }
                }
            };

            tracing::debug!(
                limiter = %self.name,
                key = %op.key,
                queued_ms = op.enqueued_at.elapsed().as_millis() as u64,
                "Starting operation"
            );
            op.job.run(self.operation_timeout).await;

            sleep(self.safety_buffer).await;
        }

        tracing::debug!(limiter = %self.name, "Queue drained");
    }
}
