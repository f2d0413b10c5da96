use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::config::{ConsumerConfig, QueueOptions};
use crate::envelope::{self, EnvelopeFormat};
use crate::error::{QueueError, Result};
use crate::keys::queue_key;
use crate::metrics::Metrics;
use crate::script::{Script, ScriptCache, DEQUEUE, ENQUEUE, PENDING};
use crate::store::{Reply, ScriptArg, ScriptStore};

/// Bound on `|delay_ms|`. Keeps `now_ms + delay_ms` below 2^53, so the due
/// score is exact both as a double (Redis Lua 5.1) and as an integer that
/// cannot overflow (Lua 5.4).
pub const MAX_DELAY_MS: i64 = 1 << 52;

/// Client for delayed queues held in a script-capable store.
///
/// Each queue is one sorted set scored by the due timestamp. Every operation
/// runs as a single atomic script on the store and reads the store's clock,
/// so any number of producers and consumers can share a queue without
/// further coordination.
///
/// `DelayQueue` is cheap to clone; clones share the store connection and
/// the script cache.
pub struct DelayQueue<S> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    store: S,
    scripts: ScriptCache,
    options: QueueOptions,
    metrics: Metrics,
}

impl<S> Clone for DelayQueue<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ScriptStore> DelayQueue<S> {
    pub fn new(store: S) -> Self {
        Self::with_options(store, QueueOptions::default())
    }

    pub fn with_options(store: S, options: QueueOptions) -> Self {
        let metrics = Metrics::new();
        Self {
            inner: Arc::new(Inner {
                store,
                scripts: ScriptCache::new(metrics.clone()),
                options,
                metrics,
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn script_cache(&self) -> &ScriptCache {
        &self.inner.scripts
    }

    /// Schedule `payload` to become due `delay_ms` milliseconds after the
    /// store's current time. Zero and negative delays are due immediately.
    /// Delays beyond [`MAX_DELAY_MS`] (about 142,000 years) are clamped to it.
    ///
    /// Identical payloads enqueued twice are stored and delivered twice.
    #[tracing::instrument(skip(self, payload), fields(queue = %queue_id, bytes = payload.len()))]
    pub async fn enqueue(&self, queue_id: &str, payload: &[u8], delay_ms: i64) -> Result<()> {
        let key = queue_key(&self.inner.options.key_prefix, queue_id)?;
        let member = envelope::seal(payload);
        let delay_ms = delay_ms.clamp(-MAX_DELAY_MS, MAX_DELAY_MS);

        let reply = self
            .run(
                &ENQUEUE,
                key,
                &[ScriptArg::Bytes(member), ScriptArg::Int(delay_ms)],
            )
            .await?;

        match reply {
            Reply::Int(1) => {}
            // A fresh UUIDv7 token should never collide.
            Reply::Int(0) => warn!(queue = %queue_id, "envelope already present, score updated"),
            other => return Err(decode_error(&ENQUEUE, "integer", &other)),
        }

        self.inner.metrics.record_enqueue(queue_id);
        debug!(queue = %queue_id, delay_ms, "message enqueued");
        Ok(())
    }

    /// Like [`enqueue`](Self::enqueue) with the delay given as a `Duration`,
    /// saturating at [`MAX_DELAY_MS`].
    pub async fn enqueue_after(&self, queue_id: &str, payload: &[u8], delay: Duration) -> Result<()> {
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        self.enqueue(queue_id, payload, delay_ms).await
    }

    /// Atomically remove and return up to `limit` due messages, earliest due
    /// first. `limit <= 0` removes every due message.
    ///
    /// Ordering among messages due at the same millisecond is unspecified.
    #[tracing::instrument(skip(self), fields(queue = %queue_id))]
    pub async fn dequeue(&self, queue_id: &str, limit: i64) -> Result<Vec<Vec<u8>>> {
        let key = queue_key(&self.inner.options.key_prefix, queue_id)?;
        let reply = self.run(&DEQUEUE, key, &[ScriptArg::Int(limit)]).await?;

        let items = match reply {
            Reply::Array(items) => items,
            other => return Err(decode_error(&DEQUEUE, "array", &other)),
        };

        let mut payloads = Vec::with_capacity(items.len());
        for item in items {
            let member = match item {
                Reply::Data(bytes) => bytes,
                other => return Err(decode_error(&DEQUEUE, "bulk string element", &other)),
            };
            let (format, payload) = envelope::open(member);
            if format == EnvelopeFormat::Raw {
                warn!(queue = %queue_id, bytes = payload.len(), "member carries no envelope, returning it unmodified");
                self.inner.metrics.record_undecodable(queue_id);
            }
            payloads.push(payload);
        }

        if !payloads.is_empty() {
            self.inner.metrics.record_dequeue(queue_id, payloads.len());
            debug!(queue = %queue_id, count = payloads.len(), "messages dequeued");
        }
        Ok(payloads)
    }

    /// Number of messages in the queue, due or not.
    #[tracing::instrument(skip(self), fields(queue = %queue_id))]
    pub async fn pending(&self, queue_id: &str) -> Result<u64> {
        let key = queue_key(&self.inner.options.key_prefix, queue_id)?;
        match self.run(&PENDING, key, &[]).await? {
            Reply::Int(n) if n >= 0 => Ok(n as u64),
            other => Err(decode_error(&PENDING, "non-negative integer", &other)),
        }
    }

    async fn run(&self, script: &Script, key: String, args: &[ScriptArg]) -> Result<Reply> {
        self.inner
            .scripts
            .invoke(&self.inner.store, script, &[key], args)
            .await
    }
}

impl<S: ScriptStore + 'static> DelayQueue<S> {
    /// Poll a queue in the background and stream its messages as they
    /// become due.
    ///
    /// Each poll dequeues up to `config.batch_size` messages; when nothing is
    /// due the task sleeps for `config.poll_interval_ms`. Store errors are
    /// yielded and polling continues after the interval. Dropping the
    /// returned [`Consumer`] stops the task. Messages already dequeued but
    /// not yet read from the stream are lost at that point.
    pub fn consume(&self, queue_id: &str, config: ConsumerConfig) -> Consumer {
        let capacity = usize::try_from(config.batch_size).unwrap_or(0).clamp(1, 1024);
        let (tx, rx) = mpsc::channel(capacity);
        let queue = self.clone();
        let queue_id = queue_id.to_string();

        let task = tokio::spawn(async move {
            let interval = config.poll_interval();
            loop {
                let idle = match queue.dequeue(&queue_id, config.batch_size).await {
                    Ok(batch) => {
                        let idle = batch.is_empty();
                        for payload in batch {
                            if tx.send(Ok(payload)).await.is_err() {
                                return;
                            }
                        }
                        idle
                    }
                    Err(e) => {
                        warn!(queue = %queue_id, error = %e, "consumer poll failed");
                        if tx.send(Err(e)).await.is_err() {
                            return;
                        }
                        true
                    }
                };

                if idle {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = tx.closed() => return,
                    }
                }
            }
        });

        Consumer {
            inner: ReceiverStream::new(rx),
            task,
        }
    }
}

/// Stream of due messages produced by [`DelayQueue::consume`].
pub struct Consumer {
    inner: ReceiverStream<Result<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Stream for Consumer {
    type Item = Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn decode_error(script: &Script, expected: &str, got: &Reply) -> QueueError {
    QueueError::Decode {
        script: script.name(),
        reason: format!("expected {expected}, got {got:?}"),
    }
}
