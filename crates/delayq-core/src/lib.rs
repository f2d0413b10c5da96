//! Delayed message queue on top of a script-capable key-value store.
//!
//! Messages are members of a per-queue sorted set scored by the millisecond
//! timestamp at which they become due. Enqueue and dequeue each run as one
//! atomic Lua script on the store, reading the store's own clock, so any
//! number of clients can produce into and consume from the same queue.

pub mod config;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod queue;
pub mod script;
pub mod store;
pub mod telemetry;

pub use config::{ConsumerConfig, DelayqConfig, QueueOptions, StoreConfig};
pub use error::{ConfigError, QueueError, Result, StoreError, StoreResult};
pub use queue::{Consumer, DelayQueue};
pub use store::{
    Clock, EmbeddedStore, ManualClock, Reply, RedisStore, ScriptArg, ScriptHandle, ScriptStore,
    SystemClock,
};
