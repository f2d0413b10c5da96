use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, warn};

use super::{Script, ScriptKind};
use crate::error::{QueueError, Result, StoreError};
use crate::metrics::Metrics;
use crate::store::{Reply, ScriptArg, ScriptHandle, ScriptStore};

/// Handles of registered scripts, keyed by procedure.
///
/// Owned by one queue client. Lookups and inserts are individually
/// synchronized; the load-then-insert sequence is not, so concurrent callers
/// may register the same script redundantly. That is harmless because
/// registration is idempotent on the store side.
pub struct ScriptCache {
    handles: RwLock<HashMap<ScriptKind, ScriptHandle>>,
    reloads: AtomicU64,
    metrics: Metrics,
}

impl Default for ScriptCache {
    fn default() -> Self {
        Self::new(Metrics::new())
    }
}

impl ScriptCache {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            reloads: AtomicU64::new(0),
            metrics,
        }
    }

    /// The cached handle for a procedure, if any.
    pub fn get(&self, kind: ScriptKind) -> Option<ScriptHandle> {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    /// Number of re-registrations triggered by the store forgetting a handle.
    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    /// Register a script with the store and cache the returned handle.
    pub async fn load<S: ScriptStore>(&self, store: &S, script: &Script) -> Result<ScriptHandle> {
        let handle = store.load_script(script.source).await?;
        debug!(script = script.name(), handle = %handle, "script registered");
        self.handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(script.kind, handle.clone());
        Ok(handle)
    }

    /// Invoke a script by its cached handle, registering it first if needed.
    ///
    /// When the store reports the handle unknown, the script is registered
    /// again and the call retried exactly once. A second miss is returned as
    /// `QueueError::ScriptUnavailable`.
    pub async fn invoke<S: ScriptStore>(
        &self,
        store: &S,
        script: &Script,
        keys: &[String],
        args: &[ScriptArg],
    ) -> Result<Reply> {
        let handle = match self.get(script.kind) {
            Some(handle) => handle,
            None => self.load(store, script).await?,
        };

        match store.invoke_script(&handle, keys, args).await {
            Err(StoreError::NoScript(reason)) => {
                warn!(script = script.name(), %reason, "store lost script handle, reloading");
                self.reloads.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_script_reload(script.name());

                let handle = self.load(store, script).await?;
                match store.invoke_script(&handle, keys, args).await {
                    Err(StoreError::NoScript(_)) => Err(QueueError::ScriptUnavailable {
                        script: script.name(),
                    }),
                    result => Ok(result?),
                }
            }
            result => Ok(result?),
        }
    }
}
