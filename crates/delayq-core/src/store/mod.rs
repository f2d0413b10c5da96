pub mod embedded;
mod redis;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::StoreResult;

pub use self::embedded::{Clock, EmbeddedStore, ManualClock, SystemClock};
pub use self::redis::RedisStore;

/// Opaque handle returned by the store after registering a script.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptHandle(String);

impl ScriptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A script argument. Byte arguments are passed through unmodified.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptArg {
    Int(i64),
    Bytes(Vec<u8>),
}

impl ScriptArg {
    /// The bytes the store sees for this argument.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ScriptArg::Int(i) => i.to_string().into_bytes(),
            ScriptArg::Bytes(b) => b.clone(),
        }
    }
}

/// A script reply, reduced to the shapes a Lua script can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Int(i64),
    Data(Vec<u8>),
    Status(String),
    Array(Vec<Reply>),
}

/// The backing-store seam. Implementations must be thread-safe, and must run
/// each script invocation as one indivisible unit relative to every other
/// operation on the same keys.
pub trait ScriptStore: Send + Sync {
    /// Register a script's source and return the handle to invoke it by.
    /// Registering the same source twice must be harmless.
    fn load_script(&self, source: &str) -> impl Future<Output = StoreResult<ScriptHandle>> + Send;

    /// Invoke a registered script. Fails with `StoreError::NoScript` when the
    /// handle is not (or no longer) known to the store.
    fn invoke_script(
        &self,
        handle: &ScriptHandle,
        keys: &[String],
        args: &[ScriptArg],
    ) -> impl Future<Output = StoreResult<Reply>> + Send;
}

impl<S: ScriptStore> ScriptStore for Arc<S> {
    async fn load_script(&self, source: &str) -> StoreResult<ScriptHandle> {
        S::load_script(self, source).await
    }

    async fn invoke_script(
        &self,
        handle: &ScriptHandle,
        keys: &[String],
        args: &[ScriptArg],
    ) -> StoreResult<Reply> {
        S::invoke_script(self, handle, keys, args).await
    }
}
