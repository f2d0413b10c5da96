pub mod bridge;
mod clock;
pub mod keyspace;
pub mod safety;
pub mod sandbox;
pub mod sorted_set;

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mlua::{ChunkMode, Lua};

use crate::error::{StoreError, StoreResult};
use crate::store::{Reply, ScriptArg, ScriptHandle, ScriptStore};

pub use clock::{Clock, ManualClock, SystemClock};
pub use keyspace::Keyspace;

use safety::InstructionBudget;

/// Pre-compiled Lua bytecode for a script.
pub type CompiledScript = Vec<u8>;

/// In-process store that runs the same Lua scripts a Redis server would.
///
/// Owns a single sandboxed `mlua::Lua` VM. Scripts are compiled to bytecode
/// at registration and cached by a handle derived from their source, so
/// registering the same source twice yields the same handle. Each invocation
/// holds the engine lock from start to finish, which makes every script
/// atomic with respect to every other invocation on this store.
///
/// Data lives only in memory. One `EmbeddedStore` is one keyspace; wrap it
/// in an `Arc` to share it between queues.
pub struct EmbeddedStore {
    engine: Mutex<Engine>,
    clock: Arc<dyn Clock>,
    script_loads: AtomicU64,
}

struct Engine {
    lua: Lua,
    scripts: HashMap<String, CompiledScript>,
    instruction_limit: u64,
}

impl EmbeddedStore {
    /// Create an empty store that reads the wall clock.
    pub fn new() -> StoreResult<Self> {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store whose `TIME` command reads the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let lua = sandbox::create_sandbox()?;
        let keyspace = Arc::new(Mutex::new(Keyspace::default()));
        bridge::register_redis_api(&lua, keyspace, Arc::clone(&clock))?;

        Ok(Self {
            engine: Mutex::new(Engine {
                lua,
                scripts: HashMap::new(),
                instruction_limit: safety::DEFAULT_INSTRUCTION_LIMIT,
            }),
            clock,
            script_loads: AtomicU64::new(0),
        })
    }

    /// Override the per-invocation instruction budget.
    pub fn with_instruction_limit(mut self, limit: u64) -> Self {
        self.engine
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .instruction_limit = limit;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Forget every registered script, like `SCRIPT FLUSH`. Subsequent
    /// invocations by handle fail with `StoreError::NoScript`.
    pub fn flush_scripts(&self) {
        self.engine().scripts.clear();
        tracing::debug!("embedded script cache flushed");
    }

    /// Number of `load_script` calls served so far.
    pub fn script_loads(&self) -> u64 {
        self.script_loads.load(Ordering::Relaxed)
    }

    fn engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, source: &str) -> StoreResult<ScriptHandle> {
        let handle = script_handle(source);
        let mut engine = self.engine();
        let bytecode = engine
            .lua
            .load(source)
            .set_name(format!("script_{handle}"))
            .into_function()
            .map_err(|e| StoreError::Script(format!("ERR Error compiling script: {e}")))?
            .dump(true);
        engine.scripts.insert(handle.clone(), bytecode);
        self.script_loads.fetch_add(1, Ordering::Relaxed);
        Ok(ScriptHandle::new(handle))
    }

    fn invoke(
        &self,
        handle: &ScriptHandle,
        keys: &[String],
        args: &[ScriptArg],
    ) -> StoreResult<Reply> {
        let engine = self.engine();
        let Some(bytecode) = engine.scripts.get(handle.as_str()) else {
            return Err(StoreError::NoScript(format!(
                "NOSCRIPT No matching script: {handle}"
            )));
        };

        let lua = &engine.lua;
        let keys_table = lua.create_sequence_from(keys.iter().map(String::as_str))?;
        let argv = args
            .iter()
            .map(|arg| lua.create_string(arg.to_bytes()))
            .collect::<mlua::Result<Vec<_>>>()?;
        let argv_table = lua.create_sequence_from(argv)?;
        lua.globals().set("KEYS", keys_table)?;
        lua.globals().set("ARGV", argv_table)?;

        let result = {
            let _budget = InstructionBudget::arm(lua, engine.instruction_limit);
            lua.load(bytecode.as_slice())
                .set_mode(ChunkMode::Binary)
                .call::<mlua::Value>(())
        };

        match result {
            Ok(value) => bridge::lua_to_reply(value),
            Err(e) => {
                tracing::warn!(script = %handle, error = %e, "embedded script failed");
                Err(e.into())
            }
        }
    }
}

impl ScriptStore for EmbeddedStore {
    async fn load_script(&self, source: &str) -> StoreResult<ScriptHandle> {
        self.load(source)
    }

    async fn invoke_script(
        &self,
        handle: &ScriptHandle,
        keys: &[String],
        args: &[ScriptArg],
    ) -> StoreResult<Reply> {
        self.invoke(handle, keys, args)
    }
}

/// Content-derived handle: the same source always maps to the same handle.
fn script_handle(source: &str) -> String {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
