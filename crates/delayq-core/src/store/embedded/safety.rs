use std::sync::atomic::{AtomicU64, Ordering};

use mlua::{Error, HookTriggers, Lua, VmState};

/// Default per-invocation instruction budget for embedded scripts.
pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 50_000_000;

/// Instructions executed between budget checks.
const CHECK_EVERY: u32 = 1_000;

/// An instruction budget armed on a VM for the lifetime of the guard.
///
/// Once the script has executed `limit` instructions (checked every
/// `CHECK_EVERY`) the hook raises a runtime error, which aborts the script
/// with a `StoreError::Script`. Dropping the guard disarms the hook.
pub struct InstructionBudget<'lua> {
    lua: &'lua Lua,
}

impl<'lua> InstructionBudget<'lua> {
    pub fn arm(lua: &'lua Lua, limit: u64) -> Self {
        let executed = AtomicU64::new(0);
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(CHECK_EVERY),
            move |_lua, _debug| {
                let so_far =
                    executed.fetch_add(u64::from(CHECK_EVERY), Ordering::Relaxed) + u64::from(CHECK_EVERY);
                if so_far >= limit {
                    Err(Error::runtime(format!(
                        "script exceeded its budget of {limit} instructions"
                    )))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );
        Self { lua }
    }
}

impl Drop for InstructionBudget<'_> {
    fn drop(&mut self) {
        self.lua.remove_hook();
    }
}
