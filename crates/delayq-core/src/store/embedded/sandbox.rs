use mlua::{Function, Lua, LuaOptions, StdLib, Table, Value};

/// Core globals that can read files or compile arbitrary chunks. They exist
/// regardless of which standard libraries are opened.
const BLOCKED_GLOBALS: [&str; 3] = ["loadfile", "dofile", "load"];

/// Build the VM that queue scripts run in.
///
/// Only `math`, `string`, `table` and the base functions are available, which
/// is what Redis exposes to scripts minus its `cjson`/`bit` extras. The
/// procedures are written for Redis' Lua 5.1, so the 5.1 globals they touch
/// are shimmed on top of 5.4.
pub fn create_sandbox() -> mlua::Result<Lua> {
    let lua = Lua::new_with(
        StdLib::MATH | StdLib::STRING | StdLib::TABLE,
        LuaOptions::default(),
    )?;

    let globals = lua.globals();
    for name in BLOCKED_GLOBALS {
        globals.set(name, Value::Nil)?;
    }
    install_lua51_shims(&globals)?;

    Ok(lua)
}

/// `unpack` moved into `table` in 5.2.
fn install_lua51_shims(globals: &Table) -> mlua::Result<()> {
    let table: Table = globals.get("table")?;
    let unpack: Function = table.get("unpack")?;
    globals.set("unpack", unpack)
}
