use std::sync::{Arc, Mutex, PoisonError};

use mlua::{Lua, Table, Value, Variadic};

use super::clock::Clock;
use super::keyspace::{format_score, Keyspace};
use crate::error::{StoreError, StoreResult};
use crate::store::Reply;

/// Register the `redis` namespace table scripts use to reach the keyspace:
/// `redis.call`, `redis.pcall`, `redis.error_reply` and `redis.status_reply`.
///
/// The keyspace lock is taken per command. Whole-script atomicity comes from
/// the caller holding the engine lock for the duration of the script.
pub fn register_redis_api(
    lua: &Lua,
    keyspace: Arc<Mutex<Keyspace>>,
    clock: Arc<dyn Clock>,
) -> mlua::Result<()> {
    let redis_table = lua.create_table()?;

    let call_fn = {
        let keyspace = Arc::clone(&keyspace);
        let clock = Arc::clone(&clock);
        lua.create_function(move |lua, args: Variadic<Value>| {
            let argv = command_args(&args)?;
            let reply = keyspace
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .execute(clock.as_ref(), &argv)
                .map_err(mlua::Error::runtime)?;
            reply_to_lua(lua, reply)
        })?
    };

    let pcall_fn = lua.create_function(move |lua, args: Variadic<Value>| {
        let result = command_args(&args).map_err(|e| e.to_string()).and_then(|argv| {
            keyspace
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .execute(clock.as_ref(), &argv)
        });
        match result {
            Ok(reply) => reply_to_lua(lua, reply),
            Err(message) => status_table(lua, "err", &message),
        }
    })?;

    let error_reply_fn =
        lua.create_function(|lua, message: mlua::String| status_table(lua, "err", &message.to_string_lossy()))?;
    let status_reply_fn =
        lua.create_function(|lua, message: mlua::String| status_table(lua, "ok", &message.to_string_lossy()))?;

    redis_table.set("call", call_fn)?;
    redis_table.set("pcall", pcall_fn)?;
    redis_table.set("error_reply", error_reply_fn)?;
    redis_table.set("status_reply", status_reply_fn)?;
    lua.globals().set("redis", redis_table)?;

    Ok(())
}

/// Convert the values a script passed to `redis.call` into command bytes.
fn command_args(args: &[Value]) -> mlua::Result<Vec<Vec<u8>>> {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            Value::Integer(i) => Ok(i.to_string().into_bytes()),
            Value::Number(n) => Ok(format_score(*n).into_bytes()),
            _ => Err(mlua::Error::runtime(
                "Lua redis lib command arguments must be strings or integers",
            )),
        })
        .collect()
}

fn status_table(lua: &Lua, field: &str, message: &str) -> mlua::Result<Value> {
    let table = lua.create_table()?;
    table.set(field, message)?;
    Ok(Value::Table(table))
}

/// Convert a command reply into the Lua value a script sees. Nil becomes
/// `false`, matching Redis.
fn reply_to_lua(lua: &Lua, reply: Reply) -> mlua::Result<Value> {
    Ok(match reply {
        Reply::Nil => Value::Boolean(false),
        Reply::Int(i) => Value::Integer(i),
        Reply::Data(bytes) => Value::String(lua.create_string(&bytes)?),
        Reply::Status(status) => status_table(lua, "ok", &status)?,
        Reply::Array(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.into_iter().enumerate() {
                table.raw_set(i + 1, reply_to_lua(lua, item)?)?;
            }
            Value::Table(table)
        }
    })
}

/// Convert a script's return value into a reply, following the Redis rules:
/// numbers are truncated to integers, `false` and nil become nil, arrays stop
/// at the first nil, and `{err = ...}` tables become errors.
pub fn lua_to_reply(value: Value) -> StoreResult<Reply> {
    match value {
        Value::Nil | Value::Boolean(false) => Ok(Reply::Nil),
        Value::Boolean(true) => Ok(Reply::Int(1)),
        Value::Integer(i) => Ok(Reply::Int(i)),
        Value::Number(n) => Ok(Reply::Int(n as i64)),
        Value::String(s) => Ok(Reply::Data(s.as_bytes().to_vec())),
        Value::Table(table) => table_to_reply(table),
        _ => Ok(Reply::Nil),
    }
}

fn table_to_reply(table: Table) -> StoreResult<Reply> {
    if let Value::String(message) = table.raw_get::<Value>("err")? {
        return Err(StoreError::Script(message.to_string_lossy()));
    }
    if let Value::String(status) = table.raw_get::<Value>("ok")? {
        return Ok(Reply::Status(status.to_string_lossy()));
    }
    let mut items = Vec::new();
    for i in 1..=table.raw_len() {
        match table.raw_get::<Value>(i)? {
            Value::Nil => break,
            value => items.push(lua_to_reply(value)?),
        }
    }
    Ok(Reply::Array(items))
}
