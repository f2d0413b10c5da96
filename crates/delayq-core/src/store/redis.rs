use std::future::Future;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{RedisWrite, ToRedisArgs, Value};

use crate::error::{StoreError, StoreResult};
use crate::store::{Reply, ScriptArg, ScriptHandle, ScriptStore};

impl ToRedisArgs for ScriptArg {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        match self {
            ScriptArg::Int(i) => i.write_redis_args(out),
            ScriptArg::Bytes(b) => b.write_redis_args(out),
        }
    }
}

/// Redis-backed store. Scripts are registered with `SCRIPT LOAD` and invoked
/// with `EVALSHA`; Redis runs each invocation atomically.
///
/// The store is `Clone` and cheap to share: the underlying connection manager
/// multiplexes requests and reconnects after connection loss.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    response_timeout: Duration,
}

impl RedisStore {
    /// Connect to Redis at the given URL, e.g. `redis://127.0.0.1:6379/0`.
    #[tracing::instrument(skip_all)]
    pub async fn connect(url: &str, response_timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = with_timeout(response_timeout, ConnectionManager::new(client)).await?;
        tracing::info!("connected to redis");
        Ok(Self {
            conn,
            response_timeout,
        })
    }
}

impl ScriptStore for RedisStore {
    async fn load_script(&self, source: &str) -> StoreResult<ScriptHandle> {
        let mut conn = self.conn.clone();
        let sha: String = with_timeout(
            self.response_timeout,
            redis::cmd("SCRIPT")
                .arg("LOAD")
                .arg(source)
                .query_async(&mut conn),
        )
        .await?;
        Ok(ScriptHandle::new(sha))
    }

    async fn invoke_script(
        &self,
        handle: &ScriptHandle,
        keys: &[String],
        args: &[ScriptArg],
    ) -> StoreResult<Reply> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(handle.as_str()).arg(keys.len()).arg(keys).arg(args);
        let value: Value = with_timeout(self.response_timeout, cmd.query_async(&mut conn)).await?;
        to_reply(value)
    }
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = redis::RedisResult<T>>,
) -> StoreResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

fn to_reply(value: Value) -> StoreResult<Reply> {
    match value {
        Value::Nil => Ok(Reply::Nil),
        Value::Int(i) => Ok(Reply::Int(i)),
        Value::BulkString(data) => Ok(Reply::Data(data)),
        Value::SimpleString(status) => Ok(Reply::Status(status)),
        Value::Okay => Ok(Reply::Status("OK".to_string())),
        Value::Array(items) => items
            .into_iter()
            .map(to_reply)
            .collect::<StoreResult<Vec<_>>>()
            .map(Reply::Array),
        other => Err(StoreError::UnexpectedReply(format!("{other:?}"))),
    }
}
