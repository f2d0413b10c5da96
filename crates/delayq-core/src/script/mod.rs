//! Lua procedures executed atomically by the store.
//!
//! Every procedure reads the store's own clock with `TIME`, so due timestamps
//! never depend on a client's local clock:
//! `now_ms = seconds * 1000 + floor(microseconds / 1000)`.
//!
//! The sources stick to the Lua 5.1 dialect Redis embeds.

mod cache;

pub use cache::ScriptCache;

/// Identity of a procedure, used as the script cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Enqueue,
    Dequeue,
    Pending,
}

impl ScriptKind {
    pub fn name(self) -> &'static str {
        match self {
            ScriptKind::Enqueue => "enqueue",
            ScriptKind::Dequeue => "dequeue",
            ScriptKind::Pending => "pending",
        }
    }
}

/// A procedure and its source.
#[derive(Debug, Clone, Copy)]
pub struct Script {
    pub kind: ScriptKind,
    pub source: &'static str,
}

impl Script {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// `KEYS[1]` -> queue sorted set
/// `ARGV[1]` -> envelope (member bytes)
/// `ARGV[2]` -> delay in milliseconds, may be zero or negative
/// Returns the number of members added (1, or 0 if the member already existed).
pub const ENQUEUE: Script = Script {
    kind: ScriptKind::Enqueue,
    source: r#"
local key = KEYS[1]
local member = ARGV[1]
local delay_ms = tonumber(ARGV[2])
local now = redis.call('TIME')
local now_ms = tonumber(now[1]) * 1000 + math.floor(tonumber(now[2]) / 1000)
return redis.call('ZADD', key, now_ms + delay_ms, member)
"#,
};

/// `KEYS[1]` -> queue sorted set
/// `ARGV[1]` -> batch limit; `<= 0` selects every due member
/// Returns the removed members, earliest due first.
///
/// Members are removed in chunks so `unpack` stays under the Lua stack limit
/// when a large backlog comes due at once.
pub const DEQUEUE: Script = Script {
    kind: ScriptKind::Dequeue,
    source: r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local now = redis.call('TIME')
local now_ms = tonumber(now[1]) * 1000 + math.floor(tonumber(now[2]) / 1000)
local members
if limit > 0 then
    members = redis.call('ZRANGEBYSCORE', key, '-inf', now_ms, 'LIMIT', 0, limit)
else
    members = redis.call('ZRANGEBYSCORE', key, '-inf', now_ms)
end
for i = 1, #members, 1000 do
    redis.call('ZREM', key, unpack(members, i, math.min(i + 999, #members)))
end
return members
"#,
};

/// `KEYS[1]` -> queue sorted set
/// Returns the number of members, due or not.
pub const PENDING: Script = Script {
    kind: ScriptKind::Pending,
    source: r#"
return redis.call('ZCARD', KEYS[1])
"#,
};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::store::{EmbeddedStore, ManualClock, Reply, ScriptArg, ScriptStore};

    const START_MS: u64 = 1_700_000_000_000;

    fn test_store() -> (EmbeddedStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Duration::from_millis(START_MS)));
        let store = EmbeddedStore::with_clock(clock.clone()).unwrap();
        (store, clock)
    }

    async fn score_of(store: &EmbeddedStore, key: &str, member: &[u8]) -> Reply {
        let handle = store
            .load_script("return redis.call('ZSCORE', KEYS[1], ARGV[1])")
            .await
            .unwrap();
        store
            .invoke_script(&handle, &[key.to_string()], &[ScriptArg::Bytes(member.to_vec())])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn enqueue_scores_member_at_store_time_plus_delay() {
        let (store, clock) = test_store();
        clock.advance(Duration::from_micros(42_999));
        let handle = store.load_script(ENQUEUE.source).await.unwrap();

        let added = store
            .invoke_script(
                &handle,
                &["q".to_string()],
                &[ScriptArg::Bytes(b"m".to_vec()), ScriptArg::Int(1_500)],
            )
            .await
            .unwrap();
        assert_eq!(added, Reply::Int(1));

        // 42_999us floors to 42ms.
        let expected = (START_MS + 42 + 1_500).to_string().into_bytes();
        assert_eq!(score_of(&store, "q", b"m").await, Reply::Data(expected));
    }

    #[tokio::test]
    async fn negative_delay_scores_in_the_past() {
        let (store, _clock) = test_store();
        let handle = store.load_script(ENQUEUE.source).await.unwrap();
        store
            .invoke_script(
                &handle,
                &["q".to_string()],
                &[ScriptArg::Bytes(b"m".to_vec()), ScriptArg::Int(-250)],
            )
            .await
            .unwrap();
        let expected = (START_MS - 250).to_string().into_bytes();
        assert_eq!(score_of(&store, "q", b"m").await, Reply::Data(expected));
    }

    #[tokio::test]
    async fn dequeue_removes_more_members_than_one_unpack_chunk() {
        let (store, _clock) = test_store();
        let enqueue = store.load_script(ENQUEUE.source).await.unwrap();
        let dequeue = store.load_script(DEQUEUE.source).await.unwrap();
        let pending = store.load_script(PENDING.source).await.unwrap();
        let keys = vec!["q".to_string()];

        for i in 0..2_500 {
            store
                .invoke_script(
                    &enqueue,
                    &keys,
                    &[ScriptArg::Bytes(format!("m{i}").into_bytes()), ScriptArg::Int(0)],
                )
                .await
                .unwrap();
        }

        let reply = store
            .invoke_script(&dequeue, &keys, &[ScriptArg::Int(0)])
            .await
            .unwrap();
        match reply {
            Reply::Array(items) => assert_eq!(items.len(), 2_500),
            other => panic!("expected array, got {other:?}"),
        }
        assert_eq!(
            store.invoke_script(&pending, &keys, &[]).await.unwrap(),
            Reply::Int(0)
        );
    }

    #[test]
    fn script_names_are_stable() {
        assert_eq!(ENQUEUE.name(), "enqueue");
        assert_eq!(DEQUEUE.name(), "dequeue");
        assert_eq!(PENDING.name(), "pending");
    }
}
