use std::path::PathBuf;
use std::time::Duration;

/// Backing-store errors (transport, scripting, reply shape).
/// This is the error type for the `ScriptStore` trait. Store operations can only
/// fail with infrastructure errors, never queue-level errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(redis::RedisError),

    /// The store does not recognize the script handle. This is the cache-miss
    /// signal the script cache recovers from.
    #[error("unknown script handle: {0}")]
    NoScript(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("no reply from store within {0:?}")]
    Timeout(Duration),

    #[error("unexpected reply from store: {0}")]
    UnexpectedReply(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::NoScriptError {
            StoreError::NoScript(err.to_string())
        } else {
            StoreError::Redis(err)
        }
    }
}

impl From<mlua::Error> for StoreError {
    fn from(err: mlua::Error) -> Self {
        StoreError::Script(err.to_string())
    }
}

/// Queue-level errors returned by `DelayQueue` operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("invalid queue id: {0:?}")]
    InvalidQueueId(String),

    /// The store reported the handle unknown again right after re-registration.
    #[error("script {script} unknown to the store even after reloading it")]
    ScriptUnavailable { script: &'static str },

    #[error("malformed {script} reply: {reason}")]
    Decode {
        script: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("error reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noscript_redis_error_maps_to_cache_miss() {
        let err = redis::RedisError::from((
            redis::ErrorKind::NoScriptError,
            "NOSCRIPT",
            "No matching script".to_string(),
        ));
        assert!(matches!(StoreError::from(err), StoreError::NoScript(_)));
    }

    #[test]
    fn other_redis_errors_are_kept_verbatim() {
        let err = redis::RedisError::from((redis::ErrorKind::IoError, "connection reset"));
        match StoreError::from(err) {
            StoreError::Redis(inner) => assert_eq!(inner.kind(), redis::ErrorKind::IoError),
            other => panic!("expected Redis variant, got {other:?}"),
        }
    }

    #[test]
    fn store_errors_convert_into_queue_errors() {
        let err: QueueError = StoreError::Timeout(Duration::from_millis(5)).into();
        assert!(matches!(err, QueueError::Store(StoreError::Timeout(_))));
    }
}
