//! Key naming for queue sorted sets.
//!
//! A queue lives at `{key_prefix}{queue_id}`. With the default empty prefix the
//! key is the bare queue id, which keeps the layout shared with producers that
//! address the sorted set directly.

use crate::error::{QueueError, Result};

/// Build the sorted-set key for a queue.
pub fn queue_key(key_prefix: &str, queue_id: &str) -> Result<String> {
    validate_queue_id(queue_id)?;
    let mut key = String::with_capacity(key_prefix.len() + queue_id.len());
    key.push_str(key_prefix);
    key.push_str(queue_id);
    Ok(key)
}

/// Queue ids must be non-empty and free of control characters.
pub fn validate_queue_id(queue_id: &str) -> Result<()> {
    if queue_id.is_empty() || queue_id.chars().any(char::is_control) {
        return Err(QueueError::InvalidQueueId(queue_id.to_string()));
    }
    Ok(())
}
