//! Durable fallback storage.
//!
//! - [`RedbStore`]: single redb table on disk (default)
//! - [`MemoryStore`]: process-lifetime map (`--ephemeral`, tests)
//!
//! Only written when the backend cannot be reached, and only read when it
//! cannot be reached either. Values are JSON documents under a handful of
//! well-known keys.

pub mod local;
pub mod memory;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use local::RedbStore;
pub use memory::MemoryStore;

pub const PARTICIPANT_STATS: &str = "participantStats";
pub const MEETINGS: &str = "meetings";
pub const VOTES: &str = "votes";
pub const PAST_MEETINGS: &str = "pastMeetings";
pub const ADMIN_MODE: &str = "adminMode";

/// Raw key-value persistence.
pub trait DurableStore: Send + Sync {
    /// Human-readable backend name (e.g., "redb", "memory").
    fn backend_name(&self) -> &str;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// Read and decode a JSON value. Storage and decode errors are logged and
/// read as absent.
pub fn load_json<T: DeserializeOwned>(store: &dyn DurableStore, key: &str) -> Option<T> {
    let bytes = match store.get(key) {
        Ok(bytes) => bytes?,
        Err(e) => {
            tracing::warn!("Failed to read '{}' from {} store: {}", key, store.backend_name(), e);
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Discarding unreadable '{}' in {} store: {}", key, store.backend_name(), e);
            None
        }
    }
}

/// Encode and write a JSON value. Errors are logged, never returned.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn DurableStore, key: &str, value: &T) {
    let result = serde_json::to_vec(value)
        .map_err(anyhow::Error::from)
        .and_then(|bytes| store.put(key, &bytes));
    if let Err(e) = result {
        tracing::warn!("Failed to write '{}' to {} store: {}", key, store.backend_name(), e);
    }
}
