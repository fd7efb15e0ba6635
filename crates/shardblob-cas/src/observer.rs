//! Downstream collaborators notified of store changes.
//!
//! A full-text index is the typical observer: it receives the plaintext of every
//! newly stored object and the id of every deleted one. Notifications are
//! fire-and-forget. The store calls observers synchronously, logs any error they
//! return and carries on; an observer can never fail a store operation.

use crate::id::BlobId;
use crate::sidecar::BlobMeta;

/// Error type observers report back to the store (logged, then dropped).
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

pub type ObserverResult = std::result::Result<(), ObserverError>;

pub trait StoreObserver: Send + Sync {
    /// A new object was written. Not called when a put was deduplicated.
    fn on_put(&self, id: &BlobId, plaintext: &[u8], meta: &BlobMeta) -> ObserverResult;

    /// An id was deleted (whether or not it was present).
    fn on_delete(&self, id: &BlobId) -> ObserverResult;

    /// The store was purged; the observer should clear its own state.
    fn on_purge(&self) -> ObserverResult {
        Ok(())
    }
}
