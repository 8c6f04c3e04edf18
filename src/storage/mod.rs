//! Storage handle
//!
//! The networking core only needs open/close semantics plus a key-value
//! surface from its database; everything else about persistence lives
//! behind the [`Database`] trait. The registry owns the handle and closes
//! it exactly once on shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Opaque storage collaborator.
pub trait Database: Send + Sync {
    fn put(&self, key: &[u8], value: Vec<u8>);
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    /// Release the underlying resource. Safe to call once; the registry
    /// guards against a second call.
    fn close(&self);
}

/// In-memory database, the default backend for tests and single-process
/// runs.
#[derive(Default)]
pub struct MemDatabase {
    entries: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Database for MemDatabase {
    fn put(&self, key: &[u8], value: Vec<u8>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_vec(), value);
        }
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
        log::debug!("memory database closed");
    }
}
