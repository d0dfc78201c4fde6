//! Advisory lock registry
//!
//! A set of locked paths. There is no owner token and no expiry: any client
//! may unlock any path, and a lock lives until it is released.

use dashmap::DashSet;
use tracing::debug;

use crate::sftp::path_utils::trim_trailing_slash;

#[derive(Debug, Default)]
pub struct LockRegistry {
    locked: DashSet<String>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock on `path`. `false` if it is already held.
    pub fn try_lock(&self, path: &str) -> bool {
        let acquired = self.locked.insert(key(path));
        debug!("LOCK {} -> {}", path, if acquired { "acquired" } else { "held" });
        acquired
    }

    /// Release `path`. Unlocking a free path is a no-op.
    pub fn unlock(&self, path: &str) {
        if self.locked.remove(&key(path)).is_some() {
            debug!("UNLOCK {}", path);
        }
    }

    pub fn is_locked(&self, path: &str) -> bool {
        self.locked.contains(&key(path))
    }

    pub fn len(&self) -> usize {
        self.locked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locked.is_empty()
    }
}

fn key(path: &str) -> String {
    trim_trailing_slash(path).to_string()
}
