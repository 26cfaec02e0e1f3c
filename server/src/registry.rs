//! Who is reachable right now: the live username to connection mapping.
//!
//! Both directions are kept under one lock so that a name maps to at most one
//! connection and a connection owns at most one name. Nothing under the lock
//! awaits anything but the lock itself.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::server_types::{ConnectionHandle, ConnectionId};

#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<Mutex<Entries>>,
}

#[derive(Default)]
struct Entries {
    by_name: HashMap<String, ConnectionHandle>,
    by_conn: HashMap<ConnectionId, String>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Binds `username` to `handle`, last registration wins.
    ///
    /// If the name was held by a different connection, that connection loses
    /// it and its handle is returned. If `handle` was bound under another name,
    /// that older binding is released.
    pub async fn register(&self, username: String, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut entries = self.entries.lock().await;

        if let Some(previous) = entries.by_conn.remove(&handle.id()) {
            if previous != username {
                debug!("{} releases stale name {}", handle.id(), &previous);
                entries.by_name.remove(&previous);
            }
        }

        let displaced = entries.by_name.insert(username.clone(), handle.clone())
            .filter(|old| old.id() != handle.id());

        if let Some(old) = &displaced {
            entries.by_conn.remove(&old.id());
        }

        entries.by_conn.insert(handle.id(), username);
        displaced
    }

    pub async fn lookup(&self, username: &str) -> Option<ConnectionHandle> {
        self.entries.lock().await.by_name.get(username).cloned()
    }

    /// Drops whatever entry `handle` owns, returning its name. A connection
    /// that never registered, or whose name was taken over, owns nothing.
    pub async fn remove_by_handle(&self, handle: &ConnectionHandle) -> Option<String> {
        let mut entries = self.entries.lock().await;
        let name = entries.by_conn.remove(&handle.id())?;
        entries.by_name.remove(&name);
        Some(name)
    }

    /// Currently registered names, sorted
    pub async fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().await.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.by_name.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
