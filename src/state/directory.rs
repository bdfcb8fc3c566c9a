//! Process-wide registry of live sessions, generic over the session type.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// Keyed registry of session actors.
///
/// Both protocols instantiate this with their own session type; the map is
/// the only structure shared across sessions, and its lock is scoped to the
/// single insert-if-absent or remove operation, never held across session
/// logic. All per-session work happens under that session's own mutex.
#[derive(Debug)]
pub struct Directory<S> {
    sessions: DashMap<String, Arc<Mutex<S>>>,
}

impl<S> Default for Directory<S> {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl<S> Directory<S> {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session without creating it.
    pub fn get(&self, id: &str) -> Option<Arc<Mutex<S>>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Fetch the session for `id`, creating it lazily on first use.
    ///
    /// Two concurrent first joins for the same id are serialized by the map
    /// shard lock, so exactly one instance is ever created.
    pub fn get_or_create<F>(&self, id: &str, create: F) -> Arc<Mutex<S>>
    where
        F: FnOnce() -> S,
    {
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(create())))
            .clone()
    }

    /// Remove and return a session; a no-op on an already-evicted id.
    pub fn evict(&self, id: &str) -> Option<Arc<Mutex<S>>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Number of sessions currently registered.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_same_instance() {
        let directory: Directory<u32> = Directory::new();
        let first = directory.get_or_create("s1", || 1);
        let second = directory.get_or_create("s1", || 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn evict_is_idempotent() {
        let directory: Directory<u32> = Directory::new();
        directory.get_or_create("s1", || 1);
        assert!(directory.get("s1").is_some());
        assert!(directory.evict("s1").is_some());
        assert!(directory.evict("s1").is_none());
        assert!(directory.get("s1").is_none());
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn concurrent_first_joins_create_exactly_one_session() {
        let directory: Arc<Directory<u32>> = Arc::new(Directory::new());
        let mut handles = Vec::new();
        for n in 0..16u32 {
            let directory = directory.clone();
            handles.push(tokio::spawn(async move {
                directory.get_or_create("race", move || n)
            }));
        }

        let mut instances = Vec::new();
        for handle in handles {
            instances.push(handle.await.unwrap());
        }
        assert!(instances.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(directory.len(), 1);
    }
}
