use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use zb_api::{Result, Stream, ZulipApi};

/// Lazily populated stream id -> stream name cache.
///
/// Entries are never evicted. An id still missing after a refresh is
/// remembered as a miss and answered with "" without refetching, until a
/// later refresh adds or renames entries.
pub struct StreamDirectory {
    api: Arc<dyn ZulipApi>,
    state: RwLock<DirectoryState>,
    refresh_lock: Mutex<()>,
}

#[derive(Default)]
struct DirectoryState {
    names: HashMap<i64, String>,
    misses: HashSet<i64>,
}

enum Cached {
    Hit(String),
    KnownMiss,
    Unknown,
}

impl DirectoryState {
    fn lookup(&self, stream_id: i64) -> Cached {
        if let Some(name) = self.names.get(&stream_id) {
            return Cached::Hit(name.clone());
        }
        if self.misses.contains(&stream_id) {
            return Cached::KnownMiss;
        }
        Cached::Unknown
    }

    /// Returns true when any entry was added or renamed.
    fn merge(&mut self, streams: Vec<Stream>) -> bool {
        let mut changed = false;
        for stream in streams {
            if self.names.get(&stream.stream_id) != Some(&stream.name) {
                self.names.insert(stream.stream_id, stream.name);
                changed = true;
            }
        }
        if changed {
            self.misses.clear();
        }
        changed
    }
}

impl StreamDirectory {
    pub fn new(api: Arc<dyn ZulipApi>) -> Self {
        Self {
            api,
            state: RwLock::new(DirectoryState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Fill the cache up front. Failure is logged; lookups retry later.
    pub async fn prime(&self) {
        let _guard = self.refresh_lock.lock().await;
        match self.refresh().await {
            Ok(count) => tracing::debug!(streams = count, "zulip stream directory primed"),
            Err(error) => tracing::error!(%error, "zulip stream directory prime failed"),
        }
    }

    /// Name for `stream_id`, or "" when the stream is unknown.
    pub async fn resolve(&self, stream_id: i64) -> String {
        if let Some(name) = self.cached(stream_id).await {
            return name;
        }

        let _guard = self.refresh_lock.lock().await;
        // Someone else may have refreshed while we waited for the guard.
        if let Some(name) = self.cached(stream_id).await {
            return name;
        }

        if let Err(error) = self.refresh().await {
            tracing::error!(%error, stream_id, "zulip stream refresh failed");
            return String::new();
        }

        let mut state = self.state.write().await;
        match state.names.get(&stream_id) {
            Some(name) => name.clone(),
            None => {
                tracing::debug!(stream_id, "zulip stream id not found after refresh");
                state.misses.insert(stream_id);
                String::new()
            }
        }
    }

    async fn cached(&self, stream_id: i64) -> Option<String> {
        match self.state.read().await.lookup(stream_id) {
            Cached::Hit(name) => Some(name),
            Cached::KnownMiss => Some(String::new()),
            Cached::Unknown => None,
        }
    }

    async fn refresh(&self) -> Result<usize> {
        let streams = self.api.get_streams().await?;
        let count = streams.len();
        self.state.write().await.merge(streams);
        Ok(count)
    }
}
