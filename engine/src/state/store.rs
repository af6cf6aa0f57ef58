//! §4.C / §5: the per-process, per-session state store. A concurrent map
//! keyed by session id so independent sessions never contend with each
//! other; each session's own state is additionally guarded by an async
//! mutex so overlapping hook invocations for the *same* session serialize.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::model::SessionId;

use super::{persist, SessionState};

pub struct SessionStore {
    state_dir: PathBuf,
    sessions: DashMap<SessionId, Arc<Mutex<SessionState>>>,
}

impl SessionStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            sessions: DashMap::new(),
        }
    }

    /// Created on first observation of a session id (rehydrated from disk if
    /// a persisted file exists), then reused for the lifetime of the process.
    pub async fn get_or_create(&self, session_id: &SessionId) -> Arc<Mutex<SessionState>> {
        if let Some(existing) = self.sessions.get(session_id) {
            return existing.clone();
        }

        let loaded = persist::load(&self.state_dir, session_id)
            .inspect_err(|err| {
                tracing::error!(session_id = %session_id, error = %err, "failed to load persisted session state");
            })
            .ok()
            .flatten()
            .unwrap_or_default();

        let handle = Arc::new(Mutex::new(loaded));
        self.sessions
            .entry(session_id.clone())
            .or_insert(handle)
            .clone()
    }

    pub async fn save(&self, session_id: &SessionId) {
        let Some(handle) = self.sessions.get(session_id).map(|h| h.clone()) else {
            return;
        };
        let state = handle.lock().await;
        persist::save_best_effort(&self.state_dir, session_id, &state);
    }

    /// session-end hook: flush to disk and evict the in-memory entry.
    pub async fn evict(&self, session_id: &SessionId) {
        self.save(session_id).await;
        self.sessions.remove(session_id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_sessions_do_not_observe_each_others_prune_lists() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));

        let s1 = "session-a".to_string();
        let s2 = "session-b".to_string();

        let h1 = store.get_or_create(&s1).await;
        let h2 = store.get_or_create(&s2).await;

        {
            let mut state = h1.lock().await;
            state.prune_tool("call-from-a".to_string());
        }
        {
            let mut state = h2.lock().await;
            state.prune_tool("call-from-b".to_string());
        }

        let state1 = h1.lock().await;
        let state2 = h2.lock().await;
        assert!(state1.prune.tool_ids.contains(&"call-from-a".to_string()));
        assert!(!state1.prune.tool_ids.contains(&"call-from-b".to_string()));
        assert!(state2.prune.tool_ids.contains(&"call-from-b".to_string()));
        assert!(!state2.prune.tool_ids.contains(&"call-from-a".to_string()));
    }

    #[tokio::test]
    async fn evict_persists_then_removes_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session_id = "session-c".to_string();

        let handle = store.get_or_create(&session_id).await;
        {
            let mut state = handle.lock().await;
            state.current_turn = 7;
        }
        store.evict(&session_id).await;
        assert_eq!(store.session_count(), 0);

        let reloaded = store.get_or_create(&session_id).await;
        assert_eq!(reloaded.lock().await.current_turn, 7);
    }
}
