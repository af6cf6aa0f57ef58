//! Persistence to a per-session JSON document (§4.C, §6).
//!
//! One file per session at `<state_dir>/acp/<sessionId>.json`. Best-effort:
//! a save/load failure is logged and never aborts the calling operation —
//! the in-memory state remains authoritative.

use std::path::{Path, PathBuf};

use crate::error::StateError;
use crate::model::SessionId;

use super::SessionState;

pub fn session_path(state_dir: &Path, session_id: &SessionId) -> PathBuf {
    state_dir.join("acp").join(format!("{session_id}.json"))
}

pub fn save(state_dir: &Path, session_id: &SessionId, state: &SessionState) -> Result<(), StateError> {
    let path = session_path(state_dir, session_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(state)?;
    std::fs::write(&path, json)?;
    Ok(())
}

/// Fire-and-forget variant used by hooks: logs and swallows any error.
pub fn save_best_effort(state_dir: &Path, session_id: &SessionId, state: &SessionState) {
    if let Err(err) = save(state_dir, session_id, state) {
        tracing::error!(session_id = %session_id, error = %err, "failed to persist session state");
    }
}

/// Tolerates a missing file (returns `Ok(None)`); readers must tolerate
/// unknown fields to allow forward compatibility (serde's default `deny
/// unknown fields = false` already does this).
pub fn load(state_dir: &Path, session_id: &SessionId) -> Result<Option<SessionState>, StateError> {
    let path = session_path(state_dir, session_id);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read(&path)?;
    let state = serde_json::from_slice(&content)?;
    Ok(Some(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PartId;

    #[test]
    fn round_trips_a_state_with_every_map_and_set_populated() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = "sess-1".to_string();

        let mut state = SessionState::default();
        state.current_turn = 4;
        state
            .hash_registry
            .register_call(&"abc123".to_string(), &"call-1".to_string());
        state
            .hash_registry
            .mint_message_hash(&PartId::new("m1", 0));
        state.prune_tool("call-1".to_string());
        state
            .cursors
            .files
            .entry("/a.ts".to_string())
            .or_default()
            .insert("call-1".to_string());
        state.cursors.snapshots.all_call_ids.insert("call-2".to_string());
        state.cursors.snapshots.latest_call_id = Some("call-2".to_string());
        state.cursors.retries.push_failure("bash", "abc123", "call-3".to_string());
        state.push_discard_history(vec!["abc123".to_string()], 42, "manual discard");

        save(dir.path(), &session_id, &state).unwrap();
        let loaded = load(dir.path(), &session_id).unwrap().unwrap();

        assert_eq!(loaded.current_turn, 4);
        assert!(loaded.prune.tool_ids.contains(&"call-1".to_string()));
        assert_eq!(loaded.cursors.snapshots.latest_call_id, Some("call-2".to_string()));
        assert_eq!(loaded.discard_history.len(), 1);
        assert!(loaded
            .cursors
            .files
            .get("/a.ts")
            .unwrap()
            .contains(&"call-1".to_string()));
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load(dir.path(), &"no-such-session".to_string()).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn unknown_fields_in_persisted_json_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = "sess-2".to_string();
        let path = session_path(dir.path(), &session_id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut json = serde_json::to_value(SessionState::default()).unwrap();
        json["from_a_future_version"] = serde_json::json!("ignored");
        std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let loaded = load(dir.path(), &session_id).unwrap();
        assert!(loaded.is_some());
    }
}
