//! §4.E Purge errors: retires stale failing tool calls. The call id is
//! pruned but flagged in `purged_error_inputs` so the view assembler keeps
//! rendering the error message while eliding only the input (§8, "input
//! stripping" rather than full removal).

use crate::config::EngineConfig;
use crate::model::{CallId, Message, ToolStatus};
use crate::state::{SessionState, ToolParamEntry};
use crate::strategies::dedup::extract_file_path;
use crate::token::TokenCounter;

/// Protected-file tools are exempt from error-purging the same way they are
/// exempt from deduplication (invariant 6) — a failing `read`/`edit` on a
/// protected path stays put regardless of age.
fn is_purge_eligible(config: &EngineConfig, call_id: &CallId, entry: &ToolParamEntry, state: &SessionState) -> bool {
    if state.prune.tool_ids.contains(call_id) {
        return false;
    }
    if config.is_protected_tool(&entry.tool) {
        return false;
    }
    if let Some(path) = extract_file_path(&entry.parameters) {
        if config.is_protected_file(&path) {
            return false;
        }
    }
    true
}

pub fn purge_errors(state: &mut SessionState, config: &EngineConfig, _messages: &mut [Message], tc: &mut TokenCounter) {
    let cfg = &config.strategies.purge_errors;
    if !cfg.enabled {
        return;
    }

    let current_turn = state.current_turn;
    let threshold = cfg.turns as i64;

    let candidates: Vec<CallId> = state
        .tool_parameters
        .iter()
        .filter(|(call_id, entry)| {
            matches!(entry.status, Some(ToolStatus::Error))
                && current_turn - entry.turn >= threshold
                && is_purge_eligible(config, call_id, entry, state)
        })
        .map(|(call_id, _)| call_id.clone())
        .collect();

    for call_id in candidates {
        let tokens = state
            .tool_parameters
            .get(&call_id)
            .map(|entry| tc.count(&entry.parameters.to_string()) as u64)
            .unwrap_or(0);
        if state.prune_tool(call_id.clone()) {
            state.stats.purge_errors.record(tokens);
            state.purged_error_inputs.insert(call_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn erroring_call(turn: i64) -> ToolParamEntry {
        ToolParamEntry {
            tool: "bash".to_string(),
            parameters: json!({"command": "exit 1"}),
            status: Some(ToolStatus::Error),
            error: Some("exit code 1".to_string()),
            turn,
        }
    }

    #[test]
    fn old_error_is_purged_recent_error_is_not() {
        let mut state = SessionState::default();
        state.current_turn = 10;
        state.tool_parameters.insert("old".to_string(), erroring_call(1));
        state.tool_parameters.insert("recent".to_string(), erroring_call(9));

        let mut cfg = EngineConfig::default();
        cfg.strategies.purge_errors.enabled = true;
        let mut tc = TokenCounter::default();
        let mut messages: Vec<Message> = Vec::new();

        purge_errors(&mut state, &cfg, &mut messages, &mut tc);

        assert!(state.prune.tool_ids.contains(&"old".to_string()));
        assert!(state.purged_error_inputs.contains(&"old".to_string()));
        assert!(!state.prune.tool_ids.contains(&"recent".to_string()));
    }

    #[test]
    fn protected_tool_errors_are_never_purged() {
        let mut state = SessionState::default();
        state.current_turn = 10;
        let mut entry = erroring_call(1);
        entry.tool = "write".to_string();
        state.tool_parameters.insert("w1".to_string(), entry);

        let mut cfg = EngineConfig::default();
        cfg.strategies.purge_errors.enabled = true;
        let mut tc = TokenCounter::default();
        let mut messages: Vec<Message> = Vec::new();

        purge_errors(&mut state, &cfg, &mut messages, &mut tc);
        assert!(state.prune.tool_ids.is_empty());
    }

    #[test]
    fn protected_file_errors_are_never_purged() {
        let mut state = SessionState::default();
        state.current_turn = 10;
        let mut entry = erroring_call(1);
        entry.tool = "edit".to_string();
        entry.parameters = json!({"filePath": "CLAUDE.md"});
        state.tool_parameters.insert("e1".to_string(), entry);

        let mut cfg = EngineConfig::default();
        cfg.strategies.purge_errors.enabled = true;
        cfg.protected_file_patterns.push("CLAUDE.md".to_string());
        let mut tc = TokenCounter::default();
        let mut messages: Vec<Message> = Vec::new();

        purge_errors(&mut state, &cfg, &mut messages, &mut tc);
        assert!(state.prune.tool_ids.is_empty());
    }

    #[test]
    fn disabled_by_default() {
        let mut state = SessionState::default();
        state.current_turn = 10;
        state.tool_parameters.insert("old".to_string(), erroring_call(1));

        let cfg = EngineConfig::default();
        let mut tc = TokenCounter::default();
        let mut messages: Vec<Message> = Vec::new();

        purge_errors(&mut state, &cfg, &mut messages, &mut tc);
        assert!(state.prune.tool_ids.is_empty());
    }
}
