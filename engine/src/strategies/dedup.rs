//! §4.E Deduplicate: exact-signature deduplication for every tool, plus
//! overlapping-range deduplication specific to `read` calls.

use std::collections::HashMap;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::hash::canonicalize;
use crate::model::{CallId, Message, Part, Role, ToolStatus};
use crate::state::SessionState;
use crate::token::TokenCounter;

pub(super) fn extract_file_path(input: &Value) -> Option<String> {
    for key in ["filePath", "file_path", "path"] {
        if let Some(v) = input.get(key).and_then(Value::as_str) {
            return Some(v.to_string());
        }
    }
    None
}

fn is_eligible(state: &SessionState, config: &EngineConfig, call_id: &CallId, tool: &str, parameters: &Value) -> bool {
    if state.prune.tool_ids.contains(call_id) {
        return false;
    }
    if config.is_protected_tool(tool) {
        return false;
    }
    if let Some(path) = extract_file_path(parameters) {
        if config.is_protected_file(&path) {
            return false;
        }
    }
    true
}

fn collect_outputs(messages: &[Message]) -> HashMap<CallId, String> {
    let mut outputs = HashMap::new();
    for message in messages {
        if message.role != Role::Assistant {
            continue;
        }
        for part in &message.parts {
            if let Part::Tool { call_id, state, .. } = part {
                if let Some(output) = &state.output {
                    outputs.insert(call_id.clone(), output.clone());
                }
            }
        }
    }
    outputs
}

fn prune_with_tokens(state: &mut SessionState, call_id: CallId, tokens: u64) {
    if state.prune_tool(call_id) {
        state.stats.deduplication.record(tokens);
    }
}

/// `(offset, limit)` as read from a `read` call's input, `None` meaning
/// "unset" per the JSON field being absent.
type Range = (Option<i64>, Option<i64>);

fn range_of(input: &Value) -> Range {
    (
        input.get("offset").and_then(Value::as_i64),
        input.get("limit").and_then(Value::as_i64),
    )
}

/// A range is contained in another if it starts at or after the container
/// and ends at or before it; an unlimited container (`limit = None`)
/// contains any later-offset range.
fn contains(container: Range, inner: Range) -> bool {
    let c_off = container.0.unwrap_or(0);
    let i_off = inner.0.unwrap_or(0);
    if i_off < c_off {
        return false;
    }
    match container.1 {
        None => true,
        Some(c_limit) => {
            let c_end = c_off + c_limit;
            match inner.1 {
                None => false,
                Some(i_limit) => i_off + i_limit <= c_end,
            }
        }
    }
}

/// Exact-signature deduplication, then overlapping-range deduplication for
/// `read` calls (§4.E). Re-entrant: a second run over the same state finds
/// nothing left to prune.
pub fn deduplicate(state: &mut SessionState, config: &EngineConfig, messages: &mut [Message], tc: &mut TokenCounter) {
    if !config.strategies.deduplication.enabled {
        return;
    }

    let outputs = collect_outputs(messages);

    // Exact signature groups: (tool, canonical input) -> ordered call ids.
    let mut groups: HashMap<(String, String), Vec<(CallId, i64)>> = HashMap::new();
    for (call_id, entry) in state.tool_parameters.iter_in_order() {
        if !matches!(entry.status, Some(ToolStatus::Completed)) {
            continue;
        }
        if !is_eligible(state, config, call_id, &entry.tool, &entry.parameters) {
            continue;
        }
        let signature = canonicalize(&entry.parameters).to_string();
        groups
            .entry((entry.tool.clone(), signature))
            .or_default()
            .push((call_id.clone(), entry.turn));
    }

    let mut to_prune: Vec<CallId> = Vec::new();
    for (_, mut calls) in groups {
        if calls.len() < 2 {
            continue;
        }
        // Stable sort by turn keeps insertion order for same-turn ties, so
        // the chronologically last call (the one actually kept) is the one
        // the host most recently issued.
        calls.sort_by_key(|(_, turn)| *turn);
        calls.pop();
        to_prune.extend(calls.into_iter().map(|(id, _)| id));
    }

    for call_id in to_prune {
        let tokens = outputs.get(&call_id).map(|o| tc.count(o) as u64).unwrap_or(0);
        prune_with_tokens(state, call_id, tokens);
    }

    // Overlapping-range dedup, `read` only, grouped by file path.
    let mut by_path: HashMap<String, Vec<(CallId, i64, Range)>> = HashMap::new();
    for (call_id, entry) in state.tool_parameters.iter_in_order() {
        if entry.tool != "read" || !matches!(entry.status, Some(ToolStatus::Completed)) {
            continue;
        }
        if !is_eligible(state, config, call_id, &entry.tool, &entry.parameters) {
            continue;
        }
        let Some(path) = extract_file_path(&entry.parameters) else {
            continue;
        };
        by_path
            .entry(path)
            .or_default()
            .push((call_id.clone(), entry.turn, range_of(&entry.parameters)));
    }

    let mut to_prune: Vec<CallId> = Vec::new();
    for (_, reads) in by_path {
        for i in 0..reads.len() {
            let (ref id_a, turn_a, range_a) = reads[i];
            if state.prune.tool_ids.contains(id_a) || to_prune.contains(id_a) {
                continue;
            }
            for (j, (id_b, turn_b, range_b)) in reads.iter().enumerate() {
                if i == j || state.prune.tool_ids.contains(id_b) {
                    continue;
                }
                let identical = range_a == *range_b;
                let superseded = if identical {
                    // Chronology wins: the earlier of two identical ranges is pruned.
                    turn_a < *turn_b || (turn_a == *turn_b && i < j)
                } else {
                    contains(*range_b, range_a) && *turn_b > turn_a
                };
                if superseded {
                    to_prune.push(id_a.clone());
                    break;
                }
            }
        }
    }

    for call_id in to_prune {
        let tokens = outputs.get(&call_id).map(|o| tc.count(o) as u64).unwrap_or(0);
        prune_with_tokens(state, call_id, tokens);
    }
}
