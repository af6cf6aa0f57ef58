//! §4.F Manual operations: the `context(action, targets)` surface the model
//! drives directly — discard / distill / restore over tool, message, and
//! reasoning hashes, plus the `{"[tools]","[messages]","[thinking]","[*]","[all]"}`
//! bulk patterns.

use crate::config::EngineConfig;
use crate::error::ManualOpError;
use crate::hash::{is_valid_hash_format, TargetKind};
use crate::model::PartId;
use crate::state::SessionState;
use crate::token::TokenCounter;

/// Default token-saving heuristics for parts whose original text the
/// engine does not re-read to re-estimate (§4.F).
const TEXT_DISCARD_TOKEN_HEURISTIC: u64 = 500;
const REASONING_DISCARD_TOKEN_HEURISTIC: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Discard,
    Distill,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BulkPattern {
    Tools,
    Messages,
    Thinking,
    All,
}

enum TargetSpec {
    Hash(String),
    Bulk(BulkPattern),
}

fn parse_target(raw: &str) -> Result<TargetSpec, ManualOpError> {
    match raw {
        "[tools]" => Ok(TargetSpec::Bulk(BulkPattern::Tools)),
        "[messages]" => Ok(TargetSpec::Bulk(BulkPattern::Messages)),
        "[thinking]" => Ok(TargetSpec::Bulk(BulkPattern::Thinking)),
        "[*]" | "[all]" => Ok(TargetSpec::Bulk(BulkPattern::All)),
        other if is_valid_hash_format(other) => Ok(TargetSpec::Hash(other.to_string())),
        other => Err(ManualOpError::InvalidHashFormat(other.to_string())),
    }
}

fn expand_bulk(state: &SessionState, config: &EngineConfig, pattern: BulkPattern) -> Vec<String> {
    let tools = || -> Vec<String> {
        state
            .hash_registry
            .calls
            .iter()
            .filter(|(_, call_id)| {
                !state.prune.tool_ids.contains(call_id)
                    && state
                        .tool_parameters
                        .get(call_id)
                        .map(|entry| !config.is_protected_tool(&entry.tool))
                        .unwrap_or(true)
            })
            .map(|(hash, _)| hash.clone())
            .collect()
    };
    let messages = || -> Vec<String> {
        state
            .hash_registry
            .messages
            .iter()
            .filter(|(_, part_id)| !state.prune.message_part_ids.contains(part_id))
            .map(|(hash, _)| hash.clone())
            .collect()
    };
    let thinking = || -> Vec<String> { state.hash_registry.reasoning.keys().cloned().collect() };

    match pattern {
        BulkPattern::Tools => tools(),
        BulkPattern::Messages => messages(),
        BulkPattern::Thinking => thinking(),
        BulkPattern::All => tools().into_iter().chain(messages()).chain(thinking()).collect(),
    }
}

/// Human-readable label for a resolved target, used by the notification
/// formatter (§4.I).
#[derive(Debug, Clone)]
pub struct AppliedTarget {
    pub hash: String,
    pub label: String,
    pub tokens_saved: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ManualOpOutcome {
    pub applied: Vec<AppliedTarget>,
    pub already_pruned: Vec<String>,
    pub unknown: Vec<String>,
    pub tokens_saved: u64,
}

impl ManualOpOutcome {
    fn record_applied(&mut self, hash: String, label: String, tokens: u64) {
        self.tokens_saved += tokens;
        self.applied.push(AppliedTarget {
            hash,
            label,
            tokens_saved: tokens,
        });
    }
}

/// `context(action, targets)` (§4.F, §6). `targets` pairs a raw hash/bulk
/// pattern with an optional summary (`Some` only for `distill`).
pub fn context_op(
    state: &mut SessionState,
    config: &EngineConfig,
    action: Action,
    targets: Vec<(String, Option<String>)>,
    tc: &mut TokenCounter,
) -> Result<ManualOpOutcome, ManualOpError> {
    if targets.is_empty() {
        return Err(ManualOpError::EmptyTargets);
    }

    let mut resolved: Vec<(String, Option<String>)> = Vec::new();
    for (raw, summary) in &targets {
        if action != Action::Distill && summary.is_some() {
            return Err(ManualOpError::UnexpectedSummary(raw.clone()));
        }
        match parse_target(raw)? {
            TargetSpec::Hash(h) => resolved.push((h, summary.clone())),
            TargetSpec::Bulk(b) => {
                for h in expand_bulk(state, config, b) {
                    resolved.push((h, summary.clone()));
                }
            }
        }
    }

    if action == Action::Distill {
        for (hash, summary) in &resolved {
            if summary.is_none() {
                return Err(ManualOpError::MissingSummary(hash.clone()));
            }
        }
    }

    // Whole-call rejections: protected tools, and restoring a fully-forgotten part.
    for (hash, _) in &resolved {
        if let TargetKind::ToolHash = state.hash_registry.detect(hash) {
            if let Some(call_id) = state.hash_registry.calls.get(hash) {
                if let Some(entry) = state.tool_parameters.get(call_id) {
                    if config.is_protected_tool(&entry.tool) {
                        return Err(ManualOpError::ProtectedTool {
                            tool: entry.tool.clone(),
                            protected: config.protected_tools().to_vec(),
                        });
                    }
                    if action == Action::Restore
                        && config.tools.discard.fully_forget
                        && state.prune.tool_ids.contains(call_id)
                    {
                        return Err(ManualOpError::RestoreForbidden(hash.clone()));
                    }
                }
            }
        }
    }

    let mut outcome = ManualOpOutcome::default();
    for (hash, summary) in resolved {
        match state.hash_registry.detect(&hash) {
            TargetKind::UnknownHash => outcome.unknown.push(hash),
            TargetKind::ToolHash => apply_tool_target(state, action, &hash, summary, tc, &mut outcome),
            TargetKind::MessageHash => apply_message_target(state, action, &hash, summary, &mut outcome),
            TargetKind::ReasoningHash => apply_reasoning_target(state, action, &hash, &mut outcome),
        }
    }

    Ok(outcome)
}

fn apply_tool_target(
    state: &mut SessionState,
    action: Action,
    hash: &str,
    summary: Option<String>,
    tc: &mut TokenCounter,
    outcome: &mut ManualOpOutcome,
) {
    let Some(call_id) = state.hash_registry.calls.get(hash).cloned() else {
        outcome.unknown.push(hash.to_string());
        return;
    };
    let tool_name = state
        .tool_parameters
        .get(&call_id)
        .map(|e| e.tool.clone())
        .unwrap_or_default();

    match action {
        Action::Discard | Action::Distill => {
            if state.prune.tool_ids.contains(&call_id) {
                outcome.already_pruned.push(hash.to_string());
                return;
            }
            let tokens = state
                .tool_parameters
                .get(&call_id)
                .map(|e| tc.count(&e.parameters.to_string()) as u64)
                .unwrap_or(0);
            state.prune_tool(call_id.clone());
            if action == Action::Distill {
                if let Some(summary) = summary {
                    state.distill_summaries.insert(call_id.clone(), summary);
                }
                state.stats.distillation.record(tokens);
            } else {
                state.stats.manual_discard.tool.record(tokens);
            }
            state.push_discard_history(vec![hash.to_string()], tokens, "manual discard");
            outcome.record_applied(hash.to_string(), tool_name, tokens);
        }
        Action::Restore => {
            if !state.unprune_tool(&call_id) {
                outcome.already_pruned.push(hash.to_string());
                return;
            }
            state.distill_summaries.remove(&call_id);
            state.purged_error_inputs.remove(&call_id);
            outcome.record_applied(hash.to_string(), tool_name, 0);
        }
    }
}

fn apply_message_target(
    state: &mut SessionState,
    action: Action,
    hash: &str,
    summary: Option<String>,
    outcome: &mut ManualOpOutcome,
) {
    let Some(part_id) = state.hash_registry.messages.get(hash).cloned() else {
        outcome.unknown.push(hash.to_string());
        return;
    };

    match action {
        Action::Discard | Action::Distill => {
            if state.prune.message_part_ids.contains(&part_id) {
                outcome.already_pruned.push(hash.to_string());
                return;
            }
            state.prune_message(part_id.clone());
            let tokens = TEXT_DISCARD_TOKEN_HEURISTIC;
            if action == Action::Distill {
                if let Some(summary) = summary {
                    state.distill_summaries.insert(part_id.to_string(), summary);
                }
                state.stats.distillation.record(tokens);
            } else {
                state.stats.manual_discard.message.record(tokens);
            }
            state.push_discard_history(vec![hash.to_string()], tokens, "manual discard");
            outcome.record_applied(hash.to_string(), "message part".to_string(), tokens);
        }
        Action::Restore => {
            if !state.unprune_message(&part_id) {
                outcome.already_pruned.push(hash.to_string());
                return;
            }
            state.distill_summaries.remove(&part_id.to_string());
            outcome.record_applied(hash.to_string(), "message part".to_string(), 0);
        }
    }
}

/// Distill on reasoning is an alias of discard for state purposes — the
/// thinking stream is prompt-sensitive and cannot safely carry a summary —
/// but stats still record it under `distillation` for display (§4.F).
fn apply_reasoning_target(state: &mut SessionState, action: Action, hash: &str, outcome: &mut ManualOpOutcome) {
    let Some(part_id) = state.hash_registry.reasoning.get(hash).cloned() else {
        outcome.unknown.push(hash.to_string());
        return;
    };

    match action {
        Action::Discard | Action::Distill => {
            if state.prune.reasoning_part_ids.contains(&part_id) {
                outcome.already_pruned.push(hash.to_string());
                return;
            }
            state.prune_reasoning(part_id.clone());
            let tokens = REASONING_DISCARD_TOKEN_HEURISTIC;
            if action == Action::Distill {
                state.stats.distillation.record(tokens);
            } else {
                state.stats.manual_discard.thinking.record(tokens);
            }
            state.push_discard_history(vec![hash.to_string()], tokens, "manual discard");
            outcome.record_applied(hash.to_string(), "thinking block".to_string(), tokens);
        }
        Action::Restore => {
            if !state.unprune_reasoning(&part_id) {
                outcome.already_pruned.push(hash.to_string());
                return;
            }
            outcome.record_applied(hash.to_string(), "thinking block".to_string(), 0);
        }
    }
}

/// Standalone `PartId` parse helper kept here (rather than re-deriving from
/// `FromStr`) so callers never need to import `model::PartId` just to build
/// a distill-summary lookup key.
pub fn message_key(part_id: &PartId) -> String {
    part_id.to_string()
}
