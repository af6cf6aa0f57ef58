//! §4.D Tool-cache synchronizer: walks the current message list, assigns
//! turn numbers, populates the hash registry and tool-parameter map, runs
//! the auto-supersede cascade, and tracks the todo list.

use serde_json::Value;

use crate::config::EngineConfig;
use crate::hash::tool_hash;
use crate::model::{CallId, Message, Part, Role, ToolStatus};
use crate::state::{SessionState, TodoItem, TodoStatus, ToolParamEntry};
use crate::token::TokenCounter;

const MANUAL_PRUNE_TOOLS: &[&str] = &["context", "replace"];

fn extract_file_path(input: &Value) -> Option<String> {
    for key in ["filePath", "file_path", "path"] {
        if let Some(v) = input.get(key).and_then(Value::as_str) {
            return Some(v.to_string());
        }
    }
    None
}

const STATE_QUERY_PREFIXES: &[&str] = &[
    "ls", "pwd", "git status", "git diff --stat", "git log", "whoami", "date", "env", "printenv",
];

fn is_state_query_command(command: &str) -> bool {
    let trimmed = command.trim();
    STATE_QUERY_PREFIXES
        .iter()
        .any(|prefix| trimmed == *prefix || trimmed.starts_with(&format!("{prefix} ")))
}

fn count_total_turns(messages: &[Message]) -> i64 {
    let mut turns = 0i64;
    for message in messages {
        if message.role != Role::Assistant {
            continue;
        }
        for part in &message.parts {
            if matches!(part, Part::StepStart) {
                turns += 1;
            }
        }
    }
    turns
}

/// `sync(state, config, messages)`: a full, idempotent recomputation over
/// the current message list (not an incremental diff) — re-running it with
/// an unchanged message list changes nothing (§8).
pub fn sync(state: &mut SessionState, config: &EngineConfig, messages: &[Message], tc: &mut TokenCounter) {
    let final_turn = count_total_turns(messages);
    let mut turn_counter = 0i64;
    let mut pending_todo_sync: Option<(CallId, String)> = None;

    for message in messages {
        if message.role != Role::Assistant {
            continue;
        }

        for part in &message.parts {
            match part {
                Part::StepStart => {
                    turn_counter += 1;
                }
                Part::Tool {
                    call_id,
                    tool,
                    input,
                    state: tool_state,
                } => {
                    let turn = turn_counter;
                    state.last_tool_prune =
                        MANUAL_PRUNE_TOOLS.contains(&tool.as_str()) && tool_state.is_completed();

                    if tool == "todowrite" && tool_state.is_completed() {
                        if let Some(output) = &tool_state.output {
                            pending_todo_sync = Some((call_id.clone(), output.clone()));
                        }
                    }

                    if state.tool_parameters.contains(call_id) {
                        continue;
                    }

                    let turn_protected = config.turn_protection.enabled
                        && final_turn - turn < config.turn_protection.turns as i64;

                    if !turn_protected && !config.is_protected_tool(tool) {
                        register_and_cascade(state, config, call_id, tool, input, tool_state.status, turn, tc);
                    }

                    state.tool_parameters.insert(
                        call_id.clone(),
                        ToolParamEntry {
                            tool: tool.clone(),
                            parameters: input.clone(),
                            status: tool_state.status,
                            error: tool_state.error.clone(),
                            turn,
                        },
                    );
                }
                _ => {}
            }
        }
    }

    state.current_turn = final_turn;

    if let Some((call_id, output)) = pending_todo_sync {
        if state.cursors.todo.last_write_call_id.as_ref() != Some(&call_id) {
            apply_todo_output(state, &output, final_turn);
            state.cursors.todo.last_write_call_id = Some(call_id);
        }
    }

    let evicted = state.tool_parameters.trim(config.max_tool_cache_size);
    for call_id in evicted {
        state.hash_registry.remove_call(&call_id);
    }
}

fn is_eligible(state: &SessionState, config: &EngineConfig, candidate: &CallId, new_turn: i64) -> bool {
    let Some(entry) = state.tool_parameters.get(candidate) else {
        return false;
    };
    if entry.turn == new_turn {
        return false;
    }
    if !matches!(entry.status, Some(ToolStatus::Completed)) {
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

fn estimate_prune_tokens(state: &SessionState, call_id: &CallId, tc: &mut TokenCounter) -> u64 {
    state
        .tool_parameters
        .get(call_id)
        .map(|entry| entry.parameters.to_string())
        .map(|text| tc.count(&text) as u64)
        .unwrap_or(0)
}

type StatBump = fn(&mut crate::state::AutoSupersedeStats, u64);

fn supersede(state: &mut SessionState, candidate: CallId, tokens: u64, bump: StatBump) {
    if state.prune_tool(candidate) {
        bump(&mut state.stats.auto_supersede, tokens);
    }
}

fn register_and_cascade(
    state: &mut SessionState,
    config: &EngineConfig,
    call_id: &CallId,
    tool: &str,
    input: &Value,
    status: Option<ToolStatus>,
    turn: i64,
    tc: &mut TokenCounter,
) {
    let base_hash = tool_hash(tool, input);
    state.hash_registry.register_call(&base_hash, call_id);

    let rules = config.strategies.aggressive_pruning.clone();
    let is_completed = matches!(status, Some(ToolStatus::Completed));

    // Hash rule: an earlier call with an identical (tool, canonical input)
    // signature is superseded by this one.
    if rules.hash && is_completed {
        if let Some(prev) = state.cursors.content_index.get(&base_hash).cloned() {
            if prev != *call_id && is_eligible(state, config, &prev, turn) {
                let tokens = estimate_prune_tokens(state, &prev, tc);
                supersede(state, prev, tokens, |s, t| s.hash.record(t));
            }
        }
        state.cursors.content_index.insert(base_hash.clone(), call_id.clone());
    }

    // File rule: a write/edit supersedes all prior calls on the same path; a
    // read/grep supersedes only if the path was already touched.
    if rules.file {
        if let Some(path) = extract_file_path(input) {
            let touched_before = state.cursors.files.contains_key(&path);
            let applies = matches!(tool, "write" | "edit") || touched_before;
            if applies {
                if let Some(priors) = state.cursors.files.get(&path).map(|set| set.0.clone()) {
                    for prior in priors {
                        if prior != *call_id && is_eligible(state, config, &prior, turn) {
                            let tokens = estimate_prune_tokens(state, &prior, tc);
                            supersede(state, prior, tokens, |s, t| s.file.record(t));
                        }
                    }
                }
            }
            state.cursors.files.entry(path).or_default().insert(call_id.clone());
        }
    }

    // Todo rule: the newest todowrite/todoread supersedes the previous one.
    if rules.todo && matches!(tool, "todowrite" | "todoread") && is_completed {
        if let Some(prev) = state.cursors.todo.last_call_id.clone() {
            if prev != *call_id && is_eligible(state, config, &prev, turn) {
                let tokens = estimate_prune_tokens(state, &prev, tc);
                supersede(state, prev, tokens, |s, t| s.todo.record(t));
            }
        }
        state.cursors.todo.last_call_id = Some(call_id.clone());
    }

    // URL rule.
    if rules.url && tool == "webfetch" {
        if let Some(url) = input.get("url").and_then(Value::as_str).map(str::to_string) {
            if let Some(priors) = state.cursors.urls.get(&url).map(|set| set.0.clone()) {
                for prior in priors {
                    if prior != *call_id && is_eligible(state, config, &prior, turn) {
                        let tokens = estimate_prune_tokens(state, &prior, tc);
                        supersede(state, prior, tokens, |s, t| s.url.record(t));
                    }
                }
            }
            state.cursors.urls.entry(url).or_default().insert(call_id.clone());
        }
    }

    // StateQuery rule.
    if rules.state_query && tool == "bash" {
        if let Some(cmd) = input.get("command").and_then(Value::as_str) {
            if is_state_query_command(cmd) {
                let cmd = cmd.to_string();
                if let Some(priors) = state.cursors.state_queries.get(&cmd).map(|set| set.0.clone()) {
                    for prior in priors {
                        if prior != *call_id && is_eligible(state, config, &prior, turn) {
                            let tokens = estimate_prune_tokens(state, &prior, tc);
                            supersede(state, prior, tokens, |s, t| s.state_query.record(t));
                        }
                    }
                }
                state.cursors.state_queries.entry(cmd).or_default().insert(call_id.clone());
            }
        }
    }

    // Snapshot rule: every later snapshot supersedes all prior ones.
    if rules.snapshot && tool == "snapshot" {
        let priors: Vec<CallId> = state.cursors.snapshots.all_call_ids.0.iter().cloned().collect();
        for prior in priors {
            if prior != *call_id && is_eligible(state, config, &prior, turn) {
                let tokens = estimate_prune_tokens(state, &prior, tc);
                supersede(state, prior, tokens, |s, t| s.snapshot.record(t));
            }
        }
        state.cursors.snapshots.all_call_ids.insert(call_id.clone());
        state.cursors.snapshots.latest_call_id = Some(call_id.clone());
    }

    // Retry rule: a completed call supersedes prior failures sharing its
    // (tool, hash) signature; a failing call is remembered for later.
    if rules.retry {
        if is_completed {
            let failures = state.cursors.retries.take_failures(tool, &base_hash);
            for failed in failures {
                if failed != *call_id && !config.is_protected_tool(tool) {
                    let tokens = estimate_prune_tokens(state, &failed, tc);
                    supersede(state, failed, tokens, |s, t| s.retry.record(t));
                }
            }
        } else if matches!(status, Some(ToolStatus::Error)) {
            state.cursors.retries.push_failure(tool, &base_hash, call_id.clone());
        }
    }
}

/// Parses a completed `todowrite` call's JSON output and diffs it against the
/// current todo list, preserving `inProgressSince` for items whose content
/// changed while status stayed `in_progress` (invariant 8).
pub fn apply_todo_output(state: &mut SessionState, output: &str, current_turn: i64) {
    let Ok(parsed) = serde_json::from_str::<Vec<RawTodoItem>>(output) else {
        return;
    };

    let mut next = Vec::with_capacity(parsed.len());
    for raw in parsed {
        let previous = state.todos.iter().find(|t| t.id == raw.id);
        let was_in_progress = previous.map(|p| p.status == TodoStatus::InProgress).unwrap_or(false);
        let now_in_progress = raw.status == TodoStatus::InProgress;

        let in_progress_since = if now_in_progress && was_in_progress {
            previous.and_then(|p| p.in_progress_since)
        } else if now_in_progress {
            Some(current_turn)
        } else {
            None
        };

        next.push(TodoItem {
            id: raw.id,
            content: raw.content,
            status: raw.status,
            priority: raw.priority,
            in_progress_since,
        });
    }

    state.todos = next;
    state.cursors.todo.last_reminder_turn = None;
}

#[derive(serde::Deserialize)]
pub struct RawTodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    #[serde(default)]
    pub priority: Option<String>,
}

/// Stuck-task detection (§8 scenario 7): todo items that have sat
/// `in_progress` for at least `stuck_task_turns` turns.
pub fn stuck_task_reminders(state: &SessionState, current_turn: i64, stuck_task_turns: i64) -> Vec<String> {
    state
        .todos
        .iter()
        .filter(|t| t.status == TodoStatus::InProgress)
        .filter_map(|t| {
            let since = t.in_progress_since?;
            let elapsed = current_turn - since;
            if elapsed >= stuck_task_turns {
                Some(format!("task {:?} has been in_progress for {} turns", t.id, elapsed))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, Part, Role, ToolState};
    use serde_json::json;

    fn tool_part(call_id: &str, tool: &str, input: Value, state: ToolState) -> Part {
        Part::Tool {
            call_id: call_id.to_string(),
            tool: tool.to_string(),
            input,
            state,
        }
    }

    #[test]
    fn hash_rule_supersedes_duplicate_glob() {
        let mut state = SessionState::default();
        let cfg = EngineConfig::default();
        let mut tc = TokenCounter::default();

        let messages = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![
                Part::StepStart,
                tool_part("call-1", "glob", json!({"pattern": "*.ts"}), ToolState::completed("a.ts")),
                Part::StepStart,
                tool_part("call-2", "glob", json!({"pattern": "*.ts"}), ToolState::completed("a.ts")),
            ],
        )];

        sync(&mut state, &cfg, &messages, &mut tc);

        assert!(state.prune.tool_ids.contains(&"call-1".to_string()));
        assert!(!state.prune.tool_ids.contains(&"call-2".to_string()));
        assert_eq!(state.stats.auto_supersede.hash.count, 1);
    }

    #[test]
    fn write_supersedes_prior_reads_on_same_file() {
        let mut state = SessionState::default();
        let cfg = EngineConfig::default();
        let mut tc = TokenCounter::default();

        let messages = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![
                Part::StepStart,
                tool_part("read-1", "read", json!({"filePath": "/a.ts"}), ToolState::completed("x")),
                Part::StepStart,
                tool_part("read-2", "read", json!({"filePath": "/a.ts"}), ToolState::completed("x")),
                Part::StepStart,
                tool_part(
                    "write-1",
                    "write",
                    json!({"filePath": "/a.ts", "content": "y"}),
                    ToolState::completed("ok"),
                ),
            ],
        )];

        sync(&mut state, &cfg, &messages, &mut tc);

        assert!(state.prune.tool_ids.contains(&"read-1".to_string()));
        assert!(state.prune.tool_ids.contains(&"read-2".to_string()));
        assert!(!state.prune.tool_ids.contains(&"write-1".to_string()));
    }

    #[test]
    fn protected_tool_is_never_registered_or_superseded() {
        let mut state = SessionState::default();
        let cfg = EngineConfig::default();
        let mut tc = TokenCounter::default();

        let messages = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![
                Part::StepStart,
                tool_part("w1", "write", json!({"filePath": "/a.ts"}), ToolState::completed("ok")),
                Part::StepStart,
                tool_part("w2", "write", json!({"filePath": "/a.ts"}), ToolState::completed("ok")),
            ],
        )];

        sync(&mut state, &cfg, &messages, &mut tc);

        assert!(state.prune.tool_ids.is_empty());
        assert!(!state.hash_registry.call_ids.contains_key(&"w1".to_string()));
    }

    #[test]
    fn sync_is_idempotent() {
        let mut state = SessionState::default();
        let cfg = EngineConfig::default();
        let mut tc = TokenCounter::default();

        let messages = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![
                Part::StepStart,
                tool_part("call-1", "glob", json!({"pattern": "*.ts"}), ToolState::completed("a.ts")),
                Part::StepStart,
                tool_part("call-2", "glob", json!({"pattern": "*.ts"}), ToolState::completed("a.ts")),
            ],
        )];

        sync(&mut state, &cfg, &messages, &mut tc);
        let after_first = state.stats.auto_supersede.hash.count;
        sync(&mut state, &cfg, &messages, &mut tc);
        assert_eq!(state.stats.auto_supersede.hash.count, after_first);
    }

    #[test]
    fn todowrite_output_is_diffed_into_todos_preserving_in_progress_since() {
        let mut state = SessionState::default();
        let cfg = EngineConfig::default();
        let mut tc = TokenCounter::default();

        let output_1 = r#"[{"id":"T1","content":"do the thing","status":"in_progress"}]"#;
        let messages_1 = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![
                Part::StepStart,
                tool_part("tw-1", "todowrite", json!({"todos": []}), ToolState::completed(output_1)),
            ],
        )];
        sync(&mut state, &cfg, &messages_1, &mut tc);
        let since = state.todos[0].in_progress_since;
        assert_eq!(since, Some(1));

        let output_2 = r#"[{"id":"T1","content":"do the thing (edited)","status":"in_progress"}]"#;
        let messages_2 = vec![
            messages_1[0].clone(),
            Message::new(
                "m2",
                Role::Assistant,
                vec![
                    Part::StepStart,
                    tool_part("tw-2", "todowrite", json!({"todos": []}), ToolState::completed(output_2)),
                ],
            ),
        ];
        sync(&mut state, &cfg, &messages_2, &mut tc);
        assert_eq!(state.todos[0].content, "do the thing (edited)");
        assert_eq!(state.todos[0].in_progress_since, since);
    }

    #[test]
    fn stuck_task_reminder_mentions_elapsed_turns() {
        let mut state = SessionState::default();
        state.todos.push(TodoItem {
            id: "T1".to_string(),
            content: "do the thing".to_string(),
            status: TodoStatus::InProgress,
            priority: None,
            in_progress_since: Some(5),
        });

        let reminders = stuck_task_reminders(&state, 17, 12);
        assert_eq!(reminders.len(), 1);
        assert!(reminders[0].contains("12 turns"));

        state.todos[0].status = TodoStatus::Completed;
        let reminders = stuck_task_reminders(&state, 30, 12);
        assert!(reminders.is_empty());
    }
}
