//! §4.J Hooks and external interfaces: the four entry points a host drives
//! this engine through (`after-tool`, `after-turn`, `tool-registration`,
//! `session-end`), plus the dispatch path for the two model-callable tools
//! (`context`, `replace`). Mirrors this codebase family's `Tool` trait shape
//! (`name`/`spec`/`call`) without linking against any concrete tool-source
//! crate — a host adapter wraps these functions in its own `Tool` impls.

use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::{HookError, ManualOpError};
use crate::host::{Host, HostFetchError, NotePrompt};
use crate::manual::{context_op, Action};
use crate::model::SessionId;
use crate::notify::{format_auto_notification, format_manual_notification};
use crate::replace::{apply_replace_batch, ReplaceOp};
use crate::state::store::SessionStore;
use crate::strategies::run_all;
use crate::sync::{stuck_task_reminders, sync};
use crate::token::TokenCounter;

pub const CONTEXT_TOOL_NAME: &str = "context";
pub const REPLACE_TOOL_NAME: &str = "replace";

/// Registration shape for a model-callable tool, independent of any
/// particular host transport's own tool-spec type.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

fn context_tool_spec() -> ToolSpec {
    ToolSpec {
        name: CONTEXT_TOOL_NAME.to_string(),
        description: "Discard, distill, or restore tool outputs, message text, or thinking \
            blocks by their short hash, to free up context window space."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["discard", "distill", "restore"]},
                "targets": {
                    "type": "array",
                    "items": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 1,
                        "maxItems": 2
                    }
                }
            },
            "required": ["action", "targets"]
        }),
    }
}

fn replace_tool_spec() -> ToolSpec {
    ToolSpec {
        name: REPLACE_TOOL_NAME.to_string(),
        description: "Edit a bounded span of your own earlier text in place, replacing \
            everything between a unique start and end marker."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "operations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "start": {"type": "string"},
                            "end": {"type": "string"},
                            "replacement": {"type": "string"}
                        },
                        "required": ["start", "end", "replacement"]
                    }
                }
            },
            "required": ["operations"]
        }),
    }
}

/// **tool-registration hook** (§4.J): registers `context` and `replace`
/// when the engine is enabled.
pub fn tool_registration(config: &EngineConfig) -> Vec<ToolSpec> {
    if !config.enabled {
        return Vec::new();
    }
    vec![context_tool_spec(), replace_tool_spec()]
}

async fn run_sync_and_strategies(
    store: &SessionStore,
    host: &dyn Host,
    config: &EngineConfig,
    session_id: &SessionId,
    tc: &mut TokenCounter,
    run_strategies: bool,
) -> Result<Option<NotePrompt>, HookError> {
    let handle = store.get_or_create(session_id).await;
    let mut messages = fetch(host, session_id).await?;
    let mut state = handle.lock().await;

    let before = state.stats;
    tracing::debug!(session_id = %session_id, "sync: recomputing tool cache and hash registry");
    sync(&mut state, config, &messages, tc);

    if run_strategies && !state.last_tool_prune {
        run_all(&mut state, config, &mut messages, tc);
    }

    let note = format_auto_notification(config.prune_notification, &before, &state.stats);
    let reminder_note = stuck_task_reminder_note(&mut state, config);

    Ok(match (note, reminder_note) {
        (Some(mut n), Some(r)) => {
            n.text = format!("{}\n{}", n.text, r.text);
            Some(n)
        }
        (Some(n), None) => Some(n),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    })
}

/// Emits a reminder note for todo items that have sat `in_progress` past
/// `todo_reminder.stuck_task_turns`, at most once per turn per pass (§4.D,
/// §8 scenario 7).
fn stuck_task_reminder_note(
    state: &mut crate::state::SessionState,
    config: &EngineConfig,
) -> Option<NotePrompt> {
    if !config.todo_reminder.enabled || config.prune_notification == crate::config::NotificationMode::Off {
        return None;
    }
    if state.cursors.todo.last_reminder_turn == Some(state.current_turn) {
        return None;
    }

    let reminders = stuck_task_reminders(state, state.current_turn, config.todo_reminder.stuck_task_turns);
    if reminders.is_empty() {
        return None;
    }

    state.cursors.todo.last_reminder_turn = Some(state.current_turn);
    Some(NotePrompt::ignored_note(format!("stuck task reminder: {}", reminders.join("; "))))
}

async fn fetch(host: &dyn Host, session_id: &SessionId) -> Result<Vec<crate::model::Message>, HookError> {
    host.messages(session_id).await.map_err(|HostFetchError::Fetch(msg)| {
        tracing::error!(session_id = %session_id, error = %msg, "failed to fetch messages from host");
        HookError::HostFetch(msg)
    })
}

/// **after-tool hook** (§4.J): runs on every tool completion. Always
/// resyncs the hash registry and tool cache; only runs the E automatic
/// strategies when `auto_prune_after_tool` is set (default `false`, per
/// §6) — otherwise pruning waits for `after_turn`.
pub async fn after_tool(
    store: &SessionStore,
    host: &dyn Host,
    config: &EngineConfig,
    session_id: &SessionId,
    tc: &mut TokenCounter,
) -> Result<(), HookError> {
    if !config.enabled {
        return Ok(());
    }
    if let Some(note) =
        run_sync_and_strategies(store, host, config, session_id, tc, config.auto_prune_after_tool).await?
    {
        if let Err(err) = host.prompt(session_id, note).await {
            tracing::warn!(session_id = %session_id, error = %err, "auto-prune notification delivery failed");
        }
    }
    Ok(())
}

/// **after-turn hook** (§4.J): same as `after-tool` plus opportunistic
/// persistence.
pub async fn after_turn(
    store: &SessionStore,
    host: &dyn Host,
    config: &EngineConfig,
    session_id: &SessionId,
    tc: &mut TokenCounter,
) -> Result<(), HookError> {
    if !config.enabled {
        return Ok(());
    }
    if let Some(note) = run_sync_and_strategies(store, host, config, session_id, tc, true).await? {
        if let Err(err) = host.prompt(session_id, note).await {
            tracing::warn!(session_id = %session_id, error = %err, "auto-prune notification delivery failed");
        }
    }
    store.save(session_id).await;
    tracing::debug!(session_id = %session_id, "after-turn: state persisted");
    Ok(())
}

/// **session-end hook** (§4.J): flush then evict.
pub async fn session_end(store: &SessionStore, session_id: &SessionId) {
    tracing::debug!(session_id = %session_id, "session-end: flushing and evicting session state");
    store.evict(session_id).await;
}

fn parse_action(raw: &str) -> Result<Action, ManualOpError> {
    match raw {
        "discard" => Ok(Action::Discard),
        "distill" => Ok(Action::Distill),
        "restore" => Ok(Action::Restore),
        other => Err(ManualOpError::InvalidHashFormat(other.to_string())),
    }
}

fn parse_targets(raw: &Value) -> Result<Vec<(String, Option<String>)>, ManualOpError> {
    let array = raw.as_array().ok_or_else(|| ManualOpError::EmptyTargets)?;
    let mut out = Vec::with_capacity(array.len());
    for item in array {
        let tuple = item.as_array().ok_or_else(|| ManualOpError::EmptyTargets)?;
        match tuple.len() {
            1 => {
                let target = tuple[0].as_str().unwrap_or_default().to_string();
                out.push((target, None));
            }
            2 => {
                let target = tuple[0].as_str().unwrap_or_default().to_string();
                let summary = tuple[1].as_str().unwrap_or_default().to_string();
                out.push((target, Some(summary)));
            }
            _ => return Err(ManualOpError::EmptyTargets),
        }
    }
    Ok(out)
}

/// Dispatches a `context(action, targets)` call (§4.F, §6) for a host
/// adapter's `context` tool. Fetches nothing from the host: the hash
/// registry is already populated by the preceding `after-tool`/`after-turn`
/// sync pass.
pub async fn call_context_tool(
    store: &SessionStore,
    host: &dyn Host,
    config: &EngineConfig,
    session_id: &SessionId,
    args: Value,
    tc: &mut TokenCounter,
) -> Result<NotePrompt, HookError> {
    let action_raw = args.get("action").and_then(Value::as_str).unwrap_or_default();
    let action = parse_action(action_raw)?;
    let targets = parse_targets(args.get("targets").unwrap_or(&Value::Null))?;

    let handle = store.get_or_create(session_id).await;
    let mut state = handle.lock().await;
    let outcome = context_op(&mut state, config, action, targets, tc)?;
    tracing::debug!(
        session_id = %session_id,
        applied = outcome.applied.len(),
        tokens_saved = outcome.tokens_saved,
        "context: manual operation applied"
    );

    let note = format_manual_notification(config.prune_notification, action_raw, &outcome)
        .unwrap_or_else(|| NotePrompt::ignored_note(String::new()));
    drop(state);
    if let Err(err) = host.prompt(session_id, note.clone()).await {
        tracing::warn!(session_id = %session_id, error = %err, "context notification delivery failed");
    }
    Ok(note)
}

fn parse_operations(raw: &Value) -> Vec<ReplaceOp> {
    raw.as_array()
        .map(|ops| {
            ops.iter()
                .map(|op| ReplaceOp {
                    start: op.get("start").and_then(Value::as_str).unwrap_or_default().to_string(),
                    end: op.get("end").and_then(Value::as_str).unwrap_or_default().to_string(),
                    replacement: op.get("replacement").and_then(Value::as_str).unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Dispatches a `replace(operations)` call (§4.G, §6) for a host adapter's
/// `replace` tool.
pub async fn call_replace_tool(
    store: &SessionStore,
    host: &dyn Host,
    config: &EngineConfig,
    session_id: &SessionId,
    args: Value,
    tc: &mut TokenCounter,
) -> Result<NotePrompt, HookError> {
    let _ = tc;
    let operations = parse_operations(args.get("operations").unwrap_or(&Value::Null));

    let handle = store.get_or_create(session_id).await;
    let mut state = handle.lock().await;
    let messages = fetch(host, session_id).await?;
    let entries = apply_replace_batch(&mut state, &messages, &operations)?;
    tracing::debug!(session_id = %session_id, entries = entries.len(), "replace: batch applied");

    let note = NotePrompt::ignored_note(format!("replace: {} region(s) updated", entries.len()));
    drop(state);
    if let Err(err) = host.prompt(session_id, note.clone()).await {
        tracing::warn!(session_id = %session_id, error = %err, "replace notification delivery failed");
    }
    Ok(note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn tool_registration_lists_both_tools_when_enabled() {
        let config = EngineConfig::default();
        let specs = tool_registration(&config);
        assert_eq!(specs.len(), 2);
        assert!(specs.iter().any(|s| s.name == CONTEXT_TOOL_NAME));
        assert!(specs.iter().any(|s| s.name == REPLACE_TOOL_NAME));
    }

    #[test]
    fn tool_registration_is_empty_when_disabled() {
        let mut config = EngineConfig::default();
        config.enabled = false;
        assert!(tool_registration(&config).is_empty());
    }

    #[test]
    fn parse_targets_accepts_single_and_pair_tuples() {
        let raw = serde_json::json!([["abc123"], ["def456", "a summary"]]);
        let targets = parse_targets(&raw).unwrap();
        assert_eq!(targets[0], ("abc123".to_string(), None));
        assert_eq!(targets[1], ("def456".to_string(), Some("a summary".to_string())));
    }

    #[test]
    fn parse_action_rejects_unknown_verbs() {
        assert!(parse_action("erase").is_err());
    }

    struct MockHost {
        messages: Vec<crate::model::Message>,
    }

    #[async_trait::async_trait]
    impl Host for MockHost {
        async fn messages(&self, _session_id: &SessionId) -> Result<Vec<crate::model::Message>, HostFetchError> {
            Ok(self.messages.clone())
        }

        async fn prompt(&self, _session_id: &SessionId, _body: NotePrompt) -> Result<(), crate::host::HostPromptError> {
            Ok(())
        }
    }

    fn duplicate_bash_calls() -> Vec<crate::model::Message> {
        use crate::model::{Message, Part, Role, ToolState};
        use serde_json::json;

        vec![Message::new(
            "m1",
            Role::Assistant,
            vec![
                Part::StepStart,
                Part::Tool {
                    call_id: "call-1".to_string(),
                    tool: "bash".to_string(),
                    input: json!({"command": "echo hi"}),
                    state: ToolState::completed("hi"),
                },
                Part::StepStart,
                Part::Tool {
                    call_id: "call-2".to_string(),
                    tool: "bash".to_string(),
                    input: json!({"command": "echo hi"}),
                    state: ToolState::completed("hi"),
                },
            ],
        )]
    }

    #[tokio::test]
    async fn after_tool_skips_auto_strategies_unless_configured() {
        let host = MockHost { messages: duplicate_bash_calls() };
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let mut config = EngineConfig::default();
        config.strategies.deduplication.enabled = true;
        let mut tc = TokenCounter::default();
        let session_id = "s1".to_string();

        assert!(!config.auto_prune_after_tool);
        after_tool(&store, &host, &config, &session_id, &mut tc).await.unwrap();
        let handle = store.get_or_create(&session_id).await;
        assert_eq!(
            handle.lock().await.stats.deduplication.count,
            0,
            "after-tool must not auto-prune when auto_prune_after_tool is false"
        );
        drop(handle);

        config.auto_prune_after_tool = true;
        after_tool(&store, &host, &config, &session_id, &mut tc).await.unwrap();
        let handle = store.get_or_create(&session_id).await;
        assert_eq!(
            handle.lock().await.stats.deduplication.count,
            1,
            "after-tool runs auto-strategies once auto_prune_after_tool is enabled"
        );
    }

    #[tokio::test]
    async fn after_turn_always_runs_auto_strategies() {
        let host = MockHost { messages: duplicate_bash_calls() };
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let mut config = EngineConfig::default();
        config.strategies.deduplication.enabled = true;
        let mut tc = TokenCounter::default();
        let session_id = "s1".to_string();

        assert!(!config.auto_prune_after_tool);
        after_turn(&store, &host, &config, &session_id, &mut tc).await.unwrap();
        let handle = store.get_or_create(&session_id).await;
        assert_eq!(handle.lock().await.stats.deduplication.count, 1);
    }

    #[test]
    fn stuck_task_reminder_fires_once_per_turn() {
        use crate::state::{SessionState, TodoItem, TodoStatus};

        let mut state = SessionState::default();
        state.current_turn = 17;
        state.todos.push(TodoItem {
            id: "T1".to_string(),
            content: "do the thing".to_string(),
            status: TodoStatus::InProgress,
            priority: None,
            in_progress_since: Some(5),
        });

        let config = EngineConfig::default();
        let note = stuck_task_reminder_note(&mut state, &config).expect("reminder emitted");
        assert!(note.text.contains("12 turns"));
        assert_eq!(state.cursors.todo.last_reminder_turn, Some(17));

        assert!(stuck_task_reminder_note(&mut state, &config).is_none());
    }
}
