//! `ctxprune`: a conversation-context pruning engine for an LLM coding-assistant
//! host — the hash registry, the automatic pruning strategies, the manual
//! discard/distill/restore/replace surface the model drives, and the view
//! assembler that turns a prune plan into what the model actually sees.
//!
//! This crate never links against a concrete chat host or transport; it is
//! driven entirely through the [`host::Host`] trait and the [`hooks`] entry
//! points. A host adapter (see the sibling `ctxprune-host-adapter` binary)
//! wires those hooks to a real session store and a real model-tool registry.

pub mod config;
pub mod error;
pub mod hash;
pub mod hooks;
pub mod host;
pub mod manual;
pub mod model;
pub mod notify;
pub mod replace;
pub mod state;
mod strategies;
mod sync;
mod tagged;
pub mod token;

pub use config::EngineConfig;
pub use error::{HookError, ManualOpError, ReplaceError, StateError};
pub use hash::{HashRegistry, TargetKind};
pub use host::{Host, HostFetchError, HostPromptError, NotePrompt};
pub use manual::{context_op, Action, AppliedTarget, ManualOpOutcome};
pub use model::{CallId, Message, MessageId, Part, PartId, Role, SessionId, ToolState, ToolStatus};
pub use replace::{apply_replace_batch, ReplaceOp};
pub use state::store::SessionStore;
pub use state::SessionState;
pub use strategies::run_all as run_auto_strategies;
pub use sync::{apply_todo_output, stuck_task_reminders, sync};
pub use token::TokenCounter;
pub use view::assemble_view;

mod view;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::model::{Message, Part, Role, ToolState};
    use serde_json::json;

    /// End-to-end smoke test for the data flow described in §2: sync → auto
    /// strategies → manual discard → view assembly, all over one state.
    #[test]
    fn sync_then_manual_discard_then_view_round_trip() {
        let mut state = SessionState::default();
        let config = EngineConfig::default();
        let mut tc = TokenCounter::default();

        let messages = vec![Message::new(
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
            ],
        )];

        sync(&mut state, &config, &messages, &mut tc);
        let hash = state
            .hash_registry
            .call_ids
            .get(&"call-1".to_string())
            .cloned()
            .expect("call-1 registered by sync");

        let outcome = context_op(
            &mut state,
            &config,
            Action::Discard,
            vec![(hash, None)],
            &mut tc,
        )
        .expect("discard succeeds");
        assert_eq!(outcome.applied.len(), 1);

        let view = assemble_view(&state, &config, &messages);
        let Part::Text { text } = &view[0].parts[1] else {
            panic!("expected discarded placeholder in the view");
        };
        assert!(text.contains("discarded: bash"));
    }
}
