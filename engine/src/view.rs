//! §4.H View assembler: turns the raw message list plus the current prune
//! plan into what the model actually sees.

use crate::config::EngineConfig;
use crate::model::{Message, Part, PartId, Role};
use crate::state::{ReplacementEntry, SessionState};

fn apply_replacements(replacements: &[ReplacementEntry], part_id: &PartId, text: &str) -> String {
    let mut matching: Vec<&ReplacementEntry> = replacements
        .iter()
        .filter(|r| r.message_id == part_id.message_id && r.part_index == part_id.part_index)
        .collect();
    if matching.is_empty() {
        return text.to_string();
    }
    // Descending start index so earlier offsets stay valid as later ones apply.
    matching.sort_by(|a, b| b.start_index.cmp(&a.start_index));

    let mut out = text.to_string();
    for entry in matching {
        if entry.start_index <= entry.end_index && entry.end_index <= out.len() {
            out.replace_range(entry.start_index..entry.end_index, &entry.replacement);
        }
    }
    out
}

/// Given state + the raw (already auto-strategy-mutated) message list,
/// produces the pruned/distilled/replaced sequence delivered to the model.
pub fn assemble_view(state: &SessionState, config: &EngineConfig, messages: &[Message]) -> Vec<Message> {
    let fully_forget = config.tools.discard.fully_forget;

    messages
        .iter()
        .map(|message| {
            let mut parts = Vec::with_capacity(message.parts.len());
            for (part_index, part) in message.parts.iter().enumerate() {
                match part {
                    Part::Tool { call_id, tool, input, state: tool_state } => {
                        // Purge-errors strips only the input and keeps the error
                        // message visible (§4.E); checked ahead of the full-discard
                        // branch below since a purge-errored call id also lives in
                        // `prune.toolIds` (it is still "pruned" for bulk/restore
                        // purposes) but must not render as a full placeholder.
                        if state.purged_error_inputs.contains(call_id) {
                            parts.push(Part::Tool {
                                call_id: call_id.clone(),
                                tool: tool.clone(),
                                input: serde_json::Value::Null,
                                state: tool_state.clone(),
                            });
                            continue;
                        }
                        if state.prune.tool_ids.contains(call_id) {
                            if fully_forget {
                                continue;
                            }
                            let hash = state.hash_registry.call_ids.get(call_id).cloned().unwrap_or_default();
                            if let Some(summary) = state.distill_summaries.get(call_id) {
                                parts.push(Part::Text { text: summary.clone() });
                            } else {
                                parts.push(Part::Text {
                                    text: format!("[discarded: {tool}, hash={hash}]"),
                                });
                            }
                            continue;
                        }
                        let _ = input;
                        parts.push(part.clone());
                    }
                    Part::Text { text } => {
                        if message.role == Role::Assistant {
                            let part_id = PartId::new(message.id.clone(), part_index);
                            if state.prune.message_part_ids.contains(&part_id) {
                                if fully_forget {
                                    continue;
                                }
                                let hash = state.hash_registry.message_part_ids.get(&part_id).cloned().unwrap_or_default();
                                if let Some(summary) = state.distill_summaries.get(&part_id.to_string()) {
                                    parts.push(Part::Text { text: summary.clone() });
                                } else {
                                    parts.push(Part::Text {
                                        text: format!("[discarded: message part, hash={hash}]"),
                                    });
                                }
                                continue;
                            }
                            let replaced = apply_replacements(&state.prune.replacements, &part_id, text);
                            parts.push(Part::Text { text: replaced });
                        } else {
                            parts.push(part.clone());
                        }
                    }
                    Part::Reasoning { .. } => {
                        let part_id = PartId::new(message.id.clone(), part_index);
                        if state.prune.reasoning_part_ids.contains(&part_id) {
                            continue;
                        }
                        parts.push(part.clone());
                    }
                    other => parts.push(other.clone()),
                }
            }
            Message {
                id: message.id.clone(),
                role: message.role,
                parts,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolState;
    use crate::state::ReplacementEntry;

    #[test]
    fn pruned_tool_renders_as_placeholder_by_default() {
        let mut state = SessionState::default();
        state.hash_registry.register_call(&"abc123".to_string(), &"call-1".to_string());
        state.prune_tool("call-1".to_string());
        let config = EngineConfig::default();

        let messages = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![Part::Tool {
                call_id: "call-1".to_string(),
                tool: "bash".to_string(),
                input: serde_json::json!({}),
                state: ToolState::completed("output"),
            }],
        )];

        let view = assemble_view(&state, &config, &messages);
        let Part::Text { text } = &view[0].parts[0] else {
            panic!("expected placeholder text part");
        };
        assert!(text.contains("discarded: bash"));
    }

    #[test]
    fn distilled_tool_renders_summary_instead_of_placeholder() {
        let mut state = SessionState::default();
        state.hash_registry.register_call(&"abc123".to_string(), &"call-1".to_string());
        state.prune_tool("call-1".to_string());
        state.distill_summaries.insert("call-1".to_string(), "a short summary".to_string());
        let config = EngineConfig::default();

        let messages = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![Part::Tool {
                call_id: "call-1".to_string(),
                tool: "bash".to_string(),
                input: serde_json::json!({}),
                state: ToolState::completed("output"),
            }],
        )];

        let view = assemble_view(&state, &config, &messages);
        let Part::Text { text } = &view[0].parts[0] else {
            panic!("expected summary text part");
        };
        assert_eq!(text, "a short summary");
    }

    #[test]
    fn fully_forget_omits_the_part_entirely() {
        let mut state = SessionState::default();
        state.hash_registry.register_call(&"abc123".to_string(), &"call-1".to_string());
        state.prune_tool("call-1".to_string());
        let mut config = EngineConfig::default();
        config.tools.discard.fully_forget = true;

        let messages = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![Part::Tool {
                call_id: "call-1".to_string(),
                tool: "bash".to_string(),
                input: serde_json::json!({}),
                state: ToolState::completed("output"),
            }],
        )];

        let view = assemble_view(&state, &config, &messages);
        assert!(view[0].parts.is_empty());
    }

    #[test]
    fn purge_errored_tool_keeps_error_visible_with_input_stripped() {
        let mut state = SessionState::default();
        state.hash_registry.register_call(&"abc123".to_string(), &"call-1".to_string());
        state.prune_tool("call-1".to_string());
        state.purged_error_inputs.insert("call-1".to_string());
        let config = EngineConfig::default();

        let messages = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![Part::Tool {
                call_id: "call-1".to_string(),
                tool: "bash".to_string(),
                input: serde_json::json!({"command": "exit 1"}),
                state: ToolState::errored("boom"),
            }],
        )];

        let view = assemble_view(&state, &config, &messages);
        let Part::Tool { input, state: tool_state, .. } = &view[0].parts[0] else {
            panic!("expected tool part with stripped input, not a discard placeholder");
        };
        assert!(input.is_null());
        assert_eq!(tool_state.error.as_deref(), Some("boom"));
    }

    #[test]
    fn reasoning_is_omitted_entirely_never_distilled() {
        let mut state = SessionState::default();
        let part_id = PartId::new("m1", 0);
        state.prune_reasoning(part_id);
        let config = EngineConfig::default();

        let messages = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![Part::Reasoning { text: "secret thoughts".to_string() }],
        )];

        let view = assemble_view(&state, &config, &messages);
        assert!(view[0].parts.is_empty());
    }

    #[test]
    fn replacement_entries_apply_in_descending_order() {
        let mut state = SessionState::default();
        state.prune.replacements.push(ReplacementEntry {
            message_id: "m1".to_string(),
            part_index: 0,
            start_index: 0,
            end_index: 5,
            replacement: "AAA".to_string(),
            original_length: 5,
        });
        state.prune.replacements.push(ReplacementEntry {
            message_id: "m1".to_string(),
            part_index: 0,
            start_index: 10,
            end_index: 15,
            replacement: "BBB".to_string(),
            original_length: 5,
        });
        let config = EngineConfig::default();

        let messages = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![Part::Text { text: "01234-----56789END!!".to_string() }],
        )];

        let view = assemble_view(&state, &config, &messages);
        let Part::Text { text } = &view[0].parts[0] else {
            panic!("expected text part");
        };
        assert_eq!(text, "AAA-----BBBEND!!");
    }
}
