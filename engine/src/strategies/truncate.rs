//! §4.E Head/tail truncate: rewrites large tool outputs in place on the
//! message list passed to the current hook invocation. The rewrite is never
//! persisted to `SessionState` — each hook fetches pristine messages from
//! the host, so re-running this strategy always starts from the original
//! text and converges to the same truncated form (idempotence, §8).

use crate::config::{EngineConfig, TruncationConfig};
use crate::model::{Message, Part, Role, ToolStatus};
use crate::state::SessionState;
use crate::token::TokenCounter;

fn build_truncated(output: &str, cfg: &TruncationConfig, tc: &mut TokenCounter) -> Option<String> {
    let head_budget = (cfg.max_tokens as f64 * cfg.head_ratio).floor() as usize;
    let tail_budget = (cfg.max_tokens as f64 * cfg.tail_ratio).floor() as usize;

    let lines: Vec<&str> = output.split('\n').collect();
    let total_lines = lines.len();

    let mut head_end = 0usize;
    let mut tokens = 0usize;
    for (i, line) in lines.iter().enumerate() {
        let t = tc.count(line);
        if head_end > 0 && tokens + t > head_budget {
            break;
        }
        tokens += t;
        head_end = i + 1;
        if tokens >= head_budget {
            break;
        }
    }

    let mut tail_start = total_lines;
    let mut tokens = 0usize;
    for i in (0..total_lines).rev() {
        let t = tc.count(lines[i]);
        if tail_start < total_lines && tokens + t > tail_budget {
            break;
        }
        tokens += t;
        tail_start = i;
        if tokens >= tail_budget {
            break;
        }
    }

    if head_end >= tail_start {
        return None;
    }

    let truncated_lines = tail_start - head_end;
    let marker = format!("\n\n[... {truncated_lines} lines truncated to save context ...]\n\n");
    let head_text = lines[..head_end].join("\n");
    let tail_text = lines[tail_start..].join("\n");
    Some(format!("{head_text}{marker}{tail_text}"))
}

pub fn truncate_outputs(state: &mut SessionState, config: &EngineConfig, messages: &mut [Message], tc: &mut TokenCounter) {
    let cfg = &config.strategies.truncation;
    if !cfg.enabled {
        return;
    }
    let current_turn = state.current_turn;

    for message in messages.iter_mut() {
        if message.role != Role::Assistant {
            continue;
        }
        for part in &mut message.parts {
            let Part::Tool { call_id, tool, state: tool_state, .. } = part else {
                continue;
            };
            if !tool_state.is_completed() {
                continue;
            }
            if !cfg.target_tools.iter().any(|t| t == tool) {
                continue;
            }
            if state.prune.tool_ids.contains(call_id) {
                continue;
            }
            let Some(entry) = state.tool_parameters.get(call_id) else {
                continue;
            };
            if current_turn - entry.turn < cfg.min_turns_old as i64 {
                continue;
            }
            let Some(output) = tool_state.output.clone() else {
                continue;
            };
            let total_tokens = tc.count(&output);
            if total_tokens <= cfg.max_tokens {
                continue;
            }
            if let Some(truncated) = build_truncated(&output, cfg, tc) {
                let saved = total_tokens.saturating_sub(tc.count(&truncated));
                tool_state.output = Some(truncated);
                state.stats.truncation.record(saved as u64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, Part, Role, ToolState};
    use crate::state::ToolParamEntry;
    use serde_json::json;

    fn big_output(lines: usize) -> String {
        (0..lines).map(|i| format!("line {i} of output padding text")).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn truncates_large_output_and_records_savings() {
        let mut state = SessionState::default();
        state.current_turn = 10;
        state.tool_parameters.insert(
            "r1".to_string(),
            ToolParamEntry {
                tool: "read".to_string(),
                parameters: json!({"filePath": "/f"}),
                status: Some(ToolStatus::Completed),
                error: None,
                turn: 1,
            },
        );

        let mut cfg = EngineConfig::default();
        cfg.strategies.truncation.enabled = true;
        cfg.strategies.truncation.max_tokens = 50;
        let mut tc = TokenCounter::default();

        let output = big_output(200);
        let mut messages = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![Part::Tool {
                call_id: "r1".to_string(),
                tool: "read".to_string(),
                input: json!({"filePath": "/f"}),
                state: ToolState::completed(output.clone()),
            }],
        )];

        truncate_outputs(&mut state, &cfg, &mut messages, &mut tc);

        let Part::Tool { state: tool_state, .. } = &messages[0].parts[0] else {
            panic!("expected tool part");
        };
        let new_output = tool_state.output.as_ref().unwrap();
        assert!(new_output.len() < output.len());
        assert!(new_output.contains("lines truncated to save context"));
        assert_eq!(state.stats.truncation.count, 1);
    }

    #[test]
    fn small_output_is_left_untouched() {
        let mut state = SessionState::default();
        state.current_turn = 10;
        state.tool_parameters.insert(
            "r1".to_string(),
            ToolParamEntry {
                tool: "read".to_string(),
                parameters: json!({"filePath": "/f"}),
                status: Some(ToolStatus::Completed),
                error: None,
                turn: 1,
            },
        );

        let mut cfg = EngineConfig::default();
        cfg.strategies.truncation.enabled = true;
        let mut tc = TokenCounter::default();

        let output = "short output".to_string();
        let mut messages = vec![Message::new(
            "m1",
            Role::Assistant,
            vec![Part::Tool {
                call_id: "r1".to_string(),
                tool: "read".to_string(),
                input: json!({"filePath": "/f"}),
                state: ToolState::completed(output.clone()),
            }],
        )];

        truncate_outputs(&mut state, &cfg, &mut messages, &mut tc);

        let Part::Tool { state: tool_state, .. } = &messages[0].parts[0] else {
            panic!("expected tool part");
        };
        assert_eq!(tool_state.output.as_deref(), Some(output.as_str()));
    }
}
