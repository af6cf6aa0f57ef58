//! §4.G Pattern replacement: the `replace(operations)` surface lets the
//! model edit assistant-text spans bounded by unique start/end markers
//! without discarding the whole part.

use crate::error::ReplaceError;
use crate::model::{Message, Part, Role};
use crate::state::{ReplacementEntry, SessionState};

pub const MIN_MATCH_LEN: usize = 30;
pub const MIN_MARKER_SPECIFICITY: usize = 15;

#[derive(Debug, Clone)]
pub struct ReplaceOp {
    pub start: String,
    pub end: String,
    pub replacement: String,
}

struct Occurrence {
    message_id: String,
    part_index: usize,
    start_index: usize,
}

fn find_start_occurrences(messages: &[Message], start: &str) -> Vec<Occurrence> {
    let mut out = Vec::new();
    for message in messages {
        if message.role != Role::Assistant {
            continue;
        }
        for (part_index, part) in message.parts.iter().enumerate() {
            let Part::Text { text } = part else {
                continue;
            };
            let mut search_from = 0;
            while let Some(rel) = text[search_from..].find(start) {
                let idx = search_from + rel;
                out.push(Occurrence {
                    message_id: message.id.clone(),
                    part_index,
                    start_index: idx,
                });
                search_from = idx + start.len().max(1);
                if search_from > text.len() {
                    break;
                }
            }
        }
    }
    out
}

fn text_of<'a>(messages: &'a [Message], message_id: &str, part_index: usize) -> Option<&'a str> {
    messages
        .iter()
        .find(|m| m.id == message_id)
        .and_then(|m| m.parts.get(part_index))
        .and_then(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
}

/// Validates one operation in isolation (match uniqueness, length,
/// specificity) without touching state; returns the would-be entry.
fn validate_one(messages: &[Message], op: &ReplaceOp) -> Result<ReplacementEntry, ReplaceError> {
    let occurrences = find_start_occurrences(messages, &op.start);
    if occurrences.len() != 1 {
        return Err(if occurrences.is_empty() {
            ReplaceError::PatternNotFound { start: op.start.clone() }
        } else {
            ReplaceError::PatternAmbiguous {
                start: op.start.clone(),
                count: occurrences.len(),
            }
        });
    }

    let occurrence = &occurrences[0];
    let text = text_of(messages, &occurrence.message_id, occurrence.part_index)
        .ok_or_else(|| ReplaceError::PatternNotFound { start: op.start.clone() })?;

    let after_start = occurrence.start_index + op.start.len();
    let Some(rel_end) = text.get(after_start..).and_then(|rest| rest.find(&op.end)) else {
        return Err(ReplaceError::PatternNotFound { start: op.start.clone() });
    };
    let end_index = after_start + rel_end + op.end.len();

    let match_len = end_index - occurrence.start_index;
    if match_len < MIN_MATCH_LEN {
        return Err(ReplaceError::MatchTooShort { len: match_len });
    }
    if op.start.len() <= MIN_MARKER_SPECIFICITY && op.end.len() <= MIN_MARKER_SPECIFICITY {
        return Err(ReplaceError::MarkersTooShort {
            start_len: op.start.len(),
            end_len: op.end.len(),
        });
    }

    Ok(ReplacementEntry {
        message_id: occurrence.message_id.clone(),
        part_index: occurrence.part_index,
        start_index: occurrence.start_index,
        end_index,
        replacement: op.replacement.clone(),
        original_length: match_len,
    })
}

fn overlaps(a: &ReplacementEntry, b: &ReplacementEntry) -> bool {
    a.message_id == b.message_id
        && a.part_index == b.part_index
        && a.start_index < b.end_index
        && b.start_index < a.end_index
}

/// Validates the whole batch collectively (§4.G) — invalid operations are
/// reported together rather than one at a time — then, on success, appends
/// every resulting entry to `state.prune.replacements`.
pub fn apply_replace_batch(
    state: &mut SessionState,
    messages: &[Message],
    operations: &[ReplaceOp],
) -> Result<Vec<ReplacementEntry>, ReplaceError> {
    let mut candidates = Vec::with_capacity(operations.len());
    let mut errors = Vec::new();

    for op in operations {
        match validate_one(messages, op) {
            Ok(entry) => candidates.push(entry),
            Err(err) => errors.push(err),
        }
    }

    // Overlap check against both the new batch and whatever is already in
    // `prune.replacements` (invariant 9 covers both).
    let existing = &state.prune.replacements;
    for (i, a) in candidates.iter().enumerate() {
        for b in existing {
            if overlaps(a, b) {
                errors.push(ReplaceError::PatternsOverlap {
                    part: format!("{}:{}", a.message_id, a.part_index),
                });
            }
        }
        for b in &candidates[i + 1..] {
            if overlaps(a, b) {
                errors.push(ReplaceError::PatternsOverlap {
                    part: format!("{}:{}", a.message_id, a.part_index),
                });
            }
        }
    }

    if !errors.is_empty() {
        return Err(ReplaceError::Batch(errors));
    }

    state.prune.replacements.extend(candidates.clone());
    Ok(candidates)
}
