//! §4.I Notification formatter: turns a manual-operation or auto-strategy
//! outcome into the single "ignored" note message delivered back to the
//! host UI (§4.J, §6 `session.prompt`).

use crate::config::NotificationMode;
use crate::host::NotePrompt;
use crate::manual::ManualOpOutcome;
use crate::state::Stats;

/// Builds the note for a manual `context`/`replace` call. Returns `None`
/// when notifications are configured `off`.
pub fn format_manual_notification(mode: NotificationMode, verb: &str, outcome: &ManualOpOutcome) -> Option<NotePrompt> {
    if mode == NotificationMode::Off {
        return None;
    }

    if outcome.applied.is_empty() {
        let attempted: Vec<String> = outcome
            .unknown
            .iter()
            .chain(outcome.already_pruned.iter())
            .cloned()
            .collect();
        return Some(NotePrompt::ignored_note(format!(
            "{verb}: nothing changed (attempted: {})",
            attempted.join(", ")
        )));
    }

    let text = match mode {
        NotificationMode::Minimal => format!(
            "{verb}: {} item(s), ~{} tokens saved",
            outcome.applied.len(),
            outcome.tokens_saved
        ),
        NotificationMode::Detailed => {
            let samples: Vec<String> = outcome.applied.iter().map(|t| format!("{} ({})", t.label, t.hash)).collect();
            format!(
                "{verb}: {} item(s), ~{} tokens saved [{}]",
                outcome.applied.len(),
                outcome.tokens_saved,
                samples.join(", ")
            )
        }
        NotificationMode::Off => unreachable!(),
    };
    Some(NotePrompt::ignored_note(text))
}

/// Builds the note summarizing an automatic-strategy pass (sync +
/// deduplicate/purge/truncate), using the delta between two `Stats`
/// snapshots taken before and after the pass.
pub fn format_auto_notification(mode: NotificationMode, before: &Stats, after: &Stats) -> Option<NotePrompt> {
    if mode == NotificationMode::Off {
        return None;
    }

    let mut lines = Vec::new();
    push_delta(&mut lines, "superseded (hash)", before.auto_supersede.hash.count, after.auto_supersede.hash.count);
    push_delta(&mut lines, "superseded (file)", before.auto_supersede.file.count, after.auto_supersede.file.count);
    push_delta(&mut lines, "superseded (todo)", before.auto_supersede.todo.count, after.auto_supersede.todo.count);
    push_delta(&mut lines, "superseded (url)", before.auto_supersede.url.count, after.auto_supersede.url.count);
    push_delta(
        &mut lines,
        "superseded (state query)",
        before.auto_supersede.state_query.count,
        after.auto_supersede.state_query.count,
    );
    push_delta(
        &mut lines,
        "superseded (snapshot)",
        before.auto_supersede.snapshot.count,
        after.auto_supersede.snapshot.count,
    );
    push_delta(&mut lines, "superseded (retry)", before.auto_supersede.retry.count, after.auto_supersede.retry.count);
    push_delta(&mut lines, "deduplicated", before.deduplication.count, after.deduplication.count);
    push_delta(&mut lines, "purged errors", before.purge_errors.count, after.purge_errors.count);
    push_delta(&mut lines, "truncated", before.truncation.count, after.truncation.count);

    if lines.is_empty() {
        return None;
    }

    let tokens_saved = token_delta(before, after);
    let text = match mode {
        NotificationMode::Minimal => format!("auto-pruned: {} (~{} tokens saved)", lines.join(", "), tokens_saved),
        NotificationMode::Detailed => format!("auto-pruned:\n{}\n~{} tokens saved total", lines.join("\n"), tokens_saved),
        NotificationMode::Off => unreachable!(),
    };
    Some(NotePrompt::ignored_note(text))
}

fn push_delta(lines: &mut Vec<String>, label: &str, before: u64, after: u64) {
    if after > before {
        lines.push(format!("{label}: {}", after - before));
    }
}

fn token_delta(before: &Stats, after: &Stats) -> u64 {
    let sum = |s: &Stats| {
        s.auto_supersede.hash.tokens_saved
            + s.auto_supersede.file.tokens_saved
            + s.auto_supersede.todo.tokens_saved
            + s.auto_supersede.url.tokens_saved
            + s.auto_supersede.state_query.tokens_saved
            + s.auto_supersede.snapshot.tokens_saved
            + s.auto_supersede.retry.tokens_saved
            + s.deduplication.tokens_saved
            + s.purge_errors.tokens_saved
            + s.truncation.tokens_saved
    };
    sum(after).saturating_sub(sum(before))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manual::AppliedTarget;

    #[test]
    fn minimal_mode_summarizes_counts_and_tokens() {
        let outcome = ManualOpOutcome {
            applied: vec![AppliedTarget {
                hash: "abc123".to_string(),
                label: "bash".to_string(),
                tokens_saved: 42,
            }],
            already_pruned: vec![],
            unknown: vec![],
            tokens_saved: 42,
        };
        let note = format_manual_notification(NotificationMode::Minimal, "discard", &outcome).unwrap();
        assert!(note.text.contains("1 item(s)"));
        assert!(note.text.contains("42 tokens saved"));
        assert!(note.ignored);
        assert!(note.no_reply);
    }

    #[test]
    fn off_mode_suppresses_the_note() {
        let outcome = ManualOpOutcome::default();
        assert!(format_manual_notification(NotificationMode::Off, "discard", &outcome).is_none());
    }

    #[test]
    fn no_op_still_lists_attempted_identifiers() {
        let outcome = ManualOpOutcome {
            applied: vec![],
            already_pruned: vec![],
            unknown: vec!["deadbe".to_string()],
            tokens_saved: 0,
        };
        let note = format_manual_notification(NotificationMode::Minimal, "discard", &outcome).unwrap();
        assert!(note.text.contains("deadbe"));
    }

    #[test]
    fn auto_notification_reports_only_changed_categories() {
        let before = Stats::default();
        let mut after = Stats::default();
        after.deduplication.record(10);
        let note = format_auto_notification(NotificationMode::Minimal, &before, &after).unwrap();
        assert!(note.text.contains("deduplicated: 1"));
        assert!(note.text.contains("10 tokens saved"));
    }

    #[test]
    fn auto_notification_is_none_when_nothing_changed() {
        let before = Stats::default();
        let after = Stats::default();
        assert!(format_auto_notification(NotificationMode::Minimal, &before, &after).is_none());
    }
}
