//! §3 Session state and §4.C the session state store.

pub mod persist;
pub mod store;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::hash::HashRegistry;
use crate::model::{CallId, PartId, ToolStatus};
use crate::tagged::{TaggedMap, TaggedSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    pub priority: Option<String>,
    #[serde(default)]
    pub in_progress_since: Option<i64>,
}

/// A single entry of `toolParameters` (§3): everything the synchronizer
/// recorded about a call id, regardless of whether it ended up pruned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParamEntry {
    pub tool: String,
    pub parameters: serde_json::Value,
    pub status: Option<ToolStatus>,
    pub error: Option<String>,
    pub turn: i64,
}

/// FIFO-bounded `callId -> ToolParamEntry` cache (§3, invariant 5).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ToolParameterCache {
    entries: TaggedMap<CallId, ToolParamEntry>,
    order: VecDeque<CallId>,
}

impl ToolParameterCache {
    pub fn get(&self, call_id: &CallId) -> Option<&ToolParamEntry> {
        self.entries.get(call_id)
    }

    pub fn contains(&self, call_id: &CallId) -> bool {
        self.entries.contains_key(call_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CallId, &ToolParamEntry)> {
        self.entries.iter()
    }

    /// Iterates in insertion (chronological) order — the automatic
    /// strategies need a stable "most recent wins" tie-break that plain
    /// `HashMap` iteration cannot provide.
    pub fn iter_in_order(&self) -> impl Iterator<Item = (&CallId, &ToolParamEntry)> {
        self.order.iter().filter_map(move |id| self.entries.get(id).map(|e| (id, e)))
    }

    /// Insert or update; new insertions go to the back of the FIFO order.
    pub fn insert(&mut self, call_id: CallId, entry: ToolParamEntry) {
        if !self.entries.contains_key(&call_id) {
            self.order.push_back(call_id.clone());
        }
        self.entries.insert(call_id, entry);
    }

    /// Trim to `max_size`, evicting oldest-insertion entries. Returns the
    /// evicted call ids so callers can also drop their hash-registry entries.
    pub fn trim(&mut self, max_size: usize) -> Vec<CallId> {
        let mut evicted = Vec::new();
        while self.entries.len() > max_size {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }
}

/// A region of an assistant text part rewritten by `replace` (§4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementEntry {
    pub message_id: String,
    pub part_index: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub replacement: String,
    pub original_length: usize,
}

impl ReplacementEntry {
    pub fn part_id(&self) -> PartId {
        PartId::new(self.message_id.clone(), self.part_index)
    }
}

/// The prune plan (§3 `prune`): append-only lists of hidden/distilled items
/// plus pattern-replace entries.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PrunePlan {
    pub tool_ids: Vec<CallId>,
    pub message_part_ids: Vec<PartId>,
    pub reasoning_part_ids: Vec<PartId>,
    pub replacements: Vec<ReplacementEntry>,
}

impl PrunePlan {
    pub fn add_tool(&mut self, call_id: CallId) -> bool {
        if self.tool_ids.contains(&call_id) {
            return false;
        }
        self.tool_ids.push(call_id);
        true
    }

    pub fn remove_tool(&mut self, call_id: &CallId) -> bool {
        let before = self.tool_ids.len();
        self.tool_ids.retain(|id| id != call_id);
        self.tool_ids.len() != before
    }

    pub fn add_message(&mut self, part_id: PartId) -> bool {
        if self.message_part_ids.contains(&part_id) {
            return false;
        }
        self.message_part_ids.push(part_id);
        true
    }

    pub fn remove_message(&mut self, part_id: &PartId) -> bool {
        let before = self.message_part_ids.len();
        self.message_part_ids.retain(|id| id != part_id);
        self.message_part_ids.len() != before
    }

    pub fn add_reasoning(&mut self, part_id: PartId) -> bool {
        if self.reasoning_part_ids.contains(&part_id) {
            return false;
        }
        self.reasoning_part_ids.push(part_id);
        true
    }

    pub fn remove_reasoning(&mut self, part_id: &PartId) -> bool {
        let before = self.reasoning_part_ids.len();
        self.reasoning_part_ids.retain(|id| id != part_id);
        self.reasoning_part_ids.len() != before
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TodoCursor {
    /// Last completed `todowrite` call whose output was diffed into `todos`.
    pub last_write_call_id: Option<CallId>,
    /// Last completed `todowrite`/`todoread` call of any kind, used by the
    /// Todo auto-supersede rule (distinct from `last_write_call_id`, which
    /// only tracks calls that actually changed the todo list).
    pub last_call_id: Option<CallId>,
    pub last_reminder_turn: Option<i64>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SnapshotsCursor {
    pub all_call_ids: TaggedSet<CallId>,
    pub latest_call_id: Option<CallId>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RetriesCursor {
    /// Keyed by `"<tool>\u{1}<hash>"` (tuple keys do not round-trip as JSON
    /// object keys, so the pair is flattened into a single string).
    pending: TaggedMap<String, Vec<CallId>>,
}

fn retry_key(tool: &str, hash: &str) -> String {
    format!("{tool}\u{1}{hash}")
}

impl RetriesCursor {
    pub fn push_failure(&mut self, tool: &str, hash: &str, call_id: CallId) {
        self.pending
            .entry(retry_key(tool, hash))
            .or_default()
            .push(call_id);
    }

    pub fn take_failures(&mut self, tool: &str, hash: &str) -> Vec<CallId> {
        self.pending.remove(&retry_key(tool, hash)).unwrap_or_default()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Cursors {
    pub todo: TodoCursor,
    pub files: TaggedMap<String, TaggedSet<CallId>>,
    pub urls: TaggedMap<String, TaggedSet<CallId>>,
    pub state_queries: TaggedMap<String, TaggedSet<CallId>>,
    pub snapshots: SnapshotsCursor,
    pub retries: RetriesCursor,
    /// `base tool hash -> most recent call id`, an implementation-internal
    /// index backing the Hash auto-supersede rule (not itself one of the
    /// named cursors in §3, which documents the cursors that matter to
    /// callers rather than every bookkeeping structure).
    pub content_index: TaggedMap<String, CallId>,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct CounterStat {
    pub count: u64,
    pub tokens_saved: u64,
}

impl CounterStat {
    pub fn record(&mut self, tokens_saved: u64) {
        self.count += 1;
        self.tokens_saved += tokens_saved;
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct AutoSupersedeStats {
    pub hash: CounterStat,
    pub file: CounterStat,
    pub todo: CounterStat,
    pub url: CounterStat,
    pub state_query: CounterStat,
    pub snapshot: CounterStat,
    pub retry: CounterStat,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct ManualDiscardStats {
    pub tool: CounterStat,
    pub message: CounterStat,
    pub thinking: CounterStat,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct Stats {
    pub auto_supersede: AutoSupersedeStats,
    pub manual_discard: ManualDiscardStats,
    pub distillation: CounterStat,
    pub deduplication: CounterStat,
    pub purge_errors: CounterStat,
    pub truncation: CounterStat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscardHistoryEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub hashes: Vec<String>,
    pub tokens_saved: u64,
    pub reason: String,
}

/// Transient, never-persisted membership-check cache over the prune plan
/// (§4.C). Marked stale whenever a prune array mutates; rebuilt lazily.
#[derive(Debug, Default)]
pub struct RuntimeCache {
    stale: bool,
    tool_ids: std::collections::HashSet<CallId>,
    message_part_ids: std::collections::HashSet<PartId>,
    reasoning_part_ids: std::collections::HashSet<PartId>,
}

impl RuntimeCache {
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    fn rebuild(&mut self, plan: &PrunePlan) {
        self.tool_ids = plan.tool_ids.iter().cloned().collect();
        self.message_part_ids = plan.message_part_ids.iter().cloned().collect();
        self.reasoning_part_ids = plan.reasoning_part_ids.iter().cloned().collect();
        self.stale = false;
    }

    pub fn contains_tool(&mut self, plan: &PrunePlan, call_id: &CallId) -> bool {
        if self.stale {
            self.rebuild(plan);
        }
        self.tool_ids.contains(call_id)
    }

    pub fn contains_message(&mut self, plan: &PrunePlan, part_id: &PartId) -> bool {
        if self.stale {
            self.rebuild(plan);
        }
        self.message_part_ids.contains(part_id)
    }

    pub fn contains_reasoning(&mut self, plan: &PrunePlan, part_id: &PartId) -> bool {
        if self.stale {
            self.rebuild(plan);
        }
        self.reasoning_part_ids.contains(part_id)
    }
}

/// The full per-session state (§3).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub current_turn: i64,
    pub hash_registry: HashRegistry,
    pub tool_parameters: ToolParameterCache,
    pub prune: PrunePlan,
    pub cursors: Cursors,
    pub todos: Vec<TodoItem>,
    pub stats: Stats,
    pub discard_history: Vec<DiscardHistoryEntry>,
    pub last_compaction: Option<chrono::DateTime<chrono::Utc>>,
    pub last_tool_prune: bool,

    /// Call ids that are in `prune.tool_ids` via the purge-errors strategy
    /// specifically: these still render their error message in the view
    /// (only the input is elided), unlike an ordinary pruned tool call.
    #[serde(default)]
    pub purged_error_inputs: TaggedSet<CallId>,

    /// Distill summaries supplied by the model (§4.F), keyed by call id for
    /// tool targets or by `"<msgId>:<partIndex>"` for message targets. The
    /// view assembler renders this text in place of the original content
    /// for any part id present in `prune` instead of a bare placeholder.
    #[serde(default)]
    pub distill_summaries: TaggedMap<String, String>,

    #[serde(skip)]
    pub runtime_cache: RuntimeCache,
}

impl SessionState {
    pub fn is_tool_pruned(&mut self, call_id: &CallId) -> bool {
        let plan = &self.prune;
        self.runtime_cache.contains_tool(plan, call_id)
    }

    pub fn is_message_pruned(&mut self, part_id: &PartId) -> bool {
        let plan = &self.prune;
        self.runtime_cache.contains_message(plan, part_id)
    }

    pub fn is_reasoning_pruned(&mut self, part_id: &PartId) -> bool {
        let plan = &self.prune;
        self.runtime_cache.contains_reasoning(plan, part_id)
    }

    pub fn prune_tool(&mut self, call_id: CallId) -> bool {
        let added = self.prune.add_tool(call_id);
        if added {
            self.runtime_cache.mark_stale();
        }
        added
    }

    pub fn unprune_tool(&mut self, call_id: &CallId) -> bool {
        let removed = self.prune.remove_tool(call_id);
        if removed {
            self.runtime_cache.mark_stale();
        }
        removed
    }

    pub fn prune_message(&mut self, part_id: PartId) -> bool {
        let added = self.prune.add_message(part_id);
        if added {
            self.runtime_cache.mark_stale();
        }
        added
    }

    pub fn unprune_message(&mut self, part_id: &PartId) -> bool {
        let removed = self.prune.remove_message(part_id);
        if removed {
            self.runtime_cache.mark_stale();
        }
        removed
    }

    pub fn prune_reasoning(&mut self, part_id: PartId) -> bool {
        let added = self.prune.add_reasoning(part_id);
        if added {
            self.runtime_cache.mark_stale();
        }
        added
    }

    pub fn unprune_reasoning(&mut self, part_id: &PartId) -> bool {
        let removed = self.prune.remove_reasoning(part_id);
        if removed {
            self.runtime_cache.mark_stale();
        }
        removed
    }

    pub fn push_discard_history(&mut self, hashes: Vec<String>, tokens_saved: u64, reason: &str) {
        self.discard_history.push(DiscardHistoryEntry {
            timestamp: chrono::Utc::now(),
            hashes,
            tokens_saved,
            reason: reason.to_string(),
        });
    }
}
