//! §4.B Hashing: tool-call content hashes, message/reasoning short ids,
//! collision resolution and target-type detection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::model::{CallId, PartId};
use crate::tagged::TaggedMap;

/// `canonical(input)`: sort object keys at every depth, drop `null` values.
pub fn canonicalize(input: &Value) -> Value {
    match input {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = Default::default();
            for (k, v) in map {
                if v.is_null() {
                    continue;
                }
                sorted.insert(k.clone(), canonicalize(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn sha6(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex = hex_encode(&digest);
    hex[..6].to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// `toolHash(toolName, input) -> 6-hex`.
pub fn tool_hash(tool_name: &str, input: &Value) -> String {
    let canonical = canonicalize(input);
    let payload = format!("{}{}", tool_name, canonical);
    sha6(&payload)
}

pub fn is_valid_hash_format(candidate: &str) -> bool {
    candidate.len() == 6 && candidate.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    ToolHash,
    MessageHash,
    ReasoningHash,
    UnknownHash,
}

/// Bidirectional hash ↔ call/part-id maps (§3 `hashRegistry`, invariant 3).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct HashRegistry {
    pub calls: TaggedMap<String, CallId>,
    pub call_ids: TaggedMap<CallId, String>,
    pub messages: TaggedMap<String, PartId>,
    pub message_part_ids: TaggedMap<PartId, String>,
    pub reasoning: TaggedMap<String, PartId>,
    pub reasoning_part_ids: TaggedMap<PartId, String>,
}

impl HashRegistry {
    /// Register `(base_hash, call_id)`, resolving collisions by replacing the
    /// last hex digit with `_<seq>` (seq starting at 2). Returns the hash
    /// that was actually recorded.
    pub fn register_call(&mut self, base_hash: &str, call_id: &CallId) -> String {
        if let Some(existing) = self.calls.get(base_hash) {
            if existing == call_id {
                return base_hash.to_string();
            }
        }

        let mut candidate = base_hash.to_string();
        let mut seq = 2u32;
        while let Some(existing) = self.calls.get(&candidate) {
            if existing == call_id {
                break;
            }
            let prefix = &base_hash[..base_hash.len().saturating_sub(1)];
            candidate = format!("{}_{}", prefix, seq);
            seq += 1;
        }

        self.calls.insert(candidate.clone(), call_id.clone());
        self.call_ids.insert(call_id.clone(), candidate.clone());
        candidate
    }

    pub fn remove_call(&mut self, call_id: &CallId) {
        if let Some(hash) = self.call_ids.remove(call_id) {
            self.calls.remove(&hash);
        }
    }

    /// Mint a deterministic-but-unique message hash for `part_id` (regenerating
    /// on collision rather than suffixing — see SPEC_FULL.md decision on RNG).
    pub fn mint_message_hash(&mut self, part_id: &PartId) -> String {
        if let Some(existing) = self.message_part_ids.get(part_id) {
            return existing.clone();
        }
        let hash = mint_unique(&self.messages, part_id, "message");
        self.messages.insert(hash.clone(), part_id.clone());
        self.message_part_ids.insert(part_id.clone(), hash.clone());
        hash
    }

    pub fn mint_reasoning_hash(&mut self, part_id: &PartId) -> String {
        if let Some(existing) = self.reasoning_part_ids.get(part_id) {
            return existing.clone();
        }
        let hash = mint_unique(&self.reasoning, part_id, "reasoning");
        self.reasoning.insert(hash.clone(), part_id.clone());
        self.reasoning_part_ids.insert(part_id.clone(), hash.clone());
        hash
    }

    pub fn detect(&self, candidate: &str) -> TargetKind {
        if !is_valid_hash_format(candidate) {
            return TargetKind::UnknownHash;
        }
        if self.calls.contains_key(candidate) {
            TargetKind::ToolHash
        } else if self.messages.contains_key(candidate) {
            TargetKind::MessageHash
        } else if self.reasoning.contains_key(candidate) {
            TargetKind::ReasoningHash
        } else {
            TargetKind::UnknownHash
        }
    }
}

fn mint_unique(existing: &TaggedMap<String, PartId>, part_id: &PartId, salt_tag: &str) -> String {
    let mut salt = 0u32;
    loop {
        let payload = format!("{}:{}:{}", salt_tag, part_id, salt);
        let candidate = sha6(&payload);
        if !existing.contains_key(&candidate) {
            return candidate;
        }
        salt += 1;
    }
}
