//! Crate-wide error types (§7). Each concern gets its own small `thiserror`
//! enum rather than one catch-all, mirroring the error style used elsewhere
//! in this codebase family.

use thiserror::Error;

/// Errors raised while resolving and applying a manual `context` call (§4.F).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManualOpError {
    #[error("{0:?} is not a valid 6-char lower-case hex hash or bulk pattern")]
    InvalidHashFormat(String),

    #[error("tool {tool:?} is protected ({protected:?}) and cannot be pruned")]
    ProtectedTool {
        tool: String,
        protected: Vec<String>,
    },

    #[error("distill target {0:?} is missing a summary")]
    MissingSummary(String),

    #[error("target {0:?} carries a summary but action is discard/restore")]
    UnexpectedSummary(String),

    #[error("{0:?} was fully forgotten (tools.discard.fullyForget) and cannot be restored")]
    RestoreForbidden(String),

    #[error("context call had no targets")]
    EmptyTargets,
}

/// Errors raised while validating a batch of pattern-replace operations (§4.G).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplaceError {
    #[error("start marker {start:?} has no match in any assistant text part")]
    PatternNotFound { start: String },

    #[error("start marker {start:?} matches {count} times; expected exactly one")]
    PatternAmbiguous { start: String, count: usize },

    #[error("matched region ({len} chars) is shorter than the 30-character minimum")]
    MatchTooShort { len: usize },

    #[error("neither start ({start_len} chars) nor end ({end_len} chars) marker exceeds 15 characters")]
    MarkersTooShort { start_len: usize, end_len: usize },

    #[error("replacement region in part {part} overlaps an existing match")]
    PatternsOverlap { part: String },

    #[error("{} offending operation(s): {}", .0.len(), .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Batch(Vec<ReplaceError>),
}

/// Errors raised by the session state store (§4.C).
#[derive(Debug, Error)]
pub enum StateError {
    #[error("serialize session state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("persist session state: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced to the host by the hook entry points (§4.J).
#[derive(Debug, Error)]
pub enum HookError {
    #[error("fetching messages from host: {0}")]
    HostFetch(String),

    #[error(transparent)]
    Manual(#[from] ManualOpError),

    #[error(transparent)]
    Replace(#[from] ReplaceError),
}
