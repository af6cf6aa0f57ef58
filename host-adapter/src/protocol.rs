//! Stdio JSON-RPC-shaped wire protocol between this adapter and the chat
//! host process. Out of scope per the engine's own spec ("the chat client
//! wire protocol" is named as an external collaborator) — this module is
//! the host-adapter's own, deliberately minimal, choice of transport: one
//! JSON object per line on stdin/stdout, multiplexed by an `id` the way
//! `cli/serve.rs`'s WebSocket server multiplexes `ClientRequest`/`ServerResponse`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request arriving on stdin, host → adapter. Either a hook invocation
/// (no reply expected beyond the trivial ack) or a model tool call, or a
/// response to something the adapter itself asked the host for.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingLine {
    /// `after-tool` / `after-turn` / `session-end` / `tool-registration` hook.
    Hook { id: u64, session_id: Option<String>, hook: String },
    /// The model called `context` or `replace`.
    ToolCall {
        id: u64,
        session_id: String,
        tool: String,
        args: Value,
    },
    /// Reply to an adapter-initiated `messages` request.
    MessagesResult { reply_to: u64, messages: Value },
    /// Reply to an adapter-initiated `prompt` request.
    PromptResult { reply_to: u64, ok: bool, error: Option<String> },
}

/// A line this adapter writes to stdout, adapter → host.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingLine {
    /// `session.messages(id)` request (§6).
    MessagesRequest { id: u64, session_id: String },
    /// `session.prompt(id, body)` request (§6, §4.I).
    PromptRequest {
        id: u64,
        session_id: String,
        text: String,
        ignored: bool,
        no_reply: bool,
    },
    /// Ack for a hook invocation or tool call.
    Ack { reply_to: u64, result: Value },
    /// Error ack — a hook or tool call failed.
    Error { reply_to: u64, message: String },
}
