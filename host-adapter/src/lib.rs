//! `ctxprune-host-adapter`: a stdio JSON-RPC adapter that drives the
//! `ctxprune` engine's hooks (§4.J) against a concrete chat host process.
//!
//! The engine itself never assumes a transport (§1 names "the chat client
//! wire protocol" as an out-of-scope external collaborator); this crate is
//! one concrete, minimal choice of transport for that seam.

pub mod logging;
pub mod protocol;
pub mod stdio_host;

use std::sync::Arc;

use ctxprune::hooks;
use ctxprune::{EngineConfig, SessionStore, TokenCounter};
use tokio::sync::{mpsc, Mutex};

use protocol::IncomingLine;
use stdio_host::StdioHost;

/// Runs the dispatch loop: pulls hook invocations and model tool calls off
/// `rx` (populated by [`StdioHost::spawn`]'s reader task) and drives the
/// engine. Per §5, the token-count cache is process-wide, not per-session —
/// a single [`TokenCounter`] behind a mutex is shared across every session
/// this adapter serves.
pub async fn run(
    host: Arc<StdioHost>,
    mut rx: mpsc::UnboundedReceiver<IncomingLine>,
    store: Arc<SessionStore>,
    config: Arc<EngineConfig>,
) {
    let tc = Arc::new(Mutex::new(TokenCounter::new(config.max_token_cache_size)));

    while let Some(line) = rx.recv().await {
        let host = host.clone();
        let store = store.clone();
        let config = config.clone();
        let tc = tc.clone();
        tokio::spawn(async move {
            dispatch_one(host, store, config, tc, line).await;
        });
    }
}

async fn dispatch_one(
    host: Arc<StdioHost>,
    store: Arc<SessionStore>,
    config: Arc<EngineConfig>,
    tc: Arc<Mutex<TokenCounter>>,
    line: IncomingLine,
) {
    match line {
        IncomingLine::Hook { id, session_id, hook } => {
            dispatch_hook(&host, &store, &config, &tc, id, session_id, &hook).await;
        }
        IncomingLine::ToolCall { id, session_id, tool, args } => {
            dispatch_tool_call(&host, &store, &config, &tc, id, &session_id, &tool, args).await;
        }
        IncomingLine::MessagesResult { .. } | IncomingLine::PromptResult { .. } => {
            // Routed to a pending responder by the reader task; never reaches here.
        }
    }
}

async fn dispatch_hook(
    host: &Arc<StdioHost>,
    store: &Arc<SessionStore>,
    config: &Arc<EngineConfig>,
    tc: &Arc<Mutex<TokenCounter>>,
    id: u64,
    session_id: Option<String>,
    hook: &str,
) {
    match hook {
        "tool-registration" => {
            let specs = hooks::tool_registration(config);
            let payload = serde_json::json!(specs
                .into_iter()
                .map(|s| serde_json::json!({
                    "name": s.name,
                    "description": s.description,
                    "input_schema": s.input_schema,
                }))
                .collect::<Vec<_>>());
            host.ack(id, payload).await;
        }
        "after-tool" => {
            let Some(session_id) = session_id else {
                host.ack_error(id, "after-tool hook requires session_id".to_string()).await;
                return;
            };
            let mut tc = tc.lock().await;
            match hooks::after_tool(store, host.as_ref(), config, &session_id, &mut tc).await {
                Ok(()) => host.ack(id, serde_json::json!({})).await,
                Err(err) => host.ack_error(id, err.to_string()).await,
            }
        }
        "after-turn" => {
            let Some(session_id) = session_id else {
                host.ack_error(id, "after-turn hook requires session_id".to_string()).await;
                return;
            };
            let mut tc = tc.lock().await;
            match hooks::after_turn(store, host.as_ref(), config, &session_id, &mut tc).await {
                Ok(()) => host.ack(id, serde_json::json!({})).await,
                Err(err) => host.ack_error(id, err.to_string()).await,
            }
        }
        "session-end" => {
            let Some(session_id) = session_id else {
                host.ack_error(id, "session-end hook requires session_id".to_string()).await;
                return;
            };
            hooks::session_end(store, &session_id).await;
            host.ack(id, serde_json::json!({})).await;
        }
        other => {
            host.ack_error(id, format!("unknown hook {other:?}")).await;
        }
    }
}

async fn dispatch_tool_call(
    host: &Arc<StdioHost>,
    store: &Arc<SessionStore>,
    config: &Arc<EngineConfig>,
    tc: &Arc<Mutex<TokenCounter>>,
    id: u64,
    session_id: &str,
    tool: &str,
    args: serde_json::Value,
) {
    let session_id = session_id.to_string();
    let mut tc = tc.lock().await;
    let result = match tool {
        hooks::CONTEXT_TOOL_NAME => {
            hooks::call_context_tool(store, host.as_ref(), config, &session_id, args, &mut tc).await
        }
        hooks::REPLACE_TOOL_NAME => {
            hooks::call_replace_tool(store, host.as_ref(), config, &session_id, args, &mut tc).await
        }
        other => {
            host.ack_error(id, format!("unknown tool {other:?}")).await;
            return;
        }
    };

    match result {
        Ok(note) => host.ack(id, serde_json::json!({ "note": note.text })).await,
        Err(err) => host.ack_error(id, err.to_string()).await,
    }
}
