//! [`ctxprune::Host`] implementation that talks to the chat host process over
//! stdio using [`crate::protocol`]. One reader task demultiplexes incoming
//! lines: `messages`/`prompt` replies are routed to whichever in-flight
//! request is waiting on them (by `reply_to` id); everything else (hook
//! invocations, model tool calls) is forwarded to the dispatch loop in
//! `main.rs` over an mpsc channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ctxprune::host::{HostFetchError, HostPromptError, NotePrompt};
use ctxprune::model::{Message, SessionId};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::protocol::{IncomingLine, OutgoingLine};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<IncomingLine>>>>;

pub struct StdioHost {
    stdout: Arc<Mutex<Stdout>>,
    pending: PendingMap,
    next_id: AtomicU64,
}

impl StdioHost {
    /// Spawns the stdin-reading task and returns the host handle plus the
    /// channel the dispatch loop should poll for hook invocations and tool
    /// calls.
    pub fn spawn(stdin: Stdin, stdout: Stdout) -> (Self, mpsc::UnboundedReceiver<IncomingLine>) {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        let reader_pending = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdin).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let Ok(parsed) = serde_json::from_str::<IncomingLine>(&line) else {
                            tracing::warn!(%line, "unparseable line from host, skipping");
                            continue;
                        };
                        match &parsed {
                            IncomingLine::MessagesResult { reply_to, .. }
                            | IncomingLine::PromptResult { reply_to, .. } => {
                                let mut map = reader_pending.lock().await;
                                if let Some(sender) = map.remove(reply_to) {
                                    let _ = sender.send(parsed);
                                }
                            }
                            _ => {
                                if tx.send(parsed).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::error!(error = %err, "stdin read error, stopping reader");
                        break;
                    }
                }
            }
        });

        (
            Self {
                stdout: Arc::new(Mutex::new(stdout)),
                pending,
                next_id: AtomicU64::new(1),
            },
            rx,
        )
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn write_line(&self, line: &OutgoingLine) -> std::io::Result<()> {
        let mut json = serde_json::to_string(line).expect("OutgoingLine always serializes");
        json.push('\n');
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(json.as_bytes()).await?;
        stdout.flush().await
    }

    /// Writes `line`, registers a pending responder, and awaits the host's
    /// reply for `id`.
    async fn request(&self, id: u64, line: OutgoingLine) -> Result<IncomingLine, String> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        if let Err(err) = self.write_line(&line).await {
            self.pending.lock().await.remove(&id);
            return Err(err.to_string());
        }
        rx.await.map_err(|_| "host closed connection before replying".to_string())
    }

    /// Acks a hook invocation or tool call with a successful result payload.
    pub async fn ack(&self, reply_to: u64, result: serde_json::Value) {
        if let Err(err) = self.write_line(&OutgoingLine::Ack { reply_to, result }).await {
            tracing::warn!(error = %err, "failed to write ack to host");
        }
    }

    /// Acks a hook invocation or tool call with a failure.
    pub async fn ack_error(&self, reply_to: u64, message: String) {
        if let Err(err) = self.write_line(&OutgoingLine::Error { reply_to, message }).await {
            tracing::warn!(error = %err, "failed to write error ack to host");
        }
    }
}

#[async_trait]
impl ctxprune::Host for StdioHost {
    async fn messages(&self, session_id: &SessionId) -> Result<Vec<Message>, HostFetchError> {
        let id = self.alloc_id();
        let reply = self
            .request(
                id,
                OutgoingLine::MessagesRequest {
                    id,
                    session_id: session_id.clone(),
                },
            )
            .await
            .map_err(HostFetchError::Fetch)?;

        let IncomingLine::MessagesResult { messages, .. } = reply else {
            return Err(HostFetchError::Fetch("host replied with the wrong message kind".to_string()));
        };
        serde_json::from_value(messages)
            .map_err(|err| HostFetchError::Fetch(format!("decoding host messages: {err}")))
    }

    async fn prompt(&self, session_id: &SessionId, body: NotePrompt) -> Result<(), HostPromptError> {
        let id = self.alloc_id();
        let reply = self
            .request(
                id,
                OutgoingLine::PromptRequest {
                    id,
                    session_id: session_id.clone(),
                    text: body.text,
                    ignored: body.ignored,
                    no_reply: body.no_reply,
                },
            )
            .await
            .map_err(HostPromptError::Deliver)?;

        match reply {
            IncomingLine::PromptResult { ok: true, .. } => Ok(()),
            IncomingLine::PromptResult { error, .. } => Err(HostPromptError::Deliver(
                error.unwrap_or_else(|| "host reported prompt delivery failure".to_string()),
            )),
            _ => Err(HostPromptError::Deliver("host replied with the wrong message kind".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_id_increments_monotonically() {
        let next = AtomicU64::new(1);
        let a = next.fetch_add(1, Ordering::Relaxed);
        let b = next.fetch_add(1, Ordering::Relaxed);
        assert_eq!(a + 1, b);
    }
}
