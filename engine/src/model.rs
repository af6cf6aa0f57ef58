//! The host-agnostic data model: messages, parts, call ids and part ids (§3).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type SessionId = String;
pub type CallId = String;
pub type MessageId = String;

/// `(message-id, part-index)`, serialized as `"<msgId>:<partIndex>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartId {
    pub message_id: MessageId,
    pub part_index: usize,
}

impl PartId {
    pub fn new(message_id: impl Into<MessageId>, part_index: usize) -> Self {
        Self {
            message_id: message_id.into(),
            part_index,
        }
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.message_id, self.part_index)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed part id: {0:?}")]
pub struct PartIdParseError(String);

impl FromStr for PartId {
    type Err = PartIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (msg, idx) = s
            .rsplit_once(':')
            .ok_or_else(|| PartIdParseError(s.to_string()))?;
        let part_index = idx.parse().map_err(|_| PartIdParseError(s.to_string()))?;
        Ok(PartId {
            message_id: msg.to_string(),
            part_index,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolState {
    pub status: Option<ToolStatus>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ToolState {
    pub fn completed(output: impl Into<String>) -> Self {
        Self {
            status: Some(ToolStatus::Completed),
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn errored(error: impl Into<String>) -> Self {
        Self {
            status: Some(ToolStatus::Error),
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, Some(ToolStatus::Completed))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, Some(ToolStatus::Error))
    }
}

/// A discriminated part kind (§3). Every switch on kind in this crate must be total.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Part {
    StepStart,
    Text {
        text: String,
    },
    Tool {
        call_id: CallId,
        tool: String,
        input: serde_json::Value,
        state: ToolState,
    },
    Reasoning {
        text: String,
    },
    File {
        uri: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(id: impl Into<MessageId>, role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: id.into(),
            role,
            parts,
        }
    }
}
