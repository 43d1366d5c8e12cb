//! Realtime channel schemas.
//!
//! Server messages carry `{type, content, username?, id?, datetime}`;
//! clients send `{content: "..."}` free text (with `"ping"` as keep-alive)
//! or an advisory element-lock announcement.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::{ElementId, UserId};

pub const MSG_CASE: &str = "case_message";
pub const MSG_ERROR: &str = "error";

/// A message as it travels to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    pub datetime: String,
}

impl WireMessage {
    pub fn new(kind: impl Into<String>, content: Value) -> Self {
        Self {
            kind: kind.into(),
            content: Some(content),
            username: None,
            id: None,
            datetime: now_rfc3339(),
        }
    }

    pub fn from_user(mut self, id: UserId, username: impl Into<String>) -> Self {
        self.id = Some(id);
        self.username = Some(username.into());
        self
    }

    /// Error reply delivered only to the offending channel.
    pub fn parse_error(detail: &str) -> Self {
        Self::new(
            MSG_ERROR,
            Value::String(format!("ERROR: Could not parse message: {detail}")),
        )
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::new())
}

/// One entry of the `current_connections` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub user: String,
    pub since: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockAction {
    Lock,
    Unlock,
}

/// A message as received from a subscribed client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub content: Option<String>,
    /// Advisory element lock announcement; re-broadcast, never enforced.
    #[serde(default)]
    pub element_lock: Option<bool>,
    #[serde(default)]
    pub element_id: Option<ElementId>,
    #[serde(default)]
    pub action: Option<LockAction>,
}

impl ClientMessage {
    pub fn is_ping(&self) -> bool {
        self.content.as_deref() == Some("ping")
    }

    pub fn is_element_lock(&self) -> bool {
        self.element_lock.unwrap_or(false) && self.element_id.is_some() && self.action.is_some()
    }
}
