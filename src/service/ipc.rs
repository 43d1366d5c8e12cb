//! IPC protocol types and codec.
//!
//! Protocol: newline-delimited JSON over a Unix socket.
//!
//! Request format: `{"op": "get_case", "token": "...", ...}\n`
//! Response format: `{"ok": ...}\n` or `{"err": {"code": "...", ...}}\n`
//!
//! A `subscribe` request upgrades the connection: after admission the server
//! streams realtime `WireMessage`s on it and reads client case messages back
//! until the peer disconnects.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::api::realtime::WireMessage;
use crate::api::view::{
    CaseSummary, CaseView, CommentView, SandboxView, ShareStateView, SnapshotView,
};
use crate::api::DaemonInfo;
use crate::core::{CaseId, CommentId, ElementId, Group, SnapshotId, Token, User};
use crate::error::{Effect, Transience};

use super::mutation::ElementSummary;
use super::ops::{
    CaseFilter, CasePatch, CommentTargetInfo, ElementPatch, ErrorPayload, NewElement, OpError,
    ParentInfo, ShareEntry,
};

// =============================================================================
// Request
// =============================================================================

/// IPC request. Every case-touching request carries the caller's token; the
/// daemon control surface (`ping`/`info`/`shutdown`) relies on the socket
/// directory being user-private instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    // === Control ===
    Ping,
    Info,
    Shutdown,

    // === Principals ===
    /// Register a user; the response carries the minted token exactly once.
    RegisterUser { username: String, email: String },
    CreateGroup { token: Token, name: String },

    // === Cases ===
    ListCases {
        token: Token,
        #[serde(default)]
        filter: CaseFilter,
    },
    CreateCase {
        token: Token,
        name: String,
        #[serde(default)]
        description: String,
    },
    GetCase { token: Token, case_id: CaseId },
    UpdateCase {
        token: Token,
        case_id: CaseId,
        patch: CasePatch,
        #[serde(default)]
        version: Option<u64>,
    },
    DeleteCase { token: Token, case_id: CaseId },
    SandboxView { token: Token, case_id: CaseId },
    UpdateIdentifiers { token: Token, case_id: CaseId },
    PublishCase { token: Token, case_id: CaseId },
    GetSnapshot { token: Token, snapshot_id: SnapshotId },
    ListSnapshots { token: Token, case_id: CaseId },
    ShareWith {
        token: Token,
        case_id: CaseId,
        entries: Vec<ShareEntry>,
    },
    ShareState { token: Token, case_id: CaseId },

    // === Elements ===
    CreateElement {
        token: Token,
        case_id: CaseId,
        element: NewElement,
    },
    GetElement { token: Token, element_id: ElementId },
    UpdateElement {
        token: Token,
        element_id: ElementId,
        patch: ElementPatch,
        #[serde(default)]
        version: Option<u64>,
    },
    DeleteElement { token: Token, element_id: ElementId },
    Detach {
        token: Token,
        element_id: ElementId,
        #[serde(default)]
        parent_info: Option<ParentInfo>,
    },
    Attach {
        token: Token,
        element_id: ElementId,
        parent_info: ParentInfo,
    },
    SetClaimParent {
        token: Token,
        element_id: ElementId,
        parent_info: ParentInfo,
    },

    // === Comments ===
    CreateComment {
        token: Token,
        case_id: CaseId,
        target: CommentTargetInfo,
        content: String,
    },
    ListComments { token: Token, case_id: CaseId },
    DeleteComment {
        token: Token,
        case_id: CaseId,
        comment_id: CommentId,
    },

    // === Realtime ===
    /// Upgrade this connection to a realtime channel on `case:{case_id}`.
    Subscribe {
        token: Token,
        case_id: CaseId,
        /// Channel identity; defaults to a fresh one per connection.
        #[serde(default)]
        channel_key: Option<String>,
        /// Declared origin, checked against the configured allow-list.
        #[serde(default)]
        origin: Option<String>,
    },
}

impl Request {
    pub fn op_name(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::Info => "info",
            Request::Shutdown => "shutdown",
            Request::RegisterUser { .. } => "register_user",
            Request::CreateGroup { .. } => "create_group",
            Request::ListCases { .. } => "list_cases",
            Request::CreateCase { .. } => "create_case",
            Request::GetCase { .. } => "get_case",
            Request::UpdateCase { .. } => "update_case",
            Request::DeleteCase { .. } => "delete_case",
            Request::SandboxView { .. } => "sandbox_view",
            Request::UpdateIdentifiers { .. } => "update_identifiers",
            Request::PublishCase { .. } => "publish_case",
            Request::GetSnapshot { .. } => "get_snapshot",
            Request::ListSnapshots { .. } => "list_snapshots",
            Request::ShareWith { .. } => "share_with",
            Request::ShareState { .. } => "share_state",
            Request::CreateElement { .. } => "create_element",
            Request::GetElement { .. } => "get_element",
            Request::UpdateElement { .. } => "update_element",
            Request::DeleteElement { .. } => "delete_element",
            Request::Detach { .. } => "detach",
            Request::Attach { .. } => "attach",
            Request::SetClaimParent { .. } => "set_claim_parent",
            Request::CreateComment { .. } => "create_comment",
            Request::ListComments { .. } => "list_comments",
            Request::DeleteComment { .. } => "delete_comment",
            Request::Subscribe { .. } => "subscribe",
        }
    }
}

// =============================================================================
// Response
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Ok { ok: ResponsePayload },
    Err { err: ErrorPayload },
}

impl Response {
    pub fn ok(payload: ResponsePayload) -> Self {
        Response::Ok { ok: payload }
    }

    pub fn err(error: impl Into<ErrorPayload>) -> Self {
        Response::Err { err: error.into() }
    }
}

/// Successful response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Info(DaemonInfo),
    Case(Box<CaseView>),
    Cases(Vec<CaseSummary>),
    Sandbox(SandboxView),
    Element(ElementSummary),
    Snapshot(Box<SnapshotView>),
    Snapshots(Vec<SnapshotView>),
    Comments(Vec<CommentView>),
    Share(ShareStateView),
    User(User),
    Group(Group),
    Deleted { deleted: Vec<ElementId> },
    CommentCreated { comment_id: CommentId },
    Pong { pong: bool },
    ShuttingDown { shutting_down: bool },
    Done { done: bool },
    /// Serialized single-element body (shape depends on kind).
    Body(Value),
}

impl From<OpError> for ErrorPayload {
    fn from(e: OpError) -> Self {
        e.to_payload()
    }
}

impl From<IpcError> for ErrorPayload {
    fn from(e: IpcError) -> Self {
        ErrorPayload {
            code: e.code().to_string(),
            message: e.to_string(),
            details: None,
            retryable: e.transience().is_retryable(),
        }
    }
}

// =============================================================================
// IpcError
// =============================================================================

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IpcError {
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("client disconnected")]
    Disconnected,

    #[error("daemon unavailable: {0}")]
    DaemonUnavailable(String),
}

impl IpcError {
    pub fn code(&self) -> &'static str {
        match self {
            IpcError::Parse(_) => "parse_error",
            IpcError::Io(_) => "io_error",
            IpcError::Disconnected => "disconnected",
            IpcError::DaemonUnavailable(_) => "daemon_unavailable",
        }
    }

    pub fn transience(&self) -> Transience {
        match self {
            IpcError::DaemonUnavailable(_) | IpcError::Io(_) | IpcError::Disconnected => {
                Transience::Retryable
            }
            IpcError::Parse(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            IpcError::Io(_) | IpcError::Disconnected => Effect::Unknown,
            IpcError::DaemonUnavailable(_) | IpcError::Parse(_) => Effect::None,
        }
    }
}

// =============================================================================
// Codec
// =============================================================================

pub fn encode_response(resp: &Response) -> Result<Vec<u8>, IpcError> {
    let mut bytes = serde_json::to_vec(resp)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn decode_request(line: &str) -> Result<Request, IpcError> {
    Ok(serde_json::from_str(line)?)
}

pub fn encode_message(message: &WireMessage) -> Result<Vec<u8>, IpcError> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

// =============================================================================
// Client
// =============================================================================

/// Send one request and read one response.
pub fn send_request(socket: &Path, req: &Request) -> Result<Response, IpcError> {
    let mut stream = connect(socket)?;
    let mut json = serde_json::to_string(req)?;
    json.push('\n');
    stream.write_all(json.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(IpcError::Disconnected);
    }
    Ok(serde_json::from_str(&line)?)
}

/// A live realtime channel from the client side.
pub struct ChannelClient {
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl ChannelClient {
    /// Connect and subscribe. The first server message is the
    /// `current_connections` case message; errors come back as a regular
    /// error response before any stream traffic.
    pub fn subscribe(socket: &Path, request: &Request) -> Result<Self, IpcError> {
        let mut stream = connect(socket)?;
        let mut json = serde_json::to_string(request)?;
        json.push('\n');
        stream.write_all(json.as_bytes())?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            writer: stream,
            reader,
        })
    }

    /// Next server message; `None` when the server closed the channel.
    pub fn next_message(&mut self) -> Result<Option<Value>, IpcError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&line)?))
    }

    /// Send a raw client message (free text, ping, element lock).
    pub fn send_raw(&mut self, raw: &str) -> Result<(), IpcError> {
        self.writer.write_all(raw.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

fn connect(socket: &Path) -> Result<UnixStream, IpcError> {
    UnixStream::connect(socket).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
            IpcError::DaemonUnavailable(format!("no daemon at {}", socket.display()))
        }
        _ => IpcError::Io(e),
    })
}
