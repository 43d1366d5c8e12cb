//! Canonical API schemas for daemon IPC and realtime subscriptions.
//!
//! These types are the truthful boundary: the assembled case view is the
//! full nested projection, not a lossy summary. If a smaller payload is
//! desirable we define an explicit summary type.

pub mod assemble;
pub mod realtime;
pub mod view;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonInfo {
    pub version: String,
    pub protocol_version: u32,
    pub pid: u32,
}

pub use assemble::{assemble_case, assemble_sandbox};
pub use realtime::{ClientMessage, ConnectionInfo, LockAction, WireMessage};
pub use view::{
    CaseSummary, CaseView, ClaimView, CommentView, ContextView, EvidenceView, GoalView,
    SandboxView, ShareStateView, SnapshotView, StrategyView,
};
