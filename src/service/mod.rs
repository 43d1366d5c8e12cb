//! The assurance case daemon.
//!
//! Provides:
//! - Typed operations (create, update, delete, detach, attach, ...)
//! - The access gate and permission checks
//! - Per-case topics for presence and change broadcast
//! - SQLite persistence
//! - IPC over a Unix socket

pub mod gate;
pub mod ipc;
pub mod mutation;
pub mod ops;
pub mod publish;
pub mod query;
pub mod realtime;
pub mod server;
pub mod state;
pub mod store;
pub mod topic;

pub use ipc::{
    ChannelClient, IpcError, Request, Response, ResponsePayload, decode_request, encode_response,
    send_request,
};
pub use mutation::ElementSummary;
pub use ops::{
    CaseFilter, CasePatch, CommentTargetInfo, ElementPatch, ErrorPayload, NewElement, OpError,
    ParentInfo, Patch, ShareEntry,
};
pub use publish::PublishedCase;
pub use server::run_daemon;
pub use state::{Principal, Service};
pub use store::{Store, StoreError};
pub use topic::{ConnectionRecord, HubLimits, TopicError, TopicHub, TopicSubscription};
