#![forbid(unsafe_code)]

pub mod api;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
mod paths;
pub mod service;
pub mod telemetry;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    Attachment, CaseId, CaseMeta, ClaimParent, ClaimType, Comment, CommentId, CommentTarget,
    Context, CoreError, ElementId, ElementKind, ElementName, Evidence, Goal, GraphError, Group,
    GroupId, NamePrefix, PropertyClaim, Role, Shape, ShareKind, SnapshotId, Strategy, Token, User,
    UserId,
};
