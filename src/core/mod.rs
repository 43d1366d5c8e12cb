//! Core domain for assurance cases.
//!
//! Module hierarchy follows type dependency order:
//! - identity: id atoms, element names, tokens
//! - error: canonical core errors
//! - element: Goal, Context, Strategy, PropertyClaim, Evidence
//! - case: CaseMeta and permission group sets
//! - principal: User, Group
//! - comment: Comment, CommentTarget
//! - graph: CaseGraph (the store) and its invariants
//! - sandbox: detach/attach over the graph
//! - traverse: claim subtree walks
//! - allocator: scoped name allocation
//! - permission: the role lattice and share groups

pub mod allocator;
pub mod case;
pub mod comment;
pub mod element;
pub mod error;
pub mod graph;
pub mod identity;
pub mod permission;
pub mod principal;
pub mod sandbox;
pub mod traverse;

pub use case::CaseMeta;
pub use comment::{Comment, CommentTarget};
pub use element::{
    Attachment, ClaimParent, ClaimType, Context, Evidence, Goal, PropertyClaim, Shape, Strategy,
};
pub use error::{CoreError, ElementKind, GraphError, InvalidId, InvalidName};
pub use graph::CaseGraph;
pub use identity::{
    CaseId, CommentId, ElementId, ElementName, GroupId, NamePrefix, SnapshotId, Token, UserId,
};
pub use permission::{Role, ShareKind, canonical_group_name, resolve};
pub use principal::{Group, User};
pub use traverse::{case_property_claims, child_property_claims};
