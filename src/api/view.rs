//! Assembled case views.
//!
//! The nested projection a reader receives: goals carrying their contexts,
//! strategies and claims; claims carrying evidence and sub-claims
//! recursively. Sandboxed nodes are excluded from the main tree and appear
//! in the parallel sandbox view.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::{
    CaseId, ClaimType, CommentId, ElementId, ElementName, Shape, SnapshotId, UserId,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseView {
    pub id: CaseId,
    pub name: String,
    pub description: String,
    pub owner: Option<UserId>,
    pub color_profile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_token: Option<String>,
    pub published: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub version: u64,
    pub goals: Vec<GoalView>,
    pub sandbox: SandboxView,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalView {
    pub id: ElementId,
    pub name: ElementName,
    pub short_desc: String,
    pub long_desc: String,
    pub keywords: String,
    pub assumption: bool,
    pub shape: Shape,
    pub version: u64,
    pub context: Vec<ContextView>,
    pub strategies: Vec<StrategyView>,
    pub property_claims: Vec<ClaimView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextView {
    pub id: ElementId,
    pub name: ElementName,
    pub short_desc: String,
    pub long_desc: String,
    pub shape: Shape,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyView {
    pub id: ElementId,
    pub name: ElementName,
    pub short_desc: String,
    pub long_desc: String,
    pub assumption: bool,
    pub justification: bool,
    pub shape: Shape,
    pub version: u64,
    pub property_claims: Vec<ClaimView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimView {
    pub id: ElementId,
    pub name: ElementName,
    pub short_desc: String,
    pub long_desc: String,
    pub assumption: bool,
    pub claim_type: ClaimType,
    pub level: u32,
    pub shape: Shape,
    pub version: u64,
    pub evidence: Vec<EvidenceView>,
    pub property_claims: Vec<ClaimView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceView {
    pub id: ElementId,
    pub name: ElementName,
    pub short_desc: String,
    pub long_desc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub shape: Shape,
    pub version: u64,
    pub claims: Vec<ElementId>,
}

/// Detached nodes, each subtree intact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxView {
    pub contexts: Vec<ContextView>,
    pub strategies: Vec<StrategyView>,
    pub property_claims: Vec<ClaimView>,
    pub evidence: Vec<EvidenceView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentView {
    pub id: CommentId,
    pub author: UserId,
    pub author_username: String,
    pub target_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<ElementId>,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One row of `list_cases`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    pub id: CaseId,
    pub name: String,
    pub description: String,
    pub owner: Option<UserId>,
    pub published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// The caller's resolved role on this case.
    pub role: crate::core::Role,
}

/// Share state readback: the members of each canonical share group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareStateView {
    pub view: Vec<String>,
    pub edit: Vec<String>,
    pub review: Vec<String>,
}

/// Published snapshot metadata plus the frozen tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotView {
    pub id: SnapshotId,
    pub case_id: CaseId,
    pub name: String,
    pub description: String,
    pub digest: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub tree: CaseView,
}
