//! Comments on cases and case elements.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::identity::{CaseId, CommentId, ElementId, UserId};

/// What a comment is attached to. Exactly one target, by construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CommentTarget {
    Case(CaseId),
    Goal(ElementId),
    Context(ElementId),
    Strategy(ElementId),
    PropertyClaim(ElementId),
    Evidence(ElementId),
}

impl CommentTarget {
    /// The element the comment targets, if it targets one at all.
    pub fn element(&self) -> Option<ElementId> {
        match self {
            CommentTarget::Case(_) => None,
            CommentTarget::Goal(id)
            | CommentTarget::Context(id)
            | CommentTarget::Strategy(id)
            | CommentTarget::PropertyClaim(id)
            | CommentTarget::Evidence(id) => Some(*id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author: UserId,
    pub target: CommentTarget,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
