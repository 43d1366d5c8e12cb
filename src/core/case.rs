//! Case metadata and permission group sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::identity::{CaseId, GroupId, UserId};

/// Assurance case record: metadata plus the three permission group sets.
///
/// The graph elements themselves live in `CaseGraph`; this is everything
/// about the case that is not a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseMeta {
    pub id: CaseId,
    pub name: String,
    pub description: String,
    /// `None` only for legacy data; the permission resolver treats an
    /// ownerless case as owned by every authenticated user.
    pub owner: Option<UserId>,
    pub color_profile: String,
    /// Advisory whole-case edit lock held by a client; never enforced as a
    /// write barrier.
    pub lock_token: Option<String>,
    pub edit_groups: BTreeSet<GroupId>,
    pub view_groups: BTreeSet<GroupId>,
    pub review_groups: BTreeSet<GroupId>,
    pub published: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub version: u64,
}

impl CaseMeta {
    pub fn new(id: CaseId, name: String, description: String, owner: UserId) -> Self {
        Self {
            id,
            name,
            description,
            owner: Some(owner),
            color_profile: "default".to_string(),
            lock_token: None,
            edit_groups: BTreeSet::new(),
            view_groups: BTreeSet::new(),
            review_groups: BTreeSet::new(),
            published: false,
            published_at: None,
            created_at: OffsetDateTime::now_utc(),
            version: 1,
        }
    }
}
