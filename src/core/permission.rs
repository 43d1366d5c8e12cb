//! Permission resolution over (user, case).
//!
//! Roles form an ordered lattice; everything the gate checks reduces to a
//! comparison on it. Sharing works through one canonical group per
//! (case, permission kind), owned by the case owner.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::case::CaseMeta;
use super::identity::{CaseId, GroupId, UserId};

/// Permission level, ordered: `None < View < Review < Edit < Owner`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    None,
    View,
    Review,
    Edit,
    Owner,
}

impl Role {
    pub fn can_read(self) -> bool {
        self >= Role::View
    }

    pub fn can_comment(self) -> bool {
        self >= Role::View
    }

    pub fn can_write(self) -> bool {
        self >= Role::Edit
    }

    pub fn can_delete(self) -> bool {
        self == Role::Owner
    }

    pub fn can_share(self) -> bool {
        self == Role::Owner
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::None => "none",
            Role::View => "view",
            Role::Review => "review",
            Role::Edit => "edit",
            Role::Owner => "owner",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the role of `user` on the case described by `meta`.
///
/// `member_of` is the set of groups the user belongs to. An ownerless case
/// is legacy data: every authenticated user owns it.
pub fn resolve(user: UserId, meta: &CaseMeta, member_of: &BTreeSet<GroupId>) -> Role {
    match meta.owner {
        Some(owner) if owner == user => return Role::Owner,
        None => return Role::Owner,
        Some(_) => {}
    }

    let in_any = |groups: &BTreeSet<GroupId>| groups.intersection(member_of).next().is_some();
    if in_any(&meta.edit_groups) {
        Role::Edit
    } else if in_any(&meta.review_groups) {
        Role::Review
    } else if in_any(&meta.view_groups) {
        Role::View
    } else {
        Role::None
    }
}

/// Share permission kind: which canonical group a share entry lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareKind {
    View,
    Edit,
    Review,
}

impl ShareKind {
    pub const ALL: [ShareKind; 3] = [ShareKind::View, ShareKind::Edit, ShareKind::Review];

    pub fn as_str(self) -> &'static str {
        match self {
            ShareKind::View => "view",
            ShareKind::Edit => "edit",
            ShareKind::Review => "review",
        }
    }
}

/// Conventional name of the canonical share group for (case, kind).
pub fn canonical_group_name(owner_username: &str, case: CaseId, kind: ShareKind) -> String {
    format!("{owner_username}-case-{case}-{}-group", kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_with_owner(owner: UserId) -> CaseMeta {
        CaseMeta::new(CaseId::generate(), "perm".into(), String::new(), owner)
    }

    #[test]
    fn owner_outranks_groups() {
        let owner = UserId::generate();
        let meta = meta_with_owner(owner);
        assert_eq!(resolve(owner, &meta, &BTreeSet::new()), Role::Owner);
    }

    #[test]
    fn ownerless_case_falls_back_to_owner_for_everyone() {
        let mut meta = meta_with_owner(UserId::generate());
        meta.owner = None;
        assert_eq!(
            resolve(UserId::generate(), &meta, &BTreeSet::new()),
            Role::Owner
        );
    }

    #[test]
    fn edit_wins_over_view() {
        let owner = UserId::generate();
        let mut meta = meta_with_owner(owner);
        let g_edit = GroupId::generate();
        let g_view = GroupId::generate();
        meta.edit_groups.insert(g_edit);
        meta.view_groups.insert(g_view);

        let member_of: BTreeSet<GroupId> = [g_edit, g_view].into_iter().collect();
        assert_eq!(resolve(UserId::generate(), &meta, &member_of), Role::Edit);
    }

    #[test]
    fn stranger_gets_none() {
        let meta = meta_with_owner(UserId::generate());
        let role = resolve(UserId::generate(), &meta, &BTreeSet::new());
        assert_eq!(role, Role::None);
        assert!(!role.can_read());
    }

    #[test]
    fn lattice_predicates() {
        assert!(Role::View.can_read());
        assert!(Role::View.can_comment());
        assert!(!Role::View.can_write());
        assert!(Role::Review.can_read());
        assert!(!Role::Review.can_write());
        assert!(Role::Edit.can_write());
        assert!(!Role::Edit.can_delete());
        assert!(Role::Owner.can_delete());
        assert!(Role::Owner.can_share());
    }
}
