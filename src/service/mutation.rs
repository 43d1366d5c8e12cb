//! The mutation service: every write a client can perform.
//!
//! Each operation authenticates through the gate, takes the case write
//! lock, mutates a working copy of the graph, persists it, swaps it in, and
//! broadcasts the change event - still under the lock, so subscribers of a
//! topic observe mutations in commit order. A failed mutation discards the
//! working copy: partial writes are unrepresentable.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::api::view::{CaseView, ShareStateView, SnapshotView};
use crate::core::graph::CaseGraph;
use crate::core::{
    Attachment, CaseId, CaseMeta, ClaimParent, Comment, CommentId, CommentTarget, Context,
    ElementId, ElementKind, ElementName, Evidence, Goal, GraphError, Group, NamePrefix,
    PropertyClaim, Role, ShareKind, Strategy, Token, User, UserId, allocator,
    canonical_group_name, child_property_claims,
};

use super::ops::{
    CasePatch, CommentTargetInfo, ElementPatch, NewElement, OpError, ParentInfo, Patch,
    ShareEntry,
};
use super::state::{CaseCell, Principal, Service};

/// Result of a create/update/delete on a graph element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSummary {
    pub id: ElementId,
    pub kind: String,
    pub name: String,
    pub version: u64,
}

/// Outcome of a closure-applied mutation, before commit.
struct Mutated<R> {
    result: R,
    events: Vec<(&'static str, Value)>,
    added: Vec<ElementId>,
    removed: Vec<ElementId>,
}

impl<R> Mutated<R> {
    fn new(result: R) -> Self {
        Self {
            result,
            events: Vec::new(),
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    fn event(mut self, kind: &'static str, payload: Value) -> Self {
        self.events.push((kind, payload));
        self
    }
}

impl Service {
    /// Mutate one case atomically: clone, apply, persist, swap, broadcast.
    fn commit_case<R>(
        &self,
        cell: &CaseCell,
        principal: &Principal,
        f: impl FnOnce(&mut CaseGraph) -> Result<Mutated<R>, OpError>,
    ) -> Result<R, OpError> {
        let mut guard = cell.write()?;
        let mut working = guard.clone();
        let mutated = f(&mut working)?;
        self.store().persist_case(&working)?;
        let case = working.meta().id;
        if !mutated.added.is_empty() {
            self.index_insert(&mutated.added, case)?;
        }
        if !mutated.removed.is_empty() {
            self.index_remove(&mutated.removed)?;
        }
        *guard = working;
        for (kind, payload) in mutated.events {
            self.publish_change(case, principal, kind, payload);
        }
        drop(guard);
        Ok(mutated.result)
    }

    // =========================================================================
    // Users and groups (flat record CRUD)
    // =========================================================================

    /// Register a user and mint their token. The token is returned exactly
    /// once; only its holder can authenticate as this user.
    pub fn register_user(&self, username: &str, email: &str) -> Result<User, OpError> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() {
            return Err(OpError::Validation {
                field: "username".into(),
                reason: "must not be empty".into(),
            });
        }
        if email.is_empty() || !email.contains('@') {
            return Err(OpError::Validation {
                field: "email".into(),
                reason: "must be an email address".into(),
            });
        }

        let mut directory = self.directory_mut()?;
        if directory.user_by_username(username).is_some() {
            return Err(OpError::Validation {
                field: "username".into(),
                reason: "already taken".into(),
            });
        }
        if directory.user_by_email(email).is_some() {
            return Err(OpError::Validation {
                field: "email".into(),
                reason: "already registered".into(),
            });
        }

        let user = User {
            id: UserId::generate(),
            username: username.to_string(),
            email: email.to_string(),
            token: Token::generate(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.store().save_user(&user)?;
        directory.insert_user(user.clone());
        Ok(user)
    }

    pub fn create_group(&self, principal: &Principal, name: &str) -> Result<Group, OpError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OpError::Validation {
                field: "name".into(),
                reason: "must not be empty".into(),
            });
        }
        let mut directory = self.directory_mut()?;
        let group = Group::new(name.to_string(), principal.id);
        self.store().save_group(&group)?;
        directory.insert_group(group.clone());
        Ok(group)
    }

    // =========================================================================
    // Cases
    // =========================================================================

    pub fn create_case(
        &self,
        principal: &Principal,
        name: &str,
        description: &str,
    ) -> Result<CaseView, OpError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OpError::Validation {
                field: "name".into(),
                reason: "must not be empty".into(),
            });
        }
        let meta = CaseMeta::new(
            CaseId::generate(),
            name.to_string(),
            description.to_string(),
            principal.id,
        );
        let graph = CaseGraph::new(meta);
        let cell = self.insert_case(graph)?;
        let guard = cell.read()?;
        Ok(self.assemble(&guard))
    }

    pub fn update_case(
        &self,
        principal: &Principal,
        case: CaseId,
        patch: CasePatch,
        version: Option<u64>,
    ) -> Result<CaseView, OpError> {
        patch.validate()?;
        let cell = self.require(principal, case, Role::Edit)?;
        self.commit_case(&cell, principal, |graph| {
            let meta = graph.meta_mut();
            check_version(meta.version, version)?;
            if let Patch::Set(name) = &patch.name {
                meta.name = name.clone();
            }
            if let Patch::Set(description) = &patch.description {
                meta.description = description.clone();
            }
            if let Patch::Set(profile) = &patch.color_profile {
                meta.color_profile = profile.clone();
            }
            match &patch.lock_token {
                Patch::Set(token) => meta.lock_token = Some(token.clone()),
                Patch::Clear => meta.lock_token = None,
                Patch::Keep => {}
            }
            meta.version += 1;
            let payload = json!({
                "id": meta.id,
                "name": meta.name.clone(),
                "version": meta.version,
            });
            Ok(Mutated::new(()).event("case_updated", payload))
        })?;
        let guard = cell.read()?;
        Ok(self.assemble(&guard))
    }

    pub fn delete_case(&self, principal: &Principal, case: CaseId) -> Result<(), OpError> {
        self.require(principal, case, Role::Owner)?;
        self.remove_case(case, principal)
    }

    // =========================================================================
    // Sharing
    // =========================================================================

    /// Apply a batch of share requests. For each named permission kind,
    /// `true` adds the target user to the case's canonical group, `false`
    /// removes them; absent kinds are untouched.
    pub fn share_with(
        &self,
        principal: &Principal,
        case: CaseId,
        entries: &[ShareEntry],
    ) -> Result<ShareStateView, OpError> {
        let cell = self.require(principal, case, Role::Owner)?;

        let mut guard = cell.write()?;
        let mut working = guard.clone();
        let owner = working.meta().owner.unwrap_or(principal.id);

        let mut directory = self.directory_mut()?;
        let owner_username = directory.username(owner);

        for entry in entries {
            let target = directory
                .user_by_email(&entry.email)
                .map(|u| u.id)
                .ok_or_else(|| OpError::Validation {
                    field: "email".into(),
                    reason: format!("no user with email `{}`", entry.email),
                })?;

            for (kind, wanted) in [
                (ShareKind::View, entry.view),
                (ShareKind::Edit, entry.edit),
                (ShareKind::Review, entry.review),
            ] {
                let Some(wanted) = wanted else { continue };
                let name = canonical_group_name(&owner_username, case, kind);
                let group_id = match directory.group_by_name(&name) {
                    Some(group) => group.id,
                    None => {
                        let group = Group::new(name, owner);
                        let id = group.id;
                        self.store().save_group(&group)?;
                        directory.insert_group(group);
                        id
                    }
                };
                let meta = working.meta_mut();
                let set = match kind {
                    ShareKind::View => &mut meta.view_groups,
                    ShareKind::Edit => &mut meta.edit_groups,
                    ShareKind::Review => &mut meta.review_groups,
                };
                set.insert(group_id);
                if let Some(group) = directory.group_mut(group_id) {
                    if wanted {
                        group.members.insert(target);
                    } else {
                        group.members.remove(&target);
                    }
                    let group = group.clone();
                    self.store().save_group(&group)?;
                }
            }
        }

        self.store().persist_case(&working)?;
        *guard = working;
        drop(guard);

        Ok(share_state_view(&directory, &owner_username, case))
    }

    pub fn share_state(
        &self,
        principal: &Principal,
        case: CaseId,
    ) -> Result<ShareStateView, OpError> {
        let cell = self.require(principal, case, Role::Owner)?;
        let guard = cell.read()?;
        let meta = guard.meta().clone();
        drop(guard);
        let directory = self.directory()?;
        let owner_username = meta
            .owner
            .map(|o| directory.username(o))
            .unwrap_or_else(|| principal.username.clone());
        Ok(share_state_view(&directory, &owner_username, case))
    }

    // =========================================================================
    // Element creation
    // =========================================================================

    pub fn create_element(
        &self,
        principal: &Principal,
        case: CaseId,
        new: NewElement,
    ) -> Result<ElementSummary, OpError> {
        let cell = self.require(principal, case, Role::Edit)?;
        let service = self.clone();
        self.commit_case(&cell, principal, move |graph| {
            let now = OffsetDateTime::now_utc();
            let id = ElementId::generate();
            let summary = match new {
                NewElement::Goal {
                    short_desc,
                    long_desc,
                    keywords,
                    assumption,
                    ..
                } => {
                    let name = allocator::next_goal_name(graph);
                    graph.insert_goal(Goal {
                        id,
                        name: name.clone(),
                        short_desc,
                        long_desc,
                        keywords,
                        assumption,
                        created_at: now,
                        version: 1,
                    })?;
                    summary_of(id, ElementKind::Goal, &name)
                }
                NewElement::Context {
                    goal_id,
                    short_desc,
                    long_desc,
                    in_sandbox,
                    ..
                } => {
                    let attachment = if in_sandbox {
                        Attachment::Sandboxed { case }
                    } else {
                        let goal = goal_id.ok_or_else(|| missing("goal_id"))?;
                        service.expect_kind(graph, goal, ElementKind::Goal, ElementKind::Context)?;
                        Attachment::Attached { parent: goal }
                    };
                    let name = match attachment {
                        Attachment::Attached { parent } => {
                            allocator::next_context_name(graph, parent)
                        }
                        Attachment::Sandboxed { .. } => {
                            allocator::next_casewide_name(graph, ElementKind::Context)
                        }
                    };
                    graph.insert_context(Context {
                        id,
                        name: name.clone(),
                        short_desc,
                        long_desc,
                        attachment,
                        created_at: now,
                        version: 1,
                    })?;
                    summary_of(id, ElementKind::Context, &name)
                }
                NewElement::Strategy {
                    goal_id,
                    short_desc,
                    long_desc,
                    assumption,
                    justification,
                    in_sandbox,
                    ..
                } => {
                    let attachment = if in_sandbox {
                        Attachment::Sandboxed { case }
                    } else {
                        let goal = goal_id.ok_or_else(|| missing("goal_id"))?;
                        service.expect_kind(
                            graph,
                            goal,
                            ElementKind::Goal,
                            ElementKind::Strategy,
                        )?;
                        Attachment::Attached { parent: goal }
                    };
                    let name = match attachment {
                        Attachment::Attached { parent } => {
                            allocator::next_strategy_name(graph, parent)
                        }
                        Attachment::Sandboxed { .. } => {
                            allocator::next_casewide_name(graph, ElementKind::Strategy)
                        }
                    };
                    graph.insert_strategy(Strategy {
                        id,
                        name: name.clone(),
                        short_desc,
                        long_desc,
                        assumption,
                        justification,
                        attachment,
                        created_at: now,
                        version: 1,
                    })?;
                    summary_of(id, ElementKind::Strategy, &name)
                }
                NewElement::PropertyClaim {
                    parent,
                    short_desc,
                    long_desc,
                    assumption,
                    claim_type,
                    in_sandbox,
                    ..
                } => {
                    let attachment = if in_sandbox {
                        Attachment::Sandboxed { case }
                    } else {
                        let parent = parent.as_claim_parent()?;
                        service.expect_claim_parent(graph, &parent)?;
                        Attachment::Attached { parent }
                    };
                    let name = match &attachment {
                        Attachment::Attached {
                            parent: ClaimParent::Claim(parent),
                        } => allocator::next_sub_claim_name(graph, *parent),
                        Attachment::Attached { .. } => allocator::next_top_claim_name(graph),
                        Attachment::Sandboxed { .. } => {
                            allocator::next_casewide_name(graph, ElementKind::PropertyClaim)
                        }
                    };
                    graph.insert_claim(PropertyClaim {
                        id,
                        name: name.clone(),
                        short_desc,
                        long_desc,
                        assumption,
                        claim_type,
                        level: 1,
                        attachment,
                        created_at: now,
                        version: 1,
                    })?;
                    summary_of(id, ElementKind::PropertyClaim, &name)
                }
                NewElement::Evidence {
                    property_claim_id,
                    short_desc,
                    long_desc,
                    url,
                    in_sandbox,
                    ..
                } => {
                    let claims = if in_sandbox {
                        Vec::new()
                    } else {
                        let claim = property_claim_id.ok_or_else(|| missing("property_claim_id"))?;
                        service.expect_kind(
                            graph,
                            claim,
                            ElementKind::PropertyClaim,
                            ElementKind::Evidence,
                        )?;
                        vec![claim]
                    };
                    let name = allocator::next_evidence_name(graph);
                    graph.insert_evidence(Evidence {
                        id,
                        name: name.clone(),
                        short_desc,
                        long_desc,
                        url,
                        claims,
                        created_at: now,
                        version: 1,
                    })?;
                    summary_of(id, ElementKind::Evidence, &name)
                }
            };

            let payload = json!({
                "kind": summary.kind.clone(),
                "id": summary.id,
                "name": summary.name.clone(),
            });
            let mut mutated = Mutated::new(summary).event("element_created", payload);
            mutated.added.push(id);
            Ok(mutated)
        })
    }

    // =========================================================================
    // Element update / delete
    // =========================================================================

    pub fn update_element(
        &self,
        principal: &Principal,
        element: ElementId,
        patch: ElementPatch,
        version: Option<u64>,
    ) -> Result<ElementSummary, OpError> {
        let (_, cell) = self.require_for_element(principal, element, Role::Edit)?;
        self.commit_case(&cell, principal, |graph| {
            let kind = graph
                .kind_of(element)
                .ok_or(OpError::NotFound { what: "element" })?;
            patch.reject_foreign(kind)?;

            if let Patch::Set(name) = &patch.name {
                validate_rename(graph, element, kind, name)?;
            }

            let summary = apply_element_patch(graph, element, kind, &patch, version)?;
            let payload = json!({
                "kind": summary.kind.clone(),
                "id": summary.id,
                "name": summary.name.clone(),
                "version": summary.version,
            });
            Ok(Mutated::new(summary).event("element_updated", payload))
        })
    }

    /// Cascade delete: the element and every descendant reachable through
    /// parent edges. Evidence survives node deletion with a reduced claim
    /// set; it dies only with its case.
    pub fn delete_element(
        &self,
        principal: &Principal,
        element: ElementId,
    ) -> Result<Vec<ElementId>, OpError> {
        let (_, cell) = self.require_for_element(principal, element, Role::Owner)?;
        self.commit_case(&cell, principal, |graph| {
            let kind = graph
                .kind_of(element)
                .ok_or(OpError::NotFound { what: "element" })?;
            let deleted = match kind {
                ElementKind::Goal => graph.delete_goal(element)?,
                ElementKind::Context => graph.delete_context(element)?,
                ElementKind::Strategy => graph.delete_strategy(element)?,
                ElementKind::PropertyClaim => graph.delete_claim(element)?,
                ElementKind::Evidence => graph.delete_evidence(element)?,
            };
            let payload = json!({
                "kind": kind.as_str(),
                "id": element,
                "deleted": deleted.clone(),
            });
            let mut mutated = Mutated::new(deleted.clone()).event("element_deleted", payload);
            mutated.removed = deleted;
            Ok(mutated)
        })
    }

    // =========================================================================
    // Detach / attach
    // =========================================================================

    /// Move a node into the case sandbox. For evidence, `parent_info` names
    /// the claim link to sever; evidence enters the sandbox only once its
    /// claim set is empty.
    pub fn detach(
        &self,
        principal: &Principal,
        element: ElementId,
        parent: Option<ParentInfo>,
    ) -> Result<ElementSummary, OpError> {
        let (_, cell) = self.require_for_element(principal, element, Role::Edit)?;
        self.commit_case(&cell, principal, |graph| {
            let kind = graph
                .kind_of(element)
                .ok_or(OpError::NotFound { what: "element" })?;
            match kind {
                ElementKind::Goal => {
                    return Err(OpError::Validation {
                        field: "element".into(),
                        reason: "a goal has no parent to detach from".into(),
                    });
                }
                ElementKind::Context => graph.detach_context(element)?,
                ElementKind::Strategy => graph.detach_strategy(element)?,
                ElementKind::PropertyClaim => graph.detach_claim(element)?,
                ElementKind::Evidence => {
                    let claim = parent
                        .ok_or_else(|| missing("parent_info"))?
                        .as_claim()?;
                    graph.unlink_evidence(element, claim)?;
                }
            }
            let summary = bump_and_summarize(graph, element, kind)?;
            let payload = json!({ "kind": summary.kind.clone(), "id": summary.id });
            Ok(Mutated::new(summary).event("element_detached", payload))
        })
    }

    /// Attach a sandboxed node under an eligible parent. For evidence an
    /// attach adds a claim link; the first link lifts it out of the sandbox.
    pub fn attach(
        &self,
        principal: &Principal,
        element: ElementId,
        parent: ParentInfo,
    ) -> Result<ElementSummary, OpError> {
        let (_, cell) = self.require_for_element(principal, element, Role::Edit)?;
        let service = self.clone();
        self.commit_case(&cell, principal, move |graph| {
            let kind = graph
                .kind_of(element)
                .ok_or(OpError::NotFound { what: "element" })?;
            match kind {
                ElementKind::Goal => {
                    return Err(OpError::Validation {
                        field: "element".into(),
                        reason: "a goal cannot be attached".into(),
                    });
                }
                ElementKind::Context => {
                    let goal = parent.as_goal()?;
                    service.expect_kind(graph, goal, ElementKind::Goal, kind)?;
                    graph.attach_context(element, goal)?;
                }
                ElementKind::Strategy => {
                    let goal = parent.as_goal()?;
                    service.expect_kind(graph, goal, ElementKind::Goal, kind)?;
                    graph.attach_strategy(element, goal)?;
                }
                ElementKind::PropertyClaim => {
                    let parent = parent.as_claim_parent()?;
                    service.expect_claim_parent(graph, &parent)?;
                    graph.attach_claim(element, parent)?;
                }
                ElementKind::Evidence => {
                    let claim = parent.as_claim()?;
                    service.expect_kind(graph, claim, ElementKind::PropertyClaim, kind)?;
                    graph.link_evidence(element, claim)?;
                }
            }
            let summary = bump_and_summarize(graph, element, kind)?;
            let payload = json!({ "kind": summary.kind.clone(), "id": summary.id });
            Ok(Mutated::new(summary).event("element_attached", payload))
        })
    }

    /// Re-parent a claim in one step: detach then attach, atomically. A
    /// failed attach leaves the graph exactly as it was.
    pub fn set_claim_parent(
        &self,
        principal: &Principal,
        element: ElementId,
        parent: ParentInfo,
    ) -> Result<ElementSummary, OpError> {
        let (_, cell) = self.require_for_element(principal, element, Role::Edit)?;
        let service = self.clone();
        self.commit_case(&cell, principal, move |graph| {
            graph.claim(element)?;
            match graph.detach_claim(element) {
                Ok(()) | Err(GraphError::AlreadyDetached { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            let parent = parent.as_claim_parent()?;
            service.expect_claim_parent(graph, &parent)?;
            graph.attach_claim(element, parent)?;
            let summary = bump_and_summarize(graph, element, ElementKind::PropertyClaim)?;
            let payload = json!({ "kind": summary.kind.clone(), "id": summary.id });
            Ok(Mutated::new(summary).event("element_attached", payload))
        })
    }

    // =========================================================================
    // Identifier reassignment
    // =========================================================================

    /// Rename every attached node of the case to the canonical sequence:
    /// goals `G1..`, per-goal contexts `C1..` and strategies `S1..`, one
    /// case-wide `P` sequence for top-level claims (goal claims before
    /// strategy claims, goal by goal), dotted names for sub-claims, and
    /// `E1..` for evidence in first-encounter order. Idempotent.
    pub fn reassign_identifiers(
        &self,
        principal: &Principal,
        case: CaseId,
    ) -> Result<CaseView, OpError> {
        let cell = self.require(principal, case, Role::Edit)?;
        self.commit_case(&cell, principal, |graph| {
            let renames = compute_renames(graph);
            for (id, name) in &renames {
                let name = name.clone();
                match graph.kind_of(*id) {
                    Some(ElementKind::Goal) => graph.patch_goal(*id, |g| g.name = name)?,
                    Some(ElementKind::Context) => graph.patch_context(*id, |c| c.name = name)?,
                    Some(ElementKind::Strategy) => graph.patch_strategy(*id, |s| s.name = name)?,
                    Some(ElementKind::PropertyClaim) => {
                        graph.patch_claim(*id, |c| c.name = name)?
                    }
                    Some(ElementKind::Evidence) => graph.patch_evidence(*id, |e| e.name = name)?,
                    None => {}
                }
            }
            graph.meta_mut().version += 1;
            let payload = json!({ "id": case, "renamed": renames.len() });
            Ok(Mutated::new(()).event("identifiers_reassigned", payload))
        })?;
        let guard = cell.read()?;
        Ok(self.assemble(&guard))
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Freeze the assembled tree into an immutable snapshot and mark the
    /// case published. Later edits never alter the snapshot.
    pub fn publish_case(
        &self,
        principal: &Principal,
        case: CaseId,
    ) -> Result<SnapshotView, OpError> {
        let cell = self.require(principal, case, Role::Owner)?;
        let service = self.clone();
        let snapshot = self.commit_case(&cell, principal, move |graph| {
            let now = OffsetDateTime::now_utc();
            let meta = graph.meta_mut();
            meta.published = true;
            meta.published_at = Some(now);
            meta.version += 1;
            let tree = service.assemble(graph);
            let snapshot = super::publish::PublishedCase::freeze(tree);
            let payload = json!({ "id": case, "snapshot_id": snapshot.id });
            Ok(Mutated::new(snapshot).event("case_published", payload))
        })?;
        let view = snapshot.view();
        self.insert_snapshot(snapshot)?;
        Ok(view)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    pub fn create_comment(
        &self,
        principal: &Principal,
        case: CaseId,
        target: CommentTargetInfo,
        content: &str,
    ) -> Result<CommentId, OpError> {
        if content.trim().is_empty() {
            return Err(OpError::Validation {
                field: "content".into(),
                reason: "must not be empty".into(),
            });
        }
        let cell = self.require(principal, case, Role::View)?;
        self.commit_case(&cell, principal, |graph| {
            let target = resolve_comment_target(case, &target)?;
            let comment = Comment {
                id: CommentId::generate(),
                author: principal.id,
                target,
                content: content.to_string(),
                created_at: OffsetDateTime::now_utc(),
            };
            let id = comment.id;
            graph.insert_comment(comment)?;
            let payload = json!({ "id": id, "case_id": case });
            Ok(Mutated::new(id).event("comment_created", payload))
        })
    }

    /// Authors delete their own comments; the case owner may delete any.
    pub fn delete_comment(
        &self,
        principal: &Principal,
        case: CaseId,
        comment: CommentId,
    ) -> Result<(), OpError> {
        let cell = self.require(principal, case, Role::View)?;
        let role = self.role_on_cell(principal, &cell)?;
        self.commit_case(&cell, principal, |graph| {
            let existing = graph
                .comment(comment)
                .ok_or(OpError::NotFound { what: "comment" })?;
            if existing.author != principal.id && role != Role::Owner {
                return Err(OpError::Forbidden {
                    required: Role::Owner,
                });
            }
            graph.delete_comment(comment);
            let payload = json!({ "id": comment, "case_id": case });
            Ok(Mutated::new(()).event("comment_deleted", payload))
        })
    }

    // =========================================================================
    // Reference checks
    // =========================================================================

    /// Require `id` to resolve to `expected` inside this graph. A live id
    /// from another case is an invariant violation, not a missing resource.
    fn expect_kind(
        &self,
        graph: &CaseGraph,
        id: ElementId,
        expected: ElementKind,
        child: ElementKind,
    ) -> Result<(), OpError> {
        match graph.kind_of(id) {
            Some(kind) if kind == expected => Ok(()),
            Some(kind) => Err(GraphError::WrongParentKind {
                kind: child,
                parent_kind: kind,
            }
            .into()),
            None => match self.case_of_element(id)? {
                Some(actual) => Err(GraphError::CrossCase {
                    id,
                    expected: graph.meta().id,
                    actual,
                }
                .into()),
                None => Err(OpError::NotFound { what: "element" }),
            },
        }
    }

    fn expect_claim_parent(
        &self,
        graph: &CaseGraph,
        parent: &ClaimParent,
    ) -> Result<(), OpError> {
        let expected = match parent {
            ClaimParent::Goal(_) => ElementKind::Goal,
            ClaimParent::Strategy(_) => ElementKind::Strategy,
            ClaimParent::Claim(_) => ElementKind::PropertyClaim,
        };
        self.expect_kind(graph, parent.id(), expected, ElementKind::PropertyClaim)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn missing(field: &str) -> OpError {
    OpError::Validation {
        field: field.to_string(),
        reason: "is required".to_string(),
    }
}

fn check_version(stored: u64, submitted: Option<u64>) -> Result<(), OpError> {
    match submitted {
        Some(v) if v != stored => Err(OpError::VersionConflict {
            stored,
            submitted: v,
        }),
        _ => Ok(()),
    }
}

fn summary_of(id: ElementId, kind: ElementKind, name: &ElementName) -> ElementSummary {
    ElementSummary {
        id,
        kind: kind.as_str().to_string(),
        name: name.to_string(),
        version: 1,
    }
}

fn validate_rename(
    graph: &CaseGraph,
    element: ElementId,
    kind: ElementKind,
    name: &ElementName,
) -> Result<(), OpError> {
    let expected = match kind {
        ElementKind::Goal => NamePrefix::Goal,
        ElementKind::Context => NamePrefix::Context,
        ElementKind::Strategy => NamePrefix::Strategy,
        ElementKind::PropertyClaim => NamePrefix::Claim,
        ElementKind::Evidence => NamePrefix::Evidence,
    };
    if name.prefix() != expected {
        return Err(OpError::Validation {
            field: "name".into(),
            reason: format!("a {kind} name must use the `{}` prefix", expected.letter()),
        });
    }
    if graph.name_in_use(kind, name, Some(element)) {
        return Err(GraphError::NameTaken {
            kind,
            id: element,
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

fn apply_element_patch(
    graph: &mut CaseGraph,
    element: ElementId,
    kind: ElementKind,
    patch: &ElementPatch,
    version: Option<u64>,
) -> Result<ElementSummary, OpError> {
    let mut out = None;
    match kind {
        ElementKind::Goal => graph.patch_goal(element, |goal| {
            out = Some(patch_common(
                &mut goal.name,
                &mut goal.short_desc,
                &mut goal.long_desc,
                &mut goal.version,
                patch,
                version,
            ));
            if let Patch::Set(keywords) = &patch.keywords {
                goal.keywords = keywords.clone();
            }
            if let Patch::Set(assumption) = patch.assumption {
                goal.assumption = assumption;
            }
        })?,
        ElementKind::Context => graph.patch_context(element, |context| {
            out = Some(patch_common(
                &mut context.name,
                &mut context.short_desc,
                &mut context.long_desc,
                &mut context.version,
                patch,
                version,
            ));
        })?,
        ElementKind::Strategy => graph.patch_strategy(element, |strategy| {
            out = Some(patch_common(
                &mut strategy.name,
                &mut strategy.short_desc,
                &mut strategy.long_desc,
                &mut strategy.version,
                patch,
                version,
            ));
            if let Patch::Set(assumption) = patch.assumption {
                strategy.assumption = assumption;
            }
            if let Patch::Set(justification) = patch.justification {
                strategy.justification = justification;
            }
        })?,
        ElementKind::PropertyClaim => graph.patch_claim(element, |claim| {
            out = Some(patch_common(
                &mut claim.name,
                &mut claim.short_desc,
                &mut claim.long_desc,
                &mut claim.version,
                patch,
                version,
            ));
            if let Patch::Set(assumption) = patch.assumption {
                claim.assumption = assumption;
            }
            if let Patch::Set(claim_type) = patch.claim_type {
                claim.claim_type = claim_type;
            }
        })?,
        ElementKind::Evidence => graph.patch_evidence(element, |evidence| {
            out = Some(patch_common(
                &mut evidence.name,
                &mut evidence.short_desc,
                &mut evidence.long_desc,
                &mut evidence.version,
                patch,
                version,
            ));
            match &patch.url {
                Patch::Set(url) => evidence.url = Some(url.clone()),
                Patch::Clear => evidence.url = None,
                Patch::Keep => {}
            }
        })?,
    }
    let checked = out.ok_or(OpError::NotFound { what: "element" })??;
    Ok(ElementSummary {
        id: element,
        kind: kind.as_str().to_string(),
        name: checked.0,
        version: checked.1,
    })
}

/// Shared fields: name, descriptions, version check + bump.
fn patch_common(
    name: &mut ElementName,
    short_desc: &mut String,
    long_desc: &mut String,
    version: &mut u64,
    patch: &ElementPatch,
    submitted: Option<u64>,
) -> Result<(String, u64), OpError> {
    check_version(*version, submitted)?;
    if let Patch::Set(new_name) = &patch.name {
        *name = new_name.clone();
    }
    if let Patch::Set(desc) = &patch.short_desc {
        *short_desc = desc.clone();
    }
    if let Patch::Set(desc) = &patch.long_desc {
        *long_desc = desc.clone();
    }
    *version += 1;
    Ok((name.to_string(), *version))
}

fn bump_and_summarize(
    graph: &mut CaseGraph,
    element: ElementId,
    kind: ElementKind,
) -> Result<ElementSummary, OpError> {
    let mut name = String::new();
    let mut version = 0;
    match kind {
        ElementKind::Goal => graph.patch_goal(element, |g| {
            g.version += 1;
            name = g.name.to_string();
            version = g.version;
        })?,
        ElementKind::Context => graph.patch_context(element, |c| {
            c.version += 1;
            name = c.name.to_string();
            version = c.version;
        })?,
        ElementKind::Strategy => graph.patch_strategy(element, |s| {
            s.version += 1;
            name = s.name.to_string();
            version = s.version;
        })?,
        ElementKind::PropertyClaim => graph.patch_claim(element, |c| {
            c.version += 1;
            name = c.name.to_string();
            version = c.version;
        })?,
        ElementKind::Evidence => graph.patch_evidence(element, |e| {
            e.version += 1;
            name = e.name.to_string();
            version = e.version;
        })?,
    }
    Ok(ElementSummary {
        id: element,
        kind: kind.as_str().to_string(),
        name,
        version,
    })
}

fn resolve_comment_target(
    case: CaseId,
    info: &CommentTargetInfo,
) -> Result<CommentTarget, OpError> {
    let mut targets: Vec<CommentTarget> = Vec::new();
    if info.case {
        targets.push(CommentTarget::Case(case));
    }
    if let Some(id) = info.goal_id {
        targets.push(CommentTarget::Goal(id));
    }
    if let Some(id) = info.context_id {
        targets.push(CommentTarget::Context(id));
    }
    if let Some(id) = info.strategy_id {
        targets.push(CommentTarget::Strategy(id));
    }
    if let Some(id) = info.property_claim_id {
        targets.push(CommentTarget::PropertyClaim(id));
    }
    if let Some(id) = info.evidence_id {
        targets.push(CommentTarget::Evidence(id));
    }
    match targets.len() {
        1 => Ok(targets.remove(0)),
        0 => Err(OpError::Validation {
            field: "target".into(),
            reason: "exactly one target is required".into(),
        }),
        _ => Err(OpError::Validation {
            field: "target".into(),
            reason: "more than one target given".into(),
        }),
    }
}

/// The deterministic rename plan for a whole case. Sandboxed nodes keep
/// their names; they are outside every identifier scope.
fn compute_renames(graph: &CaseGraph) -> Vec<(ElementId, ElementName)> {
    let mut renames: Vec<(ElementId, ElementName)> = Vec::new();
    let mut new_names: HashMap<ElementId, ElementName> = HashMap::new();

    for (i, goal) in graph.goal_ids().iter().enumerate() {
        renames.push((*goal, ElementName::new(NamePrefix::Goal, i as u32 + 1)));
    }

    for goal in graph.goal_ids() {
        for (i, context) in graph.contexts_of(*goal).iter().enumerate() {
            renames.push((*context, ElementName::new(NamePrefix::Context, i as u32 + 1)));
        }
        for (i, strategy) in graph.strategies_of(*goal).iter().enumerate() {
            renames.push((
                *strategy,
                ElementName::new(NamePrefix::Strategy, i as u32 + 1),
            ));
        }
    }

    // One P sequence across the case: each goal's direct claims, then the
    // claims of that goal's strategies. Sub-claims extend the parent name.
    let mut top_index = 0u32;
    let mut walk_order: Vec<ElementId> = Vec::new();
    let mut top_claims: Vec<ElementId> = Vec::new();
    for goal in graph.goal_ids() {
        top_claims.extend_from_slice(graph.claims_of_goal(*goal));
        for strategy in graph.strategies_of(*goal) {
            top_claims.extend_from_slice(graph.claims_of_strategy(*strategy));
        }
    }
    for root in top_claims {
        top_index += 1;
        let root_name = ElementName::new(NamePrefix::Claim, top_index);
        new_names.insert(root, root_name.clone());
        renames.push((root, root_name));
        walk_order.push(root);

        child_property_claims(graph, root, |index, child, parent| {
            let parent_name = new_names
                .get(&parent.id)
                .cloned()
                .unwrap_or_else(|| parent.name.clone());
            let child_name = parent_name.child(index as u32 + 1);
            new_names.insert(child.id, child_name.clone());
            renames.push((child.id, child_name));
            walk_order.push(child.id);
        });
    }

    // Evidence numbered in first-encounter order along the claim walk.
    let mut evidence_index = 0u32;
    let mut seen: HashSet<ElementId> = HashSet::new();
    for claim in walk_order {
        for evidence in graph.evidence_of_claim(claim) {
            if seen.insert(*evidence) {
                evidence_index += 1;
                renames.push((
                    *evidence,
                    ElementName::new(NamePrefix::Evidence, evidence_index),
                ));
            }
        }
    }

    renames
}

fn share_state_view(
    directory: &super::state::Directory,
    owner_username: &str,
    case: CaseId,
) -> ShareStateView {
    let members = |kind: ShareKind| -> Vec<String> {
        let name = canonical_group_name(owner_username, case, kind);
        directory
            .group_by_name(&name)
            .map(|group| {
                group
                    .members
                    .iter()
                    .map(|m| directory.username(*m))
                    .collect()
            })
            .unwrap_or_default()
    };
    ShareStateView {
        view: members(ShareKind::View),
        edit: members(ShareKind::Edit),
        review: members(ShareKind::Review),
    }
}
