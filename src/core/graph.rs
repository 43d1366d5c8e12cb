//! The case graph store.
//!
//! `CaseGraph` owns every element of one assurance case, keyed by id, plus
//! the reverse indices that give sibling order. The index vectors are the
//! source of truth for ordering: children appear in insertion order, which
//! is what traversal, identifier assignment, and the assembled view all use.
//!
//! Every mutating primitive revalidates the structural invariants and fails
//! with `GraphError` instead of committing a broken state. Scoping the graph
//! to a single case makes case membership structural: an id from another
//! case simply does not resolve here.

use std::collections::HashMap;

use super::case::CaseMeta;
use super::comment::{Comment, CommentTarget};
use super::element::{
    Attachment, ClaimParent, Context, Evidence, Goal, PropertyClaim, Strategy,
};
use super::error::{ElementKind, GraphError};
use super::identity::{CommentId, ElementId, ElementName};

/// In-memory projection of one case's graph.
#[derive(Clone, Debug)]
pub struct CaseGraph {
    meta: CaseMeta,

    goals: HashMap<ElementId, Goal>,
    contexts: HashMap<ElementId, Context>,
    strategies: HashMap<ElementId, Strategy>,
    claims: HashMap<ElementId, PropertyClaim>,
    evidence: HashMap<ElementId, Evidence>,
    comments: HashMap<CommentId, Comment>,

    goal_order: Vec<ElementId>,
    goal_contexts: HashMap<ElementId, Vec<ElementId>>,
    goal_strategies: HashMap<ElementId, Vec<ElementId>>,
    goal_claims: HashMap<ElementId, Vec<ElementId>>,
    strategy_claims: HashMap<ElementId, Vec<ElementId>>,
    claim_children: HashMap<ElementId, Vec<ElementId>>,
    claim_evidence: HashMap<ElementId, Vec<ElementId>>,
    evidence_order: Vec<ElementId>,

    sandbox_contexts: Vec<ElementId>,
    sandbox_strategies: Vec<ElementId>,
    sandbox_claims: Vec<ElementId>,

    comment_order: Vec<CommentId>,
}

impl CaseGraph {
    pub fn new(meta: CaseMeta) -> Self {
        Self {
            meta,
            goals: HashMap::new(),
            contexts: HashMap::new(),
            strategies: HashMap::new(),
            claims: HashMap::new(),
            evidence: HashMap::new(),
            comments: HashMap::new(),
            goal_order: Vec::new(),
            goal_contexts: HashMap::new(),
            goal_strategies: HashMap::new(),
            goal_claims: HashMap::new(),
            strategy_claims: HashMap::new(),
            claim_children: HashMap::new(),
            claim_evidence: HashMap::new(),
            evidence_order: Vec::new(),
            sandbox_contexts: Vec::new(),
            sandbox_strategies: Vec::new(),
            sandbox_claims: Vec::new(),
            comment_order: Vec::new(),
        }
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub fn meta(&self) -> &CaseMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut CaseMeta {
        &mut self.meta
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn kind_of(&self, id: ElementId) -> Option<ElementKind> {
        if self.goals.contains_key(&id) {
            Some(ElementKind::Goal)
        } else if self.contexts.contains_key(&id) {
            Some(ElementKind::Context)
        } else if self.strategies.contains_key(&id) {
            Some(ElementKind::Strategy)
        } else if self.claims.contains_key(&id) {
            Some(ElementKind::PropertyClaim)
        } else if self.evidence.contains_key(&id) {
            Some(ElementKind::Evidence)
        } else {
            None
        }
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.kind_of(id).is_some()
    }

    pub fn count_of(&self, kind: ElementKind) -> usize {
        match kind {
            ElementKind::Goal => self.goals.len(),
            ElementKind::Context => self.contexts.len(),
            ElementKind::Strategy => self.strategies.len(),
            ElementKind::PropertyClaim => self.claims.len(),
            ElementKind::Evidence => self.evidence.len(),
        }
    }

    /// Every element id in the case, in no particular order.
    pub fn all_element_ids(&self) -> Vec<ElementId> {
        self.goals
            .keys()
            .chain(self.contexts.keys())
            .chain(self.strategies.keys())
            .chain(self.claims.keys())
            .chain(self.evidence.keys())
            .copied()
            .collect()
    }

    pub fn goal(&self, id: ElementId) -> Result<&Goal, GraphError> {
        self.goals.get(&id).ok_or(GraphError::UnknownElement {
            kind: ElementKind::Goal,
            id,
        })
    }

    pub fn context(&self, id: ElementId) -> Result<&Context, GraphError> {
        self.contexts.get(&id).ok_or(GraphError::UnknownElement {
            kind: ElementKind::Context,
            id,
        })
    }

    pub fn strategy(&self, id: ElementId) -> Result<&Strategy, GraphError> {
        self.strategies.get(&id).ok_or(GraphError::UnknownElement {
            kind: ElementKind::Strategy,
            id,
        })
    }

    pub fn claim(&self, id: ElementId) -> Result<&PropertyClaim, GraphError> {
        self.claims.get(&id).ok_or(GraphError::UnknownElement {
            kind: ElementKind::PropertyClaim,
            id,
        })
    }

    pub fn evidence(&self, id: ElementId) -> Result<&Evidence, GraphError> {
        self.evidence.get(&id).ok_or(GraphError::UnknownElement {
            kind: ElementKind::Evidence,
            id,
        })
    }

    pub fn comment(&self, id: CommentId) -> Option<&Comment> {
        self.comments.get(&id)
    }

    // =========================================================================
    // Order and scope iteration
    // =========================================================================

    pub fn goal_ids(&self) -> &[ElementId] {
        &self.goal_order
    }

    pub fn contexts_of(&self, goal: ElementId) -> &[ElementId] {
        self.goal_contexts.get(&goal).map_or(&[], Vec::as_slice)
    }

    pub fn strategies_of(&self, goal: ElementId) -> &[ElementId] {
        self.goal_strategies.get(&goal).map_or(&[], Vec::as_slice)
    }

    pub fn claims_of_goal(&self, goal: ElementId) -> &[ElementId] {
        self.goal_claims.get(&goal).map_or(&[], Vec::as_slice)
    }

    pub fn claims_of_strategy(&self, strategy: ElementId) -> &[ElementId] {
        self.strategy_claims.get(&strategy).map_or(&[], Vec::as_slice)
    }

    pub fn sub_claims_of(&self, claim: ElementId) -> &[ElementId] {
        self.claim_children.get(&claim).map_or(&[], Vec::as_slice)
    }

    pub fn evidence_of_claim(&self, claim: ElementId) -> &[ElementId] {
        self.claim_evidence.get(&claim).map_or(&[], Vec::as_slice)
    }

    pub fn evidence_ids(&self) -> &[ElementId] {
        &self.evidence_order
    }

    pub fn sandbox_context_ids(&self) -> &[ElementId] {
        &self.sandbox_contexts
    }

    pub fn sandbox_strategy_ids(&self) -> &[ElementId] {
        &self.sandbox_strategies
    }

    pub fn sandbox_claim_ids(&self) -> &[ElementId] {
        &self.sandbox_claims
    }

    pub fn comment_ids(&self) -> &[CommentId] {
        &self.comment_order
    }

    /// All claims attached directly under a goal or a strategy, in the
    /// case-wide order: each goal's direct claims, then the claims of each
    /// of that goal's strategies, goal by goal.
    pub fn top_level_claim_ids(&self) -> Vec<ElementId> {
        let mut out = Vec::new();
        for goal in &self.goal_order {
            out.extend_from_slice(self.claims_of_goal(*goal));
            for strategy in self.strategies_of(*goal) {
                out.extend_from_slice(self.claims_of_strategy(*strategy));
            }
        }
        out
    }

    /// True if some element of `kind` (other than `exclude`) already carries
    /// `name`. Used by manual renames; the allocator works from scope sets.
    pub fn name_in_use(
        &self,
        kind: ElementKind,
        name: &ElementName,
        exclude: Option<ElementId>,
    ) -> bool {
        let taken = |id: &ElementId, n: &ElementName| Some(*id) != exclude && n == name;
        match kind {
            ElementKind::Goal => self.goals.values().any(|g| taken(&g.id, &g.name)),
            ElementKind::Context => self.contexts.values().any(|c| taken(&c.id, &c.name)),
            ElementKind::Strategy => self.strategies.values().any(|s| taken(&s.id, &s.name)),
            ElementKind::PropertyClaim => self.claims.values().any(|c| taken(&c.id, &c.name)),
            ElementKind::Evidence => self.evidence.values().any(|e| taken(&e.id, &e.name)),
        }
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    fn check_fresh(&self, id: ElementId) -> Result<(), GraphError> {
        if self.contains(id) {
            Err(GraphError::DuplicateElement { id })
        } else {
            Ok(())
        }
    }

    pub fn insert_goal(&mut self, goal: Goal) -> Result<(), GraphError> {
        self.check_fresh(goal.id)?;
        self.goal_order.push(goal.id);
        self.goals.insert(goal.id, goal);
        Ok(())
    }

    pub fn insert_context(&mut self, context: Context) -> Result<(), GraphError> {
        self.check_fresh(context.id)?;
        match context.attachment {
            Attachment::Attached { parent } => {
                self.goal(parent)?;
                self.goal_contexts.entry(parent).or_default().push(context.id);
            }
            Attachment::Sandboxed { .. } => self.sandbox_contexts.push(context.id),
        }
        self.contexts.insert(context.id, context);
        Ok(())
    }

    pub fn insert_strategy(&mut self, strategy: Strategy) -> Result<(), GraphError> {
        self.check_fresh(strategy.id)?;
        match strategy.attachment {
            Attachment::Attached { parent } => {
                self.goal(parent)?;
                self.goal_strategies
                    .entry(parent)
                    .or_default()
                    .push(strategy.id);
            }
            Attachment::Sandboxed { .. } => self.sandbox_strategies.push(strategy.id),
        }
        self.strategies.insert(strategy.id, strategy);
        Ok(())
    }

    /// Level the claim must carry under `parent` (invariant: level is
    /// 1 + parent level for claim parents, 1 otherwise).
    pub fn level_under(&self, parent: &ClaimParent) -> Result<u32, GraphError> {
        match parent {
            ClaimParent::Goal(id) => {
                self.goal(*id)?;
                Ok(1)
            }
            ClaimParent::Strategy(id) => {
                self.strategy(*id)?;
                Ok(1)
            }
            ClaimParent::Claim(id) => Ok(self.claim(*id)?.level + 1),
        }
    }

    /// Insert a claim. The stored level is recomputed from the parent; the
    /// graph, not the caller, is the authority on levels.
    pub fn insert_claim(&mut self, mut claim: PropertyClaim) -> Result<(), GraphError> {
        self.check_fresh(claim.id)?;
        match claim.attachment {
            Attachment::Attached { parent } => {
                if parent.id() == claim.id {
                    return Err(GraphError::SelfParent { id: claim.id });
                }
                claim.level = self.level_under(&parent)?;
                self.claim_index_mut(&parent).push(claim.id);
            }
            Attachment::Sandboxed { .. } => {
                claim.level = 1;
                self.sandbox_claims.push(claim.id);
            }
        }
        self.claims.insert(claim.id, claim);
        Ok(())
    }

    pub fn insert_evidence(&mut self, evidence: Evidence) -> Result<(), GraphError> {
        self.check_fresh(evidence.id)?;
        for claim in &evidence.claims {
            self.claim(*claim)?;
        }
        for claim in &evidence.claims {
            self.claim_evidence
                .entry(*claim)
                .or_default()
                .push(evidence.id);
        }
        self.evidence_order.push(evidence.id);
        self.evidence.insert(evidence.id, evidence);
        Ok(())
    }

    pub fn insert_comment(&mut self, comment: Comment) -> Result<(), GraphError> {
        match comment.target {
            CommentTarget::Case(case) => {
                if case != self.meta.id {
                    return Err(GraphError::CommentTargetMissing);
                }
            }
            CommentTarget::Goal(id) => {
                self.goal(id).map_err(|_| GraphError::CommentTargetMissing)?;
            }
            CommentTarget::Context(id) => {
                self.context(id)
                    .map_err(|_| GraphError::CommentTargetMissing)?;
            }
            CommentTarget::Strategy(id) => {
                self.strategy(id)
                    .map_err(|_| GraphError::CommentTargetMissing)?;
            }
            CommentTarget::PropertyClaim(id) => {
                self.claim(id).map_err(|_| GraphError::CommentTargetMissing)?;
            }
            CommentTarget::Evidence(id) => {
                self.evidence(id)
                    .map_err(|_| GraphError::CommentTargetMissing)?;
            }
        }
        self.comment_order.push(comment.id);
        self.comments.insert(comment.id, comment);
        Ok(())
    }

    fn claim_index_mut(&mut self, parent: &ClaimParent) -> &mut Vec<ElementId> {
        match parent {
            ClaimParent::Goal(id) => self.goal_claims.entry(*id).or_default(),
            ClaimParent::Strategy(id) => self.strategy_claims.entry(*id).or_default(),
            ClaimParent::Claim(id) => self.claim_children.entry(*id).or_default(),
        }
    }

    // =========================================================================
    // Field updates
    // =========================================================================

    // Patch closures must not touch attachment state; detach/attach are the
    // only operations that move a node.

    pub fn patch_goal(
        &mut self,
        id: ElementId,
        f: impl FnOnce(&mut Goal),
    ) -> Result<(), GraphError> {
        let goal = self.goals.get_mut(&id).ok_or(GraphError::UnknownElement {
            kind: ElementKind::Goal,
            id,
        })?;
        f(goal);
        Ok(())
    }

    pub fn patch_context(
        &mut self,
        id: ElementId,
        f: impl FnOnce(&mut Context),
    ) -> Result<(), GraphError> {
        let context = self.contexts.get_mut(&id).ok_or(GraphError::UnknownElement {
            kind: ElementKind::Context,
            id,
        })?;
        f(context);
        Ok(())
    }

    pub fn patch_strategy(
        &mut self,
        id: ElementId,
        f: impl FnOnce(&mut Strategy),
    ) -> Result<(), GraphError> {
        let strategy = self
            .strategies
            .get_mut(&id)
            .ok_or(GraphError::UnknownElement {
                kind: ElementKind::Strategy,
                id,
            })?;
        f(strategy);
        Ok(())
    }

    pub fn patch_claim(
        &mut self,
        id: ElementId,
        f: impl FnOnce(&mut PropertyClaim),
    ) -> Result<(), GraphError> {
        let claim = self.claims.get_mut(&id).ok_or(GraphError::UnknownElement {
            kind: ElementKind::PropertyClaim,
            id,
        })?;
        f(claim);
        Ok(())
    }

    pub fn patch_evidence(
        &mut self,
        id: ElementId,
        f: impl FnOnce(&mut Evidence),
    ) -> Result<(), GraphError> {
        let evidence = self.evidence.get_mut(&id).ok_or(GraphError::UnknownElement {
            kind: ElementKind::Evidence,
            id,
        })?;
        f(evidence);
        Ok(())
    }

    // =========================================================================
    // Evidence links
    // =========================================================================

    pub fn link_evidence(
        &mut self,
        evidence_id: ElementId,
        claim_id: ElementId,
    ) -> Result<(), GraphError> {
        self.claim(claim_id)?;
        let evidence = self
            .evidence
            .get_mut(&evidence_id)
            .ok_or(GraphError::UnknownElement {
                kind: ElementKind::Evidence,
                id: evidence_id,
            })?;
        if evidence.claims.contains(&claim_id) {
            return Err(GraphError::LinkExists {
                evidence: evidence_id,
                claim: claim_id,
            });
        }
        evidence.claims.push(claim_id);
        self.claim_evidence
            .entry(claim_id)
            .or_default()
            .push(evidence_id);
        Ok(())
    }

    /// Remove one evidence-claim link. The evidence element stays; it is in
    /// the sandbox exactly while its claim set is empty.
    pub fn unlink_evidence(
        &mut self,
        evidence_id: ElementId,
        claim_id: ElementId,
    ) -> Result<(), GraphError> {
        let evidence = self
            .evidence
            .get_mut(&evidence_id)
            .ok_or(GraphError::UnknownElement {
                kind: ElementKind::Evidence,
                id: evidence_id,
            })?;
        let Some(pos) = evidence.claims.iter().position(|c| *c == claim_id) else {
            return Err(GraphError::LinkMissing {
                evidence: evidence_id,
                claim: claim_id,
            });
        };
        evidence.claims.remove(pos);
        if let Some(index) = self.claim_evidence.get_mut(&claim_id) {
            index.retain(|e| *e != evidence_id);
        }
        Ok(())
    }

    // =========================================================================
    // Cycle guard
    // =========================================================================

    /// True if `candidate` is `root` or reachable from `root` through
    /// sub-claim edges. Iterative: claim trees can be deep.
    pub fn claim_subtree_contains(&self, root: ElementId, candidate: ElementId) -> bool {
        if root == candidate {
            return true;
        }
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for child in self.sub_claims_of(id) {
                if *child == candidate {
                    return true;
                }
                stack.push(*child);
            }
        }
        false
    }

    // =========================================================================
    // Deletion (cascade)
    // =========================================================================

    /// Delete a goal and every descendant reachable through parent edges.
    /// Evidence survives with reduced claim sets (it dies with the case).
    pub fn delete_goal(&mut self, id: ElementId) -> Result<Vec<ElementId>, GraphError> {
        self.goal(id)?;
        let mut deleted = Vec::new();
        for context in self.contexts_of(id).to_vec() {
            self.remove_context_entry(context);
            deleted.push(context);
        }
        for strategy in self.strategies_of(id).to_vec() {
            deleted.extend(self.delete_strategy_inner(strategy));
        }
        for claim in self.claims_of_goal(id).to_vec() {
            deleted.extend(self.delete_claim_subtree(claim));
        }
        self.goals.remove(&id);
        self.goal_order.retain(|g| *g != id);
        self.goal_contexts.remove(&id);
        self.goal_strategies.remove(&id);
        self.goal_claims.remove(&id);
        deleted.push(id);
        Ok(deleted)
    }

    pub fn delete_context(&mut self, id: ElementId) -> Result<Vec<ElementId>, GraphError> {
        let context = self.context(id)?;
        if let Some(goal) = context.goal() {
            if let Some(index) = self.goal_contexts.get_mut(&goal) {
                index.retain(|c| *c != id);
            }
        }
        self.remove_context_entry(id);
        Ok(vec![id])
    }

    pub fn delete_strategy(&mut self, id: ElementId) -> Result<Vec<ElementId>, GraphError> {
        let strategy = self.strategy(id)?;
        if let Some(goal) = strategy.goal() {
            if let Some(index) = self.goal_strategies.get_mut(&goal) {
                index.retain(|s| *s != id);
            }
        }
        Ok(self.delete_strategy_inner(id))
    }

    pub fn delete_claim(&mut self, id: ElementId) -> Result<Vec<ElementId>, GraphError> {
        let claim = self.claim(id)?;
        match claim.attachment {
            Attachment::Attached { parent } => {
                self.claim_index_mut(&parent).retain(|c| *c != id);
            }
            Attachment::Sandboxed { .. } => {
                self.sandbox_claims.retain(|c| *c != id);
            }
        }
        Ok(self.delete_claim_subtree(id))
    }

    pub fn delete_evidence(&mut self, id: ElementId) -> Result<Vec<ElementId>, GraphError> {
        let evidence = self.evidence(id)?;
        for claim in evidence.claims.clone() {
            if let Some(index) = self.claim_evidence.get_mut(&claim) {
                index.retain(|e| *e != id);
            }
        }
        self.evidence.remove(&id);
        self.evidence_order.retain(|e| *e != id);
        Ok(vec![id])
    }

    pub fn delete_comment(&mut self, id: CommentId) -> Option<Comment> {
        self.comment_order.retain(|c| *c != id);
        self.comments.remove(&id)
    }

    fn remove_context_entry(&mut self, id: ElementId) {
        self.contexts.remove(&id);
        self.sandbox_contexts.retain(|c| *c != id);
    }

    fn delete_strategy_inner(&mut self, id: ElementId) -> Vec<ElementId> {
        let mut deleted = Vec::new();
        for claim in self.claims_of_strategy(id).to_vec() {
            deleted.extend(self.delete_claim_subtree(claim));
        }
        self.strategies.remove(&id);
        self.sandbox_strategies.retain(|s| *s != id);
        self.strategy_claims.remove(&id);
        deleted.push(id);
        deleted
    }

    /// Remove a claim and its whole sub-claim subtree, unlinking evidence
    /// along the way. Assumes the parent index entry is already gone.
    fn delete_claim_subtree(&mut self, root: ElementId) -> Vec<ElementId> {
        let mut deleted = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            stack.extend(self.sub_claims_of(id).iter().copied());
            for evidence_id in self.evidence_of_claim(id).to_vec() {
                // Ignore a missing link: the evidence row is authoritative.
                let _ = self.unlink_evidence(evidence_id, id);
            }
            self.claim_evidence.remove(&id);
            self.claim_children.remove(&id);
            self.claims.remove(&id);
            deleted.push(id);
        }
        deleted
    }

    // =========================================================================
    // Attachment bookkeeping (used by the sandbox operations)
    // =========================================================================

    pub(super) fn contexts_mut(&mut self) -> &mut HashMap<ElementId, Context> {
        &mut self.contexts
    }

    pub(super) fn strategies_mut(&mut self) -> &mut HashMap<ElementId, Strategy> {
        &mut self.strategies
    }

    pub(super) fn claims_mut(&mut self) -> &mut HashMap<ElementId, PropertyClaim> {
        &mut self.claims
    }

    pub(super) fn detach_context_index(&mut self, goal: ElementId, id: ElementId) {
        if let Some(index) = self.goal_contexts.get_mut(&goal) {
            index.retain(|c| *c != id);
        }
        self.sandbox_contexts.push(id);
    }

    pub(super) fn attach_context_index(&mut self, goal: ElementId, id: ElementId) {
        self.sandbox_contexts.retain(|c| *c != id);
        self.goal_contexts.entry(goal).or_default().push(id);
    }

    pub(super) fn detach_strategy_index(&mut self, goal: ElementId, id: ElementId) {
        if let Some(index) = self.goal_strategies.get_mut(&goal) {
            index.retain(|s| *s != id);
        }
        self.sandbox_strategies.push(id);
    }

    pub(super) fn attach_strategy_index(&mut self, goal: ElementId, id: ElementId) {
        self.sandbox_strategies.retain(|s| *s != id);
        self.goal_strategies.entry(goal).or_default().push(id);
    }

    pub(super) fn detach_claim_index(&mut self, parent: &ClaimParent, id: ElementId) {
        self.claim_index_mut(parent).retain(|c| *c != id);
        self.sandbox_claims.push(id);
    }

    pub(super) fn attach_claim_index(&mut self, parent: &ClaimParent, id: ElementId) {
        self.sandbox_claims.retain(|c| *c != id);
        self.claim_index_mut(parent).push(id);
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::core::identity::{CaseId, ElementName, UserId};

    fn graph() -> CaseGraph {
        CaseGraph::new(CaseMeta::new(
            CaseId::generate(),
            "test case".into(),
            String::new(),
            UserId::generate(),
        ))
    }

    fn goal(name: &str) -> Goal {
        Goal {
            id: ElementId::generate(),
            name: ElementName::parse(name).expect("name"),
            short_desc: String::new(),
            long_desc: String::new(),
            keywords: String::new(),
            assumption: false,
            created_at: OffsetDateTime::now_utc(),
            version: 1,
        }
    }

    fn claim(name: &str, parent: ClaimParent) -> PropertyClaim {
        PropertyClaim {
            id: ElementId::generate(),
            name: ElementName::parse(name).expect("name"),
            short_desc: String::new(),
            long_desc: String::new(),
            assumption: false,
            claim_type: Default::default(),
            level: 0,
            attachment: Attachment::Attached { parent },
            created_at: OffsetDateTime::now_utc(),
            version: 1,
        }
    }

    fn evidence(name: &str, claims: Vec<ElementId>) -> Evidence {
        Evidence {
            id: ElementId::generate(),
            name: ElementName::parse(name).expect("name"),
            short_desc: String::new(),
            long_desc: String::new(),
            url: None,
            claims,
            created_at: OffsetDateTime::now_utc(),
            version: 1,
        }
    }

    #[test]
    fn insert_recomputes_levels() {
        let mut g = graph();
        let root = goal("G1");
        let root_id = root.id;
        g.insert_goal(root).expect("goal");

        let mut top = claim("P1", ClaimParent::Goal(root_id));
        top.level = 99;
        let top_id = top.id;
        g.insert_claim(top).expect("claim");
        assert_eq!(g.claim(top_id).expect("lookup").level, 1);

        let sub = claim("P1.1", ClaimParent::Claim(top_id));
        let sub_id = sub.id;
        g.insert_claim(sub).expect("sub claim");
        assert_eq!(g.claim(sub_id).expect("lookup").level, 2);
    }

    #[test]
    fn claim_under_unknown_parent_is_rejected() {
        let mut g = graph();
        let c = claim("P1", ClaimParent::Goal(ElementId::generate()));
        assert!(matches!(
            g.insert_claim(c),
            Err(GraphError::UnknownElement { .. })
        ));
    }

    #[test]
    fn delete_goal_cascades_but_spares_evidence() {
        let mut g = graph();
        let root = goal("G1");
        let root_id = root.id;
        g.insert_goal(root).expect("goal");

        let top = claim("P1", ClaimParent::Goal(root_id));
        let top_id = top.id;
        g.insert_claim(top).expect("claim");
        let sub = claim("P1.1", ClaimParent::Claim(top_id));
        let sub_id = sub.id;
        g.insert_claim(sub).expect("sub");

        let ev = evidence("E1", vec![sub_id]);
        let ev_id = ev.id;
        g.insert_evidence(ev).expect("evidence");

        let deleted = g.delete_goal(root_id).expect("delete");
        assert!(deleted.contains(&top_id));
        assert!(deleted.contains(&sub_id));
        assert!(deleted.contains(&root_id));
        assert!(!deleted.contains(&ev_id));

        // Evidence survives with an empty claim set: sandboxed.
        let survivor = g.evidence(ev_id).expect("evidence survives");
        assert!(survivor.in_sandbox());
    }

    #[test]
    fn subtree_containment_is_transitive() {
        let mut g = graph();
        let root = goal("G1");
        let root_id = root.id;
        g.insert_goal(root).expect("goal");
        let a = claim("P1", ClaimParent::Goal(root_id));
        let a_id = a.id;
        g.insert_claim(a).expect("a");
        let b = claim("P1.1", ClaimParent::Claim(a_id));
        let b_id = b.id;
        g.insert_claim(b).expect("b");
        let c = claim("P1.1.1", ClaimParent::Claim(b_id));
        let c_id = c.id;
        g.insert_claim(c).expect("c");

        assert!(g.claim_subtree_contains(a_id, c_id));
        assert!(g.claim_subtree_contains(a_id, a_id));
        assert!(!g.claim_subtree_contains(c_id, a_id));
    }

    #[test]
    fn evidence_link_roundtrip() {
        let mut g = graph();
        let root = goal("G1");
        let root_id = root.id;
        g.insert_goal(root).expect("goal");
        let top = claim("P1", ClaimParent::Goal(root_id));
        let top_id = top.id;
        g.insert_claim(top).expect("claim");

        let ev = evidence("E1", vec![top_id]);
        let ev_id = ev.id;
        g.insert_evidence(ev).expect("evidence");

        assert!(matches!(
            g.link_evidence(ev_id, top_id),
            Err(GraphError::LinkExists { .. })
        ));
        g.unlink_evidence(ev_id, top_id).expect("unlink");
        assert!(g.evidence(ev_id).expect("lookup").in_sandbox());
        assert!(matches!(
            g.unlink_evidence(ev_id, top_id),
            Err(GraphError::LinkMissing { .. })
        ));
    }
}
