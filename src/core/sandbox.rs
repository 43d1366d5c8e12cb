//! Sandbox operations: detach a node from its parent while keeping case
//! membership, and attach it back under a new (or the old) parent.
//!
//! Detaching never orphans descendants: a strategy keeps its claims, a claim
//! keeps its sub-claims. Claim levels are recomputed on every move.

use super::element::{Attachment, ClaimParent};
use super::error::{ElementKind, GraphError};
use super::graph::CaseGraph;
use super::identity::ElementId;

impl CaseGraph {
    // =========================================================================
    // Context
    // =========================================================================

    pub fn detach_context(&mut self, id: ElementId) -> Result<(), GraphError> {
        let case = self.meta().id;
        let goal = match self.context(id)?.attachment {
            Attachment::Attached { parent } => parent,
            Attachment::Sandboxed { .. } => {
                return Err(GraphError::AlreadyDetached {
                    kind: ElementKind::Context,
                    id,
                });
            }
        };
        if let Some(context) = self.contexts_mut().get_mut(&id) {
            context.attachment = Attachment::Sandboxed { case };
        }
        self.detach_context_index(goal, id);
        Ok(())
    }

    pub fn attach_context(&mut self, id: ElementId, goal: ElementId) -> Result<(), GraphError> {
        if !self.context(id)?.in_sandbox() {
            return Err(GraphError::NotDetached {
                kind: ElementKind::Context,
                id,
            });
        }
        self.goal(goal)?;
        if let Some(context) = self.contexts_mut().get_mut(&id) {
            context.attachment = Attachment::Attached { parent: goal };
        }
        self.attach_context_index(goal, id);
        Ok(())
    }

    // =========================================================================
    // Strategy
    // =========================================================================

    /// Detach a strategy. Its property claims migrate with it: they stay
    /// attached to the strategy, which is now in the sandbox.
    pub fn detach_strategy(&mut self, id: ElementId) -> Result<(), GraphError> {
        let case = self.meta().id;
        let goal = match self.strategy(id)?.attachment {
            Attachment::Attached { parent } => parent,
            Attachment::Sandboxed { .. } => {
                return Err(GraphError::AlreadyDetached {
                    kind: ElementKind::Strategy,
                    id,
                });
            }
        };
        if let Some(strategy) = self.strategies_mut().get_mut(&id) {
            strategy.attachment = Attachment::Sandboxed { case };
        }
        self.detach_strategy_index(goal, id);
        Ok(())
    }

    pub fn attach_strategy(&mut self, id: ElementId, goal: ElementId) -> Result<(), GraphError> {
        if !self.strategy(id)?.in_sandbox() {
            return Err(GraphError::NotDetached {
                kind: ElementKind::Strategy,
                id,
            });
        }
        self.goal(goal)?;
        if let Some(strategy) = self.strategies_mut().get_mut(&id) {
            strategy.attachment = Attachment::Attached { parent: goal };
        }
        self.attach_strategy_index(goal, id);
        Ok(())
    }

    // =========================================================================
    // Property claim
    // =========================================================================

    pub fn detach_claim(&mut self, id: ElementId) -> Result<(), GraphError> {
        let case = self.meta().id;
        let parent = match self.claim(id)?.attachment {
            Attachment::Attached { parent } => parent,
            Attachment::Sandboxed { .. } => {
                return Err(GraphError::AlreadyDetached {
                    kind: ElementKind::PropertyClaim,
                    id,
                });
            }
        };
        if let Some(claim) = self.claims_mut().get_mut(&id) {
            claim.attachment = Attachment::Sandboxed { case };
        }
        self.detach_claim_index(&parent, id);
        self.recompute_levels(id, 1);
        Ok(())
    }

    /// Attach a sandboxed claim under a goal, strategy, or another claim.
    ///
    /// Refuses to create a parent edge from the claim's own subtree: the
    /// sandbox holds the whole subtree, so attaching under a descendant
    /// would close a cycle.
    pub fn attach_claim(&mut self, id: ElementId, parent: ClaimParent) -> Result<(), GraphError> {
        if !self.claim(id)?.in_sandbox() {
            return Err(GraphError::NotDetached {
                kind: ElementKind::PropertyClaim,
                id,
            });
        }
        if parent.id() == id {
            return Err(GraphError::SelfParent { id });
        }
        if let ClaimParent::Claim(parent_claim) = parent {
            if self.claim_subtree_contains(id, parent_claim) {
                return Err(GraphError::CycleDetected {
                    id,
                    parent: parent_claim,
                });
            }
        }
        let level = self.level_under(&parent)?;
        if let Some(claim) = self.claims_mut().get_mut(&id) {
            claim.attachment = Attachment::Attached { parent };
        }
        self.attach_claim_index(&parent, id);
        self.recompute_levels(id, level);
        Ok(())
    }

    /// Set `root`'s level and rewrite every descendant's level to match its
    /// depth. Iterative: the tree may be deep.
    fn recompute_levels(&mut self, root: ElementId, root_level: u32) {
        let mut stack = vec![(root, root_level)];
        while let Some((id, level)) = stack.pop() {
            if let Some(claim) = self.claims_mut().get_mut(&id) {
                claim.level = level;
            }
            for child in self.sub_claims_of(id).to_vec() {
                stack.push((child, level + 1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::core::case::CaseMeta;
    use crate::core::element::{Goal, PropertyClaim, Strategy};
    use crate::core::identity::{CaseId, ElementName, UserId};

    struct Fixture {
        graph: CaseGraph,
        goal: ElementId,
        strategy: ElementId,
        claim: ElementId,
        sub: ElementId,
    }

    fn fixture() -> Fixture {
        let mut graph = CaseGraph::new(CaseMeta::new(
            CaseId::generate(),
            "sandbox".into(),
            String::new(),
            UserId::generate(),
        ));
        let goal = Goal {
            id: ElementId::generate(),
            name: ElementName::parse("G1").expect("name"),
            short_desc: String::new(),
            long_desc: String::new(),
            keywords: String::new(),
            assumption: false,
            created_at: OffsetDateTime::now_utc(),
            version: 1,
        };
        let goal_id = goal.id;
        graph.insert_goal(goal).expect("goal");

        let strategy = Strategy {
            id: ElementId::generate(),
            name: ElementName::parse("S1").expect("name"),
            short_desc: String::new(),
            long_desc: String::new(),
            assumption: false,
            justification: false,
            attachment: Attachment::Attached { parent: goal_id },
            created_at: OffsetDateTime::now_utc(),
            version: 1,
        };
        let strategy_id = strategy.id;
        graph.insert_strategy(strategy).expect("strategy");

        let claim = new_claim("P1", ClaimParent::Strategy(strategy_id));
        let claim_id = claim.id;
        graph.insert_claim(claim).expect("claim");
        let sub = new_claim("P1.1", ClaimParent::Claim(claim_id));
        let sub_id = sub.id;
        graph.insert_claim(sub).expect("sub");

        Fixture {
            graph,
            goal: goal_id,
            strategy: strategy_id,
            claim: claim_id,
            sub: sub_id,
        }
    }

    fn new_claim(name: &str, parent: ClaimParent) -> PropertyClaim {
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

    #[test]
    fn detach_attach_claim_roundtrip() {
        let mut f = fixture();
        f.graph.detach_claim(f.claim).expect("detach");
        let claim = f.graph.claim(f.claim).expect("lookup");
        assert!(claim.in_sandbox());
        assert_eq!(claim.level, 1);
        // Sub-claims migrate with the detached parent.
        assert_eq!(f.graph.sub_claims_of(f.claim), [f.sub]);

        f.graph
            .attach_claim(f.claim, ClaimParent::Strategy(f.strategy))
            .expect("attach");
        let claim = f.graph.claim(f.claim).expect("lookup");
        assert!(!claim.in_sandbox());
        assert_eq!(f.graph.claims_of_strategy(f.strategy), [f.claim]);
        assert_eq!(f.graph.claim(f.sub).expect("sub").level, 2);
    }

    #[test]
    fn detach_twice_is_a_state_error() {
        let mut f = fixture();
        f.graph.detach_claim(f.claim).expect("detach");
        assert!(matches!(
            f.graph.detach_claim(f.claim),
            Err(GraphError::AlreadyDetached { .. })
        ));
    }

    #[test]
    fn attach_requires_sandbox() {
        let mut f = fixture();
        assert!(matches!(
            f.graph.attach_claim(f.claim, ClaimParent::Goal(f.goal)),
            Err(GraphError::NotDetached { .. })
        ));
    }

    #[test]
    fn attach_under_own_descendant_is_refused() {
        let mut f = fixture();
        f.graph.detach_claim(f.claim).expect("detach");
        assert!(matches!(
            f.graph.attach_claim(f.claim, ClaimParent::Claim(f.sub)),
            Err(GraphError::CycleDetected { .. })
        ));
        assert!(matches!(
            f.graph.attach_claim(f.claim, ClaimParent::Claim(f.claim)),
            Err(GraphError::SelfParent { .. })
        ));
    }

    #[test]
    fn detached_strategy_keeps_its_claims() {
        let mut f = fixture();
        f.graph.detach_strategy(f.strategy).expect("detach");
        let strategy = f.graph.strategy(f.strategy).expect("lookup");
        assert!(strategy.in_sandbox());
        assert_eq!(f.graph.claims_of_strategy(f.strategy), [f.claim]);
        let claim = f.graph.claim(f.claim).expect("claim");
        assert!(!claim.in_sandbox());

        f.graph.attach_strategy(f.strategy, f.goal).expect("attach");
        assert_eq!(f.graph.strategies_of(f.goal), [f.strategy]);
    }

    #[test]
    fn attach_claim_recomputes_level_from_claim_parent() {
        let mut f = fixture();
        let other = new_claim("P2", ClaimParent::Goal(f.goal));
        let other_id = other.id;
        f.graph.insert_claim(other).expect("other");

        f.graph.detach_claim(f.claim).expect("detach");
        f.graph
            .attach_claim(f.claim, ClaimParent::Claim(other_id))
            .expect("attach");
        assert_eq!(f.graph.claim(f.claim).expect("claim").level, 2);
        assert_eq!(f.graph.claim(f.sub).expect("sub").level, 3);
    }
}
