//! Identifier allocation.
//!
//! Assigns the `name` field for new nodes. An allocation is parameterized by
//! a scope (the set over which names must be unique) and a prefix; the
//! candidate starts at the scope's cardinality after insertion and climbs
//! until it lands on a free name. No independent state: scopes are derived
//! from the graph on every call.

use std::collections::HashSet;

use super::error::ElementKind;
use super::graph::CaseGraph;
use super::identity::{ElementId, ElementName, NamePrefix};

/// Probe upward from `start` until `make(i)` is not in `taken`.
fn probe(
    taken: &HashSet<ElementName>,
    start: u32,
    make: impl Fn(u32) -> ElementName,
) -> ElementName {
    let mut candidate = start.max(1);
    loop {
        let name = make(candidate);
        if !taken.contains(&name) {
            return name;
        }
        candidate += 1;
    }
}

fn names_of(graph: &CaseGraph, ids: impl IntoIterator<Item = ElementId>) -> HashSet<ElementName> {
    ids.into_iter()
        .filter_map(|id| match graph.kind_of(id)? {
            ElementKind::Goal => graph.goal(id).ok().map(|g| g.name.clone()),
            ElementKind::Context => graph.context(id).ok().map(|c| c.name.clone()),
            ElementKind::Strategy => graph.strategy(id).ok().map(|s| s.name.clone()),
            ElementKind::PropertyClaim => graph.claim(id).ok().map(|c| c.name.clone()),
            ElementKind::Evidence => graph.evidence(id).ok().map(|e| e.name.clone()),
        })
        .collect()
}

/// Name for a new goal. Scope: the goals of the case.
pub fn next_goal_name(graph: &CaseGraph) -> ElementName {
    let taken = names_of(graph, graph.goal_ids().to_vec());
    probe(&taken, graph.goal_ids().len() as u32 + 1, |i| {
        ElementName::new(NamePrefix::Goal, i)
    })
}

/// Name for a new context. Scope: the contexts of its goal.
pub fn next_context_name(graph: &CaseGraph, goal: ElementId) -> ElementName {
    let scope = graph.contexts_of(goal).to_vec();
    let taken = names_of(graph, scope.iter().copied());
    probe(&taken, scope.len() as u32 + 1, |i| {
        ElementName::new(NamePrefix::Context, i)
    })
}

/// Name for a new strategy. Scope: the strategies of its goal.
pub fn next_strategy_name(graph: &CaseGraph, goal: ElementId) -> ElementName {
    let scope = graph.strategies_of(goal).to_vec();
    let taken = names_of(graph, scope.iter().copied());
    probe(&taken, scope.len() as u32 + 1, |i| {
        ElementName::new(NamePrefix::Strategy, i)
    })
}

/// Name for a new top-level claim. Scope: every claim directly under one of
/// the case's goals or strategies - one `P` sequence across the whole case.
pub fn next_top_claim_name(graph: &CaseGraph) -> ElementName {
    let scope = graph.top_level_claim_ids();
    let taken = names_of(graph, scope.iter().copied());
    probe(&taken, scope.len() as u32 + 1, |i| {
        ElementName::new(NamePrefix::Claim, i)
    })
}

/// Name for a new sub-claim of `parent`. Scope: the claims under `parent`;
/// prefix: the parent's dotted name.
pub fn next_sub_claim_name(graph: &CaseGraph, parent: ElementId) -> ElementName {
    let scope = graph.sub_claims_of(parent).to_vec();
    let taken = names_of(graph, scope.iter().copied());
    let parent_name = match graph.claim(parent) {
        Ok(claim) => claim.name.clone(),
        Err(_) => return ElementName::new(NamePrefix::Claim, 1),
    };
    probe(&taken, scope.len() as u32 + 1, |i| parent_name.child(i))
}

/// Name for new evidence. Scope: the evidence of the case.
pub fn next_evidence_name(graph: &CaseGraph) -> ElementName {
    let taken = names_of(graph, graph.evidence_ids().to_vec());
    probe(&taken, graph.evidence_ids().len() as u32 + 1, |i| {
        ElementName::new(NamePrefix::Evidence, i)
    })
}

/// Name for a node created directly in the sandbox. Sandboxed nodes are
/// outside every sibling scope, so probe over the whole case: a later
/// attach must not collide with an attached sibling's name.
pub fn next_casewide_name(graph: &CaseGraph, kind: ElementKind) -> ElementName {
    let prefix = match kind {
        ElementKind::Goal => NamePrefix::Goal,
        ElementKind::Context => NamePrefix::Context,
        ElementKind::Strategy => NamePrefix::Strategy,
        ElementKind::PropertyClaim => NamePrefix::Claim,
        ElementKind::Evidence => NamePrefix::Evidence,
    };
    let mut candidate = graph.count_of(kind) as u32 + 1;
    loop {
        let name = ElementName::new(prefix, candidate);
        if !graph.name_in_use(kind, &name, None) {
            return name;
        }
        candidate += 1;
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::core::case::CaseMeta;
    use crate::core::element::{Attachment, ClaimParent, Goal, PropertyClaim};
    use crate::core::identity::{CaseId, UserId};

    fn graph() -> CaseGraph {
        CaseGraph::new(CaseMeta::new(
            CaseId::generate(),
            "alloc".into(),
            String::new(),
            UserId::generate(),
        ))
    }

    fn add_goal(g: &mut CaseGraph, name: &str) -> ElementId {
        let goal = Goal {
            id: ElementId::generate(),
            name: ElementName::parse(name).expect("name"),
            short_desc: String::new(),
            long_desc: String::new(),
            keywords: String::new(),
            assumption: false,
            created_at: OffsetDateTime::now_utc(),
            version: 1,
        };
        let id = goal.id;
        g.insert_goal(goal).expect("goal");
        id
    }

    fn add_claim(g: &mut CaseGraph, name: &str, parent: ClaimParent) -> ElementId {
        let claim = PropertyClaim {
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
        };
        let id = claim.id;
        g.insert_claim(claim).expect("claim");
        id
    }

    #[test]
    fn first_goal_is_g1() {
        let g = graph();
        assert_eq!(next_goal_name(&g).to_string(), "G1");
    }

    #[test]
    fn probe_skips_taken_names() {
        let mut g = graph();
        // G2 occupies the slot the count-based candidate would pick.
        add_goal(&mut g, "G2");
        assert_eq!(next_goal_name(&g).to_string(), "G3");
    }

    #[test]
    fn top_claim_sequence_spans_goal_and_strategies() {
        let mut g = graph();
        let goal = add_goal(&mut g, "G1");
        let strategy = {
            let s = crate::core::element::Strategy {
                id: ElementId::generate(),
                name: ElementName::parse("S1").expect("name"),
                short_desc: String::new(),
                long_desc: String::new(),
                assumption: false,
                justification: false,
                attachment: Attachment::Attached { parent: goal },
                created_at: OffsetDateTime::now_utc(),
                version: 1,
            };
            let id = s.id;
            g.insert_strategy(s).expect("strategy");
            id
        };

        add_claim(&mut g, "P1", ClaimParent::Strategy(strategy));
        add_claim(&mut g, "P2", ClaimParent::Strategy(strategy));
        // A claim added directly under the goal continues the sequence.
        assert_eq!(next_top_claim_name(&g).to_string(), "P3");
    }

    #[test]
    fn sub_claim_names_extend_parent() {
        let mut g = graph();
        let goal = add_goal(&mut g, "G1");
        let parent = add_claim(&mut g, "P1", ClaimParent::Goal(goal));
        assert_eq!(next_sub_claim_name(&g, parent).to_string(), "P1.1");
        add_claim(&mut g, "P1.1", ClaimParent::Claim(parent));
        assert_eq!(next_sub_claim_name(&g, parent).to_string(), "P1.2");
    }
}
