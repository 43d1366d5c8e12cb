//! Subtree walks over property-claim hierarchies.
//!
//! Both walks are iterative; the no-cycle invariant bounds them, but deep
//! trees must not be able to blow the thread stack.

use super::element::PropertyClaim;
use super::graph::CaseGraph;
use super::identity::ElementId;

/// Depth-first walk of the sub-claims below `root`, children in insertion
/// order. The visitor receives `(sibling_index, child, parent)` for every
/// child edge.
pub fn child_property_claims<F>(graph: &CaseGraph, root: ElementId, mut visit: F)
where
    F: FnMut(usize, &PropertyClaim, &PropertyClaim),
{
    // Each frame is (parent, index of the next child to visit). Descending
    // right after visiting a child edge gives preorder.
    let mut stack = vec![(root, 0usize)];
    while let Some((parent_id, index)) = stack.pop() {
        let children = graph.sub_claims_of(parent_id);
        let Some(child_id) = children.get(index).copied() else {
            continue;
        };
        stack.push((parent_id, index + 1));
        if let (Ok(parent), Ok(child)) = (graph.claim(parent_id), graph.claim(child_id)) {
            visit(index, child, parent);
        }
        stack.push((child_id, 0));
    }
}

/// Case-wide claim enumeration: `(top_level, descendants)`.
///
/// Top-level claims are those attached directly under a goal or one of the
/// case's strategies, in case order. Descendants are every deeper claim,
/// returned sorted ascending by id.
pub fn case_property_claims(graph: &CaseGraph) -> (Vec<ElementId>, Vec<ElementId>) {
    let top_level = graph.top_level_claim_ids();

    let mut descendants = Vec::new();
    for root in &top_level {
        child_property_claims(graph, *root, |_, child, _| {
            descendants.push(child.id);
        });
    }
    descendants.sort();
    (top_level, descendants)
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::core::case::CaseMeta;
    use crate::core::element::{Attachment, ClaimParent, Goal};
    use crate::core::identity::{CaseId, ElementName, UserId};

    fn fixture() -> (CaseGraph, ElementId, Vec<ElementId>) {
        let mut graph = CaseGraph::new(CaseMeta::new(
            CaseId::generate(),
            "walks".into(),
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

        let mut ids = Vec::new();
        let root = new_claim("P1", ClaimParent::Goal(goal_id));
        let root_id = root.id;
        graph.insert_claim(root).expect("root");
        for (name, parent) in [
            ("P1.1", ClaimParent::Claim(root_id)),
            ("P1.2", ClaimParent::Claim(root_id)),
        ] {
            let claim = new_claim(name, parent);
            ids.push(claim.id);
            graph.insert_claim(claim).expect("child");
        }
        // Grandchild under the first child.
        let grand = new_claim("P1.1.1", ClaimParent::Claim(ids[0]));
        ids.push(grand.id);
        graph.insert_claim(grand).expect("grandchild");

        (graph, root_id, ids)
    }

    fn new_claim(name: &str, parent: ClaimParent) -> crate::core::element::PropertyClaim {
        crate::core::element::PropertyClaim {
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
    fn walk_is_depth_first_left_to_right() {
        let (graph, root, ids) = fixture();
        let mut seen = Vec::new();
        child_property_claims(&graph, root, |index, child, parent| {
            seen.push((index, child.id, parent.id));
        });
        // Preorder: P1.1, then its subtree (P1.1.1), then P1.2.
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (0, ids[0], root));
        assert_eq!(seen[1], (0, ids[2], ids[0]));
        assert_eq!(seen[2], (1, ids[1], root));
    }

    #[test]
    fn case_claims_split_top_level_from_descendants() {
        let (graph, root, ids) = fixture();
        let (top, descendants) = case_property_claims(&graph);
        assert_eq!(top, vec![root]);
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(descendants, expected);
    }
}
