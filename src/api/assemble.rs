//! Case assembly: graph to nested view.

use crate::core::graph::CaseGraph;
use crate::core::{CommentTarget, Context, ElementId, ElementKind, Goal, Strategy, UserId};

use super::view::{
    CaseView, ClaimView, CommentView, ContextView, EvidenceView, GoalView, SandboxView,
    StrategyView,
};

/// Materialize the full nested projection of a case for a reader.
///
/// Attached nodes appear under their parents; sandboxed nodes appear only in
/// the parallel sandbox view.
pub fn assemble_case(graph: &CaseGraph, resolve_username: impl Fn(UserId) -> String) -> CaseView {
    let meta = graph.meta();
    let goals = graph
        .goal_ids()
        .iter()
        .filter_map(|id| graph.goal(*id).ok())
        .map(|goal| build_goal_view(graph, goal))
        .collect();

    let comments = graph
        .comment_ids()
        .iter()
        .filter_map(|id| graph.comment(*id))
        .map(|comment| CommentView {
            id: comment.id,
            author: comment.author,
            author_username: resolve_username(comment.author),
            target_kind: target_kind(&comment.target).to_string(),
            target_id: comment.target.element(),
            content: comment.content.clone(),
            created_at: comment.created_at,
        })
        .collect();

    CaseView {
        id: meta.id,
        name: meta.name.clone(),
        description: meta.description.clone(),
        owner: meta.owner,
        color_profile: meta.color_profile.clone(),
        lock_token: meta.lock_token.clone(),
        published: meta.published,
        published_at: meta.published_at,
        created_at: meta.created_at,
        version: meta.version,
        goals,
        sandbox: assemble_sandbox(graph),
        comments,
    }
}

/// The four sandbox lists; strategy and claim entries keep their subtrees.
pub fn assemble_sandbox(graph: &CaseGraph) -> SandboxView {
    let evidence = graph
        .evidence_ids()
        .iter()
        .filter_map(|id| graph.evidence(*id).ok())
        .filter(|evidence| evidence.in_sandbox())
        .filter_map(|evidence| build_evidence_view(graph, evidence.id))
        .collect();

    SandboxView {
        contexts: build_contexts(graph, graph.sandbox_context_ids()),
        strategies: build_strategies(graph, graph.sandbox_strategy_ids()),
        property_claims: build_claims(graph, graph.sandbox_claim_ids()),
        evidence,
    }
}

/// Serialized view of a single element, exactly as it appears inside the
/// assembled case view (strategies and claims keep their subtrees).
pub fn assemble_element(graph: &CaseGraph, id: ElementId) -> Option<serde_json::Value> {
    let kind = graph.kind_of(id)?;
    let value = match kind {
        ElementKind::Goal => {
            serde_json::to_value(build_goal_view(graph, graph.goal(id).ok()?))
        }
        ElementKind::Context => {
            serde_json::to_value(build_context_view(graph.context(id).ok()?))
        }
        ElementKind::Strategy => {
            serde_json::to_value(build_strategy_view(graph, graph.strategy(id).ok()?))
        }
        ElementKind::PropertyClaim => {
            serde_json::to_value(build_claim_view(graph, id)?)
        }
        ElementKind::Evidence => {
            serde_json::to_value(build_evidence_view(graph, id)?)
        }
    };
    value.ok()
}

fn build_goal_view(graph: &CaseGraph, goal: &Goal) -> GoalView {
    GoalView {
        id: goal.id,
        name: goal.name.clone(),
        short_desc: goal.short_desc.clone(),
        long_desc: goal.long_desc.clone(),
        keywords: goal.keywords.clone(),
        assumption: goal.assumption,
        shape: goal.shape(),
        version: goal.version,
        context: build_contexts(graph, graph.contexts_of(goal.id)),
        strategies: build_strategies(graph, graph.strategies_of(goal.id)),
        property_claims: build_claims(graph, graph.claims_of_goal(goal.id)),
    }
}

fn build_context_view(context: &Context) -> ContextView {
    ContextView {
        id: context.id,
        name: context.name.clone(),
        short_desc: context.short_desc.clone(),
        long_desc: context.long_desc.clone(),
        shape: context.shape(),
        version: context.version,
    }
}

fn build_strategy_view(graph: &CaseGraph, strategy: &Strategy) -> StrategyView {
    StrategyView {
        id: strategy.id,
        name: strategy.name.clone(),
        short_desc: strategy.short_desc.clone(),
        long_desc: strategy.long_desc.clone(),
        assumption: strategy.assumption,
        justification: strategy.justification,
        shape: strategy.shape(),
        version: strategy.version,
        property_claims: build_claims(graph, graph.claims_of_strategy(strategy.id)),
    }
}

fn build_contexts(graph: &CaseGraph, ids: &[ElementId]) -> Vec<ContextView> {
    ids.iter()
        .filter_map(|id| graph.context(*id).ok())
        .map(build_context_view)
        .collect()
}

fn build_strategies(graph: &CaseGraph, ids: &[ElementId]) -> Vec<StrategyView> {
    ids.iter()
        .filter_map(|id| graph.strategy(*id).ok())
        .map(|strategy| build_strategy_view(graph, strategy))
        .collect()
}

fn build_claims(graph: &CaseGraph, ids: &[ElementId]) -> Vec<ClaimView> {
    ids.iter()
        .filter_map(|id| build_claim_view(graph, *id))
        .collect()
}

fn build_claim_view(graph: &CaseGraph, id: ElementId) -> Option<ClaimView> {
    let claim = graph.claim(id).ok()?;
    Some(ClaimView {
        id: claim.id,
        name: claim.name.clone(),
        short_desc: claim.short_desc.clone(),
        long_desc: claim.long_desc.clone(),
        assumption: claim.assumption,
        claim_type: claim.claim_type,
        level: claim.level,
        shape: claim.shape(),
        version: claim.version,
        evidence: graph
            .evidence_of_claim(id)
            .iter()
            .filter_map(|e| build_evidence_view(graph, *e))
            .collect(),
        property_claims: build_claims(graph, graph.sub_claims_of(id)),
    })
}

fn build_evidence_view(graph: &CaseGraph, id: ElementId) -> Option<EvidenceView> {
    let evidence = graph.evidence(id).ok()?;
    Some(EvidenceView {
        id: evidence.id,
        name: evidence.name.clone(),
        short_desc: evidence.short_desc.clone(),
        long_desc: evidence.long_desc.clone(),
        url: evidence.url.clone(),
        shape: evidence.shape(),
        version: evidence.version,
        claims: evidence.claims.clone(),
    })
}

fn target_kind(target: &CommentTarget) -> &'static str {
    match target {
        CommentTarget::Case(_) => "case",
        CommentTarget::Goal(_) => "goal",
        CommentTarget::Context(_) => "context",
        CommentTarget::Strategy(_) => "strategy",
        CommentTarget::PropertyClaim(_) => "property_claim",
        CommentTarget::Evidence(_) => "evidence",
    }
}
