//! Core capability errors (parsing, validation, graph invariants).
//!
//! These are bounded and stable: core errors represent domain/refusal states,
//! not library implementation details. The service layer maps them onto wire
//! error kinds; nothing in here knows about transports or status codes.

use thiserror::Error;

use crate::error::{Effect, Transience};

use super::identity::{CaseId, ElementId};

/// Invalid identifier string.
#[derive(Debug, Error, Clone)]
#[error("{kind} id `{raw}` is invalid: {reason}")]
pub struct InvalidId {
    pub kind: &'static str,
    pub raw: String,
    pub reason: String,
}

/// Invalid element name string.
#[derive(Debug, Error, Clone)]
#[error("element name `{raw}` is invalid: {reason}")]
pub struct InvalidName {
    pub raw: String,
    pub reason: String,
}

/// Element kind, as it appears in errors and payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Goal,
    Context,
    Strategy,
    PropertyClaim,
    Evidence,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Goal => "goal",
            ElementKind::Context => "context",
            ElementKind::Strategy => "strategy",
            ElementKind::PropertyClaim => "property_claim",
            ElementKind::Evidence => "evidence",
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A graph rule that would be broken by the attempted operation.
///
/// Variants mirror the structural invariants: single parent, no cycles,
/// level arithmetic, sandbox coherence, same-case evidence links, comment
/// target discipline, cascade rules.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum GraphError {
    #[error("unknown {kind} `{id}`")]
    UnknownElement { kind: ElementKind, id: ElementId },

    #[error("element `{id}` already exists")]
    DuplicateElement { id: ElementId },

    #[error("{kind} `{id}` is `{name}` but `{name}` is already taken in its scope")]
    NameTaken {
        kind: ElementKind,
        id: ElementId,
        name: String,
    },

    #[error("exactly one parent reference must be set")]
    AmbiguousParent,

    #[error("a claim cannot be its own parent (`{id}`)")]
    SelfParent { id: ElementId },

    #[error("attaching `{id}` under `{parent}` would create a cycle")]
    CycleDetected { id: ElementId, parent: ElementId },

    #[error("{kind} `{id}` is already detached")]
    AlreadyDetached { kind: ElementKind, id: ElementId },

    #[error("{kind} `{id}` is not in the sandbox; detach it first")]
    NotDetached { kind: ElementKind, id: ElementId },

    #[error("{kind} cannot attach to {parent_kind}")]
    WrongParentKind {
        kind: ElementKind,
        parent_kind: ElementKind,
    },

    #[error("element `{id}` belongs to case `{actual}`, not `{expected}`")]
    CrossCase {
        id: ElementId,
        expected: CaseId,
        actual: CaseId,
    },

    #[error("evidence `{evidence}` is not linked to claim `{claim}`")]
    LinkMissing {
        evidence: ElementId,
        claim: ElementId,
    },

    #[error("evidence `{evidence}` is already linked to claim `{claim}`")]
    LinkExists {
        evidence: ElementId,
        claim: ElementId,
    },

    #[error("comment target does not exist in this case")]
    CommentTargetMissing,
}

impl GraphError {
    /// True for the already-detached / not-detached state errors, which the
    /// wire maps to `state` (409) rather than `invariant` (400).
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            GraphError::AlreadyDetached { .. } | GraphError::NotDetached { .. }
        )
    }

    /// True for the cycle refusal, which the wire maps to `conflict` (409).
    pub fn is_conflict(&self) -> bool {
        matches!(self, GraphError::CycleDetected { .. })
    }
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    InvalidName(#[from] InvalidName),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure domain/input failures.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
