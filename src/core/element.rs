//! Graph elements.
//!
//! Goal, Context, Strategy, PropertyClaim, Evidence - the nodes of an
//! assurance case. Attachment state is a sum type: a node is either attached
//! to its parent or sandboxed against its case, never both, never neither.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::ElementKind;
use super::identity::{CaseId, ElementId, ElementName};

/// Visual shape tag carried in response payloads. No invariant reads this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Rectangle,
    RoundedRectangle,
    Cylinder,
}

/// Claim classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    #[default]
    System,
    Project,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Project => "project",
        }
    }
}

/// Where a property claim hangs when attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ClaimParent {
    Goal(ElementId),
    Strategy(ElementId),
    Claim(ElementId),
}

impl ClaimParent {
    pub fn id(&self) -> ElementId {
        match self {
            ClaimParent::Goal(id) | ClaimParent::Strategy(id) | ClaimParent::Claim(id) => *id,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            ClaimParent::Goal(_) => ElementKind::Goal,
            ClaimParent::Strategy(_) => ElementKind::Strategy,
            ClaimParent::Claim(_) => ElementKind::PropertyClaim,
        }
    }
}

/// Attachment state, generic over the parent reference kind.
///
/// `Attached` carries the parent; `Sandboxed` carries the owning case
/// explicitly. Exactly one is ever set, so the single-parent and sandbox
/// coherence invariants reduce to constructor discipline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Attachment<P> {
    Attached { parent: P },
    Sandboxed { case: CaseId },
}

impl<P> Attachment<P> {
    pub fn in_sandbox(&self) -> bool {
        matches!(self, Attachment::Sandboxed { .. })
    }

    pub fn parent(&self) -> Option<&P> {
        match self {
            Attachment::Attached { parent } => Some(parent),
            Attachment::Sandboxed { .. } => None,
        }
    }
}

/// Top-level normative goal. Owned directly by its case; never sandboxed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: ElementId,
    pub name: ElementName,
    pub short_desc: String,
    pub long_desc: String,
    pub keywords: String,
    pub assumption: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub version: u64,
}

/// Supporting factual information scoping a goal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub id: ElementId,
    pub name: ElementName,
    pub short_desc: String,
    pub long_desc: String,
    /// Goal the context scopes, or the case it is sandboxed against.
    pub attachment: Attachment<ElementId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub version: u64,
}

/// Decomposition pattern under a goal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: ElementId,
    pub name: ElementName,
    pub short_desc: String,
    pub long_desc: String,
    pub assumption: bool,
    pub justification: bool,
    /// Goal the strategy refines, or the case it is sandboxed against.
    pub attachment: Attachment<ElementId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub version: u64,
}

/// A verifiable assertion; refined by sub-claims or discharged by evidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyClaim {
    pub id: ElementId,
    pub name: ElementName,
    pub short_desc: String,
    pub long_desc: String,
    pub assumption: bool,
    pub claim_type: ClaimType,
    /// Depth in the claim hierarchy: 1 when the parent is a goal or
    /// strategy, `parent.level + 1` when the parent is another claim.
    pub level: u32,
    pub attachment: Attachment<ClaimParent>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub version: u64,
}

/// A reference substantiating one or more property claims.
///
/// Evidence has no single parent: it links to a set of claims of the same
/// case. It sits in the sandbox exactly while that set is empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: ElementId,
    pub name: ElementName,
    pub short_desc: String,
    pub long_desc: String,
    pub url: Option<String>,
    /// Linked claim ids, in link order.
    pub claims: Vec<ElementId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub version: u64,
}

impl Goal {
    pub fn shape(&self) -> Shape {
        Shape::Rectangle
    }
}

impl Context {
    pub fn in_sandbox(&self) -> bool {
        self.attachment.in_sandbox()
    }

    pub fn goal(&self) -> Option<ElementId> {
        self.attachment.parent().copied()
    }

    pub fn shape(&self) -> Shape {
        Shape::RoundedRectangle
    }
}

impl Strategy {
    pub fn in_sandbox(&self) -> bool {
        self.attachment.in_sandbox()
    }

    pub fn goal(&self) -> Option<ElementId> {
        self.attachment.parent().copied()
    }

    pub fn shape(&self) -> Shape {
        Shape::RoundedRectangle
    }
}

impl PropertyClaim {
    pub fn in_sandbox(&self) -> bool {
        self.attachment.in_sandbox()
    }

    pub fn parent(&self) -> Option<ClaimParent> {
        self.attachment.parent().copied()
    }

    pub fn shape(&self) -> Shape {
        Shape::Rectangle
    }
}

impl Evidence {
    pub fn in_sandbox(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn is_linked_to(&self, claim: ElementId) -> bool {
        self.claims.contains(&claim)
    }

    pub fn shape(&self) -> Shape {
        Shape::Cylinder
    }
}
