//! Operation inputs, patches, and the canonical operation error.
//!
//! Provides:
//! - `Patch<T>` - three-way patch enum (Keep, Clear, Set)
//! - `CasePatch` / `ElementPatch` - partial updates
//! - `NewElement` / `ParentInfo` - creation and attachment inputs
//! - `OpError` - the error every public operation fails with

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::{
    ClaimParent, ClaimType, ElementId, ElementKind, ElementName, GraphError, Role,
};
use crate::error::{Effect, Transience};

use super::store::StoreError;
use super::topic::TopicError;

// =============================================================================
// Patch<T> - Three-way field update
// =============================================================================

/// Three-way patch for updating a field.
///
/// The clean solution to the "Option<Option<T>>" problem for nullable
/// fields: absent = `Keep`, null = `Clear`, value = `Set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    /// Don't change the field.
    Keep,
    /// Clear the field (set to None).
    Clear,
    /// Set the field to a new value.
    Set(T),
}

// Manual impl: the derive would demand T: Default for no reason.
impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Keep => current,
            Patch::Clear => None,
            Patch::Set(v) => Some(v),
        }
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Patch::Keep | Patch::Clear => serializer.serialize_none(),
            Patch::Set(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Present and null -> Clear; present and value -> Set; absent is
        // handled by #[serde(default)] on the containing struct.
        let opt: Option<T> = Option::deserialize(deserializer)?;
        match opt {
            None => Ok(Patch::Clear),
            Some(v) => Ok(Patch::Set(v)),
        }
    }
}

// =============================================================================
// Case and element patches
// =============================================================================

/// Partial update for case metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CasePatch {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub name: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub description: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub color_profile: Patch<String>,

    /// Advisory whole-case lock; clear to release.
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub lock_token: Patch<String>,
}

impl CasePatch {
    pub fn validate(&self) -> Result<(), OpError> {
        if matches!(self.name, Patch::Clear) {
            return Err(OpError::Validation {
                field: "name".into(),
                reason: "cannot clear required field".into(),
            });
        }
        if let Patch::Set(name) = &self.name {
            if name.trim().is_empty() {
                return Err(OpError::Validation {
                    field: "name".into(),
                    reason: "must not be empty".into(),
                });
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_keep()
            && self.description.is_keep()
            && self.color_profile.is_keep()
            && self.lock_token.is_keep()
    }
}

/// Partial update for a graph element.
///
/// Fields that do not exist on the target kind are rejected at apply time;
/// parent references are never patchable (use detach/attach).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementPatch {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub name: Patch<ElementName>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub short_desc: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub long_desc: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub keywords: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub assumption: Patch<bool>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub justification: Patch<bool>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub claim_type: Patch<ClaimType>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub url: Patch<String>,
}

impl ElementPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_keep()
            && self.short_desc.is_keep()
            && self.long_desc.is_keep()
            && self.keywords.is_keep()
            && self.assumption.is_keep()
            && self.justification.is_keep()
            && self.claim_type.is_keep()
            && self.url.is_keep()
    }

    /// Error for a field set on a kind that does not carry it.
    pub fn reject_foreign(&self, kind: ElementKind) -> Result<(), OpError> {
        let foreign = |field: &'static str| OpError::Validation {
            field: field.into(),
            reason: format!("{kind} has no such field"),
        };
        if !self.keywords.is_keep() && kind != ElementKind::Goal {
            return Err(foreign("keywords"));
        }
        if !self.justification.is_keep() && kind != ElementKind::Strategy {
            return Err(foreign("justification"));
        }
        if !self.assumption.is_keep()
            && !matches!(
                kind,
                ElementKind::Goal | ElementKind::Strategy | ElementKind::PropertyClaim
            )
        {
            return Err(foreign("assumption"));
        }
        if !self.claim_type.is_keep() && kind != ElementKind::PropertyClaim {
            return Err(foreign("claim_type"));
        }
        if !self.url.is_keep() && kind != ElementKind::Evidence {
            return Err(foreign("url"));
        }
        Ok(())
    }
}

// =============================================================================
// Creation inputs and parent references
// =============================================================================

/// Wire shape of a parent reference: three optional ids, of which exactly
/// one may be set. Kind-specific resolution happens in the mutation service.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ParentInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_claim_id: Option<ElementId>,
}

impl ParentInfo {
    pub fn goal(id: ElementId) -> Self {
        Self {
            goal_id: Some(id),
            ..Self::default()
        }
    }

    pub fn strategy(id: ElementId) -> Self {
        Self {
            strategy_id: Some(id),
            ..Self::default()
        }
    }

    pub fn claim(id: ElementId) -> Self {
        Self {
            property_claim_id: Some(id),
            ..Self::default()
        }
    }

    fn set_count(&self) -> usize {
        [self.goal_id, self.strategy_id, self.property_claim_id]
            .iter()
            .filter(|o| o.is_some())
            .count()
    }

    /// Exactly one reference of any kind - a claim's parent.
    pub fn as_claim_parent(&self) -> Result<ClaimParent, OpError> {
        if self.set_count() > 1 {
            return Err(GraphError::AmbiguousParent.into());
        }
        if let Some(id) = self.goal_id {
            Ok(ClaimParent::Goal(id))
        } else if let Some(id) = self.strategy_id {
            Ok(ClaimParent::Strategy(id))
        } else if let Some(id) = self.property_claim_id {
            Ok(ClaimParent::Claim(id))
        } else {
            Err(OpError::Validation {
                field: "parent_info".into(),
                reason: "one of goal_id, strategy_id, property_claim_id is required".into(),
            })
        }
    }

    /// Exactly a goal reference - context/strategy parent.
    pub fn as_goal(&self) -> Result<ElementId, OpError> {
        if self.set_count() > 1 {
            return Err(GraphError::AmbiguousParent.into());
        }
        self.goal_id.ok_or_else(|| OpError::Validation {
            field: "parent_info".into(),
            reason: "goal_id is required".into(),
        })
    }

    /// Exactly a claim reference - evidence link target.
    pub fn as_claim(&self) -> Result<ElementId, OpError> {
        if self.set_count() > 1 {
            return Err(GraphError::AmbiguousParent.into());
        }
        self.property_claim_id.ok_or_else(|| OpError::Validation {
            field: "parent_info".into(),
            reason: "property_claim_id is required".into(),
        })
    }
}

/// Creation input for a new graph element.
///
/// A caller-supplied `name` is accepted and ignored: the allocator always
/// decides, so names stay consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NewElement {
    Goal {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        short_desc: String,
        #[serde(default)]
        long_desc: String,
        #[serde(default)]
        keywords: String,
        #[serde(default)]
        assumption: bool,
    },
    Context {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        goal_id: Option<ElementId>,
        #[serde(default)]
        short_desc: String,
        #[serde(default)]
        long_desc: String,
        #[serde(default)]
        in_sandbox: bool,
    },
    Strategy {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        goal_id: Option<ElementId>,
        #[serde(default)]
        short_desc: String,
        #[serde(default)]
        long_desc: String,
        #[serde(default)]
        assumption: bool,
        #[serde(default)]
        justification: bool,
        #[serde(default)]
        in_sandbox: bool,
    },
    PropertyClaim {
        #[serde(default)]
        name: Option<String>,
        #[serde(flatten)]
        parent: ParentInfo,
        #[serde(default)]
        short_desc: String,
        #[serde(default)]
        long_desc: String,
        #[serde(default)]
        assumption: bool,
        #[serde(default)]
        claim_type: ClaimType,
        #[serde(default)]
        in_sandbox: bool,
    },
    Evidence {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        property_claim_id: Option<ElementId>,
        #[serde(default)]
        short_desc: String,
        #[serde(default)]
        long_desc: String,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        in_sandbox: bool,
    },
}

impl NewElement {
    pub fn kind(&self) -> ElementKind {
        match self {
            NewElement::Goal { .. } => ElementKind::Goal,
            NewElement::Context { .. } => ElementKind::Context,
            NewElement::Strategy { .. } => ElementKind::Strategy,
            NewElement::PropertyClaim { .. } => ElementKind::PropertyClaim,
            NewElement::Evidence { .. } => ElementKind::Evidence,
        }
    }
}

/// One entry of a share batch: grant or revoke per permission kind.
/// `None` leaves that kind untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareEntry {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<bool>,
}

/// Case listing filter, mirroring the query parameters of the HTTP surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseFilter {
    /// Every case the caller can at least view.
    #[default]
    All,
    Owner,
    View,
    Edit,
    Review,
}

/// Wire shape of a comment target: a case or exactly one element id.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CommentTargetInfo {
    #[serde(default)]
    pub case: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_claim_id: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_id: Option<ElementId>,
}

// =============================================================================
// OpError - the canonical operation error
// =============================================================================

/// Error every public operation fails with. The IPC layer renders these
/// into wire payloads; nothing else leaks out.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("insufficient permission ({required} required)")]
    Forbidden { required: Role },

    #[error("{what} not found")]
    NotFound { what: &'static str },

    #[error("validation failed for `{field}`: {reason}")]
    Validation { field: String, reason: String },

    /// A graph rule would be broken (single parent, self-reference,
    /// cross-case link, ...).
    #[error(transparent)]
    Invariant(GraphError),

    #[error("version conflict: stored {stored}, submitted {submitted}")]
    VersionConflict { stored: u64, submitted: u64 },

    /// Attach refused: the target parent sits inside the node's own subtree.
    #[error(transparent)]
    Conflict(GraphError),

    /// Detaching an already-detached node and friends.
    #[error(transparent)]
    State(GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error("service state poisoned")]
    Poisoned,
}

impl From<GraphError> for OpError {
    fn from(e: GraphError) -> Self {
        if let GraphError::UnknownElement { kind, .. } = &e {
            return OpError::NotFound {
                what: kind.as_str(),
            };
        }
        if e.is_state_error() {
            OpError::State(e)
        } else if e.is_conflict() {
            OpError::Conflict(e)
        } else {
            OpError::Invariant(e)
        }
    }
}

impl OpError {
    pub fn code(&self) -> &'static str {
        match self {
            OpError::Unauthenticated => "unauthenticated",
            OpError::Forbidden { .. } => "forbidden",
            OpError::NotFound { .. } => "not_found",
            OpError::Validation { .. } => "validation",
            OpError::Invariant(_) => "invariant",
            OpError::VersionConflict { .. } | OpError::Conflict(_) => "conflict",
            OpError::State(_) => "state",
            OpError::Topic(TopicError::SubscriberLimitReached { .. }) => "overloaded",
            OpError::Store(_) | OpError::Topic(_) | OpError::Poisoned => "internal",
        }
    }

    pub fn transience(&self) -> Transience {
        match self {
            OpError::VersionConflict { .. } => Transience::Retryable,
            OpError::Topic(TopicError::SubscriberLimitReached { .. }) => Transience::Retryable,
            OpError::Store(e) => e.transience(),
            _ => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            OpError::Store(e) => e.effect(),
            _ => Effect::None,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        let details = match self {
            OpError::Validation { field, reason } => Some(serde_json::json!({
                "field": field,
                "reason": reason,
            })),
            OpError::VersionConflict { stored, submitted } => Some(serde_json::json!({
                "stored": stored,
                "submitted": submitted,
            })),
            _ => None,
        };
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            details,
            retryable: self.transience().is_retryable(),
        }
    }
}

/// Wire error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default)]
    pub retryable: bool,
}

impl ErrorPayload {
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: "parse_error".to_string(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: "internal".to_string(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_serde_three_way() {
        #[derive(Debug, Default, Serialize, Deserialize)]
        struct P {
            #[serde(default, skip_serializing_if = "Patch::is_keep")]
            url: Patch<String>,
        }

        let keep: P = serde_json::from_str("{}").expect("keep");
        assert!(keep.url.is_keep());
        let clear: P = serde_json::from_str(r#"{"url":null}"#).expect("clear");
        assert_eq!(clear.url, Patch::Clear);
        let set: P = serde_json::from_str(r#"{"url":"https://x"}"#).expect("set");
        assert_eq!(set.url, Patch::Set("https://x".into()));
    }

    #[test]
    fn parent_info_rejects_two_refs() {
        let both = ParentInfo {
            goal_id: Some(ElementId::generate()),
            strategy_id: Some(ElementId::generate()),
            property_claim_id: None,
        };
        assert!(matches!(
            both.as_claim_parent(),
            Err(OpError::Invariant(GraphError::AmbiguousParent))
        ));
    }

    #[test]
    fn parent_info_requires_a_ref() {
        let err = ParentInfo::default().as_claim_parent();
        assert!(matches!(err, Err(OpError::Validation { .. })));
    }

    #[test]
    fn foreign_fields_are_rejected() {
        let patch = ElementPatch {
            url: Patch::Set("https://x".into()),
            ..ElementPatch::default()
        };
        assert!(patch.reject_foreign(ElementKind::Evidence).is_ok());
        assert!(patch.reject_foreign(ElementKind::Goal).is_err());
    }
}
