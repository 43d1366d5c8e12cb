//! The access gate.
//!
//! Every external entry point funnels through here: resolve the principal
//! from its token, load the target case, compute the role, compare against
//! the required level. An unknown token is `Unauthenticated`; an
//! authenticated caller short of the requirement is `Forbidden`. Nothing
//! else about the resource leaks either way.

use std::sync::Arc;

use crate::core::{CaseId, ElementId, Role, Token, resolve};

use super::ops::OpError;
use super::state::{CaseCell, Principal, Service};

impl Service {
    /// Resolve a token to its principal.
    pub fn authenticate(&self, token: &Token) -> Result<Principal, OpError> {
        let directory = self.directory()?;
        directory
            .user_by_token(token)
            .map(|user| Principal {
                id: user.id,
                username: user.username.clone(),
            })
            .ok_or(OpError::Unauthenticated)
    }

    /// The principal's role on a case.
    pub fn role_on(&self, principal: &Principal, case: CaseId) -> Result<Role, OpError> {
        let cell = self.case_cell(case)?;
        self.role_on_cell(principal, &cell)
    }

    pub(super) fn role_on_cell(
        &self,
        principal: &Principal,
        cell: &CaseCell,
    ) -> Result<Role, OpError> {
        let graph = cell.read()?;
        let meta = graph.meta().clone();
        drop(graph);
        let directory = self.directory()?;
        let member_of = directory.groups_of(principal.id);
        Ok(resolve(principal.id, &meta, &member_of))
    }

    /// Load the case and require at least `required` on it.
    pub(super) fn require(
        &self,
        principal: &Principal,
        case: CaseId,
        required: Role,
    ) -> Result<Arc<CaseCell>, OpError> {
        let cell = self.case_cell(case)?;
        let role = self.role_on_cell(principal, &cell)?;
        if role >= required {
            Ok(cell)
        } else {
            Err(OpError::Forbidden { required })
        }
    }

    /// Route an element id to its case and require a role there.
    pub(super) fn require_for_element(
        &self,
        principal: &Principal,
        element: ElementId,
        required: Role,
    ) -> Result<(CaseId, Arc<CaseCell>), OpError> {
        let case = self
            .case_of_element(element)?
            .ok_or(OpError::NotFound { what: "element" })?;
        let cell = self.require(principal, case, required)?;
        Ok((case, cell))
    }
}
