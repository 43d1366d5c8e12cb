//! Read operations: assembled views, listings, snapshots.

use serde_json::Value;

use crate::api::assemble::{assemble_case, assemble_element, assemble_sandbox};
use crate::api::view::{CaseSummary, CaseView, CommentView, SandboxView, SnapshotView};
use crate::core::graph::CaseGraph;
use crate::core::{CaseId, ElementId, Role, SnapshotId};

use super::ops::{CaseFilter, OpError};
use super::state::{Principal, Service};

impl Service {
    /// Assemble a graph into its nested view, resolving usernames through
    /// the directory. Lock order: the caller already holds the case lock.
    pub(super) fn assemble(&self, graph: &CaseGraph) -> CaseView {
        let usernames: std::collections::HashMap<_, _> = match self.directory() {
            Ok(directory) => graph
                .comment_ids()
                .iter()
                .filter_map(|id| graph.comment(*id))
                .map(|c| (c.author, directory.username(c.author)))
                .collect(),
            Err(_) => Default::default(),
        };
        assemble_case(graph, |user| {
            usernames
                .get(&user)
                .cloned()
                .unwrap_or_else(|| user.to_string())
        })
    }

    /// Fully assembled nested tree. Requires `view`.
    pub fn get_case(&self, principal: &Principal, case: CaseId) -> Result<CaseView, OpError> {
        let cell = self.require(principal, case, Role::View)?;
        let guard = cell.read()?;
        Ok(self.assemble(&guard))
    }

    /// The four sandbox lists. Requires `view`.
    pub fn sandbox_view(
        &self,
        principal: &Principal,
        case: CaseId,
    ) -> Result<SandboxView, OpError> {
        let cell = self.require(principal, case, Role::View)?;
        let guard = cell.read()?;
        Ok(assemble_sandbox(&guard))
    }

    /// Every case the caller can see, filtered. Cross-case listing takes no
    /// case lock beyond each cell's brief read.
    pub fn list_cases(
        &self,
        principal: &Principal,
        filter: CaseFilter,
    ) -> Result<Vec<CaseSummary>, OpError> {
        let mut out = Vec::new();
        for case in self.case_ids()? {
            let Ok(cell) = self.case_cell(case) else {
                continue;
            };
            let role = self.role_on_cell(principal, &cell)?;
            let keep = match filter {
                CaseFilter::All => role.can_read(),
                CaseFilter::Owner => role == Role::Owner,
                CaseFilter::Edit => role >= Role::Edit,
                CaseFilter::Review => role >= Role::Review,
                CaseFilter::View => role >= Role::View,
            };
            if !keep {
                continue;
            }
            let guard = cell.read()?;
            let meta = guard.meta();
            out.push(CaseSummary {
                id: meta.id,
                name: meta.name.clone(),
                description: meta.description.clone(),
                owner: meta.owner,
                published: meta.published,
                created_at: meta.created_at,
                role,
            });
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    /// One element, serialized the way it appears inside the case view.
    pub fn get_element(&self, principal: &Principal, element: ElementId) -> Result<Value, OpError> {
        let (_, cell) = self.require_for_element(principal, element, Role::View)?;
        let guard = cell.read()?;
        assemble_element(&guard, element).ok_or(OpError::NotFound { what: "element" })
    }

    pub fn list_comments(
        &self,
        principal: &Principal,
        case: CaseId,
    ) -> Result<Vec<CommentView>, OpError> {
        let cell = self.require(principal, case, Role::View)?;
        let guard = cell.read()?;
        Ok(self.assemble(&guard).comments)
    }

    /// A published snapshot. Published records are readable by any
    /// authenticated user.
    pub fn get_snapshot(
        &self,
        _principal: &Principal,
        id: SnapshotId,
    ) -> Result<SnapshotView, OpError> {
        Ok(self.snapshot(id)?.view())
    }

    pub fn list_snapshots(
        &self,
        principal: &Principal,
        case: CaseId,
    ) -> Result<Vec<SnapshotView>, OpError> {
        self.require(principal, case, Role::View)?;
        Ok(self
            .snapshots_of_case(case)?
            .iter()
            .map(|s| s.view())
            .collect())
    }
}
