//! Shared service state.
//!
//! The daemon owns every case graph behind a per-case `RwLock`: mutations
//! take the write lock, reads the shared lock, and cross-case operations are
//! limited to lock-free listing. The directory (users, groups) has its own
//! lock; lock order is always case -> directory -> store -> hub.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::api::realtime::WireMessage;
use crate::core::graph::CaseGraph;
use crate::core::{CaseId, ElementId, Group, GroupId, SnapshotId, Token, User, UserId};

use super::ops::OpError;
use super::publish::PublishedCase;
use super::store::{Loaded, Store};
use super::topic::{HubLimits, TopicHub};

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub username: String,
}

/// One case's graph behind its lock.
pub struct CaseCell {
    graph: RwLock<CaseGraph>,
}

impl CaseCell {
    fn new(graph: CaseGraph) -> Self {
        Self {
            graph: RwLock::new(graph),
        }
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, CaseGraph>, OpError> {
        self.graph.read().map_err(|_| OpError::Poisoned)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, CaseGraph>, OpError> {
        self.graph.write().map_err(|_| OpError::Poisoned)
    }
}

/// Users and groups, indexed for the lookups the gate and resolver need.
#[derive(Default)]
pub struct Directory {
    users: HashMap<UserId, User>,
    groups: HashMap<GroupId, Group>,
    by_token: HashMap<String, UserId>,
    by_email: HashMap<String, UserId>,
    by_username: HashMap<String, UserId>,
}

impl Directory {
    pub fn insert_user(&mut self, user: User) {
        self.by_token.insert(user.token.as_str().to_string(), user.id);
        self.by_email.insert(user.email.clone(), user.id);
        self.by_username.insert(user.username.clone(), user.id);
        self.users.insert(user.id, user);
    }

    pub fn insert_group(&mut self, group: Group) {
        self.groups.insert(group.id, group);
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn user_by_token(&self, token: &Token) -> Option<&User> {
        self.by_token.get(token.as_str()).and_then(|id| self.users.get(id))
    }

    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.by_email.get(email).and_then(|id| self.users.get(id))
    }

    pub fn user_by_username(&self, username: &str) -> Option<&User> {
        self.by_username.get(username).and_then(|id| self.users.get(id))
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(&id)
    }

    pub fn group_by_name(&self, name: &str) -> Option<&Group> {
        self.groups.values().find(|g| g.name == name)
    }

    /// Groups the user is a member of.
    pub fn groups_of(&self, user: UserId) -> BTreeSet<GroupId> {
        self.groups
            .values()
            .filter(|g| g.members.contains(&user))
            .map(|g| g.id)
            .collect()
    }

    pub fn username(&self, id: UserId) -> String {
        self.users
            .get(&id)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

struct Inner {
    store: Store,
    hub: TopicHub,
    cases: RwLock<HashMap<CaseId, Arc<CaseCell>>>,
    /// Element -> owning case, for routing node operations and for telling
    /// a cross-case reference apart from a dangling one.
    index: RwLock<HashMap<ElementId, CaseId>>,
    directory: RwLock<Directory>,
    snapshots: RwLock<HashMap<SnapshotId, Arc<PublishedCase>>>,
}

/// The assurance case service. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Service {
    inner: Arc<Inner>,
}

impl Service {
    pub fn open(path: &Path, limits: HubLimits) -> Result<Self, OpError> {
        Self::from_store(Store::open(path)?, limits)
    }

    /// Volatile service for tests.
    pub fn open_in_memory() -> Result<Self, OpError> {
        Self::from_store(Store::open_in_memory()?, HubLimits::default())
    }

    fn from_store(store: Store, limits: HubLimits) -> Result<Self, OpError> {
        let Loaded {
            users,
            groups,
            cases,
            snapshots,
        } = store.load_all()?;

        let mut directory = Directory::default();
        for user in users {
            directory.insert_user(user);
        }
        for group in groups {
            directory.insert_group(group);
        }

        let mut case_map = HashMap::new();
        let mut index = HashMap::new();
        for graph in cases {
            let case_id = graph.meta().id;
            index_case(&graph, &mut index);
            case_map.insert(case_id, Arc::new(CaseCell::new(graph)));
        }

        let snapshots = snapshots
            .into_iter()
            .map(|s| (s.id, Arc::new(s)))
            .collect();

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                hub: TopicHub::new(limits),
                cases: RwLock::new(case_map),
                index: RwLock::new(index),
                directory: RwLock::new(directory),
                snapshots: RwLock::new(snapshots),
            }),
        })
    }

    pub fn hub(&self) -> &TopicHub {
        &self.inner.hub
    }

    pub(super) fn store(&self) -> &Store {
        &self.inner.store
    }

    // =========================================================================
    // Case registry
    // =========================================================================

    pub fn case_cell(&self, case: CaseId) -> Result<Arc<CaseCell>, OpError> {
        let cases = self.inner.cases.read().map_err(|_| OpError::Poisoned)?;
        cases
            .get(&case)
            .cloned()
            .ok_or(OpError::NotFound { what: "case" })
    }

    pub fn case_ids(&self) -> Result<Vec<CaseId>, OpError> {
        let cases = self.inner.cases.read().map_err(|_| OpError::Poisoned)?;
        Ok(cases.keys().copied().collect())
    }

    pub(super) fn insert_case(&self, graph: CaseGraph) -> Result<Arc<CaseCell>, OpError> {
        let case_id = graph.meta().id;
        self.inner.store.persist_case(&graph)?;
        {
            let mut index = self.inner.index.write().map_err(|_| OpError::Poisoned)?;
            index_case(&graph, &mut index);
        }
        let cell = Arc::new(CaseCell::new(graph));
        let mut cases = self.inner.cases.write().map_err(|_| OpError::Poisoned)?;
        cases.insert(case_id, Arc::clone(&cell));
        Ok(cell)
    }

    pub(super) fn remove_case(&self, case: CaseId, origin: &Principal) -> Result<(), OpError> {
        let cell = {
            let mut cases = self.inner.cases.write().map_err(|_| OpError::Poisoned)?;
            cases.remove(&case)
        };
        if let Some(cell) = cell {
            // Wait out any in-flight mutation before dropping the rows.
            let graph = cell.write()?;
            self.inner.store.delete_case(case)?;
            let mut index = self.inner.index.write().map_err(|_| OpError::Poisoned)?;
            index.retain(|_, c| *c != case);
            drop(index);
            self.publish_change(case, origin, "case_deleted", Value::String(case.to_string()));
            drop(graph);
        }
        let _ = self.inner.hub.drop_topic(case);
        Ok(())
    }

    // =========================================================================
    // Element index
    // =========================================================================

    pub fn case_of_element(&self, id: ElementId) -> Result<Option<CaseId>, OpError> {
        let index = self.inner.index.read().map_err(|_| OpError::Poisoned)?;
        Ok(index.get(&id).copied())
    }

    pub(super) fn index_insert(&self, ids: &[ElementId], case: CaseId) -> Result<(), OpError> {
        let mut index = self.inner.index.write().map_err(|_| OpError::Poisoned)?;
        for id in ids {
            index.insert(*id, case);
        }
        Ok(())
    }

    pub(super) fn index_remove(&self, ids: &[ElementId]) -> Result<(), OpError> {
        let mut index = self.inner.index.write().map_err(|_| OpError::Poisoned)?;
        for id in ids {
            index.remove(id);
        }
        Ok(())
    }

    // =========================================================================
    // Directory
    // =========================================================================

    pub fn directory(&self) -> Result<RwLockReadGuard<'_, Directory>, OpError> {
        self.inner.directory.read().map_err(|_| OpError::Poisoned)
    }

    pub(super) fn directory_mut(&self) -> Result<RwLockWriteGuard<'_, Directory>, OpError> {
        self.inner.directory.write().map_err(|_| OpError::Poisoned)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn snapshot(&self, id: SnapshotId) -> Result<Arc<PublishedCase>, OpError> {
        let snapshots = self.inner.snapshots.read().map_err(|_| OpError::Poisoned)?;
        snapshots
            .get(&id)
            .cloned()
            .ok_or(OpError::NotFound { what: "snapshot" })
    }

    pub fn snapshots_of_case(&self, case: CaseId) -> Result<Vec<Arc<PublishedCase>>, OpError> {
        let snapshots = self.inner.snapshots.read().map_err(|_| OpError::Poisoned)?;
        let mut out: Vec<_> = snapshots
            .values()
            .filter(|s| s.case_id == case)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.created_at);
        Ok(out)
    }

    pub(super) fn insert_snapshot(&self, snapshot: PublishedCase) -> Result<(), OpError> {
        self.inner.store.save_snapshot(&snapshot)?;
        let mut snapshots = self.inner.snapshots.write().map_err(|_| OpError::Poisoned)?;
        snapshots.insert(snapshot.id, Arc::new(snapshot));
        Ok(())
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Broadcast a committed mutation to the case topic. Called while the
    /// case write lock is still held, so subscribers observe mutations in
    /// commit order.
    pub(super) fn publish_change(
        &self,
        case: CaseId,
        origin: &Principal,
        kind: &'static str,
        payload: Value,
    ) {
        let message = WireMessage::new(kind, payload).from_user(origin.id, &origin.username);
        if let Err(e) = self.inner.hub.publish(case, &message) {
            tracing::warn!(case = %case, error = %e, "change broadcast failed");
        }
    }
}

fn index_case(graph: &CaseGraph, index: &mut HashMap<ElementId, CaseId>) {
    let case = graph.meta().id;
    for id in graph.all_element_ids() {
        index.insert(id, case);
    }
}
