//! Published snapshots.
//!
//! Publishing freezes the fully assembled tree into a separate immutable
//! record. Later edits to the live case never touch a snapshot.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api::view::{CaseView, SnapshotView};
use crate::core::{CaseId, SnapshotId};

/// Immutable published record of a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedCase {
    pub id: SnapshotId,
    pub case_id: CaseId,
    pub name: String,
    pub description: String,
    /// Hex sha256 of the canonical JSON tree; lets a reader verify the
    /// snapshot was not altered after publication.
    pub digest: String,
    pub tree: CaseView,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PublishedCase {
    pub fn freeze(tree: CaseView) -> Self {
        let digest = tree_digest(&tree);
        Self {
            id: SnapshotId::generate(),
            case_id: tree.id,
            name: tree.name.clone(),
            description: tree.description.clone(),
            digest,
            tree,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn view(&self) -> SnapshotView {
        SnapshotView {
            id: self.id,
            case_id: self.case_id,
            name: self.name.clone(),
            description: self.description.clone(),
            digest: self.digest.clone(),
            created_at: self.created_at,
            tree: self.tree.clone(),
        }
    }
}

fn tree_digest(tree: &CaseView) -> String {
    use sha2::{Digest, Sha256};

    let mut h = Sha256::new();
    match serde_json::to_vec(tree) {
        Ok(bytes) => h.update(&bytes),
        Err(_) => h.update(tree.id.to_string().as_bytes()),
    }
    let digest = h.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}
