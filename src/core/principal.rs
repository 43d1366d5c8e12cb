//! Users and groups.
//!
//! Ordinary flat records. Group membership is the only structure the
//! permission resolver reads.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::identity::{GroupId, Token, UserId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Credential the gate resolves to this user. Rotatable; never logged.
    pub token: Token,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub owner: UserId,
    pub members: BTreeSet<UserId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Group {
    pub fn new(name: String, owner: UserId) -> Self {
        Self {
            id: GroupId::generate(),
            name,
            owner,
            members: BTreeSet::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}
