//! SQLite persistence.
//!
//! One table per entity, parent references as nullable foreign keys, a link
//! table for evidence-claim associations, all timestamps UTC. The store is
//! write-through: a committed mutation rewrites the case's rows inside one
//! transaction, so the on-disk graph is always a committed state.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Row, params};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::graph::CaseGraph;
use crate::core::{
    Attachment, CaseId, CaseMeta, ClaimParent, ClaimType, Comment, CommentId, CommentTarget,
    Context, ElementId, ElementName, Evidence, Goal, Group, GroupId, PropertyClaim, ShareKind,
    SnapshotId, Strategy, Token, User, UserId,
};
use crate::error::{Effect, Transience};

use super::publish::PublishedCase;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    token TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    owner TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS group_members (
    group_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    PRIMARY KEY (group_id, user_id)
);
CREATE TABLE IF NOT EXISTS cases (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    owner TEXT,
    color_profile TEXT NOT NULL,
    lock_token TEXT,
    published INTEGER NOT NULL,
    published_at TEXT,
    created_at TEXT NOT NULL,
    version INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS case_groups (
    case_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    group_id TEXT NOT NULL,
    PRIMARY KEY (case_id, kind, group_id)
);
CREATE TABLE IF NOT EXISTS goals (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    name TEXT NOT NULL,
    short_desc TEXT NOT NULL,
    long_desc TEXT NOT NULL,
    keywords TEXT NOT NULL,
    assumption INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    version INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS contexts (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    name TEXT NOT NULL,
    short_desc TEXT NOT NULL,
    long_desc TEXT NOT NULL,
    goal_id TEXT,
    created_at TEXT NOT NULL,
    version INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS strategies (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    name TEXT NOT NULL,
    short_desc TEXT NOT NULL,
    long_desc TEXT NOT NULL,
    assumption INTEGER NOT NULL,
    justification INTEGER NOT NULL,
    goal_id TEXT,
    created_at TEXT NOT NULL,
    version INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS property_claims (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    name TEXT NOT NULL,
    short_desc TEXT NOT NULL,
    long_desc TEXT NOT NULL,
    assumption INTEGER NOT NULL,
    claim_type TEXT NOT NULL,
    level INTEGER NOT NULL,
    parent_kind TEXT,
    parent_id TEXT,
    created_at TEXT NOT NULL,
    version INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS evidence (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    name TEXT NOT NULL,
    short_desc TEXT NOT NULL,
    long_desc TEXT NOT NULL,
    url TEXT,
    created_at TEXT NOT NULL,
    version INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS evidence_claims (
    evidence_id TEXT NOT NULL,
    claim_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    PRIMARY KEY (evidence_id, claim_id)
);
CREATE TABLE IF NOT EXISTS comments (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    author TEXT NOT NULL,
    target_kind TEXT NOT NULL,
    target_id TEXT,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS snapshots (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    digest TEXT NOT NULL,
    tree TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("failed to open store at `{path}`: {reason}")]
    Open { path: String, reason: String },

    #[error("sql failure: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("stored data is corrupt: {reason}")]
    Corrupt { reason: String },

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn transience(&self) -> Transience {
        match self {
            StoreError::Sql(_) => Transience::Unknown,
            _ => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            StoreError::Sql(_) => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

/// Everything the service loads at startup.
pub struct Loaded {
    pub users: Vec<User>,
    pub groups: Vec<Group>,
    pub cases: Vec<CaseGraph>,
    pub snapshots: Vec<PublishedCase>,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::init(conn)
    }

    /// Volatile store for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: ":memory:".to_string(),
            reason: e.to_string(),
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .ok();
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // =========================================================================
    // Users / groups
    // =========================================================================

    pub fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO users (id, username, email, token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.to_string(),
                user.username,
                user.email,
                user.token.as_str(),
                fmt_ts(&user.created_at)?,
            ],
        )?;
        Ok(())
    }

    pub fn save_group(&self, group: &Group) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO groups (id, name, owner, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                group.id.to_string(),
                group.name,
                group.owner.to_string(),
                fmt_ts(&group.created_at)?,
            ],
        )?;
        tx.execute(
            "DELETE FROM group_members WHERE group_id = ?1",
            params![group.id.to_string()],
        )?;
        for member in &group.members {
            tx.execute(
                "INSERT INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                params![group.id.to_string(), member.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Cases
    // =========================================================================

    /// Rewrite every row of one case inside a single transaction.
    pub fn persist_case(&self, graph: &CaseGraph) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let meta = graph.meta();
        let case_id = meta.id.to_string();

        tx.execute(
            "INSERT OR REPLACE INTO cases
             (id, name, description, owner, color_profile, lock_token,
              published, published_at, created_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                case_id,
                meta.name,
                meta.description,
                meta.owner.map(|o| o.to_string()),
                meta.color_profile,
                meta.lock_token,
                meta.published as i64,
                meta.published_at.as_ref().map(fmt_ts).transpose()?,
                fmt_ts(&meta.created_at)?,
                meta.version as i64,
            ],
        )?;

        for table in [
            "case_groups",
            "goals",
            "contexts",
            "strategies",
            "property_claims",
            "evidence",
            "comments",
        ] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE case_id = ?1"),
                params![case_id],
            )?;
        }
        tx.execute(
            "DELETE FROM evidence_claims WHERE evidence_id NOT IN (SELECT id FROM evidence)",
            [],
        )?;

        for (kind, groups) in [
            (ShareKind::Edit, &meta.edit_groups),
            (ShareKind::View, &meta.view_groups),
            (ShareKind::Review, &meta.review_groups),
        ] {
            for group in groups {
                tx.execute(
                    "INSERT INTO case_groups (case_id, kind, group_id) VALUES (?1, ?2, ?3)",
                    params![case_id, kind.as_str(), group.to_string()],
                )?;
            }
        }

        let mut seq: i64 = 0;
        for goal_id in graph.goal_ids() {
            let goal = graph.goal(*goal_id).map_err(corrupt)?;
            seq += 1;
            tx.execute(
                "INSERT INTO goals
                 (id, case_id, seq, name, short_desc, long_desc, keywords,
                  assumption, created_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    goal.id.to_string(),
                    case_id,
                    seq,
                    goal.name.to_string(),
                    goal.short_desc,
                    goal.long_desc,
                    goal.keywords,
                    goal.assumption as i64,
                    fmt_ts(&goal.created_at)?,
                    goal.version as i64,
                ],
            )?;
        }

        let mut context_ids: Vec<ElementId> = Vec::new();
        let mut strategy_ids: Vec<ElementId> = Vec::new();
        let mut claim_ids: Vec<ElementId> = Vec::new();
        for goal_id in graph.goal_ids() {
            context_ids.extend_from_slice(graph.contexts_of(*goal_id));
            strategy_ids.extend_from_slice(graph.strategies_of(*goal_id));
        }
        context_ids.extend_from_slice(graph.sandbox_context_ids());
        strategy_ids.extend_from_slice(graph.sandbox_strategy_ids());

        // Claims in tree order: attached roots and their subtrees, then the
        // sandboxed subtrees. Level ordering falls out for free, so reload
        // can insert parents before children.
        for goal_id in graph.goal_ids() {
            for claim in graph.claims_of_goal(*goal_id) {
                push_claim_subtree(graph, *claim, &mut claim_ids);
            }
        }
        for strategy_id in &strategy_ids {
            for claim in graph.claims_of_strategy(*strategy_id) {
                push_claim_subtree(graph, *claim, &mut claim_ids);
            }
        }
        for claim in graph.sandbox_claim_ids() {
            push_claim_subtree(graph, *claim, &mut claim_ids);
        }

        for (seq, id) in context_ids.iter().enumerate() {
            let context = graph.context(*id).map_err(corrupt)?;
            tx.execute(
                "INSERT INTO contexts
                 (id, case_id, seq, name, short_desc, long_desc, goal_id,
                  created_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    context.id.to_string(),
                    case_id,
                    seq as i64,
                    context.name.to_string(),
                    context.short_desc,
                    context.long_desc,
                    context.goal().map(|g| g.to_string()),
                    fmt_ts(&context.created_at)?,
                    context.version as i64,
                ],
            )?;
        }

        for (seq, id) in strategy_ids.iter().enumerate() {
            let strategy = graph.strategy(*id).map_err(corrupt)?;
            tx.execute(
                "INSERT INTO strategies
                 (id, case_id, seq, name, short_desc, long_desc, assumption,
                  justification, goal_id, created_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    strategy.id.to_string(),
                    case_id,
                    seq as i64,
                    strategy.name.to_string(),
                    strategy.short_desc,
                    strategy.long_desc,
                    strategy.assumption as i64,
                    strategy.justification as i64,
                    strategy.goal().map(|g| g.to_string()),
                    fmt_ts(&strategy.created_at)?,
                    strategy.version as i64,
                ],
            )?;
        }

        for (seq, id) in claim_ids.iter().enumerate() {
            let claim = graph.claim(*id).map_err(corrupt)?;
            let (parent_kind, parent_id) = match claim.parent() {
                Some(ClaimParent::Goal(g)) => (Some("goal"), Some(g.to_string())),
                Some(ClaimParent::Strategy(s)) => (Some("strategy"), Some(s.to_string())),
                Some(ClaimParent::Claim(c)) => (Some("claim"), Some(c.to_string())),
                None => (None, None),
            };
            tx.execute(
                "INSERT INTO property_claims
                 (id, case_id, seq, name, short_desc, long_desc, assumption,
                  claim_type, level, parent_kind, parent_id, created_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    claim.id.to_string(),
                    case_id,
                    seq as i64,
                    claim.name.to_string(),
                    claim.short_desc,
                    claim.long_desc,
                    claim.assumption as i64,
                    claim.claim_type.as_str(),
                    claim.level as i64,
                    parent_kind,
                    parent_id,
                    fmt_ts(&claim.created_at)?,
                    claim.version as i64,
                ],
            )?;
        }

        for (seq, id) in graph.evidence_ids().iter().enumerate() {
            let evidence = graph.evidence(*id).map_err(corrupt)?;
            tx.execute(
                "INSERT INTO evidence
                 (id, case_id, seq, name, short_desc, long_desc, url,
                  created_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    evidence.id.to_string(),
                    case_id,
                    seq as i64,
                    evidence.name.to_string(),
                    evidence.short_desc,
                    evidence.long_desc,
                    evidence.url,
                    fmt_ts(&evidence.created_at)?,
                    evidence.version as i64,
                ],
            )?;
            for (link_seq, claim) in evidence.claims.iter().enumerate() {
                tx.execute(
                    "INSERT INTO evidence_claims (evidence_id, claim_id, seq)
                     VALUES (?1, ?2, ?3)",
                    params![evidence.id.to_string(), claim.to_string(), link_seq as i64],
                )?;
            }
        }

        for (seq, id) in graph.comment_ids().iter().enumerate() {
            let Some(comment) = graph.comment(*id) else {
                continue;
            };
            let (target_kind, target_id) = match comment.target {
                CommentTarget::Case(_) => ("case", None),
                CommentTarget::Goal(id) => ("goal", Some(id.to_string())),
                CommentTarget::Context(id) => ("context", Some(id.to_string())),
                CommentTarget::Strategy(id) => ("strategy", Some(id.to_string())),
                CommentTarget::PropertyClaim(id) => ("property_claim", Some(id.to_string())),
                CommentTarget::Evidence(id) => ("evidence", Some(id.to_string())),
            };
            tx.execute(
                "INSERT INTO comments
                 (id, case_id, seq, author, target_kind, target_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    comment.id.to_string(),
                    case_id,
                    seq as i64,
                    comment.author.to_string(),
                    target_kind,
                    target_id,
                    comment.content,
                    fmt_ts(&comment.created_at)?,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn delete_case(&self, case: CaseId) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let case_id = case.to_string();
        for table in [
            "cases",
            "case_groups",
            "goals",
            "contexts",
            "strategies",
            "property_claims",
            "evidence",
            "comments",
        ] {
            let column = if table == "cases" { "id" } else { "case_id" };
            tx.execute(
                &format!("DELETE FROM {table} WHERE {column} = ?1"),
                params![case_id],
            )?;
        }
        tx.execute(
            "DELETE FROM evidence_claims WHERE evidence_id NOT IN (SELECT id FROM evidence)",
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn save_snapshot(&self, snapshot: &PublishedCase) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let tree = serde_json::to_string(&snapshot.tree).map_err(|e| StoreError::Corrupt {
            reason: format!("snapshot tree serialization: {e}"),
        })?;
        conn.execute(
            "INSERT OR REPLACE INTO snapshots
             (id, case_id, name, description, digest, tree, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                snapshot.id.to_string(),
                snapshot.case_id.to_string(),
                snapshot.name,
                snapshot.description,
                snapshot.digest,
                tree,
                fmt_ts(&snapshot.created_at)?,
            ],
        )?;
        Ok(())
    }

    // =========================================================================
    // Load
    // =========================================================================

    pub fn load_all(&self) -> Result<Loaded, StoreError> {
        let conn = self.lock()?;

        let users = {
            let mut stmt =
                conn.prepare("SELECT id, username, email, token, created_at FROM users")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            let mut users = Vec::new();
            for row in rows {
                let (id, username, email, token, created_at) = row?;
                users.push(User {
                    id: UserId::parse(&id).map_err(corrupt)?,
                    username,
                    email,
                    token: Token::parse(token).map_err(corrupt)?,
                    created_at: parse_ts(&created_at)?,
                });
            }
            users
        };

        let mut groups = {
            let mut stmt = conn.prepare("SELECT id, name, owner, created_at FROM groups")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;
            let mut groups = Vec::new();
            for row in rows {
                let (id, name, owner, created_at) = row?;
                groups.push(Group {
                    id: GroupId::parse(&id).map_err(corrupt)?,
                    name,
                    owner: UserId::parse(&owner).map_err(corrupt)?,
                    members: Default::default(),
                    created_at: parse_ts(&created_at)?,
                });
            }
            groups
        };
        {
            let mut stmt = conn.prepare("SELECT group_id, user_id FROM group_members")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut members: HashMap<GroupId, Vec<UserId>> = HashMap::new();
            for row in rows {
                let (group_id, user_id) = row?;
                members
                    .entry(GroupId::parse(&group_id).map_err(corrupt)?)
                    .or_default()
                    .push(UserId::parse(&user_id).map_err(corrupt)?);
            }
            for group in &mut groups {
                if let Some(list) = members.remove(&group.id) {
                    group.members = list.into_iter().collect();
                }
            }
        }

        let mut cases = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, owner, color_profile, lock_token,
                        published, published_at, created_at, version
                 FROM cases ORDER BY created_at",
            )?;
            let metas: Vec<CaseMeta> = stmt
                .query_map([], row_to_meta)?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;

            for mut meta in metas {
                load_case_groups(&conn, &mut meta)?;
                cases.push(load_case_graph(&conn, meta)?);
            }
        }

        let snapshots = {
            let mut stmt = conn.prepare(
                "SELECT id, case_id, name, description, digest, tree, created_at FROM snapshots",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?;
            let mut snapshots = Vec::new();
            for row in rows {
                let (id, case_id, name, description, digest, tree, created_at) = row?;
                snapshots.push(PublishedCase {
                    id: SnapshotId::parse(&id).map_err(corrupt)?,
                    case_id: CaseId::parse(&case_id).map_err(corrupt)?,
                    name,
                    description,
                    digest,
                    tree: serde_json::from_str(&tree).map_err(|e| StoreError::Corrupt {
                        reason: format!("snapshot tree: {e}"),
                    })?,
                    created_at: parse_ts(&created_at)?,
                });
            }
            snapshots
        };

        Ok(Loaded {
            users,
            groups,
            cases,
            snapshots,
        })
    }
}

fn push_claim_subtree(graph: &CaseGraph, root: ElementId, out: &mut Vec<ElementId>) {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        out.push(id);
        for child in graph.sub_claims_of(id).iter().rev() {
            stack.push(*child);
        }
    }
}

type MetaRow = Result<CaseMeta, StoreError>;

fn row_to_meta(row: &Row<'_>) -> rusqlite::Result<MetaRow> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let description: String = row.get(2)?;
    let owner: Option<String> = row.get(3)?;
    let color_profile: String = row.get(4)?;
    let lock_token: Option<String> = row.get(5)?;
    let published: i64 = row.get(6)?;
    let published_at: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    let version: i64 = row.get(9)?;

    Ok((|| {
        Ok(CaseMeta {
            id: CaseId::parse(&id).map_err(corrupt)?,
            name,
            description,
            owner: owner
                .map(|o| UserId::parse(&o).map_err(corrupt))
                .transpose()?,
            color_profile,
            lock_token,
            edit_groups: Default::default(),
            view_groups: Default::default(),
            review_groups: Default::default(),
            published: published != 0,
            published_at: published_at.map(|t| parse_ts(&t)).transpose()?,
            created_at: parse_ts(&created_at)?,
            version: version as u64,
        })
    })())
}

fn load_case_groups(conn: &Connection, meta: &mut CaseMeta) -> Result<(), StoreError> {
    let mut stmt = conn.prepare("SELECT kind, group_id FROM case_groups WHERE case_id = ?1")?;
    let rows = stmt.query_map(params![meta.id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (kind, group_id) = row?;
        let group = GroupId::parse(&group_id).map_err(corrupt)?;
        match kind.as_str() {
            "edit" => meta.edit_groups.insert(group),
            "view" => meta.view_groups.insert(group),
            "review" => meta.review_groups.insert(group),
            other => {
                return Err(StoreError::Corrupt {
                    reason: format!("unknown case group kind `{other}`"),
                });
            }
        };
    }
    Ok(())
}

fn load_case_graph(conn: &Connection, meta: CaseMeta) -> Result<CaseGraph, StoreError> {
    let case_id = meta.id;
    let case_param = case_id.to_string();
    let mut graph = CaseGraph::new(meta);

    {
        let mut stmt = conn.prepare(
            "SELECT id, name, short_desc, long_desc, keywords, assumption, created_at, version
             FROM goals WHERE case_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![case_param], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, i64>(7)?,
            ))
        })?;
        for row in rows {
            let (id, name, short_desc, long_desc, keywords, assumption, created_at, version) =
                row?;
            graph
                .insert_goal(Goal {
                    id: ElementId::parse(&id).map_err(corrupt)?,
                    name: ElementName::parse(&name).map_err(corrupt)?,
                    short_desc,
                    long_desc,
                    keywords,
                    assumption: assumption != 0,
                    created_at: parse_ts(&created_at)?,
                    version: version as u64,
                })
                .map_err(corrupt)?;
        }
    }

    {
        let mut stmt = conn.prepare(
            "SELECT id, name, short_desc, long_desc, goal_id, created_at, version
             FROM contexts WHERE case_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![case_param], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;
        for row in rows {
            let (id, name, short_desc, long_desc, goal_id, created_at, version) = row?;
            let attachment = match goal_id {
                Some(goal) => Attachment::Attached {
                    parent: ElementId::parse(&goal).map_err(corrupt)?,
                },
                None => Attachment::Sandboxed { case: case_id },
            };
            graph
                .insert_context(Context {
                    id: ElementId::parse(&id).map_err(corrupt)?,
                    name: ElementName::parse(&name).map_err(corrupt)?,
                    short_desc,
                    long_desc,
                    attachment,
                    created_at: parse_ts(&created_at)?,
                    version: version as u64,
                })
                .map_err(corrupt)?;
        }
    }

    {
        let mut stmt = conn.prepare(
            "SELECT id, name, short_desc, long_desc, assumption, justification, goal_id,
                    created_at, version
             FROM strategies WHERE case_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![case_param], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })?;
        for row in rows {
            let (
                id,
                name,
                short_desc,
                long_desc,
                assumption,
                justification,
                goal_id,
                created_at,
                version,
            ) = row?;
            let attachment = match goal_id {
                Some(goal) => Attachment::Attached {
                    parent: ElementId::parse(&goal).map_err(corrupt)?,
                },
                None => Attachment::Sandboxed { case: case_id },
            };
            graph
                .insert_strategy(Strategy {
                    id: ElementId::parse(&id).map_err(corrupt)?,
                    name: ElementName::parse(&name).map_err(corrupt)?,
                    short_desc,
                    long_desc,
                    assumption: assumption != 0,
                    justification: justification != 0,
                    attachment,
                    created_at: parse_ts(&created_at)?,
                    version: version as u64,
                })
                .map_err(corrupt)?;
        }
    }

    {
        let mut stmt = conn.prepare(
            "SELECT id, name, short_desc, long_desc, assumption, claim_type, level,
                    parent_kind, parent_id, created_at, version
             FROM property_claims WHERE case_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![case_param], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, i64>(10)?,
            ))
        })?;
        for row in rows {
            let (
                id,
                name,
                short_desc,
                long_desc,
                assumption,
                claim_type,
                level,
                parent_kind,
                parent_id,
                created_at,
                version,
            ) = row?;
            let attachment = match (parent_kind.as_deref(), parent_id) {
                (Some(kind), Some(parent)) => {
                    let parent = ElementId::parse(&parent).map_err(corrupt)?;
                    let parent = match kind {
                        "goal" => ClaimParent::Goal(parent),
                        "strategy" => ClaimParent::Strategy(parent),
                        "claim" => ClaimParent::Claim(parent),
                        other => {
                            return Err(StoreError::Corrupt {
                                reason: format!("unknown claim parent kind `{other}`"),
                            });
                        }
                    };
                    Attachment::Attached { parent }
                }
                (None, None) => Attachment::Sandboxed { case: case_id },
                _ => {
                    return Err(StoreError::Corrupt {
                        reason: "claim parent kind and id must be set together".to_string(),
                    });
                }
            };
            let claim_type = match claim_type.as_str() {
                "system" => ClaimType::System,
                "project" => ClaimType::Project,
                other => {
                    return Err(StoreError::Corrupt {
                        reason: format!("unknown claim type `{other}`"),
                    });
                }
            };
            graph
                .insert_claim(PropertyClaim {
                    id: ElementId::parse(&id).map_err(corrupt)?,
                    name: ElementName::parse(&name).map_err(corrupt)?,
                    short_desc,
                    long_desc,
                    assumption: assumption != 0,
                    claim_type,
                    level: level as u32,
                    attachment,
                    created_at: parse_ts(&created_at)?,
                    version: version as u64,
                })
                .map_err(corrupt)?;
        }
    }

    {
        let mut links: HashMap<ElementId, Vec<ElementId>> = HashMap::new();
        let mut stmt = conn.prepare(
            "SELECT ec.evidence_id, ec.claim_id
             FROM evidence_claims ec
             JOIN evidence e ON e.id = ec.evidence_id
             WHERE e.case_id = ?1
             ORDER BY ec.seq",
        )?;
        let rows = stmt.query_map(params![case_param], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (evidence_id, claim_id) = row?;
            links
                .entry(ElementId::parse(&evidence_id).map_err(corrupt)?)
                .or_default()
                .push(ElementId::parse(&claim_id).map_err(corrupt)?);
        }

        let mut stmt = conn.prepare(
            "SELECT id, name, short_desc, long_desc, url, created_at, version
             FROM evidence WHERE case_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![case_param], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;
        for row in rows {
            let (id, name, short_desc, long_desc, url, created_at, version) = row?;
            let id = ElementId::parse(&id).map_err(corrupt)?;
            graph
                .insert_evidence(Evidence {
                    id,
                    name: ElementName::parse(&name).map_err(corrupt)?,
                    short_desc,
                    long_desc,
                    url,
                    claims: links.remove(&id).unwrap_or_default(),
                    created_at: parse_ts(&created_at)?,
                    version: version as u64,
                })
                .map_err(corrupt)?;
        }
    }

    {
        let mut stmt = conn.prepare(
            "SELECT id, author, target_kind, target_id, content, created_at
             FROM comments WHERE case_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![case_param], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        for row in rows {
            let (id, author, target_kind, target_id, content, created_at) = row?;
            let element = target_id
                .map(|t| ElementId::parse(&t).map_err(corrupt))
                .transpose()?;
            let target = match (target_kind.as_str(), element) {
                ("case", None) => CommentTarget::Case(case_id),
                ("goal", Some(e)) => CommentTarget::Goal(e),
                ("context", Some(e)) => CommentTarget::Context(e),
                ("strategy", Some(e)) => CommentTarget::Strategy(e),
                ("property_claim", Some(e)) => CommentTarget::PropertyClaim(e),
                ("evidence", Some(e)) => CommentTarget::Evidence(e),
                (other, _) => {
                    return Err(StoreError::Corrupt {
                        reason: format!("bad comment target `{other}`"),
                    });
                }
            };
            graph
                .insert_comment(Comment {
                    id: CommentId::parse(&id).map_err(corrupt)?,
                    author: UserId::parse(&author).map_err(corrupt)?,
                    target,
                    content,
                    created_at: parse_ts(&created_at)?,
                })
                .map_err(corrupt)?;
        }
    }

    Ok(graph)
}

fn fmt_ts(ts: &OffsetDateTime) -> Result<String, StoreError> {
    ts.format(&Rfc3339).map_err(|e| StoreError::Corrupt {
        reason: format!("timestamp format: {e}"),
    })
}

fn parse_ts(raw: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| StoreError::Corrupt {
        reason: format!("timestamp `{raw}`: {e}"),
    })
}

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_roundtrip_preserves_order_and_links() {
        let store = Store::open_in_memory().expect("open");

        let owner = UserId::generate();
        let meta = CaseMeta::new(CaseId::generate(), "rt".into(), "desc".into(), owner);
        let case_id = meta.id;
        let mut graph = CaseGraph::new(meta);

        let goal = Goal {
            id: ElementId::generate(),
            name: ElementName::parse("G1").expect("name"),
            short_desc: "top goal".into(),
            long_desc: String::new(),
            keywords: String::new(),
            assumption: false,
            created_at: OffsetDateTime::now_utc(),
            version: 1,
        };
        let goal_id = goal.id;
        graph.insert_goal(goal).expect("goal");

        let claim = PropertyClaim {
            id: ElementId::generate(),
            name: ElementName::parse("P1").expect("name"),
            short_desc: String::new(),
            long_desc: String::new(),
            assumption: false,
            claim_type: ClaimType::System,
            level: 1,
            attachment: Attachment::Attached {
                parent: ClaimParent::Goal(goal_id),
            },
            created_at: OffsetDateTime::now_utc(),
            version: 1,
        };
        let claim_id = claim.id;
        graph.insert_claim(claim).expect("claim");

        let evidence = Evidence {
            id: ElementId::generate(),
            name: ElementName::parse("E1").expect("name"),
            short_desc: String::new(),
            long_desc: String::new(),
            url: Some("https://example.org/report".into()),
            claims: vec![claim_id],
            created_at: OffsetDateTime::now_utc(),
            version: 1,
        };
        let evidence_id = evidence.id;
        graph.insert_evidence(evidence).expect("evidence");

        store.persist_case(&graph).expect("persist");

        let loaded = store.load_all().expect("load");
        assert_eq!(loaded.cases.len(), 1);
        let reloaded = &loaded.cases[0];
        assert_eq!(reloaded.meta().id, case_id);
        assert_eq!(reloaded.goal_ids(), [goal_id]);
        assert_eq!(reloaded.claims_of_goal(goal_id), [claim_id]);
        assert_eq!(reloaded.evidence_of_claim(claim_id), [evidence_id]);
        assert_eq!(
            reloaded.evidence(evidence_id).expect("evidence").url,
            Some("https://example.org/report".into())
        );
    }

    #[test]
    fn delete_case_removes_every_row() {
        let store = Store::open_in_memory().expect("open");
        let meta = CaseMeta::new(
            CaseId::generate(),
            "gone".into(),
            String::new(),
            UserId::generate(),
        );
        let case_id = meta.id;
        let graph = CaseGraph::new(meta);
        store.persist_case(&graph).expect("persist");
        store.delete_case(case_id).expect("delete");
        let loaded = store.load_all().expect("load");
        assert!(loaded.cases.is_empty());
    }
}
