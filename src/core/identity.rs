//! Identity atoms.
//!
//! CaseId / ElementId / UserId / GroupId / CommentId / SnapshotId: opaque
//! UUID-backed tokens. ElementName: the human-readable name painted on a
//! node (`G1`, `C2`, `S3`, `P1.2`, `E5`). Token: opaque auth credential.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{CoreError, InvalidId, InvalidName};

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse(s: &str) -> Result<Self, CoreError> {
                Uuid::parse_str(s).map(Self).map_err(|e| {
                    InvalidId {
                        kind: $label,
                        raw: s.to_string(),
                        reason: e.to_string(),
                    }
                    .into()
                })
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

uuid_id!(
    /// Assurance case identifier.
    CaseId,
    "case"
);
uuid_id!(
    /// Graph element identifier (goal, context, strategy, claim, evidence).
    ElementId,
    "element"
);
uuid_id!(
    /// User identifier.
    UserId,
    "user"
);
uuid_id!(
    /// Group identifier.
    GroupId,
    "group"
);
uuid_id!(
    /// Comment identifier.
    CommentId,
    "comment"
);
uuid_id!(
    /// Published snapshot identifier.
    SnapshotId,
    "snapshot"
);

// =============================================================================
// ElementName - the human-readable node name
// =============================================================================

/// Name prefix for each element kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NamePrefix {
    Goal,
    Context,
    Strategy,
    Claim,
    Evidence,
}

impl NamePrefix {
    pub fn letter(self) -> char {
        match self {
            NamePrefix::Goal => 'G',
            NamePrefix::Context => 'C',
            NamePrefix::Strategy => 'S',
            NamePrefix::Claim => 'P',
            NamePrefix::Evidence => 'E',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c {
            'G' => Some(NamePrefix::Goal),
            'C' => Some(NamePrefix::Context),
            'S' => Some(NamePrefix::Strategy),
            'P' => Some(NamePrefix::Claim),
            'E' => Some(NamePrefix::Evidence),
            _ => None,
        }
    }
}

/// Human-readable element name.
///
/// Canonical forms: `G1`, `C2`, `S3`, `E4`, `P1`, and dotted sub-claim
/// names `P1.2.3`. Only claims may carry a dotted path; every index is a
/// positive integer.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementName {
    prefix: NamePrefix,
    path: Vec<u32>,
}

impl ElementName {
    pub fn new(prefix: NamePrefix, index: u32) -> Self {
        debug_assert!(index >= 1, "element name index is 1-based");
        Self {
            prefix,
            path: vec![index],
        }
    }

    /// Name of a sub-claim: parent path extended by one index.
    pub fn child(&self, index: u32) -> Self {
        debug_assert!(index >= 1, "element name index is 1-based");
        let mut path = self.path.clone();
        path.push(index);
        Self {
            prefix: self.prefix,
            path,
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let prefix = s
            .chars()
            .next()
            .and_then(NamePrefix::from_letter)
            .ok_or_else(|| InvalidName {
                raw: s.to_string(),
                reason: "must start with one of G/C/S/P/E".into(),
            })?;

        let rest = &s[1..];
        if rest.is_empty() {
            return Err(InvalidName {
                raw: s.to_string(),
                reason: "missing index".into(),
            }
            .into());
        }

        let mut path = Vec::new();
        for seg in rest.split('.') {
            let index: u32 = seg.parse().map_err(|_| InvalidName {
                raw: s.to_string(),
                reason: format!("segment `{seg}` is not a positive integer"),
            })?;
            if index == 0 {
                return Err(InvalidName {
                    raw: s.to_string(),
                    reason: "indices are 1-based".into(),
                }
                .into());
            }
            path.push(index);
        }

        if path.len() > 1 && prefix != NamePrefix::Claim {
            return Err(InvalidName {
                raw: s.to_string(),
                reason: "only claim names may carry a dotted path".into(),
            }
            .into());
        }

        Ok(Self { prefix, path })
    }

    pub fn prefix(&self) -> NamePrefix {
        self.prefix
    }

    /// Index path; top-level names have a single segment.
    pub fn path(&self) -> &[u32] {
        &self.path
    }

    pub fn is_sub_claim(&self) -> bool {
        self.prefix == NamePrefix::Claim && self.path.len() > 1
    }
}

impl fmt::Display for ElementName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix.letter())?;
        for (i, seg) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ElementName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementName({self})")
    }
}

impl Serialize for ElementName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ElementName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ElementName::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl FromStr for ElementName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// =============================================================================
// Token - opaque auth credential
// =============================================================================

const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const TOKEN_LEN: usize = 40;

/// Opaque authentication token.
///
/// Issuance policy lives outside the core; here a token is just a non-empty
/// string compared byte-for-byte.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn parse(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidId {
                kind: "token",
                raw: s,
                reason: "empty".into(),
            }
            .into());
        }
        Ok(Self(s))
    }

    /// Mint a fresh random token.
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        let raw: String = (0..TOKEN_LEN)
            .map(|_| {
                let idx = rng.random_range(0..TOKEN_ALPHABET.len());
                TOKEN_ALPHABET[idx] as char
            })
            .collect();
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log credentials.
        write!(f, "Token(****)")
    }
}
