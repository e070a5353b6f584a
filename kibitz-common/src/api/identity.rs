//! Requester identity and job ownership

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage tag for registered owners
pub const OWNER_KIND_REGISTERED: &str = "registered";
/// Storage tag for anonymous owners
pub const OWNER_KIND_ANONYMOUS: &str = "anonymous";

/// Identity produced by a verified bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject_id: String,
    pub email: String,
}

/// Owner of a stored object or analysis job
///
/// Compared by variant: a registered subject whose id happens to be the
/// string "anonymous" is still distinct from [`Owner::Anonymous`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Owner {
    Registered(String),
    Anonymous,
}

impl Owner {
    /// Two-column storage form: (kind, id)
    pub fn to_columns(&self) -> (&'static str, Option<&str>) {
        match self {
            Owner::Registered(id) => (OWNER_KIND_REGISTERED, Some(id.as_str())),
            Owner::Anonymous => (OWNER_KIND_ANONYMOUS, None),
        }
    }

    /// Rebuild from the two-column storage form
    pub fn from_columns(kind: &str, id: Option<String>) -> Option<Self> {
        match (kind, id) {
            (OWNER_KIND_REGISTERED, Some(id)) => Some(Owner::Registered(id)),
            (OWNER_KIND_ANONYMOUS, _) => Some(Owner::Anonymous),
            _ => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Owner::Anonymous)
    }
}

impl From<Option<Identity>> for Owner {
    fn from(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => Owner::Registered(identity.subject_id),
            None => Owner::Anonymous,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Registered(id) => write!(f, "registered:{}", id),
            Owner::Anonymous => write!(f, "anonymous"),
        }
    }
}
