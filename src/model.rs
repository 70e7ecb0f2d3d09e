use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an owning scope. Opaque to the repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    pub const GLOBAL: &'static str = "global";

    pub fn global() -> Self {
        Namespace(Self::GLOBAL.to_string())
    }

    pub fn org(id: &str) -> Self {
        Namespace(format!("org:{id}"))
    }

    pub fn personal(user_id: &str) -> Self {
        Namespace(format!("user:{user_id}"))
    }

    /// Accepts `global`, `org:<id>` or `user:<id>`; a bare id is taken as an org.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if s == Self::GLOBAL {
            return Some(Self::global());
        }
        match s.split_once(':') {
            Some(("org", id)) | Some(("user", id)) if !id.is_empty() => {
                Some(Namespace(s.to_string()))
            }
            Some(_) => None,
            None => Some(Self::org(s)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_global(&self) -> bool {
        self.0 == Self::GLOBAL
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is asking. Supplied by the web layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Identity {
    Anonymous,
    User {
        user_id: String,
        email: Option<String>,
        /// Organization ids in membership order.
        organizations: Vec<String>,
    },
}

impl Identity {
    pub fn user(user_id: &str, organizations: &[&str]) -> Self {
        Identity::User {
            user_id: user_id.to_string(),
            email: None,
            organizations: organizations.iter().map(|o| o.to_string()).collect(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::User { user_id, .. } => Some(user_id),
        }
    }
}

/// A persisted mapping from a key to a destination template.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Shortcut {
    pub namespace: Namespace,
    /// Canonical key, e.g. `docs`, `eng/oncall` or `jira/%s`.
    pub key: String,
    pub destination_template: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub visit_count: u64,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Shortcut {
    pub fn new(namespace: Namespace, key: &str, destination_template: &str, owner: &str) -> Self {
        let now = Utc::now();
        Self {
            namespace,
            key: key.to_string(),
            destination_template: destination_template.to_string(),
            owner: owner.to_string(),
            created_at: now,
            updated_at: now,
            visit_count: 0,
            last_used_at: None,
        }
    }

    /// Keys like `jira/%s` match typed paths segment by segment.
    pub fn is_placeholder_key(&self) -> bool {
        self.key.split('/').any(|s| s == PLACEHOLDER_SEGMENT)
    }
}

pub const PLACEHOLDER_SEGMENT: &str = "%s";

/// A shortcut offered when the typed text only partially names one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub namespace: Namespace,
    pub key: String,
    pub destination_template: String,
}

impl From<&Shortcut> for Candidate {
    fn from(s: &Shortcut) -> Self {
        Self {
            namespace: s.namespace.clone(),
            key: s.key.clone(),
            destination_template: s.destination_template.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolutionResult {
    Redirect {
        destination: String,
        namespace: Namespace,
        key: String,
    },
    Fallback {
        query: String,
    },
    Ambiguous {
        candidates: Vec<Candidate>,
    },
    /// The empty path; never searched.
    Home,
}
