use thiserror::Error;

/// Failures the resolution engine can produce.
///
/// Only `RepositoryUnavailable` ever escapes [`crate::resolver::Resolver::resolve`];
/// the other two are recovered inside the engine (fallback search and
/// skip-to-next-candidate respectively).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("template expansion failed for `{template}`: {reason}")]
    TemplateExpansion { template: String, reason: String },

    #[error("shortcut repository unavailable: {0}")]
    RepositoryUnavailable(String),
}

impl ResolveError {
    pub(crate) fn expansion(template: &str, reason: impl Into<String>) -> Self {
        ResolveError::TemplateExpansion {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = ResolveError> = std::result::Result<T, E>;

/// Errors raised while reading configuration at cold start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// A click sink could not persist an event. Logged by the worker, never surfaced.
#[derive(Debug, Error)]
pub enum ClickError {
    #[error("click sink rejected event: {0}")]
    Rejected(String),

    #[error("click store update failed: {0}")]
    Store(String),
}
