use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::Namespace;
use crate::normalize::NormalizerOptions;
use crate::util::valid_target;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Prefix hits on plain templates ignore the rest of the path.
    #[default]
    Standard,
    /// Prefix hits on plain templates append the rest of the path, and a
    /// lone longer candidate resolves with empty placeholders.
    Alternative,
}

impl FromStr for ResolutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "standard" => Ok(ResolutionMode::Standard),
            "alternative" => Ok(ResolutionMode::Alternative),
            other => Err(format!("unknown resolution mode `{other}`")),
        }
    }
}

/// What the resolution engine itself consumes.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub normalizer: NormalizerOptions,
    /// Namespaces anyone, including anonymous callers, may read.
    pub public_namespaces: BTreeSet<Namespace>,
    pub mode: ResolutionMode,
    /// Max candidates returned in an `Ambiguous` result.
    pub ambiguity_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerOptions::default(),
            public_namespaces: BTreeSet::new(),
            mode: ResolutionMode::Standard,
            ambiguity_limit: 10,
        }
    }
}

/// Process configuration, read once at cold start.
#[derive(Debug, Clone)]
pub struct Config {
    pub table: String,
    pub domain: String,
    pub resolver: ResolverConfig,
    /// Search URL with a `%s` for the query.
    pub fallback_search_url: Option<String>,
    pub home_url: Option<String>,
    pub click_queue_capacity: usize,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let table = get("TABLE_NAME").ok_or(ConfigError::Missing("TABLE_NAME"))?;
        let domain = get("PUBLIC_DOMAIN").unwrap_or_else(|| "go.example.com".to_string());

        let markers = match get("NAMESPACE_MARKERS") {
            Some(v) => parse_markers(&v)?,
            None => BTreeMap::new(),
        };
        let public_namespaces = match get("PUBLIC_NAMESPACES") {
            Some(v) => parse_namespaces(&v)?,
            None => BTreeSet::new(),
        };
        let punctuation_sensitive = match get("KEYWORDS_PUNCTUATION_SENSITIVE") {
            Some(v) => parse_bool("KEYWORDS_PUNCTUATION_SENSITIVE", &v)?,
            None => true,
        };
        let mode = match get("RESOLUTION_MODE") {
            Some(v) => v.parse().map_err(|reason| ConfigError::Invalid {
                var: "RESOLUTION_MODE",
                reason,
            })?,
            None => ResolutionMode::Standard,
        };
        let ambiguity_limit = parse_num("AMBIGUITY_LIMIT", get("AMBIGUITY_LIMIT"), 10)?;
        let click_queue_capacity =
            parse_num("CLICK_QUEUE_CAPACITY", get("CLICK_QUEUE_CAPACITY"), 1024)?;
        let timeout_ms = parse_num("REQUEST_TIMEOUT_MS", get("REQUEST_TIMEOUT_MS"), 2000)?;

        let fallback_search_url = get("FALLBACK_SEARCH_URL");
        if let Some(url) = &fallback_search_url {
            if !url.contains("%s") || !valid_target(&url.replace("%s", "q")) {
                return Err(ConfigError::Invalid {
                    var: "FALLBACK_SEARCH_URL",
                    reason: "must be an http(s) URL containing %s".into(),
                });
            }
        }
        let home_url = get("HOME_URL");
        if let Some(url) = &home_url {
            if !valid_target(url) {
                return Err(ConfigError::Invalid {
                    var: "HOME_URL",
                    reason: "must be an http(s) URL".into(),
                });
            }
        }

        Ok(Self {
            table,
            domain,
            resolver: ResolverConfig {
                normalizer: NormalizerOptions {
                    markers,
                    punctuation_insensitive: !punctuation_sensitive,
                },
                public_namespaces,
                mode,
                ambiguity_limit,
            },
            fallback_search_url,
            home_url,
            click_queue_capacity,
            request_timeout: Duration::from_millis(timeout_ms as u64),
        })
    }

    /// Where a fallback query should be sent, if a search provider is configured.
    pub fn fallback_destination(&self, query: &str) -> Option<String> {
        self.fallback_search_url
            .as_ref()
            .map(|t| t.replacen("%s", &urlencoding::encode(query), 1))
    }
}

/// `eng=org:eng,ops` -> {eng: org:eng, ops: org:ops}
fn parse_markers(v: &str) -> Result<BTreeMap<String, Namespace>, ConfigError> {
    let mut out = BTreeMap::new();
    for entry in v.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (marker, ns) = entry.split_once('=').unwrap_or((entry, entry));
        let marker = marker.trim().to_lowercase();
        let ns = Namespace::parse(ns).ok_or_else(|| ConfigError::Invalid {
            var: "NAMESPACE_MARKERS",
            reason: format!("bad namespace in `{entry}`"),
        })?;
        if marker.is_empty() || marker.contains('/') {
            return Err(ConfigError::Invalid {
                var: "NAMESPACE_MARKERS",
                reason: format!("bad marker in `{entry}`"),
            });
        }
        out.insert(marker, ns);
    }
    Ok(out)
}

fn parse_namespaces(v: &str) -> Result<BTreeSet<Namespace>, ConfigError> {
    v.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|e| {
            Namespace::parse(e).ok_or_else(|| ConfigError::Invalid {
                var: "PUBLIC_NAMESPACES",
                reason: format!("bad namespace `{e}`"),
            })
        })
        .collect()
}

fn parse_bool(var: &'static str, v: &str) -> Result<bool, ConfigError> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            reason: format!("`{v}` is not a boolean"),
        }),
    }
}

fn parse_num(var: &'static str, v: Option<String>, default: usize) -> Result<usize, ConfigError> {
    match v {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
            var,
            reason: format!("`{v}` is not a number"),
        }),
    }
}
