//! One pass per request: normalize, order scopes, probe exact keys, probe
//! shorter prefixes, then offer candidates or fall back to search.
//!
//! Every repository call is a fresh read and no lock is held across one.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::clicks::{ClickEvent, ClickRecorder};
use crate::config::{ResolutionMode, ResolverConfig};
use crate::error::{ResolveError, Result};
use crate::model::{
    Candidate, Identity, Namespace, ResolutionResult, Shortcut, PLACEHOLDER_SEGMENT,
};
use crate::normalize::{canonical_segment, normalize, KeyPath, NormalizedPath};
use crate::repository::ShortcutRepository;
use crate::scope::scope_order;
use crate::template::{expand, expand_appending};

pub struct Resolver {
    repo: Arc<dyn ShortcutRepository>,
    clicks: Option<ClickRecorder>,
    config: ResolverConfig,
}

/// How a candidate matched the typed path.
enum Match {
    /// Key equals the probed prefix; the rest of the path is the suffix.
    Prefix(String),
    /// Placeholder key covering the whole path; captured segments as suffix.
    Pattern(String),
}

impl Resolver {
    pub fn new(repo: Arc<dyn ShortcutRepository>, config: ResolverConfig) -> Self {
        Self {
            repo,
            clicks: None,
            config,
        }
    }

    pub fn with_clicks(mut self, clicks: ClickRecorder) -> Self {
        self.clicks = Some(clicks);
        self
    }

    /// Resolve `raw_path` for `identity`.
    ///
    /// Only [`ResolveError::RepositoryUnavailable`] is returned as an error;
    /// malformed input degrades to `Fallback` and broken templates are skipped.
    pub async fn resolve(&self, raw_path: &str, identity: &Identity) -> Result<ResolutionResult> {
        let path = match normalize(raw_path, &self.config.normalizer) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "normalization failed; falling back to search");
                let query = lossy_query(raw_path);
                self.note_fallback(&query, identity);
                return Ok(ResolutionResult::Fallback { query });
            }
        };

        if path.is_home() {
            return Ok(ResolutionResult::Home);
        }

        let scopes = scope_order(
            identity,
            path.explicit_namespace_hint.as_ref(),
            &self.config.public_namespaces,
        );

        if let Some(hit) = self.exact(&path, &scopes).await? {
            return Ok(self.redirect(hit, identity));
        }
        if let Some(hit) = self.by_prefix(&path, &scopes).await? {
            return Ok(self.redirect(hit, identity));
        }

        let candidates = self.longer_candidates(&path, &scopes).await?;
        if self.config.mode == ResolutionMode::Alternative && candidates.len() == 1 {
            let (ns, key) = (&candidates[0].namespace, &candidates[0].key);
            if path.key_for(ns).len() == 1 {
                match expand(&candidates[0].destination_template, "") {
                    Ok(destination) => {
                        let hit = (ns.clone(), key.clone(), destination);
                        return Ok(self.redirect(hit, identity));
                    }
                    Err(e) => skip(ns, key, &e),
                }
            }
        }
        if !candidates.is_empty() {
            tracing::debug!(typed = %path.raw, count = candidates.len(), "ambiguous");
            return Ok(ResolutionResult::Ambiguous { candidates });
        }

        self.note_fallback(&path.raw, identity);
        Ok(ResolutionResult::Fallback { query: path.raw })
    }

    async fn exact(
        &self,
        path: &NormalizedPath,
        scopes: &[Namespace],
    ) -> Result<Option<(Namespace, String, String)>> {
        let pi = self.config.normalizer.punctuation_insensitive;
        for ns in scopes {
            let key = path.key_for(ns).canonical(pi);
            let Some(shortcut) = self.repo.lookup(ns, &key).await? else {
                continue;
            };
            match expand(&shortcut.destination_template, &path.path_suffix) {
                Ok(destination) => return Ok(Some((ns.clone(), shortcut.key, destination))),
                Err(e) => skip(ns, &shortcut.key, &e),
            }
        }
        Ok(None)
    }

    /// Longest prefix first; within one prefix length, scope order.
    async fn by_prefix(
        &self,
        path: &NormalizedPath,
        scopes: &[Namespace],
    ) -> Result<Option<(Namespace, String, String)>> {
        let pi = self.config.normalizer.punctuation_insensitive;
        let longest = scopes
            .iter()
            .map(|ns| path.key_for(ns).len())
            .max()
            .unwrap_or(0);

        for n in (1..longest).rev() {
            for ns in scopes {
                let typed = path.key_for(ns);
                if n >= typed.len() {
                    continue;
                }
                let prefix = typed.canonical_prefix(n, pi);
                let candidates = self.repo.lookup_prefix_candidates(ns, &prefix).await?;
                for shortcut in candidates {
                    let Some(m) = match_candidate(&shortcut, &prefix, typed, n, pi) else {
                        continue;
                    };
                    let expanded = match &m {
                        Match::Prefix(rest) => {
                            let suffix = format!("{rest}{}", path.path_suffix);
                            if self.config.mode == ResolutionMode::Alternative {
                                expand_appending(&shortcut.destination_template, &suffix)
                            } else {
                                expand(&shortcut.destination_template, &suffix)
                            }
                        }
                        Match::Pattern(args) => {
                            expand(&shortcut.destination_template, &format!("{args}{}", path.path_suffix))
                        }
                    };
                    match expanded {
                        Ok(destination) => return Ok(Some((ns.clone(), shortcut.key, destination))),
                        Err(e) => skip(ns, &shortcut.key, &e),
                    }
                }
            }
        }
        Ok(None)
    }

    /// Keys that extend the full typed key, e.g. `jira/%s` for `jira`.
    async fn longer_candidates(
        &self,
        path: &NormalizedPath,
        scopes: &[Namespace],
    ) -> Result<Vec<Candidate>> {
        let pi = self.config.normalizer.punctuation_insensitive;
        let limit = self.config.ambiguity_limit;
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();

        for ns in scopes {
            if out.len() >= limit {
                break;
            }
            let key = path.key_for(ns).canonical(pi);
            for shortcut in self.repo.lookup_prefix_candidates(ns, &key).await? {
                if shortcut.key.len() <= key.len() {
                    continue;
                }
                if out.len() >= limit {
                    break;
                }
                if seen.insert((shortcut.namespace.clone(), shortcut.key.clone())) {
                    out.push(Candidate::from(&shortcut));
                }
            }
        }
        Ok(out)
    }

    fn redirect(&self, hit: (Namespace, String, String), identity: &Identity) -> ResolutionResult {
        let (namespace, key, destination) = hit;
        tracing::debug!(namespace = %namespace, key = %key, "resolved");
        if let Some(clicks) = &self.clicks {
            clicks.record(ClickEvent::new(&namespace, &key, identity));
        }
        ResolutionResult::Redirect {
            destination,
            namespace,
            key,
        }
    }

    fn note_fallback(&self, query: &str, identity: &Identity) {
        if let Some(clicks) = &self.clicks {
            clicks.record_query(query, identity);
        }
    }
}

fn skip(ns: &Namespace, key: &str, e: &ResolveError) {
    tracing::warn!(namespace = %ns, key, error = %e, "skipping shortcut with unusable template");
}

/// Best effort text for a path that failed to normalize.
fn lossy_query(raw_path: &str) -> String {
    let bytes = urlencoding::decode_binary(raw_path.as_bytes());
    String::from_utf8_lossy(&bytes)
        .trim()
        .trim_matches('/')
        .to_string()
}

fn match_candidate(
    shortcut: &Shortcut,
    prefix: &str,
    typed: &KeyPath,
    n: usize,
    pi: bool,
) -> Option<Match> {
    if shortcut.key == prefix {
        return Some(Match::Prefix(typed.remainder(n)));
    }
    if !shortcut.is_placeholder_key() {
        return None;
    }
    let pattern: Vec<&str> = shortcut.key.split('/').collect();
    if pattern.len() != typed.len() {
        return None;
    }
    let mut args = Vec::new();
    for (want, got) in pattern.iter().zip(typed.segments()) {
        if *want == PLACEHOLDER_SEGMENT {
            args.push(got.as_str());
        } else if *want != canonical_segment(got, pi) {
            return None;
        }
    }
    if args.is_empty() {
        return None;
    }
    Some(Match::Pattern(args.join("/")))
}
