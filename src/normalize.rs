use std::collections::BTreeMap;

use crate::error::{ResolveError, Result};
use crate::model::Namespace;

/// Canonical key used for the empty path.
pub const HOME_KEY: &str = "_home";

/// Options the normalizer reads from organization config.
#[derive(Debug, Clone, Default)]
pub struct NormalizerOptions {
    /// Lowercased marker segment -> namespace it selects.
    pub markers: BTreeMap<String, Namespace>,
    /// When set, `-`, `_` and `.` are dropped from canonical keys.
    pub punctuation_insensitive: bool,
}

/// Verbatim key segments with a canonical (lowercased) view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Canonical form of the first `n` segments.
    pub fn canonical_prefix(&self, n: usize, punctuation_insensitive: bool) -> String {
        self.segments[..n.min(self.segments.len())]
            .iter()
            .map(|s| canonical_segment(s, punctuation_insensitive))
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn canonical(&self, punctuation_insensitive: bool) -> String {
        self.canonical_prefix(self.segments.len(), punctuation_insensitive)
    }

    /// Verbatim segments after the first `n`, joined with `/`.
    pub fn remainder(&self, n: usize) -> String {
        self.segments
            .get(n..)
            .map(|rest| rest.join("/"))
            .unwrap_or_default()
    }
}

pub(crate) fn canonical_segment(segment: &str, punctuation_insensitive: bool) -> String {
    let lower = segment.to_lowercase();
    if punctuation_insensitive {
        lower.chars().filter(|c| !matches!(c, '-' | '_' | '.')).collect()
    } else {
        lower
    }
}

/// Output of [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath {
    /// Decoded text as typed, used as the fallback query.
    pub raw: String,
    pub normalized_key: String,
    pub key: KeyPath,
    /// Verbatim content past the key-shaped prefix (query-like text etc).
    pub path_suffix: String,
    pub explicit_namespace_hint: Option<Namespace>,
    /// `key` without the marker segment; set only with a hint.
    pub hinted_key: Option<KeyPath>,
}

impl NormalizedPath {
    /// Only the sentinel home path has no key segments.
    pub fn is_home(&self) -> bool {
        self.key.is_empty()
    }

    /// Key to probe in `namespace`: the hinted key for the hinted namespace,
    /// the full typed key for everything else.
    pub fn key_for(&self, namespace: &Namespace) -> &KeyPath {
        match (&self.explicit_namespace_hint, &self.hinted_key) {
            (Some(hint), Some(hinted)) if hint == namespace => hinted,
            _ => &self.key,
        }
    }
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

/// Decode percent escapes, rejecting malformed ones instead of passing them through.
fn decode(raw: &str) -> Result<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let ok = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !ok {
                return Err(ResolveError::InvalidPath(format!(
                    "malformed percent escape at byte {i}"
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    let decoded = urlencoding::decode(raw)
        .map_err(|e| ResolveError::InvalidPath(format!("not utf-8: {e}")))?;
    if decoded.chars().any(|c| c.is_control() && !c.is_whitespace()) {
        return Err(ResolveError::InvalidPath("control character in path".into()));
    }
    Ok(decoded.into_owned())
}

fn collapse(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    let mut prev_slash = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
            prev_slash = false;
            continue;
        }
        if c == '/' && prev_slash {
            continue;
        }
        prev_space = false;
        prev_slash = c == '/';
        out.push(c);
    }
    out
}

/// Parse a raw request path (percent-encoded, query optional).
pub fn normalize(raw_path: &str, opts: &NormalizerOptions) -> Result<NormalizedPath> {
    let decoded = decode(raw_path)?;
    let trimmed = collapse(decoded.trim().trim_matches('/').trim());

    if trimmed.is_empty() {
        return Ok(NormalizedPath {
            raw: String::new(),
            normalized_key: HOME_KEY.to_string(),
            key: KeyPath::new(Vec::new()),
            path_suffix: String::new(),
            explicit_namespace_hint: None,
            hinted_key: None,
        });
    }

    let split = trimmed
        .char_indices()
        .find(|(_, c)| !is_key_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    let (key_part, tail) = trimmed.split_at(split);

    let segments: Vec<String> = key_part
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    // Nothing key-shaped at all, e.g. "?q=x": still searchable text.
    if segments.is_empty() {
        return Err(ResolveError::InvalidPath(format!(
            "no key in `{trimmed}`"
        )));
    }

    let key = KeyPath::new(segments);
    let (hint, hinted_key) = match key.segments().split_first() {
        Some((first, rest)) if !rest.is_empty() => {
            match opts.markers.get(&first.to_lowercase()) {
                Some(ns) => (Some(ns.clone()), Some(KeyPath::new(rest.to_vec()))),
                None => (None, None),
            }
        }
        _ => (None, None),
    };

    Ok(NormalizedPath {
        raw: trimmed.clone(),
        normalized_key: key.canonical(opts.punctuation_insensitive),
        key,
        path_suffix: tail.to_string(),
        explicit_namespace_hint: hint,
        hinted_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> NormalizerOptions {
        let mut markers = BTreeMap::new();
        markers.insert("eng".to_string(), Namespace::org("eng"));
        NormalizerOptions {
            markers,
            punctuation_insensitive: false,
        }
    }

    #[test]
    fn lowercases_and_trims() {
        let n = normalize("/Jira/ABC-1/", &opts()).unwrap();
        assert_eq!(n.normalized_key, "jira/abc-1");
        assert_eq!(n.key.segments(), ["Jira", "ABC-1"]);
        assert_eq!(n.key.remainder(1), "ABC-1");
        assert_eq!(n.path_suffix, "");
        assert!(n.explicit_namespace_hint.is_none());
    }

    #[test]
    fn empty_path_is_home() {
        for p in ["", "/", "  //  "] {
            let n = normalize(p, &opts()).unwrap();
            assert!(n.is_home(), "{p:?}");
            assert_eq!(n.normalized_key, HOME_KEY);
        }
        // typing the sentinel literally is an ordinary key
        assert!(!normalize("_home", &opts()).unwrap().is_home());
    }

    #[test]
    fn decodes_and_keeps_tail_verbatim() {
        let n = normalize("/docs%20Search%20Term?x=1", &opts()).unwrap();
        assert_eq!(n.normalized_key, "docs");
        assert_eq!(n.path_suffix, " Search Term?x=1");
        assert_eq!(n.raw, "docs Search Term?x=1");
    }

    #[test]
    fn collapses_whitespace_and_slashes() {
        let n = normalize("a//b   c", &opts()).unwrap();
        assert_eq!(n.normalized_key, "a/b");
        assert_eq!(n.path_suffix, " c");
    }

    #[test]
    fn rejects_malformed_escapes() {
        assert!(matches!(
            normalize("/foo%zz", &opts()),
            Err(ResolveError::InvalidPath(_))
        ));
        assert!(matches!(
            normalize("/foo%4", &opts()),
            Err(ResolveError::InvalidPath(_))
        ));
        assert!(matches!(
            normalize("/foo%FF", &opts()),
            Err(ResolveError::InvalidPath(_))
        ));
    }

    #[test]
    fn marker_with_remainder_sets_hint() {
        let n = normalize("eng/OnCall", &opts()).unwrap();
        assert_eq!(n.explicit_namespace_hint, Some(Namespace::org("eng")));
        let hinted = n.hinted_key.as_ref().unwrap();
        assert_eq!(hinted.canonical(false), "oncall");
        assert_eq!(n.key_for(&Namespace::org("eng")).canonical(false), "oncall");
        assert_eq!(n.key_for(&Namespace::global()).canonical(false), "eng/oncall");
    }

    #[test]
    fn bare_marker_is_a_plain_key() {
        let n = normalize("eng", &opts()).unwrap();
        assert!(n.explicit_namespace_hint.is_none());
        assert_eq!(n.normalized_key, "eng");
    }

    #[test]
    fn punctuation_insensitive_canonical() {
        let o = NormalizerOptions {
            punctuation_insensitive: true,
            ..opts()
        };
        let n = normalize("On-Call_Rota.v2", &o).unwrap();
        assert_eq!(n.normalized_key, "oncallrotav2");
        assert_eq!(n.key.segments(), ["On-Call_Rota.v2"]);
    }

    #[test]
    fn no_key_shaped_prefix_is_invalid() {
        assert!(normalize("?q=hello", &opts()).is_err());
    }
}
