//! Destination template expansion.
//!
//! Markers: `%s` (next positional argument), `$1`..`$9` (indexed argument)
//! and `*` (everything not consumed by a positional marker). The path suffix
//! is split on `/` into arguments. Every substituted value is percent-encoded;
//! a marker in the scheme/authority only accepts a bare DNS label.

use crate::error::{ResolveError, Result};
use crate::util::valid_target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Next,
    Indexed(usize),
    Wildcard,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    start: usize,
    end: usize,
    marker: Marker,
}

fn scan(template: &str) -> Vec<Token> {
    let bytes = template.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if bytes.get(i + 1) == Some(&b's') => {
                out.push(Token {
                    start: i,
                    end: i + 2,
                    marker: Marker::Next,
                });
                i += 2;
            }
            b'$' if matches!(bytes.get(i + 1), Some(b'1'..=b'9')) => {
                let n = (bytes[i + 1] - b'0') as usize;
                out.push(Token {
                    start: i,
                    end: i + 2,
                    marker: Marker::Indexed(n),
                });
                i += 2;
            }
            b'*' => {
                out.push(Token {
                    start: i,
                    end: i + 1,
                    marker: Marker::Wildcard,
                });
                i += 1;
            }
            _ => i += 1,
        }
    }
    out
}

/// Byte offset where the authority ends (0 when there is no `scheme://`).
fn authority_end(s: &str) -> usize {
    match s.find("://") {
        Some(p) => {
            let after = p + 3;
            after + s[after..].find(['/', '?', '#']).unwrap_or(s.len() - after)
        }
        None => 0,
    }
}

/// Byte offset where the path ends (start of query or fragment, or len).
fn path_end(s: &str) -> usize {
    let auth = authority_end(s);
    auth + s[auth..].find(['?', '#']).unwrap_or(s.len() - auth)
}

fn is_dns_label(v: &str) -> bool {
    !v.is_empty() && v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Authority,
    Path,
    Query,
}

fn encode_path_segments(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn substitute(template: &str, pos: Position, value: &str) -> Result<String> {
    match pos {
        Position::Authority if is_dns_label(value) => Ok(value.to_string()),
        Position::Authority => Err(ResolveError::expansion(
            template,
            format!("`{value}` is not allowed in the host position"),
        )),
        Position::Path | Position::Query => Ok(urlencoding::encode(value).into_owned()),
    }
}

fn append_segments(url: &mut String, extra: &[&str]) {
    if extra.is_empty() {
        return;
    }
    let at = path_end(url);
    let mut insert = String::new();
    if !url[..at].ends_with('/') {
        insert.push('/');
    }
    insert.push_str(&encode_path_segments(extra));
    url.insert_str(at, &insert);
}

fn finish(template: &str, out: String) -> Result<String> {
    if valid_target(&out) {
        Ok(out)
    } else {
        Err(ResolveError::expansion(
            template,
            format!("`{out}` is not an absolute http(s) URL"),
        ))
    }
}

/// Expand `template` with `path_suffix`. Plain templates ignore the suffix.
pub fn expand(template: &str, path_suffix: &str) -> Result<String> {
    expand_with(template, path_suffix, false)
}

/// Like [`expand`], but a plain template gets the suffix appended as extra
/// path segments.
pub fn expand_appending(template: &str, path_suffix: &str) -> Result<String> {
    expand_with(template, path_suffix, true)
}

fn expand_with(template: &str, path_suffix: &str, append_plain: bool) -> Result<String> {
    let template = template.trim();
    let args: Vec<&str> = path_suffix.split('/').filter(|s| !s.is_empty()).collect();
    let tokens = scan(template);

    if tokens.is_empty() {
        let mut out = template.to_string();
        if append_plain {
            append_segments(&mut out, &args);
        }
        return finish(template, out);
    }

    let sequential = tokens.iter().filter(|t| t.marker == Marker::Next).count();
    let highest = tokens
        .iter()
        .filter_map(|t| match t.marker {
            Marker::Indexed(n) => Some(n),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    let positional = sequential.max(highest);
    let has_wildcard = tokens.iter().any(|t| t.marker == Marker::Wildcard);
    let rest: &[&str] = args.get(positional..).unwrap_or(&[]);

    let auth_end = authority_end(template);
    let query_start = path_end(template);

    let mut out = String::with_capacity(template.len() + path_suffix.len());
    let mut cursor = 0;
    let mut next = 0;
    for t in &tokens {
        out.push_str(&template[cursor..t.start]);
        cursor = t.end;
        let pos = if t.start < auth_end {
            Position::Authority
        } else if t.start >= query_start {
            Position::Query
        } else {
            Position::Path
        };
        let value = match t.marker {
            Marker::Next => {
                let v = args.get(next).copied().unwrap_or("");
                next += 1;
                substitute(template, pos, v)?
            }
            Marker::Indexed(n) => substitute(template, pos, args.get(n - 1).copied().unwrap_or(""))?,
            Marker::Wildcard => match pos {
                Position::Path => encode_path_segments(rest),
                Position::Query => urlencoding::encode(&rest.join("/")).into_owned(),
                Position::Authority => substitute(template, pos, &rest.join("/"))?,
            },
        };
        out.push_str(&value);
    }
    out.push_str(&template[cursor..]);

    if !has_wildcard {
        append_segments(&mut out, rest);
    }
    finish(template, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_template_is_verbatim() {
        let t = "https://docs.example.com/Start Here?x=1";
        assert_eq!(expand("https://docs.example.com", "ignored/stuff").unwrap(), "https://docs.example.com");
        assert_eq!(expand(t, "").unwrap(), t);
    }

    #[test]
    fn positional_percent_s() {
        assert_eq!(
            expand("https://issues.example.com/browse/%s", "ABC-1").unwrap(),
            "https://issues.example.com/browse/ABC-1"
        );
    }

    #[test]
    fn missing_arguments_become_empty() {
        assert_eq!(
            expand("https://x.example.com/%s/view/%s", "a").unwrap(),
            "https://x.example.com/a/view/"
        );
    }

    #[test]
    fn extra_arguments_are_appended_before_query() {
        assert_eq!(
            expand("https://x.example.com/p/%s?tab=1", "a/b/c").unwrap(),
            "https://x.example.com/p/a/b/c?tab=1"
        );
        assert_eq!(
            expand("https://x.example.com/p/$1/", "a/b").unwrap(),
            "https://x.example.com/p/a/b"
        );
    }

    #[test]
    fn indexed_placeholders() {
        assert_eq!(
            expand("https://gh.example.com/$2/issues/$1", "42/core").unwrap(),
            "https://gh.example.com/core/issues/42"
        );
    }

    #[test]
    fn wildcard_takes_the_rest() {
        assert_eq!(
            expand("https://pager.example.com/escalate/*", "primary").unwrap(),
            "https://pager.example.com/escalate/primary"
        );
        assert_eq!(
            expand("https://pager.example.com/escalate/*", "a b/c").unwrap(),
            "https://pager.example.com/escalate/a%20b/c"
        );
    }

    #[test]
    fn query_position_is_component_encoded() {
        assert_eq!(
            expand("https://search.example.com/?q=*", "rust/async & more").unwrap(),
            "https://search.example.com/?q=rust%2Fasync%20%26%20more"
        );
        assert_eq!(
            expand("https://search.example.com/?q=%s", "a&b=c").unwrap(),
            "https://search.example.com/?q=a%26b%3Dc"
        );
    }

    #[test]
    fn substitutions_are_escaped() {
        assert_eq!(
            expand("https://x.example.com/%s", "..%2F?evil#frag").unwrap(),
            "https://x.example.com/..%252F%3Fevil%23frag"
        );
    }

    #[test]
    fn host_position_accepts_only_labels() {
        assert_eq!(
            expand("https://%s.atlassian.example.com/", "acme").unwrap(),
            "https://acme.atlassian.example.com/"
        );
        assert!(expand("https://%s.example.com/", "evil.com@").is_err());
        assert!(expand("https://%s.example.com/", "").is_err());
        assert!(expand("%s://example.com/", "javascript").is_err());
    }

    #[test]
    fn invalid_result_is_an_error() {
        let err = expand("not a url", "").unwrap_err();
        assert!(matches!(err, ResolveError::TemplateExpansion { .. }));
        assert!(expand("javascript:alert(1)", "").is_err());
    }

    #[test]
    fn appending_mode_extends_plain_templates() {
        assert_eq!(
            expand_appending("https://wiki.example.com/team", "Runbooks/Db").unwrap(),
            "https://wiki.example.com/team/Runbooks/Db"
        );
        assert_eq!(
            expand_appending("https://wiki.example.com", "a").unwrap(),
            "https://wiki.example.com/a"
        );
    }
}
