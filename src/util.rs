use lambda_http::{Body, Response};
use url::Url;

/// Absolute `http`/`https` URL with a host.
pub fn valid_target(u: &str) -> bool {
    if let Ok(parsed) = Url::parse(u) {
        match parsed.scheme() {
            "http" | "https" => {}
            _ => return false,
        }
        return parsed.host().is_some();
    }
    false
}

pub fn resp_json(status: u16, v: serde_json::Value) -> Response<Body> {
    let body = Body::Text(v.to_string());
    match Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Cache-Control", "private, no-store")
        .body(body)
    {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!(error = %e, "building json response");
            let mut resp = Response::new(Body::Empty);
            *resp.status_mut() = lambda_http::http::StatusCode::INTERNAL_SERVER_ERROR;
            resp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https() {
        assert!(valid_target("https://example.com"));
    }

    #[test]
    fn accepts_bare_hostnames() {
        assert!(valid_target("http://go/directory"));
    }

    #[test]
    fn rejects_javascript_urls() {
        assert!(!valid_target("javascript:alert(1)"));
    }

    #[test]
    fn rejects_empty() {
        assert!(!valid_target(""));
    }

    #[test]
    fn json_response_has_status_and_type() {
        let r = resp_json(503, serde_json::json!({"error": "x"}));
        assert_eq!(r.status(), 503);
        assert_eq!(r.headers()["Content-Type"], "application/json");
    }
}
