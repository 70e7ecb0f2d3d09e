use lambda_http::request::RequestContext;
use lambda_http::Request;
use lambda_http::RequestExt;

use crate::model::Identity;

fn split_orgs(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for org in raw
        .trim_matches(|c: char| c == '[' || c == ']')
        .split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        if !out.iter().any(|o| o == org) {
            out.push(org.to_string());
        }
    }
    out
}

fn identity_from_parts(sub: &str, email: Option<String>, orgs: Option<&str>) -> Option<Identity> {
    let sub = sub.trim();
    if sub.is_empty() {
        return None;
    }
    Some(Identity::User {
        user_id: sub.to_string(),
        email,
        organizations: orgs.map(split_orgs).unwrap_or_default(),
    })
}

/// Custom Lambda authorizer (simple responses): values arrive in `fields`.
fn from_authorizer_fields(req: &Request) -> Option<Identity> {
    let ctx = match req.request_context_ref()? {
        RequestContext::ApiGatewayV2(c) => c,
        _ => return None,
    };
    let authz = ctx.authorizer.as_ref()?;
    if authz.fields.is_empty() {
        return None;
    }
    let fields = &authz.fields;
    let sub = fields.get("sub")?.as_str()?;
    let email = fields
        .get("email")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let orgs = fields.get("orgs").and_then(|v| v.as_str());
    identity_from_parts(sub, email, orgs)
}

/// JWT authorizer (HTTP API v2): claims are flattened to strings.
fn from_jwt_claims(req: &Request) -> Option<Identity> {
    let ctx_v2 = match req.request_context_ref()? {
        RequestContext::ApiGatewayV2(ctx) => ctx,
        _ => {
            tracing::debug!("Not an APIGWv2 request");
            return None;
        }
    };
    let authz = ctx_v2.authorizer.as_ref()?;
    let jwt = authz.jwt.as_ref()?;
    let claims = &jwt.claims;

    let sub = claims.get("sub")?;
    let email = claims.get("email").cloned();

    if let Ok(expected) = std::env::var("JWT_ISS") {
        if !expected.is_empty() {
            let iss = claims.get("iss").map(|v| v.as_str());
            if iss != Some(expected.as_str()) {
                tracing::error!(expected = %expected, got = ?iss, "issuer mismatch; treating caller as anonymous");
                return None;
            }
        }
    }

    let orgs = claims
        .get("custom:orgs")
        .or_else(|| claims.get("orgs"))
        .map(|s| s.as_str());
    identity_from_parts(sub, email, orgs)
}

/// Preference order: custom authorizer fields -> JWT claims -> anonymous.
pub fn identity(req: &Request) -> Identity {
    from_authorizer_fields(req)
        .or_else(|| from_jwt_claims(req))
        .unwrap_or(Identity::Anonymous)
}

#[cfg(test)]
mod tests {
    use super::*;

    use lambda_http::aws_lambda_events::event::apigw::{
        ApiGatewayRequestAuthorizer, ApiGatewayRequestAuthorizerJwtDescription,
        ApiGatewayV2httpRequestContext,
    };
    use lambda_http::Body;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::env;

    struct EnvGuard {
        k: String,
        v: Option<String>,
    }
    impl EnvGuard {
        fn set(k: &str, v: &str) -> Self {
            let old = std::env::var(k).ok();
            env::set_var(k, v);
            Self {
                k: k.to_string(),
                v: old,
            }
        }
    }
    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.v {
                Some(val) => env::set_var(&self.k, val),
                None => env::remove_var(&self.k),
            }
        }
    }

    fn with_authorizer(authorizer: ApiGatewayRequestAuthorizer) -> Request {
        let ctx = ApiGatewayV2httpRequestContext {
            authorizer: Some(authorizer),
            ..Default::default()
        };
        Request::new(Body::Empty).with_request_context(RequestContext::ApiGatewayV2(ctx))
    }

    fn jwt_request(claims: &[(&str, &str)]) -> Request {
        let claims: HashMap<String, String> = claims
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        with_authorizer(ApiGatewayRequestAuthorizer {
            jwt: Some(ApiGatewayRequestAuthorizerJwtDescription {
                claims,
                scopes: None,
            }),
            ..Default::default()
        })
    }

    fn fields_request(fields: &[(&str, &str)]) -> Request {
        let fields: HashMap<String, serde_json::Value> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        with_authorizer(ApiGatewayRequestAuthorizer {
            fields,
            ..Default::default()
        })
    }

    #[test]
    #[serial(env)]
    fn jwt_claims_identity() {
        let req = jwt_request(&[
            ("sub", "alice"),
            ("email", "alice@example.com"),
            ("custom:orgs", "eng,ops"),
        ]);
        assert_eq!(
            identity(&req),
            Identity::User {
                user_id: "alice".into(),
                email: Some("alice@example.com".into()),
                organizations: vec!["eng".into(), "ops".into()],
            }
        );
    }

    #[test]
    #[serial(env)]
    fn wrong_issuer_is_anonymous() {
        let _g = EnvGuard::set("JWT_ISS", "expected_issuer");
        let req = jwt_request(&[("sub", "alice"), ("iss", "wrong_issuer")]);
        assert_eq!(identity(&req), Identity::Anonymous);
    }

    #[test]
    #[serial(env)]
    fn matching_issuer_is_accepted() {
        let _g = EnvGuard::set("JWT_ISS", "expected_issuer");
        let req = jwt_request(&[("sub", "alice"), ("iss", "expected_issuer")]);
        assert_eq!(identity(&req).user_id(), Some("alice"));
    }

    #[test]
    fn authorizer_fields_take_precedence() {
        let req = fields_request(&[("sub", "bob"), ("orgs", "[eng ops eng]")]);
        match identity(&req) {
            Identity::User {
                user_id,
                organizations,
                ..
            } => {
                assert_eq!(user_id, "bob");
                assert_eq!(organizations, ["eng", "ops"]);
            }
            other => panic!("expected user, got {other:?}"),
        }
    }

    #[test]
    fn no_authorizer_is_anonymous() {
        assert_eq!(identity(&Request::default()), Identity::Anonymous);
    }

    #[test]
    fn blank_subject_is_anonymous() {
        let req = fields_request(&[("sub", "  ")]);
        assert_eq!(identity(&req), Identity::Anonymous);
    }
}
