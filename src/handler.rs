use std::borrow::Cow;
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb as ddb;
use lambda_http::{Body, Error, Request, Response};
use serde_json::json;

use crate::{
    auth,
    clicks::{ClickRecorder, ClickWorker},
    config::Config,
    ddb::{DynamoClickSink, DynamoRepository},
    error::ResolveError,
    model::ResolutionResult,
    resolver::Resolver,
    util::resp_json,
};

#[derive(Clone)]
pub struct Ctx {
    pub resolver: Arc<Resolver>,
    pub config: Arc<Config>,
}

impl Ctx {
    /// Cold start: config from the environment, DynamoDB-backed repository
    /// and click sink sharing one client.
    pub async fn new() -> Result<(Self, ClickWorker), Error> {
        let config = Config::from_env()?;
        let aws = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let client = ddb::Client::new(&aws);

        let repo = Arc::new(DynamoRepository::new(client.clone(), config.table.clone()));
        let sink = Arc::new(DynamoClickSink::new(client, config.table.clone()));
        let (clicks, worker) = ClickRecorder::spawn(sink, config.click_queue_capacity);
        let resolver = Resolver::new(repo, config.resolver.clone()).with_clicks(clicks);

        tracing::info!(table = %config.table, domain = %config.domain, "golinks ready");
        Ok((Self::from_parts(resolver, config), worker))
    }

    pub fn from_parts(resolver: Resolver, config: Config) -> Self {
        Self {
            resolver: Arc::new(resolver),
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Health,
    Reserved,
    Resolve,
}

#[derive(Debug, Clone, Copy)]
enum PathMatch {
    Exact(&'static str),
    Prefix(&'static str),
    Any,
}

impl PathMatch {
    fn matches(&self, path: &str) -> bool {
        match self {
            PathMatch::Exact(p) => path == *p,
            PathMatch::Prefix(p) => path.starts_with(p),
            PathMatch::Any => true,
        }
    }
}

/// Checked in order; the first match wins. The catch-all resolve route must
/// be the single last entry.
const ROUTES: &[(PathMatch, Route)] = &[
    (PathMatch::Exact("/_/health_check"), Route::Health),
    (PathMatch::Prefix("/_/"), Route::Reserved),
    (PathMatch::Prefix("/v1/"), Route::Reserved),
    (PathMatch::Any, Route::Resolve),
];

pub fn route_for(path: &str) -> Route {
    ROUTES
        .iter()
        .find(|(m, _)| m.matches(path))
        .map(|(_, r)| *r)
        .unwrap_or(Route::Resolve)
}

pub async fn router(req: Request, ctx: &Ctx) -> Result<Response<Body>, Error> {
    let method = req.method().as_str();
    if method != "GET" && method != "HEAD" {
        return json_err(404, "not_found", "Not Found");
    }

    match route_for(req.uri().path()) {
        Route::Health => Ok(Response::builder()
            .status(200)
            .header("Cache-Control", "no-store")
            .body("OK".into())
            .map_err(|e| Error::from(format!("resp: {e}")))?),
        Route::Reserved => json_err(404, "not_found", "Not Found"),
        Route::Resolve => resolve_link(req, ctx).await,
    }
}

async fn resolve_link(req: Request, ctx: &Ctx) -> Result<Response<Body>, Error> {
    let identity = auth::identity(&req);
    let raw = match req.uri().query() {
        Some(q) if !q.is_empty() => format!("{}?{}", req.uri().path(), q),
        _ => req.uri().path().to_string(),
    };

    let outcome = tokio::time::timeout(
        ctx.config.request_timeout,
        ctx.resolver.resolve(&raw, &identity),
    )
    .await;

    let result = match outcome {
        Ok(Ok(r)) => r,
        Ok(Err(ResolveError::RepositoryUnavailable(reason))) => {
            tracing::error!(path = %raw, reason = %reason, "repository unavailable");
            return json_err(503, "service_degraded", "Shortcut storage is unavailable");
        }
        Ok(Err(e)) => {
            tracing::error!(path = %raw, error = %e, "unexpected resolution error");
            return json_err(500, "internal", "Resolution failed");
        }
        Err(_) => {
            tracing::warn!(path = %raw, "resolution timed out");
            return json_err(504, "timeout", "Resolution timed out");
        }
    };

    match result {
        ResolutionResult::Redirect { destination, .. } => redirect(&destination),
        ResolutionResult::Fallback { query } => match ctx.config.fallback_destination(&query) {
            Some(search) => redirect(&search),
            None => Ok(resp_json(
                404,
                json!({
                    "error": "not_found",
                    "query": query,
                    "create": create_link(&ctx.config.domain, &query),
                }),
            )),
        },
        ResolutionResult::Ambiguous { candidates } => {
            Ok(resp_json(300, json!({ "candidates": candidates })))
        }
        ResolutionResult::Home => match &ctx.config.home_url {
            Some(home) => redirect(home),
            None => Ok(resp_json(200, json!({ "home": true }))),
        },
    }
}

/// Entry point for creating the missing link; the reserved `/_/` prefix never resolves.
fn create_link(domain: &str, query: &str) -> String {
    format!("https://{domain}/_/?create={}", urlencoding::encode(query))
}

fn redirect(location: &str) -> Result<Response<Body>, Error> {
    // Url serialization percent-encodes anything not allowed in a header.
    let location = url::Url::parse(location)
        .map(String::from)
        .unwrap_or_else(|_| location.to_string());
    Response::builder()
        .status(302)
        .header("Location", location)
        .header("Cache-Control", "private, no-store")
        .body(Body::Empty)
        .map_err(|e| Error::from(format!("resp: {e}")))
}

pub fn json_err(
    status: u16,
    code: &'static str,
    message: impl Into<Cow<'static, str>>,
) -> Result<Response<Body>, Error> {
    let payload = json!({
        "error": code,
        "message": message.into(),
    });
    Ok(resp_json(status, payload))
}
