//! An in-process stand-in for the three GitHub endpoints the patcher uses.
//!
//! Every request is recorded with its raw (still percent-encoded) path so
//! tests can assert on exactly what went over the wire.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

use webhook_patcher::config::Credentials;
use webhook_patcher::github::{ClientOptions, GitHubClient, Pagination};
use webhook_patcher::patcher::{HookPatcher, Mode};
use webhook_patcher::rewrite::UrlRewrite;

pub const ORG: &str = "rust-lang";
pub const TOKEN: &str = "test-token";
pub const IDENTITY: &str = "ncameron";
pub const INSECURE: &str = "http://www.ncameron.org/highfive/newpr.py";
pub const SECURE: &str = "https://www.ncameron.org/highfive/newpr.py";

/// Page size the fake uses when the client sends no `per_page`.
pub const DEFAULT_PAGE_SIZE: usize = 30;

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
    pub body: Option<Value>,
}

/// Canned reply for a repository's hook listing.
#[derive(Debug, Clone)]
pub enum HooksReply {
    Json(Value),
    Raw(StatusCode, String),
}

#[derive(Default)]
pub struct FakeGitHub {
    repos: Vec<String>,
    hooks: HashMap<String, HooksReply>,
    failing_patches: HashSet<u64>,
    failing_repo_page: Option<usize>,
    link_base: Option<String>,
    latency: Duration,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repo(mut self, name: &str, hooks: Value) -> Self {
        self.repos.push(name.to_string());
        self.hooks.insert(name.to_string(), HooksReply::Json(hooks));
        self
    }

    pub fn repo_replying(mut self, name: &str, status: StatusCode, body: &str) -> Self {
        self.repos.push(name.to_string());
        self.hooks
            .insert(name.to_string(), HooksReply::Raw(status, body.to_string()));
        self
    }

    pub fn failing_patch(mut self, hook_id: u64) -> Self {
        self.failing_patches.insert(hook_id);
        self
    }

    /// Answer this page of the repository listing with a 500.
    pub fn failing_repo_page(mut self, page: usize) -> Self {
        self.failing_repo_page = Some(page);
        self
    }

    /// Point `rel="next"` links at `base` instead of the fake itself.
    pub fn link_base(mut self, base: &str) -> Self {
        self.link_base = Some(base.to_string());
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn start(self) -> RunningFake {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let shared = Arc::new(Shared {
            fake: self,
            base: base.clone(),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });

        let app = axum::Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&shared));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        RunningFake { base, shared }
    }
}

struct Shared {
    fake: FakeGitHub,
    base: String,
    requests: Mutex<Vec<Recorded>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub struct RunningFake {
    pub base: String,
    shared: Arc<Shared>,
}

impl RunningFake {
    pub fn requests(&self) -> Vec<Recorded> {
        self.shared.requests.lock().unwrap().clone()
    }

    pub fn patches(&self) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::PATCH)
            .collect()
    }

    pub fn hook_listings(&self) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::GET && r.path.ends_with("/hooks"))
            .collect()
    }

    pub fn repo_listings(&self) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.starts_with("/orgs/"))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> ClientOptions {
        ClientOptions {
            api_base: self.base.clone(),
            max_concurrency: 8,
            pagination: Pagination::FollowLinks { per_page: 100 },
            timeout: Some(Duration::from_secs(10)),
        }
    }

    pub fn client(&self) -> GitHubClient {
        self.client_with(self.options())
    }

    pub fn client_with(&self, options: ClientOptions) -> GitHubClient {
        GitHubClient::new(Credentials::new(IDENTITY, TOKEN), options).unwrap()
    }

    pub fn patcher(&self, mode: Mode) -> HookPatcher {
        HookPatcher::new(self.client(), ORG, default_rewrite(), mode)
    }
}

pub fn default_rewrite() -> UrlRewrite {
    UrlRewrite::new(vec![INSECURE.to_string()], SECURE.to_string())
}

pub fn hook(id: u64, url: &str) -> Value {
    json!({
        "id": id,
        "name": "web",
        "active": true,
        "events": ["issue_comment", "pull_request"],
        "config": {
            "url": url,
            "content_type": "form",
            "insecure_ssl": "0"
        }
    })
}

async fn handle(
    State(shared): State<Arc<Shared>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    shared.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let recorded = Recorded {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: header_str(header::AUTHORIZATION),
        user_agent: header_str(header::USER_AGENT),
        body: serde_json::from_slice(&body).ok(),
    };
    shared.requests.lock().unwrap().push(recorded.clone());

    if !shared.fake.latency.is_zero() {
        tokio::time::sleep(shared.fake.latency).await;
    }

    let response = route(&shared, &recorded);
    shared.in_flight.fetch_sub(1, Ordering::SeqCst);
    response
}

fn route(shared: &Shared, req: &Recorded) -> Response {
    let expected = format!("token {TOKEN}");
    if req.authorization.as_deref() != Some(expected.as_str()) {
        return json_response(StatusCode::UNAUTHORIZED, &json!({"message": "Bad credentials"}));
    }

    let segments: Vec<String> = req
        .path
        .trim_start_matches('/')
        .split('/')
        .map(|s| urlencoding::decode(s).unwrap().into_owned())
        .collect();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    match (req.method.as_str(), segments.as_slice()) {
        ("GET", ["user"]) => json_response(StatusCode::OK, &json!({"login": IDENTITY})),
        ("GET", ["orgs", org, "repos"]) if *org == ORG => list_repos(shared, req),
        ("GET", ["repos", ORG, repo, "hooks"]) => match shared.fake.hooks.get(*repo) {
            Some(HooksReply::Json(hooks)) => json_response(StatusCode::OK, hooks),
            Some(HooksReply::Raw(status, body)) => (*status, body.clone()).into_response(),
            None => not_found(),
        },
        ("PATCH", ["repos", ORG, _repo, "hooks", id]) => {
            let Ok(id) = id.parse::<u64>() else {
                return not_found();
            };
            if shared.fake.failing_patches.contains(&id) {
                return json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &json!({"message": "Server Error"}),
                );
            }
            let config = req
                .body
                .as_ref()
                .and_then(|b| b.get("config").cloned())
                .unwrap_or(Value::Null);
            json_response(
                StatusCode::OK,
                &json!({"id": id, "name": "web", "config": config}),
            )
        }
        _ => not_found(),
    }
}

fn list_repos(shared: &Shared, req: &Recorded) -> Response {
    let params: HashMap<String, String> = req
        .query
        .as_deref()
        .unwrap_or("")
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let page: usize = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let per_page: usize = params
        .get("per_page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PAGE_SIZE);

    if shared.fake.failing_repo_page == Some(page) {
        return json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({"message": "Server Error"}),
        );
    }

    let repos = &shared.fake.repos;
    let start = ((page - 1) * per_page).min(repos.len());
    let end = (start + per_page).min(repos.len());
    let items: Vec<Value> = repos[start..end]
        .iter()
        .map(|name| json!({"name": name, "full_name": format!("{ORG}/{name}"), "private": false}))
        .collect();

    let mut response = json_response(StatusCode::OK, &Value::Array(items));
    if end < repos.len() {
        let link = format!(
            "<{}/orgs/{ORG}/repos?page={}&per_page={per_page}>; rel=\"next\"",
            shared.fake.link_base.as_deref().unwrap_or(shared.base.as_str()),
            page + 1
        );
        response
            .headers_mut()
            .insert(header::LINK, link.parse().unwrap());
    }
    response
}

fn json_response(status: StatusCode, body: &Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn not_found() -> Response {
    json_response(StatusCode::NOT_FOUND, &json!({"message": "Not Found"}))
}
