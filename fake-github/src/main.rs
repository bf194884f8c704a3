use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const INSECURE_URL: &str = "http://www.ncameron.org/highfive/newpr.py";
const SECURE_URL: &str = "https://www.ncameron.org/highfive/newpr.py";

#[derive(Parser)]
#[command(name = "fake-github", about = "Local stand-in for the GitHub webhook API")]
struct Args {
    #[arg(long, default_value = "3000")]
    port: u16,
    #[arg(long, default_value = "test-token")]
    token: String,
    #[arg(long, default_value = "rust-lang")]
    org: String,
}

struct AppState {
    token: String,
    org: String,
    hooks: Mutex<BTreeMap<String, Vec<Value>>>,
}

fn seed() -> BTreeMap<String, Vec<Value>> {
    let hook = |id: u64, url: &str| {
        json!({
            "id": id,
            "name": "web",
            "active": true,
            "events": ["issue_comment", "pull_request"],
            "config": {"url": url, "content_type": "form", "insecure_ssl": "0"}
        })
    };

    let mut hooks = BTreeMap::new();
    hooks.insert("rust".to_string(), vec![hook(1, INSECURE_URL)]);
    hooks.insert("cargo".to_string(), vec![hook(2, SECURE_URL)]);
    hooks.insert("rfcs".to_string(), Vec::new());
    hooks
}

fn check_auth(headers: &HeaderMap, state: &AppState) -> Result<(), StatusCode> {
    let auth_header = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let expected = format!("token {}", state.token);
    if auth_header == expected {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

fn unauthorized(status: StatusCode) -> axum::response::Response {
    (status, Json(json!({"message": "Bad credentials"}))).into_response()
}

fn not_found() -> axum::response::Response {
    (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response()
}

async fn user_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(status) = check_auth(&headers, &state) {
        return unauthorized(status);
    }
    let login = headers
        .get("User-Agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    (StatusCode::OK, Json(json!({"login": login}))).into_response()
}

async fn repos_handler(
    State(state): State<Arc<AppState>>,
    Path(org): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Err(status) = check_auth(&headers, &state) {
        return unauthorized(status);
    }
    if org != state.org {
        return not_found();
    }

    let hooks = state.hooks.lock().unwrap();
    let repos: Vec<Value> = hooks
        .keys()
        .map(|name| json!({"name": name, "full_name": format!("{org}/{name}")}))
        .collect();
    (StatusCode::OK, Json(Value::Array(repos))).into_response()
}

async fn hooks_handler(
    State(state): State<Arc<AppState>>,
    Path((org, repo)): Path<(String, String)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Err(status) = check_auth(&headers, &state) {
        return unauthorized(status);
    }
    if org != state.org {
        return not_found();
    }

    match state.hooks.lock().unwrap().get(&repo) {
        Some(hooks) => (StatusCode::OK, Json(Value::Array(hooks.clone()))).into_response(),
        None => not_found(),
    }
}

async fn patch_hook_handler(
    State(state): State<Arc<AppState>>,
    Path((org, repo, id)): Path<(String, String, u64)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if let Err(status) = check_auth(&headers, &state) {
        return unauthorized(status);
    }
    if org != state.org {
        return not_found();
    }

    let timestamp = Utc::now().to_rfc3339();
    println!("{}", format!("[{timestamp}] PATCH received").green().bold());
    println!("  {}: {}/{}", "Repo".cyan(), org, repo);
    println!("  {}: {}", "Hook".cyan(), id);

    let Some(new_config) = body.get("config").cloned() else {
        println!("  {}", "missing `config` key".red());
        println!("{}", "---".dimmed());
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"message": "Invalid request", "errors": ["config is required"]})),
        )
            .into_response();
    };
    if let Some(url) = new_config.get("url").and_then(Value::as_str) {
        println!("  {}: {}", "URL".cyan(), url);
    }
    println!("{}", "---".dimmed());

    let mut all = state.hooks.lock().unwrap();
    let Some(hook) = all
        .get_mut(&repo)
        .and_then(|hooks| hooks.iter_mut().find(|h| h["id"] == id))
    else {
        return not_found();
    };
    hook["config"] = new_config;
    (StatusCode::OK, Json(hook.clone())).into_response()
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let state = Arc::new(AppState {
        token: args.token.clone(),
        org: args.org.clone(),
        hooks: Mutex::new(seed()),
    });

    let app = axum::Router::new()
        .route("/user", axum::routing::get(user_handler))
        .route("/orgs/:org/repos", axum::routing::get(repos_handler))
        .route("/repos/:org/:repo/hooks", axum::routing::get(hooks_handler))
        .route(
            "/repos/:org/:repo/hooks/:id",
            axum::routing::patch(patch_hook_handler),
        )
        .with_state(state);

    println!(
        "Fake GitHub API running on http://0.0.0.0:{} for org {}",
        args.port, args.org
    );
    println!("Token: {}", args.token);
    println!("Waiting for patches...\n");

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port))
        .await
        .expect("Failed to bind port");
    axum::serve(listener, app).await.expect("Server error");
}
