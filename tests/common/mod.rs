//! Common test utilities for E2E tests
//!
//! [`TestServer`] runs the real router against [`MockGitHub`], an in-process
//! stand-in for github.com and api.github.com.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use repodeck::auth::{Provider, SessionClaims};
use repodeck::{AppState, config};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const GITHUB_TOKEN: &str = "gho_test_token";
pub const GITHUB_LOGIN: &str = "octocat";

/// Build a repository payload the way GitHub returns it
pub fn repo_json(owner: &str, name: &str) -> Value {
    json!({
        "id": name.bytes().map(u64::from).sum::<u64>(),
        "node_id": format!("R_{name}"),
        "name": name,
        "full_name": format!("{owner}/{name}"),
        "private": false,
        "owner": { "login": owner, "id": 1, "avatar_url": "", "type": "User" },
        "html_url": format!("https://github.com/{owner}/{name}"),
        "description": null,
        "fork": false,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-02T00:00:00Z",
        "pushed_at": null,
        "language": "Rust",
        "stargazers_count": 1,
        "default_branch": "main"
    })
}

/// Scriptable GitHub state
pub struct MockGitHubState {
    pub repositories: Mutex<Vec<Value>>,
    /// `owner/name` -> status returned by DELETE
    pub delete_failures: Mutex<HashMap<String, u16>>,
    pub profile: Mutex<Value>,
    pub emails: Mutex<Value>,
    /// Method and path of every request received
    pub requests: Mutex<Vec<String>>,
}

impl MockGitHubState {
    fn new() -> Self {
        Self {
            repositories: Mutex::new(vec![
                repo_json(GITHUB_LOGIN, "alpha"),
                repo_json(GITHUB_LOGIN, "beta"),
                repo_json(GITHUB_LOGIN, "gamma"),
            ]),
            delete_failures: Mutex::new(HashMap::new()),
            profile: Mutex::new(json!({
                "login": GITHUB_LOGIN,
                "id": 583231,
                "avatar_url": "https://avatars.githubusercontent.com/u/583231",
                "name": "The Octocat",
                "email": "octocat@github.com"
            })),
            emails: Mutex::new(json!([])),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, request: String) {
        self.requests.lock().unwrap().push(request);
    }
}

/// In-process GitHub
pub struct MockGitHub {
    pub addr: String,
    pub state: Arc<MockGitHubState>,
}

impl MockGitHub {
    pub async fn start() -> Self {
        let state = Arc::new(MockGitHubState::new());

        let app = Router::new()
            .route("/login/oauth/access_token", post(access_token))
            .route("/user", get(user))
            .route("/user/emails", get(user_emails))
            .route("/user/repos", get(list_repos).post(create_repo))
            .route(
                "/repos/:owner/:repo",
                get(get_repo).patch(update_repo).delete(delete_repo),
            )
            .route("/repos/:owner/:repo/languages", get(languages))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn repository_names(&self) -> Vec<String> {
        self.state
            .repositories
            .lock()
            .unwrap()
            .iter()
            .map(|repo| repo["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn fail_delete(&self, name: &str, status: u16) {
        self.state
            .delete_failures
            .lock()
            .unwrap()
            .insert(format!("{GITHUB_LOGIN}/{name}"), status);
    }

    pub fn set_profile(&self, profile: Value) {
        *self.state.profile.lock().unwrap() = profile;
    }

    pub fn set_emails(&self, emails: Value) {
        *self.state.emails.lock().unwrap() = emails;
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn count(&self, request: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == request).count()
    }
}

fn message(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some(format!("Bearer {GITHUB_TOKEN}").as_str())
}

async fn access_token(
    State(state): State<Arc<MockGitHubState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("POST /login/oauth/access_token".to_string());
    match body["code"].as_str() {
        Some("good-code") => Json(json!({
            "access_token": GITHUB_TOKEN,
            "token_type": "bearer",
            "scope": "read:user,user:email"
        })),
        _ => Json(json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        })),
    }
}

async fn user(State(state): State<Arc<MockGitHubState>>, headers: HeaderMap) -> Response {
    state.record("GET /user".to_string());
    if !authorized(&headers) {
        return message(StatusCode::UNAUTHORIZED, "Bad credentials");
    }
    Json(state.profile.lock().unwrap().clone()).into_response()
}

async fn user_emails(State(state): State<Arc<MockGitHubState>>, headers: HeaderMap) -> Response {
    state.record("GET /user/emails".to_string());
    if !authorized(&headers) {
        return message(StatusCode::UNAUTHORIZED, "Bad credentials");
    }
    Json(state.emails.lock().unwrap().clone()).into_response()
}

async fn list_repos(State(state): State<Arc<MockGitHubState>>, headers: HeaderMap) -> Response {
    state.record("GET /user/repos".to_string());
    if !authorized(&headers) {
        return message(StatusCode::UNAUTHORIZED, "Bad credentials");
    }
    Json(Value::Array(state.repositories.lock().unwrap().clone())).into_response()
}

async fn create_repo(
    State(state): State<Arc<MockGitHubState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("POST /user/repos".to_string());
    if !authorized(&headers) {
        return message(StatusCode::UNAUTHORIZED, "Bad credentials");
    }

    let name = body["name"].as_str().unwrap_or_default().to_string();
    let mut repositories = state.repositories.lock().unwrap();
    if repositories.iter().any(|repo| repo["name"] == name.as_str()) {
        return message(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Repository creation failed.",
        );
    }

    let mut created = repo_json(GITHUB_LOGIN, &name);
    created["description"] = body["description"].clone();
    created["private"] = body["private"].clone();
    repositories.insert(0, created.clone());
    (StatusCode::CREATED, Json(created)).into_response()
}

async fn get_repo(
    State(state): State<Arc<MockGitHubState>>,
    headers: HeaderMap,
    Path((owner, repo)): Path<(String, String)>,
) -> Response {
    state.record(format!("GET /repos/{owner}/{repo}"));
    if !authorized(&headers) {
        return message(StatusCode::UNAUTHORIZED, "Bad credentials");
    }
    let full_name = format!("{owner}/{repo}");
    match state
        .repositories
        .lock()
        .unwrap()
        .iter()
        .find(|r| r["full_name"] == full_name.as_str())
    {
        Some(found) => Json(found.clone()).into_response(),
        None => message(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn update_repo(
    State(state): State<Arc<MockGitHubState>>,
    headers: HeaderMap,
    Path((owner, repo)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    state.record(format!("PATCH /repos/{owner}/{repo}"));
    if !authorized(&headers) {
        return message(StatusCode::UNAUTHORIZED, "Bad credentials");
    }
    let full_name = format!("{owner}/{repo}");
    let mut repositories = state.repositories.lock().unwrap();
    let Some(found) = repositories
        .iter_mut()
        .find(|r| r["full_name"] == full_name.as_str())
    else {
        return message(StatusCode::NOT_FOUND, "Not Found");
    };

    if let Some(name) = body["name"].as_str() {
        found["name"] = json!(name);
        found["full_name"] = json!(format!("{owner}/{name}"));
    }
    if !body["description"].is_null() {
        found["description"] = body["description"].clone();
    }
    if let Some(private) = body["private"].as_bool() {
        found["private"] = json!(private);
    }
    Json(found.clone()).into_response()
}

async fn delete_repo(
    State(state): State<Arc<MockGitHubState>>,
    headers: HeaderMap,
    Path((owner, repo)): Path<(String, String)>,
) -> Response {
    state.record(format!("DELETE /repos/{owner}/{repo}"));
    if !authorized(&headers) {
        return message(StatusCode::UNAUTHORIZED, "Bad credentials");
    }

    let full_name = format!("{owner}/{repo}");
    if let Some(status) = state.delete_failures.lock().unwrap().get(&full_name) {
        let status = StatusCode::from_u16(*status).unwrap();
        return message(status, "Must have admin rights to Repository.");
    }

    let mut repositories = state.repositories.lock().unwrap();
    let before = repositories.len();
    repositories.retain(|r| r["full_name"] != full_name.as_str());
    if repositories.len() == before {
        return message(StatusCode::NOT_FOUND, "Not Found");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn languages(
    State(state): State<Arc<MockGitHubState>>,
    Path((owner, repo)): Path<(String, String)>,
) -> Json<Value> {
    state.record(format!("GET /repos/{owner}/{repo}/languages"));
    Json(json!({ "Rust": 40960, "Shell": 512 }))
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub github: MockGitHub,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance backed by a fresh mock GitHub
    pub async fn new() -> Self {
        let github = MockGitHub::start().await;

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                environment: config::Environment::Development,
            },
            app: config::AppInfoConfig {
                name: "Repodeck Test".to_string(),
                base_url: "http://localhost:3000".to_string(),
                dashboard_path: "/dashboard".to_string(),
            },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 604800,
                // bcrypt minimum
                password_hash_cost: 4,
                users: vec![
                    config::UserSeed {
                        id: "1".to_string(),
                        email: "admin@example.com".to_string(),
                        password: "admin123".to_string(),
                        password_hash: None,
                        name: "Admin User".to_string(),
                    },
                    config::UserSeed {
                        id: "2".to_string(),
                        email: "user@example.com".to_string(),
                        password: "user123".to_string(),
                        password_hash: None,
                        name: "Test User".to_string(),
                    },
                ],
            },
            github: config::GitHubConfig {
                client_id: "test-client-id".to_string(),
                client_secret: "test-client-secret".to_string(),
                redirect_uri: "http://localhost:3000/api/auth/github/callback".to_string(),
                oauth_base_url: github.addr.clone(),
                api_base_url: github.addr.clone(),
            },
            features: config::FeatureFlags {
                analytics: false,
                debug: true,
                beta: false,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).unwrap();

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());

        let app = repodeck::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr,
            state,
            github,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Log in with email/password and return the session token
    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "login should succeed");
        session_cookie(&response).expect("login sets the session cookie")
    }

    /// Session token of the mock GitHub user, signed directly
    pub fn github_session(&self) -> String {
        self.state
            .sessions
            .sign(&SessionClaims {
                user_id: "github_583231".to_string(),
                email: "octocat@github.com".to_string(),
                name: Some("The Octocat".to_string()),
                provider: Some(Provider::Github),
                access_token: Some(GITHUB_TOKEN.to_string()),
            })
            .expect("Failed to create test token")
    }
}

/// `auth_token` value from the response's Set-Cookie headers
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    set_cookie_header(response).and_then(|header| {
        header
            .split(';')
            .next()
            .and_then(|pair| pair.trim().strip_prefix("auth_token="))
            .map(ToOwned::to_owned)
    })
}

/// Raw `auth_token` Set-Cookie header
pub fn set_cookie_header(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("auth_token="))
        .map(ToOwned::to_owned)
}

/// Location header of a redirect
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .expect("location header")
        .to_string()
}
