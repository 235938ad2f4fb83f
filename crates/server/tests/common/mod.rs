//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock upstream injected, so the addon and management APIs can be
//! exercised without network access.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use boxdio_core::{
    load_config_from_str, testing::MockUpstream, SqliteUserStore, UpstreamApi, User, UserStore,
};
use boxdio_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
#[allow(unused_imports)]
pub use boxdio_core::testing::fixtures;

/// Test fixture for E2E testing with a mock upstream.
///
/// A user `user1` (username `ann`, member `m1`) is registered with a stored
/// refresh credential.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_watchlist() {
///     let fixture = TestFixture::new().await;
///     fixture.upstream.set_watchlist("m1", fixtures::films(3)).await;
///
///     let response = fixture.get("/u/user1/catalog/movie/boxdio-watchlist.json").await;
///     assert_eq!(response.body["metas"].as_array().unwrap().len(), 3);
/// }
/// ```
#[allow(dead_code)]
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock upstream - configure collections and inject errors
    pub upstream: Arc<MockUpstream>,
    /// User store backing the fixture
    pub users: Arc<SqliteUserStore>,
    /// Shared application state
    pub state: Arc<AppState>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

#[allow(dead_code)]
impl TestFixture {
    /// Create a new test fixture with default settings.
    pub async fn new() -> Self {
        Self::with_config("").await
    }

    /// Create a test fixture with extra TOML appended to the base config.
    pub async fn with_config(extra_toml: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let toml = format!(
            r#"
[upstream]
client_id = "test-client"
client_secret = "test-secret"

[server]
host = "127.0.0.1"
port = 7000
public_base_url = "http://addon.test"

[database]
path = {:?}

{}
"#,
            db_path, extra_toml
        );
        let config = load_config_from_str(&toml).expect("Failed to parse test config");

        let users = Arc::new(SqliteUserStore::new(&db_path).expect("Failed to create user store"));
        users
            .upsert(&User::new("user1", "ann", "m1").with_refresh_token("r0"))
            .expect("Failed to insert user");

        let upstream = Arc::new(MockUpstream::new());
        let state = Arc::new(AppState::build(
            config,
            Arc::clone(&upstream) as Arc<dyn UpstreamApi>,
            Arc::clone(&users) as Arc<dyn UserStore>,
        ));
        let router = create_router(Arc::clone(&state));

        Self {
            router,
            upstream,
            users,
            state,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Catalog items from an addon catalog response.
    pub async fn metas(&self, path: &str) -> Vec<Value> {
        let response = self.get(path).await;
        assert_eq!(response.status, StatusCode::OK, "catalog responses are always 200");
        response.body["metas"]
            .as_array()
            .cloned()
            .expect("Response has no metas array")
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
