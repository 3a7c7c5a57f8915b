#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use ticklist::{ServerConfig, create_app, db::Database, jwt::JwtConfig};
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"test-jwt-secret-for-integration-tests";

/// Router plus a handle on its database for direct store checks.
pub struct TestApp {
    pub app: Router,
    pub db: Database,
}

pub struct Tokens {
    pub access: String,
    pub refresh: String,
}

impl Tokens {
    fn from_json(json: &Value) -> Self {
        Tokens {
            access: json["access_token"].as_str().unwrap().to_string(),
            refresh: json["refresh_token"].as_str().unwrap().to_string(),
        }
    }

    /// Session id embedded in the refresh token.
    pub fn session_id(&self) -> String {
        JwtConfig::new(JWT_SECRET)
            .validate_refresh_token(&self.refresh)
            .unwrap()
            .sid
    }

    pub fn user_id(&self) -> i64 {
        JwtConfig::new(JWT_SECRET)
            .validate_access_token(&self.access)
            .unwrap()
            .sub
    }
}

/// Test app with rate limiting off and minimum bcrypt cost.
pub async fn create_test_app() -> TestApp {
    create_test_app_with(|_| {}).await
}

pub async fn create_test_app_with(configure: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mut config = ServerConfig {
        base: None,
        db: db.clone(),
        jwt_secret: JWT_SECRET.to_vec(),
        bcrypt_cost: 4,
        ip_header: None,
        rate_limit: false,
    };
    configure(&mut config);
    TestApp {
        app: create_app(&config),
        db,
    }
}

impl TestApp {
    /// Send a request and return the status and parsed JSON body (`Null` when empty).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn register(&self, email: &str, password: &str) -> Tokens {
        let (status, json) = self
            .send(post_json(
                "/auth/register",
                &serde_json::json!({"email": email, "password": password}),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {json}");
        Tokens::from_json(&json)
    }

    pub async fn login(&self, email: &str, password: &str) -> Tokens {
        let (status, json) = self
            .send(post_json(
                "/auth/login",
                &serde_json::json!({"email": email, "password": password}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {json}");
        Tokens::from_json(&json)
    }

    /// Redeem `tokens` at /auth/refresh, returning the raw outcome.
    pub async fn refresh(&self, tokens: &Tokens) -> (StatusCode, Value) {
        self.send(with_refresh("POST", "/auth/refresh", tokens)).await
    }
}

pub fn parse_tokens(json: &Value) -> Tokens {
    Tokens::from_json(json)
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Request carrying an access token and no body.
pub fn authed(method: &str, uri: &str, access: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())
        .unwrap()
}

/// Request carrying an access token and a JSON body.
pub fn authed_json(method: &str, uri: &str, access: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Request carrying both tokens, the refresh token in `X-Refresh-Token`.
pub fn with_refresh(method: &str, uri: &str, tokens: &Tokens) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", tokens.access))
        .header("x-refresh-token", tokens.refresh.as_str())
        .body(Body::empty())
        .unwrap()
}
