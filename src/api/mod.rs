// 🌐 REST API - axum router over the shared SQLite connection

pub mod handlers;
pub mod updates;

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::get,
    Router,
};
use chrono::Utc;
use rusqlite::Connection;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{info, warn};

use crate::apportion::DebitCache;
use crate::auth;
use crate::config::Config;
use crate::db;
use crate::entities::{Role, User};
use crate::error::{Error, Result};
use updates::UpdateNotifier;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    pub debits: Arc<DebitCache>,
    pub updates: UpdateNotifier,
    pub token_expire_hours: i64,
}

impl AppState {
    pub fn new(conn: Connection, token_expire_hours: i64) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            debits: Arc::new(DebitCache::new()),
            updates: UpdateNotifier::new(),
            token_expire_hours,
        }
    }

    /// Lock the connection; never hold the guard across an `.await`
    pub fn db(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| Error::Internal("database lock poisoned".to_string()))
    }
}

// ============================================================================
// Bearer authentication
// ============================================================================

/// Caller resolved from `Authorization: Bearer <token>`; `None` is anonymous
pub struct CurrentUser(pub Option<User>);

impl CurrentUser {
    pub fn require(&self, role: Role) -> Result<&User> {
        auth::require_role(self.0.as_ref(), role)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Some(token) = bearer_token(parts) else {
            return Ok(CurrentUser(None));
        };
        let conn = state.db()?;
        Ok(CurrentUser(auth::authenticate(&conn, token)?))
    }
}

// ============================================================================
// Router
// ============================================================================

/// All API routes, nested under `/api`
pub fn router(state: AppState) -> Router {
    use handlers::*;

    let api = Router::new()
        .route("/health", get(health))
        .route("/login", axum::routing::post(login))
        .route("/updates", get(updates::stream_updates))
        .route("/boards", get(list_boards).put(create_board))
        .route("/boards/:id", get(get_board).post(rename_board).delete(delete_board))
        .route("/boards/:id/debits", get(board_debits))
        .route("/boards/:id/events", get(board_events))
        .route("/boards/:id/categories", get(list_categories).put(add_category))
        .route(
            "/boards/:id/categories/:item_id",
            axum::routing::post(edit_category).delete(remove_category),
        )
        .route("/boards/:id/members", get(list_members).put(add_member))
        .route(
            "/boards/:id/members/:item_id",
            axum::routing::post(edit_member).delete(remove_member),
        )
        .route("/boards/:id/products", get(list_products).put(add_product))
        .route(
            "/boards/:id/products/:item_id",
            axum::routing::post(edit_product).delete(remove_product),
        )
        .route("/users", get(list_users).put(create_user))
        .route("/users/:id", get(get_user).post(edit_user).delete(delete_user));

    Router::new().nest("/api", api).with_state(state)
}

/// The API plus the optional frontend and debug CORS
pub fn app(state: AppState, config: &Config) -> Router {
    let mut app = router(state);

    if let Some(dir) = &config.static_dir {
        info!("📁 Serving frontend from {}", dir.display());
        let index = ServeFile::new(dir.join("index.html"));
        app = app.fallback_service(ServeDir::new(dir).fallback(index));
    }

    if config.debug {
        warn!("Debug mode: CORS allows any origin");
        app = app.layer(CorsLayer::permissive());
    }

    app
}

/// Open the database, bootstrap the admin account and serve until shutdown
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let conn = db::open_database(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;

    if let Some(password) = auth::ensure_admin(&conn, config.default_password.as_deref())? {
        info!("🔑 'admin' account created with password: {password}");
    }
    let purged = db::purge_expired_sessions(&conn, Utc::now())?;
    if purged > 0 {
        info!("Purged {purged} expired sessions");
    }

    let state = AppState::new(conn, config.token_expire_hours);
    // clients reconnecting after a restart refetch everything
    state.updates.publish(&[]);

    let app = app(state, &config);
    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    info!("🚀 Spesometro API listening on http://{address}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("SIGTERM received, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const ADMIN_PASSWORD: &str = "secret";

    fn test_state() -> AppState {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        auth::ensure_admin(&conn, Some(ADMIN_PASSWORD)).unwrap();
        AppState::new(conn, 3)
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        }
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, read_json(response).await)
    }

    async fn login(app: &Router, username: &str, password: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("username={username}&password={password}")))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, read_json(response).await)
    }

    async fn token_for(app: &Router, username: &str, password: &str) -> String {
        let (status, body) = login(app, username, password).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn create_id(app: &Router, uri: &str, token: &str, body: Value) -> String {
        let (status, body) = send(app, "PUT", uri, Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::OK, "PUT {uri} failed: {body}");
        body["id"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_bearer_token_parsing() {
        let parts = |value: &str| {
            let (parts, _) = Request::builder()
                .header(AUTHORIZATION, value)
                .body(())
                .unwrap()
                .into_parts();
            parts
        };

        assert_eq!(bearer_token(&parts("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&parts("bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&parts("Basic abc")), None);
        assert_eq!(bearer_token(&parts("Bearer ")), None);
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(test_state());
        let (status, body) = send(&app, "GET", "/api/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_login_errors() {
        let app = router(test_state());

        let (status, body) = login(&app, "admin", "wrong").await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
        assert_eq!(body["detail"], "Wrong password!");

        let (status, body) = login(&app, "nobody", "pw").await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
        assert_eq!(body["detail"], "User not found!");

        let (status, body) = login(&app, "", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Cannot insert an empty value!");
    }

    #[tokio::test]
    async fn test_anonymous_is_rejected_with_bearer_challenge() {
        let app = router(test_state());
        let request = Request::builder()
            .uri("/api/boards")
            .body(Body::empty())
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );

        let (status, _) = send(&app, "GET", "/api/boards", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_board_flow_and_debits() {
        let app = router(test_state());
        let token = token_for(&app, "admin", ADMIN_PASSWORD).await;

        let board = create_id(&app, "/api/boards", &token, json!({"name": "Trip"})).await;
        let base = format!("/api/boards/{board}");

        let categories = format!("{base}/categories");
        let food = create_id(&app, &categories, &token, json!({"name": "food"})).await;
        let drink = create_id(&app, &categories, &token, json!({"name": "drink"})).await;

        let anna = create_id(
            &app,
            &format!("{base}/members"),
            &token,
            json!({"name": "Anna", "categories": [food, drink], "paid": 1300}),
        )
        .await;
        let bruno = create_id(
            &app,
            &format!("{base}/members"),
            &token,
            json!({"name": "Bruno", "categories": [food]}),
        )
        .await;

        create_id(
            &app,
            &format!("{base}/products"),
            &token,
            json!({"name": "Pizza", "price": 1000, "categories": [food]}),
        )
        .await;
        create_id(
            &app,
            &format!("{base}/products"),
            &token,
            json!({"name": "Wine", "price": 300, "categories": [drink]}),
        )
        .await;

        let debits = format!("{base}/debits");
        let (status, sheet) = send(&app, "GET", &debits, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sheet["total_price"], 1300);

        let debit_of = |id: &str| {
            sheet["members"]
                .as_array()
                .unwrap()
                .iter()
                .find(|m| m["member_id"] == id)
                .map(|m| (m["debit"].as_i64().unwrap(), m["balance"].as_i64().unwrap()))
                .unwrap()
        };
        assert_eq!(debit_of(&anna), (800, 500));
        assert_eq!(debit_of(&bruno), (500, -500));

        let (status, boards) = send(&app, "GET", "/api/boards", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(boards.as_array().unwrap().len(), 1);

        let events = format!("{base}/events");
        let (status, events) = send(&app, "GET", &events, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(events.as_array().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_category_removal_cascades() {
        let app = router(test_state());
        let token = token_for(&app, "admin", ADMIN_PASSWORD).await;

        let board = create_id(&app, "/api/boards", &token, json!({"name": "Party"})).await;
        let base = format!("/api/boards/{board}");
        let categories = format!("{base}/categories");
        let food = create_id(&app, &categories, &token, json!({"name": "food"})).await;
        create_id(
            &app,
            &format!("{base}/members"),
            &token,
            json!({"name": "Anna", "categories": [food]}),
        )
        .await;

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("{base}/categories/{food}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, members) = send(&app, "GET", &format!("{base}/members"), Some(&token), None).await;
        assert_eq!(members[0]["categories"], json!([]));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let app = router(test_state());
        let token = token_for(&app, "admin", ADMIN_PASSWORD).await;

        let (status, _) = send(&app, "GET", "/api/boards/missing", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let board = create_id(&app, "/api/boards", &token, json!({"name": "Trip"})).await;
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/boards/{board}/members/missing"),
            Some(&token),
            Some(json!({"name": "Ghost"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_role_gates() {
        let app = router(test_state());
        let admin = token_for(&app, "admin", ADMIN_PASSWORD).await;

        create_id(
            &app,
            "/api/users",
            &admin,
            json!({"username": "Guido", "password": "pw", "role": "guest"}),
        )
        .await;
        let guest = token_for(&app, "guido", "pw").await;

        let (status, _) = send(&app, "GET", "/api/boards", Some(&guest), None).await;
        assert_eq!(status, StatusCode::OK);

        let body = json!({"name": "X"});
        let (status, _) = send(&app, "PUT", "/api/boards", Some(&guest), Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "GET", "/api/users", Some(&guest), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_user_management() {
        let app = router(test_state());
        let admin = token_for(&app, "admin", ADMIN_PASSWORD).await;

        let body = json!({"username": "mario", "password": "pw", "role": "editor"});
        create_id(&app, "/api/users", &admin, body.clone()).await;

        let (status, _) = send(&app, "PUT", "/api/users", Some(&admin), Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            "PUT",
            "/api/users",
            Some(&admin),
            Some(json!({"username": "admin", "password": "pw", "role": "guest"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

        let (status, users) = send(&app, "GET", "/api/users", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let users = users.as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u.get("password_hash").is_none()));

        let admin_id = users
            .iter()
            .find(|u| u["username"] == "admin")
            .map(|u| u["id"].as_str().unwrap().to_string())
            .unwrap();
        let uri = format!("/api/users/{admin_id}");
        let (status, _) = send(&app, "DELETE", &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mutations_publish_updates() {
        let state = test_state();
        let mut updates = state.updates.subscribe();
        let app = router(state);
        let token = token_for(&app, "admin", ADMIN_PASSWORD).await;

        let board = create_id(&app, "/api/boards", &token, json!({"name": "Trip"})).await;
        assert_eq!(updates.recv().await.unwrap().keys, vec!["boards".to_string()]);

        create_id(
            &app,
            &format!("/api/boards/{board}/categories"),
            &token,
            json!({"name": "food"}),
        )
        .await;
        assert_eq!(
            updates.recv().await.unwrap().keys,
            vec!["boards".to_string(), board.clone()]
        );

        let uri = format!("/api/boards/{board}");
        let (status, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updates.recv().await.unwrap().keys, vec!["boards".to_string()]);
    }

    #[tokio::test]
    async fn test_update_stream_emits_sse_frames() {
        let state = test_state();
        let app = router(state.clone());
        let request = Request::builder()
            .uri("/api/updates")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        // the handler subscribed before returning
        let mut body = response.into_body().into_data_stream();
        assert_eq!(state.updates.publish(&["boards"]), 1);

        let frame = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            tokio_stream::StreamExt::next(&mut body),
        )
        .await
        .expect("no frame within 5s")
        .unwrap()
        .unwrap();
        let frame = String::from_utf8(frame.to_vec()).unwrap();

        assert!(frame.contains("event: update"), "{frame}");
        assert!(frame.contains(r#"data: ["boards"]"#), "{frame}");
    }

    #[tokio::test]
    async fn test_failed_audit_rolls_back_change() {
        let state = test_state();
        let app = router(state.clone());
        let token = token_for(&app, "admin", ADMIN_PASSWORD).await;

        let board = create_id(&app, "/api/boards", &token, json!({"name": "Trip"})).await;
        let categories = format!("/api/boards/{board}/categories");

        state
            .db()
            .unwrap()
            .execute("DROP TABLE events", [])
            .unwrap();

        let body = json!({"name": "food"});
        let (status, _) = send(&app, "PUT", &categories, Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, listed) = send(&app, "GET", &categories, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed, json!([]));
    }
}
