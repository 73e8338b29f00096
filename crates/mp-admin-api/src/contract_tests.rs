use crate::test_support::{lazy_state, state_with_pool};
use crate::{build_router, openapi_json};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tokio::sync::OnceCell;
use tower::ServiceExt;
use uuid::Uuid;

static MIGRATIONS: OnceCell<()> = OnceCell::const_new();

/// `None` when no database is configured; DB-backed tests then return early.
async fn test_pool() -> Option<Pool<Postgres>> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("connect database");
    MIGRATIONS
        .get_or_init(|| async {
            mp_core::migrations::run(&pool).await.expect("run migrations");
        })
        .await;
    Some(pool)
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    session: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(session) = session {
        builder = builder.header("cookie", format!("mp_admin_session={session}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let payload = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, payload, cookie)
}

async fn insert_admin(pool: &Pool<Postgres>, password: &str) -> String {
    let admin_user_id = Uuid::new_v4().to_string();
    let username = format!("admin-{}", &admin_user_id[..8]);
    let password_hash = mp_core::password::hash_password(password).expect("hash password");
    sqlx::query(
        "INSERT INTO mp_admin.admin_users (admin_user_id, username, password_hash, is_active) \
         VALUES ($1, $2, $3, TRUE)",
    )
    .bind(&admin_user_id)
    .bind(&username)
    .bind(&password_hash)
    .execute(pool)
    .await
    .expect("insert admin user");
    username
}

/// Logs in through the API and returns the session cookie value.
async fn admin_session(app: &Router, pool: &Pool<Postgres>) -> String {
    let username = insert_admin(pool, "admin-password-1").await;
    let (status, body, cookie) = call(
        app,
        "POST",
        "/v1/admin/auth/login",
        None,
        Some(json!({ "username": username, "password": "admin-password-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login: {body}");
    let cookie = cookie.expect("session cookie");
    cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("mp_admin_session="))
        .expect("cookie value")
        .to_string()
}

async fn insert_user(pool: &Pool<Postgres>, roles: &[&str]) -> String {
    let user_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO mp.users (user_id, email, password_hash, display_name) \
         VALUES ($1, $2, 'x', 'Moderated User')",
    )
    .bind(&user_id)
    .bind(format!("{}@example.com", &user_id[..12]))
    .execute(pool)
    .await
    .expect("insert user");
    for role in roles {
        sqlx::query("INSERT INTO mp.user_roles (user_id, role) VALUES ($1, $2)")
            .bind(&user_id)
            .bind(role)
            .execute(pool)
            .await
            .expect("insert role");
    }
    user_id
}

#[tokio::test]
async fn openapi_contract_contains_admin_paths() {
    let app = Router::new().route("/v1/openapi.json", get(openapi_json));
    let request = Request::builder()
        .uri("/v1/openapi.json")
        .header("host", "localhost:8081")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let payload: Value = serde_json::from_slice(&body).expect("json body");

    assert_eq!(payload.get("openapi").and_then(Value::as_str), Some("3.0.3"));
    assert_eq!(
        payload.pointer("/servers/0/url").and_then(Value::as_str),
        Some("http://localhost:8081")
    );
    for pointer in [
        "/paths/~1v1~1admin~1auth~1login/post",
        "/paths/~1v1~1admin~1users~1{user_id}~1suspend/post",
        "/paths/~1v1~1admin~1tags~1{tag_id}/put",
        "/paths/~1v1~1admin~1services~1{service}~1config/put",
        "/paths/~1v1~1admin~1audit-logs/get",
        "/components/schemas/DashboardSnapshot",
    ] {
        assert!(payload.pointer(pointer).is_some(), "missing {pointer}");
    }
}

#[tokio::test]
async fn admin_routes_require_a_session() {
    let app = build_router(lazy_state());
    let cases = [
        ("GET", "/v1/admin/dashboard", None),
        ("GET", "/v1/admin/users", None),
        (
            "POST",
            "/v1/admin/users/u1/suspend",
            Some(json!({ "reason": "spam" })),
        ),
        ("DELETE", "/v1/admin/users/u1/roles/provider", None),
        ("GET", "/v1/admin/listings", None),
        (
            "POST",
            "/v1/admin/listings/l1/remove",
            Some(json!({ "reason": "spam" })),
        ),
        ("POST", "/v1/admin/categories", Some(json!({ "name": "Garden" }))),
        ("DELETE", "/v1/admin/skills/s1", None),
        ("PUT", "/v1/admin/tags/t1", Some(json!({ "name": "rust" }))),
        (
            "PUT",
            "/v1/admin/services/user-api/config",
            Some(json!({ "config_json": {} })),
        ),
        ("GET", "/v1/admin/audit-logs", None),
    ];
    for (method, uri, body) in cases {
        let (status, payload, _) = call(&app, method, uri, None, body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(payload["code"], "AUTH_REQUIRED", "{method} {uri}");
    }
}

#[tokio::test]
async fn login_session_and_logout() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let app = build_router(state_with_pool(pool.clone()));

    let username = insert_admin(&pool, "admin-password-1").await;
    let (status, body, _) = call(
        &app,
        "POST",
        "/v1/admin/auth/login",
        None,
        Some(json!({ "username": username, "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_FAILED");

    let session = admin_session(&app, &pool).await;
    let (status, body, _) = call(&app, "GET", "/v1/admin/auth/me", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["username"].as_str().is_some());

    let (status, _, _) = call(&app, "POST", "/v1/admin/auth/logout", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = call(&app, "GET", "/v1/admin/auth/me", Some(&session), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn suspend_and_reactivate_are_audited() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let app = build_router(state_with_pool(pool.clone()));
    let session = admin_session(&app, &pool).await;
    let user_id = insert_user(&pool, &["provider"]).await;

    let (status, body, _) = call(
        &app,
        "POST",
        &format!("/v1/admin/users/{user_id}/suspend"),
        Some(&session),
        Some(json!({ "reason": "spam" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "suspend: {body}");
    assert_eq!(body["status"], "suspended");
    assert_eq!(body["suspended_reason"], "spam");

    let (status, body, _) = call(
        &app,
        "POST",
        &format!("/v1/admin/users/{user_id}/reactivate"),
        Some(&session),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");

    let (status, body, _) = call(
        &app,
        "POST",
        &format!("/v1/admin/users/{user_id}/reactivate"),
        Some(&session),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "NOT_SUSPENDED");

    let (status, body, _) = call(
        &app,
        "DELETE",
        &format!("/v1/admin/users/{user_id}/roles/provider"),
        Some(&session),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "LAST_ROLE");

    let (status, logs, _) = call(
        &app,
        "GET",
        &format!("/v1/admin/audit-logs?target=user:{user_id}"),
        Some(&session),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = logs
        .as_array()
        .expect("audit array")
        .iter()
        .filter_map(|log| log["action"].as_str())
        .collect();
    assert_eq!(actions, vec!["user.reactivate", "user.suspend"]);
}

#[tokio::test]
async fn tag_rename_keeps_names_unique() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let app = build_router(state_with_pool(pool.clone()));
    let session = admin_session(&app, &pool).await;

    let suffix = Uuid::new_v4().simple().to_string();
    let first = Uuid::new_v4().to_string();
    let second = Uuid::new_v4().to_string();
    for (tag_id, name) in [
        (&first, format!("alpha-{suffix}")),
        (&second, format!("beta-{suffix}")),
    ] {
        sqlx::query("INSERT INTO mp.tags (tag_id, name) VALUES ($1, $2)")
            .bind(tag_id)
            .bind(name)
            .execute(&pool)
            .await
            .expect("insert tag");
    }

    let (status, body, _) = call(
        &app,
        "PUT",
        &format!("/v1/admin/tags/{second}"),
        Some(&session),
        Some(json!({ "name": format!("ALPHA-{suffix}") })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "TAG_NAME_TAKEN");

    let (status, body, _) = call(
        &app,
        "PUT",
        &format!("/v1/admin/tags/{first}"),
        Some(&session),
        Some(json!({ "name": format!("Alpha-{suffix}") })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "case-only rename: {body}");
    assert_eq!(body["name"], format!("Alpha-{suffix}"));

    let (status, body, _) = call(
        &app,
        "DELETE",
        &format!("/v1/admin/tags/{first}"),
        Some(&session),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["deleted_at"].as_i64().is_some());

    let (status, body, _) = call(
        &app,
        "POST",
        &format!("/v1/admin/tags/{first}/restore"),
        Some(&session),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["deleted_at"].is_null());
}

#[tokio::test]
async fn service_config_update_checks_version() {
    let Some(pool) = test_pool().await else {
        return;
    };
    mp_core::admin::seed_service_configs(&pool)
        .await
        .expect("seed configs");
    let app = build_router(state_with_pool(pool.clone()));
    let session = admin_session(&app, &pool).await;

    let (status, current, _) = call(
        &app,
        "GET",
        "/v1/admin/services/admin-api/config",
        Some(&session),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let version = current["version"].as_i64().expect("version");

    let (status, body, _) = call(
        &app,
        "PUT",
        "/v1/admin/services/admin-api/config",
        Some(&session),
        Some(json!({
            "config_json": { "session_ttl_seconds": 7200 },
            "expected_version": version + 10,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "VERSION_MISMATCH");

    let (status, body, _) = call(
        &app,
        "PUT",
        "/v1/admin/services/admin-api/config",
        Some(&session),
        Some(json!({
            "config_json": { "session_ttl_seconds": 7200 },
            "expected_version": version,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "update: {body}");
    assert_eq!(body["version"].as_i64(), Some(version + 1));
    assert_eq!(body["config_json"]["session_ttl_seconds"], 7200);

    // Restore the seeded value for other tests sharing the database.
    let (status, _, _) = call(
        &app,
        "PUT",
        "/v1/admin/services/admin-api/config",
        Some(&session),
        Some(json!({ "config_json": { "session_ttl_seconds": 86400 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
