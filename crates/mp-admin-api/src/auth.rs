use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use mp_core::password::verify_password;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use utoipa::ToSchema;

use crate::{ApiError, ApiResult, AppState};

pub(crate) const SESSION_COOKIE: &str = "mp_admin_session";
const DEFAULT_SESSION_TTL_SECONDS: i64 = 86400;

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub admin_user_id: String,
    pub username: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminUser {
    pub admin_user_id: String,
    pub username: String,
}

fn auth_failed() -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "AUTH_FAILED", "invalid credentials")
}

fn auth_required(message: &str) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "AUTH_REQUIRED", message)
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<LoginResponse>)> {
    let username = payload.username.trim().to_string();
    let row = sqlx::query(
        "SELECT admin_user_id, password_hash, is_active FROM mp_admin.admin_users WHERE username = $1",
    )
    .bind(&username)
    .fetch_optional(&state.pool)
    .await?;

    let Some(row) = row else {
        mp_core::metrics::inc_auth_failure(crate::SERVICE_NAME);
        return Err(auth_failed());
    };

    let admin_user_id: String = row.try_get("admin_user_id")?;
    let password_hash: String = row.try_get("password_hash")?;
    let is_active: bool = row.try_get("is_active")?;
    if !is_active {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "ACCOUNT_DISABLED",
            "admin disabled",
        ));
    }

    let verified = verify_password(&payload.password, &password_hash).map_err(|err| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "AUTH_ERROR", err.to_string())
    })?;
    if !verified {
        mp_core::metrics::inc_auth_failure(crate::SERVICE_NAME);
        return Err(auth_failed());
    }

    let ttl = session_ttl_seconds(&state).await;
    let expires_at = chrono::Utc::now() + chrono::Duration::seconds(ttl);
    let session_id = uuid::Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO mp_admin.admin_sessions (session_id, admin_user_id, expires_at) \
         VALUES ($1, $2, $3)",
    )
    .bind(&session_id)
    .bind(&admin_user_id)
    .bind(expires_at)
    .execute(&state.pool)
    .await?;

    mp_core::metrics::inc_auth_success(crate::SERVICE_NAME);
    crate::log_admin_audit(
        &state.pool,
        &admin_user_id,
        "admin.login",
        &format!("admin_user:{admin_user_id}"),
        None,
        &headers,
    )
    .await?;

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            admin_user_id,
            username,
            expires_at: expires_at.timestamp(),
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<serde_json::Value>)> {
    let mut jar = jar;
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let session_id = cookie.value().to_string();
        sqlx::query("DELETE FROM mp_admin.admin_sessions WHERE session_id = $1")
            .bind(&session_id)
            .execute(&state.pool)
            .await?;
        jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    }

    Ok((jar, Json(serde_json::json!({ "status": "ok" }))))
}

pub async fn me(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Json<AdminUser>> {
    let admin = require_admin(&state, &jar).await?;
    Ok(Json(admin))
}

pub(crate) async fn require_admin(state: &AppState, jar: &CookieJar) -> ApiResult<AdminUser> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Err(auth_required("missing session"));
    };
    let row = sqlx::query(
        "SELECT u.admin_user_id, u.username, u.is_active, s.expires_at \
         FROM mp_admin.admin_sessions s \
         JOIN mp_admin.admin_users u ON s.admin_user_id = u.admin_user_id \
         WHERE s.session_id = $1",
    )
    .bind(cookie.value())
    .fetch_optional(&state.pool)
    .await?;

    let Some(row) = row else {
        return Err(auth_required("invalid session"));
    };

    let expires_at: chrono::DateTime<chrono::Utc> = row.try_get("expires_at")?;
    let is_active: bool = row.try_get("is_active")?;
    if chrono::Utc::now() > expires_at || !is_active {
        return Err(auth_required("session expired"));
    }

    Ok(AdminUser {
        admin_user_id: row.try_get("admin_user_id")?,
        username: row.try_get("username")?,
    })
}

async fn session_ttl_seconds(state: &AppState) -> i64 {
    let snapshot = state.admin_config.get().await;
    snapshot
        .u64_at(&["session_ttl_seconds"])
        .and_then(|value| i64::try_from(value).ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_SESSION_TTL_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::lazy_state;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use mp_core::service_config;
    use tower::ServiceExt;

    #[tokio::test]
    async fn me_without_cookie_is_unauthorized() {
        let app = Router::new()
            .route("/v1/admin/auth/me", get(me))
            .with_state(lazy_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/admin/auth/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn logout_without_cookie_is_a_no_op() {
        let app = Router::new()
            .route("/v1/admin/auth/logout", post(logout))
            .with_state(lazy_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/admin/auth/logout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("set-cookie").is_none());
    }

    #[tokio::test]
    async fn session_ttl_falls_back_on_invalid_config() {
        let mut state = lazy_state();
        assert_eq!(session_ttl_seconds(&state).await, 86400);

        state.admin_config = service_config::static_handle(serde_json::json!({
            "session_ttl_seconds": 600
        }));
        assert_eq!(session_ttl_seconds(&state).await, 600);

        state.admin_config = service_config::static_handle(serde_json::json!({
            "session_ttl_seconds": 0
        }));
        assert_eq!(session_ttl_seconds(&state).await, DEFAULT_SESSION_TTL_SECONDS);
    }
}
