use axum::extract::{ConnectInfo, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use mp_core::rate_limit::{RateDecision, RateLimitRule};
use mp_core::roles::{parse_roles, AccountStatus, Role};
use mp_core::{auth, metrics, password, validation};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres, Row};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::accounts::{fetch_profile, ProfileResponse};
use crate::{ApiError, ApiResult, AppState};

const AUTHENTICATE_BEARER_CHALLENGE: &str = r#"Bearer realm="mp-user-api""#;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub roles: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthTokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: i64,
    pub user: ProfileResponse,
}

#[derive(Clone, Copy)]
pub(crate) struct UserRateLimitConfig {
    pub enabled: bool,
    pub auth_per_minute: u64,
    pub write_per_minute: u64,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct AuthContext {
    pub user_id: String,
    pub display_name: String,
    pub roles: Vec<Role>,
}

impl AuthContext {
    pub(crate) fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub(crate) fn require_role(&self, role: Role) -> ApiResult<()> {
        if self.has_role(role) {
            return Ok(());
        }
        Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "ROLE_REQUIRED",
            format!("the {role} role is required"),
        ))
    }
}

pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthTokenResponse>)> {
    enforce_auth_rate_limit(&state, &addr).await?;

    let email = validation::normalize_email(&payload.email)?;
    validation::validate_password(&payload.password)?;
    let display_name = validation::bounded_text("display_name", &payload.display_name, 1, 80)?;
    let roles = requested_roles(payload.roles.as_deref())?;

    let password_hash = password::hash_password(&payload.password).map_err(|err| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "AUTH_ERROR", err.to_string())
    })?;
    let user_id = Uuid::new_v4().to_string();

    let mut tx = state.pool.begin().await?;
    let inserted = sqlx::query(
        "INSERT INTO mp.users (user_id, email, password_hash, display_name) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&user_id)
    .bind(&email)
    .bind(&password_hash)
    .bind(&display_name)
    .execute(&mut *tx)
    .await;
    if let Err(err) = inserted {
        if mp_core::db::is_unique_violation(&err) {
            return Err(ApiError::conflict(
                "EMAIL_TAKEN",
                "an account with this email already exists",
            ));
        }
        return Err(err.into());
    }
    for role in &roles {
        sqlx::query("INSERT INTO mp.user_roles (user_id, role) VALUES ($1, $2)")
            .bind(&user_id)
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    tracing::info!(user_id = %user_id, roles = ?roles, "user registered");
    let response = issue_session(&state, &user_id).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthTokenResponse>> {
    enforce_auth_rate_limit(&state, &addr).await?;

    let email = payload.email.trim().to_lowercase();
    let row = sqlx::query("SELECT user_id, password_hash, status FROM mp.users WHERE lower(email) = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;

    let Some(row) = row else {
        metrics::inc_auth_failure(crate::SERVICE_NAME);
        return Err(auth_failed());
    };
    let user_id: String = row.try_get("user_id")?;
    let password_hash: String = row.try_get("password_hash")?;
    let status: String = row.try_get("status")?;

    let valid = password::verify_password(&payload.password, &password_hash).map_err(|err| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "AUTH_ERROR", err.to_string())
    })?;
    if !valid {
        metrics::inc_auth_failure(crate::SERVICE_NAME);
        return Err(auth_failed());
    }
    if let Err(err) = ensure_usable_status(&status) {
        metrics::inc_auth_failure(crate::SERVICE_NAME);
        return Err(err);
    }

    let response = issue_session(&state, &user_id).await?;
    metrics::inc_auth_success(crate::SERVICE_NAME);
    Ok(Json(response))
}

pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ProfileResponse>> {
    let auth = require_auth(&state, &headers).await?;
    let profile = fetch_profile(&state.pool, &auth.user_id, true)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(profile))
}

async fn issue_session(state: &AppState, user_id: &str) -> ApiResult<AuthTokenResponse> {
    let issued = auth::issue_token(user_id, &state.jwt_config).map_err(|err| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "AUTH_ERROR", err.to_string())
    })?;
    let user = fetch_profile(&state.pool, user_id, true)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(AuthTokenResponse {
        expires_at: issued.expires_at(),
        access_token: issued.token,
        token_type: "Bearer",
        user,
    })
}

#[allow(clippy::result_large_err)]
fn requested_roles(raw: Option<&[String]>) -> ApiResult<Vec<Role>> {
    let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
        return Ok(vec![Role::Seeker]);
    };
    let mut roles = Vec::with_capacity(raw.len());
    for value in raw {
        let role: Role = value.parse().map_err(|_| invalid_role(value))?;
        if !role.is_self_assignable() {
            return Err(invalid_role(value));
        }
        roles.push(role);
    }
    Ok(parse_roles(roles.iter().map(|role| role.as_str())))
}

pub(crate) fn invalid_role(value: &str) -> ApiError {
    ApiError::new(
        StatusCode::UNPROCESSABLE_ENTITY,
        "INVALID_ROLE",
        format!("role `{value}` cannot be self-assigned"),
    )
}

fn auth_failed() -> ApiError {
    ApiError::new(
        StatusCode::UNAUTHORIZED,
        "AUTH_FAILED",
        "invalid email or password",
    )
}

#[allow(clippy::result_large_err)]
fn ensure_usable_status(status: &str) -> ApiResult<()> {
    match status.parse::<AccountStatus>() {
        Ok(AccountStatus::Active) => Ok(()),
        Ok(AccountStatus::Suspended) => Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "ACCOUNT_SUSPENDED",
            "account suspended",
        )),
        Ok(AccountStatus::Deleted) => Err(ApiError::new(
            StatusCode::GONE,
            "ACCOUNT_DELETED",
            "account deleted",
        )),
        Err(_) => Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "AUTH_ERROR",
            format!("unknown account status: {status}"),
        )),
    }
}

pub(crate) async fn require_auth(state: &AppState, headers: &HeaderMap) -> ApiResult<AuthContext> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| auth_required_error("missing token"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| auth_required_error("invalid token"))?;
    let claims = auth::verify_token(token, &state.jwt_config)
        .map_err(|err| auth_required_error(err.to_string()))?;
    load_account(&state.pool, &claims.sub).await
}

/// Like [`require_auth`] but anonymous callers get `None`. A present but
/// invalid token is still rejected.
pub(crate) async fn optional_auth(
    state: &AppState,
    headers: &HeaderMap,
) -> ApiResult<Option<AuthContext>> {
    if !headers.contains_key(AUTHORIZATION) {
        return Ok(None);
    }
    require_auth(state, headers).await.map(Some)
}

async fn load_account(pool: &Pool<Postgres>, user_id: &str) -> ApiResult<AuthContext> {
    let row = sqlx::query(
        "SELECT u.display_name, u.status, \
                COALESCE(array_agg(r.role) FILTER (WHERE r.role IS NOT NULL), '{}') AS roles \
         FROM mp.users u \
         LEFT JOIN mp.user_roles r ON r.user_id = u.user_id \
         WHERE u.user_id = $1 \
         GROUP BY u.user_id",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Err(auth_required_error("unknown account"));
    };
    let status: String = row.try_get("status")?;
    ensure_usable_status(&status)?;
    let roles: Vec<String> = row.try_get("roles")?;

    Ok(AuthContext {
        user_id: user_id.to_string(),
        display_name: row.try_get("display_name")?,
        roles: parse_roles(roles),
    })
}

fn auth_required_error(message: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "AUTH_REQUIRED", message).with_header(
        "www-authenticate",
        AUTHENTICATE_BEARER_CHALLENGE.to_string(),
    )
}

pub(crate) async fn current_rate_limit(state: &AppState) -> UserRateLimitConfig {
    let snapshot = state.user_config.get().await;
    UserRateLimitConfig {
        enabled: snapshot.bool_at(&["rate_limit", "enabled"]).unwrap_or(true),
        auth_per_minute: snapshot
            .u64_at(&["rate_limit", "auth_per_minute"])
            .unwrap_or(20),
        write_per_minute: snapshot
            .u64_at(&["rate_limit", "write_per_minute"])
            .unwrap_or(120),
    }
}

async fn enforce_auth_rate_limit(state: &AppState, addr: &SocketAddr) -> ApiResult<()> {
    let rate = current_rate_limit(state).await;
    if rate.enabled {
        let key = format!("auth:{}", addr.ip());
        enforce_rate_limit(state, &key, "auth", rate.auth_per_minute).await?;
    }
    Ok(())
}

/// Per-user budget for content-creating requests.
pub(crate) async fn enforce_write_rate_limit(state: &AppState, auth: &AuthContext) -> ApiResult<()> {
    let rate = current_rate_limit(state).await;
    if rate.enabled {
        let key = format!("write:{}", auth.user_id);
        enforce_rate_limit(state, &key, "write", rate.write_per_minute).await?;
    }
    Ok(())
}

pub(crate) async fn enforce_rate_limit(
    state: &AppState,
    key: &str,
    bucket: &str,
    limit: u64,
) -> ApiResult<()> {
    let decision = state
        .rate_limiter
        .check(key, RateLimitRule::per_minute(limit))
        .await;
    if let RateDecision::Limited { retry_after } = decision {
        metrics::inc_rate_limited(crate::SERVICE_NAME, bucket);
        let retry_after = retry_after.as_secs().max(1);
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "rate limited",
        )
        .with_header("retry-after", retry_after.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bearer_for, lazy_state};
    use axum::body::{to_bytes, Body};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use mp_core::service_config;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(state: AppState) -> axum::Router {
        crate::build_router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
    }

    async fn post_json(router: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[test]
    fn requested_roles_default_to_seeker() {
        assert_eq!(requested_roles(None).unwrap(), vec![Role::Seeker]);
        assert_eq!(requested_roles(Some(Vec::new().as_slice())).unwrap(), vec![Role::Seeker]);
    }

    #[test]
    fn requested_roles_are_deduplicated() {
        let raw = vec!["provider".to_string(), "Seeker".to_string(), "provider".to_string()];
        assert_eq!(
            requested_roles(Some(raw.as_slice())).unwrap(),
            vec![Role::Provider, Role::Seeker]
        );
    }

    #[test]
    fn admin_role_cannot_be_requested() {
        let raw = vec!["admin".to_string()];
        let err = requested_roles(Some(raw.as_slice())).unwrap_err();
        assert_eq!(err.code, "INVALID_ROLE");
        let raw = vec!["wizard".to_string()];
        assert_eq!(requested_roles(Some(raw.as_slice())).unwrap_err().code, "INVALID_ROLE");
    }

    #[test]
    fn account_status_maps_to_http_errors() {
        assert!(ensure_usable_status("active").is_ok());
        let suspended = ensure_usable_status("suspended").unwrap_err();
        assert_eq!(suspended.status, StatusCode::FORBIDDEN);
        assert_eq!(suspended.code, "ACCOUNT_SUSPENDED");
        let deleted = ensure_usable_status("deleted").unwrap_err();
        assert_eq!(deleted.status, StatusCode::GONE);
    }

    #[tokio::test]
    async fn register_rejects_invalid_email_before_touching_db() {
        let (status, body) = post_json(
            app(lazy_state()),
            "/v1/auth/register",
            json!({ "email": "not-an-email", "password": "long enough", "display_name": "Ana" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert_eq!(body["details"]["field"], "email");
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let (status, body) = post_json(
            app(lazy_state()),
            "/v1/auth/register",
            json!({ "email": "ana@example.com", "password": "short", "display_name": "Ana" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["details"]["field"], "password");
    }

    #[tokio::test]
    async fn register_rejects_admin_role() {
        let (status, body) = post_json(
            app(lazy_state()),
            "/v1/auth/register",
            json!({
                "email": "ana@example.com",
                "password": "long enough",
                "display_name": "Ana",
                "roles": ["admin"]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "INVALID_ROLE");
    }

    #[tokio::test]
    async fn auth_endpoints_are_rate_limited_per_ip() {
        let mut state = lazy_state();
        state.user_config = service_config::static_handle(json!({
            "rate_limit": { "enabled": true, "auth_per_minute": 1 }
        }));
        let payload = json!({ "email": "bad", "password": "long enough", "display_name": "Ana" });

        let (first, _) = post_json(app(state.clone()), "/v1/auth/register", payload.clone()).await;
        assert_eq!(first, StatusCode::UNPROCESSABLE_ENTITY);

        let response = app(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/auth/register")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn protected_routes_require_bearer_token() {
        let response = app(lazy_state())
            .oneshot(
                Request::builder()
                    .uri("/v1/auth/me")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get("www-authenticate")
                .and_then(|value| value.to_str().ok()),
            Some(AUTHENTICATE_BEARER_CHALLENGE)
        );
    }

    #[tokio::test]
    async fn tokens_signed_with_another_secret_are_rejected() {
        let mut state = lazy_state();
        state.jwt_config.secret = "a-completely-different-secret".to_string();
        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri("/v1/auth/me")
                    .header("authorization", bearer_for("user-1"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
