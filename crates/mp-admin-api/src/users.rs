use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use mp_core::pagination::{Page, PageQuery};
use mp_core::roles::{AccountStatus, Role};
use mp_core::validation;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use utoipa::ToSchema;

use crate::auth::require_admin;
use crate::{ApiError, ApiResult, AppState};

const USER_SELECT: &str = "SELECT u.user_id, u.email, u.display_name, u.status, \
     u.suspended_reason, u.created_at, u.deleted_at, \
     COALESCE(array_agg(r.role ORDER BY r.role) FILTER (WHERE r.role IS NOT NULL), '{}') AS roles \
     FROM mp.users u LEFT JOIN mp.user_roles r ON r.user_id = u.user_id";

#[derive(Deserialize)]
pub struct UserListQuery {
    pub status: Option<String>,
    pub role: Option<String>,
    pub q: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct AdminUserView {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub status: String,
    pub suspended_reason: Option<String>,
    pub roles: Vec<String>,
    pub created_at: i64,
    pub deleted_at: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Deserialize, ToSchema)]
pub struct GrantRoleRequest {
    pub role: String,
}

fn user_from_row(row: &PgRow) -> Result<AdminUserView, sqlx::Error> {
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at")?;
    let deleted_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("deleted_at")?;
    Ok(AdminUserView {
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        status: row.try_get("status")?,
        suspended_reason: row.try_get("suspended_reason")?,
        roles: row.try_get("roles")?,
        created_at: created_at.timestamp(),
        deleted_at: deleted_at.map(|value| value.timestamp()),
    })
}

fn parse_role(value: &str) -> ApiResult<Role> {
    value
        .parse::<Role>()
        .map_err(|message| ApiError::invalid("INVALID_ROLE", message))
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    status: Option<AccountStatus>,
    role: Option<Role>,
    q: Option<&str>,
) {
    builder.push(" WHERE 1=1");
    if let Some(status) = status {
        builder.push(" AND u.status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(role) = role {
        builder.push(
            " AND EXISTS (SELECT 1 FROM mp.user_roles f WHERE f.user_id = u.user_id AND f.role = ",
        );
        builder.push_bind(role.as_str());
        builder.push(")");
    }
    if let Some(q) = q {
        let pattern = format!("%{}%", validation::escape_like(q));
        builder.push(" AND (u.email ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR u.display_name ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Json<Page<AdminUserView>>> {
    require_admin(&state, &jar).await?;

    let status = query
        .status
        .as_deref()
        .map(|value| {
            value
                .parse::<AccountStatus>()
                .map_err(|message| ApiError::invalid("INVALID_STATUS", message))
        })
        .transpose()?;
    let role = query.role.as_deref().map(parse_role).transpose()?;
    let q = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
    let params = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .params();

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM mp.users u");
    push_filters(&mut count, status, role, q);
    let total: i64 = count.build_query_scalar().fetch_one(&state.pool).await?;

    let mut builder = QueryBuilder::<Postgres>::new(USER_SELECT);
    push_filters(&mut builder, status, role, q);
    builder.push(" GROUP BY u.user_id ORDER BY u.created_at DESC, u.user_id LIMIT ");
    builder.push_bind(params.limit());
    builder.push(" OFFSET ");
    builder.push_bind(params.offset());

    let rows = builder.build().fetch_all(&state.pool).await?;
    let mut users = Vec::with_capacity(rows.len());
    for row in &rows {
        users.push(user_from_row(row)?);
    }
    Ok(Json(Page::new(users, params, total)))
}

async fn fetch_user(state: &AppState, user_id: &str) -> ApiResult<AdminUserView> {
    let mut builder = QueryBuilder::<Postgres>::new(USER_SELECT);
    builder.push(" WHERE u.user_id = ");
    builder.push_bind(user_id);
    builder.push(" GROUP BY u.user_id");
    let row = builder.build().fetch_optional(&state.pool).await?;
    match row {
        Some(row) => Ok(user_from_row(&row)?),
        None => Err(ApiError::not_found("user not found")),
    }
}

pub async fn suspend_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(user_id): Path<String>,
    Json(payload): Json<ReasonRequest>,
) -> ApiResult<Json<AdminUserView>> {
    let admin = require_admin(&state, &jar).await?;
    let reason = validation::bounded_text("reason", &payload.reason, 1, 500)?;

    let mut tx = state.pool.begin().await?;
    let current: Option<String> =
        sqlx::query_scalar("SELECT status FROM mp.users WHERE user_id = $1 FOR UPDATE")
            .bind(&user_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(current) = current else {
        return Err(ApiError::not_found("user not found"));
    };
    if current == AccountStatus::Deleted.as_str() {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "ACCOUNT_DELETED",
            "deleted accounts cannot be suspended",
        ));
    }

    sqlx::query(
        "UPDATE mp.users SET status = 'suspended', suspended_reason = $1, updated_at = NOW() \
         WHERE user_id = $2",
    )
    .bind(&reason)
    .bind(&user_id)
    .execute(&mut *tx)
    .await?;

    crate::log_admin_audit(
        &mut *tx,
        &admin.admin_user_id,
        "user.suspend",
        &format!("user:{user_id}"),
        Some(json!({ "from": current, "reason": reason })),
        &headers,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, admin = %admin.username, "user suspended");
    Ok(Json(fetch_user(&state, &user_id).await?))
}

pub async fn reactivate_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(user_id): Path<String>,
) -> ApiResult<Json<AdminUserView>> {
    let admin = require_admin(&state, &jar).await?;

    let mut tx = state.pool.begin().await?;
    let result = sqlx::query(
        "UPDATE mp.users SET status = 'active', suspended_reason = NULL, updated_at = NOW() \
         WHERE user_id = $1 AND status = 'suspended'",
    )
    .bind(&user_id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM mp.users WHERE user_id = $1)")
                .bind(&user_id)
                .fetch_one(&mut *tx)
                .await?;
        return Err(if exists {
            ApiError::new(StatusCode::CONFLICT, "NOT_SUSPENDED", "user is not suspended")
        } else {
            ApiError::not_found("user not found")
        });
    }

    crate::log_admin_audit(
        &mut *tx,
        &admin.admin_user_id,
        "user.reactivate",
        &format!("user:{user_id}"),
        None,
        &headers,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(fetch_user(&state, &user_id).await?))
}

pub async fn grant_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(user_id): Path<String>,
    Json(payload): Json<GrantRoleRequest>,
) -> ApiResult<Json<AdminUserView>> {
    let admin = require_admin(&state, &jar).await?;
    let role = parse_role(&payload.role)?;

    let mut tx = state.pool.begin().await?;
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM mp.users WHERE user_id = $1 AND status <> 'deleted')",
    )
    .bind(&user_id)
    .fetch_one(&mut *tx)
    .await?;
    if !exists {
        return Err(ApiError::not_found("user not found"));
    }

    sqlx::query(
        "INSERT INTO mp.user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(&user_id)
    .bind(role.as_str())
    .execute(&mut *tx)
    .await?;

    crate::log_admin_audit(
        &mut *tx,
        &admin.admin_user_id,
        "user.role.grant",
        &format!("user:{user_id}"),
        Some(json!({ "role": role.as_str() })),
        &headers,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(fetch_user(&state, &user_id).await?))
}

/// A user always keeps at least one role.
pub async fn revoke_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path((user_id, role)): Path<(String, String)>,
) -> ApiResult<Json<AdminUserView>> {
    let admin = require_admin(&state, &jar).await?;
    let role = parse_role(&role)?;

    let mut tx = state.pool.begin().await?;
    let roles: Vec<String> = sqlx::query_scalar(
        "SELECT role FROM mp.user_roles WHERE user_id = $1 FOR UPDATE",
    )
    .bind(&user_id)
    .fetch_all(&mut *tx)
    .await?;
    if !roles.iter().any(|held| held == role.as_str()) {
        return Err(ApiError::not_found("role not held"));
    }
    if roles.len() == 1 {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "LAST_ROLE",
            "a user must keep at least one role",
        ));
    }

    sqlx::query("DELETE FROM mp.user_roles WHERE user_id = $1 AND role = $2")
        .bind(&user_id)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await?;

    crate::log_admin_audit(
        &mut *tx,
        &admin.admin_user_id,
        "user.role.revoke",
        &format!("user:{user_id}"),
        Some(json!({ "role": role.as_str() })),
        &headers,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(fetch_user(&state, &user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_maps_to_invalid_role() {
        assert_eq!(parse_role("Admin").unwrap(), Role::Admin);
        let err = parse_role("owner").unwrap_err();
        assert_eq!(err.code, "INVALID_ROLE");
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn filters_bind_each_value() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM mp.users u");
        push_filters(
            &mut builder,
            Some(AccountStatus::Suspended),
            Some(Role::Provider),
            Some("ana"),
        );
        let sql = builder.sql();
        assert!(sql.contains("u.status = $1"));
        assert!(sql.contains("f.role = $2"));
        assert!(sql.contains("u.email ILIKE $3"));
        assert!(sql.contains("u.display_name ILIKE $4"));
    }
}
