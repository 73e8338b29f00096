use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use mp_core::listing_status::{ApplicationStatus, ListingStatus};
use mp_core::roles::{parse_roles, AccountStatus, Role};
use mp_core::validation;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{Pool, Postgres, Row};

use crate::auth::{invalid_role, require_auth};
use crate::catalog::{fetch_user_skills, SkillResponse};
use crate::{ApiError, ApiResult, AppState};

#[derive(Serialize)]
pub struct ProfileResponse {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub display_name: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub status: String,
    pub roles: Vec<Role>,
    pub skills: Vec<SkillResponse>,
    pub created_at: i64,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Serialize)]
pub struct RolesResponse {
    pub roles: Vec<Role>,
}

/// Loads a profile; `include_email` is set only when the caller is the owner.
pub(crate) async fn fetch_profile(
    pool: &Pool<Postgres>,
    user_id: &str,
    include_email: bool,
) -> ApiResult<Option<ProfileResponse>> {
    let row = sqlx::query(
        "SELECT u.user_id, u.email, u.display_name, u.bio, u.location, u.status, u.created_at, \
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
        return Ok(None);
    };
    let roles: Vec<String> = row.try_get("roles")?;
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at")?;
    let skills = fetch_user_skills(pool, user_id).await?;

    Ok(Some(ProfileResponse {
        user_id: row.try_get("user_id")?,
        email: if include_email {
            Some(row.try_get("email")?)
        } else {
            None
        },
        display_name: row.try_get("display_name")?,
        bio: row.try_get("bio")?,
        location: row.try_get("location")?,
        status: row.try_get("status")?,
        roles: parse_roles(roles),
        skills,
        created_at: created_at.timestamp(),
    }))
}

pub async fn get_public_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = fetch_profile(&state.pool, &user_id, false)
        .await?
        .filter(|profile| profile.status != AccountStatus::Deleted.as_str())
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    let auth = require_auth(&state, &headers).await?;

    let display_name = payload
        .display_name
        .as_deref()
        .map(|value| validation::bounded_text("display_name", value, 1, 80))
        .transpose()?;
    // An explicit empty string clears the field; an absent field keeps it.
    let bio = payload
        .bio
        .as_deref()
        .map(|value| validation::optional_text("bio", Some(value), 2000))
        .transpose()?;
    let location = payload
        .location
        .as_deref()
        .map(|value| validation::optional_text("location", Some(value), 120))
        .transpose()?;

    sqlx::query(
        "UPDATE mp.users SET \
            display_name = COALESCE($2, display_name), \
            bio = CASE WHEN $3 THEN $4 ELSE bio END, \
            location = CASE WHEN $5 THEN $6 ELSE location END, \
            updated_at = NOW() \
         WHERE user_id = $1",
    )
    .bind(&auth.user_id)
    .bind(display_name)
    .bind(bio.is_some())
    .bind(bio.flatten())
    .bind(location.is_some())
    .bind(location.flatten())
    .execute(&state.pool)
    .await?;

    let profile = fetch_profile(&state.pool, &auth.user_id, true)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(profile))
}

pub async fn add_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RoleRequest>,
) -> ApiResult<Json<RolesResponse>> {
    let auth = require_auth(&state, &headers).await?;
    let role = self_assignable_role(&payload.role)?;

    sqlx::query(
        "INSERT INTO mp.user_roles (user_id, role) VALUES ($1, $2) \
         ON CONFLICT (user_id, role) DO NOTHING",
    )
    .bind(&auth.user_id)
    .bind(role.as_str())
    .execute(&state.pool)
    .await?;

    let mut roles = auth.roles.clone();
    roles.push(role);
    Ok(Json(RolesResponse {
        roles: parse_roles(roles.iter().map(|role| role.as_str())),
    }))
}

pub async fn remove_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(role): Path<String>,
) -> ApiResult<Json<RolesResponse>> {
    let auth = require_auth(&state, &headers).await?;
    let role = self_assignable_role(&role)?;

    let mut tx = state.pool.begin().await?;
    // Lock the user row so concurrent removals cannot strip the last role.
    sqlx::query("SELECT 1 FROM mp.users WHERE user_id = $1 FOR UPDATE")
        .bind(&auth.user_id)
        .execute(&mut *tx)
        .await?;
    let current: Vec<String> =
        sqlx::query_scalar("SELECT role FROM mp.user_roles WHERE user_id = $1")
            .bind(&auth.user_id)
            .fetch_all(&mut *tx)
            .await?;
    let current = parse_roles(current);
    let remaining = remaining_roles(&current, role)?;

    sqlx::query("DELETE FROM mp.user_roles WHERE user_id = $1 AND role = $2")
        .bind(&auth.user_id)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Json(RolesResponse { roles: remaining }))
}

#[allow(clippy::result_large_err)]
fn self_assignable_role(value: &str) -> ApiResult<Role> {
    match value.parse::<Role>() {
        Ok(role) if role.is_self_assignable() => Ok(role),
        _ => Err(invalid_role(value)),
    }
}

#[allow(clippy::result_large_err)]
fn remaining_roles(current: &[Role], removing: Role) -> ApiResult<Vec<Role>> {
    if !current.contains(&removing) {
        return Err(ApiError::not_found(format!("role {removing} is not held")));
    }
    let remaining: Vec<Role> = current
        .iter()
        .copied()
        .filter(|role| *role != removing)
        .collect();
    if remaining.is_empty() {
        return Err(ApiError::conflict(
            "LAST_ROLE",
            "an account must keep at least one role",
        ));
    }
    Ok(remaining)
}

/// Soft-deletes the caller's account and winds down their marketplace activity.
pub async fn delete_account(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let auth = require_auth(&state, &headers).await?;

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "UPDATE mp.users SET status = $2, deleted_at = NOW(), updated_at = NOW() \
         WHERE user_id = $1",
    )
    .bind(&auth.user_id)
    .bind(AccountStatus::Deleted.as_str())
    .execute(&mut *tx)
    .await?;

    // Drafts were never published, so they go away instead of closing.
    let deleted_drafts = sqlx::query(
        "UPDATE mp.listings SET deleted_at = NOW(), updated_at = NOW() \
         WHERE seeker_id = $1 AND status = $2 AND deleted_at IS NULL",
    )
    .bind(&auth.user_id)
    .bind(ListingStatus::Draft.as_str())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let closed = sqlx::query(
        "UPDATE mp.listings SET status = $2, updated_at = NOW() \
         WHERE seeker_id = $1 AND status = $3 AND deleted_at IS NULL",
    )
    .bind(&auth.user_id)
    .bind(ListingStatus::Closed.as_str())
    .bind(ListingStatus::Open.as_str())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    // Pending applications on the listings that were just closed.
    sqlx::query(
        "UPDATE mp.applications a SET status = $2, updated_at = NOW() \
         FROM mp.listings l \
         WHERE a.listing_id = l.listing_id AND l.seeker_id = $1 \
           AND l.status = $3 AND a.status = $4",
    )
    .bind(&auth.user_id)
    .bind(ApplicationStatus::Rejected.as_str())
    .bind(ListingStatus::Closed.as_str())
    .bind(ApplicationStatus::Pending.as_str())
    .execute(&mut *tx)
    .await?;

    let withdrawn = sqlx::query(
        "UPDATE mp.applications SET status = $2, updated_at = NOW() \
         WHERE provider_id = $1 AND status = $3",
    )
    .bind(&auth.user_id)
    .bind(ApplicationStatus::Withdrawn.as_str())
    .bind(ApplicationStatus::Pending.as_str())
    .execute(&mut *tx)
    .await?
    .rows_affected();
    tx.commit().await?;

    tracing::info!(
        user_id = %auth.user_id,
        closed_listings = closed,
        deleted_drafts,
        withdrawn_applications = withdrawn,
        "account deleted"
    );

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": AccountStatus::Deleted.as_str(),
            "closed_listings": closed,
            "deleted_drafts": deleted_drafts,
            "withdrawn_applications": withdrawn,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_role_cannot_be_removed() {
        let err = remaining_roles(&[Role::Seeker], Role::Seeker).unwrap_err();
        assert_eq!(err.code, "LAST_ROLE");
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn removing_one_of_two_roles_keeps_the_other() {
        let remaining = remaining_roles(&[Role::Provider, Role::Seeker], Role::Seeker).unwrap();
        assert_eq!(remaining, vec![Role::Provider]);
    }

    #[test]
    fn removing_a_role_not_held_is_not_found() {
        let err = remaining_roles(&[Role::Seeker], Role::Provider).unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn admin_is_never_self_assignable() {
        assert_eq!(self_assignable_role("admin").unwrap_err().code, "INVALID_ROLE");
        assert_eq!(self_assignable_role("provider").unwrap(), Role::Provider);
        assert!(self_assignable_role("").is_err());
    }
}
