//! Category and skill curation. Slugs follow the name and stay unique,
//! soft-deleted rows included.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use mp_core::validation::{self, slugify};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::Row;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::require_admin;
use crate::{ApiError, ApiResult, AppState};

#[derive(Serialize, ToSchema)]
pub struct AdminCategory {
    pub category_id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub position: i32,
    pub listing_count: i64,
    pub deleted_at: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct AdminSkill {
    pub skill_id: String,
    pub slug: String,
    pub name: String,
    pub provider_count: i64,
    pub deleted_at: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct CategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub position: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
pub struct SkillRequest {
    pub name: String,
}

fn category_from_row(row: &PgRow) -> Result<AdminCategory, sqlx::Error> {
    let deleted_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("deleted_at")?;
    Ok(AdminCategory {
        category_id: row.try_get("category_id")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        position: row.try_get("position")?,
        listing_count: row.try_get("listing_count")?,
        deleted_at: deleted_at.map(|value| value.timestamp()),
    })
}

fn skill_from_row(row: &PgRow) -> Result<AdminSkill, sqlx::Error> {
    let deleted_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("deleted_at")?;
    Ok(AdminSkill {
        skill_id: row.try_get("skill_id")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        provider_count: row.try_get("provider_count")?,
        deleted_at: deleted_at.map(|value| value.timestamp()),
    })
}

const CATEGORY_SELECT: &str = "SELECT c.category_id, c.slug, c.name, c.description, c.position, \
     c.deleted_at, \
     (SELECT COUNT(*) FROM mp.listings l \
      WHERE l.category_id = c.category_id AND l.deleted_at IS NULL) AS listing_count \
     FROM mp.categories c";

const SKILL_SELECT: &str = "SELECT s.skill_id, s.slug, s.name, s.deleted_at, \
     (SELECT COUNT(*) FROM mp.user_skills us WHERE us.skill_id = s.skill_id) AS provider_count \
     FROM mp.skills s";

/// Name plus the slug derived from it; a name without any ASCII
/// alphanumerics has no usable slug.
fn named_slug(raw: &str) -> ApiResult<(String, String)> {
    let name = validation::bounded_text("name", raw, 2, 80)?;
    let slug = slugify(&name);
    if slug.is_empty() {
        return Err(ApiError::invalid(
            "INVALID_NAME",
            "name must contain letters or digits",
        ));
    }
    Ok((name, slug))
}

fn slug_taken(slug: &str) -> ApiError {
    ApiError::new(StatusCode::CONFLICT, "SLUG_TAKEN", "slug already exists")
        .with_details(json!({ "slug": slug }))
}

pub async fn list_categories(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<Json<Vec<AdminCategory>>> {
    require_admin(&state, &jar).await?;
    let rows = sqlx::query(&format!(
        "{CATEGORY_SELECT} ORDER BY c.deleted_at IS NOT NULL, c.position, c.name"
    ))
    .fetch_all(&state.pool)
    .await?;

    let mut categories = Vec::with_capacity(rows.len());
    for row in &rows {
        categories.push(category_from_row(row)?);
    }
    Ok(Json(categories))
}

async fn fetch_category(state: &AppState, category_id: &str) -> ApiResult<AdminCategory> {
    let row = sqlx::query(&format!("{CATEGORY_SELECT} WHERE c.category_id = $1"))
        .bind(category_id)
        .fetch_optional(&state.pool)
        .await?;
    match row {
        Some(row) => Ok(category_from_row(&row)?),
        None => Err(ApiError::not_found("category not found")),
    }
}

pub async fn create_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<CategoryRequest>,
) -> ApiResult<(StatusCode, Json<AdminCategory>)> {
    let admin = require_admin(&state, &jar).await?;
    let (name, slug) = named_slug(&payload.name)?;
    let description = validation::optional_text("description", payload.description.as_deref(), 500)?;
    let category_id = Uuid::new_v4().to_string();

    let mut tx = state.pool.begin().await?;
    let inserted = sqlx::query(
        "INSERT INTO mp.categories (category_id, slug, name, description, position) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&category_id)
    .bind(&slug)
    .bind(&name)
    .bind(&description)
    .bind(payload.position.unwrap_or(0))
    .execute(&mut *tx)
    .await;
    match inserted {
        Err(err) if mp_core::db::is_unique_violation(&err) => return Err(slug_taken(&slug)),
        other => {
            other?;
        }
    }

    crate::log_admin_audit(
        &mut *tx,
        &admin.admin_user_id,
        "category.create",
        &format!("category:{category_id}"),
        Some(json!({ "name": name, "slug": slug })),
        &headers,
    )
    .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(fetch_category(&state, &category_id).await?)))
}

pub async fn update_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(category_id): Path<String>,
    Json(payload): Json<CategoryRequest>,
) -> ApiResult<Json<AdminCategory>> {
    let admin = require_admin(&state, &jar).await?;
    let (name, slug) = named_slug(&payload.name)?;
    let description = validation::optional_text("description", payload.description.as_deref(), 500)?;

    let mut tx = state.pool.begin().await?;
    let updated = sqlx::query(
        "UPDATE mp.categories \
         SET name = $1, slug = $2, description = $3, position = COALESCE($4, position), \
             updated_at = NOW() \
         WHERE category_id = $5",
    )
    .bind(&name)
    .bind(&slug)
    .bind(&description)
    .bind(payload.position)
    .bind(&category_id)
    .execute(&mut *tx)
    .await;
    let updated = match updated {
        Err(err) if mp_core::db::is_unique_violation(&err) => return Err(slug_taken(&slug)),
        other => other?,
    };
    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("category not found"));
    }

    crate::log_admin_audit(
        &mut *tx,
        &admin.admin_user_id,
        "category.update",
        &format!("category:{category_id}"),
        Some(json!({ "name": name, "slug": slug, "position": payload.position })),
        &headers,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(fetch_category(&state, &category_id).await?))
}

/// Shared soft-delete / restore for both catalog tables.
async fn set_deleted(
    state: &AppState,
    headers: &HeaderMap,
    admin_user_id: &str,
    kind: CatalogKind,
    id: &str,
    deleted: bool,
) -> ApiResult<()> {
    let (table, id_column) = kind.table();
    let sql = if deleted {
        format!(
            "UPDATE {table} SET deleted_at = NOW(), updated_at = NOW() \
             WHERE {id_column} = $1 AND deleted_at IS NULL"
        )
    } else {
        format!(
            "UPDATE {table} SET deleted_at = NULL, updated_at = NOW() \
             WHERE {id_column} = $1 AND deleted_at IS NOT NULL"
        )
    };

    let mut tx = state.pool.begin().await?;
    let result = sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
    if result.rows_affected() == 0 {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS (SELECT 1 FROM {table} WHERE {id_column} = $1)"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        return Err(if !exists {
            ApiError::not_found(format!("{} not found", kind.label()))
        } else if deleted {
            ApiError::new(StatusCode::CONFLICT, "ALREADY_DELETED", "already deleted")
        } else {
            ApiError::new(StatusCode::CONFLICT, "NOT_DELETED", "not deleted")
        });
    }

    let action = format!(
        "{}.{}",
        kind.label(),
        if deleted { "delete" } else { "restore" }
    );
    crate::log_admin_audit(
        &mut *tx,
        admin_user_id,
        &action,
        &format!("{}:{id}", kind.label()),
        None,
        headers,
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatalogKind {
    Category,
    Skill,
}

impl CatalogKind {
    fn table(self) -> (&'static str, &'static str) {
        match self {
            CatalogKind::Category => ("mp.categories", "category_id"),
            CatalogKind::Skill => ("mp.skills", "skill_id"),
        }
    }

    fn label(self) -> &'static str {
        match self {
            CatalogKind::Category => "category",
            CatalogKind::Skill => "skill",
        }
    }
}

pub async fn delete_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(category_id): Path<String>,
) -> ApiResult<Json<AdminCategory>> {
    let admin = require_admin(&state, &jar).await?;
    set_deleted(
        &state,
        &headers,
        &admin.admin_user_id,
        CatalogKind::Category,
        &category_id,
        true,
    )
    .await?;
    Ok(Json(fetch_category(&state, &category_id).await?))
}

pub async fn restore_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(category_id): Path<String>,
) -> ApiResult<Json<AdminCategory>> {
    let admin = require_admin(&state, &jar).await?;
    set_deleted(
        &state,
        &headers,
        &admin.admin_user_id,
        CatalogKind::Category,
        &category_id,
        false,
    )
    .await?;
    Ok(Json(fetch_category(&state, &category_id).await?))
}

pub async fn list_skills(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<Json<Vec<AdminSkill>>> {
    require_admin(&state, &jar).await?;
    let rows = sqlx::query(&format!(
        "{SKILL_SELECT} ORDER BY s.deleted_at IS NOT NULL, s.name"
    ))
    .fetch_all(&state.pool)
    .await?;

    let mut skills = Vec::with_capacity(rows.len());
    for row in &rows {
        skills.push(skill_from_row(row)?);
    }
    Ok(Json(skills))
}

async fn fetch_skill(state: &AppState, skill_id: &str) -> ApiResult<AdminSkill> {
    let row = sqlx::query(&format!("{SKILL_SELECT} WHERE s.skill_id = $1"))
        .bind(skill_id)
        .fetch_optional(&state.pool)
        .await?;
    match row {
        Some(row) => Ok(skill_from_row(&row)?),
        None => Err(ApiError::not_found("skill not found")),
    }
}

pub async fn create_skill(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<SkillRequest>,
) -> ApiResult<(StatusCode, Json<AdminSkill>)> {
    let admin = require_admin(&state, &jar).await?;
    let (name, slug) = named_slug(&payload.name)?;
    let skill_id = Uuid::new_v4().to_string();

    let mut tx = state.pool.begin().await?;
    let inserted = sqlx::query("INSERT INTO mp.skills (skill_id, slug, name) VALUES ($1, $2, $3)")
        .bind(&skill_id)
        .bind(&slug)
        .bind(&name)
        .execute(&mut *tx)
        .await;
    match inserted {
        Err(err) if mp_core::db::is_unique_violation(&err) => return Err(slug_taken(&slug)),
        other => {
            other?;
        }
    }

    crate::log_admin_audit(
        &mut *tx,
        &admin.admin_user_id,
        "skill.create",
        &format!("skill:{skill_id}"),
        Some(json!({ "name": name, "slug": slug })),
        &headers,
    )
    .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(fetch_skill(&state, &skill_id).await?)))
}

pub async fn update_skill(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(skill_id): Path<String>,
    Json(payload): Json<SkillRequest>,
) -> ApiResult<Json<AdminSkill>> {
    let admin = require_admin(&state, &jar).await?;
    let (name, slug) = named_slug(&payload.name)?;

    let mut tx = state.pool.begin().await?;
    let updated = sqlx::query(
        "UPDATE mp.skills SET name = $1, slug = $2, updated_at = NOW() WHERE skill_id = $3",
    )
    .bind(&name)
    .bind(&slug)
    .bind(&skill_id)
    .execute(&mut *tx)
    .await;
    let updated = match updated {
        Err(err) if mp_core::db::is_unique_violation(&err) => return Err(slug_taken(&slug)),
        other => other?,
    };
    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("skill not found"));
    }

    crate::log_admin_audit(
        &mut *tx,
        &admin.admin_user_id,
        "skill.update",
        &format!("skill:{skill_id}"),
        Some(json!({ "name": name, "slug": slug })),
        &headers,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(fetch_skill(&state, &skill_id).await?))
}

pub async fn delete_skill(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(skill_id): Path<String>,
) -> ApiResult<Json<AdminSkill>> {
    let admin = require_admin(&state, &jar).await?;
    set_deleted(
        &state,
        &headers,
        &admin.admin_user_id,
        CatalogKind::Skill,
        &skill_id,
        true,
    )
    .await?;
    Ok(Json(fetch_skill(&state, &skill_id).await?))
}

pub async fn restore_skill(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(skill_id): Path<String>,
) -> ApiResult<Json<AdminSkill>> {
    let admin = require_admin(&state, &jar).await?;
    set_deleted(
        &state,
        &headers,
        &admin.admin_user_id,
        CatalogKind::Skill,
        &skill_id,
        false,
    )
    .await?;
    Ok(Json(fetch_skill(&state, &skill_id).await?))
}
