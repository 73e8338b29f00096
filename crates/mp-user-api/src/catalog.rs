use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use mp_core::roles::Role;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres, QueryBuilder, Row};
use std::collections::BTreeSet;

use crate::auth::require_auth;
use crate::{ApiError, ApiResult, AppState};

pub(crate) const MAX_SKILLS_PER_USER: usize = 20;

#[derive(Serialize)]
pub struct CategoryResponse {
    pub category_id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub position: i32,
}

#[derive(Serialize, Clone)]
pub struct SkillResponse {
    pub skill_id: String,
    pub slug: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct SkillQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SetSkillsRequest {
    pub skill_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct SkillsResponse {
    pub skills: Vec<SkillResponse>,
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<CategoryResponse>>> {
    let rows = sqlx::query(
        "SELECT category_id, slug, name, description, position \
         FROM mp.categories WHERE deleted_at IS NULL \
         ORDER BY position ASC, name ASC",
    )
    .fetch_all(&state.pool)
    .await?;

    let mut categories = Vec::with_capacity(rows.len());
    for row in rows {
        categories.push(CategoryResponse {
            category_id: row.try_get("category_id")?,
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            position: row.try_get("position")?,
        });
    }
    Ok(Json(categories))
}

pub async fn list_skills(
    State(state): State<AppState>,
    Query(query): Query<SkillQuery>,
) -> ApiResult<Json<Vec<SkillResponse>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let mut builder = QueryBuilder::new(
        "SELECT skill_id, slug, name FROM mp.skills WHERE deleted_at IS NULL",
    );
    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        builder.push(" AND name ILIKE ");
        builder.push_bind(format!("%{}%", mp_core::validation::escape_like(q)));
    }
    builder.push(" ORDER BY name ASC LIMIT ");
    builder.push_bind(limit);

    let rows = builder.build().fetch_all(&state.pool).await?;
    let mut skills = Vec::with_capacity(rows.len());
    for row in rows {
        skills.push(skill_from_row(&row)?);
    }
    Ok(Json(skills))
}

pub async fn set_my_skills(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SetSkillsRequest>,
) -> ApiResult<Json<SkillsResponse>> {
    let auth = require_auth(&state, &headers).await?;
    auth.require_role(Role::Provider)?;
    let skill_ids = distinct_skill_ids(&payload.skill_ids)?;

    if !skill_ids.is_empty() {
        let live: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM mp.skills WHERE skill_id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(&skill_ids)
        .fetch_one(&state.pool)
        .await?;
        if live as usize != skill_ids.len() {
            return Err(ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNKNOWN_SKILL",
                "one or more skills do not exist",
            ));
        }
    }

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM mp.user_skills WHERE user_id = $1")
        .bind(&auth.user_id)
        .execute(&mut *tx)
        .await?;
    for skill_id in &skill_ids {
        sqlx::query("INSERT INTO mp.user_skills (user_id, skill_id) VALUES ($1, $2)")
            .bind(&auth.user_id)
            .bind(skill_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    let skills = fetch_user_skills(&state.pool, &auth.user_id).await?;
    Ok(Json(SkillsResponse { skills }))
}

#[allow(clippy::result_large_err)]
fn distinct_skill_ids(raw: &[String]) -> ApiResult<Vec<String>> {
    let ids: BTreeSet<String> = raw
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.len() > MAX_SKILLS_PER_USER {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "TOO_MANY_SKILLS",
            format!("at most {MAX_SKILLS_PER_USER} skills are allowed"),
        ));
    }
    Ok(ids.into_iter().collect())
}

pub(crate) async fn fetch_user_skills(
    pool: &Pool<Postgres>,
    user_id: &str,
) -> ApiResult<Vec<SkillResponse>> {
    let rows = sqlx::query(
        "SELECT s.skill_id, s.slug, s.name \
         FROM mp.user_skills us \
         JOIN mp.skills s ON s.skill_id = us.skill_id \
         WHERE us.user_id = $1 AND s.deleted_at IS NULL \
         ORDER BY s.name ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut skills = Vec::with_capacity(rows.len());
    for row in rows {
        skills.push(skill_from_row(&row)?);
    }
    Ok(skills)
}

fn skill_from_row(row: &sqlx::postgres::PgRow) -> Result<SkillResponse, sqlx::Error> {
    Ok(SkillResponse {
        skill_id: row.try_get("skill_id")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skill_ids_are_trimmed_and_deduplicated() {
        let raw = vec![" a ".to_string(), "b".to_string(), "a".to_string(), "".to_string()];
        assert_eq!(distinct_skill_ids(&raw).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn more_than_twenty_skills_is_rejected() {
        let raw: Vec<String> = (0..=MAX_SKILLS_PER_USER).map(|i| format!("skill-{i}")).collect();
        let err = distinct_skill_ids(&raw).unwrap_err();
        assert_eq!(err.code, "TOO_MANY_SKILLS");

        let raw: Vec<String> = (0..MAX_SKILLS_PER_USER).map(|i| format!("skill-{i}")).collect();
        assert_eq!(distinct_skill_ids(&raw).unwrap().len(), MAX_SKILLS_PER_USER);
    }
}
