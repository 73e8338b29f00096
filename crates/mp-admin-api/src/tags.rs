use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use mp_core::pagination::{Page, PageQuery};
use mp_core::tags::{normalize_tag_name, TagError};
use mp_core::validation;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use utoipa::ToSchema;

use crate::auth::require_admin;
use crate::{ApiError, ApiResult, AppState};

const TAG_SELECT: &str = "SELECT t.tag_id, t.name, t.created_by, t.created_at, t.deleted_at, \
     (SELECT COUNT(*) FROM mp.listing_tags lt WHERE lt.tag_id = t.tag_id) AS listing_count \
     FROM mp.tags t";

#[derive(Deserialize)]
pub struct TagListQuery {
    pub q: Option<String>,
    pub include_deleted: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct AdminTag {
    pub tag_id: String,
    pub name: String,
    pub created_by: Option<String>,
    pub listing_count: i64,
    pub created_at: i64,
    pub deleted_at: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct RenameTagRequest {
    pub name: String,
}

fn tag_from_row(row: &PgRow) -> Result<AdminTag, sqlx::Error> {
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at")?;
    let deleted_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("deleted_at")?;
    Ok(AdminTag {
        tag_id: row.try_get("tag_id")?,
        name: row.try_get("name")?,
        created_by: row.try_get("created_by")?,
        listing_count: row.try_get("listing_count")?,
        created_at: created_at.timestamp(),
        deleted_at: deleted_at.map(|value| value.timestamp()),
    })
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, q: Option<&str>, include_deleted: bool) {
    builder.push(" WHERE 1=1");
    if !include_deleted {
        builder.push(" AND t.deleted_at IS NULL");
    }
    if let Some(q) = q {
        builder.push(" AND t.name ILIKE ");
        builder.push_bind(format!("%{}%", validation::escape_like(q)));
    }
}

/// Soft-deleted tags are listed by default so moderators can restore them.
pub async fn list_tags(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<TagListQuery>,
) -> ApiResult<Json<Page<AdminTag>>> {
    require_admin(&state, &jar).await?;

    let q = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
    let include_deleted = query.include_deleted.unwrap_or(true);
    let params = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .params();

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM mp.tags t");
    push_filters(&mut count, q, include_deleted);
    let total: i64 = count.build_query_scalar().fetch_one(&state.pool).await?;

    let mut builder = QueryBuilder::<Postgres>::new(TAG_SELECT);
    push_filters(&mut builder, q, include_deleted);
    builder.push(" ORDER BY lower(t.name) ASC LIMIT ");
    builder.push_bind(params.limit());
    builder.push(" OFFSET ");
    builder.push_bind(params.offset());

    let rows = builder.build().fetch_all(&state.pool).await?;
    let mut tags = Vec::with_capacity(rows.len());
    for row in &rows {
        tags.push(tag_from_row(row)?);
    }
    Ok(Json(Page::new(tags, params, total)))
}

async fn fetch_tag(state: &AppState, tag_id: &str) -> ApiResult<AdminTag> {
    let row = sqlx::query(&format!("{TAG_SELECT} WHERE t.tag_id = $1"))
        .bind(tag_id)
        .fetch_optional(&state.pool)
        .await?;
    match row {
        Some(row) => Ok(tag_from_row(&row)?),
        None => Err(ApiError::not_found("tag not found")),
    }
}

fn rename_target(raw: &str) -> ApiResult<String> {
    normalize_tag_name(raw).map_err(|err| match err {
        TagError::InvalidName(message) => ApiError::invalid("INVALID_TAG", message),
        other => ApiError::invalid("INVALID_TAG", other.to_string()),
    })
}

/// Case-only renames of the same tag are allowed; any other
/// case-insensitive collision, deleted tags included, is a conflict.
pub async fn rename_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(tag_id): Path<String>,
    Json(payload): Json<RenameTagRequest>,
) -> ApiResult<Json<AdminTag>> {
    let admin = require_admin(&state, &jar).await?;
    let name = rename_target(&payload.name)?;

    let mut tx = state.pool.begin().await?;
    let previous: Option<String> =
        sqlx::query_scalar("SELECT name FROM mp.tags WHERE tag_id = $1 FOR UPDATE")
            .bind(&tag_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(previous) = previous else {
        return Err(ApiError::not_found("tag not found"));
    };

    let clash: Option<String> = sqlx::query_scalar(
        "SELECT tag_id FROM mp.tags WHERE lower(name) = lower($1) AND tag_id <> $2",
    )
    .bind(&name)
    .bind(&tag_id)
    .fetch_optional(&mut *tx)
    .await?;
    if let Some(existing) = clash {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "TAG_NAME_TAKEN",
            "another tag already uses this name",
        )
        .with_details(json!({ "tag_id": existing })));
    }

    let updated = sqlx::query("UPDATE mp.tags SET name = $1, updated_at = NOW() WHERE tag_id = $2")
        .bind(&name)
        .bind(&tag_id)
        .execute(&mut *tx)
        .await;
    match updated {
        // Lost a race with a concurrent create.
        Err(err) if mp_core::db::is_unique_violation(&err) => {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "TAG_NAME_TAKEN",
                "another tag already uses this name",
            ))
        }
        other => {
            other?;
        }
    }

    crate::log_admin_audit(
        &mut *tx,
        &admin.admin_user_id,
        "tag.rename",
        &format!("tag:{tag_id}"),
        Some(json!({ "from": previous, "to": name })),
        &headers,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(fetch_tag(&state, &tag_id).await?))
}

async fn set_tag_deleted(
    state: &AppState,
    headers: &HeaderMap,
    admin_user_id: &str,
    tag_id: &str,
    deleted: bool,
) -> ApiResult<()> {
    let sql = if deleted {
        "UPDATE mp.tags SET deleted_at = NOW(), updated_at = NOW() \
         WHERE tag_id = $1 AND deleted_at IS NULL"
    } else {
        "UPDATE mp.tags SET deleted_at = NULL, updated_at = NOW() \
         WHERE tag_id = $1 AND deleted_at IS NOT NULL"
    };

    let mut tx = state.pool.begin().await?;
    let result = sqlx::query(sql).bind(tag_id).execute(&mut *tx).await?;
    if result.rows_affected() == 0 {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM mp.tags WHERE tag_id = $1)")
                .bind(tag_id)
                .fetch_one(&mut *tx)
                .await?;
        return Err(if !exists {
            ApiError::not_found("tag not found")
        } else if deleted {
            ApiError::new(StatusCode::CONFLICT, "ALREADY_DELETED", "tag already deleted")
        } else {
            ApiError::new(StatusCode::CONFLICT, "NOT_DELETED", "tag is not deleted")
        });
    }

    crate::log_admin_audit(
        &mut *tx,
        admin_user_id,
        if deleted { "tag.delete" } else { "tag.restore" },
        &format!("tag:{tag_id}"),
        None,
        headers,
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

/// Deleted tags vanish from listings and block reuse of their name.
pub async fn delete_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(tag_id): Path<String>,
) -> ApiResult<Json<AdminTag>> {
    let admin = require_admin(&state, &jar).await?;
    set_tag_deleted(&state, &headers, &admin.admin_user_id, &tag_id, true).await?;
    Ok(Json(fetch_tag(&state, &tag_id).await?))
}

pub async fn restore_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(tag_id): Path<String>,
) -> ApiResult<Json<AdminTag>> {
    let admin = require_admin(&state, &jar).await?;
    set_tag_deleted(&state, &headers, &admin.admin_user_id, &tag_id, false).await?;
    Ok(Json(fetch_tag(&state, &tag_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_target_normalises_whitespace() {
        assert_eq!(rename_target("  web   design ").unwrap(), "web design");
        let err = rename_target("   ").unwrap_err();
        assert_eq!(err.code, "INVALID_TAG");
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn deleted_tags_are_included_unless_excluded() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM mp.tags t");
        push_filters(&mut builder, Some("rust"), true);
        assert!(!builder.sql().contains("deleted_at"));
        assert!(builder.sql().contains("t.name ILIKE $1"));

        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM mp.tags t");
        push_filters(&mut builder, None, false);
        assert!(builder.sql().contains("t.deleted_at IS NULL"));
    }
}
