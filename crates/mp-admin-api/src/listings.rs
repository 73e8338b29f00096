use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use mp_core::listing_status::ListingStatus;
use mp_core::pagination::{Page, PageQuery};
use mp_core::validation;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use utoipa::ToSchema;

use crate::auth::require_admin;
use crate::users::ReasonRequest;
use crate::{ApiError, ApiResult, AppState};

const LISTING_SELECT: &str = "SELECT l.listing_id, l.seeker_id, u.display_name AS seeker_name, \
     l.title, l.status, l.removed_reason, l.created_at, l.deleted_at, \
     (SELECT COUNT(*) FROM mp.applications a WHERE a.listing_id = l.listing_id) AS application_count \
     FROM mp.listings l JOIN mp.users u ON u.user_id = l.seeker_id";

#[derive(Deserialize)]
pub struct ListingListQuery {
    pub status: Option<String>,
    pub q: Option<String>,
    pub seeker_id: Option<String>,
    /// `true` only removed, `false` only live, absent both.
    pub removed: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct AdminListingView {
    pub listing_id: String,
    pub seeker_id: String,
    pub seeker_name: String,
    pub title: String,
    pub status: String,
    pub removed_reason: Option<String>,
    pub application_count: i64,
    pub created_at: i64,
    pub deleted_at: Option<i64>,
}

fn listing_from_row(row: &PgRow) -> Result<AdminListingView, sqlx::Error> {
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at")?;
    let deleted_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("deleted_at")?;
    Ok(AdminListingView {
        listing_id: row.try_get("listing_id")?,
        seeker_id: row.try_get("seeker_id")?,
        seeker_name: row.try_get("seeker_name")?,
        title: row.try_get("title")?,
        status: row.try_get("status")?,
        removed_reason: row.try_get("removed_reason")?,
        application_count: row.try_get("application_count")?,
        created_at: created_at.timestamp(),
        deleted_at: deleted_at.map(|value| value.timestamp()),
    })
}

struct ListingFilters<'a> {
    status: Option<ListingStatus>,
    q: Option<&'a str>,
    seeker_id: Option<&'a str>,
    removed: Option<bool>,
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, filters: &ListingFilters<'a>) {
    builder.push(" WHERE 1=1");
    if let Some(status) = filters.status {
        builder.push(" AND l.status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(seeker_id) = filters.seeker_id {
        builder.push(" AND l.seeker_id = ");
        builder.push_bind(seeker_id);
    }
    if let Some(q) = filters.q {
        builder.push(" AND l.title ILIKE ");
        builder.push_bind(format!("%{}%", validation::escape_like(q)));
    }
    match filters.removed {
        Some(true) => {
            builder.push(" AND l.deleted_at IS NOT NULL");
        }
        Some(false) => {
            builder.push(" AND l.deleted_at IS NULL");
        }
        None => {}
    }
}

pub async fn list_listings(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<ListingListQuery>,
) -> ApiResult<Json<Page<AdminListingView>>> {
    require_admin(&state, &jar).await?;

    let status = query
        .status
        .as_deref()
        .map(|value| {
            value
                .parse::<ListingStatus>()
                .map_err(|message| ApiError::invalid("INVALID_STATUS", message))
        })
        .transpose()?;
    let filters = ListingFilters {
        status,
        q: query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()),
        seeker_id: query.seeker_id.as_deref(),
        removed: query.removed,
    };
    let params = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .params();

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM mp.listings l");
    push_filters(&mut count, &filters);
    let total: i64 = count.build_query_scalar().fetch_one(&state.pool).await?;

    let mut builder = QueryBuilder::<Postgres>::new(LISTING_SELECT);
    push_filters(&mut builder, &filters);
    builder.push(" ORDER BY l.created_at DESC, l.listing_id LIMIT ");
    builder.push_bind(params.limit());
    builder.push(" OFFSET ");
    builder.push_bind(params.offset());

    let rows = builder.build().fetch_all(&state.pool).await?;
    let mut listings = Vec::with_capacity(rows.len());
    for row in &rows {
        listings.push(listing_from_row(row)?);
    }
    Ok(Json(Page::new(listings, params, total)))
}

async fn fetch_listing(state: &AppState, listing_id: &str) -> ApiResult<AdminListingView> {
    let mut builder = QueryBuilder::<Postgres>::new(LISTING_SELECT);
    builder.push(" WHERE l.listing_id = ");
    builder.push_bind(listing_id);
    match builder.build().fetch_optional(&state.pool).await? {
        Some(row) => Ok(listing_from_row(&row)?),
        None => Err(ApiError::not_found("listing not found")),
    }
}

/// Hides the listing and rejects its pending applications.
pub async fn remove_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(listing_id): Path<String>,
    Json(payload): Json<ReasonRequest>,
) -> ApiResult<Json<AdminListingView>> {
    let admin = require_admin(&state, &jar).await?;
    let reason = validation::bounded_text("reason", &payload.reason, 1, 500)?;

    let mut tx = state.pool.begin().await?;
    let deleted_at: Option<Option<chrono::DateTime<chrono::Utc>>> = sqlx::query_scalar(
        "SELECT deleted_at FROM mp.listings WHERE listing_id = $1 FOR UPDATE",
    )
    .bind(&listing_id)
    .fetch_optional(&mut *tx)
    .await?;
    match deleted_at {
        None => return Err(ApiError::not_found("listing not found")),
        Some(Some(_)) => {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "ALREADY_REMOVED",
                "listing is already removed",
            ))
        }
        Some(None) => {}
    }

    sqlx::query(
        "UPDATE mp.listings SET deleted_at = NOW(), removed_reason = $1, updated_at = NOW() \
         WHERE listing_id = $2",
    )
    .bind(&reason)
    .bind(&listing_id)
    .execute(&mut *tx)
    .await?;
    let rejected = sqlx::query(
        "UPDATE mp.applications SET status = 'rejected', updated_at = NOW() \
         WHERE listing_id = $1 AND status = 'pending'",
    )
    .bind(&listing_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    crate::log_admin_audit(
        &mut *tx,
        &admin.admin_user_id,
        "listing.remove",
        &format!("listing:{listing_id}"),
        Some(json!({ "reason": reason, "rejected_applications": rejected })),
        &headers,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(fetch_listing(&state, &listing_id).await?))
}

/// Only moderator removals can be undone; owner deletions stay deleted.
pub async fn restore_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(listing_id): Path<String>,
) -> ApiResult<Json<AdminListingView>> {
    let admin = require_admin(&state, &jar).await?;

    let mut tx = state.pool.begin().await?;
    let result = sqlx::query(
        "UPDATE mp.listings SET deleted_at = NULL, removed_reason = NULL, updated_at = NOW() \
         WHERE listing_id = $1 AND deleted_at IS NOT NULL AND removed_reason IS NOT NULL",
    )
    .bind(&listing_id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM mp.listings WHERE listing_id = $1)")
                .bind(&listing_id)
                .fetch_one(&mut *tx)
                .await?;
        return Err(if exists {
            ApiError::new(
                StatusCode::CONFLICT,
                "NOT_REMOVED",
                "listing was not removed by a moderator",
            )
        } else {
            ApiError::not_found("listing not found")
        });
    }

    crate::log_admin_audit(
        &mut *tx,
        &admin.admin_user_id,
        "listing.restore",
        &format!("listing:{listing_id}"),
        None,
        &headers,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(fetch_listing(&state, &listing_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_filter_is_tri_state() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM mp.listings l");
        push_filters(
            &mut builder,
            &ListingFilters {
                status: None,
                q: None,
                seeker_id: None,
                removed: None,
            },
        );
        assert!(!builder.sql().contains("deleted_at"));

        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM mp.listings l");
        push_filters(
            &mut builder,
            &ListingFilters {
                status: Some(ListingStatus::Open),
                q: Some("sink"),
                seeker_id: None,
                removed: Some(true),
            },
        );
        let sql = builder.sql();
        assert!(sql.contains("l.status = $1"));
        assert!(sql.contains("l.title ILIKE $2"));
        assert!(sql.contains("l.deleted_at IS NOT NULL"));
    }
}
