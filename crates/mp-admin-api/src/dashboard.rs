use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use sqlx::{Pool, Postgres, Row};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::auth::require_admin;
use crate::{ApiResult, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardSnapshot {
    pub collected_at: i64,
    pub users: BTreeMap<String, i64>,
    pub listings: BTreeMap<String, i64>,
    pub applications: BTreeMap<String, i64>,
    pub removed_listings: i64,
    pub tags: TagCounts,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TagCounts {
    pub live: i64,
    pub deleted: i64,
}

/// Zero-filled so every known status shows up even when nothing has it.
fn status_counts(known: &[&str], rows: Vec<(String, i64)>) -> BTreeMap<String, i64> {
    let mut counts: BTreeMap<String, i64> =
        known.iter().map(|status| (status.to_string(), 0)).collect();
    for (status, count) in rows {
        *counts.entry(status).or_insert(0) += count;
    }
    counts
}

async fn grouped(pool: &Pool<Postgres>, sql: &str) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (String, i64)>(sql).fetch_all(pool).await
}

pub async fn get_dashboard(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<Json<DashboardSnapshot>> {
    require_admin(&state, &jar).await?;

    let users = grouped(
        &state.pool,
        "SELECT status, COUNT(*) FROM mp.users GROUP BY status",
    )
    .await?;
    let listings = grouped(
        &state.pool,
        "SELECT status, COUNT(*) FROM mp.listings WHERE deleted_at IS NULL GROUP BY status",
    )
    .await?;
    let applications = grouped(
        &state.pool,
        "SELECT status, COUNT(*) FROM mp.applications GROUP BY status",
    )
    .await?;

    let removed_listings: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM mp.listings WHERE deleted_at IS NOT NULL")
            .fetch_one(&state.pool)
            .await?;
    let tag_row = sqlx::query(
        "SELECT COUNT(*) FILTER (WHERE deleted_at IS NULL) AS live, \
                COUNT(*) FILTER (WHERE deleted_at IS NOT NULL) AS deleted \
         FROM mp.tags",
    )
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(DashboardSnapshot {
        collected_at: chrono::Utc::now().timestamp(),
        users: status_counts(&["active", "suspended", "deleted"], users),
        listings: status_counts(
            &["draft", "open", "assigned", "completed", "closed"],
            listings,
        ),
        applications: status_counts(
            &["pending", "accepted", "rejected", "withdrawn"],
            applications,
        ),
        removed_listings,
        tags: TagCounts {
            live: tag_row.try_get("live")?,
            deleted: tag_row.try_get("deleted")?,
        },
    }))
}
