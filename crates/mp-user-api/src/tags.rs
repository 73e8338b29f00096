use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use mp_core::metrics;
use mp_core::roles::Role;
use mp_core::tags::{self, Tag, TagError, TagResolution, MIN_SUGGESTION_SIMILARITY};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row};

use crate::auth::require_auth;
use crate::{ApiResult, AppState};

#[derive(Deserialize)]
pub struct TagSearchQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct TagSearchItem {
    pub tag_id: String,
    pub name: String,
    pub listing_count: i64,
}

#[derive(Deserialize)]
pub struct ResolveTagsRequest {
    pub names: Vec<String>,
    #[serde(default)]
    pub force_create: bool,
}

#[derive(Serialize)]
pub struct ResolveTagsResponse {
    pub tags: Vec<Tag>,
    pub resolutions: Vec<TagResolution>,
}

/// Resolves request tag names through the configured store and records the
/// outcome of every name.
pub(crate) async fn resolve_for_request(
    state: &AppState,
    names: &[String],
    force_create: bool,
    user_id: &str,
) -> ApiResult<Vec<TagResolution>> {
    match tags::resolve_tags(state.tag_store.as_ref(), names, force_create, Some(user_id)).await {
        Ok(resolutions) => {
            for resolution in &resolutions {
                metrics::inc_tag_resolution(crate::SERVICE_NAME, resolution.outcome());
            }
            Ok(resolutions)
        }
        Err(err) => {
            match &err {
                TagError::ConfirmationRequired(pending) => {
                    for _ in pending {
                        metrics::inc_tag_resolution(crate::SERVICE_NAME, "needs_confirmation");
                    }
                }
                TagError::Unavailable(_) => {
                    metrics::inc_tag_resolution(crate::SERVICE_NAME, "unavailable");
                }
                _ => {}
            }
            Err(err.into())
        }
    }
}

/// Autocomplete. Without `q` the most used live tags come back.
pub async fn search_tags(
    State(state): State<AppState>,
    Query(query): Query<TagSearchQuery>,
) -> ApiResult<Json<Vec<TagSearchItem>>> {
    let limit = query.limit.unwrap_or(10).clamp(1, 50);
    let q = query
        .q
        .as_deref()
        .map(|value| value.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|value| !value.is_empty());

    let mut builder = QueryBuilder::new(
        "SELECT t.tag_id, t.name, \
                (SELECT COUNT(*) FROM mp.listing_tags lt \
                 JOIN mp.listings l ON l.listing_id = lt.listing_id \
                 WHERE lt.tag_id = t.tag_id AND l.deleted_at IS NULL) AS listing_count \
         FROM mp.tags t WHERE t.deleted_at IS NULL",
    );
    match q {
        Some(q) => {
            builder.push(" AND (t.name ILIKE ");
            builder.push_bind(format!("{}%", mp_core::validation::escape_like(&q)));
            builder.push(" OR similarity(t.name, ");
            builder.push_bind(q.clone());
            builder.push(") >= ");
            builder.push_bind(MIN_SUGGESTION_SIMILARITY as f32);
            builder.push(") ORDER BY (lower(t.name) = lower(");
            builder.push_bind(q.clone());
            builder.push(")) DESC, similarity(t.name, ");
            builder.push_bind(q);
            builder.push(") DESC, t.name ASC");
        }
        None => {
            builder.push(" ORDER BY listing_count DESC, t.name ASC");
        }
    }
    builder.push(" LIMIT ");
    builder.push_bind(limit);

    let rows = builder.build().fetch_all(&state.pool).await?;
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(TagSearchItem {
            tag_id: row.try_get("tag_id")?,
            name: row.try_get("name")?,
            listing_count: row.try_get("listing_count")?,
        });
    }
    Ok(Json(items))
}

/// Resolves a batch of names ahead of a listing write, creating tags where
/// allowed. Seekers only.
pub async fn resolve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResolveTagsRequest>,
) -> ApiResult<Json<ResolveTagsResponse>> {
    let auth = require_auth(&state, &headers).await?;
    // Tags are created from the seeker listing flow only.
    auth.require_role(Role::Seeker)?;
    let resolutions =
        resolve_for_request(&state, &payload.names, payload.force_create, &auth.user_id).await?;
    let tags = resolutions
        .iter()
        .map(|resolution| resolution.tag().clone())
        .collect();
    Ok(Json(ResolveTagsResponse { tags, resolutions }))
}
