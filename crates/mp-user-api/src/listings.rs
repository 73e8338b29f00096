use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use mp_core::listing_status::{ApplicationStatus, ListingStatus};
use mp_core::pagination::{Page, PageQuery};
use mp_core::roles::Role;
use mp_core::tags::{Tag, TagResolution};
use mp_core::validation::{self, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, QueryBuilder, Row, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::auth::{enforce_write_rate_limit, optional_auth, require_auth, AuthContext};
use crate::tags::resolve_for_request;
use crate::{ApiError, ApiResult, AppState};

const LISTING_SELECT: &str = "SELECT l.listing_id, l.seeker_id, u.display_name AS seeker_name, \
            l.category_id, c.slug AS category_slug, c.name AS category_name, \
            l.title, l.description, l.budget_min, l.budget_max, l.currency, l.location, \
            l.is_remote, l.status, l.published_at, l.created_at, l.updated_at \
     FROM mp.listings l \
     JOIN mp.users u ON u.user_id = l.seeker_id \
     LEFT JOIN mp.categories c ON c.category_id = l.category_id";

#[derive(Serialize)]
pub struct ListingResponse {
    pub listing_id: String,
    pub seeker_id: String,
    pub seeker_name: String,
    pub category_id: Option<String>,
    pub category_slug: Option<String>,
    pub category_name: Option<String>,
    pub title: String,
    pub description: String,
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub currency: String,
    pub location: Option<String>,
    pub is_remote: bool,
    pub status: String,
    pub tags: Vec<Tag>,
    pub published_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Write responses echo how each requested tag name was resolved so clients
/// can surface auto-corrections.
#[derive(Serialize)]
pub struct ListingWriteResponse {
    pub listing: ListingResponse,
    pub tag_resolutions: Vec<TagResolution>,
}

#[derive(Deserialize)]
pub struct CreateListingRequest {
    pub title: String,
    pub description: String,
    pub category_id: Option<String>,
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub currency: Option<String>,
    pub location: Option<String>,
    pub is_remote: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub force_create_tags: bool,
    #[serde(default)]
    pub publish: bool,
}

#[derive(Deserialize)]
pub struct UpdateListingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub currency: Option<String>,
    pub location: Option<String>,
    pub is_remote: Option<bool>,
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub force_create_tags: bool,
}

#[derive(Deserialize, Default)]
pub struct BrowseQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub q: Option<String>,
    pub remote: Option<bool>,
}

#[derive(Deserialize, Default)]
pub struct MyListingsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, PartialEq)]
struct ListingFields {
    title: String,
    description: String,
    category_id: Option<String>,
    budget_min: Option<i64>,
    budget_max: Option<i64>,
    currency: String,
    location: Option<String>,
    is_remote: bool,
}

fn validate_new_listing(payload: &CreateListingRequest) -> ValidationResult<ListingFields> {
    let title = validation::bounded_text("title", &payload.title, 3, 120)?;
    let description = validation::bounded_text("description", &payload.description, 1, 5000)?;
    validation::validate_budget(payload.budget_min, payload.budget_max)?;
    let currency = validation::normalize_currency(payload.currency.as_deref())?;
    let location = validation::optional_text("location", payload.location.as_deref(), 120)?;
    let category_id = payload
        .category_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    Ok(ListingFields {
        title,
        description,
        category_id,
        budget_min: payload.budget_min,
        budget_max: payload.budget_max,
        currency,
        location,
        is_remote: payload.is_remote.unwrap_or(false),
    })
}

/// Applies a partial update on top of the stored fields and re-validates the result.
fn merge_listing_update(
    current: ListingFields,
    payload: &UpdateListingRequest,
) -> ValidationResult<ListingFields> {
    let title = match payload.title.as_deref() {
        Some(value) => validation::bounded_text("title", value, 3, 120)?,
        None => current.title,
    };
    let description = match payload.description.as_deref() {
        Some(value) => validation::bounded_text("description", value, 1, 5000)?,
        None => current.description,
    };
    let budget_min = payload.budget_min.or(current.budget_min);
    let budget_max = payload.budget_max.or(current.budget_max);
    validation::validate_budget(budget_min, budget_max)?;
    let currency = match payload.currency.as_deref() {
        Some(value) => validation::normalize_currency(Some(value))?,
        None => current.currency,
    };
    let location = match payload.location.as_deref() {
        Some(value) => validation::optional_text("location", Some(value), 120)?,
        None => current.location,
    };
    let category_id = match payload.category_id.as_deref().map(str::trim) {
        Some("") => None,
        Some(value) => Some(value.to_string()),
        None => current.category_id,
    };

    Ok(ListingFields {
        title,
        description,
        category_id,
        budget_min,
        budget_max,
        currency,
        location,
        is_remote: payload.is_remote.unwrap_or(current.is_remote),
    })
}

fn listing_from_row(row: &PgRow) -> Result<ListingResponse, sqlx::Error> {
    let published_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("published_at")?;
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at")?;
    let updated_at: chrono::DateTime<chrono::Utc> = row.try_get("updated_at")?;
    Ok(ListingResponse {
        listing_id: row.try_get("listing_id")?,
        seeker_id: row.try_get("seeker_id")?,
        seeker_name: row.try_get("seeker_name")?,
        category_id: row.try_get("category_id")?,
        category_slug: row.try_get("category_slug")?,
        category_name: row.try_get("category_name")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        budget_min: row.try_get("budget_min")?,
        budget_max: row.try_get("budget_max")?,
        currency: row.try_get("currency")?,
        location: row.try_get("location")?,
        is_remote: row.try_get("is_remote")?,
        status: row.try_get("status")?,
        tags: Vec::new(),
        published_at: published_at.map(|value| value.timestamp()),
        created_at: created_at.timestamp(),
        updated_at: updated_at.timestamp(),
    })
}

async fn attach_tags(pool: &Pool<Postgres>, listings: &mut [ListingResponse]) -> ApiResult<()> {
    if listings.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = listings
        .iter()
        .map(|listing| listing.listing_id.clone())
        .collect();
    let rows = sqlx::query(
        "SELECT lt.listing_id, t.tag_id, t.name \
         FROM mp.listing_tags lt \
         JOIN mp.tags t ON t.tag_id = lt.tag_id \
         WHERE lt.listing_id = ANY($1) AND t.deleted_at IS NULL \
         ORDER BY t.name ASC",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_listing: HashMap<String, Vec<Tag>> = HashMap::new();
    for row in rows {
        let listing_id: String = row.try_get("listing_id")?;
        by_listing.entry(listing_id).or_default().push(Tag {
            tag_id: row.try_get("tag_id")?,
            name: row.try_get("name")?,
        });
    }
    for listing in listings.iter_mut() {
        if let Some(tags) = by_listing.remove(&listing.listing_id) {
            listing.tags = tags;
        }
    }
    Ok(())
}

pub(crate) async fn fetch_listing(
    pool: &Pool<Postgres>,
    listing_id: &str,
) -> ApiResult<Option<ListingResponse>> {
    let sql = format!("{LISTING_SELECT} WHERE l.listing_id = $1 AND l.deleted_at IS NULL");
    let row = sqlx::query(&sql)
        .bind(listing_id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut listings = vec![listing_from_row(&row)?];
    attach_tags(pool, &mut listings).await?;
    Ok(listings.pop())
}

fn listing_not_found() -> ApiError {
    ApiError::not_found("listing not found")
}

async fn ensure_live_category(pool: &Pool<Postgres>, category_id: Option<&str>) -> ApiResult<()> {
    let Some(category_id) = category_id else {
        return Ok(());
    };
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM mp.categories WHERE category_id = $1 AND deleted_at IS NULL)",
    )
    .bind(category_id)
    .fetch_one(pool)
    .await?;
    if !exists {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "UNKNOWN_CATEGORY",
            "category does not exist",
        )
        .with_details(json!({ "field": "category_id" })));
    }
    Ok(())
}

async fn replace_listing_tags(
    tx: &mut Transaction<'_, Postgres>,
    listing_id: &str,
    resolutions: &[TagResolution],
) -> ApiResult<()> {
    sqlx::query("DELETE FROM mp.listing_tags WHERE listing_id = $1")
        .bind(listing_id)
        .execute(&mut **tx)
        .await?;
    for resolution in resolutions {
        sqlx::query(
            "INSERT INTO mp.listing_tags (listing_id, tag_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(listing_id)
        .bind(&resolution.tag().tag_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub async fn create_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateListingRequest>,
) -> ApiResult<(StatusCode, Json<ListingWriteResponse>)> {
    let auth = require_auth(&state, &headers).await?;
    auth.require_role(Role::Seeker)?;
    enforce_write_rate_limit(&state, &auth).await?;

    let fields = validate_new_listing(&payload)?;
    ensure_live_category(&state.pool, fields.category_id.as_deref()).await?;
    let resolutions = resolve_for_request(
        &state,
        &payload.tags,
        payload.force_create_tags,
        &auth.user_id,
    )
    .await?;

    let listing_id = Uuid::new_v4().to_string();
    let status = if payload.publish {
        ListingStatus::Open
    } else {
        ListingStatus::Draft
    };

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "INSERT INTO mp.listings \
         (listing_id, seeker_id, category_id, title, description, budget_min, budget_max, \
          currency, location, is_remote, status, published_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, \
                 CASE WHEN $12 THEN NOW() ELSE NULL END)",
    )
    .bind(&listing_id)
    .bind(&auth.user_id)
    .bind(&fields.category_id)
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.budget_min)
    .bind(fields.budget_max)
    .bind(&fields.currency)
    .bind(&fields.location)
    .bind(fields.is_remote)
    .bind(status.as_str())
    .bind(payload.publish)
    .execute(&mut *tx)
    .await?;
    replace_listing_tags(&mut tx, &listing_id, &resolutions).await?;
    tx.commit().await?;

    tracing::info!(
        listing_id = %listing_id,
        seeker_id = %auth.user_id,
        status = status.as_str(),
        tags = resolutions.len(),
        "listing created"
    );

    let listing = fetch_listing(&state.pool, &listing_id)
        .await?
        .ok_or_else(listing_not_found)?;
    Ok((
        StatusCode::CREATED,
        Json(ListingWriteResponse {
            listing,
            tag_resolutions: resolutions,
        }),
    ))
}

pub async fn browse_listings(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Json<Page<ListingResponse>>> {
    let params = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .params();

    let mut count_builder = QueryBuilder::new(
        "SELECT COUNT(*) FROM mp.listings l \
         LEFT JOIN mp.categories c ON c.category_id = l.category_id \
         WHERE l.deleted_at IS NULL AND l.status = ",
    );
    count_builder.push_bind(ListingStatus::Open.as_str());
    push_browse_filters(&mut count_builder, &query);
    let total: i64 = count_builder
        .build_query_scalar()
        .fetch_one(&state.pool)
        .await?;

    let mut builder = QueryBuilder::new(LISTING_SELECT);
    builder.push(" WHERE l.deleted_at IS NULL AND l.status = ");
    builder.push_bind(ListingStatus::Open.as_str());
    push_browse_filters(&mut builder, &query);
    builder.push(" ORDER BY l.published_at DESC NULLS LAST, l.created_at DESC LIMIT ");
    builder.push_bind(params.limit());
    builder.push(" OFFSET ");
    builder.push_bind(params.offset());

    let rows = builder.build().fetch_all(&state.pool).await?;
    let mut listings = Vec::with_capacity(rows.len());
    for row in &rows {
        listings.push(listing_from_row(row)?);
    }
    attach_tags(&state.pool, &mut listings).await?;

    Ok(Json(Page::new(listings, params, total)))
}

fn push_browse_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BrowseQuery) {
    if let Some(category) = non_blank(query.category.as_deref()) {
        builder.push(" AND c.slug = ");
        builder.push_bind(category.to_lowercase());
    }
    if let Some(tag) = non_blank(query.tag.as_deref()) {
        builder.push(
            " AND EXISTS (SELECT 1 FROM mp.listing_tags lt \
             JOIN mp.tags t ON t.tag_id = lt.tag_id \
             WHERE lt.listing_id = l.listing_id AND t.deleted_at IS NULL \
             AND lower(t.name) = lower(",
        );
        builder.push_bind(tag.split_whitespace().collect::<Vec<_>>().join(" "));
        builder.push("))");
    }
    if let Some(q) = non_blank(query.q.as_deref()) {
        let pattern = format!("%{}%", validation::escape_like(q));
        builder.push(" AND (l.title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR l.description ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
    if let Some(remote) = query.remote {
        builder.push(" AND l.is_remote = ");
        builder.push_bind(remote);
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub async fn get_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
) -> ApiResult<Json<ListingResponse>> {
    let viewer = optional_auth(&state, &headers).await?;
    let listing = fetch_listing(&state.pool, &listing_id)
        .await?
        .ok_or_else(listing_not_found)?;

    if listing.status == ListingStatus::Open.as_str() {
        return Ok(Json(listing));
    }
    let Some(viewer) = viewer else {
        return Err(listing_not_found());
    };
    if viewer.user_id == listing.seeker_id || has_applied(&state.pool, &listing_id, &viewer).await?
    {
        return Ok(Json(listing));
    }
    Err(listing_not_found())
}

async fn has_applied(
    pool: &Pool<Postgres>,
    listing_id: &str,
    viewer: &AuthContext,
) -> ApiResult<bool> {
    if !viewer.has_role(Role::Provider) {
        return Ok(false);
    }
    let applied: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM mp.applications WHERE listing_id = $1 AND provider_id = $2)",
    )
    .bind(listing_id)
    .bind(&viewer.user_id)
    .fetch_one(pool)
    .await?;
    Ok(applied)
}

pub async fn update_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
    Json(payload): Json<UpdateListingRequest>,
) -> ApiResult<Json<ListingWriteResponse>> {
    let auth = require_auth(&state, &headers).await?;
    enforce_write_rate_limit(&state, &auth).await?;

    let row = sqlx::query(
        "SELECT seeker_id, status, title, description, category_id, budget_min, budget_max, \
                currency, location, is_remote \
         FROM mp.listings WHERE listing_id = $1 AND deleted_at IS NULL",
    )
    .bind(&listing_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(listing_not_found)?;

    let seeker_id: String = row.try_get("seeker_id")?;
    ensure_owner(&auth, &seeker_id)?;
    let status = parse_status(&row.try_get::<String, _>("status")?)?;
    if !status.is_editable() {
        return Err(not_editable(status));
    }

    let current = ListingFields {
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category_id: row.try_get("category_id")?,
        budget_min: row.try_get("budget_min")?,
        budget_max: row.try_get("budget_max")?,
        currency: row.try_get("currency")?,
        location: row.try_get("location")?,
        is_remote: row.try_get("is_remote")?,
    };
    let fields = merge_listing_update(current, &payload)?;
    if payload.category_id.is_some() {
        ensure_live_category(&state.pool, fields.category_id.as_deref()).await?;
    }
    let resolutions = match payload.tags.as_deref() {
        Some(names) => Some(
            resolve_for_request(&state, names, payload.force_create_tags, &auth.user_id).await?,
        ),
        None => None,
    };

    let mut tx = state.pool.begin().await?;
    let updated = sqlx::query(
        "UPDATE mp.listings SET \
            title = $2, description = $3, category_id = $4, budget_min = $5, budget_max = $6, \
            currency = $7, location = $8, is_remote = $9, updated_at = NOW() \
         WHERE listing_id = $1 AND deleted_at IS NULL AND status IN ($10, $11)",
    )
    .bind(&listing_id)
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(&fields.category_id)
    .bind(fields.budget_min)
    .bind(fields.budget_max)
    .bind(&fields.currency)
    .bind(&fields.location)
    .bind(fields.is_remote)
    .bind(ListingStatus::Draft.as_str())
    .bind(ListingStatus::Open.as_str())
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::conflict(
            "LISTING_NOT_EDITABLE",
            "listing changed state while being edited",
        ));
    }
    if let Some(resolutions) = resolutions.as_deref() {
        replace_listing_tags(&mut tx, &listing_id, resolutions).await?;
    }
    tx.commit().await?;

    let listing = fetch_listing(&state.pool, &listing_id)
        .await?
        .ok_or_else(listing_not_found)?;
    Ok(Json(ListingWriteResponse {
        listing,
        tag_resolutions: resolutions.unwrap_or_default(),
    }))
}

#[allow(clippy::result_large_err)]
fn ensure_owner(auth: &AuthContext, seeker_id: &str) -> ApiResult<()> {
    if auth.user_id != seeker_id {
        return Err(ApiError::forbidden("only the listing owner may do this"));
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
pub(crate) fn parse_status(value: &str) -> ApiResult<ListingStatus> {
    value.parse().map_err(|err: String| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR", err)
    })
}

fn not_editable(status: ListingStatus) -> ApiError {
    ApiError::conflict(
        "LISTING_NOT_EDITABLE",
        format!("a {} listing cannot be edited", status.as_str()),
    )
}

#[allow(clippy::result_large_err)]
fn check_transition(from: ListingStatus, to: ListingStatus) -> ApiResult<()> {
    if from.can_transition_to(to) {
        return Ok(());
    }
    Err(ApiError::conflict(
        "INVALID_STATUS_TRANSITION",
        format!("cannot move a {} listing to {}", from.as_str(), to.as_str()),
    )
    .with_details(json!({ "from": from.as_str(), "to": to.as_str() })))
}

pub async fn publish_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
) -> ApiResult<Json<ListingResponse>> {
    transition(&state, &headers, &listing_id, ListingStatus::Open).await
}

pub async fn close_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
) -> ApiResult<Json<ListingResponse>> {
    transition(&state, &headers, &listing_id, ListingStatus::Closed).await
}

pub async fn complete_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
) -> ApiResult<Json<ListingResponse>> {
    transition(&state, &headers, &listing_id, ListingStatus::Completed).await
}

async fn transition(
    state: &AppState,
    headers: &HeaderMap,
    listing_id: &str,
    target: ListingStatus,
) -> ApiResult<Json<ListingResponse>> {
    let auth = require_auth(state, headers).await?;

    let mut tx = state.pool.begin().await?;
    let current = lock_owned_listing(&mut tx, &auth, listing_id).await?;
    check_transition(current, target)?;

    sqlx::query(
        "UPDATE mp.listings SET status = $2, updated_at = NOW(), \
            published_at = CASE WHEN $2 = 'open' THEN COALESCE(published_at, NOW()) \
                                ELSE published_at END \
         WHERE listing_id = $1",
    )
    .bind(listing_id)
    .bind(target.as_str())
    .execute(&mut *tx)
    .await?;
    if target == ListingStatus::Closed {
        reject_pending_applications(&mut tx, listing_id).await?;
    }
    tx.commit().await?;

    tracing::info!(
        listing_id = %listing_id,
        from = current.as_str(),
        to = target.as_str(),
        "listing status changed"
    );

    let listing = fetch_listing(&state.pool, listing_id)
        .await?
        .ok_or_else(listing_not_found)?;
    Ok(Json(listing))
}

async fn lock_owned_listing(
    tx: &mut Transaction<'_, Postgres>,
    auth: &AuthContext,
    listing_id: &str,
) -> ApiResult<ListingStatus> {
    let row = sqlx::query(
        "SELECT seeker_id, status FROM mp.listings \
         WHERE listing_id = $1 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(listing_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(listing_not_found)?;
    let seeker_id: String = row.try_get("seeker_id")?;
    ensure_owner(auth, &seeker_id)?;
    parse_status(&row.try_get::<String, _>("status")?)
}

pub(crate) async fn reject_pending_applications(
    tx: &mut Transaction<'_, Postgres>,
    listing_id: &str,
) -> ApiResult<u64> {
    let result = sqlx::query(
        "UPDATE mp.applications SET status = $2, updated_at = NOW() \
         WHERE listing_id = $1 AND status = $3",
    )
    .bind(listing_id)
    .bind(ApplicationStatus::Rejected.as_str())
    .bind(ApplicationStatus::Pending.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
) -> ApiResult<StatusCode> {
    let auth = require_auth(&state, &headers).await?;

    let mut tx = state.pool.begin().await?;
    let current = lock_owned_listing(&mut tx, &auth, &listing_id).await?;
    let status = if current.can_transition_to(ListingStatus::Closed) {
        ListingStatus::Closed
    } else {
        current
    };
    sqlx::query(
        "UPDATE mp.listings SET status = $2, deleted_at = NOW(), updated_at = NOW() \
         WHERE listing_id = $1",
    )
    .bind(&listing_id)
    .bind(status.as_str())
    .execute(&mut *tx)
    .await?;
    reject_pending_applications(&mut tx, &listing_id).await?;
    tx.commit().await?;

    tracing::info!(listing_id = %listing_id, "listing deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_my_listings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MyListingsQuery>,
) -> ApiResult<Json<Page<ListingResponse>>> {
    let auth = require_auth(&state, &headers).await?;
    let params = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .params();
    let status = match non_blank(query.status.as_deref()) {
        Some(value) => Some(value.parse::<ListingStatus>().map_err(|err| {
            ApiError::new(StatusCode::BAD_REQUEST, "INVALID_QUERY", err)
        })?),
        None => None,
    };

    let mut count_builder = QueryBuilder::new(
        "SELECT COUNT(*) FROM mp.listings l WHERE l.deleted_at IS NULL AND l.seeker_id = ",
    );
    count_builder.push_bind(auth.user_id.clone());
    if let Some(status) = status {
        count_builder.push(" AND l.status = ");
        count_builder.push_bind(status.as_str());
    }
    let total: i64 = count_builder
        .build_query_scalar()
        .fetch_one(&state.pool)
        .await?;

    let mut builder = QueryBuilder::new(LISTING_SELECT);
    builder.push(" WHERE l.deleted_at IS NULL AND l.seeker_id = ");
    builder.push_bind(auth.user_id.clone());
    if let Some(status) = status {
        builder.push(" AND l.status = ");
        builder.push_bind(status.as_str());
    }
    builder.push(" ORDER BY l.created_at DESC LIMIT ");
    builder.push_bind(params.limit());
    builder.push(" OFFSET ");
    builder.push_bind(params.offset());

    let rows = builder.build().fetch_all(&state.pool).await?;
    let mut listings = Vec::with_capacity(rows.len());
    for row in &rows {
        listings.push(listing_from_row(row)?);
    }
    attach_tags(&state.pool, &mut listings).await?;

    Ok(Json(Page::new(listings, params, total)))
}
