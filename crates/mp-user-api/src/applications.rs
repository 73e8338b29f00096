use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use mp_core::listing_status::{ApplicationStatus, ListingStatus};
use mp_core::pagination::{Page, PageQuery};
use mp_core::roles::Role;
use mp_core::validation::{self, ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::auth::{enforce_write_rate_limit, require_auth, AuthContext};
use crate::listings::parse_status;
use crate::{ApiError, ApiResult, AppState};

const APPLICATION_SELECT: &str = "SELECT a.application_id, a.listing_id, l.title AS listing_title, \
            a.provider_id, u.display_name AS provider_name, a.cover_letter, a.proposed_rate, \
            a.status, a.created_at, a.updated_at \
     FROM mp.applications a \
     JOIN mp.listings l ON l.listing_id = a.listing_id \
     JOIN mp.users u ON u.user_id = a.provider_id";

#[derive(Serialize)]
pub struct ApplicationResponse {
    pub application_id: String,
    pub listing_id: String,
    pub listing_title: String,
    pub provider_id: String,
    pub provider_name: String,
    pub cover_letter: String,
    pub proposed_rate: Option<i64>,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Deserialize)]
pub struct ApplyRequest {
    pub cover_letter: String,
    pub proposed_rate: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct ApplicationListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
}

impl ApplicationListQuery {
    #[allow(clippy::result_large_err)]
    fn status(&self) -> ApiResult<Option<ApplicationStatus>> {
        match self
            .status
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|err: String| ApiError::new(StatusCode::BAD_REQUEST, "INVALID_QUERY", err)),
            None => Ok(None),
        }
    }
}

fn validate_application(payload: &ApplyRequest) -> ValidationResult<(String, Option<i64>)> {
    let cover_letter = validation::bounded_text("cover_letter", &payload.cover_letter, 1, 5000)?;
    if payload.proposed_rate.is_some_and(|rate| rate < 0) {
        return Err(ValidationError::new("proposed_rate", "must not be negative"));
    }
    Ok((cover_letter, payload.proposed_rate))
}

fn application_from_row(row: &PgRow) -> Result<ApplicationResponse, sqlx::Error> {
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at")?;
    let updated_at: chrono::DateTime<chrono::Utc> = row.try_get("updated_at")?;
    Ok(ApplicationResponse {
        application_id: row.try_get("application_id")?,
        listing_id: row.try_get("listing_id")?,
        listing_title: row.try_get("listing_title")?,
        provider_id: row.try_get("provider_id")?,
        provider_name: row.try_get("provider_name")?,
        cover_letter: row.try_get("cover_letter")?,
        proposed_rate: row.try_get("proposed_rate")?,
        status: row.try_get("status")?,
        created_at: created_at.timestamp(),
        updated_at: updated_at.timestamp(),
    })
}

async fn fetch_application(
    state: &AppState,
    application_id: &str,
) -> ApiResult<ApplicationResponse> {
    let sql = format!("{APPLICATION_SELECT} WHERE a.application_id = $1");
    let row = sqlx::query(&sql)
        .bind(application_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(application_not_found)?;
    Ok(application_from_row(&row)?)
}

fn application_not_found() -> ApiError {
    ApiError::not_found("application not found")
}

#[allow(clippy::result_large_err)]
fn parse_application_status(value: &str) -> ApiResult<ApplicationStatus> {
    value.parse().map_err(|err: String| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR", err)
    })
}

#[allow(clippy::result_large_err)]
fn ensure_pending(status: ApplicationStatus) -> ApiResult<()> {
    if status == ApplicationStatus::Pending {
        return Ok(());
    }
    Err(ApiError::conflict(
        "APPLICATION_NOT_PENDING",
        format!("application is already {}", status.as_str()),
    ))
}

#[allow(clippy::result_large_err)]
fn ensure_listing_open(status: ListingStatus) -> ApiResult<()> {
    if status == ListingStatus::Open {
        return Ok(());
    }
    Err(ApiError::conflict(
        "LISTING_NOT_OPEN",
        format!("listing is {}", status.as_str()),
    ))
}

pub async fn apply(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
    Json(payload): Json<ApplyRequest>,
) -> ApiResult<(StatusCode, Json<ApplicationResponse>)> {
    let auth = require_auth(&state, &headers).await?;
    auth.require_role(Role::Provider)?;
    enforce_write_rate_limit(&state, &auth).await?;
    let (cover_letter, proposed_rate) = validate_application(&payload)?;

    let mut tx = state.pool.begin().await?;
    // Shared lock: the listing cannot close or be assigned until this commits.
    let row = sqlx::query(
        "SELECT seeker_id, status FROM mp.listings \
         WHERE listing_id = $1 AND deleted_at IS NULL FOR SHARE",
    )
    .bind(&listing_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("listing not found"))?;
    let seeker_id: String = row.try_get("seeker_id")?;
    if seeker_id == auth.user_id {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "OWN_LISTING",
            "you cannot apply to your own listing",
        ));
    }
    ensure_listing_open(parse_status(&row.try_get::<String, _>("status")?)?)?;

    let application_id = Uuid::new_v4().to_string();
    let inserted = sqlx::query(
        "INSERT INTO mp.applications \
         (application_id, listing_id, provider_id, cover_letter, proposed_rate) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&application_id)
    .bind(&listing_id)
    .bind(&auth.user_id)
    .bind(&cover_letter)
    .bind(proposed_rate)
    .execute(&mut *tx)
    .await;
    if let Err(err) = inserted {
        if mp_core::db::is_unique_violation(&err) {
            return Err(ApiError::conflict(
                "ALREADY_APPLIED",
                "you have already applied to this listing",
            ));
        }
        return Err(err.into());
    }
    tx.commit().await?;

    tracing::info!(
        application_id = %application_id,
        listing_id = %listing_id,
        provider_id = %auth.user_id,
        "application submitted"
    );
    let application = fetch_application(&state, &application_id).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

pub async fn list_listing_applications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
    Query(query): Query<ApplicationListQuery>,
) -> ApiResult<Json<Page<ApplicationResponse>>> {
    let auth = require_auth(&state, &headers).await?;
    let status = query.status()?;

    let seeker_id: Option<String> = sqlx::query_scalar(
        "SELECT seeker_id FROM mp.listings WHERE listing_id = $1 AND deleted_at IS NULL",
    )
    .bind(&listing_id)
    .fetch_optional(&state.pool)
    .await?;
    let seeker_id = seeker_id.ok_or_else(|| ApiError::not_found("listing not found"))?;
    if seeker_id != auth.user_id {
        return Err(ApiError::forbidden("only the listing owner may view applications"));
    }

    let page = list_applications(&state, "a.listing_id", &listing_id, status, &query).await?;
    Ok(Json(page))
}

pub async fn list_my_applications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ApplicationListQuery>,
) -> ApiResult<Json<Page<ApplicationResponse>>> {
    let auth = require_auth(&state, &headers).await?;
    auth.require_role(Role::Provider)?;
    let status = query.status()?;
    let page = list_applications(&state, "a.provider_id", &auth.user_id, status, &query).await?;
    Ok(Json(page))
}

/// `scope_column` is one of two fixed column names, never user input.
async fn list_applications(
    state: &AppState,
    scope_column: &'static str,
    scope_value: &str,
    status: Option<ApplicationStatus>,
    query: &ApplicationListQuery,
) -> ApiResult<Page<ApplicationResponse>> {
    let params = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .params();

    let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM mp.applications a");
    push_scope(&mut count_builder, scope_column, scope_value, status);
    let total: i64 = count_builder
        .build_query_scalar()
        .fetch_one(&state.pool)
        .await?;

    let mut builder = QueryBuilder::new(APPLICATION_SELECT);
    push_scope(&mut builder, scope_column, scope_value, status);
    builder.push(" ORDER BY a.created_at DESC LIMIT ");
    builder.push_bind(params.limit());
    builder.push(" OFFSET ");
    builder.push_bind(params.offset());

    let rows = builder.build().fetch_all(&state.pool).await?;
    let mut applications = Vec::with_capacity(rows.len());
    for row in &rows {
        applications.push(application_from_row(row)?);
    }
    Ok(Page::new(applications, params, total))
}

fn push_scope(
    builder: &mut QueryBuilder<'_, Postgres>,
    scope_column: &'static str,
    scope_value: &str,
    status: Option<ApplicationStatus>,
) {
    builder.push(format!(" WHERE {scope_column} = "));
    builder.push_bind(scope_value.to_string());
    if let Some(status) = status {
        builder.push(" AND a.status = ");
        builder.push_bind(status.as_str());
    }
}

pub async fn withdraw(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> ApiResult<Json<ApplicationResponse>> {
    let auth = require_auth(&state, &headers).await?;

    let mut tx = state.pool.begin().await?;
    let row = sqlx::query(
        "SELECT provider_id, status FROM mp.applications WHERE application_id = $1 FOR UPDATE",
    )
    .bind(&application_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(application_not_found)?;
    let provider_id: String = row.try_get("provider_id")?;
    if provider_id != auth.user_id {
        return Err(ApiError::forbidden("only the applicant may withdraw"));
    }
    ensure_pending(parse_application_status(&row.try_get::<String, _>("status")?)?)?;

    set_application_status(&mut tx, &application_id, ApplicationStatus::Withdrawn).await?;
    tx.commit().await?;

    Ok(Json(fetch_application(&state, &application_id).await?))
}

struct OwnedApplication {
    listing_id: String,
    status: ApplicationStatus,
    listing_status: ListingStatus,
}

/// Locks the application and its listing; the caller must own the listing.
async fn lock_for_owner(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    auth: &AuthContext,
    application_id: &str,
) -> ApiResult<OwnedApplication> {
    let row = sqlx::query(
        "SELECT a.listing_id, a.status, l.seeker_id, l.status AS listing_status \
         FROM mp.applications a \
         JOIN mp.listings l ON l.listing_id = a.listing_id \
         WHERE a.application_id = $1 AND l.deleted_at IS NULL \
         FOR UPDATE OF a, l",
    )
    .bind(application_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(application_not_found)?;

    let seeker_id: String = row.try_get("seeker_id")?;
    if seeker_id != auth.user_id {
        return Err(ApiError::forbidden(
            "only the listing owner may decide on applications",
        ));
    }
    Ok(OwnedApplication {
        listing_id: row.try_get("listing_id")?,
        status: parse_application_status(&row.try_get::<String, _>("status")?)?,
        listing_status: parse_status(&row.try_get::<String, _>("listing_status")?)?,
    })
}

async fn set_application_status(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    application_id: &str,
    status: ApplicationStatus,
) -> ApiResult<()> {
    sqlx::query(
        "UPDATE mp.applications SET status = $2, updated_at = NOW() WHERE application_id = $1",
    )
    .bind(application_id)
    .bind(status.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Accepting assigns the listing and rejects every other pending application
/// in the same transaction.
pub async fn accept(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> ApiResult<Json<ApplicationResponse>> {
    let auth = require_auth(&state, &headers).await?;

    let mut tx = state.pool.begin().await?;
    let owned = lock_for_owner(&mut tx, &auth, &application_id).await?;
    ensure_pending(owned.status)?;
    ensure_listing_open(owned.listing_status)?;

    set_application_status(&mut tx, &application_id, ApplicationStatus::Accepted).await?;
    sqlx::query("UPDATE mp.listings SET status = $2, updated_at = NOW() WHERE listing_id = $1")
        .bind(&owned.listing_id)
        .bind(ListingStatus::Assigned.as_str())
        .execute(&mut *tx)
        .await?;
    let rejected = sqlx::query(
        "UPDATE mp.applications SET status = $3, updated_at = NOW() \
         WHERE listing_id = $1 AND application_id <> $2 AND status = $4",
    )
    .bind(&owned.listing_id)
    .bind(&application_id)
    .bind(ApplicationStatus::Rejected.as_str())
    .bind(ApplicationStatus::Pending.as_str())
    .execute(&mut *tx)
    .await?
    .rows_affected();
    tx.commit().await?;

    tracing::info!(
        application_id = %application_id,
        listing_id = %owned.listing_id,
        rejected_others = rejected,
        "application accepted"
    );
    Ok(Json(fetch_application(&state, &application_id).await?))
}

pub async fn reject(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> ApiResult<Json<ApplicationResponse>> {
    let auth = require_auth(&state, &headers).await?;

    let mut tx = state.pool.begin().await?;
    let owned = lock_for_owner(&mut tx, &auth, &application_id).await?;
    ensure_pending(owned.status)?;
    set_application_status(&mut tx, &application_id, ApplicationStatus::Rejected).await?;
    tx.commit().await?;

    Ok(Json(fetch_application(&state, &application_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_letter_is_required_and_rate_non_negative() {
        let payload = ApplyRequest {
            cover_letter: "   ".to_string(),
            proposed_rate: None,
        };
        assert_eq!(validate_application(&payload).unwrap_err().field, "cover_letter");

        let payload = ApplyRequest {
            cover_letter: "I can do it tomorrow".to_string(),
            proposed_rate: Some(-5),
        };
        assert_eq!(validate_application(&payload).unwrap_err().field, "proposed_rate");

        let payload = ApplyRequest {
            cover_letter: " I can do it tomorrow ".to_string(),
            proposed_rate: Some(4_500),
        };
        assert_eq!(
            validate_application(&payload).unwrap(),
            ("I can do it tomorrow".to_string(), Some(4_500))
        );
    }

    #[test]
    fn only_pending_applications_can_be_decided() {
        assert!(ensure_pending(ApplicationStatus::Pending).is_ok());
        for status in [
            ApplicationStatus::Accepted,
            ApplicationStatus::Rejected,
            ApplicationStatus::Withdrawn,
        ] {
            let err = ensure_pending(status).unwrap_err();
            assert_eq!(err.code, "APPLICATION_NOT_PENDING");
        }
    }

    #[test]
    fn applications_need_an_open_listing() {
        assert!(ensure_listing_open(ListingStatus::Open).is_ok());
        assert_eq!(
            ensure_listing_open(ListingStatus::Draft).unwrap_err().code,
            "LISTING_NOT_OPEN"
        );
        assert!(ensure_listing_open(ListingStatus::Assigned).is_err());
    }

    #[test]
    fn status_filter_is_parsed() {
        let query = ApplicationListQuery {
            status: Some("pending".to_string()),
            ..Default::default()
        };
        assert_eq!(query.status().unwrap(), Some(ApplicationStatus::Pending));

        let query = ApplicationListQuery {
            status: Some("maybe".to_string()),
            ..Default::default()
        };
        assert_eq!(query.status().unwrap_err().code, "INVALID_QUERY");
        assert_eq!(ApplicationListQuery::default().status().unwrap(), None);
    }
}
