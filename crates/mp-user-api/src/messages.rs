use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use mp_core::pagination::{Page, PageQuery};
use mp_core::roles::AccountStatus;
use mp_core::validation;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::auth::{enforce_write_rate_limit, require_auth};
use crate::{ApiError, ApiResult, AppState};

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub recipient_id: String,
    pub body: String,
    pub listing_id: Option<String>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub listing_id: Option<String>,
    pub body: String,
    pub read_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Serialize)]
pub struct ThreadResponse {
    pub counterpart_id: String,
    pub counterpart_name: String,
    pub last_message: MessageResponse,
    pub unread_count: i64,
}

fn message_from_row(row: &PgRow) -> Result<MessageResponse, sqlx::Error> {
    let read_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("read_at")?;
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at")?;
    Ok(MessageResponse {
        message_id: row.try_get("message_id")?,
        sender_id: row.try_get("sender_id")?,
        recipient_id: row.try_get("recipient_id")?,
        listing_id: row.try_get("listing_id")?,
        body: row.try_get("body")?,
        read_at: read_at.map(|value| value.timestamp()),
        created_at: created_at.timestamp(),
    })
}

pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let auth = require_auth(&state, &headers).await?;
    enforce_write_rate_limit(&state, &auth).await?;

    let body = validation::bounded_text("body", &payload.body, 1, 5000)?;
    let recipient_id = payload.recipient_id.trim().to_string();
    if recipient_id == auth.user_id {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_RECIPIENT",
            "you cannot message yourself",
        ));
    }

    let recipient_status: Option<String> =
        sqlx::query_scalar("SELECT status FROM mp.users WHERE user_id = $1")
            .bind(&recipient_id)
            .fetch_optional(&state.pool)
            .await?;
    if recipient_status.as_deref() != Some(AccountStatus::Active.as_str()) {
        return Err(ApiError::not_found("recipient not found"));
    }

    let listing_id = payload
        .listing_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    if let Some(listing_id) = listing_id.as_deref() {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM mp.listings WHERE listing_id = $1 AND deleted_at IS NULL)",
        )
        .bind(listing_id)
        .fetch_one(&state.pool)
        .await?;
        if !exists {
            return Err(ApiError::not_found("listing not found"));
        }
    }

    let row = sqlx::query(
        "INSERT INTO mp.messages (message_id, sender_id, recipient_id, listing_id, body) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING message_id, sender_id, recipient_id, listing_id, body, read_at, created_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&auth.user_id)
    .bind(&recipient_id)
    .bind(&listing_id)
    .bind(&body)
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(message_from_row(&row)?)))
}

/// One row per counterpart, most recent conversation first.
pub async fn list_threads(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ThreadResponse>>> {
    let auth = require_auth(&state, &headers).await?;

    let rows = sqlx::query(
        "WITH conversation AS ( \
             SELECT m.*, \
                    CASE WHEN m.sender_id = $1 THEN m.recipient_id ELSE m.sender_id END \
                        AS counterpart_id \
             FROM mp.messages m \
             WHERE m.sender_id = $1 OR m.recipient_id = $1 \
         ), latest AS ( \
             SELECT DISTINCT ON (counterpart_id) * \
             FROM conversation \
             ORDER BY counterpart_id, created_at DESC, message_id DESC \
         ) \
         SELECT latest.*, u.display_name AS counterpart_name, \
                (SELECT COUNT(*) FROM mp.messages unread \
                 WHERE unread.sender_id = latest.counterpart_id \
                   AND unread.recipient_id = $1 AND unread.read_at IS NULL) AS unread_count \
         FROM latest \
         JOIN mp.users u ON u.user_id = latest.counterpart_id \
         ORDER BY latest.created_at DESC",
    )
    .bind(&auth.user_id)
    .fetch_all(&state.pool)
    .await?;

    let mut threads = Vec::with_capacity(rows.len());
    for row in &rows {
        threads.push(ThreadResponse {
            counterpart_id: row.try_get("counterpart_id")?,
            counterpart_name: row.try_get("counterpart_name")?,
            last_message: message_from_row(row)?,
            unread_count: row.try_get("unread_count")?,
        });
    }
    Ok(Json(threads))
}

pub async fn conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<MessageResponse>>> {
    let auth = require_auth(&state, &headers).await?;
    let params = page.params();

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM mp.messages \
         WHERE (sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1)",
    )
    .bind(&auth.user_id)
    .bind(&user_id)
    .fetch_one(&state.pool)
    .await?;

    let rows = sqlx::query(
        "SELECT message_id, sender_id, recipient_id, listing_id, body, read_at, created_at \
         FROM mp.messages \
         WHERE (sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1) \
         ORDER BY created_at DESC, message_id DESC \
         LIMIT $3 OFFSET $4",
    )
    .bind(&auth.user_id)
    .bind(&user_id)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&state.pool)
    .await?;

    let mut messages = Vec::with_capacity(rows.len());
    for row in &rows {
        messages.push(message_from_row(row)?);
    }
    Ok(Json(Page::new(messages, params, total)))
}

/// Idempotent: a second call keeps the first `read_at`.
pub async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let auth = require_auth(&state, &headers).await?;

    let row = sqlx::query(
        "UPDATE mp.messages SET read_at = COALESCE(read_at, NOW()) \
         WHERE message_id = $1 AND recipient_id = $2 \
         RETURNING message_id, sender_id, recipient_id, listing_id, body, read_at, created_at",
    )
    .bind(&message_id)
    .bind(&auth.user_id)
    .fetch_optional(&state.pool)
    .await?;

    match row {
        Some(row) => Ok(Json(message_from_row(&row)?)),
        None => Err(ApiError::not_found("message not found")),
    }
}
