use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use mp_core::admin::default_service_configs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use utoipa::ToSchema;

use crate::auth::require_admin;
use crate::{ApiError, ApiResult, AppState};

const DEFAULT_AUDIT_LIMIT: i64 = 200;
const MAX_AUDIT_LIMIT: i64 = 1000;

#[derive(Serialize, ToSchema)]
pub struct ServiceConfigResponse {
    pub service: String,
    pub version: i64,
    pub config_json: Value,
    pub updated_at: i64,
    pub updated_by: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateServiceConfigRequest {
    pub config_json: Value,
    pub expected_version: Option<i64>,
}

#[derive(Deserialize)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub target: Option<String>,
    pub since: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct AuditLog {
    pub audit_id: i64,
    pub actor_admin_user_id: String,
    pub action: String,
    pub target: String,
    pub diff_json: Option<Value>,
    pub request_id: Option<String>,
    pub created_at: i64,
}

fn config_from_row(row: &PgRow) -> Result<ServiceConfigResponse, sqlx::Error> {
    let updated_at: chrono::DateTime<chrono::Utc> = row.try_get("updated_at")?;
    Ok(ServiceConfigResponse {
        service: row.try_get("service")?,
        version: row.try_get("version")?,
        config_json: row.try_get("config_json")?,
        updated_at: updated_at.timestamp(),
        updated_by: row.try_get("updated_by")?,
    })
}

fn ensure_known_service(service: &str) -> ApiResult<()> {
    if default_service_configs()
        .iter()
        .any(|(known, _)| *known == service)
    {
        Ok(())
    } else {
        Err(ApiError::not_found("service not found"))
    }
}

/// Rejects values the services would silently ignore.
fn validate_config(service: &str, config_json: &Value) -> ApiResult<()> {
    let Some(object) = config_json.as_object() else {
        return Err(ApiError::invalid(
            "INVALID_CONFIG",
            "config_json must be an object",
        ));
    };
    let positive = |value: &Value| value.as_u64().is_some_and(|value| value > 0);
    match service {
        "user-api" => {
            if let Some(rate_limit) = object.get("rate_limit") {
                let Some(rate_limit) = rate_limit.as_object() else {
                    return Err(ApiError::invalid("INVALID_CONFIG", "rate_limit must be an object"));
                };
                if rate_limit.get("enabled").is_some_and(|value| !value.is_boolean()) {
                    return Err(ApiError::invalid(
                        "INVALID_CONFIG",
                        "rate_limit.enabled must be a boolean",
                    ));
                }
                for key in ["auth_per_minute", "write_per_minute"] {
                    if rate_limit.get(key).is_some_and(|value| !positive(value)) {
                        return Err(ApiError::invalid(
                            "INVALID_CONFIG",
                            format!("rate_limit.{key} must be a positive integer"),
                        ));
                    }
                }
            }
        }
        "admin-api" => {
            if object
                .get("session_ttl_seconds")
                .is_some_and(|value| !positive(value))
            {
                return Err(ApiError::invalid(
                    "INVALID_CONFIG",
                    "session_ttl_seconds must be a positive integer",
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

pub async fn list_services(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<Json<Vec<ServiceConfigResponse>>> {
    require_admin(&state, &jar).await?;

    let rows = sqlx::query(
        "SELECT service, version, config_json, updated_at, updated_by \
         FROM mp_admin.service_configs ORDER BY service",
    )
    .fetch_all(&state.pool)
    .await?;

    let mut services = Vec::with_capacity(rows.len());
    for row in &rows {
        services.push(config_from_row(row)?);
    }
    Ok(Json(services))
}

pub async fn get_service_config(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(service): Path<String>,
) -> ApiResult<Json<ServiceConfigResponse>> {
    require_admin(&state, &jar).await?;

    let row = sqlx::query(
        "SELECT service, version, config_json, updated_at, updated_by \
         FROM mp_admin.service_configs WHERE service = $1",
    )
    .bind(&service)
    .fetch_optional(&state.pool)
    .await?;
    match row {
        Some(row) => Ok(Json(config_from_row(&row)?)),
        None => Err(ApiError::not_found("service not found")),
    }
}

/// Optimistic update: a stale `expected_version` is refused with 409.
pub async fn update_service_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(service): Path<String>,
    Json(payload): Json<UpdateServiceConfigRequest>,
) -> ApiResult<Json<ServiceConfigResponse>> {
    let admin = require_admin(&state, &jar).await?;
    ensure_known_service(&service)?;
    validate_config(&service, &payload.config_json)?;

    let mut tx = state.pool.begin().await?;
    let current: Option<i64> = sqlx::query_scalar(
        "SELECT version FROM mp_admin.service_configs WHERE service = $1 FOR UPDATE",
    )
    .bind(&service)
    .fetch_optional(&mut *tx)
    .await?;

    let row = match current {
        Some(current_version) => {
            if let Some(expected) = payload.expected_version {
                if expected != current_version {
                    return Err(ApiError::new(
                        StatusCode::CONFLICT,
                        "VERSION_MISMATCH",
                        "service config version mismatch",
                    )
                    .with_details(serde_json::json!({ "current_version": current_version })));
                }
            }
            sqlx::query(
                "UPDATE mp_admin.service_configs \
                 SET config_json = $1, version = version + 1, updated_at = NOW(), updated_by = $2 \
                 WHERE service = $3 \
                 RETURNING service, version, config_json, updated_at, updated_by",
            )
            .bind(&payload.config_json)
            .bind(&admin.admin_user_id)
            .bind(&service)
            .fetch_one(&mut *tx)
            .await?
        }
        None => {
            sqlx::query(
                "INSERT INTO mp_admin.service_configs (service, version, config_json, updated_by) \
                 VALUES ($1, 1, $2, $3) \
                 RETURNING service, version, config_json, updated_at, updated_by",
            )
            .bind(&service)
            .bind(&payload.config_json)
            .bind(&admin.admin_user_id)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    crate::log_admin_audit(
        &mut *tx,
        &admin.admin_user_id,
        "service_config.update",
        &format!("service:{service}"),
        Some(payload.config_json.clone()),
        &headers,
    )
    .await?;
    let response = config_from_row(&row)?;
    tx.commit().await?;

    tracing::info!(service = %service, version = response.version, "service config updated");
    Ok(Json(response))
}

fn push_audit_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &AuditQuery) {
    if let Some(action) = query.action.as_ref() {
        builder.push(" AND action = ");
        builder.push_bind(action.clone());
    }
    if let Some(target) = query.target.as_ref() {
        builder.push(" AND target = ");
        builder.push_bind(target.clone());
    }
    if let Some(since) = query.since {
        builder.push(" AND created_at >= to_timestamp(");
        builder.push_bind(since);
        builder.push(")");
    }
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditLog>>> {
    require_admin(&state, &jar).await?;

    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT audit_id, actor_admin_user_id, action, target, diff_json, request_id, created_at \
         FROM mp_admin.audit_logs WHERE 1=1",
    );
    push_audit_filters(&mut builder, &query);
    builder.push(" ORDER BY created_at DESC, audit_id DESC LIMIT ");
    builder.push_bind(
        query
            .limit
            .unwrap_or(DEFAULT_AUDIT_LIMIT)
            .clamp(1, MAX_AUDIT_LIMIT),
    );

    let rows = builder.build().fetch_all(&state.pool).await?;
    let mut logs = Vec::with_capacity(rows.len());
    for row in rows {
        let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at")?;
        logs.push(AuditLog {
            audit_id: row.try_get("audit_id")?,
            actor_admin_user_id: row.try_get("actor_admin_user_id")?,
            action: row.try_get("action")?,
            target: row.try_get("target")?,
            diff_json: row.try_get("diff_json")?,
            request_id: row.try_get("request_id")?,
            created_at: created_at.timestamp(),
        });
    }

    Ok(Json(logs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_seeded_services_are_configurable() {
        assert!(ensure_known_service("user-api").is_ok());
        assert!(ensure_known_service("admin-api").is_ok());
        assert_eq!(
            ensure_known_service("relay").unwrap_err().status,
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn config_validation_checks_known_keys() {
        assert!(validate_config("user-api", &json!({})).is_ok());
        assert!(validate_config(
            "user-api",
            &json!({ "rate_limit": { "enabled": false, "auth_per_minute": 5 } })
        )
        .is_ok());
        assert_eq!(
            validate_config("user-api", &json!([1, 2])).unwrap_err().code,
            "INVALID_CONFIG"
        );
        assert!(validate_config(
            "user-api",
            &json!({ "rate_limit": { "write_per_minute": 0 } })
        )
        .is_err());
        assert!(validate_config("user-api", &json!({ "rate_limit": { "enabled": "yes" } })).is_err());
        assert!(validate_config("admin-api", &json!({ "session_ttl_seconds": 3600 })).is_ok());
        assert!(validate_config("admin-api", &json!({ "session_ttl_seconds": -1 })).is_err());
    }

    #[test]
    fn audit_filters_bind_in_order() {
        let query = AuditQuery {
            action: Some("tag.rename".into()),
            target: None,
            since: Some(1_700_000_000),
            limit: None,
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM mp_admin.audit_logs WHERE 1=1");
        push_audit_filters(&mut builder, &query);
        let sql = builder.sql();
        assert!(sql.contains("action = $1"));
        assert!(sql.contains("to_timestamp($2)"));
        assert!(!sql.contains("target ="));
    }
}
