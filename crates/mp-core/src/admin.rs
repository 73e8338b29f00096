use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use sqlx::{Executor, Pool, Postgres};
use uuid::Uuid;

use crate::password::hash_password;

/// Creates the first admin account. Returns false when one already exists.
pub async fn bootstrap_admin(
    pool: &Pool<Postgres>,
    username: &str,
    password: &str,
) -> Result<bool> {
    validate_credentials(username, password)?;

    let mut tx = pool.begin().await?;
    let existing = sqlx::query_scalar::<_, String>(
        "SELECT admin_user_id FROM mp_admin.admin_users LIMIT 1",
    )
    .fetch_optional(&mut *tx)
    .await?;

    if existing.is_some() {
        tx.rollback().await?;
        return Ok(false);
    }

    let admin_user_id = Uuid::new_v4().to_string();
    let password_hash = hash_password(password)?;

    sqlx::query(
        "INSERT INTO mp_admin.admin_users \
         (admin_user_id, username, password_hash, is_active) \
         VALUES ($1, $2, $3, TRUE)",
    )
    .bind(&admin_user_id)
    .bind(username.trim())
    .bind(&password_hash)
    .execute(&mut *tx)
    .await?;

    log_audit(
        &mut *tx,
        "system",
        "admin.bootstrap",
        &format!("admin_user:{}", username.trim()),
        Some(json!({"created": true, "username": username.trim()})),
        Some("bootstrap"),
    )
    .await?;

    tx.commit().await?;
    Ok(true)
}

pub async fn reset_admin_password(
    pool: &Pool<Postgres>,
    username: &str,
    password: &str,
) -> Result<()> {
    validate_credentials(username, password)?;
    let password_hash = hash_password(password)?;

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE mp_admin.admin_users SET password_hash = $1 WHERE username = $2",
    )
    .bind(password_hash)
    .bind(username.trim())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(anyhow!("admin user not found"));
    }

    // Existing sessions must not outlive a credential reset.
    sqlx::query(
        "DELETE FROM mp_admin.admin_sessions WHERE admin_user_id IN \
         (SELECT admin_user_id FROM mp_admin.admin_users WHERE username = $1)",
    )
    .bind(username.trim())
    .execute(&mut *tx)
    .await?;

    log_audit(
        &mut *tx,
        "system",
        "admin.reset_password",
        &format!("admin_user:{}", username.trim()),
        Some(json!({"reset": true, "username": username.trim()})),
        Some("reset"),
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

pub fn default_service_configs() -> Vec<(&'static str, Value)> {
    vec![
        (
            "user-api",
            json!({
                "rate_limit": {
                    "enabled": true,
                    "auth_per_minute": 20,
                    "write_per_minute": 120
                }
            }),
        ),
        ("admin-api", json!({"session_ttl_seconds": 86400})),
    ]
}

pub async fn seed_service_configs(pool: &Pool<Postgres>) -> Result<Vec<String>> {
    let mut inserted = Vec::new();
    for (service, config_json) in default_service_configs() {
        let result = sqlx::query(
            "INSERT INTO mp_admin.service_configs \
             (service, version, config_json, updated_by) \
             VALUES ($1, 1, $2, $3) \
             ON CONFLICT (service) DO NOTHING",
        )
        .bind(service)
        .bind(config_json)
        .bind("system")
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted.push(service.to_string());
        }
    }

    Ok(inserted)
}

/// Appends a row to `mp_admin.audit_logs`. Works on a pool or inside a transaction.
pub async fn log_audit<'e, E>(
    executor: E,
    actor_admin_user_id: &str,
    action: &str,
    target: &str,
    diff_json: Option<Value>,
    request_id: Option<&str>,
) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        "INSERT INTO mp_admin.audit_logs \
         (actor_admin_user_id, action, target, diff_json, request_id) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(actor_admin_user_id)
    .bind(action)
    .bind(target)
    .bind(diff_json)
    .bind(request_id)
    .execute(executor)
    .await?;
    Ok(())
}

fn validate_credentials(username: &str, password: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(anyhow!("username is required"));
    }
    if password.len() < crate::validation::MIN_PASSWORD_LEN {
        return Err(anyhow!(
            "password must be at least {} characters",
            crate::validation::MIN_PASSWORD_LEN
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_require_username_and_long_password() {
        assert!(validate_credentials("  ", "long enough").is_err());
        assert!(validate_credentials("root", "short").is_err());
        assert!(validate_credentials("root", "long enough").is_ok());
    }

    #[test]
    fn default_configs_cover_both_services() {
        let services: Vec<&str> = default_service_configs()
            .into_iter()
            .map(|(service, _)| service)
            .collect();
        assert_eq!(services, vec!["user-api", "admin-api"]);
    }
}
