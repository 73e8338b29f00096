use anyhow::Result;
use serde_json::Value;
use sqlx::{Pool, Postgres, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service: String,
    pub version: i64,
    pub config_json: Value,
}

#[derive(Debug, Clone)]
pub struct ServiceConfigSnapshot {
    pub version: i64,
    pub config_json: Value,
}

impl ServiceConfigSnapshot {
    /// Looks up a nested unsigned integer, e.g. `u64_at(&["rate_limit", "login_per_minute"])`.
    pub fn u64_at(&self, path: &[&str]) -> Option<u64> {
        lookup(&self.config_json, path).and_then(Value::as_u64)
    }

    pub fn bool_at(&self, path: &[&str]) -> Option<bool> {
        lookup(&self.config_json, path).and_then(Value::as_bool)
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Shared, periodically refreshed view of one `mp_admin.service_configs` row.
#[derive(Clone)]
pub struct ServiceConfigHandle {
    state: Arc<RwLock<ServiceConfigSnapshot>>,
}

impl ServiceConfigHandle {
    pub async fn get(&self) -> ServiceConfigSnapshot {
        self.state.read().await.clone()
    }
}

pub fn static_handle(config_json: Value) -> ServiceConfigHandle {
    let snapshot = ServiceConfigSnapshot {
        version: 0,
        config_json,
    };
    ServiceConfigHandle {
        state: Arc::new(RwLock::new(snapshot)),
    }
}

pub async fn load_service_config(
    pool: &Pool<Postgres>,
    service: &str,
) -> Result<Option<ServiceConfig>> {
    let row = sqlx::query(
        "SELECT service, version, config_json FROM mp_admin.service_configs WHERE service = $1",
    )
    .bind(service)
    .fetch_optional(pool)
    .await?;

    if let Some(row) = row {
        Ok(Some(ServiceConfig {
            service: row.try_get("service")?,
            version: row.try_get("version")?,
            config_json: row.try_get("config_json")?,
        }))
    } else {
        Ok(None)
    }
}

pub async fn watch_service_config(
    pool: Pool<Postgres>,
    service: &'static str,
    default_config: Value,
    poll_interval: Duration,
) -> Result<ServiceConfigHandle> {
    let initial = load_service_config(&pool, service).await?;
    let snapshot = ServiceConfigSnapshot {
        version: initial.as_ref().map(|cfg| cfg.version).unwrap_or(0),
        config_json: initial
            .map(|cfg| cfg.config_json)
            .unwrap_or(default_config),
    };

    let state = Arc::new(RwLock::new(snapshot));
    let state_ref = Arc::clone(&state);
    tokio::spawn(async move {
        loop {
            time::sleep(poll_interval).await;
            match load_service_config(&pool, service).await {
                Ok(Some(cfg)) => {
                    let mut guard = state_ref.write().await;
                    if cfg.version != guard.version {
                        *guard = ServiceConfigSnapshot {
                            version: cfg.version,
                            config_json: cfg.config_json,
                        };
                        tracing::info!(service = service, version = guard.version, "service config updated");
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(service = service, error = %err, "service config poll failed");
                }
            }
        }
    });

    Ok(ServiceConfigHandle { state })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn static_handle_exposes_nested_values() {
        let handle = static_handle(json!({
            "rate_limit": { "enabled": true, "login_per_minute": 12 }
        }));
        let snapshot = handle.get().await;
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.u64_at(&["rate_limit", "login_per_minute"]), Some(12));
        assert_eq!(snapshot.bool_at(&["rate_limit", "enabled"]), Some(true));
        assert_eq!(snapshot.u64_at(&["rate_limit", "missing"]), None);
        assert_eq!(snapshot.u64_at(&["rate_limit", "enabled"]), None);
    }
}
