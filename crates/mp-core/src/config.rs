use anyhow::{anyhow, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::auth::JwtConfig;

pub fn required_env(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("missing env: {name}"))
}

pub fn socket_addr_from_env(name: &str, default: &str) -> Result<SocketAddr> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    SocketAddr::from_str(&value).map_err(|err| anyhow!("invalid socket addr for {name}: {err}"))
}

pub fn u64_from_env(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|err| anyhow!("invalid integer for {name}: {err}")),
        Err(_) => Ok(default),
    }
}

/// Reads the bearer token settings shared by the user API and the CLI.
pub fn jwt_config_from_env() -> Result<JwtConfig> {
    let secret = required_env("JWT_SECRET")?;
    if secret.len() < 16 {
        return Err(anyhow!("JWT_SECRET must be at least 16 bytes"));
    }
    Ok(JwtConfig {
        issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "mp-user-api".to_string()),
        audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "mp".to_string()),
        secret,
        ttl_seconds: u64_from_env("JWT_TTL_SECONDS", 86_400)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn env_lock() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    struct EnvGuard {
        key: &'static str,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            env::remove_var(self.key);
        }
    }

    fn set_env(key: &'static str, value: &str) -> EnvGuard {
        env::set_var(key, value);
        EnvGuard { key }
    }

    #[test]
    fn required_env_reads_value() {
        let _lock = env_lock();
        let _guard = set_env("MP_TEST_REQUIRED_ENV_PRESENT", "value");
        let value = required_env("MP_TEST_REQUIRED_ENV_PRESENT").unwrap();
        assert_eq!(value, "value");
    }

    #[test]
    fn required_env_missing_returns_error() {
        let _lock = env_lock();
        env::remove_var("MP_TEST_REQUIRED_ENV_MISSING");
        assert!(required_env("MP_TEST_REQUIRED_ENV_MISSING").is_err());
    }

    #[test]
    fn socket_addr_from_env_uses_default() {
        let _lock = env_lock();
        env::remove_var("MP_TEST_SOCKET_DEFAULT");
        let addr = socket_addr_from_env("MP_TEST_SOCKET_DEFAULT", "127.0.0.1:1234").unwrap();
        assert_eq!(addr, "127.0.0.1:1234".parse().unwrap());
    }

    #[test]
    fn socket_addr_from_env_invalid_returns_error() {
        let _lock = env_lock();
        let _guard = set_env("MP_TEST_SOCKET_INVALID", "not-a-socket");
        assert!(socket_addr_from_env("MP_TEST_SOCKET_INVALID", "127.0.0.1:1234").is_err());
    }

    #[test]
    fn u64_from_env_parses_and_defaults() {
        let _lock = env_lock();
        env::remove_var("MP_TEST_U64_DEFAULT");
        assert_eq!(u64_from_env("MP_TEST_U64_DEFAULT", 30).unwrap(), 30);

        let _guard = set_env("MP_TEST_U64_SET", " 45 ");
        assert_eq!(u64_from_env("MP_TEST_U64_SET", 30).unwrap(), 45);
    }

    #[test]
    fn u64_from_env_rejects_garbage() {
        let _lock = env_lock();
        let _guard = set_env("MP_TEST_U64_BAD", "soon");
        assert!(u64_from_env("MP_TEST_U64_BAD", 30).is_err());
    }

    #[test]
    fn jwt_config_rejects_short_secret() {
        let _lock = env_lock();
        let _guard = set_env("JWT_SECRET", "short");
        assert!(jwt_config_from_env().is_err());
    }

    #[test]
    fn jwt_config_applies_defaults() {
        let _lock = env_lock();
        let _guard = set_env("JWT_SECRET", "0123456789abcdef0123");
        env::remove_var("JWT_ISSUER");
        env::remove_var("JWT_AUDIENCE");
        env::remove_var("JWT_TTL_SECONDS");
        let config = jwt_config_from_env().unwrap();
        assert_eq!(config.issuer, "mp-user-api");
        assert_eq!(config.audience, "mp");
        assert_eq!(config.ttl_seconds, 86_400);
    }
}
