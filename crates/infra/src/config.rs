//! Configuration loading from the process environment.
//!
//! Secrets, issuer and audience have no defaults: startup fails when they are
//! missing. Loaders take a lookup function so tests never touch the real
//! environment.

use std::net::SocketAddr;
use std::time::Duration;

use sessiongate_auth::{ConfigError, ReusePolicy, Secret, TokenConfig};

use crate::credentials::{parse_seed_users, SeedUser};

pub const ACCESS_SECRET: &str = "AUTH_ACCESS_SECRET";
pub const REFRESH_SECRET: &str = "AUTH_REFRESH_SECRET";
pub const ACCESS_TTL_SECS: &str = "AUTH_ACCESS_TTL_SECS";
pub const REFRESH_TTL_SECS: &str = "AUTH_REFRESH_TTL_SECS";
pub const ISSUER: &str = "AUTH_ISSUER";
pub const AUDIENCE: &str = "AUTH_AUDIENCE";
pub const LEEWAY_SECS: &str = "AUTH_LEEWAY_SECS";
pub const REGISTRY_TIMEOUT_MS: &str = "AUTH_REGISTRY_TIMEOUT_MS";
pub const REUSE_POLICY: &str = "AUTH_REUSE_POLICY";
pub const SEED_USERS: &str = "AUTH_SEED_USERS";
pub const BIND_ADDR: &str = "BIND_ADDR";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const GC_INTERVAL_SECS: &str = "REGISTRY_GC_INTERVAL_SECS";

const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECS: u64 = 7 * 24 * 3600;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_GC_INTERVAL_SECS: u64 = 300;

/// Process-level settings of the API binary.
#[derive(Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Postgres registry when set, in-memory registry otherwise.
    pub database_url: Option<String>,
    pub gc_interval: Duration,
    pub seed_users: Vec<SeedUser>,
}

impl core::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("gc_interval", &self.gc_interval)
            .field("seed_users", &self.seed_users.len())
            .finish()
    }
}

pub fn load_token_config() -> Result<TokenConfig, ConfigError> {
    load_token_config_from(|key| std::env::var(key).ok())
}

pub fn load_server_config() -> Result<ServerConfig, ConfigError> {
    load_server_config_from(|key| std::env::var(key).ok())
}

pub fn load_token_config_from<F>(get: F) -> Result<TokenConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |key: &'static str| -> Result<String, ConfigError> {
        get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(key))
    };

    let mut config = TokenConfig::new(
        Secret::new(required(ACCESS_SECRET)?.into_bytes()),
        Secret::new(required(REFRESH_SECRET)?.into_bytes()),
        Duration::from_secs(parse_or(&get, ACCESS_TTL_SECS, DEFAULT_ACCESS_TTL_SECS)?),
        Duration::from_secs(parse_or(&get, REFRESH_TTL_SECS, DEFAULT_REFRESH_TTL_SECS)?),
        required(ISSUER)?,
        required(AUDIENCE)?,
    );

    config = config.with_leeway(Duration::from_secs(parse_or(&get, LEEWAY_SECS, 0)?));
    let default_timeout = TokenConfig::DEFAULT_REGISTRY_TIMEOUT.as_millis() as u64;
    config = config.with_registry_timeout(Duration::from_millis(parse_or(&get, REGISTRY_TIMEOUT_MS, default_timeout)?));

    if let Some(policy) = get(REUSE_POLICY) {
        config = config.with_reuse_policy(policy.parse::<ReusePolicy>()?);
    }

    config.validate()?;
    Ok(config)
}

pub fn load_server_config_from<F>(get: F) -> Result<ServerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw_addr = get(BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let bind_addr = raw_addr.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
        field: BIND_ADDR,
        reason: e.to_string(),
    })?;

    let gc_secs = parse_or(&get, GC_INTERVAL_SECS, DEFAULT_GC_INTERVAL_SECS)?;
    if gc_secs == 0 {
        return Err(ConfigError::Invalid {
            field: GC_INTERVAL_SECS,
            reason: "must be positive".to_string(),
        });
    }

    let seed_users = match get(SEED_USERS) {
        Some(json) if !json.trim().is_empty() => parse_seed_users(&json)?,
        _ => Vec::new(),
    };

    Ok(ServerConfig {
        bind_addr,
        database_url: get(DATABASE_URL).filter(|v| !v.trim().is_empty()),
        gc_interval: Duration::from_secs(gc_secs),
        seed_users,
    })
}

fn parse_or<F>(get: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
            field: key,
            reason: format!("'{raw}' is not a non-negative integer ({e})"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            (ACCESS_SECRET, "access-secret-access-secret-access-secret"),
            (REFRESH_SECRET, "refresh-secret-refresh-secret-refresh-secret"),
            (ISSUER, "sessiongate"),
            (AUDIENCE, "sessiongate-clients"),
        ]
    }

    #[test]
    fn minimal_env_uses_defaults() {
        let config = load_token_config_from(env(&minimal())).unwrap();
        assert_eq!(config.access_ttl, Duration::from_secs(900));
        assert_eq!(config.refresh_ttl, Duration::from_secs(604_800));
        assert_eq!(config.leeway, Duration::ZERO);
        assert_eq!(config.registry_timeout, TokenConfig::DEFAULT_REGISTRY_TIMEOUT);
        assert_eq!(config.reuse_policy, ReusePolicy::RevokeAllForSubject);
    }

    #[test]
    fn missing_secret_fails() {
        let vars: Vec<_> = minimal().into_iter().filter(|(k, _)| *k != REFRESH_SECRET).collect();
        assert_eq!(
            load_token_config_from(env(&vars)).unwrap_err(),
            ConfigError::Missing(REFRESH_SECRET)
        );
    }

    #[test]
    fn overrides_are_parsed_and_validated() {
        let mut vars = minimal();
        vars.extend([
            (ACCESS_TTL_SECS, "60"),
            (REFRESH_TTL_SECS, "3600"),
            (LEEWAY_SECS, "5"),
            (REGISTRY_TIMEOUT_MS, "250"),
            (REUSE_POLICY, "revoke_token_only"),
        ]);
        let config = load_token_config_from(env(&vars)).unwrap();
        assert_eq!(config.access_ttl, Duration::from_secs(60));
        assert_eq!(config.leeway, Duration::from_secs(5));
        assert_eq!(config.registry_timeout, Duration::from_millis(250));
        assert_eq!(config.reuse_policy, ReusePolicy::RevokeTokenOnly);

        let mut bad = minimal();
        bad.push((ACCESS_TTL_SECS, "soon"));
        assert!(matches!(
            load_token_config_from(env(&bad)),
            Err(ConfigError::Invalid { field: ACCESS_TTL_SECS, .. })
        ));
    }

    #[test]
    fn absurd_refresh_ttl_fails_at_load_time() {
        for ttl in ["10000000000000", "18446744073709551615"] {
            let mut vars = minimal();
            vars.push((REFRESH_TTL_SECS, ttl));
            assert!(
                matches!(
                    load_token_config_from(env(&vars)),
                    Err(ConfigError::Invalid { field: "refresh_ttl", .. })
                ),
                "{ttl}"
            );
        }
    }

    #[test]
    fn identical_secrets_are_rejected() {
        let vars = vec![
            (ACCESS_SECRET, "same-secret-same-secret-same-secret-!!"),
            (REFRESH_SECRET, "same-secret-same-secret-same-secret-!!"),
            (ISSUER, "sessiongate"),
            (AUDIENCE, "sessiongate-clients"),
        ];
        assert!(load_token_config_from(env(&vars)).is_err());
    }

    #[test]
    fn server_config_defaults_and_overrides() {
        let config = load_server_config_from(env(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert!(config.database_url.is_none());
        assert!(config.seed_users.is_empty());

        let config = load_server_config_from(env(&[
            (BIND_ADDR, "127.0.0.1:9000"),
            (DATABASE_URL, "postgres://localhost/sessions"),
            (GC_INTERVAL_SECS, "30"),
            (SEED_USERS, r#"[{"email":"a@b.c","password":"pw","name":"A"}]"#),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.gc_interval, Duration::from_secs(30));
        assert_eq!(config.seed_users.len(), 1);
        assert!(!format!("{config:?}").contains("postgres://"));

        assert!(load_server_config_from(env(&[(GC_INTERVAL_SECS, "0")])).is_err());
        assert!(load_server_config_from(env(&[(BIND_ADDR, "nowhere")])).is_err());
    }
}
