use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Longest accepted `TOKEN_TTL_SECS`; keeps `iat + ttl` inside an i64 timestamp.
pub const MAX_TOKEN_TTL_SECS: u64 = i64::MAX as u64 / 2;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),
    #[error("environment variable {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    pub bcrypt_cost: u32,
    pub token_ttl: Option<Duration>,
    pub admin: Option<AdminSeed>,
    pub template_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        dotenvy::dotenv().ok();
        Config::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let jwt_secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let bcrypt_cost: u32 = parse_or(var("BCRYPT_COST"), "BCRYPT_COST", 10)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                name: "BCRYPT_COST",
                reason: format!("{} is outside 4..=31", bcrypt_cost),
            });
        }
        let token_ttl = match var("TOKEN_TTL_SECS") {
            Some(raw) => {
                let secs: u64 = parse(&raw, "TOKEN_TTL_SECS")?;
                if secs > MAX_TOKEN_TTL_SECS {
                    return Err(ConfigError::Invalid {
                        name: "TOKEN_TTL_SECS",
                        reason: format!("{} exceeds {}", secs, MAX_TOKEN_TTL_SECS),
                    });
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };
        let admin = match (var("ADMIN_USERNAME"), var("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminSeed { username, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("ADMIN_USERNAME")),
        };

        Ok(Config {
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| "127.0.0.1".to_owned()),
            port: parse_or(var("PORT"), "PORT", 5000)?,
            database_path: var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("cinebook.db")),
            jwt_secret,
            bcrypt_cost,
            token_ttl,
            admin,
            template_dir: var("TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/templates"))),
        })
    }

    pub fn template_glob(&self) -> String {
        format!("{}/**/*", self.template_dir.display())
    }
}

fn parse<T>(raw: &str, name: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        reason: err.to_string(),
    })
}

fn parse_or<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse(&raw, name),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let loaded = config(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(loaded.port, 5000);
        assert_eq!(loaded.bind_address, "127.0.0.1");
        assert_eq!(loaded.bcrypt_cost, 10);
        assert!(loaded.token_ttl.is_none());
        assert!(loaded.admin.is_none());
        assert!(loaded.template_glob().ends_with("/templates/**/*"));
    }

    #[test]
    fn secret_is_required() {
        assert_eq!(config(&[]).err(), Some(ConfigError::Missing("JWT_SECRET")));
        assert_eq!(
            config(&[("JWT_SECRET", "")]).err(),
            Some(ConfigError::Missing("JWT_SECRET"))
        );
    }

    #[test]
    fn numbers_are_validated() {
        let err = config(&[("JWT_SECRET", "s"), ("PORT", "http")]).err().unwrap();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
        let err = config(&[("JWT_SECRET", "s"), ("BCRYPT_COST", "3")]).err().unwrap();
        assert!(matches!(err, ConfigError::Invalid { name: "BCRYPT_COST", .. }));
    }

    #[test]
    fn ttl_and_admin_seed_are_optional_but_complete() {
        let loaded = config(&[
            ("JWT_SECRET", "s"),
            ("TOKEN_TTL_SECS", "3600"),
            ("ADMIN_USERNAME", "root"),
            ("ADMIN_PASSWORD", "pw"),
        ])
        .unwrap();
        assert_eq!(loaded.token_ttl, Some(Duration::from_secs(3600)));
        assert_eq!(loaded.admin.unwrap().username, "root");

        let err = config(&[("JWT_SECRET", "s"), ("ADMIN_USERNAME", "root")])
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::Missing("ADMIN_PASSWORD"));
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        for raw in &["9223372036854775807", "18446744073709551615"] {
            let err = config(&[("JWT_SECRET", "s"), ("TOKEN_TTL_SECS", *raw)])
                .err()
                .unwrap();
            assert!(
                matches!(err, ConfigError::Invalid { name: "TOKEN_TTL_SECS", .. }),
                "{}",
                raw
            );
        }
        let largest = MAX_TOKEN_TTL_SECS.to_string();
        let loaded = config(&[("JWT_SECRET", "s"), ("TOKEN_TTL_SECS", largest.as_str())]).unwrap();
        assert_eq!(loaded.token_ttl, Some(Duration::from_secs(MAX_TOKEN_TTL_SECS)));
    }
}
