use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

/// Accepted range for `TRELLIS_TOKEN_TTL_DAYS`.
const TOKEN_TTL_DAYS: std::ops::RangeInclusive<i64> = 1..=3650;

pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("TRELLIS_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("TRELLIS_JWT_SECRET is unset or still a placeholder");
        }

        let db_path = get("TRELLIS_DB_PATH").unwrap_or_else(|| "trellis.db".into()).into();
        let host = get("TRELLIS_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = get("TRELLIS_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("TRELLIS_PORT is not a valid port")?;
        let token_ttl_days = get("TRELLIS_TOKEN_TTL_DAYS")
            .unwrap_or_else(|| "30".into())
            .parse::<i64>()
            .context("TRELLIS_TOKEN_TTL_DAYS is not a number")?;
        if !TOKEN_TTL_DAYS.contains(&token_ttl_days) {
            bail!(
                "TRELLIS_TOKEN_TTL_DAYS must be between {} and {}, got {}",
                TOKEN_TTL_DAYS.start(),
                TOKEN_TTL_DAYS.end(),
                token_ttl_days
            );
        }

        Ok(Self {
            jwt_secret,
            db_path,
            host,
            port,
            token_ttl_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[("TRELLIS_JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.db_path, PathBuf::from("trellis.db"));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.token_ttl_days, 30);
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(
            Config::from_lookup(lookup(&[("TRELLIS_JWT_SECRET", "dev-secret-change-me")])).is_err()
        );
    }

    #[test]
    fn bad_port_is_an_error() {
        let vars = [("TRELLIS_JWT_SECRET", "s3cret"), ("TRELLIS_PORT", "http")];
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn token_ttl_must_be_a_sane_number_of_days() {
        for bad in ["0", "-5", "3651", "1000000000000", "thirty"] {
            let vars = [("TRELLIS_JWT_SECRET", "s3cret"), ("TRELLIS_TOKEN_TTL_DAYS", bad)];
            assert!(Config::from_lookup(lookup(&vars)).is_err(), "accepted {}", bad);
        }

        let vars = [("TRELLIS_JWT_SECRET", "s3cret"), ("TRELLIS_TOKEN_TTL_DAYS", "3650")];
        assert_eq!(Config::from_lookup(lookup(&vars)).unwrap().token_ttl_days, 3650);
    }
}
