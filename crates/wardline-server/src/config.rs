use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("WARDLINE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("WARDLINE_JWT_SECRET is unset or still a placeholder; it must match the auth service's secret");
        }

        let port = match lookup("WARDLINE_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("WARDLINE_PORT is not a port: {raw}"))?,
            None => 3000,
        };

        Ok(Self {
            jwt_secret,
            db_path: lookup("WARDLINE_DB_PATH").unwrap_or_else(|| "wardline.db".into()).into(),
            host: lookup("WARDLINE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let c = config(&[("WARDLINE_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(c.port, 3000);
        assert_eq!(c.host, "0.0.0.0");
        assert_eq!(c.db_path, PathBuf::from("wardline.db"));
    }

    #[test]
    fn placeholder_secret_is_refused() {
        assert!(config(&[]).is_err());
        assert!(config(&[("WARDLINE_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(config(&[("WARDLINE_JWT_SECRET", "s3cret"), ("WARDLINE_PORT", "http")]).is_err());
        let c = config(&[("WARDLINE_JWT_SECRET", "s3cret"), ("WARDLINE_PORT", "8080")]).unwrap();
        assert_eq!(c.port, 8080);
    }
}
