use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Lifetimes of one-time codes per channel, plus how long a confirmed code
/// keeps a password reset open.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeConfig {
    pub email_ttl_minutes: i64,
    pub phone_ttl_minutes: i64,
    pub reset_window_minutes: i64,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            email_ttl_minutes: 5,
            phone_ttl_minutes: 2,
            reset_window_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinioConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs the service on the in-process store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub codes: CodeConfig,
    pub minio: Option<MinioConfig>,
}

/// Ten years.
const MAX_MINUTES: i64 = 60 * 24 * 365 * 10;

fn parse_minutes(key: &str, raw: Option<String>, default: i64) -> anyhow::Result<i64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of minutes, got {raw:?}"))?;
    if !(1..=MAX_MINUTES).contains(&value) {
        anyhow::bail!("{key} must be between 1 and {MAX_MINUTES} minutes, got {value}");
    }
    Ok(value)
}

fn env_minutes(key: &str, default: i64) -> anyhow::Result<i64> {
    parse_minutes(key, std::env::var(key).ok(), default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "socialgraph".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "socialgraph-users".into()),
            ttl_minutes: env_minutes("JWT_TTL_MINUTES", 60)?,
            refresh_ttl_minutes: env_minutes("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14)?,
        };
        let defaults = CodeConfig::default();
        let codes = CodeConfig {
            email_ttl_minutes: env_minutes("EMAIL_CODE_TTL_MINUTES", defaults.email_ttl_minutes)?,
            phone_ttl_minutes: env_minutes("PHONE_CODE_TTL_MINUTES", defaults.phone_ttl_minutes)?,
            reset_window_minutes: env_minutes("RESET_WINDOW_MINUTES", defaults.reset_window_minutes)?,
        };
        let minio = match std::env::var("MINIO_ENDPOINT") {
            Ok(endpoint) => Some(MinioConfig {
                endpoint,
                bucket: std::env::var("MINIO_BUCKET")?,
                access_key: std::env::var("MINIO_ACCESS_KEY")?,
                secret_key: std::env::var("MINIO_SECRET_KEY")?,
                region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
            }),
            Err(_) => None,
        };
        Ok(Self {
            database_url,
            jwt,
            codes,
            minio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_minutes_fall_back_to_default() {
        assert_eq!(parse_minutes("JWT_TTL_MINUTES", None, 60).unwrap(), 60);
        assert_eq!(parse_minutes("JWT_TTL_MINUTES", Some(" 15 ".into()), 60).unwrap(), 15);
    }

    #[test]
    fn malformed_or_absurd_minutes_are_errors() {
        let err = parse_minutes("JWT_TTL_MINUTES", Some("soon".into()), 60).unwrap_err();
        assert!(err.to_string().contains("JWT_TTL_MINUTES"));
        for raw in ["0", "-5", "9223372036854775807"] {
            assert!(
                parse_minutes("JWT_TTL_MINUTES", Some(raw.into()), 60).is_err(),
                "{raw} should be rejected"
            );
        }
    }
}
