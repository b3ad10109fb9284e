use anyhow::Context;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_TTL_MINUTES: i64 = 60 * 24 * 30;
/// One year.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// What the provider bridge does when a provider login hits an email that
/// already belongs to a password account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailCollisionPolicy {
    /// Sign into the existing account without a password check.
    Adopt,
    /// Refuse the provider login for password accounts.
    Reject,
}

impl std::str::FromStr for EmailCollisionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adopt" => Ok(Self::Adopt),
            "reject" => Ok(Self::Reject),
            other => anyhow::bail!("unknown email collision policy: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub success_redirect: Url,
    pub failure_redirect: Url,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub email_collision: EmailCollisionPolicy,
    pub google: Option<GoogleConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "loginauth".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "loginauth-users".into()),
            ttl_minutes: match std::env::var("JWT_TTL_MINUTES") {
                Ok(v) => parse_ttl_minutes(&v).context("JWT_TTL_MINUTES")?,
                Err(_) => DEFAULT_TTL_MINUTES,
            },
        };
        let email_collision = match std::env::var("FEDERATED_EMAIL_COLLISION") {
            Ok(v) => v.parse()?,
            Err(_) => EmailCollisionPolicy::Adopt,
        };
        let google = GoogleConfig::from_env()?;
        Ok(Self {
            database_url,
            jwt,
            email_collision,
            google,
        })
    }
}

fn parse_ttl_minutes(raw: &str) -> anyhow::Result<i64> {
    let minutes: i64 = raw.trim().parse()?;
    anyhow::ensure!(
        (1..=MAX_TTL_MINUTES).contains(&minutes),
        "must be between 1 and {MAX_TTL_MINUTES} minutes, got {minutes}"
    );
    Ok(minutes)
}

impl GoogleConfig {
    /// Google login is enabled only when `GOOGLE_CLIENT_ID` is present.
    fn from_env() -> anyhow::Result<Option<Self>> {
        let Ok(client_id) = std::env::var("GOOGLE_CLIENT_ID") else {
            return Ok(None);
        };
        let client_secret =
            std::env::var("GOOGLE_CLIENT_SECRET").context("GOOGLE_CLIENT_SECRET not set")?;
        let callback_url = std::env::var("GOOGLE_CALLBACK_URL")
            .unwrap_or_else(|_| "http://localhost:5000/api/auth/google/callback".into());
        let success_redirect = std::env::var("OAUTH_SUCCESS_REDIRECT")
            .context("OAUTH_SUCCESS_REDIRECT not set")?
            .parse::<Url>()
            .context("OAUTH_SUCCESS_REDIRECT is not a valid url")?;
        let failure_redirect = std::env::var("OAUTH_FAILURE_REDIRECT")
            .context("OAUTH_FAILURE_REDIRECT not set")?
            .parse::<Url>()
            .context("OAUTH_FAILURE_REDIRECT is not a valid url")?;
        Ok(Some(Self {
            client_id,
            client_secret,
            callback_url,
            success_redirect,
            failure_redirect,
        }))
    }
}
