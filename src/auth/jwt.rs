use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    claims::{Claims, StateClaims},
    errors::AuthError,
};
use crate::{
    config::{JwtConfig, MAX_TTL_MINUTES},
    state::AppState,
};

const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Signs the bearer token handed back after a successful login.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: Uuid) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.jwt)
    }
}

/// Clamped to the range the config loader accepts.
fn ttl_from_minutes(minutes: i64) -> Duration {
    let minutes = minutes.clamp(1, MAX_TTL_MINUTES) as u64;
    Duration::from_secs(minutes.checked_mul(60).unwrap_or(u64::MAX))
}

/// `now + ttl`, failing instead of overflowing.
fn expiry(now: OffsetDateTime, ttl: Duration) -> anyhow::Result<OffsetDateTime> {
    let secs = i64::try_from(ttl.as_secs())?;
    now.checked_add(TimeDuration::seconds(secs))
        .ok_or_else(|| anyhow::anyhow!("token expiry out of range"))
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: ttl_from_minutes(cfg.ttl_minutes),
        }
    }

    pub fn sign(&self, user_id: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = expiry(now, self.ttl)?;
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }

    fn state_audience(&self) -> String {
        format!("{}#oauth-state", self.audience)
    }

    /// Self-contained CSRF token for the provider redirect round trip.
    pub fn sign_state(&self) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = expiry(now, STATE_TTL)?;
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let claims = StateClaims {
            nonce,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.state_audience(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_state(&self, state: &str) -> anyhow::Result<StateClaims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.state_audience()]);
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<StateClaims>(state, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

impl TokenIssuer for JwtKeys {
    fn issue(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign(user_id)
    }
}

/// Extracts and validates the bearer token, returning the user ID.
pub struct AuthUser(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let Some(auth_header) = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        else {
            debug!("missing authorization header");
            return Err(AuthError::InvalidCredentials);
        };

        let Some(token) = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
        else {
            debug!("authorization header is not a bearer token");
            return Err(AuthError::InvalidCredentials);
        };

        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            AuthError::InvalidCredentials
        })?;

        Ok(AuthUser(claims.sub))
    }
}
