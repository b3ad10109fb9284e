//! Google sign-in: consent redirect, code exchange and profile lookup.
//!
//! The CSRF `state` is a short-lived JWT signed with the service secret, so
//! the round trip needs no server-side session.

use anyhow::Context;
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::dto::{AuthResponse, ProviderProfile};
use super::jwt::JwtKeys;
use crate::config::GoogleConfig;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// External login whose profile the bridge trusts without a password.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent page URL carrying a fresh `state`.
    fn authorize_url(&self) -> anyhow::Result<Url>;

    /// Validates `state`, redeems `code` and returns the verified profile.
    async fn exchange(&self, code: &str, state: &str) -> anyhow::Result<ProviderProfile>;
}

/// Google user info from API.
#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    email: String,
    name: Option<String>,
    verified_email: Option<bool>,
}

impl GoogleUser {
    fn into_profile(self) -> anyhow::Result<ProviderProfile> {
        if self.verified_email == Some(false) {
            anyhow::bail!("google account email is not verified");
        }
        let display_name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.email.split('@').next().unwrap_or_default().to_string());
        Ok(ProviderProfile {
            display_name,
            email: self.email,
            subject_id: self.id,
        })
    }
}

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

pub struct GoogleOAuth {
    client: ConfiguredClient,
    http: reqwest::Client,
    keys: JwtKeys,
}

impl GoogleOAuth {
    pub fn new(cfg: &GoogleConfig, keys: JwtKeys) -> anyhow::Result<Self> {
        let client = BasicClient::new(ClientId::new(cfg.client_id.clone()))
            .set_client_secret(ClientSecret::new(cfg.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(AUTH_URL.to_string())?)
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string())?)
            .set_redirect_uri(
                RedirectUrl::new(cfg.callback_url.clone()).context("invalid GOOGLE_CALLBACK_URL")?,
            );
        // the token endpoint must not be followed into redirects
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build http client")?;
        Ok(Self { client, http, keys })
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuth {
    fn authorize_url(&self) -> anyhow::Result<Url> {
        let state = self.keys.sign_state()?;
        let (url, _) = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_scope(Scope::new("profile".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_extra_param("prompt", "select_account")
            .url();
        Ok(url)
    }

    async fn exchange(&self, code: &str, state: &str) -> anyhow::Result<ProviderProfile> {
        self.keys
            .verify_state(state)
            .context("invalid or expired oauth state")?;

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| anyhow::anyhow!("token exchange failed: {e}"))?;

        let google_user: GoogleUser = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .context("userinfo request")?
            .error_for_status()
            .context("userinfo status")?
            .json()
            .await
            .context("userinfo body")?;
        debug!(subject_id = %google_user.id, "google profile fetched");

        google_user.into_profile().map_err(|e| {
            warn!(error = %e, "google profile rejected");
            e
        })
    }
}

/// Appends `token` and the JSON `user` payload to the configured landing page.
pub fn success_redirect(base: &Url, payload: &AuthResponse) -> anyhow::Result<Url> {
    let user = serde_json::to_string(payload)?;
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("token", &payload.token)
        .append_pair("user", &user);
    Ok(url)
}
