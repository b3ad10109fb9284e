//! Authentication decisions: login, registration and the provider bridge.
//!
//! The engine owns no mutable state. Everything it talks to (store, hasher,
//! token issuer) is injected, so concurrent requests only meet inside the
//! store, whose unique indexes settle registration races.

use std::sync::{Arc, OnceLock};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::{
    dto::{AuthResponse, LoginRequest, ProviderProfile, RegisterRequest},
    errors::AuthError,
    jwt::TokenIssuer,
    password::{CredentialHasher, FEDERATED_PASSWORD_SENTINEL},
    repo::UserStore,
    repo_types::{AuthMode, NewUser, User},
};
use crate::config::EmailCollisionPolicy;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Hashed once per engine and verified against on unknown-user logins, so
/// both rejection paths pay for one hash verification.
const DUMMY_PASSWORD: &str = "loginauth-unknown-user";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed value, or `None` when absent or blank.
fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

/// The single field a login looks the account up by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoginIdentifier {
    Email(String),
    Username(String),
}

/// An email-shaped username is treated as the email (replacing any email
/// field); email is preferred over username.
pub(crate) fn resolve_identifier(
    username: Option<&str>,
    email: Option<&str>,
) -> Result<LoginIdentifier, AuthError> {
    let username = non_empty(username);
    let email = non_empty(email);
    let (username, email) = match username {
        Some(u) if is_valid_email(u) => (None, Some(u)),
        _ => (username, email),
    };

    if let Some(email) = email {
        Ok(LoginIdentifier::Email(email.to_lowercase()))
    } else if let Some(username) = username {
        Ok(LoginIdentifier::Username(username.to_string()))
    } else {
        Err(AuthError::MissingIdentifier)
    }
}

#[derive(Debug)]
pub struct Authenticated {
    pub user: User,
    pub token: String,
}

impl From<Authenticated> for AuthResponse {
    fn from(a: Authenticated) -> Self {
        Self {
            id: a.user.id,
            username: a.user.username,
            email: a.user.email,
            token: a.token,
        }
    }
}

pub struct AuthEngine {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
    tokens: Arc<dyn TokenIssuer>,
    email_collision: EmailCollisionPolicy,
    dummy_hash: OnceLock<Option<String>>,
}

impl AuthEngine {
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn CredentialHasher>,
        tokens: Arc<dyn TokenIssuer>,
        email_collision: EmailCollisionPolicy,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            email_collision,
            dummy_hash: OnceLock::new(),
        }
    }

    #[instrument(skip_all)]
    pub async fn login(&self, req: LoginRequest) -> Result<Authenticated, AuthError> {
        let identifier = resolve_identifier(req.username.as_deref(), req.email.as_deref())?;

        let found = match &identifier {
            LoginIdentifier::Email(email) => self.store.find_by_email(email).await,
            LoginIdentifier::Username(username) => self.store.find_by_username(username).await,
        }
        .map_err(AuthError::StoreUnavailable)?;

        let Some(user) = found else {
            self.burn_verification(&req.password);
            warn!(identifier = ?identifier, "login unknown user");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.password_matches(&user, &req.password) {
            warn!(user_id = %user.id, "login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.tokens.issue(user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok(Authenticated { user, token })
    }

    /// Federated and credential-less records never pass, and never reach the
    /// hasher. A stored hash the hasher cannot read counts as a mismatch.
    fn password_matches(&self, user: &User, password: &str) -> bool {
        match user.auth_mode() {
            AuthMode::Local { password_hash } => {
                match self.hasher.verify(password, password_hash) {
                    Ok(matched) => matched,
                    Err(e) => {
                        error!(user_id = %user.id, error = %e, "stored password hash unreadable");
                        false
                    }
                }
            }
            AuthMode::Federated { .. } | AuthMode::Unusable => false,
        }
    }

    /// Same verification cost as a wrong password; the outcome is discarded.
    fn burn_verification(&self, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_init(|| match self.hasher.hash(DUMMY_PASSWORD) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    error!(error = %e, "dummy hash failed");
                    None
                }
            });
        if let Some(hash) = dummy {
            let _ = self.hasher.verify(password, hash);
        }
    }

    #[instrument(skip_all)]
    pub async fn register(&self, req: RegisterRequest) -> Result<Authenticated, AuthError> {
        let username = non_empty(req.username.as_deref()).map(str::to_string);
        let email = non_empty(req.email.as_deref()).map(str::to_lowercase);
        let (Some(username), Some(email)) = (username, email) else {
            return Err(AuthError::InvalidUserData(
                "username and email are required".into(),
            ));
        };

        if let Some(existing) = self
            .store
            .find_by_username_or_email(&username, &email)
            .await
            .map_err(AuthError::StoreUnavailable)?
        {
            warn!(user_id = %existing.id, "user already exists");
            return Err(AuthError::DuplicateUser);
        }

        if req.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidUserData(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let password_hash = self.hasher.hash(&req.password)?;

        let user = self
            .store
            .create(NewUser {
                username,
                email,
                password_hash: Some(password_hash),
                federated_id: None,
            })
            .await
            .map_err(|e| {
                warn!(error = %e, "create user failed");
                AuthError::from(e)
            })?;

        let token = self.tokens.issue(user.id)?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(Authenticated { user, token })
    }

    /// Find-or-create for a profile already verified by the provider.
    #[instrument(skip_all, fields(subject_id = %profile.subject_id))]
    pub async fn federated_login(
        &self,
        profile: ProviderProfile,
    ) -> Result<Authenticated, AuthError> {
        let email = profile.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AuthError::InvalidUserData(
                "provider profile has no email".into(),
            ));
        }

        let existing = self
            .store
            .find_by_email(&email)
            .await
            .map_err(AuthError::StoreUnavailable)?;

        let user = match existing {
            Some(user) => self.admit_existing(user)?,
            None => {
                let user = self
                    .store
                    .create(NewUser {
                        username: profile.display_name.trim().to_string(),
                        email,
                        password_hash: Some(FEDERATED_PASSWORD_SENTINEL.to_string()),
                        federated_id: Some(profile.subject_id),
                    })
                    .await
                    .map_err(|e| {
                        warn!(error = %e, "create federated user failed");
                        AuthError::from(e)
                    })?;
                info!(user_id = %user.id, "federated user created");
                user
            }
        };

        let token = self.tokens.issue(user.id)?;
        info!(user_id = %user.id, "federated login");
        Ok(Authenticated { user, token })
    }

    fn admit_existing(&self, user: User) -> Result<User, AuthError> {
        if let AuthMode::Federated { subject_id } = user.auth_mode() {
            debug!(user_id = %user.id, subject_id, "existing federated user");
            return Ok(user);
        }
        match self.email_collision {
            EmailCollisionPolicy::Adopt => {
                warn!(user_id = %user.id, "provider login admitted into a password account without a password check");
                Ok(user)
            }
            EmailCollisionPolicy::Reject => {
                warn!(user_id = %user.id, "provider login refused for a password account");
                Err(AuthError::FederatedEmailConflict)
            }
        }
    }

    pub async fn current_user(&self, id: Uuid) -> Result<User, AuthError> {
        self.store
            .find_by_id(id)
            .await
            .map_err(AuthError::StoreUnavailable)?
            .ok_or(AuthError::InvalidCredentials)
    }
}
