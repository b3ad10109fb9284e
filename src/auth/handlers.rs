use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
        errors::AuthError,
        google::{success_redirect, IdentityProvider},
        jwt::AuthUser,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/google", get(google_start))
        .route("/google/callback", get(google_callback))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let authenticated = state.engine.register(payload).await?;
    Ok((StatusCode::CREATED, Json(authenticated.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let authenticated = state.engine.login(payload).await?;
    Ok(Json(authenticated.into()))
}

fn google_not_configured() -> Response {
    (StatusCode::NOT_FOUND, "Google login is not configured").into_response()
}

#[instrument(skip(state))]
pub async fn google_start(State(state): State<AppState>) -> Response {
    let Some(provider) = state.provider.as_ref() else {
        return google_not_configured();
    };
    match provider.authorize_url() {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(e) => AuthError::Internal(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[instrument(skip(state, query))]
pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let (Some(provider), Some(google)) = (state.provider.as_ref(), state.config.google.as_ref())
    else {
        return google_not_configured();
    };

    let landing = match complete_provider_login(&state, provider.as_ref(), query).await {
        Ok(payload) => success_redirect(&google.success_redirect, &payload),
        Err(e) => Err(e),
    };
    match landing {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(e) => {
            warn!(error = %e, "google login failed");
            Redirect::to(google.failure_redirect.as_str()).into_response()
        }
    }
}

async fn complete_provider_login(
    state: &AppState,
    provider: &dyn IdentityProvider,
    query: CallbackQuery,
) -> anyhow::Result<AuthResponse> {
    if let Some(err) = query.error {
        anyhow::bail!("provider returned error: {err}");
    }
    let code = query.code.context("missing code")?;
    let oauth_state = query.state.context("missing state")?;

    let profile = provider.exchange(&code, &oauth_state).await?;
    let authenticated = state.engine.federated_login(profile).await?;
    Ok(authenticated.into())
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state.engine.current_user(user_id).await.map_err(|e| {
        error!(error = %e, user_id = %user_id, "user not found");
        e
    })?;
    Ok(Json(user.into()))
}
