use axum::{
    routing::{get, post},
    extract::State,
    Json, Router,
};
use tracing::instrument;

use crate::auth::dto::{
    AuthResponse, FacebookLoginRequest, ForgotPasswordRequest, GoogleLoginRequest, LoginRequest,
    RegisterRequest, ResetPasswordRequest, UserInfoResponse,
};
use crate::auth::error::AuthError;
use crate::auth::jwt::AuthUser;
use crate::auth::service;
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/google-login", post(google_login))
        .route("/auth/facebook-login", post(facebook_login))
        .route("/auth/userinfo", get(userinfo))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let (token, user) = service::register(
        &state,
        &payload.email,
        &payload.password,
        &payload.first_name,
        &payload.last_name,
        payload.role,
    )
    .await?;
    Ok(Json(AuthResponse::authenticated(token, &user, "Registered")))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let (token, user) = service::login(&state, &payload.email, &payload.password).await?;
    Ok(Json(AuthResponse::authenticated(token, &user, "Logged in")))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    service::forgot_password(&state, &payload.email).await?;
    // Same body whether or not the email matched an account.
    Ok(Json(AuthResponse::ok(
        "If that email is registered, a reset link has been sent",
    )))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    service::reset_password(&state, &payload.token, &payload.new_password).await?;
    Ok(Json(AuthResponse::ok("Password updated")))
}

#[instrument(skip(state, payload))]
pub async fn google_login(
    State(state): State<AppState>,
    Json(payload): Json<GoogleLoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let (token, user) = service::google_login(&state, &payload.email, &payload.name).await?;
    Ok(Json(AuthResponse::authenticated(token, &user, "Logged in")))
}

#[instrument(skip(state, payload))]
pub async fn facebook_login(
    State(state): State<AppState>,
    Json(payload): Json<FacebookLoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let (token, user) = service::facebook_login(&state, &payload.access_token).await?;
    Ok(Json(AuthResponse::authenticated(token, &user, "Logged in")))
}

/// Echo the claims of an already-verified bearer token. Verification of
/// incoming tokens for the rest of the marketplace API is middleware outside
/// this crate; this endpoint exists so clients can introspect their session.
#[instrument(skip_all)]
pub async fn userinfo(AuthUser(claims): AuthUser) -> Json<UserInfoResponse> {
    Json(UserInfoResponse {
        user_id: claims.sub,
        email: claims.email,
        roles: vec![claims.role],
    })
}
