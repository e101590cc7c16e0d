use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ApiResponse, AuthData, LoginRequest, ProfileData, RegisterRequest,
            SocialLoginRequest, UpdateProfileRequest,
        },
        password::{hash_password, verify_password},
        repo_types::{AuthProvider, User},
        services::{
            authorize_local_login, ensure_active, resolve_social_link, validate_registration,
            AuthUser, JwtKeys, LinkDecision,
        },
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/google", post(google_auth))
        .route("/auth/facebook", post(facebook_auth))
        .route("/auth/profile", get(get_profile).put(update_profile))
}

fn provider_title(provider: AuthProvider) -> &'static str {
    match provider {
        AuthProvider::Local => "Local",
        AuthProvider::Google => "Google",
        AuthProvider::Facebook => "Facebook",
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthData>>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    payload.full_name = payload.full_name.trim().to_string();

    validate_registration(&payload)?;

    // Pre-check for a friendly message; the unique index still decides races.
    if let Some(existing) = User::find_by_email(&state.db, &payload.email)
        .await
        .map_err(ApiError::internal)?
    {
        warn!(email = %payload.email, "email already registered");
        let message = if existing.auth_provider != AuthProvider::Local {
            format!(
                "This email is already registered with {p}. Please use {p} to sign in.",
                p = existing.auth_provider
            )
        } else {
            "Email already registered".to_string()
        };
        return Err(ApiError::Conflict(message));
    }

    let hash = hash_password(&payload.password).map_err(ApiError::internal)?;

    let user = User::create_local(
        &state.db,
        &payload.full_name,
        &payload.email,
        &payload.phone,
        &hash,
    )
    .await?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id).map_err(ApiError::internal)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "Registration successful",
            AuthData {
                user: user.into(),
                token,
            },
        )),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthData>>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation(
            "Email and password are required".into(),
        ));
    }

    // Unknown email and wrong password share one message so the endpoint
    // cannot be used to enumerate accounts.
    let user = User::find_by_email(&state.db, &payload.email)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| {
            warn!(email = %payload.email, "login unknown email");
            ApiError::Unauthorized("Invalid email or password".into())
        })?;

    authorize_local_login(&user)?;

    let hash = user
        .password_hash
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".into()))?;

    let ok = verify_password(&payload.password, hash).map_err(ApiError::internal)?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized("Invalid email or password".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id).map_err(ApiError::internal)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(ApiResponse::with_message(
        "Login successful",
        AuthData {
            user: user.into(),
            token,
        },
    )))
}

#[instrument(skip(state, payload))]
pub async fn google_auth(
    State(state): State<AppState>,
    Json(payload): Json<SocialLoginRequest>,
) -> Result<Json<ApiResponse<AuthData>>, ApiError> {
    social_login(&state, AuthProvider::Google, payload).await
}

#[instrument(skip(state, payload))]
pub async fn facebook_auth(
    State(state): State<AppState>,
    Json(payload): Json<SocialLoginRequest>,
) -> Result<Json<ApiResponse<AuthData>>, ApiError> {
    social_login(&state, AuthProvider::Facebook, payload).await
}

async fn social_login(
    state: &AppState,
    provider: AuthProvider,
    payload: SocialLoginRequest,
) -> Result<Json<ApiResponse<AuthData>>, ApiError> {
    if payload.access_token.is_empty() {
        return Err(ApiError::Validation(format!(
            "{} access token is required",
            provider_title(provider)
        )));
    }

    let profile = state.social.verify(provider, &payload.access_token).await?;
    let email = profile.email.trim().to_lowercase();

    let existing = User::find_by_email(&state.db, &email)
        .await
        .map_err(ApiError::internal)?;

    let user = match resolve_social_link(existing, provider) {
        LinkDecision::Conflict(on_file) => {
            warn!(email = %email, provider = %provider, existing = %on_file, "provider conflict");
            return Err(ApiError::Conflict(format!(
                "This email is already registered with {p}. Please use {p} to sign in.",
                p = on_file
            )));
        }
        LinkDecision::SignIn(user) => user,
        LinkDecision::UpgradeFromLocal(user) => {
            info!(user_id = %user.id, provider = %provider, "upgrading local account to social provider");
            User::upgrade_to_social(&state.db, user.id, provider, &profile.id, &profile.picture)
                .await
                .map_err(ApiError::internal)?
        }
        LinkDecision::CreateAccount => {
            let user = User::create_social(
                &state.db,
                &profile.name,
                &email,
                &profile.picture,
                provider,
                &profile.id,
            )
            .await?;
            info!(user_id = %user.id, provider = %provider, "social user provisioned");
            user
        }
    };

    // Deactivation applies after identity resolution, upgrades included.
    ensure_active(&user)?;

    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id).map_err(ApiError::internal)?;

    info!(user_id = %user.id, provider = %provider, "social login");
    Ok(Json(ApiResponse::with_message(
        format!("{} login successful", provider_title(provider)),
        AuthData {
            user: user.into(),
            token,
        },
    )))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiResponse<ProfileData>>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(ApiResponse::ok(ProfileData { user: user.into() })))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<ProfileData>>, ApiError> {
    let user = User::update_profile(
        &state.db,
        user_id,
        payload.full_name.as_deref(),
        payload.phone.as_deref(),
        payload.address.as_deref(),
    )
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(ApiResponse::with_message(
        "Profile updated successfully",
        ProfileData { user: user.into() },
    )))
}
