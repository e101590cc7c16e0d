pub(crate) use crate::auth::dto::{Claims, JwtKeys};
use crate::auth::dto::RegisterRequest;
use crate::auth::repo_types::{AuthProvider, User};
use crate::config::JwtConfig;
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Registration input rules. Stricter than profile update on purpose.
pub(crate) fn validate_registration(payload: &RegisterRequest) -> Result<(), ApiError> {
    if payload.full_name.trim().is_empty()
        || payload.email.trim().is_empty()
        || payload.password.is_empty()
    {
        return Err(ApiError::Validation(
            "Full name, email, and password are required".into(),
        ));
    }
    let name_len = payload.full_name.trim().chars().count();
    if name_len < 2 {
        return Err(ApiError::Validation(
            "Full name must be at least 2 characters".into(),
        ));
    }
    if name_len > 50 {
        return Err(ApiError::Validation(
            "Full name must be less than 50 characters".into(),
        ));
    }
    if !is_valid_email(payload.email.trim()) {
        return Err(ApiError::Validation(
            "Please enter a valid email address".into(),
        ));
    }
    if payload.password.len() < 6 {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters".into(),
        ));
    }
    if let Some(confirm) = &payload.confirm_password {
        if confirm != &payload.password {
            return Err(ApiError::Validation("Passwords do not match".into()));
        }
    }
    Ok(())
}

/// What a verified social identity means for the record already on file.
#[derive(Debug)]
pub(crate) enum LinkDecision {
    /// No account for this email: provision one under the social provider.
    CreateAccount,
    /// Same provider as last time: plain sign-in.
    SignIn(User),
    /// Local account with a matching email: one-way provider upgrade.
    UpgradeFromLocal(User),
    /// The email belongs to the other social provider: refuse, naming it.
    Conflict(AuthProvider),
}

pub(crate) fn resolve_social_link(existing: Option<User>, provider: AuthProvider) -> LinkDecision {
    match existing {
        None => LinkDecision::CreateAccount,
        Some(user) if user.auth_provider == provider => LinkDecision::SignIn(user),
        Some(user) if user.auth_provider == AuthProvider::Local => {
            LinkDecision::UpgradeFromLocal(user)
        }
        Some(user) => LinkDecision::Conflict(user.auth_provider),
    }
}

/// Post-lookup gate for password login: provider mismatch first, then the
/// deactivation check.
pub(crate) fn authorize_local_login(user: &User) -> Result<(), ApiError> {
    if user.auth_provider != AuthProvider::Local {
        return Err(ApiError::Validation(format!(
            "This account uses {p} login. Please sign in with {p}.",
            p = user.auth_provider
        )));
    }
    ensure_active(user)
}

/// Deactivated accounts exist but cannot authenticate by any method.
pub(crate) fn ensure_active(user: &User) -> Result<(), ApiError> {
    if !user.is_active {
        warn!(user_id = %user.id, "login attempt on deactivated account");
        return Err(ApiError::Forbidden("Account has been deactivated".into()));
    }
    Ok(())
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_days,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::from_secs((ttl_days as u64) * 24 * 60 * 60),
        }
    }
}

impl JwtKeys {
    pub fn sign(&self, user_id: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
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
}

/// Extracts and validates the bearer token, yielding the caller's user id.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))?;

        match keys.verify(token) {
            Ok(claims) => Ok(AuthUser(claims.sub)),
            Err(_) => {
                warn!("invalid or expired token");
                Err(ApiError::Unauthorized("Invalid or expired token".into()))
            }
        }
    }
}


#[cfg(test)]
mod validation_tests {
    use super::*;

    fn request() -> RegisterRequest {
        RegisterRequest {
            full_name: "A B".into(),
            email: "a@b.com".into(),
            phone: "".into(),
            password: "secret1".into(),
            confirm_password: None,
        }
    }

    #[test]
    fn accepts_valid_payload() {
        assert!(validate_registration(&request()).is_ok());
    }

    #[test]
    fn rejects_missing_required_fields() {
        let mut req = request();
        req.email = "".into();
        let err = validate_registration(&req).unwrap_err();
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn rejects_short_and_long_names() {
        let mut req = request();
        req.full_name = "A".into();
        assert!(validate_registration(&req).is_err());
        req.full_name = "x".repeat(51);
        assert!(validate_registration(&req).is_err());
    }

    #[test]
    fn rejects_short_password() {
        let mut req = request();
        req.password = "12345".into();
        let err = validate_registration(&req).unwrap_err();
        assert!(err.to_string().contains("at least 6"));
    }

    #[test]
    fn rejects_mismatched_confirmation() {
        let mut req = request();
        req.confirm_password = Some("different".into());
        let err = validate_registration(&req).unwrap_err();
        assert!(err.to_string().contains("do not match"));
    }

    #[test]
    fn confirmation_is_optional() {
        let mut req = request();
        req.confirm_password = None;
        assert!(validate_registration(&req).is_ok());
    }
}

#[cfg(test)]
fn user_with_provider(provider: AuthProvider) -> User {
    use crate::auth::repo_types::UserRole;
    use time::macros::datetime;

    User {
        id: Uuid::new_v4(),
        full_name: "A B".into(),
        email: "a@b.com".into(),
        phone: "".into(),
        password_hash: (provider == AuthProvider::Local).then(|| "hash".to_string()),
        avatar: "".into(),
        auth_provider: provider,
        provider_id: "".into(),
        role: UserRole::User,
        address: "".into(),
        is_active: true,
        created_at: datetime!(2025-01-01 00:00 UTC),
        updated_at: datetime!(2025-01-01 00:00 UTC),
    }
}


#[cfg(test)]
mod account_gate_tests {
    use super::*;

    #[test]
    fn active_local_account_may_log_in() {
        let user = user_with_provider(AuthProvider::Local);
        assert!(authorize_local_login(&user).is_ok());
    }

    #[test]
    fn password_login_on_social_account_names_the_provider() {
        let user = user_with_provider(AuthProvider::Google);
        match authorize_local_login(&user) {
            Err(ApiError::Validation(msg)) => assert!(msg.contains("google")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn deactivated_account_is_forbidden_on_password_login() {
        let mut user = user_with_provider(AuthProvider::Local);
        user.is_active = false;
        assert!(matches!(
            authorize_local_login(&user),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn deactivated_account_is_forbidden_on_social_login() {
        let mut user = user_with_provider(AuthProvider::Facebook);
        user.is_active = false;
        assert!(matches!(ensure_active(&user), Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn provider_mismatch_is_reported_before_deactivation() {
        let mut user = user_with_provider(AuthProvider::Google);
        user.is_active = false;
        assert!(matches!(
            authorize_local_login(&user),
            Err(ApiError::Validation(_))
        ));
    }
}
