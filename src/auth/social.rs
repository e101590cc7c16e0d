use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::auth::repo_types::AuthProvider;
use crate::error::ApiError;

const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const FACEBOOK_ME_URL: &str = "https://graph.facebook.com/me";

/// Outbound-call timeout for provider userinfo endpoints.
const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SocialAuthError {
    /// Network failure, non-2xx status or malformed payload. Fails closed:
    /// the token is treated as invalid.
    #[error("Failed to verify {0} token")]
    VerificationFailed(AuthProvider),

    /// Facebook profiles without the email permission cannot be linked.
    #[error("Email permission is required. Please allow email access.")]
    MissingEmail,

    #[error("Invalid auth provider")]
    UnsupportedProvider,
}

impl From<SocialAuthError> for ApiError {
    fn from(err: SocialAuthError) -> Self {
        match err {
            SocialAuthError::VerificationFailed(_) => ApiError::Unauthorized(err.to_string()),
            SocialAuthError::MissingEmail => ApiError::Validation(err.to_string()),
            SocialAuthError::UnsupportedProvider => ApiError::Validation(err.to_string()),
        }
    }
}

/// Identity attested by a provider's userinfo endpoint.
#[derive(Debug, Clone)]
pub struct SocialProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: String,
}

/// Verifies provider access tokens. Held behind `AppState` so tests can
/// substitute a fake instead of calling out to the network.
#[async_trait]
pub trait SocialVerifier: Send + Sync {
    async fn verify(
        &self,
        provider: AuthProvider,
        access_token: &str,
    ) -> Result<SocialProfile, SocialAuthError>;
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FacebookPictureData {
    url: String,
}

#[derive(Debug, Deserialize)]
struct FacebookPicture {
    data: FacebookPictureData,
}

#[derive(Debug, Deserialize)]
struct FacebookUserInfo {
    id: String,
    name: Option<String>,
    email: Option<String>,
    picture: Option<FacebookPicture>,
}

impl From<GoogleUserInfo> for SocialProfile {
    fn from(info: GoogleUserInfo) -> Self {
        Self {
            id: info.id,
            email: info.email.unwrap_or_default(),
            name: info.name.unwrap_or_default(),
            picture: info.picture.unwrap_or_default(),
        }
    }
}

impl From<FacebookUserInfo> for SocialProfile {
    fn from(info: FacebookUserInfo) -> Self {
        Self {
            id: info.id,
            email: info.email.unwrap_or_default(),
            name: info.name.unwrap_or_default(),
            picture: info.picture.map(|p| p.data.url).unwrap_or_default(),
        }
    }
}

/// Production verifier calling the Google/Facebook userinfo endpoints.
pub struct HttpSocialVerifier {
    http: reqwest::Client,
}

impl HttpSocialVerifier {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    async fn verify_google(&self, access_token: &str) -> Result<SocialProfile, SocialAuthError> {
        let failed = |e: reqwest::Error| {
            warn!(error = %e, "google userinfo request failed");
            SocialAuthError::VerificationFailed(AuthProvider::Google)
        };

        let response = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(failed)?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "google rejected access token");
            return Err(SocialAuthError::VerificationFailed(AuthProvider::Google));
        }

        let info: GoogleUserInfo = response.json().await.map_err(failed)?;
        let profile = SocialProfile::from(info);
        if profile.email.is_empty() {
            return Err(SocialAuthError::VerificationFailed(AuthProvider::Google));
        }
        Ok(profile)
    }

    async fn verify_facebook(&self, access_token: &str) -> Result<SocialProfile, SocialAuthError> {
        let failed = |e: reqwest::Error| {
            warn!(error = %e, "facebook graph request failed");
            SocialAuthError::VerificationFailed(AuthProvider::Facebook)
        };

        let response = self
            .http
            .get(FACEBOOK_ME_URL)
            .query(&[
                ("fields", "id,name,email,picture.type(large)"),
                ("access_token", access_token),
            ])
            .send()
            .await
            .map_err(failed)?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "facebook rejected access token");
            return Err(SocialAuthError::VerificationFailed(AuthProvider::Facebook));
        }

        let info: FacebookUserInfo = response.json().await.map_err(failed)?;
        // Facebook only returns the email when the user granted the
        // permission; without it the account cannot be resolved.
        if info.email.as_deref().unwrap_or("").is_empty() {
            return Err(SocialAuthError::MissingEmail);
        }
        Ok(SocialProfile::from(info))
    }
}

#[async_trait]
impl SocialVerifier for HttpSocialVerifier {
    async fn verify(
        &self,
        provider: AuthProvider,
        access_token: &str,
    ) -> Result<SocialProfile, SocialAuthError> {
        match provider {
            AuthProvider::Google => self.verify_google(access_token).await,
            AuthProvider::Facebook => self.verify_facebook(access_token).await,
            AuthProvider::Local => Err(SocialAuthError::UnsupportedProvider),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn google_payload_maps_to_profile() {
        let body = r#"{
            "id": "108000000000000000001",
            "email": "a@b.com",
            "name": "A B",
            "picture": "https://lh3.googleusercontent.com/a/photo"
        }"#;
        let info: GoogleUserInfo = serde_json::from_str(body).unwrap();
        let profile = SocialProfile::from(info);
        assert_eq!(profile.id, "108000000000000000001");
        assert_eq!(profile.email, "a@b.com");
        assert_eq!(profile.picture, "https://lh3.googleusercontent.com/a/photo");
    }

    #[test]
    fn facebook_payload_unwraps_nested_picture() {
        let body = r#"{
            "id": "1020304050",
            "name": "A B",
            "email": "a@b.com",
            "picture": { "data": { "url": "https://graph.facebook.com/photo.jpg" } }
        }"#;
        let info: FacebookUserInfo = serde_json::from_str(body).unwrap();
        let profile = SocialProfile::from(info);
        assert_eq!(profile.picture, "https://graph.facebook.com/photo.jpg");
    }

    #[test]
    fn facebook_payload_without_email_parses() {
        let body = r#"{ "id": "1020304050", "name": "A B" }"#;
        let info: FacebookUserInfo = serde_json::from_str(body).unwrap();
        assert!(info.email.is_none());
    }

    #[test]
    fn error_mapping_matches_taxonomy() {
        let err: ApiError = SocialAuthError::VerificationFailed(AuthProvider::Google).into();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);

        let err: ApiError = SocialAuthError::MissingEmail.into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err: ApiError = SocialAuthError::UnsupportedProvider.into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn verification_failed_names_the_provider() {
        let msg = SocialAuthError::VerificationFailed(AuthProvider::Facebook).to_string();
        assert!(msg.contains("facebook"));
    }
}
