use jsonwebtoken::{DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{AuthProvider, User, UserRole};

/// JWT payload. Carries only the user id; role and email are looked up
/// fresh on each protected request.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub exp: usize,  // expiration time
    pub iat: usize,  // issued at
    pub iss: String, // issuer
    pub aud: String, // audience
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub password: String,
    pub confirm_password: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for Google/Facebook login.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLoginRequest {
    #[serde(default)]
    pub access_token: String,
}

/// Request body for partial profile update.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Payload returned after register, login or social login.
#[derive(Debug, Serialize)]
pub struct AuthData {
    pub user: PublicUser,
    pub token: String,
}

/// Payload for profile endpoints.
#[derive(Debug, Serialize)]
pub struct ProfileData {
    pub user: PublicUser,
}

/// Public part of the user returned to the client. Never carries the
/// password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub avatar: String,
    pub auth_provider: AuthProvider,
    pub role: UserRole,
    pub address: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            phone: user.phone,
            avatar: user.avatar,
            auth_provider: user.auth_provider,
            role: user.role,
            address: user.address,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            full_name: "A B".into(),
            email: "a@b.com".into(),
            phone: "".into(),
            password_hash: Some("$argon2id$v=19$secret".into()),
            avatar: "".into(),
            auth_provider: AuthProvider::Local,
            provider_id: "".into(),
            role: UserRole::User,
            address: "".into(),
            is_active: true,
            created_at: datetime!(2025-01-01 00:00 UTC),
            updated_at: datetime!(2025-01-01 00:00 UTC),
        }
    }

    #[test]
    fn public_user_never_serializes_password() {
        let json = serde_json::to_string(&PublicUser::from(sample_user())).unwrap();
        assert!(!json.to_lowercase().contains("password"));
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"fullName\":\"A B\""));
        assert!(json.contains("\"authProvider\":\"local\""));
    }

    #[test]
    fn envelope_skips_absent_fields() {
        let response = ApiResponse::ok(serde_json::json!({"n": 1}));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(!json.contains("message"));

        let response = ApiResponse::with_message("Login successful", serde_json::json!({}));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"message\":\"Login successful\""));
    }

    #[test]
    fn register_request_accepts_camel_case() {
        let body = r#"{"fullName":"A B","email":"a@b.com","password":"secret1","confirmPassword":"secret1"}"#;
        let req: RegisterRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.full_name, "A B");
        assert_eq!(req.confirm_password.as_deref(), Some("secret1"));
        assert_eq!(req.phone, "");
    }
}
