use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::{Role, User};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: Role,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Google sign-in: the caller's middleware has already verified the Google
/// token and hands over the asserted profile.
#[derive(Debug, Deserialize)]
pub struct GoogleLoginRequest {
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// Facebook sign-in: the access token still has to be exchanged with the
/// Graph API for a profile.
#[derive(Debug, Deserialize)]
pub struct FacebookLoginRequest {
    pub access_token: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
        }
    }
}

/// Uniform envelope for every identity endpoint.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicUser>,
    pub message: String,
}

impl AuthResponse {
    pub fn authenticated(token: String, user: &User, message: impl Into<String>) -> Self {
        Self {
            success: true,
            token: Some(token),
            user: Some(PublicUser::from(user)),
            message: message.into(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            token: None,
            user: None,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            token: None,
            user: None,
            message: message.into(),
        }
    }
}

/// Claims echoed back by `GET /auth/userinfo`.
#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    pub user_id: Uuid,
    pub email: String,
    pub roles: Vec<Role>,
}
