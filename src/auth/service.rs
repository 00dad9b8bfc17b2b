use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::auth::error::AuthError;
use crate::auth::federated::{resolve_or_create, ExternalProfile};
use crate::auth::jwt::JwtKeys;
use crate::auth::password::CredentialHasher;
use crate::auth::reset::{generate_token, ResetToken};
use crate::state::AppState;
use crate::users::{NewUser, Role, User};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Run the KDF off the async executor. A single Argon2 pass takes tens of
/// milliseconds and would otherwise stall every request on this worker.
async fn hash_blocking(hasher: &CredentialHasher, plain: &str) -> Result<String, AuthError> {
    let hasher = hasher.clone();
    let plain = plain.to_string();
    tokio::task::spawn_blocking(move || hasher.hash(&plain))
        .await
        .map_err(|e| AuthError::Internal(e.into()))?
        .map_err(AuthError::Hashing)
}

async fn verify_blocking(
    hasher: &CredentialHasher,
    plain: &str,
    stored: Option<&str>,
) -> Result<bool, AuthError> {
    let hasher = hasher.clone();
    let plain = plain.to_string();
    let stored = stored.map(str::to_string);
    tokio::task::spawn_blocking(move || hasher.verify(&plain, stored.as_deref()))
        .await
        .map_err(|e| AuthError::Internal(e.into()))
}

fn sign_session(state: &AppState, user: &User) -> Result<String, AuthError> {
    JwtKeys::from_ref(state).sign(user).map_err(AuthError::Internal)
}

/// Create a local account and log it in. The requested role is honored except
/// for the first account ever created, which the store promotes to admin
/// atomically inside the insert.
pub async fn register(
    state: &AppState,
    email: &str,
    password: &str,
    first_name: &str,
    last_name: &str,
    role: Role,
) -> Result<(String, User), AuthError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        warn!("register with invalid email shape");
        return Err(AuthError::Validation("Invalid email"));
    }
    if password.len() < 8 {
        return Err(AuthError::Validation("Password too short"));
    }

    let hash = hash_blocking(&state.hasher, password).await?;

    // No prior existence check: the store's conditional insert is the only
    // arbiter of uniqueness.
    let user = state
        .users
        .create(NewUser {
            email,
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            role,
            password_hash: Some(hash),
        })
        .await?;

    let token = sign_session(state, &user)?;
    info!(user_id = %user.id, role = ?user.role, "user registered");
    Ok((token, user))
}

/// Verify a password and issue a session token. Unknown email and wrong
/// password are indistinguishable in both response and cost: when no account
/// matches, verification still runs against a dummy hash.
pub async fn login(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<(String, User), AuthError> {
    let email = normalize_email(email);
    let user = state.users.find_by_email(&email).await?;

    let stored = user.as_ref().and_then(|u| u.password_hash.as_deref());
    let ok = verify_blocking(&state.hasher, password, stored).await?;

    match user {
        Some(user) if ok => {
            let token = sign_session(state, &user)?;
            info!(user_id = %user.id, "user logged in");
            Ok((token, user))
        }
        _ => {
            warn!("login rejected");
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Store a short-lived reset token and hand the link to the mail sender.
/// Returns Ok regardless of whether the email matches an account, so the
/// endpoint never enumerates valid emails.
pub async fn forgot_password(state: &AppState, email: &str) -> Result<(), AuthError> {
    let email = normalize_email(email);
    let Some(user) = state.users.find_by_email(&email).await? else {
        info!("password reset requested for unknown email");
        return Ok(());
    };

    let token = generate_token();
    let expires_at =
        OffsetDateTime::now_utc() + Duration::minutes(state.config.reset.ttl_minutes);
    state.reset_tokens.put(ResetToken {
        token: token.clone(),
        user_id: user.id,
        expires_at,
    });

    let link = format!(
        "{}/reset-password?token={}",
        state.config.reset.public_base_url, token
    );
    state
        .mailer
        .send_reset_link(&user.email, &link)
        .await
        .map_err(AuthError::Internal)?;
    info!(user_id = %user.id, "reset token issued");
    Ok(())
}

/// Consume a reset token and set a new password. The token is removed on
/// success and on discovery of expiry, so it can never be replayed.
pub async fn reset_password(
    state: &AppState,
    token: &str,
    new_password: &str,
) -> Result<(), AuthError> {
    if new_password.len() < 8 {
        return Err(AuthError::Validation("Password too short"));
    }

    let Some(record) = state.reset_tokens.get(token) else {
        return Err(AuthError::InvalidOrExpiredToken);
    };
    if record.is_expired(OffsetDateTime::now_utc()) {
        state.reset_tokens.remove(token);
        return Err(AuthError::InvalidOrExpiredToken);
    }

    let user = state
        .users
        .find_by_id(record.user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    let hash = hash_blocking(&state.hasher, new_password).await?;
    state
        .users
        .set_password_hash(user.id, &hash)
        .await
        .map_err(AuthError::Internal)?;

    state.reset_tokens.remove(token);
    // Opportunistic sweep while we are here.
    state.reset_tokens.delete_expired(OffsetDateTime::now_utc());
    info!(user_id = %user.id, "password reset completed");
    Ok(())
}

/// Google sign-in: the profile arrives already verified upstream.
pub async fn google_login(
    state: &AppState,
    email: &str,
    name: &str,
) -> Result<(String, User), AuthError> {
    let profile = ExternalProfile {
        email: email.to_string(),
        display_name: name.to_string(),
    };
    let (user, created) = resolve_or_create(state.users.as_ref(), &profile).await?;
    let token = sign_session(state, &user)?;
    info!(user_id = %user.id, created, "google login");
    Ok((token, user))
}

/// Facebook sign-in: exchange the access token with the Graph API first.
pub async fn facebook_login(
    state: &AppState,
    access_token: &str,
) -> Result<(String, User), AuthError> {
    let profile = state
        .provider
        .fetch_profile(access_token)
        .await
        .map_err(AuthError::Provider)?;
    let (user, created) = resolve_or_create(state.users.as_ref(), &profile).await?;
    let token = sign_session(state, &user)?;
    info!(user_id = %user.id, created, "facebook login");
    Ok((token, user))
}

/// Startup check for the bootstrap invariant: the first registration promotes
/// itself to admin, so an empty system is fine, but a populated system with
/// no admin means roles were edited out-of-band and deserves a loud log line.
pub async fn warn_if_no_admin(state: &AppState) {
    match state.users.admin_exists().await {
        Ok(true) => {}
        Ok(false) => warn!("no admin account exists; the next registered user will be promoted only if the user table is empty"),
        Err(e) => warn!(error = %e, "could not check for an admin account"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn register_ok(
        state: &AppState,
        email: &str,
        password: &str,
        role: Role,
    ) -> (String, User) {
        register(state, email, password, "Test", "User", role)
            .await
            .expect("registration should succeed")
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let state = AppState::fake();
        let err = register(&state, "not-an-email", "longenough", "A", "B", Role::Customer)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation("Invalid email")));

        let err = register(&state, "a@x.com", "short", "A", "B", Role::Customer)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation("Password too short")));
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let state = AppState::fake();
        register_ok(&state, "a@x.com", "password-1", Role::Customer).await;
        let err = register(&state, " A@X.COM ", "password-2", "A", "B", Role::Customer)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailAlreadyExists));
    }

    #[tokio::test]
    async fn login_failures_are_uniform() {
        let state = AppState::fake();
        register_ok(&state, "a@x.com", "password-1", Role::Customer).await;

        let unknown = login(&state, "nobody@x.com", "password-1").await.unwrap_err();
        let wrong = login(&state, "a@x.com", "wrong-password").await.unwrap_err();
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn session_token_reflects_role_at_issuance() {
        let state = AppState::fake();
        let (token, user) = register_ok(&state, "a@x.com", "password-1", Role::Customer).await;
        let claims = JwtKeys::from_ref(&state).verify(&token).expect("verify");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::Admin); // first user bootstraps as admin
        assert_eq!(claims.email, "a@x.com");
    }

    #[tokio::test]
    async fn forgot_password_is_silent_for_unknown_email() {
        let state = AppState::fake();
        forgot_password(&state, "nobody@x.com")
            .await
            .expect("generic success even for unknown email");
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() {
        let state = AppState::fake();
        let (_, user) = register_ok(&state, "a@x.com", "password-1", Role::Customer).await;
        state.reset_tokens.put(ResetToken {
            token: "stale".into(),
            user_id: user.id,
            expires_at: OffsetDateTime::now_utc() - Duration::minutes(1),
        });
        let err = reset_password(&state, "stale", "fresh-password").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));
        // rejection also consumed the stale record
        assert!(state.reset_tokens.get("stale").is_none());
    }

    #[tokio::test]
    async fn reset_fails_when_owning_user_vanished() {
        let state = AppState::fake();
        register_ok(&state, "a@x.com", "password-1", Role::Customer).await;
        state.reset_tokens.put(ResetToken {
            token: "orphan".into(),
            user_id: uuid::Uuid::new_v4(),
            expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
        });
        let err = reset_password(&state, "orphan", "fresh-password").await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn facebook_login_goes_through_provider_exchange() {
        struct StubProvider;
        #[async_trait::async_trait]
        impl crate::auth::federated::ProviderClient for StubProvider {
            async fn fetch_profile(
                &self,
                access_token: &str,
            ) -> anyhow::Result<ExternalProfile> {
                assert_eq!(access_token, "fb-token");
                Ok(ExternalProfile {
                    email: "fb@x.com".into(),
                    display_name: "Fb User".into(),
                })
            }
        }

        let state = AppState::fake_with_provider(Arc::new(StubProvider));
        let (token, user) = facebook_login(&state, "fb-token").await.expect("login");
        assert_eq!(user.email, "fb@x.com");
        assert!(user.password_hash.is_none());
        assert!(!token.is_empty());

        // second login resolves to the same account
        let (_, again) = facebook_login(&state, "fb-token").await.expect("login");
        assert_eq!(again.id, user.id);
    }

    /// Mailer that records the last reset link instead of sending it, so the
    /// lifecycle test can follow the exact token the flow issued.
    #[derive(Default)]
    struct CapturingMailer {
        last_link: std::sync::Mutex<Option<String>>,
    }

    #[async_trait::async_trait]
    impl crate::auth::email::MailSender for CapturingMailer {
        async fn send_reset_link(&self, _to: &str, link: &str) -> anyhow::Result<()> {
            *self.last_link.lock().unwrap() = Some(link.to_string());
            Ok(())
        }
    }

    /// End-to-end walk of the identity flows: bootstrap admin, second user
    /// keeps the requested role, failed login, reset round-trip, single-use
    /// token, login with the new password.
    #[tokio::test]
    async fn full_identity_lifecycle() {
        let mailer = Arc::new(CapturingMailer::default());
        let state = AppState::fake_with_mailer(mailer.clone());

        let (_, first) = register_ok(&state, "a@x.com", "password-a", Role::Customer).await;
        assert_eq!(first.role, Role::Admin);

        let (_, second) = register_ok(&state, "b@x.com", "password-b", Role::Customer).await;
        assert_eq!(second.role, Role::Customer);

        let err = login(&state, "b@x.com", "wrong-password").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        forgot_password(&state, "b@x.com").await.expect("reset requested");
        let link = mailer
            .last_link
            .lock()
            .unwrap()
            .clone()
            .expect("reset link was handed to the mailer");
        let reset_token = link
            .split("token=")
            .nth(1)
            .expect("link carries the token")
            .to_string();
        assert!(state.reset_tokens.get(&reset_token).is_some());

        reset_password(&state, &reset_token, "password-b2")
            .await
            .expect("reset should succeed");

        // replay of the same token must fail
        let err = reset_password(&state, &reset_token, "password-b3")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));

        // old password is gone, new one works
        let err = login(&state, "b@x.com", "password-b").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        let (token, user) = login(&state, "b@x.com", "password-b2").await.expect("login");
        assert_eq!(user.id, second.id);
        assert!(!token.is_empty());
    }
}
