use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::auth::error::AuthError;
use crate::users::{NewUser, Role, User, UserStore};

/// Profile asserted by an external identity provider. Authenticity is the
/// provider's problem; by the time this struct exists the caller has either
/// verified the token (Google) or exchanged it (Facebook).
#[derive(Debug, Clone)]
pub struct ExternalProfile {
    pub email: String,
    pub display_name: String,
}

/// Exchange an opaque provider access token for a profile.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn fetch_profile(&self, access_token: &str) -> anyhow::Result<ExternalProfile>;
}

/// Facebook Graph API client. `base_url` is configurable so tests can point
/// it at a stub server.
pub struct FacebookGraphClient {
    http: reqwest::Client,
    base_url: String,
}

impl FacebookGraphClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProviderClient for FacebookGraphClient {
    async fn fetch_profile(&self, access_token: &str) -> anyhow::Result<ExternalProfile> {
        #[derive(Deserialize)]
        struct GraphProfile {
            #[serde(default)]
            email: String,
            #[serde(default)]
            name: String,
        }

        let profile: GraphProfile = self
            .http
            .get(format!("{}/me", self.base_url))
            .query(&[("fields", "email,name"), ("access_token", access_token)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("facebook profile exchange succeeded");
        Ok(ExternalProfile {
            email: profile.email,
            display_name: profile.name,
        })
    }
}

/// Best-effort split of an external display name into first/last. Absence of
/// a name never blocks account creation.
pub fn split_display_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

/// Find the local account for an externally-verified profile, creating one
/// without a credential hash if none exists. Returns the user and whether the
/// account was just created. The returned user is never mutated when it
/// already exists; no password is required or checked.
pub async fn resolve_or_create(
    store: &dyn UserStore,
    profile: &ExternalProfile,
) -> Result<(User, bool), AuthError> {
    let email = profile.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::InvalidExternalIdentity);
    }

    if let Some(existing) = store.find_by_email(&email).await? {
        return Ok((existing, false));
    }

    let (first_name, last_name) = split_display_name(&profile.display_name);
    let created = store
        .create(NewUser {
            email: email.clone(),
            first_name,
            last_name,
            role: Role::Customer,
            password_hash: None,
        })
        .await;
    match created {
        Ok(user) => {
            info!(user_id = %user.id, "federated account created");
            Ok((user, true))
        }
        // Lost a race against a concurrent resolution of the same email; the
        // winner's record is the account.
        Err(crate::users::StoreError::EmailExists) => {
            let user = store
                .find_by_email(&email)
                .await?
                .ok_or(AuthError::UserNotFound)?;
            Ok((user, false))
        }
        Err(crate::users::StoreError::Other(e)) => Err(AuthError::Internal(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::MemoryUserStore;

    fn profile(email: &str, name: &str) -> ExternalProfile {
        ExternalProfile {
            email: email.into(),
            display_name: name.into(),
        }
    }

    #[test]
    fn display_names_split_on_whitespace() {
        assert_eq!(split_display_name("Ada Lovelace"), ("Ada".into(), "Lovelace".into()));
        assert_eq!(
            split_display_name("Juan Carlos de la Cruz"),
            ("Juan".into(), "Carlos de la Cruz".into())
        );
        assert_eq!(split_display_name("Prince"), ("Prince".into(), String::new()));
        assert_eq!(split_display_name(""), (String::new(), String::new()));
    }

    #[tokio::test]
    async fn missing_email_is_rejected_not_fabricated() {
        let store = MemoryUserStore::new();
        let err = resolve_or_create(&store, &profile("", "Some Name"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidExternalIdentity));
        let err = resolve_or_create(&store, &profile("   ", "Some Name"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidExternalIdentity));
    }

    #[tokio::test]
    async fn creates_passwordless_account_then_reuses_it() {
        let store = MemoryUserStore::new();
        let (user, created) = resolve_or_create(&store, &profile("G@X.com", "Grace Hopper"))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(user.email, "g@x.com");
        assert_eq!(user.first_name, "Grace");
        assert_eq!(user.last_name, "Hopper");
        assert!(user.password_hash.is_none());
        // first account in an empty system bootstraps as admin
        assert_eq!(user.role, Role::Admin);

        let (again, created) = resolve_or_create(&store, &profile("g@x.com", "Grace Hopper"))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn nameless_profile_still_creates_account() {
        let store = MemoryUserStore::new();
        let (user, created) = resolve_or_create(&store, &profile("a@x.com", ""))
            .await
            .unwrap();
        assert!(created);
        assert!(user.first_name.is_empty());
        assert!(user.last_name.is_empty());
    }
}
