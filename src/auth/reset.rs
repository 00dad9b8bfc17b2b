use std::collections::HashMap;
use std::sync::Mutex;

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

/// A pending password-reset grant. Lives only until it is consumed or swept.
#[derive(Debug, Clone)]
pub struct ResetToken {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: OffsetDateTime,
}

impl ResetToken {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Generate a URL-safe reset token: 32 random bytes, base64url without
/// padding. Collisions are not a practical concern at this entropy.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Keyed store for reset tokens. Single-use is the orchestrator's discipline:
/// `get` never deletes, `remove` is called after a successful reset, and the
/// sweep clears whatever expired in between.
pub trait ResetTokenStore: Send + Sync {
    /// Insert a token record, silently overwriting an identical token value.
    fn put(&self, token: ResetToken);
    fn get(&self, token: &str) -> Option<ResetToken>;
    fn remove(&self, token: &str);
    /// Drop every record whose expiry has passed; returns how many were
    /// removed. Safe to call concurrently and repeatedly.
    fn delete_expired(&self, now: OffsetDateTime) -> usize;
}

/// Mutex-guarded in-memory implementation. Fine for a single instance; a
/// multi-instance deployment needs a shared store with TTL support behind the
/// same trait.
#[derive(Default)]
pub struct MemoryResetTokenStore {
    tokens: Mutex<HashMap<String, ResetToken>>,
}

impl MemoryResetTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResetTokenStore for MemoryResetTokenStore {
    fn put(&self, token: ResetToken) {
        let mut tokens = self.tokens.lock().unwrap();
        tokens.insert(token.token.clone(), token);
    }

    fn get(&self, token: &str) -> Option<ResetToken> {
        let tokens = self.tokens.lock().unwrap();
        tokens.get(token).cloned()
    }

    fn remove(&self, token: &str) {
        let mut tokens = self.tokens.lock().unwrap();
        tokens.remove(token);
    }

    fn delete_expired(&self, now: OffsetDateTime) -> usize {
        let mut tokens = self.tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired(now));
        let removed = before - tokens.len();
        if removed > 0 {
            debug!(removed, "swept expired reset tokens");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn token_record(value: &str, ttl: Duration) -> ResetToken {
        ResetToken {
            token: value.into(),
            user_id: Uuid::new_v4(),
            expires_at: OffsetDateTime::now_utc() + ttl,
        }
    }

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43); // 32 bytes, base64url, no padding
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn put_get_remove_lifecycle() {
        let store = MemoryResetTokenStore::new();
        let record = token_record("t1", Duration::hours(1));
        store.put(record.clone());
        let fetched = store.get("t1").expect("stored token");
        assert_eq!(fetched.user_id, record.user_id);
        // get does not consume
        assert!(store.get("t1").is_some());
        store.remove("t1");
        assert!(store.get("t1").is_none());
    }

    #[test]
    fn put_overwrites_same_token_value() {
        let store = MemoryResetTokenStore::new();
        store.put(token_record("t1", Duration::hours(1)));
        let replacement = token_record("t1", Duration::hours(2));
        store.put(replacement.clone());
        let fetched = store.get("t1").unwrap();
        assert_eq!(fetched.user_id, replacement.user_id);
    }

    #[test]
    fn delete_expired_keeps_live_tokens() {
        let store = MemoryResetTokenStore::new();
        store.put(token_record("dead", Duration::hours(-1)));
        store.put(token_record("live", Duration::hours(1)));
        let removed = store.delete_expired(OffsetDateTime::now_utc());
        assert_eq!(removed, 1);
        assert!(store.get("dead").is_none());
        assert!(store.get("live").is_some());
        // repeat sweep is a no-op
        assert_eq!(store.delete_expired(OffsetDateTime::now_utc()), 0);
    }
}
