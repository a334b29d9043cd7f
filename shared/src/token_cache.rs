//! Short-lived OAuth access tokens, keyed by provider.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Seconds shaved off a token's lifetime so it is never used at the edge of expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Access-token cache shared by the data-source adapters.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: RwLock<HashMap<String, CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a still-valid token for `provider`.
    pub async fn get(&self, provider: &str) -> Option<String> {
        let tokens = self.tokens.read().await;
        tokens
            .get(provider)
            .filter(|t| t.expires_at > Utc::now())
            .map(|t| t.access_token.clone())
    }

    /// Store a token that the issuer said is valid for `expires_in_secs`.
    pub async fn insert(&self, provider: &str, access_token: String, expires_in_secs: i64) {
        let now = Utc::now();
        let lifetime = expires_in_secs.saturating_sub(EXPIRY_MARGIN_SECS).max(0);
        // An unrepresentable lifetime stores an already-expired token.
        let expires_at = Duration::try_seconds(lifetime)
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        let cached = CachedToken { access_token, expires_at };
        let mut tokens = self.tokens.write().await;
        tokens.insert(provider.to_string(), cached);
    }

    /// Drop the token for `provider`, e.g. after the API rejected it.
    pub async fn invalidate(&self, provider: &str) {
        let mut tokens = self.tokens.write().await;
        tokens.remove(provider);
    }
}
