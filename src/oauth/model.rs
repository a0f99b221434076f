use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Tokens are considered stale this long before ServiceNow would reject them.
pub const EXPIRY_SKEW: Duration = Duration::from_secs(30);

#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn bearer() -> String {
    "Bearer".to_string()
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct StoredToken {
    pub token: OAuthToken,
    pub received_at: Instant,
}

impl StoredToken {
    pub fn new(token: OAuthToken) -> Self {
        StoredToken {
            token,
            received_at: Instant::now(),
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        let lifetime = Duration::from_secs(self.token.expires_in);
        lifetime.saturating_sub(now.saturating_duration_since(self.received_at))
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.remaining(now) <= EXPIRY_SKEW
    }
}

/// Authorization states waiting for their callback. Entries older than `ttl` are pruned and never claimed.
pub struct PendingStates {
    ttl: Duration,
    inner: Mutex<HashMap<String, Instant>>,
}

impl PendingStates {
    pub fn new(ttl: Duration) -> Self {
        PendingStates {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, state: String) {
        let now = Instant::now();
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.retain(|_, created_at| now.saturating_duration_since(*created_at) <= self.ttl);
        guard.insert(state, now);
    }

    /// `true` exactly once per live state.
    pub fn claim(&self, state: &str) -> bool {
        let now = Instant::now();
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.retain(|_, created_at| now.saturating_duration_since(*created_at) <= self.ttl);
        guard.remove(state).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl AuthStatus {
    pub fn unauthenticated() -> Self {
        AuthStatus {
            authenticated: false,
            token_type: None,
            expires_in: None,
        }
    }

    pub fn from_stored(stored: &StoredToken, now: Instant) -> Self {
        AuthStatus {
            authenticated: !stored.is_expired(now) || stored.token.refresh_token.is_some(),
            token_type: Some(stored.token.token_type.clone()),
            expires_in: Some(stored.remaining(now).as_secs()),
        }
    }
}
