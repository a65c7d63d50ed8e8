//! Bearer credentials for the WCS/IWMS services.
//!
//! Tokens are issued out of band (the dashboard login) and handed to the kiosk
//! through the session file. The kiosk only ever refreshes them.

use serde::{Deserialize, Serialize};

pub mod refresh;
pub mod session;

pub use refresh::{RefreshOutcome, TokenManager, TokenSnapshot};
pub use session::{clear_session, default_session_path, read_session, save_session, StoredSession};

/// Token pair response
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_type: default_token_type(),
            expires_in: None,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }
}

// Tokens must never end up in logs.
impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Body of the refresh call.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}
