use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::TokenPair;
use crate::errors::ServiceError;

const SESSION_HOME_ENV: &str = "PTL_KIOSK_HOME";

/// Tokens as persisted on disk between kiosk restarts.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub saved_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn tokens(&self) -> TokenPair {
        let mut pair = TokenPair::new(self.access_token.clone(), self.refresh_token.clone());
        if !self.token_type.is_empty() {
            pair.token_type = self.token_type.clone();
        }
        pair.expires_in = self.expires_in;
        pair
    }
}

impl From<&TokenPair> for StoredSession {
    fn from(tokens: &TokenPair) -> Self {
        Self {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            token_type: tokens.token_type.clone(),
            expires_in: tokens.expires_in,
            saved_at: Utc::now(),
        }
    }
}

/// `$PTL_KIOSK_HOME/session.json`, falling back to `~/.wms-ptl/session.json`.
pub fn default_session_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(SESSION_HOME_ENV) {
        let mut path = PathBuf::from(dir);
        path.push("session.json");
        return Some(path);
    }

    std::env::var("HOME").ok().map(|home| {
        let mut path = PathBuf::from(home);
        path.push(".wms-ptl");
        path.push("session.json");
        path
    })
}

pub fn save_session(path: &Path, tokens: &TokenPair) -> Result<(), ServiceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let payload = serde_json::to_vec_pretty(&StoredSession::from(tokens))?;
    fs::write(path, payload)?;
    debug!(path = %path.display(), "session saved");
    Ok(())
}

pub fn read_session(path: &Path) -> Result<Option<StoredSession>, ServiceError> {
    if !path.exists() {
        return Ok(None);
    }

    let data = fs::read_to_string(path)?;
    let session: StoredSession = serde_json::from_str(&data).map_err(|e| {
        ServiceError::SerializationError(format!(
            "failed to parse session file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(Some(session))
}

pub fn clear_session(path: &Path) -> Result<bool, ServiceError> {
    if path.exists() {
        fs::remove_file(path)?;
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn session_survives_a_save_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let mut tokens = TokenPair::new("access-1", "refresh-1");
        tokens.expires_in = Some(3600);
        save_session(&path, &tokens).unwrap();

        let stored = read_session(&path).unwrap().expect("session present");
        assert_eq!(stored.tokens(), tokens);
    }

    #[test]
    fn missing_session_reads_as_none() {
        let dir = TempDir::new().unwrap();
        assert!(read_session(&dir.path().join("absent.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn corrupt_session_is_a_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        let err = read_session(&path).err().unwrap();
        assert!(matches!(err, ServiceError::SerializationError(_)));
    }

    #[test]
    fn clear_reports_whether_a_file_was_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        save_session(&path, &TokenPair::new("a", "r")).unwrap();

        assert!(clear_session(&path).unwrap());
        assert!(!clear_session(&path).unwrap());
    }
}
