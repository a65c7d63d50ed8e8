//! Single-flight access token refresh.
//!
//! Every request records the token generation it was sent with. When a 401
//! comes back, the request calls [`TokenManager::refresh_after`] with that
//! generation. Only the first caller for a given generation performs the
//! refresh. Callers queued behind it observe the bumped generation and replay
//! with the new token, or fail fast if the refresh token was rejected.
//! Transport and server errors are returned as-is and do not poison the
//! generation.

use std::future::Future;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::TokenPair;
use crate::errors::ServiceError;

/// Token as seen by one outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub access_token: Option<String>,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This caller ran the refresh; the new pair should be persisted.
    Refreshed(TokenPair),
    /// Another caller already replaced the token; just replay.
    AlreadyRefreshed,
}

#[derive(Debug, Default)]
struct TokenState {
    tokens: Option<TokenPair>,
    generation: u64,
    failed_generation: Option<u64>,
}

#[derive(Debug, Default)]
pub struct TokenManager {
    state: RwLock<TokenState>,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(tokens: Option<TokenPair>) -> Self {
        Self {
            state: RwLock::new(TokenState {
                tokens,
                generation: 0,
                failed_generation: None,
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn snapshot(&self) -> TokenSnapshot {
        let state = self.state.read().await;
        TokenSnapshot {
            access_token: state.tokens.as_ref().map(|t| t.access_token.clone()),
            generation: state.generation,
        }
    }

    pub async fn tokens(&self) -> Option<TokenPair> {
        self.state.read().await.tokens.clone()
    }

    /// Installs a new pair, e.g. after the operator re-authenticated.
    pub async fn replace(&self, tokens: TokenPair) {
        let mut state = self.state.write().await;
        state.tokens = Some(tokens);
        state.generation += 1;
        state.failed_generation = None;
    }

    /// Refreshes the token unless the generation already moved past `observed`.
    ///
    /// `refresh` receives the current refresh token and performs the remote call.
    pub async fn refresh_after<F, Fut>(
        &self,
        observed: u64,
        refresh: F,
    ) -> Result<RefreshOutcome, ServiceError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<TokenPair, ServiceError>>,
    {
        let _guard = self.refresh_lock.lock().await;

        let refresh_token = {
            let state = self.state.read().await;
            if state.generation != observed {
                debug!(
                    observed,
                    current = state.generation,
                    "token already refreshed by a concurrent request"
                );
                return Ok(RefreshOutcome::AlreadyRefreshed);
            }
            if state.failed_generation == Some(observed) {
                return Err(ServiceError::Unauthorized(
                    "session expired, token refresh failed".to_string(),
                ));
            }
            state
                .tokens
                .as_ref()
                .filter(|t| t.has_refresh_token())
                .map(|t| t.refresh_token.clone())
        };

        let Some(refresh_token) = refresh_token else {
            self.mark_failed(observed).await;
            return Err(ServiceError::Unauthorized(
                "no refresh token available".to_string(),
            ));
        };

        match refresh(refresh_token.clone()).await {
            Ok(mut pair) => {
                if !pair.has_refresh_token() {
                    pair.refresh_token = refresh_token;
                }
                let mut state = self.state.write().await;
                state.tokens = Some(pair.clone());
                state.generation += 1;
                state.failed_generation = None;
                metrics::counter!("auth.token.refreshed", 1);
                info!(generation = state.generation, "access token refreshed");
                Ok(RefreshOutcome::Refreshed(pair))
            }
            Err(err @ (ServiceError::Unauthorized(_) | ServiceError::NotFound(_))) => {
                warn!(error = %err, "refresh token rejected");
                self.mark_failed(observed).await;
                Err(ServiceError::Unauthorized(
                    "session expired, token refresh failed".to_string(),
                ))
            }
            // transport and server errors leave the generation retryable
            Err(err) => {
                warn!(error = %err, "access token refresh failed");
                Err(err)
            }
        }
    }

    async fn mark_failed(&self, generation: u64) {
        let mut state = self.state.write().await;
        if state.generation == generation {
            state.failed_generation = Some(generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let manager = Arc::new(TokenManager::new(Some(TokenPair::new("old", "r1"))));
        let calls = Arc::new(AtomicUsize::new(0));
        let observed = manager.snapshot().await.generation;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .refresh_after(observed, |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(TokenPair::new("new", "r2"))
                    })
                    .await
            }));
        }

        let mut refreshed = 0;
        for handle in handles {
            if let RefreshOutcome::Refreshed(_) = handle.await.unwrap().unwrap() {
                refreshed += 1;
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(refreshed, 1);
        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.access_token.as_deref(), Some("new"));
        assert_eq!(snapshot.generation, observed + 1);
    }

    #[tokio::test]
    async fn refresh_keeps_previous_refresh_token_when_omitted() {
        let manager = TokenManager::new(Some(TokenPair::new("old", "r1")));

        manager
            .refresh_after(0, |token| async move {
                assert_eq!(token, "r1");
                Ok(TokenPair::new("new", ""))
            })
            .await
            .unwrap();

        let tokens = manager.tokens().await.unwrap();
        assert_eq!(tokens.access_token, "new");
        assert_eq!(tokens.refresh_token, "r1");
    }

    #[tokio::test]
    async fn failed_refresh_fails_fast_for_waiters() {
        let manager = TokenManager::new(Some(TokenPair::new("old", "r1")));

        let first = manager
            .refresh_after(0, |_| async {
                Err(ServiceError::Unauthorized("refresh token revoked".into()))
            })
            .await;
        assert!(first.unwrap_err().is_unauthorized());

        let second = manager
            .refresh_after(0, |_| async {
                Err(ServiceError::Other(anyhow::anyhow!(
                    "refresh must not run twice for a failed generation"
                )))
            })
            .await;
        assert!(second.unwrap_err().is_unauthorized());
    }

    #[tokio::test]
    async fn server_error_leaves_generation_retryable() {
        let manager = TokenManager::new(Some(TokenPair::new("old", "r1")));

        let first = manager
            .refresh_after(0, |_| async {
                Err(ServiceError::Api {
                    status: http::StatusCode::SERVICE_UNAVAILABLE,
                    message: "Service Unavailable".into(),
                })
            })
            .await;
        assert_eq!(
            first.unwrap_err().status_code(),
            Some(http::StatusCode::SERVICE_UNAVAILABLE)
        );
        assert_eq!(manager.snapshot().await.generation, 0);

        let second = manager
            .refresh_after(0, |_| async { Ok(TokenPair::new("new", "r2")) })
            .await
            .unwrap();
        assert!(matches!(second, RefreshOutcome::Refreshed(_)));
        assert_eq!(manager.snapshot().await.access_token.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn missing_refresh_token_is_unauthorized() {
        let manager = TokenManager::new(None);
        let result = manager
            .refresh_after(0, |_| async { Ok(TokenPair::new("never", "")) })
            .await;
        assert!(result.unwrap_err().is_unauthorized());
    }

    #[tokio::test]
    async fn replace_clears_failure_and_bumps_generation() {
        let manager = TokenManager::new(None);
        let failed = manager
            .refresh_after(0, |_| async { Ok(TokenPair::new("x", "y")) })
            .await;
        assert!(failed.unwrap_err().is_unauthorized());

        manager.replace(TokenPair::new("fresh", "r")).await;
        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.access_token.as_deref(), Some("fresh"));

        let calls = AtomicUsize::new(0);
        let outcome = manager
            .refresh_after(1, |token| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    assert_eq!(token, "r");
                    Ok(TokenPair::new("renewed", "r2"))
                }
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcome,
            RefreshOutcome::Refreshed(TokenPair::new("renewed", "r2"))
        );
        assert_eq!(manager.snapshot().await.generation, 2);
    }
}
