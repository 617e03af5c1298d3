use crate::config::RefreshFallback;
use crate::domain::ports::{KeyValueStoreRef, TokenIssuerRef};
use crate::domain::provider::ProviderOutcome;
use crate::domain::token::BearerToken;
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Cache key of the single process-wide token slot.
pub const TOKEN_CACHE_KEY: &str = "bkash_token";

/// Keeps a valid provider bearer token available.
///
/// The token lives in the shared key-value store as one serialized
/// [`BearerToken`], so every instance sees the same slot and a rotation replaces
/// it wholesale. Rotations inside one process are single-flight: callers that
/// find the token stale queue on `rotation` and re-read the slot once they hold
/// it.
pub struct TokenLifecycleManager {
    issuer: TokenIssuerRef,
    store: KeyValueStoreRef,
    rotation: Mutex<()>,
    expiry_margin: chrono::Duration,
    cache_ttl: Duration,
    fallback: RefreshFallback,
}

impl TokenLifecycleManager {
    pub fn new(
        issuer: TokenIssuerRef,
        store: KeyValueStoreRef,
        expiry_margin: Duration,
        cache_ttl: Duration,
        fallback: RefreshFallback,
    ) -> Self {
        Self {
            issuer,
            store,
            rotation: Mutex::new(()),
            expiry_margin: chrono::Duration::from_std(expiry_margin)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            cache_ttl,
            fallback,
        }
    }

    /// Returns a token that is valid at return time, refreshing or
    /// regenerating it when the cached one is stale.
    pub async fn get_valid_token(&self) -> Result<BearerToken> {
        if let Some(token) = self.cached().await?
            && token.is_valid_at(Utc::now())
        {
            tracing::debug!("token cache hit");
            return Ok(token);
        }

        let _rotation = self.rotation.lock().await;

        // Another caller may have rotated the token while this one waited.
        let cached = self.cached().await?;
        if let Some(token) = &cached
            && token.is_valid_at(Utc::now())
        {
            return Ok(token.clone());
        }

        if let Some(stale) = cached {
            match self.refresh(&stale.refresh_token).await {
                Ok(Some(token)) => return Ok(token),
                Ok(None) => {
                    tracing::warn!("token refresh rejected, regenerating");
                }
                Err(err) if self.fallback == RefreshFallback::Always => {
                    tracing::warn!(error = %err, "token refresh failed, regenerating");
                }
                Err(err) => return Err(err),
            }
        }

        self.regenerate().await
    }

    /// The token currently in the slot, valid or not.
    pub async fn cached(&self) -> Result<Option<BearerToken>> {
        let Some(value) = self.store.get(TOKEN_CACHE_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(token) => Ok(Some(token)),
            Err(err) => {
                tracing::warn!(error = %err, "discarding unreadable cached token");
                Ok(None)
            }
        }
    }

    /// Attempts a refresh. `Ok(None)` means the provider rejected it.
    async fn refresh(&self, refresh_token: &str) -> Result<Option<BearerToken>> {
        let issued_at = Utc::now();
        match self.issuer.refresh(refresh_token).await? {
            ProviderOutcome::Success(grant) => {
                let token = BearerToken::from_grant(grant, issued_at, self.expiry_margin)?;
                self.save(&token).await?;
                tracing::info!(expires_at = %token.expires_at, "token refreshed");
                Ok(Some(token))
            }
            ProviderOutcome::Rejected(rejection) => {
                tracing::debug!(status_code = %rejection.status_code, "refresh rejected");
                Ok(None)
            }
        }
    }

    async fn regenerate(&self) -> Result<BearerToken> {
        let issued_at = Utc::now();
        match self.issuer.grant().await? {
            ProviderOutcome::Success(grant) => {
                let token = BearerToken::from_grant(grant, issued_at, self.expiry_margin)?;
                self.save(&token).await?;
                tracing::info!(expires_at = %token.expires_at, "token granted");
                Ok(token)
            }
            ProviderOutcome::Rejected(rejection) => Err(PaymentError::TokenAcquisitionError(
                format!("{} ({})", rejection.status_message, rejection.status_code),
            )),
        }
    }

    async fn save(&self, token: &BearerToken) -> Result<()> {
        self.store
            .put(TOKEN_CACHE_KEY, serde_json::to_value(token)?, self.cache_ttl)
            .await
    }
}
