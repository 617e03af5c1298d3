//! Runtime configuration for the gateway client and the payment flow.

use crate::error::{PaymentError, Result};
use reqwest::Url;
use std::fmt;
use std::time::Duration;

/// Provider sandbox checkout API.
pub const SANDBOX_BASE_URL: &str = "https://tokenized.sandbox.bka.sh/v1.2.0-beta/tokenized/checkout/";

/// What the token manager does when a refresh attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshFallback {
    /// Any refresh failure, rejected or transport-level, falls back to one
    /// full regeneration.
    #[default]
    Always,
    /// Only a provider rejection falls back; transport failures propagate.
    ProviderRejectionOnly,
}

/// Merchant credentials issued by the provider.
#[derive(Clone)]
pub struct Credentials {
    pub app_key: String,
    pub app_secret: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Checkout API root; always ends in `/`.
    pub base_url: Url,
    pub credentials: Credentials,
    pub currency: String,
    pub mode: String,
    pub payer_reference: String,
    pub agreement_id: String,
    pub intent: String,
    /// Subtracted from the provider-reported token lifetime.
    pub token_expiry_margin: Duration,
    /// How long the cached token (and its refresh token) is kept at all.
    pub token_cache_ttl: Duration,
    pub refresh_fallback: RefreshFallback,
}

impl GatewayConfig {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            credentials,
            currency: "BDT".to_string(),
            mode: "0011".to_string(),
            payer_reference: "1".to_string(),
            agreement_id: "1".to_string(),
            intent: "sale".to_string(),
            token_expiry_margin: Duration::from_secs(60),
            token_cache_ttl: Duration::from_secs(86_400),
            refresh_fallback: RefreshFallback::default(),
        })
    }

    /// Resolves an endpoint path such as `token/grant` under the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| PaymentError::ValidationError(format!("invalid endpoint {path}: {e}")))
    }
}

/// Capacity of the store holding the provider token slot. It holds one key.
pub const TOKEN_STORE_CAPACITY: u64 = 16;

#[derive(Debug, Clone)]
pub struct HoldingConfig {
    pub submission_ttl: Duration,
    /// Upper bound on held submissions. Past it the store evicts entries
    /// before their ttl, and a confirmation for an evicted one fails with
    /// `SubmissionNotFoundError`.
    pub max_entries: u64,
}

impl Default for HoldingConfig {
    fn default() -> Self {
        Self {
            submission_ttl: Duration::from_secs(3_600),
            max_entries: 100_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Form that held submissions materialize into when none is named.
    pub default_form_id: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { default_form_id: 2 }
    }
}

fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| PaymentError::ValidationError(format!("invalid base URL {raw}: {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
