use crate::error::PaymentError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A provider bearer token together with the refresh token that can renew it.
///
/// `expires_at` already has the safety margin subtracted, so a token that is
/// valid by this clock is never presented after its real expiry.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BearerToken {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl BearerToken {
    /// Builds a token from a grant issued at `issued_at`, expiring `margin`
    /// before the lifetime the provider reported.
    ///
    /// The margin never takes more than half of the lifetime, so the token is
    /// valid at `issued_at`. A zero or unrepresentable lifetime is rejected.
    pub fn from_grant(
        grant: TokenGrant,
        issued_at: DateTime<Utc>,
        margin: Duration,
    ) -> Result<Self, PaymentError> {
        let lifetime = i64::try_from(grant.expires_in)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                PaymentError::TokenAcquisitionError(format!(
                    "token lifetime of {} seconds is out of range",
                    grant.expires_in
                ))
            })?;
        if lifetime <= Duration::zero() {
            return Err(PaymentError::TokenAcquisitionError(
                "provider issued an already expired token".to_string(),
            ));
        }

        let margin = margin.clamp(Duration::zero(), lifetime / 2);
        let expires_at = issued_at
            .checked_add_signed(lifetime - margin)
            .ok_or_else(|| {
                PaymentError::TokenAcquisitionError(format!(
                    "token lifetime of {} seconds is out of range",
                    grant.expires_in
                ))
            })?;
        Ok(Self {
            id_token: grant.id_token,
            refresh_token: grant.refresh_token,
            expires_at,
        })
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("id_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Successful payload of the grant and refresh endpoints.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub id_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds as reported by the provider.
    #[serde(deserialize_with = "seconds_from_number_or_string")]
    pub expires_in: u64,
}

fn seconds_from_number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(secs) => Ok(secs),
        Seconds::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}
