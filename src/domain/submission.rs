use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Submitted form fields keyed by field name.
pub type FormData = BTreeMap<String, Value>;

/// Form data held back until its payment is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub payment_id: String,
    /// Form the data belongs to, when the submitter named one.
    pub form_id: Option<u64>,
    pub form_data: FormData,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    /// Set once the payment executed and the form response was written, but
    /// the payment record could not yet be marked completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement: Option<Settlement>,
}

/// Outcome of an executed payment whose form data is already materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub form_response_id: u64,
    pub trx_id: Option<String>,
}

impl PendingSubmission {
    /// Time left before the submission expires, as of `now`.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> std::time::Duration {
        let elapsed = (now - self.created_at).to_std().unwrap_or_default();
        std::time::Duration::from_secs(self.ttl_secs).saturating_sub(elapsed)
    }
}

/// Renders a submitted value the way field responses store it: strings
/// verbatim, everything else as JSON text.
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
