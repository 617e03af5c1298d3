use crate::domain::ports::KeyValueStoreRef;
use crate::domain::submission::{FormData, PendingSubmission};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::time::Duration;

/// Holds submitted form data between payment creation and confirmation.
///
/// Entries live in a dedicated key-value store under `form_data_<payment_id>`
/// and disappear on their own once the ttl elapses.
pub struct SubmissionHoldingArea {
    store: KeyValueStoreRef,
    default_ttl: Duration,
}

impl SubmissionHoldingArea {
    pub fn new(store: KeyValueStoreRef, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub async fn put(
        &self,
        payment_id: &str,
        form_id: Option<u64>,
        form_data: FormData,
        ttl: Duration,
    ) -> Result<()> {
        if payment_id.trim().is_empty() || form_data.is_empty() {
            return Err(PaymentError::ValidationError(
                "payment_id and form_data are required".to_string(),
            ));
        }

        let submission = PendingSubmission {
            payment_id: payment_id.to_string(),
            form_id,
            form_data,
            created_at: Utc::now(),
            ttl_secs: ttl.as_secs(),
            settlement: None,
        };
        self.store
            .put(&Self::key(payment_id), serde_json::to_value(&submission)?, ttl)
            .await?;
        tracing::info!(payment_id, field_count = submission.form_data.len(), "holding form data");
        Ok(())
    }

    /// Writes back a held submission for the time it has left. A submission
    /// that has already run out is kept for one more second.
    pub async fn restore(&self, submission: &PendingSubmission) -> Result<()> {
        let ttl = submission
            .remaining_ttl(Utc::now())
            .max(Duration::from_secs(1));
        self.store
            .put(
                &Self::key(&submission.payment_id),
                serde_json::to_value(submission)?,
                ttl,
            )
            .await
    }

    pub async fn get(&self, payment_id: &str) -> Result<Option<PendingSubmission>> {
        match self.store.get(&Self::key(payment_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, payment_id: &str) -> Result<()> {
        self.store.delete(&Self::key(payment_id)).await
    }

    /// Removes the held submission and returns it, or `None` if another
    /// caller already removed it.
    pub async fn take(&self, payment_id: &str) -> Result<Option<PendingSubmission>> {
        match self.store.take(&Self::key(payment_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn key(payment_id: &str) -> String {
        format!("form_data_{payment_id}")
    }
}
