use super::holding::SubmissionHoldingArea;
use crate::config::OrchestratorConfig;
use crate::domain::form::{FormField, FormResponse, NewFieldResponse};
use crate::domain::payment::{Amount, PaymentRecord, PaymentStatus};
use crate::domain::ports::{FormStoreBox, PaymentGatewayRef, PaymentStoreBox};
use crate::domain::provider::ProviderOutcome;
use crate::domain::submission::{FormData, PendingSubmission, Settlement, value_as_text};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use reqwest::Url;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;

type ConfirmationLocks = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InitiateOutcome {
    Success {
        redirect_url: String,
        payment_id: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ConfirmOutcome {
    Success {
        message: String,
        form_response_id: u64,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RefundOutcome {
    Success {
        message: String,
        refund_trx_id: String,
    },
    Error {
        message: String,
    },
}

/// Runs the two-phase payment flow: create a provider payment, hold the form
/// data, then execute the payment and turn the held data into a form response.
///
/// Provider rejections come back as `Error` outcomes carrying the provider's
/// message. Everything else (unknown payments, expired submissions, token and
/// transport failures) is returned as a `PaymentError`.
pub struct PaymentOrchestrator {
    gateway: PaymentGatewayRef,
    holding: SubmissionHoldingArea,
    payments: PaymentStoreBox,
    forms: FormStoreBox,
    config: OrchestratorConfig,
    confirmations: ConfirmationLocks,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: PaymentGatewayRef,
        holding: SubmissionHoldingArea,
        payments: PaymentStoreBox,
        forms: FormStoreBox,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            gateway,
            holding,
            payments,
            forms,
            config,
            confirmations: StdMutex::new(HashMap::new()),
        }
    }

    /// Phase 1: reserves a provider payment and records it as pending.
    pub async fn initiate_payment(
        &self,
        amount: Amount,
        callback_url: &str,
    ) -> Result<InitiateOutcome> {
        Url::parse(callback_url)
            .map_err(|e| PaymentError::ValidationError(format!("invalid callback_url: {e}")))?;

        let invoice_number = format!("INV{}", Utc::now().timestamp());
        match self
            .gateway
            .create_payment(amount, &invoice_number, callback_url)
            .await?
        {
            ProviderOutcome::Success(created) => {
                self.payments
                    .insert(PaymentRecord::pending(&created.payment_id, amount))
                    .await?;
                tracing::info!(
                    payment_id = %created.payment_id,
                    %amount,
                    %invoice_number,
                    "payment initiated"
                );
                Ok(InitiateOutcome::Success {
                    redirect_url: created.redirect_url,
                    payment_id: created.payment_id,
                })
            }
            ProviderOutcome::Rejected(rejection) => Ok(InitiateOutcome::Error {
                message: rejection.status_message,
            }),
        }
    }

    /// Keeps form data until the payment it belongs to is confirmed.
    pub async fn hold_submission(
        &self,
        payment_id: &str,
        form_data: FormData,
        form_id: Option<u64>,
    ) -> Result<()> {
        self.holding
            .put(payment_id, form_id, form_data, self.holding.default_ttl())
            .await
    }

    /// Phase 2: executes the payment and materializes the held form data.
    ///
    /// Confirmations of the same payment run one at a time, so a duplicate
    /// delivery after a success finds no held submission and fails with
    /// `SubmissionNotFoundError`.
    pub async fn confirm_payment(&self, payment_id: &str) -> Result<ConfirmOutcome> {
        let slot = self.confirmation_slot(payment_id);
        let _held = slot.lock.lock().await;
        self.confirm_exclusive(payment_id).await
    }

    async fn confirm_exclusive(&self, payment_id: &str) -> Result<ConfirmOutcome> {
        let submission = self
            .holding
            .get(payment_id)
            .await?
            .ok_or_else(|| PaymentError::SubmissionNotFoundError(payment_id.to_string()))?;

        let mut record = self
            .payments
            .get(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFoundError(payment_id.to_string()))?;

        if record.status == PaymentStatus::Completed {
            tracing::warn!(payment_id, "dropping held data of an already completed payment");
            self.holding.delete(payment_id).await?;
            return Err(PaymentError::SubmissionNotFoundError(payment_id.to_string()));
        }

        if let Some(settlement) = submission.settlement.clone() {
            tracing::info!(
                payment_id,
                form_response_id = settlement.form_response_id,
                "resuming an executed payment"
            );
            return self.settle(record, &submission, settlement).await;
        }

        let form_id = submission.form_id.unwrap_or(self.config.default_form_id);
        let fields = self.form_fields(form_id).await?;

        let outcome = match self.gateway.execute_payment(payment_id).await {
            Ok(outcome) => outcome,
            Err(err @ PaymentError::GatewayError(_)) => {
                record.fail()?;
                self.payments.update(record).await?;
                tracing::warn!(payment_id, error = %err, "payment execution failed in transport");
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        match outcome {
            ProviderOutcome::Success(executed) => {
                let response = self.materialize(form_id, &fields, &submission).await?;
                let settlement = Settlement {
                    form_response_id: response.id,
                    trx_id: executed.trx_id,
                };
                self.settle(record, &submission, settlement).await
            }
            ProviderOutcome::Rejected(rejection) => {
                record.fail()?;
                self.payments.update(record).await?;
                tracing::info!(
                    payment_id,
                    status_code = %rejection.status_code,
                    "payment execution rejected; held data kept for retry"
                );
                Ok(ConfirmOutcome::Error {
                    message: rejection.status_message,
                })
            }
        }
    }

    /// Marks the record completed and releases the held data.
    ///
    /// If the record cannot be written, the settlement is stored with the held
    /// data so the next confirmation finishes the job without executing the
    /// payment or writing the form response again.
    async fn settle(
        &self,
        mut record: PaymentRecord,
        submission: &PendingSubmission,
        settlement: Settlement,
    ) -> Result<ConfirmOutcome> {
        let payment_id = submission.payment_id.as_str();
        let form_response_id = settlement.form_response_id;
        record.complete(form_response_id, settlement.trx_id.clone())?;

        if let Err(err) = self.payments.update(record).await {
            tracing::warn!(
                payment_id,
                form_response_id,
                error = %err,
                "payment executed but record not updated"
            );
            let resumable = PendingSubmission {
                settlement: Some(settlement),
                ..submission.clone()
            };
            if let Err(restore_err) = self.holding.restore(&resumable).await {
                tracing::error!(
                    payment_id,
                    form_response_id,
                    error = %restore_err,
                    "could not keep settlement for retry"
                );
            }
            return Err(err);
        }

        if self.holding.take(payment_id).await?.is_none() {
            tracing::warn!(payment_id, "held data was removed before cleanup");
        }
        tracing::info!(payment_id, form_response_id, "payment completed");

        Ok(ConfirmOutcome::Success {
            message: "Payment completed successfully".to_string(),
            form_response_id,
        })
    }

    /// Refunds part or all of a completed payment.
    pub async fn refund_payment(
        &self,
        payment_id: &str,
        amount: Amount,
        reason: &str,
    ) -> Result<RefundOutcome> {
        let record = self
            .payments
            .get(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFoundError(payment_id.to_string()))?;

        if record.status != PaymentStatus::Completed {
            return Err(PaymentError::ValidationError(format!(
                "only completed payments can be refunded; payment is {}",
                record.status
            )));
        }
        let trx_id = record.trx_id.as_deref().ok_or_else(|| {
            PaymentError::ValidationError("payment has no provider transaction id".to_string())
        })?;
        if amount > record.amount {
            return Err(PaymentError::ValidationError(format!(
                "refund amount {amount} exceeds paid amount {}",
                record.amount
            )));
        }
        if reason.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "refund reason is required".to_string(),
            ));
        }

        match self
            .gateway
            .refund_payment(payment_id, trx_id, amount, reason)
            .await?
        {
            ProviderOutcome::Success(refunded) => {
                tracing::info!(payment_id, refund_trx_id = %refunded.refund_trx_id, "payment refunded");
                Ok(RefundOutcome::Success {
                    message: "Refund completed successfully".to_string(),
                    refund_trx_id: refunded.refund_trx_id,
                })
            }
            ProviderOutcome::Rejected(rejection) => Ok(RefundOutcome::Error {
                message: rejection.status_message,
            }),
        }
    }

    pub async fn payment(&self, payment_id: &str) -> Result<Option<PaymentRecord>> {
        self.payments.get(payment_id).await
    }

    pub async fn payments(&self) -> Result<Vec<PaymentRecord>> {
        self.payments.get_all().await
    }

    pub async fn held_submission(&self, payment_id: &str) -> Result<Option<PendingSubmission>> {
        self.holding.get(payment_id).await
    }

    pub async fn form_responses(&self, form_id: u64) -> Result<Vec<FormResponse>> {
        self.forms.responses(form_id).await
    }

    async fn form_fields(&self, form_id: u64) -> Result<Vec<FormField>> {
        if self.forms.get_form(form_id).await?.is_none() {
            return Err(PaymentError::ValidationError(format!(
                "form {form_id} does not exist"
            )));
        }
        self.forms.fields(form_id).await
    }

    async fn materialize(
        &self,
        form_id: u64,
        fields: &[FormField],
        submission: &PendingSubmission,
    ) -> Result<FormResponse> {
        let mut values = Vec::with_capacity(submission.form_data.len());
        for (name, value) in &submission.form_data {
            match fields.iter().find(|field| &field.name == name) {
                Some(field) => values.push(NewFieldResponse {
                    form_field_id: field.id,
                    value: value_as_text(value),
                    file: None,
                }),
                None => {
                    tracing::warn!(form_id, field = %name, "no such field on form; value skipped");
                }
            }
        }
        self.forms.create_response(form_id, values).await
    }

    fn confirmation_slot(&self, payment_id: &str) -> ConfirmationSlot<'_> {
        let mut confirmations = self
            .confirmations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let lock = confirmations
            .entry(payment_id.to_string())
            .or_default()
            .clone();
        ConfirmationSlot {
            confirmations: &self.confirmations,
            payment_id: payment_id.to_string(),
            lock,
        }
    }

    #[cfg(test)]
    fn confirmations_in_flight(&self) -> usize {
        self.confirmations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A caller's share of the per-payment confirmation lock. Dropping the last
/// share removes the map entry, also when the confirmation is cancelled.
struct ConfirmationSlot<'a> {
    confirmations: &'a ConfirmationLocks,
    payment_id: String,
    lock: Arc<Mutex<()>>,
}

impl Drop for ConfirmationSlot<'_> {
    fn drop(&mut self) {
        let mut confirmations = self
            .confirmations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map's reference and ours.
        if Arc::strong_count(&self.lock) == 2 {
            confirmations.remove(&self.payment_id);
        }
    }
}
