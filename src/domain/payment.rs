use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of fractional digits the provider accepts for an amount.
pub const AMOUNT_SCALE: u32 = 2;

/// A positive monetary amount with at most two decimal places.
///
/// Wraps `rust_decimal::Decimal` so that an amount which reaches the gateway or
/// the payment store has already been validated.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value <= Decimal::ZERO {
            return Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }
        if value.normalize().scale() > AMOUNT_SCALE {
            return Err(PaymentError::ValidationError(format!(
                "Amount must have at most {AMOUNT_SCALE} decimal places"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// A payment as seen by this backend.
///
/// Created `Pending` when the provider accepts a create request, then moved to
/// `Completed` or `Failed` by the confirmation phase. The record never returns
/// to `Pending` and `Completed` is terminal.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentRecord {
    /// Provider-issued payment identifier, unique across records.
    pub payment_id: String,
    pub amount: Amount,
    pub status: PaymentStatus,
    /// Form response materialized when the payment completed.
    pub form_response_id: Option<u64>,
    /// Provider transaction id reported by a successful execute.
    pub trx_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn pending(payment_id: impl Into<String>, amount: Amount) -> Self {
        let now = Utc::now();
        Self {
            payment_id: payment_id.into(),
            amount,
            status: PaymentStatus::Pending,
            form_response_id: None,
            trx_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the payment completed and links the materialized form response.
    ///
    /// A failed payment may still complete when its confirmation is retried.
    pub fn complete(
        &mut self,
        form_response_id: u64,
        trx_id: Option<String>,
    ) -> Result<(), PaymentError> {
        match self.status {
            PaymentStatus::Pending | PaymentStatus::Failed => {
                self.status = PaymentStatus::Completed;
                self.form_response_id = Some(form_response_id);
                self.trx_id = trx_id;
                self.updated_at = Utc::now();
                Ok(())
            }
            PaymentStatus::Completed => Err(self.transition_error(PaymentStatus::Completed)),
        }
    }

    /// Marks the payment failed. Failing an already failed payment only
    /// refreshes `updated_at`.
    pub fn fail(&mut self) -> Result<(), PaymentError> {
        match self.status {
            PaymentStatus::Pending | PaymentStatus::Failed => {
                self.status = PaymentStatus::Failed;
                self.updated_at = Utc::now();
                Ok(())
            }
            PaymentStatus::Completed => Err(self.transition_error(PaymentStatus::Failed)),
        }
    }

    fn transition_error(&self, to: PaymentStatus) -> PaymentError {
        PaymentError::InvalidStatusTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}
