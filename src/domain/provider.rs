//! Classification of payment provider responses.
//!
//! The provider reports success inside the body (`statusCode == "0000"`) and
//! may answer a logical failure with a 200 transport status. Every body is
//! therefore turned into a [`ProviderOutcome`] before anything else looks at it.

use crate::error::{PaymentError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// In-body status code the provider uses for success.
pub const SUCCESS_CODE: &str = "0000";

/// A logical failure reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRejection {
    pub status_code: String,
    pub status_message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome<T> {
    Success(T),
    Rejected(ProviderRejection),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "statusCode", alias = "errorCode")]
    status_code: Option<String>,
    #[serde(rename = "statusMessage", alias = "errorMessage")]
    status_message: Option<String>,
}

impl<T: DeserializeOwned> ProviderOutcome<T> {
    /// Classifies a decoded provider body.
    ///
    /// A success body that does not match the payload shape is a gateway error,
    /// not a rejection.
    pub fn from_body(body: Value) -> Result<Self> {
        let envelope = Envelope::deserialize(&body).map_err(|e| {
            PaymentError::GatewayError(format!("malformed provider envelope: {e}"))
        })?;

        match envelope.status_code.as_deref() {
            Some(SUCCESS_CODE) => {
                let payload = T::deserialize(body).map_err(|e| {
                    PaymentError::GatewayError(format!("unexpected provider payload: {e}"))
                })?;
                Ok(ProviderOutcome::Success(payload))
            }
            code => Ok(ProviderOutcome::Rejected(ProviderRejection {
                status_code: code.unwrap_or("unknown").to_string(),
                status_message: envelope
                    .status_message
                    .unwrap_or_else(|| "Provider rejected the request".to_string()),
            })),
        }
    }
}

/// Payload of a successful create call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedPayment {
    #[serde(rename = "paymentID")]
    pub payment_id: String,
    #[serde(rename = "bkashURL")]
    pub redirect_url: String,
}

/// Payload of a successful execute call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutedPayment {
    #[serde(rename = "paymentID")]
    pub payment_id: String,
    #[serde(rename = "trxID")]
    pub trx_id: Option<String>,
    #[serde(rename = "transactionStatus")]
    pub transaction_status: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    #[serde(rename = "customerMsisdn")]
    pub customer_msisdn: Option<String>,
    #[serde(rename = "merchantInvoiceNumber")]
    pub merchant_invoice_number: Option<String>,
}

/// Payload of a successful refund call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefundedPayment {
    #[serde(rename = "originalTrxID")]
    pub original_trx_id: Option<String>,
    #[serde(rename = "refundTrxID")]
    pub refund_trx_id: String,
    #[serde(rename = "transactionStatus")]
    pub transaction_status: Option<String>,
    pub amount: Option<String>,
}
