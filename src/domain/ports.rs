use super::form::{Form, FormField, FormResponse, NewFieldResponse};
use super::payment::{Amount, PaymentRecord};
use super::provider::{CreatedPayment, ExecutedPayment, ProviderOutcome, RefundedPayment};
use super::token::TokenGrant;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Shared key-value store with per-entry time-to-live.
///
/// Backs both the token slot and the held submissions, so it must be reachable
/// from every process instance that serves payments.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Removes the entry and returns it in one step.
    async fn take(&self, key: &str) -> Result<Option<Value>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts a new record; fails if the payment id is already known.
    async fn insert(&self, record: PaymentRecord) -> Result<()>;
    async fn update(&self, record: PaymentRecord) -> Result<()>;
    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>>;
    async fn get_all(&self) -> Result<Vec<PaymentRecord>>;
}

#[async_trait]
pub trait FormStore: Send + Sync {
    async fn store_form(&self, form: Form) -> Result<()>;
    async fn store_field(&self, field: FormField) -> Result<()>;
    async fn get_form(&self, form_id: u64) -> Result<Option<Form>>;
    /// Field definitions of a form, ordered by priority.
    async fn fields(&self, form_id: u64) -> Result<Vec<FormField>>;
    /// Creates a response with its field responses as one unit and returns it
    /// with assigned ids.
    async fn create_response(
        &self,
        form_id: u64,
        fields: Vec<NewFieldResponse>,
    ) -> Result<FormResponse>;
    async fn responses(&self, form_id: u64) -> Result<Vec<FormResponse>>;
}

/// Issues bearer tokens from the provider's token endpoints.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn grant(&self) -> Result<ProviderOutcome<TokenGrant>>;
    async fn refresh(&self, refresh_token: &str) -> Result<ProviderOutcome<TokenGrant>>;
}

/// Payment operations of the third-party provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(
        &self,
        amount: Amount,
        invoice_number: &str,
        callback_url: &str,
    ) -> Result<ProviderOutcome<CreatedPayment>>;

    async fn execute_payment(&self, payment_id: &str) -> Result<ProviderOutcome<ExecutedPayment>>;

    async fn refund_payment(
        &self,
        payment_id: &str,
        trx_id: &str,
        amount: Amount,
        reason: &str,
    ) -> Result<ProviderOutcome<RefundedPayment>>;
}

pub type KeyValueStoreRef = Arc<dyn KeyValueStore>;
pub type PaymentStoreBox = Box<dyn PaymentStore>;
pub type FormStoreBox = Box<dyn FormStore>;
pub type TokenIssuerRef = Arc<dyn TokenIssuer>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
