#![allow(dead_code)]

use async_trait::async_trait;
use formpay::application::holding::SubmissionHoldingArea;
use formpay::application::orchestrator::PaymentOrchestrator;
use formpay::config::{Credentials, GatewayConfig, OrchestratorConfig};
use formpay::domain::form::{FieldType, Form, FormField, FormType};
use formpay::domain::payment::{Amount, PaymentRecord};
use formpay::domain::ports::{FormStore, PaymentGateway, PaymentStore, PaymentStoreBox};
use formpay::domain::provider::{
    CreatedPayment, ExecutedPayment, ProviderOutcome, ProviderRejection, RefundedPayment,
};
use formpay::domain::submission::FormData;
use formpay::error::{PaymentError, Result};
use formpay::infrastructure::in_memory::{InMemoryFormStore, InMemoryPaymentStore};
use formpay::infrastructure::ttl_cache::MokaKeyValueStore;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PAYMENT_FORM_ID: u64 = 2;

pub fn credentials() -> Credentials {
    Credentials {
        app_key: "app-key".to_string(),
        app_secret: "app-secret".to_string(),
        username: "merchant".to_string(),
        password: "merchant-pass".to_string(),
    }
}

pub fn gateway_config(base_url: &str) -> GatewayConfig {
    GatewayConfig::new(base_url, credentials()).unwrap()
}

pub fn rejection(code: &str, message: &str) -> ProviderRejection {
    ProviderRejection {
        status_code: code.to_string(),
        status_message: message.to_string(),
    }
}

pub fn executed(payment_id: &str, trx_id: &str) -> ExecutedPayment {
    ExecutedPayment {
        payment_id: payment_id.to_string(),
        trx_id: Some(trx_id.to_string()),
        transaction_status: Some("Completed".to_string()),
        amount: Some("500".to_string()),
        currency: Some("BDT".to_string()),
        customer_msisdn: Some("01770618575".to_string()),
        merchant_invoice_number: Some("INV1".to_string()),
    }
}

pub fn form_data() -> FormData {
    FormData::from([
        ("name".to_string(), json!("Rahim")),
        ("passport_number".to_string(), json!("A1234567")),
        ("job".to_string(), json!("Driver")),
    ])
}

pub fn amount(value: rust_decimal::Decimal) -> Amount {
    Amount::new(value).unwrap()
}

/// Gateway double with scripted replies. Once a script runs dry, calls
/// succeed with a default payload.
#[derive(Default)]
pub struct StubGateway {
    pub creates: Mutex<VecDeque<Result<ProviderOutcome<CreatedPayment>>>>,
    pub executes: Mutex<VecDeque<Result<ProviderOutcome<ExecutedPayment>>>>,
    pub refunds: Mutex<VecDeque<Result<ProviderOutcome<RefundedPayment>>>>,
    pub create_calls: AtomicUsize,
    pub execute_calls: AtomicUsize,
    pub refund_calls: AtomicUsize,
    pub execute_delay: Option<Duration>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execute_delay(delay: Duration) -> Self {
        Self {
            execute_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn script_create(&self, reply: Result<ProviderOutcome<CreatedPayment>>) {
        self.creates.lock().unwrap().push_back(reply);
    }

    pub fn script_execute(&self, reply: Result<ProviderOutcome<ExecutedPayment>>) {
        self.executes.lock().unwrap().push_back(reply);
    }

    pub fn script_refund(&self, reply: Result<ProviderOutcome<RefundedPayment>>) {
        self.refunds.lock().unwrap().push_back(reply);
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> usize {
        self.refund_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_payment(
        &self,
        _amount: Amount,
        invoice_number: &str,
        _callback_url: &str,
    ) -> Result<ProviderOutcome<CreatedPayment>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        assert!(invoice_number.starts_with("INV"));
        let scripted = self.creates.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ProviderOutcome::Success(CreatedPayment {
                payment_id: "TR123".to_string(),
                redirect_url: "https://sandbox.payment.bkash.com/?paymentId=TR123".to_string(),
            }))
        })
    }

    async fn execute_payment(&self, payment_id: &str) -> Result<ProviderOutcome<ExecutedPayment>> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.executes.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(ProviderOutcome::Success(executed(payment_id, "TRX9"))))
    }

    async fn refund_payment(
        &self,
        _payment_id: &str,
        trx_id: &str,
        _amount: Amount,
        _reason: &str,
    ) -> Result<ProviderOutcome<RefundedPayment>> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.refunds.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ProviderOutcome::Success(RefundedPayment {
                original_trx_id: Some(trx_id.to_string()),
                refund_trx_id: "RFD1".to_string(),
                transaction_status: Some("Completed".to_string()),
                amount: None,
            }))
        })
    }
}

pub fn gateway_error(message: &str) -> Result<ProviderOutcome<ExecutedPayment>> {
    Err(PaymentError::GatewayError(message.to_string()))
}

/// Form store seeded with the payment form and its three fields.
pub async fn seeded_forms() -> InMemoryFormStore {
    let store = InMemoryFormStore::new();
    store
        .store_form(Form {
            id: PAYMENT_FORM_ID,
            name: "Worker Registration".to_string(),
            description: None,
            form_type: FormType::WorkerRegistration,
            payment_amount: dec!(500),
        })
        .await
        .unwrap();
    for (id, name, priority) in [(10, "name", 1), (11, "passport_number", 2), (12, "job", 3)] {
        store
            .store_field(FormField {
                id,
                form_id: PAYMENT_FORM_ID,
                name: name.to_string(),
                field_type: FieldType::Text,
                required: true,
                options: None,
                priority,
                is_job_field: name == "job",
            })
            .await
            .unwrap();
    }
    store
}

pub async fn orchestrator(gateway: Arc<StubGateway>, submission_ttl: Duration) -> PaymentOrchestrator {
    orchestrator_with_payments(gateway, Box::new(InMemoryPaymentStore::new()), submission_ttl).await
}

pub async fn orchestrator_with_payments(
    gateway: Arc<StubGateway>,
    payments: PaymentStoreBox,
    submission_ttl: Duration,
) -> PaymentOrchestrator {
    PaymentOrchestrator::new(
        gateway,
        SubmissionHoldingArea::new(Arc::new(MokaKeyValueStore::new()), submission_ttl),
        payments,
        Box::new(seeded_forms().await),
        OrchestratorConfig::default(),
    )
}

/// Payment store whose next `update` fails once when armed.
#[derive(Default, Clone)]
pub struct FlakyPaymentStore {
    inner: InMemoryPaymentStore,
    fail_next_update: Arc<AtomicBool>,
}

impl FlakyPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_update(&self) {
        self.fail_next_update.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentStore for FlakyPaymentStore {
    async fn insert(&self, record: PaymentRecord) -> Result<()> {
        self.inner.insert(record).await
    }

    async fn update(&self, record: PaymentRecord) -> Result<()> {
        if self.fail_next_update.swap(false, Ordering::SeqCst) {
            return Err(PaymentError::StorageError("disk full".to_string()));
        }
        self.inner.update(record).await
    }

    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>> {
        self.inner.get(payment_id).await
    }

    async fn get_all(&self) -> Result<Vec<PaymentRecord>> {
        self.inner.get_all().await
    }
}
