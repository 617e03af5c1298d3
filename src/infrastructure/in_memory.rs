use crate::domain::form::{FieldResponse, Form, FormField, FormResponse, NewFieldResponse};
use crate::domain::payment::PaymentRecord;
use crate::domain::ports::{FormStore, PaymentStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for payment records.
///
/// Uses `Arc<RwLock<HashMap<String, PaymentRecord>>>` keyed by payment id.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<String, PaymentRecord>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, record: PaymentRecord) -> Result<()> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&record.payment_id) {
            return Err(PaymentError::StorageError(format!(
                "payment {} already exists",
                record.payment_id
            )));
        }
        payments.insert(record.payment_id.clone(), record);
        Ok(())
    }

    async fn update(&self, record: PaymentRecord) -> Result<()> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(&record.payment_id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(PaymentError::PaymentNotFoundError(record.payment_id)),
        }
    }

    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>> {
        let payments = self.payments.read().await;
        Ok(payments.get(payment_id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<PaymentRecord>> {
        let payments = self.payments.read().await;
        let mut all: Vec<PaymentRecord> = payments.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

#[derive(Default)]
struct FormTables {
    forms: HashMap<u64, Form>,
    fields: HashMap<u64, FormField>,
    responses: Vec<FormResponse>,
    next_response_id: u64,
    next_field_response_id: u64,
}

/// A thread-safe in-memory store for forms, field definitions and responses.
///
/// All tables sit behind one lock so a response and its field responses are
/// written together.
#[derive(Default, Clone)]
pub struct InMemoryFormStore {
    tables: Arc<RwLock<FormTables>>,
}

impl InMemoryFormStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FormStore for InMemoryFormStore {
    async fn store_form(&self, form: Form) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.forms.insert(form.id, form);
        Ok(())
    }

    async fn store_field(&self, field: FormField) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.forms.contains_key(&field.form_id) {
            return Err(PaymentError::StorageError(format!(
                "field {} references unknown form {}",
                field.id, field.form_id
            )));
        }
        tables.fields.insert(field.id, field);
        Ok(())
    }

    async fn get_form(&self, form_id: u64) -> Result<Option<Form>> {
        let tables = self.tables.read().await;
        Ok(tables.forms.get(&form_id).cloned())
    }

    async fn fields(&self, form_id: u64) -> Result<Vec<FormField>> {
        let tables = self.tables.read().await;
        let mut fields: Vec<FormField> = tables
            .fields
            .values()
            .filter(|field| field.form_id == form_id)
            .cloned()
            .collect();
        fields.sort_by_key(|field| (field.priority, field.id));
        Ok(fields)
    }

    async fn create_response(
        &self,
        form_id: u64,
        fields: Vec<NewFieldResponse>,
    ) -> Result<FormResponse> {
        let mut tables = self.tables.write().await;
        if !tables.forms.contains_key(&form_id) {
            return Err(PaymentError::StorageError(format!("form {form_id} not found")));
        }

        tables.next_response_id += 1;
        let response_id = tables.next_response_id;

        let mut field_responses = Vec::with_capacity(fields.len());
        for field in fields {
            tables.next_field_response_id += 1;
            field_responses.push(FieldResponse {
                id: tables.next_field_response_id,
                form_field_id: field.form_field_id,
                value: field.value,
                file: field.file,
            });
        }

        let response = FormResponse {
            id: response_id,
            form_id,
            submitted_at: Utc::now(),
            field_responses,
        };
        tables.responses.push(response.clone());
        Ok(response)
    }

    async fn responses(&self, form_id: u64) -> Result<Vec<FormResponse>> {
        let tables = self.tables.read().await;
        Ok(tables
            .responses
            .iter()
            .filter(|response| response.form_id == form_id)
            .cloned()
            .collect())
    }
}
