use crate::domain::form::{FieldResponse, Form, FormField, FormResponse, NewFieldResponse};
use crate::domain::payment::PaymentRecord;
use crate::domain::ports::{FormStore, PaymentStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for payment records, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for form definitions.
pub const CF_FORMS: &str = "forms";
/// Column Family for form field definitions.
pub const CF_FIELDS: &str = "fields";
/// Column Family for form responses with their field responses.
pub const CF_RESPONSES: &str = "responses";
/// Column Family for id sequences.
pub const CF_META: &str = "meta";

const NEXT_RESPONSE_ID: &[u8] = b"next_response_id";
const NEXT_FIELD_RESPONSE_ID: &[u8] = b"next_field_response_id";

/// A persistent store implementation using RocksDB.
///
/// Keeps payments and forms in separate Column Families. Writes that must be
/// checked against existing state (duplicate payment ids, id sequences) are
/// serialized through `write_lock` and committed as one `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating any
    /// missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_PAYMENTS, CF_FORMS, CF_FIELDS, CF_RESPONSES, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::StorageError(format!("column family {name} not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_all<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut items = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }

    fn write<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn sequence(&self, key: &[u8]) -> Result<u64> {
        let cf = self.cf(CF_META)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    PaymentError::StorageError("corrupt id sequence".to_string())
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn insert(&self, record: PaymentRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = record.payment_id.as_bytes();
        if self.read::<PaymentRecord>(CF_PAYMENTS, key)?.is_some() {
            return Err(PaymentError::StorageError(format!(
                "payment {} already exists",
                record.payment_id
            )));
        }
        self.write(CF_PAYMENTS, key, &record)
    }

    async fn update(&self, record: PaymentRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = record.payment_id.as_bytes();
        if self.read::<PaymentRecord>(CF_PAYMENTS, key)?.is_none() {
            return Err(PaymentError::PaymentNotFoundError(record.payment_id));
        }
        self.write(CF_PAYMENTS, key, &record)
    }

    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>> {
        self.read(CF_PAYMENTS, payment_id.as_bytes())
    }

    async fn get_all(&self) -> Result<Vec<PaymentRecord>> {
        let mut all: Vec<PaymentRecord> = self.read_all(CF_PAYMENTS)?;
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

#[async_trait]
impl FormStore for RocksDBStore {
    async fn store_form(&self, form: Form) -> Result<()> {
        self.write(CF_FORMS, &form.id.to_be_bytes(), &form)
    }

    async fn store_field(&self, field: FormField) -> Result<()> {
        if self
            .read::<Form>(CF_FORMS, &field.form_id.to_be_bytes())?
            .is_none()
        {
            return Err(PaymentError::StorageError(format!(
                "field {} references unknown form {}",
                field.id, field.form_id
            )));
        }
        self.write(CF_FIELDS, &field.id.to_be_bytes(), &field)
    }

    async fn get_form(&self, form_id: u64) -> Result<Option<Form>> {
        self.read(CF_FORMS, &form_id.to_be_bytes())
    }

    async fn fields(&self, form_id: u64) -> Result<Vec<FormField>> {
        let mut fields: Vec<FormField> = self
            .read_all::<FormField>(CF_FIELDS)?
            .into_iter()
            .filter(|field| field.form_id == form_id)
            .collect();
        fields.sort_by_key(|field| (field.priority, field.id));
        Ok(fields)
    }

    async fn create_response(
        &self,
        form_id: u64,
        fields: Vec<NewFieldResponse>,
    ) -> Result<FormResponse> {
        let _guard = self.write_lock.lock().await;
        if self.read::<Form>(CF_FORMS, &form_id.to_be_bytes())?.is_none() {
            return Err(PaymentError::StorageError(format!("form {form_id} not found")));
        }

        let response_id = self.sequence(NEXT_RESPONSE_ID)? + 1;
        let mut field_response_id = self.sequence(NEXT_FIELD_RESPONSE_ID)?;
        let field_responses = fields
            .into_iter()
            .map(|field| {
                field_response_id += 1;
                FieldResponse {
                    id: field_response_id,
                    form_field_id: field.form_field_id,
                    value: field.value,
                    file: field.file,
                }
            })
            .collect();

        let response = FormResponse {
            id: response_id,
            form_id,
            submitted_at: Utc::now(),
            field_responses,
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_RESPONSES)?,
            response_id.to_be_bytes(),
            serde_json::to_vec(&response)?,
        );
        batch.put_cf(self.cf(CF_META)?, NEXT_RESPONSE_ID, response_id.to_be_bytes());
        batch.put_cf(
            self.cf(CF_META)?,
            NEXT_FIELD_RESPONSE_ID,
            field_response_id.to_be_bytes(),
        );
        self.db.write(batch)?;

        Ok(response)
    }

    async fn responses(&self, form_id: u64) -> Result<Vec<FormResponse>> {
        Ok(self
            .read_all::<FormResponse>(CF_RESPONSES)?
            .into_iter()
            .filter(|response| response.form_id == form_id)
            .collect())
    }
}
