use crate::domain::form::{FieldType, Form, FormField};
use crate::domain::ports::FormStore;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::io::Read;

/// A form together with its field definitions, as written in a seed file.
#[derive(Debug, Deserialize)]
pub struct FormDefinition {
    #[serde(flatten)]
    pub form: Form,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

/// A field definition nested under its form; the form id is implied.
#[derive(Debug, Deserialize)]
pub struct FieldDefinition {
    pub id: u64,
    pub name: String,
    pub field_type: FieldType,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub options: Option<Value>,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub is_job_field: bool,
}

fn default_required() -> bool {
    true
}

impl FieldDefinition {
    fn into_field(self, form_id: u64) -> FormField {
        FormField {
            id: self.id,
            form_id,
            name: self.name,
            field_type: self.field_type,
            required: self.required,
            options: self.options,
            priority: self.priority,
            is_job_field: self.is_job_field,
        }
    }
}

#[derive(Deserialize)]
struct SeedFile {
    forms: Vec<FormDefinition>,
}

/// Reads form definitions from a JSON seed file.
///
/// Field names must be unique within a form because held submissions are
/// matched to fields by name; field ids must be unique across the file.
pub struct FormLoader<R: Read> {
    source: R,
}

impl<R: Read> FormLoader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Parses and validates every definition in the source.
    pub fn definitions(self) -> Result<Vec<FormDefinition>> {
        let seed: SeedFile = serde_json::from_reader(self.source)?;

        let mut form_ids = HashSet::new();
        let mut field_ids = HashSet::new();
        for definition in &seed.forms {
            if !form_ids.insert(definition.form.id) {
                return Err(PaymentError::ValidationError(format!(
                    "duplicate form id {}",
                    definition.form.id
                )));
            }
            let mut names = HashSet::new();
            for field in &definition.fields {
                if !field_ids.insert(field.id) {
                    return Err(PaymentError::ValidationError(format!(
                        "duplicate field id {}",
                        field.id
                    )));
                }
                if !names.insert(field.name.as_str()) {
                    return Err(PaymentError::ValidationError(format!(
                        "form {} defines field {} twice",
                        definition.form.id, field.name
                    )));
                }
            }
        }
        Ok(seed.forms)
    }

    /// Stores every form and its fields; returns the number of forms loaded.
    pub async fn load_into(self, store: &dyn FormStore) -> Result<usize> {
        let definitions = self.definitions()?;
        let count = definitions.len();
        for definition in definitions {
            let form_id = definition.form.id;
            store.store_form(definition.form).await?;
            for field in definition.fields {
                store.store_field(field.into_field(form_id)).await?;
            }
        }
        tracing::info!(forms = count, "form definitions loaded");
        Ok(count)
    }
}
