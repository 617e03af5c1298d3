use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum FormType {
    DemandSubmission,
    AgentRegistration,
    WorkerRegistration,
    ApplyNow,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Email,
    Phone,
    Image,
    File,
    Textarea,
    Select,
    Checkbox,
    Radio,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Form {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub form_type: FormType,
    /// Fee charged before a submission of this form is accepted.
    #[serde(default)]
    pub payment_amount: Decimal,
}

/// A field definition; drives which input a form renders and how submitted
/// values are matched back to it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct FormField {
    pub id: u64,
    pub form_id: u64,
    pub name: String,
    pub field_type: FieldType,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Choices for select, radio and checkbox fields.
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

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct FieldResponse {
    pub id: u64,
    pub form_field_id: u64,
    pub value: String,
    /// Stored path of an uploaded file, if the field carried one.
    pub file: Option<String>,
}

/// A field value waiting to be written as part of a new form response.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFieldResponse {
    pub form_field_id: u64,
    pub value: String,
    pub file: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct FormResponse {
    pub id: u64,
    pub form_id: u64,
    pub submitted_at: DateTime<Utc>,
    pub field_responses: Vec<FieldResponse>,
}
