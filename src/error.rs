use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Token acquisition failed: {0}")]
    TokenAcquisitionError(String),
    #[error("Gateway error: {0}")]
    GatewayError(String),
    #[error("Form data not found for payment {0}")]
    SubmissionNotFoundError(String),
    #[error("Payment {0} not found")]
    PaymentNotFoundError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Invalid payment status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDBError(#[from] rocksdb::Error),
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PaymentError::GatewayError(format!("undecodable provider response: {err}"))
        } else {
            PaymentError::GatewayError(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
