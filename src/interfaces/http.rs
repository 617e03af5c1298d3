//! Inbound HTTP endpoints for the payment flow.

use crate::application::orchestrator::{
    ConfirmOutcome, InitiateOutcome, PaymentOrchestrator, RefundOutcome,
};
use crate::domain::payment::Amount;
use crate::domain::submission::FormData;
use crate::error::PaymentError;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

pub type AppState = Arc<PaymentOrchestrator>;

type Reply = (StatusCode, Json<Value>);

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Option<Decimal>,
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HoldSubmissionRequest {
    pub payment_id: Option<String>,
    pub form_data: Option<FormData>,
    pub form_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ExecutePaymentRequest {
    pub payment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefundPaymentRequest {
    pub payment_id: Option<String>,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/create_payment/", post(create_payment))
        .route("/temp_form_data/", post(temp_form_data))
        .route("/execute_payment/", post(execute_payment))
        .route("/refund_payment/", post(refund_payment))
        .with_state(state)
}

pub async fn healthz() -> Reply {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

pub async fn create_payment(
    State(orchestrator): State<AppState>,
    payload: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Reply {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return invalid_json(rejection),
    };
    let (Some(amount), Some(callback_url)) = (request.amount, request.callback_url) else {
        return error_reply(StatusCode::BAD_REQUEST, "amount and callback_url are required");
    };
    let amount = match Amount::new(amount) {
        Ok(amount) => amount,
        Err(err) => return failure(err),
    };

    match orchestrator.initiate_payment(amount, &callback_url).await {
        Ok(outcome @ InitiateOutcome::Success { .. }) => (StatusCode::OK, to_json(&outcome)),
        Ok(outcome @ InitiateOutcome::Error { .. }) => (StatusCode::BAD_REQUEST, to_json(&outcome)),
        Err(err) => failure(err),
    }
}

pub async fn temp_form_data(
    State(orchestrator): State<AppState>,
    payload: Result<Json<HoldSubmissionRequest>, JsonRejection>,
) -> Reply {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return invalid_json(rejection),
    };
    let payment_id = request.payment_id.unwrap_or_default();
    let form_data = request.form_data.unwrap_or_default();

    match orchestrator
        .hold_submission(&payment_id, form_data, request.form_id)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "success"}))),
        Err(err) => failure(err),
    }
}

pub async fn execute_payment(
    State(orchestrator): State<AppState>,
    payload: Result<Json<ExecutePaymentRequest>, JsonRejection>,
) -> Reply {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return invalid_json(rejection),
    };
    let Some(payment_id) = request.payment_id.filter(|id| !id.trim().is_empty()) else {
        return error_reply(StatusCode::BAD_REQUEST, "payment_id is required");
    };

    match orchestrator.confirm_payment(&payment_id).await {
        Ok(outcome @ ConfirmOutcome::Success { .. }) => (StatusCode::OK, to_json(&outcome)),
        Ok(outcome @ ConfirmOutcome::Error { .. }) => (StatusCode::BAD_REQUEST, to_json(&outcome)),
        Err(err) => failure(err),
    }
}

pub async fn refund_payment(
    State(orchestrator): State<AppState>,
    payload: Result<Json<RefundPaymentRequest>, JsonRejection>,
) -> Reply {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return invalid_json(rejection),
    };
    let (Some(payment_id), Some(amount)) = (request.payment_id, request.amount) else {
        return error_reply(StatusCode::BAD_REQUEST, "payment_id and amount are required");
    };
    let amount = match Amount::new(amount) {
        Ok(amount) => amount,
        Err(err) => return failure(err),
    };
    let reason = request.reason.unwrap_or_default();

    match orchestrator
        .refund_payment(&payment_id, amount, &reason)
        .await
    {
        Ok(outcome @ RefundOutcome::Success { .. }) => (StatusCode::OK, to_json(&outcome)),
        Ok(outcome @ RefundOutcome::Error { .. }) => (StatusCode::BAD_REQUEST, to_json(&outcome)),
        Err(err) => failure(err),
    }
}

fn to_json<T: serde::Serialize>(outcome: &T) -> Json<Value> {
    Json(serde_json::to_value(outcome).unwrap_or_else(|err| {
        json!({"status": "error", "message": err.to_string()})
    }))
}

fn error_reply(status: StatusCode, message: &str) -> Reply {
    (status, Json(json!({"status": "error", "message": message})))
}

fn invalid_json(rejection: JsonRejection) -> Reply {
    tracing::debug!(%rejection, "rejected request body");
    error_reply(StatusCode::BAD_REQUEST, "Invalid JSON data")
}

/// Maps a failure to its HTTP status; the body always carries the message.
fn failure(err: PaymentError) -> Reply {
    let status = match &err {
        PaymentError::ValidationError(_) => StatusCode::BAD_REQUEST,
        PaymentError::SubmissionNotFoundError(_) | PaymentError::PaymentNotFoundError(_) => {
            StatusCode::NOT_FOUND
        }
        PaymentError::TokenAcquisitionError(_) | PaymentError::GatewayError(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    error_reply(status, &err.to_string())
}
