//! Application layer containing the payment flow orchestration.
//!
//! `TokenLifecycleManager` keeps a provider token available,
//! `SubmissionHoldingArea` parks form data while a payment is in flight and
//! `PaymentOrchestrator` sequences both around the payment gateway.

pub mod holding;
pub mod orchestrator;
pub mod token;
