//! Application layer orchestrating the payment flows.
//!
//! `PaymentEngine` is the entry point. It wires the customer identity mapper,
//! intent submission, the confirmation state machine and the webhook
//! reconciler to the store and processor ports, one short-lived invocation
//! per inbound call.

pub mod confirmation;
pub mod context;
pub mod engine;
pub mod identity;
pub mod reconciler;
pub mod submission;
