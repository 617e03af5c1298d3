//! Domain entities, value objects and the ports the application layer talks to.

pub mod form;
pub mod payment;
pub mod ports;
pub mod provider;
pub mod submission;
pub mod token;
