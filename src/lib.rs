//! fixflow - Core Library
//! Order-lifecycle tracking and execution aggregation for a FIX counterparty
//! load client. The session engine (handshake, sequencing, transport) is an
//! external collaborator behind [`session::Session`].

// Public modules
pub mod core;
pub mod engine;
pub mod flow;
pub mod session;

// Re-exports
pub use crate::core::{AppConfig, Error, Result};
