//! Client for the coordination service that guards the shared whitelist file.

pub mod client;
pub mod message;

pub use client::{LockClient, LockError, LockState};
pub use message::LockMessage;
