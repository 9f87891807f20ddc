//! Request and server models shared by the gate.

pub mod candidate;
pub mod key;
