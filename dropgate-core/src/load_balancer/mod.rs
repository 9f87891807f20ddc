//! Server selection on top of the host's load ranking.

pub mod selector;

pub use selector::{SelectionFilter, DISPATCH_TARGET};
