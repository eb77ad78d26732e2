//! Adapters between the binary and the engine.

pub mod csv;
pub mod replay;
