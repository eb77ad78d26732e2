//! Domain types and the ports the application layer depends on.

pub mod event;
pub mod intent;
pub mod money;
pub mod ports;
pub mod transaction;
pub mod user;
