//! Callback notification

pub mod notifier;
pub mod policy;
pub mod transport;
