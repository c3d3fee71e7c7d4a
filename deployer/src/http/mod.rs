//! Outbound HTTP clients

pub mod callback;
pub mod client;
pub mod github;
pub mod openai;
