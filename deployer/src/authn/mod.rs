//! Request authentication

pub mod secret;
