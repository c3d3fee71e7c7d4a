//! Domain models

pub mod artifact;
pub mod deployment;
