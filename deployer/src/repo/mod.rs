//! Repository management on the source-hosting backend

pub mod backend;
pub mod manager;
pub mod manifest;
pub mod memory;
