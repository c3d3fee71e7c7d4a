//! pagedeploy library
//!
//! Turns a natural-language brief into a published static site: verifies the
//! caller, generates the app, commits it to a repository, publishes it and
//! reports the outcome to a callback.

pub mod app;
pub mod authn;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod generate;
pub mod http;
pub mod logs;
pub mod models;
pub mod notify;
pub mod repo;
pub mod server;
pub mod storage;
pub mod utils;
