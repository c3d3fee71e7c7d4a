//! Wire models for the backends pagedeploy talks to

pub mod models;
