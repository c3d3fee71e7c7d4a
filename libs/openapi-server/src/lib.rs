//! Wire models served by the pagedeploy HTTP endpoint

pub mod models;
