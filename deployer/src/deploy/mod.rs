//! Deployment workflow

pub mod controller;
pub mod fsm;
pub mod locks;
pub mod resolver;
