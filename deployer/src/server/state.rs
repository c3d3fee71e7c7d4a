//! Server state

use std::sync::Arc;

use crate::deploy::controller::Controller;

/// Server state shared across handlers
pub struct ServerState {
    pub controller: Arc<Controller>,
}

impl ServerState {
    pub fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }
}
