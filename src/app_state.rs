use std::sync::Arc;

use crate::services::{
    scheduler::{RunOptions, Scheduler},
    single_run::SingleRunCoordinator,
    vision::VisionService,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub batch: Scheduler,
    pub single: SingleRunCoordinator,
    /// Options applied when a configure request leaves them out.
    pub defaults: RunOptions,
}

impl AppState {
    pub fn new(vision: Arc<dyn VisionService>, defaults: RunOptions) -> Self {
        Self {
            batch: Scheduler::with_options(vision.clone(), defaults),
            single: SingleRunCoordinator::new(vision, defaults.auto_describe),
            defaults,
        }
    }
}
