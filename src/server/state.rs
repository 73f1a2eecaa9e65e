use std::sync::Arc;

use tokio::sync::watch;

use crate::worker::{JobDefaults, JobProcessor, LifecycleState, ResourceHolder};

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<JobProcessor>,
    pub defaults: JobDefaults,
    pub lifecycle: watch::Receiver<LifecycleState>,
}

impl AppState {
    pub fn new(processor: Arc<JobProcessor>, defaults: JobDefaults, lifecycle: watch::Receiver<LifecycleState>) -> Self {
        Self { processor, defaults, lifecycle }
    }

    pub fn resource(&self) -> &Arc<ResourceHolder> {
        self.processor.resource()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        *self.lifecycle.borrow()
    }
}
