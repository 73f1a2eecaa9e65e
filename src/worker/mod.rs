//! The worker core shared by both transports.

mod job;
mod lifecycle;
mod outcome;
mod processor;
mod resource;

pub use job::{Job, JobDefaults, JobId, JobRequest};
pub use lifecycle::{Controller, LifecycleState, PollPolicy};
pub use outcome::JobResult;
pub use processor::JobProcessor;
pub use resource::{ReadinessMarker, ResourceHolder, ResourceState};
