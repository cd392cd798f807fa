//! Server crate for the product recommendation pipeline.
//!
//! This crate ties the components together: the configuration, the
//! background task dispatcher, the stateless pipeline jobs, and the
//! orchestrator that runs the whole lifecycle for one partition.

pub mod config;
pub mod jobs;
pub mod orchestrator;
pub mod tasks;

pub use config::PipelineConfig;
pub use jobs::JobEnv;
pub use orchestrator::Pipeline;
pub use tasks::{Dispatcher, Task, TaskId, TaskState};
