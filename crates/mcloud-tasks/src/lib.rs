//! Every task handler mcloud exposes over the ticket registry: service
//! lifecycle, deployments, publishing, log/run streaming, volume sync,
//! and backup. Grounded in `mcloud.tasks.TaskService`.

pub mod args;
pub mod engine;
pub mod resolve;
pub mod support;
pub mod tasks;

pub use engine::{register_handlers, TaskEngine};
