//! Services
//!
//! Business logic services for the application.

pub mod agent;

pub use agent::{AgentLoop, AgentService, TaskRun};
