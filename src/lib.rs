//! texpilot
//!
//! A single-operation agent loop for LaTeX document projects. Each planner
//! turn yields exactly one read, write or complete operation; the loop
//! executes it against a virtual file system, folds the result into the
//! session context and asks again.
//!
//! - `models`: task state, session context, history, settings and events
//! - `services::agent`: the loop and its components
//! - `utils`: error types

pub mod models;
pub mod services;
pub mod utils;

pub use models::{AgentConfig, AgentEvent, TaskStatus, TaskSummary};
pub use services::{AgentLoop, AgentService, TaskRun};
pub use utils::error::{AppError, AppResult};
