//! Agent Services
//!
//! The single-operation agent loop and the pieces it is built from:
//! - `accumulator` folds results into the session context
//! - `duplicate_guard` spots repeated operations
//! - `governor` enforces the iteration cap
//! - `prompt` renders what the planner sees
//! - `orchestrator` runs the loop, `service` admits one task at a time

pub mod accumulator;
pub mod confirm;
pub mod duplicate_guard;
pub mod governor;
pub mod orchestrator;
pub mod prompt;
pub mod service;

pub use accumulator::fold;
pub use confirm::{AutoConfirm, ChannelConfirmation, Confirmation, ConfirmationRequest};
pub use duplicate_guard::{find_duplicate, is_duplicate, DUPLICATE_LOOKBACK};
pub use governor::{GovernorState, IterationGovernor};
pub use orchestrator::{AgentLoop, TaskRun};
pub use prompt::PromptBuilder;
pub use service::AgentService;
