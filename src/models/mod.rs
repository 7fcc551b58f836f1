//! Data Models
//!
//! Task state, session context, history, settings and progress events.

pub mod context;
pub mod events;
pub mod history;
pub mod settings;
pub mod task;

pub use context::*;
pub use events::*;
pub use history::*;
pub use settings::*;
pub use task::*;
