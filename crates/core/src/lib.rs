//! Texpilot Core
//!
//! Foundational types for the texpilot workspace. This crate has zero
//! dependencies on the planner transport, the operation codec, or the agent
//! loop, so every other crate can depend on it.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `streaming` - Planner stream event types and the adapter trait
//! - `fs` - The virtual file system collaborator surface and path helpers
//! - `workspace` - Project introspection surface (project info, current file)

pub mod error;
pub mod fs;
pub mod streaming;
pub mod workspace;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── File System Collaborator ───────────────────────────────────────────
pub use fs::{
    file_name, is_same_or_ancestor, normalize_path, parent_of, DirEntry, FileStat,
    VirtualFileSystem,
};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};

// ── Project Introspection ──────────────────────────────────────────────
pub use workspace::{CurrentFile, ProjectInfo, ProjectWorkspace};
