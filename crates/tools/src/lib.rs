//! TeXpilot Tools
//!
//! Everything between raw planner output and the project files:
//! - `Operation` and the action catalog
//! - the planner wire codec (`parse_planner_response`) with its recovery rules
//! - `OperationExecutor`, which runs one operation against a `VirtualFileSystem`
//! - in-memory and on-disk file systems, and a file-system-backed workspace

pub mod executor;
pub mod fs;
pub mod operation;
pub mod protocol;
pub mod recovery;
pub mod workspace;

pub use executor::{ExecutorError, OperationExecutor, OperationResult, MAX_SEARCH_RESULTS};
pub use fs::{LocalFileSystem, MemoryFileSystem, ReadOnlyView};
pub use operation::{
    action_spec, actions_of, catalog_kind, ActionSpec, Operation, OperationKind, OperationTarget,
    ParamSpec, CATALOG,
};
pub use protocol::{
    build_operation_instructions, operation_tool_definitions, parse_operation,
    parse_planner_response, ParseFailure,
};
pub use recovery::{
    apply_rules, repair_json, EscapeEvidence, Recovered, RecoveryRule, CONTENT_RULES, JSON_RULES,
};
pub use workspace::FsWorkspace;
