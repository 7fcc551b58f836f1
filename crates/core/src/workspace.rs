//! Project Introspection Surface
//!
//! The two read actions that are not plain file reads (`get_project_info`,
//! `get_current_file`) go through this trait. The editor or CLI hosting the
//! agent decides what "the current file" means.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// Project metadata shown to the planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub name: String,
    /// Main document path, if one could be identified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_file: Option<String>,
    pub file_count: usize,
    pub directory_count: usize,
    /// File count per extension (`tex`, `bib`, ...)
    #[serde(default)]
    pub extensions: BTreeMap<String, usize>,
}

/// The file the operator currently has open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentFile {
    pub file_path: String,
    pub content: String,
}

/// Project-level introspection consumed by the operation executor.
#[async_trait]
pub trait ProjectWorkspace: Send + Sync {
    /// Describe the project.
    async fn project_info(&self) -> CoreResult<ProjectInfo>;

    /// The file currently open in the host, if any.
    async fn current_file(&self) -> CoreResult<Option<CurrentFile>>;
}
