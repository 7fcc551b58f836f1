//! Session Context
//!
//! Knowledge gathered during one task, serialized into every planner prompt.
//! Owned by the running loop and replaced wholesale after each turn.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use texpilot_core::{DirEntry, ProjectInfo};

/// Cached content of a file the planner has read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownFile {
    pub content: String,
    pub read_at: DateTime<Utc>,
}

/// Cached listing of one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    pub entries: Vec<DirEntry>,
    pub listed_at: DateTime<Utc>,
}

/// Cached project tree from `get_file_structure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStructure {
    pub structure: String,
    pub files: Vec<String>,
    pub directories: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

/// A path touched by a successful write during this task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRecord {
    pub action: String,
    pub written_at: DateTime<Utc>,
}

/// Running operation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStats {
    pub total: usize,
    pub reads: usize,
    pub writes: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub project_info: Option<ProjectInfo>,
    pub known_file_structure: Option<FileStructure>,
    pub known_files: BTreeMap<String, KnownFile>,
    pub directory_listings: BTreeMap<String, DirectoryListing>,
    /// Path of the file the host had open, once read
    pub current_file: Option<String>,
    pub recent_writes: BTreeMap<String, WriteRecord>,
    pub stats: OperationStats,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn knows_file(&self, path: &str) -> bool {
        self.known_files.contains_key(path)
    }
}
