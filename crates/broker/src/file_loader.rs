// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path-validated, sandboxed reading of bootstrap context files under a
//! per-agent working directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ErrorCode};

/// A single loaded (or load-attempted) file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedFile {
    pub path: String,
    pub content: String,
    pub size: usize,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reads files relative to `root`, a per-instance working directory.
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reject any path containing `..`, any absolute path, and any path
    /// containing a NUL byte. Returns the normalized relative path.
    pub fn validate_path(path: &str) -> Result<String, CoreError> {
        if path.as_bytes().contains(&0) {
            return Err(CoreError::new(ErrorCode::Validation, "path contains a NUL byte"));
        }
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return Err(CoreError::new(ErrorCode::Validation, "absolute paths are not allowed"));
        }
        if candidate.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(CoreError::new(ErrorCode::Validation, "path traversal ('..') is not allowed"));
        }
        Ok(path.to_owned())
    }

    /// Load one file. Validation failures are re-raised as a distinct error
    /// kind (a security boundary violation) and never swallowed; a missing
    /// file or a permission/read error is instead returned as an unloaded
    /// [`LoadedFile`], since presence is often optional.
    pub fn load_file(&self, path: &str) -> Result<LoadedFile, CoreError> {
        let validated = Self::validate_path(path)?;
        let full = self.root.join(&validated);
        match std::fs::read_to_string(&full) {
            Ok(content) => {
                let size = content.len();
                Ok(LoadedFile { path: validated, content, size, loaded: true, error: None })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LoadedFile {
                path: validated,
                content: String::new(),
                size: 0,
                loaded: false,
                error: Some("File not found".to_owned()),
            }),
            Err(e) => Ok(LoadedFile {
                path: validated,
                content: String::new(),
                size: 0,
                loaded: false,
                error: Some(e.to_string()),
            }),
        }
    }

    /// Load every path in order, discarding entries that did not load.
    /// Validation failures still propagate — they are not "not loaded".
    pub fn load_auto_files(&self, paths: &[String]) -> Result<Vec<LoadedFile>, CoreError> {
        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            let file = self.load_file(path)?;
            if file.loaded {
                loaded.push(file);
            }
        }
        Ok(loaded)
    }
}

#[cfg(test)]
#[path = "file_loader_tests.rs"]
mod tests;
