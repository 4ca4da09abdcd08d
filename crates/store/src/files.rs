//! Virtual file manager: the live, in-memory project.
//!
//! Files are keyed by path and kept in insertion order. The entry file, when
//! set, always names a present path.

use chrono::Utc;
use forgeline_core::error::FileError;
use forgeline_core::project::{FileType, ProjectFile};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct VirtualFileManager {
    files: HashMap<String, ProjectFile>,
    order: Vec<String>,
    entry: Option<String>,
}

impl VirtualFileManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a file.
    ///
    /// An existing path keeps its position. Returns `true` when anything
    /// changed; an identical upsert leaves the file (and its timestamp) alone.
    pub fn add_file(
        &mut self,
        path: impl Into<String>,
        content: impl Into<String>,
        file_type: FileType,
    ) -> bool {
        let path = path.into();
        let content = content.into();

        match self.files.get_mut(&path) {
            Some(existing) => {
                if existing.content == content && existing.file_type == file_type {
                    return false;
                }
                existing.content = content;
                existing.file_type = file_type;
                existing.last_modified = Utc::now();
                debug!(path = %path, "File updated");
            }
            None => {
                debug!(path = %path, "File created");
                self.order.push(path.clone());
                self.files
                    .insert(path.clone(), ProjectFile::new(path, content, file_type));
            }
        }
        true
    }

    pub fn get_file(&self, path: &str) -> Option<&ProjectFile> {
        self.files.get(path)
    }

    /// Remove a file. Clears the entry if it pointed at this path.
    pub fn delete_file(&mut self, path: &str) -> bool {
        if self.files.remove(path).is_none() {
            return false;
        }
        self.order.retain(|p| p != path);
        if self.entry.as_deref() == Some(path) {
            self.entry = None;
        }
        true
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Point the entry at an existing file. The previous entry is kept on error.
    pub fn set_entry(&mut self, path: &str) -> Result<(), FileError> {
        if !self.has_file(path) {
            warn!(path, "Refusing to set entry to a file that does not exist");
            return Err(FileError::EntryNotFound(path.to_string()));
        }
        self.entry = Some(path.to_string());
        Ok(())
    }

    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    /// Snapshot of every file in insertion order.
    pub fn all_files(&self) -> Vec<ProjectFile> {
        self.order
            .iter()
            .filter_map(|p| self.files.get(p))
            .cloned()
            .collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.order.clear();
        self.entry = None;
    }

    /// Replace the whole project with a snapshot, keeping the snapshot's
    /// timestamps. An entry that is not part of the snapshot is dropped.
    pub fn replace_all(&mut self, files: Vec<ProjectFile>, entry: Option<&str>) {
        self.clear();
        for file in files {
            if !self.files.contains_key(&file.path) {
                self.order.push(file.path.clone());
            }
            self.files.insert(file.path.clone(), file);
        }
        if let Some(path) = entry {
            // Missing entry is already logged by set_entry
            let _ = self.set_entry(path);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
