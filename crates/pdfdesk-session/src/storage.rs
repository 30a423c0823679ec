//! Temporary file storage
//!
//! Every file the orchestrator writes (uploads and outputs) is allocated
//! through a [`StorageArea`], which scopes names to a user and lets a
//! periodic sweep remove anything past its retention window.

use crate::error::SessionError;
use crate::session::UserId;
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const MAX_FILENAME_CHARS: usize = 100;

/// A file currently held in storage
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub total_files: usize,
    pub total_bytes: u64,
}

pub trait StorageArea: Send + Sync {
    /// Reserve a fresh path for `filename` owned by `user`. The file is not created.
    fn allocate(&self, user: UserId, filename: &str) -> Result<PathBuf, SessionError>;

    /// Remove one file; false if it was already gone or could not be removed
    fn delete(&self, path: &Path) -> bool;

    /// Remove every file owned by `user`, returning how many were removed
    fn delete_user_files(&self, user: UserId) -> usize;

    /// All stored files, oldest first
    fn list_by_age(&self) -> Result<Vec<StoredFile>, SessionError>;

    /// Remove files last modified more than `max_age` ago
    fn sweep(&self, max_age: Duration) -> usize {
        let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
            return 0;
        };
        self.sweep_older_than(cutoff)
    }

    /// Remove files last modified before `cutoff`
    fn sweep_older_than(&self, cutoff: SystemTime) -> usize {
        let files = match self.list_by_age() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Cannot list storage for sweep");
                return 0;
            }
        };

        let removed = files
            .iter()
            .take_while(|file| file.modified < cutoff)
            .filter(|file| self.delete(&file.path))
            .count();

        if removed > 0 {
            info!(removed, "Swept expired files");
        }
        removed
    }

    fn usage(&self) -> StorageUsage {
        self.list_by_age()
            .map(|files| StorageUsage {
                total_files: files.len(),
                total_bytes: files.iter().map(|f| f.size).sum(),
            })
            .unwrap_or_default()
    }
}

/// Storage in a single flat directory, files named `user_<id>_<millis>_<name>`
#[derive(Debug)]
pub struct DiskStorage {
    root: PathBuf,
    last_stamp: AtomicI64,
}

impl DiskStorage {
    /// Use `root`, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            SessionError::Storage(format!("Cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root,
            last_stamp: AtomicI64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Millisecond timestamp, strictly increasing across calls so names never collide
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or(now);
        now.max(previous + 1)
    }

    fn is_managed(&self, path: &Path) -> bool {
        path.parent() == Some(self.root.as_path())
    }
}

impl StorageArea for DiskStorage {
    fn allocate(&self, user: UserId, filename: &str) -> Result<PathBuf, SessionError> {
        let name = format!(
            "user_{}_{}_{}",
            user,
            self.next_stamp(),
            sanitize_filename(filename)
        );
        let path = self.root.join(name);
        debug!(path = %path.display(), "Allocated storage path");
        Ok(path)
    }

    fn delete(&self, path: &Path) -> bool {
        if !self.is_managed(path) {
            warn!(path = %path.display(), "Refusing to delete file outside storage");
            return false;
        }
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove file");
                false
            }
        }
    }

    fn delete_user_files(&self, user: UserId) -> usize {
        let prefix = format!("user_{}_", user);
        let Ok(entries) = fs::read_dir(&self.root) else {
            return 0;
        };

        let removed = entries
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| self.delete(&entry.path()))
            .count();

        if removed > 0 {
            info!(user, removed, "Removed user files");
        }
        removed
    }

    fn list_by_age(&self) -> Result<Vec<StoredFile>, SessionError> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            SessionError::Storage(format!("Cannot read {}: {}", self.root.display(), e))
        })?;

        let mut files: Vec<StoredFile> = entries
            .flatten()
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                if !metadata.is_file() {
                    return None;
                }
                Some(StoredFile {
                    path: entry.path(),
                    modified: metadata.modified().ok()?,
                    size: metadata.len(),
                })
            })
            .collect();

        files.sort_by_key(|file| file.modified);
        Ok(files)
    }
}

/// Make a user-supplied file name safe to embed in a storage path
///
/// Path separators and shell-hostile characters become `_`, and long names
/// are cut to 100 characters keeping the extension.
pub fn sanitize_filename(filename: &str) -> String {
    let mut safe = filename.replace("..", "_");
    safe = safe
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if safe.trim().is_empty() {
        return "file".to_string();
    }

    if safe.chars().count() > MAX_FILENAME_CHARS {
        let (stem, ext) = match safe.rfind('.') {
            Some(dot) if dot > 0 && safe.len() - dot <= 10 => safe.split_at(dot),
            _ => (safe.as_str(), ""),
        };
        let keep = MAX_FILENAME_CHARS.saturating_sub(ext.chars().count());
        safe = stem.chars().take(keep).chain(ext.chars()).collect();
    }
    safe
}

fn extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_pdf_file(filename: &str) -> bool {
    extension(filename) == "pdf"
}

pub fn is_image_file(filename: &str) -> bool {
    matches!(
        extension(filename).as_str(),
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tiff" | "tif" | "webp"
    )
}

/// Human-readable size: "0B", "512.0B", "1.5KB", "2.0MB"
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }

    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", size, UNITS[unit])
}
