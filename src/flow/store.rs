// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! File stores the executor reads from and writes to
//!
//! Paths handed to a store are always relative and `/`-separated.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;

use crate::errors::{FlowError, FlowResult};
use crate::package::{normalize_path, PackageFile};

/// Directories never walked
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

/// Trait for file store implementations
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Human-readable location, for messages
    fn describe(&self) -> String;

    /// Every file path in the store, sorted
    async fn list(&self) -> FlowResult<Vec<String>>;

    /// Read a file, `None` when it does not exist
    async fn read(&self, path: &str) -> FlowResult<Option<String>>;

    /// Whether a file or directory exists
    async fn exists(&self, path: &str) -> FlowResult<bool>;

    /// Write every file or none of them
    async fn write_batch(&self, writes: &[(String, String)]) -> FlowResult<()>;
}

/// Store rooted at a directory on disk
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a relative path, refusing anything that escapes the root
    fn resolve(&self, path: &str) -> FlowResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(FlowError::FileReadError {
                path: relative.to_path_buf(),
                error: "path must stay inside the store root".into(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn staging_path(target: &Path) -> PathBuf {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        target.with_file_name(format!(".{}.opkg-tmp", name))
    }
}

#[async_trait]
impl FileStore for DiskStore {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn list(&self) -> FlowResult<Vec<String>> {
        let discovery = |e: std::io::Error| FlowError::Discovery {
            root: self.root.clone(),
            error: e.to_string(),
        };

        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(discovery)?;
            while let Some(entry) = entries.next_entry().await.map_err(discovery)? {
                let file_type = entry.file_type().await.map_err(discovery)?;
                let path = entry.path();

                if file_type.is_dir() {
                    let name = entry.file_name();
                    if !SKIPPED_DIRS.iter().any(|s| name == *s) {
                        pending.push(path);
                    }
                } else if file_type.is_file() {
                    if let Ok(relative) = path.strip_prefix(&self.root) {
                        files.push(normalize_path(&relative.to_string_lossy()));
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }

    async fn read(&self, path: &str) -> FlowResult<Option<String>> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FlowError::FileReadError {
                path: full,
                error: e.to_string(),
            }),
        }
    }

    async fn exists(&self, path: &str) -> FlowResult<bool> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await.unwrap_or(false))
    }

    async fn write_batch(&self, writes: &[(String, String)]) -> FlowResult<()> {
        let write_error = |path: &Path, e: std::io::Error| FlowError::FileWriteError {
            path: path.to_path_buf(),
            error: e.to_string(),
        };

        // Stage everything first so a failure leaves no target touched
        let mut staged: Vec<StagedWrite> = Vec::with_capacity(writes.len());
        for (path, content) in writes {
            let target = self.resolve(path)?;
            let staging = Self::staging_path(&target);

            let result: std::io::Result<Option<Vec<u8>>> = async {
                let previous = match tokio::fs::read(&target).await {
                    Ok(bytes) => Some(bytes),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                    Err(e) => return Err(e),
                };
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&staging, content).await?;
                Ok(previous)
            }
            .await;

            match result {
                Ok(previous) => staged.push(StagedWrite {
                    target,
                    staging,
                    previous,
                }),
                Err(e) => {
                    discard(&staged).await;
                    return Err(write_error(&target, e));
                }
            }
        }

        commit(&staged).await.map_err(|(index, e)| write_error(&staged[index].target, e))?;

        tracing::debug!("Wrote {} file(s) under {}", staged.len(), self.root.display());
        Ok(())
    }
}

/// A staged file and what its target held before the batch
struct StagedWrite {
    target: PathBuf,
    staging: PathBuf,
    previous: Option<Vec<u8>>,
}

/// Move staged files into place
///
/// On failure the staging files left over are removed and every target
/// already replaced gets its previous content back. The error carries the
/// index of the write that failed.
async fn commit(staged: &[StagedWrite]) -> Result<(), (usize, std::io::Error)> {
    for (index, write) in staged.iter().enumerate() {
        if let Err(e) = tokio::fs::rename(&write.staging, &write.target).await {
            discard(&staged[index..]).await;
            restore(&staged[..index]).await;
            return Err((index, e));
        }
    }
    Ok(())
}

async fn discard(staged: &[StagedWrite]) {
    for write in staged {
        let _ = tokio::fs::remove_file(&write.staging).await;
    }
}

async fn restore(committed: &[StagedWrite]) {
    for write in committed {
        let result = match &write.previous {
            Some(bytes) => tokio::fs::write(&write.target, bytes).await,
            None => tokio::fs::remove_file(&write.target).await,
        };
        if let Err(e) = result {
            tracing::warn!("Could not roll back {}: {}", write.target.display(), e);
        }
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    files: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding the given package files
    pub fn from_files(files: &[PackageFile]) -> Self {
        let map = files
            .iter()
            .map(|f| (f.path.clone(), f.content.clone()))
            .collect();
        Self {
            files: RwLock::new(map),
        }
    }

    pub async fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files
            .write()
            .await
            .insert(normalize_path(&path.into()), content.into());
    }

    pub async fn remove(&self, path: &str) -> Option<String> {
        self.files.write().await.remove(path)
    }

    /// Snapshot as package files, sorted by path
    pub async fn files(&self) -> Vec<PackageFile> {
        self.files
            .read()
            .await
            .iter()
            .map(|(path, content)| PackageFile::new(path.clone(), content.clone()))
            .collect()
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    fn describe(&self) -> String {
        "<memory>".to_string()
    }

    async fn list(&self) -> FlowResult<Vec<String>> {
        Ok(self.files.read().await.keys().cloned().collect())
    }

    async fn read(&self, path: &str) -> FlowResult<Option<String>> {
        Ok(self.files.read().await.get(path).cloned())
    }

    async fn exists(&self, path: &str) -> FlowResult<bool> {
        let path = normalize_path(path);
        let dir = format!("{}/", path.trim_end_matches('/'));
        let files = self.files.read().await;
        Ok(files.contains_key(&path) || files.keys().any(|k| k.starts_with(&dir)))
    }

    async fn write_batch(&self, writes: &[(String, String)]) -> FlowResult<()> {
        let mut files = self.files.write().await;
        for (path, content) in writes {
            files.insert(normalize_path(path), content.clone());
        }
        Ok(())
    }
}
