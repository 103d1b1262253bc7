// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Content hashing
//!
//! Uses BLAKE3 for change detection on planned writes and file sets.

use blake3::Hasher;

use crate::package::PackageFile;

/// Incremental content hasher
pub struct ContentHasher {
    hasher: Hasher,
}

impl ContentHasher {
    /// Create a new content hasher
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    /// Hash one package file (path and content)
    pub fn hash_file(&mut self, file: &PackageFile) {
        self.hasher.update(file.path.as_bytes());
        self.hasher.update(&[0]);
        self.hasher.update(file.content.as_bytes());
        self.hasher.update(&[0]);
    }

    /// Digest of a file set, independent of input order
    pub fn hash_files(files: &[PackageFile]) -> String {
        let mut sorted: Vec<&PackageFile> = files.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        let mut hasher = Self::new();
        for file in sorted {
            hasher.hash_file(file);
        }
        hasher.finalize()
    }

    /// Hash arbitrary bytes
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finalize and get the hash
    pub fn finalize(self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute a quick hash of a string
pub fn hash_string(s: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(s.as_bytes());
    hasher.finalize().to_hex().to_string()
}
