// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Persistence writer.
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! destination holds either the previous content or the complete new
//! content, never a partial write.

use crate::ConvertError;
use std::io::Write;
use std::path::{Path, PathBuf};

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp{}", std::process::id()));
    path.with_file_name(name)
}

/// Creates the parent directories of `path` and writes `bytes` to it,
/// replacing any existing file.
///
/// # Errors
/// [`ConvertError::Io`] naming the path that failed. Nothing is retried.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    write_atomic_with(path, |file| file.write_all(bytes))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

/// Like [`write_atomic`], with the content produced by `fill`.
pub fn write_atomic_with<F>(path: &Path, fill: F) -> Result<(), ConvertError>
where
    F: FnOnce(&mut std::fs::File) -> std::io::Result<()>,
{
    if path.file_name().is_none() {
        return Err(ConvertError::Precondition(format!(
            "'{}' does not name a file",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConvertError::io(parent, e))?;
    }

    let tmp = temp_sibling(path);
    let result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        fill(&mut file)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        // Best effort; the original error is what gets reported.
        let _ = std::fs::remove_file(&tmp);
        return Err(ConvertError::io(path, e));
    }
    Ok(())
}
