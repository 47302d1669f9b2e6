// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Weight acquisition.

use crate::{persist, ConvertError};
use std::path::{Path, PathBuf};
use url::Url;

/// Where a checkpoint comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightSource {
    /// A file already on disk.
    Local(PathBuf),
    /// A file downloaded over HTTP(S) into `dest`.
    Remote { url: Url, dest: PathBuf },
}

impl WeightSource {
    /// Parses `url` for a remote source.
    ///
    /// # Errors
    /// [`ConvertError::Config`] for unparsable or non-HTTP(S) URLs.
    pub fn remote(url: &str, dest: impl Into<PathBuf>) -> Result<Self, ConvertError> {
        let url = Url::parse(url).map_err(|e| ConvertError::Config(format!("invalid URL '{url}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConvertError::Config(format!(
                "unsupported URL scheme '{}' in '{url}'",
                url.scheme()
            )));
        }
        Ok(Self::Remote {
            url,
            dest: dest.into(),
        })
    }

    /// A remote source stored under `dir` with the URL's file name.
    pub fn remote_into(url: &str, dir: &Path) -> Result<Self, ConvertError> {
        let parsed = Url::parse(url).map_err(|e| ConvertError::Config(format!("invalid URL '{url}': {e}")))?;
        let file = file_name_from_url(&parsed).ok_or_else(|| {
            ConvertError::Config(format!("URL '{url}' does not end in a file name"))
        })?;
        Self::remote(url, dir.join(file))
    }

    /// Local path the weights end up at.
    pub fn path(&self) -> &Path {
        match self {
            Self::Local(path) => path,
            Self::Remote { dest, .. } => dest,
        }
    }

    /// Makes the weights available locally and returns their path.
    ///
    /// Remote sources whose destination already exists are not downloaded
    /// again. Downloads go through [`persist::write_atomic_with`], so an
    /// interrupted transfer never leaves a partial file behind.
    ///
    /// # Errors
    /// [`ConvertError::Io`] for missing local files and failed transfers.
    pub fn fetch(&self) -> Result<PathBuf, ConvertError> {
        match self {
            Self::Local(path) => {
                if !path.is_file() {
                    return Err(ConvertError::io(
                        path,
                        std::io::Error::new(std::io::ErrorKind::NotFound, "weights file not found"),
                    ));
                }
                Ok(path.clone())
            }
            Self::Remote { url, dest } => {
                if dest.is_file() {
                    tracing::info!(path = %dest.display(), "weights already present, skipping download");
                    return Ok(dest.clone());
                }
                tracing::info!(%url, path = %dest.display(), "downloading weights");
                let mut response = ureq::get(url.as_str())
                    .call()
                    .map_err(|e| ConvertError::io(dest, std::io::Error::other(e.to_string())))?;
                let mut written = 0u64;
                persist::write_atomic_with(dest, |file| {
                    written = std::io::copy(&mut response.body_mut().as_reader(), file)?;
                    Ok(())
                })?;
                tracing::info!(path = %dest.display(), bytes = written, "downloaded weights");
                Ok(dest.clone())
            }
        }
    }
}

fn file_name_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.safetensors");
        std::fs::write(&path, b"x").unwrap();
        let src = WeightSource::Local(path.clone());
        assert_eq!(src.fetch().unwrap(), path);
    }

    #[test]
    fn test_local_missing() {
        let src = WeightSource::Local("/nonexistent/w.safetensors".into());
        assert!(matches!(src.fetch(), Err(ConvertError::Io { .. })));
    }

    #[test]
    fn test_remote_skips_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("resnet18.safetensors");
        std::fs::write(&dest, b"cached").unwrap();
        // Unroutable host; the existing file means no request is made.
        let src = WeightSource::remote("http://invalid.invalid/resnet18.safetensors", &dest).unwrap();
        assert_eq!(src.fetch().unwrap(), dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"cached");
    }

    #[test]
    fn test_remote_into_uses_url_file_name() {
        let src = WeightSource::remote_into(
            "https://example.com/models/content/model.safetensors?rev=2",
            Path::new("models/content"),
        )
        .unwrap();
        assert_eq!(src.path(), Path::new("models/content/model.safetensors"));
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(matches!(
            WeightSource::remote("not a url", "x"),
            Err(ConvertError::Config(_))
        ));
        assert!(WeightSource::remote("ftp://example.com/w.bin", "x").is_err());
        assert!(WeightSource::remote_into("https://example.com/", Path::new(".")).is_err());
    }
}
