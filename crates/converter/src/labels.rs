// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Ordered class labels for classifier outputs.

use crate::ConvertError;
use std::path::Path;

/// Class labels, in output-index order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ClassLabels(Vec<String>);

impl ClassLabels {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(labels.into_iter().map(Into::into).collect())
    }

    /// Reads one label per line. Lines are trimmed; blank lines are skipped.
    pub fn from_file(path: &Path) -> Result<Self, ConvertError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
        let labels = Self::parse(&text);
        tracing::debug!(path = %path.display(), count = labels.len(), "read class labels");
        Ok(labels)
    }

    pub fn parse(text: &str) -> Self {
        Self::new(text.lines().map(str::trim).filter(|l| !l.is_empty()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_skips_blank() {
        let labels = ClassLabels::parse("  safe \n\nsuggestive\r\nexplicit\n   \n");
        assert_eq!(labels.len(), 3);
        assert_eq!(
            labels.iter().collect::<Vec<_>>(),
            vec!["safe", "suggestive", "explicit"]
        );
        assert_eq!(labels.get(1), Some("suggestive"));
        assert_eq!(labels.get(3), None);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "cat\ndog\n").unwrap();
        let labels = ClassLabels::from_file(&path).unwrap();
        assert_eq!(labels, ClassLabels::new(["cat", "dog"]));
    }

    #[test]
    fn test_from_missing_file() {
        let err = ClassLabels::from_file(Path::new("/nonexistent/labels.txt")).unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
    }

    #[test]
    fn test_serde_is_plain_list() {
        let labels = ClassLabels::new(["a", "b"]);
        assert_eq!(serde_json::to_string(&labels).unwrap(), r#"["a","b"]"#);
    }
}
