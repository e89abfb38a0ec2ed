//! Allowed API keys, loaded once at startup from plain-text key files.
//!
//! One key per line. Surrounding whitespace is trimmed; blank lines and lines
//! starting with `#` are skipped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
#[error("cannot read key file {path}: {source}")]
pub struct KeyFileError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Parse the contents of one key file.
pub fn parse_keys(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

/// Read-only set of keys admitted by the API key gate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedKeys {
    keys: HashSet<String>,
}

impl AllowedKeys {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Union of the keys in every file. Any unreadable file is an error.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, KeyFileError> {
        let mut keys = HashSet::new();
        for path in paths {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path).map_err(|source| KeyFileError {
                path: path.to_path_buf(),
                source,
            })?;
            let parsed = parse_keys(&text);
            info!(file = %path.display(), keys = parsed.len(), "Loaded API key file");
            keys.extend(parsed);
        }
        Ok(Self { keys })
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
