//! Bootstrap script handling.
//!
//! The script is read once, before any control-plane call, and passed to
//! `RunInstances` as base64-encoded user data.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::path::{Path, PathBuf};

/// EC2 rejects user data larger than 16 KiB (before encoding).
pub const MAX_USER_DATA_BYTES: usize = 16 * 1024;

/// A startup script destined for instance user data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapScript {
    path: PathBuf,
    content: String,
}

impl BootstrapScript {
    /// Read and validate the script at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::BootstrapRead {
            path: path.to_path_buf(),
            source,
        })?;

        let script = Self::from_content(path, content)?;
        tracing::debug!(
            path = %path.display(),
            bytes = script.len(),
            "Loaded bootstrap script"
        );
        Ok(script)
    }

    /// Validate script content that did not come from disk.
    pub fn from_content(path: impl Into<PathBuf>, content: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let content = content.into();

        if content.trim().is_empty() {
            return Err(Error::BootstrapInvalid {
                path,
                message: "script is empty".to_string(),
            });
        }

        if content.len() > MAX_USER_DATA_BYTES {
            return Err(Error::BootstrapInvalid {
                path,
                message: format!(
                    "script is {} bytes, user data is limited to {} bytes",
                    content.len(),
                    MAX_USER_DATA_BYTES
                ),
            });
        }

        Ok(Self { path, content })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Raw size in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// The script encoded for the `UserData` field.
    pub fn user_data(&self) -> String {
        STANDARD.encode(self.content.as_bytes())
    }
}
