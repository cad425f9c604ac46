//! Plain files as formatter documents.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tidyhost_core::{DocumentHost, TextEncoding};
use tracing::debug;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Detects the encoding from a byte order mark. Files without one are UTF-8.
fn detect_encoding(bytes: &[u8]) -> (TextEncoding, &'static [u8]) {
    if bytes.starts_with(UTF8_BOM) {
        (TextEncoding::Utf8, UTF8_BOM)
    } else if bytes.starts_with(UTF16_LE_BOM) {
        (TextEncoding::Utf16Le, UTF16_LE_BOM)
    } else if bytes.starts_with(UTF16_BE_BOM) {
        (TextEncoding::Utf16Be, UTF16_BE_BOM)
    } else {
        (TextEncoding::Utf8, &[])
    }
}

/// A file on disk. Saving keeps its encoding and byte order mark.
#[derive(Debug)]
pub struct FileDocument {
    path: PathBuf,
    encoding: TextEncoding,
    bom: &'static [u8],
    /// Report changes without writing them.
    dry_run: bool,
}

impl FileDocument {
    pub async fn open(path: impl Into<PathBuf>, dry_run: bool) -> Result<Self> {
        let path = path.into();
        let path = std::path::absolute(&path)
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let (encoding, bom) = detect_encoding(&bytes);

        Ok(Self {
            path,
            encoding,
            bom,
            dry_run,
        })
    }
}

#[async_trait]
impl DocumentHost for FileDocument {
    fn path(&self) -> &Path {
        &self.path
    }

    fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    async fn snapshot(&self) -> Result<String> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let body = bytes.strip_prefix(self.bom).unwrap_or(&bytes);
        Ok(self.encoding.decode(body))
    }

    async fn apply_and_save(&self, new_text: String) -> Result<()> {
        if self.dry_run {
            debug!(path = %self.path.display(), "Dry run, not writing");
            return Ok(());
        }

        let mut bytes = self.bom.to_vec();
        bytes.extend(self.encoding.encode(&new_text));
        tokio::fs::write(&self.path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}
