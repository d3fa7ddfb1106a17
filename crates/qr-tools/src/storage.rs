//! Filesystem report store.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use qr_core::{run_blocking, Error, ReportStore};

/// Longest file stem written as-is. Longer keys are shortened and suffixed
/// with a digest of the full key.
const MAX_STEM_LEN: usize = 200;

/// Stores each report as `<encoded key>.md` under a single directory.
pub struct FsReportStore {
    dir: PathBuf,
}

impl FsReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path that `key` is stored at.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.md", file_stem(key)))
    }
}

/// Encode `key` into a file-name-safe stem.
///
/// Distinct keys map to distinct stems, except in the astronomically
/// unlikely case of a truncated digest collision.
fn file_stem(key: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
    if encoded.len() <= MAX_STEM_LEN {
        return encoded;
    }

    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    // percent-encoded output is ASCII, so any byte index is a char boundary
    format!("{}-{}", &encoded[..MAX_STEM_LEN - 17], &digest[..16])
}

/// Write `body` to a fresh temp file in `dir`, then rename it over `path`.
///
/// Each call gets its own temp file, so concurrent writers of one key never
/// share a partial file; the last rename wins.
fn replace_file(dir: &Path, path: &Path, body: &[u8]) -> Result<(), Error> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        Error::storage(format!(
            "Failed to create temp file in '{}': {}",
            dir.display(),
            e
        ))
    })?;
    tmp.write_all(body)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| Error::storage(format!("Failed to write '{}': {}", tmp.path().display(), e)))?;
    tmp.persist(path)
        .map_err(|e| Error::storage(format!("Failed to move report into place: {}", e)))?;
    Ok(())
}

#[async_trait]
impl ReportStore for FsReportStore {
    async fn write(&self, key: &str, body: &str) -> Result<String, Error> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::storage(format!(
                "Failed to create report directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.path_for(key);
        let dir = self.dir.clone();
        let target = path.clone();
        let bytes = body.as_bytes().to_vec();
        run_blocking(move || replace_file(&dir, &target, &bytes)).await??;

        debug!(path = %path.display(), bytes = body.len(), "Report written");
        Ok(path.display().to_string())
    }
}
