use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use mfdp_core::DataCategory;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

pub const ALLOWED_UPLOAD_EXTENSIONS: &[&str] = &["xlsx", "xls"];

#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub content_hash: String,
    pub path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Content-addressed staging area for uploaded workbooks.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Lowercased extension of `file_name` if it is an accepted workbook type.
    pub fn accepted_extension(file_name: &str) -> Option<String> {
        let ext = Path::new(file_name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        ALLOWED_UPLOAD_EXTENSIONS
            .contains(&ext.as_str())
            .then_some(ext)
    }

    /// Writes `bytes` under `<root>/<category>/<sha256>.<ext>` via temp file and rename.
    pub async fn stage(
        &self,
        category: DataCategory,
        file_name: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StagedUpload> {
        let Some(ext) = Self::accepted_extension(file_name) else {
            bail!("unsupported upload type for {file_name}");
        };
        let content_hash = Self::sha256_hex(bytes);
        let dir = self.root.join(category.as_str());
        let path = dir.join(format!("{content_hash}.{ext}"));

        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating upload directory {}", dir.display()))?;

        if fs::try_exists(&path)
            .await
            .with_context(|| format!("checking upload path {}", path.display()))?
        {
            debug!(path = %path.display(), "identical upload already staged");
            return Ok(StagedUpload {
                content_hash,
                path,
                byte_size: bytes.len(),
                deduplicated: true,
            });
        }

        let temp_path = dir.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp upload {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp upload {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp upload {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!("renaming {} -> {}", temp_path.display(), path.display())
            });
        }
        Ok(StagedUpload {
            content_hash,
            path,
            byte_size: bytes.len(),
            deduplicated: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_workbook_extensions_are_accepted() {
        assert_eq!(UploadStore::accepted_extension("nav.XLSX").as_deref(), Some("xlsx"));
        assert_eq!(UploadStore::accepted_extension("old.xls").as_deref(), Some("xls"));
        assert_eq!(UploadStore::accepted_extension("nav.csv"), None);
        assert_eq!(UploadStore::accepted_extension("noext"), None);
    }

    #[tokio::test]
    async fn identical_uploads_deduplicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        let first = store.stage(DataCategory::Nav, "a.xlsx", b"workbook").await.unwrap();
        assert!(!first.deduplicated);
        assert!(first.path.starts_with(dir.path().join("nav")));
        assert_eq!(std::fs::read(&first.path).unwrap(), b"workbook");

        let second = store.stage(DataCategory::Nav, "b.xlsx", b"workbook").await.unwrap();
        assert!(second.deduplicated);
        assert_eq!(first.path, second.path);
    }

    #[tokio::test]
    async fn rejects_non_workbook_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        assert!(store.stage(DataCategory::Returns, "r.txt", b"x").await.is_err());
    }
}
