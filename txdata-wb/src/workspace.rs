//! Per-user, per-project file cache
//!
//! Layout: `<base>/<user_id>/<project_code>/<file>`. Every saved file gets a
//! hidden `.<file>.sha256` sidecar holding its SHA-256; reads verify it.
//! Writes go to a temporary file in the same directory and are renamed into
//! place.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use txdata_common::frame::decode_text;
use txdata_common::{Error, Result};

const MAX_FILENAME_LEN: usize = 255;

/// A file listed in a project workspace
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkspaceFile {
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    base: PathBuf,
}

/// Hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reject names that could escape the project directory
pub fn validate_filename(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(Error::InvalidInput(format!(
            "Invalid file name '{}': {}",
            name, reason
        )))
    };

    if name.is_empty() {
        return invalid("empty");
    }
    if name.len() > MAX_FILENAME_LEN {
        return invalid("too long");
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return invalid("path separators are not allowed");
    }
    if name.starts_with('.') {
        return invalid("hidden names are not allowed");
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => invalid("not a plain file name"),
    }
}

fn sidecar_name(name: &str) -> String {
    format!(".{}.sha256", name)
}

impl Workspace {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn user_dir(&self, user_id: i64) -> PathBuf {
        self.base.join(user_id.to_string())
    }

    pub fn project_dir(&self, user_id: i64, project_code: &str) -> Result<PathBuf> {
        validate_filename(project_code)?;
        Ok(self.user_dir(user_id).join(project_code))
    }

    /// Absolute path of a file inside a project workspace
    pub fn file_path(&self, user_id: i64, project_code: &str, name: &str) -> Result<PathBuf> {
        validate_filename(name)?;
        let dir = self.project_dir(user_id, project_code)?;
        let path = dir.join(name);
        if !path.starts_with(&dir) {
            return Err(Error::InvalidInput(format!("Invalid file name '{}'", name)));
        }
        Ok(path)
    }

    /// Atomically store a file and its checksum; returns the hex SHA-256
    pub async fn save_file(
        &self,
        user_id: i64,
        project_code: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let path = self.file_path(user_id, project_code, name)?;
        let dir = self.project_dir(user_id, project_code)?;
        tokio::fs::create_dir_all(&dir).await?;

        let checksum = sha256_hex(bytes);
        let sidecar = dir.join(sidecar_name(name));
        let tag = uuid::Uuid::new_v4().simple();
        let tmp = dir.join(format!(".{}.{}.tmp", name, tag));
        let tmp_sidecar = dir.join(format!(".{}.sha256.{}.tmp", name, tag));

        // A file without a sidecar reads unverified; a stale sidecar would
        // make it unreadable, so the old one goes before the data is swapped.
        let swapped = async {
            tokio::fs::write(&tmp, bytes).await?;
            tokio::fs::write(&tmp_sidecar, &checksum).await?;
            remove_file_if_present(&sidecar).await?;
            tokio::fs::rename(&tmp, &path).await?;
            tokio::fs::rename(&tmp_sidecar, &sidecar).await?;
            Ok::<(), Error>(())
        }
        .await;
        if let Err(e) = swapped {
            for leftover in [&tmp, &tmp_sidecar] {
                if let Err(cleanup) = remove_file_if_present(leftover).await {
                    warn!(file = name, "Failed to remove temporary file: {}", cleanup);
                }
            }
            return Err(e);
        }

        debug!(
            user_id,
            project = project_code,
            file = name,
            bytes = bytes.len(),
            "Saved workspace file"
        );
        Ok(checksum)
    }

    /// Raw bytes of a file, `None` when absent
    ///
    /// Fails with `Error::Integrity` when the checksum sidecar disagrees.
    pub async fn get_bytes(&self, user_id: i64, project_code: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.file_path(user_id, project_code, name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let sidecar = self.project_dir(user_id, project_code)?.join(sidecar_name(name));
        match tokio::fs::read_to_string(&sidecar).await {
            Ok(expected) => {
                let actual = sha256_hex(&bytes);
                if expected.trim() != actual {
                    warn!(user_id, project = project_code, file = name, "Checksum mismatch");
                    return Err(Error::Integrity(format!(
                        "File '{}' failed checksum verification",
                        name
                    )));
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Some(bytes))
    }

    /// File decoded as text (UTF-8, falling back to Latin-1), `None` when absent
    pub async fn get_file(&self, user_id: i64, project_code: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .get_bytes(user_id, project_code, name)
            .await?
            .map(|bytes| decode_text(&bytes)))
    }

    /// File text or `NotFound` with the given message
    pub async fn require_file(
        &self,
        user_id: i64,
        project_code: &str,
        name: &str,
        missing_message: impl FnOnce() -> String,
    ) -> Result<String> {
        self.get_file(user_id, project_code, name)
            .await?
            .ok_or_else(|| Error::NotFound(missing_message()))
    }

    pub async fn exists(&self, user_id: i64, project_code: &str, name: &str) -> Result<bool> {
        let path = self.file_path(user_id, project_code, name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Delete a file and its sidecar; true when the file existed
    pub async fn delete_file(&self, user_id: i64, project_code: &str, name: &str) -> Result<bool> {
        let path = self.file_path(user_id, project_code, name)?;
        let sidecar = self.project_dir(user_id, project_code)?.join(sidecar_name(name));
        remove_file_if_present(&sidecar).await?;
        remove_file_if_present(&path).await
    }

    /// Visible files of a project, sorted by name
    pub async fn list_files(&self, user_id: i64, project_code: &str) -> Result<Vec<WorkspaceFile>> {
        let dir = self.project_dir(user_id, project_code)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata().await?;
            if meta.is_file() {
                files.push(WorkspaceFile {
                    name,
                    size_bytes: meta.len(),
                });
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Remove a project's whole directory
    pub async fn clear_project(&self, user_id: i64, project_code: &str) -> Result<()> {
        let dir = self.project_dir(user_id, project_code)?;
        remove_dir_if_present(&dir).await?;
        info!(user_id, project = project_code, "Cleared project workspace");
        Ok(())
    }

    /// Remove everything a user has cached (logout)
    pub async fn cleanup_user_session(&self, user_id: i64) -> Result<()> {
        remove_dir_if_present(&self.user_dir(user_id)).await?;
        info!(user_id, "Cleaned up user workspace");
        Ok(())
    }

    /// Remove every user's workspace
    pub async fn clear_all(&self) -> Result<()> {
        remove_dir_if_present(&self.base).await?;
        tokio::fs::create_dir_all(&self.base).await?;
        Ok(())
    }
}

/// True when the file existed
async fn remove_file_if_present(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
