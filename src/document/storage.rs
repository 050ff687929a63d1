use super::DocumentError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Upload persisted under the data directory.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Sanitised file name the upload was written under.
    pub file_name: String,
    /// Full path of the written file.
    pub path: PathBuf,
    /// Hex-encoded SHA-256 of the uploaded bytes.
    pub sha256: String,
    /// Size of the upload in bytes.
    pub size_bytes: usize,
}

/// Reduce a client-supplied file name to its final path component.
///
/// Both `/` and `\` count as separators; names that reduce to nothing, `.` or `..` are
/// rejected.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let candidate = raw
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .unwrap_or_default();
    match candidate {
        "" | "." | ".." => None,
        name if name.chars().any(char::is_control) => None,
        name => Some(name.to_string()),
    }
}

/// Write `bytes` to `<data_dir>/<file_name>`, creating the directory when needed.
///
/// An existing file with the same name is overwritten.
pub async fn store_upload(
    data_dir: &Path,
    file_name: &str,
    bytes: &[u8],
) -> Result<StoredUpload, DocumentError> {
    let file_name = sanitize_file_name(file_name)
        .ok_or_else(|| DocumentError::InvalidFileName(file_name.to_string()))?;

    tokio::fs::create_dir_all(data_dir)
        .await
        .map_err(|source| DocumentError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;

    let path = data_dir.join(&file_name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|source| DocumentError::Io {
            path: path.clone(),
            source,
        })?;

    let sha256 = hex::encode(Sha256::digest(bytes));
    tracing::debug!(path = %path.display(), size = bytes.len(), sha256 = %sha256, "Stored upload");

    Ok(StoredUpload {
        file_name,
        path,
        sha256,
        size_bytes: bytes.len(),
    })
}
