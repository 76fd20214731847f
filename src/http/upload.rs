//! Multipart upload ingestion.
//!
//! File parts are streamed into the request's scratch directory under their
//! original file name, suffixed `-1`, `-2`, ... when that name is taken; text
//! parts are kept as strings. The result is a JSON
//! object that becomes the command's stdin.

use std::io;
use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// An uploaded file stored in the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    pub field_name: String,
    pub filename: String,
    pub encoding: String,
    pub mime_type: String,
    pub path: PathBuf,
}

/// Errors from [`ingest`].
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("too many files (limit {limit})")]
    TooManyFiles { limit: usize },

    #[error("request body too large: {0}")]
    TooLarge(String),

    #[error("invalid multipart body: {0}")]
    Parse(String),

    #[error("invalid upload file name `{0}`")]
    FileName(String),

    #[error("failed to store upload: {0}")]
    Io(#[from] io::Error),
}

impl From<MultipartError> for UploadError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge(e.body_text())
        } else {
            UploadError::Parse(e.body_text())
        }
    }
}

/// Read every part of `multipart`, storing files under `tmp_dir`.
///
/// When more than `max_files` files arrive, the rest of the body is drained
/// and [`UploadError::TooManyFiles`] is returned.
pub async fn ingest(
    mut multipart: Multipart,
    tmp_dir: &Path,
    max_files: Option<usize>,
) -> Result<Map<String, Value>, UploadError> {
    let mut fields = Map::new();
    let mut file_count = 0usize;
    let mut over_limit = false;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        let Some(filename) = field.file_name().map(str::to_string) else {
            if over_limit {
                drain(&mut field).await?;
                continue;
            }
            let text = field.text().await?;
            accumulate(&mut fields, name, Value::String(text));
            continue;
        };

        if filename.is_empty() {
            // A file input submitted with nothing selected.
            drain(&mut field).await?;
            continue;
        }

        file_count += 1;
        if let Some(limit) = max_files {
            if file_count > limit {
                if !over_limit {
                    tracing::warn!(limit, "Upload file limit exceeded, draining request");
                }
                over_limit = true;
            }
        }
        if over_limit {
            drain(&mut field).await?;
            continue;
        }

        let upload = store(&mut field, name.clone(), &filename, tmp_dir).await?;
        tracing::info!(
            field = %upload.field_name,
            path = %upload.path.display(),
            "Stored upload"
        );
        let value = serde_json::to_value(&upload).map_err(io::Error::other)?;
        accumulate(&mut fields, name, value);
    }

    match (over_limit, max_files) {
        (true, Some(limit)) => Err(UploadError::TooManyFiles { limit }),
        _ => Ok(fields),
    }
}

async fn store(
    field: &mut Field<'_>,
    field_name: String,
    filename: &str,
    tmp_dir: &Path,
) -> Result<FileUpload, UploadError> {
    let base = safe_file_name(filename)?;
    let encoding = field
        .headers()
        .get("content-transfer-encoding")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("7bit")
        .to_string();
    let mime_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    let (path, mut file) = create_unique(tmp_dir, base).await?;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    Ok(FileUpload {
        field_name,
        filename: filename.to_string(),
        encoding,
        mime_type,
        path,
    })
}

/// Create `base` in `dir`, or the first free `stem-N.ext` variant of it.
async fn create_unique(dir: &Path, base: &str) -> io::Result<(PathBuf, tokio::fs::File)> {
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (base, None),
    };
    let mut attempt = 0usize;
    loop {
        let name = match (attempt, ext) {
            (0, _) => base.to_string(),
            (n, Some(ext)) => format!("{}-{}.{}", stem, n, ext),
            (n, None) => format!("{}-{}", stem, n),
        };
        let path = dir.join(name);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

async fn drain(field: &mut Field<'_>) -> Result<(), UploadError> {
    while field.chunk().await?.is_some() {}
    Ok(())
}

/// Final path component of a client-supplied file name.
fn safe_file_name(filename: &str) -> Result<&str, UploadError> {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    if base.is_empty() || base == "." || base == ".." {
        return Err(UploadError::FileName(filename.to_string()));
    }
    Ok(base)
}

/// Store `value` under `name`; a repeated name turns into an ordered list.
fn accumulate(fields: &mut Map<String, Value>, name: String, value: Value) {
    match fields.get_mut(&name) {
        None => {
            fields.insert(name, value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}
