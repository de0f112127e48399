//! Upload staging
//!
//! Streams the multipart `file` field to a temporary file before it is
//! handed to the object store. The staging file lives exactly as long as the
//! [`StagedUpload`] that owns it.

use std::path::Path;

use axum::extract::Multipart;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Name of the multipart field carrying the upload
pub const FILE_FIELD: &str = "file";

/// A multipart upload written to local disk
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    /// File name as sent by the client, used verbatim as the blob name
    pub file_name: String,
    /// Content type of the part, if the client sent one
    pub content_type: Option<String>,
    /// Bytes written to the staging file
    pub size: u64,
}

impl StagedUpload {
    /// Location of the staging file
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Find the `file` field and stream it into `staging_dir`.
///
/// Other fields are skipped. Fails if the request has no `file` field or the
/// field's file name is missing or empty.
pub async fn stage_multipart(multipart: &mut Multipart, staging_dir: &Path) -> Result<StagedUpload> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Upload(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::Upload(format!("field '{}' has no file name", FILE_FIELD)))?;
        let content_type = field.content_type().map(str::to_string);

        let (staging, file) = create_staging_file(staging_dir).await?;
        let mut out = tokio::fs::File::from_std(file);

        let mut size = 0u64;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| Error::Upload(e.body_text()))?
        {
            out.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        out.flush().await?;

        return Ok(StagedUpload {
            file: staging,
            file_name,
            content_type,
            size,
        });
    }

    Err(Error::Upload(format!("no '{}' field in request", FILE_FIELD)))
}

/// Create the temp file and a second handle for writing, off the async runtime
async fn create_staging_file(staging_dir: &Path) -> Result<(NamedTempFile, std::fs::File)> {
    let dir = staging_dir.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(NamedTempFile, std::fs::File)> {
        std::fs::create_dir_all(&dir)?;
        let staging = NamedTempFile::new_in(&dir)?;
        let file = staging.reopen()?;
        Ok((staging, file))
    })
    .await
    .map_err(|e| Error::Internal(format!("spawn_blocking failed: {}", e)))?
}
