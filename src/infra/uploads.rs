//! Staging of multipart uploads on local disk.

use std::path::PathBuf;

use axum::extract::multipart::{Field, MultipartError};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};

use crate::application::frame::UploadedFile;

#[derive(Debug, Error)]
pub enum UploadStagingError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("uploaded file stream failed")]
    Stream(#[source] MultipartError),
    #[error("uploaded file is empty")]
    Empty,
}

/// Writes upload fields to temporary files that are removed once the
/// resulting [`UploadedFile`] is dropped.
#[derive(Debug, Clone)]
pub struct UploadStaging {
    directory: Option<PathBuf>,
    max_bytes: u64,
}

impl UploadStaging {
    pub fn new(directory: Option<PathBuf>, max_bytes: u64) -> Self {
        Self {
            directory,
            max_bytes,
        }
    }

    pub async fn stage_field(
        &self,
        mut field: Field<'_>,
    ) -> Result<UploadedFile, UploadStagingError> {
        let name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload".to_string());

        let temp = match &self.directory {
            Some(dir) => {
                fs::create_dir_all(dir).await?;
                tempfile::NamedTempFile::new_in(dir)?
            }
            None => tempfile::NamedTempFile::new()?,
        };
        let (std_file, temp_path) = temp.into_parts();
        let mut file = fs::File::from_std(std_file);
        let mut total: u64 = 0;

        while let Some(chunk) = field.chunk().await.map_err(UploadStagingError::Stream)? {
            total = total.saturating_add(chunk.len() as u64);
            if total > self.max_bytes {
                return Err(UploadStagingError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if total == 0 {
            return Err(UploadStagingError::Empty);
        }

        Ok(UploadedFile::staged(temp_path, name))
    }
}
