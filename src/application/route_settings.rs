//! File-backed `routes.yaml` with validation, backups and content hashing.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::application::error::EndpointError;
use crate::domain::routes::{DEFAULT_ROUTES_YAML, validate_routes};

const ROUTES_FILE: &str = "routes.yaml";

#[derive(Debug, Clone)]
pub struct RouteSettings {
    dir: PathBuf,
}

impl RouteSettings {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(ROUTES_FILE)
    }

    /// Current document; the default one is written first when missing.
    pub async fn get(&self) -> Result<String, EndpointError> {
        let path = self.path();
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.dir).await.map_err(io_error)?;
                fs::write(&path, DEFAULT_ROUTES_YAML)
                    .await
                    .map_err(io_error)?;
                Ok(DEFAULT_ROUTES_YAML.to_string())
            }
            Err(err) => Err(io_error(err)),
        }
    }

    /// Validate the document at `candidate`, back up the current file and
    /// replace it.
    pub async fn set_from_file_path(&self, candidate: &Path) -> Result<(), EndpointError> {
        let bytes = fs::read(candidate).await.map_err(io_error)?;
        let contents = String::from_utf8(bytes).map_err(|_| {
            EndpointError::validation("Could not parse routes file: not valid UTF-8")
        })?;
        validate_routes(&contents)?;

        fs::create_dir_all(&self.dir).await.map_err(io_error)?;
        let current = self.path();
        if fs::try_exists(&current).await.map_err(io_error)? {
            let backup = self.dir.join(backup_name(OffsetDateTime::now_utc())?);
            fs::copy(&current, &backup).await.map_err(io_error)?;
            info!(
                target = "quire::application::route_settings",
                backup = %backup.display(),
                "routes backed up"
            );
        }

        let staging = self
            .dir
            .join(format!(".{ROUTES_FILE}.{}", Uuid::new_v4().simple()));
        fs::write(&staging, contents.as_bytes())
            .await
            .map_err(io_error)?;
        if let Err(err) = fs::rename(&staging, &current).await {
            let _ = fs::remove_file(&staging).await;
            return Err(io_error(err));
        }
        info!(
            target = "quire::application::route_settings",
            path = %current.display(),
            "routes replaced"
        );
        Ok(())
    }

    pub async fn get_current_hash(&self) -> Result<String, EndpointError> {
        let contents = self.get().await?;
        Ok(content_hash(&contents))
    }
}

/// Hex SHA-256 of a routes document.
pub fn content_hash(contents: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents.as_bytes());
    hex::encode(hasher.finalize())
}

fn backup_name(now: OffsetDateTime) -> Result<String, EndpointError> {
    let stamp = now
        .format(format_description!(
            "[year]-[month]-[day]-[hour]-[minute]-[second]"
        ))
        .map_err(|err| EndpointError::internal(err.to_string()))?;
    Ok(format!("routes-{stamp}.yaml"))
}

fn io_error(err: std::io::Error) -> EndpointError {
    EndpointError::internal(format!("routes file: {err}"))
}
