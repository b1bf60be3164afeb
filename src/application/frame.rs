//! Per-request bundle handed to endpoint controllers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempPath;
use uuid::Uuid;

/// Who is calling. Internal contexts bypass permission checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub user: Option<Uuid>,
    pub integration: Option<Uuid>,
    pub internal: bool,
}

impl RequestContext {
    pub fn user(id: Uuid) -> Self {
        Self {
            user: Some(id),
            ..Self::default()
        }
    }

    pub fn integration(id: Uuid) -> Self {
        Self {
            integration: Some(id),
            ..Self::default()
        }
    }

    pub fn internal() -> Self {
        Self {
            internal: true,
            ..Self::default()
        }
    }

    pub fn is_external(&self) -> bool {
        !self.internal
    }
}

/// Multipart upload staged on disk. The file is removed when the last
/// clone is dropped.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub name: String,
    _staged: Option<Arc<TempPath>>,
}

impl UploadedFile {
    pub fn staged(temp: TempPath, name: impl Into<String>) -> Self {
        Self {
            path: temp.to_path_buf(),
            name: name.into(),
            _staged: Some(Arc::new(temp)),
        }
    }

    pub fn at(path: impl AsRef<Path>, name: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            name: name.into(),
            _staged: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub options: BTreeMap<String, String>,
    pub data: Value,
    pub context: RequestContext,
    pub file: Option<UploadedFile>,
    pub session: BTreeMap<String, String>,
}

impl Frame {
    pub fn new(context: RequestContext) -> Self {
        Self {
            data: Value::Object(Default::default()),
            context,
            ..Self::default()
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_session(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Comma-separated option values, trimmed.
    pub fn option_list(&self, key: &str) -> Vec<&str> {
        self.option(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn option_flag(&self, key: &str) -> bool {
        matches!(self.option(key), Some("true" | "1"))
    }

    pub fn session_prop(&self, key: &str) -> Option<&str> {
        self.session.get(key).map(String::as_str)
    }

    /// First entry of `data[<doc>]`, the envelope used by write endpoints.
    pub fn first_entry(&self, doc: &str) -> Option<&Value> {
        self.data.get(doc).and_then(Value::as_array)?.first()
    }
}
