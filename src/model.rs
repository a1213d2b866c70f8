//! Data exchanged with the backend
//!
//! The client never looks inside a summary or the table markup; both are
//! opaque strings. Chart markup is the exception, see [`crate::markup`].

use crate::error::{Action, ClientError, NO_FILE_SELECTED};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Text description of an uploaded dataset, produced by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Summary(String);

impl Summary {
    /// Use the backend's text, or the fixed fallback when it is absent or empty
    pub fn from_response(summary: Option<String>) -> Self {
        match summary {
            Some(s) if !s.is_empty() => Summary(s),
            _ => Summary(Action::Upload.fallback().unwrap_or_default().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the chart should be drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ChartSource {
    /// A Plotly figure (`{"data": [...], "layout": {...}}`), drawn by a trusted call
    Spec(serde_json::Value),
    /// Backend-rendered HTML fragment, body already extracted. Only shown sandboxed.
    Markup(String),
}

/// Chart and table for the uploaded dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Details {
    pub chart: ChartSource,
    pub table: String,
}

/// A CSV file about to be sent under the `datafile` field
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { file_name: file_name.into(), bytes }
    }

    /// Read a file from disk. Only presence is checked; other extensions are uploaded anyway.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ClientError::Input(NO_FILE_SELECTED.to_string()));
        }

        if !has_csv_extension(path) {
            warn!(path = %path.display(), "file does not have a .csv extension");
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("data.csv")
            .to_string();
        let bytes = std::fs::read(path)?;

        Ok(Self { file_name, bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub fn has_csv_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}
