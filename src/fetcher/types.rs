use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Remote object as handed over by the picker
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObjectDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "path")]
    pub link_path: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    /// Anything else the picker attached
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl ObjectDescriptor {
    pub fn new(link_path: impl Into<String>) -> Self {
        Self {
            id: None,
            link_path: link_path.into(),
            filename: None,
            mimetype: None,
            size: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Metadata answered by the metadata request
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MediaInfo {
    /// Where the content can be fetched from
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, alias = "type")]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadedContent {
    Memory(Bytes),
    File { path: PathBuf, len: u64 },
}

impl DownloadedContent {
    pub fn len(&self) -> u64 {
        match self {
            DownloadedContent::Memory(bytes) => bytes.len() as u64,
            DownloadedContent::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a fetch: metadata, plus content when a download was requested
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMedia {
    pub metadata: MediaInfo,
    pub content: Option<DownloadedContent>,
}

/// File name for downloaded content, stripped of any directory components
pub(crate) fn local_file_name(info: &MediaInfo, object: &ObjectDescriptor) -> String {
    let candidates = [
        info.filename.as_deref(),
        object.filename.as_deref(),
        object.link_path.rsplit('/').next(),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter_map(|name| Path::new(name).file_name())
        .filter_map(|name| name.to_str())
        .find(|name| !name.is_empty() && *name != "..")
        .unwrap_or("download")
        .to_string()
}
