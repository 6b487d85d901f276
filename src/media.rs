//! Recent media lister.
//!
//! Recorded clips are listed by an external collaborator, either the HTTP
//! listing endpoint or a local directory. Filenames carry a sortable
//! timestamp, so descending lexicographic order stands in for recency.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::MediaConfig;
use crate::error::{LiveError, Result};

/// Source of recorded clip filenames.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// List every available clip, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Media`] when the collaborator cannot be reached or
    /// returns an unusable listing.
    async fn list_files(&self) -> Result<Vec<String>>;
}

/// One element of the listing response: a bare filename or a metadata record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListingEntry {
    Name(String),
    Record { video_id: String },
}

impl ListingEntry {
    fn into_name(self) -> String {
        match self {
            Self::Name(name) => name,
            Self::Record { video_id } => video_id,
        }
    }
}

/// Lists clips via `GET <url>`, expecting a JSON array.
pub struct HttpMediaSource {
    client: reqwest::Client,
    url: String,
}

impl HttpMediaSource {
    /// Create a source for `url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Media`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LiveError::Media(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn list_files(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| LiveError::Media(format!("request to {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LiveError::Media(format!("{} returned HTTP {status}", self.url)));
        }

        let entries: Vec<ListingEntry> = response
            .json()
            .await
            .map_err(|e| LiveError::Media(format!("invalid listing from {}: {e}", self.url)))?;
        Ok(entries.into_iter().map(ListingEntry::into_name).collect())
    }
}

/// Lists regular files with one extension in a local directory.
pub struct DirectoryMediaSource {
    dir: PathBuf,
    extension: String,
}

impl DirectoryMediaSource {
    /// `extension` is matched case-sensitively, without the leading dot.
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_owned(),
        }
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str())
    }
}

#[async_trait]
impl MediaSource for DirectoryMediaSource {
    async fn list_files(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            LiveError::Media(format!("cannot read {}: {e}", self.dir.display()))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LiveError::Media(format!("cannot read {}: {e}", self.dir.display())))?
        {
            let path = entry.path();
            if !self.matches(&path) {
                continue;
            }
            match entry.file_type().await {
                Ok(kind) if kind.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                files.push(name.to_owned());
            }
        }
        Ok(files)
    }
}

/// Sort filenames most-recent-first and keep at most `limit`.
pub fn select_recent(mut files: Vec<String>, limit: usize) -> Vec<String> {
    files.sort_unstable_by(|a, b| b.cmp(a));
    files.truncate(limit);
    files
}

/// Bounded, sorted view over a [`MediaSource`].
pub struct RecentMedia {
    source: Box<dyn MediaSource>,
    default_limit: usize,
}

impl RecentMedia {
    /// Wrap `source`, listing `default_limit` entries by default.
    pub fn new(source: Box<dyn MediaSource>, default_limit: usize) -> Self {
        Self {
            source,
            default_limit,
        }
    }

    /// Build the configured source. A directory wins over a URL.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Config`] when neither is configured, or
    /// [`LiveError::Media`] if the HTTP client cannot be built.
    pub fn from_config(config: &MediaConfig) -> Result<Self> {
        let source: Box<dyn MediaSource> = match (&config.directory, &config.url) {
            (Some(dir), _) => Box::new(DirectoryMediaSource::new(dir, config.extension.as_str())),
            (None, Some(url)) => Box::new(HttpMediaSource::new(
                url.as_str(),
                Duration::from_millis(config.timeout_ms),
            )?),
            (None, None) => {
                return Err(LiveError::Config(
                    "media needs either `url` or `directory`".into(),
                ));
            }
        };
        Ok(Self::new(source, config.limit))
    }

    /// At most `limit` filenames, most recent first.
    ///
    /// # Errors
    ///
    /// Propagates the collaborator's [`LiveError::Media`].
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<String>> {
        let files = self.source.list_files().await.inspect_err(|e| {
            warn!(error = %e, "recent media listing failed");
        })?;
        Ok(select_recent(files, limit))
    }

    /// [`list_recent`](Self::list_recent) with the configured limit.
    pub async fn list_default(&self) -> Result<Vec<String>> {
        self.list_recent(self.default_limit).await
    }

    /// Limit used by [`list_default`](Self::list_default).
    pub fn default_limit(&self) -> usize {
        self.default_limit
    }
}
