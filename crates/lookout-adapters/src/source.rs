//! Document sources.
//!
//! A [`DocumentSource`] turns a reference (a relative path, a URL) into raw
//! bytes plus a media type. Interpreting the bytes is left to the caller.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{AdapterError, Result};

/// Default size limit for fetched documents (20 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 20 * 1024 * 1024;

/// Raw document content as fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    /// Display name (file name or last URL segment).
    pub name: String,
    /// IANA media type.
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Fetches document content by reference.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch the bytes and media type behind `reference`.
    async fn fetch_content(&self, reference: &str) -> Result<FetchedContent>;
}

/// Guess a media type from a file name or path.
pub fn guess_media_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_owned()
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// Reads documents from a directory tree.
///
/// References are resolved relative to the root; absolute paths and `..`
/// components are rejected.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
    max_bytes: u64,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let relative = Path::new(reference);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes || reference.is_empty() {
            return Err(AdapterError::SourceUnavailable {
                reference: reference.to_owned(),
                reason: "path must stay inside the source root".into(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentSource for FileSource {
    async fn fetch_content(&self, reference: &str) -> Result<FetchedContent> {
        let path = self.resolve(reference)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| AdapterError::SourceUnavailable {
                reference: reference.to_owned(),
                reason: e.to_string(),
            })?;
        if !metadata.is_file() {
            return Err(AdapterError::SourceUnavailable {
                reference: reference.to_owned(),
                reason: "not a regular file".into(),
            });
        }
        if metadata.len() > self.max_bytes {
            return Err(AdapterError::TooLarge {
                reference: reference.to_owned(),
                size: metadata.len(),
                limit: self.max_bytes,
            });
        }

        let bytes = tokio::fs::read(&path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| reference.to_owned());
        let media_type = guess_media_type(&name);

        debug!(path = %path.display(), media_type = %media_type, size = bytes.len(), "read document");
        Ok(FetchedContent {
            name,
            media_type,
            bytes,
        })
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Fetches documents over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpSource {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("lookout/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentSource for HttpSource {
    async fn fetch_content(&self, reference: &str) -> Result<FetchedContent> {
        let url = url::Url::parse(reference).map_err(|e| AdapterError::SourceUnavailable {
            reference: reference.to_owned(),
            reason: format!("invalid URL: {e}"),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AdapterError::SourceUnavailable {
                reference: reference.to_owned(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AdapterError::SourceUnavailable {
                reference: reference.to_owned(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::SourceUnavailable {
                reference: reference.to_owned(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        if let Some(len) = response.content_length()
            && len > self.max_bytes
        {
            return Err(AdapterError::TooLarge {
                reference: reference.to_owned(),
                size: len,
                limit: self.max_bytes,
            });
        }

        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("document")
            .to_owned();

        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty() && v != "application/octet-stream");
        let media_type = header_type.unwrap_or_else(|| guess_media_type(&name));

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AdapterError::SourceUnavailable {
                reference: reference.to_owned(),
                reason: e.to_string(),
            })?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(AdapterError::TooLarge {
                reference: reference.to_owned(),
                size: bytes.len() as u64,
                limit: self.max_bytes,
            });
        }

        debug!(url = %url, media_type = %media_type, size = bytes.len(), "fetched document");
        Ok(FetchedContent {
            name,
            media_type,
            bytes: bytes.to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_common_media_types() {
        assert_eq!(guess_media_type("notes.txt"), "text/plain");
        assert_eq!(guess_media_type("scan.PNG"), "image/png");
        assert_eq!(guess_media_type("minutes.pdf"), "application/pdf");
        assert_eq!(guess_media_type("blob"), "application/octet-stream");
    }

    #[tokio::test]
    async fn file_source_reads_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("notes.md"), "# Standup")
            .await
            .unwrap();

        let source = FileSource::new(dir.path());
        let fetched = source.fetch_content("notes.md").await.unwrap();
        assert_eq!(fetched.name, "notes.md");
        assert_eq!(fetched.media_type, "text/markdown");
        assert_eq!(fetched.bytes, b"# Standup");
    }

    #[tokio::test]
    async fn file_source_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path());
        for reference in ["../secret", "/etc/passwd", ""] {
            let err = source.fetch_content(reference).await.unwrap_err();
            assert!(
                matches!(err, AdapterError::SourceUnavailable { .. }),
                "{reference}"
            );
        }
    }

    #[tokio::test]
    async fn file_source_enforces_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("big.txt"), vec![b'x'; 64])
            .await
            .unwrap();
        let source = FileSource::new(dir.path()).with_max_bytes(16);
        let err = source.fetch_content("big.txt").await.unwrap_err();
        assert!(matches!(err, AdapterError::TooLarge { size: 64, limit: 16, .. }));
    }

    #[tokio::test]
    async fn file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path());
        assert!(source.fetch_content("nope.txt").await.is_err());
    }

    #[tokio::test]
    async fn http_source_rejects_non_http_schemes() {
        let source = HttpSource::new();
        let err = source.fetch_content("ftp://example.com/a.txt").await.unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
        assert!(source.fetch_content("not a url").await.is_err());
    }
}
