//! File transfer: uploads into a fixed storage root, downloads out of it.
//!
//! Every name is reduced to its final path component before it touches the
//! filesystem, so `../../etc/passwd` is stored as `<root>/passwd`.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::observability::metrics;
use crate::storage::error::StorageError;

/// RFC 5987 `attr-char` minus alphanumerics.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

#[derive(Debug, Clone, Serialize)]
pub struct StoredArtifact {
    /// Name as supplied by the client.
    pub original_name: String,
    /// Sanitized name actually used on disk.
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadFailure {
    pub name: String,
    pub reason: String,
}

/// Outcome of a multi-file upload. Failed artifacts never stop the rest.
#[derive(Debug, Default, Serialize)]
pub struct UploadBatch {
    pub stored: Vec<StoredArtifact>,
    pub failed: Vec<UploadFailure>,
}

impl UploadBatch {
    pub fn record(&mut self, name: &str, result: Result<StoredArtifact, StorageError>) {
        match result {
            Ok(artifact) => self.stored.push(artifact),
            Err(e) => {
                tracing::warn!(file = name, error = %e, "skipping artifact");
                self.failed.push(UploadFailure {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    pub fn count(&self) -> usize {
        self.stored.len()
    }
}

/// An opened download.
#[derive(Debug)]
pub struct ServedFile {
    pub file_name: String,
    pub len: u64,
    file: File,
}

impl ServedFile {
    pub fn into_stream(self) -> ReaderStream<File> {
        ReaderStream::new(self.file)
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path component of `name`, with either separator style stripped.
    pub fn sanitize(name: &str) -> Result<String, StorageError> {
        if name.trim().is_empty() {
            return Err(StorageError::MissingFilename);
        }
        let base = name
            .rsplit(['/', '\\'])
            .find(|part| !part.is_empty())
            .unwrap_or_default();
        match base {
            "" | "." | ".." => Err(StorageError::PathEscape {
                name: name.to_string(),
            }),
            b if b.contains('\0') => Err(StorageError::PathEscape {
                name: name.to_string(),
            }),
            b => Ok(b.to_string()),
        }
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        let base = Self::sanitize(name)?;
        let path = self.root.join(&base);
        if path.parent() != Some(self.root.as_path()) {
            return Err(StorageError::PathEscape {
                name: name.to_string(),
            });
        }
        Ok(path)
    }

    /// Stream `content` to `<root>/<basename(name)>`. A failed write leaves
    /// no partial file behind.
    pub async fn store<S, E>(
        &self,
        name: &str,
        content: S,
        size_hint: Option<u64>,
    ) -> Result<StoredArtifact, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = self.resolve(name)?;
        let file_name = Self::sanitize(name)?;
        let write_failure = |source: std::io::Error| StorageError::WriteFailure {
            name: file_name.clone(),
            source,
        };

        fs::create_dir_all(&self.root).await.map_err(write_failure)?;
        let file = File::create(&path).await.map_err(write_failure)?;

        match write_all(file, content).await {
            Ok(size) => {
                metrics::record_upload("stored");
                tracing::info!(file = %file_name, size, path = %path.display(), "artifact stored");
                Ok(StoredArtifact {
                    original_name: name.to_string(),
                    file_name,
                    path,
                    size,
                    declared_size: size_hint,
                })
            }
            Err(source) => {
                metrics::record_upload("failed");
                if let Err(e) = fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %e, "could not remove partial upload");
                }
                Err(write_failure(source))
            }
        }
    }

    /// Raw body upload named by a `Content-Disposition` header.
    pub async fn ingest_raw<S, E>(
        &self,
        disposition: Option<&str>,
        body: S,
        size_hint: Option<u64>,
    ) -> Result<StoredArtifact, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let name = disposition
            .and_then(filename_from_disposition)
            .ok_or(StorageError::MissingFilename)?;
        self.store(&name, body, size_hint).await
    }

    pub async fn serve(&self, name: &str) -> Result<ServedFile, StorageError> {
        let path = self.resolve(name)?;
        let file_name = Self::sanitize(name)?;
        let not_found = || StorageError::NotFound {
            name: file_name.clone(),
        };

        let meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(not_found()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(source) => {
                return Err(StorageError::ReadFailure {
                    name: file_name,
                    source,
                })
            }
        };
        let file = File::open(&path)
            .await
            .map_err(|source| StorageError::ReadFailure {
                name: file_name.clone(),
                source,
            })?;

        Ok(ServedFile {
            file_name,
            len: meta.len(),
            file,
        })
    }
}

async fn write_all<S, E>(mut file: File, content: S) -> std::io::Result<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    futures_util::pin_mut!(content);
    let mut written = 0u64;
    while let Some(chunk) = content.next().await {
        let chunk = chunk.map_err(std::io::Error::other)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// `attachment; filename="x.bin"` → `x.bin`. `filename*` wins when present.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for param in value.split(';').skip(1) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let raw = raw.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let decoded = raw
                    .splitn(3, '\'')
                    .nth(2)
                    .and_then(|encoded| percent_decode_str(encoded).decode_utf8().ok());
                if let Some(name) = decoded.filter(|n| !n.is_empty()) {
                    return Some(name.into_owned());
                }
            }
            "filename" => {
                let unquoted = raw
                    .strip_prefix('"')
                    .and_then(|r| r.strip_suffix('"'))
                    .map(|r| r.replace("\\\"", "\"").replace("\\\\", "\\"))
                    .unwrap_or_else(|| raw.to_string());
                if !unquoted.is_empty() {
                    plain = Some(unquoted);
                }
            }
            _ => {}
        }
    }
    plain
}

/// Header value that makes clients save the response as `file_name`.
pub fn attachment_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(file_name, ATTR_CHAR)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    fn broken() -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ])
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(FileStore::sanitize("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(FileStore::sanitize("..\\..\\boot.ini").unwrap(), "boot.ini");
        assert_eq!(FileStore::sanitize("dir/name.txt/").unwrap(), "name.txt");
        assert!(matches!(FileStore::sanitize("a/.."), Err(StorageError::PathEscape { .. })));
        assert!(matches!(FileStore::sanitize("///"), Err(StorageError::PathEscape { .. })));
        assert!(matches!(FileStore::sanitize(""), Err(StorageError::MissingFilename)));
    }

    #[tokio::test]
    async fn traversal_lands_in_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("uploads"));

        let stored = store
            .store("../../etc/passwd", chunks(&["root:x:0:0"]), Some(10))
            .await
            .unwrap();
        assert_eq!(stored.path, dir.path().join("uploads").join("passwd"));
        assert_eq!(stored.size, 10);
        assert_eq!(stored.original_name, "../../etc/passwd");
        assert!(!dir.path().join("etc").exists());
    }

    #[tokio::test]
    async fn store_then_serve() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.store("a.log", chunks(&["one ", "two"]), None).await.unwrap();

        let served = store.serve("../a.log").await.unwrap();
        assert_eq!(served.len, 7);
        let body: Vec<u8> = served
            .into_stream()
            .map(|c| c.unwrap().to_vec())
            .concat()
            .await;
        assert_eq!(body, b"one two");

        assert!(matches!(
            store.serve("missing.log").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn failed_write_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let err = store.store("big.bin", broken(), None).await.unwrap_err();
        assert!(matches!(err, StorageError::WriteFailure { .. }));
        assert!(!dir.path().join("big.bin").exists());
    }

    #[tokio::test]
    async fn batch_keeps_going_past_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let mut batch = UploadBatch::default();

        batch.record("a.txt", store.store("a.txt", chunks(&["a"]), None).await);
        batch.record("b.txt", store.store("b.txt", broken(), None).await);
        batch.record("c.txt", store.store("c.txt", chunks(&["c"]), None).await);

        assert_eq!(batch.count(), 2);
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].name, "b.txt");
        assert!(dir.path().join("c.txt").exists());
    }

    #[tokio::test]
    async fn raw_ingestion_needs_a_filename() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let stored = store
            .ingest_raw(Some("attachment; filename=\"../x.bin\""), chunks(&["\x00\x01"]), None)
            .await
            .unwrap();
        assert_eq!(stored.file_name, "x.bin");

        let err = store
            .ingest_raw(Some("attachment"), chunks(&["x"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MissingFilename));
    }

    #[test]
    fn disposition_round_trip() {
        assert_eq!(
            filename_from_disposition("attachment; filename=example.bin").as_deref(),
            Some("example.bin")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=\"a.txt\"; filename*=UTF-8''%E6%96%87.txt")
                .as_deref(),
            Some("文.txt")
        );
        assert_eq!(
            attachment_disposition("文 a.txt"),
            "attachment; filename=\"_ a.txt\"; filename*=UTF-8''%E6%96%87%20a.txt"
        );
    }
}
