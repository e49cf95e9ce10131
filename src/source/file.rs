//! On-disk file source

use super::{SourceError, SourceResult, VirtualSource};
use crate::http::mime;
use chrono::{DateTime, Utc};
use hyper::body::Bytes;
use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Serves a file from local disk.
///
/// Metadata (size, modification time, validator, content type, name) is
/// captured when the source is created; the file handle only lives between
/// `open` and `close`. Reads are plain blocking calls; the delivery loop keeps
/// them off the async worker threads.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    size: u64,
    name: Option<String>,
    last_modified: Option<DateTime<Utc>>,
    validator: Option<String>,
    content_type: Option<&'static str>,
    file: Option<File>,
}

impl FileSource {
    /// Stat `path` on the calling thread
    pub fn new(path: impl Into<PathBuf>) -> SourceResult<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path);
        Self::from_metadata(path, metadata)
    }

    /// Stat `path` through `tokio::fs`, for use inside request handlers
    pub async fn load(path: impl Into<PathBuf>) -> SourceResult<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await;
        Self::from_metadata(path, metadata)
    }

    fn from_metadata(path: PathBuf, metadata: io::Result<Metadata>) -> SourceResult<Self> {
        let metadata = metadata.map_err(|e| SourceError::Unavailable {
            reason: format!("cannot stat '{}': {e}", path.display()),
        })?;
        if !metadata.is_file() {
            return Err(SourceError::Unavailable {
                reason: format!("'{}' is not a regular file", path.display()),
            });
        }

        let modified = metadata.modified().ok();
        let last_modified = modified.map(DateTime::<Utc>::from);
        let mtime_secs = modified
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());
        let validator = format!("\"{mtime_secs:x}-{:x}\"", metadata.len());

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(ToString::to_string);
        let content_type = mime::from_path(&path);

        Ok(Self {
            size: metadata.len(),
            path,
            name,
            last_modified,
            validator: Some(validator),
            content_type,
            file: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_mut(&mut self) -> SourceResult<&mut File> {
        self.file.as_mut().ok_or(SourceError::NotOpen)
    }
}

impl VirtualSource for FileSource {
    /// Size of the open file, or the size seen at creation while closed
    fn size(&self) -> SourceResult<u64> {
        match &self.file {
            Some(file) => file.metadata().map(|m| m.len()).map_err(|e| {
                SourceError::Unavailable {
                    reason: format!("cannot stat '{}': {e}", self.path.display()),
                }
            }),
            None => Ok(self.size),
        }
    }

    fn validator(&self) -> Option<&str> {
        self.validator.as_deref()
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type
    }

    fn suggested_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn open(&mut self) -> SourceResult<()> {
        self.file = Some(File::open(&self.path)?);
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> SourceResult<()> {
        let size = self.size()?;
        if offset > size {
            return Err(SourceError::SeekOutOfRange { offset, size });
        }
        self.file_mut()?.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> SourceResult<Bytes> {
        let file = self.file_mut()?;
        let mut buf = Vec::with_capacity(max_len);
        // `take` keeps reading until max_len or EOF, so short reads only happen at the end
        file.by_ref()
            .take(max_len as u64)
            .read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn close(&mut self) -> SourceResult<()> {
        self.file = None;
        Ok(())
    }
}
