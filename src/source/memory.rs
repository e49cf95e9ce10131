//! In-memory data source

use super::{SourceError, SourceResult, VirtualSource};
use crate::http::{cache, mime};
use chrono::{DateTime, Utc};
use hyper::body::Bytes;

/// Serves a payload held entirely in memory.
///
/// The validator defaults to a content hash and the modification time to the
/// moment of construction; both can be overridden.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    data: Bytes,
    name: Option<String>,
    last_modified: Option<DateTime<Utc>>,
    validator: Option<String>,
    content_type: Option<String>,
    offset: usize,
}

impl InMemorySource {
    pub fn new(data: impl Into<Bytes>, name: Option<String>) -> Self {
        let data = data.into();
        let validator = cache::generate_etag(&data);
        Self {
            data,
            name,
            last_modified: Some(Utc::now()),
            validator: Some(validator),
            content_type: Some(mime::OCTET_STREAM.to_string()),
            offset: 0,
        }
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub fn set_last_modified(&mut self, last_modified: Option<DateTime<Utc>>) {
        self.last_modified = last_modified;
    }

    pub fn set_validator(&mut self, validator: Option<String>) {
        self.validator = validator;
    }

    pub fn set_content_type(&mut self, content_type: Option<String>) {
        self.content_type = content_type;
    }
}

impl VirtualSource for InMemorySource {
    fn size(&self) -> SourceResult<u64> {
        Ok(self.data.len() as u64)
    }

    fn validator(&self) -> Option<&str> {
        self.validator.as_deref()
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn suggested_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn open(&mut self) -> SourceResult<()> {
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> SourceResult<()> {
        let size = self.data.len();
        match usize::try_from(offset) {
            Ok(offset) if offset <= size => {
                self.offset = offset;
                Ok(())
            }
            _ => Err(SourceError::SeekOutOfRange {
                offset,
                size: size as u64,
            }),
        }
    }

    fn read(&mut self, max_len: usize) -> SourceResult<Bytes> {
        let start = self.offset.min(self.data.len());
        let end = start.saturating_add(max_len).min(self.data.len());
        self.offset = end;
        Ok(self.data.slice(start..end))
    }

    fn close(&mut self) -> SourceResult<()> {
        Ok(())
    }
}
