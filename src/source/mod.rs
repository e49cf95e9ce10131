//! Virtual data source module
//!
//! Defines the contract a data provider must satisfy to be delivered through
//! [`crate::http::binary::BinaryResponse`], plus the bundled implementations:
//! - [`InMemorySource`] for payloads already held in memory
//! - [`FileSource`] for files on local disk

mod file;
mod memory;

pub use file::FileSource;
pub use memory::InMemorySource;

use chrono::{DateTime, Utc};
use hyper::body::Bytes;
use thiserror::Error;

/// Result type for source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Errors raised by a [`VirtualSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// The size (or the source itself) could not be determined.
    #[error("source unavailable: {reason}")]
    Unavailable {
        /// Why the source is unavailable
        reason: String,
    },

    /// Seek target lies beyond the end of the source.
    #[error("seek to offset {offset} is beyond source size {size}")]
    SeekOutOfRange {
        /// Requested offset
        offset: u64,
        /// Size of the source at the time of the seek
        size: u64,
    },

    /// `seek` or `read` was called outside of an `open`/`close` bracket.
    #[error("source is not open")]
    NotOpen,

    /// I/O error from the underlying resource.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contract for any seekable provider of binary data.
///
/// Metadata accessors are side-effect free and may be called without opening
/// the source. `seek` and `read` are only valid between `open` and `close`;
/// the streaming loop is the sole caller of those and always pairs a
/// successful `open` with exactly one `close`.
///
/// Implementations keep a single read cursor, so one instance serves one
/// stream at a time.
pub trait VirtualSource: Send {
    /// Total number of bytes available.
    fn size(&self) -> SourceResult<u64>;

    /// Opaque version token, used as the `ETag` value.
    fn validator(&self) -> Option<&str> {
        None
    }

    /// Time the data was last modified.
    fn last_modified(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// MIME type of the data.
    fn content_type(&self) -> Option<&str> {
        None
    }

    /// File name suggested for downloads.
    fn suggested_name(&self) -> Option<&str> {
        None
    }

    /// Acquire the underlying resource. Called before any `seek`/`read`.
    fn open(&mut self) -> SourceResult<()>;

    /// Move the read cursor to `offset`.
    ///
    /// Fails with [`SourceError::SeekOutOfRange`] when `offset > size()`.
    fn seek(&mut self, offset: u64) -> SourceResult<()>;

    /// Read up to `max_len` bytes from the cursor and advance it.
    ///
    /// Returns fewer bytes only at end of source, and an empty buffer only
    /// when the cursor is at or past `size()`.
    fn read(&mut self, max_len: usize) -> SourceResult<Bytes>;

    /// Release the underlying resource. Called once after the last `seek`/`read`.
    fn close(&mut self) -> SourceResult<()>;
}

impl<S: VirtualSource + ?Sized> VirtualSource for Box<S> {
    fn size(&self) -> SourceResult<u64> {
        (**self).size()
    }

    fn validator(&self) -> Option<&str> {
        (**self).validator()
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        (**self).last_modified()
    }

    fn content_type(&self) -> Option<&str> {
        (**self).content_type()
    }

    fn suggested_name(&self) -> Option<&str> {
        (**self).suggested_name()
    }

    fn open(&mut self) -> SourceResult<()> {
        (**self).open()
    }

    fn seek(&mut self, offset: u64) -> SourceResult<()> {
        (**self).seek(offset)
    }

    fn read(&mut self, max_len: usize) -> SourceResult<Bytes> {
        (**self).read(max_len)
    }

    fn close(&mut self) -> SourceResult<()> {
        (**self).close()
    }
}
