//! Streaming response body
//!
//! The delivery loop writes into one end of an in-memory pipe; this body
//! reads the other end and hands the bytes to hyper frame by frame. Dropping
//! the body (client gone) closes the pipe, which turns the next write on the
//! delivery side into an error and ends that loop.

use hyper::body::{Body, Bytes, Frame, SizeHint};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, DuplexStream, ReadBuf};

/// Response body fed by a background delivery task
pub struct DeliveryBody {
    reader: Option<DuplexStream>,
    buf: Box<[u8]>,
    remaining: u64,
}

impl DeliveryBody {
    /// Create a body and the writer half the delivery task writes into.
    ///
    /// `length` is the exact number of bytes that will be written.
    pub fn pipe(length: u64, buffer_size: usize) -> (Self, DuplexStream) {
        let buffer_size = buffer_size.max(1);
        let (writer, reader) = tokio::io::duplex(buffer_size);
        let body = Self {
            reader: Some(reader),
            buf: vec![0u8; buffer_size].into_boxed_slice(),
            remaining: length,
        };
        (body, writer)
    }

    /// Body without any bytes (HEAD, 416, errors)
    pub fn empty() -> Self {
        Self {
            reader: None,
            buf: Box::default(),
            remaining: 0,
        }
    }
}

impl Body for DeliveryBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let Some(reader) = this.reader.as_mut() else {
            return Poll::Ready(None);
        };

        let mut read_buf = ReadBuf::new(&mut this.buf);
        match Pin::new(reader).poll_read(cx, &mut read_buf) {
            Poll::Ready(Ok(())) => {
                let filled = read_buf.filled();
                if filled.is_empty() {
                    this.reader = None;
                    return Poll::Ready(None);
                }
                this.remaining = this.remaining.saturating_sub(filled.len() as u64);
                Poll::Ready(Some(Ok(Frame::data(Bytes::copy_from_slice(filled)))))
            }
            Poll::Ready(Err(e)) => {
                this.reader = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.reader.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }
}
