//! Delivery module
//!
//! Executes a [`DeliveryPlan`] against a [`VirtualSource`], writing the
//! negotiated byte window to an async sink with optional bandwidth pacing.

mod throttle;

pub use throttle::{ThrottleConfig, DEFAULT_BUFFER_SIZE};

use crate::http::range::DeliveryPlan;
use crate::logger;
use crate::source::{SourceError, VirtualSource};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::Instant;

/// Errors raised while streaming a body.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The source failed to open, report its size, seek or read.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// The sink rejected a write, usually because the client went away.
    #[error("delivery aborted after {delivered} bytes: {source}")]
    Aborted {
        /// Bytes successfully written before the failure
        delivered: u64,
        /// Underlying write error
        source: std::io::Error,
    },
}

impl DeliveryError {
    /// Client disconnects are expected and should not be logged as faults
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Keeps a source open for the lifetime of the guard.
///
/// `close` runs on drop, which covers early returns, `?` propagation and the
/// enclosing future being dropped mid-stream.
struct OpenSource<'a, S: VirtualSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: VirtualSource + ?Sized> OpenSource<'a, S> {
    fn open(source: &'a mut S) -> Result<Self, SourceError> {
        source.open()?;
        Ok(Self { source })
    }
}

impl<S: VirtualSource + ?Sized> Drop for OpenSource<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.source.close() {
            logger::log_warning(&format!("Failed to close source: {e}"));
        }
    }
}

/// Stream the byte window described by `plan` from `source` into `sink`.
///
/// Writes nothing for non-2xx plans and for empty windows. A source that runs
/// dry before the window is exhausted ends the stream normally; whatever
/// existed has been delivered.
///
/// # Returns
/// Number of bytes written to `sink`.
pub async fn stream<S, W>(
    plan: &DeliveryPlan,
    source: &mut S,
    sink: &mut W,
    throttle: ThrottleConfig,
) -> Result<u64, DeliveryError>
where
    S: VirtualSource + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    if !plan.status.is_success() || plan.range_length == Some(0) {
        return Ok(0);
    }

    let mut remaining = match plan.range_length {
        Some(length) => length,
        None => off_runtime(|| source.size())?.saturating_sub(plan.range_start),
    };
    if remaining == 0 {
        return Ok(0);
    }

    let buffer_size = throttle.buffer_size.max(1);
    let mut guard = off_runtime(move || OpenSource::open(source))?;
    off_runtime(|| guard.source.seek(plan.range_start))?;

    let mut delivered = 0u64;
    while remaining > 0 {
        let chunk_started = Instant::now();
        let want = usize::try_from(remaining).map_or(buffer_size, |r| r.min(buffer_size));
        let data = off_runtime(|| guard.source.read(want))?;
        if data.is_empty() {
            break;
        }

        if let Err(e) = write_chunk(sink, &data).await {
            return Err(DeliveryError::Aborted {
                delivered,
                source: e,
            });
        }
        let n = data.len() as u64;
        delivered += n;
        remaining = remaining.saturating_sub(n);

        throttle.pace(chunk_started).await;
    }

    drop(guard);
    Ok(delivered)
}

/// Run a blocking source call without stalling the tasks queued on this worker.
///
/// On a multi-thread runtime the worker hands its queue to another thread for
/// the duration of the call. A current-thread runtime has no second thread to
/// hand off to, so the call runs in place.
fn off_runtime<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

async fn write_chunk<W>(sink: &mut W, data: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    sink.write_all(data).await?;
    sink.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::range::negotiate;
    use crate::source::{InMemorySource, SourceResult};
    use hyper::body::Bytes;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;

    const DATA: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxy";

    /// Wraps a source and counts lifecycle calls
    struct Tracked<S> {
        inner: S,
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
        fail_read_after: Option<usize>,
        reads: usize,
    }

    impl<S> Tracked<S> {
        fn new(inner: S) -> Self {
            Self {
                inner,
                opened: Arc::new(AtomicUsize::new(0)),
                closed: Arc::new(AtomicUsize::new(0)),
                fail_read_after: None,
                reads: 0,
            }
        }
    }

    impl<S: VirtualSource> VirtualSource for Tracked<S> {
        fn size(&self) -> SourceResult<u64> {
            self.inner.size()
        }

        fn open(&mut self) -> SourceResult<()> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.inner.open()
        }

        fn seek(&mut self, offset: u64) -> SourceResult<()> {
            self.inner.seek(offset)
        }

        fn read(&mut self, max_len: usize) -> SourceResult<Bytes> {
            self.reads += 1;
            if self.fail_read_after.is_some_and(|n| self.reads > n) {
                return Err(SourceError::Io(io::Error::other("disk gone")));
            }
            self.inner.read(max_len)
        }

        fn close(&mut self) -> SourceResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            self.inner.close()
        }
    }

    /// Reports a larger size than it can actually produce
    struct Truncated(InMemorySource);

    impl VirtualSource for Truncated {
        fn size(&self) -> SourceResult<u64> {
            Ok(self.0.size()? + 10)
        }

        fn open(&mut self) -> SourceResult<()> {
            self.0.open()
        }

        fn seek(&mut self, offset: u64) -> SourceResult<()> {
            self.0.seek(offset)
        }

        fn read(&mut self, max_len: usize) -> SourceResult<Bytes> {
            self.0.read(max_len)
        }

        fn close(&mut self) -> SourceResult<()> {
            self.0.close()
        }
    }

    /// Sink that accepts `budget` bytes and then fails like a closed socket
    struct FailingSink {
        written: Vec<u8>,
        budget: usize,
    }

    impl AsyncWrite for FailingSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.written.len() >= self.budget {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            let n = buf.len().min(self.budget - self.written.len());
            self.written.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn source() -> InMemorySource {
        InMemorySource::new(DATA, Some("fixture.bin".to_string()))
    }

    async fn run(range: Option<&str>, throttle: ThrottleConfig) -> (DeliveryPlan, Vec<u8>) {
        let size = DATA.len() as u64;
        let plan = negotiate(true, range, None, None, size);
        let mut src = source();
        let mut out = Vec::new();
        let n = stream(&plan, &mut src, &mut out, throttle).await.unwrap();
        assert_eq!(n, out.len() as u64);
        (plan, out)
    }

    #[tokio::test]
    async fn test_full_body() {
        let (_, out) = run(None, ThrottleConfig::unlimited()).await;
        assert_eq!(out, DATA);
    }

    #[tokio::test]
    async fn test_full_body_small_chunks() {
        let (_, out) = run(None, ThrottleConfig::new(4, 0)).await;
        assert_eq!(out, DATA);
    }

    #[tokio::test]
    async fn test_partial_windows() {
        let cases: [(&str, &[u8]); 5] = [
            ("bytes=1-4", &DATA[1..=4]),
            ("bytes=-5", &DATA[30..]),
            ("bytes=30-", &DATA[30..]),
            ("bytes=30-30", &DATA[30..=30]),
            ("bytes=30-34", &DATA[30..=34]),
        ];
        for (range, expected) in cases {
            let (plan, out) = run(Some(range), ThrottleConfig::new(3, 0)).await;
            assert_eq!(plan.status, 206, "range {range}");
            assert_eq!(out, expected, "range {range}");
        }
    }

    #[tokio::test]
    async fn test_every_window_exact() {
        let size = DATA.len();
        for a in 0..size {
            for b in a..size {
                let (_, out) = run(Some(&format!("bytes={a}-{b}")), ThrottleConfig::new(7, 0)).await;
                assert_eq!(out, &DATA[a..=b], "window {a}-{b}");
            }
        }
    }

    #[tokio::test]
    async fn test_unsatisfiable_writes_nothing() {
        let mut src = Tracked::new(source());
        let plan = negotiate(true, Some("bytes=30-40"), None, None, DATA.len() as u64);
        let mut out = Vec::new();
        let n = stream(&plan, &mut src, &mut out, ThrottleConfig::default())
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert!(out.is_empty());
        assert_eq!(src.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_window_writes_nothing() {
        let mut src = Tracked::new(InMemorySource::new(Bytes::new(), None));
        let plan = negotiate(true, None, None, None, 0);
        let mut out = Vec::new();
        let n = stream(&plan, &mut src, &mut out, ThrottleConfig::default())
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(src.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_source_closed_after_success() {
        let mut src = Tracked::new(source());
        let plan = negotiate(true, None, None, None, DATA.len() as u64);
        let mut out = Vec::new();
        stream(&plan, &mut src, &mut out, ThrottleConfig::new(8, 0))
            .await
            .unwrap();
        assert_eq!(src.opened.load(Ordering::SeqCst), 1);
        assert_eq!(src.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_aborts_and_closes() {
        let mut src = Tracked::new(source());
        let plan = negotiate(true, None, None, None, DATA.len() as u64);
        let mut sink = FailingSink {
            written: Vec::new(),
            budget: 10,
        };
        let err = stream(&plan, &mut src, &mut sink, ThrottleConfig::new(8, 0))
            .await
            .unwrap_err();
        assert!(err.is_aborted());
        assert!(matches!(err, DeliveryError::Aborted { delivered: 8, .. }));
        assert_eq!(sink.written, &DATA[..10]);
        assert_eq!(src.closed.load(Ordering::SeqCst), 1);
        // No read attempted after the failed write
        assert_eq!(src.reads, 2);
    }

    #[tokio::test]
    async fn test_source_failure_propagates_and_closes() {
        let mut src = Tracked::new(source());
        src.fail_read_after = Some(1);
        let plan = negotiate(true, None, None, None, DATA.len() as u64);
        let mut out = Vec::new();
        let err = stream(&plan, &mut src, &mut out, ThrottleConfig::new(8, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Source(SourceError::Io(_))));
        assert_eq!(out, &DATA[..8]);
        assert_eq!(src.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_future_still_closes() {
        let mut src = Tracked::new(source());
        let closed = Arc::clone(&src.closed);
        let plan = negotiate(true, None, None, None, DATA.len() as u64);
        let mut out = Vec::new();
        // 1 byte/s with 8-byte chunks: the first pause is 8s, far past the timeout
        let throttle = ThrottleConfig::new(8, 1);
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            stream(&plan, &mut src, &mut out, throttle),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(out, &DATA[..8]);
    }

    #[tokio::test]
    async fn test_early_exhaustion_is_not_an_error() {
        let mut src = Truncated(source());
        let plan = negotiate(true, None, None, None, src.size().unwrap());
        let mut out = Vec::new();
        let n = stream(&plan, &mut src, &mut out, ThrottleConfig::new(8, 0))
            .await
            .unwrap();
        assert_eq!(n, DATA.len() as u64);
        assert_eq!(out, DATA);
    }

    #[tokio::test]
    async fn test_throttled_rate() {
        // 300 bytes in 100-byte chunks at 2000 B/s: at least 3 x 50ms
        let data = vec![7u8; 300];
        let mut src = InMemorySource::new(data.clone(), None);
        let plan = negotiate(true, None, None, None, 300);
        let mut out = Vec::new();
        let started = Instant::now();
        let n = stream(&plan, &mut src, &mut out, ThrottleConfig::new(100, 2000))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(n, 300);
        assert_eq!(out, data);
    }

    /// Source whose reads block the calling thread like a slow disk
    struct SlowSource {
        inner: InMemorySource,
        delay: Duration,
    }

    impl VirtualSource for SlowSource {
        fn size(&self) -> SourceResult<u64> {
            self.inner.size()
        }

        fn open(&mut self) -> SourceResult<()> {
            self.inner.open()
        }

        fn seek(&mut self, offset: u64) -> SourceResult<()> {
            self.inner.seek(offset)
        }

        fn read(&mut self, max_len: usize) -> SourceResult<Bytes> {
            std::thread::sleep(self.delay);
            self.inner.read(max_len)
        }

        fn close(&mut self) -> SourceResult<()> {
            self.inner.close()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_blocking_reads_leave_worker_free() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let ticker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Three 100ms reads (12 + 12 + 11 bytes) on the only worker thread
        let delivery = tokio::spawn(async move {
            let mut src = SlowSource {
                inner: source(),
                delay: Duration::from_millis(100),
            };
            let plan = negotiate(true, None, None, None, DATA.len() as u64);
            let mut out = Vec::new();
            let n = stream(&plan, &mut src, &mut out, ThrottleConfig::new(12, 0)).await?;
            Ok::<_, DeliveryError>((n, out))
        });

        let (n, out) = delivery.await.unwrap().unwrap();
        ticker.abort();
        assert_eq!(n, DATA.len() as u64);
        assert_eq!(out, DATA);
        assert!(
            ticks.load(Ordering::SeqCst) >= 10,
            "ticker starved: {} ticks",
            ticks.load(Ordering::SeqCst)
        );
    }
}
