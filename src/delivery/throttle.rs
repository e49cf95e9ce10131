//! Per-chunk bandwidth pacing

use std::time::Duration;
use tokio::time::Instant;

/// Default number of bytes read per chunk
pub const DEFAULT_BUFFER_SIZE: usize = 16_384;

/// Streaming chunk size and bandwidth ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Bytes per read chunk, always > 0
    pub buffer_size: usize,
    /// Target rate in bytes per second, 0 means unlimited
    pub max_bytes_per_second: u64,
}

impl ThrottleConfig {
    /// Build a config; a zero buffer size falls back to [`DEFAULT_BUFFER_SIZE`]
    pub const fn new(buffer_size: usize, max_bytes_per_second: u64) -> Self {
        Self {
            buffer_size: if buffer_size == 0 {
                DEFAULT_BUFFER_SIZE
            } else {
                buffer_size
            },
            max_bytes_per_second,
        }
    }

    pub const fn unlimited() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, 0)
    }

    pub const fn is_limited(&self) -> bool {
        self.max_bytes_per_second > 0
    }

    /// Wall time one full chunk is allowed to take at the target rate
    pub fn chunk_interval(&self) -> Option<Duration> {
        if !self.is_limited() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let secs = self.buffer_size as f64 / self.max_bytes_per_second as f64;
        Some(Duration::from_secs_f64(secs))
    }

    /// Sleep for whatever is left of the chunk interval after `chunk_started`
    ///
    /// Yields to the runtime, so other connections keep making progress.
    pub async fn pace(&self, chunk_started: Instant) {
        let Some(interval) = self.chunk_interval() else {
            return;
        };
        if let Some(pause) = interval.checked_sub(chunk_started.elapsed()) {
            tokio::time::sleep(pause).await;
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ThrottleConfig::default();
        assert_eq!(cfg.buffer_size, 16_384);
        assert_eq!(cfg.max_bytes_per_second, 0);
        assert!(!cfg.is_limited());
        assert_eq!(cfg.chunk_interval(), None);
    }

    #[test]
    fn test_zero_buffer_uses_default() {
        assert_eq!(ThrottleConfig::new(0, 10).buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_chunk_interval() {
        let cfg = ThrottleConfig::new(1000, 4000);
        assert_eq!(cfg.chunk_interval(), Some(Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn test_pace_waits_remaining_interval() {
        let cfg = ThrottleConfig::new(100, 1000);
        let started = Instant::now();
        cfg.pace(started).await;
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_pace_unlimited_returns_immediately() {
        let started = Instant::now();
        ThrottleConfig::unlimited().pace(started).await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
