//! Monotonic timestamp source for submitted operations.
//!
//! Wall-clock time is sampled exactly once, at construction; every later
//! reading adds the elapsed monotonic duration to that origin. Timestamps
//! therefore never run backwards within a process, even if the system
//! clock is adjusted underneath it.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Errors returned by the monotonic clock.
#[derive(Debug, Error)]
pub enum ClockError {
    /// The system clock read before the UNIX epoch at construction.
    #[error("corrupted epoch: system clock reads before the UNIX epoch")]
    CorruptedEpoch,

    /// The nanosecond counter overflowed its 64-bit range.
    #[error("broken clock state: nanosecond counter overflow")]
    BrokenClockState,
}

/// A monotonic nanosecond clock anchored at process start.
#[derive(Debug)]
pub struct MonotonicClock {
    /// Nanoseconds since the UNIX epoch at construction.
    origin_ns: u64,

    /// Monotonic anchor matching `origin_ns`.
    started: Instant,
}

impl MonotonicClock {
    /// Anchor a new clock at the current wall-clock time.
    pub fn new() -> Result<Self, ClockError> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ClockError::CorruptedEpoch)?;
        let origin_ns =
            u64::try_from(since_epoch.as_nanos()).map_err(|_| ClockError::BrokenClockState)?;
        Ok(Self {
            origin_ns,
            started: Instant::now(),
        })
    }

    /// Nanoseconds since the UNIX epoch, monotonic within this process.
    pub fn now(&self) -> Result<u64, ClockError> {
        let elapsed = u64::try_from(self.started.elapsed().as_nanos())
            .map_err(|_| ClockError::BrokenClockState)?;
        self.origin_ns
            .checked_add(elapsed)
            .ok_or(ClockError::BrokenClockState)
    }
}
