//! Injected dependencies.
//!
//! Timestamps are always taken through a [`Clock`] so tests can pin or step
//! time deterministically.

use chrono::{DateTime, SubsecRound, Utc};

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```
/// use rsvp_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let earlier = clock.now();
/// assert!(clock.now() >= earlier);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time, truncated to microseconds so values survive a
/// `TIMESTAMPTZ` round trip unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}
