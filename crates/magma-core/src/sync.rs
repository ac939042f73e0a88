//! # Synchronization Primitives
//!
//! Completion tokens and the timeline they are measured against.
//!
//! A completion token stands for "the device has finished every command
//! submitted before this point". The producer creates one after issuing work
//! that reads a region, and waits on it before writing that region again.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{Error, Result};

// =============================================================================
// COMPLETION TOKEN
// =============================================================================

/// Handle signaling that all device reads up to a point have finished
///
/// Dropping a token releases it; it does not wait.
pub trait CompletionToken: fmt::Debug {
    /// Non-blocking check of whether the device has passed this point
    fn is_satisfied(&self) -> bool;

    /// Block until the device has passed this point.
    ///
    /// There is no timeout and no cancellation. An error means the device
    /// was lost and the token can never be satisfied.
    fn wait(&mut self) -> Result<()>;
}

// =============================================================================
// TIMELINE
// =============================================================================

/// Spins between scheduler yields while waiting on a timeline
#[cfg(feature = "std")]
const SPINS_BEFORE_YIELD: u32 = 64;

/// Monotonic completion counter shared between host and device
///
/// The device (or whatever stands in for it) advances `completed` as work
/// retires, in submission order. Values handed out by [`issue`](Timeline::issue)
/// start at 1.
#[derive(Debug)]
pub struct Timeline {
    /// Last value the device has completed
    completed: AtomicU64,
    /// Next value to hand out
    next: AtomicU64,
    /// Set once the device is gone
    lost: AtomicBool,
}

impl Timeline {
    /// Create a timeline with nothing issued and nothing completed
    pub const fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
            next: AtomicU64::new(1),
            lost: AtomicBool::new(false),
        }
    }

    /// Reserve the next point on the timeline
    pub fn issue(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of points issued so far
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }

    /// Mark every point up to `value` complete. Never moves backwards.
    pub fn signal(&self, value: u64) {
        self.completed.fetch_max(value, Ordering::Release);
    }

    /// Mark everything issued so far complete
    pub fn signal_all(&self) {
        self.signal(self.issued());
    }

    /// Last completed value
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Check if `value` has been reached
    pub fn is_reached(&self, value: u64) -> bool {
        self.completed() >= value
    }

    /// Declare the device lost; pending waits fail
    pub fn mark_lost(&self) {
        if !self.lost.swap(true, Ordering::AcqRel) {
            log::error!(
                "timeline lost with {} of {} points completed",
                self.completed(),
                self.issued()
            );
        }
    }

    /// Whether the device has been lost
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TIMELINE TOKEN
// =============================================================================

/// Completion token for one point on a [`Timeline`]
#[derive(Clone)]
pub struct TimelineToken {
    timeline: Arc<Timeline>,
    value: u64,
}

impl TimelineToken {
    /// Issue a token for the next point on `timeline`
    pub fn issue(timeline: &Arc<Timeline>) -> Self {
        let value = timeline.issue();
        Self {
            timeline: Arc::clone(timeline),
            value,
        }
    }

    /// Timeline value this token waits for
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Timeline this token belongs to
    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }
}

impl CompletionToken for TimelineToken {
    fn is_satisfied(&self) -> bool {
        self.timeline.is_reached(self.value)
    }

    fn wait(&mut self) -> Result<()> {
        #[cfg(feature = "std")]
        let mut spins = 0u32;

        loop {
            if self.timeline.is_reached(self.value) {
                return Ok(());
            }
            if self.timeline.is_lost() {
                return Err(Error::DeviceLost);
            }

            #[cfg(feature = "std")]
            {
                spins += 1;
                if spins >= SPINS_BEFORE_YIELD {
                    spins = 0;
                    std::thread::yield_now();
                    continue;
                }
            }

            core::hint::spin_loop();
        }
    }
}

impl fmt::Debug for TimelineToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineToken")
            .field("value", &self.value)
            .field("completed", &self.timeline.completed())
            .finish()
    }
}

static_assertions::assert_impl_all!(Timeline: Send, Sync);
static_assertions::assert_impl_all!(TimelineToken: Send, Sync);
