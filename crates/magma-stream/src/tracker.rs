//! # Ring Tracker
//!
//! Segment bookkeeping for a persistently mapped ring.
//!
//! The ring is cut into `N` equal segments ([`SEGMENT_COUNT`] unless chosen
//! otherwise), each owning at most one completion token. Two boundaries split the segments at any moment:
//!
//! ```text
//!  0            pending           reclaimed          segment_count
//!  ├──────────────┼──────────────────┼──────────────────┤
//!  │ this lap,    │ free: no token,  │ previous lap,    │
//!  │ token issued │ safe to write    │ token outstanding│
//!  └──────────────┴──────────────────┴──────────────────┘
//!                      ▲ cursor lives here
//! ```
//!
//! Tokens are issued lazily: a segment gets its token at the first
//! allocation after the cursor has moved past its end, so the token covers
//! every draw the caller issued against that segment in between.

use magma_core::{align_up, CompletionToken, Result};

use crate::SEGMENT_COUNT;

// =============================================================================
// RESERVATION
// =============================================================================

/// Outcome of one [`RingTracker::reserve`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// Byte offset of the reserved region
    pub offset: u32,
    /// Contiguous bytes free from `offset`
    pub available: u32,
    /// The cursor wrapped to the start of the ring
    pub wrapped: bool,
    /// Tokens issued for segments the cursor moved past
    pub tokens_issued: u32,
    /// Waits on tokens the device had not yet satisfied
    pub blocking_waits: u32,
}

// =============================================================================
// RING TRACKER
// =============================================================================

/// Write cursor and per-segment completion tokens of a ring buffer
#[derive(Debug)]
pub struct RingTracker<T, const N: usize = SEGMENT_COUNT> {
    /// Ring size in bytes
    capacity: u32,
    /// Bytes per segment (the last segment may be short)
    segment_size: u32,
    /// Segments that actually overlap the ring
    segment_count: u32,
    /// Next byte to write
    cursor: u32,
    /// First segment without a token in the current lap
    pending: u32,
    /// End of the run of free segments starting at `pending`
    reclaimed: u32,
    /// One token slot per segment
    slots: [Option<T>; N],
}

impl<T: CompletionToken, const N: usize> RingTracker<T, N> {
    /// Create a tracker for a ring of `capacity` bytes, all of it free
    pub fn new(capacity: u32) -> Self {
        stream_assert!(capacity > 0, "ring capacity must be non-zero");
        stream_assert!(N > 0, "ring needs at least one segment");

        let segment_size = capacity.div_ceil(N.max(1) as u32).max(1);
        let segment_count = capacity.div_ceil(segment_size);

        Self {
            capacity,
            segment_size,
            segment_count,
            cursor: 0,
            pending: 0,
            reclaimed: segment_count,
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Ring size in bytes
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Bytes per segment
    pub fn segment_size(&self) -> u32 {
        self.segment_size
    }

    /// Segments overlapping the ring
    pub fn segment_count(&self) -> u32 {
        self.segment_count
    }

    /// Next byte to write
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// First segment without a token in the current lap
    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// End of the free run of segments
    pub fn reclaimed(&self) -> u32 {
        self.reclaimed
    }

    /// Whether `segment` currently holds a token
    pub fn has_token(&self, segment: u32) -> bool {
        self.slots
            .get(segment as usize)
            .is_some_and(|slot| slot.is_some())
    }

    /// Number of tokens held
    pub fn outstanding(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Segment containing byte `offset`
    pub fn segment_for_offset(&self, offset: u32) -> u32 {
        offset / self.segment_size
    }

    /// Contiguous free bytes from the cursor
    pub fn available(&self) -> u32 {
        let end = self
            .reclaimed
            .saturating_mul(self.segment_size)
            .min(self.capacity);
        end.saturating_sub(self.cursor)
    }

    /// Give a token to every segment lying wholly before `offset`.
    ///
    /// `offset` at or past the end of the ring covers the short last segment
    /// too.
    fn issue_through<F>(&mut self, offset: u32, issue: &mut F) -> Result<u32>
    where
        F: FnMut() -> Result<T>,
    {
        let end = if offset >= self.capacity {
            self.segment_count
        } else {
            self.segment_for_offset(offset)
        };

        let mut issued = 0;
        while self.pending < end {
            let slot = &mut self.slots[self.pending as usize];
            debug_assert!(slot.is_none(), "segment {} already fenced", self.pending);
            *slot = Some(issue()?);
            self.pending += 1;
            issued += 1;
        }
        Ok(issued)
    }

    /// Wait on one segment's token and release it. Returns whether the wait
    /// actually had to block.
    fn wait_segment(&mut self, segment: u32) -> Result<bool> {
        let slot = &mut self.slots[segment as usize];
        let Some(token) = slot.as_mut() else {
            return Ok(false);
        };

        let blocked = !token.is_satisfied();
        if blocked {
            log::trace!("ring blocked on segment {}", segment);
        }
        token.wait()?;
        *slot = None;
        Ok(blocked)
    }

    /// Reclaim every segment up to and including the one holding `offset`
    fn reclaim_through(&mut self, offset: u32) -> Result<u32> {
        let end = self
            .segment_for_offset(offset)
            .saturating_add(1)
            .min(self.segment_count);

        let mut blocked = 0;
        while self.reclaimed < end {
            if self.wait_segment(self.reclaimed)? {
                blocked += 1;
            }
            self.reclaimed += 1;
        }
        Ok(blocked)
    }

    /// Find room for `size` bytes at `alignment`, waiting for the device
    /// where the room is still in use.
    ///
    /// `issue` creates a completion token covering all work submitted so far.
    pub fn reserve<F>(&mut self, alignment: u32, size: u32, mut issue: F) -> Result<Reservation>
    where
        F: FnMut() -> Result<T>,
    {
        stream_assert!(alignment > 0, "alignment must be non-zero");
        stream_assert!(
            size <= self.capacity,
            "allocation of {} bytes exceeds ring capacity {}",
            size,
            self.capacity
        );

        if self.cursor > 0 {
            self.cursor = align_up(self.cursor, alignment);
        }

        // Fence writes made since the last reservation, then make sure the
        // space we are about to hand out is no longer in use.
        let mut tokens_issued = self.issue_through(self.cursor, &mut issue)?;
        let mut blocking_waits = self.reclaim_through(self.cursor.saturating_add(size))?;

        let wrapped = self.cursor >= self.capacity
            || self.cursor as u64 + size as u64 > self.capacity as u64;
        if wrapped {
            // Fence the tail of the buffer, then restart at the front. Every
            // segment now holds a token from the lap just finished, so a wait
            // that fails below leaves a state the next call waits from again.
            tokens_issued += self.issue_through(self.capacity, &mut issue)?;
            self.cursor = 0;
            self.pending = 0;
            self.reclaimed = 0;

            blocking_waits += self.reclaim_through(size)?;

            log::trace!("ring wrapped, {} segments reclaimed", self.reclaimed);
        }

        debug_assert!(self.pending <= self.reclaimed);
        debug_assert!(self.reclaimed <= self.segment_count);

        let available = self.available();
        debug_assert!(size <= available || size == 0);

        Ok(Reservation {
            offset: self.cursor,
            available,
            wrapped,
            tokens_issued,
            blocking_waits,
        })
    }

    /// Move the cursor past `used` bytes written at the last reservation
    pub fn advance(&mut self, used: u32) {
        stream_assert!(
            self.cursor as u64 + used as u64 <= self.capacity as u64,
            "commit of {} bytes at {} overruns ring capacity {}",
            used,
            self.cursor,
            self.capacity
        );
        self.cursor += used;
    }

    /// Wait on and release every outstanding token.
    ///
    /// Every token is waited on and released even if one fails; the first
    /// failure is returned. Oldest tokens (previous lap) are drained first.
    pub fn drain(&mut self) -> Result<usize> {
        let mut first_error = None;
        let mut drained = 0;

        let order = (self.reclaimed..self.segment_count).chain(0..self.pending);
        for segment in order {
            if let Some(mut token) = self.slots[segment as usize].take() {
                drained += 1;
                if let Err(err) = token.wait() {
                    first_error.get_or_insert(err);
                }
            }
        }

        // Anything left was never in the expected bands; release it anyway
        for slot in self.slots.iter_mut() {
            if let Some(mut token) = slot.take() {
                drained += 1;
                if let Err(err) = token.wait() {
                    first_error.get_or_insert(err);
                }
            }
        }

        self.pending = 0;
        self.reclaimed = self.segment_count;

        match first_error {
            Some(err) => Err(err),
            None => Ok(drained),
        }
    }
}
