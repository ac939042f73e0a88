//! # Stream Statistics

/// Counters kept by every streaming strategy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Calls to `allocate`
    pub allocations: u64,
    /// Calls to `commit` with a non-zero size
    pub commits: u64,
    /// Total bytes committed
    pub bytes_committed: u64,
    /// Uploads issued to the device (staging strategies)
    pub uploads: u64,
    /// Times the write cursor wrapped to the start of the ring
    pub wraps: u64,
    /// Completion tokens issued
    pub tokens_issued: u64,
    /// Waits on tokens the device had not yet satisfied
    pub blocking_waits: u64,
}

impl StreamStats {
    /// Record one commit of `bytes`
    pub(crate) fn record_commit(&mut self, bytes: u32) {
        if bytes > 0 {
            self.commits += 1;
            self.bytes_committed += bytes as u64;
        }
    }
}

static_assertions::assert_impl_all!(StreamStats: Send, Sync, Clone);
