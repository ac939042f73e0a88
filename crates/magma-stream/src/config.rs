//! # Stream Configuration

/// Construction-time options for a streaming buffer
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Request a coherent persistent mapping.
    ///
    /// With `false` the persistent strategy flushes each committed range
    /// explicitly. Devices lacking the requested mode get the other one.
    pub coherent: bool,
    /// Rank the sub-range upload strategy ahead of orphaning.
    ///
    /// Some drivers (notably NVIDIA's) serve in-place sub-range updates
    /// faster than whole-store replacement, while tile-based mobile drivers
    /// stall on them. Persistent mapping still ranks first.
    pub prefer_sub_data: bool,
    /// Debug name used in log messages
    pub label: Option<&'static str>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            coherent: true,
            prefer_sub_data: false,
            label: None,
        }
    }
}

impl StreamConfig {
    /// Set the debug label
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    /// Request an explicitly flushed mapping instead of a coherent one
    pub fn non_coherent(mut self) -> Self {
        self.coherent = false;
        self
    }

    /// Prefer sub-range uploads over orphaning
    pub fn prefer_sub_data(mut self) -> Self {
        self.prefer_sub_data = true;
        self
    }

    /// Label for log messages
    pub fn display_label(&self) -> &'static str {
        self.label.unwrap_or("stream")
    }
}
