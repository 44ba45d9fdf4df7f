/// Write aggregation for pipelined requests.
///
/// While a request is being served out of bytes that arrived together with
/// the previous one, its response is held in the sink's staging buffer so
/// that the responses to a burst of pipelined requests leave in one write.
/// Held bytes are released once they pass the threshold, on an explicit
/// flush, on shutdown, and before the transport is read again.
#[derive(Debug, Clone)]
pub struct PipeliningBuffer {
    enabled: bool,
    threshold: usize,
    active: bool,
}

impl PipeliningBuffer {
    pub fn new(enabled: bool, threshold: usize) -> Self {
        Self { enabled, threshold, active: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether responses are currently being held.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Re-evaluates aggregation for the next exchange.
    ///
    /// `pipelined` tells whether more request bytes are already buffered.
    pub fn reset(&mut self, pipelined: bool) {
        self.active = self.enabled && pipelined;
    }

    /// Whether `staged` bytes may stay in the staging buffer for now.
    pub fn should_hold(&self, staged: usize) -> bool {
        self.active && staged < self.threshold
    }
}
