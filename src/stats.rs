use auto_impl::auto_impl;

/// Observation hooks for the surrounding filesystem façade. Every method has
/// a no-op default, so a sink only implements the counters it cares about.
/// The channel never aggregates anything itself.
#[auto_impl(&, Box, Arc)]
pub trait ReadStats: Send + Sync {
    /// Bytes handed to the caller, from the network or the footer cache.
    fn record_bytes_read(&self, _n: u64) {}
    /// A new upstream stream was opened (including footer prefetches).
    fn record_stream_open(&self) {}
    /// Bytes drained and discarded to satisfy an in-place forward seek.
    fn record_forward_skip(&self, _n: u64) {}
    /// Bytes served out of the cached footer without touching the network.
    fn record_footer_hit(&self, _n: u64) {}
    /// A position change requested by the caller.
    fn record_seek(&self) {}
    /// A transient failure that is about to be retried.
    fn record_retry(&self) {}
}
