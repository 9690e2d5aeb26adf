/// The prefetched tail of the object. Columnar formats keep their indices
/// here, so one ranged GET up front turns the usual flurry of small tail
/// probes into memory copies.
pub(crate) struct Footer {
    pub(crate) start: u64,
    pub(crate) bytes: Vec<u8>,
}

impl Footer {
    pub(crate) fn end(&self) -> u64 {
        self.start + self.bytes.len() as u64
    }

    pub(crate) fn contains(&self, position: u64) -> bool {
        position >= self.start && position < self.end()
    }

    /// Copies as much as fits, starting at `position`. Callers check
    /// `contains` first.
    pub(crate) fn copy_out(&self, position: u64, buf: &mut [u8]) -> usize {
        let offset = (position - self.start) as usize;
        let n = buf.len().min(self.bytes.len() - offset);
        buf[..n].copy_from_slice(&self.bytes[offset..offset + n]);
        n
    }
}

/// The `(start, length)` of the tail region eligible for prefetch, or `None`
/// when the object is empty. The region never exceeds the object itself.
pub(crate) fn footer_span(size: u64, min_range: u64, prefetch: u64) -> Option<(u64, u64)> {
    let len = min_range.max(prefetch).min(size);
    if len == 0 {
        return None;
    }
    Some((size - len, len))
}
