/// The byte range for the next stream open: `first` inclusive, `last`
/// inclusive when bounded.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RangeRequest {
    pub(crate) first: u64,
    pub(crate) last: Option<u64>,
}

/// Picks the span of the next content request. Sequential access (including
/// Auto before its transition) streams to end-of-object in one request;
/// random access asks for the larger of the configured minimum and the
/// caller's buffer, clipped to the object and to just before an
/// already-cached footer so cached bytes are never refetched.
///
/// Callers guarantee `position < size`.
pub(crate) fn plan_stream_range(
    position: u64,
    size: u64,
    random_access: bool,
    min_range: u64,
    buf_hint: u64,
    cached_footer_start: Option<u64>,
) -> RangeRequest {
    if !random_access {
        return RangeRequest {
            first: position,
            last: None,
        };
    }
    let span = min_range.max(buf_hint).max(1);
    let mut last = (size - 1).min(position.saturating_add(span) - 1);
    if let Some(footer_start) = cached_footer_start {
        if last >= footer_start && position < footer_start {
            last = footer_start - 1;
        }
    }
    RangeRequest {
        first: position,
        last: Some(last),
    }
}
