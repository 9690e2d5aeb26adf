use crate::prelude::*;

use crate::backoff::retry_transient;
use crate::object::{ObjectHandle, ObjectMetadata, UNKNOWN_SIZE};
use crate::options::ReadOptions;
use crate::transport::Transport;

/// One metadata round-trip, retried on transient failures, with the gzip and
/// generation policies applied. The channel caches the result for its whole
/// lifetime; this is never called twice for a resolved channel.
pub(crate) fn resolve_metadata(
    transport: &dyn Transport,
    handle: &ObjectHandle,
    options: &ReadOptions,
) -> Result<ObjectMetadata> {
    let raw = retry_transient(&options.backoff, options.stats(), "metadata fetch", || {
        transport.fetch_metadata(handle)
    })
    .map_err(|err| err.for_object(handle))?;

    let gzip_encoded = raw
        .content_encoding
        .as_deref()
        .map_or(false, |encoding| encoding.to_ascii_lowercase().contains("gzip"));
    if gzip_encoded && options.fail_on_gzip {
        return Err(BlobseekError::GzipUnsupported(handle.clone()));
    }
    if let Some(requested) = handle.generation {
        if requested != raw.generation {
            return Err(BlobseekError::GenerationMismatch {
                handle: handle.clone(),
                requested,
                actual: raw.generation,
            });
        }
    }
    // The decoded length of a gzip object is unknowable until we drain it;
    // export the sentinel and keep the stored size for the curious.
    let size = if gzip_encoded { UNKNOWN_SIZE } else { raw.size };
    debug!(
        "resolved {handle}: size={size} generation={} gzip={gzip_encoded}",
        raw.generation
    );
    Ok(ObjectMetadata {
        size,
        stored_size: raw.size,
        generation: raw.generation,
        gzip_encoded,
    })
}
