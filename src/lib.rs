//! Seekable reads over a remote blob store.
//!
//! The heart of the crate is [`ReadChannel`]: a POSIX-flavoured
//! `{size, position, seek, read, close}` surface over one immutable,
//! generationally-versioned remote object, built for data engines that mix
//! long sequential scans with columnar footer probes and random access. The
//! channel keeps at most one upstream stream alive, decides between
//! streaming and bounded ranged GETs based on the observed access pattern,
//! drains small forward seeks in place instead of reconnecting, caches the
//! object's tail once for footer probes, and absorbs transient server
//! failures with truncated exponential backoff.
//!
//! The wire side lives behind the [`Transport`] trait; [`HttpTransport`] is
//! the HTTP/JSON implementation.

#![forbid(unsafe_code)]

mod backoff;
mod channel;
mod error;
mod object;
mod options;
mod prelude;
mod stats;
mod transport;
mod util;

#[cfg(test)]
mod test_util;

pub use crate::backoff::BackoffSequencer;
pub use crate::channel::ReadChannel;
pub use crate::error::{BlobseekError, Result};
pub use crate::object::{ObjectHandle, ObjectMetadata, UNKNOWN_SIZE};
pub use crate::options::{BackoffPolicy, Fadvise, ReadOptions};
pub use crate::stats::ReadStats;
pub use crate::transport::{
    http::HttpTransport, RangeStream, RawMetadata, Transport, TransportError,
};
