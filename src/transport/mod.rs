pub mod http;

use crate::error::BlobseekError;
use crate::object::ObjectHandle;
use auto_impl::auto_impl;
use std::io::Read;
use thiserror::Error;

/// Adapter-level failure taxonomy. The adapter classifies, it never retries;
/// the channel's backoff loop decides what to do with `Transient`.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("object does not exist")]
    NotFound,
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("{0}")]
    Fatal(String),
}

impl TransportError {
    /// Attach the object's identity and lift into the channel taxonomy.
    pub(crate) fn for_object(self, handle: &ObjectHandle) -> BlobseekError {
        match self {
            TransportError::NotFound => BlobseekError::FileNotFound(handle.clone()),
            TransportError::Transient(msg) => BlobseekError::Transient(format!("{handle}: {msg}")),
            TransportError::Fatal(msg) => BlobseekError::Fatal(format!("{handle}: {msg}")),
        }
    }
}

/// What the metadata endpoint reports about the current object. There is no
/// generation filter here on purpose: the resolver compares the live
/// generation against a pinned one itself, so it can tell "wrong generation"
/// apart from "no such object".
#[derive(Clone, Debug)]
pub struct RawMetadata {
    pub size: u64,
    pub generation: u64,
    pub content_encoding: Option<String>,
}

/// An open content stream plus the response facts the channel needs.
/// `first_byte` is where the stream actually starts (from `Content-Range`),
/// which may be 0 when the server ignores ranges.
pub struct RangeStream {
    pub body: Box<dyn Read + Send>,
    pub first_byte: u64,
    pub content_encoding: Option<String>,
}

/// A capability set over the blob service: one metadata probe, one ranged
/// open. Implementations are interchangeable behind this contract (the
/// HTTP/JSON adapter ships here; a streaming RPC adapter would slot in the
/// same way).
#[auto_impl(&, Box, Arc)]
pub trait Transport: Send + Sync {
    fn fetch_metadata(&self, handle: &ObjectHandle) -> Result<RawMetadata, TransportError>;

    /// Open `[first_byte, last_byte]` (inclusive), or `[first_byte, ∞)` when
    /// `last_byte` is `None`. A generation pinned in the handle is included
    /// in the request; the server answers a mismatch with not-found.
    fn open_range(
        &self,
        handle: &ObjectHandle,
        first_byte: u64,
        last_byte: Option<u64>,
    ) -> Result<RangeStream, TransportError>;
}
