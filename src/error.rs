use crate::object::ObjectHandle;
use std::io;
use thiserror::Error;

pub type Result<T, E = BlobseekError> = std::result::Result<T, E>;

/// Everything a read channel can fail with. `Transient` only surfaces once
/// the retry budget is exhausted; all other kinds are terminal for the
/// operation that produced them.
#[derive(Error, Debug)]
pub enum BlobseekError {
    #[error("object not found: {0}")]
    FileNotFound(ObjectHandle),
    #[error("{handle}: requested generation {requested} but the server holds {actual}")]
    GenerationMismatch {
        handle: ObjectHandle,
        requested: u64,
        actual: u64,
    },
    #[error("{0} is gzip-encoded; open the channel with gzip support to read it")]
    GzipUnsupported(ObjectHandle),
    #[error("gave up retrying: {0}")]
    Transient(String),
    #[error("server rejected the request: {0}")]
    Fatal(String),
    #[error("channel is closed")]
    ChannelClosed,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<BlobseekError> for io::Error {
    fn from(err: BlobseekError) -> io::Error {
        let kind = match &err {
            BlobseekError::FileNotFound(_) => io::ErrorKind::NotFound,
            BlobseekError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            BlobseekError::Transient(_) => io::ErrorKind::TimedOut,
            BlobseekError::ChannelClosed => io::ErrorKind::BrokenPipe,
            BlobseekError::GenerationMismatch { .. }
            | BlobseekError::GzipUnsupported(_)
            | BlobseekError::Fatal(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
