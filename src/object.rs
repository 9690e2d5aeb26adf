use crate::prelude::*;
use std::fmt;

/// Exported size of an object whose decoded length is not knowable up front
/// (the server decompresses gzip-encoded objects on the fly). A channel
/// reports this until it has drained the object, then reports the byte count
/// it actually produced.
pub const UNKNOWN_SIZE: u64 = u64::MAX;

/// Identifies one remote object: bucket, name, and optionally a pinned
/// generation. Without pinning the channel reads whatever generation the
/// server currently holds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub bucket: String,
    pub object: String,
    pub generation: Option<u64>,
}

impl ObjectHandle {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> ObjectHandle {
        ObjectHandle {
            bucket: bucket.into(),
            object: object.into(),
            generation: None,
        }
    }

    pub fn with_generation(mut self, generation: u64) -> ObjectHandle {
        self.generation = Some(generation);
        self
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.object)?;
        if let Some(generation) = self.generation {
            write!(f, "#{generation}")?;
        }
        Ok(())
    }
}

impl TryFrom<&str> for ObjectHandle {
    type Error = BlobseekError;

    /// Accepts `gs://bucket/path/to/object`, plain `bucket/path/to/object`,
    /// and an optional trailing `#generation`.
    fn try_from(s: &str) -> Result<ObjectHandle> {
        let bad = |msg: &str| BlobseekError::InvalidArgument(format!("{msg}: {s:?}"));
        let rest = s.strip_prefix("gs://").unwrap_or(s);
        let (rest, generation) = match rest.rsplit_once('#') {
            Some((rest, generation)) => {
                let generation = generation
                    .parse()
                    .map_err(|_| bad("generation is not an integer"))?;
                (rest, Some(generation))
            }
            None => (rest, None),
        };
        let (bucket, object) = rest
            .split_once('/')
            .ok_or_else(|| bad("expected bucket/object"))?;
        if bucket.is_empty() || object.is_empty() {
            return Err(bad("bucket and object must be non-empty"));
        }
        Ok(ObjectHandle {
            bucket: bucket.to_string(),
            object: object.to_string(),
            generation,
        })
    }
}

try_from_str_boilerplate!(ObjectHandle);

/// What the metadata endpoint told us about the object, fixed for the
/// lifetime of a channel. `size` is the exported size: [`UNKNOWN_SIZE`] for
/// gzip-encoded objects, whose on-disk `stored_size` says nothing about the
/// decoded length.
#[derive(Clone, Copy, Debug)]
pub struct ObjectMetadata {
    pub size: u64,
    pub stored_size: u64,
    pub generation: u64,
    pub gzip_encoded: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_handle() {
        let handle: ObjectHandle = "gs://warehouse/events/2024/part-0001.parquet"
            .parse()
            .unwrap();
        assert_eq!(handle.bucket, "warehouse");
        assert_eq!(handle.object, "events/2024/part-0001.parquet");
        assert_eq!(handle.generation, None);

        let handle: ObjectHandle = "warehouse/blob#42".parse().unwrap();
        assert_eq!(handle.bucket, "warehouse");
        assert_eq!(handle.object, "blob");
        assert_eq!(handle.generation, Some(42));
    }

    #[test]
    fn test_parse_handle_rejects_garbage() {
        assert!("just-a-bucket".parse::<ObjectHandle>().is_err());
        assert!("gs:///no-bucket".parse::<ObjectHandle>().is_err());
        assert!("bucket/".parse::<ObjectHandle>().is_err());
        assert!("bucket/object#not-a-number".parse::<ObjectHandle>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let handle = ObjectHandle::new("b", "nested/o").with_generation(7);
        assert_eq!(handle.to_string(), "gs://b/nested/o#7");
        assert_eq!(handle.to_string().parse::<ObjectHandle>().unwrap(), handle);
    }
}
