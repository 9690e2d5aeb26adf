use crate::prelude::*;

use super::{RangeStream, RawMetadata, Transport, TransportError};
use crate::object::ObjectHandle;
use serde_with::{serde_as, DisplayFromStr};
use std::io;
use std::time::Duration;
use ureq::{Agent, AgentBuilder};

// This is my attempt to pick out the transport-level failures that seem
// (potentially) worth retrying.
use ureq::ErrorKind::*;
const RETRY_ERRORKIND: &[ureq::ErrorKind] =
    &[Dns, ConnectionFailed, TooManyRedirects, Io, ProxyConnect];

fn status_is_transient(status: u16) -> bool {
    matches!(status, 408 | 429) || (500..=599).contains(&status)
}

fn new_agent() -> Agent {
    AgentBuilder::new()
        .user_agent(concat!("blobseek/", env!("CARGO_PKG_VERSION")))
        .timeout_read(Duration::from_secs(15))
        .timeout_write(Duration::from_secs(15))
        .build()
}

fn map_ureq_err(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Status(404, _) => TransportError::NotFound,
        ureq::Error::Status(status, _) if status_is_transient(status) => {
            TransportError::Transient(format!("http status {status}"))
        }
        ureq::Error::Status(status, response) => TransportError::Fatal(format!(
            "http status {status} {}",
            response.status_text()
        )),
        err @ ureq::Error::Transport(_) => {
            if RETRY_ERRORKIND.contains(&err.kind()) {
                TransportError::Transient(err.to_string())
            } else {
                TransportError::Fatal(err.to_string())
            }
        }
    }
}

/// The blob service's object resource, as served by the JSON API. Numeric
/// fields arrive as decimal strings.
#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    #[serde_as(as = "DisplayFromStr")]
    size: u64,
    #[serde_as(as = "DisplayFromStr")]
    generation: u64,
    content_encoding: Option<String>,
}

/// HTTP/JSON adapter: metadata probes against `storage/v1/b/{bucket}/o/{object}`
/// and ranged media GETs against the same resource with `alt=media`.
#[derive(Clone)]
pub struct HttpTransport {
    agent: Agent,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: Url) -> HttpTransport {
        HttpTransport {
            agent: new_agent(),
            base_url,
        }
    }

    /// For callers that want to share an agent (connection pool, custom
    /// timeouts) across transports.
    pub fn with_agent(base_url: Url, agent: Agent) -> HttpTransport {
        HttpTransport { agent, base_url }
    }

    fn object_url(&self, handle: &ObjectHandle) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Fatal(format!("base url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", handle.bucket.as_str(), "o", handle.object.as_str()]);
        Ok(url)
    }
}

impl Transport for HttpTransport {
    fn fetch_metadata(&self, handle: &ObjectHandle) -> Result<RawMetadata, TransportError> {
        let url = self.object_url(handle)?;
        trace!("fetching metadata: {url}");
        let response = self
            .agent
            .request_url("GET", &url)
            .call()
            .map_err(map_ureq_err)?;
        let resource: ObjectResource = response.into_json().map_err(|err| {
            if err.kind() == io::ErrorKind::InvalidData {
                TransportError::Fatal(format!("malformed object resource: {err}"))
            } else {
                TransportError::Transient(format!("reading object resource: {err}"))
            }
        })?;
        Ok(RawMetadata {
            size: resource.size,
            generation: resource.generation,
            content_encoding: resource.content_encoding,
        })
    }

    fn open_range(
        &self,
        handle: &ObjectHandle,
        first_byte: u64,
        last_byte: Option<u64>,
    ) -> Result<RangeStream, TransportError> {
        // The full Content-Range syntax has a bunch of possibilities that
        // this doesn't account for:
        //   https://datatracker.ietf.org/doc/html/rfc7233#section-4.2
        // but this is the only format that's actually *useful* to us.
        static CONTENT_RANGE_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^bytes ([0-9]+)-[0-9]+/([0-9]+)$").unwrap());

        let mut url = self.object_url(handle)?;
        url.query_pairs_mut().append_pair("alt", "media");
        if let Some(generation) = handle.generation {
            url.query_pairs_mut()
                .append_pair("generation", &generation.to_string());
        }
        let range_header = match last_byte {
            Some(last) => format!("bytes={first_byte}-{last}"),
            None => format!("bytes={first_byte}-"),
        };
        trace!("opening {url} with Range: {range_header}");
        let response = self
            .agent
            .request_url("GET", &url)
            .set("Range", &range_header)
            .call()
            .map_err(map_ureq_err)?;
        let content_encoding = response.header("Content-Encoding").map(String::from);
        let first_byte = match response.status() {
            // 206 Partial Content
            206 => match response.header("Content-Range") {
                None => {
                    return Err(TransportError::Fatal(
                        "206 response is missing Content-Range".into(),
                    ))
                }
                Some(content_range) => match CONTENT_RANGE_RE.captures(content_range) {
                    None => {
                        return Err(TransportError::Fatal(format!(
                            "failed to parse Content-Range {content_range:?}"
                        )))
                    }
                    // unwraps safe because the group always matches a valid int
                    Some(captures) => captures.get(1).unwrap().as_str().parse().map_err(|_| {
                        TransportError::Fatal(format!(
                            "Content-Range offset out of range in {content_range:?}"
                        ))
                    })?,
                },
            },
            // 200 Ok -> the server is streaming from the start, either
            // because we asked for bytes=0- or because it ignores ranges
            // (gzip transcoding does)
            200 => 0,
            status => {
                return Err(TransportError::Fatal(format!(
                    "expected 200 or 206 HTTP response, not {status}"
                )))
            }
        };
        Ok(RangeStream {
            body: Box::new(response.into_reader()),
            first_byte,
            content_encoding,
        })
    }
}
