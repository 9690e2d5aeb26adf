use crate::prelude::*;

use crate::object::ObjectHandle;
use crate::stats::ReadStats;
use crate::transport::{RangeStream, RawMetadata, Transport, TransportError};
use std::collections::VecDeque;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use warp::http::Response;
use warp::Filter;

pub(crate) struct FakeObject {
    pub(crate) data: Vec<u8>,
    pub(crate) generation: u64,
    pub(crate) content_encoding: Option<String>,
}

/// In-memory transport for exercising the channel state machine. Records
/// every successful request (`"metadata"`, or the literal range header like
/// `"bytes=5-"`), and can be scripted to fail or truncate upcoming calls.
#[derive(Default)]
pub(crate) struct FakeTransport {
    objects: HashMap<(String, String), FakeObject>,
    requests: Mutex<Vec<String>>,
    metadata_failures: Mutex<VecDeque<TransportError>>,
    open_failures: Mutex<VecDeque<TransportError>>,
    truncate_next: Mutex<Option<usize>>,
}

impl FakeTransport {
    pub(crate) fn new() -> FakeTransport {
        FakeTransport::default()
    }

    pub(crate) fn add_object(&mut self, bucket: &str, object: &str, data: Vec<u8>) {
        self.add_object_with_generation(bucket, object, data, 1);
    }

    pub(crate) fn add_object_with_generation(
        &mut self,
        bucket: &str,
        object: &str,
        data: Vec<u8>,
        generation: u64,
    ) {
        self.objects.insert(
            (bucket.to_string(), object.to_string()),
            FakeObject {
                data,
                generation,
                content_encoding: None,
            },
        );
    }

    /// `data` is the decoded content; the transport serves it whole, the way
    /// a transcoding server would.
    pub(crate) fn add_gzip_object(&mut self, bucket: &str, object: &str, data: Vec<u8>) {
        self.objects.insert(
            (bucket.to_string(), object.to_string()),
            FakeObject {
                data,
                generation: 1,
                content_encoding: Some("gzip".to_string()),
            },
        );
    }

    pub(crate) fn fail_metadata(&self, err: TransportError) {
        self.metadata_failures.lock().unwrap().push_back(err);
    }

    pub(crate) fn fail_open(&self, err: TransportError) {
        self.open_failures.lock().unwrap().push_back(err);
    }

    /// The next successful open serves only `n` bytes of its range, then
    /// ends the stream early.
    pub(crate) fn truncate_next_open(&self, n: usize) {
        *self.truncate_next.lock().unwrap() = Some(n);
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Only the content requests, in order, as literal `Range` header values.
    pub(crate) fn media_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r != "metadata")
            .collect()
    }

    fn lookup(&self, handle: &ObjectHandle) -> Result<&FakeObject, TransportError> {
        self.objects
            .get(&(handle.bucket.clone(), handle.object.clone()))
            .ok_or(TransportError::NotFound)
    }
}

impl Transport for FakeTransport {
    fn fetch_metadata(&self, handle: &ObjectHandle) -> Result<RawMetadata, TransportError> {
        if let Some(err) = self.metadata_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let object = self.lookup(handle)?;
        self.requests.lock().unwrap().push("metadata".to_string());
        Ok(RawMetadata {
            size: object.data.len() as u64,
            generation: object.generation,
            content_encoding: object.content_encoding.clone(),
        })
    }

    fn open_range(
        &self,
        handle: &ObjectHandle,
        first_byte: u64,
        last_byte: Option<u64>,
    ) -> Result<RangeStream, TransportError> {
        if let Some(err) = self.open_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let object = self.lookup(handle)?;
        if let Some(pinned) = handle.generation {
            if pinned != object.generation {
                return Err(TransportError::NotFound);
            }
        }
        let header = match last_byte {
            Some(last) => format!("bytes={first_byte}-{last}"),
            None => format!("bytes={first_byte}-"),
        };
        self.requests.lock().unwrap().push(header);

        let len = object.data.len() as u64;
        let start = first_byte.min(len) as usize;
        let end = last_byte.map_or(len, |last| (last + 1).min(len)) as usize;
        let mut slice = object.data[start..end].to_vec();
        if let Some(n) = self.truncate_next.lock().unwrap().take() {
            slice.truncate(n);
        }
        Ok(RangeStream {
            body: Box::new(Cursor::new(slice)),
            first_byte,
            content_encoding: object.content_encoding.clone(),
        })
    }
}

/// A stats sink that just counts, for asserting on channel behaviour.
#[derive(Default)]
pub(crate) struct CountingStats {
    bytes_read: AtomicU64,
    stream_opens: AtomicU64,
    forward_skips: AtomicU64,
    footer_hits: AtomicU64,
    seeks: AtomicU64,
    retries: AtomicU64,
}

impl CountingStats {
    pub(crate) fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::SeqCst)
    }

    pub(crate) fn stream_opens(&self) -> u64 {
        self.stream_opens.load(Ordering::SeqCst)
    }

    pub(crate) fn forward_skips(&self) -> u64 {
        self.forward_skips.load(Ordering::SeqCst)
    }

    pub(crate) fn footer_hits(&self) -> u64 {
        self.footer_hits.load(Ordering::SeqCst)
    }

    pub(crate) fn seeks(&self) -> u64 {
        self.seeks.load(Ordering::SeqCst)
    }

    pub(crate) fn retries(&self) -> u64 {
        self.retries.load(Ordering::SeqCst)
    }
}

impl ReadStats for CountingStats {
    fn record_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::SeqCst);
    }

    fn record_stream_open(&self) {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
    }

    fn record_forward_skip(&self, n: u64) {
        self.forward_skips.fetch_add(n, Ordering::SeqCst);
    }

    fn record_footer_hit(&self, n: u64) {
        self.footer_hits.fetch_add(n, Ordering::SeqCst);
    }

    fn record_seek(&self) {
        self.seeks.fetch_add(1, Ordering::SeqCst);
    }

    fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct ServedObject {
    pub(crate) data: Vec<u8>,
    pub(crate) generation: u64,
    pub(crate) content_encoding: Option<String>,
}

type ObjectMap = HashMap<(String, String), ServedObject>;

/// A real HTTP blob service on an ephemeral local port: JSON metadata at
/// `storage/v1/b/{bucket}/o/{object}` and ranged media via `alt=media`.
/// Records the `Range` header of every media request.
pub(crate) struct FakeBlobServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    fail_next: Arc<AtomicUsize>,
    _runtime: tokio::runtime::Runtime,
}

impl FakeBlobServer {
    pub(crate) fn start(objects: Vec<((&str, &str), ServedObject)>) -> FakeBlobServer {
        let objects: Arc<ObjectMap> = Arc::new(
            objects
                .into_iter()
                .map(|((bucket, object), served)| {
                    ((bucket.to_string(), object.to_string()), served)
                })
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));
        let fail_next = Arc::new(AtomicUsize::new(0));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let handler = {
            let objects = objects.clone();
            let requests = requests.clone();
            let fail_next = fail_next.clone();
            move |bucket: String,
                  object: String,
                  query: HashMap<String, String>,
                  range: Option<String>| {
                respond(&objects, &requests, &fail_next, &bucket, &object, &query, range.as_deref())
            }
        };
        let routes = warp::get()
            .and(warp::path!("storage" / "v1" / "b" / String / "o" / String))
            .and(warp::query::<HashMap<String, String>>())
            .and(warp::header::optional::<String>("range"))
            .map(handler);

        let guard = runtime.enter();
        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        runtime.spawn(server);
        drop(guard);

        FakeBlobServer {
            addr,
            requests,
            fail_next,
            _runtime: runtime,
        }
    }

    pub(crate) fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).unwrap()
    }

    /// Make the next `n` requests fail with 503.
    pub(crate) fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub(crate) fn media_requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn respond(
    objects: &ObjectMap,
    requests: &Mutex<Vec<String>>,
    fail_next: &AtomicUsize,
    bucket: &str,
    object: &str,
    query: &HashMap<String, String>,
    range: Option<&str>,
) -> Response<Vec<u8>> {
    fn status(code: u16) -> Response<Vec<u8>> {
        Response::builder()
            .status(code)
            .body(Vec::new())
            .unwrap()
    }

    if fail_next
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return status(503);
    }
    let Some(served) = objects.get(&(bucket.to_string(), object.to_string())) else {
        return status(404);
    };
    if let Some(generation) = query.get("generation") {
        if generation.parse::<u64>().ok() != Some(served.generation) {
            return status(404);
        }
    }

    if query.get("alt").map(String::as_str) == Some("media") {
        requests
            .lock()
            .unwrap()
            .push(range.unwrap_or("-").to_string());
        serve_media(served, range)
    } else {
        let mut resource = serde_json::json!({
            "size": served.data.len().to_string(),
            "generation": served.generation.to_string(),
        });
        if let Some(encoding) = &served.content_encoding {
            resource["contentEncoding"] = serde_json::json!(encoding);
        }
        Response::builder()
            .header("Content-Type", "application/json")
            .body(resource.to_string().into_bytes())
            .unwrap()
    }
}

fn serve_media(served: &ServedObject, range: Option<&str>) -> Response<Vec<u8>> {
    static RANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^bytes=([0-9]+)-([0-9]*)$").unwrap());

    let len = served.data.len() as u64;
    // transcoding servers stream the decoded object whole, whatever the range
    if served.content_encoding.is_some() {
        return Response::builder()
            .status(200)
            .body(served.data.clone())
            .unwrap();
    }
    match range.and_then(|header| RANGE_RE.captures(header)) {
        Some(captures) => {
            let first: u64 = captures[1].parse().unwrap();
            let last: u64 = captures
                .get(2)
                .filter(|m| !m.as_str().is_empty())
                .map_or(len.saturating_sub(1), |m| m.as_str().parse().unwrap())
                .min(len.saturating_sub(1));
            if first >= len {
                return Response::builder()
                    .status(416)
                    .header("Content-Range", format!("bytes */{len}"))
                    .body(Vec::new())
                    .unwrap();
            }
            let body = served.data[first as usize..=last as usize].to_vec();
            Response::builder()
                .status(206)
                .header("Content-Range", format!("bytes {first}-{last}/{len}"))
                .body(body)
                .unwrap()
        }
        None => Response::builder()
            .status(200)
            .body(served.data.clone())
            .unwrap(),
    }
}
