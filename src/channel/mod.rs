mod footer;
mod metadata;
mod planner;

use crate::prelude::*;

use crate::backoff::{retry_transient, BackoffSequencer};
use crate::object::{ObjectHandle, ObjectMetadata, UNKNOWN_SIZE};
use crate::options::{Fadvise, ReadOptions};
use crate::stats::ReadStats;
use crate::transport::Transport;
use footer::{footer_span, Footer};
use planner::{plan_stream_range, RangeRequest};
use std::io::{self, Read};
use std::sync::Arc;

// Scratch size for draining skipped bytes out of a live stream.
const SKIP_BUF_SIZE: usize = 8 * 1024;

struct ContentStream {
    body: Box<dyn Read + Send>,
    /// Object offset of the next unread byte in `body`.
    pos: u64,
    /// Exclusive upper bound of the request; `u64::MAX` for unbounded gzip.
    end: u64,
}

impl std::fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStream")
            .field("pos", &self.pos)
            .field("end", &self.end)
            .finish()
    }
}

/// A seekable read surface over one remote object. Single-caller: operations
/// must be serialised, but independent channels (even to the same object)
/// can run concurrently.
///
/// At most one upstream stream and one cached footer are alive at any time;
/// both are released on [`close`](ReadChannel::close) and whenever a seek
/// abandons the stream.
impl std::fmt::Debug for ReadChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadChannel")
            .field("handle", &self.handle)
            .field("position", &self.position)
            .field("mode", &self.mode)
            .field("stream", &self.stream)
            .field("closed", &self.closed)
            .finish()
    }
}

pub struct ReadChannel {
    transport: Arc<dyn Transport>,
    handle: ObjectHandle,
    options: ReadOptions,
    position: u64,
    metadata: Option<ObjectMetadata>,
    stream: Option<ContentStream>,
    mode: Fadvise,
    footer: Option<Footer>,
    /// Learned when a gzip stream is fully drained; `size()` reports it from
    /// then on.
    gzip_decoded_size: Option<u64>,
    closed: bool,
}

impl ReadChannel {
    /// Creates a channel for `handle`. With the default
    /// `fail_on_not_found`, metadata is resolved here and a missing object
    /// (or pinned-generation mismatch, or unwanted gzip encoding) fails the
    /// open; otherwise resolution waits for the first size-dependent
    /// operation.
    pub fn open(
        transport: Arc<dyn Transport>,
        handle: ObjectHandle,
        options: ReadOptions,
    ) -> Result<ReadChannel> {
        options.validate()?;
        let mode = options.fadvise;
        let mut channel = ReadChannel {
            transport,
            handle,
            options,
            position: 0,
            metadata: None,
            stream: None,
            mode,
            footer: None,
            gzip_decoded_size: None,
            closed: false,
        };
        if channel.options.fail_on_not_found {
            channel.ensure_metadata()?;
        }
        Ok(channel)
    }

    pub fn handle(&self) -> &ObjectHandle {
        &self.handle
    }

    /// True once the channel issues bounded ranged GETs: either it was opened
    /// with [`Fadvise::Random`], or it was opened with [`Fadvise::Auto`] and
    /// the access pattern triggered the (one-way) transition.
    pub fn random_access(&self) -> bool {
        self.mode == Fadvise::Random
    }

    /// The caller's current offset: the next `read` starts here.
    pub fn position(&self) -> Result<u64> {
        self.check_open()?;
        Ok(self.position)
    }

    /// Decoded object size. Resolves metadata if the channel is lazy; a
    /// failure here leaves the channel usable for another attempt. For
    /// gzip-encoded objects this is [`UNKNOWN_SIZE`] until the object has
    /// been drained once, then the actual byte count produced.
    pub fn size(&mut self) -> Result<u64> {
        self.check_open()?;
        let metadata = self.ensure_metadata()?;
        if metadata.gzip_encoded {
            return Ok(self.gzip_decoded_size.unwrap_or(UNKNOWN_SIZE));
        }
        Ok(metadata.size)
    }

    /// Repositions the channel. A small forward move drains the live stream
    /// in place; anything else abandons it (and, under [`Fadvise::Auto`],
    /// hardens the channel into random-access mode). Seeking past the end of
    /// the object is allowed; the next `read` observes it and reports
    /// end-of-file.
    pub fn seek(&mut self, target: u64) -> Result<()> {
        self.check_open()?;
        if target == self.position {
            return Ok(());
        }
        if let Some(stats) = self.options.stats() {
            stats.record_seek();
        }
        if self.metadata.map_or(false, |m| m.gzip_encoded) && target != 0 {
            return Err(BlobseekError::InvalidArgument(format!(
                "{} is gzip-encoded and reads sequentially; cannot seek from {} to {target}",
                self.handle, self.position
            )));
        }
        let small_forward_jump = target > self.position
            && target - self.position <= self.options.inplace_seek_limit;
        if small_forward_jump {
            if let Some(stream) = &self.stream {
                if stream.pos == self.position && target < stream.end {
                    trace!("seek {} -> {target}: skipping in place", self.position);
                    self.drain_stream_to(target);
                    self.position = target;
                    return Ok(());
                }
            }
        } else if self.mode == Fadvise::Auto {
            debug!(
                "{}: seek {} -> {target} looks like random access, switching to ranged reads",
                self.handle, self.position
            );
            self.mode = Fadvise::Random;
        }
        self.stream = None;
        self.position = target;
        Ok(())
    }

    /// Reads up to `buf.len()` bytes at the current position, advancing it
    /// by the count returned. `Ok(0)` means end-of-file (or an empty `buf`).
    /// Transient trouble -- open failures, mid-stream errors, streams that
    /// end before the byte they promised -- is retried internally until the
    /// backoff budget runs out.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let metadata = self.ensure_metadata()?;
        if metadata.gzip_encoded {
            if self.gzip_decoded_size.map_or(false, |size| self.position >= size) {
                return Ok(0);
            }
        } else {
            if self.position >= metadata.size {
                return Ok(0);
            }
            if let Some(n) = self.try_read_footer(buf) {
                return Ok(n);
            }
            self.maybe_prefetch_footer(metadata, buf.len() as u64)?;
            if let Some(n) = self.try_read_footer(buf) {
                return Ok(n);
            }
        }

        let mut backoff = BackoffSequencer::new(&self.options.backoff);
        loop {
            self.ensure_stream(metadata, buf.len() as u64)?;
            let Some(stream) = self.stream.as_mut() else {
                // the freshly opened stream died while draining forward
                wait_to_retry(
                    &mut backoff,
                    self.options.stats(),
                    format!("{}: could not reach byte {}", self.handle, self.position),
                )?;
                continue;
            };
            let want = (buf.len() as u64).min(stream.end - stream.pos) as usize;
            match stream.body.read(&mut buf[..want]) {
                Ok(0) if metadata.gzip_encoded => {
                    // true end of the decoded stream; now we know the size
                    self.stream = None;
                    self.gzip_decoded_size = Some(self.position);
                    debug!(
                        "{}: gzip stream drained, decoded size is {}",
                        self.handle, self.position
                    );
                    return Ok(0);
                }
                Ok(0) => {
                    warn!(
                        "{}: stream ended before byte {}, reopening",
                        self.handle, self.position
                    );
                    self.stream = None;
                    wait_to_retry(
                        &mut backoff,
                        self.options.stats(),
                        format!(
                            "{}: stream repeatedly ended before byte {}",
                            self.handle, self.position
                        ),
                    )?;
                }
                Ok(n) => {
                    stream.pos += n as u64;
                    self.position += n as u64;
                    if let Some(stats) = self.options.stats() {
                        stats.record_bytes_read(n as u64);
                    }
                    return Ok(n);
                }
                Err(err) => {
                    warn!(
                        "{}: read failed mid-stream, reopening: {err}",
                        self.handle
                    );
                    self.stream = None;
                    wait_to_retry(
                        &mut backoff,
                        self.options.stats(),
                        format!("{}: {err}", self.handle),
                    )?;
                }
            }
        }
    }

    /// Releases the stream and the footer. Every later operation fails with
    /// `ChannelClosed`; a repeated close is accepted and does nothing.
    pub fn close(&mut self) -> Result<()> {
        if !self.closed {
            trace!("closing channel for {}", self.handle);
            self.stream = None;
            self.footer = None;
            self.closed = true;
        }
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(BlobseekError::ChannelClosed);
        }
        Ok(())
    }

    fn ensure_metadata(&mut self) -> Result<ObjectMetadata> {
        if let Some(metadata) = self.metadata {
            return Ok(metadata);
        }
        let resolved =
            metadata::resolve_metadata(self.transport.as_ref(), &self.handle, &self.options)?;
        self.metadata = Some(resolved);
        Ok(resolved)
    }

    /// Serves from the cached footer when the position lies inside it.
    fn try_read_footer(&mut self, buf: &mut [u8]) -> Option<usize> {
        let footer = self.footer.as_ref()?;
        if !footer.contains(self.position) {
            return None;
        }
        let n = footer.copy_out(self.position, buf);
        self.position += n as u64;
        if let Some(stats) = self.options.stats() {
            stats.record_footer_hit(n as u64);
            stats.record_bytes_read(n as u64);
        }
        trace!("served {n} bytes from the cached footer");
        Some(n)
    }

    /// Fetches the tail region once per channel, the first time a
    /// random-access read wants bytes from it. A dedicated request,
    /// independent of the main stream.
    fn maybe_prefetch_footer(&mut self, metadata: ObjectMetadata, buf_hint: u64) -> Result<()> {
        if self.footer.is_some() || !self.random_access() || metadata.gzip_encoded {
            return Ok(());
        }
        let Some((start, len)) = footer_span(
            metadata.size,
            self.options.min_range_request_size,
            self.options.footer_prefetch_size,
        ) else {
            return Ok(());
        };
        if self.position.saturating_add(buf_hint) <= start {
            return Ok(());
        }
        debug!("{}: prefetching {len}-byte footer at {start}", self.handle);
        let transport = &self.transport;
        let handle = &self.handle;
        let last = metadata.size - 1;
        let bytes = retry_transient(
            &self.options.backoff,
            self.options.stats(),
            "footer prefetch",
            || {
                let mut range = transport.open_range(handle, start, Some(last))?;
                if range.first_byte != start {
                    return Err(crate::transport::TransportError::Fatal(format!(
                        "server started the range at byte {} instead of {start}",
                        range.first_byte
                    )));
                }
                let mut bytes = Vec::with_capacity(len as usize);
                range
                    .body
                    .read_to_end(&mut bytes)
                    .map_err(|err| {
                        crate::transport::TransportError::Transient(format!(
                            "reading footer: {err}"
                        ))
                    })?;
                if bytes.len() as u64 != len {
                    return Err(crate::transport::TransportError::Transient(format!(
                        "footer fetch returned {} of {len} bytes",
                        bytes.len()
                    )));
                }
                Ok(bytes)
            },
        )
        .map_err(|err| err.for_object(&self.handle))?;
        if let Some(stats) = self.options.stats() {
            stats.record_stream_open();
        }
        self.footer = Some(Footer { start, bytes });
        Ok(())
    }

    /// Makes sure a stream is open exactly at `position`. A retained stream
    /// is reused; a stale or exhausted one is replaced. When the server
    /// streams from 0 regardless of the range (gzip transcoding does), the
    /// gap up to `position` is drained; if that drain dies, `self.stream`
    /// ends up `None` and the caller decides whether to retry.
    fn ensure_stream(&mut self, metadata: ObjectMetadata, buf_hint: u64) -> Result<()> {
        if let Some(stream) = &self.stream {
            if stream.pos == self.position && stream.pos < stream.end {
                return Ok(());
            }
            trace!(
                "abandoning stream at {} (position {}, end {})",
                stream.pos,
                self.position,
                stream.end
            );
        }
        self.stream = None;
        let stream = self.open_stream(metadata, buf_hint)?;
        self.stream = Some(stream);
        let needs_drain = self
            .stream
            .as_ref()
            .map_or(false, |stream| stream.pos < self.position);
        if needs_drain {
            self.drain_stream_to(self.position);
        }
        Ok(())
    }

    fn open_stream(&self, metadata: ObjectMetadata, buf_hint: u64) -> Result<ContentStream> {
        let plan = if metadata.gzip_encoded {
            // ranged GETs are meaningless under transparent decompression
            RangeRequest {
                first: 0,
                last: None,
            }
        } else {
            plan_stream_range(
                self.position,
                metadata.size,
                self.random_access(),
                self.options.min_range_request_size,
                buf_hint,
                self.footer.as_ref().map(|footer| footer.start),
            )
        };
        let transport = &self.transport;
        let handle = &self.handle;
        let range = retry_transient(
            &self.options.backoff,
            self.options.stats(),
            "stream open",
            || transport.open_range(handle, plan.first, plan.last),
        )
        .map_err(|err| err.for_object(&self.handle))?;
        if range.first_byte > plan.first {
            return Err(BlobseekError::Fatal(format!(
                "{}: server started the range at byte {} instead of {}",
                self.handle, range.first_byte, plan.first
            )));
        }
        if let Some(stats) = self.options.stats() {
            stats.record_stream_open();
        }
        let end = match plan.last {
            Some(last) => last + 1,
            None if metadata.gzip_encoded => u64::MAX,
            None => metadata.size,
        };
        debug!(
            "{}: opened stream at {} (end {end})",
            self.handle, range.first_byte
        );
        Ok(ContentStream {
            body: range.body,
            pos: range.first_byte,
            end,
        })
    }

    /// Reads and discards stream bytes until `target`. On any failure the
    /// stream is dropped; the next read opens a fresh one.
    fn drain_stream_to(&mut self, target: u64) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        let mut scratch = [0u8; SKIP_BUF_SIZE];
        let mut skipped = 0u64;
        let mut healthy = true;
        while stream.pos < target {
            let want = (target - stream.pos).min(SKIP_BUF_SIZE as u64) as usize;
            match stream.body.read(&mut scratch[..want]) {
                Ok(0) => {
                    healthy = false;
                    break;
                }
                Ok(n) => {
                    stream.pos += n as u64;
                    skipped += n as u64;
                }
                Err(err) => {
                    debug!("stream died while skipping forward: {err}");
                    healthy = false;
                    break;
                }
            }
        }
        if skipped > 0 {
            if let Some(stats) = self.options.stats() {
                stats.record_forward_skip(skipped);
            }
        }
        if healthy {
            self.stream = Some(stream);
        }
    }
}

fn wait_to_retry(
    backoff: &mut BackoffSequencer,
    stats: Option<&dyn ReadStats>,
    context: String,
) -> Result<()> {
    match backoff.next_delay() {
        Some(delay) => {
            if let Some(stats) = stats {
                stats.record_retry();
            }
            std::thread::sleep(delay);
            Ok(())
        }
        None => Err(BlobseekError::Transient(context)),
    }
}

impl io::Read for ReadChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ReadChannel::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Seek for ReadChannel {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        // Basic structure cribbed from io::Cursor
        let (base_pos, offset) = match pos {
            io::SeekFrom::Start(offset) => {
                ReadChannel::seek(self, offset)?;
                return Ok(offset);
            }
            io::SeekFrom::End(offset) => {
                let size = self.size()?;
                if size == UNKNOWN_SIZE {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "cannot seek from the end of a gzip-encoded object",
                    ));
                }
                (size, offset)
            }
            io::SeekFrom::Current(offset) => (self.position, offset),
        };
        let target = if offset >= 0 {
            base_pos.checked_add(offset as u64)
        } else {
            base_pos.checked_sub(offset.wrapping_neg() as u64)
        };
        match target {
            Some(target) => {
                ReadChannel::seek(self, target)?;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
