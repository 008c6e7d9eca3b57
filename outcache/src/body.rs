//! Response bodies produced by the middleware.
//!
//! [`CaptureBody`] is the write-through capture wrapper: every data frame
//! the downstream produces is forwarded to the client unmodified while a
//! copy accumulates in a bounded, segmented buffer. When the stream ends
//! cleanly the buffered bytes are committed to storage; overflow, client
//! abort and downstream errors all degrade to plain pass-through.
//!
//! [`OutputCacheBody`] is the unified body type the middleware returns:
//! untouched pass-through, capture, or replay of previously cached bytes.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use futures::future::BoxFuture;
use http::header::CONTENT_LENGTH;
use http::{HeaderValue, Method};
use http_body::{Body, Frame, SizeHint};
use outcache_core::{CacheEntry, CacheKey, CachedResponse, Storage, VaryByRules};
use pin_project::pin_project;
use tracing::{debug, warn};

/// Byte accumulator backed by fixed-size segments.
///
/// Segments are only allocated as bytes arrive, so a short response never
/// pays for the full capture ceiling.
pub(crate) struct SegmentedBuffer {
    segments: Vec<BytesMut>,
    segment_size: usize,
    limit: usize,
    len: usize,
}

impl SegmentedBuffer {
    pub(crate) fn new(segment_size: usize, limit: usize) -> Self {
        Self {
            segments: Vec::new(),
            segment_size: segment_size.max(1),
            limit,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Appends `data`, returning `false` without writing anything when the
    /// write would push the buffer past its limit.
    pub(crate) fn write(&mut self, mut data: &[u8]) -> bool {
        if self.len + data.len() > self.limit {
            return false;
        }
        while !data.is_empty() {
            if self
                .segments
                .last()
                .is_none_or(|segment| segment.len() == self.segment_size)
            {
                self.segments.push(BytesMut::with_capacity(self.segment_size));
            }
            if let Some(segment) = self.segments.last_mut() {
                let take = (self.segment_size - segment.len()).min(data.len());
                segment.extend_from_slice(&data[..take]);
                self.len += take;
                data = &data[take..];
            }
        }
        true
    }

    /// Copies the buffered bytes out without consuming the buffer.
    pub(crate) fn copy_to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.len);
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out.freeze()
    }

    /// Consumes the buffer into one contiguous byte sequence.
    pub(crate) fn into_bytes(mut self) -> Bytes {
        if self.segments.len() == 1 {
            return self.segments.swap_remove(0).freeze();
        }
        let mut out = BytesMut::with_capacity(self.len);
        for segment in self.segments {
            out.extend_from_slice(&segment);
        }
        out.freeze()
    }
}

/// Everything a deferred commit needs once the body has fully streamed.
pub(crate) struct CommitIntent {
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) base_key: CacheKey,
    pub(crate) response_key: CacheKey,
    pub(crate) vary_rules: Option<VaryByRules>,
    pub(crate) snapshot: CachedResponse,
    pub(crate) ttl: Duration,
    pub(crate) method: Method,
    pub(crate) content_length: Option<u64>,
    pub(crate) has_transfer_encoding: bool,
}

impl CommitIntent {
    /// Turns the intent into the storage write, or `None` when the commit
    /// must be skipped (buffering was disabled, or the captured bytes
    /// contradict the declared `Content-Length`).
    fn into_commit(self, buffer: Option<SegmentedBuffer>) -> Option<BoxFuture<'static, ()>> {
        let CommitIntent {
            storage,
            base_key,
            response_key,
            vary_rules,
            mut snapshot,
            ttl,
            method,
            content_length,
            has_transfer_encoding,
        } = self;

        let body = buffer?.into_bytes();

        if let Some(declared) = content_length
            && declared != body.len() as u64
            && !(body.is_empty() && method == Method::HEAD)
        {
            debug!(
                declared,
                captured = body.len(),
                "captured body contradicts content-length, skipping commit"
            );
            return None;
        }

        if content_length.is_none() && !has_transfer_encoding {
            snapshot
                .headers
                .insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
        }
        snapshot.body = body;

        Some(Box::pin(async move {
            if let Some(rules) = vary_rules
                && let Err(error) = storage.set(&base_key, CacheEntry::Vary(rules), ttl).await
            {
                warn!(error = %error, key = %base_key, "failed to store vary rules");
            }
            let entry = CacheEntry::Response(Arc::new(snapshot));
            if let Err(error) = storage.set(&response_key, entry, ttl).await {
                warn!(error = %error, key = %response_key, "failed to store cached response");
            } else {
                debug!(key = %response_key, ttl = ?ttl, "cached response committed");
            }
        }))
    }
}

/// Write-through wrapper around the downstream response body.
///
/// Frames reach the client regardless of buffering state; the buffer is a
/// side channel that only decides whether a commit happens at end-of-stream.
/// The commit write is polled as part of this body, so end-of-stream is not
/// signalled to the transport until the entry has settled in storage.
#[pin_project]
pub struct CaptureBody<B> {
    #[pin]
    inner: B,
    buffer: Option<SegmentedBuffer>,
    commit: Option<CommitIntent>,
    committing: Option<BoxFuture<'static, ()>>,
    finished: bool,
}

impl<B> CaptureBody<B> {
    pub(crate) fn new(
        inner: B,
        commit: Option<CommitIntent>,
        segment_size: usize,
        maximum_body_size: usize,
    ) -> Self {
        let buffer = commit
            .is_some()
            .then(|| SegmentedBuffer::new(segment_size, maximum_body_size));
        Self {
            inner,
            buffer,
            commit,
            committing: None,
            finished: false,
        }
    }

    /// Whether captured bytes are still being accumulated for commit.
    pub fn buffering_enabled(&self) -> bool {
        self.buffer.is_some()
    }

    /// A copy of the bytes buffered so far. Empty once buffering is
    /// disabled.
    pub fn buffered_body(&self) -> Bytes {
        self.buffer
            .as_ref()
            .map(SegmentedBuffer::copy_to_bytes)
            .unwrap_or_default()
    }
}

impl<B> Body for CaptureBody<B>
where
    B: Body,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        if *this.finished {
            return Poll::Ready(None);
        }

        if let Some(commit) = this.committing.as_mut() {
            ready!(commit.as_mut().poll(cx));
            *this.committing = None;
            *this.finished = true;
            return Poll::Ready(None);
        }

        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => {
                let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                if let Some(data) = frame.data_ref()
                    && let Some(buffer) = this.buffer.as_mut()
                    && !buffer.write(data.as_ref())
                {
                    debug!(
                        buffered = buffer.len(),
                        incoming = data.len(),
                        "capture ceiling exceeded, buffering disabled"
                    );
                    *this.buffer = None;
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(error)) => {
                *this.buffer = None;
                *this.commit = None;
                *this.finished = true;
                Poll::Ready(Some(Err(error)))
            }
            None => {
                let commit = this
                    .commit
                    .take()
                    .and_then(|intent| intent.into_commit(this.buffer.take()));
                match commit {
                    Some(mut future) => match future.as_mut().poll(cx) {
                        Poll::Ready(()) => {
                            *this.finished = true;
                            Poll::Ready(None)
                        }
                        Poll::Pending => {
                            *this.committing = Some(future);
                            Poll::Pending
                        }
                    },
                    None => {
                        *this.finished = true;
                        Poll::Ready(None)
                    }
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished
    }

    fn size_hint(&self) -> SizeHint {
        if self.finished {
            SizeHint::with_exact(0)
        } else {
            self.inner.size_hint()
        }
    }
}

/// The body type of every response leaving the middleware.
#[pin_project(project = OutputCacheBodyProj)]
pub enum OutputCacheBody<B> {
    /// Downstream body forwarded untouched.
    Passthrough(#[pin] B),
    /// Downstream body being captured for a deferred commit.
    Capture(#[pin] CaptureBody<B>),
    /// Cached bytes being replayed, or an empty generated response.
    /// The `Option` yields the data once, then signals end-of-stream.
    Replay(Option<Bytes>),
}

impl<B> OutputCacheBody<B> {
    /// A replay of cached bytes.
    pub(crate) fn replay(bytes: Bytes) -> Self {
        OutputCacheBody::Replay(Some(bytes))
    }

    /// An empty generated body (304 / 504 / internal error responses).
    pub(crate) fn empty() -> Self {
        OutputCacheBody::Replay(None)
    }
}

impl<B> Body for OutputCacheBody<B>
where
    B: Body,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            OutputCacheBodyProj::Passthrough(body) => match ready!(body.poll_frame(cx)) {
                Some(Ok(frame)) => {
                    let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                    Poll::Ready(Some(Ok(frame)))
                }
                Some(Err(error)) => Poll::Ready(Some(Err(error))),
                None => Poll::Ready(None),
            },
            OutputCacheBodyProj::Capture(capture) => capture.poll_frame(cx),
            OutputCacheBodyProj::Replay(data) => {
                Poll::Ready(data.take().map(|bytes| Ok(Frame::data(bytes))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            OutputCacheBody::Passthrough(body) => body.is_end_stream(),
            OutputCacheBody::Capture(capture) => capture.is_end_stream(),
            OutputCacheBody::Replay(data) => data.is_none(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            OutputCacheBody::Passthrough(body) => body.size_hint(),
            OutputCacheBody::Capture(capture) => capture.size_hint(),
            OutputCacheBody::Replay(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            OutputCacheBody::Replay(None) => SizeHint::with_exact(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_spans_segments() {
        let mut buffer = SegmentedBuffer::new(4, 64);
        assert!(buffer.write(b"abcdef"));
        assert!(buffer.write(b"ghij"));
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.copy_to_bytes(), Bytes::from_static(b"abcdefghij"));
        assert_eq!(buffer.into_bytes(), Bytes::from_static(b"abcdefghij"));
    }

    #[test]
    fn buffer_accepts_exact_limit_and_rejects_overflow() {
        let mut buffer = SegmentedBuffer::new(4, 8);
        assert!(buffer.write(b"12345678"));
        assert_eq!(buffer.len(), 8);

        assert!(!buffer.write(b"9"));
        // A rejected write leaves the already-buffered bytes untouched.
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.into_bytes(), Bytes::from_static(b"12345678"));
    }

    #[test]
    fn single_oversized_write_is_rejected() {
        let mut buffer = SegmentedBuffer::new(4, 8);
        assert!(!buffer.write(&[0u8; 9]));
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.into_bytes(), Bytes::new());
    }

    #[test]
    fn empty_buffer_yields_empty_bytes() {
        let buffer = SegmentedBuffer::new(4, 8);
        assert_eq!(buffer.into_bytes(), Bytes::new());
    }
}
