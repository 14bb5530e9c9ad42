// Copyright (c) The http-send developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE.txt or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT.txt or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Response bodies and their resource teardown.

use std::ops::Range;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body::{Frame, SizeHint};

use crate::error::Error;
use crate::{BodyStream, Storage};

/// Owns an opened storage handle and releases it exactly once, on drop at
/// the latest. Early-exit response paths drop the guard before returning;
/// streaming paths move it into the body so a client disconnect still
/// triggers the release.
pub(crate) struct CloseGuard<S: Storage> {
    storage: S,
    handle: Option<S::Handle>,
}

impl<S: Storage> CloseGuard<S> {
    pub(crate) fn new(storage: S, handle: S::Handle) -> Self {
        CloseGuard {
            storage,
            handle: Some(handle),
        }
    }

    /// Streams `range` (or the whole body) from the guarded entity.
    pub(crate) fn create_stream(&self, range: Option<Range<u64>>) -> BodyStream {
        let handle = self
            .handle
            .as_ref()
            .expect("stream creation after storage close");
        self.storage.create_stream(handle, range)
    }

    pub(crate) fn close_now(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.storage.close(handle);
        }
    }
}

impl<S: Storage> Drop for CloseGuard<S> {
    fn drop(&mut self) {
        self.close_now();
    }
}

/// A backend stream that carries its close guard with it: the entity is
/// released on end-of-stream, on a stream error, or when the body is
/// dropped mid-flight.
pub(crate) struct GuardedStream<S: Storage> {
    inner: BodyStream,
    guard: CloseGuard<S>,
}

impl<S: Storage> GuardedStream<S> {
    pub(crate) fn new(guard: CloseGuard<S>, range: Option<Range<u64>>) -> Self {
        let inner = guard.create_stream(range);
        GuardedStream { inner, guard }
    }
}

// The fields are never pinned; polling goes through the boxed inner stream.
impl<S: Storage> Unpin for GuardedStream<S> {}

impl<S: Storage> Stream for GuardedStream<S> {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                this.guard.close_now();
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.guard.close_now();
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

/// One piece of a multipart/byteranges body.
pub(crate) enum Part {
    /// An owned buffer (part headers, closing boundary).
    Buffer(Bytes),
    /// A byte range to be streamed from the backend.
    Range(Range<u64>),
}

/// Emits a sequence of buffers and backend ranges strictly in part order.
/// Range sub-streams are created lazily, one at a time, from the guarded
/// handle; the entity is released once after the last part (or on teardown).
pub(crate) struct MultiStream<S: Storage> {
    parts: std::vec::IntoIter<Part>,
    current: Option<BodyStream>,
    guard: CloseGuard<S>,
    done: bool,
}

impl<S: Storage> MultiStream<S> {
    pub(crate) fn new(guard: CloseGuard<S>, parts: Vec<Part>) -> Self {
        MultiStream {
            parts: parts.into_iter(),
            current: None,
            guard,
            done: false,
        }
    }
}

// The fields are never pinned; polling goes through the boxed sub-stream.
impl<S: Storage> Unpin for MultiStream<S> {}

impl<S: Storage> Stream for MultiStream<S> {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        loop {
            if let Some(current) = this.current.as_mut() {
                match current.as_mut().poll_next(cx) {
                    Poll::Ready(None) => this.current = None,
                    Poll::Ready(Some(Err(e))) => {
                        this.done = true;
                        this.guard.close_now();
                        return Poll::Ready(Some(Err(e)));
                    }
                    other => return other,
                }
            }
            match this.parts.next() {
                Some(Part::Buffer(buf)) => return Poll::Ready(Some(Ok(buf))),
                Some(Part::Range(range)) => {
                    this.current = Some(this.guard.create_stream(Some(range)));
                }
                None => {
                    this.done = true;
                    this.guard.close_now();
                    return Poll::Ready(None);
                }
            }
        }
    }
}

enum Kind {
    Empty,
    Streamed {
        stream: BodyStream,
        remaining: Option<u64>,
    },
}

/// The body of a [`PreparedResponse`](crate::PreparedResponse).
///
/// Implements both [`futures::Stream`] (for hand-rolled transports) and
/// [`http_body::Body`] (for hyper-style servers). Dropping the body releases
/// any storage resources it still holds.
pub struct ResponseBody {
    kind: Kind,
}

impl ResponseBody {
    pub(crate) fn empty() -> Self {
        ResponseBody { kind: Kind::Empty }
    }

    /// Single-buffer body with an exactly known length.
    pub(crate) fn once(data: Bytes) -> Self {
        let len = data.len() as u64;
        let item: Result<Bytes, Error> = Ok(data);
        Self::streamed(Box::pin(futures::stream::iter([item])), Some(len))
    }

    pub(crate) fn streamed(stream: BodyStream, len: Option<u64>) -> Self {
        ResponseBody {
            kind: Kind::Streamed {
                stream,
                remaining: len,
            },
        }
    }

    /// True when the body is known to produce no bytes (HEAD, 304, empty
    /// ranges).
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::Empty)
    }

    /// The exact number of bytes left to produce, when known. `None` means
    /// the transport must use chunked framing.
    pub fn exact_length(&self) -> Option<u64> {
        match &self.kind {
            Kind::Empty => Some(0),
            Kind::Streamed { remaining, .. } => *remaining,
        }
    }

    fn poll_inner(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, Error>>> {
        match &mut self.kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Streamed { stream, remaining } => {
                let polled = stream.as_mut().poll_next(cx);
                if let Poll::Ready(Some(Ok(chunk))) = &polled {
                    if let Some(n) = remaining {
                        *n = n.saturating_sub(chunk.len() as u64);
                    }
                }
                polled
            }
        }
    }
}

impl Stream for ResponseBody {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_inner(cx)
    }
}

impl http_body::Body for ResponseBody {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Error>>> {
        self.get_mut()
            .poll_inner(cx)
            .map(|opt| opt.map(|res| res.map(Frame::data)))
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.kind, Kind::Empty)
    }

    fn size_hint(&self) -> SizeHint {
        match self.exact_length() {
            Some(n) => SizeHint::with_exact(n),
            None => SizeHint::default(),
        }
    }
}
