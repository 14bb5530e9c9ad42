// Copyright (c) The http-send developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE.txt or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT.txt or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Conditional GET, HEAD, and byte range serving for storage-backed HTTP
//! entities, with transparent pre-compressed variant negotiation.
//!
//! The crate splits response preparation from content access:
//!
//! *   [`prepare_response`] is the protocol engine. Given a storage
//!     reference and the incoming request it evaluates `If-Match`,
//!     `If-None-Match`, `If-Modified-Since`, `If-Unmodified-Since` and
//!     `If-Range`, resolves `Range` into a whole-body, single-range, or
//!     multipart/byteranges plan, and assembles a [`PreparedResponse`]:
//!     status, headers, and a body stream that releases the storage handle
//!     exactly once on every path, including client disconnects.
//! *   [`Storage`] is the seam to content backends. A backend opens a
//!     reference into a handle plus [`StorageInfo`] metadata and produces
//!     byte streams over ranges of the opened entity. [`FsStorage`] is the
//!     bundled file-system backend: it validates URL-encoded references,
//!     filters ignored names, and resolves pre-compressed alternates (for
//!     example `app.js.br` next to `app.js`) through regex rewrite rules and
//!     the client's `Accept-Encoding` preferences.
//!
//! A prepared response can be serialized to an HTTP/1 transport with
//! [`PreparedResponse::send`], or embedded in an in-process server via
//! [`PreparedResponse::into_response`], whose [`ResponseBody`] implements
//! both [`futures::Stream`] and [`http_body::Body`].
//!
//! ```no_run
//! use http::Request;
//! use http_send::{prepare_response, FsReference, FsStorage, PrepareOptions, SendOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = FsStorage::new("/srv/www");
//!     let req = Request::get("/index.html").body(())?;
//!     let reference = FsReference::Url(req.uri().path().to_owned());
//!     let prepared =
//!         prepare_response(&storage, &reference, &req, &PrepareOptions::default()).await;
//!     let (_client, mut server) = tokio::io::duplex(16 * 1024);
//!     prepared.send(&mut server, &SendOptions::default()).await?;
//!     Ok(())
//! }
//! ```

use std::ops::Range;
use std::pin::Pin;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use http::HeaderMap;

mod body;
mod encoding;
mod error;
mod etag;
mod fs;
mod platform;
mod range;
mod serving;

pub use crate::body::ResponseBody;
pub use crate::encoding::{negotiate, IDENTITY};
pub use crate::error::{BoxError, Error};
pub use crate::etag::entity_tag;
pub use crate::fs::{
    EncodingMapping, FileStat, FileSystem, FsFile, FsHandle, FsReference, FsStorage, OsFileSystem,
};
pub use crate::serving::{
    prepare_response, PrepareOptions, PreparedResponse, SendOptions, DEFAULT_MAX_RANGES,
};

/// A stream of body bytes produced by a storage backend.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// `Content-Disposition` response type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DispositionType {
    Inline,
    Attachment,
}

impl DispositionType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            DispositionType::Inline => "inline",
            DispositionType::Attachment => "attachment",
        }
    }
}

/// Metadata envelope produced by opening a storage reference.
///
/// `size`, when present, must be the exact byte count the body stream will
/// produce for the opened variant; its absence forces chunked streaming and
/// disables range support. A backend that picked a variant based on
/// `Accept-Encoding` must set `vary` (and `content_encoding` for
/// non-identity picks). The response builder fills `etag` and
/// `last_modified` with the final negotiated values before evaluating
/// `If-Range`.
#[derive(Clone, Debug, Default)]
pub struct StorageInfo {
    /// Name used for Content-Type inference and Content-Disposition.
    pub file_name: Option<String>,
    /// Exact body size in bytes of the selected variant.
    pub size: Option<u64>,
    /// Modification time, used for `Last-Modified` and ETag generation.
    pub mtime: Option<SystemTime>,
    /// Request header this entity's selection depended on.
    pub vary: Option<String>,
    /// Coding of the opened variant; absent or `identity` means no
    /// `Content-Encoding` header.
    pub content_encoding: Option<String>,
    /// Pre-computed ETag literal, including quotes and optional `W/`.
    pub etag: Option<String>,
    pub last_modified: Option<SystemTime>,
    pub mime_type: Option<String>,
    pub mime_type_charset: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition_type: Option<DispositionType>,
    pub content_disposition_filename: Option<String>,
}

/// A successfully opened entity: the backend's handle plus its metadata.
pub struct Opened<H> {
    pub handle: H,
    pub info: StorageInfo,
}

/// An abstract content backend consumed by [`prepare_response`].
///
/// The builder guarantees that [`open`](Storage::open) precedes any stream
/// creation and that [`close`](Storage::close) runs exactly once per
/// successful open: either when the body stream finishes (or is dropped by a
/// disconnecting client), or directly on early-exit responses such as 304,
/// 412, 416, and HEAD.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Opaque identifier a backend uses to locate content.
    type Reference: ?Sized + Sync;
    /// Backend-specific handle for an opened entity.
    type Handle: Send + Sync + 'static;

    /// Opens the entity identified by `reference`. May inspect
    /// `Accept-Encoding` to pick a pre-compressed variant; the returned
    /// info must then carry `vary`.
    async fn open(
        &self,
        reference: &Self::Reference,
        headers: &HeaderMap,
    ) -> Result<Opened<Self::Handle>, Error>;

    /// Creates a byte stream over `range` of the opened entity, or over the
    /// whole body when `range` is `None`. The stream must produce exactly
    /// the requested bytes.
    fn create_stream(&self, handle: &Self::Handle, range: Option<Range<u64>>) -> BodyStream;

    /// Releases the opened entity. The default is to drop the handle.
    fn close(&self, handle: Self::Handle) {
        drop(handle);
    }
}

/// Tri-state configuration for a computed response header: inherit the
/// storage-provided or computed value, suppress the header entirely, or
/// force a specific value.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Setting<T> {
    #[default]
    Auto,
    Off,
    Value(T),
}

impl<T: Clone> Setting<T> {
    /// Resolves against the fallback computed for the `Auto` case.
    pub(crate) fn resolve(&self, auto: impl FnOnce() -> Option<T>) -> Option<T> {
        match self {
            Setting::Auto => auto(),
            Setting::Off => None,
            Setting::Value(v) => Some(v.clone()),
        }
    }
}
