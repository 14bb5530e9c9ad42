// Copyright (c) The http-send developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE.txt or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT.txt or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::io;
use std::path::PathBuf;

use http::Method;

/// Boxed error for storage backends with their own failure types.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything that can go wrong while resolving a reference, preparing a
/// response, or streaming its body.
///
/// Reference-validation and content-resolution variants never escape
/// [`prepare_response`](crate::prepare_response); they are captured into a
/// 404 response whose `error` field exposes them for logging.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The reference is not syntactically a URL path, or a path part failed
    /// to percent-decode.
    #[error("malformed storage reference {reference:?}")]
    Malformed { reference: String },

    /// The reference contains `.` or `..` segments a URL parser would have
    /// collapsed.
    #[error("storage reference {reference:?} is not normalized")]
    NotNormalized { reference: String },

    /// A path-part sequence was empty, did not begin with an empty root
    /// part, or contained dot segments.
    #[error("invalid path parts {parts:?}")]
    InvalidPath { parts: Vec<String> },

    #[error("consecutive slashes in storage reference {reference:?}")]
    ConsecutiveSlashes { reference: String },

    #[error("forbidden character in path part {part:?}")]
    ForbiddenCharacter { part: String },

    /// The part matched the adapter's ignore pattern.
    #[error("path part {part:?} is ignored")]
    IgnoredFile { part: String },

    #[error("trailing slash in storage reference {reference:?}")]
    TrailingSlash { reference: String },

    /// The reference resolved to a directory (directories are never served).
    #[error("{path:?} is a directory")]
    IsDirectory { path: PathBuf },

    /// No variant of the entity could be opened.
    #[error("{path:?} does not exist")]
    DoesNotExist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("method {method} not allowed")]
    MethodNotAllowed { method: Method },

    #[error("precondition failed")]
    PreconditionFailed,

    /// Every range specifier started at or past the end of the entity.
    #[error("no satisfiable byte range within {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    /// Reading body bytes from the backend failed.
    #[error("read failed")]
    Read(#[source] io::Error),

    /// Releasing the storage handle failed.
    #[error("close failed")]
    Close(#[source] BoxError),

    /// The transport closed before the body completed.
    #[error("connection closed before the response body completed")]
    PrematureClose,

    /// Writing the serialized response to the transport failed.
    #[error("write failed")]
    Write(#[source] io::Error),

    /// Backend-specific failure, tagged with the reference that caused it.
    #[error("storage error for {reference:?}")]
    Storage {
        reference: String,
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// True for the error kind `send` suppresses under
    /// `ignore_premature_close`.
    pub fn is_premature_close(&self) -> bool {
        matches!(self, Error::PrematureClose)
    }

    pub(crate) fn from_write_io(e: io::Error) -> Error {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => Error::PrematureClose,
            _ => Error::Write(e),
        }
    }
}
