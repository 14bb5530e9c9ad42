// Copyright (c) The http-send developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE.txt or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT.txt or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The response builder: opens storage, evaluates conditional headers,
//! resolves ranges, and assembles the response and its body stream.

use std::fmt::Write as _;
use std::ops::Range;
use std::time::SystemTime;

use bytes::Bytes;
use futures::StreamExt;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use httpdate::{fmt_http_date, parse_http_date};
use log::debug;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::body::{CloseGuard, GuardedStream, MultiStream, Part, ResponseBody};
use crate::encoding::IDENTITY;
use crate::error::Error;
use crate::etag;
use crate::range::{self, ResolvedRanges};
use crate::{DispositionType, Setting, Storage, StorageInfo};

/// Default cap on the number of ranges honored after coalescing.
pub const DEFAULT_MAX_RANGES: u32 = 200;

const DEFAULT_CACHE_CONTROL: &str = "public, max-age=0";

/// Per-request configuration for [`prepare_response`].
///
/// The tri-state [`Setting`] fields distinguish "compute the value"
/// (`Auto`), "suppress the header" (`Off`), and a concrete override.
#[derive(Clone, Debug)]
pub struct PrepareOptions {
    pub cache_control: Setting<String>,
    pub last_modified: Setting<SystemTime>,
    pub etag: Setting<String>,
    pub mime_type: Setting<String>,
    pub mime_type_charset: Setting<String>,
    pub content_disposition_type: Setting<DispositionType>,
    pub content_disposition_filename: Setting<String>,
    /// Forces the status code, disabling conditional GET and ranges.
    pub status_code: Option<StatusCode>,
    pub allowed_methods: Vec<Method>,
    /// Largest number of ranges honored after coalescing. `0` disables
    /// range serving entirely; `1` disables multipart responses.
    pub max_ranges: u32,
    /// Generate `W/`-prefixed entity tags.
    pub weak_etags: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        PrepareOptions {
            cache_control: Setting::Auto,
            last_modified: Setting::Auto,
            etag: Setting::Auto,
            mime_type: Setting::Auto,
            mime_type_charset: Setting::Auto,
            content_disposition_type: Setting::Auto,
            content_disposition_filename: Setting::Auto,
            status_code: None,
            allowed_methods: vec![Method::GET, Method::HEAD],
            max_ranges: DEFAULT_MAX_RANGES,
            weak_etags: false,
        }
    }
}

/// Options for [`PreparedResponse::send`].
#[derive(Clone, Debug)]
pub struct SendOptions {
    /// Complete normally when the client disconnects mid-body instead of
    /// surfacing [`Error::PrematureClose`].
    pub ignore_premature_close: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        SendOptions {
            ignore_premature_close: true,
        }
    }
}

/// A fully computed response: status, headers, and a body stream that owns
/// whatever storage resources it still needs.
pub struct PreparedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    /// Metadata of the opened entity, when one was opened.
    pub info: Option<StorageInfo>,
    /// Set when the response itself represents a failure (404, 405, 412,
    /// 416), for inspection and logging.
    pub error: Option<Error>,
}

#[derive(Debug, Eq, PartialEq)]
enum Freshness {
    Ok,
    NotModified,
    PreconditionFailed,
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_date(value: &str) -> Option<SystemTime> {
    parse_http_date(value.trim()).ok()
}

/// Whole seconds since the epoch; HTTP dates carry no finer resolution.
fn secs(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Evaluates the conditional request headers against the entity's final
/// validators. `If-Match` takes precedence over `If-Unmodified-Since`, and
/// `If-None-Match` over `If-Modified-Since`; unparseable dates are treated
/// as absent headers.
fn check_freshness(
    headers: &HeaderMap,
    is_get_or_head: bool,
    etag: Option<&str>,
    last_modified: Option<SystemTime>,
) -> Freshness {
    if let Some(if_match) = header_str(headers, header::IF_MATCH) {
        if !etag::any_match(etag, if_match) {
            return Freshness::PreconditionFailed;
        }
    } else if let (Some(modified), Some(since)) = (
        last_modified,
        header_str(headers, header::IF_UNMODIFIED_SINCE).and_then(parse_date),
    ) {
        if secs(modified) > secs(since) {
            return Freshness::PreconditionFailed;
        }
    }

    if let Some(if_none_match) = header_str(headers, header::IF_NONE_MATCH) {
        if etag::none_match(etag, if_none_match) {
            return if is_get_or_head {
                Freshness::NotModified
            } else {
                Freshness::PreconditionFailed
            };
        }
    } else if is_get_or_head {
        if let (Some(modified), Some(since)) = (
            last_modified,
            header_str(headers, header::IF_MODIFIED_SINCE).and_then(parse_date),
        ) {
            if secs(modified) <= secs(since) {
                return Freshness::NotModified;
            }
        }
    }
    Freshness::Ok
}

/// Whether an `If-Range` value validates the current entity. Entity tags
/// use the strong comparison; dates compare second-exact. A weak tag or a
/// missing validator never matches, so the range is ignored.
fn if_range_fresh(value: &str, etag: Option<&str>, last_modified: Option<SystemTime>) -> bool {
    let value = value.trim();
    if value.starts_with('"') || value.starts_with("W/\"") {
        match etag {
            Some(tag) => etag::strong_eq(value, tag),
            None => false,
        }
    } else {
        match (parse_date(value), last_modified) {
            (Some(date), Some(modified)) => secs(date) == secs(modified),
            _ => false,
        }
    }
}

/// HeaderValue from a string this crate just formatted; such values are
/// always ASCII.
fn ascii_val(s: String) -> HeaderValue {
    HeaderValue::try_from(s).expect("formatted header value is ASCII")
}

/// Inserts a caller- or storage-supplied value, skipping it when it is not
/// a legal header value.
fn try_insert(headers: &mut HeaderMap, name: HeaderName, value: &str) -> bool {
    match HeaderValue::try_from(value) {
        Ok(v) => {
            headers.insert(name, v);
            true
        }
        Err(_) => {
            debug!("dropping invalid {name} header value {value:?}");
            false
        }
    }
}

fn inferred_mime(info: &StorageInfo) -> Option<String> {
    info.mime_type.clone().or_else(|| {
        let name = info.file_name.as_ref()?;
        mime_guess::from_path(name).first_raw().map(str::to_owned)
    })
}

fn default_charset(mime: &str) -> Option<String> {
    mime.starts_with("text/").then(|| "UTF-8".to_owned())
}

/// Everything outside RFC 8187 `attr-char` is percent-encoded in
/// `filename*`.
const ATTR_CHARS: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Formats an RFC 6266 `Content-Disposition` value, adding an RFC 8187
/// `filename*` parameter when the name is not plain ASCII.
fn content_disposition(dtype: DispositionType, filename: Option<&str>) -> String {
    let mut value = dtype.as_str().to_owned();
    if let Some(name) = filename {
        if name.is_ascii() && !name.contains(['"', '\\']) {
            let _ = write!(value, "; filename=\"{name}\"");
        } else {
            let fallback: String = name
                .chars()
                .map(|c| {
                    if c.is_ascii() && c != '"' && c != '\\' {
                        c
                    } else {
                        '?'
                    }
                })
                .collect();
            let encoded = utf8_percent_encode(name, ATTR_CHARS);
            let _ = write!(value, "; filename=\"{fallback}\"; filename*=UTF-8''{encoded}");
        }
    }
    value
}

/// Content-Encoding, Content-Type (+ `X-Content-Type-Options: nosniff`),
/// and Content-Disposition.
fn set_entity_headers(headers: &mut HeaderMap, info: &StorageInfo, options: &PrepareOptions) {
    if let Some(enc) = info.content_encoding.as_deref().filter(|e| *e != IDENTITY) {
        try_insert(headers, header::CONTENT_ENCODING, enc);
    }

    if let Some(mime) = options.mime_type.resolve(|| inferred_mime(info)) {
        let charset = options.mime_type_charset.resolve(|| {
            info.mime_type_charset
                .clone()
                .or_else(|| default_charset(&mime))
        });
        let value = match charset {
            Some(cs) => format!("{mime}; charset={cs}"),
            None => mime,
        };
        if try_insert(headers, header::CONTENT_TYPE, &value) {
            headers.insert(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            );
        }
    }

    let dtype = options
        .content_disposition_type
        .resolve(|| Some(info.content_disposition_type.unwrap_or(DispositionType::Inline)));
    if let Some(dtype) = dtype {
        let filename = options.content_disposition_filename.resolve(|| {
            info.content_disposition_filename
                .clone()
                .or_else(|| info.file_name.clone())
        });
        let value = content_disposition(dtype, filename.as_deref());
        try_insert(headers, header::CONTENT_DISPOSITION, &value);
    }
}

/// Status-reason text response shared by the 404/405/412/416 paths. HEAD
/// responses never carry a body.
fn error_response(
    status: StatusCode,
    mut headers: HeaderMap,
    method: &Method,
    error: Option<Error>,
    info: Option<StorageInfo>,
) -> PreparedResponse {
    let reason = status.canonical_reason().unwrap_or("");
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=UTF-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::CONTENT_LENGTH, ascii_val(reason.len().to_string()));
    let body = if *method == Method::HEAD {
        ResponseBody::empty()
    } else {
        ResponseBody::once(Bytes::from_static(reason.as_bytes()))
    };
    PreparedResponse {
        status,
        headers,
        body,
        info,
        error,
    }
}

enum BodyPlan {
    Whole,
    Single(Range<u64>),
    Multi(range::MultipartPlan),
}

fn whole_body<S: Storage>(guard: CloseGuard<S>, size: Option<u64>) -> ResponseBody {
    if size == Some(0) {
        drop(guard);
        return ResponseBody::empty();
    }
    ResponseBody::streamed(Box::pin(GuardedStream::new(guard, None)), size)
}

/// Prepares a response for `reference` under `req`.
///
/// Never fails: storage and protocol errors materialize as complete
/// response objects (404, 405, 412, 416) with the underlying [`Error`]
/// attached. On success the returned body owns the storage handle and
/// releases it exactly once, no matter how the body is consumed or dropped.
pub async fn prepare_response<S, B>(
    storage: &S,
    reference: &S::Reference,
    req: &Request<B>,
    options: &PrepareOptions,
) -> PreparedResponse
where
    S: Storage + Clone,
{
    let method = req.method();
    if !options.allowed_methods.contains(method) {
        let mut headers = HeaderMap::new();
        let allow = options
            .allowed_methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        headers.insert(header::ALLOW, ascii_val(allow));
        return error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            headers,
            method,
            Some(Error::MethodNotAllowed {
                method: method.clone(),
            }),
            None,
        );
    }

    let opened = match storage.open(reference, req.headers()).await {
        Ok(opened) => opened,
        Err(e) => {
            debug!("storage open failed: {e}");
            return error_response(
                StatusCode::NOT_FOUND,
                HeaderMap::new(),
                method,
                Some(e),
                None,
            );
        }
    };
    let mut info = opened.info;
    let guard = CloseGuard::new(storage.clone(), opened.handle);

    // Final validator values, written back so If-Range (and observers) see
    // exactly what the response advertises.
    info.cache_control = options.cache_control.resolve(|| {
        Some(
            info.cache_control
                .clone()
                .unwrap_or_else(|| DEFAULT_CACHE_CONTROL.to_owned()),
        )
    });
    info.last_modified = options
        .last_modified
        .resolve(|| info.last_modified.or(info.mtime));
    info.etag = options.etag.resolve(|| {
        info.etag.clone().or_else(|| {
            let size = info.size?;
            let mtime = info.mtime?;
            Some(etag::entity_tag(
                size,
                mtime,
                info.content_encoding.as_deref(),
                options.weak_etags,
            ))
        })
    });

    let mut headers = HeaderMap::new();
    let now = SystemTime::now();
    headers.insert(header::DATE, ascii_val(fmt_http_date(now)));
    if let Some(cc) = info.cache_control.clone() {
        try_insert(&mut headers, header::CACHE_CONTROL, &cc);
    }
    if let Some(modified) = info.last_modified {
        // Last-Modified must not exceed Date (RFC 7232 section 2.2.1).
        let clamped = std::cmp::min(modified, now);
        headers.insert(header::LAST_MODIFIED, ascii_val(fmt_http_date(clamped)));
    }
    if let Some(tag) = info.etag.clone() {
        try_insert(&mut headers, header::ETAG, &tag);
    }
    if let Some(vary) = info.vary.clone() {
        try_insert(&mut headers, header::VARY, &vary);
    }

    // A forced status bypasses conditional GET and range handling.
    if let Some(forced) = options.status_code {
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none"));
        set_entity_headers(&mut headers, &info, options);
        if let Some(size) = info.size {
            headers.insert(header::CONTENT_LENGTH, ascii_val(size.to_string()));
        }
        let body = if *method == Method::HEAD {
            drop(guard);
            ResponseBody::empty()
        } else {
            whole_body(guard, info.size)
        };
        return PreparedResponse {
            status: forced,
            headers,
            body,
            info: Some(info),
            error: None,
        };
    }

    let is_get_or_head = *method == Method::GET || *method == Method::HEAD;
    match check_freshness(
        req.headers(),
        is_get_or_head,
        info.etag.as_deref(),
        info.last_modified,
    ) {
        Freshness::PreconditionFailed => {
            drop(guard);
            return error_response(
                StatusCode::PRECONDITION_FAILED,
                headers,
                method,
                Some(Error::PreconditionFailed),
                Some(info),
            );
        }
        Freshness::NotModified => {
            drop(guard);
            // Validators stay on the 304; the body does not.
            return PreparedResponse {
                status: StatusCode::NOT_MODIFIED,
                headers,
                body: ResponseBody::empty(),
                info: Some(info),
                error: None,
            };
        }
        Freshness::Ok => {}
    }

    set_entity_headers(&mut headers, &info, options);

    // Range resolution.
    let mut status = StatusCode::OK;
    let mut plan = BodyPlan::Whole;
    if let Some(size) = info.size {
        if options.max_ranges == 0 || !is_get_or_head {
            headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none"));
        } else {
            headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            let mut range_hdr = header_str(req.headers(), header::RANGE);
            if let Some(if_range) = header_str(req.headers(), header::IF_RANGE) {
                if !if_range_fresh(if_range, info.etag.as_deref(), info.last_modified) {
                    range_hdr = None;
                }
            }
            match range::parse(range_hdr, size) {
                ResolvedRanges::None => {}
                ResolvedRanges::NotSatisfiable => {
                    headers.insert(header::CONTENT_RANGE, ascii_val(format!("bytes */{size}")));
                    drop(guard);
                    return error_response(
                        StatusCode::RANGE_NOT_SATISFIABLE,
                        headers,
                        method,
                        Some(Error::RangeNotSatisfiable { size }),
                        Some(info),
                    );
                }
                ResolvedRanges::Satisfiable(ranges) => {
                    let ranges = range::coalesce(ranges);
                    if ranges.len() as u64 > u64::from(options.max_ranges) {
                        // Excessive range counts amplify the response; serve
                        // the whole body instead.
                    } else if ranges.len() == 1 {
                        status = StatusCode::PARTIAL_CONTENT;
                        let r = ranges[0].clone();
                        headers.insert(
                            header::CONTENT_RANGE,
                            ascii_val(format!("bytes {}-{}/{}", r.start, r.end - 1, size)),
                        );
                        plan = BodyPlan::Single(r);
                    } else {
                        status = StatusCode::PARTIAL_CONTENT;
                        let part_mime =
                            header_str(&headers, header::CONTENT_TYPE).map(str::to_owned);
                        let multipart = range::plan_multipart(&ranges, size, part_mime.as_deref());
                        headers.insert(
                            header::CONTENT_TYPE,
                            ascii_val(format!(
                                "multipart/byteranges; boundary={}",
                                multipart.boundary
                            )),
                        );
                        plan = BodyPlan::Multi(multipart);
                    }
                }
            }
        }
    }

    // Content-Length per plan; an unknown size streams chunked.
    match &plan {
        BodyPlan::Whole => {
            if let Some(size) = info.size {
                headers.insert(header::CONTENT_LENGTH, ascii_val(size.to_string()));
            }
        }
        BodyPlan::Single(r) => {
            headers.insert(
                header::CONTENT_LENGTH,
                ascii_val((r.end - r.start).to_string()),
            );
        }
        BodyPlan::Multi(multipart) => {
            headers.insert(
                header::CONTENT_LENGTH,
                ascii_val(multipart.content_length.to_string()),
            );
        }
    }

    let body = if *method == Method::HEAD {
        drop(guard);
        ResponseBody::empty()
    } else {
        match plan {
            BodyPlan::Whole => whole_body(guard, info.size),
            BodyPlan::Single(r) => {
                let len = r.end - r.start;
                ResponseBody::streamed(Box::pin(GuardedStream::new(guard, Some(r))), Some(len))
            }
            BodyPlan::Multi(multipart) => {
                let mut parts = Vec::with_capacity(multipart.parts.len() * 2 + 1);
                for (part_header, r) in multipart.parts {
                    parts.push(Part::Buffer(part_header));
                    parts.push(Part::Range(r));
                }
                parts.push(Part::Buffer(multipart.trailer));
                ResponseBody::streamed(
                    Box::pin(MultiStream::new(guard, parts)),
                    Some(multipart.content_length),
                )
            }
        }
    };

    PreparedResponse {
        status,
        headers,
        body,
        info: Some(info),
        error: None,
    }
}

impl PreparedResponse {
    /// Converts into an [`http::Response`] for in-process servers.
    pub fn into_response(self) -> Response<ResponseBody> {
        let mut res = Response::new(self.body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }

    /// Serializes the status line and headers to an HTTP/1.1 transport and
    /// streams the body, with chunked framing when the length is unknown.
    ///
    /// The storage handle is released before this returns on every path.
    /// With [`SendOptions::ignore_premature_close`] (the default), a client
    /// disconnect mid-body completes normally; all other errors propagate.
    pub async fn send<W>(self, writer: &mut W, options: &SendOptions) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self.send_inner(writer).await {
            Err(e) if e.is_premature_close() && options.ignore_premature_close => {
                debug!("client closed the connection mid-response");
                Ok(())
            }
            other => other,
        }
    }

    async fn send_inner<W>(self, writer: &mut W) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let PreparedResponse {
            status,
            mut headers,
            mut body,
            ..
        } = self;
        let chunked = body.exact_length().is_none();
        if chunked {
            headers.insert(
                header::TRANSFER_ENCODING,
                HeaderValue::from_static("chunked"),
            );
        }

        let mut head = Vec::with_capacity(256);
        head.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}\r\n",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .as_bytes(),
        );
        for (name, value) in &headers {
            head.extend_from_slice(name.as_str().as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(b"\r\n");
        writer.write_all(&head).await.map_err(Error::from_write_io)?;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            if chunked {
                let frame = format!("{:x}\r\n", chunk.len());
                writer
                    .write_all(frame.as_bytes())
                    .await
                    .map_err(Error::from_write_io)?;
            }
            writer.write_all(&chunk).await.map_err(Error::from_write_io)?;
            if chunked {
                writer.write_all(b"\r\n").await.map_err(Error::from_write_io)?;
            }
        }
        if chunked {
            writer
                .write_all(b"0\r\n\r\n")
                .await
                .map_err(Error::from_write_io)?;
        }
        writer.flush().await.map_err(Error::from_write_io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn headers(pairs: &[(HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), value.parse().unwrap());
        }
        map
    }

    const T0: &str = "Sun, 06 Nov 1994 08:49:37 GMT";
    const T1: &str = "Sun, 06 Nov 1994 09:49:37 GMT";

    fn t0() -> SystemTime {
        parse_http_date(T0).unwrap()
    }

    #[test]
    fn freshness_if_match() {
        let h = headers(&[(header::IF_MATCH, "\"foo\"")]);
        assert_eq!(
            check_freshness(&h, true, Some("\"foo\""), None),
            Freshness::Ok
        );
        assert_eq!(
            check_freshness(&h, true, Some("\"bar\""), None),
            Freshness::PreconditionFailed
        );
        assert_eq!(
            check_freshness(&h, true, None, None),
            Freshness::PreconditionFailed
        );
        // If-Match is authoritative; a passing If-Unmodified-Since cannot
        // rescue a failed If-Match.
        let both = headers(&[
            (header::IF_MATCH, "\"bar\""),
            (header::IF_UNMODIFIED_SINCE, T1),
        ]);
        assert_eq!(
            check_freshness(&both, true, Some("\"foo\""), Some(t0())),
            Freshness::PreconditionFailed
        );
    }

    #[test]
    fn freshness_if_unmodified_since() {
        let h = headers(&[(header::IF_UNMODIFIED_SINCE, T0)]);
        assert_eq!(check_freshness(&h, true, None, Some(t0())), Freshness::Ok);
        let later = t0() + Duration::from_secs(60);
        assert_eq!(
            check_freshness(&h, true, None, Some(later)),
            Freshness::PreconditionFailed
        );
        // Sub-second skew is below HTTP date resolution.
        let skewed = t0() + Duration::from_millis(300);
        assert_eq!(check_freshness(&h, true, None, Some(skewed)), Freshness::Ok);
    }

    #[test]
    fn freshness_if_none_match() {
        let h = headers(&[(header::IF_NONE_MATCH, "W/\"x\"")]);
        assert_eq!(
            check_freshness(&h, true, Some("\"x\""), None),
            Freshness::NotModified
        );
        assert_eq!(
            check_freshness(&h, false, Some("\"x\""), None),
            Freshness::PreconditionFailed
        );
        assert_eq!(
            check_freshness(&h, true, Some("\"y\""), None),
            Freshness::Ok
        );
        // A non-matching If-None-Match suppresses If-Modified-Since.
        let both = headers(&[
            (header::IF_NONE_MATCH, "\"y\""),
            (header::IF_MODIFIED_SINCE, T1),
        ]);
        assert_eq!(
            check_freshness(&both, true, Some("\"x\""), Some(t0())),
            Freshness::Ok
        );
    }

    #[test]
    fn freshness_if_modified_since() {
        let h = headers(&[(header::IF_MODIFIED_SINCE, T0)]);
        assert_eq!(
            check_freshness(&h, true, None, Some(t0())),
            Freshness::NotModified
        );
        assert_eq!(
            check_freshness(&h, true, None, Some(t0() + Duration::from_secs(1))),
            Freshness::Ok
        );
        // Only GET/HEAD get 304s.
        assert_eq!(check_freshness(&h, false, None, Some(t0())), Freshness::Ok);
        // Garbage dates are ignored.
        let bad = headers(&[(header::IF_MODIFIED_SINCE, "yesterday-ish")]);
        assert_eq!(check_freshness(&bad, true, None, Some(t0())), Freshness::Ok);
    }

    #[test]
    fn if_range_validation() {
        assert!(if_range_fresh("\"x\"", Some("\"x\""), None));
        assert!(!if_range_fresh("\"x\"", Some("\"y\""), None));
        assert!(!if_range_fresh("\"x\"", None, None));
        // Weak tags never validate a range.
        assert!(!if_range_fresh("W/\"x\"", Some("W/\"x\""), None));
        assert!(if_range_fresh(T0, None, Some(t0())));
        assert!(if_range_fresh(
            T0,
            None,
            Some(t0() + Duration::from_millis(500))
        ));
        assert!(!if_range_fresh(T1, None, Some(t0())));
        assert!(!if_range_fresh(T0, None, None));
    }

    #[test]
    fn disposition_formats() {
        assert_eq!(
            content_disposition(DispositionType::Inline, Some("a.txt")),
            "inline; filename=\"a.txt\""
        );
        assert_eq!(
            content_disposition(DispositionType::Attachment, None),
            "attachment"
        );
        assert_eq!(
            content_disposition(DispositionType::Attachment, Some("naïve.txt")),
            "attachment; filename=\"na?ve.txt\"; filename*=UTF-8''na%C3%AFve.txt"
        );
    }

    #[test]
    fn charset_only_for_text() {
        assert_eq!(default_charset("text/html"), Some("UTF-8".to_owned()));
        assert_eq!(default_charset("application/octet-stream"), None);
    }
}
