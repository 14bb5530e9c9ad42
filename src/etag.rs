// Copyright (c) The http-send developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE.txt or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT.txt or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Entity tag comparison and generation.

use std::time::{SystemTime, UNIX_EPOCH};

/// Strips a leading `W/` to obtain the opaque form.
fn opaque(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

/// Strong comparison per RFC 7232 section 2.3.2: both tags must be strong
/// and byte-equal.
pub(crate) fn strong_eq(a: &str, b: &str) -> bool {
    a.starts_with('"') && b.starts_with('"') && a == b
}

/// Weak comparison: opaque forms byte-equal.
pub(crate) fn weak_eq(a: &str, b: &str) -> bool {
    opaque(a) == opaque(b)
}

/// Splits a comma-separated header value, trimming whitespace and dropping
/// empty entries.
pub(crate) fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|e| !e.is_empty())
}

/// Returns whether an `If-Match` header passes. `If-Match` uses the strong
/// comparison and fails outright when the entity has no tag.
pub(crate) fn any_match(etag: Option<&str>, header: &str) -> bool {
    let Some(etag) = etag else { return false };
    if header.trim() == "*" {
        return true;
    }
    split_list(header).any(|candidate| strong_eq(candidate, etag))
}

/// Returns whether an `If-None-Match` header matches the entity, using the
/// weak comparison. A match means 304 for GET/HEAD and 412 otherwise.
pub(crate) fn none_match(etag: Option<&str>, header: &str) -> bool {
    let Some(etag) = etag else { return false };
    if header.trim() == "*" {
        return true;
    }
    split_list(header).any(|candidate| weak_eq(candidate, etag))
}

/// Formats an entity tag from the entity's size and modification time:
/// `[W/]"<hex size>-<hex microseconds>[-<encoding>]"`.
///
/// The encoding suffix is appended only for non-identity encodings, so the
/// identity entity and its pre-compressed variants never share a tag.
pub fn entity_tag(size: u64, mtime: SystemTime, encoding: Option<&str>, weak: bool) -> String {
    let micros = mtime
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or(0);
    let prefix = if weak { "W/" } else { "" };
    match encoding.filter(|e| *e != crate::encoding::IDENTITY) {
        Some(enc) => format!("{prefix}\"{size:x}-{micros:x}-{enc}\""),
        None => format!("{prefix}\"{size:x}-{micros:x}\""),
    }
}
