// Copyright (c) The http-send developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE.txt or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT.txt or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `Range` header resolution and multipart/byteranges planning.

use std::fmt::Write as _;
use std::ops::Range;

use bytes::Bytes;
use rand::RngCore;
use smallvec::SmallVec;

/// Represents a `Range:` header which has been parsed and resolved to a
/// particular entity length.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum ResolvedRanges {
    /// No `Range:` header was supplied, or it was syntactically useless and
    /// is ignored.
    None,

    /// A `Range:` header was supplied, but none of the ranges were possible
    /// to satisfy with the given entity length.
    NotSatisfiable,

    /// A `Range:` header was supplied with at least one satisfiable range,
    /// included here. Non-satisfiable ranges have been dropped. Ranges are
    /// converted from the HTTP closed interval style to the
    /// `std::ops::Range` half-open interval style (start inclusive, end
    /// exclusive).
    Satisfiable(SmallVec<[Range<u64>; 1]>),
}

/// Parses one `byte-range-spec` / `suffix-byte-range-spec`, returning the
/// clamped half-open range, `None` for a grammar-valid but unsatisfiable
/// specifier, or `Err` for a specifier that fails the grammar outright.
fn parse_spec(spec: &str, size: u64) -> Result<Option<Range<u64>>, ()> {
    let (first, last) = spec.split_once('-').ok_or(())?;
    let first = first.trim();
    let last = last.trim();
    if first.is_empty() {
        // Suffix form: the last n bytes.
        let n: u64 = last.parse().map_err(|_| ())?;
        if n == 0 || size == 0 {
            return Ok(None);
        }
        return Ok(Some(size.saturating_sub(n)..size));
    }
    let start: u64 = first.parse().map_err(|_| ())?;
    let end = if last.is_empty() {
        size
    } else {
        let last: u64 = last.parse().map_err(|_| ())?;
        if last < start {
            return Err(());
        }
        std::cmp::min(last + 1, size)
    };
    if start >= end {
        return Ok(None);
    }
    Ok(Some(start..end))
}

/// Parses the byte-range-set in the range header as described in [RFC 7233
/// section 2.1](https://tools.ietf.org/html/rfc7233#section-2.1).
///
/// A header that is not `bytes=...`, or whose every specifier fails the
/// grammar, resolves to `None` (serve the whole body). A header whose valid
/// specifiers all start at or past the end resolves to `NotSatisfiable`.
pub(crate) fn parse(range: Option<&str>, size: u64) -> ResolvedRanges {
    let Some(value) = range else {
        return ResolvedRanges::None;
    };
    let Some(set) = value.trim().strip_prefix("bytes=") else {
        return ResolvedRanges::None;
    };
    let mut ranges: SmallVec<[Range<u64>; 1]> = SmallVec::new();
    let mut valid_specs = 0usize;
    for spec in set.split(',').map(str::trim) {
        if spec.is_empty() {
            continue;
        }
        match parse_spec(spec, size) {
            Ok(Some(r)) => {
                valid_specs += 1;
                ranges.push(r);
            }
            Ok(None) => valid_specs += 1, // satisfiability, not syntax
            Err(()) => {}
        }
    }
    if valid_specs == 0 {
        return ResolvedRanges::None;
    }
    if ranges.is_empty() {
        return ResolvedRanges::NotSatisfiable;
    }
    ResolvedRanges::Satisfiable(ranges)
}

/// Merges overlapping and adjacent ranges into the minimum-cardinality
/// equivalent set, ordered by start offset. Prevents a pathological header
/// from amplifying the response.
pub(crate) fn coalesce(mut ranges: SmallVec<[Range<u64>; 1]>) -> SmallVec<[Range<u64>; 1]> {
    ranges.sort_by_key(|r| (r.start, r.end));
    let mut merged: SmallVec<[Range<u64>; 1]> = SmallVec::new();
    for r in ranges.drain(..) {
        match merged.last_mut() {
            Some(last) if r.start <= last.end => last.end = std::cmp::max(last.end, r.end),
            _ => merged.push(r),
        }
    }
    merged
}

const BOUNDARY_PREFIX: &str = "----mpbr";

/// Generates a fresh multipart boundary: the fixed prefix plus 24 random
/// bytes in hex.
pub(crate) fn boundary() -> String {
    let mut raw = [0u8; 24];
    rand::rng().fill_bytes(&mut raw);
    let mut b = String::with_capacity(BOUNDARY_PREFIX.len() + raw.len() * 2);
    b.push_str(BOUNDARY_PREFIX);
    for byte in raw {
        let _ = write!(b, "{byte:02x}");
    }
    b
}

/// A fully planned multipart/byteranges body: alternating header buffers and
/// byte ranges, plus the closing boundary. `content_length` is the exact
/// byte count of the assembled body.
pub(crate) struct MultipartPlan {
    pub(crate) boundary: String,
    pub(crate) parts: Vec<(Bytes, Range<u64>)>,
    pub(crate) trailer: Bytes,
    pub(crate) content_length: u64,
}

pub(crate) fn plan_multipart(
    ranges: &[Range<u64>],
    size: u64,
    content_type: Option<&str>,
) -> MultipartPlan {
    plan_multipart_with(boundary(), ranges, size, content_type)
}

fn plan_multipart_with(
    boundary: String,
    ranges: &[Range<u64>],
    size: u64,
    content_type: Option<&str>,
) -> MultipartPlan {
    let mut content_length = 0u64;
    let mut parts = Vec::with_capacity(ranges.len());
    for r in ranges {
        let mut header = String::with_capacity(96);
        let _ = write!(header, "\r\n--{boundary}\r\n");
        if let Some(ct) = content_type {
            let _ = write!(header, "content-type: {ct}\r\n");
        }
        let _ = write!(
            header,
            "content-range: bytes {}-{}/{}\r\n\r\n",
            r.start,
            r.end - 1,
            size
        );
        content_length += header.len() as u64 + (r.end - r.start);
        parts.push((Bytes::from(header), r.clone()));
    }
    let trailer = Bytes::from(format!("\r\n--{boundary}--"));
    content_length += trailer.len() as u64;
    MultipartPlan {
        boundary,
        parts,
        trailer,
        content_length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sv(ranges: &[Range<u64>]) -> SmallVec<[Range<u64>; 1]> {
        ranges.iter().cloned().collect()
    }

    /// Tests the specific examples enumerated in [RFC 7233 section
    /// 2.1](https://tools.ietf.org/html/rfc7233#section-2.1).
    #[test]
    fn resolve_ranges_rfc() {
        assert_eq!(
            parse(Some("bytes=0-499"), 10000),
            ResolvedRanges::Satisfiable(sv(&[0..500]))
        );
        assert_eq!(
            parse(Some("bytes=500-999"), 10000),
            ResolvedRanges::Satisfiable(sv(&[500..1000]))
        );
        assert_eq!(
            parse(Some("bytes=-500"), 10000),
            ResolvedRanges::Satisfiable(sv(&[9500..10000]))
        );
        assert_eq!(
            parse(Some("bytes=9500-"), 10000),
            ResolvedRanges::Satisfiable(sv(&[9500..10000]))
        );
        assert_eq!(
            parse(Some("bytes=0-0,-1"), 10000),
            ResolvedRanges::Satisfiable(sv(&[0..1, 9999..10000]))
        );
        assert_eq!(
            parse(Some("bytes=500-600,601-999"), 10000),
            ResolvedRanges::Satisfiable(sv(&[500..601, 601..1000]))
        );
        assert_eq!(
            parse(Some("bytes=500-700,601-999"), 10000),
            ResolvedRanges::Satisfiable(sv(&[500..701, 601..1000]))
        );
    }

    #[test]
    fn resolve_ranges_satisfiability() {
        assert_eq!(
            parse(Some("bytes=10000-"), 10000),
            ResolvedRanges::NotSatisfiable
        );
        assert_eq!(
            parse(Some("bytes=0-499,10000-"), 10000),
            ResolvedRanges::Satisfiable(sv(&[0..500]))
        );
        assert_eq!(parse(Some("bytes=-1"), 0), ResolvedRanges::NotSatisfiable);
        assert_eq!(parse(Some("bytes=0-0"), 0), ResolvedRanges::NotSatisfiable);
        assert_eq!(parse(Some("bytes=0-"), 0), ResolvedRanges::NotSatisfiable);
        assert_eq!(
            parse(Some("bytes=0-0"), 1),
            ResolvedRanges::Satisfiable(sv(&[0..1]))
        );
        assert_eq!(
            parse(Some("bytes=0-10000"), 500),
            ResolvedRanges::Satisfiable(sv(&[0..500]))
        );
    }

    #[test]
    fn suffix_longer_than_body_clamps_to_start() {
        assert_eq!(
            parse(Some("bytes=-500"), 9),
            ResolvedRanges::Satisfiable(sv(&[0..9]))
        );
    }

    #[test]
    fn resolve_ranges_absent_or_invalid() {
        assert_eq!(parse(None, 10000), ResolvedRanges::None);
        assert_eq!(parse(Some("items=0-499"), 10000), ResolvedRanges::None);
        assert_eq!(parse(Some("bytes=abc"), 10000), ResolvedRanges::None);
        assert_eq!(parse(Some("bytes="), 10000), ResolvedRanges::None);
        // A descending pair fails the grammar rather than satisfiability.
        assert_eq!(parse(Some("bytes=5-3"), 10000), ResolvedRanges::None);
        // One bad specifier does not poison its valid siblings.
        assert_eq!(
            parse(Some("bytes=junk,0-0"), 10000),
            ResolvedRanges::Satisfiable(sv(&[0..1]))
        );
    }

    #[test]
    fn coalesce_merges_overlap_and_adjacency() {
        assert_eq!(coalesce(sv(&[500..601, 601..1000])), sv(&[500..1000]));
        assert_eq!(coalesce(sv(&[500..701, 601..1000])), sv(&[500..1000]));
        assert_eq!(coalesce(sv(&[0..1, 9999..10000])), sv(&[0..1, 9999..10000]));
        // Out-of-order input is normalized by start offset.
        assert_eq!(coalesce(sv(&[5..7, 0..2, 6..9])), sv(&[0..2, 5..9]));
    }

    #[test]
    fn multipart_length_is_exact() {
        let plan = plan_multipart_with(
            "B".to_owned(),
            &[1..2, 3..9],
            9,
            Some("application/octet-stream"),
        );
        let mut assembled = Vec::new();
        for (header, r) in &plan.parts {
            assembled.extend_from_slice(header);
            assembled.extend_from_slice(&b"123456789"[r.start as usize..r.end as usize]);
        }
        assembled.extend_from_slice(&plan.trailer);
        assert_eq!(assembled.len() as u64, plan.content_length);

        let text = String::from_utf8(assembled).unwrap();
        assert_eq!(
            text,
            "\r\n--B\r\ncontent-type: application/octet-stream\r\n\
             content-range: bytes 1-1/9\r\n\r\n2\
             \r\n--B\r\ncontent-type: application/octet-stream\r\n\
             content-range: bytes 3-8/9\r\n\r\n456789\
             \r\n--B--"
        );
    }

    #[test]
    fn boundary_shape() {
        let b = boundary();
        assert!(b.starts_with(BOUNDARY_PREFIX));
        assert_eq!(b.len(), BOUNDARY_PREFIX.len() + 48);
        assert!(b.len() <= 70); // RFC 2046 boundary limit
        assert_ne!(b, boundary());
    }
}
