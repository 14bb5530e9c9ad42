// Copyright (c) The http-send developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE.txt or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT.txt or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `Accept-Encoding` parsing and content-coding negotiation.

/// The no-transformation coding. Always a candidate unless the client
/// forbids it with `identity;q=0`.
pub const IDENTITY: &str = "identity";

/// Parses an RFC 7231 section 5.3.1 `qvalue` into an integer in [0, 1000].
/// ```text
/// qvalue = ( "0" [ "." 0*3DIGIT ] )
///        / ( "1" [ "." 0*3("0") ] )
/// ```
fn parse_qvalue(s: &str) -> Result<u16, ()> {
    match s {
        "1" | "1." | "1.0" | "1.00" | "1.000" => return Ok(1000),
        "0" | "0." => return Ok(0),
        s if !s.starts_with("0.") => return Err(()),
        _ => {}
    };
    let v = &s[2..];
    let factor = match v.len() {
        1 /* 0.x */ => 100,
        2 /* 0.xx */ => 10,
        3 /* 0.xxx */ => 1,
        _ => return Err(()),
    };
    let v = v.parse::<u16>().map_err(|_| ())?;
    Ok(v * factor)
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'-' | b'!'
                        | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}

/// Maps legacy aliases onto their canonical coding names.
fn canonical(coding: &str) -> String {
    let lower = coding.to_ascii_lowercase();
    match lower.as_str() {
        "x-gzip" => "gzip".to_owned(),
        "x-compress" => "compress".to_owned(),
        _ => lower,
    }
}

/// One parsed `Accept-Encoding` entry.
struct AcceptEntry {
    coding: String,
    q: u16,
}

/// Parses an `Accept-Encoding` field value. Returns `None` when any entry is
/// syntactically invalid; negotiation then collapses to identity-only.
fn parse_accept_encoding(value: &str) -> Option<Vec<AcceptEntry>> {
    let mut entries = Vec::new();
    for item in value.split(',').map(str::trim) {
        if item.is_empty() {
            continue;
        }
        let mut halves = item.splitn(2, ';').map(str::trim);
        let coding = halves.next().unwrap_or("");
        if coding != "*" && !is_token(coding) {
            return None;
        }
        let q = match halves.next() {
            None => 1000,
            Some(param) => {
                let q = param
                    .strip_prefix("q=")
                    .or_else(|| param.strip_prefix("Q="))?;
                parse_qvalue(q.trim()).ok()?
            }
        };
        entries.push(AcceptEntry {
            coding: canonical(coding),
            q,
        });
    }
    Some(entries)
}

/// Produces the codings to attempt, most preferred first.
///
/// `candidates` are the codings the server can produce, in server preference
/// order (lower index = more preferred on quality ties). A synthetic
/// `identity` candidate is appended when the slice does not name one, with
/// the lowest preference. Identity is additionally kept as a final fallback
/// whenever the client did not mention it, so the result is empty only when
/// the client forbade every candidate with an explicit `q=0`.
pub fn negotiate<'c>(accept_encoding: Option<&str>, candidates: &[&'c str]) -> Vec<&'c str> {
    let Some(value) = accept_encoding else {
        return vec![IDENTITY];
    };
    let Some(entries) = parse_accept_encoding(value) else {
        return vec![IDENTITY];
    };
    if entries.is_empty() {
        return vec![IDENTITY];
    }

    // Candidate table: configured codings plus a synthetic identity entry.
    let identity_idx = candidates.iter().position(|c| *c == IDENTITY);
    let len = candidates.len() + usize::from(identity_idx.is_none());
    let name_of = |idx: usize| -> &'c str {
        candidates.get(idx).copied().unwrap_or(IDENTITY)
    };
    let mut recorded: Vec<Option<u16>> = vec![None; len];

    // Explicit mentions first; the first mention of a coding wins.
    for entry in &entries {
        if entry.coding == "*" {
            continue;
        }
        let idx = if entry.coding == IDENTITY {
            Some(identity_idx.unwrap_or(len - 1))
        } else {
            candidates.iter().position(|c| *c == entry.coding)
        };
        if let Some(idx) = idx {
            recorded[idx].get_or_insert(entry.q);
        }
    }
    // A wildcard covers every candidate not explicitly mentioned.
    if let Some(star) = entries.iter().find(|e| e.coding == "*") {
        for slot in &mut recorded {
            slot.get_or_insert(star.q);
        }
    }

    // (quality, order, implicit-identity-fallback)
    let mut picks: Vec<(u16, usize, bool)> = recorded
        .iter()
        .enumerate()
        .filter_map(|(idx, q)| match q {
            Some(0) => None,
            Some(q) => Some((*q, idx, false)),
            None => None,
        })
        .collect();
    let identity_slot = identity_idx.unwrap_or(len - 1);
    if recorded[identity_slot].is_none() {
        picks.push((0, identity_slot, true));
    }
    picks.sort_by(|a, b| {
        a.2.cmp(&b.2) // explicit before the implicit fallback
            .then(b.0.cmp(&a.0)) // quality descending
            .then(a.1.cmp(&b.1)) // server order ascending
    });
    picks.into_iter().map(|(_, idx, _)| name_of(idx)).collect()
}
