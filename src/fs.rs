// Copyright (c) The http-send developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE.txt or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT.txt or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! File-system backed storage with pre-compressed alternate resolution.

use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{header, HeaderMap};
use log::debug;
use percent_encoding::percent_decode_str;
use regex::Regex;
use tokio::task;

use crate::encoding::{negotiate, IDENTITY};
use crate::error::Error;
use crate::{BodyStream, Opened, Storage, StorageInfo};

/// Chunk size for positioned reads off the blocking pool.
const CHUNK_SIZE: u64 = 65_536;

/// Basic facts about an opened file.
#[derive(Clone, Copy, Debug)]
pub struct FileStat {
    pub len: u64,
    pub modified: Option<SystemTime>,
    pub is_dir: bool,
}

/// An opened file supporting positioned reads. Reads are issued from the
/// blocking pool and never touch a shared cursor, so one handle can feed
/// any number of sequential range parts.
pub trait FsFile: Send + Sync + 'static {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl FsFile for std::fs::File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        crate::platform::read_at(self, buf, offset)
    }
}

/// The narrow filesystem interface [`FsStorage`] consumes. Substituting an
/// in-memory implementation keeps the adapter testable without real files.
#[async_trait]
pub trait FileSystem: Send + Sync + 'static {
    type File: FsFile;

    /// Opens `path` and stats it in one step. Directories open successfully
    /// and are reported through [`FileStat::is_dir`].
    async fn open(&self, path: &Path) -> io::Result<(Self::File, FileStat)>;
}

/// `std::fs`, with the blocking calls routed through `spawn_blocking`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFileSystem;

#[async_trait]
impl FileSystem for OsFileSystem {
    type File = std::fs::File;

    async fn open(&self, path: &Path) -> io::Result<(Self::File, FileStat)> {
        let path = path.to_owned();
        task::spawn_blocking(move || {
            let file = std::fs::File::open(&path)?;
            let meta = file.metadata()?;
            Ok((
                file,
                FileStat {
                    len: meta.len(),
                    modified: meta.modified().ok(),
                    is_dir: meta.is_dir(),
                },
            ))
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

/// Rewrites resolved paths into pre-compressed alternates.
///
/// `matcher` selects eligible paths; each alternate pairs a coding name with
/// a replacement template (regex `$1`/`$0` syntax) producing the variant
/// path. Alternates are in server preference order. An `identity` alternate
/// mapping the path to itself is appended when none is configured, so the
/// uncompressed file stays reachable.
#[derive(Clone, Debug)]
pub struct EncodingMapping {
    matcher: Regex,
    alternates: Vec<(String, String)>,
}

impl EncodingMapping {
    pub fn new<N, T>(matcher: Regex, alternates: impl IntoIterator<Item = (N, T)>) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        let mut alternates: Vec<(String, String)> = alternates
            .into_iter()
            .map(|(name, template)| (name.into(), template.into()))
            .collect();
        if !alternates.iter().any(|(name, _)| name == IDENTITY) {
            alternates.push((IDENTITY.to_owned(), "$0".to_owned()));
        }
        EncodingMapping {
            matcher,
            alternates,
        }
    }

    fn template_for(&self, coding: &str) -> Option<&str> {
        self.alternates
            .iter()
            .find(|(name, _)| name == coding)
            .map(|(_, template)| template.as_str())
    }
}

/// A reference into an [`FsStorage`] tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FsReference {
    /// A URL-encoded absolute path, optionally carrying a query suffix.
    Url(String),
    /// Pre-split, already-decoded path parts; the first element must be
    /// empty (the root).
    Parts(Vec<String>),
}

impl FsReference {
    fn display(&self) -> String {
        match self {
            FsReference::Url(url) => url.clone(),
            FsReference::Parts(parts) => parts.join("/"),
        }
    }
}

/// Serves files below a root directory.
///
/// References are validated strictly before any filesystem access: dot
/// segments, consecutive or trailing slashes, forbidden characters, and
/// names matching the ignore pattern (dotfiles by default) are all rejected.
/// Every rejection surfaces as a uniform 404 from the response builder.
pub struct FsStorage<F: FileSystem = OsFileSystem> {
    fs: Arc<F>,
    root: PathBuf,
    ignore_pattern: Option<Regex>,
    mappings: Vec<EncodingMapping>,
}

impl<F: FileSystem> Clone for FsStorage<F> {
    fn clone(&self) -> Self {
        FsStorage {
            fs: Arc::clone(&self.fs),
            root: self.root.clone(),
            ignore_pattern: self.ignore_pattern.clone(),
            mappings: self.mappings.clone(),
        }
    }
}

impl FsStorage<OsFileSystem> {
    /// Serves the tree rooted at `root` through [`OsFileSystem`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_filesystem(root, OsFileSystem)
    }
}

impl<F: FileSystem> FsStorage<F> {
    pub fn with_filesystem(root: impl Into<PathBuf>, fs: F) -> Self {
        FsStorage {
            fs: Arc::new(fs),
            root: root.into(),
            ignore_pattern: Some(Regex::new(r"^\.").expect("static pattern parses")),
            mappings: Vec::new(),
        }
    }

    /// Replaces the ignore pattern. `None` disables name filtering.
    pub fn ignore_pattern(mut self, pattern: Option<Regex>) -> Self {
        self.ignore_pattern = pattern;
        self
    }

    /// Adds a pre-compressed alternate mapping; mappings are consulted in
    /// insertion order and the first whose matcher hits wins.
    pub fn encoding_mapping(mut self, mapping: EncodingMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    fn validate_parts(&self, reference: &FsReference, parts: &[String]) -> Result<(), Error> {
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                if i + 1 == parts.len() {
                    return Err(Error::TrailingSlash {
                        reference: reference.display(),
                    });
                }
                return Err(Error::ConsecutiveSlashes {
                    reference: reference.display(),
                });
            }
            if part.chars().any(forbidden_char) {
                return Err(Error::ForbiddenCharacter { part: part.clone() });
            }
            if let Some(ignore) = &self.ignore_pattern {
                if ignore.is_match(part) {
                    return Err(Error::IgnoredFile { part: part.clone() });
                }
            }
        }
        Ok(())
    }

    /// Negotiates and opens the best pre-compressed variant for `resolved`.
    async fn open_variant(
        &self,
        mapping: &EncodingMapping,
        resolved: &Path,
        headers: &HeaderMap,
    ) -> Result<(F::File, FileStat, String), Error> {
        let resolved_str = resolved.to_string_lossy();
        let accept = headers
            .get(header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok());
        let names: Vec<&str> = mapping
            .alternates
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        let mut last_err = None;
        for coding in negotiate(accept, &names) {
            let Some(template) = mapping.template_for(coding) else {
                continue;
            };
            let candidate = mapping.matcher.replace(&resolved_str, template);
            let path = Path::new(candidate.as_ref());
            match self.fs.open(path).await {
                Ok((file, stat)) => {
                    if stat.is_dir {
                        if coding == IDENTITY {
                            return Err(Error::IsDirectory {
                                path: path.to_owned(),
                            });
                        }
                        debug!("variant {candidate} is a directory, trying next coding");
                        continue;
                    }
                    debug!("selected {coding} variant {candidate}");
                    return Ok((file, stat, coding.to_owned()));
                }
                Err(e) => {
                    debug!("cannot open {coding} variant {candidate}: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(Error::DoesNotExist {
            path: resolved.to_owned(),
            source: last_err.unwrap_or_else(|| io::ErrorKind::NotFound.into()),
        })
    }
}

/// Characters never allowed in a path part: separators, Windows-reserved
/// punctuation, and the C0/C1 control ranges.
fn forbidden_char(c: char) -> bool {
    matches!(c, '/' | '?' | '<' | '>' | '\\' | ':' | '*' | '|' | '"')
        || c <= '\u{1f}'
        || ('\u{80}'..='\u{9f}').contains(&c)
}

/// True when every `%` begins a two-hex-digit escape.
fn well_formed_escapes(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if !(bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit))
            {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// Splits and decodes a `/`-prefixed URL path (dropping any query suffix)
/// into path parts.
fn decode_url_reference(reference: &str) -> Result<Vec<String>, Error> {
    if !reference.starts_with('/') {
        return Err(Error::Storage {
            reference: reference.to_owned(),
            source: "reference must begin with '/'".into(),
        });
    }
    let end = reference.find(['?', '#']).unwrap_or(reference.len());
    let pathname = &reference[..end];
    let mut parts = Vec::new();
    for raw in pathname.split('/').skip(1) {
        if !well_formed_escapes(raw) {
            return Err(Error::Malformed {
                reference: reference.to_owned(),
            });
        }
        let decoded = percent_decode_str(raw).decode_utf8().map_err(|_| {
            Error::Malformed {
                reference: reference.to_owned(),
            }
        })?;
        if decoded == "." || decoded == ".." {
            return Err(Error::NotNormalized {
                reference: reference.to_owned(),
            });
        }
        parts.push(decoded.into_owned());
    }
    Ok(parts)
}

/// Validates a pre-split part sequence: non-empty, rooted at an empty first
/// element, and free of dot segments.
fn check_parts_reference(parts: &[String]) -> Result<Vec<String>, Error> {
    let invalid = || Error::InvalidPath {
        parts: parts.to_vec(),
    };
    match parts.first() {
        None => return Err(invalid()),
        Some(first) if !first.is_empty() => return Err(invalid()),
        Some(_) => {}
    }
    if parts.iter().any(|p| p == "." || p == "..") {
        return Err(invalid());
    }
    Ok(parts[1..].to_vec())
}

/// An opened file plus the length its streams are clamped to.
pub struct FsHandle<F> {
    file: Arc<F>,
    len: u64,
}

#[async_trait]
impl<F: FileSystem> Storage for FsStorage<F> {
    type Reference = FsReference;
    type Handle = FsHandle<F::File>;

    async fn open(
        &self,
        reference: &FsReference,
        headers: &HeaderMap,
    ) -> Result<Opened<Self::Handle>, Error> {
        let parts = match reference {
            FsReference::Url(url) => decode_url_reference(url)?,
            FsReference::Parts(parts) => check_parts_reference(parts)?,
        };
        self.validate_parts(reference, &parts)?;
        let resolved = parts
            .iter()
            .fold(self.root.clone(), |path, part| path.join(part));
        let file_name = parts.last().cloned();

        let mapping = self
            .mappings
            .iter()
            .find(|m| m.matcher.is_match(resolved.to_string_lossy().as_ref()));
        let (file, stat, coding) = match mapping {
            Some(mapping) => {
                let (file, stat, coding) = self.open_variant(mapping, &resolved, headers).await?;
                (file, stat, Some(coding))
            }
            None => {
                let (file, stat) =
                    self.fs
                        .open(&resolved)
                        .await
                        .map_err(|e| Error::DoesNotExist {
                            path: resolved.clone(),
                            source: e,
                        })?;
                if stat.is_dir {
                    return Err(Error::IsDirectory { path: resolved });
                }
                (file, stat, None)
            }
        };

        let mut info = StorageInfo {
            file_name,
            size: Some(stat.len),
            mtime: stat.modified,
            ..StorageInfo::default()
        };
        if let Some(coding) = coding {
            // The pick depended on Accept-Encoding even when it fell back to
            // identity.
            info.vary = Some("Accept-Encoding".to_owned());
            if coding != IDENTITY {
                info.content_encoding = Some(coding);
            }
        }
        Ok(Opened {
            handle: FsHandle {
                file: Arc::new(file),
                len: stat.len,
            },
            info,
        })
    }

    fn create_stream(&self, handle: &Self::Handle, range: Option<Range<u64>>) -> BodyStream {
        let range = range.unwrap_or(0..handle.len);
        let file = Arc::clone(&handle.file);
        Box::pin(futures::stream::unfold(range, move |range| {
            let file = Arc::clone(&file);
            async move {
                if range.start >= range.end {
                    return None;
                }
                let take = std::cmp::min(CHUNK_SIZE, range.end - range.start) as usize;
                let offset = range.start;
                match task::spawn_blocking(move || read_chunk(&*file, offset, take)).await {
                    Ok(Ok(chunk)) => {
                        let read = chunk.len() as u64;
                        Some((Ok(chunk), offset + read..range.end))
                    }
                    Ok(Err(e)) => Some((Err(Error::Read(e)), range.end..range.end)),
                    Err(e) => Some((
                        Err(Error::Read(io::Error::new(io::ErrorKind::Other, e))),
                        range.end..range.end,
                    )),
                }
            }
        }))
    }
}

/// Reads exactly `len` bytes at `offset`, failing on early end-of-file.
fn read_chunk<F: FsFile>(file: &F, offset: u64, len: usize) -> io::Result<Bytes> {
    let mut buf = BytesMut::zeroed(len);
    let mut filled = 0;
    while filled < len {
        let n = file.read_at(&mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        filled += n;
    }
    Ok(buf.freeze())
}
