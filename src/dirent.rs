// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode directory listings in the FUSE dirent layout.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Directory listings are serialized exactly as the kernel expects them in a
//! `FUSE_READDIR` reply: a `fuse_dirent` header (`ino`, `off`, `namelen`,
//! `type`) followed by the name, padded to an 8 byte boundary. Each record's
//! `off` is the byte offset of the record after it, so a listing can be
//! resumed from any offset the host hands back.

use crate::namespace::DirEntry;

/// Size of the fixed `fuse_dirent` header.
pub const DIRENT_HEADER_BYTES: usize = 24;

const DIRENT_ALIGN: usize = 8;

/// Encoded size of a record whose name is `name_len` bytes long.
#[must_use]
pub fn record_len(name_len: usize) -> usize {
    (DIRENT_HEADER_BYTES + name_len + DIRENT_ALIGN - 1) & !(DIRENT_ALIGN - 1)
}

/// Growable buffer of encoded directory records.
#[derive(Debug, Default, Clone)]
pub struct DirBuf {
    bytes: Vec<u8>,
}

impl DirBuf {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Append one record.
    pub fn push(&mut self, inode: u64, kind: u32, name: &[u8]) {
        let start = self.bytes.len();
        let next = start + record_len(name.len());
        self.bytes.extend_from_slice(&inode.to_ne_bytes());
        self.bytes.extend_from_slice(&(next as u64).to_ne_bytes());
        self.bytes.extend_from_slice(&(name.len() as u32).to_ne_bytes());
        self.bytes.extend_from_slice(&kind.to_ne_bytes());
        self.bytes.extend_from_slice(name);
        self.bytes.resize(next, 0);
    }

    /// Total encoded size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when no records were pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow the encoded records.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// At most `max_bytes` starting at `offset`; empty past the end.
    #[must_use]
    pub fn slice(&self, offset: u64, max_bytes: usize) -> &[u8] {
        match usize::try_from(offset) {
            Ok(start) if start < self.bytes.len() => {
                let end = start.saturating_add(max_bytes).min(self.bytes.len());
                &self.bytes[start..end]
            }
            _ => &[],
        }
    }
}

impl<'a> FromIterator<&'a DirEntry> for DirBuf {
    fn from_iter<I: IntoIterator<Item = &'a DirEntry>>(iter: I) -> Self {
        let mut buf = Self::new();
        for entry in iter {
            buf.push(entry.inode, entry.kind.dirent_type(), entry.name.as_bytes());
        }
        buf
    }
}

/// Serialize `entries` and return the reply window at `start_offset`.
#[must_use]
pub fn directory_listing(entries: &[DirEntry], start_offset: u64, max_bytes: usize) -> Vec<u8> {
    let buf: DirBuf = entries.iter().collect();
    buf.slice(start_offset, max_bytes).to_vec()
}

/// One decoded directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dirent<'a> {
    /// Inode number.
    pub inode: u64,
    /// Byte offset of the following record.
    pub next_offset: u64,
    /// `DT_*` entry type.
    pub kind: u32,
    /// Raw entry name.
    pub name: &'a [u8],
}

/// Iterate over the complete records in `bytes`.
///
/// A record cut short by the reply size limit ends the iteration.
#[must_use]
pub fn decode(bytes: &[u8]) -> DirentIter<'_> {
    DirentIter { rest: bytes }
}

/// Iterator returned by [`decode`].
#[derive(Debug, Clone)]
pub struct DirentIter<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for DirentIter<'a> {
    type Item = Dirent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = self.rest.get(..DIRENT_HEADER_BYTES)?;
        let inode = u64::from_ne_bytes(header[0..8].try_into().ok()?);
        let next_offset = u64::from_ne_bytes(header[8..16].try_into().ok()?);
        let name_len = u32::from_ne_bytes(header[16..20].try_into().ok()?) as usize;
        let kind = u32::from_ne_bytes(header[20..24].try_into().ok()?);
        let len = record_len(name_len);
        if len > self.rest.len() {
            self.rest = &[];
            return None;
        }
        let name = &self.rest[DIRENT_HEADER_BYTES..DIRENT_HEADER_BYTES + name_len];
        self.rest = &self.rest[len..];
        Some(Dirent {
            inode,
            next_offset,
            kind,
            name,
        })
    }
}
