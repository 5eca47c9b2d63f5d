// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements the byte source capability and the bit-level reader built on top
//! of it.
//!
//! A [`ByteSource`] is the only thing the decoder core ever talks to. It models the reference
//! decoder's `acm_io_callbacks`: a mandatory `read`, and optional `seek`, `length`, and `close`
//! hooks. The decoder never assumes a concrete source; file, in-memory, and host-VFS adapters all
//! implement the same small trait.

mod bit;

pub use bit::BitReader;

use crate::errors::{not_seekable_error, Result};

/// The origin a [`ByteSource::seek`] offset is relative to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Relative to the start of the stream.
    Set,
    /// Relative to the current position.
    Current,
    /// Relative to the end of the stream.
    End,
}

/// `ByteSource` is the capability set the decoder core requires of its input. Every source must
/// implement `read`; `seek`, `length`, and `close` are optional and default to "unsupported".
pub trait ByteSource {
    /// Reads up to `buf.len()` bytes into `buf`, returning the number of bytes actually read.
    /// Returns `Ok(0)` at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Seeks to a new absolute byte offset, returning it. Sources that cannot seek should leave
    /// the default implementation in place.
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64> {
        let _ = (offset, origin);
        not_seekable_error()
    }

    /// Returns whether this source supports [`ByteSource::seek`]. The default is conservative:
    /// report unseekable unless overridden.
    fn is_seekable(&self) -> bool {
        false
    }

    /// Returns the total byte length of the source, if known.
    fn length(&self) -> Option<u64> {
        None
    }

    /// Invoked exactly once when the owning decoder is dropped. Sources that don't need explicit
    /// release (e.g. in-memory buffers) can ignore this.
    fn close(&mut self) {}
}

/// Reads exactly `buf.len()` bytes from `source`, short-circuiting with the number of bytes
/// actually obtained if the source runs dry first. Unlike [`std::io::Read::read_exact`], this
/// never treats a short read as fatal; the caller decides what a partial fill means.
pub fn read_fully(source: &mut dyn ByteSource, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

impl ByteSource for std::fs::File {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(std::io::Read::read(self, buf)?)
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64> {
        let from = match origin {
            SeekOrigin::Set => std::io::SeekFrom::Start(offset as u64),
            SeekOrigin::Current => std::io::SeekFrom::Current(offset),
            SeekOrigin::End => std::io::SeekFrom::End(offset),
        };
        Ok(std::io::Seek::seek(self, from)?)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn length(&self) -> Option<u64> {
        self.metadata().ok().map(|m| m.len())
    }
}

/// A `ByteSource` over an in-memory buffer. Always seekable.
pub struct MemorySource {
    data: Box<[u8]>,
    pos: usize,
}

impl MemorySource {
    pub fn new(data: impl Into<Box<[u8]>>) -> Self {
        MemorySource { data: data.into(), pos: 0 }
    }
}

impl ByteSource for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = &self.data[self.pos.min(self.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64> {
        let base: i64 = match origin {
            SeekOrigin::Set => 0,
            SeekOrigin::Current => self.pos as i64,
            SeekOrigin::End => self.data.len() as i64,
        };
        let new_pos = (base + offset).clamp(0, self.data.len() as i64);
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

/// Wraps any `ByteSource` to hide its seek support, producing a source that always reports
/// itself as non-seekable regardless of the inner source's actual capability. Useful for testing
/// forward-only pipes and similar hosts.
pub struct ForwardOnlySource<S: ByteSource> {
    inner: S,
}

impl<S: ByteSource> ForwardOnlySource<S> {
    pub fn new(inner: S) -> Self {
        ForwardOnlySource { inner }
    }
}

impl<S: ByteSource> ByteSource for ForwardOnlySource<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf)
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn length(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_reads_and_seeks() {
        let mut src = MemorySource::new(vec![1u8, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(read_fully(&mut src, &mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);

        src.seek(0, SeekOrigin::Set).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(read_fully(&mut src, &mut buf).unwrap(), 5);
        assert_eq!(buf, [1, 2, 3, 4, 5]);

        // Reading past the end yields a short (possibly empty) read, not an error.
        let mut tail = [0u8; 4];
        assert_eq!(read_fully(&mut src, &mut tail).unwrap(), 0);
    }

    #[test]
    fn forward_only_source_reports_unseekable() {
        let src = ForwardOnlySource::new(MemorySource::new(vec![0u8; 8]));
        assert!(!src.is_seekable());
        assert_eq!(src.length(), None);
    }
}
