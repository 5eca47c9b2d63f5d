// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parses the fixed-size ACM file header and the optional WAVC wrapper some hosts prepend to it.

use acm_core::errors::{bad_format_error, AcmError, Result};
use acm_core::io::ByteSource;

/// Length in bytes of the bare ACM header.
pub const HEADER_LEN: usize = 14;

/// The three magic bytes every ACM stream begins with.
const MAGIC: [u8; 3] = [0x97, 0x28, 0x03];

/// The format marker byte following the magic. Only one format is known to exist in the wild.
const FORMAT_MARKER: u8 = 0x01;

/// The largest `acm_level` this decoder will allocate buffers for. The reference decoder has no
/// documented limit, but a level this large already implies a 32768-sample subblock; anything
/// larger is almost certainly a corrupt header rather than a legitimate file.
const MAX_ACM_LEVEL: u8 = 15;

/// Immutable, header-derived stream parameters. Fixed for the lifetime of a decoder instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    /// Number of interleaved channels, 1 or 2.
    pub channels: u16,
    /// Sample rate in Hz.
    pub rate: u16,
    /// log2 of the subblock length.
    pub acm_level: u8,
    /// Number of subblocks per big block.
    pub acm_rows: u8,
    /// Subblock length in samples, `1 << acm_level`.
    pub acm_cols: u32,
    /// Declared total sample count across all channels, as stored in the header.
    pub total_values: u32,
    /// Byte offset in the stream where the bit-packed body begins (14, or 18 for WAVC-wrapped
    /// streams).
    pub body_offset: u64,
}

impl StreamInfo {
    /// Number of samples per channel in one big block.
    pub fn block_len(&self) -> u32 {
        self.acm_cols * u32::from(self.acm_rows)
    }

    /// Declared total per-channel sample count. `total_values` in the header counts samples
    /// across all channels, so this divides it down to the per-channel unit every other
    /// position accessor uses.
    pub fn pcm_total(&self) -> u32 {
        self.total_values / u32::from(self.channels)
    }
}

/// Reads the header from `source`, transparently skipping a leading `WAVC` wrapper if present.
///
/// A WAVC-wrapped stream is a 4-byte `b"WAVC"` tag immediately followed by a normal 14-byte ACM
/// header; the core accepts it as an optional compatibility extension rather than a distinct
/// format.
pub fn read_stream_info(source: &mut dyn ByteSource) -> Result<StreamInfo> {
    let mut probe = [0u8; 4];
    let n = acm_core::io::read_fully(source, &mut probe)?;

    let (header_bytes, wavc_prefix) = if n == 4 && &probe == b"WAVC" {
        let mut rest = [0u8; HEADER_LEN];
        let got = acm_core::io::read_fully(source, &mut rest)?;
        if got < HEADER_LEN {
            return Err(AcmError::NotAcm);
        }
        (rest, 4u64)
    } else if n < 4 {
        return Err(AcmError::NotAcm);
    } else {
        // Not a WAVC wrapper; `probe` already holds the first four header bytes. Read the
        // remaining ten to complete the 14-byte header.
        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(&probe);
        let got = acm_core::io::read_fully(source, &mut header[4..])?;
        if got < HEADER_LEN - 4 {
            return Err(AcmError::NotAcm);
        }
        (header, 0u64)
    };

    if header_bytes[0..3] != MAGIC {
        return Err(AcmError::NotAcm);
    }

    if header_bytes[3] != FORMAT_MARKER {
        return bad_format_error("unrecognized format marker");
    }

    let total_values = u32::from_le_bytes([
        header_bytes[4],
        header_bytes[5],
        header_bytes[6],
        header_bytes[7],
    ]);
    let channels = u16::from_le_bytes([header_bytes[8], header_bytes[9]]);
    let rate = u16::from_le_bytes([header_bytes[10], header_bytes[11]]);
    let acm_level = header_bytes[12];
    let acm_rows = header_bytes[13];

    if channels != 1 && channels != 2 {
        return bad_format_error("channels must be 1 or 2");
    }
    if acm_level > MAX_ACM_LEVEL {
        return bad_format_error("acm_level out of supported range");
    }
    if acm_rows == 0 {
        return bad_format_error("acm_rows must be nonzero");
    }

    let acm_cols = 1u32 << acm_level;
    let body_offset = wavc_prefix + HEADER_LEN as u64;

    Ok(StreamInfo { channels, rate, acm_level, acm_rows, acm_cols, total_values, body_offset })
}
