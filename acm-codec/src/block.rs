// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Big-block assembly: decodes one channel's worth of subblocks per row, maintains the
//! per-channel wrap buffer, and serves the result as channel-interleaved PCM bytes.

use acm_core::errors::{AcmError, Result};
use acm_core::io::{BitReader, ByteSource};
use acm_core::util::clamp::clamp_i16;

use crate::header::StreamInfo;
use crate::transform::inverse_transform;
use crate::unpack::unpack_subblock;

/// Width, in bits, of the pack code field that precedes every subblock.
const PACK_CODE_BITS: u32 = 5;
/// Width, in bits, of the amplitude exponent field that follows the pack code.
const AMP_EXPONENT_BITS: u32 = 4;
/// Largest possible encoded frame size: two channels, 16-bit samples each.
const MAX_FRAME_BYTES: usize = 4;

/// The block producer's state, mirroring the pull-based state machine: a read request drives
/// block production only when no decoded block is currently being served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    Serving,
    End,
    Error,
}

/// A `Copy`-able summary of the error that latched the producer into [`State::Error`]. `AcmError`
/// itself is not `Copy` (it can carry a `std::io::Error`), so the original error's kind is
/// recorded here and replayed as an equivalent, freshly constructed `AcmError` on every
/// subsequent read.
#[derive(Clone, Copy, Debug)]
enum LatchedErrorKind {
    Other,
    Open,
    NotAcm,
    Read,
    BadFormat,
    Corrupt,
    UnexpectedEof,
    NotSeekable,
}

impl LatchedErrorKind {
    fn from_acm_error(err: &AcmError) -> Self {
        match err {
            AcmError::Other(_) => LatchedErrorKind::Other,
            AcmError::Open(_) => LatchedErrorKind::Open,
            AcmError::NotAcm => LatchedErrorKind::NotAcm,
            AcmError::Read(_) => LatchedErrorKind::Read,
            AcmError::BadFormat(_) => LatchedErrorKind::BadFormat,
            AcmError::Corrupt(_) => LatchedErrorKind::Corrupt,
            AcmError::UnexpectedEof => LatchedErrorKind::UnexpectedEof,
            AcmError::NotSeekable => LatchedErrorKind::NotSeekable,
        }
    }

    fn to_acm_error(self) -> AcmError {
        match self {
            LatchedErrorKind::Other => AcmError::Other("latched error"),
            LatchedErrorKind::Open => {
                AcmError::Open(std::io::Error::new(std::io::ErrorKind::Other, "latched error"))
            }
            LatchedErrorKind::NotAcm => AcmError::NotAcm,
            LatchedErrorKind::Read => {
                AcmError::Read(std::io::Error::new(std::io::ErrorKind::Other, "latched error"))
            }
            LatchedErrorKind::BadFormat => AcmError::BadFormat("latched error"),
            LatchedErrorKind::Corrupt => AcmError::Corrupt("latched error"),
            LatchedErrorKind::UnexpectedEof => AcmError::UnexpectedEof,
            LatchedErrorKind::NotSeekable => AcmError::NotSeekable,
        }
    }
}

/// Decodes and serves big blocks for every channel, one subblock row at a time.
pub struct BlockProducer<S: ByteSource> {
    info: StreamInfo,
    br: BitReader<S>,
    /// Per-channel decoded big block, each `acm_cols * acm_rows` samples long, rows concatenated
    /// in time order.
    channel_blocks: Vec<Vec<i32>>,
    /// Per-channel, per-row wrap buffer: the last reconstructed sample of each row, carried into
    /// the same row of the next big block.
    wrap: Vec<Vec<i32>>,
    /// Scratch buffer for one subblock's amplitude-scaled middle values, reused across rows.
    mid_scratch: Vec<i32>,
    state: State,
    /// Samples already delivered from the block currently being served, per channel.
    block_pos: u32,
    /// Total per-channel samples delivered so far.
    stream_pos: u32,
    /// The error that put the producer into the latched [`State::Error`] state, replayed on
    /// every subsequent read.
    latched_error: Option<LatchedErrorKind>,
    /// One fully-encoded frame, staged here when the caller's destination buffer is too small
    /// to take it whole; drained before any further frame is produced.
    frame_buf: [u8; MAX_FRAME_BYTES],
    frame_buf_len: usize,
    frame_buf_pos: usize,
}

impl<S: ByteSource> BlockProducer<S> {
    pub fn new(info: StreamInfo, br: BitReader<S>) -> Self {
        let channels = usize::from(info.channels);
        let block_len = info.block_len() as usize;
        let rows = usize::from(info.acm_rows);

        BlockProducer {
            info,
            br,
            channel_blocks: vec![vec![0i32; block_len]; channels],
            wrap: vec![vec![0i32; rows]; channels],
            mid_scratch: vec![0i32; info.acm_cols as usize],
            state: State::Idle,
            block_pos: 0,
            stream_pos: 0,
            latched_error: None,
            frame_buf: [0u8; MAX_FRAME_BYTES],
            frame_buf_len: 0,
            frame_buf_pos: 0,
        }
    }

    pub fn stream_pos(&self) -> u32 {
        self.stream_pos
    }

    /// Resets all mutable decode state to stream start, positioning the bit reader at
    /// `info.body_offset`. Used by the seek controller after rewinding the byte source.
    pub fn reset(&mut self) {
        self.br.reset(self.info.body_offset);
        for block in &mut self.channel_blocks {
            block.fill(0);
        }
        for row in &mut self.wrap {
            row.fill(0);
        }
        self.state = State::Idle;
        self.block_pos = 0;
        self.stream_pos = 0;
        self.latched_error = None;
        self.frame_buf_len = 0;
        self.frame_buf_pos = 0;
    }

    pub fn into_bit_reader(self) -> BitReader<S> {
        self.br
    }

    pub fn bit_reader_mut(&mut self) -> &mut BitReader<S> {
        &mut self.br
    }

    /// Reads up to `dst.len()` bytes of interleaved PCM, decoding further big blocks as needed.
    /// Returns the number of bytes written; 0 means clean end of stream. A latched error is
    /// returned again on every subsequent call once the producer enters the error state.
    ///
    /// `dst` need not hold a whole number of channel-frames: a frame produced but not fully
    /// consumed because `dst` ran out of room is staged and delivered on the next call, so even
    /// single-byte reads make progress instead of spuriously reporting end of stream.
    pub fn read(
        &mut self,
        dst: &mut [u8],
        big_endian: bool,
        signed: bool,
    ) -> Result<usize> {
        let channels = usize::from(self.info.channels);
        let mut written = 0;

        while written < dst.len() {
            if self.frame_buf_pos < self.frame_buf_len {
                let avail = self.frame_buf_len - self.frame_buf_pos;
                let n = avail.min(dst.len() - written);
                dst[written..written + n].copy_from_slice(
                    &self.frame_buf[self.frame_buf_pos..self.frame_buf_pos + n],
                );
                self.frame_buf_pos += n;
                written += n;
                continue;
            }

            match self.state {
                State::Error => {
                    let kind = self.latched_error.expect("Error state always carries a cause");
                    return Err(kind.to_acm_error());
                }
                State::End => break,
                State::Idle => {
                    let mut started = false;
                    match self.decode_big_block(&mut started) {
                        Ok(()) => {
                            self.state = State::Serving;
                            self.block_pos = 0;
                        }
                        Err(AcmError::UnexpectedEof) if !started => {
                            // Clean EOF: the source ended exactly at a block boundary.
                            self.state = State::End;
                        }
                        Err(err) => {
                            self.latched_error = Some(LatchedErrorKind::from_acm_error(&err));
                            self.state = State::Error;
                            return Err(err);
                        }
                    }
                }
                State::Serving => {
                    let block_len = self.info.block_len();
                    if self.block_pos >= block_len {
                        self.state = State::Idle;
                        self.block_pos = 0;
                        continue;
                    }

                    let mut frame_len = 0;
                    for ch in 0..channels {
                        let sample = self.channel_blocks[ch][self.block_pos as usize];
                        let bytes = encode_sample(sample, big_endian, signed);
                        self.frame_buf[frame_len..frame_len + 2].copy_from_slice(&bytes);
                        frame_len += 2;
                    }
                    self.block_pos += 1;
                    self.stream_pos += 1;
                    self.frame_buf_len = frame_len;
                    self.frame_buf_pos = 0;
                }
            }
        }

        Ok(written)
    }

    /// Decodes one full big block across every channel. `started` is set to `true` as soon as
    /// the first bit of the block has been consumed, distinguishing a clean end-of-stream (the
    /// source ends exactly at a block boundary) from a fatal truncation partway through one.
    fn decode_big_block(&mut self, started: &mut bool) -> Result<()> {
        let rows = usize::from(self.info.acm_rows);
        let cols = self.info.acm_cols as usize;
        let channels = usize::from(self.info.channels);
        let level = self.info.acm_level;

        for row in 0..rows {
            for ch in 0..channels {
                let pack_code = self.br.get_bits(PACK_CODE_BITS)? as u8;
                *started = true;
                let exponent = self.br.get_bits(AMP_EXPONENT_BITS)?;

                unpack_subblock(pack_code, &mut self.br, &mut self.mid_scratch)?;
                for v in &mut self.mid_scratch {
                    *v <<= exponent;
                }

                let out = &mut self.channel_blocks[ch][row * cols..(row + 1) * cols];
                inverse_transform(level, &self.mid_scratch, &mut self.wrap[ch][row], out);
            }
        }

        Ok(())
    }
}

/// Converts one reconstructed sample to its requested on-the-wire byte pair.
pub(crate) fn encode_sample(sample: i32, big_endian: bool, signed: bool) -> [u8; 2] {
    let clamped = clamp_i16(sample);
    let unsigned = if signed {
        clamped as u16
    }
    else {
        (clamped as i32 + 0x8000) as u16
    };

    if big_endian {
        unsigned.to_be_bytes()
    }
    else {
        unsigned.to_le_bytes()
    }
}
