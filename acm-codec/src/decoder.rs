// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The top-level decoder handle: opens a stream, serves PCM reads, and implements seek-by-sample
//! by rewinding and redecoding (the format carries no random-access markers).

use acm_core::errors::{bad_format_error, Result};
use acm_core::io::{BitReader, ByteSource, SeekOrigin};

use crate::block::{encode_sample, BlockProducer};
use crate::header::{read_stream_info, StreamInfo};

/// The only `word_width` the decoder understands; samples are always 16-bit PCM.
const WORD_WIDTH: usize = 2;

/// A hardcoded fallback bitrate, in bits per second, reported when the byte source's length is
/// unknown and an actual compressed bitrate cannot be computed.
const FALLBACK_BITRATE: u32 = 13_000;

/// Decodes an Interplay ACM stream into signed 16-bit PCM.
///
/// Construct with [`Decoder::open`], pull PCM bytes with [`Decoder::read`], and seek by
/// per-channel sample index with [`Decoder::seek_pcm`]. Dropping the decoder releases the
/// underlying byte source via its optional close hook.
pub struct Decoder<S: ByteSource> {
    info: StreamInfo,
    producer: BlockProducer<S>,
    /// Total bytes delivered to the caller so far, including any zero-fill used to round a
    /// short, truncated body up to the header's declared total. Tracked in bytes rather than
    /// per-channel samples so that a `read` call whose buffer ends mid-frame still advances this
    /// correctly; [`Decoder::pcm_tell`] divides back down to samples.
    delivered_bytes: u64,
}

impl<S: ByteSource> Decoder<S> {
    /// Opens `source`, parsing its header and leaving it positioned to decode the first big
    /// block. The source is consumed and owned by the returned decoder.
    pub fn open(mut source: S) -> Result<Self> {
        let info = read_stream_info(&mut source)?;
        let br = BitReader::new(source, info.body_offset);
        let producer = BlockProducer::new(info, br);

        log::debug!(
            "opened acm stream: channels={} rate={} level={} rows={} total_values={}",
            info.channels,
            info.rate,
            info.acm_level,
            info.acm_rows,
            info.total_values
        );

        Ok(Decoder { info, producer, delivered_bytes: 0 })
    }

    /// Returns the header-derived, immutable stream parameters.
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Whether backward seeks are currently possible (the underlying source supports seeking).
    pub fn seekable(&mut self) -> bool {
        self.producer.bit_reader_mut().source_mut().is_seekable()
    }

    /// Total per-channel samples declared in the header.
    pub fn pcm_total(&self) -> u32 {
        self.info.pcm_total()
    }

    /// Per-channel samples delivered so far.
    pub fn pcm_tell(&self) -> u32 {
        (self.delivered_bytes / self.frame_len() as u64) as u32
    }

    /// Byte width of one channel-interleaved frame (all channels, one sample each).
    fn frame_len(&self) -> usize {
        usize::from(self.info.channels) * WORD_WIDTH
    }

    /// Total declared playback time in milliseconds, using the reference decoder's coarsened
    /// integer-division mapping.
    pub fn time_total(&self) -> u32 {
        pcm_to_time_ms(u64::from(self.pcm_total()), self.info.rate)
    }

    /// Playback time elapsed so far in milliseconds, using the same coarsened mapping as
    /// [`Decoder::time_total`].
    pub fn time_tell(&self) -> u32 {
        pcm_to_time_ms(u64::from(self.pcm_tell()), self.info.rate)
    }

    /// Absolute byte offset of the next unconsumed bit's byte in the compressed body. Useful for
    /// position reporting; not meaningful for resuming decode without a full seek.
    pub fn raw_tell(&mut self) -> u64 {
        self.producer.bit_reader_mut().raw_tell()
    }

    /// Total compressed byte length of the stream, if the source reports a known length.
    pub fn raw_total(&mut self) -> Option<u64> {
        self.producer
            .bit_reader_mut()
            .source_mut()
            .length()
            .map(|len| len.saturating_sub(self.info.body_offset))
    }

    /// Estimated bitrate in bits per second, following the reference decoder's formula: total
    /// compressed bytes divided by total seconds, times eight. Falls back to a fixed estimate
    /// when the source length (and so the compressed byte total) is unknown.
    pub fn bitrate(&mut self) -> u32 {
        let rate = u32::from(self.info.rate);
        let total = self.pcm_total();

        if rate == 0 || total == 0 {
            return FALLBACK_BITRATE;
        }

        match self.raw_total() {
            Some(raw_total) => {
                let secs = u64::from(total) / u64::from(rate);
                if secs == 0 {
                    FALLBACK_BITRATE
                }
                else {
                    ((raw_total / secs) * 8) as u32
                }
            }
            None => FALLBACK_BITRATE,
        }
    }

    /// Fills `dst` with up to `dst.len()` bytes of channel-interleaved PCM, decoding further big
    /// blocks as needed. Returns the number of bytes written; `0` means end of stream. Once a
    /// fatal error occurs every subsequent call returns the same error.
    ///
    /// If the compressed body ends before the header's declared `total_values` is reached, the
    /// shortfall is zero-filled so that reading to end of stream always yields exactly
    /// `pcm_total() * 2` bytes.
    pub fn read(&mut self, dst: &mut [u8], big_endian: bool, word_width: usize, signed: bool) -> Result<usize> {
        if word_width != WORD_WIDTH {
            return bad_format_error("word_width must be 2");
        }

        let frame = self.frame_len() as u64;
        let declared_bytes = u64::from(self.pcm_total()) * frame;
        let mut written = 0usize;

        while written < dst.len() {
            let remaining_declared_bytes = declared_bytes.saturating_sub(self.delivered_bytes);
            if remaining_declared_bytes == 0 {
                break;
            }

            let want = ((dst.len() - written) as u64).min(remaining_declared_bytes) as usize;
            let n = self.producer.read(&mut dst[written..written + want], big_endian, signed)?;
            written += n;
            self.delivered_bytes += n as u64;

            if n < want {
                // Compressed body ended before the header's declared total; zero-fill the
                // shortfall byte by byte so reading to end of stream always yields exactly
                // `pcm_total() * frame` bytes, regardless of how the caller's reads are sized.
                let still_owed = remaining_declared_bytes - n as u64;
                let room = (dst.len() - written) as u64;
                let pad = still_owed.min(room) as usize;

                let silence = encode_sample(0, big_endian, signed);
                for i in 0..pad {
                    dst[written + i] = silence[(self.delivered_bytes % 2) as usize];
                    self.delivered_bytes += 1;
                }
                written += pad;
                break;
            }
        }

        Ok(written)
    }

    /// Seeks to per-channel sample position `p`. Forward seeks decode and discard; backward
    /// seeks require the source to support seeking and rewind to the start of the compressed
    /// body before redecoding forward, since the format has no random-access markers.
    pub fn seek_pcm(&mut self, p: u32) -> Result<u32> {
        let target = u64::from(p);

        if target < u64::from(self.pcm_tell()) {
            self.producer.bit_reader_mut().source_mut().seek(
                self.info.body_offset as i64,
                SeekOrigin::Set,
            )?;
            self.producer.reset();
            self.delivered_bytes = 0;
        }

        self.discard_to(target)?;
        Ok(self.pcm_tell())
    }

    /// Converts a millisecond position to a per-channel sample index using the reference
    /// decoder's coarsened integer-division mapping, then delegates to [`Decoder::seek_pcm`].
    pub fn seek_time(&mut self, ms: u32) -> Result<u32> {
        let rate = u32::from(self.info.rate);
        let samples = (ms / 100) * (rate / 10);
        self.seek_pcm(samples)
    }

    /// Fills `dst` completely, issuing further [`Decoder::read`] calls as needed until `dst` is
    /// full, end of stream is reached, or an error occurs. Returns the total number of bytes
    /// written, which is less than `dst.len()` only at end of stream.
    pub fn read_loop(
        &mut self,
        dst: &mut [u8],
        big_endian: bool,
        word_width: usize,
        signed: bool,
    ) -> Result<usize> {
        let mut got = 0usize;
        while got < dst.len() {
            let n = self.read(&mut dst[got..], big_endian, word_width, signed)?;
            if n == 0 {
                break;
            }
            got += n;
        }
        Ok(got)
    }

    fn discard_to(&mut self, target: u64) -> Result<()> {
        let frame = self.frame_len();
        let mut sink = vec![0u8; frame * 4096];

        while u64::from(self.pcm_tell()) < target {
            let want = ((target - u64::from(self.pcm_tell())) as usize).min(sink.len() / frame);
            let n = self.read(&mut sink[..want * frame], false, WORD_WIDTH, true)?;
            if n == 0 {
                break;
            }
        }

        Ok(())
    }
}

/// `(10 * pcm / rate) * 100`, matching the reference decoder's integer-division rounding.
fn pcm_to_time_ms(pcm: u64, rate: u16) -> u32 {
    if rate == 0 {
        return 0;
    }
    (((10 * pcm) / u64::from(rate)) * 100) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use acm_core::io::{ForwardOnlySource, MemorySource};

    const MAGIC: [u8; 3] = [0x97, 0x28, 0x03];

    fn build_acm(total_values: u32, channels: u16, rate: u16, level: u8, rows: u8, blocks: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.push(0x01);
        bytes.extend_from_slice(&total_values.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.push(level);
        bytes.push(rows);

        // Body: `blocks` big blocks, every subblock silence (pack code 0, exponent 0, 9 bits).
        // Chosen test parameters keep `blocks * subblocks_per_block * 9` a multiple of 8 so the
        // body ends on a clean byte (and so subblock) boundary, with no stray bits that would
        // otherwise read as the start of an incomplete further block.
        let subblocks_per_block = usize::from(rows) * usize::from(channels);
        let total_bits = blocks as usize * subblocks_per_block * 9;
        assert_eq!(total_bits % 8, 0, "test body must end on a byte boundary");
        bytes.extend(std::iter::repeat(0u8).take(total_bits / 8));
        bytes
    }

    #[test]
    fn reads_declared_total_exactly_with_zero_fill_on_short_body() {
        // level=2 (cols=4), rows=2, mono: 2 subblocks/block * 9 bits = 18 bits/block; 4 blocks
        // = 72 bits = 9 bytes exactly, with 4*4*2 = 32 real samples present.
        let cols = 4u32;
        let rows = 2u8;
        let block_len = cols * u32::from(rows);
        let real_blocks = 4u32;
        let total_values = block_len * (real_blocks + 2); // declare two further blocks than exist
        let bytes = build_acm(total_values, 1, 22050, 2, rows, real_blocks);

        let mut decoder = Decoder::open(MemorySource::new(bytes)).unwrap();
        let mut out = vec![0u8; (total_values as usize) * 2];
        let n = decoder.read(&mut out, false, 2, true).unwrap();
        assert_eq!(n, out.len());
        assert_eq!(decoder.pcm_tell(), total_values);
        // The zero-filled tail decodes as digital silence.
        assert!(out[(block_len * real_blocks) as usize * 2..].iter().all(|&b| b == 0));

        // Further reads report clean end of stream.
        let mut tail = [0xffu8; 8];
        let n2 = decoder.read(&mut tail, false, 2, true).unwrap();
        assert_eq!(n2, 0);
    }

    #[test]
    fn odd_sized_reads_make_progress_through_stereo_and_zero_fill() {
        // Stereo frames are 4 bytes wide; reading 3 bytes at a time (never frame-aligned) must
        // still decode real data and, once the body is exhausted, deliver the zero-filled tail
        // without ever reporting a spurious early end of stream.
        let cols = 4u32;
        let rows = 2u8;
        let channels = 2u16;
        let block_len = cols * u32::from(rows);
        let real_blocks = 2u32;
        let per_channel_total = block_len * (real_blocks + 1); // one undelivered block of silence
        let total_values = per_channel_total * u32::from(channels);
        let bytes = build_acm(total_values, channels, 22050, 2, rows, real_blocks);

        let mut decoder = Decoder::open(MemorySource::new(bytes)).unwrap();
        let expected_total = (per_channel_total as usize) * usize::from(channels) * 2;
        let real_bytes = (block_len * real_blocks) as usize * usize::from(channels) * 2;

        let mut got = Vec::new();
        loop {
            let mut chunk = [0xffu8; 3];
            let n = decoder.read(&mut chunk, false, 2, true).unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&chunk[..n]);
        }

        assert_eq!(got.len(), expected_total);
        assert!(got[..real_bytes].iter().all(|&b| b == 0));
        assert!(got[real_bytes..].iter().all(|&b| b == 0));
        assert_eq!(decoder.pcm_tell(), per_channel_total);
    }

    #[test]
    fn seek_forward_matches_continuous_decode() {
        let bytes = build_acm(64, 1, 22050, 3, 4, 4);

        let mut continuous = Decoder::open(MemorySource::new(bytes.clone())).unwrap();
        let mut all = vec![0u8; 128];
        continuous.read(&mut all, false, 2, true).unwrap();

        let mut seeking = Decoder::open(MemorySource::new(bytes)).unwrap();
        seeking.seek_pcm(32).unwrap();
        let mut suffix = vec![0u8; 64];
        seeking.read(&mut suffix, false, 2, true).unwrap();

        assert_eq!(&suffix[..], &all[64..]);
    }

    #[test]
    fn backward_seek_on_nonseekable_source_fails() {
        let bytes = build_acm(64, 1, 22050, 3, 4, 4);
        let mut decoder = Decoder::open(ForwardOnlySource::new(MemorySource::new(bytes))).unwrap();

        let mut buf = vec![0u8; 64];
        decoder.read(&mut buf, false, 2, true).unwrap();
        assert!(decoder.seek_pcm(0).is_err());
    }

    #[test]
    fn seek_to_current_position_on_nonseekable_source_succeeds() {
        let bytes = build_acm(64, 1, 22050, 3, 4, 4);
        let mut decoder = Decoder::open(ForwardOnlySource::new(MemorySource::new(bytes))).unwrap();
        assert_eq!(decoder.seek_pcm(0).unwrap(), 0);
    }

    #[test]
    fn rejects_unsupported_word_width() {
        let bytes = build_acm(16, 1, 22050, 2, 2, 4);
        let mut decoder = Decoder::open(MemorySource::new(bytes)).unwrap();
        let mut buf = [0u8; 4];
        assert!(decoder.read(&mut buf, false, 1, true).is_err());
    }

    #[test]
    fn read_loop_fills_buffer_across_multiple_internal_reads() {
        let bytes = build_acm(64, 1, 22050, 3, 4, 4);
        let mut decoder = Decoder::open(MemorySource::new(bytes)).unwrap();
        let mut buf = vec![0xffu8; 128];
        let n = decoder.read_loop(&mut buf, false, 2, true).unwrap();
        assert_eq!(n, 128);
        assert_eq!(decoder.pcm_tell(), 64);
    }
}
