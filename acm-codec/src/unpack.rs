// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The seventeen subblock unpacking schemes, selected per-subblock by a 5-bit pack code.
//!
//! Each routine fills a caller-supplied buffer of `acm_cols` "middle values" for one subblock row.
//! Dispatch is table-driven: an illegal pack code (17..31) is rejected before any routine runs,
//! keeping the hot path branch-predictable and making fuzzing the illegal-code path trivial.

use acm_core::errors::{corrupt_error, Result};
use acm_core::io::{BitReader, ByteSource};
use acm_core::util::bits::sign_extend_leq32_to_i32;

/// Largest legal pack code. Codes 17..31 (the remaining values a 5-bit field can hold) are
/// corrupt-stream errors.
pub const MAX_PACK_CODE: u8 = 16;

type UnpackFn<S> = fn(&mut BitReader<S>, &mut [i32]) -> Result<()>;

/// Unpacks one subblock's middle values according to `pack_code`.
///
/// `mid` must have length `acm_cols`; every element is overwritten.
pub fn unpack_subblock<S: ByteSource>(
    pack_code: u8,
    br: &mut BitReader<S>,
    mid: &mut [i32],
) -> Result<()> {
    if pack_code > MAX_PACK_CODE {
        return corrupt_error("pack code out of range");
    }

    let table: [UnpackFn<S>; (MAX_PACK_CODE as usize) + 1] = [
        unpack_silence,
        unpack_unary_ternary,
        unpack_signed_magnitude::<S, 2>,
        unpack_signed_magnitude::<S, 3>,
        unpack_signed_magnitude::<S, 4>,
        unpack_signed_magnitude::<S, 5>,
        unpack_signed_magnitude::<S, 6>,
        unpack_signed_magnitude::<S, 7>,
        unpack_dense::<S, 1>,
        unpack_dense::<S, 2>,
        unpack_dense::<S, 3>,
        unpack_dense::<S, 4>,
        unpack_dense::<S, 5>,
        unpack_dense::<S, 6>,
        unpack_dense::<S, 7>,
        unpack_dense::<S, 8>,
        unpack_escape_prefix,
    ];

    table[pack_code as usize](br, mid)
}

/// Pack code 0: the subblock is silence. No bits are consumed.
fn unpack_silence<S: ByteSource>(_br: &mut BitReader<S>, mid: &mut [i32]) -> Result<()> {
    mid.fill(0);
    Ok(())
}

/// Pack code 1: each sample is coded as a single bit run. A `0` bit codes the sample as `0`; a
/// `1` bit introduces a second bit that selects `+1` (`0`) or `-1` (`1`).
fn unpack_unary_ternary<S: ByteSource>(br: &mut BitReader<S>, mid: &mut [i32]) -> Result<()> {
    for slot in mid.iter_mut() {
        *slot = if br.get_bit()? {
            if br.get_bit()? {
                -1
            }
            else {
                1
            }
        }
        else {
            0
        };
    }
    Ok(())
}

/// Pack codes 2..=7: a `K`-bit sign-magnitude code per sample. Bit 0 of the field is the sign;
/// the remaining `K - 1` bits are the magnitude. An all-zero field is the zero escape: both signs
/// of zero decode to the same value.
fn unpack_signed_magnitude<S: ByteSource, const K: u32>(
    br: &mut BitReader<S>,
    mid: &mut [i32],
) -> Result<()> {
    for slot in mid.iter_mut() {
        let field = br.get_bits(K)?;
        let sign = field & 1;
        let magnitude = (field >> 1) as i32;
        *slot = if sign != 0 { -magnitude } else { magnitude };
    }
    Ok(())
}

/// Pack codes 8..=15: a dense `K`-bit two's complement code per sample, `K = code - 7`.
fn unpack_dense<S: ByteSource, const K: u32>(br: &mut BitReader<S>, mid: &mut [i32]) -> Result<()> {
    for slot in mid.iter_mut() {
        let field = br.get_bits(K)?;
        *slot = sign_extend_leq32_to_i32(field, K);
    }
    Ok(())
}

/// Pack code 16: a variable-length prefix code. A 4-bit size nibble `sz` selects the width of an
/// immediately following signed field; `sz == 0` codes a literal zero with no further bits, and
/// `sz == 15` escapes to a full 24-bit signed literal for outlier samples.
fn unpack_escape_prefix<S: ByteSource>(br: &mut BitReader<S>, mid: &mut [i32]) -> Result<()> {
    const ESCAPE: u32 = 15;
    for slot in mid.iter_mut() {
        let size = br.get_bits(4)?;
        *slot = if size == 0 {
            0
        }
        else if size == ESCAPE {
            let field = br.get_bits(24)?;
            sign_extend_leq32_to_i32(field, 24)
        }
        else {
            let field = br.get_bits(size)?;
            sign_extend_leq32_to_i32(field, size)
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use acm_core::io::MemorySource;

    fn reader(bytes: Vec<u8>) -> BitReader<MemorySource> {
        BitReader::new(MemorySource::new(bytes), 0)
    }

    #[test]
    fn pack_code_0_is_all_zero() {
        let mut br = reader(vec![0xff; 4]);
        let mut mid = [7i32; 4];
        unpack_subblock(0, &mut br, &mut mid).unwrap();
        assert_eq!(mid, [0, 0, 0, 0]);
    }

    #[test]
    fn pack_code_1_decodes_ternary_symbols() {
        // bits LSB-first: 0 (->0), 1,0 (->+1), 1,1 (->-1), 0 (->0)
        // byte: bit0=0 bit1=1 bit2=0 bit3=1 bit4=1 bit5=0 -> 0b0_1_1_0_1_0 = 0b011010 = 0x1A
        let mut br = reader(vec![0b0001_1010]);
        let mut mid = [0i32; 4];
        unpack_subblock(1, &mut br, &mut mid).unwrap();
        assert_eq!(mid, [0, 1, -1, 0]);
    }

    #[test]
    fn pack_code_16_escape_reads_24_bits() {
        // low nibble of the first byte is the size nibble (15 = ESCAPE); every other bit,
        // including the first byte's upper nibble, belongs to the following 24-bit literal, so
        // all of them must be set for that literal to be the all-ones value -1.
        let mut br = reader(vec![0xff, 0xff, 0xff, 0xff]);
        let mut mid = [0i32; 1];
        unpack_subblock(16, &mut br, &mut mid).unwrap();
        assert_eq!(mid, [-1]);
    }

    #[test]
    fn pack_code_17_is_corrupt() {
        let mut br = reader(vec![0u8; 4]);
        let mut mid = [0i32; 1];
        assert!(unpack_subblock(17, &mut br, &mut mid).is_err());
        assert!(unpack_subblock(31, &mut br, &mut mid).is_err());
    }

    #[test]
    fn dense_code_sign_extends() {
        // K=1: single bit, 1 -> sign-extends to -1.
        let mut br = reader(vec![0b0000_0001]);
        let mut mid = [0i32; 1];
        unpack_subblock(8, &mut br, &mut mid).unwrap();
        assert_eq!(mid, [-1]);
    }
}
