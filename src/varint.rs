// flac-codec -- a FLAC container and bitstream codec in Rust
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! UTF-8-style variable-length coding of the frame/sample number that
//! appears in every frame header.
//!
//! This is not real UTF-8: it reuses the same continuation-byte layout to
//! pack up to 36 bits of a frame or sample number into 1–7 bytes.

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{Error, FlacResult};
use std::io;

/// The largest value representable by the 7-byte encoding (36 bits).
pub const MAX_VALUE: u64 = (1u64 << 36) - 1;

/// Decodes a UTF-8-coded integer from a bit reader, MSB-first, matching the
/// frame header's encoding of frame and sample numbers.
pub fn read<R: io::Read>(bits: &mut BitReader<R>) -> FlacResult<u64> {
    let first = bits.read_u8(8)?;

    if first & 0x80 == 0 {
        return Ok(first as u64);
    }

    // Count the number of leading one bits in the first byte; that is the
    // total number of bytes in the encoding, and also tells us how many
    // data bits remain in the first byte.
    let mut n_bytes = 0u32;
    let mut probe = first;
    while probe & 0x80 != 0 {
        n_bytes += 1;
        probe <<= 1;
    }

    if !(2..=7).contains(&n_bytes) {
        return Err(Error::InvalidVarLengthInt);
    }

    // The first byte holds (7 - n_bytes) data bits below its leading-ones
    // marker, except the 7-byte form, which holds zero data bits in the
    // first byte (`0b1111_1110`).
    let first_data_bits = if n_bytes == 7 { 0 } else { 7 - n_bytes };
    let mask = (1u16 << first_data_bits) - 1;
    let mut value = (first as u16 & mask) as u64;

    for _ in 1..n_bytes {
        let byte = bits.read_u8(8)?;
        if byte & 0xc0 != 0x80 {
            return Err(Error::InvalidVarLengthInt);
        }
        value = (value << 6) | (byte & 0x3f) as u64;
    }

    if value > MAX_VALUE {
        return Err(Error::InvalidVarLengthInt);
    }

    Ok(value)
}

/// Returns the number of bytes the shortest legal encoding of `value` would
/// occupy.
pub fn encoded_len(value: u64) -> FlacResult<u32> {
    Ok(match value {
        0..=0x7f => 1,
        0x80..=0x7ff => 2,
        0x800..=0xffff => 3,
        0x1_0000..=0x1f_ffff => 4,
        0x20_0000..=0x3ff_ffff => 5,
        0x400_0000..=0x7fff_ffff => 6,
        0x8000_0000..=MAX_VALUE => 7,
        _ => return Err(Error::InvalidVarLengthInt),
    })
}

/// Encodes `value` in its shortest legal form and writes it through the bit
/// writer.
pub fn write<W: io::Write>(bits: &mut BitWriter<W>, value: u64) -> FlacResult<()> {
    let n_bytes = encoded_len(value)?;

    if n_bytes == 1 {
        bits.write_bits(value, 8)?;
        return Ok(());
    }

    let data_bits = if n_bytes == 7 { 0 } else { 7 - n_bytes };
    let continuation_bits = (n_bytes - 1) * 6;
    let lead = value >> continuation_bits;
    let lead_marker = {
        // n_bytes leading one bits, followed by a zero, except the 7-byte
        // form which has no trailing zero marker bit (`0b1111_1110`).
        let ones = (0xffu16 << (8 - n_bytes)) & 0xff;
        ones as u64
    };
    debug_assert!(lead < (1u64 << data_bits.max(1)) || n_bytes == 7);
    bits.write_bits(lead_marker | lead, 8)?;

    for i in (0..n_bytes - 1).rev() {
        let shift = i * 6;
        let chunk = (value >> shift) & 0x3f;
        bits.write_bits(0x80 | chunk, 8)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(value: u64) {
        let mut buf = Vec::new();
        {
            let mut w = BitWriter::new(&mut buf);
            write(&mut w, value).unwrap();
            w.align_to_byte().unwrap();
        }
        let expected_len = encoded_len(value).unwrap() as usize;
        assert_eq!(buf.len(), expected_len);

        let mut r = BitReader::new(Cursor::new(buf));
        assert_eq!(read(&mut r).unwrap(), value);
    }

    #[test]
    fn verify_round_trip_boundaries() {
        let boundaries = [
            0,
            0x7f,
            0x80,
            0x7ff,
            0x800,
            0xffff,
            0x1_0000,
            0x1f_ffff,
            0x20_0000,
            0x3ff_ffff,
            0x400_0000,
            0x7fff_ffff,
            0x8000_0000,
            MAX_VALUE,
        ];
        for &v in &boundaries {
            round_trip(v);
        }
    }

    #[test]
    fn verify_round_trip_sampled() {
        // Exhaustive over [0, 2^36) is infeasible; sample broadly across
        // every byte-length class instead.
        let mut v: u64 = 1;
        while v < (1u64 << 37) {
            round_trip(v.min(MAX_VALUE));
            v = v.wrapping_mul(7).wrapping_add(3) & ((1 << 37) - 1);
            if v == 0 {
                break;
            }
        }
        round_trip(0);
        round_trip(MAX_VALUE);
    }

    #[test]
    fn verify_overlong_continuation_rejected() {
        // A first byte claiming a 2-byte encoding, followed by a byte that
        // is not a valid continuation byte.
        let mut r = BitReader::new(Cursor::new(vec![0b1100_0001, 0b0000_0000]));
        assert!(read(&mut r).is_err());
    }

    #[test]
    fn verify_invalid_leading_one_run_rejected() {
        // 0b1111_1111 has a run of 8 leading ones, which is not a valid
        // length marker (max is 7).
        let mut r = BitReader::new(Cursor::new(vec![0xffu8, 0, 0, 0, 0, 0, 0, 0]));
        assert!(read(&mut r).is_err());
    }
}
