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

//! Partitioned Rice coding of subframe residuals.
//!
//! A residual is split into `2^order` partitions, each carrying its own
//! Rice parameter (or an escape to raw, unencoded binary). The first
//! partition is shorter than the rest by the predictor order, since the
//! warm-up samples are stored separately.

use std::io;

use crate::bitstream::{sign_extend, BitReader, BitWriter};
use crate::error::{Error, FlacResult};

/// Folds a signed residual into the unsigned "ZigZag" form Rice coding
/// operates on: 0, -1, 1, -2, 2, ... -> 0, 1, 2, 3, 4, ...
pub fn zigzag_fold(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverts [`zigzag_fold`].
pub fn zigzag_unfold(folded: u64) -> i64 {
    ((folded >> 1) as i64) ^ -((folded & 1) as i64)
}

/// Decodes a partitioned-Rice-coded residual of `block_size - predictor_order`
/// values into `buffer`, which must already hold exactly that many slots.
pub fn decode<R: io::Read>(
    bits: &mut BitReader<R>,
    block_size: u16,
    predictor_order: u8,
    buffer: &mut [i64],
    strict: bool,
) -> FlacResult<()> {
    let method = bits.read_u8(2)?;
    let param_bits = match method {
        0b00 => 4,
        0b01 => 5,
        _ => return Err(Error::InvalidResidual("reserved residual coding method")),
    };

    let order = bits.read_u8(4)?;
    if strict && order > 8 {
        return Err(Error::InvalidResidual("partition order exceeds the subset's limit of 8"));
    }
    let n_partitions = 1u32 << order;
    if block_size % (n_partitions as u16) != 0 {
        return Err(Error::InvalidResidual(
            "block size is not a multiple of the partition count",
        ));
    }
    let n_samples = block_size / n_partitions as u16;
    if predictor_order as u16 > n_samples {
        return Err(Error::InvalidResidual(
            "predictor order exceeds the first partition's size",
        ));
    }

    let mut start = 0usize;
    for i in 0..n_partitions {
        let partition_len = n_samples as usize - if i == 0 { predictor_order as usize } else { 0 };
        decode_partition(bits, param_bits, &mut buffer[start..start + partition_len])?;
        start += partition_len;
    }

    Ok(())
}

fn decode_partition<R: io::Read>(
    bits: &mut BitReader<R>,
    param_bits: u32,
    buffer: &mut [i64],
) -> FlacResult<()> {
    let param = bits.read_u32(param_bits)?;
    let escape_code = (1u32 << param_bits) - 1;

    if param == escape_code {
        let raw_bits = bits.read_u8(5)?;
        if raw_bits == 0 {
            for sample in buffer.iter_mut() {
                *sample = 0;
            }
            return Ok(());
        }
        for sample in buffer.iter_mut() {
            let raw = bits.read_bits(raw_bits as u32)?;
            *sample = sign_extend(raw, raw_bits as u32);
        }
        return Ok(());
    }

    for sample in buffer.iter_mut() {
        let quotient = bits.read_unary()? as u64;
        let remainder = if param == 0 { 0 } else { bits.read_bits(param)? };
        let folded = (quotient << param) | remainder;
        *sample = zigzag_unfold(folded);
    }

    Ok(())
}

/// Picks the Rice parameter in `0..=max_param` that minimizes the encoded
/// size of `values`, returning `(parameter, bit_count)`.
pub fn best_rice_parameter(values: &[i64], max_param: u32) -> (u32, u64) {
    let mut best_param = 0u32;
    let mut best_bits = u64::MAX;
    for k in 0..=max_param {
        let mut bits = 0u64;
        for &v in values {
            let folded = zigzag_fold(v);
            bits += (folded >> k) + 1 + k as u64;
        }
        if bits < best_bits {
            best_bits = bits;
            best_param = k;
        }
    }
    (best_param, best_bits)
}

/// Encodes `values` as a single-partition (order 0), method-0 (4-bit
/// parameter) partitioned Rice residual, choosing the best Rice parameter.
///
/// Multi-partition search is not performed; this is the encoder's only
/// residual-coding strategy, matching the "analysis picks fixed order and a
/// single Rice parameter" scope this encoder targets.
pub fn encode<W: io::Write>(bits: &mut BitWriter<W>, values: &[i64]) -> FlacResult<()> {
    bits.write_bits(0b00, 2)?; // method 0: 4-bit parameter.
    bits.write_bits(0, 4)?; // partition order 0: a single partition.

    let (param, _) = best_rice_parameter(values, 14);
    bits.write_bits(param as u64, 4)?;

    for &v in values {
        let folded = zigzag_fold(v);
        let quotient = (folded >> param) as u32;
        bits.write_unary(quotient)?;
        if param > 0 {
            bits.write_bits(folded & ((1u64 << param) - 1), param)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn verify_zigzag_round_trip() {
        for v in -1000i64..=1000 {
            assert_eq!(zigzag_unfold(zigzag_fold(v)), v);
        }
        assert_eq!(zigzag_fold(0), 0);
        assert_eq!(zigzag_fold(-1), 1);
        assert_eq!(zigzag_fold(1), 2);
        assert_eq!(zigzag_fold(-2), 3);
    }

    #[test]
    fn verify_encode_decode_round_trip() {
        let values: Vec<i64> = vec![0, 1, -1, 5, -5, 100, -100, 3, -3, 0, 0, 7];
        let mut buf = Vec::new();
        {
            let mut writer = BitWriter::new(&mut buf);
            encode(&mut writer, &values).unwrap();
            writer.align_to_byte().unwrap();
        }
        let mut reader = BitReader::new(Cursor::new(buf));
        let mut decoded = vec![0i64; values.len()];
        decode(&mut reader, values.len() as u16, 0, &mut decoded, false).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn verify_decode_with_predictor_order() {
        let values: Vec<i64> = vec![2, -2, 4, -4];
        let mut buf = Vec::new();
        {
            let mut writer = BitWriter::new(&mut buf);
            encode(&mut writer, &values).unwrap();
            writer.align_to_byte().unwrap();
        }
        let mut reader = BitReader::new(Cursor::new(buf));
        let mut decoded = vec![0i64; values.len()];
        // block_size includes the 2 warm-up samples that precede this
        // residual; the partition is shortened by `predictor_order`.
        decode(&mut reader, values.len() as u16 + 2, 2, &mut decoded, false).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn verify_escape_all_zero() {
        let mut buf = Vec::new();
        {
            let mut writer = BitWriter::new(&mut buf);
            writer.write_bits(0b00, 2).unwrap();
            writer.write_bits(0, 4).unwrap();
            writer.write_bits(0b1111, 4).unwrap(); // escape
            writer.write_bits(0, 5).unwrap(); // raw_bits = 0
            writer.align_to_byte().unwrap();
        }
        let mut reader = BitReader::new(Cursor::new(buf));
        let mut decoded = vec![7i64; 4];
        decode(&mut reader, 4, 0, &mut decoded, false).unwrap();
        assert_eq!(decoded, vec![0, 0, 0, 0]);
    }

    #[test]
    fn verify_reserved_method_rejected() {
        let mut buf = Vec::new();
        {
            let mut writer = BitWriter::new(&mut buf);
            writer.write_bits(0b10, 2).unwrap();
            writer.align_to_byte().unwrap();
        }
        let mut reader = BitReader::new(Cursor::new(buf));
        let mut decoded = vec![0i64; 4];
        assert!(decode(&mut reader, 4, 0, &mut decoded, false).is_err());
    }
}
