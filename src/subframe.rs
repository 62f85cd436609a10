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

//! The `subframe` module decodes and encodes the per-channel subframes
//! that make up a frame: CONSTANT, VERBATIM, FIXED, and FIR (general
//! linear predictive coding).

use std::io;

use crate::bitstream::{sign_extend, sign_extend_32, BitReader, BitWriter};
use crate::error::{Error, FlacResult};
use crate::residual;

/// The fixed predictor coefficients for orders 0 through 4, applied as
/// `prediction = sum(coefficients[j] * sample[i - 1 - j])`.
const FIXED_COEFFICIENTS: [&[i64]; 5] = [
    &[],
    &[1],
    &[2, -1],
    &[3, -3, 1],
    &[4, -6, 4, -1],
];

/// A decoded or to-be-encoded subframe, before channel decorrelation is
/// undone and before wasted bits are shifted back in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subframe {
    Constant(i32),
    Verbatim(Vec<i32>),
    Fixed {
        order: u8,
        warmup: Vec<i32>,
        residual: Vec<i64>,
    },
    Fir {
        order: u8,
        coeff_precision: u8,
        shift: i8,
        coefficients: Vec<i32>,
        warmup: Vec<i32>,
        residual: Vec<i64>,
    },
}

#[derive(Clone, Copy, Debug)]
enum SubframeType {
    Constant,
    Verbatim,
    Fixed(u8),
    Fir(u8),
}

struct SubframeHeader {
    sf_type: SubframeType,
    wasted_bits: u32,
}

fn read_subframe_header<R: io::Read>(bits: &mut BitReader<R>) -> FlacResult<SubframeHeader> {
    if bits.read_u8(1)? != 0 {
        return Err(Error::InvalidSubframeHeader("padding bit must be zero"));
    }

    let type_code = bits.read_u8(6)?;
    let sf_type = match type_code {
        0b000000 => SubframeType::Constant,
        0b000001 => SubframeType::Verbatim,
        n if n & 0b111_000 == 0b001_000 => {
            let order = n & 0b000_111;
            if order > 4 {
                return Err(Error::InvalidSubframeHeader("reserved fixed predictor order"));
            }
            SubframeType::Fixed(order)
        }
        n if n & 0b100_000 == 0b100_000 => {
            let order = (n & 0b011_111) + 1;
            SubframeType::Fir(order)
        }
        _ => return Err(Error::InvalidSubframeHeader("reserved subframe type")),
    };

    let wasted_bits = if bits.read_u8(1)? == 0 {
        0
    } else {
        bits.read_unary()? + 1
    };

    Ok(SubframeHeader { sf_type, wasted_bits })
}

fn write_subframe_header<W: io::Write>(
    bits: &mut BitWriter<W>,
    sf_type: SubframeType,
    wasted_bits: u32,
) -> FlacResult<()> {
    bits.write_bit(false)?;
    let type_code = match sf_type {
        SubframeType::Constant => 0b000000,
        SubframeType::Verbatim => 0b000001,
        SubframeType::Fixed(order) => 0b001_000 | order,
        SubframeType::Fir(order) => 0b100_000 | (order - 1),
    };
    bits.write_bits(type_code as u64, 6)?;

    if wasted_bits == 0 {
        bits.write_bit(false)?;
    } else {
        bits.write_bit(true)?;
        bits.write_unary(wasted_bits - 1)?;
    }
    Ok(())
}

fn read_signed<R: io::Read>(bits: &mut BitReader<R>, n: u32) -> FlacResult<i32> {
    Ok(sign_extend_32(bits.read_u32(n)?, n))
}

/// Decodes one subframe and reconstructs its full run of `block_size`
/// samples at the given effective bit depth.
///
/// `strict` enforces the FLAC subset's per-subframe restrictions (residual
/// partition order at most 8, FIR coefficient precision at most 12 bits);
/// set it from [`crate::decoder::Validation`] at the call site.
pub fn decode<R: io::Read>(
    bits: &mut BitReader<R>,
    bps: u8,
    block_size: u16,
    strict: bool,
) -> FlacResult<Vec<i32>> {
    let header = read_subframe_header(bits)?;
    if header.wasted_bits > bps as u32 {
        return Err(Error::InvalidBitsPerSample("wasted bits exceed bit depth"));
    }
    let effective_bps = bps - header.wasted_bits as u8;

    let mut samples = match header.sf_type {
        SubframeType::Constant => {
            let value = read_signed(bits, effective_bps as u32)?;
            vec![value; block_size as usize]
        }
        SubframeType::Verbatim => {
            let mut out = Vec::with_capacity(block_size as usize);
            for _ in 0..block_size {
                out.push(read_signed(bits, effective_bps as u32)?);
            }
            out
        }
        SubframeType::Fixed(order) => {
            decode_fixed(bits, effective_bps, order, block_size, strict)?
        }
        SubframeType::Fir(order) => {
            decode_fir(bits, effective_bps, order, block_size, strict)?
        }
    };

    if header.wasted_bits > 0 {
        for sample in samples.iter_mut() {
            *sample <<= header.wasted_bits;
        }
    }

    Ok(samples)
}

fn decode_warmup<R: io::Read>(
    bits: &mut BitReader<R>,
    bps: u8,
    order: u8,
) -> FlacResult<Vec<i32>> {
    let mut warmup = Vec::with_capacity(order as usize);
    for _ in 0..order {
        warmup.push(read_signed(bits, bps as u32)?);
    }
    Ok(warmup)
}

fn decode_fixed<R: io::Read>(
    bits: &mut BitReader<R>,
    bps: u8,
    order: u8,
    block_size: u16,
    strict: bool,
) -> FlacResult<Vec<i32>> {
    let mut samples: Vec<i32> = decode_warmup(bits, bps, order)?;
    let mut residual = vec![0i64; block_size as usize - order as usize];
    residual::decode(bits, block_size, order, &mut residual, strict)?;

    let coefficients = FIXED_COEFFICIENTS[order as usize];
    samples.reserve(block_size as usize - order as usize);
    for (k, &r) in residual.iter().enumerate() {
        let i = order as usize + k;
        let mut prediction = 0i64;
        for (j, &c) in coefficients.iter().enumerate() {
            prediction += c * samples[i - 1 - j] as i64;
        }
        samples.push((prediction + r) as i32);
    }

    Ok(samples)
}

fn decode_fir<R: io::Read>(
    bits: &mut BitReader<R>,
    bps: u8,
    order: u8,
    block_size: u16,
    strict: bool,
) -> FlacResult<Vec<i32>> {
    let mut samples: Vec<i32> = decode_warmup(bits, bps, order)?;

    let precision = bits.read_u8(4)? + 1;
    if precision - 1 == 0b1111 {
        return Err(Error::InvalidSubframe("invalid FIR coefficient precision"));
    }
    if strict && precision > 12 {
        return Err(Error::InvalidSubframe("FIR coefficient precision exceeds the subset's 12-bit limit"));
    }

    let shift_raw = bits.read_u8(5)?;
    let shift = sign_extend(shift_raw as u64, 5) as i8;
    if shift < 0 {
        return Err(Error::InvalidLpcShift(shift));
    }

    let mut coefficients = Vec::with_capacity(order as usize);
    for _ in 0..order {
        coefficients.push(read_signed(bits, precision as u32)?);
    }

    let mut residual = vec![0i64; block_size as usize - order as usize];
    residual::decode(bits, block_size, order, &mut residual, strict)?;

    samples.reserve(block_size as usize - order as usize);
    for (k, &r) in residual.iter().enumerate() {
        let i = order as usize + k;
        let mut prediction = 0i64;
        for (j, &c) in coefficients.iter().enumerate() {
            prediction += c as i64 * samples[i - 1 - j] as i64;
        }
        prediction >>= shift as i64;
        samples.push((prediction + r) as i32);
    }

    Ok(samples)
}

/// Computes the residual a fixed predictor of the given order would leave
/// for `samples`, used by the encoder's cost analysis and to actually emit
/// the residual.
pub fn fixed_residual(samples: &[i32], order: u8) -> Vec<i64> {
    let coefficients = FIXED_COEFFICIENTS[order as usize];
    let mut residual = Vec::with_capacity(samples.len() - order as usize);
    for i in order as usize..samples.len() {
        let mut prediction = 0i64;
        for (j, &c) in coefficients.iter().enumerate() {
            prediction += c * samples[i - 1 - j] as i64;
        }
        residual.push(samples[i] as i64 - prediction);
    }
    residual
}

/// Encodes a [`Subframe`] at the given frame bit depth.
pub fn encode<W: io::Write>(bits: &mut BitWriter<W>, subframe: &Subframe, bps: u8) -> FlacResult<()> {
    match subframe {
        Subframe::Constant(value) => {
            write_subframe_header(bits, SubframeType::Constant, 0)?;
            bits.write_bits((*value as u32 & mask(bps as u32)) as u64, bps as u32)?;
        }
        Subframe::Verbatim(samples) => {
            write_subframe_header(bits, SubframeType::Verbatim, 0)?;
            for &s in samples {
                bits.write_bits((s as u32 & mask(bps as u32)) as u64, bps as u32)?;
            }
        }
        Subframe::Fixed { order, warmup, residual } => {
            write_subframe_header(bits, SubframeType::Fixed(*order), 0)?;
            for &s in warmup {
                bits.write_bits((s as u32 & mask(bps as u32)) as u64, bps as u32)?;
            }
            residual::encode(bits, residual)?;
        }
        Subframe::Fir {
            order,
            coeff_precision,
            shift,
            coefficients,
            warmup,
            residual,
        } => {
            write_subframe_header(bits, SubframeType::Fir(*order), 0)?;
            for &s in warmup {
                bits.write_bits((s as u32 & mask(bps as u32)) as u64, bps as u32)?;
            }
            bits.write_bits((*coeff_precision - 1) as u64, 4)?;
            bits.write_bits((*shift as u8 & 0x1f) as u64, 5)?;
            for &c in coefficients {
                bits.write_bits((c as u32 & mask(*coeff_precision as u32)) as u64, *coeff_precision as u32)?;
            }
            residual::encode(bits, residual)?;
        }
    }
    Ok(())
}

fn mask(bits: u32) -> u32 {
    if bits >= 32 {
        0xffff_ffff
    } else {
        (1u32 << bits) - 1
    }
}
