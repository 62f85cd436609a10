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

//! The `frame` module deals with the frames that make up the audio data
//! portion of a FLAC stream: the frame header, channel decorrelation, and
//! the CRC-8/CRC-16 checks that guard them.
//!
//! Subframe bodies are decoded and encoded by the `subframe` module; this
//! module is concerned with everything around them.

use std::io;

use crate::bitstream::{BitReader, BitWriter};
use crate::crc::{Crc16, Crc8};
use crate::error::{Error, FlacResult};
use crate::metadata::{ReadBytesExt, WriteBytesExt};
use crate::varint;

/// Whether consecutive frames are numbered by frame number (fixed block
/// size throughout the stream) or by the sample number of their first
/// sample (variable block size).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockingStrategy {
    Fixed,
    Variable,
}

/// The frame or sample number carried by a frame header, depending on its
/// [`BlockingStrategy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTime {
    FrameNumber(u32),
    SampleNumber(u64),
}

/// How the channels in a frame relate to left/right audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// `n` channels, coded independently (no decorrelation).
    Independent(u8),
    /// Channel 0 is left, channel 1 is the side channel (left - right).
    LeftSide,
    /// Channel 0 is the side channel, channel 1 is right.
    SideRight,
    /// Channel 0 is mid, channel 1 is the side channel.
    MidSide,
}

impl ChannelAssignment {
    pub fn channels(&self) -> u8 {
        match *self {
            ChannelAssignment::Independent(n) => n,
            ChannelAssignment::LeftSide => 2,
            ChannelAssignment::SideRight => 2,
            ChannelAssignment::MidSide => 2,
        }
    }

    /// The number of extra bits the side channel carries, for the subframe
    /// at index `channel_index` (0-based) within this frame.
    pub fn wasted_bump(&self, channel_index: u8) -> u8 {
        match *self {
            ChannelAssignment::LeftSide if channel_index == 1 => 1,
            ChannelAssignment::SideRight if channel_index == 0 => 1,
            ChannelAssignment::MidSide if channel_index == 1 => 1,
            _ => 0,
        }
    }
}

/// A fully decoded frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub blocking_strategy: BlockingStrategy,
    pub block_time: BlockTime,
    pub block_size: u16,
    /// `None` means "use the sample rate from STREAMINFO".
    pub sample_rate: Option<u32>,
    pub channel_assignment: ChannelAssignment,
    /// `None` means "use the bits per sample from STREAMINFO".
    pub bits_per_sample: Option<u8>,
}

impl FrameHeader {
    pub fn channels(&self) -> u8 {
        self.channel_assignment.channels()
    }
}

/// A byte-level reader that accumulates a running CRC-8 and CRC-16 over
/// every byte that passes through it, the way a frame's own header and
/// footer checksums are computed over the bytes preceding them.
pub(crate) struct ChecksumReader<R> {
    inner: R,
    crc8: Crc8,
    crc16: Crc16,
}

impl<R: io::Read> ChecksumReader<R> {
    fn new(inner: R) -> ChecksumReader<R> {
        ChecksumReader {
            inner,
            crc8: Crc8::new(),
            crc16: Crc16::new(),
        }
    }

    fn crc8(&self) -> u8 {
        self.crc8.finalize()
    }

    fn crc16(&self) -> u16 {
        self.crc16.finalize()
    }
}

impl<R: io::Read> io::Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for &b in &buf[..n] {
            self.crc8.update(b);
            self.crc16.update(b);
        }
        Ok(n)
    }
}

/// A byte-level writer that accumulates a running CRC-8 and CRC-16 over
/// every byte written through it.
pub(crate) struct ChecksumWriter<W> {
    inner: W,
    crc8: Crc8,
    crc16: Crc16,
}

impl<W: io::Write> ChecksumWriter<W> {
    fn new(inner: W) -> ChecksumWriter<W> {
        ChecksumWriter {
            inner,
            crc8: Crc8::new(),
            crc16: Crc16::new(),
        }
    }

    fn crc8(&self) -> u8 {
        self.crc8.finalize()
    }

    fn crc16(&self) -> u16 {
        self.crc16.finalize()
    }
}

impl<W: io::Write> io::Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        for &b in &buf[..n] {
            self.crc8.update(b);
            self.crc16.update(b);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reads a frame header, including its trailing CRC-8 byte, which is
/// verified against the bytes read so far.
///
/// `frame_index` is used only to annotate a CRC mismatch error.
fn read_frame_header<R: io::Read>(
    crc_input: &mut ChecksumReader<R>,
    frame_index: u64,
) -> FlacResult<FrameHeader> {
    let sync_res_block = crc_input.read_be_u16()?;

    let sync_code = sync_res_block & 0b1111_1111_1111_1100;
    if sync_code != 0b1111_1111_1111_1000 {
        return Err(Error::MissingFrameSyncCode);
    }

    if sync_res_block & 0b0000_0000_0000_0010 != 0 {
        return Err(Error::InvalidFrameHeader("reserved bit must be zero"));
    }

    let blocking_strategy = if sync_res_block & 1 == 0 {
        BlockingStrategy::Fixed
    } else {
        BlockingStrategy::Variable
    };

    let bs_sr = crc_input.read_u8()?;
    let mut block_size = 0u16;
    let mut read_8bit_bs = false;
    let mut read_16bit_bs = false;

    match bs_sr >> 4 {
        0b0000 => return Err(Error::InvalidFrameHeader("reserved block size code")),
        0b0001 => block_size = 192,
        n if (0b0010..=0b0101).contains(&n) => block_size = 576 * (1 << (n - 2) as usize),
        0b0110 => read_8bit_bs = true,
        0b0111 => read_16bit_bs = true,
        n => block_size = 256 * (1u16 << (n - 8) as usize),
    }

    let mut sample_rate = None;
    let mut read_8bit_sr = false;
    let mut read_16bit_sr = false;
    let mut read_16bit_sr_ten = false;

    match bs_sr & 0x0f {
        0b0000 => {}
        0b0001 => sample_rate = Some(88_200),
        0b0010 => sample_rate = Some(176_400),
        0b0011 => sample_rate = Some(192_000),
        0b0100 => sample_rate = Some(8_000),
        0b0101 => sample_rate = Some(16_000),
        0b0110 => sample_rate = Some(22_050),
        0b0111 => sample_rate = Some(24_000),
        0b1000 => sample_rate = Some(32_000),
        0b1001 => sample_rate = Some(44_100),
        0b1010 => sample_rate = Some(48_000),
        0b1011 => sample_rate = Some(96_000),
        0b1100 => read_8bit_sr = true,
        0b1101 => read_16bit_sr = true,
        0b1110 => read_16bit_sr_ten = true,
        _ => return Err(Error::InvalidFrameHeader("invalid sample rate code 1111")),
    }

    let chan_bps_res = crc_input.read_u8()?;

    let channel_assignment = match chan_bps_res >> 4 {
        n if n < 8 => ChannelAssignment::Independent(n + 1),
        0b1000 => ChannelAssignment::LeftSide,
        0b1001 => ChannelAssignment::SideRight,
        0b1010 => ChannelAssignment::MidSide,
        _ => return Err(Error::InvalidFrameHeader("reserved channel assignment code")),
    };

    let bits_per_sample = match (chan_bps_res & 0b0000_1110) >> 1 {
        0b000 => None,
        0b001 => Some(8),
        0b010 => Some(12),
        0b100 => Some(16),
        0b101 => Some(20),
        0b110 => Some(24),
        _ => return Err(Error::InvalidFrameHeader("reserved bits-per-sample code")),
    };

    if chan_bps_res & 1 != 0 {
        return Err(Error::InvalidFrameHeader("reserved bit must be zero"));
    }

    let block_time = match blocking_strategy {
        BlockingStrategy::Variable => {
            let sample = varint_read_byte_level(crc_input)?;
            BlockTime::SampleNumber(sample)
        }
        BlockingStrategy::Fixed => {
            let frame = varint_read_byte_level(crc_input)?;
            if frame > 0x7fff_ffff {
                return Err(Error::InvalidFrameHeader("frame number exceeds 31 bits"));
            }
            BlockTime::FrameNumber(frame as u32)
        }
    };

    if read_8bit_bs {
        block_size = crc_input.read_u8()? as u16 + 1;
    }
    if read_16bit_bs {
        let bs = crc_input.read_be_u16()?;
        if bs == 0xffff {
            return Err(Error::InvalidBlockSize("block size exceeds 65535"));
        }
        block_size = bs + 1;
    }

    if block_size < 16 {
        return Err(Error::InvalidBlockSize("block size must be at least 16"));
    }

    if read_8bit_sr {
        sample_rate = Some(crc_input.read_u8()? as u32);
    }
    if read_16bit_sr {
        sample_rate = Some(crc_input.read_be_u16()? as u32);
    }
    if read_16bit_sr_ten {
        sample_rate = Some(crc_input.read_be_u16()? as u32 * 10);
    }

    let expected_crc8 = crc_input.crc8();
    let stored_crc8 = crc_input.read_u8()?;
    if stored_crc8 != expected_crc8 {
        return Err(Error::FrameHeaderCrcMismatch {
            frame_index,
            expected: stored_crc8,
            computed: expected_crc8,
        });
    }

    Ok(FrameHeader {
        blocking_strategy,
        block_time,
        block_size,
        sample_rate,
        channel_assignment,
        bits_per_sample,
    })
}

/// Writes a frame header and its CRC-8 byte.
fn write_frame_header<W: io::Write>(
    crc_out: &mut ChecksumWriter<W>,
    header: &FrameHeader,
) -> FlacResult<()> {
    let blocking_bit = match header.blocking_strategy {
        BlockingStrategy::Fixed => 0u16,
        BlockingStrategy::Variable => 1u16,
    };
    crc_out.write_be_u16(0b1111_1111_1111_1000 | blocking_bit)?;

    let (bs_code, bs_suffix) = block_size_code(header.block_size);
    let sr_code = sample_rate_code(header.sample_rate);
    crc_out.write_u8((bs_code << 4) | sr_code)?;

    let chan_code = match header.channel_assignment {
        ChannelAssignment::Independent(n) => n - 1,
        ChannelAssignment::LeftSide => 0b1000,
        ChannelAssignment::SideRight => 0b1001,
        ChannelAssignment::MidSide => 0b1010,
    };
    let bps_code = bits_per_sample_code(header.bits_per_sample)?;
    crc_out.write_u8((chan_code << 4) | (bps_code << 1))?;

    match header.block_time {
        BlockTime::SampleNumber(sample) => varint_write_byte_level(crc_out, sample)?,
        BlockTime::FrameNumber(frame) => varint_write_byte_level(crc_out, frame as u64)?,
    }

    if let Some(suffix) = bs_suffix {
        match suffix {
            BlockSizeSuffix::U8(v) => crc_out.write_u8(v)?,
            BlockSizeSuffix::U16(v) => crc_out.write_be_u16(v)?,
        }
    }

    if let Some(rate) = header.sample_rate {
        if let Some(suffix) = sample_rate_suffix(rate) {
            match suffix {
                SampleRateSuffix::U8(v) => crc_out.write_u8(v)?,
                SampleRateSuffix::U16(v) => crc_out.write_be_u16(v)?,
                SampleRateSuffix::U16Ten(v) => crc_out.write_be_u16(v)?,
            }
        }
    }

    let crc8 = crc_out.crc8();
    crc_out.write_u8(crc8)?;
    Ok(())
}

enum BlockSizeSuffix {
    U8(u8),
    U16(u16),
}

fn block_size_code(block_size: u16) -> (u8, Option<BlockSizeSuffix>) {
    match block_size {
        192 => (0b0001, None),
        576 | 1152 | 2304 | 4608 => {
            let n = (block_size / 576).trailing_zeros() as u8;
            (0b0010 + n, None)
        }
        256 | 512 | 1024 | 2048 | 4096 | 8192 | 16384 | 32768 => {
            let n = (block_size / 256).trailing_zeros() as u8;
            (0b1000 + n, None)
        }
        1..=256 => (0b0110, Some(BlockSizeSuffix::U8((block_size - 1) as u8))),
        _ => (0b0111, Some(BlockSizeSuffix::U16(block_size - 1))),
    }
}

enum SampleRateSuffix {
    U8(u8),
    U16(u16),
    U16Ten(u16),
}

fn sample_rate_code(rate: Option<u32>) -> u8 {
    match rate {
        None => 0b0000,
        Some(88_200) => 0b0001,
        Some(176_400) => 0b0010,
        Some(192_000) => 0b0011,
        Some(8_000) => 0b0100,
        Some(16_000) => 0b0101,
        Some(22_050) => 0b0110,
        Some(24_000) => 0b0111,
        Some(32_000) => 0b1000,
        Some(44_100) => 0b1001,
        Some(48_000) => 0b1010,
        Some(96_000) => 0b1011,
        Some(r) if r <= 255 => 0b1100,
        Some(r) if r % 10 == 0 && r / 10 <= 0xffff => 0b1110,
        Some(_) => 0b1101,
    }
}

fn sample_rate_suffix(rate: u32) -> Option<SampleRateSuffix> {
    match rate {
        88_200 | 176_400 | 192_000 | 8_000 | 16_000 | 22_050 | 24_000 | 32_000 | 44_100
        | 48_000 | 96_000 => None,
        r if r <= 255 => Some(SampleRateSuffix::U8(r as u8)),
        r if r % 10 == 0 && r / 10 <= 0xffff => Some(SampleRateSuffix::U16Ten((r / 10) as u16)),
        r => Some(SampleRateSuffix::U16(r as u16)),
    }
}

fn bits_per_sample_code(bps: Option<u8>) -> FlacResult<u8> {
    Ok(match bps {
        None => 0b000,
        Some(8) => 0b001,
        Some(12) => 0b010,
        Some(16) => 0b100,
        Some(20) => 0b101,
        Some(24) => 0b110,
        Some(_) => return Err(Error::InvalidBitsPerSample("not representable in a frame header")),
    })
}

/// The frame header's variable-length integer is byte-aligned, so it is
/// read directly off the checksum reader rather than through a bit reader.
fn varint_read_byte_level<R: io::Read>(input: &mut R) -> FlacResult<u64> {
    let mut buf = BitReader::new(input);
    let value = varint::read(&mut buf)?;
    Ok(value)
}

fn varint_write_byte_level<W: io::Write>(output: &mut W, value: u64) -> FlacResult<()> {
    let mut buf = BitWriter::new(output);
    varint::write(&mut buf, value)?;
    buf.align_to_byte()?;
    Ok(())
}

/// Decodes a buffer holding `left` in the first half and the `side`
/// channel (`left - right`) in the second half, in place, to `left ++
/// right`.
pub fn decode_left_side(buffer: &mut [i32]) {
    let block_size = buffer.len() / 2;
    for i in 0..block_size {
        let left = buffer[i];
        let side = buffer[block_size + i];
        buffer[block_size + i] = left - side;
    }
}

/// Decodes a buffer holding the `side` channel in the first half and
/// `right` in the second half, in place, to `left ++ right`.
pub fn decode_side_right(buffer: &mut [i32]) {
    let block_size = buffer.len() / 2;
    for i in 0..block_size {
        let side = buffer[i];
        let right = buffer[block_size + i];
        buffer[i] = side + right;
    }
}

/// Decodes a buffer holding `mid` in the first half and `side` in the
/// second half, in place, to `left ++ right`.
///
/// Matches libFLAC's integer mid/side reconstruction exactly: `mid` is
/// first doubled and corrected for the bit truncated by the encoder's
/// `(left + right) >> 1`, using the parity of `side`.
pub fn decode_mid_side(buffer: &mut [i32]) {
    let block_size = buffer.len() / 2;
    for i in 0..block_size {
        let mid = buffer[i];
        let side = buffer[block_size + i];

        let mid = (mid << 1) | (side & 1);
        let left = (mid + side) >> 1;
        let right = (mid - side) >> 1;

        buffer[i] = left;
        buffer[block_size + i] = right;
    }
}

/// Encodes `left ++ right` in place into `left ++ side`.
pub fn encode_left_side(buffer: &mut [i32]) {
    let block_size = buffer.len() / 2;
    for i in 0..block_size {
        let left = buffer[i];
        let right = buffer[block_size + i];
        buffer[block_size + i] = left - right;
    }
}

/// Encodes `left ++ right` in place into `side ++ right`.
pub fn encode_side_right(buffer: &mut [i32]) {
    let block_size = buffer.len() / 2;
    for i in 0..block_size {
        let left = buffer[i];
        let right = buffer[block_size + i];
        buffer[i] = left - right;
    }
}

/// Encodes `left ++ right` in place into `mid ++ side`.
pub fn encode_mid_side(buffer: &mut [i32]) {
    let block_size = buffer.len() / 2;
    for i in 0..block_size {
        let left = buffer[i];
        let right = buffer[block_size + i];
        buffer[i] = (left + right) >> 1;
        buffer[block_size + i] = left - right;
    }
}

/// Reads one frame header from a byte-aligned position in `input`,
/// returning the header and the byte-level checksum reader to continue
/// reading the subframes and footer through.
pub fn start_frame<R: io::Read>(
    input: R,
    frame_index: u64,
) -> FlacResult<(FrameHeader, ChecksumReader<R>)> {
    let mut crc_input = ChecksumReader::new(input);
    let header = read_frame_header(&mut crc_input, frame_index)?;
    Ok((header, crc_input))
}

/// Wraps a [`ChecksumReader`] in a [`BitReader`] so subframes can be
/// decoded, while keeping the checksum accumulation transparent.
pub fn bit_reader_for_frame<R: io::Read>(crc_input: ChecksumReader<R>) -> BitReader<ChecksumReader<R>> {
    BitReader::new(crc_input)
}

/// After subframe decoding and byte alignment, reads and checks the
/// frame's trailing CRC-16, given the underlying checksum reader.
pub fn finish_frame<R: io::Read>(
    bits: BitReader<ChecksumReader<R>>,
    frame_index: u64,
) -> FlacResult<R> {
    debug_assert!(bits.is_aligned());
    let mut crc_input = bits.into_inner();
    let expected_crc16 = crc_input.crc16();
    let stored_crc16 = crc_input.read_be_u16()?;
    if stored_crc16 != expected_crc16 {
        return Err(Error::FrameFooterCrcMismatch {
            frame_index,
            expected: stored_crc16,
            computed: expected_crc16,
        });
    }
    Ok(crc_input.inner)
}

/// Starts writing a frame header through `output`, returning a checksum
/// writer to continue writing subframes and the footer through.
pub fn write_frame<W: io::Write>(
    output: W,
    header: &FrameHeader,
) -> FlacResult<ChecksumWriter<W>> {
    let mut crc_out = ChecksumWriter::new(output);
    write_frame_header(&mut crc_out, header)?;
    Ok(crc_out)
}

/// After subframe encoding and byte alignment, writes the frame's
/// trailing CRC-16.
pub fn finish_frame_write<W: io::Write>(
    bits: BitWriter<ChecksumWriter<W>>,
) -> FlacResult<W> {
    let mut crc_out = bits.into_inner()?;
    let crc16 = crc_out.crc16();
    crc_out.write_be_u16(crc16)?;
    Ok(crc_out.inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_decode_left_side() {
        let mut buffer = vec![2i32, 5, 83, 113, 127, -63, -45, -15, 7, 38, 142, 238, 0, -152, -52, -18];
        let expected = vec![2i32, 5, 83, 113, 127, -63, -45, -15, -5, -33, -59, -125, 127, 89, 7, 3];
        decode_left_side(&mut buffer);
        assert_eq!(buffer, expected);
    }

    #[test]
    fn verify_decode_side_right() {
        let mut buffer = vec![7i32, 38, 142, 238, 0, -152, -52, -18, -5, -33, -59, -125, 127, 89, 7, 3];
        let expected = vec![2i32, 5, 83, 113, 127, -63, -45, -15, -5, -33, -59, -125, 127, 89, 7, 3];
        decode_side_right(&mut buffer);
        assert_eq!(buffer, expected);
    }

    #[test]
    fn verify_decode_mid_side() {
        let mut buffer = vec![-2i32, -14, 12, -6, 127, 13, -19, -6, 7, 38, 142, 238, 0, -152, -52, -18];
        let expected = vec![2i32, 5, 83, 113, 127, -63, -45, -15, -5, -33, -59, -125, 127, 89, 7, 3];
        decode_mid_side(&mut buffer);
        assert_eq!(buffer, expected);
    }

    #[test]
    fn verify_mid_side_round_trip() {
        let left = vec![10i32, 20, 30, 40];
        let right = vec![8i32, 16, 24, 32];
        let mut buffer: Vec<i32> = left.iter().cloned().chain(right.iter().cloned()).collect();
        encode_mid_side(&mut buffer);
        decode_mid_side(&mut buffer);
        assert_eq!(&buffer[..4], &left[..]);
        assert_eq!(&buffer[4..], &right[..]);
    }

    #[test]
    fn verify_left_side_round_trip() {
        let left = vec![100i32, -50, 25, 0];
        let right = vec![90i32, -60, 30, 5];
        let mut buffer: Vec<i32> = left.iter().cloned().chain(right.iter().cloned()).collect();
        encode_left_side(&mut buffer);
        decode_left_side(&mut buffer);
        assert_eq!(&buffer[..4], &left[..]);
        assert_eq!(&buffer[4..], &right[..]);
    }

    #[test]
    fn verify_frame_header_round_trip() {
        let header = FrameHeader {
            blocking_strategy: BlockingStrategy::Fixed,
            block_time: BlockTime::FrameNumber(5),
            block_size: 4096,
            sample_rate: None,
            channel_assignment: ChannelAssignment::Independent(2),
            bits_per_sample: None,
        };
        let mut buf = Vec::new();
        {
            let _crc_out = write_frame(&mut buf, &header).unwrap();
        }
        let mut crc_input = ChecksumReader::new(io::Cursor::new(buf));
        let decoded = read_frame_header(&mut crc_input, 5).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn verify_invalid_sync_code_rejected() {
        let bytes = vec![0xffu8, 0xff, 0, 0, 0, 0];
        let mut crc_input = ChecksumReader::new(io::Cursor::new(bytes));
        assert!(matches!(
            read_frame_header(&mut crc_input, 0),
            Err(Error::MissingFrameSyncCode)
        ));
    }
}
