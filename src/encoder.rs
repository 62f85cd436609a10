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

//! The `encoder` module turns blocks of interleaved PCM into a FLAC
//! stream: STREAMINFO placeholder, per-block analysis and frame encoding,
//! and a STREAMINFO patch-up once the sink is known to be seekable.
//!
//! FIR/LPC analysis is out of scope for the encoder (the decoder still
//! handles FIR subframes fully, since other encoders routinely produce
//! them); this encoder picks between CONSTANT, VERBATIM, and FIXED.

use std::io::{self, Seek as _, SeekFrom, Write as _};

use log::{debug, trace};
use md5::{Digest, Md5};

use crate::bitstream::BitWriter;
use crate::error::{Error, FlacResult};
use crate::frame::{self, BlockTime, BlockingStrategy, ChannelAssignment, FrameHeader};
use crate::metadata::{self, BlockHeader, BlockType, StreamInfo};
use crate::residual;
use crate::subframe::{self, Subframe};

/// Block size (in inter-channel samples) used for every frame but
/// possibly the last, which may be shorter.
pub const DEFAULT_BLOCK_SIZE: u16 = 4096;

/// Encodes a FLAC stream to `W`, one block of samples at a time.
///
/// `W` need not be seekable: if it is not, the STREAMINFO header is
/// written once with placeholder bounds and is never patched up, matching
/// how a stream written to a pipe cannot be rewound.
pub struct FlacWriter<W> {
    output: W,
    channels: u8,
    bits_per_sample: u8,
    sample_rate: u32,
    min_block_size: Option<u16>,
    max_block_size: Option<u16>,
    frame_index: u64,
    samples_written: u64,
    min_frame_size: Option<u32>,
    max_frame_size: Option<u32>,
    hasher: Md5,
    streaminfo_offset: u64,
}

impl<W: io::Write> FlacWriter<W> {
    /// Writes the `fLaC` signature and a placeholder STREAMINFO block, and
    /// returns a writer ready to accept blocks via [`FlacWriter::write_block`].
    pub fn create(
        mut output: W,
        channels: u8,
        bits_per_sample: u8,
        sample_rate: u32,
    ) -> FlacResult<FlacWriter<W>> {
        if !(1..=8).contains(&channels) {
            return Err(Error::InvalidFrameHeader("channel count must be 1..=8"));
        }
        if !matches!(bits_per_sample, 8 | 12 | 16 | 20 | 24) {
            return Err(Error::InvalidBitsPerSample(
                "bits per sample must be one of 8, 12, 16, 20, 24",
            ));
        }
        if sample_rate == 0 || sample_rate > 655_350 {
            return Err(Error::InvalidSampleRate("sample rate must be in 1..=655350"));
        }
        output.write_all(b"fLaC")?;
        let streaminfo_offset = 4;

        let placeholder = StreamInfo {
            min_block_size: DEFAULT_BLOCK_SIZE,
            max_block_size: DEFAULT_BLOCK_SIZE,
            min_frame_size: None,
            max_frame_size: None,
            sample_rate,
            channels,
            bits_per_sample,
            samples: None,
            md5sum: [0u8; 16],
        };
        let header = BlockHeader {
            is_last: true,
            block_type: BlockType::StreamInfo,
            length: 34,
        };
        metadata::write_block_header(&mut output, &header)?;
        metadata::write_streaminfo_block(&mut output, &placeholder)?;

        Ok(FlacWriter {
            output,
            channels,
            bits_per_sample,
            sample_rate,
            min_block_size: None,
            max_block_size: None,
            frame_index: 0,
            samples_written: 0,
            min_frame_size: None,
            max_frame_size: None,
            hasher: Md5::new(),
            streaminfo_offset,
        })
    }

    /// Encodes one block of inter-channel audio. Every channel slice must
    /// have the same length, which becomes this frame's block size (it
    /// need not match [`DEFAULT_BLOCK_SIZE`], e.g. for the stream's final,
    /// short block).
    pub fn write_block(&mut self, channels: &[Vec<i32>]) -> FlacResult<()> {
        if channels.len() != self.channels as usize {
            return Err(Error::InvalidFrameHeader("block channel count does not match stream"));
        }
        let block_size = channels[0].len();
        if channels.iter().any(|c| c.len() != block_size) {
            return Err(Error::InvalidFrameHeader("channels in a block must have equal length"));
        }
        if !(16..=65_535).contains(&block_size) {
            return Err(Error::InvalidBlockSize("block size must be in 16..=65535"));
        }

        feed_md5(&mut self.hasher, channels, self.bits_per_sample);

        let (assignment, encoded) = choose_assignment_and_subframes(channels, self.bits_per_sample);

        let header = FrameHeader {
            blocking_strategy: BlockingStrategy::Fixed,
            block_time: BlockTime::FrameNumber(self.frame_index as u32),
            block_size: block_size as u16,
            sample_rate: None,
            channel_assignment: assignment,
            bits_per_sample: None,
        };

        // Buffered so the frame's encoded size can be tracked for
        // STREAMINFO's min/max frame size fields.
        let mut frame_buf = Vec::new();
        let crc_out = frame::write_frame(&mut frame_buf, &header)?;
        let mut bits = BitWriter::new(crc_out);
        for (i, subframe) in encoded.iter().enumerate() {
            let bps = self.bits_per_sample + header.channel_assignment.wasted_bump(i as u8);
            subframe::encode(&mut bits, subframe, bps)?;
        }
        bits.align_to_byte()?;
        frame::finish_frame_write(bits)?;

        let frame_size = frame_buf.len() as u32;
        self.min_frame_size = Some(self.min_frame_size.map_or(frame_size, |m| m.min(frame_size)));
        self.max_frame_size = Some(self.max_frame_size.map_or(frame_size, |m| m.max(frame_size)));
        let bs = block_size as u16;
        self.min_block_size = Some(self.min_block_size.map_or(bs, |m| m.min(bs)));
        self.max_block_size = Some(self.max_block_size.map_or(bs, |m| m.max(bs)));
        self.output.write_all(&frame_buf)?;

        self.frame_index += 1;
        self.samples_written += block_size as u64;
        trace!("wrote frame {} ({} samples, {} bytes)", self.frame_index - 1, block_size, frame_size);

        Ok(())
    }

    /// Finalizes the stream. If `W` is also [`io::Seek`], this rewinds and
    /// patches the STREAMINFO block with the final sample count and MD5;
    /// otherwise those fields are left at their placeholder values.
    pub fn finish(self) -> FlacResult<W> {
        Ok(self.output)
    }
}

impl<W: io::Write + io::Seek> FlacWriter<W> {
    pub fn finish_seekable(mut self) -> FlacResult<W> {
        let digest = self.hasher.finalize();
        let mut md5sum = [0u8; 16];
        md5sum.copy_from_slice(&digest);

        let info = StreamInfo {
            min_block_size: self.min_block_size.unwrap_or(DEFAULT_BLOCK_SIZE),
            max_block_size: self.max_block_size.unwrap_or(DEFAULT_BLOCK_SIZE),
            min_frame_size: self.min_frame_size,
            max_frame_size: self.max_frame_size,
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
            samples: Some(self.samples_written),
            md5sum,
        };

        self.output.seek(SeekFrom::Start(self.streaminfo_offset))?;
        let header = BlockHeader {
            is_last: true,
            block_type: BlockType::StreamInfo,
            length: 34,
        };
        metadata::write_block_header(&mut self.output, &header)?;
        metadata::write_streaminfo_block(&mut self.output, &info)?;
        debug!("patched STREAMINFO: {} samples, md5 {:x?}", info.samples.unwrap_or(0), info.md5sum);

        Ok(self.output)
    }
}

/// Encodes a CONSTANT subframe if every sample in `samples` is identical,
/// otherwise compares VERBATIM against the best of FIXED orders 0..=4 and
/// returns the cheapest.
fn encode_channel(samples: &[i32], bps: u8) -> Subframe {
    if samples.iter().all(|&s| s == samples[0]) {
        return Subframe::Constant(samples[0]);
    }

    let mut best: Option<(u64, Subframe)> = None;
    for order in 0..=(4.min(samples.len()) as u8) {
        let warmup = samples[..order as usize].to_vec();
        let residual = subframe::fixed_residual(samples, order);
        let (_, residual_bits) = residual::best_rice_parameter(&residual, 30);
        let cost = order as u64 * bps as u64 + residual_bits + 8;
        let candidate = Subframe::Fixed { order, warmup, residual };
        if best.as_ref().map_or(true, |(b, _)| cost < *b) {
            best = Some((cost, candidate));
        }
    }

    let verbatim_cost = samples.len() as u64 * bps as u64;
    let (best_cost, best_subframe) = best.expect("order 0 is always a candidate");
    if verbatim_cost < best_cost {
        Subframe::Verbatim(samples.to_vec())
    } else {
        best_subframe
    }
}

/// Tries independent coding and, for exactly two channels, each stereo
/// decorrelation mode, and picks whichever has the lowest estimated cost.
fn choose_assignment_and_subframes(
    channels: &[Vec<i32>],
    bps: u8,
) -> (ChannelAssignment, Vec<Subframe>) {
    let independent: Vec<Subframe> = channels.iter().map(|c| encode_channel(c, bps)).collect();
    let independent_cost: u64 = independent.iter().map(subframe_cost).sum();

    if channels.len() != 2 {
        return (ChannelAssignment::Independent(channels.len() as u8), independent);
    }

    let block_size = channels[0].len();
    let mut combined: Vec<i32> = channels[0].iter().cloned().chain(channels[1].iter().cloned()).collect();

    let mut left_side = combined.clone();
    frame::encode_left_side(&mut left_side);
    let left = encode_channel(&left_side[..block_size], bps);
    let side_a = encode_channel(&left_side[block_size..], bps + 1);
    let left_side_cost = subframe_cost(&left) + subframe_cost(&side_a);

    let mut side_right = combined.clone();
    frame::encode_side_right(&mut side_right);
    let side_b = encode_channel(&side_right[..block_size], bps + 1);
    let right = encode_channel(&side_right[block_size..], bps);
    let side_right_cost = subframe_cost(&side_b) + subframe_cost(&right);

    frame::encode_mid_side(&mut combined);
    let mid = encode_channel(&combined[..block_size], bps);
    let side_c = encode_channel(&combined[block_size..], bps + 1);
    let mid_side_cost = subframe_cost(&mid) + subframe_cost(&side_c);

    let candidates = [
        (independent_cost, ChannelAssignment::Independent(2), independent),
        (left_side_cost, ChannelAssignment::LeftSide, vec![left, side_a]),
        (side_right_cost, ChannelAssignment::SideRight, vec![side_b, right]),
        (mid_side_cost, ChannelAssignment::MidSide, vec![mid, side_c]),
    ];

    candidates
        .into_iter()
        .min_by_key(|(cost, _, _)| *cost)
        .map(|(_, assignment, subframes)| (assignment, subframes))
        .expect("candidates is non-empty")
}

fn subframe_cost(subframe: &Subframe) -> u64 {
    match subframe {
        Subframe::Constant(_) => 8,
        Subframe::Verbatim(samples) => samples.len() as u64 * 16,
        Subframe::Fixed { order, residual, .. } => {
            let (_, bits) = residual::best_rice_parameter(residual, 30);
            *order as u64 * 16 + bits + 8
        }
        Subframe::Fir { .. } => u64::MAX, // the encoder never produces this; cost is moot.
    }
}

fn feed_md5(hasher: &mut Md5, channels: &[Vec<i32>], bps: u8) {
    if channels.is_empty() {
        return;
    }
    let bytes_per_sample = ((bps as usize) + 7) / 8;
    let block_size = channels[0].len();
    let mut buf = Vec::with_capacity(block_size * channels.len() * bytes_per_sample);
    for i in 0..block_size {
        for channel in channels {
            let le = channel[i].to_le_bytes();
            buf.extend_from_slice(&le[..bytes_per_sample]);
        }
    }
    hasher.update(&buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::FlacReader;
    use std::io::Cursor;

    #[test]
    fn verify_constant_block_round_trip() {
        let mut writer = FlacWriter::create(Vec::new(), 1, 16, 44100).unwrap();
        writer.write_block(&[vec![0i32; 64]]).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = FlacReader::open(Cursor::new(bytes)).unwrap();
        let block = reader.next_frame().unwrap().unwrap();
        assert_eq!(block.channels[0], vec![0i32; 64]);
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn verify_ramp_block_uses_fixed_predictor() {
        let samples: Vec<i32> = (0..64).collect();
        let subframe = encode_channel(&samples, 16);
        assert!(matches!(subframe, Subframe::Fixed { order: 1, .. }));
    }

    #[test]
    fn verify_stereo_round_trip_picks_a_decorrelation() {
        let left: Vec<i32> = (0..64).map(|i| 100 + i).collect();
        let right: Vec<i32> = (0..64).map(|i| 100 + i / 2).collect();
        let mut writer = FlacWriter::create(Vec::new(), 2, 16, 44100).unwrap();
        writer.write_block(&[left.clone(), right.clone()]).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = FlacReader::open(Cursor::new(bytes)).unwrap();
        let block = reader.next_frame().unwrap().unwrap();
        assert_eq!(block.channels[0], left);
        assert_eq!(block.channels[1], right);
    }

    #[test]
    fn verify_seekable_finish_patches_streaminfo() {
        let mut writer = FlacWriter::create(Cursor::new(Vec::new()), 1, 16, 44100).unwrap();
        writer.write_block(&[vec![5i32; 16]]).unwrap();
        let cursor = writer.finish_seekable().unwrap();

        let mut reader = FlacReader::open(cursor).unwrap();
        assert_eq!(reader.streaminfo().samples, Some(16));
        assert!(reader.streaminfo().md5_is_set());
    }
}
