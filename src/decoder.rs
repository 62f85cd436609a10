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

//! The `decoder` module ties the bitstream, metadata, frame, and subframe
//! layers together into [`FlacReader`], the public entry point for
//! decoding a FLAC stream.

use std::io::{self, Read as _, Seek as _, SeekFrom};

use log::{debug, trace, warn};
use md5::{Digest, Md5};

use crate::bitstream::BitReader;
use crate::error::{Error, FlacResult};
use crate::frame::{self, BlockTime, ChannelAssignment, FrameHeader};
use crate::metadata::{self, BlockType, MetadataBlock, MetadataBlockReader, SeekTable, StreamInfo};
use crate::seek::{self, SeekTableBuilder};
use crate::subframe;

/// Whether subset-FLAC restrictions (the narrower bitstream profile
/// required for streaming and hardware decoders) are enforced on decode.
///
/// This crate never enforces them silently; `Strict` simply surfaces a
/// violation as an error instead of decoding streams outside the subset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validation {
    Strict,
    Lenient,
}

/// A decoded block of inter-channel audio: one `Vec<i32>` per channel, all
/// the same length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub first_sample: u64,
    pub channels: Vec<Vec<i32>>,
}

impl Block {
    pub fn block_size(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }
}

/// A byte-counting wrapper so the decoder can record where the frame data
/// begins, and reposition itself there plus an offset on seek.
#[derive(Debug)]
struct CountingReader<R> {
    inner: R,
    bytes_read: u64,
}

impl<R: io::Read> CountingReader<R> {
    fn new(inner: R) -> CountingReader<R> {
        CountingReader { inner, bytes_read: 0 }
    }
}

impl<R: io::Read> io::Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

impl<R: io::Read + io::Seek> CountingReader<R> {
    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.bytes_read = pos;
        Ok(())
    }
}

/// Reads the FLAC stream signature, skipping a leading ID3v2 tag if
/// present.
fn read_signature<R: io::Read>(input: &mut CountingReader<R>) -> FlacResult<()> {
    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;

    if &magic[..3] == b"ID3" {
        // The 4th byte we already read is the ID3v2 major version. Read
        // the remaining fixed header fields: minor version, flags, and a
        // 4-byte synchsafe size (each byte contributes its low 7 bits).
        let mut rest = [0u8; 6];
        input.read_exact(&mut rest)?;
        let size = ((rest[2] as u32 & 0x7f) << 21)
            | ((rest[3] as u32 & 0x7f) << 14)
            | ((rest[4] as u32 & 0x7f) << 7)
            | (rest[5] as u32 & 0x7f);
        debug!("skipping {} byte ID3v2 tag", size);

        let mut remaining = size as u64;
        let mut scratch = [0u8; 4096];
        while remaining > 0 {
            let take = remaining.min(scratch.len() as u64) as usize;
            input.read_exact(&mut scratch[..take])?;
            remaining -= take as u64;
        }

        input.read_exact(&mut magic)?;
    }

    if &magic != b"fLaC" {
        return Err(Error::InvalidStreamHeader);
    }
    Ok(())
}

/// Decodes a FLAC stream: the metadata block chain followed by a sequence
/// of frames.
#[derive(Debug)]
pub struct FlacReader<R> {
    reader: CountingReader<R>,
    streaminfo: StreamInfo,
    seektable: Option<SeekTable>,
    other_blocks: Vec<MetadataBlock>,
    music_data_start: u64,
    frame_index: u64,
    next_sample: u64,
    hasher: Option<Md5>,
    validation: Validation,
}

impl<R: io::Read> FlacReader<R> {
    /// Opens a FLAC stream, reading and validating its signature and
    /// metadata block chain. Does not decode any audio.
    pub fn open(reader: R) -> FlacResult<FlacReader<R>> {
        FlacReader::open_with_validation(reader, Validation::Lenient)
    }

    pub fn open_with_validation(reader: R, validation: Validation) -> FlacResult<FlacReader<R>> {
        let mut counting = CountingReader::new(reader);
        read_signature(&mut counting)?;

        let mut streaminfo = None;
        let mut seektable = None;
        let mut other_blocks = Vec::new();

        {
            let mut blocks = MetadataBlockReader::new(&mut counting);
            let first = blocks
                .next()
                .ok_or(Error::MissingStreamInfoBlock)??;
            match first {
                MetadataBlock::StreamInfo(info) => streaminfo = Some(info),
                _ => return Err(Error::MissingStreamInfoBlock),
            }

            for block in blocks {
                match block? {
                    MetadataBlock::SeekTable(table) => {
                        if validation == Validation::Strict && !table.is_valid() {
                            return Err(Error::InvalidSeekTable("seek points are not sorted by sample"));
                        }
                        seektable = Some(table);
                    }
                    other => other_blocks.push(other),
                }
            }
        }

        let streaminfo = streaminfo.ok_or(Error::MissingStreamInfoBlock)?;
        let music_data_start = counting.bytes_read;
        trace!("metadata chain ends at byte {}", music_data_start);

        Ok(FlacReader {
            reader: counting,
            streaminfo,
            seektable,
            other_blocks,
            music_data_start,
            frame_index: 0,
            next_sample: 0,
            hasher: Some(Md5::new()),
            validation,
        })
    }

    pub fn streaminfo(&self) -> &StreamInfo {
        &self.streaminfo
    }

    pub fn seek_table(&self) -> Option<&SeekTable> {
        self.seektable.as_ref()
    }

    pub fn other_metadata(&self) -> &[MetadataBlock] {
        &self.other_blocks
    }

    /// Decodes the next frame, or returns `Ok(None)` at a clean end of
    /// stream (EOF exactly at a frame boundary).
    pub fn next_frame(&mut self) -> FlacResult<Option<Block>> {
        // Peek a single byte to distinguish a graceful EOF from a frame
        // that starts but is truncated partway through.
        let mut probe = [0u8; 1];
        let n = self.reader.read(&mut probe)?;
        if n == 0 {
            return Ok(None);
        }

        let chained = io::Read::chain(io::Cursor::new(probe), &mut self.reader);
        let (header, crc_reader) = frame::start_frame(chained, self.frame_index)?;

        let block_size = header.block_size;
        let bps = header
            .bits_per_sample
            .unwrap_or(self.streaminfo.bits_per_sample);
        let strict = self.validation == Validation::Strict;

        if strict {
            let sample_rate = header.sample_rate.unwrap_or(self.streaminfo.sample_rate);
            if sample_rate <= 48_000 && block_size > 4608 {
                return Err(Error::InvalidBlockSize(
                    "block size exceeds the subset's limit of 4608 at this sample rate",
                ));
            }
        }

        let mut bits = frame::bit_reader_for_frame(crc_reader);
        let channels = decode_channels(&mut bits, &header, bps, block_size, strict)?;
        bits.align_to_byte();
        frame::finish_frame(bits, self.frame_index)?;

        let first_sample = match header.block_time {
            BlockTime::SampleNumber(s) => s,
            // A fixed-blocksize stream's frame number counts frames, not
            // samples, so the byte offset must be scaled by the nominal
            // block size established for the whole stream, not this
            // frame's own `block_size` (which may be short, for the final
            // frame).
            BlockTime::FrameNumber(f) => f as u64 * self.streaminfo.max_block_size as u64,
        };

        if let Some(total) = self.streaminfo.samples {
            if first_sample >= total && block_size as u64 > 0 && first_sample > 0 {
                warn!("frame {} starts past the declared sample count", self.frame_index);
            }
        }

        if let Some(hasher) = self.hasher.as_mut() {
            feed_md5(hasher, &channels, self.streaminfo.bits_per_sample);
        }

        self.frame_index += 1;
        self.next_sample = first_sample + block_size as u64;

        Ok(Some(Block {
            first_sample,
            channels,
        }))
    }

    /// Checks the accumulated MD5 against `StreamInfo::md5sum`, if one was
    /// set and no seek has invalidated the running hash.
    ///
    /// Call this once the caller is done decoding (`next_frame` returned
    /// `None`, or decoding was intentionally stopped early but is still
    /// expected to cover the whole stream).
    pub fn finish(&mut self) -> FlacResult<()> {
        if !self.streaminfo.md5_is_set() {
            return Ok(());
        }
        match self.hasher.take() {
            None => Ok(()), // invalidated by a prior seek; nothing to check.
            Some(hasher) => {
                let digest = hasher.finalize();
                if digest.as_slice() == &self.streaminfo.md5sum[..] {
                    Ok(())
                } else {
                    Err(Error::Md5Mismatch)
                }
            }
        }
    }
}

impl<R: io::Read + io::Seek> FlacReader<R> {
    /// Seeks to the last seek point at or before `sample`, returning the
    /// sample number actually landed on. The caller must then decode and
    /// discard `sample - returned` samples to reach the target exactly.
    ///
    /// Seeking invalidates the running MD5 check: [`FlacReader::finish`]
    /// will report success trivially after a seek, since the stream is no
    /// longer being hashed from the start.
    pub fn seek(&mut self, sample: u64) -> FlacResult<u64> {
        if let Some(total) = self.streaminfo.samples {
            if sample > total {
                return Err(Error::SeekOutOfRange { requested: sample, total });
            }
        }

        let table = self
            .seektable
            .as_ref()
            .ok_or(Error::SeekUnsupported("stream has no SEEKTABLE"))?;

        let (offset, landed_sample) = seek::resolve(table, sample)
            .ok_or(Error::SeekUnsupported("seek target precedes the first seek point"))?;

        self.reader.seek_to(self.music_data_start + offset)?;
        self.next_sample = landed_sample;
        self.hasher = None;
        Ok(landed_sample)
    }

    /// Walks every frame of the stream once, recording a seek point every
    /// `stride` frames, and installs the result as this reader's seek
    /// table. Leaves the reader positioned at the end of the stream.
    pub fn synthesize_seek_table(&mut self, stride: u32) -> FlacResult<()> {
        let mut builder = SeekTableBuilder::new(stride);
        loop {
            let offset = self.reader.bytes_read - self.music_data_start;
            match self.next_frame()? {
                None => break,
                Some(block) => {
                    builder.observe_frame(block.first_sample, offset, block.block_size() as u16);
                }
            }
        }
        self.seektable = Some(builder.finish());
        self.reader.seek_to(self.music_data_start)?;
        self.frame_index = 0;
        self.next_sample = 0;
        self.hasher = Some(Md5::new());
        Ok(())
    }
}

fn decode_channels<R: io::Read>(
    bits: &mut BitReader<R>,
    header: &FrameHeader,
    bps: u8,
    block_size: u16,
    strict: bool,
) -> FlacResult<Vec<Vec<i32>>> {
    // A side channel carries one extra bit over the stream's bit depth, so
    // a 32-bit stream's side channel would need 33 bits: wider than an i32
    // sample or a bitstream read can hold. Reject rather than silently
    // truncate.
    let needs_side_channel = !matches!(header.channel_assignment, ChannelAssignment::Independent(_));
    if needs_side_channel && bps >= 32 {
        return Err(Error::InvalidBitsPerSample(
            "32-bit streams cannot use a side channel (left/side, side/right, mid/side)",
        ));
    }

    match header.channel_assignment {
        ChannelAssignment::Independent(n) => {
            let mut channels = Vec::with_capacity(n as usize);
            for _ in 0..n {
                channels.push(subframe::decode(bits, bps, block_size, strict)?);
            }
            Ok(channels)
        }
        ChannelAssignment::LeftSide => {
            let mut left = subframe::decode(bits, bps, block_size, strict)?;
            let side = subframe::decode(bits, bps + 1, block_size, strict)?;
            let mut combined: Vec<i32> = Vec::with_capacity(block_size as usize * 2);
            combined.append(&mut left);
            combined.extend(side);
            frame::decode_left_side(&mut combined);
            split(combined, block_size as usize)
        }
        ChannelAssignment::SideRight => {
            let side = subframe::decode(bits, bps + 1, block_size, strict)?;
            let mut right = subframe::decode(bits, bps, block_size, strict)?;
            let mut combined: Vec<i32> = Vec::with_capacity(block_size as usize * 2);
            combined.extend(side);
            combined.append(&mut right);
            frame::decode_side_right(&mut combined);
            split(combined, block_size as usize)
        }
        ChannelAssignment::MidSide => {
            let mut mid = subframe::decode(bits, bps, block_size, strict)?;
            let side = subframe::decode(bits, bps + 1, block_size, strict)?;
            let mut combined: Vec<i32> = Vec::with_capacity(block_size as usize * 2);
            combined.append(&mut mid);
            combined.extend(side);
            frame::decode_mid_side(&mut combined);
            split(combined, block_size as usize)
        }
    }
}

fn split(combined: Vec<i32>, block_size: usize) -> FlacResult<Vec<Vec<i32>>> {
    let (left, right) = combined.split_at(block_size);
    Ok(vec![left.to_vec(), right.to_vec()])
}

/// Serializes decoded samples little-endian, channel-interleaved, at the
/// smallest whole number of bytes per sample that `bps` fits in, and feeds
/// them to the running MD5 hash.
fn feed_md5(hasher: &mut Md5, channels: &[Vec<i32>], bps: u8) {
    if channels.is_empty() {
        return;
    }
    let bytes_per_sample = ((bps as usize) + 7) / 8;
    let block_size = channels[0].len();
    let mut buf = Vec::with_capacity(block_size * channels.len() * bytes_per_sample);
    for i in 0..block_size {
        for channel in channels {
            let sample = channel[i];
            let le = sample.to_le_bytes();
            buf.extend_from_slice(&le[..bytes_per_sample]);
        }
    }
    hasher.update(&buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{write_block_header, write_streaminfo_block, BlockHeader};
    use std::io::Cursor;

    fn minimal_stream(samples: Option<u64>, md5: [u8; 16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"fLaC");
        let info = StreamInfo {
            min_block_size: 16,
            max_block_size: 16,
            min_frame_size: None,
            max_frame_size: None,
            sample_rate: 44100,
            channels: 1,
            bits_per_sample: 16,
            samples,
            md5sum: md5,
        };
        let header = BlockHeader { is_last: true, block_type: BlockType::StreamInfo, length: 34 };
        write_block_header(&mut buf, &header).unwrap();
        write_streaminfo_block(&mut buf, &info).unwrap();
        buf
    }

    #[test]
    fn verify_open_requires_streaminfo_first() {
        let stream = minimal_stream(None, [0u8; 16]);
        let reader = FlacReader::open(Cursor::new(stream)).unwrap();
        assert_eq!(reader.streaminfo().sample_rate, 44100);
    }

    #[test]
    fn verify_open_rejects_bad_signature() {
        let stream = b"OggS".to_vec();
        assert!(matches!(
            FlacReader::open(Cursor::new(stream)),
            Err(Error::InvalidStreamHeader)
        ));
    }

    #[test]
    fn verify_open_skips_id3v2_tag() {
        let mut stream = Vec::new();
        // A 10-byte ID3v2 header declaring 10 bytes of tag data to follow.
        stream.extend_from_slice(&[0x49, 0x44, 0x33, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0A]);
        stream.extend_from_slice(&[0u8; 10]);
        stream.extend(minimal_stream(None, [0u8; 16]));
        let reader = FlacReader::open(Cursor::new(stream)).unwrap();
        assert_eq!(reader.streaminfo().channels, 1);
    }

    #[test]
    fn verify_eof_at_frame_boundary_is_graceful() {
        let stream = minimal_stream(Some(0), [0u8; 16]);
        let mut reader = FlacReader::open(Cursor::new(stream)).unwrap();
        assert!(reader.next_frame().unwrap().is_none());
        assert!(reader.finish().is_ok());
    }
}
