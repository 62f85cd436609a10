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

//! The `metadata` module deals with the metadata block chain at the
//! beginning of a FLAC stream: the mandatory `STREAMINFO` block and every
//! other block type that may follow it.

use std::io;

use crate::error::{Error, FlacResult};

/// Helpers for reading the big-endian integers metadata bodies are packed
/// with. Metadata is byte-aligned throughout, so plain `io::Read` suffices;
/// no bit-level reader is needed here.
pub trait ReadBytesExt: io::Read {
    fn read_u8(&mut self) -> FlacResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_be_u16(&mut self) -> FlacResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_be_u24(&mut self) -> FlacResult<u32> {
        let mut buf = [0u8; 3];
        self.read_exact(&mut buf)?;
        Ok((buf[0] as u32) << 16 | (buf[1] as u32) << 8 | buf[2] as u32)
    }

    fn read_be_u32(&mut self) -> FlacResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_be_u64(&mut self) -> FlacResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn read_le_u32(&mut self) -> FlacResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

impl<R: io::Read + ?Sized> ReadBytesExt for R {}

/// Write-side counterpart of [`ReadBytesExt`].
pub trait WriteBytesExt: io::Write {
    fn write_u8(&mut self, v: u8) -> FlacResult<()> {
        self.write_all(&[v])?;
        Ok(())
    }

    fn write_be_u16(&mut self, v: u16) -> FlacResult<()> {
        self.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    fn write_be_u24(&mut self, v: u32) -> FlacResult<()> {
        debug_assert!(v <= 0xff_ffff);
        self.write_all(&v.to_be_bytes()[1..])?;
        Ok(())
    }

    fn write_be_u32(&mut self, v: u32) -> FlacResult<()> {
        self.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    fn write_be_u64(&mut self, v: u64) -> FlacResult<()> {
        self.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    fn write_le_u32(&mut self, v: u32) -> FlacResult<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }
}

impl<W: io::Write + ?Sized> WriteBytesExt for W {}

/// The different kinds of metadata block defined by the FLAC format.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum BlockType {
    StreamInfo = 0,
    Padding = 1,
    Application = 2,
    SeekTable = 3,
    VorbisComment = 4,
    CueSheet = 5,
    Picture = 6,
}

/// A metadata block header: `[is_last:1][type:7][length:24]`.
#[derive(Clone, Copy, Debug)]
pub struct BlockHeader {
    pub is_last: bool,
    pub block_type: BlockType,
    /// Length of the metadata block body in bytes, excluding this header.
    pub length: u32,
}

/// Reads a metadata block header.
///
/// How the body should be interpreted depends on `block_type`; it is always
/// possible to skip over the body by skipping `length` bytes.
pub fn read_block_header<R: io::Read>(input: &mut R) -> FlacResult<BlockHeader> {
    let byte = input.read_u8()?;
    let is_last = byte >> 7 == 1;
    let block_type_code = byte & 0b0111_1111;
    let length = input.read_be_u24()?;

    let block_type = match block_type_code {
        0 => BlockType::StreamInfo,
        1 => BlockType::Padding,
        2 => BlockType::Application,
        3 => BlockType::SeekTable,
        4 => BlockType::VorbisComment,
        5 => BlockType::CueSheet,
        6 => BlockType::Picture,
        other => return Err(Error::InvalidMetadataBlockType(other)),
    };

    if block_type == BlockType::StreamInfo && length != 34 {
        return Err(Error::InvalidMetadataBlockLength(length));
    }

    Ok(BlockHeader {
        is_last,
        block_type,
        length,
    })
}

/// Writes a metadata block header.
pub fn write_block_header<W: io::Write>(out: &mut W, header: &BlockHeader) -> FlacResult<()> {
    let byte = ((header.is_last as u8) << 7) | (header.block_type as u8);
    out.write_u8(byte)?;
    out.write_be_u24(header.length)?;
    Ok(())
}

/// The STREAMINFO metadata block: technical details about the whole
/// stream, and the only block every FLAC stream must carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    /// The minimum block size (in inter-channel samples) used in the stream.
    pub min_block_size: u16,
    /// The maximum block size (in inter-channel samples) used in the stream.
    pub max_block_size: u16,
    /// The minimum frame size in bytes; `None` means unknown.
    pub min_frame_size: Option<u32>,
    /// The maximum frame size in bytes; `None` means unknown.
    pub max_frame_size: Option<u32>,
    /// The sample rate in Hz.
    pub sample_rate: u32,
    /// The number of channels (1..=8).
    pub channels: u8,
    /// The number of bits per sample (4..=32).
    pub bits_per_sample: u8,
    /// The total number of inter-channel samples; `None` means unknown.
    pub samples: Option<u64>,
    /// MD5 signature of the unencoded, interleaved, little-endian signed
    /// PCM audio. All zero means "not set".
    pub md5sum: [u8; 16],
}

impl StreamInfo {
    /// Whether `md5sum` is the all-zero "not set" sentinel.
    pub fn md5_is_set(&self) -> bool {
        self.md5sum != [0u8; 16]
    }
}

/// Reads a STREAMINFO block body (34 bytes).
pub fn read_streaminfo_block<R: io::Read>(input: &mut R) -> FlacResult<StreamInfo> {
    let min_block_size = input.read_be_u16()?;
    let max_block_size = input.read_be_u16()?;
    let min_frame_size = input.read_be_u24()?;
    let max_frame_size = input.read_be_u24()?;

    // 20 bits of sample rate, 3 bits of channels - 1, 5 bits of bits per
    // sample - 1, and 36 bits of sample count, packed across 8 bytes.
    let sample_rate_msb = input.read_be_u16()?;
    let b5 = input.read_u8()?;
    let sample_rate = (sample_rate_msb as u32) << 4 | (b5 as u32) >> 4;

    let channels = ((b5 >> 1) & 0b0000_0111) + 1;

    let bps_msb = b5 & 1;
    let b6 = input.read_u8()?;
    let bits_per_sample = (bps_msb << 4 | (b6 >> 4)) + 1;

    let samples_msb = (b6 & 0x0f) as u64;
    let samples_lsb = input.read_be_u32()? as u64;
    let samples = samples_msb << 32 | samples_lsb;

    let mut md5sum = [0u8; 16];
    input.read_exact(&mut md5sum)?;

    if min_block_size > max_block_size {
        return Err(Error::InconsistentBounds("min block size > max block size"));
    }
    if min_block_size < 16 {
        return Err(Error::InvalidBlockSize("minimum block size must be at least 16"));
    }
    if min_frame_size > max_frame_size && max_frame_size != 0 {
        return Err(Error::InconsistentBounds("min frame size > max frame size"));
    }
    if sample_rate == 0 || sample_rate > 655_350 {
        return Err(Error::InvalidSampleRate("sample rate must be in 1..=655350"));
    }

    Ok(StreamInfo {
        min_block_size,
        max_block_size,
        min_frame_size: (min_frame_size != 0).then_some(min_frame_size),
        max_frame_size: (max_frame_size != 0).then_some(max_frame_size),
        sample_rate,
        channels,
        bits_per_sample,
        samples: (samples != 0).then_some(samples),
        md5sum,
    })
}

/// Writes a STREAMINFO block body (34 bytes).
pub fn write_streaminfo_block<W: io::Write>(out: &mut W, info: &StreamInfo) -> FlacResult<()> {
    out.write_be_u16(info.min_block_size)?;
    out.write_be_u16(info.max_block_size)?;
    out.write_be_u24(info.min_frame_size.unwrap_or(0))?;
    out.write_be_u24(info.max_frame_size.unwrap_or(0))?;

    let sample_rate = info.sample_rate;
    let channels_minus_1 = info.channels - 1;
    let bps_minus_1 = info.bits_per_sample - 1;
    let samples = info.samples.unwrap_or(0);

    out.write_be_u16((sample_rate >> 4) as u16)?;
    let b5 = ((sample_rate & 0x0f) as u8) << 4
        | (channels_minus_1 & 0b111) << 1
        | (bps_minus_1 >> 4) & 1;
    out.write_u8(b5)?;
    let b6 = ((bps_minus_1 & 0x0f) << 4) | ((samples >> 32) as u8 & 0x0f);
    out.write_u8(b6)?;
    out.write_be_u32((samples & 0xffff_ffff) as u32)?;
    out.write_all(&info.md5sum)?;
    Ok(())
}

/// A single point in a `SEEKTABLE` block: `[sample:64][offset:64][block_size:16]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeekPoint {
    /// Sample number of the first sample in the target frame, or
    /// [`SeekPoint::PLACEHOLDER`] for a reserved, unused point.
    pub sample: u64,
    /// Byte offset of the target frame's first byte, relative to the first
    /// byte of the first frame.
    pub offset: u64,
    /// Number of samples in the target frame.
    pub frame_samples: u16,
}

impl SeekPoint {
    /// Sample number used to mark a placeholder seek point.
    pub const PLACEHOLDER: u64 = 0xFFFF_FFFF_FFFF_FFFF;

    pub fn is_placeholder(&self) -> bool {
        self.sample == Self::PLACEHOLDER
    }
}

/// The SEEKTABLE metadata block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeekTable {
    pub points: Vec<SeekPoint>,
}

impl SeekTable {
    /// Checks the invariant that non-placeholder points sort strictly
    /// ascending by sample number, and that placeholders, if any, appear
    /// only at the tail.
    pub fn is_valid(&self) -> bool {
        let mut seen_placeholder = false;
        let mut prev: Option<u64> = None;
        for point in &self.points {
            if point.is_placeholder() {
                seen_placeholder = true;
                continue;
            }
            if seen_placeholder {
                return false;
            }
            if let Some(p) = prev {
                if point.sample <= p {
                    return false;
                }
            }
            prev = Some(point.sample);
        }
        true
    }

    /// Returns the last point whose sample number is ≤ `target`, if any.
    pub fn point_at_or_before(&self, target: u64) -> Option<&SeekPoint> {
        self.points
            .iter()
            .filter(|p| !p.is_placeholder() && p.sample <= target)
            .max_by_key(|p| p.sample)
    }
}

const SEEK_POINT_BYTES: u32 = 18;

/// Reads a SEEKTABLE block body, `header.length` bytes long.
pub fn read_seektable_block<R: io::Read>(
    input: &mut R,
    header: &BlockHeader,
) -> FlacResult<SeekTable> {
    if header.length % SEEK_POINT_BYTES != 0 {
        return Err(Error::SizeGuardExceeded(
            "SEEKTABLE length is not a multiple of 18 bytes",
        ));
    }
    let n = header.length / SEEK_POINT_BYTES;
    let mut points = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let sample = input.read_be_u64()?;
        let offset = input.read_be_u64()?;
        let frame_samples = input.read_be_u16()?;
        points.push(SeekPoint {
            sample,
            offset,
            frame_samples,
        });
    }
    Ok(SeekTable { points })
}

/// Writes a SEEKTABLE block body.
pub fn write_seektable_block<W: io::Write>(out: &mut W, table: &SeekTable) -> FlacResult<()> {
    for point in &table.points {
        out.write_be_u64(point.sample)?;
        out.write_be_u64(point.offset)?;
        out.write_be_u16(point.frame_samples)?;
    }
    Ok(())
}

/// An APPLICATION metadata block: a 4-byte registered id followed by
/// application-defined bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Application {
    pub id: u32,
    pub data: Vec<u8>,
}

pub fn read_application_block<R: io::Read>(
    input: &mut R,
    header: &BlockHeader,
) -> FlacResult<Application> {
    let id = input.read_be_u32()?;
    let mut data = vec![0u8; header.length.saturating_sub(4) as usize];
    input.read_exact(&mut data)?;
    Ok(Application { id, data })
}

pub fn write_application_block<W: io::Write>(out: &mut W, app: &Application) -> FlacResult<()> {
    out.write_be_u32(app.id)?;
    out.write_all(&app.data)?;
    Ok(())
}

/// A VORBIS_COMMENT metadata block: a free-form vendor string followed by
/// `KEY=VALUE` comment pairs, every length field little-endian (inherited
/// from the Vorbis comment header this block format reuses).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VorbisComment {
    pub vendor: String,
    pub comments: Vec<String>,
}

/// Sanity bound on an individual field length, to reject a corrupt length
/// prefix before attempting to allocate for it.
const MAX_VORBIS_FIELD_LEN: u32 = 16 * 1024 * 1024;

fn read_length_prefixed_utf8<R: io::Read>(input: &mut R) -> FlacResult<String> {
    let len = input.read_le_u32()?;
    if len > MAX_VORBIS_FIELD_LEN {
        return Err(Error::SizeGuardExceeded("VORBIS_COMMENT field too long"));
    }
    let mut buf = vec![0u8; len as usize];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| Error::InvalidMetadataText("VORBIS_COMMENT field is not valid UTF-8"))
}

pub fn read_vorbis_comment_block<R: io::Read>(input: &mut R) -> FlacResult<VorbisComment> {
    let vendor = read_length_prefixed_utf8(input)?;
    let n_comments = input.read_le_u32()?;
    if n_comments > MAX_VORBIS_FIELD_LEN {
        return Err(Error::SizeGuardExceeded("VORBIS_COMMENT tag count too large"));
    }
    let mut comments = Vec::with_capacity(n_comments as usize);
    for _ in 0..n_comments {
        comments.push(read_length_prefixed_utf8(input)?);
    }
    Ok(VorbisComment { vendor, comments })
}

fn write_length_prefixed_utf8<W: io::Write>(out: &mut W, s: &str) -> FlacResult<()> {
    out.write_le_u32(s.len() as u32)?;
    out.write_all(s.as_bytes())?;
    Ok(())
}

pub fn write_vorbis_comment_block<W: io::Write>(
    out: &mut W,
    comment: &VorbisComment,
) -> FlacResult<()> {
    write_length_prefixed_utf8(out, &comment.vendor)?;
    out.write_le_u32(comment.comments.len() as u32)?;
    for c in &comment.comments {
        write_length_prefixed_utf8(out, c)?;
    }
    Ok(())
}

/// One index point within a [`CueSheetTrack`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CueSheetIndex {
    /// Offset in samples, relative to the track offset.
    pub offset: u64,
    pub number: u8,
}

/// One track within a `CUESHEET` metadata block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CueSheetTrack {
    /// Offset in samples, relative to the start of the FLAC stream.
    pub offset: u64,
    /// 1-99, or 170 for the lead-out track.
    pub number: u8,
    /// 12-character ISRC, or empty if not set.
    pub isrc: String,
    pub is_audio: bool,
    pub pre_emphasis: bool,
    pub indices: Vec<CueSheetIndex>,
}

/// A CUESHEET metadata block, describing track and index points, mirroring
/// a CD table of contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CueSheet {
    pub media_catalog_number: String,
    pub lead_in_samples: u64,
    pub is_cd: bool,
    pub tracks: Vec<CueSheetTrack>,
}

fn read_fixed_ascii<R: io::Read>(input: &mut R, len: usize) -> FlacResult<String> {
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    buf.truncate(end);
    String::from_utf8(buf).map_err(|_| Error::InvalidMetadataText("CUESHEET field is not ASCII"))
}

fn write_fixed_ascii<W: io::Write>(out: &mut W, s: &str, len: usize) -> FlacResult<()> {
    let mut buf = vec![0u8; len];
    let bytes = s.as_bytes();
    debug_assert!(bytes.len() <= len);
    let n = bytes.len().min(len);
    buf[..n].copy_from_slice(&bytes[..n]);
    out.write_all(&buf)?;
    Ok(())
}

pub fn read_cuesheet_block<R: io::Read>(input: &mut R) -> FlacResult<CueSheet> {
    let media_catalog_number = read_fixed_ascii(input, 128)?;
    let lead_in_samples = input.read_be_u64()?;

    let flags = input.read_u8()?;
    let is_cd = flags & 0x80 != 0;

    // 7 reserved bits (already consumed as part of `flags`) plus 258
    // reserved bytes.
    let mut reserved = [0u8; 258];
    input.read_exact(&mut reserved)?;

    let n_tracks = input.read_u8()?;
    let mut tracks = Vec::with_capacity(n_tracks as usize);
    for _ in 0..n_tracks {
        let offset = input.read_be_u64()?;
        let number = input.read_u8()?;
        let isrc = read_fixed_ascii(input, 12)?;

        let track_flags = input.read_u8()?;
        let is_audio = track_flags & 0x80 == 0;
        let pre_emphasis = track_flags & 0x40 != 0;

        let mut track_reserved = [0u8; 13];
        input.read_exact(&mut track_reserved)?;

        let n_indices = input.read_u8()?;
        let mut indices = Vec::with_capacity(n_indices as usize);
        for _ in 0..n_indices {
            let index_offset = input.read_be_u64()?;
            let index_number = input.read_u8()?;
            let mut index_reserved = [0u8; 3];
            input.read_exact(&mut index_reserved)?;
            indices.push(CueSheetIndex {
                offset: index_offset,
                number: index_number,
            });
        }

        tracks.push(CueSheetTrack {
            offset,
            number,
            isrc,
            is_audio,
            pre_emphasis,
            indices,
        });
    }

    Ok(CueSheet {
        media_catalog_number,
        lead_in_samples,
        is_cd,
        tracks,
    })
}

pub fn write_cuesheet_block<W: io::Write>(out: &mut W, sheet: &CueSheet) -> FlacResult<()> {
    write_fixed_ascii(out, &sheet.media_catalog_number, 128)?;
    out.write_be_u64(sheet.lead_in_samples)?;
    out.write_u8(if sheet.is_cd { 0x80 } else { 0 })?;
    out.write_all(&[0u8; 258])?;
    out.write_u8(sheet.tracks.len() as u8)?;
    for track in &sheet.tracks {
        out.write_be_u64(track.offset)?;
        out.write_u8(track.number)?;
        write_fixed_ascii(out, &track.isrc, 12)?;
        let mut flags = 0u8;
        if !track.is_audio {
            flags |= 0x80;
        }
        if track.pre_emphasis {
            flags |= 0x40;
        }
        out.write_u8(flags)?;
        out.write_all(&[0u8; 13])?;
        out.write_u8(track.indices.len() as u8)?;
        for index in &track.indices {
            out.write_be_u64(index.offset)?;
            out.write_u8(index.number)?;
            out.write_all(&[0u8; 3])?;
        }
    }
    Ok(())
}

/// A PICTURE metadata block: cover art or other image data, tagged with an
/// ID3v2 APIC-style picture type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Picture {
    pub picture_type: u32,
    pub mime_type: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub color_depth: u32,
    pub colors_used: u32,
    pub data: Vec<u8>,
}

fn read_length_prefixed_bytes<R: io::Read>(input: &mut R, max: u32) -> FlacResult<Vec<u8>> {
    let len = input.read_be_u32()?;
    if len > max {
        return Err(Error::SizeGuardExceeded("PICTURE field too long"));
    }
    let mut buf = vec![0u8; len as usize];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

const MAX_PICTURE_FIELD_LEN: u32 = 64 * 1024 * 1024;

pub fn read_picture_block<R: io::Read>(input: &mut R) -> FlacResult<Picture> {
    let picture_type = input.read_be_u32()?;
    let mime_bytes = read_length_prefixed_bytes(input, 1024)?;
    let mime_type = String::from_utf8(mime_bytes)
        .map_err(|_| Error::InvalidMetadataText("PICTURE MIME type is not ASCII/UTF-8"))?;
    let description_bytes = read_length_prefixed_bytes(input, MAX_VORBIS_FIELD_LEN)?;
    let description = String::from_utf8(description_bytes)
        .map_err(|_| Error::InvalidMetadataText("PICTURE description is not valid UTF-8"))?;
    let width = input.read_be_u32()?;
    let height = input.read_be_u32()?;
    let color_depth = input.read_be_u32()?;
    let colors_used = input.read_be_u32()?;
    let data = read_length_prefixed_bytes(input, MAX_PICTURE_FIELD_LEN)?;

    Ok(Picture {
        picture_type,
        mime_type,
        description,
        width,
        height,
        color_depth,
        colors_used,
        data,
    })
}

pub fn write_picture_block<W: io::Write>(out: &mut W, picture: &Picture) -> FlacResult<()> {
    out.write_be_u32(picture.picture_type)?;
    out.write_be_u32(picture.mime_type.len() as u32)?;
    out.write_all(picture.mime_type.as_bytes())?;
    out.write_be_u32(picture.description.len() as u32)?;
    out.write_all(picture.description.as_bytes())?;
    out.write_be_u32(picture.width)?;
    out.write_be_u32(picture.height)?;
    out.write_be_u32(picture.color_depth)?;
    out.write_be_u32(picture.colors_used)?;
    out.write_be_u32(picture.data.len() as u32)?;
    out.write_all(&picture.data)?;
    Ok(())
}

/// A fully parsed metadata block, tagged by type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataBlock {
    StreamInfo(StreamInfo),
    Padding(u32),
    Application(Application),
    SeekTable(SeekTable),
    VorbisComment(VorbisComment),
    CueSheet(CueSheet),
    Picture(Picture),
}

/// Reads one metadata block body, given its header.
pub fn read_metadata_block<R: io::Read>(
    input: &mut R,
    header: &BlockHeader,
) -> FlacResult<MetadataBlock> {
    Ok(match header.block_type {
        BlockType::StreamInfo => MetadataBlock::StreamInfo(read_streaminfo_block(input)?),
        BlockType::Padding => {
            let mut buf = vec![0u8; header.length as usize];
            input.read_exact(&mut buf)?;
            MetadataBlock::Padding(header.length)
        }
        BlockType::Application => {
            MetadataBlock::Application(read_application_block(input, header)?)
        }
        BlockType::SeekTable => MetadataBlock::SeekTable(read_seektable_block(input, header)?),
        BlockType::VorbisComment => {
            MetadataBlock::VorbisComment(read_vorbis_comment_block(input)?)
        }
        BlockType::CueSheet => MetadataBlock::CueSheet(read_cuesheet_block(input)?),
        BlockType::Picture => MetadataBlock::Picture(read_picture_block(input)?),
    })
}

/// Skips a metadata block body without parsing it, given its header.
pub fn skip_block<R: io::Read>(input: &mut R, header: &BlockHeader) -> FlacResult<()> {
    let mut remaining = header.length as u64;
    let mut buf = [0u8; 4096];
    while remaining > 0 {
        let take = remaining.min(buf.len() as u64) as usize;
        input.read_exact(&mut buf[..take])?;
        remaining -= take as u64;
    }
    Ok(())
}

/// Iterates over the metadata block chain of a FLAC stream, after the
/// `fLaC` signature has been consumed.
///
/// The first block yielded must be STREAMINFO; the iterator stops after
/// yielding the block whose header has `is_last` set.
pub struct MetadataBlockReader<'r, R: 'r> {
    reader: &'r mut R,
    done: bool,
}

impl<'r, R: io::Read> MetadataBlockReader<'r, R> {
    pub fn new(reader: &'r mut R) -> MetadataBlockReader<'r, R> {
        MetadataBlockReader {
            reader,
            done: false,
        }
    }
}

impl<'r, R: io::Read> Iterator for MetadataBlockReader<'r, R> {
    type Item = FlacResult<MetadataBlock>;

    fn next(&mut self) -> Option<FlacResult<MetadataBlock>> {
        if self.done {
            return None;
        }
        let header = match read_block_header(self.reader) {
            Ok(h) => h,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        self.done = header.is_last;
        Some(read_metadata_block(self.reader, &header))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (1, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn verify_streaminfo_round_trip() {
        let info = StreamInfo {
            min_block_size: 4096,
            max_block_size: 4096,
            min_frame_size: Some(1234),
            max_frame_size: Some(5678),
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
            samples: Some(123_456_789),
            md5sum: [0xab; 16],
        };
        let mut buf = Vec::new();
        write_streaminfo_block(&mut buf, &info).unwrap();
        assert_eq!(buf.len(), 34);
        let decoded = read_streaminfo_block(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn verify_streaminfo_unknown_fields_round_trip() {
        let info = StreamInfo {
            min_block_size: 16,
            max_block_size: 65535,
            min_frame_size: None,
            max_frame_size: None,
            sample_rate: 1,
            channels: 1,
            bits_per_sample: 4,
            samples: None,
            md5sum: [0u8; 16],
        };
        let mut buf = Vec::new();
        write_streaminfo_block(&mut buf, &info).unwrap();
        let decoded = read_streaminfo_block(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, info);
        assert!(!decoded.md5_is_set());
    }

    #[test]
    fn verify_streaminfo_rejects_small_block_size() {
        let info = StreamInfo {
            min_block_size: 15,
            max_block_size: 15,
            min_frame_size: None,
            max_frame_size: None,
            sample_rate: 44100,
            channels: 1,
            bits_per_sample: 16,
            samples: None,
            md5sum: [0u8; 16],
        };
        let mut buf = Vec::new();
        write_streaminfo_block(&mut buf, &info).unwrap();
        assert!(read_streaminfo_block(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn verify_block_header_round_trip() {
        let header = BlockHeader {
            is_last: true,
            block_type: BlockType::Padding,
            length: 1024,
        };
        let mut buf = Vec::new();
        write_block_header(&mut buf, &header).unwrap();
        let decoded = read_block_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.is_last, header.is_last);
        assert_eq!(decoded.block_type, header.block_type);
        assert_eq!(decoded.length, header.length);
    }

    #[test]
    fn verify_invalid_metadata_block_type_127() {
        let mut buf = vec![127u8, 0, 0, 0];
        assert!(matches!(
            read_block_header(&mut Cursor::new(&mut buf)),
            Err(Error::InvalidMetadataBlockType(127))
        ));
    }

    #[test]
    fn verify_seektable_validity() {
        let valid = SeekTable {
            points: vec![
                SeekPoint {
                    sample: 0,
                    offset: 0,
                    frame_samples: 4096,
                },
                SeekPoint {
                    sample: 4096,
                    offset: 1000,
                    frame_samples: 4096,
                },
                SeekPoint {
                    sample: SeekPoint::PLACEHOLDER,
                    offset: 0,
                    frame_samples: 0,
                },
            ],
        };
        assert!(valid.is_valid());

        let invalid = SeekTable {
            points: vec![
                SeekPoint {
                    sample: 4096,
                    offset: 0,
                    frame_samples: 4096,
                },
                SeekPoint {
                    sample: 0,
                    offset: 1000,
                    frame_samples: 4096,
                },
            ],
        };
        assert!(!invalid.is_valid());
    }

    #[test]
    fn verify_seektable_point_at_or_before() {
        let table = SeekTable {
            points: vec![
                SeekPoint { sample: 0, offset: 0, frame_samples: 4096 },
                SeekPoint { sample: 4096, offset: 100, frame_samples: 4096 },
                SeekPoint { sample: 8192, offset: 200, frame_samples: 4096 },
            ],
        };
        assert_eq!(table.point_at_or_before(9000).unwrap().sample, 8192);
        assert_eq!(table.point_at_or_before(4096).unwrap().sample, 4096);
        assert!(table.point_at_or_before(0).is_some());
    }

    #[test]
    fn verify_vorbis_comment_round_trip() {
        let comment = VorbisComment {
            vendor: "flac-codec".to_string(),
            comments: vec!["ARTIST=Test".to_string(), "TITLE=Example".to_string()],
        };
        let mut buf = Vec::new();
        write_vorbis_comment_block(&mut buf, &comment).unwrap();
        let decoded = read_vorbis_comment_block(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, comment);
    }

    #[test]
    fn verify_cuesheet_round_trip() {
        let sheet = CueSheet {
            media_catalog_number: "1234567890123".to_string(),
            lead_in_samples: 88200,
            is_cd: true,
            tracks: vec![CueSheetTrack {
                offset: 0,
                number: 1,
                isrc: "ABCDE1234567".to_string(),
                is_audio: true,
                pre_emphasis: false,
                indices: vec![CueSheetIndex { offset: 0, number: 1 }],
            }],
        };
        let mut buf = Vec::new();
        write_cuesheet_block(&mut buf, &sheet).unwrap();
        let decoded = read_cuesheet_block(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, sheet);
    }

    #[test]
    fn verify_picture_round_trip() {
        let picture = Picture {
            picture_type: 3,
            mime_type: "image/png".to_string(),
            description: "cover".to_string(),
            width: 100,
            height: 100,
            color_depth: 24,
            colors_used: 0,
            data: vec![1, 2, 3, 4],
        };
        let mut buf = Vec::new();
        write_picture_block(&mut buf, &picture).unwrap();
        let decoded = read_picture_block(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, picture);
    }
}
