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

//! The `error` module defines the error and result types used throughout
//! this crate.

use std::io;

use thiserror::Error;

/// Either `T` on success, or an `Error` on failure.
pub type FlacResult<T> = Result<T, Error>;

/// An error that prevents successful decoding or encoding of a FLAC stream.
///
/// Variants are grouped the way the format itself groups failures:
/// signature and framing, size violations, bitstream structure, integrity,
/// I/O, and unsupported operations. Every variant that can name a position
/// carries enough context (a frame index, or the offending value) to build
/// a diagnostic without re-parsing the stream.
#[derive(Debug, Error)]
pub enum Error {
    /// The stream header does not equal `fLaC`.
    #[error("invalid stream header, expected fLaC signature")]
    InvalidStreamHeader,

    /// The STREAMINFO block must be the very first metadata block.
    #[error("missing STREAMINFO block, must be the first metadata block")]
    MissingStreamInfoBlock,

    /// Metadata block type 127 is invalid, to avoid confusion with a frame
    /// sync code; types 7..=126 are reserved.
    #[error("invalid metadata block type {0}")]
    InvalidMetadataBlockType(u8),

    /// A SEEKTABLE block's points are not sorted or placeholders are
    /// interleaved with real points, rejected under strict validation.
    #[error("invalid seek table: {0}")]
    InvalidSeekTable(&'static str),

    /// A VORBIS_COMMENT, CUESHEET, or PICTURE text field is not valid
    /// UTF-8 (or, for CUESHEET, ASCII).
    #[error("invalid metadata text field: {0}")]
    InvalidMetadataText(&'static str),

    /// The STREAMINFO block must have length 34.
    #[error("invalid metadata block length {0}")]
    InvalidMetadataBlockLength(u32),

    /// A lower bound was encountered that was bigger than an upper bound.
    #[error("inconsistent bounds in STREAMINFO: {0}")]
    InconsistentBounds(&'static str),

    /// The minimum block size must be at least 16, and no block size may
    /// exceed 65535.
    #[error("invalid block size: {0}")]
    InvalidBlockSize(&'static str),

    /// The sample rate must be positive and no larger than 655350 Hz.
    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(&'static str),

    /// A frame must start with the frame sync code.
    #[error("missing frame sync code")]
    MissingFrameSyncCode,

    /// The frame header contains an invalid value in a reserved bit, a bit
    /// pattern reserved to avoid confusion with a sync code, or another
    /// reserved code point.
    #[error("invalid frame header: {0}")]
    InvalidFrameHeader(&'static str),

    /// The UTF-8-style coded integer contains an invalid bit sequence.
    #[error("invalid variable-length integer in frame header")]
    InvalidVarLengthInt,

    /// The observed frame header CRC-8 does not match the stored byte.
    #[error(
        "frame header CRC-8 mismatch at frame {frame_index}: expected {expected:#04x}, computed {computed:#04x}"
    )]
    FrameHeaderCrcMismatch {
        frame_index: u64,
        expected: u8,
        computed: u8,
    },

    /// The observed frame CRC-16 does not match the stored footer.
    #[error(
        "frame CRC-16 mismatch at frame {frame_index}: expected {expected:#06x}, computed {computed:#06x}"
    )]
    FrameFooterCrcMismatch {
        frame_index: u64,
        expected: u16,
        computed: u16,
    },

    /// The subframe header contains an invalid or reserved bit pattern.
    #[error("invalid subframe header: {0}")]
    InvalidSubframeHeader(&'static str),

    /// The subframe contains an invalid or reserved bit pattern.
    #[error("invalid subframe: {0}")]
    InvalidSubframe(&'static str),

    /// The residual contains an invalid or reserved bit pattern.
    #[error("invalid residual coding: {0}")]
    InvalidResidual(&'static str),

    /// A quantized FIR predictor shift was negative.
    #[error("invalid FIR predictor shift: {0}")]
    InvalidLpcShift(i8),

    /// The number of bits per sample is zero, exceeds 32, or otherwise does
    /// not fit the frame or subframe context.
    #[error("invalid bits per sample: {0}")]
    InvalidBitsPerSample(&'static str),

    /// A bit pattern is not a valid Rice code in the context.
    #[error("invalid Rice code: {0}")]
    InvalidRiceCode(&'static str),

    /// The audio stream has more bits per sample than the provided sample
    /// buffer can hold.
    #[error("sample too wide for the claimed bit depth")]
    SampleTooWide,

    /// The decoded PCM's MD5 did not match `StreamInfo::md5sum`.
    ///
    /// The decode itself succeeded; this is reported as a distinct, milder
    /// failure so callers may choose how severely to treat it.
    #[error("MD5 mismatch: decode succeeded but integrity check failed")]
    Md5Mismatch,

    /// Seek was requested on a source that cannot be sought, or without a
    /// seek table available.
    #[error("seek is not supported: {0}")]
    SeekUnsupported(&'static str),

    /// The seek target exceeds the known sample count of the stream.
    #[error("seek target {requested} exceeds stream length {total}")]
    SeekOutOfRange { requested: u64, total: u64 },

    /// A declared body length exceeded an internal sanity guard.
    #[error("declared size exceeds implementation guard: {0}")]
    SizeGuardExceeded(&'static str),

    /// Not a decoding error, but a problem with the underlying IO.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
