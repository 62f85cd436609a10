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

//! A decoder and encoder for the FLAC (Free Lossless Audio Codec)
//! container and bitstream format.
//!
//! The crate is organized the way the format itself is layered:
//!
//! - [`bitstream`] — MSB-first bit-level I/O.
//! - [`crc`] — the CRC-8 and CRC-16 checks used by frame headers and
//!   footers.
//! - [`varint`] — the UTF-8-style variable-length integer coding used for
//!   frame and sample numbers.
//! - [`metadata`] — the metadata block chain: STREAMINFO, SEEKTABLE,
//!   VORBIS_COMMENT, CUESHEET, PICTURE, APPLICATION, and padding.
//! - [`frame`] — frame headers, channel decorrelation, and the CRCs that
//!   guard a frame.
//! - [`subframe`] — the four subframe types: CONSTANT, VERBATIM, FIXED,
//!   and FIR.
//! - [`residual`] — partitioned Rice coding of subframe residuals.
//! - [`seek`] — resolving and synthesizing seek tables.
//! - [`decoder`] and [`encoder`] — the public [`decoder::FlacReader`] and
//!   [`encoder::FlacWriter`] entry points built on top of the above.
//!
//! ```no_run
//! use std::fs::File;
//! use flac_codec::decoder::FlacReader;
//!
//! let file = File::open("example.flac").unwrap();
//! let mut reader = FlacReader::open(file).unwrap();
//! println!("{} Hz, {} channel(s)", reader.streaminfo().sample_rate, reader.streaminfo().channels);
//! while let Some(block) = reader.next_frame().unwrap() {
//!     let _ = block.channels;
//! }
//! reader.finish().unwrap();
//! ```

pub mod bitstream;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod metadata;
pub mod residual;
pub mod seek;
pub mod subframe;
pub mod varint;

pub use decoder::{Block, FlacReader, Validation};
pub use encoder::FlacWriter;
pub use error::{Error, FlacResult};
pub use frame::{BlockTime, BlockingStrategy, ChannelAssignment, FrameHeader};
pub use metadata::{MetadataBlock, SeekTable, StreamInfo};
pub use subframe::Subframe;
