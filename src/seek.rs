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

//! Seeking support: consuming a stream's SEEKTABLE, and synthesizing one
//! by walking frames when the stream is seekable but carries none.

use crate::metadata::{SeekPoint, SeekTable};

/// Default stride (in frames) used when synthesizing a seek table by
/// walking every frame of a stream that did not ship one.
pub const DEFAULT_SYNTHESIS_STRIDE: u32 = 10;

/// Accumulates seek points while a decoder walks frames linearly, for
/// streams that are seekable but did not carry a SEEKTABLE block.
///
/// Every `stride`-th frame observed is recorded, so the resulting table
/// never covers every frame but makes future seeks on this same stream
/// cheaper after one linear pass.
pub struct SeekTableBuilder {
    stride: u32,
    frames_seen: u32,
    points: Vec<SeekPoint>,
}

impl SeekTableBuilder {
    pub fn new(stride: u32) -> SeekTableBuilder {
        SeekTableBuilder {
            stride: stride.max(1),
            frames_seen: 0,
            points: Vec::new(),
        }
    }

    /// Records the position of a frame that was just decoded.
    pub fn observe_frame(&mut self, sample_number: u64, byte_offset: u64, frame_samples: u16) {
        if self.frames_seen % self.stride == 0 {
            self.points.push(SeekPoint {
                sample: sample_number,
                offset: byte_offset,
                frame_samples,
            });
        }
        self.frames_seen += 1;
    }

    pub fn finish(self) -> SeekTable {
        SeekTable { points: self.points }
    }
}

impl Default for SeekTableBuilder {
    fn default() -> SeekTableBuilder {
        SeekTableBuilder::new(DEFAULT_SYNTHESIS_STRIDE)
    }
}

/// Resolves a seek request to a byte offset (relative to the first byte of
/// the first frame) and the sample number actually landed on, given a seek
/// table and the target sample.
///
/// The caller is responsible for then skipping forward, within the frames
/// decoded from that position, to reach `target` exactly.
pub fn resolve(table: &SeekTable, target: u64) -> Option<(u64, u64)> {
    table
        .point_at_or_before(target)
        .map(|point| (point.offset, point.sample))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_seek_table_builder_stride() {
        let mut builder = SeekTableBuilder::new(10);
        for i in 0..25u64 {
            builder.observe_frame(i * 4096, i * 5000, 4096);
        }
        let table = builder.finish();
        assert_eq!(table.points.len(), 3);
        assert_eq!(table.points[0].sample, 0);
        assert_eq!(table.points[1].sample, 10 * 4096);
        assert_eq!(table.points[2].sample, 20 * 4096);
    }

    #[test]
    fn verify_resolve_picks_point_at_or_before() {
        let table = SeekTable {
            points: vec![
                SeekPoint { sample: 0, offset: 0, frame_samples: 4096 },
                SeekPoint { sample: 4096, offset: 5000, frame_samples: 4096 },
                SeekPoint { sample: 8192, offset: 10000, frame_samples: 4096 },
                SeekPoint { sample: 12288, offset: 15000, frame_samples: 4096 },
            ],
        };
        let (offset, sample) = resolve(&table, 9000).unwrap();
        assert_eq!(sample, 8192);
        assert_eq!(offset, 10000);
    }

    #[test]
    fn verify_resolve_returns_none_before_first_point() {
        let table = SeekTable {
            points: vec![SeekPoint { sample: 100, offset: 0, frame_samples: 4096 }],
        };
        assert!(resolve(&table, 50).is_none());
    }
}
