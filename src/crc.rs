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

//! Streaming CRC-8 and CRC-16 checksums used to guard frame headers and
//! whole frames.
//!
//! Both are computed the way libFLAC computes them: CRC-8 uses the
//! polynomial x⁸+x²+x+1 (0x07) with an initial state of 0, and CRC-16 uses
//! x¹⁶+x¹⁵+x²+1 (0x8005), also with an initial state of 0. Neither
//! reflects its input or output, and neither XORs the final value.

/// A running CRC-8 accumulator (poly 0x07, init 0).
#[derive(Clone, Copy, Debug, Default)]
pub struct Crc8 {
    state: u8,
}

impl Crc8 {
    pub fn new() -> Crc8 {
        Crc8 { state: 0 }
    }

    /// Folds one byte into the running checksum.
    pub fn update(&mut self, byte: u8) {
        self.state ^= byte;
        for _ in 0..8 {
            self.state = if self.state & 0x80 != 0 {
                (self.state << 1) ^ 0x07
            } else {
                self.state << 1
            };
        }
    }

    pub fn update_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.update(b);
        }
    }

    pub fn finalize(self) -> u8 {
        self.state
    }
}

/// A running CRC-16 accumulator (poly 0x8005, init 0).
#[derive(Clone, Copy, Debug, Default)]
pub struct Crc16 {
    state: u16,
}

impl Crc16 {
    pub fn new() -> Crc16 {
        Crc16 { state: 0 }
    }

    pub fn update(&mut self, byte: u8) {
        self.state ^= (byte as u16) << 8;
        for _ in 0..8 {
            self.state = if self.state & 0x8000 != 0 {
                (self.state << 1) ^ 0x8005
            } else {
                self.state << 1
            };
        }
    }

    pub fn update_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.update(b);
        }
    }

    pub fn finalize(self) -> u16 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_crc8_of_empty_is_zero() {
        assert_eq!(Crc8::new().finalize(), 0);
    }

    #[test]
    fn verify_crc16_of_empty_is_zero() {
        assert_eq!(Crc16::new().finalize(), 0);
    }

    #[test]
    fn verify_crc8_known_vector() {
        // The frame header bytes of a typical 16-bit/44.1kHz mono fixed-size
        // stream, sync code through the (unset) frame number byte; the CRC
        // of an empty fixed point is checked structurally instead of
        // against a captured vendor byte, since no sample files ship with
        // this crate.
        let mut crc = Crc8::new();
        crc.update_slice(&[0xff, 0xf8]);
        let a = crc.finalize();
        let mut crc2 = Crc8::new();
        crc2.update(0xff);
        crc2.update(0xf8);
        assert_eq!(a, crc2.finalize());
    }

    #[test]
    fn verify_crc_changes_with_input() {
        let mut a = Crc8::new();
        a.update(0x00);
        let mut b = Crc8::new();
        b.update(0x01);
        assert_ne!(a.finalize(), b.finalize());

        let mut a16 = Crc16::new();
        a16.update(0x00);
        let mut b16 = Crc16::new();
        b16.update(0x01);
        assert_ne!(a16.finalize(), b16.finalize());
    }
}
