//! Signed/unsigned PCM bias conversion
//!
//! Flipping the top bit of every sample lane turns unsigned PCM into two's
//! complement PCM and back. The bulk of the buffer is processed one `u64` at a
//! time; the tail is handled byte by byte with the same lane pattern.
//!
//! 16-bit lanes are little-endian, so the bias byte is the second byte of each
//! lane.

use serde::{Deserialize, Serialize};

const WORD: usize = std::mem::size_of::<u64>();

/// Width of one PCM sample lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleWidth {
    /// 8-bit samples, bias `0x80`
    Bits8,
    /// 16-bit little-endian samples, bias `0x8000`
    Bits16,
}

impl SampleWidth {
    /// Map a byte width to a lane width
    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(SampleWidth::Bits8),
            2 => Some(SampleWidth::Bits16),
            _ => None,
        }
    }

    /// Bytes per lane
    pub fn bytes(self) -> usize {
        match self {
            SampleWidth::Bits8 => 1,
            SampleWidth::Bits16 => 2,
        }
    }

    /// Bias pattern repeated across one machine word
    fn word_pattern(self) -> u64 {
        match self {
            SampleWidth::Bits8 => 0x8080_8080_8080_8080,
            SampleWidth::Bits16 => u64::from_le_bytes([0x00, 0x80, 0x00, 0x80, 0x00, 0x80, 0x00, 0x80]),
        }
    }

    /// Bias for the byte at `offset` within the buffer
    #[inline]
    fn byte_bias(self, offset: usize) -> u8 {
        match self {
            SampleWidth::Bits8 => 0x80,
            SampleWidth::Bits16 if offset % 2 == 1 => 0x80,
            SampleWidth::Bits16 => 0x00,
        }
    }
}

/// Sign representation produced by a sample generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Signedness {
    /// Unsigned PCM, silence at mid-scale
    #[default]
    Unsigned,
    /// Two's complement PCM, silence at zero
    Signed,
}

impl Signedness {
    /// Byte value of silence for 8-bit samples in this representation
    pub fn silence_byte(self) -> u8 {
        match self {
            Signedness::Unsigned => 0x80,
            Signedness::Signed => 0x00,
        }
    }
}

/// Toggle the sign representation of every sample in `buffer` in place.
///
/// Applying it twice restores the original bytes.
pub fn convert_sign(buffer: &mut [u8], width: SampleWidth) {
    let pattern = width.word_pattern();
    let mut words = buffer.chunks_exact_mut(WORD);
    for word in &mut words {
        let mut bytes = [0u8; WORD];
        bytes.copy_from_slice(word);
        let flipped = u64::from_le_bytes(bytes) ^ pattern;
        word.copy_from_slice(&flipped.to_le_bytes());
    }

    // WORD is a multiple of every lane width, so the tail starts on a lane boundary
    for (offset, byte) in words.into_remainder().iter_mut().enumerate() {
        *byte ^= width.byte_bias(offset);
    }
}
