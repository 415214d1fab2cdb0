//! CRC16 accumulator used to seal every command exchange.
//!
//! The radar appends the CRC16 of all transmitted bytes after the payload and
//! expects the host to do the same. Because the checksum is transmitted
//! big-endian right after the data it covers, running the accumulator over a
//! complete received frame (ACK + payload + CRC) yields residue zero for a
//! valid frame.

/// CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF, no
/// reflection, no final XOR.
const CRC16_POLY: u16 = 0x1021;
const CRC16_INIT: u16 = 0xFFFF;

#[derive(Debug, Clone)]
pub struct Crc16 {
    value: u16,
}

impl Crc16 {
    pub fn new() -> Self {
        Crc16 { value: CRC16_INIT }
    }

    /// Restart the accumulator. Called once per exchange.
    pub fn reset(&mut self) {
        self.value = CRC16_INIT;
    }

    /// Feed a buffer segment. May be called several times within one
    /// exchange; the running value carries over.
    pub fn process(&mut self, data: &[u8]) {
        for &byte in data {
            self.value ^= (byte as u16) << 8;
            for _ in 0..8 {
                if self.value & 0x8000 != 0 {
                    self.value = (self.value << 1) ^ CRC16_POLY;
                } else {
                    self.value <<= 1;
                }
            }
        }
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    /// Checksum as the two bytes that go on the wire, most significant first.
    pub fn value_bytes(&self) -> [u8; 2] {
        self.value.to_be_bytes()
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot helper for building synthetic frames (tests, fixtures).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    crc.process(data);
    crc.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_check_value() {
        // Standard CCITT-FALSE check input.
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn appended_crc_reduces_to_zero() {
        let mut frame = vec![0x00, 0x01, 0xAB, 0xCD, 0x12];
        let mut crc = Crc16::new();
        crc.process(&frame);
        frame.extend_from_slice(&crc.value_bytes());
        assert_eq!(crc16(&frame), 0);
    }

    #[test]
    fn single_bit_flip_breaks_residue() {
        // Pseudo-random frames of varying length, every bit position flipped.
        let mut seed = 0x2F6E2B1u32;
        for len in 1..24usize {
            let mut frame: Vec<u8> = (0..len)
                .map(|_| {
                    seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
                    (seed >> 24) as u8
                })
                .collect();
            let crc = crc16(&frame);
            frame.extend_from_slice(&crc.to_be_bytes());
            for byte in 0..frame.len() {
                for bit in 0..8 {
                    frame[byte] ^= 1 << bit;
                    assert_ne!(crc16(&frame), 0, "flip at byte {byte} bit {bit}");
                    frame[byte] ^= 1 << bit;
                }
            }
        }
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data = b"incremental segments must not change the value";
        let mut crc = Crc16::new();
        crc.process(&data[..10]);
        crc.process(&data[10..23]);
        crc.process(&data[23..]);
        assert_eq!(crc.value(), crc16(data));
    }
}
