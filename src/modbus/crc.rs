//! Streaming CRC-16 for Modbus RTU (polynomial 0xA001, LSB first).

/// CRC accumulator with a 2-byte trailing lag.
///
/// Feed every received byte through [`Crc::feed`], including the frame's
/// own trailing CRC: the update is applied to the byte two positions
/// behind the current one, so the final two bytes of the stream are kept
/// back as "the CRC to verify" instead of being folded in.
pub struct Crc {
    crc: u16,
    count: u8,
    n_minus_1: u8,
    n_minus_2: u8,
}

impl Crc {
    pub const fn new() -> Self {
        Self {
            crc: 0xFFFF,
            count: 0,
            n_minus_1: 0,
            n_minus_2: 0,
        }
    }

    pub fn reset(&mut self) {
        self.crc = 0xFFFF;
        self.count = 0;
    }

    /// Pipeline one received byte.
    pub fn feed(&mut self, byte: u8) {
        if self.count >= 2 {
            let lagged = self.n_minus_2;
            self.update(lagged);
        } else {
            self.count += 1;
        }

        self.n_minus_2 = self.n_minus_1;
        self.n_minus_1 = byte;
    }

    /// Whether the two most recent bytes equal the computed CRC, in
    /// received order: low byte before high byte.
    pub fn check(&self) -> bool {
        let [lsb, msb] = self.crc.to_le_bytes();
        msb == self.n_minus_1 && lsb == self.n_minus_2
    }

    /// One-shot CRC over a complete buffer, from a fresh state. Used when
    /// generating an outgoing frame's trailing CRC.
    pub fn checksum(buffer: &[u8]) -> u16 {
        let mut crc = Self::new();
        for &byte in buffer {
            crc.update(byte);
        }
        crc.crc
    }

    fn update(&mut self, byte: u8) {
        self.crc ^= byte as u16;

        for _ in 0..8 {
            if self.crc & 1 != 0 {
                self.crc = (self.crc >> 1) ^ 0xA001;
            } else {
                self.crc >>= 1;
            }
        }
    }
}

impl Default for Crc {
    fn default() -> Self {
        Self::new()
    }
}
