use byteorder::{ByteOrder, LE};

/// Packs fields of arbitrary bit width LSB-first and writes them out as
/// little-endian bytes.
#[derive(Debug, Default)]
pub struct BitPacker {
    bits: u128,
    // pending bits in `bits`, always below 64 between calls
    len: u32,
    out: Vec<u8>,
}

impl BitPacker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the low `width` bits of `value`. Widths above 64 are padded
    /// with zeroes.
    pub fn push(&mut self, value: u64, width: u32) {
        let mut value = value;
        let mut width = width;
        while width > 0 {
            let chunk = width.min(64);
            let masked = if chunk == 64 { value } else { value & ((1u64 << chunk) - 1) };
            self.bits |= u128::from(masked) << self.len;
            self.len += chunk;
            width -= chunk;
            value = value.checked_shr(chunk).unwrap_or(0);

            if self.len >= 64 {
                let mut bytes = [0u8; 8];
                LE::write_u64(&mut bytes, self.bits as u64);
                self.out.extend_from_slice(&bytes);
                self.bits >>= 64;
                self.len -= 64;
            }
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.push(u64::from(*byte), 8);
        }
    }

    /// Flushes pending bits, zero padding to a byte boundary.
    pub fn align(&mut self) {
        if self.len == 0 {
            return;
        }
        let count = self.len.div_ceil(8) as usize;
        let mut bytes = [0u8; 16];
        LE::write_u128(&mut bytes, self.bits);
        self.out.extend_from_slice(&bytes[..count]);
        self.bits = 0;
        self.len = 0;
    }

    // bytes written so far, counting a partial byte as whole
    pub fn len(&self) -> usize {
        self.out.len() + self.len.div_ceil(8) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.align();
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibbles_share_a_byte() {
        let mut packer = BitPacker::new();
        packer.push(1, 4);
        packer.push(2, 4);
        assert_eq!(packer.finish(), vec![0x21]);
    }

    #[test]
    fn test_little_endian() {
        let mut packer = BitPacker::new();
        packer.push(0x0102, 16);
        packer.push(0xAABBCCDD, 32);
        assert_eq!(packer.finish(), vec![0x02, 0x01, 0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_align_pads_partial_byte() {
        let mut packer = BitPacker::new();
        packer.push(0b101, 3);
        assert_eq!(packer.len(), 1);
        packer.align();
        packer.push(0xFF, 8);
        assert_eq!(packer.finish(), vec![0b101, 0xFF]);
    }

    #[test]
    fn test_wide_and_masked_values() {
        let mut packer = BitPacker::new();
        // only the low four bits survive
        packer.push(0xF3, 4);
        packer.push(u64::MAX, 64);
        packer.push(0, 4);
        let out = packer.finish();
        assert_eq!(out.len(), 9);
        assert_eq!(out[0], 0xF3);
        assert!(out[1..8].iter().all(|byte| *byte == 0xFF));
        assert_eq!(out[8], 0x0F);

        let mut packer = BitPacker::new();
        packer.push(7, 80);
        assert_eq!(packer.finish(), [7, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }
}
