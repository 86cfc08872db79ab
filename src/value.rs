use std::fmt;

/// Bit vector value of a signal, stored little endian, one byte per 8 bits.
/// Bits above `width` are always zero.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct LogicVec {
    width: u32,
    bytes: Vec<u8>,
}

impl LogicVec {
    pub fn zero(width: u32) -> Self {
        Self {
            width,
            bytes: vec![0; byte_len(width)],
        }
    }

    pub fn from_u64(width: u32, value: u64) -> Self {
        Self::from_bytes(width, &value.to_le_bytes())
    }

    pub fn from_bool(value: bool) -> Self {
        Self::from_u64(1, value as u64)
    }

    /// Missing bytes are zero, surplus bytes and bits are dropped.
    /// All bits set.
    pub fn ones(width: u32) -> Self {
        Self::from_bytes(width, &vec![0xff; byte_len(width)])
    }

    pub fn from_bytes(width: u32, bytes: &[u8]) -> Self {
        let mut vec = Self::zero(width);
        let n = vec.bytes.len().min(bytes.len());
        vec.bytes[..n].copy_from_slice(&bytes[..n]);
        vec.mask();
        vec
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Low 64 bits.
    pub fn as_u64(&self) -> u64 {
        let mut buf = [0u8; 8];
        let n = self.bytes.len().min(8);
        buf[..n].copy_from_slice(&self.bytes[..n]);
        u64::from_le_bytes(buf)
    }

    pub fn bit(&self, idx: u32) -> bool {
        if idx >= self.width {
            return false;
        }
        self.bytes[(idx / 8) as usize] & (1 << (idx % 8)) != 0
    }

    pub fn set_bit(&mut self, idx: u32, value: bool) {
        if idx >= self.width {
            return;
        }
        let byte = &mut self.bytes[(idx / 8) as usize];
        if value {
            *byte |= 1 << (idx % 8);
        } else {
            *byte &= !(1 << (idx % 8));
        }
    }

    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }


    fn mask(&mut self) {
        let rem = self.width % 8;
        if rem != 0 {
            if let Some(top) = self.bytes.last_mut() {
                *top &= (1u8 << rem) - 1;
            }
        }
    }
}

fn byte_len(width: u32) -> usize {
    width.div_ceil(8) as usize
}

impl fmt::LowerHex for LogicVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = (self.width.max(1)).div_ceil(4) as usize;
        let mut s = String::with_capacity(digits);
        for byte in self.bytes.iter().rev() {
            s.push_str(&format!("{:02x}", byte));
        }
        // drop the nibble that only exists because of byte padding
        let s = &s[s.len() - digits.min(s.len())..];
        if f.alternate() {
            f.write_str("0x")?;
        }
        f.write_str(s)
    }
}

impl fmt::Display for LogicVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self)
    }
}

impl fmt::Debug for LogicVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'h{:x}", self.width, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_to_width() {
        let v = LogicVec::from_u64(4, 0xff);
        assert_eq!(v.as_u64(), 0xf);
        assert_eq!(v.as_bytes(), &[0x0f]);
    }

    #[test]
    fn wide_values_keep_every_byte() {
        let bytes: Vec<u8> = (0..32).collect();
        let v = LogicVec::from_bytes(256, &bytes);
        assert_eq!(v.as_bytes(), bytes.as_slice());
        assert_eq!(v.as_u64(), u64::from_le_bytes([0, 1, 2, 3, 4, 5, 6, 7]));
    }

    #[test]
    fn bits() {
        let mut v = LogicVec::zero(12);
        v.set_bit(9, true);
        assert!(v.bit(9));
        assert!(!v.bit(8));
        assert_eq!(v.as_u64(), 1 << 9);
        v.set_bit(9, false);
        assert!(v.is_zero());
        v.set_bit(40, true);
        assert!(v.is_zero());
    }

    #[test]
    fn ones_reach_past_512_bits() {
        let v = LogicVec::ones(601);
        assert!(v.bit(512) && v.bit(600));
        assert_eq!(v.as_bytes().len(), 76);
        assert_eq!(v.as_bytes()[75], 0x01);
    }

    #[test]
    fn formats_as_hex() {
        assert_eq!(LogicVec::from_u64(8, 0xab).to_string(), "0xab");
        assert_eq!(LogicVec::from_u64(12, 0x5).to_string(), "0x005");
        assert_eq!(format!("{:?}", LogicVec::from_u64(1, 1)), "1'h1");
    }
}
