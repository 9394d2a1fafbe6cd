// Archasm: toolchain for small custom CPU architectures
// Assembler, instruction encoders and a reversible emulator
//
// Designed & written in 2021 by
//     the Archasm contributors

//! Fixed-width unsigned word domains

/// Unsigned integer domain of one of the supported widths.
///
/// Values are always carried around as `u64` and masked down to the word width at the point
/// where they are stored.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
pub enum WordType {
    #[display("u8")]
    U8,
    #[display("u16")]
    U16,
    #[display("u32")]
    U32,
    #[display("u64")]
    U64,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum WordError {
    /// word of type {ty} requires exactly {expected} bytes, while {found} bytes were given
    SizeMismatch { ty: WordType, expected: usize, found: usize },

    /// unsupported word width of {0} bits
    UnsupportedWidth(u32),
}

impl TryFrom<u32> for WordType {
    type Error = WordError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(WordType::U8),
            16 => Ok(WordType::U16),
            32 => Ok(WordType::U32),
            64 => Ok(WordType::U64),
            other => Err(WordError::UnsupportedWidth(other)),
        }
    }
}

impl WordType {
    pub const fn all() -> [WordType; 4] {
        [WordType::U8, WordType::U16, WordType::U32, WordType::U64]
    }

    pub const fn bits(self) -> u32 {
        match self {
            WordType::U8 => 8,
            WordType::U16 => 16,
            WordType::U32 => 32,
            WordType::U64 => 64,
        }
    }

    #[inline]
    pub const fn bytes(self) -> usize { self.bits() as usize / 8 }

    /// All-ones value of this width
    pub const fn mask(self) -> u64 {
        match self {
            WordType::U64 => u64::MAX,
            other => (1u64 << other.bits()) - 1,
        }
    }

    #[inline]
    pub const fn sign_bit(self) -> u64 { 1u64 << (self.bits() - 1) }

    /// Truncates raw accumulator value to this width
    #[inline]
    pub const fn truncate(self, value: u64) -> u64 { value & self.mask() }

    /// Truncates a wide (carry-capturing) accumulator to this width
    #[inline]
    pub const fn truncate_wide(self, value: u128) -> u64 { (value as u64) & self.mask() }

    #[inline]
    pub const fn fits(self, value: u64) -> bool { value & !self.mask() == 0 }

    #[inline]
    pub const fn is_negative(self, value: u64) -> bool { value & self.sign_bit() != 0 }

    /// Interprets the value as two's complement number of this width
    pub const fn to_signed(self, value: u64) -> i64 {
        let value = self.truncate(value);
        match self {
            WordType::U8 => value as u8 as i8 as i64,
            WordType::U16 => value as u16 as i16 as i64,
            WordType::U32 => value as u32 as i32 as i64,
            WordType::U64 => value as i64,
        }
    }

    /// Packs the value (truncated to the width) into little-endian byte sequence of exactly
    /// [`WordType::bytes`] length.
    pub fn pack(self, value: u64) -> Vec<u8> {
        self.truncate(value).to_le_bytes()[..self.bytes()].to_vec()
    }

    /// Unpacks little-endian byte sequence, which must have exactly [`WordType::bytes`] length.
    pub fn unpack(self, bytes: &[u8]) -> Result<u64, WordError> {
        if bytes.len() != self.bytes() {
            return Err(WordError::SizeMismatch {
                ty: self,
                expected: self.bytes(),
                found: bytes.len(),
            });
        }
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn masks() {
        assert_eq!(WordType::U8.mask(), 0xFF);
        assert_eq!(WordType::U16.mask(), 0xFFFF);
        assert_eq!(WordType::U32.mask(), 0xFFFF_FFFF);
        assert_eq!(WordType::U64.mask(), u64::MAX);
        assert_eq!(WordType::U8.truncate(257), 1);
        assert_eq!(WordType::U8.to_signed(0xFF), -1);
        assert_eq!(WordType::U16.to_signed(0x7FFF), 0x7FFF);
    }

    #[test]
    fn unpack_wrong_size() {
        assert_eq!(
            WordType::U16.unpack(&[1, 2, 3]),
            Err(WordError::SizeMismatch { ty: WordType::U16, expected: 2, found: 3 })
        );
        assert!(WordType::U8.unpack(&[]).is_err());
    }

    #[test]
    fn width_from_bits() {
        assert_eq!(WordType::try_from(32), Ok(WordType::U32));
        assert_eq!(WordType::try_from(12), Err(WordError::UnsupportedWidth(12)));
    }

    proptest! {
        #[test]
        fn pack_unpack(value in any::<u64>(), idx in 0usize..4) {
            let ty = WordType::all()[idx];
            let value = ty.truncate(value);
            let packed = ty.pack(value);
            prop_assert_eq!(packed.len(), ty.bytes());
            prop_assert_eq!(ty.unpack(&packed), Ok(value));
        }
    }
}
