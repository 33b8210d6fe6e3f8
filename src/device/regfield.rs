//! Register bit-field model.
//!
//! A [`RegField`] names a bit-field inside a 32-bit register: the field's
//! least significant bit and the (already shifted) mask. Offsets live next
//! to the fields in the module descriptors, see [`super::modules`].
//!
//! ```text
//!   31                 lsb+w-1        lsb            0
//!  +-----------------+--------------+--------------+
//!  |   other fields  |    field     |    other     |
//!  +-----------------+--------------+--------------+
//!                     <--- mask --->
//! ```
//!
//! Encoding checks precision first: a value that needs more bits than the
//! field provides is rejected with [`Error::PrecisionExceeded`] instead of
//! being silently truncated by the mask.

use crate::error::{Error, Result};

/// Highest valid bit index of an array register.
pub const MAX_VALID_BIT: u8 = 31;

/// Number of bits needed to represent `value` (0 needs none).
#[inline]
pub const fn bit_width(value: u32) -> u32 {
    32 - value.leading_zeros()
}

/// Bit-field inside a 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegField {
    /// Least significant bit of the field
    pub lsb: u8,
    /// Field mask, already shifted into position
    pub mask: u32,
}

impl RegField {
    /// Field with an explicit lsb and shifted mask.
    pub const fn new(lsb: u8, mask: u32) -> Self {
        Self { lsb, mask }
    }

    /// Single-bit field at `lsb`.
    pub const fn bit(lsb: u8) -> Self {
        Self { lsb, mask: 1 << lsb }
    }

    /// `width`-bit field starting at `lsb`.
    pub const fn bits(lsb: u8, width: u8) -> Self {
        let raw = if width >= 32 { u32::MAX } else { (1u32 << width) - 1 };
        Self { lsb, mask: raw << lsb }
    }

    /// Bits available to a value: limited by both the mask and the
    /// architecture's highest valid bit index.
    pub const fn available_bits(&self) -> u32 {
        let headroom = if self.lsb > MAX_VALID_BIT {
            0
        } else {
            (MAX_VALID_BIT - self.lsb) as u32 + 1
        };
        let width = self.mask.count_ones();
        if width < headroom {
            width
        } else {
            headroom
        }
    }

    /// True when `value` cannot be represented in this field.
    pub const fn exceeds_precision(&self, value: u32) -> bool {
        bit_width(value) > self.available_bits()
    }

    /// Shift `value` into position.
    pub fn encode(&self, value: u32) -> Result<u32> {
        if self.exceeds_precision(value) {
            return Err(Error::PrecisionExceeded {
                value,
                lsb: self.lsb,
                mask: self.mask,
            });
        }
        Ok(value.checked_shl(self.lsb as u32).unwrap_or(0) & self.mask)
    }

    /// Extract the field from a register word.
    pub const fn decode(&self, word: u32) -> u32 {
        match (word & self.mask).checked_shr(self.lsb as u32) {
            Some(v) => v,
            None => 0,
        }
    }

    /// Replace the field inside an existing register word.
    pub fn set(&self, word: u32, value: u32) -> Result<u32> {
        Ok((word & !self.mask) | self.encode(value)?)
    }

    /// True when any bit of the field is set in `word`.
    pub const fn is_set(&self, word: u32) -> bool {
        word & self.mask != 0
    }

    /// Register value with the whole field set, or cleared.
    pub const fn flag(&self, enable: bool) -> u32 {
        if enable {
            self.mask
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_width() {
        assert_eq!(bit_width(0), 0);
        assert_eq!(bit_width(1), 1);
        assert_eq!(bit_width(0x7F), 7);
        assert_eq!(bit_width(0x80), 8);
        assert_eq!(bit_width(u32::MAX), 32);
    }

    #[test]
    fn test_constructors_agree() {
        assert_eq!(RegField::bit(15), RegField::new(15, 0x8000));
        assert_eq!(RegField::bits(8, 7), RegField::new(8, 0x7F00));
        assert_eq!(RegField::bits(0, 32), RegField::new(0, u32::MAX));
    }

    #[test]
    fn test_encode_decode_fitting_values() {
        let fields = [
            RegField::bit(0),
            RegField::bit(31),
            RegField::bits(8, 7),
            RegField::bits(1, 7),
            RegField::bits(0, 32),
            RegField::bits(24, 8),
        ];
        for field in fields {
            let max = if field.available_bits() == 32 {
                u32::MAX
            } else {
                (1u32 << field.available_bits()) - 1
            };
            for value in [0, 1, max / 2, max] {
                let word = field.encode(value).unwrap();
                assert_eq!(word & !field.mask, 0, "encode leaked outside {:?}", field);
                assert_eq!(field.decode(word), value, "field {:?} value {}", field, value);
            }
        }
    }

    #[test]
    fn test_precision_exceeded_on_overflow() {
        let field = RegField::bits(8, 7);
        assert!(field.encode(0x7F).is_ok());
        let err = field.encode(0x80).unwrap_err();
        assert_eq!(err, Error::PrecisionExceeded { value: 0x80, lsb: 8, mask: 0x7F00 });
    }

    #[test]
    fn test_precision_limited_by_max_bit_index() {
        // Mask claims 8 bits but only bits 28..=31 exist above lsb 28.
        let field = RegField::new(28, 0xF000_0000);
        assert_eq!(field.available_bits(), 4);
        assert!(field.encode(0xF).is_ok());
        assert!(field.encode(0x10).is_err());

        let beyond = RegField::new(32, 0);
        assert_eq!(beyond.available_bits(), 0);
        assert!(beyond.encode(0).is_ok());
        assert!(beyond.encode(1).is_err());
    }

    #[test]
    fn test_precision_iff_width_exceeds_available() {
        for lsb in 0..32u8 {
            for width in 1..=(32 - lsb) {
                let field = RegField::bits(lsb, width);
                for value in [0u32, 1, 2, 3, 0x7F, 0x80, 0xFFFF, u32::MAX] {
                    let expect_err = bit_width(value) > width as u32;
                    assert_eq!(field.encode(value).is_err(), expect_err,
                        "lsb {} width {} value 0x{:X}", lsb, width, value);
                }
            }
        }
    }

    #[test]
    fn test_set_preserves_other_bits() {
        let field = RegField::bits(8, 7);
        let word = field.set(0xFFFF_00FF, 0x12).unwrap();
        assert_eq!(word, 0xFFFF_12FF);
        assert_eq!(field.decode(word), 0x12);
        assert!(field.set(0, 0x100).is_err());
    }

    #[test]
    fn test_flag_and_is_set() {
        let bit = RegField::bit(15);
        assert_eq!(bit.flag(true), 0x8000);
        assert_eq!(bit.flag(false), 0);
        assert!(bit.is_set(0x8001));
        assert!(!bit.is_set(0x7FFF));
    }
}
