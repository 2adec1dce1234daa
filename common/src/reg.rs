//! Register bit-field helpers.
//!
//! Hardware registers are 64 bits wide and are always updated with a
//! read-modify-write of a single field at a time.

/// A contiguous bit field inside a 64-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    shift: u32,
    width: u32,
}

impl Field {
    /// Create a field `width` bits wide starting at bit `shift`.
    pub const fn new(shift: u32, width: u32) -> Self {
        assert!(width > 0 && shift + width <= 64);
        Self { shift, width }
    }

    /// Single-bit field.
    pub const fn bit(shift: u32) -> Self {
        Self::new(shift, 1)
    }

    /// Mask of the field in register position.
    pub const fn mask(&self) -> u64 {
        if self.width == 64 {
            u64::MAX
        } else {
            ((1u64 << self.width) - 1) << self.shift
        }
    }

    /// Largest value the field can hold.
    pub const fn max(&self) -> u64 {
        self.mask() >> self.shift
    }

    /// Extract the field from a register word.
    pub const fn get(&self, word: u64) -> u64 {
        (word & self.mask()) >> self.shift
    }

    /// Return `word` with the field replaced by `value`.
    ///
    /// Bits of `value` that do not fit are dropped.
    pub const fn update(&self, word: u64, value: u64) -> u64 {
        (word & !self.mask()) | ((value << self.shift) & self.mask())
    }

    /// The field set to `value` in an otherwise zero word.
    pub const fn set(&self, value: u64) -> u64 {
        self.update(0, value)
    }
}

/// Integer division rounding up.
pub const fn div_round_up(n: u64, d: u64) -> u64 {
    n.div_ceil(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_update_only_touches_its_bits() {
        let f = Field::new(8, 4);
        assert_eq!(f.mask(), 0xF00);
        assert_eq!(f.update(0xFFFF_FFFF, 0x3), 0xFFFF_F3FF);
        assert_eq!(f.get(0xABCD), 0xB);
    }

    #[test]
    fn field_update_truncates_wide_values() {
        let f = Field::new(4, 2);
        assert_eq!(f.set(0xFF), 0x30);
        assert_eq!(f.max(), 3);
    }

    #[test]
    fn full_width_field() {
        let f = Field::new(0, 64);
        assert_eq!(f.mask(), u64::MAX);
        assert_eq!(f.get(0x1234), 0x1234);
    }

    #[test]
    fn round_up() {
        assert_eq!(div_round_up(0, 10), 0);
        assert_eq!(div_round_up(1, 10), 1);
        assert_eq!(div_round_up(10, 10), 1);
        assert_eq!(div_round_up(11, 10), 2);
    }
}
