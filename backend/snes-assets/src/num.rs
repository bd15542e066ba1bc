use std::ops::RangeInclusive;

pub trait GetBit {
    #[must_use]
    fn bit(self, i: u8) -> bool;

    #[must_use]
    fn bits(self, range: RangeInclusive<u8>) -> Self;
}

macro_rules! impl_get_bit {
    ($t:ty) => {
        impl GetBit for $t {
            #[inline]
            fn bit(self, i: u8) -> bool {
                debug_assert!(i < (<$t>::BITS as u8));
                self & (1 << i) != 0
            }

            #[inline]
            fn bits(self, range: RangeInclusive<u8>) -> Self {
                let start = *range.start();
                let end = *range.end();
                debug_assert!(end < (<$t>::BITS as u8));

                (self >> start) & ((1 << (end - start + 1)) - 1)
            }
        }
    };
}

impl_get_bit!(u8);
impl_get_bit!(u16);

/// Read a little-endian word; callers are responsible for bounds.
#[inline]
#[must_use]
pub fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
pub fn write_u16_le(data: &mut [u8], offset: usize, value: u16) {
    let [lsb, msb] = value.to_le_bytes();
    data[offset] = lsb;
    data[offset + 1] = msb;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn bit_ranges() {
        assert_eq!(0b1011_0100_u8.bits(4..=7), 0b1011);
        assert_eq!(0x7C00_u16.bits(10..=14), 0x1F);
        assert!(0x8000_u16.bit(15));
        assert!(!0x8000_u16.bit(14));
    }

    #[test]
    fn little_endian_words() {
        let mut data = [0_u8; 4];
        write_u16_le(&mut data, 1, 0xBEEF);
        assert_eq!(data, [0x00, 0xEF, 0xBE, 0x00]);
        assert_eq!(read_u16_le(&data, 1), 0xBEEF);
    }
}
