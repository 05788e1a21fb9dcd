use std::fmt::Debug;

use crate::config::arch_config::{SignedWordType, WordType, XLEN};

pub fn sign_extend(value: WordType, from_bits: u32) -> WordType {
    let sign_bit = XLEN as u32 - from_bits;
    ((value << sign_bit) as SignedWordType >> sign_bit) as WordType
}

pub fn sign_extend_u32(value: u32) -> WordType {
    sign_extend(value as WordType, 32)
}

/// Value that can live in emulated memory, stored little-endian.
pub trait MemValue: Copy + Debug + Default {
    const SIZE: usize;

    fn from_le_slice(bytes: &[u8]) -> Self;
    fn write_le_slice(self, out: &mut [u8]);
}

macro_rules! impl_mem_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl MemValue for $t {
                const SIZE: usize = size_of::<$t>();

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..size_of::<$t>()]);
                    <$t>::from_le_bytes(buf)
                }

                fn write_le_slice(self, out: &mut [u8]) {
                    out[..size_of::<$t>()].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_mem_value!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0xfff, 12), WordType::MAX);
        assert_eq!(sign_extend(0x7ff, 12), 0x7ff);
        assert_eq!(sign_extend(0x1000, 13) as SignedWordType, -4096);
        assert_eq!(sign_extend_u32(0x8000_0000), 0xffff_ffff_8000_0000);
    }

    #[test]
    fn test_mem_value_little_endian() {
        let mut buf = [0u8; 8];
        0x1122_3344u32.write_le_slice(&mut buf);
        assert_eq!(buf[..4], [0x44, 0x33, 0x22, 0x11]);
        assert_eq!(u16::from_le_slice(&buf), 0x3344);
        assert_eq!(i8::from_le_slice(&buf[3..]), 0x11);

        (-1.5f64).write_le_slice(&mut buf);
        assert_eq!(f64::from_le_slice(&buf), -1.5);
    }
}
