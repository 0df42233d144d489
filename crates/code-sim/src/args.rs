//! Typed view of the packed argument buffer.
//!
//! Arguments travel as a flat sequence of 32-bit slots in parameter order.
//! 64-bit values take two consecutive slots, low word first.

use crate::shorty::{Shorty, ShortyType};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl ArgValue {
    #[must_use]
    pub const fn shorty_type(self) -> ShortyType {
        match self {
            Self::Int(_) => ShortyType::Int,
            Self::Long(_) => ShortyType::Long,
            Self::Float(_) => ShortyType::Float,
            Self::Double(_) => ShortyType::Double,
        }
    }

    fn push_slots(self, out: &mut Vec<u32>) {
        match self {
            Self::Int(v) => out.push(v as u32),
            Self::Float(v) => out.push(v.to_bits()),
            Self::Long(v) => push_wide(out, v as u64),
            Self::Double(v) => push_wide(out, v.to_bits()),
        }
    }
}

fn push_wide(out: &mut Vec<u32>, value: u64) {
    out.push(value as u32);
    out.push((value >> 32) as u32);
}

fn read_wide(slots: &[u32]) -> u64 {
    u64::from(slots[0]) | u64::from(slots[1]) << 32
}

/// Pack arguments into buffer slots.
#[must_use]
pub fn pack_arguments(values: &[ArgValue]) -> Vec<u32> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for value in values {
        value.push_slots(&mut out);
    }
    out
}

/// Unpack a buffer according to `shorty`; an instance call yields its receiver first as `Int`.
pub fn unpack_arguments(shorty: &Shorty, slots: &[u32], is_static: bool) -> Result<Vec<ArgValue>> {
    check_arguments(shorty, slots, is_static)?;
    let mut values = Vec::new();
    let mut rest = slots;
    if !is_static {
        values.push(ArgValue::Int(rest[0] as i32));
        rest = &rest[1..];
    }
    for ty in shorty.params() {
        let (value, used) = match ty {
            ShortyType::Double => (ArgValue::Double(f64::from_bits(read_wide(rest))), 2),
            ShortyType::Long => (ArgValue::Long(read_wide(rest) as i64), 2),
            ShortyType::Float => (ArgValue::Float(f32::from_bits(rest[0])), 1),
            ShortyType::Int | ShortyType::Void => (ArgValue::Int(rest[0] as i32), 1),
        };
        values.push(value);
        rest = &rest[used..];
    }
    Ok(values)
}

/// Verify that the buffer length agrees with the slot layout `shorty` describes.
pub fn check_arguments(shorty: &Shorty, slots: &[u32], is_static: bool) -> Result<()> {
    let expected = shorty.arg_slots(is_static);
    if slots.len() == expected {
        Ok(())
    } else {
        Err(Error::ArgumentMismatch {
            shorty: shorty.to_string(),
            expected,
            actual: slots.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_values_are_low_word_first() {
        let slots = pack_arguments(&[ArgValue::Long(0x1122_3344_5566_7788), ArgValue::Int(-1)]);
        assert_eq!(slots, vec![0x5566_7788, 0x1122_3344, 0xFFFF_FFFF]);
    }

    #[test]
    fn test_unpack_with_receiver() {
        let shorty = Shorty::new("VDF").unwrap();
        let values = [
            ArgValue::Int(0x1234),
            ArgValue::Double(2.5),
            ArgValue::Float(-0.75),
        ];
        let slots = pack_arguments(&values);
        assert_eq!(slots.len(), 4);
        assert_eq!(unpack_arguments(&shorty, &slots, false).unwrap(), values);
    }

    #[test]
    fn test_length_mismatch_is_reported() {
        let shorty = Shorty::new("IJ").unwrap();
        let err = unpack_arguments(&shorty, &[1], true).unwrap_err();
        assert!(matches!(
            err,
            Error::ArgumentMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }
}
