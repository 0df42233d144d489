//! Boxed call results.

use crate::abi::RETURN_REG;
use crate::engine::RegisterFile;
use crate::shorty::ShortyType;

/// Tagged union holding a managed method's return value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum JValue {
    #[default]
    Void,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl JValue {
    /// Narrow to 32 bits. Integral results are extracted as 64-bit `Long`,
    /// so callers whose declared return type is 32-bit use this.
    #[must_use]
    pub fn as_i32(self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(v),
            Self::Long(v) => Some(v as i32),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(i64::from(v)),
            Self::Long(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f32(self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(v),
            _ => None,
        }
    }
}

/// Store the return value described by `return_type` into `result`.
///
/// Void leaves `result` untouched. Every non-floating type reads all of x0
/// as a `Long`; narrowing is the caller's job.
pub fn extract_result(result: &mut JValue, return_type: ShortyType, regs: &RegisterFile) {
    match return_type {
        ShortyType::Void => {}
        ShortyType::Double => *result = JValue::Double(regs.read_d(RETURN_REG)),
        ShortyType::Float => *result = JValue::Float(regs.read_s(RETURN_REG)),
        ShortyType::Long | ShortyType::Int => {
            *result = JValue::Long(regs.read_x(RETURN_REG) as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_leaves_result_untouched() {
        let mut result = JValue::Int(5);
        let mut regs = RegisterFile::new();
        regs.write_x(0, 99);
        extract_result(&mut result, ShortyType::Void, &regs);
        assert_eq!(result, JValue::Int(5));
    }

    #[test]
    fn test_int_reads_full_x0() {
        let mut result = JValue::Void;
        let mut regs = RegisterFile::new();
        regs.write_x(0, 0xFFFF_FFFF_0000_0007);
        extract_result(&mut result, ShortyType::Int, &regs);
        assert_eq!(result, JValue::Long(0xFFFF_FFFF_0000_0007_u64 as i64));
        assert_eq!(result.as_i32(), Some(7));
    }

    #[test]
    fn test_floating_point_reads_matching_width() {
        let mut regs = RegisterFile::new();
        regs.write_d(0, 3.25);
        let mut result = JValue::Void;
        extract_result(&mut result, ShortyType::Double, &regs);
        assert_eq!(result.as_f64(), Some(3.25));

        regs.write_s(0, -1.5);
        extract_result(&mut result, ShortyType::Float, &regs);
        assert_eq!(result.as_f32(), Some(-1.5));
    }
}
