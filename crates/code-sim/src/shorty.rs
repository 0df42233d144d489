//! Shorty descriptors: compact method signatures.
//!
//! The first character is the return type, the rest are parameter types.
//! Only the register class and slot width matter to the call bridge, so all
//! 32-bit integral types and references collapse into [`ShortyType::Int`].

use std::fmt;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortyType {
    Void,
    Double,
    Float,
    Long,
    /// Any 32-bit integral value or object reference.
    Int,
}

impl ShortyType {
    #[must_use]
    pub const fn from_char(c: char) -> Self {
        match c {
            'V' => Self::Void,
            'D' => Self::Double,
            'F' => Self::Float,
            'J' => Self::Long,
            _ => Self::Int,
        }
    }

    /// Number of 32-bit argument buffer slots a value of this type occupies.
    #[must_use]
    pub const fn slots(self) -> usize {
        match self {
            Self::Double | Self::Long => 2,
            Self::Void => 0,
            Self::Float | Self::Int => 1,
        }
    }

    #[must_use]
    pub const fn is_floating_point(self) -> bool {
        matches!(self, Self::Double | Self::Float)
    }
}

/// A validated shorty descriptor.
///
/// The text is NUL-terminated in memory so its address can be handed to
/// compiled code as a C string.
#[derive(Clone, PartialEq, Eq)]
pub struct Shorty {
    text: Box<str>,
}

impl Shorty {
    pub fn new(text: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidShorty {
            shorty: text.to_string(),
            reason,
        };
        let mut chars = text.chars();
        if chars.next().is_none() {
            return Err(invalid("missing return type"));
        }
        if chars.any(|c| c == 'V') {
            return Err(invalid("void parameter"));
        }
        if text.contains('\0') {
            return Err(invalid("embedded NUL"));
        }
        Ok(Self {
            text: format!("{text}\0").into_boxed_str(),
        })
    }

    /// The descriptor without its terminator.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text[..self.text.len() - 1]
    }

    /// Address of the NUL-terminated descriptor, as passed in the shorty register.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.text.as_ptr() as u64
    }

    #[must_use]
    pub fn return_type(&self) -> ShortyType {
        self.as_str()
            .chars()
            .next()
            .map_or(ShortyType::Void, ShortyType::from_char)
    }

    /// Parameter types in declaration order. The receiver is not included.
    pub fn params(&self) -> impl Iterator<Item = ShortyType> + '_ {
        self.as_str().chars().skip(1).map(ShortyType::from_char)
    }

    /// Argument buffer slots the call needs, counting the receiver of an instance call.
    #[must_use]
    pub fn arg_slots(&self, is_static: bool) -> usize {
        usize::from(!is_static) + self.params().map(ShortyType::slots).sum::<usize>()
    }
}

impl fmt::Debug for Shorty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shorty({:?})", self.as_str())
    }
}

impl fmt::Display for Shorty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_and_params() {
        let shorty = Shorty::new("DJFIL").unwrap();
        assert_eq!(shorty.return_type(), ShortyType::Double);
        assert_eq!(
            shorty.params().collect::<Vec<_>>(),
            vec![
                ShortyType::Long,
                ShortyType::Float,
                ShortyType::Int,
                ShortyType::Int
            ]
        );
        assert_eq!(shorty.as_str(), "DJFIL");
    }

    #[test]
    fn test_slot_counting() {
        let shorty = Shorty::new("VJDIF").unwrap();
        assert_eq!(shorty.arg_slots(true), 6);
        assert_eq!(shorty.arg_slots(false), 7);
        assert_eq!(Shorty::new("I").unwrap().arg_slots(true), 0);
    }

    #[test]
    fn test_rejects_malformed_descriptors() {
        assert!(matches!(
            Shorty::new(""),
            Err(Error::InvalidShorty { reason: "missing return type", .. })
        ));
        assert!(matches!(
            Shorty::new("IV"),
            Err(Error::InvalidShorty { reason: "void parameter", .. })
        ));
    }

    #[test]
    fn test_address_points_at_terminated_text() {
        let shorty = Shorty::new("VF").unwrap();
        assert_eq!(shorty.address(), shorty.text.as_ptr() as u64);
        assert!(shorty.text.ends_with('\0'));
        assert_eq!(shorty.to_string(), "VF");
    }
}
