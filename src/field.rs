//! Arithmetic over prime fields `Fp` with `p < 2^63`, together with the fixed-width serializer.

use std::{
    fmt,
    ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign},
};

use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    channel::{self, ErrorKind},
    error::Error,
};

/// The Mersenne prime `2^61 - 1`.
pub const MODULUS_61: u64 = (1 << 61) - 1;

/// A 61-bit safe prime `p`, i.e. `(p - 1) / 2` is prime as well.
pub const SAFE_PRIME_61: u64 = 2_305_843_009_213_691_579;

/// Describes the field all secret-shared values of a computation live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    modulus: u64,
}

impl FieldDefinition {
    /// Creates a field definition for the (prime) modulus `p`, which must satisfy `2 < p < 2^63`.
    ///
    /// Primality is not checked, a composite modulus silently breaks inversion and the soundness
    /// of the MAC check.
    pub fn new(modulus: u64) -> Result<Self, Error> {
        if modulus <= 2 || modulus >= 1 << 63 {
            return Err(Error::invariant(format!(
                "modulus {modulus} is not in the supported range (2, 2^63)"
            )));
        }
        Ok(Self { modulus })
    }

    /// The field modulus.
    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// Number of bits needed to represent any element.
    pub fn bit_length(&self) -> usize {
        (u64::BITS - (self.modulus - 1).leading_zeros()) as usize
    }

    /// Reduces `value` into the field.
    pub fn element(&self, value: u64) -> FieldElement {
        FieldElement {
            value: value % self.modulus,
            modulus: self.modulus,
        }
    }

    /// Maps a signed integer into the field.
    pub fn element_signed(&self, value: i64) -> FieldElement {
        let abs = self.element(value.unsigned_abs());
        if value < 0 { -abs } else { abs }
    }

    /// The additive identity.
    pub fn zero(&self) -> FieldElement {
        self.element(0)
    }

    /// The multiplicative identity.
    pub fn one(&self) -> FieldElement {
        self.element(1)
    }

    /// Samples a uniformly random element.
    pub fn random(&self, rng: &mut (impl Rng + CryptoRng)) -> FieldElement {
        self.element(rng.random_range(0..self.modulus))
    }

    /// Samples a uniformly random element from any (possibly shared, non-crypto) RNG.
    pub(crate) fn sample(&self, rng: &mut impl Rng) -> FieldElement {
        self.element(rng.random_range(0..self.modulus))
    }

    /// Returns the serializer matching this field.
    pub fn serializer(&self) -> FieldSerializer {
        FieldSerializer {
            field: *self,
            width: self.bit_length().div_ceil(8),
        }
    }
}

/// An element of `Fp`.
///
/// Elements carry their modulus, mixing elements of different fields is a programming error and
/// caught by debug assertions.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldElement {
    value: u64,
    modulus: u64,
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl FieldElement {
    /// The canonical representative in `0..p`.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// The field this element belongs to.
    pub fn field(&self) -> FieldDefinition {
        FieldDefinition {
            modulus: self.modulus,
        }
    }

    /// Returns `true` for the additive identity.
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// The `i`-th bit (little endian) of the canonical representative.
    pub fn bit(&self, i: usize) -> bool {
        i < 64 && (self.value >> i) & 1 == 1
    }

    /// Computes `self^exp` by square and multiply.
    pub fn pow(&self, mut exp: u64) -> Self {
        let mut base = *self;
        let mut acc = self.field().one();
        while exp > 0 {
            if exp & 1 == 1 {
                acc *= base;
            }
            base *= base;
            exp >>= 1;
        }
        acc
    }

    /// The multiplicative inverse, `None` for zero.
    pub fn inverse(&self) -> Option<Self> {
        if self.is_zero() {
            None
        } else {
            Some(self.pow(self.modulus - 2))
        }
    }
}

impl Add for FieldElement {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        debug_assert_eq!(self.modulus, rhs.modulus);
        let sum = (self.value as u128 + rhs.value as u128) % self.modulus as u128;
        FieldElement {
            value: sum as u64,
            modulus: self.modulus,
        }
    }
}

impl AddAssign for FieldElement {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Neg for FieldElement {
    type Output = Self;

    fn neg(self) -> Self::Output {
        if self.value == 0 {
            self
        } else {
            FieldElement {
                value: self.modulus - self.value,
                modulus: self.modulus,
            }
        }
    }
}

impl Sub for FieldElement {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self + (-rhs)
    }
}

impl SubAssign for FieldElement {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul for FieldElement {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        debug_assert_eq!(self.modulus, rhs.modulus);
        let prod = (self.value as u128 * rhs.value as u128) % self.modulus as u128;
        FieldElement {
            value: prod as u64,
            modulus: self.modulus,
        }
    }
}

impl MulAssign for FieldElement {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

/// Converts elements to and from fixed-width big-endian byte strings.
///
/// Lists are packed without delimiters, so the reader must use a serializer of the same width as
/// the writer.
#[derive(Debug, Clone, Copy)]
pub struct FieldSerializer {
    field: FieldDefinition,
    width: usize,
}

impl FieldSerializer {
    /// Bytes per element.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Serializes a single element.
    pub fn serialize(&self, element: &FieldElement) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width);
        self.write(element, &mut out);
        out
    }

    /// Serializes a list of elements by concatenating them.
    pub fn serialize_list(&self, elements: &[FieldElement]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width * elements.len());
        for e in elements {
            self.write(e, &mut out);
        }
        out
    }

    fn write(&self, element: &FieldElement, out: &mut Vec<u8>) {
        let bytes = element.value.to_be_bytes();
        out.extend_from_slice(&bytes[8 - self.width..]);
    }

    /// Deserializes a single element, rejecting non-canonical encodings.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<FieldElement, Error> {
        if bytes.len() != self.width {
            return Err(malformed("field element", ErrorKind::InvalidLength));
        }
        let mut buf = [0u8; 8];
        buf[8 - self.width..].copy_from_slice(bytes);
        let value = u64::from_be_bytes(buf);
        if value >= self.field.modulus {
            return Err(malformed(
                "field element",
                ErrorKind::SerdeError(format!("{value} is not a canonical element")),
            ));
        }
        Ok(self.field.element(value))
    }

    /// Deserializes a concatenated list of elements.
    pub fn deserialize_list(&self, bytes: &[u8]) -> Result<Vec<FieldElement>, Error> {
        if bytes.len() % self.width != 0 {
            return Err(malformed("field element list", ErrorKind::InvalidLength));
        }
        bytes
            .chunks_exact(self.width)
            .map(|chunk| self.deserialize(chunk))
            .collect()
    }
}

/// Packs byte arrays, each prefixed with its length as a 2-byte big-endian integer.
pub fn serialize_byte_arrays(arrays: &[Vec<u8>]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(arrays.iter().map(|a| a.len() + 2).sum());
    for array in arrays {
        let len = u16::try_from(array.len()).map_err(|_| {
            Error::invariant(format!(
                "byte array of length {} exceeds the 2-byte length prefix",
                array.len()
            ))
        })?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(array);
    }
    Ok(out)
}

/// Inverse of [`serialize_byte_arrays`].
pub fn deserialize_byte_arrays(mut bytes: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let mut arrays = vec![];
    while !bytes.is_empty() {
        let [hi, lo, rest @ ..] = bytes else {
            return Err(malformed("byte array length", ErrorKind::InvalidLength));
        };
        let len = u16::from_be_bytes([*hi, *lo]) as usize;
        if rest.len() < len {
            return Err(malformed("byte array", ErrorKind::InvalidLength));
        }
        arrays.push(rest[..len].to_vec());
        bytes = &rest[len..];
    }
    Ok(arrays)
}

fn malformed(phase: &str, reason: ErrorKind) -> Error {
    Error::Network(channel::Error {
        phase: format!("decoding {phase}"),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_wraps_around_the_modulus() {
        let f = FieldDefinition::new(MODULUS_61).unwrap();
        let a = f.element(MODULUS_61 - 1);
        assert_eq!(a + f.one(), f.zero());
        assert_eq!(f.zero() - f.one(), a);
        assert_eq!(a * a, f.one());
        assert_eq!(f.element_signed(-5) + f.element(5), f.zero());
    }

    #[test]
    fn safe_prime_has_61_bits() {
        let f = FieldDefinition::new(SAFE_PRIME_61).unwrap();
        assert_eq!(f.bit_length(), 61);
        let three = f.element(3);
        assert_eq!(three * three.inverse().unwrap(), f.one());
    }

    #[test]
    fn inverse_of_nonzero_elements() {
        let f = FieldDefinition::new(101).unwrap();
        for v in 1..101 {
            let e = f.element(v);
            assert_eq!(e * e.inverse().unwrap(), f.one());
        }
        assert!(f.zero().inverse().is_none());
    }

    #[test]
    fn serializer_width_follows_bit_length() {
        assert_eq!(FieldDefinition::new(MODULUS_61).unwrap().serializer().width(), 8);
        assert_eq!(FieldDefinition::new(251).unwrap().serializer().width(), 1);
        assert_eq!(FieldDefinition::new(257).unwrap().serializer().width(), 2);
    }

    #[test]
    fn serializer_rejects_non_canonical_and_truncated_input() {
        let f = FieldDefinition::new(251).unwrap();
        let s = f.serializer();
        assert!(s.deserialize(&[252]).is_err());
        let list = s.serialize_list(&[f.element(1), f.element(250)]);
        assert_eq!(list, vec![1, 250]);
        assert_eq!(s.deserialize_list(&list).unwrap(), vec![f.element(1), f.element(250)]);

        let wide = FieldDefinition::new(257).unwrap().serializer();
        assert!(wide.deserialize_list(&[0, 1, 0]).is_err());
    }

    #[test]
    fn byte_arrays_are_length_prefixed() {
        let arrays = vec![vec![1, 2, 3], vec![], vec![9]];
        let packed = serialize_byte_arrays(&arrays).unwrap();
        assert_eq!(packed, vec![0, 3, 1, 2, 3, 0, 0, 0, 1, 9]);
        assert_eq!(deserialize_byte_arrays(&packed).unwrap(), arrays);
        assert!(deserialize_byte_arrays(&[0, 5, 1]).is_err());
        assert!(serialize_byte_arrays(&[vec![0; 70_000]]).is_err());
    }
}
