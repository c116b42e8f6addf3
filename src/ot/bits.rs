//! Packed bit vectors, bit-matrix transposition and carry-less multiplication.
//!
//! Bits are stored least significant bit first within every byte.

use std::ops::{BitXor, BitXorAssign};

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// A vector of bits packed into bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitVector {
    bytes: Vec<u8>,
    len: usize,
}

impl BitVector {
    /// `len` zero bits.
    pub fn zeros(len: usize) -> Self {
        Self {
            bytes: vec![0; len.div_ceil(8)],
            len,
        }
    }

    /// `len` uniformly random bits.
    pub fn random(rng: &mut impl RngCore, len: usize) -> Self {
        let mut v = Self::zeros(len);
        rng.fill_bytes(&mut v.bytes);
        v.clear_padding();
        v
    }

    /// Packs a slice of bools.
    pub fn from_bools(bits: &[bool]) -> Self {
        let mut v = Self::zeros(bits.len());
        for (i, b) in bits.iter().enumerate() {
            v.set(i, *b);
        }
        v
    }

    /// Interprets `bytes` as `len` bits, returns `None` if the lengths do not match.
    pub fn from_bytes(bytes: Vec<u8>, len: usize) -> Option<Self> {
        if bytes.len() != len.div_ceil(8) {
            return None;
        }
        let mut v = Self { bytes, len };
        v.clear_padding();
        Some(v)
    }

    fn clear_padding(&mut self) {
        if self.len % 8 != 0 {
            if let Some(last) = self.bytes.last_mut() {
                *last &= (1u8 << (self.len % 8)) - 1;
            }
        }
    }

    /// The number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the vector has no bits.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The packed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Takes the packed bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Bit `i`.
    ///
    /// # Panics
    ///
    /// If `i` is out of bounds.
    pub fn get(&self, i: usize) -> bool {
        assert!(i < self.len, "bit {i} out of bounds for {} bits", self.len);
        self.bytes[i / 8] >> (i % 8) & 1 == 1
    }

    /// Sets bit `i`.
    ///
    /// # Panics
    ///
    /// If `i` is out of bounds.
    pub fn set(&mut self, i: usize, bit: bool) {
        assert!(i < self.len, "bit {i} out of bounds for {} bits", self.len);
        if bit {
            self.bytes[i / 8] |= 1 << (i % 8);
        } else {
            self.bytes[i / 8] &= !(1 << (i % 8));
        }
    }

    fn flip(&mut self, i: usize) {
        self.bytes[i / 8] ^= 1 << (i % 8);
    }

    /// Iterates over the bits.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|i| self.get(i))
    }

    /// Indices of the set bits.
    fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bytes.iter().enumerate().flat_map(|(j, byte)| {
            (0..8)
                .filter(move |b| byte >> b & 1 == 1)
                .map(move |b| 8 * j + b)
        })
    }
}

impl BitXorAssign<&BitVector> for BitVector {
    /// # Panics
    ///
    /// If the lengths differ.
    fn bitxor_assign(&mut self, rhs: &BitVector) {
        assert_eq!(self.len, rhs.len, "xor of bit vectors of different length");
        self.bytes
            .iter_mut()
            .zip(&rhs.bytes)
            .for_each(|(a, b)| *a ^= b);
    }
}

impl BitXor for &BitVector {
    type Output = BitVector;

    fn bitxor(self, rhs: &BitVector) -> BitVector {
        let mut out = self.clone();
        out ^= rhs;
        out
    }
}

/// Transposes a bit matrix given as rows of equal length.
///
/// # Panics
///
/// If the rows have different lengths.
pub fn transpose(rows: &[BitVector]) -> Vec<BitVector> {
    let cols = rows.first().map_or(0, BitVector::len);
    let mut out = vec![BitVector::zeros(rows.len()); cols];
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.len(), cols, "row {i} has a different length");
        for j in row.ones() {
            out[j].set(i, true);
        }
    }
    out
}

/// Multiplies two polynomials over `GF(2)` without reducing the product.
///
/// The result has `a.len() + b.len()` bits, the top bit is always zero.
pub fn clmul(a: &BitVector, b: &BitVector) -> BitVector {
    let mut out = BitVector::zeros(a.len() + b.len());
    for i in a.ones() {
        for j in b.ones() {
            out.flip(i + j);
        }
    }
    out
}
