//! Data types used across difference parts of the SMPC engine.

use std::ops::{Add, Mul, Neg, Sub};

use crate::field::FieldElement;

/// A party's additive share of the global MAC key `alpha`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacKeyShare(pub(crate) FieldElement);

impl MacKeyShare {
    /// Wraps a key share.
    pub fn new(value: FieldElement) -> Self {
        Self(value)
    }

    /// The share as a field element.
    pub fn value(&self) -> FieldElement {
        self.0
    }
}

/// One party's additive share of a value together with its share of the MAC `alpha * value`.
///
/// Summing `share` over all parties yields the value `x`, summing `mac` yields `alpha * x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedElement {
    pub(crate) share: FieldElement,
    pub(crate) mac: FieldElement,
}

impl AuthenticatedElement {
    /// Pairs a value share with its MAC share.
    pub fn new(share: FieldElement, mac: FieldElement) -> Self {
        Self { share, mac }
    }

    /// This party's share of the value.
    pub fn share(&self) -> FieldElement {
        self.share
    }

    /// This party's share of the MAC.
    pub fn mac(&self) -> FieldElement {
        self.mac
    }

    /// Adds a public constant: only party 0 changes its share, everybody adjusts the MAC.
    pub(crate) fn add_public(self, c: FieldElement, my_id: usize, key: MacKeyShare) -> Self {
        let share = if my_id == 0 { self.share + c } else { self.share };
        Self {
            share,
            mac: self.mac + c * key.0,
        }
    }

    /// The sharing of a public constant.
    pub(crate) fn public(c: FieldElement, my_id: usize, key: MacKeyShare) -> Self {
        let zero = c.field().zero();
        Self::new(zero, zero).add_public(c, my_id, key)
    }
}

impl Add for AuthenticatedElement {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.share + rhs.share, self.mac + rhs.mac)
    }
}

impl Sub for AuthenticatedElement {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.share - rhs.share, self.mac - rhs.mac)
    }
}

impl Neg for AuthenticatedElement {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.share, -self.mac)
    }
}

impl Mul<FieldElement> for AuthenticatedElement {
    type Output = Self;

    fn mul(self, rhs: FieldElement) -> Self::Output {
        Self::new(self.share * rhs, self.mac * rhs)
    }
}

/// An opaque secret-shared field element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SInt(pub(crate) AuthenticatedElement);

impl SInt {
    /// The authenticated share held by this party.
    pub fn authenticated(&self) -> &AuthenticatedElement {
        &self.0
    }
}

/// A secret-shared bit, represented as an [`SInt`] that is either `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SBool(pub(crate) SInt);

impl SBool {
    /// Views the bit as a field element.
    pub fn as_sint(&self) -> SInt {
        self.0
    }
}

/// Authenticated shares of `a`, `b` and `c = a * b`, consumed by exactly one multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiplicationTriple {
    pub(crate) a: AuthenticatedElement,
    pub(crate) b: AuthenticatedElement,
    pub(crate) c: AuthenticatedElement,
}

impl MultiplicationTriple {
    /// Assembles a triple from its three authenticated parts.
    pub fn new(a: AuthenticatedElement, b: AuthenticatedElement, c: AuthenticatedElement) -> Self {
        Self { a, b, c }
    }

    /// The first factor.
    pub fn a(&self) -> AuthenticatedElement {
        self.a
    }

    /// The second factor.
    pub fn b(&self) -> AuthenticatedElement {
        self.b
    }

    /// The product.
    pub fn c(&self) -> AuthenticatedElement {
        self.c
    }
}

/// A random authenticated mask `r`, whose plain value is only known to the input party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputMask {
    pub(crate) mask: AuthenticatedElement,
    pub(crate) real_value: Option<FieldElement>,
}

impl InputMask {
    /// A mask share; `real_value` is `Some` only at the input party.
    pub fn new(mask: AuthenticatedElement, real_value: Option<FieldElement>) -> Self {
        Self { mask, real_value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDefinition, MODULUS_61};

    #[test]
    fn linear_operations_keep_macs_consistent() {
        let f = FieldDefinition::new(MODULUS_61).unwrap();
        let keys = [MacKeyShare(f.element(11)), MacKeyShare(f.element(31))];
        let alpha = keys[0].0 + keys[1].0;
        let x = f.element(1234);
        // x = 1000 + 234, mac(x) = alpha * x split as 7 + (alpha * x - 7)
        let xs = [
            AuthenticatedElement::new(f.element(1000), f.element(7)),
            AuthenticatedElement::new(f.element(234), alpha * x - f.element(7)),
        ];
        let c = f.element(5);
        let ys: Vec<_> = xs
            .iter()
            .enumerate()
            .map(|(i, s)| (*s * c).add_public(c, i, keys[i]) - *s)
            .collect();
        let y = ys[0].share + ys[1].share;
        let mac = ys[0].mac + ys[1].mac;
        let expected = x * c + c - x;
        assert_eq!(y, expected);
        assert_eq!(mac, alpha * expected);
    }
}
