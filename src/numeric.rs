//! Comparison and bit decomposition of bounded secret integers.
//!
//! Both helpers mask the secret with a random value built from preprocessed bits, open the
//! masked value and then walk over the bits with one multiplication per bit. The mask has
//! [`STATISTICAL_SECURITY`] more bits than the secret, which hides the secret statistically.

use crate::{
    DRes,
    data_types::{SBool, SInt},
    engine::ProtocolBuilder,
    error::Error,
    field::FieldElement,
};

/// Statistical security parameter of the masking, in bits.
pub const STATISTICAL_SECURITY: usize = 40;

/// Checks that a `bit_length` bit value masked with `bit_length + STATISTICAL_SECURITY` random
/// bits cannot wrap around the modulus.
fn check_bit_length(builder: &ProtocolBuilder, bit_length: usize) -> Result<(), Error> {
    let field_bits = builder.field().bit_length();
    if bit_length == 0 || bit_length + STATISTICAL_SECURITY + 1 >= field_bits {
        return Err(Error::invariant(format!(
            "cannot mask {bit_length} bit values in a {field_bits} bit field"
        )));
    }
    Ok(())
}

/// `count` random bits, all taken in one batch.
fn random_bits(builder: &mut ProtocolBuilder, count: usize) -> Vec<DRes<SInt>> {
    let bits = builder.par(move |b| Ok(DRes::all((0..count).map(|_| b.random_bit()).collect())));
    (0..count)
        .map(|i| bits.map(move |bits| bits[i].as_sint()))
        .collect()
}

/// `sum(2^i * bits[i])`
fn compose(builder: &mut ProtocolBuilder, bits: &[DRes<SInt>]) -> DRes<SInt> {
    let field = builder.field();
    let terms = bits
        .iter()
        .enumerate()
        .map(|(i, bit)| (field.element(1 << i), bit.clone()))
        .collect();
    builder.linear_combination(field.zero(), terms)
}

/// Computes `x <= y` for secret `x` and `y` that are both less than `2^bit_length`.
///
/// Fails if the field is too small to mask values of `bit_length` bits.
pub fn compare_leq(
    builder: &mut ProtocolBuilder,
    x: &DRes<SInt>,
    y: &DRes<SInt>,
    bit_length: usize,
) -> Result<DRes<SBool>, Error> {
    check_bit_length(builder, bit_length)?;
    let (x, y) = (x.clone(), y.clone());
    Ok(builder.seq(move |b| {
        let field = b.field();
        let one = field.one();
        let two_l = field.element(1 << bit_length);
        // x <= y iff bit `bit_length` of z is set
        let z = b.linear_combination(two_l, vec![(one, y), (-one, x)]);
        let r = random_bits(b, bit_length + STATISTICAL_SECURITY);
        let r_full = compose(b, &r);
        let r_low = compose(b, &r[..bit_length]);
        let masked = b.add(&z, &r_full);
        let c = b.open(&masked);

        let lt = less_than_public(b, c.clone(), r, bit_length);

        Ok(b.seq(move |b| {
            let c_low = field.element(c.out().value() & ((1 << bit_length) - 1));
            let inv = two_l
                .inverse()
                .ok_or_else(|| Error::invariant("2^l is not invertible"))?;
            // (z - (c_low - r_low + 2^l * lt)) / 2^l
            let result = b.linear_combination(
                -(inv * c_low),
                vec![(inv, z), (inv, r_low), (-one, lt)],
            );
            Ok(result.map(SBool))
        }))
    }))
}

/// `[c mod 2^bit_length < sum(2^i * r[i] for i < bit_length)]` for a public `c`, walking from the
/// least significant bit upwards.
fn less_than_public(
    builder: &mut ProtocolBuilder,
    c: DRes<FieldElement>,
    r: Vec<DRes<SInt>>,
    bit_length: usize,
) -> DRes<SInt> {
    let field = builder.field();
    let init = builder.known(field.zero()).map(|lt| (0usize, lt));
    let state = builder.while_loop(
        init,
        move |(i, _)| *i < bit_length,
        move |b, (i, lt)| {
            let one = field.one();
            let lt = DRes::ready(lt);
            let r_i = r[i].clone();
            let prod = b.mult(&r_i, &lt);
            let next = if c.out().bit(i) {
                // equal bits keep the result, r_i = 0 < c_i = 1 clears it
                prod
            } else {
                // r_i or the lower bits decide
                b.linear_combination(field.zero(), vec![(one, lt), (one, r_i), (-one, prod)])
            };
            Ok(next.map(move |lt| (i + 1, lt)))
        },
    );
    state.map(|(_, lt)| lt)
}

/// Decomposes a secret `x < 2^bit_length` into its bits, least significant first.
///
/// Fails if the field is too small to mask values of `bit_length` bits.
pub fn bit_decomposition(
    builder: &mut ProtocolBuilder,
    x: &DRes<SInt>,
    bit_length: usize,
) -> Result<DRes<Vec<SBool>>, Error> {
    check_bit_length(builder, bit_length)?;
    let x = x.clone();
    Ok(builder.seq(move |b| {
        let field = b.field();
        let r = random_bits(b, bit_length + STATISTICAL_SECURITY);
        let r_full = compose(b, &r);
        let masked = b.add(&x, &r_full);
        let c = b.open(&masked);
        // x = c - r, computed bitwise with a secret borrow
        let init = b
            .known(field.zero())
            .map(|borrow| (0usize, borrow, Vec::<SBool>::new()));
        let state = b.while_loop(
            init,
            move |(i, _, _)| *i < bit_length,
            move |b, (i, borrow, bits)| {
                let (zero, one) = (field.zero(), field.one());
                let two = field.element(2);
                let borrow = DRes::ready(borrow);
                let r_i = r[i].clone();
                let prod = b.mult(&r_i, &borrow);
                let terms = |s: FieldElement| {
                    vec![(s, r_i.clone()), (s, borrow.clone()), (-(two * s), prod.clone())]
                };
                let (bit, next_borrow) = if c.out().bit(i) {
                    let bit = b.linear_combination(one, terms(-one));
                    (bit, prod.clone())
                } else {
                    let bit = b.linear_combination(zero, terms(one));
                    let next = b.linear_combination(
                        zero,
                        vec![(one, r_i.clone()), (one, borrow.clone()), (-one, prod.clone())],
                    );
                    (bit, next)
                };
                Ok(b.compute(move |_| {
                    let mut bits = bits;
                    bits.push(SBool(bit.out()));
                    Ok((i + 1, next_borrow.out(), bits))
                }))
            },
        );
        Ok(state.map(|(_, _, bits)| bits))
    }))
}
