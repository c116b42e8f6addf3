//! Two-party multiplication of privately held field elements (Gilboa).
//!
//! The sender holds `x`, the receiver holds `y`. For every bit `y_j` of `y` the parties run one
//! chosen-message OT in which the sender offers `(s_j, s_j + x * 2^j)`. The receiver's share is
//! the sum of what it received, the sender's share is `-sum(s_j)`, so both shares add up to
//! `x * y`.

use rand::{CryptoRng, RngCore};

use crate::{
    channel::Channel,
    error::Error,
    field::{FieldDefinition, FieldElement},
    ot::{RotReceiver, RotSender},
};

pub(crate) async fn send_products(
    ot: &mut RotSender,
    channel: &impl Channel,
    field: FieldDefinition,
    xs: &[FieldElement],
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<Vec<FieldElement>, Error> {
    let bits = field.bit_length();
    let serializer = field.serializer();
    let mut shares = Vec::with_capacity(xs.len());
    let mut messages = Vec::with_capacity(xs.len() * bits);
    for x in xs {
        let mut sum = field.zero();
        for j in 0..bits {
            let s = field.random(rng);
            let shifted = *x * field.element(1 << j);
            messages.push((serializer.serialize(&s), serializer.serialize(&(s + shifted))));
            sum += s;
        }
        shares.push(-sum);
    }
    ot.send(channel, &messages).await?;
    Ok(shares)
}

pub(crate) async fn receive_products(
    ot: &mut RotReceiver,
    channel: &impl Channel,
    field: FieldDefinition,
    ys: &[FieldElement],
) -> Result<Vec<FieldElement>, Error> {
    let bits = field.bit_length();
    let serializer = field.serializer();
    let choices: Vec<bool> = ys
        .iter()
        .flat_map(|y| (0..bits).map(move |j| y.bit(j)))
        .collect();
    let received = ot.receive(channel, &choices).await?;
    received
        .chunks(bits.max(1))
        .map(|chunk| {
            chunk.iter().try_fold(field.zero(), |acc, m| {
                Ok::<_, Error>(acc + serializer.deserialize(m)?)
            })
        })
        .collect()
}
