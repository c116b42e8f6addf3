//! OT-based generation of authenticated preprocessing material.
//!
//! Every party samples a share of the MAC key `alpha` and the shares of the values it wants to
//! authenticate. Products of secret-shared values are computed from the local product plus one
//! Gilboa multiplication for every ordered pair of distinct parties. MACs are the product of
//! `alpha` with the values.
//!
//! Triples are only correct against passive adversaries, no sacrificing takes place.

use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument};

use super::{QueueDataSupplier, gilboa};
use crate::{
    channel::Channel,
    data_types::{AuthenticatedElement, InputMask, MacKeyShare, MultiplicationTriple},
    error::Error,
    field::{FieldDefinition, FieldElement},
    ot::{OtConfig, RotReceiver, RotSender},
};

/// How much material [`generate_preprocessing`] produces. All parties must agree on the amounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingAmounts {
    /// Multiplication triples.
    pub triples: usize,
    /// Input masks, indexed by the party owning the input. Missing parties get none.
    pub input_masks: Vec<usize>,
    /// Random shared bits.
    pub bits: usize,
    /// Random shared field elements.
    pub random_elements: usize,
}

impl PreprocessingAmounts {
    fn input_masks_of(&self, owner: usize) -> usize {
        self.input_masks.get(owner).copied().unwrap_or_default()
    }
}

/// Ordered pairs `(sender, receiver)` of distinct parties, in the same order at every party.
fn directions(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(move |a| ((a + 1)..n).flat_map(move |b| [(a, b), (b, a)]))
}

/// Sharings of `count` bits known to a single party, all other parties hold zeros.
fn private_bits(
    field: FieldDefinition,
    count: usize,
    mine: bool,
    rng: &mut impl Rng,
) -> Vec<FieldElement> {
    (0..count)
        .map(|_| {
            if mine {
                field.element(rng.random::<bool>() as u64)
            } else {
                field.zero()
            }
        })
        .collect()
}

/// Pairwise OT sessions of one party, used to multiply secret-shared values.
#[derive(Debug)]
pub struct ProductSessions {
    my_id: usize,
    field: FieldDefinition,
    senders: Vec<Option<RotSender>>,
    receivers: Vec<Option<RotReceiver>>,
}

impl ProductSessions {
    /// Runs the base OTs with every other party.
    #[instrument(level = Level::DEBUG, skip(channel, rng), err)]
    pub async fn setup(
        channel: &impl Channel,
        my_id: usize,
        n_parties: usize,
        field: FieldDefinition,
        config: OtConfig,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<Self, Error> {
        let mut senders: Vec<Option<RotSender>> = (0..n_parties).map(|_| None).collect();
        let mut receivers: Vec<Option<RotReceiver>> = (0..n_parties).map(|_| None).collect();
        for (s, r) in directions(n_parties) {
            if s == my_id {
                senders[r] = Some(RotSender::setup(channel, my_id, r, config, rng).await?);
            } else if r == my_id {
                receivers[s] = Some(RotReceiver::setup(channel, my_id, s, config, rng).await?);
            }
        }
        Ok(Self {
            my_id,
            field,
            senders,
            receivers,
        })
    }

    /// Given this party's shares of `x` and `y`, returns its shares of the element-wise products.
    ///
    /// `(sum_a xs_a) * (sum_b ys_b)` is the local product `xs_i * ys_i` plus `xs_a * ys_b` for
    /// every ordered pair `(a, b)` of distinct parties.
    pub async fn cross_product_shares(
        &mut self,
        channel: &impl Channel,
        xs: &[FieldElement],
        ys: &[FieldElement],
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<Vec<FieldElement>, Error> {
        if xs.len() != ys.len() {
            return Err(Error::invariant(format!(
                "cannot multiply {} by {} elements",
                xs.len(),
                ys.len()
            )));
        }
        let mut out: Vec<FieldElement> = xs.iter().zip(ys).map(|(x, y)| *x * *y).collect();
        if xs.is_empty() {
            return Ok(out);
        }
        let n = self.senders.len();
        for (s, r) in directions(n) {
            let shares = if s == self.my_id {
                let ot = self.senders[r]
                    .as_mut()
                    .ok_or_else(|| Error::invariant(format!("no OT session to party {r}")))?;
                gilboa::send_products(ot, channel, self.field, xs, rng).await?
            } else if r == self.my_id {
                let ot = self.receivers[s]
                    .as_mut()
                    .ok_or_else(|| Error::invariant(format!("no OT session from party {s}")))?;
                gilboa::receive_products(ot, channel, self.field, ys).await?
            } else {
                continue;
            };
            out.iter_mut().zip(shares).for_each(|(o, s)| *o += s);
        }
        Ok(out)
    }

    /// Shares of `count` random bits: the XOR of one private random bit per party.
    async fn random_bits(
        &mut self,
        channel: &impl Channel,
        count: usize,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<Vec<FieldElement>, Error> {
        let (field, me) = (self.field, self.my_id);
        let n = self.senders.len();
        let mut acc = private_bits(field, count, me == 0, rng);
        let two = field.element(2);
        for p in 1..n {
            let bits = private_bits(field, count, me == p, rng);
            let products = self.cross_product_shares(channel, &acc, &bits, rng).await?;
            // a xor b = a + b - 2ab
            acc = acc
                .iter()
                .zip(&bits)
                .zip(&products)
                .map(|((a, b), ab)| *a + *b - two * *ab)
                .collect();
        }
        Ok(acc)
    }
}

/// Generates `amounts` of authenticated material together with all other parties.
#[instrument(level = Level::DEBUG, skip(channel, amounts, rng), err)]
pub async fn generate_preprocessing(
    channel: &impl Channel,
    my_id: usize,
    n_parties: usize,
    field: FieldDefinition,
    amounts: &PreprocessingAmounts,
    config: OtConfig,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<QueueDataSupplier, Error> {
    if n_parties < 2 || my_id >= n_parties {
        return Err(Error::invariant(format!(
            "party {my_id} cannot take part in preprocessing for {n_parties} parties"
        )));
    }
    let mut sessions = ProductSessions::setup(channel, my_id, n_parties, field, config, rng).await?;
    let alpha = field.random(rng);

    let t = amounts.triples;
    let a: Vec<FieldElement> = (0..t).map(|_| field.random(rng)).collect();
    let b: Vec<FieldElement> = (0..t).map(|_| field.random(rng)).collect();
    let c = sessions.cross_product_shares(channel, &a, &b, rng).await?;
    debug!(triples = t, "multiplied triple shares");

    let mut masks = vec![];
    let mut mask_counts = vec![];
    for owner in 0..n_parties {
        let count = amounts.input_masks_of(owner);
        mask_counts.push(count);
        for _ in 0..count {
            masks.push(if owner == my_id {
                field.random(rng)
            } else {
                field.zero()
            });
        }
    }
    let elements: Vec<FieldElement> = (0..amounts.random_elements)
        .map(|_| field.random(rng))
        .collect();
    let bits = sessions.random_bits(channel, amounts.bits, rng).await?;
    debug!(bits = bits.len(), "generated random bits");

    let values: Vec<FieldElement> = [&a, &b, &c, &masks, &elements, &bits]
        .into_iter()
        .flatten()
        .copied()
        .collect();
    let alphas = vec![alpha; values.len()];
    let macs = sessions
        .cross_product_shares(channel, &alphas, &values, rng)
        .await?;
    debug!(values = values.len(), "authenticated preprocessing material");

    let mut authenticated = values
        .iter()
        .zip(macs)
        .map(|(v, m)| AuthenticatedElement::new(*v, m));
    let mut take = |count: usize| -> Vec<AuthenticatedElement> {
        authenticated.by_ref().take(count).collect()
    };
    let mut supplier = QueueDataSupplier::new(MacKeyShare::new(alpha), n_parties);
    let (a, b, c) = (take(t), take(t), take(t));
    supplier.triples = a
        .into_iter()
        .zip(b)
        .zip(c)
        .map(|((a, b), c)| MultiplicationTriple::new(a, b, c))
        .collect();
    let mut clear_masks = masks.into_iter();
    for (owner, count) in mask_counts.into_iter().enumerate() {
        for (mask, r) in take(count).into_iter().zip(clear_masks.by_ref()) {
            let real_value = (owner == my_id).then_some(r);
            supplier.masks[owner].push_back(InputMask::new(mask, real_value));
        }
    }
    supplier.elements = take(amounts.random_elements).into();
    supplier.bits = take(amounts.bits).into();
    Ok(supplier)
}
