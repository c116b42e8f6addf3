//! Native protocols over authenticated field elements.

use subtle::ConstantTimeEq;

use super::{EvaluationStatus, NativeProtocol, Output, publish};
use crate::{
    DRes,
    data_types::{AuthenticatedElement, InputMask, MultiplicationTriple, SBool, SInt},
    error::Error,
    field::FieldElement,
    network::Network,
    resource_pool::ResourcePool,
};

fn sum_shares(pool: &ResourcePool, msgs: &[Vec<u8>]) -> Result<FieldElement, Error> {
    let serializer = pool.serializer();
    let mut sum = pool.field().zero();
    for msg in msgs {
        sum += serializer.deserialize(msg)?;
    }
    Ok(sum)
}

fn unexpected_round(protocol: &str, round: usize) -> Error {
    Error::invariant(format!("{protocol} evaluated in unexpected round {round}"))
}

/// Secret-shares a value known to `owner`.
///
/// The owner broadcasts `x - r` for a preprocessed mask `r` only it knows, every party then adds
/// the public difference to its share of `r`. With more than two parties the broadcast value is
/// validated by exchanging digests, so the owner cannot hand out inconsistent values.
pub(crate) struct Input {
    owner: usize,
    value: Option<FieldElement>,
    mask: Option<InputMask>,
    masked: Option<FieldElement>,
    output: Output<SInt>,
}

impl Input {
    pub(crate) fn new(owner: usize, value: Option<FieldElement>, output: Output<SInt>) -> Self {
        Self {
            owner,
            value,
            mask: None,
            masked: None,
            output,
        }
    }

    fn finish(&self, pool: &ResourcePool) -> Result<EvaluationStatus, Error> {
        let (Some(mask), Some(masked)) = (self.mask, self.masked) else {
            return Err(Error::invariant("input finished without mask"));
        };
        let share = mask
            .mask
            .add_public(masked, pool.my_id(), pool.mac_key_share());
        publish(&self.output, SInt(share))?;
        Ok(EvaluationStatus::IsDone)
    }
}

impl NativeProtocol for Input {
    fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error> {
        match round {
            0 => {
                let mask = pool.supplier().next_input_mask(self.owner)?;
                if pool.my_id() == self.owner {
                    let (Some(value), Some(r)) = (self.value, mask.real_value) else {
                        return Err(Error::invariant(format!(
                            "party {} provides an input but has no value or mask",
                            self.owner
                        )));
                    };
                    network.send_to_all(pool.serializer().serialize(&(value - r)));
                }
                self.mask = Some(mask);
                Ok(EvaluationStatus::HasMoreRounds)
            }
            1 => {
                let bytes = network.receive(self.owner)?;
                self.masked = Some(pool.serializer().deserialize(&bytes)?);
                if pool.no_of_parties() > 2 {
                    network.send_to_all(blake3::hash(&bytes).as_bytes().to_vec());
                    Ok(EvaluationStatus::HasMoreRounds)
                } else {
                    self.finish(pool)
                }
            }
            2 => {
                let own = self
                    .masked
                    .map(|m| *blake3::hash(&pool.serializer().serialize(&m)).as_bytes())
                    .ok_or_else(|| Error::invariant("input digest without value"))?;
                for (p, digest) in network.receive_from_all()?.into_iter().enumerate() {
                    if !bool::from(digest.as_slice().ct_eq(own.as_slice())) {
                        return Err(Error::malicious(format!(
                            "party {p} saw a different masked input from party {}",
                            self.owner
                        )));
                    }
                }
                self.finish(pool)
            }
            r => Err(unexpected_round("input", r)),
        }
    }
}

/// Shares a public constant without communication.
pub(crate) struct Known {
    value: FieldElement,
    output: Output<SInt>,
}

impl Known {
    pub(crate) fn new(value: FieldElement, output: Output<SInt>) -> Self {
        Self { value, output }
    }
}

impl NativeProtocol for Known {
    fn evaluate(
        &mut self,
        _round: usize,
        pool: &mut ResourcePool,
        _network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error> {
        let share = AuthenticatedElement::public(self.value, pool.my_id(), pool.mac_key_share());
        publish(&self.output, SInt(share))?;
        Ok(EvaluationStatus::IsDone)
    }
}

/// Computes `constant + sum(coefficient * term)` locally.
///
/// Addition, subtraction and multiplication by public values are all expressed as linear
/// combinations.
pub(crate) struct LinearCombination {
    constant: FieldElement,
    terms: Vec<(FieldElement, DRes<SInt>)>,
    output: Output<SInt>,
}

impl LinearCombination {
    pub(crate) fn new(
        constant: FieldElement,
        terms: Vec<(FieldElement, DRes<SInt>)>,
        output: Output<SInt>,
    ) -> Self {
        Self {
            constant,
            terms,
            output,
        }
    }
}

impl NativeProtocol for LinearCombination {
    fn evaluate(
        &mut self,
        _round: usize,
        pool: &mut ResourcePool,
        _network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error> {
        let mut acc =
            AuthenticatedElement::public(self.constant, pool.my_id(), pool.mac_key_share());
        for (c, term) in &self.terms {
            acc = acc + term.out().0 * *c;
        }
        publish(&self.output, SInt(acc))?;
        Ok(EvaluationStatus::IsDone)
    }
}

/// Opens a value to all parties.
///
/// The opened value is not validated here: it is registered in the opened value store together
/// with this party's MAC share and checked in batch by the next MAC check.
pub(crate) struct Open {
    value: DRes<SInt>,
    share: Option<AuthenticatedElement>,
    output: Output<FieldElement>,
}

impl Open {
    pub(crate) fn new(value: DRes<SInt>, output: Output<FieldElement>) -> Self {
        Self {
            value,
            share: None,
            output,
        }
    }
}

impl NativeProtocol for Open {
    fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error> {
        match round {
            0 => {
                let share = self.value.out().0;
                network.send_to_all(pool.serializer().serialize(&share.share));
                self.share = Some(share);
                Ok(EvaluationStatus::HasMoreRounds)
            }
            1 => {
                let share = self
                    .share
                    .ok_or_else(|| Error::invariant("open finished without share"))?;
                let value = sum_shares(pool, &network.receive_from_all()?)?;
                pool.opened_values().push(value, share.mac);
                publish(&self.output, value)?;
                Ok(EvaluationStatus::IsDone)
            }
            r => Err(unexpected_round("open", r)),
        }
    }
}

/// Opens a value to a single party.
///
/// The value is masked with an input mask of the receiving party before it is opened to
/// everybody, so the masked opening can be MAC checked like any other while only the receiver
/// learns the value.
pub(crate) struct OpenTo {
    value: DRes<SInt>,
    party: usize,
    masked: Option<(AuthenticatedElement, InputMask)>,
    output: Output<Option<FieldElement>>,
}

impl OpenTo {
    pub(crate) fn new(
        value: DRes<SInt>,
        party: usize,
        output: Output<Option<FieldElement>>,
    ) -> Self {
        Self {
            value,
            party,
            masked: None,
            output,
        }
    }
}

impl NativeProtocol for OpenTo {
    fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error> {
        match round {
            0 => {
                let mask = pool.supplier().next_input_mask(self.party)?;
                let masked = self.value.out().0 + mask.mask;
                network.send_to_all(pool.serializer().serialize(&masked.share));
                self.masked = Some((masked, mask));
                Ok(EvaluationStatus::HasMoreRounds)
            }
            1 => {
                let (masked, mask) = self
                    .masked
                    .ok_or_else(|| Error::invariant("open-to finished without mask"))?;
                let value = sum_shares(pool, &network.receive_from_all()?)?;
                pool.opened_values().push(value, masked.mac);
                let output = if pool.my_id() == self.party {
                    let r = mask.real_value.ok_or_else(|| {
                        Error::invariant("output party does not know its own mask")
                    })?;
                    Some(value - r)
                } else {
                    None
                };
                publish(&self.output, output)?;
                Ok(EvaluationStatus::IsDone)
            }
            r => Err(unexpected_round("open-to", r)),
        }
    }
}

/// Multiplies two values using one multiplication triple.
///
/// Opens `e = x - a` and `d = y - b` and computes `z = c + e * b + d * a + e * d` locally.
pub(crate) struct Mult {
    x: DRes<SInt>,
    y: DRes<SInt>,
    state: Option<(MultiplicationTriple, AuthenticatedElement, AuthenticatedElement)>,
    output: Output<SInt>,
}

impl Mult {
    pub(crate) fn new(x: DRes<SInt>, y: DRes<SInt>, output: Output<SInt>) -> Self {
        Self {
            x,
            y,
            state: None,
            output,
        }
    }
}

impl NativeProtocol for Mult {
    fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error> {
        match round {
            0 => {
                let triple = pool.supplier().next_triple()?;
                let e = self.x.out().0 - triple.a;
                let d = self.y.out().0 - triple.b;
                network.send_to_all(pool.serializer().serialize_list(&[e.share, d.share]));
                self.state = Some((triple, e, d));
                Ok(EvaluationStatus::HasMoreRounds)
            }
            1 => {
                let (triple, e_share, d_share) = self
                    .state
                    .ok_or_else(|| Error::invariant("multiplication finished without triple"))?;
                let serializer = pool.serializer();
                let mut e = pool.field().zero();
                let mut d = pool.field().zero();
                for msg in network.receive_from_all()? {
                    let [e_k, d_k] = serializer.deserialize_list(&msg)?[..] else {
                        return Err(Error::malicious("multiplication message of wrong length"));
                    };
                    e += e_k;
                    d += d_k;
                }
                pool.opened_values().push(e, e_share.mac);
                pool.opened_values().push(d, d_share.mac);
                let z = (triple.c + triple.b * e + triple.a * d).add_public(
                    e * d,
                    pool.my_id(),
                    pool.mac_key_share(),
                );
                publish(&self.output, SInt(z))?;
                Ok(EvaluationStatus::IsDone)
            }
            r => Err(unexpected_round("multiplication", r)),
        }
    }
}

/// Takes a random bit from preprocessing.
pub(crate) struct RandomBit {
    output: Output<SBool>,
}

impl RandomBit {
    pub(crate) fn new(output: Output<SBool>) -> Self {
        Self { output }
    }
}

impl NativeProtocol for RandomBit {
    fn evaluate(
        &mut self,
        _round: usize,
        pool: &mut ResourcePool,
        _network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error> {
        let bit = pool.supplier().next_bit()?;
        publish(&self.output, SBool(SInt(bit)))?;
        Ok(EvaluationStatus::IsDone)
    }
}

/// Takes a random field element from preprocessing.
pub(crate) struct RandomElement {
    output: Output<SInt>,
}

impl RandomElement {
    pub(crate) fn new(output: Output<SInt>) -> Self {
        Self { output }
    }
}

impl NativeProtocol for RandomElement {
    fn evaluate(
        &mut self,
        _round: usize,
        pool: &mut ResourcePool,
        _network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error> {
        let r = pool.supplier().next_random_element()?;
        publish(&self.output, SInt(r))?;
        Ok(EvaluationStatus::IsDone)
    }
}
