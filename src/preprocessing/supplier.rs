//! Suppliers of preprocessed correlated randomness.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::{
    data_types::{AuthenticatedElement, InputMask, MacKeyShare, MultiplicationTriple},
    error::{Error, Resource},
    field::{FieldDefinition, FieldElement},
};

/// Source of the preprocessed material consumed by native protocols.
///
/// Running out of material is a configuration error and reported as
/// [`Error::ResourceExhausted`].
pub trait DataSupplier {
    /// This party's share of the global MAC key.
    fn mac_key_share(&self) -> MacKeyShare;

    /// The next unused multiplication triple.
    fn next_triple(&mut self) -> Result<MultiplicationTriple, Error>;

    /// The next unused input mask for inputs provided by `owner`.
    fn next_input_mask(&mut self, owner: usize) -> Result<InputMask, Error>;

    /// The next unused random bit.
    fn next_bit(&mut self) -> Result<AuthenticatedElement, Error>;

    /// The next unused random field element.
    fn next_random_element(&mut self) -> Result<AuthenticatedElement, Error>;
}

const STREAM_KEY: u64 = 0;
const STREAM_TRIPLES: u64 = 1;
const STREAM_BITS: u64 = 2;
const STREAM_ELEMENTS: u64 = 3;
const STREAM_MASKS: u64 = 4;

/// Simulates a trusted dealer from a seed that all parties share.
///
/// Every party derives the same global material and keeps only its own share, so the supplier
/// needs no communication. This is insecure by construction and meant for tests and demos.
#[derive(Debug)]
pub struct DummyDataSupplier {
    my_id: usize,
    n_parties: usize,
    field: FieldDefinition,
    key_shares: Vec<FieldElement>,
    triples: ChaCha20Rng,
    bits: ChaCha20Rng,
    elements: ChaCha20Rng,
    masks: Vec<ChaCha20Rng>,
    triples_left: Option<usize>,
}

impl DummyDataSupplier {
    /// Creates the supplier of party `my_id` out of `n_parties`.
    pub fn new(
        my_id: usize,
        n_parties: usize,
        field: FieldDefinition,
        seed: [u8; 32],
    ) -> Result<Self, Error> {
        if my_id >= n_parties {
            return Err(Error::invariant(format!(
                "party {my_id} does not exist among {n_parties} parties"
            )));
        }
        let stream = |s: u64| {
            let mut rng = ChaCha20Rng::from_seed(seed);
            rng.set_stream(s);
            rng
        };
        let mut key_rng = stream(STREAM_KEY);
        let key_shares = (0..n_parties).map(|_| field.sample(&mut key_rng)).collect();
        Ok(Self {
            my_id,
            n_parties,
            field,
            key_shares,
            triples: stream(STREAM_TRIPLES),
            bits: stream(STREAM_BITS),
            elements: stream(STREAM_ELEMENTS),
            masks: (0..n_parties)
                .map(|p| stream(STREAM_MASKS + p as u64))
                .collect(),
            triples_left: None,
        })
    }

    /// Limits the number of triples that can be drawn, to exercise exhaustion handling.
    pub fn with_triple_limit(mut self, limit: usize) -> Self {
        self.triples_left = Some(limit);
        self
    }

    fn alpha(&self) -> FieldElement {
        self.key_shares
            .iter()
            .fold(self.field.zero(), |acc, k| acc + *k)
    }

    fn share(
        field: FieldDefinition,
        alpha: FieldElement,
        my_id: usize,
        n: usize,
        rng: &mut ChaCha20Rng,
        value: FieldElement,
    ) -> AuthenticatedElement {
        let mut rest = AuthenticatedElement::new(value, alpha * value);
        let mut mine = None;
        for p in 0..n - 1 {
            let s = field.sample(rng);
            let m = field.sample(rng);
            let share = AuthenticatedElement::new(s, m);
            rest = rest - share;
            if p == my_id {
                mine = Some(share);
            }
        }
        // the last party takes whatever is left
        mine.unwrap_or(rest)
    }
}

impl DataSupplier for DummyDataSupplier {
    fn mac_key_share(&self) -> MacKeyShare {
        MacKeyShare(self.key_shares[self.my_id])
    }

    fn next_triple(&mut self) -> Result<MultiplicationTriple, Error> {
        if let Some(left) = self.triples_left.as_mut() {
            if *left == 0 {
                return Err(Error::ResourceExhausted(Resource::Triple));
            }
            *left -= 1;
        }
        let (field, alpha, me, n) = (self.field, self.alpha(), self.my_id, self.n_parties);
        let rng = &mut self.triples;
        let a = field.sample(rng);
        let b = field.sample(rng);
        let a_share = Self::share(field, alpha, me, n, rng, a);
        let b_share = Self::share(field, alpha, me, n, rng, b);
        let c_share = Self::share(field, alpha, me, n, rng, a * b);
        Ok(MultiplicationTriple::new(a_share, b_share, c_share))
    }

    fn next_input_mask(&mut self, owner: usize) -> Result<InputMask, Error> {
        let (field, alpha, me, n) = (self.field, self.alpha(), self.my_id, self.n_parties);
        let Some(rng) = self.masks.get_mut(owner) else {
            return Err(Error::invariant(format!("party {owner} does not exist")));
        };
        let r = field.sample(rng);
        let mask = Self::share(field, alpha, me, n, rng, r);
        Ok(InputMask {
            mask,
            real_value: (owner == me).then_some(r),
        })
    }

    fn next_bit(&mut self) -> Result<AuthenticatedElement, Error> {
        let (field, alpha, me, n) = (self.field, self.alpha(), self.my_id, self.n_parties);
        let rng = &mut self.bits;
        let bit = field.element(rng.random::<bool>() as u64);
        Ok(Self::share(field, alpha, me, n, rng, bit))
    }

    fn next_random_element(&mut self) -> Result<AuthenticatedElement, Error> {
        let (field, alpha, me, n) = (self.field, self.alpha(), self.my_id, self.n_parties);
        let rng = &mut self.elements;
        let r = field.sample(rng);
        Ok(Self::share(field, alpha, me, n, rng, r))
    }
}

/// A supplier backed by in-memory queues, filled by an actual preprocessing phase.
#[derive(Debug)]
pub struct QueueDataSupplier {
    key_share: MacKeyShare,
    pub(crate) triples: VecDeque<MultiplicationTriple>,
    pub(crate) masks: Vec<VecDeque<InputMask>>,
    pub(crate) bits: VecDeque<AuthenticatedElement>,
    pub(crate) elements: VecDeque<AuthenticatedElement>,
}

impl QueueDataSupplier {
    /// Creates an empty supplier for `n_parties` input owners.
    pub fn new(key_share: MacKeyShare, n_parties: usize) -> Self {
        Self {
            key_share,
            triples: VecDeque::new(),
            masks: vec![VecDeque::new(); n_parties],
            bits: VecDeque::new(),
            elements: VecDeque::new(),
        }
    }

    /// Number of triples left.
    pub fn triples_left(&self) -> usize {
        self.triples.len()
    }

    /// Number of input masks left for `owner`.
    pub fn input_masks_left(&self, owner: usize) -> usize {
        self.masks.get(owner).map_or(0, VecDeque::len)
    }

    /// Number of random bits left.
    pub fn bits_left(&self) -> usize {
        self.bits.len()
    }

    /// Number of random elements left.
    pub fn random_elements_left(&self) -> usize {
        self.elements.len()
    }
}

impl DataSupplier for QueueDataSupplier {
    fn mac_key_share(&self) -> MacKeyShare {
        self.key_share
    }

    fn next_triple(&mut self) -> Result<MultiplicationTriple, Error> {
        self.triples
            .pop_front()
            .ok_or(Error::ResourceExhausted(Resource::Triple))
    }

    fn next_input_mask(&mut self, owner: usize) -> Result<InputMask, Error> {
        self.masks
            .get_mut(owner)
            .and_then(VecDeque::pop_front)
            .ok_or(Error::ResourceExhausted(Resource::InputMask(owner)))
    }

    fn next_bit(&mut self) -> Result<AuthenticatedElement, Error> {
        self.bits
            .pop_front()
            .ok_or(Error::ResourceExhausted(Resource::Bit))
    }

    fn next_random_element(&mut self) -> Result<AuthenticatedElement, Error> {
        self.elements
            .pop_front()
            .ok_or(Error::ResourceExhausted(Resource::RandomElement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::MODULUS_61;

    fn suppliers(n: usize) -> Vec<DummyDataSupplier> {
        let field = FieldDefinition::new(MODULUS_61).unwrap();
        (0..n)
            .map(|i| DummyDataSupplier::new(i, n, field, [7; 32]).unwrap())
            .collect()
    }

    fn open(field: FieldDefinition, shares: &[AuthenticatedElement]) -> (FieldElement, FieldElement) {
        shares.iter().fold((field.zero(), field.zero()), |(v, m), s| {
            (v + s.share, m + s.mac)
        })
    }

    #[test]
    fn dummy_triples_are_authenticated_products() {
        let field = FieldDefinition::new(MODULUS_61).unwrap();
        let mut parties = suppliers(3);
        let alpha = parties
            .iter()
            .fold(field.zero(), |acc, p| acc + p.mac_key_share().0);
        for _ in 0..10 {
            let triples: Vec<_> = parties.iter_mut().map(|p| p.next_triple().unwrap()).collect();
            let (a, mac_a) = open(field, &triples.iter().map(|t| t.a).collect::<Vec<_>>());
            let (b, _) = open(field, &triples.iter().map(|t| t.b).collect::<Vec<_>>());
            let (c, mac_c) = open(field, &triples.iter().map(|t| t.c).collect::<Vec<_>>());
            assert_eq!(a * b, c);
            assert_eq!(mac_a, alpha * a);
            assert_eq!(mac_c, alpha * c);
        }
    }

    #[test]
    fn only_the_owner_learns_the_input_mask() {
        let field = FieldDefinition::new(MODULUS_61).unwrap();
        let mut parties = suppliers(3);
        let masks: Vec<_> = parties
            .iter_mut()
            .map(|p| p.next_input_mask(1).unwrap())
            .collect();
        let (r, _) = open(field, &masks.iter().map(|m| m.mask).collect::<Vec<_>>());
        assert_eq!(masks[0].real_value, None);
        assert_eq!(masks[1].real_value, Some(r));
        assert_eq!(masks[2].real_value, None);
    }

    #[test]
    fn bits_are_zero_or_one() {
        let field = FieldDefinition::new(MODULUS_61).unwrap();
        let mut parties = suppliers(2);
        for _ in 0..20 {
            let bits: Vec<_> = parties.iter_mut().map(|p| p.next_bit().unwrap()).collect();
            let (b, _) = open(field, &bits);
            assert!(b.value() <= 1);
        }
    }

    #[test]
    fn rejects_unknown_party() {
        let field = FieldDefinition::new(MODULUS_61).unwrap();
        assert!(matches!(
            DummyDataSupplier::new(2, 2, field, [0; 32]),
            Err(Error::Invariant(_))
        ));
        assert!(DummyDataSupplier::new(1, 2, field, [0; 32]).is_ok());
    }

    #[test]
    fn triple_limit_reports_exhaustion() {
        let field = FieldDefinition::new(MODULUS_61).unwrap();
        let mut s = DummyDataSupplier::new(0, 2, field, [0; 32])
            .unwrap()
            .with_triple_limit(1);
        assert!(s.next_triple().is_ok());
        assert!(matches!(
            s.next_triple(),
            Err(Error::ResourceExhausted(Resource::Triple))
        ));
        let mut q = QueueDataSupplier::new(s.mac_key_share(), 2);
        assert!(matches!(
            q.next_input_mask(1),
            Err(Error::ResourceExhausted(Resource::InputMask(1)))
        ));
    }
}
