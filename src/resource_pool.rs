//! Per-run state threaded through every native protocol.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::{
    data_types::MacKeyShare,
    error::Error,
    field::{FieldDefinition, FieldElement, FieldSerializer},
    preprocessing::DataSupplier,
};

/// Opened values awaiting a MAC check, as `(opened value, own MAC share)` pairs.
///
/// The store is append-only until [`OpenedValueStore::drain`] atomically takes all pending
/// values, which the MAC check does exactly once per check.
#[derive(Debug, Default)]
pub struct OpenedValueStore {
    pending: Vec<(FieldElement, FieldElement)>,
}

impl OpenedValueStore {
    /// Registers an opened value together with this party's MAC share of it.
    pub fn push(&mut self, value: FieldElement, mac_share: FieldElement) {
        self.pending.push((value, mac_share));
    }

    /// Number of values opened since the last check.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if no values are waiting to be checked.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes all pending values and resets the store.
    pub fn drain(&mut self) -> Vec<(FieldElement, FieldElement)> {
        std::mem::take(&mut self.pending)
    }
}

/// Everything a party needs to evaluate native protocols.
///
/// A pool is owned by exactly one evaluation, it must not be shared between concurrently running
/// computations.
pub struct ResourcePool {
    my_id: usize,
    n_parties: usize,
    field: FieldDefinition,
    rng: ChaCha20Rng,
    supplier: Box<dyn DataSupplier>,
    opened: OpenedValueStore,
}

impl std::fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("my_id", &self.my_id)
            .field("n_parties", &self.n_parties)
            .field("field", &self.field)
            .field("opened", &self.opened.len())
            .finish_non_exhaustive()
    }
}

impl ResourcePool {
    /// Creates the pool of party `my_id`, seeding the local RNG from the operating system.
    pub fn new(
        my_id: usize,
        n_parties: usize,
        field: FieldDefinition,
        supplier: impl DataSupplier + 'static,
    ) -> Result<Self, Error> {
        Self::with_rng(my_id, n_parties, field, supplier, ChaCha20Rng::from_os_rng())
    }

    /// Creates a pool with an explicitly seeded local RNG.
    pub fn with_rng(
        my_id: usize,
        n_parties: usize,
        field: FieldDefinition,
        supplier: impl DataSupplier + 'static,
        rng: ChaCha20Rng,
    ) -> Result<Self, Error> {
        if n_parties < 2 {
            return Err(Error::invariant("at least 2 parties are required"));
        }
        if my_id >= n_parties {
            return Err(Error::invariant(format!(
                "party {my_id} does not exist among {n_parties} parties"
            )));
        }
        Ok(Self {
            my_id,
            n_parties,
            field,
            rng,
            supplier: Box::new(supplier),
            opened: OpenedValueStore::default(),
        })
    }

    /// The id of this party.
    pub fn my_id(&self) -> usize {
        self.my_id
    }

    /// The number of parties taking part in the computation.
    pub fn no_of_parties(&self) -> usize {
        self.n_parties
    }

    /// The field all values live in.
    pub fn field(&self) -> FieldDefinition {
        self.field
    }

    /// The serializer matching [`ResourcePool::field`].
    pub fn serializer(&self) -> FieldSerializer {
        self.field.serializer()
    }

    /// The local cryptographically secure RNG.
    pub fn rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.rng
    }

    /// The preprocessing supplier.
    pub fn supplier(&mut self) -> &mut dyn DataSupplier {
        self.supplier.as_mut()
    }

    /// This party's share of the MAC key.
    pub fn mac_key_share(&self) -> MacKeyShare {
        self.supplier.mac_key_share()
    }

    /// Values opened since the last MAC check.
    pub fn opened_values(&mut self) -> &mut OpenedValueStore {
        &mut self.opened
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{field::MODULUS_61, preprocessing::DummyDataSupplier};

    #[test]
    fn drain_resets_the_store() {
        let f = FieldDefinition::new(MODULUS_61).unwrap();
        let mut store = OpenedValueStore::default();
        store.push(f.element(1), f.element(2));
        store.push(f.element(3), f.element(4));
        assert_eq!(store.len(), 2);
        assert_eq!(store.drain().len(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn rejects_unknown_party() {
        let f = FieldDefinition::new(MODULUS_61).unwrap();
        let supplier = DummyDataSupplier::new(0, 2, f, [0; 32]).unwrap();
        assert!(ResourcePool::new(2, 2, f, supplier).is_err());
    }
}
