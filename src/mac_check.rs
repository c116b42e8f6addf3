//! Batched MAC checking of opened values, built from commitments and coin tossing.
//!
//! Instead of validating every opened value on its own, all values opened since the last check
//! are combined into one random linear combination. The random coefficients come from a jointly
//! tossed seed, so no party can predict them before it committed to its shares.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::{
    DRes,
    data_types::MacKeyShare,
    engine::ProtocolBuilder,
    error::Error,
    field::FieldElement,
};

const NONCE_LEN: usize = 32;

/// Commits to a value using the BLAKE3 cryptographic hash function, binding the commitment to the
/// committing party.
///
/// This is not a general-purpose commitment scheme, the committed value must contain a fresh
/// random nonce.
pub(crate) fn commit(value: &[u8], party: usize) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(value);
    hasher.update(&(party as u16).to_be_bytes());
    *hasher.finalize().as_bytes()
}

/// Verifies that `value` opens the `commitment` of `party`.
pub(crate) fn open_commitment(commitment: &[u8], value: &[u8], party: usize) -> bool {
    bool::from(commit(value, party).as_slice().ct_eq(commitment))
}

/// Lets every party contribute `value` such that nobody can choose its contribution after
/// seeing the others.
///
/// Commitments are broadcast (with validation) before any opening is sent. The result holds
/// every party's value, indexed by party id.
pub fn commit_and_open(
    builder: &mut ProtocolBuilder,
    value: DRes<Vec<u8>>,
) -> DRes<Vec<Vec<u8>>> {
    builder.seq(move |b| {
        let committed = b.compute(move |pool| {
            let mut opening = value.out();
            let mut nonce = [0; NONCE_LEN];
            pool.rng().fill_bytes(&mut nonce);
            opening.extend_from_slice(&nonce);
            Ok((commit(&opening, pool.my_id()).to_vec(), opening))
        });
        let commitments = b.broadcast(committed.map(|(commitment, _)| commitment));
        let openings = b.insecure_broadcast(committed.map(|(_, opening)| opening));
        Ok(b.compute(move |_| {
            let commitments = commitments.out();
            let mut values = openings.out();
            for (p, (commitment, opening)) in commitments.iter().zip(&mut values).enumerate() {
                if opening.len() < NONCE_LEN || !open_commitment(commitment, opening, p) {
                    return Err(Error::malicious(format!(
                        "commitment of party {p} could not be opened"
                    )));
                }
                opening.truncate(opening.len() - NONCE_LEN);
            }
            Ok(values)
        }))
    })
}

/// Jointly tosses a 256-bit seed. The seed is uniform as long as one party is honest.
pub fn coin_toss(builder: &mut ProtocolBuilder) -> DRes<[u8; 32]> {
    builder.seq(|b| {
        let own = b.compute(|pool| {
            let mut seed = [0; 32];
            pool.rng().fill_bytes(&mut seed);
            Ok(seed.to_vec())
        });
        let seeds = commit_and_open(b, own);
        Ok(b.compute(move |_| {
            let mut xor = [0u8; 32];
            for (p, seed) in seeds.out().iter().enumerate() {
                if seed.len() != xor.len() {
                    return Err(Error::malicious(format!(
                        "party {p} contributed a seed of {} bytes",
                        seed.len()
                    )));
                }
                xor.iter_mut().zip(seed).for_each(|(x, s)| *x ^= s);
            }
            Ok(xor)
        }))
    })
}

/// Builds the check of a drained batch of `(opened value, own MAC share)` pairs.
///
/// With challenges `r_j` from a coin toss, every party computes
/// `sigma_i = sum(r_j * mac_ij) - alpha_i * sum(r_j * v_j)` and commits to it. After opening, the
/// sigmas must sum to zero, otherwise some opened value was inconsistent with its MAC and the
/// check fails with [`Error::MaliciousBehavior`].
pub fn build_mac_check(
    builder: &mut ProtocolBuilder,
    opened: Vec<(FieldElement, FieldElement)>,
    key: MacKeyShare,
) -> DRes<()> {
    builder.seq(move |b| {
        let seed = coin_toss(b);
        let sigma = b.compute(move |pool| {
            let field = pool.field();
            let mut rng = ChaCha20Rng::from_seed(seed.out());
            let mut value = field.zero();
            let mut mac = field.zero();
            for (v, m) in &opened {
                let r = field.sample(&mut rng);
                value += r * *v;
                mac += r * *m;
            }
            Ok(pool.serializer().serialize(&(mac - key.value() * value)))
        });
        let sigmas = commit_and_open(b, sigma);
        Ok(b.compute(move |pool| {
            let serializer = pool.serializer();
            let mut sum = pool.field().zero();
            for sigma in sigmas.out() {
                sum += serializer.deserialize(&sigma)?;
            }
            if !sum.is_zero() {
                return Err(Error::malicious("MAC check failed"));
            }
            debug!(party = pool.my_id(), "mac check passed");
            Ok(())
        }))
    })
}
