//! Implementation of the Chou-Orlandi oblivious transfer protocol (cf.
//! <https://eprint.iacr.org/2015/267>) over the Ristretto group.
//!
//! Produces random OTs: the sender obtains two 32-byte keys per instance, the receiver the key
//! selected by its choice bit. Keys are derived with SHA-256 over the instance index and the
//! shared point, so that equal receiver randomness never yields equal keys across instances.

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_TABLE,
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
    traits::Identity,
};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::{Level, instrument};

use super::OtError;
use crate::{
    channel::{Channel, recv_from, recv_vec_from, send_to},
    utils::RngCompat,
};

/// A key produced by a base OT.
pub type Key = [u8; 32];

fn hash_point(index: usize, point: &RistrettoPoint) -> Key {
    let mut hasher = Sha256::new();
    hasher.update((index as u64).to_be_bytes());
    hasher.update(point.compress().as_bytes());
    hasher.finalize().into()
}

fn decompress(bytes: &[u8; 32], party: usize) -> Result<RistrettoPoint, OtError> {
    CompressedRistretto(*bytes)
        .decompress()
        .filter(|p| *p != RistrettoPoint::identity())
        .ok_or(OtError::InvalidPoint(party))
}

/// Runs `count` random OTs as the sender and returns both keys of every instance.
#[instrument(level = Level::DEBUG, skip(channel, rng), err)]
pub async fn send_random(
    channel: &impl Channel,
    p_to: usize,
    count: usize,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<Vec<(Key, Key)>, OtError> {
    let y = Scalar::random(&mut RngCompat(rng));
    let s = &y * RISTRETTO_BASEPOINT_TABLE;
    send_to(channel, p_to, "base OT S", s.compress().as_bytes()).await?;
    let rs: Vec<[u8; 32]> = recv_vec_from(channel, p_to, "base OT R", count).await?;
    let ys = y * s;
    rs.iter()
        .enumerate()
        .map(|(i, r)| {
            let yr = y * decompress(r, p_to)?;
            Ok((hash_point(i, &yr), hash_point(i, &(yr - ys))))
        })
        .collect()
}

/// Runs one random OT per choice bit as the receiver and returns the chosen keys.
#[instrument(level = Level::DEBUG, skip_all, fields(p_to, count = choices.len()), err)]
pub async fn receive_random(
    channel: &impl Channel,
    p_to: usize,
    choices: &[bool],
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<Vec<Key>, OtError> {
    let s_bytes: [u8; 32] = recv_from(channel, p_to, "base OT S").await?;
    let s = decompress(&s_bytes, p_to)?;
    let mut keys = Vec::with_capacity(choices.len());
    let mut rs = Vec::with_capacity(choices.len());
    for (i, c) in choices.iter().enumerate() {
        let x = Scalar::random(&mut RngCompat(rng));
        let xg = &x * RISTRETTO_BASEPOINT_TABLE;
        let r = if *c { s + xg } else { xg };
        rs.push(r.compress().to_bytes());
        keys.push(hash_point(i, &(x * s)));
    }
    send_to(channel, p_to, "base OT R", &rs).await?;
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use futures::future::try_join;
    use rand::rng;

    use super::*;
    use crate::channel::SimpleChannel;

    #[tokio::test]
    async fn receiver_gets_the_chosen_key() -> Result<(), OtError> {
        let channels = SimpleChannel::channels(2);
        let choices = [true, false, false, true, true];
        let (pairs, keys) = try_join(
            send_random(&channels[0], 1, choices.len(), &mut rng()),
            receive_random(&channels[1], 0, &choices, &mut rng()),
        )
        .await?;
        for ((k0, k1), (c, k)) in pairs.iter().zip(choices.iter().zip(&keys)) {
            assert_ne!(k0, k1);
            assert_eq!(if *c { k1 } else { k0 }, k);
        }
        Ok(())
    }
}
