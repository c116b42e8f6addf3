//! IKNP oblivious transfer extension (cf. <https://eprint.iacr.org/2003/196>) with the
//! consistency check of Keller-Orsini-Scholl (cf. <https://eprint.iacr.org/2015/546>).
//!
//! The extension sender picks a secret `delta` of `k` bits and acts as the *receiver* of `k`
//! base OTs with `delta` as choice bits. The extension receiver acts as the base OT sender. Both
//! expand the base OT keys with a PRG into the columns of a bit matrix, so that afterwards every
//! row satisfies `q_i = t_i ^ (r_i * delta)`, where `r_i` is the receiver's choice bit.
//!
//! The KOS check multiplies every row with a jointly tossed challenge as polynomials over
//! `GF(2)`. The products are not reduced modulo an irreducible polynomial, which keeps the check
//! linear for every `k` that is a multiple of 8.

use rand::{CryptoRng, Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use tracing::{Level, debug, instrument};

use super::{
    OtConfig, OtError, base,
    bits::{BitVector, clmul, transpose},
    shared_rng,
};
use crate::channel::{Channel, recv_from, recv_vec_from, send_to};

/// The correlation check message: `x = sum(r_i * chi_i)` and `t = sum(t_i * chi_i)`.
type CheckMessage = (Vec<u8>, Vec<u8>);

fn challenges(rng: &mut ChaCha20Rng, rows: usize, k: usize) -> Vec<BitVector> {
    (0..rows).map(|_| BitVector::random(rng, k)).collect()
}

fn malformed(party: usize, phase: &'static str) -> OtError {
    OtError::MalformedMessage { party, phase }
}

/// The sending side of correlated OTs with a fixed global correlation `delta`.
pub struct CoteSender {
    p_own: usize,
    p_to: usize,
    config: OtConfig,
    delta: BitVector,
    prgs: Vec<ChaCha20Rng>,
    rng: ChaCha20Rng,
}

impl std::fmt::Debug for CoteSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoteSender")
            .field("p_own", &self.p_own)
            .field("p_to", &self.p_to)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CoteSender {
    /// Runs the base OTs with `p_to`.
    #[instrument(level = Level::DEBUG, skip(channel, rng), err)]
    pub async fn setup(
        channel: &impl Channel,
        p_own: usize,
        p_to: usize,
        config: OtConfig,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<Self, OtError> {
        config.validate()?;
        let delta = BitVector::random(rng, config.security_parameter);
        let choices: Vec<bool> = delta.iter().collect();
        let keys = base::receive_random(channel, p_to, &choices, rng).await?;
        Ok(Self {
            p_own,
            p_to,
            config,
            delta,
            prgs: keys.into_iter().map(ChaCha20Rng::from_seed).collect(),
            rng: ChaCha20Rng::from_seed(rng.random()),
        })
    }

    /// The global correlation of all OTs produced by this sender.
    pub fn delta(&self) -> &BitVector {
        &self.delta
    }

    /// Extends `n` correlated OTs: row `i` is `q_i`, the receiver holds `q_i ^ (r_i * delta)`.
    ///
    /// Every call consumes fresh PRG output, rows are never reused across calls.
    pub async fn extend(&mut self, channel: &impl Channel, n: usize) -> Result<Vec<BitVector>, OtError> {
        let k = self.config.security_parameter;
        let total = self.config.padded(n);
        let us: Vec<Vec<u8>> = recv_vec_from(channel, self.p_to, "OT extension u", k).await?;
        let mut columns = Vec::with_capacity(k);
        for (j, (u, prg)) in us.into_iter().zip(&mut self.prgs).enumerate() {
            let u = BitVector::from_bytes(u, total)
                .ok_or_else(|| malformed(self.p_to, "OT extension u"))?;
            let mut bytes = vec![0; total / 8];
            prg.fill_bytes(&mut bytes);
            let mut q = BitVector::from_bytes(bytes, total)
                .ok_or_else(|| OtError::InvalidParameters("column length".into()))?;
            if self.delta.get(j) {
                q ^= &u;
            }
            columns.push(q);
        }
        let mut rows = transpose(&columns);

        let mut shared = shared_rng(channel, self.p_own, self.p_to, &mut self.rng).await?;
        let chis = challenges(&mut shared, total, k);
        let mut expected = BitVector::zeros(2 * k);
        for (q, chi) in rows.iter().zip(&chis) {
            expected ^= &clmul(q, chi);
        }
        let (x, t): CheckMessage = recv_from(channel, self.p_to, "OT extension check").await?;
        let x = BitVector::from_bytes(x, k).ok_or_else(|| malformed(self.p_to, "check x"))?;
        let t = BitVector::from_bytes(t, 2 * k).ok_or_else(|| malformed(self.p_to, "check t"))?;
        if &t ^ &clmul(&x, &self.delta) != expected {
            return Err(OtError::ConsistencyCheckFailed(self.p_to));
        }
        rows.truncate(n);
        debug!(p_to = self.p_to, n, "extended correlated OTs");
        Ok(rows)
    }
}

/// The receiving side of correlated OTs.
pub struct CoteReceiver {
    p_own: usize,
    p_to: usize,
    config: OtConfig,
    prgs: Vec<(ChaCha20Rng, ChaCha20Rng)>,
    rng: ChaCha20Rng,
}

impl std::fmt::Debug for CoteReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoteReceiver")
            .field("p_own", &self.p_own)
            .field("p_to", &self.p_to)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CoteReceiver {
    /// Runs the base OTs with `p_to`.
    #[instrument(level = Level::DEBUG, skip(channel, rng), err)]
    pub async fn setup(
        channel: &impl Channel,
        p_own: usize,
        p_to: usize,
        config: OtConfig,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<Self, OtError> {
        config.validate()?;
        let keys = base::send_random(channel, p_to, config.security_parameter, rng).await?;
        Ok(Self {
            p_own,
            p_to,
            config,
            prgs: keys
                .into_iter()
                .map(|(k0, k1)| (ChaCha20Rng::from_seed(k0), ChaCha20Rng::from_seed(k1)))
                .collect(),
            rng: ChaCha20Rng::from_seed(rng.random()),
        })
    }

    /// Extends one correlated OT per choice bit and returns the rows `t_i`.
    pub async fn extend(
        &mut self,
        channel: &impl Channel,
        choices: &[bool],
    ) -> Result<Vec<BitVector>, OtError> {
        let k = self.config.security_parameter;
        let n = choices.len();
        let total = self.config.padded(n);
        let mut r = BitVector::random(&mut self.rng, total);
        for (i, c) in choices.iter().enumerate() {
            r.set(i, *c);
        }
        let mut columns = Vec::with_capacity(k);
        let mut us = Vec::with_capacity(k);
        for (prg0, prg1) in &mut self.prgs {
            let mut t = vec![0; total / 8];
            let mut u = vec![0; total / 8];
            prg0.fill_bytes(&mut t);
            prg1.fill_bytes(&mut u);
            u.iter_mut()
                .zip(&t)
                .zip(r.as_bytes())
                .for_each(|((u, t), r)| *u ^= t ^ r);
            us.push(u);
            columns.push(
                BitVector::from_bytes(t, total)
                    .ok_or_else(|| OtError::InvalidParameters("column length".into()))?,
            );
        }
        send_to(channel, self.p_to, "OT extension u", &us).await?;
        let mut rows = transpose(&columns);

        let mut shared = shared_rng(channel, self.p_own, self.p_to, &mut self.rng).await?;
        let chis = challenges(&mut shared, total, k);
        let mut x = BitVector::zeros(k);
        let mut t = BitVector::zeros(2 * k);
        for (i, (row, chi)) in rows.iter().zip(&chis).enumerate() {
            if r.get(i) {
                x ^= chi;
            }
            t ^= &clmul(row, chi);
        }
        let check: CheckMessage = (x.into_bytes(), t.into_bytes());
        send_to(channel, self.p_to, "OT extension check", &check).await?;
        rows.truncate(n);
        Ok(rows)
    }
}

/// Hashes row `row` of OT instance `index` into `len` bytes.
///
/// The first 32 bytes are `SHA-256(index || row)`, longer outputs append further blocks that also
/// hash in a block counter.
fn hash_row(index: u64, row: &BitVector, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut block = 0u32;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(index.to_be_bytes());
        hasher.update(row.as_bytes());
        if block > 0 {
            hasher.update(block.to_be_bytes());
        }
        out.extend_from_slice(&hasher.finalize());
        block += 1;
    }
    out.truncate(len);
    out
}

fn xor_bytes(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(a, b)| a ^ b).collect()
}

/// Random and chosen-message OTs, sender side.
#[derive(Debug)]
pub struct RotSender {
    cote: CoteSender,
    counter: u64,
}

impl RotSender {
    /// Runs the base OTs with `p_to`.
    pub async fn setup(
        channel: &impl Channel,
        p_own: usize,
        p_to: usize,
        config: OtConfig,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<Self, OtError> {
        let cote = CoteSender::setup(channel, p_own, p_to, config, rng).await?;
        Ok(Self { cote, counter: 0 })
    }

    /// `n` random OTs with messages of `len` bytes.
    pub async fn random_messages(
        &mut self,
        channel: &impl Channel,
        n: usize,
        len: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, OtError> {
        let rows = self.cote.extend(channel, n).await?;
        let delta = self.cote.delta();
        let messages = rows
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let index = self.counter + i as u64;
                (
                    hash_row(index, q, len),
                    hash_row(index, &(q ^ delta), len),
                )
            })
            .collect();
        self.counter += n as u64;
        Ok(messages)
    }

    /// Sends one of the two messages of every pair, as selected by the receiver's choice bits.
    ///
    /// Both messages of a pair must have the same length.
    pub async fn send(
        &mut self,
        channel: &impl Channel,
        messages: &[(Vec<u8>, Vec<u8>)],
    ) -> Result<(), OtError> {
        if let Some(i) = messages.iter().position(|(m0, m1)| m0.len() != m1.len()) {
            return Err(OtError::InvalidParameters(format!(
                "messages of OT {i} differ in length"
            )));
        }
        let rows = self.cote.extend(channel, messages.len()).await?;
        let delta = self.cote.delta();
        let masked: Vec<(Vec<u8>, Vec<u8>)> = rows
            .iter()
            .zip(messages)
            .enumerate()
            .map(|(i, (q, (m0, m1)))| {
                let index = self.counter + i as u64;
                (
                    xor_bytes(m0, &hash_row(index, q, m0.len())),
                    xor_bytes(m1, &hash_row(index, &(q ^ delta), m1.len())),
                )
            })
            .collect();
        self.counter += messages.len() as u64;
        send_to(channel, self.cote.p_to, "OT masked messages", &masked).await?;
        Ok(())
    }
}

/// Random and chosen-message OTs, receiver side.
#[derive(Debug)]
pub struct RotReceiver {
    cote: CoteReceiver,
    counter: u64,
}

impl RotReceiver {
    /// Runs the base OTs with `p_to`.
    pub async fn setup(
        channel: &impl Channel,
        p_own: usize,
        p_to: usize,
        config: OtConfig,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<Self, OtError> {
        let cote = CoteReceiver::setup(channel, p_own, p_to, config, rng).await?;
        Ok(Self { cote, counter: 0 })
    }

    /// One random OT per choice bit with messages of `len` bytes.
    pub async fn random_messages(
        &mut self,
        channel: &impl Channel,
        choices: &[bool],
        len: usize,
    ) -> Result<Vec<Vec<u8>>, OtError> {
        let rows = self.cote.extend(channel, choices).await?;
        let messages = rows
            .iter()
            .enumerate()
            .map(|(i, t)| hash_row(self.counter + i as u64, t, len))
            .collect();
        self.counter += choices.len() as u64;
        Ok(messages)
    }

    /// Receives the message selected by every choice bit.
    pub async fn receive(
        &mut self,
        channel: &impl Channel,
        choices: &[bool],
    ) -> Result<Vec<Vec<u8>>, OtError> {
        let rows = self.cote.extend(channel, choices).await?;
        let p_to = self.cote.p_to;
        let masked: Vec<(Vec<u8>, Vec<u8>)> =
            recv_vec_from(channel, p_to, "OT masked messages", choices.len()).await?;
        let mut out = Vec::with_capacity(choices.len());
        for (i, ((t, (y0, y1)), c)) in rows.iter().zip(&masked).zip(choices).enumerate() {
            if y0.len() != y1.len() {
                return Err(malformed(p_to, "OT masked messages"));
            }
            let y = if *c { y1 } else { y0 };
            out.push(xor_bytes(y, &hash_row(self.counter + i as u64, t, y.len())));
        }
        self.counter += choices.len() as u64;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::try_join;
    use rand::rng;

    use super::*;
    use crate::channel::SimpleChannel;

    const SMALL: OtConfig = OtConfig {
        security_parameter: 8,
        statistical_security: 40,
    };

    async fn rot_pair(
        channels: &[SimpleChannel],
        config: OtConfig,
    ) -> Result<(RotSender, RotReceiver), OtError> {
        try_join(
            RotSender::setup(&channels[0], 0, 1, config, &mut rng()),
            RotReceiver::setup(&channels[1], 1, 0, config, &mut rng()),
        )
        .await
    }

    #[tokio::test]
    async fn chosen_messages_with_eight_base_ots() -> Result<(), OtError> {
        let channels = SimpleChannel::channels(2);
        let (mut sender, mut receiver) = rot_pair(&channels, SMALL).await?;
        let mut r = rng();
        let messages: Vec<(Vec<u8>, Vec<u8>)> = (0..100)
            .map(|_| (r.random::<[u8; 8]>().to_vec(), r.random::<[u8; 8]>().to_vec()))
            .collect();
        let choices: Vec<bool> = (0..100).map(|_| r.random()).collect();
        let ((), received) = try_join(
            sender.send(&channels[0], &messages),
            receiver.receive(&channels[1], &choices),
        )
        .await?;
        for ((m0, m1), (c, m)) in messages.iter().zip(choices.iter().zip(&received)) {
            assert_eq!(if *c { m1 } else { m0 }, m);
        }
        Ok(())
    }

    #[tokio::test]
    async fn correlated_rows_differ_by_delta() -> Result<(), OtError> {
        let channels = SimpleChannel::channels(2);
        let config = OtConfig::default();
        let (mut sender, mut receiver) = try_join(
            CoteSender::setup(&channels[0], 0, 1, config, &mut rng()),
            CoteReceiver::setup(&channels[1], 1, 0, config, &mut rng()),
        )
        .await?;
        let choices: Vec<bool> = (0..50).map(|i| i % 3 == 0).collect();
        for _ in 0..2 {
            let (qs, ts) = try_join(
                sender.extend(&channels[0], choices.len()),
                receiver.extend(&channels[1], &choices),
            )
            .await?;
            for ((q, t), c) in qs.iter().zip(&ts).zip(&choices) {
                let expected = if *c { t ^ sender.delta() } else { t.clone() };
                assert_eq!(q, &expected);
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn random_messages_are_fresh_across_calls() -> Result<(), OtError> {
        let channels = SimpleChannel::channels(2);
        let (mut sender, mut receiver) = rot_pair(&channels, SMALL).await?;
        let choices = [false, true, true];
        let mut seen = vec![];
        for _ in 0..2 {
            let (pairs, received) = try_join(
                sender.random_messages(&channels[0], choices.len(), 16),
                receiver.random_messages(&channels[1], &choices, 16),
            )
            .await?;
            for ((m0, m1), (c, m)) in pairs.iter().zip(choices.iter().zip(&received)) {
                assert_eq!(if *c { m1 } else { m0 }, m);
            }
            seen.extend(pairs);
        }
        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), seen.len());
        Ok(())
    }

    /// Flips the last byte of the `nth` message sent over the wrapped channel.
    struct Tamper<'a> {
        inner: &'a SimpleChannel,
        sent: AtomicUsize,
        nth: usize,
    }

    impl Channel for Tamper<'_> {
        type SendError = <SimpleChannel as Channel>::SendError;
        type RecvError = <SimpleChannel as Channel>::RecvError;

        async fn send_bytes_to(&self, party: usize, mut msg: Vec<u8>) -> Result<(), Self::SendError> {
            if self.sent.fetch_add(1, Ordering::SeqCst) == self.nth {
                if let Some(last) = msg.last_mut() {
                    *last ^= 1;
                }
            }
            self.inner.send_bytes_to(party, msg).await
        }

        async fn recv_bytes_from(&self, party: usize) -> Result<Vec<u8>, Self::RecvError> {
            self.inner.recv_bytes_from(party).await
        }
    }

    #[tokio::test]
    async fn tampered_check_is_detected() -> Result<(), OtError> {
        let channels = SimpleChannel::channels(2);
        // receiver messages: base OT S, then per extension: u, coin commitment, coin seed, check
        let tampered = Tamper {
            inner: &channels[1],
            sent: AtomicUsize::new(0),
            nth: 4,
        };
        let (mut sender, mut receiver) = try_join(
            CoteSender::setup(&channels[0], 0, 1, SMALL, &mut rng()),
            CoteReceiver::setup(&tampered, 1, 0, SMALL, &mut rng()),
        )
        .await?;
        let choices = vec![true; 100];
        let result = try_join(
            sender.extend(&channels[0], choices.len()),
            receiver.extend(&tampered, &choices),
        )
        .await;
        assert!(matches!(result, Err(OtError::ConsistencyCheckFailed(1))));
        Ok(())
    }
}
