//! Broadcast with abort: an insecure all-to-all send plus a separate digest check.

use subtle::ConstantTimeEq;

use super::{EvaluationStatus, NativeProtocol, Output, publish};
use crate::{
    DRes,
    error::Error,
    field::{deserialize_byte_arrays, serialize_byte_arrays},
    network::Network,
    resource_pool::ResourcePool,
};

/// Sends the same payload to every party and returns all payloads, indexed by party.
///
/// Payloads travel with a 2-byte length prefix and are limited to `u16::MAX` bytes. A cheating
/// sender can equivocate, callers that need consistency across parties must follow up with
/// [`BroadcastValidation`].
pub(crate) struct Broadcast {
    payload: DRes<Vec<u8>>,
    output: Output<Vec<Vec<u8>>>,
}

impl Broadcast {
    pub(crate) fn new(payload: DRes<Vec<u8>>, output: Output<Vec<Vec<u8>>>) -> Self {
        Self { payload, output }
    }
}

impl NativeProtocol for Broadcast {
    fn evaluate(
        &mut self,
        round: usize,
        _pool: &mut ResourcePool,
        network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error> {
        match round {
            0 => {
                let payload = self.payload.out();
                network.send_to_all(serialize_byte_arrays(std::slice::from_ref(&payload))?);
                Ok(EvaluationStatus::HasMoreRounds)
            }
            1 => {
                let mut payloads = vec![];
                for (p, framed) in network.receive_from_all()?.iter().enumerate() {
                    let mut arrays = deserialize_byte_arrays(framed)?;
                    match (arrays.pop(), arrays.is_empty()) {
                        (Some(payload), true) => payloads.push(payload),
                        _ => {
                            return Err(Error::malicious(format!(
                                "party {p} did not broadcast exactly one payload"
                            )));
                        }
                    }
                }
                publish(&self.output, payloads)?;
                Ok(EvaluationStatus::IsDone)
            }
            r => Err(Error::invariant(format!(
                "broadcast evaluated in unexpected round {r}"
            ))),
        }
    }
}

/// Hashes all payloads received in a broadcast into a single digest.
///
/// The payloads are hashed in their length-prefixed wire framing, so different splits of the
/// same bytes hash differently.
pub(crate) fn digest(messages: &[Vec<u8>]) -> Result<[u8; 32], Error> {
    Ok(*blake3::hash(&serialize_byte_arrays(messages)?).as_bytes())
}

/// Checks that all parties received the same broadcast messages.
///
/// Each party sends the digest of what it received to everybody and compares the digests it gets
/// back to its own. Any mismatch is reported as malicious behavior.
pub(crate) struct BroadcastValidation {
    messages: DRes<Vec<Vec<u8>>>,
    own: Option<[u8; 32]>,
    output: Output<()>,
}

impl BroadcastValidation {
    pub(crate) fn new(messages: DRes<Vec<Vec<u8>>>, output: Output<()>) -> Self {
        Self {
            messages,
            own: None,
            output,
        }
    }
}

impl NativeProtocol for BroadcastValidation {
    fn evaluate(
        &mut self,
        round: usize,
        _pool: &mut ResourcePool,
        network: &mut dyn Network,
    ) -> Result<EvaluationStatus, Error> {
        match round {
            0 => {
                let own = digest(&self.messages.out())?;
                network.send_to_all(own.to_vec());
                self.own = Some(own);
                Ok(EvaluationStatus::HasMoreRounds)
            }
            1 => {
                let own = self
                    .own
                    .ok_or_else(|| Error::invariant("broadcast validation without digest"))?;
                for (p, digest) in network.receive_from_all()?.iter().enumerate() {
                    if !bool::from(digest.as_slice().ct_eq(own.as_slice())) {
                        return Err(Error::malicious(format!(
                            "broadcast validation failed: party {p} received different messages"
                        )));
                    }
                }
                publish(&self.output, ())?;
                Ok(EvaluationStatus::IsDone)
            }
            r => Err(Error::invariant(format!(
                "broadcast validation evaluated in unexpected round {r}"
            ))),
        }
    }
}
