//! The round-batched network that native protocols talk to.
//!
//! Native protocols never touch the [`Channel`] directly. Everything they send in round `k` is
//! buffered and delivered in one message per peer when the evaluator calls
//! [`BatchedNetwork::exchange`], and can be read by the receiving protocol in round `k + 1`.

use std::collections::VecDeque;

use tracing::trace;

use crate::{
    channel::{self, Channel, ErrorKind},
    error::Error,
};

/// Point-to-point and all-to-all messaging between numbered parties.
///
/// Messages sent to oneself are delivered like any other message, so that `receive_from_all`
/// returns one message per party including the own one.
pub trait Network {
    /// The id of this party.
    fn my_id(&self) -> usize;

    /// The number of parties.
    fn no_of_parties(&self) -> usize;

    /// Queues a message for `party`.
    fn send(&mut self, party: usize, msg: Vec<u8>);

    /// Takes the next message that `party` sent in the previous round.
    fn receive(&mut self, party: usize) -> Result<Vec<u8>, Error>;

    /// Queues the same message for every party (including this one).
    fn send_to_all(&mut self, msg: Vec<u8>) {
        for p in 0..self.no_of_parties() {
            self.send(p, msg.clone());
        }
    }

    /// Takes the next message of every party, indexed by party id.
    fn receive_from_all(&mut self) -> Result<Vec<Vec<u8>>, Error> {
        (0..self.no_of_parties()).map(|p| self.receive(p)).collect()
    }
}

/// A [`Network`] that buffers a whole round and exchanges it in one go.
#[derive(Debug)]
pub struct BatchedNetwork {
    my_id: usize,
    n_parties: usize,
    outgoing: Vec<Vec<Vec<u8>>>,
    incoming: Vec<VecDeque<Vec<u8>>>,
}

impl BatchedNetwork {
    /// Creates an empty network for party `my_id` of `n_parties`.
    pub fn new(my_id: usize, n_parties: usize) -> Self {
        Self {
            my_id,
            n_parties,
            outgoing: vec![vec![]; n_parties],
            incoming: vec![VecDeque::new(); n_parties],
        }
    }

    /// Sends the buffered messages of this round to every peer and receives theirs.
    ///
    /// Exactly one batch (possibly empty) is exchanged with every peer, which keeps all parties in
    /// lock-step as long as they evaluate the same schedule.
    pub async fn exchange(&mut self, channel: &impl Channel, round: usize) -> Result<(), Error> {
        let me = self.my_id;
        let phase = format!("round {round}");
        let mut outgoing: Vec<Vec<Vec<u8>>> = vec![vec![]; self.n_parties];
        std::mem::swap(&mut outgoing, &mut self.outgoing);
        let own = std::mem::take(&mut outgoing[me]);
        self.incoming[me].extend(own);

        let received = channel::scatter(channel, me, &phase, &outgoing).await?;
        for (p, batch) in received.into_iter().enumerate().filter(|(p, _)| *p != me) {
            trace!(round, from = p, msgs = batch.len(), "received batch");
            self.incoming[p].extend(batch);
        }
        Ok(())
    }

    /// Returns `true` if nothing is buffered in either direction.
    pub fn is_idle(&self) -> bool {
        self.outgoing.iter().all(Vec::is_empty) && self.incoming.iter().all(VecDeque::is_empty)
    }

    /// Fails if messages of a finished batch were never read, which would misalign every later
    /// round.
    pub(crate) fn ensure_drained(&self) -> Result<(), Error> {
        if let Some(p) = self.incoming.iter().position(|q| !q.is_empty()) {
            return Err(Error::invariant(format!(
                "{} unread message(s) from party {p} after the batch completed",
                self.incoming[p].len()
            )));
        }
        if let Some(p) = self.outgoing.iter().position(|q| !q.is_empty()) {
            return Err(Error::invariant(format!(
                "message(s) for party {p} were queued after the last exchange of the batch"
            )));
        }
        Ok(())
    }
}

impl Network for BatchedNetwork {
    fn my_id(&self) -> usize {
        self.my_id
    }

    fn no_of_parties(&self) -> usize {
        self.n_parties
    }

    fn send(&mut self, party: usize, msg: Vec<u8>) {
        self.outgoing[party].push(msg);
    }

    fn receive(&mut self, party: usize) -> Result<Vec<u8>, Error> {
        self.incoming
            .get_mut(party)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| {
                Error::Network(channel::Error {
                    phase: format!("reading message from party {party}"),
                    reason: ErrorKind::RecvError("no message was delivered".into()),
                })
            })
    }
}
