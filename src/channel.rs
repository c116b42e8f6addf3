//! A communication channel used to send/receive messages to/from other parties.

use std::{fmt, future::Future, time::Duration};

use futures::future::{try_join, try_join_all};
use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::{
        Mutex,
        mpsc::{Receiver, Sender, channel, error::SendError},
    },
    time::timeout,
};
use tracing::trace;

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug)]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} during phase '{}'", self.reason, self.phase)
    }
}

impl std::error::Error for Error {}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    SendError(String),
    /// The message could not be serialized (before sending it out).
    SerdeError(String),
    /// The message is a Vec, but not of the expected length.
    InvalidLength,
}

/// A communication channel used to send/receive messages to/from another party.
///
/// Implementations must preserve message boundaries and the order of messages sent by the same
/// party. Retries (if any) are the responsibility of the implementation, the engine treats every
/// error as fatal.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given index (must be between `0..participants`).
    fn send_bytes_to(
        &self,
        party: usize,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>>;

    /// Awaits a response from the party with the given index (must be between `0..participants`).
    fn recv_bytes_from(
        &self,
        party: usize,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>>;
}

/// Serializes and sends an MPC message to the other party.
pub(crate) async fn send_to<S: Serialize + ?Sized>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    msg: &S,
) -> Result<(), Error> {
    let msg = bincode::serialize(msg).map_err(|e| Error {
        phase: format!("sending {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })?;
    trace!(party, phase, bytes = msg.len(), "send");
    channel
        .send_bytes_to(party, msg)
        .await
        .map_err(|e| Error {
            phase: phase.to_string(),
            reason: ErrorKind::SendError(format!("{e:?}")),
        })
}

/// Receives and deserializes an MPC message from the other party.
pub(crate) async fn recv_from<T: DeserializeOwned>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
) -> Result<T, Error> {
    let msg = channel.recv_bytes_from(party).await.map_err(|e| Error {
        phase: phase.to_string(),
        reason: ErrorKind::RecvError(format!("{e:?}")),
    })?;
    trace!(party, phase, bytes = msg.len(), "recv");
    bincode::deserialize(&msg).map_err(|e| Error {
        phase: format!("receiving {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })
}

/// Receives and deserializes a Vec from the other party (while checking the length).
pub(crate) async fn recv_vec_from<T: DeserializeOwned>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    len: usize,
) -> Result<Vec<T>, Error> {
    let v: Vec<T> = recv_from(channel, party, phase).await?;
    if v.len() == len {
        Ok(v)
    } else {
        Err(Error {
            phase: phase.to_string(),
            reason: ErrorKind::InvalidLength,
        })
    }
}

/// Sends `msgs[k]` to every party `k != i` and returns the messages received from all parties.
///
/// Sends and receives run concurrently, so bounded channels cannot deadlock on large rounds. The
/// own slot of the result is always empty.
pub(crate) async fn scatter<T: Serialize + DeserializeOwned>(
    channel: &impl Channel,
    i: usize,
    phase: &str,
    msgs: &[Vec<T>],
) -> Result<Vec<Vec<T>>, Error> {
    let n = msgs.len();
    let sends = try_join_all(
        (0..n)
            .filter(|k| *k != i)
            .map(|k| send_to(channel, k, phase, &msgs[k])),
    );
    let recvs = try_join_all((0..n).map(async |k| {
        if k == i {
            Ok(vec![])
        } else {
            recv_from(channel, k, phase).await
        }
    }));
    let (_, received) = try_join(sends, recvs).await?;
    Ok(received)
}

/// A simple asynchronous channel using [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Option<Sender<Vec<u8>>>>,
    r: Vec<Option<Mutex<Receiver<Vec<u8>>>>>,
    recv_timeout: Duration,
}

impl SimpleChannel {
    /// Creates channels for N parties to communicate with each other.
    pub fn channels(parties: usize) -> Vec<Self> {
        Self::channels_with_timeout(parties, Duration::from_secs(10 * 60))
    }

    /// Creates channels for N parties, failing receives that take longer than `recv_timeout`.
    pub fn channels_with_timeout(parties: usize, recv_timeout: Duration) -> Vec<Self> {
        let buffer_capacity = 1024;
        let mut channels: Vec<SimpleChannel> = (0..parties)
            .map(|_| SimpleChannel {
                s: (0..parties).map(|_| None).collect(),
                r: (0..parties).map(|_| None).collect(),
                recv_timeout,
            })
            .collect();
        for a in 0..parties {
            for b in (a + 1)..parties {
                let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
                let (send_b_to_a, recv_b_to_a) = channel(buffer_capacity);
                channels[a].s[b] = Some(send_a_to_b);
                channels[b].s[a] = Some(send_b_to_a);
                channels[a].r[b] = Some(Mutex::new(recv_b_to_a));
                channels[b].r[a] = Some(Mutex::new(recv_a_to_b));
            }
        }
        channels
    }
}

#[derive(Debug)]
/// The error raised by `recv` calls of a [`SimpleChannel`].
pub enum AsyncRecvError {
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
    /// There is no channel to the specified party.
    UnknownParty(usize),
}

impl Channel for SimpleChannel {
    type SendError = SendError<Vec<u8>>;
    type RecvError = AsyncRecvError;

    async fn send_bytes_to(&self, p: usize, msg: Vec<u8>) -> Result<(), SendError<Vec<u8>>> {
        match self.s.get(p).and_then(Option::as_ref) {
            Some(sender) => sender.send(msg).await,
            None => Err(SendError(msg)),
        }
    }

    async fn recv_bytes_from(&self, p: usize) -> Result<Vec<u8>, AsyncRecvError> {
        let Some(receiver) = self.r.get(p).and_then(Option::as_ref) else {
            return Err(AsyncRecvError::UnknownParty(p));
        };
        let mut receiver = receiver.lock().await;
        match timeout(self.recv_timeout, receiver.recv()).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}
