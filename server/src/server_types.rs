use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::Sender;

use relay_protocol::Response;

use crate::error::EventError;

// server type definitions

const COUNTER_SEED: u64 = 1;

/// Outbound queue feeding one connection's socket writer
pub type Outbound = Sender<Response>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Hands out connection ids. 64 bits wide so an id is never reused
/// for the lifetime of the process.
#[derive(Debug)]
pub struct ConnectionIds {
    counter: AtomicU64,
}

impl ConnectionIds {
    pub fn new() -> Self {
        Self { counter: AtomicU64::new(COUNTER_SEED) }
    }

    pub fn next(&self) -> ConnectionId {
        ConnectionId(self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque handle to one live connection: its id plus the sending end of
/// its outbound queue. Equality is by id only.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: Outbound,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbound: Outbound) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn outbound(&self) -> &Outbound {
        &self.outbound
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// A private message in flight. Built from a request, consumed once by routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender: String,
    pub recipient: String,
    pub content: Vec<u8>,
}

impl Envelope {
    pub fn from_fields(sender: Option<String>, recipient: Option<String>,
                       message: Option<Vec<u8>>) -> Result<Self, EventError> {
        Ok(Envelope {
            sender: required_name(sender, "sender")?,
            recipient: required_name(recipient, "recipient")?,
            content: message.ok_or(EventError::MissingField("message"))?,
        })
    }

    pub fn into_response(self) -> Response {
        Response::PrivateMessage { sender: self.sender, message: self.content }
    }
}

// an empty name counts as no name at all
pub(crate) fn required_name(value: Option<String>, field: &'static str) -> Result<String, EventError> {
    match value {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(EventError::MissingField(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn ids_are_never_reused() {
        let ids = ConnectionIds::new();
        let a = ids.next();
        let b = ids.next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn handles_compare_by_id() {
        let (tx, _rx) = mpsc::channel(1);
        let ids = ConnectionIds::new();
        let id = ids.next();
        let a = ConnectionHandle::new(id, tx.clone());
        let b = ConnectionHandle::new(id, tx.clone());
        let c = ConnectionHandle::new(ids.next(), tx);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn envelope_requires_every_field() {
        let env = Envelope::from_fields(Some("alice".into()), Some("bob".into()), Some(b"hi".to_vec()));
        assert_eq!(env.unwrap().recipient, "bob");

        assert_eq!(
            Envelope::from_fields(None, Some("bob".into()), Some(vec![])),
            Err(EventError::MissingField("sender"))
        );
        assert_eq!(
            Envelope::from_fields(Some("alice".into()), Some(String::new()), Some(vec![])),
            Err(EventError::MissingField("recipient"))
        );
        assert_eq!(
            Envelope::from_fields(Some("alice".into()), Some("bob".into()), None),
            Err(EventError::MissingField("message"))
        );
    }

    #[test]
    fn empty_payload_is_still_a_message() {
        let env = Envelope::from_fields(Some("alice".into()), Some("bob".into()), Some(vec![])).unwrap();
        assert_eq!(env.into_response(), Response::PrivateMessage { sender: "alice".into(), message: vec![] });
    }
}
