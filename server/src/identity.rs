//! Hook for the upstream identity provider consulted on registration.

use std::collections::HashSet;

pub trait IdentityProvider: Send + Sync {
    /// Whether a connection may claim `username`
    fn authorize(&self, username: &str) -> bool;
}

/// Names are authenticated before they reach the relay, so every claim is accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrustUpstream;

impl IdentityProvider for TrustUpstream {
    fn authorize(&self, _username: &str) -> bool {
        true
    }
}

/// Refuses a fixed set of names, e.g. ones reserved for operators.
#[derive(Debug, Default, Clone)]
pub struct Reserved {
    names: HashSet<String>,
}

impl Reserved {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Reserved { names: names.into_iter().map(Into::into).collect() }
    }
}

impl IdentityProvider for Reserved {
    fn authorize(&self, username: &str) -> bool {
        !self.names.contains(username)
    }
}
