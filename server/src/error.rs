use std::io;

use thiserror::Error;

/// Why a single client event was ignored. Never fatal to the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("identity provider rejected name {0:?}")]
    Rejected(String),
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unexpected server frame from client")]
    UnexpectedFrame,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unable to bind to server address {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("unable to read local address")]
    LocalAddr(#[source] io::Error),
}
