use std::net::SocketAddr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Largest payload a structured frame may carry.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Read size of the raw decoder.
pub const DEFAULT_RAW_CHUNK_SIZE: usize = 1028;

/// One inbound message as handed to the consumer.
///
/// The transport fills `from` with the remote address of the peer whose
/// decode loop produced the message. `payload` is opaque to this crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rpc {
    pub from: SocketAddr,
    pub payload: Bytes,
}

/// Serialized body of a structured frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub payload: Vec<u8>,
}

/// Borrowed form of [`Envelope`] for encoding without copying the payload.
#[derive(Serialize)]
pub(crate) struct EnvelopeRef<'a> {
    pub payload: &'a [u8],
}
