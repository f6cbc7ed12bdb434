//! Peer-to-peer transport for GGNetwork nodes.
//!
//! A [`TcpTransport`] accepts and dials TCP connections. Each connection
//! runs a [`Handshake`], an optional [`PeerHandler`] callback, and then a
//! decode loop that turns bytes into messages with the configured
//! [`Decoder`]. Every decoded message lands on one shared bounded channel as
//! an [`Rpc`] tagged with the sender's address.
//!
//! Framing for the structured decoder is `[u32 BE length][bincode Envelope]`,
//! see [`FrameCodec`].

pub mod codec;
pub mod config;
pub mod decoder;
pub mod error;
pub mod handshake;
pub mod hooks;
pub mod message;
pub mod peer;
mod signal;
pub mod transport;

pub use codec::FrameCodec;
pub use config::TcpTransportConfig;
pub use decoder::{BincodeDecoder, Decoder, DecoderKind, RawDecoder};
pub use error::{P2pError, P2pResult};
pub use handshake::{Handshake, HandshakeKind, NopHandshake, VersionHandshake, HANDSHAKE_MAGIC};
pub use hooks::PeerHandler;
pub use message::{Envelope, Rpc, DEFAULT_RAW_CHUNK_SIZE, MAX_MESSAGE_SIZE};
pub use peer::TcpPeer;
pub use transport::{TcpTransport, TcpTransportOpts, Transport};
