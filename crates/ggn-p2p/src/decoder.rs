use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::{FrameCodec, LEN_SIZE};
use crate::error::{P2pError, P2pResult};
use crate::message::{DEFAULT_RAW_CHUNK_SIZE, MAX_MESSAGE_SIZE};

/// Extracts one message payload from a peer's byte stream.
///
/// A decoder is called repeatedly by a peer's decode loop. Any error ends that
/// loop; end of stream is reported as [`P2pError::ConnectionClosed`].
#[async_trait]
pub trait Decoder: Send + Sync {
    async fn decode(&self, reader: &mut (dyn AsyncRead + Unpin + Send)) -> P2pResult<Bytes>;
}

/// Structured decoder: one length-prefixed bincode frame per message, as
/// produced by [`FrameCodec::encode`].
#[derive(Clone, Copy, Debug)]
pub struct BincodeDecoder {
    max_frame_size: usize,
}

impl BincodeDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for BincodeDecoder {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

#[async_trait]
impl Decoder for BincodeDecoder {
    async fn decode(&self, reader: &mut (dyn AsyncRead + Unpin + Send)) -> P2pResult<Bytes> {
        let mut header = [0u8; LEN_SIZE];
        if let Err(e) = reader.read_exact(&mut header).await {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => P2pError::ConnectionClosed,
                _ => P2pError::Io(e),
            });
        }
        let len = FrameCodec::body_len(header, self.max_frame_size)?;
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;
        Ok(Bytes::from(FrameCodec::decode_body(&body)?))
    }
}

/// Raw decoder: the payload is whatever a single `read` returns, up to
/// `chunk_size` bytes.
///
/// This decoder does no framing. A logical message longer than `chunk_size`
/// arrives as several payloads, and short messages written back to back may
/// arrive merged into one. Use it only where the application frames its own
/// data.
#[derive(Clone, Copy, Debug)]
pub struct RawDecoder {
    chunk_size: usize,
}

impl RawDecoder {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for RawDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_RAW_CHUNK_SIZE)
    }
}

#[async_trait]
impl Decoder for RawDecoder {
    async fn decode(&self, reader: &mut (dyn AsyncRead + Unpin + Send)) -> P2pResult<Bytes> {
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(P2pError::ConnectionClosed);
        }
        buf.truncate(n);
        Ok(buf.freeze())
    }
}

/// Decoder selection for configuration files.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DecoderKind {
    #[default]
    Bincode,
    Raw {
        #[serde(default = "default_chunk_size")]
        chunk_size: usize,
    },
}

fn default_chunk_size() -> usize {
    DEFAULT_RAW_CHUNK_SIZE
}

impl DecoderKind {
    pub fn build(&self) -> Arc<dyn Decoder> {
        match *self {
            Self::Bincode => Arc::new(BincodeDecoder::default()),
            Self::Raw { chunk_size } => Arc::new(RawDecoder::new(chunk_size)),
        }
    }
}
