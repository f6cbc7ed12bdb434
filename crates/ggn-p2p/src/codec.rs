use crate::error::{P2pError, P2pResult};
use crate::message::{Envelope, EnvelopeRef, MAX_MESSAGE_SIZE};

/// Size of the big-endian length prefix.
pub const LEN_SIZE: usize = 4;

/// Codec for structured frames.
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a payload with framing: [4 bytes len][bincode envelope]
    pub fn encode(payload: &[u8]) -> P2pResult<Vec<u8>> {
        let body = bincode::serialize(&EnvelopeRef { payload })
            .map_err(|e| P2pError::Encode(e.to_string()))?;
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(P2pError::FrameTooLarge {
                size: body.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        let mut buf = Vec::with_capacity(LEN_SIZE + body.len());
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Body length announced by a frame header, checked against `max`.
    pub fn body_len(header: [u8; LEN_SIZE], max: usize) -> P2pResult<usize> {
        let len = u32::from_be_bytes(header) as usize;
        if len == 0 {
            return Err(P2pError::Framing("zero-length frame".into()));
        }
        if len > max {
            return Err(P2pError::FrameTooLarge { size: len, max });
        }
        Ok(len)
    }

    /// Decode a framed payload. Returns (payload, bytes_consumed).
    pub fn decode(data: &[u8]) -> P2pResult<(Vec<u8>, usize)> {
        if data.len() < LEN_SIZE {
            return Err(P2pError::Framing("too short".into()));
        }
        let mut header = [0u8; LEN_SIZE];
        header.copy_from_slice(&data[..LEN_SIZE]);
        let len = Self::body_len(header, MAX_MESSAGE_SIZE)?;
        let total = LEN_SIZE + len;
        if data.len() < total {
            return Err(P2pError::Framing(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let payload = Self::decode_body(&data[LEN_SIZE..total])?;
        Ok((payload, total))
    }

    /// Decode a frame body (no length prefix).
    pub fn decode_body(body: &[u8]) -> P2pResult<Vec<u8>> {
        let envelope: Envelope =
            bincode::deserialize(body).map_err(|e| P2pError::Decode(e.to_string()))?;
        Ok(envelope.payload)
    }
}
