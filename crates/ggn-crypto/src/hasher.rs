use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Digest algorithm used to turn a logical key into a content address.
///
/// The hex encoding of the digest is both the stored file name and the source
/// of the directory shards, so changing the algorithm changes the on-disk
/// layout of every key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyDigest {
    /// SHA-1, 40 hex characters.
    #[default]
    Sha1,
    /// BLAKE3, 64 hex characters.
    Blake3,
}

impl KeyDigest {
    /// Raw digest bytes of `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Blake3 => blake3::hash(data).as_bytes().to_vec(),
        }
    }

    /// Lowercase hex digest of `data`.
    pub fn hex(&self, data: &[u8]) -> String {
        hex::encode(self.digest(data))
    }

    /// Length in characters of [`KeyDigest::hex`] output.
    pub const fn hex_len(&self) -> usize {
        match self {
            Self::Sha1 => 40,
            Self::Blake3 => 64,
        }
    }

    /// Algorithm name as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Blake3 => "blake3",
        }
    }
}

impl std::fmt::Display for KeyDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
