use ggn_crypto::KeyDigest;

use crate::error::{StoreError, StoreResult};
use crate::path::PathKey;
use crate::traits::PathTransform;

/// Shard width used by [`CasTransform::default`].
pub const DEFAULT_BLOCK_SIZE: usize = 5;

/// Content-addressed layout: digest the key, hex-encode it, and split the hex
/// into `hex_len / block_size` directory shards of `block_size` characters.
///
/// The full hex digest is the file name. When `block_size` does not divide the
/// digest length the trailing partial block is not used as a directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CasTransform {
    digest: KeyDigest,
    block_size: usize,
}

impl CasTransform {
    pub fn new(digest: KeyDigest, block_size: usize) -> StoreResult<Self> {
        if block_size == 0 || block_size > digest.hex_len() {
            return Err(StoreError::InvalidBlockSize {
                block_size,
                digest_len: digest.hex_len(),
            });
        }
        Ok(Self { digest, block_size })
    }

    pub fn digest(&self) -> KeyDigest {
        self.digest
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of directory shards every key maps to.
    pub fn depth(&self) -> usize {
        self.digest.hex_len() / self.block_size
    }
}

impl Default for CasTransform {
    fn default() -> Self {
        Self {
            digest: KeyDigest::default(),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl PathTransform for CasTransform {
    fn transform(&self, key: &str) -> PathKey {
        let hash = self.digest.hex(key.as_bytes());
        let path_name = hash
            .as_bytes()
            .chunks_exact(self.block_size)
            // hex output is ASCII, so every chunk is valid UTF-8
            .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("/");
        PathKey {
            path_name,
            file_name: hash,
        }
    }
}

/// Stores every key at `key/key`. For tests and debugging only: keys become
/// paths verbatim, so the store validates them before use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdentityTransform;

impl PathTransform for IdentityTransform {
    fn transform(&self, key: &str) -> PathKey {
        PathKey::new(key, key)
    }

    fn is_content_addressed(&self) -> bool {
        false
    }
}
