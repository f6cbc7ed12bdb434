use std::path::PathBuf;

use ggn_crypto::KeyDigest;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::traits::PathTransform;
use crate::transform::{CasTransform, IdentityTransform, DEFAULT_BLOCK_SIZE};

/// Root folder used when none is configured.
pub const DEFAULT_ROOT_FOLDER_NAME: &str = "GGNetwork";

/// Which [`PathTransform`] a store uses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransformConfig {
    /// `key/key`, see [`IdentityTransform`].
    #[default]
    Identity,
    /// Digest + shard, see [`CasTransform`].
    Cas {
        #[serde(default)]
        digest: KeyDigest,
        #[serde(default = "default_block_size")]
        block_size: usize,
    },
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

impl TransformConfig {
    /// The production layout: SHA-1 with 5-character shards.
    pub fn cas() -> Self {
        Self::Cas {
            digest: KeyDigest::default(),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn build(&self) -> StoreResult<Box<dyn PathTransform>> {
        Ok(match *self {
            Self::Identity => Box::new(IdentityTransform),
            Self::Cas { digest, block_size } => Box::new(CasTransform::new(digest, block_size)?),
        })
    }
}

/// Construction-time store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub transform: TransformConfig,
}

fn default_root() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT_FOLDER_NAME)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            transform: TransformConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.root, PathBuf::from("GGNetwork"));
        assert_eq!(c.transform, TransformConfig::Identity);
    }

    #[test]
    fn parse_cas_from_toml() {
        let c: StoreConfig = toml::from_str(
            r#"
            root = "/var/lib/ggn"
            [transform]
            kind = "cas"
            digest = "blake3"
            block_size = 8
            "#,
        )
        .unwrap();
        assert_eq!(c.root, PathBuf::from("/var/lib/ggn"));
        assert_eq!(
            c.transform,
            TransformConfig::Cas { digest: KeyDigest::Blake3, block_size: 8 }
        );
    }

    #[test]
    fn cas_fields_default() {
        let c: StoreConfig = toml::from_str("[transform]\nkind = \"cas\"").unwrap();
        assert_eq!(c.transform, TransformConfig::cas());
        assert_eq!(c.root, PathBuf::from(DEFAULT_ROOT_FOLDER_NAME));
    }

    #[test]
    fn build_rejects_invalid_block_size() {
        let c = TransformConfig::Cas { digest: KeyDigest::Sha1, block_size: 0 };
        assert!(c.build().is_err());
    }

    #[test]
    fn build_identity() {
        let t = TransformConfig::Identity.build().unwrap();
        assert_eq!(t.transform("k").full_path(), "k/k");
    }
}
