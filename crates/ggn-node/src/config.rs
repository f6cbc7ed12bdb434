use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ggn_p2p::{DecoderKind, HandshakeKind, TcpTransportConfig};
use ggn_store::{StoreConfig, TransformConfig};
use serde::{Deserialize, Serialize};

/// Everything a node needs, as read from its TOML file.
///
/// Missing sections take the node defaults below. A section that is present
/// is filled from the library defaults of that section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub transport: TcpTransportConfig,
    pub decoder: DecoderKind,
    pub handshake: HandshakeKind,
    pub store: StoreConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            transport: TcpTransportConfig {
                max_connections: Some(256),
                handshake_timeout_ms: Some(5_000),
                ..TcpTransportConfig::default()
            },
            decoder: DecoderKind::default(),
            handshake: HandshakeKind::Version { version: 1 },
            store: StoreConfig {
                transform: TransformConfig::cas(),
                ..StoreConfig::default()
            },
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to render config")
    }

    /// Apply command-line overrides on top of the file.
    pub fn with_overrides(mut self, listen: Option<String>, root: Option<PathBuf>) -> Self {
        if let Some(listen) = listen {
            self.transport.listen_addr = listen;
        }
        if let Some(root) = root {
            self.store.root = root;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = NodeConfig::default();
        assert_eq!(c.transport.listen_addr, "127.0.0.1:3000");
        assert_eq!(c.transport.max_connections, Some(256));
        assert_eq!(c.transport.handshake_timeout_ms, Some(5_000));
        assert_eq!(c.decoder, DecoderKind::Bincode);
        assert_eq!(c.handshake, HandshakeKind::Version { version: 1 });
        assert_eq!(c.store.root, PathBuf::from("GGNetwork"));
        assert_eq!(c.store.transform, TransformConfig::cas());
    }

    #[test]
    fn rendered_config_parses_back() {
        let c = NodeConfig::default();
        let text = c.to_toml().unwrap();
        assert!(text.contains("[transport]"));
        assert!(text.contains("kind = \"cas\""));
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(
            &path,
            r#"
            [decoder]
            kind = "raw"
            chunk_size = 512

            [handshake]
            kind = "nop"
            "#,
        )
        .unwrap();

        let c = NodeConfig::load(&path).unwrap();
        assert_eq!(c.decoder, DecoderKind::Raw { chunk_size: 512 });
        assert_eq!(c.handshake, HandshakeKind::Nop);
        // untouched sections keep the node defaults
        assert_eq!(c.transport, NodeConfig::default().transport);
        assert_eq!(c.store.transform, TransformConfig::cas());
    }

    #[test]
    fn load_missing_file_names_path() {
        let err = NodeConfig::load(Path::new("/nonexistent/ggnode.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ggnode.toml"), "{err}");
    }

    #[test]
    fn load_rejects_unknown_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(&path, "[decoder]\nkind = \"zstd\"\n").unwrap();
        assert!(NodeConfig::load(&path).is_err());
    }

    #[test]
    fn overrides_replace_listen_and_root() {
        let c = NodeConfig::default()
            .with_overrides(Some("0.0.0.0:4000".into()), Some(PathBuf::from("/tmp/ggn")));
        assert_eq!(c.transport.listen_addr, "0.0.0.0:4000");
        assert_eq!(c.store.root, PathBuf::from("/tmp/ggn"));

        let untouched = NodeConfig::default().with_overrides(None, None);
        assert_eq!(untouched, NodeConfig::default());
    }
}
