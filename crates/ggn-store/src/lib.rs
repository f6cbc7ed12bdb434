//! Content-addressable storage for GGNetwork.
//!
//! Every object is stored under a path derived from its logical key. The
//! production layout digests the key, hex-encodes it and splits the hex into
//! fixed-width directory shards so no single directory grows unbounded:
//!
//! ```text
//! <root>/0beec/7b5ea/3f0fd/bc95d/0dd47/f3c5b/c275d/a8a33/0beec7b5ea3f0fdbc95d0dd47f3c5bc275da8a33
//! ```
//!
//! # Path transforms
//!
//! All transforms implement the [`PathTransform`] trait:
//!
//! - [`CasTransform`] -- digest + shard, the production layout
//! - [`IdentityTransform`] -- path = key, file = key, for tests and debugging
//!
//! # Design Rules
//!
//! 1. The transform is pure: the same key yields the same [`PathKey`] on every
//!    call and in every process.
//! 2. Writes land in a temporary file and are renamed into place, so a
//!    partially written object is never visible under its final path.
//! 3. "Not found" is reported distinctly from every other I/O failure.
//! 4. The store holds no locks. Callers serialize writers per key if they need
//!    last-writer-wins to mean anything.

pub mod config;
pub mod error;
pub mod path;
pub mod store;
pub mod traits;
pub mod transform;

// Re-export primary types at crate root for ergonomic imports.
pub use config::{StoreConfig, TransformConfig, DEFAULT_ROOT_FOLDER_NAME};
pub use error::{StoreError, StoreResult};
pub use path::PathKey;
pub use store::Store;
pub use traits::PathTransform;
pub use transform::{CasTransform, IdentityTransform, DEFAULT_BLOCK_SIZE};

pub use ggn_crypto::KeyDigest;
