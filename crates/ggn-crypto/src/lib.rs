//! Key digests for GGNetwork.
//!
//! The content-addressable store never uses a logical key as a path directly.
//! Keys are digested, hex-encoded and then split into directory shards. This
//! crate owns the digest step so that every node derives the same layout from
//! the same key.
//!
//! Digests come from established libraries; nothing here is custom cryptography.

pub mod hasher;

pub use hasher::KeyDigest;
