use crate::path::PathKey;

/// Maps a logical key to its location under the store root.
///
/// All implementations must satisfy these invariants:
/// - Pure: no randomness and no machine-local state. The same key produces the
///   same [`PathKey`] on every call and across processes.
/// - `file_name` is never empty.
pub trait PathTransform: Send + Sync {
    /// Compute the location of `key`.
    fn transform(&self, key: &str) -> PathKey;

    /// Returns `true` if paths are derived from a digest of the key rather than
    /// from the key text. Only non-hashing transforms need key validation.
    fn is_content_addressed(&self) -> bool {
        true
    }
}

impl<T: PathTransform + ?Sized> PathTransform for Box<T> {
    fn transform(&self, key: &str) -> PathKey {
        (**self).transform(key)
    }

    fn is_content_addressed(&self) -> bool {
        (**self).is_content_addressed()
    }
}
