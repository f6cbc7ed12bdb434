use std::fmt;

/// Location of one stored object, relative to the store root.
///
/// `path_name` is the directory part (`/`-joined shards) and `file_name` the
/// leaf. A `PathKey` is never persisted; it is recomputed from the logical key
/// by a [`PathTransform`](crate::PathTransform) on every operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathKey {
    pub path_name: String,
    pub file_name: String,
}

impl PathKey {
    pub fn new(path_name: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            path_name: path_name.into(),
            file_name: file_name.into(),
        }
    }

    /// `path_name/file_name`.
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.path_name, self.file_name)
    }

    /// First directory segment. Deleting a key removes this whole directory.
    pub fn first_path_name(&self) -> &str {
        self.path_name.split('/').next().unwrap_or("")
    }

    /// Directory segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path_name.split('/').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.path_name, self.file_name)
    }
}
