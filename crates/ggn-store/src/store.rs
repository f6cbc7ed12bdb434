use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::path::PathKey;
use crate::traits::PathTransform;

/// On-disk content-addressable store.
///
/// Every operation recomputes the object's [`PathKey`] from the logical key
/// and resolves it under `root`. File handles are opened and released within
/// a single call.
pub struct Store {
    root: PathBuf,
    transform: Box<dyn PathTransform>,
}

impl Store {
    /// Build a store from configuration.
    ///
    /// Fails only if the configured transform is invalid. The root directory
    /// is created lazily by the first write.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let transform = config.transform.build()?;
        Ok(Self {
            root: config.root,
            transform,
        })
    }

    /// Build a store with an explicit transform.
    pub fn with_transform(root: impl Into<PathBuf>, transform: impl PathTransform + 'static) -> Self {
        Self {
            root: root.into(),
            transform: Box::new(transform),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of `key` relative to the root.
    pub fn path_key(&self, key: &str) -> StoreResult<PathKey> {
        if key.is_empty() {
            return Err(invalid_key(key, "key is empty"));
        }
        let path_key = self.transform.transform(key);
        if path_key.file_name.is_empty() {
            return Err(invalid_key(key, "transform produced an empty file name"));
        }
        if !self.transform.is_content_addressed() {
            let full = path_key.full_path();
            let escapes = Path::new(&full)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
            if escapes {
                return Err(invalid_key(key, "path must stay under the store root"));
            }
        }
        Ok(path_key)
    }

    /// Root-joined path of the file holding `key`.
    pub fn full_path(&self, key: &str) -> StoreResult<PathBuf> {
        Ok(self.root.join(self.path_key(key)?.full_path()))
    }

    /// Returns `Ok(false)` if nothing is stored under `key`, including when
    /// the path runs through a stored file. Any other failure is returned as
    /// [`StoreError::Io`].
    pub fn has(&self, key: &str) -> StoreResult<bool> {
        let path = self.full_path(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Stream `reader` to disk under `key`, replacing any previous content.
    /// Returns the number of bytes written.
    ///
    /// Bytes go to a temporary file beside the target, which is renamed into
    /// place only after the copy succeeds. If `reader` fails midway the
    /// temporary file is removed and the previous content (if any) stays.
    pub fn write_stream<R: Read + ?Sized>(&self, key: &str, reader: &mut R) -> StoreResult<u64> {
        let path = self.full_path(key)?;
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        let n = io::copy(reader, &mut tmp).map_err(|e| StoreError::io(&path, e))?;
        tmp.persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;

        debug!(key, bytes = n, path = %path.display(), "written to disk");
        Ok(n)
    }

    /// Write an in-memory buffer under `key`.
    pub fn write(&self, key: &str, data: &[u8]) -> StoreResult<u64> {
        self.write_stream(key, &mut Cursor::new(data))
    }

    /// Open the file holding `key` for streaming reads.
    pub fn open(&self, key: &str) -> StoreResult<File> {
        let path = self.full_path(key)?;
        File::open(&path).map_err(|e| not_found_or_io(key, &path, e))
    }

    /// Read the whole object into memory. The file is closed before this
    /// returns.
    pub fn read(&self, key: &str) -> StoreResult<Cursor<Vec<u8>>> {
        let path = self.full_path(key)?;
        let mut file = self.open(key)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(Cursor::new(buf))
    }

    /// Remove the first-level shard directory of `key`, recursively.
    ///
    /// Everything below that directory goes with it. Returns
    /// [`StoreError::NotFound`] if the directory does not exist.
    pub fn delete(&self, key: &str) -> StoreResult<()> {
        let path_key = self.path_key(key)?;
        let first = path_key.first_path_name();
        if first.is_empty() {
            return Err(invalid_key(key, "transform produced no directory"));
        }
        let dir = self.root.join(first);
        fs::remove_dir_all(&dir).map_err(|e| not_found_or_io(key, &dir, e))?;
        debug!(key, file = %path_key.file_name, "deleted from disk");
        Ok(())
    }

    /// Remove the root directory and everything in it. A missing root is not an
    /// error.
    pub fn clear(&self) -> StoreResult<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                debug!(root = %self.root.display(), "store cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.root, e)),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.root)
            .field("content_addressed", &self.transform.is_content_addressed())
            .finish()
    }
}

fn invalid_key(key: &str, reason: &str) -> StoreError {
    StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// A path through a stored file (identity keys only) cannot exist either.
fn is_absent(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

fn not_found_or_io(key: &str, path: &Path, err: io::Error) -> StoreError {
    if is_absent(&err) {
        StoreError::NotFound {
            key: key.to_string(),
        }
    } else {
        StoreError::io(path, err)
    }
}
