use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use sylva_types::Digest;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

/// Filesystem object store.
///
/// Layout: `<root>/<first two hex chars>/<remaining 62 hex chars>`. Each
/// file holds a one-byte kind tag followed by the record bytes. Writes go to
/// a temporary file in `<root>` which is then renamed into place, so readers
/// never observe a partially written record. Reads re-hash the contents and
/// fail with [`StoreError::HashMismatch`] on corruption.
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `id`.
    pub fn path_for(&self, id: &Digest) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    fn decode(id: &Digest, bytes: Vec<u8>) -> StoreResult<StoredObject> {
        let (&tag, data) = bytes.split_first().ok_or_else(|| StoreError::Malformed {
            id: *id,
            reason: "empty record file".into(),
        })?;
        let kind = ObjectKind::from_tag(tag).ok_or_else(|| StoreError::Malformed {
            id: *id,
            reason: format!("unknown kind tag {tag}"),
        })?;
        let object = StoredObject::new(kind, data.to_vec());
        let computed = object.compute_id();
        if computed != *id {
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(object)
    }
}

impl ObjectStore for FileObjectStore {
    fn read(&self, id: &Digest) -> StoreResult<Option<StoredObject>> {
        match fs::read(self.path_for(id)) {
            Ok(bytes) => Self::decode(id, bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, object: &StoredObject) -> StoreResult<Digest> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullDigest);
        }
        let path = self.path_for(&id);
        if path.exists() {
            return Ok(id);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&[object.kind.tag()])?;
        tmp.write_all(&object.data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(digest = %id.short_hex(), kind = %object.kind, size = object.size, "wrote record");
        Ok(id)
    }

    fn exists(&self, id: &Digest) -> StoreResult<bool> {
        Ok(self.path_for(id).is_file())
    }

    fn delete(&self, id: &Digest) -> StoreResult<bool> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for FileObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileObjectStore")
            .field("root", &self.root)
            .finish()
    }
}
