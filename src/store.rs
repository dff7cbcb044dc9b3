//! Content-addressed loose object store (§4.1).
//!
//! Objects are written once and never overwritten: `write` is a no-op if
//! the target file already exists (idempotent in the id). Every write goes
//! through a temp file in the same shard directory and is renamed into
//! place, so a crash mid-write never leaves a partial object (grounded on
//! wegel-zub's `refs.rs::write_ref` atomic-write idiom, applied here to
//! object files).

use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::ZlibEncoder;

use crate::errors::{Result, VcsError};
use crate::hash::ObjectId;
use crate::internal::object::blob::Blob;
use crate::internal::object::commit::Commit;
use crate::internal::object::tag::Tag;
use crate::internal::object::tree::Tree;
use crate::internal::object::types::ObjectKind;
use crate::internal::object::{ObjectTrait, signature::Signature};
use crate::internal::zlib::stream::inflate::ReadBoxed;
use crate::utils::atomic_write;

pub struct ObjectStore {
    root: PathBuf,
}

/// A decoded object, still tagged by kind, for generic read paths (gc, diff).
#[derive(Debug, Clone)]
pub enum AnyObject {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl AnyObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            AnyObject::Blob(_) => ObjectKind::Blob,
            AnyObject::Tree(_) => ObjectKind::Tree,
            AnyObject::Commit(_) => ObjectKind::Commit,
            AnyObject::Tag(_) => ObjectKind::Tag,
        }
    }
}

impl ObjectStore {
    pub fn new(objects_dir: impl Into<PathBuf>) -> ObjectStore {
        ObjectStore {
            root: objects_dir.into(),
        }
    }

    pub fn path_for(&self, id: ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    pub fn has(&self, id: ObjectId) -> bool {
        self.path_for(id).is_file()
    }

    /// Write a framed, deflated object if it doesn't already exist.
    /// Returns the id regardless (idempotent).
    pub fn write_raw(&self, kind: ObjectKind, payload: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::of_framed(kind, payload);
        let path = self.path_for(id);
        if path.is_file() {
            return Ok(id);
        }

        let mut framed = Vec::with_capacity(payload.len() + 24);
        framed.extend_from_slice(kind.as_str().as_bytes());
        framed.push(b' ');
        framed.extend_from_slice(payload.len().to_string().as_bytes());
        framed.push(0);
        framed.extend_from_slice(payload);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&framed)
            .map_err(VcsError::IOError)?;
        let compressed = encoder.finish().map_err(VcsError::IOError)?;

        atomic_write(&path, &compressed)?;
        Ok(id)
    }

    pub fn write_blob(&self, data: Vec<u8>) -> Result<ObjectId> {
        self.write_raw(ObjectKind::Blob, &data)
    }

    pub fn write_tree(&self, tree: &Tree) -> Result<ObjectId> {
        self.write_raw(ObjectKind::Tree, &tree.to_data()?)
    }

    pub fn write_commit(&self, commit: &Commit) -> Result<ObjectId> {
        self.write_raw(ObjectKind::Commit, &commit.to_data()?)
    }

    pub fn write_tag(&self, tag: &Tag) -> Result<ObjectId> {
        self.write_raw(ObjectKind::Tag, &tag.to_data()?)
    }

    /// Inflate and parse the object at `id`, verifying the framed header
    /// matches the requested id.
    pub fn read(&self, id: ObjectId) -> Result<AnyObject> {
        let path = self.path_for(id);
        let file = std::fs::File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VcsError::NotFound(format!("object {id} not found"))
            } else {
                VcsError::IOError(e)
            }
        })?;
        let reader = BufReader::new(file);
        let mut raw = ReadBoxed::new_raw(reader);
        let mut framed = Vec::new();
        raw.read_to_end(&mut framed)
            .map_err(|_| VcsError::Corrupt(format!("object {id} has a corrupt deflate stream")))?;

        let space = framed
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| VcsError::Corrupt(format!("object {id} missing type header")))?;
        let kind_str = std::str::from_utf8(&framed[..space])
            .map_err(|_| VcsError::Corrupt(format!("object {id} type header not utf8")))?;
        let kind = ObjectKind::from_str(kind_str)
            .ok_or_else(|| VcsError::Corrupt(format!("object {id} has unknown type `{kind_str}`")))?;
        let nul = framed
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| VcsError::Corrupt(format!("object {id} missing header terminator")))?;
        let payload = &framed[nul + 1..];

        let computed = ObjectId::of_framed(kind, payload);
        if computed != id {
            return Err(VcsError::Corrupt(format!(
                "object {id} failed integrity check: content hashes to {computed}"
            )));
        }

        Ok(match kind {
            ObjectKind::Blob => AnyObject::Blob(Blob::from_bytes(payload, id)?),
            ObjectKind::Tree => AnyObject::Tree(Tree::from_bytes(payload, id)?),
            ObjectKind::Commit => AnyObject::Commit(Commit::from_bytes(payload, id)?),
            ObjectKind::Tag => AnyObject::Tag(Tag::from_bytes(payload, id)?),
        })
    }

    pub fn read_blob(&self, id: ObjectId) -> Result<Blob> {
        match self.read(id)? {
            AnyObject::Blob(b) => Ok(b),
            other => Err(VcsError::Corrupt(format!(
                "object {id} is a {}, expected blob",
                other.kind()
            ))),
        }
    }

    pub fn read_tree(&self, id: ObjectId) -> Result<Tree> {
        match self.read(id)? {
            AnyObject::Tree(t) => Ok(t),
            other => Err(VcsError::Corrupt(format!(
                "object {id} is a {}, expected tree",
                other.kind()
            ))),
        }
    }

    pub fn read_commit(&self, id: ObjectId) -> Result<Commit> {
        match self.read(id)? {
            AnyObject::Commit(c) => Ok(c),
            other => Err(VcsError::Corrupt(format!(
                "object {id} is a {}, expected commit",
                other.kind()
            ))),
        }
    }

    pub fn read_tag(&self, id: ObjectId) -> Result<Tag> {
        match self.read(id)? {
            AnyObject::Tag(t) => Ok(t),
            other => Err(VcsError::Corrupt(format!(
                "object {id} is a {}, expected tag",
                other.kind()
            ))),
        }
    }

    /// Peel an annotated tag chain down to the non-tag object it ultimately
    /// names (used by ref resolution's default tag-peeling behavior).
    pub fn peel(&self, mut id: ObjectId) -> Result<ObjectId> {
        loop {
            match self.read(id)? {
                AnyObject::Tag(tag) => id = tag.object_id,
                _ => return Ok(id),
            }
        }
    }

    /// Re-hash the stored payload and compare against the filename; used
    /// by gc's optional verify pass.
    pub fn verify(&self, id: ObjectId) -> Result<()> {
        self.read(id).map(|_| ())
    }

    /// All hashes with a loose object file currently on disk, for gc sweep.
    pub fn iter_ids(&self) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::new();
        if !self.root.is_dir() {
            return Ok(ids);
        }
        for shard in std::fs::read_dir(&self.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            let shard_name = shard.file_name();
            let shard_name = shard_name.to_string_lossy();
            for entry in std::fs::read_dir(shard.path())? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let rest = entry.file_name();
                let hex = format!("{shard_name}{}", rest.to_string_lossy());
                if let Ok(id) = hex.parse::<ObjectId>() {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    pub fn remove(&self, id: ObjectId) -> Result<()> {
        let path = self.path_for(id);
        std::fs::remove_file(&path)?;
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir(parent);
        }
        Ok(())
    }

    pub fn file_len(&self, id: ObjectId) -> Result<u64> {
        Ok(std::fs::metadata(self.path_for(id))?.len())
    }

    pub fn mtime(&self, id: ObjectId) -> Result<std::time::SystemTime> {
        Ok(std::fs::metadata(self.path_for(id))?.modified()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Build an author/committer signature from a repo config resolution.
pub fn signature_now(name: String, email: String) -> Signature {
    Signature::new(
        name,
        email,
        chrono::Utc::now().timestamp(),
        crate::config::RepoConfig::local_tz_offset(),
    )
}
