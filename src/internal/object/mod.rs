//! Object model: blob, tree, commit, and annotated tag, plus the
//! `ObjectTrait` that lets the store create strongly typed values from raw
//! bytes or a streaming inflate reader.

pub mod blob;
pub mod commit;
pub mod signature;
pub mod tag;
pub mod tree;
pub mod types;

use std::{
    fmt::Display,
    io::{BufRead, Read},
};

use crate::{
    errors::VcsError,
    hash::ObjectId,
    internal::{object::types::ObjectKind, zlib::stream::inflate::ReadBoxed},
};

/// Common interface for all four object kinds.
pub trait ObjectTrait: Send + Sync + Display {
    /// Construct from already-decompressed payload bytes and its known id.
    fn from_bytes(data: &[u8], id: ObjectId) -> Result<Self, VcsError>
    where
        Self: Sized;

    /// Construct by draining a streaming inflate reader, deriving the id
    /// from the reader's accumulated running hash.
    fn from_buf_read<R: BufRead>(read: &mut ReadBoxed<R>, size: usize) -> Result<Self, VcsError>
    where
        Self: Sized,
    {
        let mut content: Vec<u8> = Vec::with_capacity(size);
        read.read_to_end(&mut content)
            .map_err(VcsError::IOError)?;
        let digest = read.hash.clone().finalize();
        let id = ObjectId::from_bytes(&digest)?;
        Self::from_bytes(&content, id)
    }

    fn kind(&self) -> ObjectKind;

    fn to_data(&self) -> Result<Vec<u8>, VcsError>;

    /// Recompute the object id from serialized data. Override only for
    /// custom hashing or caching.
    fn object_id(&self) -> Result<ObjectId, VcsError> {
        let data = self.to_data()?;
        Ok(ObjectId::of_framed(self.kind(), &data))
    }
}
