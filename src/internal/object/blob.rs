//! Blob: an opaque, immutable byte sequence with no internal structure.

use std::fmt::{self, Display};

use crate::errors::VcsError;
use crate::hash::ObjectId;
use crate::internal::object::ObjectTrait;
use crate::internal::object::types::ObjectKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub id: ObjectId,
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Blob {
        let id = ObjectId::of_framed(ObjectKind::Blob, &data);
        Blob { id, data }
    }
}

impl ObjectTrait for Blob {
    fn from_bytes(data: &[u8], id: ObjectId) -> Result<Self, VcsError> {
        Ok(Blob {
            id,
            data: data.to_vec(),
        })
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Blob
    }

    fn to_data(&self) -> Result<Vec<u8>, VcsError> {
        Ok(self.data.clone())
    }
}

impl Display for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob {} ({} bytes)", self.id, self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_known_vector() {
        let blob = Blob::new(b"hello\n".to_vec());
        assert_eq!(blob.id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn round_trip_preserves_bytes() {
        let blob = Blob::new(b"some content".to_vec());
        let data = blob.to_data().unwrap();
        let back = Blob::from_bytes(&data, blob.id).unwrap();
        assert_eq!(back.data, b"some content");
    }
}
