//! Annotated tag: points at a target object, a target kind, a tag name, a
//! tagger identity, and a message. Lightweight tags have no object of their
//! own — they are just a ref pointing directly at a commit (§4.2).

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;

use crate::errors::VcsError;
use crate::hash::ObjectId;
use crate::internal::object::ObjectTrait;
use crate::internal::object::signature::Signature;
use crate::internal::object::types::ObjectKind;

#[derive(Eq, Debug, Clone)]
pub struct Tag {
    pub id: ObjectId,
    pub object_id: ObjectId,
    pub object_kind: ObjectKind,
    pub tag_name: String,
    pub tagger: Signature,
    pub message: String,
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Tag {
    pub fn new(
        object_id: ObjectId,
        object_kind: ObjectKind,
        tag_name: &str,
        tagger: Signature,
        message: &str,
    ) -> Tag {
        let mut tag = Tag {
            id: ObjectId::ZERO,
            object_id,
            object_kind,
            tag_name: tag_name.to_string(),
            tagger,
            message: message.to_string(),
        };
        let data = tag.to_data().unwrap();
        tag.id = ObjectId::of_framed(ObjectKind::Tag, &data);
        tag
    }
}

impl ObjectTrait for Tag {
    fn from_bytes(data: &[u8], id: ObjectId) -> Result<Self, VcsError> {
        let mut rest = data;

        let object_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| VcsError::Corrupt("tag missing object line".into()))?;
        if !rest.starts_with(b"object ") {
            return Err(VcsError::Corrupt("tag missing 'object ' prefix".into()));
        }
        let object_id = ObjectId::from_str(
            rest[7..object_end]
                .to_str()
                .map_err(|e| VcsError::Corrupt(format!("tag object id not utf8: {e}")))?,
        )?;
        let binding = rest[object_end + 1..].to_vec();
        rest = &binding;

        let type_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| VcsError::Corrupt("tag missing type line".into()))?;
        if !rest.starts_with(b"type ") {
            return Err(VcsError::Corrupt("tag missing 'type ' prefix".into()));
        }
        let type_str = rest[5..type_end]
            .to_str()
            .map_err(|e| VcsError::Corrupt(format!("tag type not utf8: {e}")))?;
        let object_kind = ObjectKind::from_str(type_str)
            .ok_or_else(|| VcsError::Corrupt(format!("invalid tag target kind: {type_str}")))?;
        let binding = rest[type_end + 1..].to_vec();
        rest = &binding;

        let name_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| VcsError::Corrupt("tag missing tag-name line".into()))?;
        if !rest.starts_with(b"tag ") {
            return Err(VcsError::Corrupt("tag missing 'tag ' prefix".into()));
        }
        let tag_name = rest[4..name_end]
            .to_str()
            .map_err(|e| VcsError::Corrupt(format!("tag name not utf8: {e}")))?
            .to_string();
        let binding = rest[name_end + 1..].to_vec();
        rest = &binding;

        let tagger_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| VcsError::Corrupt("tag missing tagger line".into()))?;
        if !rest.starts_with(b"tagger ") {
            return Err(VcsError::Corrupt("tag missing 'tagger ' prefix".into()));
        }
        let tagger = Signature::from_data(&rest[7..tagger_end])?;

        let message = rest[tagger_end + 1..]
            .to_str()
            .map_err(|e| VcsError::Corrupt(format!("tag message not utf8: {e}")))?
            .trim_start_matches('\n')
            .to_string();

        Ok(Tag {
            id,
            object_id,
            object_kind,
            tag_name,
            tagger,
            message,
        })
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Tag
    }

    fn to_data(&self) -> Result<Vec<u8>, VcsError> {
        let mut data = Vec::new();
        data.extend(b"object ");
        data.extend(self.object_id.to_string().as_bytes());
        data.push(0x0a);
        data.extend(b"type ");
        data.extend(self.object_kind.as_str().as_bytes());
        data.push(0x0a);
        data.extend(b"tag ");
        data.extend(self.tag_name.as_bytes());
        data.push(0x0a);
        data.extend(b"tagger ");
        data.extend(self.tagger.to_data()?);
        data.push(0x0a);
        data.push(0x0a);
        data.extend(self.message.as_bytes());
        Ok(data)
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "object {}", self.object_id)?;
        writeln!(f, "type {}", self.object_kind)?;
        writeln!(f, "tag {}", self.tag_name)?;
        writeln!(f, "tagger {}", self.tagger)?;
        writeln!(f)?;
        write!(f, "{}", self.message)
    }
}
