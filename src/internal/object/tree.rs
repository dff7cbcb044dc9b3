//! Tree: an ordered sequence of `(mode, name, object-id)` entries.
//!
//! Wire format mirrors Git's: each entry is `<mode-ascii> <name>\0<20 raw
//! hash bytes>`, concatenated with no separators between entries. Entries
//! are sorted on write using Git's ordering — directories compared as if
//! their name carried a trailing `/` — so that two trees with the same
//! logical contents always serialize identically.

use std::fmt::{self, Display};

use bstr::ByteSlice;

use crate::errors::VcsError;
use crate::hash::ObjectId;
use crate::internal::object::ObjectTrait;
use crate::internal::object::types::{FileMode, ObjectKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: String,
    pub id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub id: ObjectId,
    pub entries: Vec<TreeEntry>,
}

/// Git's tree-entry sort key: a directory's name is compared as if it had
/// a trailing `/`, so `"foo"` (a file) sorts before `"foo.c"` but after
/// `"foo/"` would if `foo` were a directory containing more path components.
fn sort_key(entry: &TreeEntry) -> Vec<u8> {
    let mut key = entry.name.as_bytes().to_vec();
    if entry.mode.is_tree() {
        key.push(b'/');
    }
    key
}

impl Tree {
    /// Build a tree from unsorted entries, sorting and de-duplicating
    /// by name (I2: no duplicate names; last write wins on collision is
    /// refused as InvalidArgument instead, since a colliding tree build is
    /// always a caller bug).
    pub fn build(mut entries: Vec<TreeEntry>) -> Result<Tree, VcsError> {
        entries.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        for pair in entries.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(VcsError::InvalidArgument(format!(
                    "duplicate tree entry name: {}",
                    pair[0].name
                )));
            }
        }
        let data = encode_entries(&entries);
        let id = ObjectId::of_framed(ObjectKind::Tree, &data);
        Ok(Tree { id, entries })
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

fn encode_entries(entries: &[TreeEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        out.extend_from_slice(entry.mode.as_octal_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.id.as_bytes());
    }
    out
}

impl ObjectTrait for Tree {
    fn from_bytes(data: &[u8], id: ObjectId) -> Result<Self, VcsError> {
        let mut entries = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let space = rest
                .find_byte(b' ')
                .ok_or_else(|| VcsError::Corrupt("tree entry missing mode separator".into()))?;
            let mode_str = rest[..space]
                .to_str()
                .map_err(|e| VcsError::Corrupt(format!("tree mode not utf8: {e}")))?;
            let mode = FileMode::from_octal_str(mode_str)
                .ok_or_else(|| VcsError::Corrupt(format!("invalid tree mode: {mode_str}")))?;
            rest = &rest[space + 1..];

            let nul = rest
                .find_byte(0)
                .ok_or_else(|| VcsError::Corrupt("tree entry missing name terminator".into()))?;
            let name = rest[..nul]
                .to_str()
                .map_err(|e| VcsError::Corrupt(format!("tree name not utf8: {e}")))?
                .to_string();
            rest = &rest[nul + 1..];

            if rest.len() < 20 {
                return Err(VcsError::Corrupt("tree entry truncated hash".into()));
            }
            let entry_id = ObjectId::from_bytes(&rest[..20])?;
            rest = &rest[20..];

            entries.push(TreeEntry {
                mode,
                name,
                id: entry_id,
            });
        }
        Ok(Tree { id, entries })
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Tree
    }

    fn to_data(&self) -> Result<Vec<u8>, VcsError> {
        Ok(encode_entries(&self.entries))
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "tree {}", self.id)?;
        for e in &self.entries {
            writeln!(f, "{} {} {}", e.mode.as_octal_str(), e.id, e.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, mode: FileMode) -> TreeEntry {
        TreeEntry {
            mode,
            name: name.to_string(),
            id: ObjectId::of(name.as_bytes()),
        }
    }

    #[test]
    fn directories_sort_as_if_trailing_slash() {
        let tree = Tree::build(vec![
            entry("foo.c", FileMode::Regular),
            entry("foo", FileMode::Tree),
        ])
        .unwrap();
        assert_eq!(tree.entries[0].name, "foo");
        assert_eq!(tree.entries[1].name, "foo.c");
    }

    #[test]
    fn round_trip_bytes() {
        let tree = Tree::build(vec![
            entry("a.txt", FileMode::Regular),
            entry("b", FileMode::Tree),
        ])
        .unwrap();
        let data = tree.to_data().unwrap();
        let back = Tree::from_bytes(&data, tree.id).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = Tree::build(vec![
            entry("dup", FileMode::Regular),
            entry("dup", FileMode::Regular),
        ]);
        assert!(err.is_err());
    }
}
