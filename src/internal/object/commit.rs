//! Commit: a tree id, zero or more parent ids, author/committer identity,
//! and a message. Commits with zero parents are roots; more than one parent
//! marks a merge commit.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;

use crate::errors::VcsError;
use crate::hash::ObjectId;
use crate::internal::object::ObjectTrait;
use crate::internal::object::signature::Signature;
use crate::internal::object::types::ObjectKind;

#[derive(Eq, Debug, Clone)]
pub struct Commit {
    pub id: ObjectId,
    pub tree_id: ObjectId,
    pub parent_ids: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "tree: {}", self.tree_id)?;
        for parent in &self.parent_ids {
            writeln!(f, "parent: {parent}")?;
        }
        writeln!(f, "author {}", self.author)?;
        writeln!(f, "committer {}", self.committer)?;
        writeln!(f, "{}", self.message)
    }
}

impl Commit {
    pub fn new(
        author: Signature,
        committer: Signature,
        tree_id: ObjectId,
        parent_ids: Vec<ObjectId>,
        message: &str,
    ) -> Commit {
        let mut commit = Commit {
            id: ObjectId::ZERO,
            tree_id,
            parent_ids,
            author,
            committer,
            message: message.to_string(),
        };
        let data = commit.to_data().unwrap();
        commit.id = ObjectId::of_framed(ObjectKind::Commit, &data);
        commit
    }

    /// Is this a root commit (no parents)? Cherry-pick/revert of a root
    /// commit is rejected (§4.5).
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    pub fn first_parent(&self) -> Option<ObjectId> {
        self.parent_ids.first().copied()
    }

    /// First non-empty line of the message, the commit's subject.
    pub fn format_message(&self) -> String {
        self.message
            .lines()
            .find(|line| !line.trim().is_empty())
            .map(|line| line.to_owned())
            .unwrap_or_else(|| self.message.clone())
    }
}

impl ObjectTrait for Commit {
    fn from_bytes(data: &[u8], id: ObjectId) -> Result<Self, VcsError> {
        let mut commit = data;
        let tree_end = commit
            .find_byte(0x0a)
            .ok_or_else(|| VcsError::Corrupt("commit missing tree line".into()))?;
        if !commit.starts_with(b"tree ") {
            return Err(VcsError::Corrupt("commit missing 'tree ' prefix".into()));
        }
        let tree_id = ObjectId::from_str(
            commit[5..tree_end]
                .to_str()
                .map_err(|e| VcsError::Corrupt(format!("tree id not utf8: {e}")))?,
        )?;
        let binding = commit[tree_end + 1..].to_vec();
        commit = &binding;

        let author_begin = commit
            .find("author ")
            .ok_or_else(|| VcsError::Corrupt("commit missing author line".into()))?;
        let parent_ids: Result<Vec<ObjectId>, VcsError> = commit[..author_begin]
            .find_iter("parent ")
            .map(|parent| {
                let parent_end = commit[parent..]
                    .find_byte(0x0a)
                    .ok_or_else(|| VcsError::Corrupt("commit parent line unterminated".into()))?;
                ObjectId::from_str(
                    commit[parent + 7..parent + parent_end]
                        .to_str()
                        .map_err(|e| VcsError::Corrupt(format!("parent id not utf8: {e}")))?,
                )
            })
            .collect();
        let parent_ids = parent_ids?;
        let binding = commit[author_begin..].to_vec();
        commit = &binding;

        let author_end = commit
            .find_byte(0x0a)
            .ok_or_else(|| VcsError::Corrupt("commit missing author terminator".into()))?;
        let author = Signature::from_data(&commit[b"author ".len()..author_end])?;

        let binding = commit[author_end + 1..].to_vec();
        commit = &binding;
        let committer_end = commit
            .find_byte(0x0a)
            .ok_or_else(|| VcsError::Corrupt("commit missing committer terminator".into()))?;
        if !commit.starts_with(b"committer ") {
            return Err(VcsError::Corrupt("commit missing 'committer ' prefix".into()));
        }
        let committer = Signature::from_data(&commit[b"committer ".len()..committer_end])?;

        let message = commit[committer_end + 1..]
            .to_str()
            .map_err(|e| VcsError::Corrupt(format!("commit message not utf8: {e}")))?
            .to_string();

        Ok(Commit {
            id,
            tree_id,
            parent_ids,
            author,
            committer,
            message,
        })
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Commit
    }

    fn to_data(&self) -> Result<Vec<u8>, VcsError> {
        let mut data = Vec::new();

        data.extend(b"tree ");
        data.extend(self.tree_id.to_string().as_bytes());
        data.push(0x0a);

        for parent_id in &self.parent_ids {
            data.extend(b"parent ");
            data.extend(parent_id.to_string().as_bytes());
            data.push(0x0a);
        }

        data.extend(b"author ");
        data.extend(self.author.to_data()?);
        data.push(0x0a);
        data.extend(b"committer ");
        data.extend(self.committer.to_data()?);
        data.push(0x0a);
        data.extend(self.message.as_bytes());

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Commit {
        let author = Signature::new("Ada Lovelace", "ada@example.com", 1_716_400_000, "+0000");
        let committer = author.clone();
        Commit::new(
            author,
            committer,
            ObjectId::of(b"tree contents"),
            vec![],
            "initial commit\n",
        )
    }

    #[test]
    fn round_trips_through_bytes() {
        let commit = sample();
        let data = commit.to_data().unwrap();
        let back = Commit::from_bytes(&data, commit.id).unwrap();
        assert_eq!(back.tree_id, commit.tree_id);
        assert_eq!(back.author, commit.author);
        assert_eq!(back.message, commit.message);
        assert!(back.is_root());
    }

    #[test]
    fn parses_multiple_parents() {
        let author = Signature::new("Ada", "ada@example.com", 10, "+0000");
        let parents = vec![ObjectId::of(b"p1"), ObjectId::of(b"p2")];
        let commit = Commit::new(
            author.clone(),
            author,
            ObjectId::of(b"tree"),
            parents.clone(),
            "merge\n",
        );
        let data = commit.to_data().unwrap();
        let back = Commit::from_bytes(&data, commit.id).unwrap();
        assert_eq!(back.parent_ids, parents);
        assert!(!back.is_root());
    }

    #[test]
    fn format_message_takes_first_nonempty_line() {
        let mut commit = sample();
        commit.message = "\n\nsubject line\nbody text\n".to_string();
        assert_eq!(commit.format_message(), "subject line");
    }
}
