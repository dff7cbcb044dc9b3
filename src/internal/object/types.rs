//! The four primitive object kinds (§3): blob, tree, commit, and annotated
//! tag, each identified by the hex SHA-1 of its framed serialized form.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        }
    }

    pub fn from_str(s: &str) -> Option<ObjectKind> {
        match s {
            "blob" => Some(ObjectKind::Blob),
            "tree" => Some(ObjectKind::Tree),
            "commit" => Some(ObjectKind::Commit),
            "tag" => Some(ObjectKind::Tag),
            _ => None,
        }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// File mode for a tree entry (§3).
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum FileMode {
    Regular,
    Executable,
    Symlink,
    Tree,
}

impl FileMode {
    pub fn as_octal_str(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
            FileMode::Tree => "40000",
        }
    }

    pub fn from_octal_str(s: &str) -> Option<FileMode> {
        match s {
            "100644" => Some(FileMode::Regular),
            "100755" => Some(FileMode::Executable),
            "120000" => Some(FileMode::Symlink),
            "40000" | "040000" => Some(FileMode::Tree),
            _ => None,
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, FileMode::Tree)
    }

    #[cfg(unix)]
    pub fn from_unix_metadata(meta: &std::fs::Metadata) -> FileMode {
        use std::os::unix::fs::PermissionsExt;
        if meta.is_dir() {
            FileMode::Tree
        } else if meta.file_type().is_symlink() {
            FileMode::Symlink
        } else if meta.permissions().mode() & 0o111 != 0 {
            FileMode::Executable
        } else {
            FileMode::Regular
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for k in [
            ObjectKind::Blob,
            ObjectKind::Tree,
            ObjectKind::Commit,
            ObjectKind::Tag,
        ] {
            assert_eq!(ObjectKind::from_str(k.as_str()), Some(k));
        }
    }

    #[test]
    fn mode_round_trips_through_octal() {
        for m in [
            FileMode::Regular,
            FileMode::Executable,
            FileMode::Symlink,
            FileMode::Tree,
        ] {
            assert_eq!(FileMode::from_octal_str(m.as_octal_str()), Some(m));
        }
    }
}
