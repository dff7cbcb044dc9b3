//! Ref store: branches, tags, and HEAD, with compare-and-swap updates (§4.2).
//!
//! Every ref update is mediated by a `*.lock` file (grounded on
//! wegel-zub's `refs.rs::write_ref` atomic temp+rename idiom, extended here
//! with the `expected-old-id` CAS primitive that is the sole way to mutate
//! a ref from outside this module).

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Result, VcsError};
use crate::hash::ObjectId;
use crate::utils::{LockFile, atomic_write};

pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    Symbolic(String),
    Detached(ObjectId),
}

pub struct RefStore {
    /// Repository metadata root (contains `HEAD` and `refs/`).
    root: PathBuf,
}

impl RefStore {
    pub fn new(root: impl Into<PathBuf>) -> RefStore {
        RefStore { root: root.into() }
    }

    fn head_path(&self) -> PathBuf {
        self.root.join("HEAD")
    }

    fn full_path(&self, full_ref_name: &str) -> PathBuf {
        self.root.join(full_ref_name)
    }

    pub fn get_head(&self) -> Result<Head> {
        let path = self.head_path();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VcsError::NotFound("HEAD does not exist".into()));
            }
            Err(e) => return Err(VcsError::IOError(e)),
        };
        let content = content.trim();
        if let Some(target) = content.strip_prefix("ref: ") {
            Ok(Head::Symbolic(target.trim().to_string()))
        } else {
            Ok(Head::Detached(content.parse()?))
        }
    }

    pub fn set_head_symbolic(&self, branch_full_name: &str) -> Result<()> {
        validate_ref_name(branch_full_name)?;
        atomic_write(
            &self.head_path(),
            format!("ref: {branch_full_name}\n").as_bytes(),
        )?;
        Ok(())
    }

    pub fn set_head_detached(&self, id: ObjectId) -> Result<()> {
        atomic_write(&self.head_path(), format!("{id}\n").as_bytes())?;
        Ok(())
    }

    /// Read a branch/tag ref's raw id (no peeling, no HEAD indirection).
    pub fn read_ref(&self, full_ref_name: &str) -> Result<ObjectId> {
        let path = self.full_path(full_ref_name);
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VcsError::NotFound(format!("ref `{full_ref_name}` not found"))
            } else {
                VcsError::IOError(e)
            }
        })?;
        content.trim().parse()
    }

    pub fn ref_exists(&self, full_ref_name: &str) -> bool {
        self.full_path(full_ref_name).is_file()
    }

    /// Atomically create or update a ref. If `expected_old` is `Some`, the
    /// update fails with `Conflict` unless the on-disk value matches
    /// exactly (this is the sole ref-mutation primitive, per §9).
    pub fn update(
        &self,
        full_ref_name: &str,
        new_id: ObjectId,
        expected_old: Option<ObjectId>,
    ) -> Result<()> {
        validate_ref_name(full_ref_name)?;
        let path = self.full_path(full_ref_name);
        let lock = LockFile::acquire(&path)?;

        let current = if path.is_file() {
            Some(self.read_ref(full_ref_name)?)
        } else {
            None
        };
        if let Some(expected) = expected_old
            && current != Some(expected)
        {
            return Err(VcsError::Conflict(format!(
                "ref `{full_ref_name}` expected {expected} but found {:?}",
                current
            )));
        }

        atomic_write(&path, format!("{new_id}\n").as_bytes())?;
        lock.release()?;
        Ok(())
    }

    pub fn delete(&self, full_ref_name: &str) -> Result<()> {
        let path = self.full_path(full_ref_name);
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VcsError::NotFound(format!("ref `{full_ref_name}` not found"))
            } else {
                VcsError::IOError(e)
            }
        })
    }

    pub fn list_branches(&self) -> Result<Vec<String>> {
        self.list_under(HEADS_PREFIX)
    }

    pub fn list_tags(&self) -> Result<Vec<String>> {
        self.list_under(TAGS_PREFIX)
    }

    fn list_under(&self, prefix: &str) -> Result<Vec<String>> {
        let base = self.root.join(prefix);
        let mut names = Vec::new();
        if base.is_dir() {
            collect(&base, &base, &mut names)?;
        }
        names.sort();
        Ok(names)
    }

    /// All ref names reachable under `refs/`, as full ref names (`refs/heads/main`, ...).
    pub fn list_all(&self) -> Result<Vec<String>> {
        let base = self.root.join("refs");
        let mut names = Vec::new();
        if base.is_dir() {
            collect(&self.root, &base, &mut names)?;
        }
        names.sort();
        Ok(names)
    }
}

fn collect(base: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect(base, &path, out)?;
        } else if path.is_file() && path.extension().is_none_or(|ext| ext != "lock") {
            if let Ok(rel) = path.strip_prefix(base) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    Ok(())
}

/// Ref names forbid: empty, leading/trailing `/` or `.`, consecutive `/`,
/// `..`, control characters, and the bytes `~^:?*[\` (§3).
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VcsError::InvalidArgument("empty ref name".into()));
    }
    if name.starts_with('/') || name.ends_with('/') || name.starts_with('.') || name.ends_with('.')
    {
        return Err(VcsError::InvalidArgument(format!(
            "ref name cannot start/end with '/' or '.': {name}"
        )));
    }
    if name.contains("//") {
        return Err(VcsError::InvalidArgument(format!(
            "ref name cannot contain '//': {name}"
        )));
    }
    if name.contains("..") {
        return Err(VcsError::InvalidArgument(format!(
            "ref name cannot contain '..': {name}"
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(VcsError::InvalidArgument(format!(
            "ref name cannot contain control characters: {name}"
        )));
    }
    const FORBIDDEN: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];
    if name.chars().any(|c| FORBIDDEN.contains(&c)) {
        return Err(VcsError::InvalidArgument(format!(
            "ref name cannot contain any of {FORBIDDEN:?}: {name}"
        )));
    }
    for component in name.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(VcsError::InvalidArgument(format!(
                "invalid ref path component in: {name}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_and_read_branch() {
        let dir = tempdir().unwrap();
        let store = RefStore::new(dir.path());
        let id = ObjectId::of(b"commit-1");
        store
            .update("refs/heads/main", id, None)
            .unwrap();
        assert_eq!(store.read_ref("refs/heads/main").unwrap(), id);
    }

    #[test]
    fn cas_rejects_mismatched_expected_old() {
        let dir = tempdir().unwrap();
        let store = RefStore::new(dir.path());
        let id1 = ObjectId::of(b"c1");
        let id2 = ObjectId::of(b"c2");
        store.update("refs/heads/main", id1, None).unwrap();
        let err = store
            .update("refs/heads/main", id2, Some(ObjectId::of(b"wrong")))
            .unwrap_err();
        assert!(matches!(err, VcsError::Conflict(_)));
        assert_eq!(store.read_ref("refs/heads/main").unwrap(), id1);
    }

    #[test]
    fn cas_accepts_matching_expected_old() {
        let dir = tempdir().unwrap();
        let store = RefStore::new(dir.path());
        let id1 = ObjectId::of(b"c1");
        let id2 = ObjectId::of(b"c2");
        store.update("refs/heads/main", id1, None).unwrap();
        store
            .update("refs/heads/main", id2, Some(id1))
            .unwrap();
        assert_eq!(store.read_ref("refs/heads/main").unwrap(), id2);
    }

    #[test]
    fn head_symbolic_round_trip() {
        let dir = tempdir().unwrap();
        let store = RefStore::new(dir.path());
        store.set_head_symbolic("refs/heads/main").unwrap();
        assert_eq!(store.get_head().unwrap(), Head::Symbolic("refs/heads/main".into()));
    }

    #[test]
    fn head_detached_round_trip() {
        let dir = tempdir().unwrap();
        let store = RefStore::new(dir.path());
        let id = ObjectId::of(b"detached");
        store.set_head_detached(id).unwrap();
        assert_eq!(store.get_head().unwrap(), Head::Detached(id));
    }

    #[test]
    fn invalid_ref_names_rejected() {
        assert!(validate_ref_name("").is_err());
        assert!(validate_ref_name("/start").is_err());
        assert!(validate_ref_name("end/").is_err());
        assert!(validate_ref_name("a//b").is_err());
        assert!(validate_ref_name("a/../b").is_err());
        assert!(validate_ref_name("weird~name").is_err());
        assert!(validate_ref_name("refs/heads/main").is_ok());
    }

    #[test]
    fn list_branches_and_tags() {
        let dir = tempdir().unwrap();
        let store = RefStore::new(dir.path());
        store.update("refs/heads/main", ObjectId::of(b"1"), None).unwrap();
        store.update("refs/heads/dev", ObjectId::of(b"2"), None).unwrap();
        store.update("refs/tags/v1", ObjectId::of(b"3"), None).unwrap();
        assert_eq!(store.list_branches().unwrap(), vec!["dev", "main"]);
        assert_eq!(store.list_tags().unwrap(), vec!["v1"]);
    }
}
