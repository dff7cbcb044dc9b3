//! The index (staging area): an ordered mapping from repo-relative path to
//! `(mode, blob id)`, serialized as a single opaque file rewritten
//! atomically as a whole on every `save()` (§4.3).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::errors::{Result, VcsError};
use crate::hash::ObjectId;
use crate::ignore::IgnoreRules;
use crate::internal::object::types::FileMode;
use crate::store::ObjectStore;
use crate::utils::atomic_write;

pub const METADATA_DIR_NAME: &str = ".vcs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub mode: FileMode,
    pub id: ObjectId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IndexFile {
    entries: BTreeMap<String, IndexEntry>,
}

pub struct Index {
    path: PathBuf,
    work_dir: PathBuf,
    file: IndexFile,
}

#[derive(Debug, Clone, Default)]
pub struct Status {
    pub staged: Vec<String>,
    pub modified: Vec<String>,
    pub untracked: Vec<String>,
    pub deleted: Vec<String>,
}

impl Index {
    /// Load the index file at `path`, or start empty if it doesn't exist yet.
    pub fn load(path: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Result<Index> {
        let path = path.into();
        let file = if path.is_file() {
            let data = std::fs::read(&path)?;
            serde_json::from_slice(&data)
                .map_err(|e| VcsError::Corrupt(format!("index is corrupt: {e}")))?
        } else {
            IndexFile::default()
        };
        Ok(Index {
            path,
            work_dir: work_dir.into(),
            file,
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &IndexEntry)> {
        self.file.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, rel_path: &str) -> Option<&IndexEntry> {
        self.file.entries.get(rel_path)
    }

    pub fn clear(&mut self) {
        self.file.entries.clear();
    }

    pub fn remove(&mut self, rel_path: &str) {
        self.file.entries.remove(rel_path);
    }

    pub fn set(&mut self, rel_path: String, entry: IndexEntry) {
        self.file.entries.insert(rel_path, entry);
    }

    /// Stage `rel_path`: read the file's current content, write a blob,
    /// record its mode, and update the entry.
    pub fn add(&mut self, rel_path: &str, store: &ObjectStore) -> Result<ObjectId> {
        let abs = self.work_dir.join(rel_path);
        let data = std::fs::read(&abs)?;
        let id = store.write_blob(data)?;
        let mode = file_mode_of(&abs)?;
        self.set(rel_path.to_string(), IndexEntry { mode, id });
        Ok(id)
    }

    /// Rewrite the whole index file atomically.
    pub fn save(&self) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.file)
            .map_err(|e| VcsError::Corrupt(format!("failed to serialize index: {e}")))?;
        atomic_write(&self.path, &data)?;
        Ok(())
    }

    /// Compare the index against `head_tree` and the working tree to
    /// compute staged/modified/untracked/deleted sets.
    pub fn status(&self, head_entries: &BTreeMap<String, ObjectId>) -> Result<Status> {
        let mut status = Status::default();

        for (path, entry) in &self.file.entries {
            match head_entries.get(path) {
                Some(head_id) if *head_id == entry.id => {}
                _ => status.staged.push(path.clone()),
            }
        }

        // Rehashing every tracked file against the working tree is the
        // expensive part of `status`; spread it across threads the same way
        // `add` parallelizes hashing, then fold the per-path verdicts back
        // in sequentially.
        let checks: Vec<Result<(String, bool, bool)>> = self
            .file
            .entries
            .par_iter()
            .map(|(path, entry)| {
                let abs = self.work_dir.join(path);
                if !abs.is_file() {
                    return Ok((path.clone(), true, false));
                }
                let data = std::fs::read(&abs)?;
                let disk_id = ObjectId::of(&data);
                Ok((path.clone(), false, disk_id != entry.id))
            })
            .collect();
        for result in checks {
            let (path, deleted, modified) = result?;
            if deleted {
                status.deleted.push(path);
            } else if modified {
                status.modified.push(path);
            }
        }

        let tracked: HashSet<&str> = self.file.entries.keys().map(|s| s.as_str()).collect();
        for rel in self.walk_untracked_candidates()? {
            if tracked.contains(rel.as_str()) {
                continue;
            }
            status.untracked.push(rel);
        }

        status.staged.sort();
        status.modified.sort();
        status.untracked.sort();
        status.deleted.sort();
        Ok(status)
    }

    fn walk_untracked_candidates(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.work_dir)
            .into_iter()
            .filter_entry(|e| e.file_name() != METADATA_DIR_NAME)
        {
            let entry = entry.map_err(|e| VcsError::IOError(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.work_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let dir = entry.path().parent().unwrap_or(&self.work_dir);
            let rules = IgnoreRules::load(&self.work_dir, dir);
            if rules.is_ignored(&rel, false) {
                continue;
            }
            out.push(rel);
        }
        Ok(out)
    }
}

fn file_mode_of(path: &Path) -> Result<FileMode> {
    let meta = std::fs::symlink_metadata(path)?;
    #[cfg(unix)]
    {
        Ok(FileMode::from_unix_metadata(&meta))
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        Ok(FileMode::Regular)
    }
}
