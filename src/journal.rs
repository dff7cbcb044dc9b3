//! Append-only journal and `undo` (§4.8).
//!
//! Every destructive history operation writes one entry before mutating
//! anything (two-phase: append pending, perform the mutation, mark
//! complete), grounded on the journal-before-effect discipline spec.md §9
//! calls out explicitly. Entries are plain JSON files under `journal/`,
//! following the sidecar-file idiom `merge.rs` uses for `MERGE_HEAD` et al.,
//! one file per entry instead of one shared file since entries accumulate
//! and are individually expired.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, VcsError};
use crate::hash::ObjectId;
use crate::refs::Head;
use crate::repo::Repository;
use crate::utils::atomic_write;

/// A snapshot of `{HEAD, current branch, index content}` as named by
/// spec.md §3's journal entry shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalState {
    /// Full ref name HEAD was symbolic to, or `None` if detached.
    pub branch: Option<String>,
    /// The commit/object HEAD resolved to, or `ObjectId::ZERO` before the
    /// first commit on an empty branch.
    pub head_id: ObjectId,
    /// Content-addressed snapshot of the index file's bytes at this point.
    pub index_snapshot: ObjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub timestamp: i64,
    pub operation: String,
    pub arguments: Vec<String>,
    pub before: JournalState,
    /// `None` while the operation is still in flight (pending phase).
    pub after: Option<JournalState>,
    pub extra: Option<String>,
}

/// A journal entry that has been appended (pending phase) but not yet
/// completed. Call `commit` once the operation's mutations have landed.
pub struct PendingEntry {
    path: PathBuf,
    entry: JournalEntry,
}

impl PendingEntry {
    /// Record the after-state and mark this entry complete.
    pub fn commit(mut self, repo: &Repository, extra: Option<String>) -> Result<()> {
        self.entry.after = Some(capture_state(repo)?);
        self.entry.extra = extra;
        write_entry(&self.path, &self.entry)
    }
}

fn journal_dir(repo: &Repository) -> PathBuf {
    repo.vcs_dir.join("journal")
}

fn write_entry(path: &PathBuf, entry: &JournalEntry) -> Result<()> {
    let data = serde_json::to_vec_pretty(entry)
        .map_err(|e| VcsError::Corrupt(format!("failed to serialize journal entry: {e}")))?;
    atomic_write(path, &data)?;
    Ok(())
}

fn read_entry(path: &std::path::Path) -> Result<JournalEntry> {
    let data = std::fs::read(path)?;
    serde_json::from_slice(&data).map_err(|e| VcsError::Corrupt(format!("journal entry is corrupt: {e}")))
}

/// All entry file paths, in chronological (sequence) order.
fn entry_paths(repo: &Repository) -> Result<Vec<PathBuf>> {
    let dir = journal_dir(repo);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    Ok(paths)
}

fn capture_state(repo: &Repository) -> Result<JournalState> {
    let (branch, head_id) = match repo.refs.get_head()? {
        Head::Symbolic(b) => {
            let id = repo.refs.read_ref(&b).unwrap_or(ObjectId::ZERO);
            (Some(b), id)
        }
        Head::Detached(id) => (None, id),
    };
    let index_bytes = std::fs::read(repo.index_path()).unwrap_or_default();
    let index_snapshot = repo.store.write_blob(index_bytes)?;
    Ok(JournalState {
        branch,
        head_id,
        index_snapshot,
    })
}

/// Append a pending entry before an operation's mutations begin.
pub fn begin(repo: &Repository, operation: &str, arguments: Vec<String>) -> Result<PendingEntry> {
    let before = capture_state(repo)?;
    let seq = entry_paths(repo)?.len();
    let id = uuid::Uuid::new_v4().to_string();
    let entry = JournalEntry {
        id,
        timestamp: Utc::now().timestamp(),
        operation: operation.to_string(),
        arguments,
        before,
        after: None,
        extra: None,
    };
    let path = journal_dir(repo).join(format!("{seq:010}.json"));
    write_entry(&path, &entry)?;
    Ok(PendingEntry { path, entry })
}

pub struct UndoOutcome {
    pub operation: String,
    pub restored_head: ObjectId,
}

/// Pop the latest complete entry and reverse it: refs move back via CAS,
/// the index is rewritten from the saved snapshot, and the working tree is
/// hard-reset to match. Fails without modifying anything if the entry's
/// objects have since been pruned.
pub fn undo(repo: &Repository) -> Result<UndoOutcome> {
    let paths = entry_paths(repo)?;
    let (path, entry) = paths
        .iter()
        .rev()
        .find_map(|p| {
            let e = read_entry(p).ok()?;
            e.after.is_some().then(|| (p.clone(), e))
        })
        .ok_or_else(|| VcsError::NothingToDo("no completed journal entry to undo".into()))?;
    let after = entry.after.clone().expect("filtered on after.is_some()");
    let before = entry.before.clone();

    if before.head_id != ObjectId::ZERO {
        // Fails fast with NotFound/Corrupt if the commit was pruned.
        repo.store.read_commit(before.head_id)?;
    }

    match (&before.branch, &after.branch) {
        (Some(branch), Some(after_branch)) if branch == after_branch => {
            if before.head_id == ObjectId::ZERO {
                let _ = repo.refs.delete(branch);
            } else {
                repo.refs.update(branch, before.head_id, Some(after.head_id))?;
            }
        }
        _ => {
            // HEAD itself moved between symbolic/detached or across branches;
            // restore the pointer directly rather than CAS a ref that may no
            // longer be the one HEAD names.
            match &before.branch {
                Some(branch) => {
                    repo.refs.set_head_symbolic(branch)?;
                    if before.head_id != ObjectId::ZERO {
                        repo.refs.update(branch, before.head_id, None)?;
                    }
                }
                None => repo.refs.set_head_detached(before.head_id)?,
            }
        }
    }

    let index_blob = repo.store.read_blob(before.index_snapshot)?;
    atomic_write(&repo.index_path(), &index_blob.data)?;

    if before.head_id != ObjectId::ZERO {
        let commit = repo.store.read_commit(before.head_id)?;
        repo.checkout_tree(commit.tree_id)?;
    }

    std::fs::remove_file(&path)?;

    Ok(UndoOutcome {
        operation: entry.operation,
        restored_head: before.head_id,
    })
}

/// Drop journal entries older than the configured retention window,
/// shorter for entries whose `after` HEAD is no longer reachable.
pub fn expire_entries(repo: &Repository, reachable: &HashSet<ObjectId>) -> Result<usize> {
    let now = Utc::now().timestamp();
    let mut removed = 0;
    for path in entry_paths(repo)? {
        let Ok(entry) = read_entry(&path) else {
            continue;
        };
        let is_reachable = entry
            .after
            .as_ref()
            .map(|a| reachable.contains(&a.head_id))
            .unwrap_or(true);
        let window_days = if is_reachable {
            repo.config.journal_retention_days
        } else {
            repo.config.journal_retention_days_unreachable
        };
        let age_days = (now - entry.timestamp) / 86_400;
        if age_days > window_days {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexEntry as Entry;
    use crate::internal::object::signature::Signature;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn init_repo_with(dir: &tempfile::TempDir, name: &str, content: &str) -> Repository {
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add(name, &repo.store).unwrap();
        index.save().unwrap();
        let entries: BTreeMap<String, Entry> = index
            .entries()
            .map(|(p, e)| (p.to_string(), e.clone()))
            .collect();
        let tree_id = repo.build_tree(&entries).unwrap();
        let author = Signature::new("A", "a@example.com", 1, "+0000");
        let commit = crate::internal::object::commit::Commit::new(
            author.clone(),
            author,
            tree_id,
            vec![],
            "root\n",
        );
        let id = repo.store.write_commit(&commit).unwrap();
        repo.refs.update("refs/heads/main", id, None).unwrap();
        repo
    }

    #[test]
    fn begin_then_commit_round_trips_state() {
        let dir = tempdir().unwrap();
        let repo = init_repo_with(&dir, "a.txt", "v1\n");
        let root = repo.resolve("HEAD").unwrap();

        let pending = begin(&repo, "reset", vec!["--hard".into(), "HEAD".into()]).unwrap();
        assert_eq!(pending.entry.before.head_id, root);

        pending.commit(&repo, None).unwrap();
        let paths = entry_paths(&repo).unwrap();
        assert_eq!(paths.len(), 1);
        let saved = read_entry(&paths[0]).unwrap();
        assert!(saved.after.is_some());
    }

    #[test]
    fn undo_restores_head_to_before_state() {
        let dir = tempdir().unwrap();
        let repo = init_repo_with(&dir, "a.txt", "v1\n");
        let root = repo.resolve("HEAD").unwrap();

        let pending = begin(&repo, "commit", vec![]).unwrap();
        std::fs::write(repo.root.join("a.txt"), "v2\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add("a.txt", &repo.store).unwrap();
        index.save().unwrap();
        let entries: BTreeMap<String, Entry> = index
            .entries()
            .map(|(p, e)| (p.to_string(), e.clone()))
            .collect();
        let tree_id = repo.build_tree(&entries).unwrap();
        let author = Signature::new("A", "a@example.com", 2, "+0000");
        let commit = crate::internal::object::commit::Commit::new(
            author.clone(),
            author,
            tree_id,
            vec![root],
            "v2\n",
        );
        let new_id = repo.store.write_commit(&commit).unwrap();
        repo.update_head_to(new_id, Some(root)).unwrap();
        pending.commit(&repo, None).unwrap();

        assert_eq!(repo.resolve("HEAD").unwrap(), new_id);
        let outcome = undo(&repo).unwrap();
        assert_eq!(outcome.restored_head, root);
        assert_eq!(repo.resolve("HEAD").unwrap(), root);
        assert_eq!(
            std::fs::read_to_string(repo.root.join("a.txt")).unwrap(),
            "v1\n"
        );
    }

    #[test]
    fn undo_with_no_entries_is_nothing_to_do() {
        let dir = tempdir().unwrap();
        let repo = init_repo_with(&dir, "a.txt", "v1\n");
        let err = undo(&repo).unwrap_err();
        assert!(matches!(err, VcsError::NothingToDo(_)));
    }

    #[test]
    fn expire_entries_drops_old_reachable_entries() {
        let dir = tempdir().unwrap();
        let repo = init_repo_with(&dir, "a.txt", "v1\n");
        let root = repo.resolve("HEAD").unwrap();
        let pending = begin(&repo, "noop", vec![]).unwrap();
        pending.commit(&repo, None).unwrap();

        let paths = entry_paths(&repo).unwrap();
        let mut entry = read_entry(&paths[0]).unwrap();
        entry.timestamp -= (repo.config.journal_retention_days + 1) * 86_400;
        write_entry(&paths[0], &entry).unwrap();

        let mut reachable = HashSet::new();
        reachable.insert(root);
        let removed = expire_entries(&repo, &reachable).unwrap();
        assert_eq!(removed, 1);
        assert!(entry_paths(&repo).unwrap().is_empty());
    }
}
