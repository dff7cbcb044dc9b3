//! History-rewriting operations: reset, uncommit, stash, tag, clean (§4.6).
//!
//! Grounded on gitr's `reset.rs` for the soft/mixed/hard control flow and
//! sidecar-cleanup idiom, and behaviorally (not storage-wise — see the
//! `StashEntry` doc comment) on gitr's `stash.rs` for the staged-vs-worktree
//! distinction stash push/pop/apply capture.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::errors::{Result, VcsError};
use crate::hash::ObjectId;
use crate::ignore::IgnoreRules;
use crate::index::{self, IndexEntry};
use crate::internal::object::types::FileMode;
use crate::internal::object::tag::Tag;
use crate::journal;
use crate::merge::{self, MergeState};
use crate::refs::TAGS_PREFIX;
use crate::repo::Repository;
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Move HEAD only.
    Soft,
    /// Move HEAD and rebuild the index from the target tree.
    Mixed,
    /// Mixed, plus rewrite the working tree to match.
    Hard,
}

fn require_idle(repo: &Repository) -> Result<()> {
    if merge::merge_state(repo)? != MergeState::Idle {
        return Err(VcsError::Refuse(
            "refusing to reset while a merge/cherry-pick/revert is in progress; use --continue or --abort first".into(),
        ));
    }
    Ok(())
}

fn reset_impl(repo: &Repository, target_rev: &str, mode: ResetMode) -> Result<ObjectId> {
    let target_id = repo.resolve(target_rev)?;
    let target_commit = repo.store.read_commit(target_id)?;
    let old_head = repo.resolve("HEAD")?;

    repo.update_head_to(target_id, Some(old_head))?;

    if !matches!(mode, ResetMode::Soft) {
        let mut index = repo.index()?;
        index.clear();
        for (path, (file_mode, id)) in repo.tree_entries(target_commit.tree_id)? {
            index.set(path, IndexEntry { mode: file_mode, id });
        }
        index.save()?;
    }

    if matches!(mode, ResetMode::Hard) {
        repo.checkout_tree(target_commit.tree_id)?;
    }

    Ok(target_id)
}

/// Move HEAD (and, per `mode`, the index and working tree) to `target_rev`.
pub fn reset(repo: &Repository, target_rev: &str, mode: ResetMode) -> Result<ObjectId> {
    require_idle(repo)?;
    let pending = journal::begin(repo, "reset", vec![target_rev.to_string(), format!("{mode:?}")])?;
    let target_id = reset_impl(repo, target_rev, mode)?;
    pending.commit(repo, None)?;
    tracing::info!(rev = target_rev, mode = ?mode, id = %target_id, "reset");
    Ok(target_id)
}

/// Restore a single path's index entry from HEAD, touching neither HEAD
/// nor the working tree.
pub fn reset_path(repo: &Repository, path: &str) -> Result<()> {
    let pending = journal::begin(repo, "reset_path", vec![path.to_string()])?;
    let head_id = repo.resolve("HEAD")?;
    let head_commit = repo.store.read_commit(head_id)?;
    let head_entries = repo.tree_entries(head_commit.tree_id)?;
    let mut index = repo.index()?;
    match head_entries.get(path) {
        Some((mode, id)) => index.set(path.to_string(), IndexEntry { mode: *mode, id: *id }),
        None => index.remove(path),
    }
    index.save()?;
    pending.commit(repo, None)?;
    tracing::debug!(path, "reset_path");
    Ok(())
}

pub struct UncommitOutcome {
    pub previous_head: ObjectId,
    pub removed_message: String,
}

/// Equivalent to `reset(HEAD~N, soft|hard)`, reporting what was dropped.
pub fn uncommit(repo: &Repository, n: usize, hard: bool) -> Result<UncommitOutcome> {
    require_idle(repo)?;
    let pending = journal::begin(repo, "uncommit", vec![n.to_string(), hard.to_string()])?;
    let old_head = repo.resolve("HEAD")?;
    let removed_commit = repo.store.read_commit(old_head)?;
    let target = repo.resolve(&format!("HEAD~{n}"))?;
    reset_impl(
        repo,
        &target.to_hex(),
        if hard { ResetMode::Hard } else { ResetMode::Soft },
    )?;
    pending.commit(repo, None)?;
    tracing::info!(n, hard, previous_head = %old_head, "uncommit");
    Ok(UncommitOutcome {
        previous_head: old_head,
        removed_message: removed_commit.format_message(),
    })
}

// --- Tag (§4.2/§4.6) ---

/// Create a branch or annotated tag named `name` pointing at `target`.
/// `annotated` carries a (tagger, message) pair; light tags pass `None`.
/// Fails if the name already exists unless `force`.
pub fn create_tag(
    repo: &Repository,
    name: &str,
    target: ObjectId,
    annotated: Option<(crate::internal::object::signature::Signature, String)>,
    force: bool,
) -> Result<ObjectId> {
    let pending = journal::begin(repo, "tag", vec![name.to_string(), target.to_hex(), force.to_string()])?;
    let full = format!("{TAGS_PREFIX}{name}");
    let existing = repo.refs.ref_exists(&full);
    if existing && !force {
        return Err(VcsError::Refuse(format!("tag `{name}` already exists")));
    }

    let id = match annotated {
        Some((tagger, message)) => {
            let target_kind = repo.store.read(target)?.kind();
            let tag = Tag::new(target, target_kind, name, tagger, &message);
            repo.store.write_tag(&tag)?
        }
        None => target,
    };

    let expected_old = if existing {
        Some(repo.refs.read_ref(&full)?)
    } else {
        None
    };
    repo.refs.update(&full, id, expected_old)?;
    pending.commit(repo, None)?;
    tracing::info!(name, target = %target, "create_tag");
    Ok(id)
}

pub fn delete_tag(repo: &Repository, name: &str) -> Result<()> {
    let pending = journal::begin(repo, "tag_delete", vec![name.to_string()])?;
    repo.refs.delete(&format!("{TAGS_PREFIX}{name}"))?;
    pending.commit(repo, None)?;
    tracing::info!(name, "delete_tag");
    Ok(())
}

// --- Clean (§4.6) ---

#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    pub force: bool,
    pub dry_run: bool,
    pub directories: bool,
    pub include_ignored: bool,
}

/// Remove untracked files (and, per `opts`, directories/ignored files).
/// Refuses to run without `force` or `dry_run` (§4.6's safety invariant).
pub fn clean(repo: &Repository, opts: &CleanOptions) -> Result<Vec<String>> {
    if !opts.force && !opts.dry_run {
        return Err(VcsError::Refuse(
            "clean refuses to run without --force or --dry-run".into(),
        ));
    }

    // A dry run touches nothing, so it has no before/after state worth
    // recording; only a real sweep is journaled.
    let pending = if opts.dry_run {
        None
    } else {
        Some(journal::begin(
            repo,
            "clean",
            vec![
                opts.directories.to_string(),
                opts.include_ignored.to_string(),
            ],
        )?)
    };

    let index = repo.index()?;
    let tracked: HashSet<String> = index.entries().map(|(p, _)| p.to_string()).collect();
    let mut removed = Vec::new();

    let walker = WalkDir::new(&repo.root)
        .contents_first(true)
        .into_iter()
        .filter_entry(|e| e.file_name() != index::METADATA_DIR_NAME);

    for entry in walker {
        let entry = entry.map_err(|e| VcsError::IOError(e.into()))?;
        if entry.path() == repo.root {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(&repo.root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        if entry.file_type().is_dir() {
            if !opts.directories {
                continue;
            }
            let is_empty = std::fs::read_dir(entry.path())
                .map(|mut d| d.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                continue;
            }
            let ignored = IgnoreRules::load(&repo.root, entry.path()).is_ignored(&rel, true);
            if ignored && !opts.include_ignored {
                continue;
            }
            if !opts.dry_run {
                let _ = std::fs::remove_dir(entry.path());
            }
            removed.push(format!("{rel}/"));
            continue;
        }

        if !entry.file_type().is_file() || tracked.contains(&rel) {
            continue;
        }
        let dir = entry.path().parent().unwrap_or(&repo.root);
        let ignored = IgnoreRules::load(&repo.root, dir).is_ignored(&rel, false);
        if ignored && !opts.include_ignored {
            continue;
        }
        if !opts.dry_run {
            std::fs::remove_file(entry.path())?;
        }
        removed.push(rel);
    }

    if let Some(pending) = pending {
        pending.commit(repo, Some(format!("{} removed", removed.len())))?;
    }
    tracing::info!(count = removed.len(), dry_run = opts.dry_run, "clean");
    Ok(removed)
}

// --- Stash (§3/§4.6) ---
//
// Unlike the original Git model gitr's `stash.rs` reconstructs (two synthetic
// commits on a side chain), this engine keeps the stash stack as an opaque
// JSON sidecar of blob references (see SPEC_FULL.md §9's decision). Only the
// behavioral shape — capture staged/modified content, restore HEAD's
// versions on push, re-stage on pop for paths that were staged — is carried
// over from gitr's `build_worktree_tree`/stage-vs-worktree split.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StashedFile {
    pub path: String,
    pub mode: FileMode,
    pub blob_id: ObjectId,
    pub was_staged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StashEntry {
    pub id: String,
    pub branch: String,
    pub message: String,
    pub files: Vec<StashedFile>,
    pub staged_paths: Vec<String>,
    pub created_at: i64,
}

fn stash_path(repo: &Repository) -> PathBuf {
    repo.vcs_dir.join("stash").join("entries.json")
}

fn load_stash(repo: &Repository) -> Result<Vec<StashEntry>> {
    let path = stash_path(repo);
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let data = std::fs::read(&path)?;
    serde_json::from_slice(&data).map_err(|e| VcsError::Corrupt(format!("stash is corrupt: {e}")))
}

fn save_stash(repo: &Repository, entries: &[StashEntry]) -> Result<()> {
    let data = serde_json::to_vec_pretty(entries)
        .map_err(|e| VcsError::Corrupt(format!("failed to serialize stash: {e}")))?;
    crate::utils::atomic_write(&stash_path(repo), &data)?;
    Ok(())
}

/// Snapshot staged and modified (tracked) changes into a new stash entry,
/// then restore the working tree and index to HEAD for those paths.
/// Untracked files are left untouched.
pub fn stash_push(repo: &Repository, message: Option<String>) -> Result<StashEntry> {
    let head_id = repo.resolve("HEAD")?;
    let head_commit = repo.store.read_commit(head_id)?;
    let head_entries = repo.tree_entries(head_commit.tree_id)?;
    let head_ids: BTreeMap<String, ObjectId> =
        head_entries.iter().map(|(p, (_, id))| (p.clone(), *id)).collect();

    let mut index = repo.index()?;
    let status = index.status(&head_ids)?;
    if status.staged.is_empty() && status.modified.is_empty() {
        return Err(VcsError::NothingToDo("no local changes to save".into()));
    }

    let pending = journal::begin(repo, "stash_push", vec![])?;
    let branch = repo.current_branch()?.unwrap_or_else(|| "(detached)".to_string());
    let mut touched: Vec<String> = status
        .staged
        .iter()
        .chain(status.modified.iter())
        .cloned()
        .collect();
    touched.sort();
    touched.dedup();

    let mut files = Vec::new();
    for path in &touched {
        let abs = repo.root.join(path);
        let data = std::fs::read(&abs)?;
        let blob_id = repo.store.write_blob(data)?;
        let mode = index.get(path).map(|e| e.mode).unwrap_or(FileMode::Regular);
        files.push(StashedFile {
            path: path.clone(),
            mode,
            blob_id,
            was_staged: status.staged.contains(path),
        });
    }

    let summary = head_commit.format_message();
    let short = head_id.to_hex()[..7].to_string();
    let entry = StashEntry {
        id: new_stash_id(),
        branch: branch.clone(),
        message: message.unwrap_or_else(|| format!("WIP on {branch}: {short} {summary}")),
        files,
        staged_paths: status.staged.clone(),
        created_at: Utc::now().timestamp(),
    };

    for path in &touched {
        let abs = repo.root.join(path);
        match head_entries.get(path) {
            Some((_, id)) => {
                let blob = repo.store.read_blob(*id)?;
                std::fs::write(&abs, &blob.data)?;
            }
            None => {
                let _ = std::fs::remove_file(&abs);
            }
        }
    }

    index.clear();
    for (path, (mode, id)) in &head_entries {
        index.set(path.clone(), IndexEntry { mode: *mode, id: *id });
    }
    index.save()?;

    let mut entries = load_stash(repo)?;
    entries.insert(0, entry.clone());
    save_stash(repo, &entries)?;
    pending.commit(repo, Some(entry.id.clone()))?;
    tracing::info!(id = %entry.id, files = touched.len(), "stash_push");
    Ok(entry)
}

/// Write a stash entry's captured files back onto the working tree (and,
/// for paths that were staged, the index).
fn apply_entry(repo: &Repository, entry: &StashEntry) -> Result<()> {
    let mut index = repo.index()?;
    for file in &entry.files {
        let abs = repo.root.join(&file.path);
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let blob = repo.store.read_blob(file.blob_id)?;
        std::fs::write(&abs, &blob.data)?;
        if file.was_staged {
            index.set(
                file.path.clone(),
                IndexEntry {
                    mode: file.mode,
                    id: file.blob_id,
                },
            );
        }
    }
    index.save()?;
    Ok(())
}

pub fn stash_apply(repo: &Repository, at: usize) -> Result<()> {
    let entries = load_stash(repo)?;
    let entry = entries
        .get(at)
        .ok_or_else(|| VcsError::NotFound(format!("no stash entry at index {at}")))?;
    let pending = journal::begin(repo, "stash_apply", vec![at.to_string()])?;
    apply_entry(repo, entry)?;
    pending.commit(repo, None)?;
    tracing::info!(at, "stash_apply");
    Ok(())
}

pub fn stash_pop(repo: &Repository, at: usize) -> Result<StashEntry> {
    let mut entries = load_stash(repo)?;
    if at >= entries.len() {
        return Err(VcsError::NotFound(format!("no stash entry at index {at}")));
    }
    let pending = journal::begin(repo, "stash_pop", vec![at.to_string()])?;
    apply_entry(repo, &entries[at])?;
    let entry = entries.remove(at);
    save_stash(repo, &entries)?;
    pending.commit(repo, Some(entry.id.clone()))?;
    tracing::info!(at, id = %entry.id, "stash_pop");
    Ok(entry)
}

pub fn stash_drop(repo: &Repository, at: usize) -> Result<StashEntry> {
    let mut entries = load_stash(repo)?;
    if at >= entries.len() {
        return Err(VcsError::NotFound(format!("no stash entry at index {at}")));
    }
    let pending = journal::begin(repo, "stash_drop", vec![at.to_string()])?;
    let entry = entries.remove(at);
    save_stash(repo, &entries)?;
    pending.commit(repo, Some(entry.id.clone()))?;
    tracing::info!(at, id = %entry.id, "stash_drop");
    Ok(entry)
}

pub fn stash_list(repo: &Repository) -> Result<Vec<StashEntry>> {
    load_stash(repo)
}

pub fn stash_show(repo: &Repository, at: usize) -> Result<StashEntry> {
    load_stash(repo)?
        .into_iter()
        .nth(at)
        .ok_or_else(|| VcsError::NotFound(format!("no stash entry at index {at}")))
}

pub fn stash_clear(repo: &Repository) -> Result<()> {
    let pending = journal::begin(repo, "stash_clear", vec![])?;
    save_stash(repo, &[])?;
    pending.commit(repo, None)?;
    tracing::info!("stash_clear");
    Ok(())
}

fn new_stash_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::object::signature::Signature;
    use tempfile::tempdir;
    use tracing_subscriber::util::SubscriberInitExt;

    /// Same as `tracing_subscriber::fmt().init()`, but `try_init` so running
    /// it from more than one test in the binary doesn't panic on re-init.
    fn init_logger() {
        let _ = tracing_subscriber::fmt::Subscriber::builder()
            .with_target(false)
            .without_time()
            .with_level(true)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
            .try_init();
    }

    fn init_repo_with(dir: &tempfile::TempDir, name: &str, content: &str) -> Repository {
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add(name, &repo.store).unwrap();
        index.save().unwrap();
        let entries: BTreeMap<String, IndexEntry> = index
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

    fn commit_on_head(repo: &Repository, name: &str, content: &str, message: &str) -> ObjectId {
        std::fs::write(repo.root.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add(name, &repo.store).unwrap();
        index.save().unwrap();
        let entries: BTreeMap<String, IndexEntry> = index
            .entries()
            .map(|(p, e)| (p.to_string(), e.clone()))
            .collect();
        let tree_id = repo.build_tree(&entries).unwrap();
        let head_id = repo.resolve("HEAD").unwrap();
        let author = Signature::new("A", "a@example.com", 2, "+0000");
        let commit = crate::internal::object::commit::Commit::new(
            author.clone(),
            author,
            tree_id,
            vec![head_id],
            message,
        );
        let id = repo.store.write_commit(&commit).unwrap();
        repo.update_head_to(id, Some(head_id)).unwrap();
        id
    }

    /// §8 scenario 3: soft/mixed/hard reset over staged+disk state.
    #[test]
    fn reset_modes_affect_head_index_and_worktree_differently() {
        let dir = tempdir().unwrap();
        let repo = init_repo_with(&dir, "a.txt", "v1\n");
        let root = repo.resolve("HEAD").unwrap();
        commit_on_head(&repo, "a.txt", "v2\n", "v2\n");

        reset(&repo, &root.to_hex(), ResetMode::Soft).unwrap();
        assert_eq!(repo.resolve("HEAD").unwrap(), root);
        // soft: index still has v2's blob, disk still has v2's content
        let index = repo.index().unwrap();
        assert_eq!(
            std::fs::read_to_string(repo.root.join("a.txt")).unwrap(),
            "v2\n"
        );
        drop(index);

        commit_on_head(&repo, "a.txt", "v2\n", "v2 again\n");
        reset(&repo, &root.to_hex(), ResetMode::Mixed).unwrap();
        let index = repo.index().unwrap();
        let head_entries = repo.tree_entries(repo.store.read_commit(root).unwrap().tree_id).unwrap();
        assert_eq!(index.get("a.txt").unwrap().id, head_entries["a.txt"].1);
        // mixed: disk untouched
        assert_eq!(
            std::fs::read_to_string(repo.root.join("a.txt")).unwrap(),
            "v2\n"
        );
        drop(index);

        reset(&repo, &root.to_hex(), ResetMode::Hard).unwrap();
        assert_eq!(
            std::fs::read_to_string(repo.root.join("a.txt")).unwrap(),
            "v1\n"
        );
    }

    #[test]
    fn uncommit_reports_previous_head_and_message() {
        let dir = tempdir().unwrap();
        let repo = init_repo_with(&dir, "a.txt", "v1\n");
        let root = repo.resolve("HEAD").unwrap();
        let tip = commit_on_head(&repo, "a.txt", "v2\n", "second commit\n");

        let outcome = uncommit(&repo, 1, false).unwrap();
        assert_eq!(outcome.previous_head, tip);
        assert_eq!(outcome.removed_message, "second commit");
        assert_eq!(repo.resolve("HEAD").unwrap(), root);
    }

    #[test]
    fn tag_create_and_duplicate_rejection() {
        let dir = tempdir().unwrap();
        let repo = init_repo_with(&dir, "a.txt", "v1\n");
        let head = repo.resolve("HEAD").unwrap();
        create_tag(&repo, "v1.0.0", head, None, false).unwrap();
        let err = create_tag(&repo, "v1.0.0", head, None, false).unwrap_err();
        assert!(matches!(err, VcsError::Refuse(_)));
        create_tag(&repo, "v1.0.0", head, None, true).unwrap();
    }

    #[test]
    fn annotated_tag_writes_a_tag_object() {
        let dir = tempdir().unwrap();
        let repo = init_repo_with(&dir, "a.txt", "v1\n");
        let head = repo.resolve("HEAD").unwrap();
        let tagger = Signature::new("A", "a@example.com", 5, "+0000");
        let tag_id = create_tag(
            &repo,
            "v1.0.0",
            head,
            Some((tagger, "release\n".to_string())),
            false,
        )
        .unwrap();
        assert_ne!(tag_id, head);
        assert_eq!(repo.resolve("v1.0.0").unwrap(), head);
    }

    #[test]
    fn clean_refuses_without_force_or_dry_run() {
        let dir = tempdir().unwrap();
        let repo = init_repo_with(&dir, "a.txt", "v1\n");
        let err = clean(&repo, &CleanOptions::default()).unwrap_err();
        assert!(matches!(err, VcsError::Refuse(_)));
    }

    #[test]
    fn clean_removes_untracked_but_not_tracked_or_ignored() {
        let dir = tempdir().unwrap();
        let repo = init_repo_with(&dir, "a.txt", "v1\n");
        std::fs::write(repo.root.join("loose.txt"), "x").unwrap();
        std::fs::write(repo.root.join(".vcsignore"), "keep.txt\n").unwrap();
        std::fs::write(repo.root.join("keep.txt"), "y").unwrap();

        let removed = clean(
            &repo,
            &CleanOptions {
                force: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(removed.contains(&"loose.txt".to_string()));
        assert!(!removed.iter().any(|p| p == "keep.txt"));
        assert!(repo.root.join("a.txt").is_file());
        assert!(!repo.root.join("loose.txt").is_file());
        assert!(repo.root.join("keep.txt").is_file());
    }

    #[test]
    fn stash_push_then_pop_round_trips_staged_change() {
        init_logger();
        let dir = tempdir().unwrap();
        let repo = init_repo_with(&dir, "a.txt", "v1\n");
        std::fs::write(repo.root.join("a.txt"), "v2\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add("a.txt", &repo.store).unwrap();
        index.save().unwrap();

        let entry = stash_push(&repo, None).unwrap();
        assert_eq!(
            std::fs::read_to_string(repo.root.join("a.txt")).unwrap(),
            "v1\n"
        );
        assert_eq!(stash_list(&repo).unwrap().len(), 1);

        stash_pop(&repo, 0).unwrap();
        assert_eq!(
            std::fs::read_to_string(repo.root.join("a.txt")).unwrap(),
            "v2\n"
        );
        assert!(stash_list(&repo).unwrap().is_empty());
        assert_eq!(entry.staged_paths, vec!["a.txt".to_string()]);
    }

    #[test]
    fn stash_push_with_no_changes_is_nothing_to_do() {
        let dir = tempdir().unwrap();
        let repo = init_repo_with(&dir, "a.txt", "v1\n");
        let err = stash_push(&repo, None).unwrap_err();
        assert!(matches!(err, VcsError::NothingToDo(_)));
    }
}
