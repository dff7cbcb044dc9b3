//! Multi-module scenarios that a unit test inside a single source file
//! can't exercise cleanly: a reset matrix that crosses `history`/`journal`,
//! a cherry-pick that conflicts and is resolved via `merge`, and a gc pass
//! that must leave an in-progress cherry-pick's objects alone. Grounded on
//! the teacher's `tests/decode-index-pack.rs` placement (fixture helpers
//! up top, one `#[test]` per scenario below).

use std::collections::BTreeMap;

use tempfile::TempDir;
use vcs_engine::history::{self, ResetMode};
use vcs_engine::internal::object::commit::Commit;
use vcs_engine::internal::object::signature::Signature;
use vcs_engine::index::IndexEntry;
use vcs_engine::{gc, journal, merge};
use vcs_engine::merge::MergeOutcome;
use vcs_engine::hash::ObjectId;
use vcs_engine::Repository;

fn write_and_commit(repo: &Repository, name: &str, content: &str, message: &str, time: i64) -> ObjectId {
    std::fs::write(repo.root.join(name), content).unwrap();
    let mut index = repo.index().unwrap();
    index.add(name, &repo.store).unwrap();
    index.save().unwrap();
    let entries: BTreeMap<String, IndexEntry> = index
        .entries()
        .map(|(p, e)| (p.to_string(), e.clone()))
        .collect();
    let tree_id = repo.build_tree(&entries).unwrap();
    let parents = repo.resolve("HEAD").map(|id| vec![id]).unwrap_or_default();
    let author = Signature::new("A", "a@example.com", time, "+0000");
    let commit = Commit::new(author.clone(), author, tree_id, parents.clone(), message);
    let id = repo.store.write_commit(&commit).unwrap();
    let old = parents.first().copied();
    repo.update_head_to(id, old).unwrap();
    id
}

fn init_repo(dir: &TempDir) -> Repository {
    let repo = Repository::init(dir.path()).unwrap();
    write_and_commit(&repo, "a.txt", "v1\n", "root\n", 1);
    repo
}

#[test]
fn reset_hard_then_undo_restores_the_discarded_commit() {
    let dir = TempDir::new().unwrap();
    let repo = init_repo(&dir);
    let root = repo.resolve("HEAD").unwrap();
    let tip = write_and_commit(&repo, "a.txt", "v2\n", "second\n", 2);

    history::reset(&repo, &root.to_hex(), ResetMode::Hard).unwrap();

    assert_eq!(repo.resolve("HEAD").unwrap(), root);
    assert_eq!(
        std::fs::read_to_string(repo.root.join("a.txt")).unwrap(),
        "v1\n"
    );

    let outcome = journal::undo(&repo).unwrap();
    assert_eq!(outcome.restored_head, tip);
    assert_eq!(repo.resolve("HEAD").unwrap(), tip);
    assert_eq!(
        std::fs::read_to_string(repo.root.join("a.txt")).unwrap(),
        "v2\n"
    );
}

#[test]
fn cherry_pick_conflict_then_resolve_and_continue() {
    let dir = TempDir::new().unwrap();
    let repo = init_repo(&dir);
    let root = repo.resolve("HEAD").unwrap();

    // Side branch: diverges from root by changing a.txt one way.
    write_and_commit(&repo, "a.txt", "from-main\n", "main change\n", 2);

    // A commit on a throwaway branch, based on root, changing a.txt the
    // other way, so picking it onto main conflicts.
    repo.refs.update("refs/heads/topic", root, None).unwrap();
    repo.refs.set_head_symbolic("refs/heads/topic").unwrap();
    history::reset(&repo, &root.to_hex(), ResetMode::Hard).unwrap();
    let picked = write_and_commit(&repo, "a.txt", "from-topic\n", "topic change\n", 3);

    repo.refs.set_head_symbolic("refs/heads/main").unwrap();
    history::reset(&repo, &repo.refs.read_ref("refs/heads/main").unwrap().to_hex(), ResetMode::Hard).unwrap();

    let outcome = merge::cherry_pick(&repo, picked).unwrap();
    assert!(matches!(outcome, MergeOutcome::Conflicted(_)));
    assert_eq!(
        merge::merge_state(&repo).unwrap(),
        merge::MergeState::InProgressConflicted
    );

    std::fs::write(repo.root.join("a.txt"), "resolved\n").unwrap();
    merge::resolve_conflict(&repo, "a.txt").unwrap();
    assert_eq!(
        merge::merge_state(&repo).unwrap(),
        merge::MergeState::InProgressClean
    );

    let new_id = merge::continue_operation(&repo).unwrap();
    assert_eq!(repo.resolve("HEAD").unwrap(), new_id);
    assert_eq!(merge::merge_state(&repo).unwrap(), merge::MergeState::Idle);
    assert_eq!(
        std::fs::read_to_string(repo.root.join("a.txt")).unwrap(),
        "resolved\n"
    );
}

#[test]
fn gc_does_not_collect_objects_behind_an_in_progress_cherry_pick() {
    let dir = TempDir::new().unwrap();
    let repo = init_repo(&dir);
    let root = repo.resolve("HEAD").unwrap();

    repo.refs.update("refs/heads/topic", root, None).unwrap();
    repo.refs.set_head_symbolic("refs/heads/topic").unwrap();
    let picked = write_and_commit(&repo, "a.txt", "from-topic\n", "topic change\n", 2);

    repo.refs.set_head_symbolic("refs/heads/main").unwrap();
    history::reset(&repo, &root.to_hex(), ResetMode::Hard).unwrap();

    write_and_commit(&repo, "a.txt", "from-main\n", "main change\n", 3);
    let outcome = merge::cherry_pick(&repo, picked).unwrap();
    assert!(matches!(outcome, MergeOutcome::Conflicted(_)));

    // Drop the branch that named `picked`; only the cherry-pick sidecar
    // keeps it reachable now.
    repo.refs.delete("refs/heads/topic").unwrap();

    let stats = gc::gc(&repo, &gc::GcOptions { now: true, ..Default::default() }).unwrap();
    assert!(repo.store.read(picked).is_ok());
    assert!(stats.objects_removed == 0 || !repo.store.read(picked).is_err());
}
