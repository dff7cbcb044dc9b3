//! The repository: wires the object store, ref store, index, and config
//! together, and owns revision resolution (§4.2's `resolve` grammar) and
//! the tree-building/checkout helpers that history operations compose.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::RepoConfig;
use crate::errors::{Result, VcsError};
use crate::hash::ObjectId;
use crate::ignore::IgnoreRules;
use crate::index::{Index, IndexEntry, METADATA_DIR_NAME};
use crate::internal::object::tree::{Tree, TreeEntry};
use crate::internal::object::types::FileMode;
use crate::refs::{Head, RefStore};
use crate::store::ObjectStore;

pub struct Repository {
    /// Working tree root.
    pub root: PathBuf,
    /// Repository metadata root (contains `HEAD`, `objects/`, `refs/`, ...).
    pub vcs_dir: PathBuf,
    pub store: ObjectStore,
    pub refs: RefStore,
    pub config: RepoConfig,
}

impl Repository {
    /// Initialize a fresh repository rooted at `root`, with HEAD pointing
    /// at an as-yet-unborn `main` branch.
    pub fn init(root: impl Into<PathBuf>) -> Result<Repository> {
        let root = root.into();
        let vcs_dir = Self::vcs_dir_for(&root);
        std::fs::create_dir_all(vcs_dir.join("objects"))?;
        std::fs::create_dir_all(vcs_dir.join("refs/heads"))?;
        std::fs::create_dir_all(vcs_dir.join("refs/tags"))?;
        std::fs::create_dir_all(vcs_dir.join("journal"))?;
        std::fs::create_dir_all(vcs_dir.join("stash"))?;

        let refs = RefStore::new(&vcs_dir);
        refs.set_head_symbolic("refs/heads/main")?;

        Ok(Repository {
            store: ObjectStore::new(vcs_dir.join("objects")),
            refs,
            root,
            vcs_dir,
            config: RepoConfig::default(),
        })
    }

    /// Open an existing repository rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Repository> {
        let root = root.into();
        let vcs_dir = Self::vcs_dir_for(&root);
        if !vcs_dir.join("HEAD").is_file() {
            return Err(VcsError::NotFound(format!(
                "no repository metadata found at {}",
                vcs_dir.display()
            )));
        }
        Ok(Repository {
            store: ObjectStore::new(vcs_dir.join("objects")),
            refs: RefStore::new(&vcs_dir),
            root,
            vcs_dir,
            config: RepoConfig::default(),
        })
    }

    fn vcs_dir_for(root: &Path) -> PathBuf {
        RepoConfig::data_dir_override().unwrap_or_else(|| root.join(METADATA_DIR_NAME))
    }

    pub fn index_path(&self) -> PathBuf {
        self.vcs_dir.join("index")
    }

    pub fn index(&self) -> Result<Index> {
        Index::load(self.index_path(), &self.root)
    }

    pub fn sidecar_path(&self, name: &str) -> PathBuf {
        self.vcs_dir.join(name)
    }

    pub fn current_branch(&self) -> Result<Option<String>> {
        match self.refs.get_head()? {
            Head::Symbolic(target) => Ok(target.strip_prefix(crate::refs::HEADS_PREFIX).map(str::to_string)),
            Head::Detached(_) => Ok(None),
        }
    }

    /// Resolve a revision expression: `HEAD`, a branch or tag name, a full
    /// `refs/...` path, or a hex object-id prefix (≥4 chars), optionally
    /// followed by a chain of `~N`/`^`/`^N` suffix operators (§4.2).
    /// Annotated tags are peeled to their ultimate target.
    pub fn resolve(&self, rev: &str) -> Result<ObjectId> {
        let (base, ops) = split_ops(rev);
        let mut id = self.resolve_base(base)?;
        for op in ops {
            id = self.apply_op(id, op)?;
        }
        Ok(id)
    }

    fn resolve_base(&self, base: &str) -> Result<ObjectId> {
        if base.is_empty() {
            return Err(VcsError::InvalidArgument("empty revision".into()));
        }
        if base == "HEAD" {
            return self.peel_head();
        }
        if let Some(full) = base.strip_prefix("refs/") {
            let id = self.refs.read_ref(&format!("refs/{full}"))?;
            return self.store.peel(id);
        }
        let branch_path = format!("{}{}", crate::refs::HEADS_PREFIX, base);
        if self.refs.ref_exists(&branch_path) {
            let id = self.refs.read_ref(&branch_path)?;
            return self.store.peel(id);
        }
        let tag_path = format!("{}{}", crate::refs::TAGS_PREFIX, base);
        if self.refs.ref_exists(&tag_path) {
            let id = self.refs.read_ref(&tag_path)?;
            return self.store.peel(id);
        }
        if base.len() >= 4 && base.chars().all(|c| c.is_ascii_hexdigit()) {
            return self.resolve_hex_prefix(base);
        }
        Err(VcsError::NotFound(format!("could not resolve `{base}`")))
    }

    fn peel_head(&self) -> Result<ObjectId> {
        match self.refs.get_head()? {
            Head::Detached(id) => self.store.peel(id),
            Head::Symbolic(target) => {
                let id = self.refs.read_ref(&target)?;
                self.store.peel(id)
            }
        }
    }

    fn resolve_hex_prefix(&self, prefix: &str) -> Result<ObjectId> {
        let lower = prefix.to_ascii_lowercase();
        let matches: Vec<ObjectId> = self
            .store
            .iter_ids()?
            .into_iter()
            .filter(|id| id.starts_with_hex(&lower))
            .collect();
        match matches.len() {
            0 => Err(VcsError::NotFound(format!("no object matches prefix `{prefix}`"))),
            1 => Ok(matches[0]),
            n => Err(VcsError::InvalidArgument(format!(
                "ambiguous object prefix `{prefix}` matches {n} objects"
            ))),
        }
    }

    fn apply_op(&self, id: ObjectId, op: RevOp) -> Result<ObjectId> {
        match op {
            RevOp::Ancestor(n) => {
                let mut cur = id;
                for _ in 0..n {
                    let commit = self.store.read_commit(cur)?;
                    cur = commit
                        .first_parent()
                        .ok_or_else(|| VcsError::NotFound(format!("{cur} has no parent")))?;
                }
                Ok(cur)
            }
            RevOp::Parent(n) => {
                let commit = self.store.read_commit(id)?;
                commit
                    .parent_ids
                    .get(n.saturating_sub(1))
                    .copied()
                    .ok_or_else(|| VcsError::NotFound(format!("{id} has no parent #{n}")))
            }
        }
    }

    /// Flatten a tree recursively into repo-relative path → (mode, blob id).
    pub fn tree_entries(&self, tree_id: ObjectId) -> Result<BTreeMap<String, (FileMode, ObjectId)>> {
        let mut out = BTreeMap::new();
        self.collect_tree_entries(tree_id, "", &mut out)?;
        Ok(out)
    }

    fn collect_tree_entries(
        &self,
        tree_id: ObjectId,
        prefix: &str,
        out: &mut BTreeMap<String, (FileMode, ObjectId)>,
    ) -> Result<()> {
        let tree = self.store.read_tree(tree_id)?;
        for entry in tree.entries {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            if entry.mode.is_tree() {
                self.collect_tree_entries(entry.id, &path, out)?;
            } else {
                out.insert(path, (entry.mode, entry.id));
            }
        }
        Ok(())
    }

    /// Build (and write) a tree object from a flat path → entry mapping,
    /// grouping by path component recursively.
    pub fn build_tree(&self, entries: &BTreeMap<String, IndexEntry>) -> Result<ObjectId> {
        let items: Vec<(String, FileMode, ObjectId)> = entries
            .iter()
            .map(|(p, e)| (p.clone(), e.mode, e.id))
            .collect();
        self.build_tree_from_items(&items)
    }

    fn build_tree_from_items(&self, items: &[(String, FileMode, ObjectId)]) -> Result<ObjectId> {
        let mut groups: BTreeMap<String, Vec<(String, FileMode, ObjectId)>> = BTreeMap::new();
        let mut direct: Vec<TreeEntry> = Vec::new();
        for (path, mode, id) in items {
            if let Some((head, rest)) = path.split_once('/') {
                groups
                    .entry(head.to_string())
                    .or_default()
                    .push((rest.to_string(), *mode, *id));
            } else {
                direct.push(TreeEntry {
                    mode: *mode,
                    name: path.clone(),
                    id: *id,
                });
            }
        }
        for (name, sub_items) in groups {
            let sub_id = self.build_tree_from_items(&sub_items)?;
            direct.push(TreeEntry {
                mode: FileMode::Tree,
                name,
                id: sub_id,
            });
        }
        let tree = Tree::build(direct)?;
        self.store.write_tree(&tree)?;
        Ok(tree.id)
    }

    /// Rewrite the working tree to exactly match `tree_id`: every file the
    /// tree names is written, and every on-disk file not named by the tree
    /// is removed — except files ignored by `.vcsignore` rules, which are
    /// preserved (§4.6's documented policy choice).
    pub fn checkout_tree(&self, tree_id: ObjectId) -> Result<()> {
        let target = self.tree_entries(tree_id)?;
        for (path, (mode, id)) in &target {
            let abs = self.root.join(path);
            if let Some(parent) = abs.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let blob = self.store.read_blob(*id)?;
            std::fs::write(&abs, &blob.data)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let bits = if *mode == FileMode::Executable { 0o755 } else { 0o644 };
                std::fs::set_permissions(&abs, std::fs::Permissions::from_mode(bits))?;
            }
        }

        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.file_name() != METADATA_DIR_NAME)
        {
            let entry = entry.map_err(|e| VcsError::IOError(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if target.contains_key(rel.as_str()) {
                continue;
            }
            let dir = entry.path().parent().unwrap_or(&self.root);
            if IgnoreRules::load(&self.root, dir).is_ignored(&rel, false) {
                continue;
            }
            let _ = std::fs::remove_file(entry.path());
        }
        Ok(())
    }

    /// Move whatever HEAD currently names to `new_id`. For a symbolic HEAD
    /// this is a CAS update on the target branch ref; for a detached HEAD
    /// there is no ref to CAS against, so the raw id is simply rewritten.
    pub fn update_head_to(&self, new_id: ObjectId, expected_old: Option<ObjectId>) -> Result<()> {
        match self.refs.get_head()? {
            Head::Symbolic(branch) => self.refs.update(&branch, new_id, expected_old),
            Head::Detached(_) => self.refs.set_head_detached(new_id),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RevOp {
    /// `~N`: follow the first parent N times.
    Ancestor(usize),
    /// `^N`: the Nth parent (1-based); bare `^` is `^1`.
    Parent(usize),
}

fn split_ops(rev: &str) -> (&str, Vec<RevOp>) {
    let Some(idx) = rev.find(['~', '^']) else {
        return (rev, Vec::new());
    };
    let base = &rev[..idx];
    let suffix = &rev[idx..];
    let bytes = suffix.as_bytes();
    let mut ops = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let op_char = bytes[i] as char;
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let n: usize = if start == i {
            1
        } else {
            suffix[start..i].parse().unwrap_or(1)
        };
        ops.push(match op_char {
            '~' => RevOp::Ancestor(n),
            _ => RevOp::Parent(n),
        });
    }
    (base, ops)
}
