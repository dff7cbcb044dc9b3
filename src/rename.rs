//! Rename/copy detection (§4.4), opt-in per diff call.
//!
//! Candidates are scored by a blended similarity of content and filename,
//! then assigned greedily: highest-scoring pairs first, each path used at
//! most once. Not grounded on the teacher (it has no rename detector) — the
//! scoring and greedy-assignment shape follows spec.md §4.4 directly.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Blend weight between content similarity and filename similarity.
const ALPHA: f64 = 0.8;
/// Minimum/maximum size ratio for a pair to be considered at all.
const SIZE_RATIO_BAND: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RenameRecord {
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub similarity: f64,
}

/// One side of a candidate rename: a path plus its raw content.
pub struct Candidate<'a> {
    pub path: &'a Path,
    pub content: &'a [u8],
}

struct ScoredPair {
    old_idx: usize,
    new_idx: usize,
    similarity: f64,
    same_extension: bool,
    basename_edit_distance: usize,
}

/// Detect renames between `deleted` and `added` candidates. `threshold`
/// (0-100) is the minimum blended similarity to accept; `max_candidates`
/// bounds the number of scored pairs considered.
pub fn detect_renames(
    deleted: &[Candidate],
    added: &[Candidate],
    threshold: f64,
    max_candidates: usize,
) -> Vec<RenameRecord> {
    let mut pairs = Vec::new();
    'outer: for (old_idx, old) in deleted.iter().enumerate() {
        for (new_idx, new) in added.iter().enumerate() {
            if !within_size_band(old.content.len(), new.content.len()) {
                continue;
            }
            let content_sim = content_similarity(old.content, new.content);
            let (filename_sim, same_extension, basename_edit_distance) =
                filename_similarity(old.path, new.path);
            let similarity = ALPHA * content_sim + (1.0 - ALPHA) * filename_sim;
            if similarity < threshold {
                continue;
            }
            pairs.push(ScoredPair {
                old_idx,
                new_idx,
                similarity,
                same_extension,
                basename_edit_distance,
            });
            if pairs.len() >= max_candidates {
                break 'outer;
            }
        }
    }

    pairs.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.same_extension.cmp(&a.same_extension))
            .then(a.basename_edit_distance.cmp(&b.basename_edit_distance))
    });

    let mut used_old = HashSet::new();
    let mut used_new = HashSet::new();
    let mut records = Vec::new();
    for pair in pairs {
        if used_old.contains(&pair.old_idx) || used_new.contains(&pair.new_idx) {
            continue;
        }
        used_old.insert(pair.old_idx);
        used_new.insert(pair.new_idx);
        records.push(RenameRecord {
            old_path: deleted[pair.old_idx].path.to_path_buf(),
            new_path: added[pair.new_idx].path.to_path_buf(),
            similarity: pair.similarity,
        });
    }
    records
}

fn within_size_band(a: usize, b: usize) -> bool {
    if a == 0 || b == 0 {
        return a == b;
    }
    let ratio = a.max(b) as f64 / a.min(b) as f64;
    ratio <= SIZE_RATIO_BAND
}

/// Jaccard-like ratio over the set of trimmed lines. 100 for identical
/// content, 0 for disjoint, 100 for empty-vs-empty, 0 for empty-vs-nonempty.
fn content_similarity(a: &[u8], b: &[u8]) -> f64 {
    let lines_a = trimmed_line_set(a);
    let lines_b = trimmed_line_set(b);
    if lines_a.is_empty() && lines_b.is_empty() {
        return 100.0;
    }
    if lines_a.is_empty() || lines_b.is_empty() {
        return 0.0;
    }
    let intersection = lines_a.intersection(&lines_b).count();
    let smaller = lines_a.len().min(lines_b.len());
    if smaller == 0 {
        0.0
    } else {
        100.0 * intersection as f64 / smaller as f64
    }
}

fn trimmed_line_set(data: &[u8]) -> HashSet<&[u8]> {
    data.split(|&b| b == b'\n')
        .map(|line| {
            let mut start = 0;
            let mut end = line.len();
            while start < end && (line[start] as char).is_whitespace() {
                start += 1;
            }
            while end > start && (line[end - 1] as char).is_whitespace() {
                end -= 1;
            }
            &line[start..end]
        })
        .filter(|l| !l.is_empty())
        .collect()
}

/// Returns (similarity 0-100, same-extension, basename edit distance).
/// Identical basenames in different directories score 100.
fn filename_similarity(old: &Path, new: &Path) -> (f64, bool, usize) {
    let old_name = old.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let new_name = new.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let same_extension = old.extension() == new.extension();

    if old_name == new_name {
        return (100.0, same_extension, 0);
    }

    let distance = levenshtein(&old_name, &new_name);
    let max_len = old_name.chars().count().max(new_name.chars().count()).max(1);
    let mut sim = 100.0 * (1.0 - distance as f64 / max_len as f64);
    if same_extension {
        sim = (sim + 10.0).min(100.0);
    }
    (sim.max(0.0), same_extension, distance)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        cur[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
