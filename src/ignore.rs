//! Ignore-file pattern matching (§4.3's "Ignore rules").
//!
//! Patterns are loaded from every `.vcsignore` file on the path from the
//! repository root down to a given file's directory; later (deeper) files
//! win ties, and within a file later lines win ties. A `!`-prefixed pattern
//! re-includes a path an earlier pattern excluded.

use std::fs;
use std::path::{Path, PathBuf};

pub const IGNORE_FILE_NAME: &str = ".vcsignore";

#[derive(Debug, Clone)]
struct Pattern {
    negate: bool,
    anchored: bool,
    dir_only: bool,
    glob: String,
}

#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

impl IgnoreRules {
    /// Load ignore patterns from every `.vcsignore` between `root` and
    /// `dir` (inclusive), root-to-leaf order so deeper files' rules are
    /// evaluated last and win ties.
    pub fn load(root: &Path, dir: &Path) -> IgnoreRules {
        let mut rules = IgnoreRules::default();
        let rel = match dir.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => return rules,
        };

        let mut cursor = root.to_path_buf();
        rules.extend_from_file(&cursor.join(IGNORE_FILE_NAME));
        for component in rel.components() {
            cursor.push(component.as_os_str());
            rules.extend_from_file(&cursor.join(IGNORE_FILE_NAME));
        }
        rules
    }

    fn extend_from_file(&mut self, path: &Path) {
        let Ok(content) = fs::read_to_string(path) else {
            return;
        };
        for line in content.lines() {
            if let Some(pattern) = parse_line(line) {
                self.patterns.push(pattern);
            }
        }
    }

    /// Is `rel_path` (slash-separated, relative to the repo root) ignored?
    /// Evaluates in order, so the last matching pattern decides.
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        let mut ignored = false;
        for pattern in &self.patterns {
            if pattern.dir_only && !is_dir {
                continue;
            }
            if pattern_matches(&pattern.glob, rel_path, pattern.anchored) {
                ignored = !pattern.negate;
            }
        }
        ignored
    }
}

fn parse_line(line: &str) -> Option<Pattern> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut rest = line;
    let negate = if let Some(r) = rest.strip_prefix('!') {
        rest = r;
        true
    } else {
        false
    };
    let anchored = rest.starts_with('/');
    if anchored {
        rest = &rest[1..];
    }
    let dir_only = rest.ends_with('/');
    let glob = if dir_only {
        rest[..rest.len() - 1].to_string()
    } else {
        rest.to_string()
    };
    if glob.is_empty() {
        return None;
    }
    Some(Pattern {
        negate,
        anchored,
        dir_only,
        glob,
    })
}

/// Matches `glob` (supporting `*`, `**`, `?`) against `path`. An anchored
/// pattern must match from the start; otherwise it may match any path
/// component boundary.
fn pattern_matches(glob: &str, path: &str, anchored: bool) -> bool {
    if anchored {
        return glob_match(glob, path);
    }
    if glob_match(glob, path) {
        return true;
    }
    // Unanchored: try matching against every suffix starting at a `/` boundary.
    for (i, c) in path.char_indices() {
        if c == '/' && glob_match(glob, &path[i + 1..]) {
            return true;
        }
    }
    false
}

/// Backtracking glob matcher. `**` matches across `/`, `*` does not, `?`
/// matches exactly one non-`/` character.
fn glob_match(glob: &str, text: &str) -> bool {
    let g: Vec<char> = glob.chars().collect();
    let t: Vec<char> = text.chars().collect();
    matches(&g, 0, &t, 0)
}

fn matches(g: &[char], gi: usize, t: &[char], ti: usize) -> bool {
    if gi == g.len() {
        return ti == t.len();
    }
    match g[gi] {
        '*' if gi + 1 < g.len() && g[gi + 1] == '*' => {
            // `**` matches zero or more characters, including `/`.
            for skip in ti..=t.len() {
                if matches(g, gi + 2, t, skip) {
                    return true;
                }
            }
            false
        }
        '*' => {
            for skip in ti..=t.len() {
                if t[ti..skip].contains(&'/') {
                    break;
                }
                if matches(g, gi + 1, t, skip) {
                    return true;
                }
            }
            false
        }
        '?' => ti < t.len() && t[ti] != '/' && matches(g, gi + 1, t, ti + 1),
        c => ti < t.len() && t[ti] == c && matches(g, gi + 1, t, ti + 1),
    }
}
