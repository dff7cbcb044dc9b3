//! Repository-level configuration: author identity overrides, timezone
//! resolution, and the metadata-directory override consulted by the core
//! (§6, "Environment inputs consulted").

use std::env;
use std::path::PathBuf;

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Environment variable names consulted for author identity, in priority
/// order: the engine-branded names win over the Git-compatible fallback.
const AUTHOR_NAME_VARS: [&str; 2] = ["VCS_AUTHOR_NAME", "GIT_AUTHOR_NAME"];
const AUTHOR_EMAIL_VARS: [&str; 2] = ["VCS_AUTHOR_EMAIL", "GIT_AUTHOR_EMAIL"];
const DATA_DIR_VAR: &str = "VCS_DIR";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RepoConfig {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    /// Grace period (days) before an unreachable object becomes gc-eligible.
    pub gc_grace_period_days: i64,
    /// Journal entry retention window (days) for reachable history.
    pub journal_retention_days: i64,
    /// Journal entry retention window (days) once the entry is unreachable.
    pub journal_retention_days_unreachable: i64,
    /// Loose object count above which `gc --auto` actually runs.
    pub gc_auto_threshold: usize,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            author_name: None,
            author_email: None,
            gc_grace_period_days: 14,
            journal_retention_days: 90,
            journal_retention_days_unreachable: 30,
            gc_auto_threshold: 6700,
        }
    }
}

impl RepoConfig {
    /// Resolve an author identity from config first, then environment
    /// variables in priority order, falling back to a generic default.
    pub fn resolve_author(&self) -> (String, String) {
        let name = self
            .author_name
            .clone()
            .or_else(|| first_env(&AUTHOR_NAME_VARS))
            .unwrap_or_else(|| "unknown".to_string());
        let email = self
            .author_email
            .clone()
            .or_else(|| first_env(&AUTHOR_EMAIL_VARS))
            .unwrap_or_else(|| "unknown@localhost".to_string());
        (name, email)
    }

    /// Current UTC offset in `±HHMM` form, used to stamp commit/tag signatures.
    pub fn local_tz_offset() -> String {
        let offset = Local::now().offset().local_minus_utc();
        let sign = if offset < 0 { '-' } else { '+' };
        let abs = offset.unsigned_abs();
        format!("{sign}{:02}{:02}", abs / 3600, (abs % 3600) / 60)
    }

    /// Resolve the repository metadata directory override, if any.
    pub fn data_dir_override() -> Option<PathBuf> {
        env::var_os(DATA_DIR_VAR).map(PathBuf::from)
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names.iter().find_map(|n| env::var(n).ok())
}
