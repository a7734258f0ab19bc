//! Core data types shared across the library.
//!
//! Everything here is transient and process-local; nothing is persisted
//! beyond what git and the filesystem already persist.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Targets & credentials
// ---------------------------------------------------------------------------

/// One per-language synchronization target, taken from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTarget {
    /// Language code, e.g. `zh-hans`.
    pub language: String,
    /// Accounts to request review from when a conflict PR is opened.
    pub reviewers: Vec<String>,
}

/// Read-only credential set shared by all targets.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub email: String,
    pub token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("token", &"***")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Repository handle
// ---------------------------------------------------------------------------

/// Derived identifiers and paths for one translation repository.
#[derive(Debug, Clone)]
pub struct RepositoryHandle {
    /// Owning account of both source and translation repositories.
    pub owner: String,
    /// Source repository name; also used as the name of the extra remote.
    pub source_repo: String,
    /// Translation repository name: `<language>.<source_repo>`.
    pub derived_repo: String,
    /// Local clone directory: `<work_root>/<derived_repo>`.
    pub local_path: PathBuf,
    /// Default branch on both repositories.
    pub default_branch: String,
}

impl RepositoryHandle {
    /// Derive the handle for a language. Deterministic; the derived name is
    /// unique per target because language codes are unique per batch.
    pub fn derive(
        owner: &str,
        source_repo: &str,
        language: &str,
        work_root: &Path,
        default_branch: &str,
    ) -> Self {
        let derived_repo = format!("{}.{}", language, source_repo);
        let local_path = work_root.join(&derived_repo);
        Self {
            owner: owner.to_string(),
            source_repo: source_repo.to_string(),
            derived_repo,
            local_path,
            default_branch: default_branch.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Terminal state of one synchronization run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Upstream had no new commits; nothing to do.
    UpToDate,
    /// Upstream changes merged cleanly and were pushed to the default branch.
    MergedDirectly,
    /// Conflicts were found; a pull request was opened for review.
    PullRequestOpened { number: u64 },
    /// The sync branch for this upstream commit already exists; a prior run
    /// opened the pull request.
    PullRequestPending,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpToDate => write!(f, "up to date"),
            Self::MergedDirectly => write!(f, "merged directly"),
            Self::PullRequestOpened { number } => write!(f, "pull request #{} opened", number),
            Self::PullRequestPending => write!(f, "pull request pending"),
        }
    }
}

/// The result of one synchronization run. Created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAttemptResult {
    /// Language this run synchronized.
    pub language: String,
    /// First 8 characters of the default branch's commit hash, when the run
    /// got far enough to resolve it.
    pub short_hash: Option<String>,
    /// Name of the sync branch (`sync-<short_hash>`), when derived.
    pub sync_branch: Option<String>,
    /// Conflicting file paths, in merge-output order, duplicates kept.
    pub conflict_files: Vec<String>,
    /// Terminal state.
    pub outcome: SyncOutcome,
}

/// Discriminated per-target result of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetResult {
    /// The run reached a terminal state.
    Completed(SyncAttemptResult),
    /// The run aborted with an error; sibling targets are unaffected.
    Failed { language: String, error: String },
    /// The batch was cancelled before this target started.
    Skipped { language: String },
}

impl TargetResult {
    pub fn language(&self) -> &str {
        match self {
            Self::Completed(r) => &r.language,
            Self::Failed { language, .. } | Self::Skipped { language } => language,
        }
    }
}

/// Aggregate result of one batch invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub targets: Vec<TargetResult>,
}

impl BatchReport {
    /// True if every target reached a terminal state.
    pub fn all_completed(&self) -> bool {
        self.targets
            .iter()
            .all(|t| matches!(t, TargetResult::Completed(_)))
    }
}
