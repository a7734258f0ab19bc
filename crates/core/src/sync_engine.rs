//! Per-language synchronization engine.
//!
//! The [`SyncEngine`] drives one translation repository through a single
//! sync run:
//!
//! 1. Acquire a local clone of the translation fork (clone or refresh).
//! 2. Configure commit identity for the clone.
//! 3. Pull the upstream default branch, capturing the merge output.
//! 4. If nothing new: done (`UpToDate`).
//! 5. Derive the sync branch name from the default branch's short hash.
//! 6. If that branch already exists, a prior run handled this upstream
//!    commit: done (`PullRequestPending`). This is what keeps repeated runs
//!    from opening duplicate pull requests.
//! 7. Otherwise commit the merge result onto a fresh sync branch and either
//!    merge it straight into the default branch (no conflicts) or push it
//!    and open a review pull request listing every conflicting file.
//!
//! Each run owns its clone directory; runs for different languages are
//! independent and safe to execute concurrently.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::config::{AppConfig, CommandPolicy};
use crate::errors::{GitError, SyncError};
use crate::git::client::{GitClient, PullOutput};
use crate::git::github::GitHubClient;
use crate::git::{parser, remote_url};
use crate::models::{Credentials, RepositoryHandle, SyncAttemptResult, SyncOutcome, SyncTarget};

/// Fixed message used when committing the merge result (conflict markers
/// included) onto the sync branch.
const MERGE_COMMIT_MESSAGE: &str = "merging all conflicts";

/// Bounded retry budget for each hosting API call.
const API_ATTEMPTS: u32 = 5;

/// Fixed delay between API retry attempts.
const API_RETRY_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Synchronizes translation repositories with their upstream source.
pub struct SyncEngine {
    config: Arc<AppConfig>,
    credentials: Credentials,
    github: GitHubClient,
}

impl SyncEngine {
    /// Create an engine from resolved configuration. The access token must
    /// already be resolved (see [`AppConfig::resolve_env_vars`]).
    pub fn new(config: Arc<AppConfig>) -> Result<Self, crate::errors::ConfigError> {
        let token = config.github.token.clone().ok_or_else(|| {
            crate::errors::ConfigError::EnvVarMissing {
                var: config.github.token_env.clone(),
                field: "github.token_env".into(),
            }
        })?;
        let credentials = Credentials {
            username: config.github.username.clone(),
            email: config.github.email.clone(),
            token,
        };
        let github = GitHubClient::new(&config.github.api_url, &credentials.token);
        info!(upstream = %config.upstream.repo, "initializing sync engine");
        Ok(Self {
            config,
            credentials,
            github,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Handle for a language's translation repository, derived from config.
    pub fn handle_for(&self, language: &str) -> RepositoryHandle {
        RepositoryHandle::derive(
            &self.config.upstream.owner,
            &self.config.upstream.repo,
            language,
            &self.config.batch.work_root,
            &self.config.upstream.default_branch,
        )
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Run one synchronization for a target. Errors are fatal for this
    /// target only; the caller decides how they affect sibling targets.
    #[instrument(skip(self, target), fields(lang = %target.language))]
    pub async fn sync_language(
        &self,
        target: &SyncTarget,
    ) -> Result<SyncAttemptResult, SyncError> {
        let handle = self.handle_for(&target.language);
        info!(repo = %handle.derived_repo, "starting sync");

        // 1. Working directory for clones.
        std::fs::create_dir_all(&self.config.batch.work_root).map_err(|e| {
            SyncError::SetupFailed {
                path: self.config.batch.work_root.display().to_string(),
                source: e,
            }
        })?;

        // 2. Local clone of the translation fork.
        let git = self.acquire(&handle).await?;

        // 3. Commit identity and merge behaviour, repository-local only.
        self.configure_identity(&git).await?;

        // 4. Pull the upstream default branch.
        let pull = git
            .pull(&handle.source_repo, &handle.default_branch)
            .await?;

        if parser::is_already_up_to_date(&pull.output) {
            info!("already up to date with upstream");
            return Ok(SyncAttemptResult {
                language: target.language.clone(),
                short_hash: None,
                sync_branch: None,
                conflict_files: Vec::new(),
                outcome: SyncOutcome::UpToDate,
            });
        }

        let conflicts = parser::conflict_files(&pull.output);

        // A failed pull that reported no conflicts is a genuine failure
        // (network, auth, missing branch) rather than a merge conflict.
        if !pull.success && conflicts.is_empty() {
            return Err(pull_failure(&pull).into());
        }

        // 5. Sync identifier from the default branch's current hash.
        let head = git.rev_parse(&handle.default_branch).await?;
        let short = short_hash(&head);
        let branch = sync_branch_name(&short);

        // 6. Branch check: an existing sync branch means a prior run already
        // handled this upstream commit. The forced checkout doubles as
        // cleanup of the in-progress merge state.
        if git.try_checkout(&branch).await? {
            info!(branch = %branch, "sync branch already exists, pull request pending");
            return Ok(SyncAttemptResult {
                language: target.language.clone(),
                short_hash: Some(short),
                sync_branch: Some(branch),
                conflict_files: conflicts,
                outcome: SyncOutcome::PullRequestPending,
            });
        }

        git.checkout_new(&branch).await?;
        let committed = git.commit_all(MERGE_COMMIT_MESSAGE).await?;
        debug!(committed, branch = %branch, "sync branch prepared");

        // 7. Direct merge or review pull request.
        if conflicts.is_empty() {
            git.checkout(&handle.default_branch).await?;
            git.merge(&branch).await?;
            git.push("origin", &handle.default_branch, false).await?;
            if let Ok(url) = git.remote_url("origin").await {
                info!(remote = %remote_url::redact(&url), "merged upstream changes directly");
            }
            return Ok(SyncAttemptResult {
                language: target.language.clone(),
                short_hash: Some(short),
                sync_branch: Some(branch),
                conflict_files: Vec::new(),
                outcome: SyncOutcome::MergedDirectly,
            });
        }

        info!(
            count = conflicts.len(),
            files = ?conflicts,
            "conflicts detected, opening pull request"
        );
        git.push("origin", &branch, true).await?;

        let number = self.open_pull_request(&handle, &branch, &short, &conflicts).await?;
        self.request_review(&handle, number, &target.reviewers).await?;

        Ok(SyncAttemptResult {
            language: target.language.clone(),
            short_hash: Some(short),
            sync_branch: Some(branch),
            conflict_files: conflicts,
            outcome: SyncOutcome::PullRequestOpened { number },
        })
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// Clone the translation fork if absent, otherwise refresh the existing
    /// clone; register the upstream remote either way.
    async fn acquire(&self, handle: &RepositoryHandle) -> Result<GitClient, SyncError> {
        let base = remote_url::derive_git_base_url(
            &self.config.github.api_url,
            self.config.github.git_base_url.as_deref(),
        );
        let translation_url = remote_url::authenticated_url(
            &base,
            &self.credentials.username,
            &self.credentials.token,
            &handle.owner,
            &handle.derived_repo,
        );
        let upstream_url = remote_url::repo_url(&base, &handle.owner, &handle.source_repo);

        let git = if handle.local_path.join(".git").exists() {
            debug!(path = %handle.local_path.display(), "refreshing existing clone");
            let git = GitClient::open(&handle.local_path)?;
            git.checkout(&handle.default_branch).await?;
            let refresh = git.pull("origin", &handle.default_branch).await?;
            if !refresh.success {
                return Err(pull_failure(&refresh).into());
            }
            git
        } else {
            info!(
                url = %remote_url::redact(&translation_url),
                path = %handle.local_path.display(),
                "cloning translation repository"
            );
            GitClient::clone_repo(&translation_url, &handle.local_path).await?
        };

        git.add_remote(&handle.source_repo, &upstream_url).await?;
        Ok(git)
    }

    /// Set commit identity and merge behaviour for this clone. Under the
    /// best-effort command policy, failures here are logged and tolerated.
    async fn configure_identity(&self, git: &GitClient) -> Result<(), SyncError> {
        let settings = [
            ("user.name", self.credentials.username.as_str()),
            ("user.email", self.credentials.email.as_str()),
            ("pull.rebase", "false"),
        ];
        for (key, value) in settings {
            match git.set_config(key, value).await {
                Ok(()) => {}
                Err(e) if self.config.batch.command_policy == CommandPolicy::BestEffort => {
                    warn!(key, error = %e, "failed to set repository config, continuing");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Create the review pull request, retrying on any error up to the
    /// fixed attempt budget.
    async fn open_pull_request(
        &self,
        handle: &RepositoryHandle,
        branch: &str,
        short: &str,
        conflicts: &[String],
    ) -> Result<u64, SyncError> {
        let title = pr_title(&handle.source_repo, short);
        let body = pr_body(handle, short, conflicts);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .github
                .create_pull_request(
                    &handle.owner,
                    &handle.derived_repo,
                    &title,
                    &body,
                    branch,
                    &handle.default_branch,
                )
                .await
            {
                Ok(pr) => {
                    info!(number = pr.number, url = %pr.html_url, "pull request created");
                    return Ok(pr.number);
                }
                Err(e) if attempt < API_ATTEMPTS => {
                    warn!(
                        attempt,
                        max_attempts = API_ATTEMPTS,
                        error = %e,
                        "pull request creation failed, retrying"
                    );
                    tokio::time::sleep(API_RETRY_DELAY).await;
                }
                Err(e) => {
                    error!(
                        branch = %branch,
                        error = %e,
                        "giving up on pull request creation; the sync branch remains \
                         pushed without a pull request"
                    );
                    return Err(SyncError::PullRequestFailed {
                        attempts: attempt,
                        branch: branch.to_string(),
                        source: e,
                    });
                }
            }
        }
    }

    /// Request reviews from the target's configured reviewers, with the
    /// same bounded retry as pull-request creation.
    async fn request_review(
        &self,
        handle: &RepositoryHandle,
        number: u64,
        reviewers: &[String],
    ) -> Result<(), SyncError> {
        if reviewers.is_empty() {
            debug!(number, "no reviewers configured, skipping review request");
            return Ok(());
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .github
                .create_review_request(&handle.owner, &handle.derived_repo, number, reviewers)
                .await
            {
                Ok(()) => {
                    info!(number, reviewers = ?reviewers, "review requested");
                    return Ok(());
                }
                Err(e) if attempt < API_ATTEMPTS => {
                    warn!(
                        attempt,
                        max_attempts = API_ATTEMPTS,
                        error = %e,
                        "review request failed, retrying"
                    );
                    tokio::time::sleep(API_RETRY_DELAY).await;
                }
                Err(e) => {
                    error!(
                        number,
                        error = %e,
                        "giving up on review request; pull request #{number} exists without reviewers"
                    );
                    return Err(SyncError::ReviewRequestFailed {
                        attempts: attempt,
                        number,
                        source: e,
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// First 8 characters of a commit hash.
pub fn short_hash(full: &str) -> String {
    full.chars().take(8).collect()
}

/// Deterministic sync branch name for an upstream state.
pub fn sync_branch_name(short: &str) -> String {
    format!("sync-{}", short)
}

/// Pull request title naming the source repository and short hash.
pub fn pr_title(source_repo: &str, short: &str) -> String {
    format!("Sync with {} @ {}", source_repo, short)
}

/// Pull request body: one checklist item per conflicting file, each linking
/// to that file's commit history on the source repository.
pub fn pr_body(handle: &RepositoryHandle, short: &str, conflicts: &[String]) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "This pull request was automatically generated.");
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "It merges changes from [{owner}/{repo}](https://github.com/{owner}/{repo}) at {short}.",
        owner = handle.owner,
        repo = handle.source_repo,
    );
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "The following files have conflicts and may need new translations:"
    );
    let _ = writeln!(body);
    for file in conflicts {
        let _ = writeln!(
            body,
            "* [ ] [{file}](/{owner}/{repo}/commits/{branch}/{file})",
            owner = handle.owner,
            repo = handle.source_repo,
            branch = handle.default_branch,
        );
    }
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "Please resolve the conflicts by pushing new commits to this branch, \
         either by editing the files directly on GitHub or by checking out the \
         branch locally."
    );
    let _ = writeln!(body);
    let _ = writeln!(body, "## DO NOT SQUASH MERGE THIS PULL REQUEST!");
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "Squash merging erases the merged commits from {} and causes them to \
         show up as conflicts the next time the repositories are synchronized.",
        handle.default_branch
    );
    body
}

fn pull_failure(pull: &PullOutput) -> GitError {
    GitError::CommandFailed {
        command: "git pull".to_string(),
        exit_code: pull.exit_code,
        output: pull.output.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn handle() -> RepositoryHandle {
        RepositoryHandle::derive(
            "single-spa",
            "single-spa.js.org",
            "zh-hans",
            Path::new("repo"),
            "master",
        )
    }

    #[test]
    fn test_sync_branch_name_is_deterministic() {
        let short = short_hash("abcdef1234567890");
        assert_eq!(short, "abcdef12");
        assert_eq!(sync_branch_name(&short), "sync-abcdef12");
    }

    #[test]
    fn test_short_hash_of_short_input() {
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn test_pr_title_names_source_and_hash() {
        assert_eq!(
            pr_title("single-spa.js.org", "abcdef12"),
            "Sync with single-spa.js.org @ abcdef12"
        );
    }

    #[test]
    fn test_pr_body_lists_each_conflict_once() {
        let conflicts = vec!["docs/a.md".to_string(), "docs/b.md".to_string()];
        let body = pr_body(&handle(), "abcdef12", &conflicts);
        assert_eq!(body.matches("* [ ]").count(), 2);
        assert!(body.contains(
            "[docs/a.md](/single-spa/single-spa.js.org/commits/master/docs/a.md)"
        ));
        assert!(body.contains(
            "[docs/b.md](/single-spa/single-spa.js.org/commits/master/docs/b.md)"
        ));
    }

    #[test]
    fn test_pr_body_warns_against_squash_merging() {
        let body = pr_body(&handle(), "abcdef12", &["docs/a.md".to_string()]);
        assert!(body.contains("DO NOT SQUASH MERGE"));
        assert!(body.contains("at abcdef12"));
    }
}
