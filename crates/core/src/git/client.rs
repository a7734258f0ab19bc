//! Asynchronous git CLI client.
//!
//! Every operation runs `git` as a subprocess against an explicit
//! repository path; nothing depends on the process-global current
//! directory, so clients for different clones are safe to drive
//! concurrently.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::remote_url::redact;
use crate::errors::GitError;

/// Captured result of a `git pull`: exit status plus the combined
/// stdout/stderr text the conflict parser works on.
#[derive(Debug, Clone)]
pub struct PullOutput {
    pub success: bool,
    pub exit_code: i32,
    pub output: String,
}

/// Raw result of one git invocation.
struct RawOutput {
    success: bool,
    exit_code: i32,
    output: String,
}

/// Asynchronous client for one local git repository.
#[derive(Debug, Clone)]
pub struct GitClient {
    repo_path: PathBuf,
}

impl GitClient {
    /// Clone `url` into `dest` and return a client for the new repository.
    #[instrument(skip(url))]
    pub async fn clone_repo(url: &str, dest: &Path) -> Result<Self, GitError> {
        let dest_str = dest.to_string_lossy().to_string();
        let out = run_git(None, &["clone", url, &dest_str]).await?;
        if !out.success {
            return Err(command_failed("git clone", &out));
        }
        info!(path = %dest.display(), "clone completed");
        Ok(Self {
            repo_path: dest.to_path_buf(),
        })
    }

    /// Open an existing repository.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        if !path.join(".git").exists() {
            return Err(GitError::RepositoryNotFound(path.display().to_string()));
        }
        Ok(Self {
            repo_path: path.to_path_buf(),
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Register an additional named remote. Re-registering an existing
    /// remote is tolerated as a non-fatal condition.
    pub async fn add_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        let out = self.run(&["remote", "add", name, url]).await?;
        if out.success {
            return Ok(());
        }
        if out.output.contains("already exists") {
            debug!(name, "remote already registered");
            return Ok(());
        }
        Err(command_failed("git remote add", &out))
    }

    /// Set a repository-local config value.
    pub async fn set_config(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.run_checked(&["config", key, value]).await?;
        Ok(())
    }

    /// Pull `branch` from `remote`, capturing combined output. A merge
    /// conflict also exits non-zero; the caller inspects the output to
    /// distinguish conflicts from genuine failures.
    #[instrument(skip(self), fields(path = %self.repo_path.display()))]
    pub async fn pull(&self, remote: &str, branch: &str) -> Result<PullOutput, GitError> {
        let out = self.run(&["pull", remote, branch]).await?;
        debug!(exit_code = out.exit_code, "git pull finished");
        Ok(PullOutput {
            success: out.success,
            exit_code: out.exit_code,
            output: out.output,
        })
    }

    /// Resolve a branch to its full commit hash.
    pub async fn rev_parse(&self, rev: &str) -> Result<String, GitError> {
        let out = self.run_checked(&["rev-parse", rev]).await?;
        Ok(out.trim().to_string())
    }

    /// Check out an existing branch; fails if it does not exist.
    pub async fn checkout(&self, branch: &str) -> Result<(), GitError> {
        self.run_checked(&["checkout", branch]).await?;
        Ok(())
    }

    /// Attempt a forced checkout of `branch`. Returns `true` if the branch
    /// exists (and is now checked out, discarding any in-progress merge
    /// state), `false` if git rejected the ref.
    pub async fn try_checkout(&self, branch: &str) -> Result<bool, GitError> {
        let out = self.run(&["checkout", "-f", branch]).await?;
        Ok(out.success)
    }

    /// Create and check out a new branch from the current state.
    pub async fn checkout_new(&self, branch: &str) -> Result<(), GitError> {
        self.run_checked(&["checkout", "-b", branch]).await?;
        Ok(())
    }

    /// Stage everything and commit. Returns `false` when there was nothing
    /// to commit (the working tree was already clean), `true` otherwise.
    pub async fn commit_all(&self, message: &str) -> Result<bool, GitError> {
        self.run_checked(&["add", "-A"]).await?;
        let out = self.run(&["commit", "-m", message]).await?;
        if out.success {
            return Ok(true);
        }
        if out.output.contains("nothing to commit")
            || out.output.contains("nothing added to commit")
        {
            debug!("working tree clean, nothing committed");
            return Ok(false);
        }
        Err(command_failed("git commit", &out))
    }

    /// Merge `branch` into the current branch.
    pub async fn merge(&self, branch: &str) -> Result<(), GitError> {
        self.run_checked(&["merge", branch]).await?;
        Ok(())
    }

    /// Push `branch` to `remote`, optionally setting the upstream tracking
    /// reference.
    #[instrument(skip(self), fields(path = %self.repo_path.display()))]
    pub async fn push(&self, remote: &str, branch: &str, set_upstream: bool) -> Result<(), GitError> {
        if set_upstream {
            self.run_checked(&["push", "--set-upstream", remote, branch])
                .await?;
        } else {
            self.run_checked(&["push", remote, branch]).await?;
        }
        info!(remote, branch, "pushed");
        Ok(())
    }

    /// Read the URL of a named remote.
    pub async fn remote_url(&self, remote: &str) -> Result<String, GitError> {
        let out = self.run_checked(&["remote", "get-url", remote]).await?;
        Ok(out.trim().to_string())
    }

    async fn run(&self, args: &[&str]) -> Result<RawOutput, GitError> {
        run_git(Some(&self.repo_path), args).await
    }

    async fn run_checked(&self, args: &[&str]) -> Result<String, GitError> {
        let out = self.run(args).await?;
        if !out.success {
            warn!(
                cmd = %format!("git {}", args.first().copied().unwrap_or("")),
                exit_code = out.exit_code,
                "git command failed"
            );
            return Err(command_failed(
                &format!("git {}", args.first().copied().unwrap_or("")),
                &out,
            ));
        }
        Ok(out.output)
    }
}

fn command_failed(command: &str, out: &RawOutput) -> GitError {
    GitError::CommandFailed {
        command: command.to_string(),
        exit_code: out.exit_code,
        output: out.output.clone(),
    }
}

async fn run_git(dir: Option<&Path>, args: &[&str]) -> Result<RawOutput, GitError> {
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Arguments may carry credential-embedded URLs; redact before logging.
    let shown: Vec<String> = args.iter().map(|a| redact(a)).collect();
    debug!(cmd = %format!("git {}", shown.join(" ")), "running git command");

    let output = cmd.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GitError::BinaryNotFound("git".into())
        } else {
            GitError::IoError(e)
        }
    })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(RawOutput {
        success: output.status.success(),
        exit_code: output.status.code().unwrap_or(-1),
        output: combined,
    })
}
