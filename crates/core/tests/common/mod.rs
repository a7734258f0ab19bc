//! Shared fixtures for end-to-end tests.
//!
//! Builds a miniature hosting layout on the local filesystem: one bare
//! upstream repository plus one bare translation fork per language, all
//! reachable through `file://` URLs, with a seed working copy used to
//! drive upstream commits. No network I/O.
//!
//! Tests skip gracefully if `git` is not installed.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use langsync_core::config::AppConfig;

pub const OWNER: &str = "acme";
pub const SOURCE: &str = "docs";
pub const BRANCH: &str = "main";

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run a git command in `dir`, asserting success, returning stdout.
pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}{}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn set_identity(dir: &Path) {
    run_git(dir, &["config", "user.name", "Fixture User"]);
    run_git(dir, &["config", "user.email", "fixture@example.com"]);
}

fn commit_all(dir: &Path, message: &str) {
    run_git(dir, &["add", "-A"]);
    run_git(dir, &["commit", "-m", message]);
}

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// A local hosting layout: upstream bare repo, translation bare forks, and
/// a seed working copy sharing history with all of them.
pub struct Fixture {
    pub tmp: TempDir,
    pub remotes: PathBuf,
    pub seed: PathBuf,
    pub work_root: PathBuf,
}

impl Fixture {
    /// Create the layout and seed every repository with one shared commit
    /// (`docs/a.md`).
    pub fn new(langs: &[&str]) -> Self {
        let tmp = TempDir::new().unwrap();
        let remotes = tmp.path().join("remotes");
        let owner_dir = remotes.join(OWNER);
        std::fs::create_dir_all(&owner_dir).unwrap();

        run_git(
            &owner_dir,
            &["init", "--bare", "-b", BRANCH, &format!("{}.git", SOURCE)],
        );

        let seed = tmp.path().join("seed");
        std::fs::create_dir_all(&seed).unwrap();
        run_git(&seed, &["init", "-b", BRANCH]);
        set_identity(&seed);
        write_file(&seed, "docs/a.md", "hello\n");
        commit_all(&seed, "initial docs");

        let upstream_bare = owner_dir.join(format!("{}.git", SOURCE));
        run_git(
            &seed,
            &["remote", "add", "origin", upstream_bare.to_str().unwrap()],
        );
        run_git(&seed, &["push", "origin", BRANCH]);

        for lang in langs {
            let bare_name = format!("{}.{}.git", lang, SOURCE);
            run_git(&owner_dir, &["init", "--bare", "-b", BRANCH, &bare_name]);
            let bare = owner_dir.join(&bare_name);
            run_git(&seed, &["push", bare.to_str().unwrap(), BRANCH]);
        }

        let work_root = tmp.path().join("work");

        Self {
            tmp,
            remotes,
            seed,
            work_root,
        }
    }

    /// Commit a change to the upstream repository.
    pub fn upstream_commit(&self, rel: &str, content: &str, message: &str) {
        write_file(&self.seed, rel, content);
        commit_all(&self.seed, message);
        run_git(&self.seed, &["push", "origin", BRANCH]);
    }

    /// Commit a change to a translation fork (through a throwaway working
    /// copy), diverging it from upstream.
    pub fn translation_commit(&self, lang: &str, rel: &str, content: &str, message: &str) {
        let bare = self.bare_path(lang);
        let wc = self.tmp.path().join(format!("wc-{}", lang));
        if wc.exists() {
            std::fs::remove_dir_all(&wc).unwrap();
        }
        run_git(
            self.tmp.path(),
            &["clone", bare.to_str().unwrap(), wc.to_str().unwrap()],
        );
        set_identity(&wc);
        write_file(&wc, rel, content);
        commit_all(&wc, message);
        run_git(&wc, &["push", "origin", BRANCH]);
    }

    /// Path of a translation fork's bare repository.
    pub fn bare_path(&self, lang: &str) -> PathBuf {
        self.remotes
            .join(OWNER)
            .join(format!("{}.{}.git", lang, SOURCE))
    }

    /// Current head of a translation fork's default branch.
    pub fn bare_head(&self, lang: &str) -> String {
        run_git(&self.bare_path(lang), &["rev-parse", BRANCH])
            .trim()
            .to_string()
    }

    /// Current head of the upstream repository.
    pub fn upstream_head(&self) -> String {
        run_git(&self.seed, &["rev-parse", BRANCH]).trim().to_string()
    }

    /// Branch names present in a translation fork's bare repository.
    pub fn bare_branches(&self, lang: &str) -> Vec<String> {
        run_git(
            &self.bare_path(lang),
            &["for-each-ref", "--format=%(refname:short)", "refs/heads"],
        )
        .lines()
        .map(str::to_string)
        .collect()
    }

    /// Branch names in the engine's local clone for a language.
    pub fn clone_branches(&self, lang: &str) -> Vec<String> {
        let clone = self.work_root.join(format!("{}.{}", lang, SOURCE));
        run_git(
            &clone,
            &["for-each-ref", "--format=%(refname:short)", "refs/heads"],
        )
        .lines()
        .map(str::to_string)
        .collect()
    }

    /// Build a resolved config pointing at this layout.
    pub fn config(&self, api_url: &str, langs: &[(&str, &[&str])]) -> AppConfig {
        let mut toml_str = format!(
            r#"
[batch]
work_root = "{work_root}"
concurrency = 1
log_dir = "{log_dir}"

[upstream]
owner = "{owner}"
repo = "{source}"
default_branch = "{branch}"

[github]
api_url = "{api_url}"
git_base_url = "file://{remotes}"
username = "sync-bot"
email = "sync-bot@example.com"
token_env = "LANGSYNC_E2E_TOKEN"
"#,
            work_root = self.work_root.display(),
            log_dir = self.tmp.path().join("logs").display(),
            owner = OWNER,
            source = SOURCE,
            branch = BRANCH,
            api_url = api_url,
            remotes = self.remotes.display(),
        );
        for (code, reviewers) in langs {
            let reviewers = reviewers
                .iter()
                .map(|r| format!("\"{}\"", r))
                .collect::<Vec<_>>()
                .join(", ");
            toml_str.push_str(&format!(
                "\n[[languages]]\ncode = \"{}\"\nreviewers = [{}]\n",
                code, reviewers
            ));
        }

        let mut config: AppConfig = toml::from_str(&toml_str).expect("fixture config parses");
        config.validate().expect("fixture config is valid");
        config.github.token = Some("test-token".into());
        config
    }
}
