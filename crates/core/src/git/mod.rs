//! Git subsystem: subprocess client, merge-output parsing, remote URL
//! derivation, and the GitHub REST API client.

pub mod client;
pub mod github;
pub mod parser;
pub mod remote_url;

pub use client::{GitClient, PullOutput};
pub use github::GitHubClient;
