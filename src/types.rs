use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The version control systems we know how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vcs {
    Git,
    Hg,
    Svn,
}

impl Vcs {
    pub fn name(self) -> &'static str {
        match self {
            Vcs::Git => "git",
            Vcs::Hg => "hg",
            Vcs::Svn => "svn",
        }
    }
}

impl fmt::Display for Vcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of a generated worktree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeOptions {
    pub num_files: usize,
    pub files_per_dir: usize,
    pub dirs_per_dir: usize,
    pub file_size: usize,
}

impl Default for WorktreeOptions {
    fn default() -> Self {
        Self {
            num_files: 1000,
            files_per_dir: 48,
            dirs_per_dir: 16,
            file_size: 10000,
        }
    }
}

/// Shape of a commit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOptions {
    pub num_commits: usize,
    pub adds_per_commit: usize,
    pub files_per_add: usize,
    /// Query git object counts after every commit (untimed).
    pub count_objects: bool,
}

impl Default for RepoOptions {
    fn default() -> Self {
        Self {
            num_commits: 1,
            adds_per_commit: 1,
            files_per_add: 100,
            count_objects: false,
        }
    }
}

/// Passed to the worktree progress callback after each generated file.
#[derive(Debug, Clone, Default)]
pub struct WorktreeProgress {
    pub done: bool,
    pub position: usize,
    pub num_files: usize,
    pub path: String,
}

/// Passed to the commit progress callback after each add call and each commit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommitProgress {
    pub done: bool,
    /// 1-based iteration currently in progress.
    pub commit: usize,
    pub commits_done: usize,
    pub num_index_files: usize,
    pub loose_objects: Option<u64>,
    pub pack_objects: Option<u64>,
    pub add_seconds: f64,
    pub commit_seconds: f64,
}

/// What we learn about an existing repo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepoInfo {
    pub head_files: usize,
    pub commits: usize,
}
