use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::errors::TortureError;
use crate::sharder::check_radixes;
use crate::types::{RepoOptions, Vcs, WorktreeOptions};

/// Settings read from `config.toml`. Anything given on the command line wins.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub vcs: Option<Vcs>,
    pub dest: Option<PathBuf>,
    pub repo: Option<String>,
    pub verbose: Option<u8>,
    pub worktree: WorktreeSection,
    pub commit: CommitSection,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorktreeSection {
    pub file_count: Option<usize>,
    pub file_size: Option<usize>,
    pub files_per_dir: Option<usize>,
    pub dirs_per_dir: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommitSection {
    pub num_commits: Option<usize>,
    pub adds_per_commit: Option<usize>,
    pub files_per_add: Option<usize>,
    pub count_objects: Option<bool>,
}

impl Config {
    /// `~/.config/vcs-torture/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("vcs-torture").join("config.toml"))
    }

    /// Loads `explicit` if given (it must exist), else the default file if
    /// present, else an empty config.
    pub fn load(explicit: Option<&Path>) -> Result<Self, TortureError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, TortureError> {
        let text = std::fs::read_to_string(path).map_err(|source| TortureError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text).map_err(|detail| TortureError::ConfigParse {
            path: path.to_path_buf(),
            detail,
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }
}

impl WorktreeSection {
    /// Fields set in `self` override those in `base`.
    pub fn over(&self, base: &WorktreeSection) -> WorktreeSection {
        WorktreeSection {
            file_count: self.file_count.or(base.file_count),
            file_size: self.file_size.or(base.file_size),
            files_per_dir: self.files_per_dir.or(base.files_per_dir),
            dirs_per_dir: self.dirs_per_dir.or(base.dirs_per_dir),
        }
    }

    /// Fills gaps with defaults and checks the tree shape is usable.
    pub fn resolve(&self) -> Result<WorktreeOptions, TortureError> {
        let defaults = WorktreeOptions::default();
        let options = WorktreeOptions {
            num_files: self.file_count.unwrap_or(defaults.num_files),
            file_size: self.file_size.unwrap_or(defaults.file_size),
            files_per_dir: self.files_per_dir.unwrap_or(defaults.files_per_dir),
            dirs_per_dir: self.dirs_per_dir.unwrap_or(defaults.dirs_per_dir),
        };
        check_radixes(options.files_per_dir, options.dirs_per_dir)?;
        Ok(options)
    }
}

impl CommitSection {
    pub fn over(&self, base: &CommitSection) -> CommitSection {
        CommitSection {
            num_commits: self.num_commits.or(base.num_commits),
            adds_per_commit: self.adds_per_commit.or(base.adds_per_commit),
            files_per_add: self.files_per_add.or(base.files_per_add),
            count_objects: self.count_objects.or(base.count_objects),
        }
    }

    pub fn resolve(&self) -> Result<RepoOptions, TortureError> {
        let defaults = RepoOptions::default();
        let options = RepoOptions {
            num_commits: self.num_commits.unwrap_or(defaults.num_commits),
            adds_per_commit: self.adds_per_commit.unwrap_or(defaults.adds_per_commit),
            files_per_add: self.files_per_add.unwrap_or(defaults.files_per_add),
            count_objects: self.count_objects.unwrap_or(defaults.count_objects),
        };
        at_least_one("adds-per-commit", options.adds_per_commit)?;
        at_least_one("files-per-add", options.files_per_add)?;
        Ok(options)
    }
}

fn at_least_one(name: &'static str, value: usize) -> Result<(), TortureError> {
    if value == 0 {
        return Err(TortureError::InvalidParameter {
            name,
            value,
            reason: "must be at least 1",
        });
    }
    Ok(())
}
