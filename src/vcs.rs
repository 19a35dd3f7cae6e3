use std::path::{Path, PathBuf};

use tracing::debug;
use url::Url;

use crate::errors::TortureError;
use crate::exec::{CommandOutput, Invocation, Runner};
use crate::types::{RepoInfo, Vcs};

/// Author recorded on synthetic commits.
const TORTURE_USER: &str = "vcs-torture";
const TORTURE_EMAIL: &str = "vcs-torture@localhost";

/// Where a repository and its supporting data live on disk.
#[derive(Debug, Clone)]
pub struct RepoLayout {
    pub dest: PathBuf,
    pub repo_name: String,
    pub repo_path: PathBuf,
    /// Central repository, for client/server systems (svn).
    pub server: Option<ServerLocation>,
}

#[derive(Debug, Clone)]
pub struct ServerLocation {
    pub path: PathBuf,
    pub url: Url,
}

impl RepoLayout {
    pub fn new(vcs: Vcs, dest: &Path, repo_name: &str) -> Result<Self, TortureError> {
        let repo_path = dest.join(repo_name);
        let server = match vcs {
            Vcs::Svn => Some(ServerLocation::for_repo(dest, repo_name)?),
            Vcs::Git | Vcs::Hg => None,
        };
        Ok(Self {
            dest: dest.to_path_buf(),
            repo_name: repo_name.to_string(),
            repo_path,
            server,
        })
    }
}

impl ServerLocation {
    fn for_repo(dest: &Path, repo_name: &str) -> Result<Self, TortureError> {
        let path = dest.join(server_dir_name(repo_name));
        let absolute = std::path::absolute(&path)
            .map_err(|_| TortureError::InvalidPath { path: path.clone() })?;
        let url = Url::from_file_path(&absolute).map_err(|()| TortureError::InvalidPath {
            path: absolute.clone(),
        })?;
        Ok(Self { path, url })
    }
}

pub fn server_dir_name(repo_name: &str) -> String {
    format!("{repo_name}-svnrepo")
}

/// Git object counts, as reported by `git count-objects -v`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectCounts {
    pub loose: u64,
    pub packed: u64,
}

impl Vcs {
    /// The client executable.
    pub fn executable(self) -> &'static str {
        self.name()
    }

    /// Cheapest command the client runs; used to measure process start cost.
    pub fn version_check(self, dir: &Path) -> Invocation {
        self.invocation(dir, ["--version"])
    }

    fn invocation<I, S>(self, dir: &Path, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inv = Invocation::new(self.executable(), dir, args);
        match self {
            Vcs::Hg => inv
                .env("HGPLAIN", "1")
                .env("HGUSER", format!("{TORTURE_USER} <{TORTURE_EMAIL}>")),
            Vcs::Git | Vcs::Svn => inv,
        }
    }

    /// Commands that turn an empty directory into a repository. Svn commands
    /// run from `dest`, the rest from the repository. Git also gets
    /// its background maintenance turned off so it cannot skew timings.
    pub fn init_sequence(self, layout: &RepoLayout) -> Vec<Invocation> {
        let repo = layout.repo_path.as_path();
        match self {
            Vcs::Git => vec![
                self.invocation(repo, ["init"]),
                self.invocation(repo, ["config", "gc.auto", "0"]),
                self.invocation(repo, ["config", "gc.autodetach", "false"]),
                self.invocation(repo, ["config", "commit.gpgsign", "false"]),
                self.invocation(repo, ["config", "user.name", TORTURE_USER]),
                self.invocation(repo, ["config", "user.email", TORTURE_EMAIL]),
            ],
            Vcs::Hg => vec![self.invocation(repo, ["init"])],
            Vcs::Svn => {
                let Some(server) = &layout.server else {
                    return Vec::new();
                };
                vec![
                    Invocation::new(
                        "svnadmin",
                        &layout.dest,
                        ["create".to_string(), server_dir_name(&layout.repo_name)],
                    ),
                    self.invocation(
                        &layout.dest,
                        [
                            "checkout".to_string(),
                            server.url.to_string(),
                            layout.repo_name.clone(),
                        ],
                    ),
                ]
            }
        }
    }

    pub fn add_invocation(self, repo: &Path, paths: &[String]) -> Invocation {
        let mut args = vec!["add".to_string()];
        if self == Vcs::Svn {
            args.push("--parents".to_string());
        }
        args.extend(paths.iter().cloned());
        self.invocation(repo, args)
    }

    pub fn commit_invocation(self, repo: &Path, message: &str) -> Invocation {
        self.invocation(repo, ["commit", "-m", message])
    }

    /// Runs the init sequence; returns total elapsed seconds.
    pub fn init(self, runner: &Runner, layout: &RepoLayout) -> Result<f64, TortureError> {
        let mut elapsed = 0.0;
        for inv in self.init_sequence(layout) {
            elapsed += runner.run(&inv)?.seconds();
        }
        Ok(elapsed)
    }

    pub fn add(
        self,
        runner: &Runner,
        repo: &Path,
        paths: &[String],
    ) -> Result<CommandOutput, TortureError> {
        runner.run(&self.add_invocation(repo, paths))
    }

    pub fn commit(
        self,
        runner: &Runner,
        repo: &Path,
        message: &str,
    ) -> Result<CommandOutput, TortureError> {
        runner.run(&self.commit_invocation(repo, message))
    }

    /// Reads the head file count and commit count of an existing repository.
    pub fn inspect(self, runner: &Runner, repo: &Path) -> Result<RepoInfo, TortureError> {
        match self {
            Vcs::Git => {
                let head = runner.output(&self.invocation(
                    repo,
                    ["rev-parse", "--verify", "-q", "HEAD"],
                ))?;
                if !head.success() {
                    debug!(repo = %repo.display(), "repository has no commits yet");
                    return Ok(RepoInfo::default());
                }
                let files = runner.run(&self.invocation(repo, ["ls-tree", "-r", "HEAD"]))?;
                let log = runner.run(&self.invocation(repo, ["log", "--oneline"]))?;
                Ok(RepoInfo {
                    head_files: files.stdout_lines().len(),
                    commits: log.stdout_lines().len(),
                })
            }
            Vcs::Hg | Vcs::Svn => Err(TortureError::Unsupported {
                operation: "Inspecting an existing repository",
                vcs: self.name(),
            }),
        }
    }

    /// Loose and packed object counts. Only git has them.
    pub fn object_counts(
        self,
        runner: &Runner,
        repo: &Path,
    ) -> Result<Option<ObjectCounts>, TortureError> {
        if self != Vcs::Git {
            return Ok(None);
        }
        let out = runner.run(&self.invocation(repo, ["count-objects", "-v"]))?;
        Ok(Some(parse_count_objects(&out.stdout_lines())))
    }
}

fn parse_count_objects(lines: &[String]) -> ObjectCounts {
    let mut counts = ObjectCounts::default();
    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Ok(n) = value.trim().parse::<u64>() else {
            continue;
        };
        match key.trim() {
            "count" => counts.loose = n,
            "in-pack" => counts.packed = n,
            _ => {}
        }
    }
    counts
}
