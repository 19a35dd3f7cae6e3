use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::batch::{MAX_CMDLINE, batches};
use crate::errors::TortureError;
use crate::exec::Runner;
use crate::types::{CommitProgress, RepoInfo, RepoOptions, Vcs, WorktreeOptions};
use crate::vcs::{RepoLayout, server_dir_name};
use crate::worktree::Worktree;

/// Number of `--version` runs used to measure process start cost.
const CALIBRATION_ROUNDS: usize = 3;

/// Elapsed time of one batched add.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AddTiming {
    /// Net seconds, with per-invocation overhead removed.
    pub seconds: f64,
    pub invocations: usize,
}

/// Totals for a commit run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommitStats {
    pub commits: usize,
    pub add_calls: usize,
    pub add_invocations: usize,
    pub files_added: usize,
    pub add_seconds: f64,
    pub commit_seconds: f64,
    pub overhead_seconds: f64,
}

/// A repository under test and the worktree that feeds it.
pub struct Repo {
    vcs: Vcs,
    options: RepoOptions,
    layout: RepoLayout,
    runner: Runner,
    max_cmdline: usize,
    overhead: Duration,
    info: RepoInfo,
    commits_done: usize,
    stats: CommitStats,
    worktree: Option<Worktree>,
}

impl Repo {
    pub fn new(
        vcs: Vcs,
        dest: &Path,
        repo_name: &str,
        options: RepoOptions,
        runner: Runner,
    ) -> Result<Self, TortureError> {
        Ok(Self {
            vcs,
            options,
            layout: RepoLayout::new(vcs, dest, repo_name)?,
            runner,
            max_cmdline: MAX_CMDLINE,
            overhead: Duration::ZERO,
            info: RepoInfo::default(),
            commits_done: 0,
            stats: CommitStats::default(),
            worktree: None,
        })
    }

    pub fn with_max_cmdline(mut self, max_cmdline: usize) -> Self {
        self.max_cmdline = max_cmdline;
        self
    }

    pub fn vcs(&self) -> Vcs {
        self.vcs
    }

    pub fn path(&self) -> &Path {
        &self.layout.repo_path
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    pub fn info(&self) -> RepoInfo {
        self.info
    }

    pub fn commits_done(&self) -> usize {
        self.commits_done
    }

    pub fn stats(&self) -> &CommitStats {
        &self.stats
    }

    pub fn overhead(&self) -> Duration {
        self.overhead
    }

    /// Attaches a worktree rooted at the repository directory.
    pub fn add_worktree(
        &mut self,
        options: WorktreeOptions,
    ) -> Result<&mut Worktree, TortureError> {
        let worktree = Worktree::at(self.layout.repo_path.clone(), options)?;
        Ok(self.worktree.insert(worktree))
    }

    pub fn worktree(&self) -> Option<&Worktree> {
        self.worktree.as_ref()
    }

    /// Makes a new repository, or reads what is already there.
    pub fn create(&mut self) -> Result<RepoInfo> {
        let repo = &self.layout.repo_path;
        if repo.exists() {
            info!(repo = %repo.display(), vcs = %self.vcs, "inspecting existing repository");
            self.info = self.vcs.inspect(&self.runner, repo)?;
        } else {
            info!(repo = %repo.display(), vcs = %self.vcs, "creating repository");
            fs::create_dir_all(repo).map_err(|source| TortureError::CreateDir {
                path: repo.clone(),
                source,
            })?;
            let elapsed = self.vcs.init(&self.runner, &self.layout)?;
            debug!(elapsed, "repository initialized");
            self.info = RepoInfo::default();
        }
        self.commits_done = self.info.commits;
        Ok(self.info)
    }

    /// Measures the fixed cost of starting the VCS client. Later add and
    /// commit timings have it subtracted per invocation.
    pub fn calibrate(&mut self) -> Result<Duration> {
        let version_check = self.vcs.version_check(&self.layout.dest);
        self.overhead = self.runner.calibrate(&version_check, CALIBRATION_ROUNDS)?;
        info!(overhead = self.overhead.as_secs_f64(), "measured invocation overhead");
        Ok(self.overhead)
    }

    fn net_seconds(&self, elapsed: Duration) -> f64 {
        elapsed.saturating_sub(self.overhead).as_secs_f64()
    }

    /// Adds `paths`, splitting them across as many invocations as the
    /// command-line limit requires.
    pub fn add_files(&self, paths: &[String]) -> Result<AddTiming> {
        let mut timing = AddTiming::default();
        for batch in batches(paths, self.max_cmdline) {
            let out = self.vcs.add(&self.runner, &self.layout.repo_path, batch)?;
            timing.seconds += self.net_seconds(out.elapsed);
            timing.invocations += 1;
        }
        Ok(timing)
    }

    /// Runs `num_commits` add/commit cycles over the attached worktree's
    /// files, continuing after the files already committed.
    ///
    /// `progress` is called after each add call and each commit, and once
    /// more with `done` set. Returning `true` from it stops the run; a stop
    /// during adds skips the pending commit. Returns `Ok(false)` when the
    /// final callback asks to stop.
    pub fn commit<F>(&mut self, mut progress: F) -> Result<bool>
    where
        F: FnMut(&CommitProgress) -> bool,
    {
        let worktree = self
            .worktree
            .as_ref()
            .ok_or_else(|| TortureError::NoWorktree {
                repo: self.layout.repo_path.clone(),
            })?;
        let files = worktree.files();

        let per_commit = self.options.adds_per_commit * self.options.files_per_add;
        let mut pos = self.info.head_files.min(files.len());
        let mut commits_done = self.commits_done;
        let mut stats = CommitStats {
            overhead_seconds: self.overhead.as_secs_f64(),
            ..CommitStats::default()
        };
        let mut cb = CommitProgress {
            commits_done,
            num_index_files: pos,
            ..CommitProgress::default()
        };

        info!(
            repo = %self.layout.repo_path.display(),
            num_commits = self.options.num_commits,
            files_per_commit = per_commit,
            start = pos,
            "starting commit run"
        );

        'commits: for iteration in 1..=self.options.num_commits {
            cb.commit = iteration;
            if pos >= files.len() {
                warn!(files = files.len(), "worktree exhausted, no more files to commit");
                break;
            }

            let mut added = 0;
            while added < per_commit {
                let start = pos + added;
                let amt = self.options.files_per_add.min(per_commit - added);
                let end = (start + amt).min(files.len());
                if start >= end {
                    break;
                }

                let timing = self.add_files(&files[start..end])?;
                added += end - start;
                stats.add_calls += 1;
                stats.add_invocations += timing.invocations;
                stats.files_added += end - start;
                stats.add_seconds += timing.seconds;

                cb.num_index_files += end - start;
                cb.add_seconds = stats.add_seconds;
                if progress(&cb) {
                    break 'commits;
                }
            }
            pos += added;

            let message = format!("commit {}", commits_done + 1);
            let out = self.vcs.commit(&self.runner, &self.layout.repo_path, &message)?;
            let seconds = self.net_seconds(out.elapsed);
            commits_done += 1;
            stats.commits += 1;
            stats.commit_seconds += seconds;
            debug!(commit = commits_done, files = added, seconds, "committed");

            if self.options.count_objects
                && let Some(counts) = self.vcs.object_counts(&self.runner, &self.layout.repo_path)?
            {
                cb.loose_objects = Some(counts.loose);
                cb.pack_objects = Some(counts.packed);
            }

            cb.commits_done = commits_done;
            cb.commit_seconds = stats.commit_seconds;
            if progress(&cb) {
                break;
            }
        }

        self.commits_done = commits_done;
        self.info.head_files = cb.num_index_files;
        self.info.commits = commits_done;
        info!(
            commits = stats.commits,
            files = stats.files_added,
            add_seconds = stats.add_seconds,
            commit_seconds = stats.commit_seconds,
            "commit run finished"
        );
        self.stats = stats;

        cb.done = true;
        Ok(!progress(&cb))
    }
}

/// Deletes a repository along with any server-side data it owns. Missing
/// directories are not an error.
pub fn delete_repo(vcs: Vcs, dest: &Path, repo_name: &str) -> Result<(), TortureError> {
    let mut targets = vec![dest.join(repo_name)];
    if vcs == Vcs::Svn {
        targets.push(dest.join(server_dir_name(repo_name)));
    }
    for path in targets {
        remove_dir(path)?;
    }
    Ok(())
}

fn remove_dir(path: PathBuf) -> Result<(), TortureError> {
    match fs::remove_dir_all(&path) {
        Ok(()) => {
            info!(path = %path.display(), "removed");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(TortureError::RemoveDir { path, source }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::exec::ExeResolver;
    use std::os::unix::fs::PermissionsExt;

    /// A stand-in `git` that logs each invocation (one line per call) and
    /// reports an empty repository.
    fn fake_git(bin: &Path, log: &Path) {
        let script = format!(
            "#!/bin/sh\n\
             case \"$1\" in\n\
               rev-parse) exit 1 ;;\n\
               count-objects) echo 'count: 4'; echo 'in-pack: 0' ;;\n\
             esac\n\
             echo \"$*\" >> '{}'\n",
            log.display()
        );
        fs::create_dir_all(bin).unwrap();
        let exe = bin.join("git");
        fs::write(&exe, script).unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
    }

    struct Fixture {
        _tmp: assert_fs::TempDir,
        dest: PathBuf,
        log: PathBuf,
        bin: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = assert_fs::TempDir::new().unwrap();
            let dest = tmp.path().join("dest");
            let bin = tmp.path().join("bin");
            let log = tmp.path().join("git.log");
            fake_git(&bin, &log);
            Self {
                dest,
                log,
                bin,
                _tmp: tmp,
            }
        }

        fn repo(&self, options: RepoOptions) -> Repo {
            let runner = Runner::new(ExeResolver::with_search_path(self.bin.as_os_str()));
            Repo::new(Vcs::Git, &self.dest, "repo", options, runner).unwrap()
        }

        fn calls(&self) -> Vec<String> {
            fs::read_to_string(&self.log)
                .unwrap_or_default()
                .lines()
                .map(|l| l.to_string())
                .collect()
        }
    }

    fn worktree_opts(num_files: usize) -> WorktreeOptions {
        WorktreeOptions {
            num_files,
            files_per_dir: 2,
            dirs_per_dir: 2,
            file_size: 16,
        }
    }

    fn repo_opts(num_commits: usize, adds_per_commit: usize, files_per_add: usize) -> RepoOptions {
        RepoOptions {
            num_commits,
            adds_per_commit,
            files_per_add,
            count_objects: false,
        }
    }

    #[test]
    fn create_runs_init_sequence() {
        let fx = Fixture::new();
        let mut repo = fx.repo(RepoOptions::default());
        let info = repo.create().unwrap();
        assert_eq!(info, RepoInfo::default());
        assert!(repo.path().is_dir());

        let calls = fx.calls();
        assert_eq!(calls[0], "init");
        assert!(calls.contains(&"config gc.auto 0".to_string()));
        assert!(calls.contains(&"config gc.autodetach false".to_string()));
    }

    #[test]
    fn create_on_existing_repo_inspects() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.dest.join("repo")).unwrap();
        let mut repo = fx.repo(RepoOptions::default());
        let info = repo.create().unwrap();
        assert_eq!(info.head_files, 0);
        assert_eq!(info.commits, 0);
        // rev-parse failed, so nothing else ran and init was skipped
        assert!(fx.calls().is_empty());
    }

    #[test]
    fn two_cycles_of_three() {
        let fx = Fixture::new();
        let mut repo = fx.repo(repo_opts(2, 1, 3));
        repo.create().unwrap();
        repo.add_worktree(worktree_opts(6)).unwrap().generate(|_| false).unwrap();

        let mut index_counts = Vec::new();
        let ok = repo
            .commit(|cb| {
                index_counts.push((cb.commit, cb.num_index_files, cb.commits_done));
                false
            })
            .unwrap();
        assert!(ok);
        assert_eq!(repo.commits_done(), 2);
        assert_eq!(index_counts.last().unwrap().1, 6);
        assert_eq!(
            index_counts,
            [(1, 3, 0), (1, 3, 1), (2, 6, 1), (2, 6, 2), (2, 6, 2)]
        );

        let calls = fx.calls();
        let adds: Vec<&String> = calls.iter().filter(|c| c.starts_with("add ")).collect();
        assert_eq!(adds.len(), 2);
        assert_eq!(adds[0].as_str(), "add at bi a/do");
        assert_eq!(adds[1].as_str(), "add a/ex b/fa b/go");
        let commits: Vec<&String> = calls.iter().filter(|c| c.starts_with("commit")).collect();
        assert_eq!(commits, ["commit -m commit 1", "commit -m commit 2"]);

        let stats = repo.stats();
        assert_eq!(stats.commits, 2);
        assert_eq!(stats.add_calls, 2);
        assert_eq!(stats.files_added, 6);
    }

    #[test]
    fn add_is_split_by_command_line_limit() {
        let fx = Fixture::new();
        let repo = fx.repo(RepoOptions::default()).with_max_cmdline(10);
        fs::create_dir_all(repo.path()).unwrap();
        let paths: Vec<String> = ["at", "bi", "a/do", "a/ex", "b/fa"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let timing = repo.add_files(&paths).unwrap();
        assert_eq!(timing.invocations, 3);
        let calls = fx.calls();
        assert_eq!(calls, ["add at bi", "add a/do a/ex", "add b/fa"]);
    }

    #[test]
    fn stop_during_adds_skips_pending_commit() {
        let fx = Fixture::new();
        let mut repo = fx.repo(repo_opts(3, 2, 2));
        repo.create().unwrap();
        repo.add_worktree(worktree_opts(12)).unwrap().generate(|_| false).unwrap();

        // stop at the first add of the second commit
        let ok = repo.commit(|cb| cb.done || cb.num_index_files >= 6).unwrap();
        assert!(!ok);
        assert_eq!(repo.commits_done(), 1);

        let calls = fx.calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("commit")).count(), 1);
        assert_eq!(calls.iter().filter(|c| c.starts_with("add ")).count(), 3);
    }

    #[test]
    fn exhausted_worktree_stops_without_empty_commit() {
        let fx = Fixture::new();
        let mut repo = fx.repo(repo_opts(5, 1, 4));
        repo.create().unwrap();
        repo.add_worktree(worktree_opts(6)).unwrap().generate(|_| false).unwrap();

        assert!(repo.commit(|_| false).unwrap());
        assert_eq!(repo.commits_done(), 2);
        let calls = fx.calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("commit")).count(), 2);
        assert!(calls.contains(&"add b/fa b/go".to_string()));
    }

    #[test]
    fn object_counts_reported_for_git() {
        let fx = Fixture::new();
        let mut options = repo_opts(1, 1, 2);
        options.count_objects = true;
        let mut repo = fx.repo(options);
        repo.create().unwrap();
        repo.add_worktree(worktree_opts(2)).unwrap().generate(|_| false).unwrap();

        let mut loose = None;
        repo.commit(|cb| {
            loose = cb.loose_objects;
            false
        })
        .unwrap();
        assert_eq!(loose, Some(4));
    }

    #[test]
    fn commit_requires_worktree() {
        let fx = Fixture::new();
        let mut repo = fx.repo(RepoOptions::default());
        let err = repo.commit(|_| false).unwrap_err();
        assert!(err.to_string().contains("No worktree attached"));
    }

    #[test]
    fn calibrate_records_overhead() {
        let fx = Fixture::new();
        fs::create_dir_all(&fx.dest).unwrap();
        let mut repo = fx.repo(RepoOptions::default());
        let overhead = repo.calibrate().unwrap();
        assert_eq!(repo.overhead(), overhead);
        assert_eq!(
            fx.calls().iter().filter(|c| *c == "--version").count(),
            CALIBRATION_ROUNDS
        );
    }

    #[test]
    fn delete_repo_removes_svn_server_too() {
        let tmp = assert_fs::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("r/sub")).unwrap();
        fs::create_dir_all(tmp.path().join("r-svnrepo")).unwrap();
        delete_repo(Vcs::Svn, tmp.path(), "r").unwrap();
        assert!(!tmp.path().join("r").exists());
        assert!(!tmp.path().join("r-svnrepo").exists());

        // already gone is fine
        delete_repo(Vcs::Git, tmp.path(), "r").unwrap();
    }
}
