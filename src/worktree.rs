use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

use crate::content::{NameGenerator, make_content};
use crate::errors::TortureError;
use crate::sharder::DirSharder;
use crate::types::{WorktreeOptions, WorktreeProgress};

/// A directory of generated files used as commit fodder.
#[derive(Debug)]
pub struct Worktree {
    options: WorktreeOptions,
    root: PathBuf,
    names: NameGenerator,
    sharder: DirSharder,
    dirs: HashSet<String>,
    files: Vec<String>,
    written: usize,
}

impl Worktree {
    pub fn new(
        dest: &Path,
        repo_name: &str,
        options: WorktreeOptions,
    ) -> Result<Self, TortureError> {
        Self::at(dest.join(repo_name), options)
    }

    /// Fails if the tree shape in `options` can't be sharded.
    pub fn at(root: PathBuf, options: WorktreeOptions) -> Result<Self, TortureError> {
        Ok(Self {
            sharder: DirSharder::new(options.files_per_dir, options.dirs_per_dir)?,
            options,
            root,
            names: NameGenerator::new(),
            dirs: HashSet::new(),
            files: Vec::with_capacity(options.num_files),
            written: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &WorktreeOptions {
        &self.options
    }

    /// Relative paths of generated files, in generation order, `/`-separated.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Number of directories created (or found) by the last `generate`.
    pub fn num_dirs(&self) -> usize {
        self.dirs.len()
    }

    /// Files actually written by the last `generate`; the rest already existed.
    pub fn num_written(&self) -> usize {
        self.written
    }

    /// Populates the worktree with `num_files` files.
    ///
    /// Existing files are left untouched, so an interrupted run can be
    /// resumed. `progress` is called after each file and once more with
    /// `done` set; returning `true` stops generation. Returns `Ok(false)` when
    /// the final callback asks to stop.
    pub fn generate<F>(&mut self, mut progress: F) -> Result<bool>
    where
        F: FnMut(&WorktreeProgress) -> bool,
    {
        self.names.reset();
        self.sharder.reset();
        self.dirs.clear();
        self.files.clear();
        self.written = 0;

        info!(
            root = %self.root.display(),
            num_files = self.options.num_files,
            "generating worktree"
        );

        let mut cb = WorktreeProgress {
            num_files: self.options.num_files,
            ..Default::default()
        };

        while cb.position < self.options.num_files {
            let name = self.names.next_unique_name();
            let dirpath = self.sharder.next_dir();

            if !self.dirs.contains(&dirpath) {
                let full = self.root.join(&dirpath);
                fs::create_dir_all(&full).map_err(|source| TortureError::CreateDir {
                    path: full.clone(),
                    source,
                })?;
                debug!(dir = %full.display(), "created directory");
                self.dirs.insert(dirpath.clone());
            }

            cb.path = if dirpath.is_empty() {
                name
            } else {
                format!("{dirpath}/{name}")
            };

            let fpath = self.root.join(&cb.path);
            if !fpath.exists() {
                let content = make_content(self.options.file_size, cb.position as u64)?;
                fs::write(&fpath, content).map_err(|source| TortureError::WriteFile {
                    path: fpath.clone(),
                    source,
                })?;
                self.written += 1;
            }
            self.files.push(cb.path.clone());

            cb.position += 1;
            if progress(&cb) {
                break;
            }
        }

        cb.done = true;
        let completed = !progress(&cb);
        info!(
            files = self.files.len(),
            written = self.written,
            dirs = self.dirs.len(),
            completed,
            "worktree generation finished"
        );
        Ok(completed)
    }
}
