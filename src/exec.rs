use std::cell::RefCell;
use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::errors::TortureError;

/// Finds executables on `PATH`, remembering each answer for the life of the
/// resolver.
#[derive(Debug, Default)]
pub struct ExeResolver {
    search_path: Option<OsString>,
    cache: RefCell<HashMap<String, PathBuf>>,
}

impl ExeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves against `search_path` instead of the process `PATH`.
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
            cache: RefCell::default(),
        }
    }

    pub fn resolve(&self, exe: &str) -> Result<PathBuf, TortureError> {
        if let Some(path) = self.cache.borrow().get(exe) {
            return Ok(path.clone());
        }

        let path = self
            .search(exe)
            .ok_or_else(|| TortureError::ExecutableNotFound {
                exe: exe.to_string(),
            })?;
        debug!(exe, path = %path.display(), "resolved executable");
        self.cache
            .borrow_mut()
            .insert(exe.to_string(), path.clone());
        Ok(path)
    }

    fn search(&self, exe: &str) -> Option<PathBuf> {
        let search_path = match &self.search_path {
            Some(p) => p.clone(),
            None => env::var_os("PATH")?,
        };
        env::split_paths(&search_path)
            .flat_map(|dir| candidates(&dir, exe))
            .find(|candidate| is_executable(candidate))
    }
}

#[cfg(windows)]
fn candidates(dir: &Path, exe: &str) -> Vec<PathBuf> {
    let exts = env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    let mut out = vec![dir.join(exe)];
    out.extend(exts.split(';').map(|ext| dir.join(format!("{exe}{ext}"))));
    out
}

#[cfg(not(windows))]
fn candidates(dir: &Path, exe: &str) -> Vec<PathBuf> {
    vec![dir.join(exe)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Captured result of one finished subprocess.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub elapsed: Duration,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: ExitStatus,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Stdout split into lines on LF or CRLF.
    pub fn stdout_lines(&self) -> Vec<String> {
        data_to_lines(&self.stdout)
    }
}

/// Splits captured output into lines, dropping a trailing CR from each.
pub fn data_to_lines(data: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(data)
        .lines()
        .map(|l| l.to_string())
        .collect()
}

/// One external command to run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub exe: &'static str,
    pub args: Vec<String>,
    pub dir: PathBuf,
    pub env: Vec<(&'static str, String)>,
}

impl Invocation {
    pub fn new<I, S>(exe: &'static str, dir: &Path, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exe,
            args: args.into_iter().map(Into::into).collect(),
            dir: dir.to_path_buf(),
            env: Vec::new(),
        }
    }

    pub fn env(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.env.push((key, value.into()));
        self
    }

    /// `exe arg arg ...`, for messages.
    pub fn display(&self) -> String {
        let mut s = self.exe.to_string();
        for arg in &self.args {
            s.push(' ');
            s.push_str(arg);
        }
        s
    }

    /// Short form of `display` for progress lines; long path lists are
    /// summarized.
    pub fn summary(&self) -> String {
        if self.args.len() <= 4 {
            return self.display();
        }
        format!(
            "{} {} ... ({} args)",
            self.exe,
            self.args[..2].join(" "),
            self.args.len()
        )
    }
}

/// Called after every finished command with the invocation and its output.
pub type CommandObserver = Box<dyn Fn(&Invocation, &CommandOutput)>;

/// Runs blocking subprocesses and times them with a monotonic clock.
pub struct Runner {
    resolver: ExeResolver,
    observer: Option<CommandObserver>,
}

impl Runner {
    pub fn new(resolver: ExeResolver) -> Self {
        Self {
            resolver,
            observer: None,
        }
    }

    /// Installs a hook that sees each command after it finishes, outside the
    /// timed region.
    pub fn with_observer(mut self, observer: CommandObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn resolver(&self) -> &ExeResolver {
        &self.resolver
    }

    /// Runs `inv` to completion and returns its output whatever the exit
    /// status. Only a spawn failure is an error.
    pub fn output(&self, inv: &Invocation) -> Result<CommandOutput, TortureError> {
        let exe_path = self.resolver.resolve(inv.exe)?;

        let mut cmd = Command::new(&exe_path);
        cmd.args(&inv.args).current_dir(&inv.dir);
        for (key, value) in &inv.env {
            cmd.env(key, value);
        }
        // Own process group, so a terminal Ctrl-C reaches only us and the
        // command in flight runs to completion.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        trace!(command = %inv.display(), dir = %inv.dir.display(), "spawning");
        let start = Instant::now();
        let output = cmd.output();
        let elapsed = start.elapsed();

        let output = output.map_err(|source| TortureError::SpawnFailed {
            command: inv.summary(),
            source,
        })?;
        let result = CommandOutput {
            elapsed,
            stdout: output.stdout,
            stderr: output.stderr,
            status: output.status,
        };
        debug!(
            command = %inv.summary(),
            elapsed = result.seconds(),
            status = %result.status,
            "command finished"
        );

        if let Some(observer) = &self.observer {
            observer(inv, &result);
        }
        Ok(result)
    }

    /// Runs `inv` and treats a non-zero exit as an error carrying the
    /// captured output.
    pub fn run(&self, inv: &Invocation) -> Result<CommandOutput, TortureError> {
        let output = self.output(inv)?;
        if !output.success() {
            return Err(TortureError::CommandFailed {
                command: inv.summary(),
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Fastest of `rounds` runs of `inv`: the fixed cost of starting a
    /// process, to subtract from measured operations.
    pub fn calibrate(&self, inv: &Invocation, rounds: usize) -> Result<Duration, TortureError> {
        let mut best: Option<Duration> = None;
        for _ in 0..rounds.max(1) {
            let elapsed = self.run(inv)?.elapsed;
            best = Some(best.map_or(elapsed, |b| b.min(elapsed)));
        }
        let overhead = best.unwrap_or_default();
        debug!(command = %inv.display(), overhead = overhead.as_secs_f64(), "calibrated");
        Ok(overhead)
    }
}
