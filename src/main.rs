use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vcs_torture::config::{CommitSection, Config, WorktreeSection};
use vcs_torture::errors::TortureError;
use vcs_torture::exec::{CommandOutput, ExeResolver, Invocation, Runner, data_to_lines};
use vcs_torture::repo::{Repo, delete_repo};
use vcs_torture::report::{self, Report, WorktreeSummary};
use vcs_torture::response;
use vcs_torture::signals::{self, AbortFlag};
use vcs_torture::status::{PeriodicStatus, elide_path};
use vcs_torture::types::{CommitProgress, RepoOptions, Vcs, WorktreeOptions, WorktreeProgress};
use vcs_torture::worktree::Worktree;

const WORKTREE_STATUS_INTERVAL: Duration = Duration::from_millis(20);
const COMMIT_STATUS_INTERVAL: Duration = Duration::from_millis(100);

/// Exit status after an interrupt, as a shell reports SIGINT.
const ABORT_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(
    name = "vcs-torture",
    version,
    about = "Build large synthetic repositories and time how a VCS copes with them",
    after_help = "Operations can be chained in one invocation, each taking settings \
                  left unset from the one before:\n  \
                  vcs-torture remove --vcs git --dest /tmp/t --repo big create worktree"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Trace VCS commands and debug logs; -vv adds full arguments and output
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: <config dir>/vcs-torture/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create a repository, or report on one that already exists
    Create(RepoArgs),
    /// Delete a repository and any server-side data
    Remove(RepoArgs),
    /// Populate <dest>/<repo> with generated files
    Worktree(RepoArgs),
    /// Generate the worktree, then add and commit it in timed batches
    Commit(RepoArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Create(_) => "create",
            Command::Remove(_) => "remove",
            Command::Worktree(_) => "worktree",
            Command::Commit(_) => "commit",
        }
    }

    fn args(&self) -> &RepoArgs {
        match self {
            Command::Create(a) | Command::Remove(a) | Command::Worktree(a) | Command::Commit(a) => a,
        }
    }

    fn args_mut(&mut self) -> &mut RepoArgs {
        match self {
            Command::Create(a) | Command::Remove(a) | Command::Worktree(a) | Command::Commit(a) => a,
        }
    }

    fn needs_vcs(&self) -> bool {
        !matches!(self, Command::Worktree(_))
    }
}

#[derive(Args, Clone)]
struct RepoArgs {
    /// Version control system to drive
    #[arg(long, value_enum)]
    vcs: Option<Vcs>,

    /// Directory the repository lives in
    #[arg(long)]
    dest: Option<PathBuf>,

    /// Repository name under --dest
    #[arg(long)]
    repo: Option<String>,

    /// Files in the generated worktree [default: 1000]
    #[arg(long)]
    worktree_file_count: Option<usize>,

    /// Files in each directory before moving to the next [default: 48]
    #[arg(long)]
    files_per_dir: Option<usize>,

    /// Subdirectories per directory, at most 26 [default: 16]
    #[arg(long)]
    dirs_per_dir: Option<usize>,

    /// Size of each generated file in bytes [default: 10000]
    #[arg(long)]
    worktree_file_size: Option<usize>,

    /// Commits to make [default: 1]
    #[arg(long)]
    num_commits: Option<usize>,

    /// Add calls before each commit [default: 1]
    #[arg(long)]
    adds_per_commit: Option<usize>,

    /// Files passed to each add call [default: 100]
    #[arg(long)]
    files_per_add: Option<usize>,

    /// Report loose and packed object counts after each commit (git only)
    #[arg(long)]
    count_objects: bool,

    /// Further operations to run afterwards
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    then: Vec<String>,
}

impl RepoArgs {
    /// Fills settings left unset here from an earlier operation.
    fn inherit(&mut self, earlier: &RepoArgs) {
        self.vcs = self.vcs.or(earlier.vcs);
        self.dest = self.dest.take().or_else(|| earlier.dest.clone());
        self.repo = self.repo.take().or_else(|| earlier.repo.clone());
        self.worktree_file_count = self.worktree_file_count.or(earlier.worktree_file_count);
        self.files_per_dir = self.files_per_dir.or(earlier.files_per_dir);
        self.dirs_per_dir = self.dirs_per_dir.or(earlier.dirs_per_dir);
        self.worktree_file_size = self.worktree_file_size.or(earlier.worktree_file_size);
        self.num_commits = self.num_commits.or(earlier.num_commits);
        self.adds_per_commit = self.adds_per_commit.or(earlier.adds_per_commit);
        self.files_per_add = self.files_per_add.or(earlier.files_per_add);
        self.count_objects |= earlier.count_objects;
    }
}

/// Splits a parsed command line into its chained operations, each with the
/// settings it inherits.
fn chain(first: Command) -> Vec<Command> {
    let mut commands: Vec<Command> = Vec::new();
    let mut current = first;
    loop {
        let rest = std::mem::take(&mut current.args_mut().then);
        if let Some(earlier) = commands.last() {
            let earlier = earlier.args().clone();
            current.args_mut().inherit(&earlier);
        }
        commands.push(current);
        if rest.is_empty() {
            return commands;
        }
        let next = std::iter::once("vcs-torture".to_string()).chain(rest);
        current = Cli::parse_from(next).command;
    }
}

/// Command line merged over the config file, validated.
struct Settings {
    vcs: Option<Vcs>,
    dest: PathBuf,
    repo: String,
    worktree: WorktreeOptions,
    commit: RepoOptions,
}

impl Settings {
    fn resolve(command: &Command, config: &Config) -> Result<Self, TortureError> {
        let args = command.args();
        let vcs = args.vcs.or(config.vcs);
        if command.needs_vcs() && vcs.is_none() {
            return Err(TortureError::MissingParameter {
                what: "a version control system",
                flag: "--vcs",
            });
        }
        let dest = args
            .dest
            .clone()
            .or_else(|| config.dest.clone())
            .ok_or(TortureError::MissingParameter {
                what: "a destination directory",
                flag: "--dest",
            })?;
        let repo = args
            .repo
            .clone()
            .or_else(|| config.repo.clone())
            .ok_or(TortureError::MissingParameter {
                what: "a repository name",
                flag: "--repo",
            })?;

        let worktree = WorktreeSection {
            file_count: args.worktree_file_count,
            file_size: args.worktree_file_size,
            files_per_dir: args.files_per_dir,
            dirs_per_dir: args.dirs_per_dir,
        }
        .over(&config.worktree)
        .resolve()?;
        let commit = CommitSection {
            num_commits: args.num_commits,
            adds_per_commit: args.adds_per_commit,
            files_per_add: args.files_per_add,
            count_objects: args.count_objects.then_some(true),
        }
        .over(&config.commit)
        .resolve()?;

        Ok(Self {
            vcs,
            dest,
            repo,
            worktree,
            commit,
        })
    }

    fn vcs(&self) -> Result<Vcs, TortureError> {
        self.vcs.ok_or(TortureError::MissingParameter {
            what: "a version control system",
            flag: "--vcs",
        })
    }

    fn repo_path(&self) -> String {
        self.dest.join(&self.repo).display().to_string()
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Echoes each finished command as `T+<secs>: (elapsed=<secs>) <command>`,
/// with its output at higher verbosity.
fn command_tracer(start: Instant, verbose: u8) -> Box<dyn Fn(&Invocation, &CommandOutput)> {
    Box::new(move |inv, out| {
        let command = if verbose > 1 {
            inv.display()
        } else {
            inv.summary()
        };
        eprintln!(
            "T+{:.3}: (elapsed={:.3}) {}",
            start.elapsed().as_secs_f64(),
            out.seconds(),
            command
        );
        if verbose > 1 {
            for line in data_to_lines(&out.stdout).iter().chain(&data_to_lines(&out.stderr)) {
                eprintln!("  {line}");
            }
        }
    })
}

fn worktree_message(p: &WorktreeProgress) -> String {
    format!(
        "create {}/{} files: {}",
        p.position,
        p.num_files,
        elide_path(&p.path)
    )
}

fn commit_message(p: &CommitProgress, num_commits: usize) -> String {
    let mut msg = format!(
        "commit {}/{}: {} files in index, {} commits, add {:.3}s, commit {:.3}s",
        p.commit, num_commits, p.num_index_files, p.commits_done, p.add_seconds, p.commit_seconds
    );
    if let (Some(loose), Some(packed)) = (p.loose_objects, p.pack_objects) {
        msg.push_str(&format!(", objects {loose} loose/{packed} packed"));
    }
    msg
}

fn generate(worktree: &mut Worktree, start: Instant, abort: &AbortFlag) -> Result<()> {
    let mut status = PeriodicStatus::stderr(start, WORKTREE_STATUS_INTERVAL);
    let finished = worktree.generate(|p| {
        if p.done || status.ready() {
            status.show(&worktree_message(p));
        }
        if p.done {
            status.finish();
        }
        abort.is_set()
    })?;
    if !finished {
        return Err(TortureError::Aborted {
            operation: "worktree generation",
        }
        .into());
    }
    Ok(())
}

fn emit(report: &Report, json: bool) {
    if json {
        println!("{}", report::format_json(report));
    } else {
        print!("{}", report::format_text(report));
    }
}

fn run(cli: Cli, config: Config, verbose: u8, start: Instant) -> Result<()> {
    // Every operation is validated before the first one runs.
    let operations = chain(cli.command)
        .into_iter()
        .map(|command| Settings::resolve(&command, &config).map(|s| (command, s)))
        .collect::<Result<Vec<_>, _>>()?;

    let abort = AbortFlag::new();
    signals::capture(&abort)?;

    for (command, settings) in &operations {
        let mut runner = Runner::new(ExeResolver::new());
        if verbose > 0 {
            runner = runner.with_observer(command_tracer(start, verbose));
        }
        run_one(command, settings, runner, start, &abort, cli.json)?;
    }
    Ok(())
}

fn run_one(
    command: &Command,
    settings: &Settings,
    runner: Runner,
    start: Instant,
    abort: &AbortFlag,
    json: bool,
) -> Result<()> {
    let mut report = Report::new(command.name(), settings.repo_path(), Utc::now());
    report.vcs = settings.vcs;

    match command {
        Command::Create(_) => {
            let mut repo = Repo::new(
                settings.vcs()?,
                &settings.dest,
                &settings.repo,
                settings.commit,
                runner,
            )?;
            report.repo_info = Some(repo.create()?);
        }
        Command::Remove(_) => {
            delete_repo(settings.vcs()?, &settings.dest, &settings.repo)?;
        }
        Command::Worktree(_) => {
            let mut worktree = Worktree::new(&settings.dest, &settings.repo, settings.worktree)?;
            generate(&mut worktree, start, abort)?;
            report.worktree = Some(WorktreeSummary::of(&worktree));
        }
        Command::Commit(_) => {
            let num_commits = settings.commit.num_commits;
            let mut repo = Repo::new(
                settings.vcs()?,
                &settings.dest,
                &settings.repo,
                settings.commit,
                runner,
            )?;
            repo.create()?;
            generate(repo.add_worktree(settings.worktree)?, start, abort)?;
            repo.calibrate()?;

            let mut status = PeriodicStatus::stderr(start, COMMIT_STATUS_INTERVAL);
            let finished = repo.commit(|p| {
                if p.done || status.ready() {
                    status.show(&commit_message(p, num_commits));
                }
                if p.done {
                    status.finish();
                }
                abort.is_set()
            })?;

            report.repo_info = Some(repo.info());
            report.worktree = repo.worktree().map(WorktreeSummary::of);
            report.commit = Some(repo.stats().clone());
            if !finished {
                report.elapsed_seconds = start.elapsed().as_secs_f64();
                emit(&report, json);
                return Err(TortureError::Aborted { operation: "commit" }.into());
            }
        }
    }

    report.elapsed_seconds = start.elapsed().as_secs_f64();
    emit(&report, json);
    Ok(())
}

/// Prints `err`, plus the captured output of a failed command when verbose,
/// and returns the exit code.
fn report_error(err: &anyhow::Error, verbose: u8) -> i32 {
    if verbose > 0
        && let Some(TortureError::CommandFailed { stdout, stderr, .. }) =
            err.downcast_ref::<TortureError>()
    {
        for line in data_to_lines(stdout).iter().chain(&data_to_lines(stderr)) {
            eprintln!("{line}");
        }
    }
    eprintln!("{err}");
    match err.downcast_ref::<TortureError>() {
        Some(TortureError::Aborted { .. }) => ABORT_EXIT_CODE,
        _ => 1,
    }
}

fn main() {
    let start = Instant::now();
    let args = match response::expand_args(std::env::args()) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };
    let cli = Cli::parse_from(args);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };
    let verbose = cli.verbose.max(config.verbose.unwrap_or(0));
    init_tracing(verbose);

    if let Err(err) = run(cli, config, verbose, start) {
        process::exit(report_error(&err, verbose));
    }
}
