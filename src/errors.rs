use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum TortureError {
    #[error("Specify {what} with {flag}")]
    MissingParameter {
        what: &'static str,
        flag: &'static str,
    },

    #[error("Invalid value {value} for {name}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: usize,
        reason: &'static str,
    },

    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    #[error("Failed to read response file {path}: {source}")]
    ResponseFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Response files nested deeper than {max} levels")]
    ResponseFileDepth { max: usize },

    #[error("Not installed: {exe}")]
    ExecutableNotFound { exe: String },

    #[error("Failed to start {command}: {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} failed: {status}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },

    #[error("Couldn't create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Can't use {path} as a repository location")]
    InvalidPath { path: PathBuf },

    #[error("Couldn't remove {path}: {source}")]
    RemoveDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Generated content is {actual} bytes, expected {expected}")]
    ContentSize { expected: usize, actual: usize },

    #[error("{operation} is not supported for {vcs}")]
    Unsupported {
        operation: &'static str,
        vcs: &'static str,
    },

    #[error("No worktree attached to repo {repo}")]
    NoWorktree { repo: PathBuf },

    #[error("{operation} interrupted")]
    Aborted { operation: &'static str },
}
