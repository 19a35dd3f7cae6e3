pub mod batch;
pub mod config;
pub mod content;
pub mod errors;
pub mod exec;
pub mod repo;
pub mod report;
pub mod response;
pub mod sharder;
pub mod signals;
pub mod status;
pub mod types;
pub mod vcs;
pub mod worktree;
