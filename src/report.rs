use chrono::{DateTime, Utc};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use crate::repo::CommitStats;
use crate::types::{RepoInfo, Vcs};
use crate::worktree::Worktree;

/// What one CLI operation did, for the closing summary.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub operation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcs: Option<Vcs>,
    pub repo: String,
    #[serde(serialize_with = "utc_seconds")]
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_info: Option<RepoInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree: Option<WorktreeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorktreeSummary {
    pub files: usize,
    pub written: usize,
    pub dirs: usize,
    pub file_size: usize,
}

impl WorktreeSummary {
    pub fn of(worktree: &Worktree) -> Self {
        Self {
            files: worktree.files().len(),
            written: worktree.num_written(),
            dirs: worktree.num_dirs(),
            file_size: worktree.options().file_size,
        }
    }
}

impl Report {
    pub fn new(operation: &'static str, repo: String, started_at: DateTime<Utc>) -> Self {
        Self {
            operation,
            vcs: None,
            repo,
            started_at,
            elapsed_seconds: 0.0,
            repo_info: None,
            worktree: None,
            commit: None,
        }
    }
}

fn utc_seconds<S: serde::Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

fn per_call(seconds: f64, calls: usize) -> f64 {
    if calls == 0 { 0.0 } else { seconds / calls as f64 }
}

/// Human-readable summary.
pub fn format_text(report: &Report) -> String {
    let mut out = String::new();

    let title = match report.vcs {
        Some(vcs) => format!("{} {} ({})", report.operation, report.repo, vcs),
        None => format!("{} {}", report.operation, report.repo),
    };
    out.push_str(
        &title
            .if_supports_color(Stream::Stdout, |s| s.bold())
            .to_string(),
    );
    out.push('\n');

    if let Some(info) = &report.repo_info {
        out.push_str(&format!(
            "  repo:     {} files at head, {} commits\n",
            info.head_files, info.commits
        ));
    }

    if let Some(w) = &report.worktree {
        out.push_str(&format!(
            "  worktree: {} files ({} written) in {} dirs, {} bytes each\n",
            w.files, w.written, w.dirs, w.file_size
        ));
    }

    if let Some(c) = &report.commit {
        let add = format!("{:.4}s", c.add_seconds);
        let commit = format!("{:.4}s", c.commit_seconds);
        out.push_str(&format!(
            "  adds:     {} files in {} calls ({} invocations), {} total, {:.4}s/call\n",
            c.files_added,
            c.add_calls,
            c.add_invocations,
            add.if_supports_color(Stream::Stdout, |s| s.yellow()),
            per_call(c.add_seconds, c.add_calls)
        ));
        out.push_str(&format!(
            "  commits:  {}, {} total, {:.4}s/commit\n",
            c.commits,
            commit.if_supports_color(Stream::Stdout, |s| s.yellow()),
            per_call(c.commit_seconds, c.commits)
        ));
        out.push_str(&format!(
            "  overhead: {:.4}s per invocation (subtracted)\n",
            c.overhead_seconds
        ));
    }

    let footer = format!("T+{:.2}: done", report.elapsed_seconds);
    out.push_str(
        &footer
            .if_supports_color(Stream::Stdout, |s| s.dimmed())
            .to_string(),
    );
    out.push('\n');
    out
}

pub fn format_json(report: &Report) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn commit_report() -> Report {
        let mut report = Report::new("commit", "/tmp/dest/repo".to_string(), fixed_start());
        report.vcs = Some(Vcs::Git);
        report.elapsed_seconds = 3.5;
        report.repo_info = Some(RepoInfo {
            head_files: 6,
            commits: 2,
        });
        report.worktree = Some(WorktreeSummary {
            files: 6,
            written: 6,
            dirs: 3,
            file_size: 20,
        });
        report.commit = Some(CommitStats {
            commits: 2,
            add_calls: 2,
            add_invocations: 2,
            files_added: 6,
            add_seconds: 0.5,
            commit_seconds: 1.0,
            overhead_seconds: 0.002,
        });
        report
    }

    #[test]
    fn text_summary() {
        let text = format_text(&commit_report());
        assert!(text.contains("commit /tmp/dest/repo (git)"));
        assert!(text.contains("6 files at head, 2 commits"));
        assert!(text.contains("6 files (6 written) in 3 dirs, 20 bytes each"));
        assert!(text.contains("0.2500s/call"));
        assert!(text.contains("0.5000s/commit"));
        assert!(text.contains("T+3.50: done"));
    }

    #[test]
    fn text_summary_minimal() {
        let report = Report::new("remove", "/tmp/dest/repo".to_string(), fixed_start());
        let text = format_text(&report);
        assert!(text.contains("remove /tmp/dest/repo"));
        assert!(!text.contains("adds:"));
        assert!(!text.contains("worktree:"));
    }

    #[test]
    fn json_summary() {
        let json = format_json(&commit_report());
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["operation"], "commit");
        assert_eq!(parsed["vcs"], "git");
        assert_eq!(parsed["started_at"], "2026-03-01T12:00:00Z");
        assert_eq!(parsed["repo_info"]["head_files"], 6);
        assert_eq!(parsed["worktree"]["dirs"], 3);
        assert_eq!(parsed["commit"]["files_added"], 6);
    }

    #[test]
    fn json_omits_missing_sections() {
        let report = Report::new("worktree", "r".to_string(), fixed_start());
        let parsed: serde_json::Value = serde_json::from_str(&format_json(&report)).unwrap();
        assert!(parsed.get("commit").is_none());
        assert!(parsed.get("vcs").is_none());
    }

    #[test]
    fn zero_calls_do_not_divide() {
        assert_eq!(per_call(1.0, 0), 0.0);
    }
}
