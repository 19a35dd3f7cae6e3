use std::io::{self, Write};
use std::time::{Duration, Instant};

use owo_colors::{OwoColorize, Stream};

const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_COLUMNS: usize = 100;

/// A single status line, rewritten in place and rate-limited so a fast loop
/// doesn't flood the terminal.
pub struct PeriodicStatus<W: Write = io::Stderr> {
    start: Instant,
    last: Instant,
    interval: Duration,
    cols: usize,
    out: W,
    paint_stamp: fn(&str) -> String,
}

impl PeriodicStatus {
    /// Status line on stderr, with the timestamp dimmed when stderr takes
    /// colour. `start` is the origin for `T+` timestamps.
    pub fn stderr(start: Instant, interval: Duration) -> Self {
        let mut status = Self::new(io::stderr(), start, interval, terminal_columns());
        status.paint_stamp = dim_on_stderr;
        status
    }
}

fn dim_on_stderr(stamp: &str) -> String {
    stamp
        .if_supports_color(Stream::Stderr, |s| s.dimmed())
        .to_string()
}

impl<W: Write> PeriodicStatus<W> {
    /// Plain-text status on `out`. A zero `interval` or `cols` falls back to
    /// 100ms and 100 columns.
    pub fn new(out: W, start: Instant, interval: Duration, cols: usize) -> Self {
        Self {
            start,
            last: Instant::now(),
            interval: if interval.is_zero() {
                DEFAULT_INTERVAL
            } else {
                interval
            },
            cols: if cols == 0 { DEFAULT_COLUMNS } else { cols },
            out,
            paint_stamp: str::to_string,
        }
    }

    /// True once `interval` has passed since the last update.
    pub fn ready(&self) -> bool {
        self.last.elapsed() >= self.interval
    }

    pub fn show(&mut self, message: &str) {
        let line = format_status(self.start.elapsed(), message, self.cols);
        let stamp_len = line.find(':').map_or(0, |i| i + 1);
        let (stamp, rest) = line.split_at(stamp_len);
        // The status line is best effort; a closed stderr must not stop a run.
        let _ = write!(self.out, "\r{}{}", (self.paint_stamp)(stamp), rest);
        let _ = self.out.flush();
        self.last = Instant::now();
    }

    /// Ends the status line.
    pub fn finish(&mut self) {
        let _ = writeln!(self.out);
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// `T+<seconds>: <message>`, padded with spaces to `cols - 1` so a shorter
/// line fully covers a longer previous one.
pub fn format_status(since_start: Duration, message: &str, cols: usize) -> String {
    let line = format!("T+{:.2}: {}", since_start.as_secs_f64(), message);
    let width = cols.saturating_sub(1);
    format!("{line:<width$}")
}

/// Shortens paths over 39 characters to their first and last 18.
pub fn elide_path(path: &str) -> String {
    let chars: Vec<char> = path.chars().collect();
    if chars.len() <= 39 {
        return path.to_string();
    }
    let head: String = chars[..18].iter().collect();
    let tail: String = chars[chars.len() - 18..].iter().collect();
    format!("{head}...{tail}")
}

/// Terminal width from `COLUMNS`, or 100.
pub fn terminal_columns() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.trim().parse().ok())
        .filter(|&c| c > 0)
        .unwrap_or(DEFAULT_COLUMNS)
}
