use crate::errors::TortureError;

/// Directory names use one letter per level.
pub const MAX_DIRS_PER_DIR: usize = 26;

/// Places files into a bounded-fan-out directory tree.
///
/// The placement is a mixed-radix counter. Digit 0 counts files in the
/// current directory (radix `files_per_dir`); every higher digit picks a
/// subdirectory at one tree level (radix `dirs_per_dir`). When the most
/// significant digit carries out, the tree grows one level deeper.
#[derive(Debug, Clone)]
pub struct DirSharder {
    files_per_dir: usize,
    dirs_per_dir: usize,
    digits: Vec<usize>,
}

impl DirSharder {
    /// Both radixes must be at least 1, and `dirs_per_dir` at most 26.
    pub fn new(files_per_dir: usize, dirs_per_dir: usize) -> Result<Self, TortureError> {
        check_radixes(files_per_dir, dirs_per_dir)?;
        Ok(Self {
            files_per_dir,
            dirs_per_dir,
            digits: vec![0],
        })
    }

    /// Relative path of the directory the next file goes in, most
    /// significant level first. Empty means the worktree root.
    pub fn current_path(&self) -> String {
        self.digits[1..]
            .iter()
            .rev()
            .map(|&d| char::from(b'a' + d as u8).to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn advance(&mut self) {
        let mut radix = self.files_per_dir;
        for i in 0..self.digits.len() {
            self.digits[i] += 1;
            if self.digits[i] < radix {
                return;
            }
            self.digits[i] = 0;
            radix = self.dirs_per_dir;
        }
        self.digits.push(0);
    }

    /// Returns the current path, then advances.
    pub fn next_dir(&mut self) -> String {
        let path = self.current_path();
        self.advance();
        path
    }

    pub fn depth(&self) -> usize {
        self.digits.len() - 1
    }

    pub fn digits(&self) -> &[usize] {
        &self.digits
    }

    pub fn reset(&mut self) {
        self.digits.clear();
        self.digits.push(0);
    }
}

/// Rejects a tree shape the sharder can't name.
pub fn check_radixes(files_per_dir: usize, dirs_per_dir: usize) -> Result<(), TortureError> {
    let invalid = |name: &'static str, value: usize, reason: &'static str| TortureError::InvalidParameter {
        name,
        value,
        reason,
    };
    if files_per_dir == 0 {
        return Err(invalid("files-per-dir", files_per_dir, "must be at least 1"));
    }
    if dirs_per_dir == 0 {
        return Err(invalid("dirs-per-dir", dirs_per_dir, "must be at least 1"));
    }
    if dirs_per_dir > MAX_DIRS_PER_DIR {
        return Err(invalid("dirs-per-dir", dirs_per_dir, "must be at most 26"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn parent_of(path: &str) -> &str {
        path.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
    }

    #[test]
    fn root_first() {
        let mut sharder = DirSharder::new(2, 2).unwrap();
        assert_eq!(sharder.current_path(), "");
        assert_eq!(sharder.depth(), 0);
        sharder.advance();
        assert_eq!(sharder.current_path(), "");
    }

    #[test]
    fn small_tree_sequence() {
        let mut sharder = DirSharder::new(2, 2).unwrap();
        let got: Vec<String> = (0..14).map(|_| sharder.next_dir()).collect();
        let want = [
            "", "", "a", "a", "b", "b", "a/a", "a/a", "a/b", "a/b", "b/a", "b/a", "b/b", "b/b",
        ];
        assert_eq!(got, want);
        assert_eq!(sharder.current_path(), "a/a/a");
    }

    #[test]
    fn single_subdir_chain() {
        let mut sharder = DirSharder::new(1, 1).unwrap();
        let got: Vec<String> = (0..4).map(|_| sharder.next_dir()).collect();
        assert_eq!(got, ["", "a", "a/a", "a/a/a"]);
    }

    #[test]
    fn digits_stay_below_radix() {
        let mut sharder = DirSharder::new(3, 4).unwrap();
        for _ in 0..5000 {
            sharder.advance();
            let digits = sharder.digits();
            assert!(digits[0] < 3);
            assert!(digits[1..].iter().all(|&d| d < 4));
        }
    }

    #[test]
    fn fan_out_is_bounded() {
        for (files, dirs) in [(1, 1), (2, 2), (3, 5), (48, 16), (5, 26)] {
            let mut sharder = DirSharder::new(files, dirs).unwrap();
            let mut file_counts: HashMap<String, usize> = HashMap::new();
            let mut children: HashMap<String, HashSet<String>> = HashMap::new();

            for _ in 0..3000 {
                let dir = sharder.next_dir();
                *file_counts.entry(dir.clone()).or_default() += 1;

                let mut path = dir.as_str();
                while !path.is_empty() {
                    let parent = parent_of(path);
                    children
                        .entry(parent.to_string())
                        .or_default()
                        .insert(path.to_string());
                    path = parent;
                }
            }

            assert!(file_counts.values().all(|&n| n <= files));
            assert!(children.values().all(|c| c.len() <= dirs));
        }
    }

    #[test]
    fn reset_restarts_at_root() {
        let mut sharder = DirSharder::new(2, 2).unwrap();
        for _ in 0..10 {
            sharder.advance();
        }
        sharder.reset();
        assert_eq!(sharder.current_path(), "");
        assert_eq!(sharder.digits(), &[0]);
    }

    #[test]
    fn unnameable_shapes_rejected() {
        let err = DirSharder::new(4, 27).unwrap_err();
        assert!(matches!(
            err,
            TortureError::InvalidParameter {
                name: "dirs-per-dir",
                value: 27,
                ..
            }
        ));
        assert!(DirSharder::new(0, 4).is_err());
        assert!(DirSharder::new(4, 0).is_err());
        assert!(DirSharder::new(1, MAX_DIRS_PER_DIR).is_ok());
    }

    #[test]
    fn widest_tree_stays_lowercase() {
        let mut sharder = DirSharder::new(1, MAX_DIRS_PER_DIR).unwrap();
        for _ in 0..2000 {
            let path = sharder.next_dir();
            assert!(path.bytes().all(|b| b.is_ascii_lowercase() || b == b'/'));
        }
    }
}
