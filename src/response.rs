use std::path::{Path, PathBuf};

use crate::errors::TortureError;

/// How deeply response files may include other response files.
const MAX_DEPTH: usize = 16;

/// Replaces each `@file` argument with the lines of that file, one argument
/// per line. Expanded arguments are scanned again, so response files may
/// name other response files. A lone `@` is kept as is.
pub fn expand_args<I>(args: I) -> Result<Vec<String>, TortureError>
where
    I: IntoIterator<Item = String>,
{
    let mut out = Vec::new();
    for arg in args {
        expand_one(arg, 0, &mut out)?;
    }
    Ok(out)
}

fn expand_one(arg: String, depth: usize, out: &mut Vec<String>) -> Result<(), TortureError> {
    let Some(path) = response_path(&arg) else {
        out.push(arg);
        return Ok(());
    };
    if depth >= MAX_DEPTH {
        return Err(TortureError::ResponseFileDepth { max: MAX_DEPTH });
    }
    for line in read_lines(&path)? {
        expand_one(line, depth + 1, out)?;
    }
    Ok(())
}

fn response_path(arg: &str) -> Option<PathBuf> {
    match arg.strip_prefix('@') {
        Some(rest) if !rest.is_empty() => Some(PathBuf::from(rest)),
        _ => None,
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, TortureError> {
    let text = std::fs::read_to_string(path).map_err(|source| TortureError::ResponseFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text.lines().map(|l| l.to_string()).collect())
}
