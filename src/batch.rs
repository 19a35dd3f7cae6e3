/// Longest argument list we hand to a single VCS invocation. These are well
/// under the real OS limits.
#[cfg(windows)]
pub const MAX_CMDLINE: usize = 2000;
#[cfg(not(windows))]
pub const MAX_CMDLINE: usize = 8000;

/// Bytes between arguments on the command line.
const SEPARATOR_LEN: usize = 1;

/// Size a path adds to a command line.
pub fn encoded_len(path: &str) -> usize {
    SEPARATOR_LEN + path.len()
}

/// Splits `paths` into consecutive runs whose encoded size fits `max_len`.
///
/// A path too long to fit on its own is still yielded, alone in its batch.
pub fn batches<S: AsRef<str>>(paths: &[S], max_len: usize) -> Batches<'_, S> {
    Batches {
        rest: paths,
        max_len,
    }
}

#[derive(Debug)]
pub struct Batches<'a, S> {
    rest: &'a [S],
    max_len: usize,
}

impl<'a, S: AsRef<str>> Iterator for Batches<'a, S> {
    type Item = &'a [S];

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let mut size = 0;
        let mut count = 0;
        for path in self.rest {
            let len = encoded_len(path.as_ref());
            if count > 0 && size + len > self.max_len {
                break;
            }
            size += len;
            count += 1;
        }

        let (batch, rest) = self.rest.split_at(count);
        self.rest = rest;
        Some(batch)
    }
}
