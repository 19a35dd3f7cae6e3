use crate::errors::TortureError;

const NAME_ATOMS: [&str; 16] = [
    "at", "bi", "do", "ex", "fa", "go", "hi", "if", "ja", "ki", "lo", "me", "no", "of", "pi", "qi",
];

const CONTENT_ATOMS: [&str; 32] = [
    "include", "for", "each", "int", "call", "lang", "operation", "overflow", "add", "multiply",
    "sub", "divide", "float", "array", "{", "}", "goto", "return", "range", "make", "byte", "var",
    "sizeof", "sink", "[", "]", "(", ")", "append", "copy", ":=", "==",
];

/// Soft line width of generated content.
const LINE_COLUMNS: usize = 100;

/// Produces a deterministic sequence of unique, filesystem-safe names.
#[derive(Debug, Default)]
pub struct NameGenerator {
    next: usize,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the name for the current ordinal and advances.
    ///
    /// The ordinal is written in base 16, one atom per digit, least
    /// significant first: 0 is `at`, 17 is `bi_bi`.
    pub fn next_unique_name(&mut self) -> String {
        let name = encode_name(self.next);
        self.next += 1;
        name
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

fn encode_name(mut nth: usize) -> String {
    let mut fragments = Vec::new();
    while nth >= 16 {
        fragments.push(NAME_ATOMS[nth % 16]);
        nth >>= 4;
    }
    fragments.push(NAME_ATOMS[nth]);
    fragments.join("_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn native() -> Self {
        if cfg!(windows) {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }

    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

/// Builds `size` bytes of code-like text using the platform line ending.
pub fn make_content(size: usize, ordinal: u64) -> Result<Vec<u8>, TortureError> {
    make_content_with(size, ordinal, LineEnding::native())
}

/// Builds `size` bytes of code-like text. The same `(size, ordinal)` always
/// produces the same bytes, and the output always ends with `ending`.
pub fn make_content_with(
    size: usize,
    ordinal: u64,
    ending: LineEnding,
) -> Result<Vec<u8>, TortureError> {
    let eol = ending.as_bytes();
    let mut content = Vec::with_capacity(size);
    // Signed, so the right shift of the rotate sign-extends.
    let mut state = ordinal as i64;
    let mut col = 0;

    while content.len() < size {
        // Tokens are at least two bytes, so a full column always has room to
        // overwrite with the terminator.
        if col >= LINE_COLUMNS {
            let at = content.len() - eol.len();
            content[at..].copy_from_slice(eol);
            col = 0;
        }

        let atom = CONTENT_ATOMS[(state & 31) as usize].as_bytes();
        state = ((state << 27) | (state >> 5))
            .wrapping_add(state)
            .wrapping_add(13);

        let room = size - content.len();
        if atom.len() < room {
            content.extend_from_slice(atom);
            content.push(b' ');
            col += atom.len() + 1;
        } else {
            content.extend_from_slice(&atom[..room]);
            col += room;
        }
    }

    let tail = eol.len().min(size);
    content[size - tail..].copy_from_slice(&eol[eol.len() - tail..]);

    if content.len() != size {
        return Err(TortureError::ContentSize {
            expected: size,
            actual: content.len(),
        });
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn first_names() {
        let mut names = NameGenerator::new();
        let got: Vec<String> = (0..18).map(|_| names.next_unique_name()).collect();
        assert_eq!(got[0], "at");
        assert_eq!(got[1], "bi");
        assert_eq!(got[15], "qi");
        assert_eq!(got[16], "at_bi");
        assert_eq!(got[17], "bi_bi");
    }

    #[test]
    fn three_atom_name() {
        // 0x123 -> digits 3, 2, 1 least significant first
        assert_eq!(encode_name(0x123), "ex_do_bi");
    }

    #[test]
    fn names_repeat_after_reset() {
        let mut names = NameGenerator::new();
        let first: Vec<String> = (0..300).map(|_| names.next_unique_name()).collect();
        names.reset();
        let second: Vec<String> = (0..300).map(|_| names.next_unique_name()).collect();
        assert_eq!(first, second);

        let mut fresh = NameGenerator::new();
        let third: Vec<String> = (0..300).map(|_| fresh.next_unique_name()).collect();
        assert_eq!(first, third);
    }

    #[test]
    fn names_are_unique() {
        let mut names = NameGenerator::new();
        let set: HashSet<String> = (0..5000).map(|_| names.next_unique_name()).collect();
        assert_eq!(set.len(), 5000);
    }

    #[test]
    fn names_are_filesystem_safe() {
        let mut names = NameGenerator::new();
        for _ in 0..1000 {
            let name = names.next_unique_name();
            assert!(name.bytes().all(|b| b.is_ascii_lowercase() || b == b'_'));
        }
    }

    #[test]
    fn content_has_exact_size_lf() {
        for size in 2..400 {
            let content = make_content_with(size, size as u64, LineEnding::Lf).unwrap();
            assert_eq!(content.len(), size);
            assert_eq!(content[size - 1], b'\n');
        }
    }

    #[test]
    fn content_has_exact_size_crlf() {
        for size in 2..400 {
            let content = make_content_with(size, 7, LineEnding::CrLf).unwrap();
            assert_eq!(content.len(), size);
            assert_eq!(&content[size - 2..], b"\r\n");
        }
    }

    #[test]
    fn tiny_sizes() {
        assert!(make_content_with(0, 0, LineEnding::Lf).unwrap().is_empty());
        assert_eq!(make_content_with(1, 0, LineEnding::Lf).unwrap(), b"\n");
        assert_eq!(make_content_with(1, 0, LineEnding::CrLf).unwrap(), b"\n");
    }

    #[test]
    fn content_is_deterministic() {
        let a = make_content_with(10000, 42, LineEnding::Lf).unwrap();
        let b = make_content_with(10000, 42, LineEnding::Lf).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_ordinals_differ() {
        let a = make_content_with(2000, 1, LineEnding::Lf).unwrap();
        let b = make_content_with(2000, 2, LineEnding::Lf).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn lines_are_bounded() {
        let content = make_content_with(20000, 3, LineEnding::Lf).unwrap();
        let text = String::from_utf8(content).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines.len() > 100);
        for line in lines {
            // a line breaks at the first token that reaches column 100
            assert!(line.len() < LINE_COLUMNS + 10, "line too long: {}", line.len());
        }
    }

    #[test]
    fn first_token_comes_from_ordinal() {
        let content = make_content_with(50, 0, LineEnding::Lf).unwrap();
        assert!(content.starts_with(b"include "));
        let content = make_content_with(50, 1, LineEnding::Lf).unwrap();
        assert!(content.starts_with(b"for "));
    }

    #[test]
    fn token_stream_is_pinned() {
        // Long enough for the state to go negative and wrap a line.
        let content = make_content_with(10000, 0, LineEnding::Lf).unwrap();
        assert_eq!(
            &content[..200],
            "include array ( overflow var int range var range ) operation call array lang float ) \
             == { [ var return\nreturn sink == make sizeof make var append make sizeof var ] copy \
             ( include add ) byte sizeof arr"
                .as_bytes()
        );

        let content = make_content_with(10000, 1, LineEnding::Lf).unwrap();
        assert_eq!(
            &content[..120],
            "for { ) add sizeof call sink range call var } append append { divide == include \
             operation ( float int\noperation copy div"
                .as_bytes()
        );
    }
}
