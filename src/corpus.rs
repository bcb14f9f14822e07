use encoding_rs::{EUC_KR, Encoding, UTF_8, WINDOWS_1252};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_CANDIDATES: &[&str] = &["urantia_ko.txt", "urantia_kr.txt", "urantia.txt"];
const BOM: char = '\u{feff}';
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Encodings attempted, in order, when decoding a corpus file.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TextEncoding {
    Utf8,
    Utf8Bom,
    /// CP949, the superset of EUC-KR used by legacy Korean text files.
    EucKr,
    /// Maps every byte, so it always succeeds.
    Latin1,
}

impl TextEncoding {
    pub const LADDER: [TextEncoding; 4] = [
        TextEncoding::Utf8,
        TextEncoding::Utf8Bom,
        TextEncoding::EucKr,
        TextEncoding::Latin1,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf8Bom => "utf-8-sig",
            TextEncoding::EucKr => "cp949",
            TextEncoding::Latin1 => "latin-1",
        }
    }

    fn decode(self, bytes: &[u8]) -> Option<String> {
        let (encoding, payload): (&'static Encoding, &[u8]) = match self {
            TextEncoding::Utf8 => (UTF_8, bytes),
            TextEncoding::Utf8Bom => (UTF_8, bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)),
            TextEncoding::EucKr => (EUC_KR, bytes),
            TextEncoding::Latin1 => (WINDOWS_1252, bytes),
        };
        encoding
            .decode_without_bom_handling_and_without_replacement(payload)
            .map(|text| text.into_owned())
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Decodes raw bytes with the first encoding in [`TextEncoding::LADDER`] that
/// accepts them without malformed sequences.
pub fn decode_text(bytes: &[u8]) -> Option<(String, TextEncoding)> {
    TextEncoding::LADDER
        .iter()
        .find_map(|&encoding| encoding.decode(bytes).map(|text| (text, encoding)))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Drop lines that are empty after trimming whitespace.
    pub skip_blank_lines: bool,
}

/// Finds the corpus file among a fixed list of candidate names.
#[derive(Debug, Clone)]
pub struct CorpusLocator {
    pub data_dir: PathBuf,
    pub candidates: Vec<String>,
}

impl Default for CorpusLocator {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

impl CorpusLocator {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            candidates: DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Every path the locator will try, in priority order.
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        self.candidates
            .iter()
            .map(|name| self.data_dir.join(name))
            .collect()
    }

    /// Returns the first candidate that exists on disk.
    pub fn locate(&self) -> Option<PathBuf> {
        self.candidate_paths().into_iter().find(|path| path.is_file())
    }
}

/// An ordered, 1-indexed, immutable sequence of corpus lines.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    lines: Vec<String>,
    encoding: Option<TextEncoding>,
}

impl Corpus {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            encoding: None,
        }
    }

    /// Splits decoded text into lines, removing byte-order marks and line
    /// terminators. `\r\n`, `\n` and a lone `\r` all end a line.
    pub fn from_text(text: &str, options: LoadOptions) -> Self {
        let lines = text
            .replace("\r\n", "\n")
            .replace('\r', "\n")
            .lines()
            .map(|line| line.replace(BOM, ""))
            .filter(|line| !options.skip_blank_lines || !line.trim().is_empty())
            .collect();
        Self {
            lines,
            encoding: None,
        }
    }

    /// Reads and decodes `path`. Never fails: unreadable or undecodable files
    /// yield an empty corpus, which callers report as "data unavailable".
    pub fn load(path: &Path, options: LoadOptions) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read corpus file");
                return Self::default();
            }
        };
        let Some((text, encoding)) = decode_text(&bytes) else {
            warn!(path = %path.display(), "no candidate encoding could decode corpus");
            return Self::default();
        };
        debug!(path = %path.display(), %encoding, bytes = bytes.len(), "decoded corpus");
        let mut corpus = Self::from_text(&text, options);
        corpus.encoding = Some(encoding);
        corpus
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Encoding that decoded the file, when loaded from disk.
    pub fn encoding(&self) -> Option<TextEncoding> {
        self.encoding
    }

    /// Returns line `number` (1-indexed).
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|idx| self.lines.get(idx))
            .map(String::as_str)
    }

    /// Iterates `(line number, text)` pairs in document order.
    pub fn numbered_lines(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.as_str()))
    }

    pub fn preview(&self, count: usize) -> &[String] {
        &self.lines[..count.min(self.lines.len())]
    }
}

/// Outcome of locating and loading the corpus.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CorpusStatus {
    Ready { path: PathBuf, lines: usize },
    /// None of the candidate files exist.
    Missing { searched: Vec<PathBuf> },
    /// A file exists but produced no lines.
    Unreadable { path: PathBuf },
}

impl CorpusStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, CorpusStatus::Ready { .. })
    }
}

impl fmt::Display for CorpusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorpusStatus::Ready { path, lines } => {
                write!(f, "loaded {lines} lines from {}", path.display())
            }
            CorpusStatus::Missing { searched } => {
                let names = searched
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "no corpus file found (looked for {names}); add one and restart")
            }
            CorpusStatus::Unreadable { path } => write!(
                f,
                "{} was found but is empty or could not be decoded (tried utf-8, cp949, latin-1)",
                path.display()
            ),
        }
    }
}

pub fn load_corpus(locator: &CorpusLocator, options: LoadOptions) -> (Corpus, CorpusStatus) {
    let Some(path) = locator.locate() else {
        let searched = locator.candidate_paths();
        warn!(dir = %locator.data_dir.display(), "no corpus candidate found");
        return (Corpus::default(), CorpusStatus::Missing { searched });
    };
    let corpus = Corpus::load(&path, options);
    if corpus.is_empty() {
        return (corpus, CorpusStatus::Unreadable { path });
    }
    info!(
        path = %path.display(),
        lines = corpus.len(),
        encoding = ?corpus.encoding().map(TextEncoding::label),
        "corpus loaded"
    );
    let lines = corpus.len();
    (corpus, CorpusStatus::Ready { path, lines })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn utf8_with_bom_is_stripped() {
        let (text, encoding) = decode_text("\u{feff}첫째 줄\n둘째 줄\n".as_bytes()).unwrap();
        assert_eq!(encoding, TextEncoding::Utf8);
        let corpus = Corpus::from_text(&text, LoadOptions::default());
        assert_eq!(corpus.line(1), Some("첫째 줄"));
        assert_eq!(corpus.line(2), Some("둘째 줄"));
        assert_eq!(corpus.len(), 2);
    }

    #[test]
    fn euc_kr_bytes_fall_through_to_cp949() {
        let (bytes, _, _) = EUC_KR.encode("우주 아버지");
        let (text, encoding) = decode_text(&bytes).unwrap();
        assert_eq!(encoding, TextEncoding::EucKr);
        assert_eq!(text, "우주 아버지");
    }

    #[test]
    fn latin1_always_decodes() {
        // 0xFF is invalid as UTF-8 and as a CP949 lead byte.
        let (text, encoding) = decode_text(&[b'a', 0xFF]).unwrap();
        assert_eq!(encoding, TextEncoding::Latin1);
        assert_eq!(text, "aÿ");
    }

    #[test]
    fn lone_carriage_returns_split_lines() {
        let corpus = Corpus::from_text("a\rb\rc", LoadOptions::default());
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.line(2), Some("b"));

        let mixed = Corpus::from_text("first line\rsecond line\r\nthird\n", LoadOptions::default());
        assert_eq!(mixed.len(), 3);
        let hits = crate::search::search("second", &mixed, &crate::SearchOptions::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line_number, 2);
    }

    #[test]
    fn crlf_and_blank_lines() {
        let text = "one\r\n\r\n   \r\ntwo\r\n";
        let keep = Corpus::from_text(text, LoadOptions::default());
        assert_eq!(keep.len(), 4);
        assert_eq!(keep.line(4), Some("two"));
        let skip = Corpus::from_text(
            text,
            LoadOptions {
                skip_blank_lines: true,
            },
        );
        assert_eq!(skip.len(), 2);
        assert_eq!(skip.line(2), Some("two"));
    }

    #[test]
    fn line_numbers_are_one_based() {
        let corpus = Corpus::from_lines(["a", "b"]);
        assert_eq!(corpus.line(0), None);
        assert_eq!(corpus.line(1), Some("a"));
        assert_eq!(corpus.line(3), None);
        let numbered: Vec<_> = corpus.numbered_lines().collect();
        assert_eq!(numbered, vec![(1, "a"), (2, "b")]);
    }

    #[test]
    fn locator_respects_priority() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("urantia.txt"), "fallback").unwrap();
        fs::write(dir.path().join("urantia_kr.txt"), "preferred").unwrap();
        let locator = CorpusLocator::new(dir.path());
        assert_eq!(locator.locate(), Some(dir.path().join("urantia_kr.txt")));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempdir().unwrap();
        let (corpus, status) = load_corpus(&CorpusLocator::new(dir.path()), LoadOptions::default());
        assert!(corpus.is_empty());
        match status {
            CorpusStatus::Missing { searched } => assert_eq!(searched.len(), 3),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_unreadable_not_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("urantia_ko.txt");
        fs::write(&path, "").unwrap();
        let (_, status) = load_corpus(&CorpusLocator::new(dir.path()), LoadOptions::default());
        assert_eq!(status, CorpusStatus::Unreadable { path });
    }

    #[test]
    fn load_reads_file_and_records_encoding() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("urantia_ko.txt");
        fs::write(&path, "0:0.1 신성\n107:0.1 조율자\n").unwrap();
        let (corpus, status) = load_corpus(&CorpusLocator::new(dir.path()), LoadOptions::default());
        assert!(status.is_ready());
        assert_eq!(corpus.encoding(), Some(TextEncoding::Utf8));
        assert_eq!(corpus.preview(5).len(), 2);
    }

    #[test]
    fn load_of_nonexistent_path_is_empty() {
        let corpus = Corpus::load(Path::new("/definitely/not/here.txt"), LoadOptions::default());
        assert!(corpus.is_empty());
    }
}
