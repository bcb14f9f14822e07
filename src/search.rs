use crate::corpus::Corpus;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_LIMIT: usize = 200;

/// Paper:section.paragraph citations such as `107:0.1`.
static REFERENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+:\d+\.\d+").expect("valid reference pattern"));

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchOptions {
    pub limit: usize,
    pub case_insensitive: bool,
    /// Trim surrounding whitespace from each line before matching.
    pub trim_lines: bool,
    pub highlight: bool,
    pub extract_reference: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            case_insensitive: false,
            trim_lines: false,
            highlight: false,
            extract_reference: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub line_number: usize,
    pub text: String,
    pub reference: Option<String>,
    pub highlighted: Option<String>,
}

/// A compiled keyword: the keyword as a regex when it compiles, otherwise the
/// escaped literal.
#[derive(Debug, Clone)]
pub struct Matcher {
    regex: Regex,
    literal_fallback: bool,
}

impl Matcher {
    /// Returns `None` when the keyword is empty after trimming whitespace and
    /// byte-order marks.
    ///
    /// Patterns use the `regex` crate dialect, which has no look-around or
    /// backreferences. Keywords such as `신(?=앙)` or `(a)\1` do not compile
    /// there and are matched literally instead.
    pub fn compile(keyword: &str, case_insensitive: bool) -> Option<Self> {
        let key = normalize_keyword(keyword);
        if key.is_empty() {
            return None;
        }
        if let Ok(regex) = RegexBuilder::new(&key)
            .case_insensitive(case_insensitive)
            .build()
        {
            return Some(Self {
                regex,
                literal_fallback: false,
            });
        }
        let regex = RegexBuilder::new(&regex::escape(&key))
            .case_insensitive(case_insensitive)
            .build()
            .ok()?;
        debug!(keyword = %key, "keyword is not a valid pattern, matching literally");
        Some(Self {
            regex,
            literal_fallback: true,
        })
    }

    pub fn is_literal_fallback(&self) -> bool {
        self.literal_fallback
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Wraps each non-empty match in `<mark>` and HTML-escapes everything.
    pub fn highlight_html(&self, text: &str) -> String {
        self.wrap_matches(text, "<mark>", "</mark>", escape_html)
    }

    /// Wraps each non-empty match in `open`/`close` without escaping.
    pub fn highlight_plain(&self, text: &str, open: &str, close: &str) -> String {
        self.wrap_matches(text, open, close, str::to_string)
    }

    /// Like [`Matcher::highlight_plain`], but passes every text segment
    /// (matched or not) through `escape` so only the markers carry markup.
    pub fn highlight_escaped(
        &self,
        text: &str,
        open: &str,
        close: &str,
        escape: fn(&str) -> String,
    ) -> String {
        self.wrap_matches(text, open, close, escape)
    }

    fn wrap_matches(
        &self,
        text: &str,
        open: &str,
        close: &str,
        escape: fn(&str) -> String,
    ) -> String {
        let mut out = String::with_capacity(text.len() + 16);
        let mut last = 0;
        for found in self.regex.find_iter(text) {
            if found.start() == found.end() {
                continue;
            }
            out.push_str(&escape(&text[last..found.start()]));
            out.push_str(open);
            out.push_str(&escape(found.as_str()));
            out.push_str(close);
            last = found.end();
        }
        out.push_str(&escape(&text[last..]));
        out
    }
}

fn normalize_keyword(keyword: &str) -> String {
    keyword.replace('\u{feff}', "").trim().to_string()
}

fn normalize_line(line: &str, trim: bool) -> String {
    let clean = line.replace('\u{feff}', "");
    if trim { clean.trim().to_string() } else { clean }
}

/// Scans `corpus` in document order and returns up to `options.limit`
/// matching lines.
pub fn search(keyword: &str, corpus: &Corpus, options: &SearchOptions) -> Vec<Match> {
    if options.limit == 0 || corpus.is_empty() {
        return Vec::new();
    }
    let Some(matcher) = Matcher::compile(keyword, options.case_insensitive) else {
        return Vec::new();
    };
    let mut results = Vec::new();
    for (line_number, line) in corpus.numbered_lines() {
        let text = normalize_line(line, options.trim_lines);
        if !matcher.is_match(&text) {
            continue;
        }
        let reference = if options.extract_reference {
            extract_reference(&text).map(str::to_string)
        } else {
            None
        };
        let highlighted = options.highlight.then(|| matcher.highlight_html(&text));
        results.push(Match {
            line_number,
            text,
            reference,
            highlighted,
        });
        if results.len() >= options.limit {
            break;
        }
    }
    debug!(
        keyword,
        hits = results.len(),
        literal = matcher.is_literal_fallback(),
        "search complete"
    );
    results
}

/// Returns the first citation-like token (`digits:digits.digits`) in `line`.
pub fn extract_reference(line: &str) -> Option<&str> {
    REFERENCE_PATTERN.find(line).map(|m| m.as_str())
}

/// Renders matches as `"{line}: {text}"` rows.
pub fn format_passages(matches: &[Match]) -> Vec<String> {
    matches
        .iter()
        .map(|m| format!("{}: {}", m.line_number, m.text))
        .collect()
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(lines: &[&str]) -> Corpus {
        Corpus::from_lines(lines.iter().copied())
    }

    fn numbers(matches: &[Match]) -> Vec<usize> {
        matches.iter().map(|m| m.line_number).collect()
    }

    #[test]
    fn finds_lines_in_document_order() {
        let c = corpus(&["alpha one", "beta two", "alpha three"]);
        let hits = search("alpha", &c, &SearchOptions::default());
        let pairs: Vec<_> = hits
            .iter()
            .map(|m| (m.line_number, m.text.as_str()))
            .collect();
        assert_eq!(pairs, vec![(1, "alpha one"), (3, "alpha three")]);
    }

    #[test]
    fn empty_keyword_and_empty_corpus_yield_nothing() {
        let c = corpus(&["alpha"]);
        assert!(search("", &c, &SearchOptions::default()).is_empty());
        assert!(search("  \u{feff} ", &c, &SearchOptions::default()).is_empty());
        assert!(search("alpha", &Corpus::default(), &SearchOptions::default()).is_empty());
    }

    #[test]
    fn case_sensitivity_is_opt_in() {
        let c = corpus(&["Alpha"]);
        assert!(search("alpha", &c, &SearchOptions::default()).is_empty());
        let options = SearchOptions {
            case_insensitive: true,
            highlight: true,
            ..SearchOptions::default()
        };
        let hits = search("alpha", &c, &options);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].highlighted.as_deref(), Some("<mark>Alpha</mark>"));
    }

    #[test]
    fn limit_keeps_earliest_matches() {
        let lines: Vec<String> = (0..50).map(|i| format!("line {i} grace")).collect();
        let c = Corpus::from_lines(lines);
        let options = SearchOptions {
            limit: 5,
            ..SearchOptions::default()
        };
        assert_eq!(numbers(&search("grace", &c, &options)), vec![1, 2, 3, 4, 5]);
        let none = SearchOptions {
            limit: 0,
            ..SearchOptions::default()
        };
        assert!(search("grace", &c, &none).is_empty());
    }

    #[test]
    fn regex_keywords_are_honoured() {
        let c = corpus(&["faith", "fate", "feet"]);
        assert_eq!(
            numbers(&search("fa(i|t)", &c, &SearchOptions::default())),
            vec![1, 2]
        );
    }

    #[test]
    fn invalid_pattern_falls_back_to_literal() {
        let c = corpus(&["price (1", "price 1", "a+b"]);
        let matcher = Matcher::compile("(1", false).unwrap();
        assert!(matcher.is_literal_fallback());
        assert_eq!(numbers(&search("(1", &c, &SearchOptions::default())), vec![1]);
        // A valid pattern is not treated literally.
        assert_eq!(numbers(&search("a+b", &c, &SearchOptions::default())), Vec::<usize>::new());
    }

    #[test]
    fn lookaround_and_backreferences_match_literally() {
        let c = corpus(&["신앙의 도약", "신(?=앙) 그대로"]);
        let lookahead = Matcher::compile("신(?=앙)", false).unwrap();
        assert!(lookahead.is_literal_fallback());
        assert_eq!(numbers(&search("신(?=앙)", &c, &SearchOptions::default())), vec![2]);
        assert!(Matcher::compile(r"(a)\1", false).unwrap().is_literal_fallback());
    }

    #[test]
    fn matches_equal_reference_scan() {
        let c = corpus(&[
            "The Universal Father",
            "Thought Adjuster",
            "",
            "Father and Son",
            "the father",
        ]);
        for keyword in ["Father", "father", "Adj", "o", "zzz", "[", "F.t"] {
            let options = SearchOptions {
                limit: usize::MAX,
                ..SearchOptions::default()
            };
            let matcher = Matcher::compile(keyword, false).unwrap();
            let expected: Vec<usize> = c
                .numbered_lines()
                .filter(|(_, line)| matcher.is_match(line))
                .map(|(n, _)| n)
                .collect();
            let actual = numbers(&search(keyword, &c, &options));
            assert_eq!(actual, expected, "keyword {keyword:?}");
            assert!(actual.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn bom_is_removed_from_lines_and_keyword() {
        let c = corpus(&["\u{feff}신성한 사랑"]);
        let hits = search("\u{feff}신성", &c, &SearchOptions::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "신성한 사랑");
    }

    #[test]
    fn trimming_is_optional() {
        let c = corpus(&["   padded   "]);
        let plain = search("^padded$", &c, &SearchOptions::default());
        assert!(plain.is_empty());
        let trimmed = search(
            "^padded$",
            &c,
            &SearchOptions {
                trim_lines: true,
                ..SearchOptions::default()
            },
        );
        assert_eq!(trimmed[0].text, "padded");
    }

    #[test]
    fn reference_tokens() {
        assert_eq!(extract_reference("see 107:0.1 for more"), Some("107:0.1"));
        assert_eq!(extract_reference("1:2.3 then 4:5.6"), Some("1:2.3"));
        assert_eq!(extract_reference("no citation here 12:3"), None);
        let c = corpus(&["107:0.1 생각조율자는", "조율자"]);
        let hits = search("조율자", &c, &SearchOptions::default());
        assert_eq!(hits[0].reference.as_deref(), Some("107:0.1"));
        assert_eq!(hits[1].reference, None);
    }

    #[test]
    fn highlight_escapes_source_markup() {
        let c = corpus(&["<script>alert('x')</script> & grace"]);
        let options = SearchOptions {
            highlight: true,
            ..SearchOptions::default()
        };
        let hits = search("grace", &c, &options);
        let html = hits[0].highlighted.as_deref().unwrap();
        assert_eq!(
            html,
            "&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt; &amp; <mark>grace</mark>"
        );
        assert!(!html.contains("<script"));
    }

    #[test]
    fn highlight_marks_every_occurrence_and_skips_empty_matches() {
        let matcher = Matcher::compile("a", false).unwrap();
        assert_eq!(
            matcher.highlight_html("banana"),
            "b<mark>a</mark>n<mark>a</mark>n<mark>a</mark>"
        );
        let star = Matcher::compile("x*", false).unwrap();
        assert_eq!(star.highlight_html("a<b"), "a&lt;b");
        assert_eq!(matcher.highlight_plain("a<b", "**", "**"), "**a**<b");
    }

    #[test]
    fn escaped_highlight_only_marks_matches() {
        let matcher = Matcher::compile("grace", false).unwrap();
        let out = matcher.highlight_escaped("a*b grace", "[", "]", |s| s.replace('*', "\\*"));
        assert_eq!(out, "a\\*b [grace]");
    }

    #[test]
    fn format_passages_prefixes_line_numbers() {
        let c = corpus(&["alpha", "beta"]);
        let hits = search("beta", &c, &SearchOptions::default());
        assert_eq!(format_passages(&hits), vec!["2: beta".to_string()]);
    }
}
