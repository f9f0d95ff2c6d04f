/// Formatting of find output.
///
/// Every match becomes one line of the form
///
/// ```text
/// <file>:<line>:<line text>
/// ```
///
/// where `<file>` is relative to the directory find was started from and
/// `<line>` is 1-based. Each chunk gets its own [`LineFormatter`] writing
/// into that chunk's slot buffer, so formatting never contends with other
/// workers.
use std::fmt::Write;

/// A single content match reported by the matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchInfo<'a> {
    /// Display path of the file (search-root prefix already removed)
    pub file: &'a str,
    /// 1-based line number
    pub line: usize,
    /// Full content of the file the match was found in
    pub content: &'a str,
    /// Byte offset where the matching line starts
    pub line_start: usize,
    /// Byte offset of the line's `\n`, or the end of content
    pub line_end: usize,
}

impl<'a> MatchInfo<'a> {
    /// The matching line without its terminator
    pub fn line_text(&self) -> &'a str {
        &self.content[self.line_start..self.line_end]
    }

    /// Offset of the first byte after this line
    pub fn next_line_start(&self) -> usize {
        (self.line_end + 1).min(self.content.len())
    }
}

/// Callback invoked by the matcher once per match.
///
/// Returns the offset in `m.content` where scanning should resume.
pub trait MatchReceiver {
    fn on_match(&mut self, m: &MatchInfo<'_>) -> usize;
}

/// Appends `<file>:<line>:<text>` lines to a chunk's output buffer
#[derive(Debug)]
pub struct LineFormatter<'o> {
    out: &'o mut String,
    trim: bool,
    matches: usize,
}

impl<'o> LineFormatter<'o> {
    pub fn new(out: &'o mut String, trim: bool) -> Self {
        Self {
            out,
            trim,
            matches: 0,
        }
    }

    /// Number of lines written so far
    pub fn matches(&self) -> usize {
        self.matches
    }
}

impl MatchReceiver for LineFormatter<'_> {
    fn on_match(&mut self, m: &MatchInfo<'_>) -> usize {
        let mut text = m.line_text();
        if self.trim {
            text = text.trim_start_matches([' ', '\t']);
        }

        // Writing into a String cannot fail.
        let _ = writeln!(self.out, "{}:{}:{}", m.file, m.line, text);
        self.matches += 1;

        m.next_line_start()
    }
}
