use regex::{Regex, RegexBuilder};
use std::path::{Component, Path};
use tracing::debug;

use crate::database::DbChunk;
use crate::errors::{unify_path, CodeDbError, CodeDbResult};
use crate::results::{MatchInfo, MatchReceiver};

/// How a content pattern is compiled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternOptions {
    /// Match the pattern as a literal string (`-v`)
    pub literal: bool,
    /// Case-insensitive content match (`-i`)
    pub ignore_case: bool,
    /// Case-insensitive file path match (`nocase-file-match`)
    pub nocase_file: bool,
}

/// Restriction of a pass to part of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    /// Regex matched against stored paths; empty matches everything
    pub pattern: String,
    /// Bytes stripped from stored paths when printing
    pub prefix_len: usize,
}

impl FileFilter {
    pub fn everything() -> Self {
        Self {
            pattern: String::new(),
            prefix_len: 0,
        }
    }

    /// Limits results to files under `search_root` unless `all_paths` is set.
    ///
    /// Stored paths are relative to `db_root`; printed paths become relative
    /// to `search_root`.
    pub fn for_search_root(
        search_root: &Path,
        db_root: &Path,
        all_paths: bool,
    ) -> CodeDbResult<Self> {
        let search_root = unify_path(search_root);
        let db_root = unify_path(db_root);
        if all_paths || search_root == db_root {
            return Ok(Self::everything());
        }

        let relative = search_root.strip_prefix(&db_root).map_err(|_| {
            CodeDbError::database_error(format!(
                "{} is outside the database root {}",
                search_root.display(),
                db_root.display()
            ))
        })?;

        let relative = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        let prefix = format!("{}/", relative);

        Ok(Self {
            pattern: format!("^{}.*", regex::escape(&prefix)),
            prefix_len: prefix.len(),
        })
    }
}

/// Compiled content and file patterns shared by every worker of one pass
#[derive(Debug, Clone)]
pub struct PatternPair {
    pub content: Regex,
    pub file: Regex,
    pub prefix_len: usize,
}

impl PatternPair {
    pub fn compile(
        pattern: &str,
        filter: &FileFilter,
        options: PatternOptions,
    ) -> CodeDbResult<Self> {
        let source = if options.literal {
            regex::escape(pattern)
        } else {
            pattern.to_string()
        };
        debug!("Compiling content pattern: {}", source);

        let content = RegexBuilder::new(&source)
            .case_insensitive(options.ignore_case)
            .multi_line(true)
            .build()
            .map_err(|e| CodeDbError::invalid_pattern(e.to_string()))?;

        let file = RegexBuilder::new(&filter.pattern)
            .case_insensitive(options.nocase_file)
            .build()
            .map_err(|e| CodeDbError::invalid_pattern(format!("file filter: {}", e)))?;

        Ok(Self {
            content,
            file,
            prefix_len: filter.prefix_len,
        })
    }
}

/// Scans every file of `chunk` accepted by the file pattern.
///
/// The receiver sees matches top to bottom, at most once per call per
/// resume point it returns. Returns the number of matches reported.
pub fn search_chunk<R: MatchReceiver>(
    chunk: &DbChunk<'_>,
    patterns: &PatternPair,
    receiver: &mut R,
) -> CodeDbResult<usize> {
    let mut reported = 0;

    for file in chunk.files() {
        let file = file?;
        if !patterns.file.is_match(file.path) {
            continue;
        }
        let display = file.path.get(patterns.prefix_len..).unwrap_or(file.path);
        reported += search_content(display, file.content, &patterns.content, receiver);
    }

    Ok(reported)
}

fn search_content<R: MatchReceiver>(
    file: &str,
    content: &str,
    regex: &Regex,
    receiver: &mut R,
) -> usize {
    let mut reported = 0;
    let mut pos = 0;
    let mut line = 1;
    let mut counted_to = 0;

    while pos < content.len() {
        let Some(found) = regex.find_at(content, pos) else {
            break;
        };
        let start = found.start();
        // The empty text after a trailing newline is not a line.
        if start == content.len() && content.ends_with('\n') {
            break;
        }

        let line_start = content[..start].rfind('\n').map_or(0, |i| i + 1);
        let line_end = content[start..]
            .find('\n')
            .map_or(content.len(), |i| start + i);

        line += content.as_bytes()[counted_to..line_start]
            .iter()
            .filter(|&&b| b == b'\n')
            .count();
        counted_to = line_start;

        let info = MatchInfo {
            file,
            line,
            content,
            line_start,
            line_end,
        };
        let resume = receiver.on_match(&info);
        reported += 1;

        // Never report the same line twice, whatever the receiver asks for.
        pos = resume.max(line_end + 1);
    }

    reported
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::chunk::encode_file;
    use crate::results::LineFormatter;
    use tempfile::tempdir;

    fn chunk_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut raw = Vec::new();
        for (path, content) in files {
            encode_file(&mut raw, path, content);
        }
        raw
    }

    fn run(
        files: &[(&str, &str)],
        pattern: &str,
        filter: &FileFilter,
        options: PatternOptions,
    ) -> String {
        let raw = chunk_bytes(files);
        let chunk = DbChunk::from_bytes(&raw).unwrap();
        let patterns = PatternPair::compile(pattern, filter, options).unwrap();
        let mut out = String::new();
        let mut formatter = LineFormatter::new(&mut out, false);
        search_chunk(&chunk, &patterns, &mut formatter).unwrap();
        out
    }

    #[test]
    fn test_line_numbers_and_order() {
        let files = [
            ("a.rs", "fn one() {}\n// TODO first\nlet x;\n// TODO second\n"),
            ("b.rs", "TODO at top"),
        ];
        let out = run(&files, "TODO", &FileFilter::everything(), PatternOptions::default());
        assert_eq!(out, "a.rs:2:// TODO first\na.rs:4:// TODO second\nb.rs:1:TODO at top\n");
    }

    #[test]
    fn test_one_report_per_line() {
        let files = [("a.txt", "aaa\nbab\nccc")];
        let out = run(&files, "a", &FileFilter::everything(), PatternOptions::default());
        assert_eq!(out, "a.txt:1:aaa\na.txt:2:bab\n");
    }

    #[test]
    fn test_anchors_and_empty_pattern() {
        let files = [("a.txt", "x\n\ny")];
        let out = run(&files, "^$", &FileFilter::everything(), PatternOptions::default());
        assert_eq!(out, "a.txt:2:\n");

        let out = run(&files, "", &FileFilter::everything(), PatternOptions::default());
        assert_eq!(out, "a.txt:1:x\na.txt:2:\na.txt:3:y\n");

        let out = run(&[("empty", "")], "", &FileFilter::everything(), PatternOptions::default());
        assert!(out.is_empty());
    }

    #[test]
    fn test_no_line_after_trailing_newline() {
        let everything = FileFilter::everything();
        let options = PatternOptions::default();

        assert_eq!(run(&[("a.txt", "x\n")], "^$", &everything, options), "");
        assert_eq!(run(&[("a.txt", "one\ntwo\n")], r"^\s*$", &everything, options), "");
        assert_eq!(run(&[("a.txt", "one\n")], r"\z", &everything, options), "");
        assert_eq!(run(&[("a.txt", "one\n")], "", &everything, options), "a.txt:1:one\n");

        // A final line without a newline is still a line.
        assert_eq!(run(&[("a.txt", "one\n\n")], "^$", &everything, options), "a.txt:2:\n");
        assert_eq!(run(&[("a.txt", "one")], r"\z", &everything, options), "a.txt:1:one\n");
    }

    #[test]
    fn test_literal_and_case_options() {
        let files = [("a.txt", "call foo.bar()\nfooXbar\nFOO.BAR\n")];
        let regex = run(&files, "foo.bar", &FileFilter::everything(), PatternOptions::default());
        assert_eq!(regex, "a.txt:1:call foo.bar()\na.txt:2:fooXbar\n");

        let literal = PatternOptions { literal: true, ..Default::default() };
        let out = run(&files, "foo.bar", &FileFilter::everything(), literal);
        assert_eq!(out, "a.txt:1:call foo.bar()\n");

        let nocase = PatternOptions { literal: true, ignore_case: true, ..Default::default() };
        let out = run(&files, "foo.bar", &FileFilter::everything(), nocase);
        assert_eq!(out, "a.txt:1:call foo.bar()\na.txt:3:FOO.BAR\n");
    }

    #[test]
    fn test_file_filter_restricts_and_strips_prefix() {
        let files = [
            ("src/lib.rs", "needle\n"),
            ("src/deep/mod.rs", "needle\n"),
            ("srcx/other.rs", "needle\n"),
            ("SRC/upper.rs", "needle\n"),
        ];
        let filter = FileFilter {
            pattern: format!("^{}.*", regex::escape("src/")),
            prefix_len: 4,
        };
        let out = run(&files, "needle", &filter, PatternOptions::default());
        assert_eq!(out, "lib.rs:1:needle\ndeep/mod.rs:1:needle\n");

        let nocase = PatternOptions { nocase_file: true, ..Default::default() };
        let out = run(&files, "needle", &filter, nocase);
        assert_eq!(out, "lib.rs:1:needle\ndeep/mod.rs:1:needle\nupper.rs:1:needle\n");
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PatternPair::compile(
            "(unclosed",
            &FileFilter::everything(),
            PatternOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CodeDbError::InvalidPattern(_)));

        let literal = PatternOptions { literal: true, ..Default::default() };
        assert!(PatternPair::compile("(unclosed", &FileFilter::everything(), literal).is_ok());
    }

    #[test]
    fn test_filter_for_search_root() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let sub = root.join("src").join("search");
        std::fs::create_dir_all(&sub).unwrap();

        assert_eq!(
            FileFilter::for_search_root(root, root, false).unwrap(),
            FileFilter::everything()
        );
        assert_eq!(
            FileFilter::for_search_root(&sub, root, true).unwrap(),
            FileFilter::everything()
        );

        let filter = FileFilter::for_search_root(&sub, root, false).unwrap();
        assert_eq!(filter.pattern, format!("^{}.*", regex::escape("src/search/")));
        assert_eq!(filter.prefix_len, "src/search/".len());

        let outside = tempdir().unwrap();
        assert!(FileFilter::for_search_root(outside.path(), root, false).is_err());
    }
}
