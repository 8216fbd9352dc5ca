//! Parser for the output of the extent-query utility (`filefrag -e`).
//!
//! The utility prints one block per queried file:
//!
//! ```text
//! File size of movie.mkv is 5120 (2 blocks of 4096 bytes)
//!  ext:     logical_offset:        physical_offset: length:   expected: flags:
//!    0:        0..       1:        100..       101:      2:             last,eligible
//! movie.mkv: 1 extent found
//! ```
//!
//! Parsing is a three-state line machine; any deviation aborts ingestion of
//! the directory whose listing is being read, nothing more.

use crate::error::ExtentError;
use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

use super::extent::Extent;

/// Literal column header between a file's size line and its extent rows.
const EXTENTS_TABLE_HEADER: &str =
    " ext:     logical_offset:        physical_offset: length:   expected: flags:";

/// Media files on a healthy library rarely fragment past a few runs.
const EXPECTED_EXTENTS: usize = 4;

static SIZE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    // File size of <name> is <size> (<N> blocks of <B> bytes)
    Regex::new(r"^File size of (.+) is \d+ \((\d+) blocks? of (\d+) bytes\)$")
        .expect("Invalid size header regex")
});

/// Extent rows are split on runs of spaces, colons and dots, the way the
/// utility lays out its fixed columns. Rows start with padding, so the first
/// field is empty and the interesting columns are at indices 2, 4 and 6.
static ROW_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ :.]+").expect("Invalid row separator regex"));

/// Extent listing of a single file, as reported by the utility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileExtents {
    pub name: String,
    pub block_size: u32,
    pub extents: Vec<Extent>,
}

enum State {
    SizeHeader,
    ExtentsTableHeader,
    ExtentRows,
}

/// Incremental parser over the utility's stdout lines.
pub struct OutputParser {
    state: State,
    name: String,
    block_size: u32,
    extents: Vec<Extent>,
}

impl OutputParser {
    pub fn new() -> Self {
        Self {
            state: State::SizeHeader,
            name: String::new(),
            block_size: 0,
            extents: Vec::new(),
        }
    }

    /// Feeds one line of output.
    ///
    /// Returns a completed per-file listing when the summary line for the
    /// current file is reached, `None` while a listing is still in flight.
    pub fn feed(&mut self, line: &str) -> Result<Option<FileExtents>, ExtentError> {
        match self.state {
            State::SizeHeader => {
                if !line.starts_with("File size of ") {
                    // chatter between file blocks is skipped
                    return Ok(None);
                }
                let caps = SIZE_HEADER
                    .captures(line)
                    .ok_or_else(|| ExtentError::BadSizeHeader { line: line.into() })?;
                self.name = caps[1].to_string();
                self.block_size = caps[3]
                    .parse()
                    .map_err(|_| ExtentError::BadSizeHeader { line: line.into() })?;
                trace!(
                    "Found file \"{}\" with block size {} in listing",
                    self.name,
                    self.block_size
                );
                self.state = State::ExtentsTableHeader;
                Ok(None)
            }
            State::ExtentsTableHeader => {
                if line != EXTENTS_TABLE_HEADER {
                    return Err(ExtentError::BadExtentsHeader { line: line.into() });
                }
                self.extents = Vec::with_capacity(EXPECTED_EXTENTS);
                self.state = State::ExtentRows;
                Ok(None)
            }
            State::ExtentRows => {
                if line.starts_with(self.name.as_str()) {
                    if !line.ends_with(" found") {
                        return Err(ExtentError::BadSummaryLine { line: line.into() });
                    }
                    self.state = State::SizeHeader;
                    return Ok(Some(FileExtents {
                        name: std::mem::take(&mut self.name),
                        block_size: self.block_size,
                        extents: std::mem::take(&mut self.extents),
                    }));
                }
                let fields: Vec<&str> = ROW_SEPARATORS.split(line).collect();
                let logical = field_at(&fields, 2, line)?;
                let physical = field_at(&fields, 4, line)?;
                let count = field_at(&fields, 6, line)?;
                self.extents.push(Extent::new(logical, physical, count));
                Ok(None)
            }
        }
    }
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new()
    }
}

fn field_at(fields: &[&str], index: usize, line: &str) -> Result<i32, ExtentError> {
    let field = fields
        .get(index)
        .ok_or_else(|| ExtentError::ShortExtentRow { line: line.into() })?;
    field
        .parse()
        .map_err(|_| ExtentError::BadExtentNumber { line: line.into() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(text: &str) -> Result<Vec<FileExtents>, ExtentError> {
        let mut parser = OutputParser::new();
        let mut listings = Vec::new();
        for line in text.lines() {
            if let Some(listing) = parser.feed(line)? {
                listings.push(listing);
            }
        }
        Ok(listings)
    }

    const SINGLE_FILE: &str = "\
File size of a is 5120 (2 blocks of 4096 bytes)
 ext:     logical_offset:        physical_offset: length:   expected: flags:
   0:        0..       1:        100..       101:      2:             last,eligible
a: 1 extent found
";

    #[test]
    fn test_parse_single_file() {
        let listings = parse_all(SINGLE_FILE).unwrap();
        assert_eq!(listings.len(), 1);
        let listing = &listings[0];
        assert_eq!(listing.name, "a");
        assert_eq!(listing.block_size, 4096);
        assert_eq!(listing.extents, vec![Extent::new(0, 100, 2)]);
    }

    #[test]
    fn test_parse_fragmented_file() {
        let text = "\
File size of frag.bin is 8192 (2 blocks of 4096 bytes)
 ext:     logical_offset:        physical_offset: length:   expected: flags:
   0:        0..       0:        500..       500:      1:        101: eligible
   1:        1..       1:        200..       200:      1:             last,eligible
frag.bin: 2 extents found
";
        let listings = parse_all(text).unwrap();
        assert_eq!(
            listings[0].extents,
            vec![Extent::new(0, 500, 1), Extent::new(1, 200, 1)]
        );
    }

    #[test]
    fn test_parse_multiple_files() {
        let text = format!(
            "{}File size of b is 4096 (1 block of 4096 bytes)\n\
             {}\n   0:        0..       0:         50..        50:      1:             last\n\
             b: 1 extent found\n",
            SINGLE_FILE, EXTENTS_TABLE_HEADER
        );
        let listings = parse_all(&text).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[1].name, "b");
        assert_eq!(listings[1].extents, vec![Extent::new(0, 50, 1)]);
    }

    #[test]
    fn test_chatter_before_header_is_skipped() {
        let text = format!("open: Permission denied\n{}", SINGLE_FILE);
        let listings = parse_all(&text).unwrap();
        assert_eq!(listings.len(), 1);
    }

    #[test]
    fn test_zero_extents_file() {
        let text = "\
File size of empty is 0 (0 blocks of 4096 bytes)
 ext:     logical_offset:        physical_offset: length:   expected: flags:
empty: 0 extents found
";
        let listings = parse_all(text).unwrap();
        assert_eq!(listings[0].extents, Vec::new());
    }

    #[test]
    fn test_malformed_extents_header_rejected() {
        let text = "\
File size of a is 5120 (2 blocks of 4096 bytes)
 ext: logical physical length
";
        assert!(matches!(
            parse_all(text),
            Err(ExtentError::BadExtentsHeader { .. })
        ));
    }

    #[test]
    fn test_malformed_size_header_rejected() {
        let err = parse_all("File size of a is huge\n").unwrap_err();
        assert!(matches!(err, ExtentError::BadSizeHeader { .. }));
    }

    #[test]
    fn test_short_extent_row_rejected() {
        let text = format!(
            "File size of a is 5120 (2 blocks of 4096 bytes)\n{}\n   0: 0\n",
            EXTENTS_TABLE_HEADER
        );
        assert!(matches!(
            parse_all(&text),
            Err(ExtentError::ShortExtentRow { .. })
        ));
    }

    #[test]
    fn test_non_numeric_extent_row_rejected() {
        let text = format!(
            "File size of a is 5120 (2 blocks of 4096 bytes)\n{}\n   0:        x..       1:        100..       101:      2:             last\n",
            EXTENTS_TABLE_HEADER
        );
        assert!(matches!(
            parse_all(&text),
            Err(ExtentError::BadExtentNumber { .. })
        ));
    }

    #[test]
    fn test_summary_line_must_end_with_found() {
        let text = "\
File size of a is 5120 (2 blocks of 4096 bytes)
 ext:     logical_offset:        physical_offset: length:   expected: flags:
a: something unexpected
";
        assert!(matches!(
            parse_all(text),
            Err(ExtentError::BadSummaryLine { .. })
        ));
    }

    #[test]
    fn test_name_containing_is_parses() {
        let text = "\
File size of what is love.flac is 4096 (1 block of 4096 bytes)
 ext:     logical_offset:        physical_offset: length:   expected: flags:
   0:        0..       0:         77..        77:      1:             last
what is love.flac: 1 extent found
";
        let listings = parse_all(text).unwrap();
        assert_eq!(listings[0].name, "what is love.flac");
    }
}
