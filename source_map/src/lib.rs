//! Program text storage for line-numbered BASIC sources
//!
//! A BASIC program is addressed by its *program line numbers* (`10`, `20`, ...),
//! while editors and terminals address *physical lines*. This crate keeps the
//! loaded text of every program, indexes the physical line of each numbered
//! program line, and converts byte offsets to positions so diagnostics can
//! quote the offending source.

use std::collections::BTreeMap;
use std::fmt;

/// A position in a physical source file (1-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
}

impl SourcePosition {
    pub fn new(line: usize, column: usize, byte_offset: usize) -> Self {
        Self { line, column, byte_offset }
    }
}

/// Unique identifier for a loaded program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(usize);

impl FileId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

/// One loaded program text
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
    pub line_starts: Vec<usize>,
    /// BASIC line number -> physical line (1-based)
    program_lines: BTreeMap<u32, usize>,
}

impl SourceFile {
    pub fn new(name: String, content: String) -> Self {
        let line_starts = compute_line_starts(&content);
        let program_lines = index_program_lines(&content);
        Self {
            name,
            content,
            line_starts,
            program_lines,
        }
    }

    /// Get a physical line (1-based), without its terminator
    pub fn get_line(&self, line_number: usize) -> Option<&str> {
        if line_number == 0 || line_number > self.line_starts.len() {
            return None;
        }

        let start = self.line_starts[line_number - 1];
        let end = if line_number < self.line_starts.len() {
            self.line_starts[line_number]
        } else {
            self.content.len()
        };

        Some(self.content[start..end].trim_end_matches(['\n', '\r']))
    }

    /// Physical line holding the program line `basic_line`.
    ///
    /// If the same number appears more than once the last occurrence wins,
    /// matching how a BASIC editor replaces a retyped line.
    pub fn physical_line(&self, basic_line: u32) -> Option<usize> {
        self.program_lines.get(&basic_line).copied()
    }

    /// Text of the program line `basic_line`
    pub fn get_program_line(&self, basic_line: u32) -> Option<&str> {
        self.get_line(self.physical_line(basic_line)?)
    }

    /// Program line numbers in ascending order
    pub fn program_line_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.program_lines.keys().copied()
    }

    /// Convert a byte offset to line and column (1-based)
    pub fn offset_to_line_col(&self, offset: usize) -> (usize, usize) {
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };

        let line_start = self.line_starts.get(line_index).copied().unwrap_or(0);
        (line_index + 1, offset - line_start + 1)
    }

    pub fn offset_to_position(&self, offset: usize) -> SourcePosition {
        let (line, column) = self.offset_to_line_col(offset);
        SourcePosition::new(line, column, offset)
    }
}

/// Owns every program text loaded in a session
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a program text and return its FileId
    pub fn add_file(&mut self, name: impl Into<String>, content: impl Into<String>) -> FileId {
        let file_id = FileId(self.files.len());
        self.files.push(SourceFile::new(name.into(), content.into()));
        file_id
    }

    pub fn get_file(&self, file_id: FileId) -> Option<&SourceFile> {
        self.files.get(file_id.0)
    }

    pub fn get_line(&self, file_id: FileId, line_number: usize) -> Option<&str> {
        self.get_file(file_id)?.get_line(line_number)
    }

    pub fn get_program_line(&self, file_id: FileId, basic_line: u32) -> Option<&str> {
        self.get_file(file_id)?.get_program_line(basic_line)
    }

    pub fn physical_line(&self, file_id: FileId, basic_line: u32) -> Option<usize> {
        self.get_file(file_id)?.physical_line(basic_line)
    }

    pub fn offset_to_position(&self, file_id: FileId, offset: usize) -> Option<SourcePosition> {
        self.get_file(file_id).map(|file| file.offset_to_position(offset))
    }

    pub fn file_ids(&self) -> impl Iterator<Item = FileId> + '_ {
        (0..self.files.len()).map(FileId)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn compute_line_starts(source: &str) -> Vec<usize> {
    let mut line_starts = vec![0];
    for (i, ch) in source.char_indices() {
        if ch == '\n' {
            line_starts.push(i + 1);
        }
    }
    line_starts
}

/// Leading decimal number of each physical line, if any
fn index_program_lines(source: &str) -> BTreeMap<u32, usize> {
    let mut index = BTreeMap::new();
    for (i, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        let digits: &str = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .map_or(trimmed, |end| &trimmed[..end]);
        if let Ok(number) = digits.parse::<u32>() {
            index.insert(number, i + 1);
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = "10 PRINT \"HI\"\n\n20 X = 1\n  30 GOTO 10\nREM no number\n";

    #[test]
    fn test_physical_lines() {
        let mut source_map = SourceMap::new();
        let file_id = source_map.add_file("prog.bas", PROGRAM);

        assert_eq!(source_map.get_line(file_id, 1), Some("10 PRINT \"HI\""));
        assert_eq!(source_map.get_line(file_id, 2), Some(""));
        assert_eq!(source_map.get_line(file_id, 4), Some("  30 GOTO 10"));
        assert_eq!(source_map.get_line(file_id, 0), None);
        assert_eq!(source_map.get_line(file_id, 99), None);
    }

    #[test]
    fn test_program_line_lookup() {
        let mut source_map = SourceMap::new();
        let file_id = source_map.add_file("prog.bas", PROGRAM);

        assert_eq!(source_map.physical_line(file_id, 20), Some(3));
        assert_eq!(source_map.get_program_line(file_id, 30), Some("  30 GOTO 10"));
        assert_eq!(source_map.get_program_line(file_id, 40), None);

        let numbers: Vec<u32> = source_map.get_file(file_id).unwrap().program_line_numbers().collect();
        assert_eq!(numbers, vec![10, 20, 30]);
    }

    #[test]
    fn test_retyped_line_wins() {
        let file = SourceFile::new("dup.bas".to_string(), "10 A=1\n10 A=2\n".to_string());
        assert_eq!(file.get_program_line(10), Some("10 A=2"));
    }

    #[test]
    fn test_offset_to_line_col() {
        let file = SourceFile::new("t.bas".to_string(), "10 A\n20 B\n".to_string());
        assert_eq!(file.offset_to_line_col(0), (1, 1));
        assert_eq!(file.offset_to_line_col(3), (1, 4));
        assert_eq!(file.offset_to_line_col(5), (2, 1));
        assert_eq!(file.offset_to_position(8).column, 4);
    }

    #[test]
    fn test_multiple_files() {
        let mut source_map = SourceMap::new();
        let a = source_map.add_file("a.bas", "10 END");
        let b = source_map.add_file("b.bas", "10 STOP");

        assert_eq!(source_map.len(), 2);
        assert_ne!(a, b);
        assert_eq!(source_map.get_program_line(b, 10), Some("10 STOP"));
        assert_eq!(source_map.file_ids().count(), 2);
    }
}
