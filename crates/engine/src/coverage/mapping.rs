// Soldep - EVM Contract Deployer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Byte-offset to line/column index for one source file.

/// Maps raw byte offsets within one source file to 1-based line/column
/// coordinates.
///
/// Built once per file by scanning line-by-line; each line's end offset
/// includes its terminator, so a position pointing at a newline still
/// resolves to the line it ends.
#[derive(Debug, Clone, Default)]
pub struct FileMapping {
    // (line start offset, line end offset) per line, in order
    boundaries: Vec<(usize, usize)>,
}

impl FileMapping {
    /// Builds the index from the full text of a source file.
    pub fn from_source(text: &str) -> Self {
        let mut boundaries = Vec::new();
        let mut pos = 0;
        for line in text.lines() {
            let end = pos + line.len() + 1;
            boundaries.push((pos, end));
            pos = end;
        }
        Self { boundaries }
    }

    /// Returns the 1-based `(line, column)` of the first line boundary
    /// containing `pos`, or `(-1, -1)` when the offset lies outside the
    /// file.
    ///
    /// Callers only pass offsets produced by the same file's AST, so an
    /// out-of-range result signals an implementation error upstream, not a
    /// normal failure.
    pub fn pos_to_line(&self, pos: usize) -> (i64, i64) {
        for (line, (start, end)) in self.boundaries.iter().enumerate() {
            if pos >= *start && pos <= *end {
                return (line as i64 + 1, (pos - start) as i64 + 1);
            }
        }

        (-1, -1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pos_to_line_basic() {
        let mapping = FileMapping::from_source("abc\ndefgh\n\nx\n");

        assert_eq!(mapping.pos_to_line(0), (1, 1));
        assert_eq!(mapping.pos_to_line(2), (1, 3));
        // the newline itself still belongs to line 1, and so does the line
        // end offset shared with the next boundary (first boundary wins)
        assert_eq!(mapping.pos_to_line(3), (1, 4));
        assert_eq!(mapping.pos_to_line(4), (1, 5));
        assert_eq!(mapping.pos_to_line(5), (2, 2));
        assert_eq!(mapping.pos_to_line(8), (2, 5));
        assert_eq!(mapping.pos_to_line(12), (4, 2));
    }

    #[test]
    fn test_pos_to_line_out_of_range() {
        let mapping = FileMapping::from_source("abc\n");
        assert_eq!(mapping.pos_to_line(100), (-1, -1));
    }

    #[test]
    fn test_pos_to_line_matches_newline_count() {
        let text = "line one\nline two\nline three\n";
        let mapping = FileMapping::from_source(text);

        // For any offset inside a line, the reported line must equal 1 plus
        // the number of newlines before it. Line-start offsets are excluded:
        // they coincide with the previous line's (inclusive) end boundary.
        for (pos, _) in text.char_indices() {
            if pos == 0 || text.as_bytes()[pos - 1] == b'\n' {
                continue;
            }
            let expected = 1 + text[..pos].matches('\n').count() as i64;
            let (line, _) = mapping.pos_to_line(pos);
            assert_eq!(line, expected, "offset {pos}");
        }
    }
}
