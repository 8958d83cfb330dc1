use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl SourceSpan {
    pub fn synthetic() -> Self {
        Self {
            file: None,
            start: SourceLocation { line: 1, column: 1 },
            end: SourceLocation { line: 1, column: 1 },
        }
    }

    pub fn point(file: Option<String>, line: usize, column: usize) -> Self {
        Self {
            file,
            start: SourceLocation { line, column },
            end: SourceLocation { line, column },
        }
    }

    /// Line and column (both 1-based) of a byte offset inside `source`.
    pub fn from_offset(file: Option<String>, source: &str, offset: usize) -> Self {
        let mut line = 1usize;
        let mut column = 1usize;
        for (index, ch) in source.char_indices() {
            if index >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Self::point(file, line, column)
    }
}

#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn from_offset_counts_lines_and_columns() {
        let span = SourceSpan::from_offset(None, "ab\ncd", 4);
        assert_eq!(span.start, SourceLocation { line: 2, column: 2 });
        assert_eq!(SourceSpan::synthetic().start.line, 1);
    }
}
