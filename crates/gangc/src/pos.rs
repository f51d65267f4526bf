//! Source positions attached to statements, expressions and symbols.

use std::fmt;

/// A location in a gang source file.
///
/// Positions are carried through every pass so that diagnostics emitted
/// during type checking or code generation can point back at the
/// construct that triggered them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    /// Name of the source file
    pub name: String,
    /// 1-based line number
    pub line: u32,
    /// 1-based column number
    pub column: u32,
}

impl SourcePos {
    pub fn new(name: impl Into<String>, line: u32, column: u32) -> Self {
        SourcePos {
            name: name.into(),
            line,
            column,
        }
    }

    /// A position for synthesized nodes that have no source location.
    pub fn unknown() -> Self {
        SourcePos {
            name: "<unknown>".to_string(),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.line, self.column)
    }
}
