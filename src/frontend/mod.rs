use std::path::PathBuf;

use colored::Colorize;

use self::lexer::Span;
use crate::error::{CompileError, CompileResult, Position};

pub mod ast;
pub mod intern;
pub mod lexer;
pub mod parser;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn from_memory(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            origin: SourceFileOrigin::Memory,
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> CompileResult<Self> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)?;

        Ok(Self {
            contents,
            origin: SourceFileOrigin::File(path),
        })
    }

    pub fn value_of_span(&self, span: Span) -> &str {
        &self.contents[span.start..span.end]
    }

    /// 1-based line of the byte offset
    pub fn row_for_position(&self, position: usize) -> usize {
        self.contents[..position.min(self.contents.len())]
            .bytes()
            .filter(|b| *b == b'\n')
            .count()
            + 1
    }

    /// 1-based column of the byte offset
    pub fn column_for_position(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());
        let line_start = self.contents[..position]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);

        self.contents[line_start..position].chars().count() + 1
    }

    pub fn position(&self, span: Span) -> Position {
        Position {
            line: self.row_for_position(span.start),
            column: self.column_for_position(span.start),
        }
    }

    pub fn format_span_position(&self, span: Span) -> String {
        let position = self.position(span);
        format!("{}:{}:{}", self.origin, position.line, position.column)
    }

    pub fn syntax_error(&self, span: Span, message: impl Into<String>) -> CompileError {
        CompileError::Syntax {
            message: message.into(),
            span,
            position: self.position(span),
        }
    }

    pub fn semantic_error(&self, span: Span, message: impl Into<String>) -> CompileError {
        CompileError::Semantic {
            message: message.into(),
            span,
            position: self.position(span),
        }
    }

    /// Renders the line containing `span` with the span underlined
    pub fn highlight_span(&self, span: Span) -> String {
        let start = span.start.min(self.contents.len());
        let line_start = self.contents[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = self.contents[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(self.contents.len());

        let row = self.row_for_position(start);
        let gutter = " ".repeat(row.to_string().len());
        let line = &self.contents[line_start..line_end];

        let underline_start = self.contents[line_start..start].chars().count();
        let underline_len = self.contents[start..span.end.clamp(start, line_end)]
            .chars()
            .count()
            .max(1);

        format!(
            "{gutter} {}\n{} {} {line}\n{gutter} {} {}{}",
            "|".blue(),
            row.to_string().blue(),
            "|".blue(),
            "|".blue(),
            " ".repeat(underline_start),
            "^".repeat(underline_len).red()
        )
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based() {
        let source = SourceFile::from_memory("param float a;\nparam float b;\n");

        assert_eq!(source.row_for_position(0), 1);
        assert_eq!(source.column_for_position(0), 1);
        assert_eq!(source.row_for_position(15), 2);
        assert_eq!(source.column_for_position(21), 7);
    }

    #[test]
    fn highlight_underlines_span() {
        let source = SourceFile::from_memory("param float a;\nparam flot b;\n");
        let rendered = source.highlight_span(Span::new(21, 25));
        let plain = strip_ansi_escapes::strip_str(rendered);

        assert!(plain.contains("2 | param flot b;"));
        assert!(plain.contains("|       ^^^^"));
    }
}
