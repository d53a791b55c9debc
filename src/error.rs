//! Errors raised while compiling an effect program.
//!
//! Every error is fatal to the compile it was raised in. The pipeline stops
//! at the first one and hands it back to the caller unchanged.

use strum::Display;

use crate::frontend::lexer::Span;

pub type CompileResult<T> = Result<T, CompileError>;

/// 1-based line and column of a source offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The pipeline stage an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Parse,
    Resolve,
    Generate,
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("syntax error: {message} (at {position})")]
    Syntax {
        message: String,
        span: Span,
        position: Position,
    },

    #[error("semantic error: {message} (at {position})")]
    Semantic {
        message: String,
        span: Span,
        position: Position,
    },

    #[error("generation error: variable `{variable}`: {message}")]
    Generation { variable: String, message: String },

    #[error("template error: `{template}` template: {message}")]
    Template {
        template: &'static str,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn generation(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation {
            variable: variable.into(),
            message: message.into(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Syntax { .. } => Stage::Parse,
            Self::Semantic { .. } => Stage::Resolve,
            Self::Generation { .. } | Self::Template { .. } => Stage::Generate,
            Self::Io(_) => Stage::Io,
        }
    }

    /// Source span of the offending construct, when the error has one
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Syntax { span, .. } | Self::Semantic { span, .. } => Some(*span),
            _ => None,
        }
    }
}
