use std::{
    collections::{BTreeMap, VecDeque},
    str::Chars,
};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::EnumString;

use crate::{error::CompileResult, frontend::SourceFile, middle::ty::Type};

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    chars: PeekNth<Chars<'source>>,
    peek_buffer: VecDeque<Token>,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // param
    Identifier,       // amount

    /* Literals */
    BooleanLiteral, // true
    IntegerLiteral, // 1
    FloatLiteral,   // 1.0

    /* Raw text */
    GlueBlock, // {% ... %}

    /* Delimiters */
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    OpenBrace,    // {
    CloseBrace,   // }
    Semicolon,    // ;
    Comma,        // ,

    /* Other */
    Dot,      // .
    Question, // ?
    Colon,    // :

    /* Unary Ops */
    Bang,       // !
    PlusPlus,   // ++
    MinusMinus, // --

    /* Unary + Binary Ops */
    Plus,  // +
    Minus, // -

    /* Binary Ops */
    Asterisk,             // *
    Divide,               // /
    LogicalAnd,           // &&
    LogicalOr,            // ||
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=

    /* Assignment */
    Equals,         // =
    PlusEquals,     // +=
    MinusEquals,    // -=
    MultiplyEquals, // *=
    DivideEquals,   // /=
}

impl TokenKind {
    pub fn is_assignment_operator(&self) -> bool {
        matches!(
            self,
            Self::Equals
                | Self::PlusEquals
                | Self::MinusEquals
                | Self::MultiplyEquals
                | Self::DivideEquals
        )
    }

    pub fn is_equality_operator(&self) -> bool {
        matches!(self, Self::DoubleEquals | Self::NotEquals)
    }

    pub fn is_relational_operator(&self) -> bool {
        matches!(
            self,
            Self::LessThan
                | Self::LessThanOrEqualTo
                | Self::GreaterThan
                | Self::GreaterThanOrEqualTo
        )
    }

    pub fn is_term_operator(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_factor_operator(&self) -> bool {
        matches!(self, Self::Asterisk | Self::Divide)
    }

    pub fn is_unary_operator(&self) -> bool {
        matches!(self, Self::Bang | Self::Minus | Self::Plus)
    }

    pub fn is_increment_operator(&self) -> bool {
        matches!(self, Self::PlusPlus | Self::MinusMinus)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    Const,
    Param,
    Void,
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    Int2,
    Int3,
    Int4,
    Bool,
    Bool2,
    Bool3,
    Bool4,
    Sampler,
    LSampler,
    FSampler,
    If,
    Else,
    For,
    While,
    Do,
    Break,
    Continue,
    Return,
    Discard,
    Lowp,
    Mediump,
    Highp,
}

impl Keyword {
    /// The type named by a type keyword
    pub fn as_type(self) -> Option<Type> {
        Some(match self {
            Self::Void => Type::Void,
            Self::Float => Type::FLOAT,
            Self::Float2 => Type::FLOAT2,
            Self::Float3 => Type::FLOAT3,
            Self::Float4 => Type::FLOAT4,
            Self::Int => Type::INT,
            Self::Int2 => Type::INT2,
            Self::Int3 => Type::INT3,
            Self::Int4 => Type::INT4,
            Self::Bool => Type::BOOL,
            Self::Bool2 => Type::BOOL2,
            Self::Bool3 => Type::BOOL3,
            Self::Bool4 => Type::BOOL4,
            Self::Sampler => Type::TRANSFORMED_SAMPLER,
            Self::LSampler => Type::LOGICAL_SAMPLER,
            Self::FSampler => Type::FLOAT_MAP_SAMPLER,
            _ => return None,
        })
    }

    pub fn is_precision(self) -> bool {
        matches!(self, Self::Lowp | Self::Mediump | Self::Highp)
    }
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('[', TokenKind::OpenBracket),
        (']', TokenKind::CloseBracket),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        ('.', TokenKind::Dot),
        ('?', TokenKind::Question),
        (':', TokenKind::Colon),
        ('!', TokenKind::Bang),
        ('+', TokenKind::Plus),
        ('-', TokenKind::Minus),
        ('*', TokenKind::Asterisk),
        ('/', TokenKind::Divide),
        ('=', TokenKind::Equals),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
    ])
});

/// Two char tokens, checked before [`SINGLE_TOKENS`]
static DOUBLE_TOKENS: Lazy<BTreeMap<(char, char), TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        (('+', '+'), TokenKind::PlusPlus),
        (('-', '-'), TokenKind::MinusMinus),
        (('&', '&'), TokenKind::LogicalAnd),
        (('|', '|'), TokenKind::LogicalOr),
        (('=', '='), TokenKind::DoubleEquals),
        (('!', '='), TokenKind::NotEquals),
        (('<', '='), TokenKind::LessThanOrEqualTo),
        (('>', '='), TokenKind::GreaterThanOrEqualTo),
        (('+', '='), TokenKind::PlusEquals),
        (('-', '='), TokenKind::MinusEquals),
        (('*', '='), TokenKind::MultiplyEquals),
        (('/', '='), TokenKind::DivideEquals),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            peek_buffer: VecDeque::new(),
        }
    }

    pub fn source(&self) -> &'source SourceFile {
        self.source
    }

    /// Span of the end of the input, used to report unexpected EOF
    pub fn eof_span(&self) -> Span {
        let end = self.source.contents.len();
        Span::new(end, end)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn peek_is(&mut self, n: usize, expected: char) -> bool {
        self.chars.peek_nth(n).is_some_and(|c| *c == expected)
    }

    fn ignore_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.advance();
        }
    }

    fn ignore_line(&mut self) {
        while self.chars.peek().is_some_and(|c| *c != '\n') {
            self.advance();
        }
    }

    fn ignore_block_comment(&mut self) -> CompileResult<()> {
        let start_position = self.position;

        self.advance();
        self.advance();

        loop {
            if self.peek_is(0, '*') && self.peek_is(1, '/') {
                self.advance();
                self.advance();
                return Ok(());
            }

            if self.advance().is_none() {
                return Err(self.source.syntax_error(
                    self.new_span(start_position),
                    "Reached end of file while reading block comment",
                ));
            }
        }
    }

    // {% raw glue text %}
    fn read_glue_block(&mut self) -> CompileResult<Token> {
        let start_position = self.position;

        self.advance();
        self.advance();

        loop {
            if self.peek_is(0, '%') && self.peek_is(1, '}') {
                self.advance();
                self.advance();

                return Ok(Token {
                    kind: TokenKind::GlueBlock,
                    span: self.new_span(start_position),
                });
            }

            if self.advance().is_none() {
                return Err(self.source.syntax_error(
                    self.new_span(start_position),
                    "Reached end of file while reading glue block",
                ));
            }
        }
    }

    // Keyword, identifier, or boolean literal
    fn read_word(&mut self) -> Token {
        let start_position = self.position;

        while self
            .chars
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
        {
            self.advance();
        }

        let span = self.new_span(start_position);
        let value = self.source.value_of_span(span);

        let kind = if let Ok(keyword) = value.parse() {
            TokenKind::Keyword(keyword)
        } else {
            match value {
                "true" | "false" => TokenKind::BooleanLiteral,
                _ => TokenKind::Identifier,
            }
        };

        Token { kind, span }
    }

    fn read_digits(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
    }

    // 1, 1.0, .5, 1., 1e-3, 2.5f
    fn read_number(&mut self) -> CompileResult<Token> {
        let start_position = self.position;
        let mut kind = TokenKind::IntegerLiteral;

        self.read_digits();

        if self.peek_is(0, '.') {
            kind = TokenKind::FloatLiteral;
            self.advance();
            self.read_digits();
        }

        if self.chars.peek().is_some_and(|c| matches!(c, 'e' | 'E')) {
            kind = TokenKind::FloatLiteral;
            self.advance();

            if self.chars.peek().is_some_and(|c| matches!(c, '+' | '-')) {
                self.advance();
            }

            if !self.chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(self.source.syntax_error(
                    self.new_span(start_position),
                    "Expected digits in float literal exponent",
                ));
            }

            self.read_digits();
        }

        if self.chars.peek().is_some_and(|c| matches!(c, 'f' | 'F')) {
            kind = TokenKind::FloatLiteral;
            self.advance();
        }

        if self
            .chars
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
        {
            return Err(self.source.syntax_error(
                self.new_span(start_position),
                "Invalid suffix on numeric literal",
            ));
        }

        Ok(Token {
            kind,
            span: self.new_span(start_position),
        })
    }

    fn read_single(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.advance();

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_double(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.advance();
        self.advance();

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    pub fn peek(&mut self) -> CompileResult<Option<Token>> {
        if self.peek_buffer.is_empty() {
            if let Some(token) = self.lex_token()? {
                self.peek_buffer.push_back(token);
            }
        }

        Ok(self.peek_buffer.front().cloned())
    }

    /// Looks `n` tokens past the next one without consuming anything
    pub fn peek_nth(&mut self, n: usize) -> CompileResult<Option<Token>> {
        while self.peek_buffer.len() <= n {
            match self.lex_token()? {
                Some(token) => self.peek_buffer.push_back(token),
                None => return Ok(None),
            }
        }

        Ok(self.peek_buffer.get(n).cloned())
    }

    pub fn next(&mut self) -> CompileResult<Option<Token>> {
        if let Some(token) = self.peek_buffer.pop_front() {
            return Ok(Some(token));
        }

        self.lex_token()
    }

    fn lex_token(&mut self) -> CompileResult<Option<Token>> {
        while let Some(c) = self.chars.peek().copied() {
            let token = match c {
                // Ignore whitespace
                c if c.is_ascii_whitespace() => {
                    self.ignore_whitespace();
                    continue;
                }
                // Ignore comments
                '/' if self.peek_is(1, '/') => {
                    self.ignore_line();
                    continue;
                }
                '/' if self.peek_is(1, '*') => {
                    self.ignore_block_comment()?;
                    continue;
                }

                // Glue blocks
                '{' if self.peek_is(1, '%') => self.read_glue_block()?,

                // Integer and float literals
                n if n.is_ascii_digit() => self.read_number()?,
                '.' if self.chars.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.read_number()?
                }

                // Identifiers, keywords, and boolean literals
                a if a.is_ascii_alphabetic() || a == '_' => self.read_word(),

                c => {
                    let next = self.chars.peek_nth(1).copied();

                    if let Some(kind) = next.and_then(|n| DOUBLE_TOKENS.get(&(c, n))) {
                        self.read_double(*kind)
                    } else if let Some(kind) = SINGLE_TOKENS.get(&c) {
                        self.read_single(*kind)
                    } else {
                        let start_position = self.position;
                        self.advance();

                        return Err(self.source.syntax_error(
                            self.new_span(start_position),
                            format!("Unexpected character in stream: `{c}`"),
                        ));
                    }
                }
            };

            return Ok(Some(token));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let source = SourceFile::from_memory(source);
        let mut lexer = Lexer::new(&source);
        let mut kinds = Vec::new();

        while let Some(token) = lexer.next().unwrap() {
            kinds.push(token.kind);
        }

        kinds
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            kinds("param float4 tint; // trailing"),
            vec![
                TokenKind::Keyword(Keyword::Param),
                TokenKind::Keyword(Keyword::Float4),
                TokenKind::Identifier,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn lexes_sampler_keywords() {
        assert_eq!(
            kinds("sampler lsampler fsampler"),
            vec![
                TokenKind::Keyword(Keyword::Sampler),
                TokenKind::Keyword(Keyword::LSampler),
                TokenKind::Keyword(Keyword::FSampler),
            ]
        );
    }

    #[test]
    fn lexes_numbers_and_swizzles() {
        assert_eq!(
            kinds("1 1.5 .5 2.5f 1e-3 c.rgb"),
            vec![
                TokenKind::IntegerLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn lexes_compound_operators() {
        assert_eq!(
            kinds("a += b++ <= c && !d"),
            vec![
                TokenKind::Identifier,
                TokenKind::PlusEquals,
                TokenKind::Identifier,
                TokenKind::PlusPlus,
                TokenKind::LessThanOrEqualTo,
                TokenKind::Identifier,
                TokenKind::LogicalAnd,
                TokenKind::Bang,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn lexes_glue_block_as_one_token() {
        assert_eq!(
            kinds("{% private float getAmount() { return 1f; } %} /* c */ ;"),
            vec![TokenKind::GlueBlock, TokenKind::Semicolon]
        );
    }

    #[test]
    fn reports_unexpected_character_with_position() {
        let source = SourceFile::from_memory("param float a;\n  @");
        let mut lexer = Lexer::new(&source);
        let mut error = None;

        loop {
            match lexer.next() {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }

        let error = error.expect("lexing should fail");
        assert_eq!(error.stage(), crate::error::Stage::Parse);
        assert!(error.to_string().contains("(at 2:3)"));
    }

    #[test]
    fn unterminated_glue_block_is_an_error() {
        let source = SourceFile::from_memory("{% never closed");
        let mut lexer = Lexer::new(&source);

        assert!(lexer.next().is_err());
    }
}
