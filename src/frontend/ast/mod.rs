use super::{SourceFile, intern::InternedSymbol};
use crate::{frontend::lexer::Span, middle::ty};

pub mod visit;

#[derive(Debug)]
pub struct Module<'source> {
    pub source_file: &'source SourceFile,
    /// Top level items in declaration order
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug)]
pub struct Item {
    pub id: NodeId,
    pub span: Span,
    pub kind: ItemKind,
}

#[derive(Debug)]
pub enum ItemKind {
    GlobalVariable(Box<GlobalVariable>),
    FunctionDefinition(Box<FunctionDefinition>),
    GlueBlock(Box<GlueBlock>),
}

/// `param float4 tint;`, `const float k = 0.5;`, `param float w[8];`
#[derive(Debug)]
pub struct GlobalVariable {
    pub id: NodeId,
    pub span: Span,
    pub qualifier: Option<Qualifier>,
    pub ty: TypeName,
    pub name: Identifier,
    pub array_size: Option<ArraySize>,
    pub initializer: Option<Box<Expression>>,
}

#[derive(Debug)]
pub struct Qualifier {
    pub id: NodeId,
    pub span: Span,
    pub kind: QualifierKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualifierKind {
    Const,
    Param,
}

#[derive(Debug)]
pub struct ArraySize {
    pub span: Span,
    pub length: u32,
}

/// Raw glue text between `{%` and `%}`
#[derive(Debug)]
pub struct GlueBlock {
    pub id: NodeId,
    pub span: Span,
    pub code: String,
}

#[derive(Debug)]
pub struct FunctionDefinition {
    pub id: NodeId,
    pub span: Span,
    pub return_type: TypeName,
    pub name: Identifier,
    pub parameters: Vec<FunctionParameter>,
    pub body: Block,
}

#[derive(Debug)]
pub struct FunctionParameter {
    pub id: NodeId,
    pub span: Span,
    pub ty: TypeName,
    pub name: Identifier,
}

/// A type written in source, e.g. `float3`
#[derive(Debug, Clone)]
pub struct TypeName {
    pub id: NodeId,
    pub span: Span,
    pub ty: ty::Type,
}

#[derive(Debug, Clone)]
pub struct Identifier {
    pub id: NodeId,
    pub span: Span,
    pub symbol: InternedSymbol,
}

#[derive(Debug)]
pub struct Block {
    pub id: NodeId,
    pub span: Span,
    pub statements: Vec<Statement>,
}

#[derive(Debug)]
pub struct Statement {
    pub id: NodeId,
    pub span: Span,
    pub kind: StatementKind,
}

#[derive(Debug)]
pub enum StatementKind {
    /// One or more locals sharing a type: `float a = 1.0, b;`
    Declaration(Vec<Local>),
    /// Assignment, increment or call terminated with a semicolon
    Expression(Box<Expression>),
    Block(Box<Block>),
    If {
        condition: Box<Expression>,
        positive: Box<Statement>,
        negative: Option<Box<Statement>>,
    },
    For {
        init: Option<Box<Statement>>,
        condition: Option<Box<Expression>>,
        update: Option<Box<Expression>>,
        body: Box<Statement>,
    },
    While {
        condition: Box<Expression>,
        body: Box<Statement>,
    },
    DoWhile {
        body: Box<Statement>,
        condition: Box<Expression>,
    },
    Break,
    Continue,
    Return(Option<Box<Expression>>),
    Discard,
    /// Empty statement (just a semicolon)
    Empty,
}

#[derive(Debug)]
pub struct Local {
    pub id: NodeId,
    pub span: Span,
    pub ty: TypeName,
    pub name: Identifier,
    pub initializer: Option<Box<Expression>>,
}

#[derive(Debug)]
pub struct Expression {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExpressionKind,
}

#[derive(Debug)]
pub enum ExpressionKind {
    Literal(Box<Literal>),
    Identifier(Identifier),
    Grouping(Box<Expression>),
    FunctionCall {
        target: Identifier,
        arguments: FunctionCallArgumentList,
    },
    /// `float3(...)`, `int(...)`
    Constructor {
        ty: TypeName,
        arguments: FunctionCallArgumentList,
    },
    /// Swizzle, e.g. `color.rgb`
    FieldAccess {
        expression: Box<Expression>,
        field: Identifier,
    },
    Index {
        expression: Box<Expression>,
        index: Box<Expression>,
    },
    Binary {
        lhs: Box<Expression>,
        operator: BinaryOperator,
        rhs: Box<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        positive: Box<Expression>,
        negative: Box<Expression>,
    },
    Assignment {
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    OperatorAssignment {
        operator: AssignmentOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    /// `i++`, `--i`
    Increment {
        operator: IncrementOperator,
        operand: Box<Expression>,
    },
}

impl ExpressionKind {
    /// Whether the expression may stand alone as a statement
    pub fn is_statement_like(&self) -> bool {
        matches!(
            self,
            Self::Assignment { .. }
                | Self::OperatorAssignment { .. }
                | Self::Increment { .. }
                | Self::FunctionCall { .. }
        )
    }
}

#[derive(Debug)]
pub struct FunctionCallArgumentList {
    pub id: NodeId,
    pub span: Span,
    pub arguments: Vec<Expression>,
}

#[derive(Debug)]
pub struct BinaryOperator {
    pub id: NodeId,
    pub span: Span,
    pub kind: BinaryOperatorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorKind {
    Add,                  // +
    Subtract,             // -
    Multiply,             // *
    Divide,               // /
    Equals,               // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
    LogicalAnd,           // &&
    LogicalOr,            // ||
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    Arithmetic,
    Relational,
    Equality,
    Logical,
}

impl BinaryOperatorKind {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide => {
                BinaryOperatorClass::Arithmetic
            }
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo => BinaryOperatorClass::Relational,
            Self::Equals | Self::NotEquals => BinaryOperatorClass::Equality,
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
        }
    }
}

impl core::fmt::Display for BinaryOperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqualTo => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqualTo => ">=",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
        })
    }
}

#[derive(Debug)]
pub struct UnaryOperator {
    pub id: NodeId,
    pub span: Span,
    pub kind: UnaryOperatorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperatorKind {
    Plus,       // +
    Negate,     // -
    LogicalNot, // !
}

impl core::fmt::Display for UnaryOperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plus => write!(f, "+"),
            Self::Negate => write!(f, "-"),
            Self::LogicalNot => write!(f, "!"),
        }
    }
}

#[derive(Debug)]
pub struct Literal {
    pub id: NodeId,
    pub span: Span,
    pub kind: LiteralKind,
    pub symbol: InternedSymbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Boolean, // true
    Integer, // 1
    Float,   // 1.0 or 1.0f
}

#[derive(Debug)]
pub struct AssignmentOperator {
    pub id: NodeId,
    pub span: Span,
    pub kind: AssignmentOperatorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperatorKind {
    Add,      // +=
    Subtract, // -=
    Multiply, // *=
    Divide,   // /=
}

impl AssignmentOperatorKind {
    pub fn binary(self) -> BinaryOperatorKind {
        match self {
            Self::Add => BinaryOperatorKind::Add,
            Self::Subtract => BinaryOperatorKind::Subtract,
            Self::Multiply => BinaryOperatorKind::Multiply,
            Self::Divide => BinaryOperatorKind::Divide,
        }
    }
}

#[derive(Debug)]
pub struct IncrementOperator {
    pub id: NodeId,
    pub span: Span,
    pub kind: IncrementOperatorKind,
    pub prefix: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOperatorKind {
    Increment, // ++
    Decrement, // --
}

impl IncrementOperatorKind {
    pub fn binary(self) -> BinaryOperatorKind {
        match self {
            Self::Increment => BinaryOperatorKind::Add,
            Self::Decrement => BinaryOperatorKind::Subtract,
        }
    }
}
