//! Global variables of an effect program

use itertools::Itertools;

use super::ty::{BaseType, Type};
use crate::frontend::{ast::LiteralKind, intern::InternedSymbol, lexer::Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    /// Compile-time constant. Without a value it is a reserved built-in
    Const,
    /// Supplied by the caller on every kernel invocation
    Param,
    /// The per-pixel output. Only used by the `color` built-in
    Output,
}

/// One scalar component of a constant value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Float(f32),
    Int(i32),
    Bool(bool),
}

impl Scalar {
    /// Value of a literal as written in source, `None` when it does not fit
    pub fn parse_literal(kind: LiteralKind, text: &str) -> Option<Self> {
        match kind {
            LiteralKind::Boolean => Some(Self::Bool(text == "true")),
            LiteralKind::Integer => text.parse::<i32>().ok().map(Self::Int),
            LiteralKind::Float => text
                .trim_end_matches(['f', 'F'])
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Self::Float),
        }
    }

    pub fn ty(self) -> Type {
        match self {
            Self::Float(_) => Type::FLOAT,
            Self::Int(_) => Type::INT,
            Self::Bool(_) => Type::BOOL,
        }
    }

    /// Converts between base types the way constructors do
    pub fn convert(self, base: BaseType) -> Self {
        match (self, base) {
            (Self::Float(v), BaseType::Float) => Self::Float(v),
            (Self::Float(v), BaseType::Int) => Self::Int(v as i32),
            (Self::Float(v), BaseType::Bool) => Self::Bool(v != 0.0),
            (Self::Int(v), BaseType::Float) => Self::Float(v as f32),
            (Self::Int(v), BaseType::Int) => Self::Int(v),
            (Self::Int(v), BaseType::Bool) => Self::Bool(v != 0),
            (Self::Bool(v), BaseType::Float) => Self::Float(if v { 1.0 } else { 0.0 }),
            (Self::Bool(v), BaseType::Int) => Self::Int(v as i32),
            (Self::Bool(v), BaseType::Bool) => Self::Bool(v),
        }
    }

    pub fn negate(self) -> Option<Self> {
        match self {
            Self::Float(v) => Some(Self::Float(-v)),
            Self::Int(v) => v.checked_neg().map(Self::Int),
            Self::Bool(_) => None,
        }
    }

    /// Literal spelling in the native kernel
    pub fn to_c(self) -> String {
        match self {
            Self::Float(v) if v.is_finite() => format!("{v:?}f"),
            Self::Float(v) if v.is_nan() => "NAN".to_owned(),
            Self::Float(v) if v > 0.0 => "INFINITY".to_owned(),
            Self::Float(_) => "(-INFINITY)".to_owned(),
            // C has no literal for the most negative int
            Self::Int(i32::MIN) => "(-2147483647 - 1)".to_owned(),
            Self::Int(v) => v.to_string(),
            Self::Bool(v) => (v as i32).to_string(),
        }
    }
}

/// Literal value baked into a `const` global, one scalar per component
#[derive(Debug, Clone, PartialEq)]
pub struct ConstValue {
    pub components: Vec<Scalar>,
}

impl core::fmt::Display for ConstValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.components.iter().map(|c| c.to_c()).join(", "))
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: InternedSymbol,
    pub ty: Type,
    pub qualifier: Qualifier,
    pub value: Option<ConstValue>,
    /// Element count of an array parameter
    pub array_size: Option<u32>,
    /// Sampler register, assigned densely in declaration order
    pub register: Option<u32>,
    /// Declaration site. Built-ins have none
    pub span: Option<Span>,
}

impl Variable {
    pub fn built_in(name: &str, ty: Type, qualifier: Qualifier) -> Self {
        Self {
            name: InternedSymbol::new(name),
            ty,
            qualifier,
            value: None,
            array_size: None,
            register: None,
            span: None,
        }
    }

    /// A `const` without a literal is synthesized inside the kernel and is
    /// never passed as a parameter
    pub fn is_built_in_constant(&self) -> bool {
        self.qualifier == Qualifier::Const && self.value.is_none()
    }

    /// Synthetic variables are excluded from the backend's parameter pass
    pub fn is_synthetic(&self) -> bool {
        self.qualifier == Qualifier::Output
    }

    pub fn is_array(&self) -> bool {
        self.array_size.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.qualifier == Qualifier::Output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_c_literals() {
        assert_eq!(Scalar::Float(0.5).to_c(), "0.5f");
        assert_eq!(Scalar::Float(1.0).to_c(), "1.0f");
        assert_eq!(Scalar::Float(-2.25).to_c(), "-2.25f");
        assert_eq!(Scalar::Int(3).to_c(), "3");
        assert_eq!(Scalar::Int(i32::MIN).to_c(), "(-2147483647 - 1)");
        assert_eq!(Scalar::Bool(true).to_c(), "1");
    }

    #[test]
    fn parses_literals() {
        assert_eq!(Scalar::parse_literal(LiteralKind::Float, "2.5f"), Some(Scalar::Float(2.5)));
        assert_eq!(Scalar::parse_literal(LiteralKind::Float, ".5"), Some(Scalar::Float(0.5)));
        assert_eq!(Scalar::parse_literal(LiteralKind::Float, "1e-3"), Some(Scalar::Float(0.001)));
        assert_eq!(Scalar::parse_literal(LiteralKind::Float, "1e60"), None);
        assert_eq!(Scalar::parse_literal(LiteralKind::Integer, "99999999999"), None);
        assert_eq!(Scalar::parse_literal(LiteralKind::Boolean, "false"), Some(Scalar::Bool(false)));
    }

    #[test]
    fn converts_between_bases() {
        assert_eq!(Scalar::Int(2).convert(BaseType::Float), Scalar::Float(2.0));
        assert_eq!(Scalar::Float(2.9).convert(BaseType::Int), Scalar::Int(2));
        assert_eq!(Scalar::Float(0.0).convert(BaseType::Bool), Scalar::Bool(false));
    }

    #[test]
    fn classifies_built_ins() {
        let pos = Variable::built_in("pos0", Type::FLOAT2, Qualifier::Const);
        let color = Variable::built_in("color", Type::FLOAT4, Qualifier::Output);

        assert!(pos.is_built_in_constant());
        assert!(!pos.is_synthetic());
        assert!(color.is_synthetic());
        assert!(color.is_writable());
    }
}
