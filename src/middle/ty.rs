//! Types of the effect language

use strum::Display;

/// Scalar element type of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BaseType {
    Float,
    Int,
    Bool,
}

/// The three disjoint kinds of sampler an effect program can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    /// Image input seen through the consuming node's transform
    Transformed,
    /// Image input seen before any transform is applied
    Logical,
    /// Flat float buffer without image semantics
    FloatMap,
}

impl SamplerKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Transformed => "sampler",
            Self::Logical => "lsampler",
            Self::FloatMap => "fsampler",
        }
    }

    /// Image samplers register their input bounds with the effect peer
    pub fn is_image(self) -> bool {
        match self {
            Self::Transformed | Self::Logical => true,
            Self::FloatMap => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    /// Scalar (width 1) or vector (width 2..=4) of a base type
    Value(BaseType, u8),
    Sampler(SamplerKind),
}

impl Type {
    pub const FLOAT: Self = Self::Value(BaseType::Float, 1);
    pub const FLOAT2: Self = Self::Value(BaseType::Float, 2);
    pub const FLOAT3: Self = Self::Value(BaseType::Float, 3);
    pub const FLOAT4: Self = Self::Value(BaseType::Float, 4);
    pub const INT: Self = Self::Value(BaseType::Int, 1);
    pub const INT2: Self = Self::Value(BaseType::Int, 2);
    pub const INT3: Self = Self::Value(BaseType::Int, 3);
    pub const INT4: Self = Self::Value(BaseType::Int, 4);
    pub const BOOL: Self = Self::Value(BaseType::Bool, 1);
    pub const BOOL2: Self = Self::Value(BaseType::Bool, 2);
    pub const BOOL3: Self = Self::Value(BaseType::Bool, 3);
    pub const BOOL4: Self = Self::Value(BaseType::Bool, 4);
    pub const TRANSFORMED_SAMPLER: Self = Self::Sampler(SamplerKind::Transformed);
    pub const LOGICAL_SAMPLER: Self = Self::Sampler(SamplerKind::Logical);
    pub const FLOAT_MAP_SAMPLER: Self = Self::Sampler(SamplerKind::FloatMap);

    /// Number of scalar components, 0 for void and samplers
    pub fn width(self) -> usize {
        match self {
            Self::Value(_, width) => width as usize,
            Self::Void | Self::Sampler(_) => 0,
        }
    }

    pub fn base(self) -> Option<BaseType> {
        match self {
            Self::Value(base, _) => Some(base),
            Self::Void | Self::Sampler(_) => None,
        }
    }

    pub fn sampler_kind(self) -> Option<SamplerKind> {
        match self {
            Self::Sampler(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_scalar(self) -> bool {
        matches!(self, Self::Value(_, 1))
    }

    pub fn is_vector(self) -> bool {
        matches!(self, Self::Value(_, 2..))
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Value(BaseType::Float | BaseType::Int, _))
    }

    pub fn is_value(self) -> bool {
        matches!(self, Self::Value(..))
    }

    /// Same base type with a different width
    pub fn with_width(self, width: usize) -> Self {
        match self {
            Self::Value(base, _) => Self::Value(base, width as u8),
            other => other,
        }
    }

    /// Same width with a different base type
    pub fn with_base(self, base: BaseType) -> Self {
        match self {
            Self::Value(_, width) => Self::Value(base, width),
            other => other,
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Value(base, 1) => write!(f, "{base}"),
            Type::Value(base, width) => write!(f, "{base}{width}"),
            Type::Sampler(kind) => f.write_str(kind.keyword()),
        }
    }
}

/// Suffixes used when a vector is expanded into scalars
pub const FIELD_NAMES: [&str; 4] = ["x", "y", "z", "w"];

/// Which naming set a swizzle is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwizzleSet {
    /// `x y z w`
    Position,
    /// `r g b a`
    Color,
}

/// Maps a swizzle letter to its component index: `r|x -> 0, g|y -> 1,
/// b|z -> 2, a|w -> 3`
pub fn component_index(c: char) -> Option<(usize, SwizzleSet)> {
    match c {
        'x' => Some((0, SwizzleSet::Position)),
        'y' => Some((1, SwizzleSet::Position)),
        'z' => Some((2, SwizzleSet::Position)),
        'w' => Some((3, SwizzleSet::Position)),
        'r' => Some((0, SwizzleSet::Color)),
        'g' => Some((1, SwizzleSet::Color)),
        'b' => Some((2, SwizzleSet::Color)),
        'a' => Some((3, SwizzleSet::Color)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swizzle {
    pub components: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwizzleError {
    Empty,
    TooLong,
    UnknownComponent(char),
    MixedSets,
    OutOfRange { component: char, width: usize },
}

impl core::fmt::Display for SwizzleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("empty swizzle"),
            Self::TooLong => f.write_str("swizzle selects more than 4 components"),
            Self::UnknownComponent(c) => write!(f, "`{c}` is not a swizzle component"),
            Self::MixedSets => {
                f.write_str("swizzle mixes `rgba` and `xyzw` component names")
            }
            Self::OutOfRange { component, width } => {
                write!(f, "component `{component}` is out of range for a {width}-component vector")
            }
        }
    }
}

impl Swizzle {
    /// Parses a swizzle selecting from a vector of `width` components
    pub fn parse(field: &str, width: usize) -> Result<Self, SwizzleError> {
        if field.is_empty() {
            return Err(SwizzleError::Empty);
        }

        if field.chars().count() > 4 {
            return Err(SwizzleError::TooLong);
        }

        let mut set = None;
        let mut components = Vec::with_capacity(field.len());

        for c in field.chars() {
            let (index, this_set) =
                component_index(c).ok_or(SwizzleError::UnknownComponent(c))?;

            if *set.get_or_insert(this_set) != this_set {
                return Err(SwizzleError::MixedSets);
            }

            if index >= width {
                return Err(SwizzleError::OutOfRange {
                    component: c,
                    width,
                });
            }

            components.push(index);
        }

        Ok(Self { components })
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Whether every component is selected at most once, as required of an
    /// assignment target
    pub fn is_distinct(&self) -> bool {
        let mut seen = [false; 4];

        self.components
            .iter()
            .all(|c| !std::mem::replace(&mut seen[*c], true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_and_position_names_share_indices() {
        for (color, position, index) in [('r', 'x', 0), ('g', 'y', 1), ('b', 'z', 2), ('a', 'w', 3)]
        {
            assert_eq!(component_index(color).unwrap().0, index);
            assert_eq!(component_index(position).unwrap().0, index);
        }
    }

    #[test]
    fn parses_swizzles() {
        assert_eq!(Swizzle::parse("rgba", 4).unwrap().components, vec![0, 1, 2, 3]);
        assert_eq!(Swizzle::parse("xyz", 4).unwrap().components, vec![0, 1, 2]);
        assert_eq!(Swizzle::parse("wzyx", 4).unwrap().components, vec![3, 2, 1, 0]);
        assert_eq!(Swizzle::parse("xxxx", 2).unwrap().components, vec![0, 0, 0, 0]);
    }

    #[test]
    fn rejects_mixed_naming_sets() {
        assert_eq!(Swizzle::parse("ry", 4), Err(SwizzleError::MixedSets));
        assert_eq!(Swizzle::parse("xg", 4), Err(SwizzleError::MixedSets));
        assert!(Swizzle::parse("rg", 4).is_ok());
        assert!(Swizzle::parse("xy", 4).is_ok());
    }

    #[test]
    fn rejects_out_of_range_and_unknown() {
        assert_eq!(
            Swizzle::parse("z", 2),
            Err(SwizzleError::OutOfRange {
                component: 'z',
                width: 2
            })
        );
        assert_eq!(Swizzle::parse("q", 4), Err(SwizzleError::UnknownComponent('q')));
        assert_eq!(Swizzle::parse("xyzwx", 4), Err(SwizzleError::TooLong));
    }

    #[test]
    fn distinct_components() {
        assert!(Swizzle::parse("xyz", 4).unwrap().is_distinct());
        assert!(!Swizzle::parse("xx", 4).unwrap().is_distinct());
    }

    #[test]
    fn displays_types() {
        assert_eq!(Type::FLOAT.to_string(), "float");
        assert_eq!(Type::INT3.to_string(), "int3");
        assert_eq!(Type::LOGICAL_SAMPLER.to_string(), "lsampler");
    }
}
