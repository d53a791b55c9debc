//! Built-in variables and functions of the effect language

use strum::{Display, EnumString};

use super::{
    ty::{BaseType, Type},
    variable::{Qualifier, Variable},
};

/// Number of interpolated sample positions (`pos0` .. `pos3`)
pub const SAMPLE_POSITIONS: u32 = 4;

/// Name of the interpolated position built-in for a sampler register
pub fn sample_position_name(register: u32) -> String {
    format!("pos{register}")
}

/// Built-in globals, registered before any user global
pub fn built_in_variables() -> Vec<Variable> {
    let mut variables = (0..SAMPLE_POSITIONS)
        .map(|register| {
            Variable::built_in(
                &sample_position_name(register),
                Type::FLOAT2,
                Qualifier::Const,
            )
        })
        .collect::<Vec<_>>();

    variables.push(Variable::built_in("pixcoord", Type::FLOAT2, Qualifier::Const));
    variables.push(Variable::built_in("color", Type::FLOAT4, Qualifier::Output));

    variables
}

/// If `name` is `posN`, the sampler register it interpolates
pub fn sample_position_register(name: &str) -> Option<u32> {
    let register = name.strip_prefix("pos")?.parse::<u32>().ok()?;
    (register < SAMPLE_POSITIONS).then_some(register)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BuiltInFunction {
    Abs,
    Floor,
    Ceil,
    Fract,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sign,
    Min,
    Max,
    Pow,
    Step,
    Mod,
    Clamp,
    Mix,
    Smoothstep,
    Dot,
    Length,
    Distance,
    Normalize,
    Sample,
}

impl BuiltInFunction {
    pub fn lookup(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    pub fn arity(self) -> usize {
        match self {
            Self::Abs
            | Self::Floor
            | Self::Ceil
            | Self::Fract
            | Self::Sqrt
            | Self::Sin
            | Self::Cos
            | Self::Tan
            | Self::Exp
            | Self::Log
            | Self::Sign
            | Self::Length
            | Self::Normalize => 1,
            Self::Min
            | Self::Max
            | Self::Pow
            | Self::Step
            | Self::Mod
            | Self::Dot
            | Self::Distance
            | Self::Sample => 2,
            Self::Clamp | Self::Mix | Self::Smoothstep => 3,
        }
    }

    /// Result type of a call with the given argument types, or a description
    /// of why the arguments are rejected
    pub fn result_type(self, arguments: &[Type]) -> Result<Type, String> {
        if arguments.len() != self.arity() {
            return Err(format!(
                "`{self}` takes {} argument(s) but {} were supplied",
                self.arity(),
                arguments.len()
            ));
        }

        if self == Self::Sample {
            return match arguments {
                [Type::Sampler(_), Type::FLOAT2] => Ok(Type::FLOAT4),
                [Type::Sampler(_), other] => Err(format!(
                    "`sample` expects a float2 position but found {other}"
                )),
                [other, _] => Err(format!("`sample` expects a sampler but found {other}")),
                _ => unreachable!(),
            };
        }

        for (i, argument) in arguments.iter().enumerate() {
            if argument.base() != Some(BaseType::Float) {
                return Err(format!(
                    "argument {} of `{self}` must be float or a float vector but found {argument}",
                    i + 1
                ));
            }
        }

        // The argument whose width decides the result
        let (main, broadcastable): (usize, &[usize]) = match self {
            Self::Min | Self::Max | Self::Mod => (0, &[1]),
            Self::Step => (1, &[0]),
            Self::Clamp => (0, &[1, 2]),
            Self::Mix => (0, &[2]),
            Self::Smoothstep => (2, &[0, 1]),
            _ => (0, &[]),
        };

        let main_type = arguments[main];

        for (i, argument) in arguments.iter().enumerate() {
            let matches = *argument == main_type
                || (broadcastable.contains(&i) && argument.is_scalar());

            if !matches {
                return Err(format!(
                    "argument {} of `{self}` must match {main_type} but found {argument}",
                    i + 1
                ));
            }
        }

        Ok(match self {
            Self::Dot | Self::Length | Self::Distance => Type::FLOAT,
            _ => main_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_by_name() {
        assert_eq!(BuiltInFunction::lookup("smoothstep"), Some(BuiltInFunction::Smoothstep));
        assert_eq!(BuiltInFunction::lookup("texture2D"), None);
        assert_eq!(BuiltInFunction::Normalize.to_string(), "normalize");
    }

    #[test]
    fn types_component_wise_calls() {
        assert_eq!(BuiltInFunction::Abs.result_type(&[Type::FLOAT3]), Ok(Type::FLOAT3));
        assert_eq!(
            BuiltInFunction::Min.result_type(&[Type::FLOAT4, Type::FLOAT]),
            Ok(Type::FLOAT4)
        );
        assert_eq!(
            BuiltInFunction::Mix.result_type(&[Type::FLOAT3, Type::FLOAT3, Type::FLOAT]),
            Ok(Type::FLOAT3)
        );
        assert_eq!(
            BuiltInFunction::Step.result_type(&[Type::FLOAT, Type::FLOAT2]),
            Ok(Type::FLOAT2)
        );
        assert!(BuiltInFunction::Min.result_type(&[Type::FLOAT, Type::FLOAT4]).is_err());
        assert!(BuiltInFunction::Sqrt.result_type(&[Type::INT]).is_err());
    }

    #[test]
    fn types_reductions_and_sampling() {
        assert_eq!(
            BuiltInFunction::Dot.result_type(&[Type::FLOAT3, Type::FLOAT3]),
            Ok(Type::FLOAT)
        );
        assert_eq!(
            BuiltInFunction::Sample.result_type(&[Type::FLOAT_MAP_SAMPLER, Type::FLOAT2]),
            Ok(Type::FLOAT4)
        );
        assert!(
            BuiltInFunction::Sample
                .result_type(&[Type::FLOAT2, Type::FLOAT2])
                .is_err()
        );
    }

    #[test]
    fn sample_position_registers() {
        assert_eq!(sample_position_register("pos2"), Some(2));
        assert_eq!(sample_position_register("pos4"), None);
        assert_eq!(sample_position_register("position"), None);
    }
}
