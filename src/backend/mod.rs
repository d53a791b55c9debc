//! The backend turns a resolved [`ProgramUnit`] into generated source. The
//! software target emits a Java peer class that marshals parameters and
//! samplers, plus a JNI C kernel that runs the lowered `main` once per
//! destination pixel.
//!
//! Lowering scalarizes every vector expression into plain C statements. The
//! generator then classifies each global, builds one ordered parameter list
//! shared by both artifacts and fills the two templates.

use crate::{
    context::CompileContext, error::CompileResult, middle::program::ProgramUnit,
    middle::ty::BaseType,
};

pub mod lowering;
pub mod params;
pub mod peer;
pub mod pin;
pub mod software;
pub mod template;

/// Naming decisions made by whoever requests a compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Effect class the peer casts `getEffect()` to
    pub effect_name: String,
    /// Generated peer class name
    pub peer_name: String,
    /// Render state type the peer is generic over
    pub generics_name: Option<String>,
    /// Extra interface the peer implements
    pub interface_name: Option<String>,
    pub package: String,
}

impl CompileOptions {
    pub fn new(effect_name: impl Into<String>, peer_name: impl Into<String>) -> Self {
        Self {
            effect_name: effect_name.into(),
            peer_name: peer_name.into(),
            generics_name: None,
            interface_name: None,
            package: "com.sun.scenario.effect.impl.sw.sse".to_owned(),
        }
    }

    pub fn with_generics(mut self, generics_name: impl Into<String>) -> Self {
        self.generics_name = Some(generics_name.into());
        self
    }

    pub fn with_interface(mut self, interface_name: impl Into<String>) -> Self {
        self.interface_name = Some(interface_name.into());
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }
}

/// The two generated artifacts. Their parameter lists correspond
/// positionally, so they are only valid together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenCode {
    /// Java peer class source
    pub glue: String,
    /// JNI C kernel source
    pub native: String,
}

pub trait CodeGenerator {
    fn generate<'ast>(
        &self,
        program: &ProgramUnit<'ast>,
        context: &mut CompileContext<'ast>,
        options: &CompileOptions,
    ) -> CompileResult<GenCode>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// CPU fallback through a JNI kernel
    Software,
}

impl Target {
    pub fn code_generator(self) -> impl CodeGenerator {
        match self {
            Target::Software => software::SoftwareBackend,
        }
    }
}

/// Scalar names a value of `width` components lowers to: the base name for
/// scalars, `<base>_x`, `<base>_y` and so on for vectors
pub(crate) fn component_names(base: &str, width: usize) -> Vec<String> {
    match width {
        1 => vec![base.to_owned()],
        _ => crate::middle::ty::FIELD_NAMES[..width]
            .iter()
            .map(|field| format!("{base}_{field}"))
            .collect(),
    }
}

/// C type of one scalar component. Booleans are plain ints in the kernel
pub(crate) fn c_type(base: BaseType) -> &'static str {
    match base {
        BaseType::Float => "float",
        BaseType::Int | BaseType::Bool => "int",
    }
}

pub(crate) fn c_zero(base: BaseType) -> &'static str {
    match base {
        BaseType::Float => "0.0f",
        BaseType::Int | BaseType::Bool => "0",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_components() {
        assert_eq!(component_names("amount", 1), ["amount"]);
        assert_eq!(
            component_names("color", 4),
            ["color_x", "color_y", "color_z", "color_w"]
        );
    }
}
