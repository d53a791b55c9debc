//! The ordered parameter list both artifacts are generated from
//!
//! The glue `filter` call, the glue `native` declaration and the JNI kernel
//! signature are all projections of one [`ParamList`], so they cannot drift
//! apart. The list also owns the set of names the generated code already
//! uses, and refuses a second owner for any of them.

use hashbrown::HashMap;
use itertools::Itertools;

use crate::{
    error::{CompileError, CompileResult},
    middle::ty::BaseType,
};

/// Java type of one formal, with its JNI counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Float,
    Int,
    Boolean,
    FloatArray,
    IntArray,
}

impl ParamType {
    pub fn scalar(base: BaseType) -> Self {
        match base {
            BaseType::Float => Self::Float,
            BaseType::Int => Self::Int,
            BaseType::Bool => Self::Boolean,
        }
    }

    pub fn array(base: BaseType) -> Option<Self> {
        match base {
            BaseType::Float => Some(Self::FloatArray),
            BaseType::Int => Some(Self::IntArray),
            BaseType::Bool => None,
        }
    }

    pub fn glue(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Boolean => "boolean",
            Self::FloatArray => "float[]",
            Self::IntArray => "int[]",
        }
    }

    pub fn native(self) -> &'static str {
        match self {
            Self::Float => "jfloat",
            Self::Int => "jint",
            Self::Boolean => "jboolean",
            Self::FloatArray => "jfloatArray",
            Self::IntArray => "jintArray",
        }
    }

    /// Element type the kernel sees once an array is pinned
    pub fn element(self) -> Option<&'static str> {
        match self {
            Self::FloatArray => Some("jfloat"),
            Self::IntArray => Some("jint"),
            Self::Float | Self::Int | Self::Boolean => None,
        }
    }

    pub fn is_array(self) -> bool {
        self.element().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub ty: ParamType,
    /// Global this parameter was generated for
    pub owner: String,
}

impl Parameter {
    /// Arrays arrive as `<name>_arr` and are pinned into `<name>`
    pub fn native_name(&self) -> String {
        if self.ty.is_array() {
            format!("{}_arr", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Names the kernel and glue derive for a sampler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerNames {
    /// Pixel or float buffer
    pub buffer: String,
    /// Source rectangle as `x1, y1, x2, y2`
    pub rect: [String; 4],
    pub width: String,
    pub height: String,
    pub scan: String,
}

impl SamplerNames {
    pub fn new(name: &str) -> Self {
        Self {
            buffer: name.to_owned(),
            rect: ["x1", "y1", "x2", "y2"].map(|corner| format!("{name}Rect_{corner}")),
            width: format!("{name}W"),
            height: format!("{name}H"),
            scan: format!("{name}Scan"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ParamList {
    parameters: Vec<Parameter>,
    /// Every generated name in use, mapped to who uses it
    owners: HashMap<String, String>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name` for `owner` without adding a parameter
    pub fn reserve(&mut self, owner: &str, name: impl Into<String>) -> CompileResult<()> {
        let name = name.into();

        match self.owners.get(&name) {
            Some(existing) if existing == owner => Ok(()),
            Some(existing) => Err(CompileError::generation(
                owner,
                format!("generated name `{name}` is already used by `{existing}`"),
            )),
            None => {
                self.owners.insert(name, owner.to_owned());
                Ok(())
            }
        }
    }

    pub fn push(&mut self, owner: &str, name: impl Into<String>, ty: ParamType) -> CompileResult<()> {
        let parameter = Parameter {
            name: name.into(),
            ty,
            owner: owner.to_owned(),
        };

        self.reserve(owner, parameter.name.clone())?;
        if ty.is_array() {
            self.reserve(owner, parameter.native_name())?;
        }

        tracing::trace!(owner, name = %parameter.name, ?ty, "parameter");
        self.parameters.push(parameter);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// `float amount, int[] src, ...`
    pub fn glue_formals(&self) -> Vec<String> {
        self.parameters
            .iter()
            .map(|p| format!("{} {}", p.ty.glue(), p.name))
            .collect()
    }

    /// `jfloat amount, jintArray src_arr, ...`
    pub fn native_formals(&self) -> Vec<String> {
        self.parameters
            .iter()
            .map(|p| format!("{} {}", p.ty.native(), p.native_name()))
            .collect()
    }

    /// Glue locals passed to the native call, in formal order
    pub fn glue_arguments(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Formals laid out one per line after `lead`
    pub fn layout(lead: &[&str], formals: Vec<String>, separator: &str) -> String {
        lead.iter()
            .map(|l| l.to_string())
            .chain(formals)
            .join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_list() -> ParamList {
        let mut list = ParamList::new();
        list.push("amount", "amount", ParamType::Float).unwrap();

        let names = SamplerNames::new("src");
        list.push("src", &names.buffer, ParamType::IntArray).unwrap();
        for corner in &names.rect {
            list.push("src", corner, ParamType::Float).unwrap();
        }
        for size in [&names.width, &names.height, &names.scan] {
            list.push("src", size, ParamType::Int).unwrap();
        }

        list
    }

    #[test]
    fn projects_both_artifacts_in_lockstep() {
        let list = sample_list();

        assert_eq!(
            list.glue_formals(),
            [
                "float amount",
                "int[] src",
                "float srcRect_x1",
                "float srcRect_y1",
                "float srcRect_x2",
                "float srcRect_y2",
                "int srcW",
                "int srcH",
                "int srcScan",
            ]
        );
        assert_eq!(
            list.native_formals(),
            [
                "jfloat amount",
                "jintArray src_arr",
                "jfloat srcRect_x1",
                "jfloat srcRect_y1",
                "jfloat srcRect_x2",
                "jfloat srcRect_y2",
                "jint srcW",
                "jint srcH",
                "jint srcScan",
            ]
        );
        assert_eq!(list.glue_arguments().len(), list.len());
    }

    #[test]
    fn rejects_a_second_owner() {
        let mut list = sample_list();

        let error = list.push("srcW", "srcW", ParamType::Float).unwrap_err();
        assert!(matches!(error, CompileError::Generation { ref variable, .. } if variable == "srcW"));
        assert!(error.to_string().contains("already used by `src`"));

        let error = list.reserve("src_arr", "src_arr").unwrap_err();
        assert!(error.to_string().contains("`src_arr`"));
    }

    #[test]
    fn lays_out_formals() {
        let list = sample_list();
        let text = ParamList::layout(&["int[] dst"], list.glue_formals()[..2].to_vec(), ", ");

        assert_eq!(text, "int[] dst, float amount, int[] src");
    }
}
