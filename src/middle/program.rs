//! The resolved form of one effect program

use hashbrown::HashMap;

use super::{
    ty::Type,
    variable::{Scalar, Variable},
};
use crate::frontend::{
    SourceFile,
    ast::{FunctionDefinition, Module, NodeId},
};

/// Index of a global in [`ProgramUnit::globals`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub usize);

/// What an identifier in an expression refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Global(GlobalId),
    /// A local declared by the [`crate::frontend::ast::Local`] with this id
    Local(NodeId),
    /// The nth parameter of the enclosing function
    Parameter(usize),
}

/// Functions and globals of a resolved program, plus the type of every
/// expression and the target of every identifier
///
/// Built once by the resolver and never modified afterwards.
#[derive(Debug)]
pub struct ProgramUnit<'ast> {
    pub module: &'ast Module<'ast>,
    /// Function definitions in source order
    pub functions: Vec<&'ast FunctionDefinition>,
    /// Built-ins first, then user globals in declaration order
    pub globals: Vec<Variable>,
    pub(crate) expression_types: HashMap<NodeId, Type>,
    pub(crate) resolutions: HashMap<NodeId, Resolution>,
    pub(crate) literal_values: HashMap<NodeId, Scalar>,
}

impl<'ast> ProgramUnit<'ast> {
    pub fn source_file(&self) -> &'ast SourceFile {
        self.module.source_file
    }

    /// Type assigned to the expression with this id
    ///
    /// Panics when the id was never typed, which means lowering is walking a
    /// tree that did not come out of resolution.
    pub fn type_of(&self, expression: NodeId) -> Type {
        self.expression_types[&expression]
    }

    /// What the identifier with this id refers to
    pub fn resolution_of(&self, identifier: NodeId) -> Resolution {
        self.resolutions[&identifier]
    }

    /// Parsed value of the literal with this id
    pub fn literal_value(&self, literal: NodeId) -> Scalar {
        self.literal_values[&literal]
    }

    /// Value of a negated integer literal folded into one constant
    pub fn folded_literal(&self, expression: NodeId) -> Option<Scalar> {
        self.literal_values.get(&expression).copied()
    }

    pub fn global(&self, id: GlobalId) -> &Variable {
        &self.globals[id.0]
    }

    pub fn global_by_name(&self, name: &str) -> Option<&Variable> {
        self.globals.iter().find(|g| g.name.value() == name)
    }

    pub fn main(&self) -> Option<&'ast FunctionDefinition> {
        self.functions
            .iter()
            .copied()
            .find(|f| f.name.symbol.value() == "main")
    }

    /// Non-synthetic globals sorted by name
    ///
    /// Both generated parameter lists are built from this order, so it must
    /// only depend on the program text.
    pub fn sorted_globals(&self) -> Vec<&Variable> {
        let mut globals = self
            .globals
            .iter()
            .filter(|g| !g.is_synthetic())
            .collect::<Vec<_>>();

        globals.sort_by(|a, b| a.name.value().cmp(b.name.value()));
        globals
    }

    /// Samplers in register order
    pub fn samplers(&self) -> Vec<&Variable> {
        let mut samplers = self
            .globals
            .iter()
            .filter(|g| g.register.is_some())
            .collect::<Vec<_>>();

        samplers.sort_by_key(|g| g.register);
        samplers
    }
}
