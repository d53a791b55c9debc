//! State that lives for exactly one compile
//!
//! Every compile creates its own [`CompileContext`] and threads it through
//! resolution, lowering and generation, so two compiles never observe each
//! other's function tables or glue code.

use hashbrown::{HashMap, HashSet};

use crate::frontend::{ast::FunctionDefinition, intern::InternedSymbol};

#[derive(Debug, Default)]
pub struct CompileContext<'ast> {
    /// User function definitions by name
    functions: HashMap<InternedSymbol, &'ast FunctionDefinition>,
    /// Functions whose `<name>_res` variable the kernel already declares
    declared_results: HashSet<InternedSymbol>,
    /// Glue blocks in source order
    glue_code: Vec<String>,
}

impl<'ast> CompileContext<'ast> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a function definition. Returns the previous definition with
    /// the same name if there was one
    pub fn define_function(
        &mut self,
        function: &'ast FunctionDefinition,
    ) -> Option<&'ast FunctionDefinition> {
        self.functions.insert(function.name.symbol, function)
    }

    pub fn function(&self, name: InternedSymbol) -> Option<&'ast FunctionDefinition> {
        self.functions.get(&name).copied()
    }

    /// Marks the result variable of `function` as declared. Returns `true`
    /// the first time it is called for a function
    pub fn declare_result(&mut self, function: InternedSymbol) -> bool {
        self.declared_results.insert(function)
    }

    pub fn is_result_declared(&self, function: InternedSymbol) -> bool {
        self.declared_results.contains(&function)
    }

    pub fn append_glue(&mut self, code: impl Into<String>) {
        self.glue_code.push(code.into());
    }

    /// All glue blocks joined in source order
    pub fn glue_code(&self) -> String {
        self.glue_code.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_declared_once() {
        let mut context = CompileContext::new();
        let luma = InternedSymbol::new("luma");

        assert!(!context.is_result_declared(luma));
        assert!(context.declare_result(luma));
        assert!(!context.declare_result(luma));
        assert!(context.is_result_declared(luma));
    }

    #[test]
    fn fresh_contexts_share_nothing() {
        let mut first = CompileContext::new();
        first.append_glue("int a;");
        first.declare_result(InternedSymbol::new("f"));

        let second = CompileContext::new();
        assert!(second.glue_code().is_empty());
        assert!(!second.is_result_declared(InternedSymbol::new("f")));
    }
}
