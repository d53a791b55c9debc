use std::collections::{BTreeMap, VecDeque};

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use once_cell::sync::Lazy;

use super::{
    builtins::{self, BuiltInFunction},
    program::{GlobalId, ProgramUnit, Resolution},
    ty::{FIELD_NAMES, Swizzle, Type},
    variable::{ConstValue, Qualifier, Scalar, Variable},
};
use crate::{
    context::CompileContext,
    error::{CompileError, CompileResult},
    frontend::{
        ast::{
            BinaryOperator, BinaryOperatorClass, Block, Expression, ExpressionKind,
            FunctionCallArgumentList, FunctionDefinition, GlobalVariable, Identifier, ItemKind,
            Literal, LiteralKind, Local, Module, NodeId, QualifierKind, Statement,
            StatementKind, UnaryOperatorKind,
            visit::{self, Visitor},
        },
        intern::InternedSymbol,
        lexer::Span,
    },
};

/// Identifiers the generated glue class or native kernel already uses.
/// Globals and functions keep their source names in the generated code, so
/// they may not take any of these.
static RESERVED_IDENTIFIERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from_iter([
        // kernel locals and JNI plumbing
        "env", "klass", "dst", "dst_arr", "dstx", "dsty", "dstw", "dsth", "dstscan", "dx", "dy",
        "dyi", "pin_mode", "lsample", "fsample", "JNI_ABORT", "NULL",
        // glue method locals
        "effect", "rstate", "transform", "outputClip", "inputs", "dstBounds", "dstImg",
        "dstPixels",
        // math library
        "fabsf", "floorf", "ceilf", "sqrtf", "sinf", "cosf", "tanf", "expf", "logf", "powf",
        "fminf", "fmaxf", "fmodf",
        // C keywords outside the effect language
        "auto", "case", "char", "default", "double", "enum", "extern", "goto", "inline", "long",
        "register", "restrict", "short", "signed", "sizeof", "static", "struct", "switch",
        "typedef", "union", "unsigned", "volatile",
        // Java keywords outside the effect language
        "abstract", "assert", "boolean", "byte", "catch", "class", "extends", "final", "finally",
        "implements", "import", "instanceof", "interface", "native", "new", "null", "package",
        "private", "protected", "public", "super", "synchronized", "this", "throw", "throws",
        "transient", "try", "var",
    ])
});

/// Names shaped like the locals, temporaries and inlined parameters the
/// lowering invents
fn is_generated_name_shape(name: &str) -> bool {
    let numbered = |prefix: &str| {
        name.strip_prefix(prefix).is_some_and(|rest| {
            let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
            digits > 0 && (digits == rest.len() || rest[digits..].starts_with('_'))
        })
    };

    name.starts_with("l_") || numbered("t") || numbered("p")
}

/// Whether control can never run past the end of `statement`. Loops never
/// count, since their body may not run or may break out
fn always_returns(statement: &Statement) -> bool {
    match &statement.kind {
        StatementKind::Return(_) => true,
        StatementKind::Block(block) => block.statements.iter().any(always_returns),
        StatementKind::If {
            positive,
            negative: Some(negative),
            ..
        } => always_returns(positive) && always_returns(negative),
        _ => false,
    }
}

/// The integer literal directly under a unary minus
fn negated_integer(operator: UnaryOperatorKind, operand: &Expression) -> Option<&Literal> {
    match &operand.kind {
        ExpressionKind::Literal(literal)
            if operator == UnaryOperatorKind::Negate && literal.kind == LiteralKind::Integer =>
        {
            Some(literal)
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    resolution: Resolution,
    ty: Type,
}

#[derive(Debug, Clone, Copy)]
struct FunctionFrame<'ast> {
    function: &'ast FunctionDefinition,
    is_main: bool,
}

/// Effect program symbol resolver
///
/// Builds the global symbol table, checks every function body and assigns a
/// type to each expression. The result is an immutable [`ProgramUnit`].
#[derive(Debug)]
pub struct SymbolResolver<'ast, 'ctx> {
    module: &'ast Module<'ast>,
    context: &'ctx mut CompileContext<'ast>,
    scope_stack: ScopeStack<Binding>,
    globals: Vec<Variable>,
    functions: Vec<&'ast FunctionDefinition>,
    expression_types: HashMap<NodeId, Type>,
    resolutions: HashMap<NodeId, Resolution>,
    literal_values: HashMap<NodeId, Scalar>,
    current_function: Option<FunctionFrame<'ast>>,
    loop_depth: usize,
    next_register: u32,
}

impl<'ast, 'ctx> SymbolResolver<'ast, 'ctx> {
    /// Resolves a module in 3 steps.
    ///
    /// The first step binds the built-ins, then walks the top level items in
    /// order: globals are checked and bound (samplers take the next register),
    /// functions are recorded in the compile context and glue blocks are
    /// appended to its glue accumulator.
    ///
    /// The second step checks every function body against the global scope,
    /// binding parameters and locals and typing every expression.
    ///
    /// The last step rejects recursion between user functions, since every
    /// call is inlined by the lowering.
    pub fn resolve(
        module: &'ast Module<'ast>,
        context: &'ctx mut CompileContext<'ast>,
    ) -> CompileResult<ProgramUnit<'ast>> {
        let mut resolver = Self {
            module,
            context,
            scope_stack: ScopeStack::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            expression_types: HashMap::new(),
            resolutions: HashMap::new(),
            literal_values: HashMap::new(),
            current_function: None,
            loop_depth: 0,
            next_register: 0,
        };

        resolver.bind_built_ins();

        for item in &module.items {
            match &item.kind {
                ItemKind::GlobalVariable(global) => resolver.bind_global_variable(global)?,
                ItemKind::FunctionDefinition(function) => resolver.bind_function(function)?,
                ItemKind::GlueBlock(glue) => resolver.context.append_glue(glue.code.clone()),
            }
        }

        resolver.check_main()?;

        for function in resolver.functions.clone() {
            resolver.resolve_function_definition(function)?;
        }

        resolver.check_recursion()?;

        tracing::debug!(
            globals = resolver.globals.len(),
            functions = resolver.functions.len(),
            samplers = resolver.next_register,
            "resolved effect program"
        );

        Ok(ProgramUnit {
            module,
            functions: resolver.functions,
            globals: resolver.globals,
            expression_types: resolver.expression_types,
            resolutions: resolver.resolutions,
            literal_values: resolver.literal_values,
        })
    }

    fn error(&self, offending_span: Span, message: impl Into<String>) -> CompileError {
        self.module.source_file.semantic_error(offending_span, message)
    }

    fn bind_built_ins(&mut self) {
        for variable in builtins::built_in_variables() {
            self.add_global(variable);
        }
    }

    fn add_global(&mut self, variable: Variable) {
        let id = GlobalId(self.globals.len());

        self.scope_stack.add_global_binding(
            variable.name,
            Binding {
                resolution: Resolution::Global(id),
                ty: variable.ty,
            },
        );
        self.globals.push(variable);
    }

    /// Rejects names that collide with another global, a function, a
    /// built-in function or the generated code
    fn check_global_name(&self, name: &Identifier) -> CompileResult<()> {
        let value = name.symbol.value();

        if self.scope_stack.get_global_binding(name.symbol).is_some()
            || self.context.function(name.symbol).is_some()
        {
            return Err(self.error(name.span, format!("`{value}` is already defined")));
        }

        if BuiltInFunction::lookup(value).is_some() {
            return Err(self.error(
                name.span,
                format!("`{value}` is the name of a built-in function"),
            ));
        }

        if RESERVED_IDENTIFIERS.contains(value) || is_generated_name_shape(value) {
            return Err(self.error(
                name.span,
                format!("`{value}` is reserved by the generated kernel"),
            ));
        }

        Ok(())
    }

    fn bind_global_variable(&mut self, global: &'ast GlobalVariable) -> CompileResult<()> {
        self.check_global_name(&global.name)?;

        let Some(qualifier) = &global.qualifier else {
            return Err(self.error(
                global.name.span,
                format!(
                    "global `{}` needs a `const` or `param` qualifier",
                    global.name.symbol
                ),
            ));
        };

        let ty = global.ty.ty;

        if ty == Type::Void {
            return Err(self.error(global.ty.span, "globals cannot have type void"));
        }

        let mut variable = Variable {
            name: global.name.symbol,
            ty,
            qualifier: Qualifier::Param,
            value: None,
            array_size: None,
            register: None,
            span: Some(global.name.span),
        };

        match qualifier.kind {
            QualifierKind::Param => {
                if let Some(initializer) = &global.initializer {
                    return Err(self.error(
                        initializer.span,
                        format!("param `{}` cannot have an initializer", global.name.symbol),
                    ));
                }

                if let Some(array_size) = &global.array_size {
                    if !ty.is_numeric() {
                        return Err(self.error(
                            global.ty.span,
                            format!("arrays of {ty} are not supported"),
                        ));
                    }

                    if array_size.length == 0 {
                        return Err(self.error(array_size.span, "array length must be positive"));
                    }

                    variable.array_size = Some(array_size.length);
                }

                if ty.sampler_kind().is_some() {
                    variable.register = Some(self.next_register);
                    self.next_register += 1;
                }
            }
            QualifierKind::Const => {
                if ty.sampler_kind().is_some() {
                    return Err(self.error(qualifier.span, "samplers must be declared `param`"));
                }

                if let Some(array_size) = &global.array_size {
                    return Err(self.error(array_size.span, "only `param` globals can be arrays"));
                }

                let Some(initializer) = &global.initializer else {
                    return Err(self.error(
                        global.name.span,
                        format!("const `{}` needs an initializer", global.name.symbol),
                    ));
                };

                let (value_type, components) = self.evaluate_constant(initializer)?;

                if value_type != ty {
                    return Err(self.error(
                        initializer.span,
                        format!(
                            "const `{}` is declared {ty} but initialized with {value_type}",
                            global.name.symbol
                        ),
                    ));
                }

                variable.qualifier = Qualifier::Const;
                variable.value = Some(ConstValue { components });
            }
        }

        self.add_global(variable);

        Ok(())
    }

    /// Folds a `const` initializer, which may only be built from literals
    fn evaluate_constant(&self, expression: &Expression) -> CompileResult<(Type, Vec<Scalar>)> {
        match &expression.kind {
            ExpressionKind::Literal(literal) => {
                let value = self.literal_value(literal)?;
                Ok((value.ty(), vec![value]))
            }
            ExpressionKind::Grouping(inner) => self.evaluate_constant(inner),
            ExpressionKind::Unary { operator, operand }
                if operator.kind == UnaryOperatorKind::Negate =>
            {
                if let Some(literal) = negated_integer(operator.kind, operand) {
                    let value = self.negative_literal(literal)?;
                    return Ok((value.ty(), vec![value]));
                }

                let (ty, components) = self.evaluate_constant(operand)?;

                let negated = components
                    .into_iter()
                    .map(|c| c.negate())
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| self.error(expression.span, "cannot negate this constant"))?;

                Ok((ty, negated))
            }
            ExpressionKind::Constructor { ty, arguments } => {
                let mut components = Vec::new();
                let mut argument_types = Vec::new();

                for argument in &arguments.arguments {
                    let (argument_type, argument_components) = self.evaluate_constant(argument)?;
                    argument_types.push(argument_type);
                    components.extend(argument_components);
                }

                self.check_constructor(ty.ty, &argument_types, arguments.span)?;

                let Some(base) = ty.ty.base() else {
                    unreachable!("constructor types are checked to be values")
                };

                let components = if components.len() == 1 {
                    vec![components[0].convert(base); ty.ty.width()]
                } else {
                    components.into_iter().map(|c| c.convert(base)).collect()
                };

                Ok((ty.ty, components))
            }
            _ => Err(self.error(
                expression.span,
                "const initializer must be a literal or a constructor of literals",
            )),
        }
    }

    fn literal_value(&self, literal: &Literal) -> CompileResult<Scalar> {
        Scalar::parse_literal(literal.kind, literal.symbol.value()).ok_or_else(|| {
            self.error(
                literal.span,
                format!("literal `{}` is out of range", literal.symbol),
            )
        })
    }

    /// Value of `-literal`, parsed with its sign so the most negative
    /// integer fits
    fn negative_literal(&self, literal: &Literal) -> CompileResult<Scalar> {
        Scalar::parse_literal(literal.kind, &format!("-{}", literal.symbol)).ok_or_else(|| {
            self.error(
                literal.span,
                format!("literal `-{}` is out of range", literal.symbol),
            )
        })
    }

    fn bind_function(&mut self, function: &'ast FunctionDefinition) -> CompileResult<()> {
        self.check_global_name(&function.name)?;

        let return_type = function.return_type.ty;

        if return_type.sampler_kind().is_some() {
            return Err(self.error(
                function.return_type.span,
                "functions cannot return samplers",
            ));
        }

        for parameter in &function.parameters {
            if !parameter.ty.ty.is_value() {
                return Err(self.error(
                    parameter.ty.span,
                    format!("parameters cannot have type {}", parameter.ty.ty),
                ));
            }
        }

        self.context.define_function(function);
        self.functions.push(function);

        Ok(())
    }

    fn check_main(&self) -> CompileResult<()> {
        let Some(main) = self
            .functions
            .iter()
            .find(|f| f.name.symbol.value() == "main")
        else {
            return Err(self.error(Span::new(0, 0), "program has no `main` function"));
        };

        if main.return_type.ty != Type::Void || !main.parameters.is_empty() {
            return Err(self.error(
                main.name.span,
                "`main` must take no parameters and return void",
            ));
        }

        Ok(())
    }

    /// Resolves all names within a function definition
    fn resolve_function_definition(
        &mut self,
        function: &'ast FunctionDefinition,
    ) -> CompileResult<()> {
        self.current_function = Some(FunctionFrame {
            function,
            is_main: function.name.symbol.value() == "main",
        });
        self.scope_stack.push_shallow_scope();

        for (index, parameter) in function.parameters.iter().enumerate() {
            self.bind_local_name(&parameter.name, parameter.ty.ty)?;

            self.scope_stack.add_shallow_binding(
                parameter.name.symbol,
                Binding {
                    resolution: Resolution::Parameter(index),
                    ty: parameter.ty.ty,
                },
            );
        }

        // The body shares the parameter scope
        for statement in &function.body.statements {
            self.resolve_statement(statement)?;
        }

        if function.return_type.ty.is_value()
            && !function.body.statements.iter().any(always_returns)
        {
            return Err(self.error(
                function.name.span,
                format!("not all paths of `{}` return a value", function.name.symbol),
            ));
        }

        self.scope_stack.pop_shallow_scope();
        self.current_function = None;

        Ok(())
    }

    /// Locals may not hide a global or anything else already visible
    fn bind_local_name(&self, name: &Identifier, ty: Type) -> CompileResult<()> {
        self.check_component_names(name, ty)?;

        let Some(existing) = self.scope_stack.get_binding(name.symbol) else {
            return Ok(());
        };

        let message = match existing.resolution {
            Resolution::Global(_) => format!("`{}` shadows a global", name.symbol),
            _ if self.scope_stack.get_shallow_binding(name.symbol).is_some() => {
                format!("`{}` is already declared in this scope", name.symbol)
            }
            _ => format!("`{}` shadows an enclosing declaration", name.symbol),
        };

        Err(self.error(name.span, message))
    }

    /// Vector locals lower to one variable per component named `<name>_x`
    /// and so on, so a visible local may not already own one of those names
    fn check_component_names(&self, name: &Identifier, ty: Type) -> CompileResult<()> {
        let is_local = |symbol: &str| {
            InternedSymbol::existing(symbol)
                .and_then(|symbol| self.scope_stack.get_binding(symbol))
                .filter(|b| !matches!(b.resolution, Resolution::Global(_)))
        };
        let symbol = name.symbol.value();

        if ty.is_vector() {
            for field in &FIELD_NAMES[..ty.width()] {
                let component = format!("{symbol}_{field}");
                if is_local(&component).is_some() {
                    return Err(self.error(
                        name.span,
                        format!("the components of `{symbol}` collide with `{component}`"),
                    ));
                }
            }
        }

        if let Some((vector, field)) = symbol.rsplit_once('_') {
            let index = FIELD_NAMES.iter().position(|f| *f == field);
            let collides = is_local(vector)
                .zip(index)
                .is_some_and(|(binding, index)| binding.ty.is_vector() && index < binding.ty.width());

            if collides {
                return Err(self.error(
                    name.span,
                    format!("`{symbol}` collides with a component of `{vector}`"),
                ));
            }
        }

        Ok(())
    }

    fn resolve_block(&mut self, block: &'ast Block) -> CompileResult<()> {
        self.scope_stack.push_shallow_scope();

        for statement in &block.statements {
            self.resolve_statement(statement)?;
        }

        self.scope_stack.pop_shallow_scope();

        Ok(())
    }

    /// Resolves a statement that the lowering wraps in its own block
    fn resolve_scoped_statement(&mut self, statement: &'ast Statement) -> CompileResult<()> {
        self.scope_stack.push_shallow_scope();
        let result = self.resolve_statement(statement);
        self.scope_stack.pop_shallow_scope();

        result
    }

    fn resolve_condition(&mut self, condition: &'ast Expression) -> CompileResult<()> {
        let ty = self.resolve_expression(condition)?;

        if ty != Type::BOOL {
            return Err(self.error(
                condition.span,
                format!("condition must be bool but found {ty}"),
            ));
        }

        Ok(())
    }

    fn resolve_loop_body(&mut self, body: &'ast Statement) -> CompileResult<()> {
        self.loop_depth += 1;
        let result = self.resolve_scoped_statement(body);
        self.loop_depth -= 1;

        result
    }

    fn resolve_statement(&mut self, statement: &'ast Statement) -> CompileResult<()> {
        match &statement.kind {
            StatementKind::Declaration(locals) => {
                for local in locals {
                    self.resolve_local(local)?;
                }
            }
            StatementKind::Expression(expression) => {
                if !expression.kind.is_statement_like() {
                    return Err(self.error(expression.span, "expression result is unused"));
                }

                self.resolve_expression(expression)?;
            }
            StatementKind::Block(block) => self.resolve_block(block)?,
            StatementKind::If {
                condition,
                positive,
                negative,
            } => {
                self.resolve_condition(condition)?;
                self.resolve_scoped_statement(positive)?;

                if let Some(negative) = negative {
                    self.resolve_scoped_statement(negative)?;
                }
            }
            StatementKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.scope_stack.push_shallow_scope();

                if let Some(init) = init {
                    self.resolve_statement(init)?;
                }

                if let Some(condition) = condition {
                    self.resolve_condition(condition)?;
                }

                if let Some(update) = update {
                    self.resolve_expression(update)?;
                }

                self.resolve_loop_body(body)?;
                self.scope_stack.pop_shallow_scope();
            }
            StatementKind::While { condition, body } => {
                self.resolve_condition(condition)?;
                self.resolve_loop_body(body)?;
            }
            StatementKind::DoWhile { body, condition } => {
                self.resolve_loop_body(body)?;
                self.resolve_condition(condition)?;
            }
            StatementKind::Break | StatementKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(self.error(statement.span, "jump statement outside of a loop"));
                }
            }
            StatementKind::Return(expression) => self.resolve_return(statement, expression)?,
            StatementKind::Discard => {
                if !self.current_function.is_some_and(|f| f.is_main) {
                    return Err(self.error(statement.span, "`discard` is only allowed in `main`"));
                }
            }
            StatementKind::Empty => {}
        }

        Ok(())
    }

    fn resolve_return(
        &mut self,
        statement: &'ast Statement,
        expression: &'ast Option<Box<Expression>>,
    ) -> CompileResult<()> {
        let Some(frame) = self.current_function else {
            unreachable!("statements are only resolved inside functions")
        };

        let expected = frame.function.return_type.ty;

        let found = match expression {
            Some(expression) => self.resolve_expression(expression)?,
            None => Type::Void,
        };

        if found != expected {
            return Err(self.error(
                statement.span,
                format!(
                    "`{}` returns {expected} but this returns {found}",
                    frame.function.name.symbol
                ),
            ));
        }

        Ok(())
    }

    fn resolve_local(&mut self, local: &'ast Local) -> CompileResult<()> {
        let ty = local.ty.ty;

        if !ty.is_value() {
            return Err(self.error(
                local.ty.span,
                format!("locals cannot have type {ty}"),
            ));
        }

        // Check the initializer first, the local's own name is not visible
        // inside it
        if let Some(initializer) = &local.initializer {
            let initializer_type = self.resolve_expression(initializer)?;

            if initializer_type != ty {
                return Err(self.error(
                    initializer.span,
                    format!(
                        "`{}` is declared {ty} but initialized with {initializer_type}",
                        local.name.symbol
                    ),
                ));
            }
        }

        self.bind_local_name(&local.name, ty)?;

        self.scope_stack.add_shallow_binding(
            local.name.symbol,
            Binding {
                resolution: Resolution::Local(local.id),
                ty,
            },
        );

        Ok(())
    }

    fn record(&mut self, expression: &Expression, ty: Type) -> CompileResult<Type> {
        self.expression_types.insert(expression.id, ty);
        Ok(ty)
    }

    fn resolve_expression(&mut self, expression: &'ast Expression) -> CompileResult<Type> {
        let ty = match &expression.kind {
            ExpressionKind::Literal(literal) => {
                let value = self.literal_value(literal)?;
                self.literal_values.insert(literal.id, value);
                value.ty()
            }
            ExpressionKind::Identifier(identifier) => {
                let (resolution, ty) = self.resolve_identifier(identifier)?;

                if let Resolution::Global(id) = resolution {
                    let global = &self.globals[id.0];

                    if global.is_array() {
                        return Err(self.error(
                            identifier.span,
                            format!("array `{}` must be indexed", identifier.symbol),
                        ));
                    }

                    if ty.sampler_kind().is_some() {
                        return Err(self.error(
                            identifier.span,
                            format!(
                                "sampler `{}` can only be passed to `sample`",
                                identifier.symbol
                            ),
                        ));
                    }
                }

                ty
            }
            ExpressionKind::Grouping(inner) => self.resolve_expression(inner)?,
            ExpressionKind::FunctionCall { target, arguments } => {
                self.resolve_function_call(target, arguments)?
            }
            ExpressionKind::Constructor { ty, arguments } => {
                let argument_types = self.resolve_arguments(arguments)?;
                self.check_constructor(ty.ty, &argument_types, arguments.span)?;
                ty.ty
            }
            ExpressionKind::FieldAccess {
                expression: inner,
                field,
            } => {
                let inner_type = self.resolve_expression(inner)?;

                if !inner_type.is_vector() {
                    return Err(self.error(
                        field.span,
                        format!("cannot swizzle a value of type {inner_type}"),
                    ));
                }

                let swizzle = Swizzle::parse(field.symbol.value(), inner_type.width())
                    .map_err(|e| self.error(field.span, e.to_string()))?;

                inner_type.with_width(swizzle.len())
            }
            ExpressionKind::Index {
                expression: inner,
                index,
            } => self.resolve_index(inner, index)?,
            ExpressionKind::Binary { lhs, operator, rhs } => {
                let lhs_type = self.resolve_expression(lhs)?;
                let rhs_type = self.resolve_expression(rhs)?;

                self.binary_type(operator, lhs_type, rhs_type)?
            }
            ExpressionKind::Unary { operator, operand } => {
                if let Some(literal) = negated_integer(operator.kind, operand) {
                    let value = self.negative_literal(literal)?;
                    self.literal_values.insert(expression.id, value);
                    self.record(operand, value.ty())?;
                    return self.record(expression, value.ty());
                }

                let operand_type = self.resolve_expression(operand)?;

                let valid = match operator.kind {
                    UnaryOperatorKind::Plus | UnaryOperatorKind::Negate => {
                        operand_type.is_numeric()
                    }
                    UnaryOperatorKind::LogicalNot => operand_type == Type::BOOL,
                };

                if !valid {
                    return Err(self.error(
                        operator.span,
                        format!("cannot apply `{}` to {operand_type}", operator.kind),
                    ));
                }

                operand_type
            }
            ExpressionKind::Conditional {
                condition,
                positive,
                negative,
            } => {
                self.resolve_condition(condition)?;
                let positive_type = self.resolve_expression(positive)?;
                let negative_type = self.resolve_expression(negative)?;

                if positive_type != negative_type || !positive_type.is_value() {
                    return Err(self.error(
                        expression.span,
                        format!(
                            "conditional branches have types {positive_type} and {negative_type}"
                        ),
                    ));
                }

                positive_type
            }
            ExpressionKind::Assignment { lhs, rhs } => {
                let rhs_type = self.resolve_expression(rhs)?;
                let lhs_type = self.resolve_expression(lhs)?;
                self.check_assignable(lhs)?;

                if lhs_type != rhs_type {
                    return Err(self.error(
                        expression.span,
                        format!("cannot assign {rhs_type} to {lhs_type}"),
                    ));
                }

                lhs_type
            }
            ExpressionKind::OperatorAssignment { operator, lhs, rhs } => {
                let rhs_type = self.resolve_expression(rhs)?;
                let lhs_type = self.resolve_expression(lhs)?;
                self.check_assignable(lhs)?;

                let valid = lhs_type.is_numeric()
                    && lhs_type.base() == rhs_type.base()
                    && (lhs_type == rhs_type || rhs_type.is_scalar());

                if !valid {
                    return Err(self.error(
                        operator.span,
                        format!(
                            "cannot apply `{}=` to {lhs_type} and {rhs_type}",
                            operator.kind.binary()
                        ),
                    ));
                }

                lhs_type
            }
            ExpressionKind::Increment { operator, operand } => {
                let operand_type = self.resolve_expression(operand)?;
                self.check_assignable(operand)?;

                if !operand_type.is_numeric() {
                    return Err(self.error(
                        operator.span,
                        format!("cannot increment a value of type {operand_type}"),
                    ));
                }

                operand_type
            }
        };

        self.record(expression, ty)
    }

    fn resolve_identifier(&mut self, identifier: &Identifier) -> CompileResult<(Resolution, Type)> {
        let Some(binding) = self.scope_stack.get_binding(identifier.symbol).copied() else {
            return Err(self.error(
                identifier.span,
                format!("undeclared identifier `{}`", identifier.symbol),
            ));
        };

        if let Resolution::Global(_) = binding.resolution {
            let register = builtins::sample_position_register(identifier.symbol.value());

            if let Some(register) = register.filter(|r| *r >= self.next_register) {
                return Err(self.error(
                    identifier.span,
                    format!(
                        "`{}` is read but no sampler is bound to register {register}",
                        identifier.symbol
                    ),
                ));
            }
        }

        self.resolutions.insert(identifier.id, binding.resolution);

        Ok((binding.resolution, binding.ty))
    }

    fn resolve_index(
        &mut self,
        inner: &'ast Expression,
        index: &'ast Expression,
    ) -> CompileResult<Type> {
        let ExpressionKind::Identifier(identifier) = &inner.kind else {
            return Err(self.error(inner.span, "only array parameters can be indexed"));
        };

        let (resolution, element_type) = self.resolve_identifier(identifier)?;

        let is_array = match resolution {
            Resolution::Global(id) => self.globals[id.0].is_array(),
            _ => false,
        };

        if !is_array {
            return Err(self.error(
                inner.span,
                format!("`{}` is not an array", identifier.symbol),
            ));
        }

        self.record(inner, element_type)?;

        let index_type = self.resolve_expression(index)?;

        if index_type != Type::INT {
            return Err(self.error(
                index.span,
                format!("array index must be int but found {index_type}"),
            ));
        }

        Ok(element_type)
    }

    fn resolve_arguments(
        &mut self,
        arguments: &'ast FunctionCallArgumentList,
    ) -> CompileResult<Vec<Type>> {
        arguments
            .arguments
            .iter()
            .map(|argument| self.resolve_expression(argument))
            .collect()
    }

    fn resolve_function_call(
        &mut self,
        target: &'ast Identifier,
        arguments: &'ast FunctionCallArgumentList,
    ) -> CompileResult<Type> {
        if let Some(built_in) = BuiltInFunction::lookup(target.symbol.value()) {
            let argument_types = if built_in == BuiltInFunction::Sample {
                self.resolve_sample_arguments(arguments)?
            } else {
                self.resolve_arguments(arguments)?
            };

            return built_in
                .result_type(&argument_types)
                .map_err(|message| self.error(arguments.span, message));
        }

        let Some(function) = self.context.function(target.symbol) else {
            return Err(self.error(
                target.span,
                format!("unknown function `{}`", target.symbol),
            ));
        };

        if function.name.symbol.value() == "main" {
            return Err(self.error(target.span, "`main` cannot be called"));
        }

        let argument_types = self.resolve_arguments(arguments)?;

        if argument_types.len() != function.parameters.len() {
            return Err(self.error(
                arguments.span,
                format!(
                    "`{}` takes {} argument(s) but {} were supplied",
                    target.symbol,
                    function.parameters.len(),
                    argument_types.len()
                ),
            ));
        }

        for ((argument, argument_type), parameter) in arguments
            .arguments
            .iter()
            .zip(&argument_types)
            .zip(&function.parameters)
        {
            if *argument_type != parameter.ty.ty {
                return Err(self.error(
                    argument.span,
                    format!(
                        "parameter `{}` of `{}` is {} but the argument is {argument_type}",
                        parameter.name.symbol, target.symbol, parameter.ty.ty
                    ),
                ));
            }
        }

        Ok(function.return_type.ty)
    }

    /// The first argument of `sample` names a sampler directly
    fn resolve_sample_arguments(
        &mut self,
        arguments: &'ast FunctionCallArgumentList,
    ) -> CompileResult<Vec<Type>> {
        let mut argument_types = Vec::with_capacity(arguments.arguments.len());

        for (index, argument) in arguments.arguments.iter().enumerate() {
            let argument_type = match &argument.kind {
                ExpressionKind::Identifier(identifier) if index == 0 => {
                    let (_, ty) = self.resolve_identifier(identifier)?;

                    if ty.sampler_kind().is_none() {
                        return Err(self.error(
                            argument.span,
                            format!("`sample` expects a sampler but found {ty}"),
                        ));
                    }

                    self.record(argument, ty)?
                }
                _ if index == 0 => {
                    return Err(self.error(argument.span, "`sample` expects a sampler name"));
                }
                _ => self.resolve_expression(argument)?,
            };

            argument_types.push(argument_type);
        }

        Ok(argument_types)
    }

    /// A constructor takes one scalar to broadcast or arguments whose
    /// components add up to the target width
    fn check_constructor(&self, ty: Type, arguments: &[Type], span: Span) -> CompileResult<()> {
        if !ty.is_value() {
            return Err(self.error(span, format!("cannot construct a value of type {ty}")));
        }

        if let Some(argument) = arguments.iter().find(|a| !a.is_value()) {
            return Err(self.error(
                span,
                format!("{argument} cannot be used to construct {ty}"),
            ));
        }

        let broadcast = arguments.len() == 1 && arguments[0].is_scalar();
        let width = arguments.iter().map(|a| a.width()).sum::<usize>();

        if !broadcast && width != ty.width() {
            return Err(self.error(
                span,
                format!(
                    "{ty} needs {} components but {width} were supplied",
                    ty.width()
                ),
            ));
        }

        Ok(())
    }

    fn binary_type(&self, operator: &BinaryOperator, lhs: Type, rhs: Type) -> CompileResult<Type> {
        let result = match operator.kind.class() {
            BinaryOperatorClass::Arithmetic => {
                if !lhs.is_numeric() || lhs.base() != rhs.base() {
                    None
                } else if lhs == rhs || rhs.is_scalar() {
                    Some(lhs)
                } else if lhs.is_scalar() {
                    Some(rhs)
                } else {
                    None
                }
            }
            BinaryOperatorClass::Relational => {
                (lhs == rhs && lhs.is_scalar() && lhs.is_numeric()).then_some(Type::BOOL)
            }
            BinaryOperatorClass::Equality => (lhs == rhs && lhs.is_value()).then_some(Type::BOOL),
            BinaryOperatorClass::Logical => {
                (lhs == Type::BOOL && rhs == Type::BOOL).then_some(Type::BOOL)
            }
        };

        result.ok_or_else(|| {
            self.error(
                operator.span,
                format!("cannot apply `{}` to {lhs} and {rhs}", operator.kind),
            )
        })
    }

    fn check_assignable(&self, expression: &Expression) -> CompileResult<()> {
        match &expression.kind {
            ExpressionKind::Identifier(identifier) => {
                match self.resolutions[&identifier.id] {
                    Resolution::Local(_) | Resolution::Parameter(_) => Ok(()),
                    Resolution::Global(id) if self.globals[id.0].is_writable() => Ok(()),
                    Resolution::Global(id) => {
                        let kind = match self.globals[id.0].qualifier {
                            Qualifier::Param => "param",
                            _ => "const",
                        };

                        Err(self.error(
                            identifier.span,
                            format!("cannot assign to {kind} `{}`", identifier.symbol),
                        ))
                    }
                }
            }
            ExpressionKind::Grouping(inner) => self.check_assignable(inner),
            ExpressionKind::FieldAccess {
                expression: inner,
                field,
            } => {
                let inner_type = self.expression_types[&inner.id];
                let swizzle = Swizzle::parse(field.symbol.value(), inner_type.width())
                    .map_err(|e| self.error(field.span, e.to_string()))?;

                if !swizzle.is_distinct() {
                    return Err(self.error(
                        field.span,
                        format!("swizzle `{}` assigns a component twice", field.symbol),
                    ));
                }

                self.check_assignable(inner)
            }
            _ => Err(self.error(expression.span, "expression is not assignable")),
        }
    }

    /// Every call is inlined, so the call graph between user functions must
    /// be acyclic
    fn check_recursion(&self) -> CompileResult<()> {
        let calls = self
            .functions
            .iter()
            .map(|&function| {
                let mut collector = CallCollector {
                    context: &*self.context,
                    calls: Vec::new(),
                };
                collector.visit_block(&function.body);

                (function.name.symbol, collector.calls)
            })
            .collect::<HashMap<_, _>>();

        let mut finished = HashSet::new();

        for function in &self.functions {
            let mut path = Vec::new();
            self.visit_call_graph(function.name.symbol, &calls, &mut path, &mut finished)?;
        }

        Ok(())
    }

    fn visit_call_graph(
        &self,
        function: InternedSymbol,
        calls: &HashMap<InternedSymbol, Vec<(InternedSymbol, Span)>>,
        path: &mut Vec<(InternedSymbol, Span)>,
        finished: &mut HashSet<InternedSymbol>,
    ) -> CompileResult<()> {
        if finished.contains(&function) {
            return Ok(());
        }

        if let Some(start) = path.iter().position(|(f, _)| *f == function) {
            let cycle = path[start..]
                .iter()
                .map(|(f, _)| f.value())
                .chain([function.value()])
                .join(" -> ");

            // Report at the call that closes the cycle
            let span = path.last().map(|(_, span)| *span).unwrap_or(Span::new(0, 0));

            return Err(self.error(span, format!("recursive call cycle: {cycle}")));
        }

        for (callee, span) in calls.get(&function).into_iter().flatten() {
            path.push((function, *span));
            self.visit_call_graph(*callee, calls, path, finished)?;
            path.pop();
        }

        finished.insert(function);

        Ok(())
    }
}

/// Collects the user functions called from a function body
struct CallCollector<'a, 'ast> {
    context: &'a CompileContext<'ast>,
    calls: Vec<(InternedSymbol, Span)>,
}

impl<'ast> Visitor<'ast> for CallCollector<'_, 'ast> {
    fn visit_function_call(
        &mut self,
        target: &'ast Identifier,
        arguments: &'ast FunctionCallArgumentList,
    ) {
        if self.context.function(target.symbol).is_some() {
            self.calls.push((target.symbol, target.span));
        }

        visit::walk_function_call(self, target, arguments);
    }
}

/// A data structure to assist in traversing nested scopes
#[derive(Debug)]
struct ScopeStack<R> {
    global_scope: BTreeMap<InternedSymbol, R>,
    stack: VecDeque<BTreeMap<InternedSymbol, R>>,
}

impl<R> ScopeStack<R> {
    fn new() -> Self {
        Self {
            global_scope: BTreeMap::new(),
            stack: VecDeque::new(),
        }
    }

    /// Creates a new block or function scope
    fn push_shallow_scope(&mut self) {
        self.stack.push_back(BTreeMap::new());
    }

    /// Destroys the current block or function scope
    fn pop_shallow_scope(&mut self) {
        assert!(
            !self.stack.is_empty(),
            "Attempted to pop a shallow scope from the global context"
        );

        self.stack.pop_back();
    }

    /// Looks for a binding only within the current (most nested) scope
    fn get_shallow_binding(&self, symbol: InternedSymbol) -> Option<&R> {
        self.stack.back().and_then(|scope| scope.get(&symbol))
    }

    /// Adds a binding only within the current (most nested) scope
    fn add_shallow_binding(&mut self, symbol: InternedSymbol, binding: R) {
        let Some(shallow_scope) = self.stack.back_mut() else {
            panic!("Tried to add a shallow binding in the global context");
        };

        shallow_scope.insert(symbol, binding);
    }

    fn get_global_binding(&self, symbol: InternedSymbol) -> Option<&R> {
        self.global_scope.get(&symbol)
    }

    fn add_global_binding(&mut self, symbol: InternedSymbol, binding: R) {
        self.global_scope.insert(symbol, binding);
    }

    /// Traverses the scope stack from back to front looking for bindings before
    /// checking the global scope.
    fn get_binding(&self, symbol: InternedSymbol) -> Option<&R> {
        self.stack
            .iter()
            .rev()
            .find_map(|scope| scope.get(&symbol))
            .or_else(|| self.global_scope.get(&symbol))
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::frontend::{SourceFile, parser::Parser};

    fn resolve_error(text: &str) -> String {
        let source = SourceFile::from_memory(text);
        let module = Parser::parse_module(&source).expect("program should parse");
        let mut context = CompileContext::new();

        match SymbolResolver::resolve(&module, &mut context) {
            Ok(_) => panic!("expected a semantic error"),
            Err(error) => {
                assert!(matches!(error, CompileError::Semantic { .. }), "{error}");
                error.to_string()
            }
        }
    }

    #[test]
    fn builds_symbol_table_with_dense_registers() {
        let source = SourceFile::from_memory(indoc! {r#"
            param sampler src;
            param float amount;
            param lsampler bottom;
            const float threshold = 0.5;
            param fsampler map;
            {% float getAmount() { return 1.0f; } %}

            void main() {
                color = sample(src, pos0) * amount + sample(map, pos2);
            }
        "#});
        let module = Parser::parse_module(&source).unwrap();
        let mut context = CompileContext::new();
        let program = SymbolResolver::resolve(&module, &mut context).unwrap();

        let registers = program
            .samplers()
            .iter()
            .map(|s| (s.name.value(), s.register))
            .collect::<Vec<_>>();

        assert_eq!(
            registers,
            vec![("src", Some(0)), ("bottom", Some(1)), ("map", Some(2))]
        );

        let threshold = program.global_by_name("threshold").unwrap();
        assert_eq!(
            threshold.value,
            Some(ConstValue {
                components: vec![Scalar::Float(0.5)]
            })
        );

        assert!(program.main().is_some());
        assert!(context.glue_code().contains("getAmount"));
    }

    #[test]
    fn sorted_globals_skip_synthetic_output() {
        let source = SourceFile::from_memory(indoc! {r#"
            param float zeta;
            param float alpha;
            void main() { color = float4(alpha, zeta, 0.0, 1.0); }
        "#});
        let module = Parser::parse_module(&source).unwrap();
        let mut context = CompileContext::new();
        let program = SymbolResolver::resolve(&module, &mut context).unwrap();

        let names = program
            .sorted_globals()
            .iter()
            .map(|g| g.name.value())
            .collect::<Vec<_>>();

        assert_eq!(
            names,
            vec!["alpha", "pixcoord", "pos0", "pos1", "pos2", "pos3", "zeta"]
        );
    }

    #[test]
    fn types_expressions() {
        let source = SourceFile::from_memory(indoc! {r#"
            param float4 tint;
            void main() {
                float3 rgb = tint.rgb * 0.5;
                color = float4(rgb, tint.a);
            }
        "#});
        let module = Parser::parse_module(&source).unwrap();
        let mut context = CompileContext::new();
        let program = SymbolResolver::resolve(&module, &mut context).unwrap();

        let main = program.main().unwrap();
        let StatementKind::Declaration(locals) = &main.body.statements[0].kind else {
            panic!("expected declaration");
        };
        let initializer = locals[0].initializer.as_ref().unwrap();

        assert_eq!(program.type_of(initializer.id), Type::FLOAT3);
    }

    #[test]
    fn rejects_duplicate_globals() {
        let error = resolve_error("param float a;\nconst float a = 1.0;\nvoid main() {}");
        assert!(error.contains("`a` is already defined"), "{error}");
        assert!(error.contains("(at 2:13)"), "{error}");
    }

    #[test]
    fn rejects_missing_qualifier_and_bad_initializers() {
        assert!(resolve_error("float a;\nvoid main() {}").contains("qualifier"));
        assert!(resolve_error("param float a = 1.0;\nvoid main() {}").contains("initializer"));
        assert!(
            resolve_error("param float b;\nconst float a = b;\nvoid main() {}")
                .contains("constructor of literals")
        );
        assert!(resolve_error("const float a = 1;\nvoid main() {}").contains("declared float"));
    }

    #[test]
    fn rejects_mixed_swizzles() {
        let error = resolve_error("void main() { color = color.rgxy; }");
        assert!(error.contains("mixes"), "{error}");
    }

    #[test]
    fn rejects_duplicate_swizzle_assignment() {
        let error = resolve_error("void main() { color.xx = float2(1.0, 0.0); }");
        assert!(error.contains("twice"), "{error}");
    }

    #[test]
    fn rejects_assignment_to_params_and_constants() {
        assert!(resolve_error("param float a;\nvoid main() { a = 1.0; }").contains("param `a`"));
        assert!(resolve_error("void main() { pixcoord = float2(0.0); }").contains("const"));
    }

    #[test]
    fn rejects_position_without_sampler() {
        let error = resolve_error("param sampler src;\nvoid main() { color = sample(src, pos1); }");
        assert!(error.contains("register 1"), "{error}");
    }

    #[test]
    fn rejects_recursion() {
        let error = resolve_error(indoc! {r#"
            float a(float x) { return b(x); }
            float b(float x) { return a(x); }
            void main() { color = float4(a(1.0)); }
        "#});
        assert!(error.contains("recursive call cycle: a -> b -> a"), "{error}");
    }

    #[test]
    fn rejects_misplaced_jumps() {
        assert!(resolve_error("void main() { break; }").contains("outside of a loop"));
        assert!(
            resolve_error("void f() { discard; }\nvoid main() { f(); }").contains("`main`")
        );
    }

    #[test]
    fn rejects_reserved_and_shadowing_names() {
        assert!(resolve_error("param float dst;\nvoid main() {}").contains("reserved"));
        assert!(resolve_error("param float t0;\nvoid main() {}").contains("reserved"));
        assert!(
            resolve_error("param float a;\nvoid main() { float a = 1.0; }")
                .contains("shadows a global")
        );
    }

    #[test]
    fn rejects_component_name_collisions() {
        assert!(
            resolve_error("void main() { float2 v = float2(0.0); float v_y = 1.0; }")
                .contains("collides with a component of `v`")
        );
        assert!(
            resolve_error("float f(float a_x, float2 a) { return a_x; }\nvoid main() {}")
                .contains("collide with `a_x`")
        );

        let source = SourceFile::from_memory("void main() { float2 v = float2(0.0); float v_z = 1.0; }");
        let module = Parser::parse_module(&source).unwrap();
        assert!(SymbolResolver::resolve(&module, &mut CompileContext::new()).is_ok());
    }

    #[test]
    fn rejects_missing_main_and_unknown_names() {
        assert!(resolve_error("param float a;").contains("no `main`"));
        assert!(resolve_error("void main() { color = b; }").contains("undeclared"));
        assert!(resolve_error("void main() { foo(); }").contains("unknown function"));
    }

    #[test]
    fn rejects_functions_that_can_end_without_a_value() {
        assert!(
            resolve_error("int f() { }\nvoid main() {}")
                .contains("not all paths of `f` return a value")
        );
        assert!(
            resolve_error(indoc! {"
                float f(float x) {
                    if (x > 0.0) return 1.0;
                }
                void main() { color = float4(f(1.0)); }
            "})
            .contains("not all paths of `f`")
        );
        assert!(
            resolve_error(indoc! {"
                float f(float x) {
                    while (x > 0.0) { return x; }
                }
                void main() { color = float4(f(1.0)); }
            "})
            .contains("not all paths of `f`")
        );

        let source = SourceFile::from_memory(indoc! {"
            float f(float x) {
                if (x > 0.0) { return 1.0; } else if (x < -1.0) return -1.0; else { return 0.0; }
            }
            void g() { }
            void main() { g(); color = float4(f(1.0)); }
        "});
        let module = Parser::parse_module(&source).unwrap();
        assert!(SymbolResolver::resolve(&module, &mut CompileContext::new()).is_ok());
    }

    #[test]
    fn folds_the_sign_into_integer_literals() {
        let source = SourceFile::from_memory(indoc! {"
            const int lowest = -2147483648;
            void main() {
                int x = -2147483648;
                int y = -5;
                color = float4(1.0);
            }
        "});
        let module = Parser::parse_module(&source).unwrap();
        let mut context = CompileContext::new();
        let program = SymbolResolver::resolve(&module, &mut context).unwrap();

        let lowest = program
            .globals
            .iter()
            .find(|g| g.name.value() == "lowest")
            .and_then(|g| g.value.as_ref())
            .unwrap();
        assert_eq!(lowest.components, [Scalar::Int(i32::MIN)]);

        assert!(resolve_error("void main() { int x = 2147483648; }").contains("out of range"));
        assert!(
            resolve_error("void main() { int x = -2147483649; }")
                .contains("literal `-2147483649` is out of range")
        );
    }

    #[test]
    fn rejects_type_mismatches() {
        assert!(
            resolve_error("void main() { color = float4(1.0) * float3(1.0); }")
                .contains("cannot apply `*`")
        );
        assert!(resolve_error("void main() { if (1.0) { } }").contains("condition must be bool"));
        assert!(resolve_error("void main() { 1.0 + 2.0; }").contains("unused"));
    }
}
