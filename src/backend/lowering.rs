//! Scalar lowering of `main` into the statements of the native kernel loop
//!
//! Every value of width N becomes N C expressions, one per component. An
//! expression that needs statements to compute (sampling, inlined calls,
//! short-circuit operands with side effects) writes them to the current
//! [`CodeWriter`] before its value is used. User functions are inlined at
//! every call site.

use std::mem;

use itertools::Itertools;

use super::{c_type, c_zero, component_names, params::SamplerNames};
use crate::{
    context::CompileContext,
    error::{CompileError, CompileResult},
    frontend::ast::{
        BinaryOperatorClass, BinaryOperatorKind, Block, Expression, ExpressionKind,
        FunctionCallArgumentList, FunctionDefinition, Identifier, IncrementOperatorKind, Local,
        Statement, StatementKind, TypeName, UnaryOperatorKind,
    },
    middle::{
        builtins::BuiltInFunction,
        program::{ProgramUnit, Resolution},
        scan::TreeScanner,
        ty::{BaseType, SamplerKind, Swizzle, Type},
        variable::Scalar,
    },
};

/// Label the kernel places right before the colour store
pub const STORE_LABEL: &str = "store_pixel";
/// Label the kernel places right after the colour store
pub const SKIP_LABEL: &str = "skip_pixel";

const INDENT: &str = "    ";

#[derive(Debug)]
pub struct LoweredBody {
    /// Result variable declarations followed by the statements of `main`
    pub text: String,
    /// `main` returns early and jumps to [`STORE_LABEL`]
    pub uses_store_label: bool,
    /// `main` discards and jumps to [`SKIP_LABEL`]
    pub uses_skip_label: bool,
    /// Exit labels of inlined calls, with the function each belongs to
    pub exit_labels: Vec<(String, String)>,
}

/// Indented lines of C
#[derive(Debug, Default)]
struct CodeWriter {
    lines: Vec<String>,
    indent: usize,
}

impl CodeWriter {
    fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{text}", INDENT.repeat(self.indent)));
        }
    }

    /// Opens a brace block, `text {` or a bare `{`
    fn open(&mut self, text: impl AsRef<str>) {
        match text.as_ref() {
            "" => self.line("{"),
            text => self.line(format!("{text} {{")),
        }
        self.indent += 1;
    }

    fn close(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("}");
    }

    fn label(&mut self, label: &str) {
        self.line(format!("{label}: ;"));
    }

    /// Appends lines captured by a nested writer at the current indent
    fn append(&mut self, lines: Vec<String>) {
        for line in lines {
            self.line(line);
        }
    }
}

/// Where `return` goes inside an inlined call
#[derive(Debug)]
struct InlineExit {
    result: Vec<String>,
    label: String,
    used: bool,
}

#[derive(Debug)]
struct LoopLabel {
    label: String,
    used: bool,
}

/// One function body being lowered, `main` at the bottom
#[derive(Debug)]
struct Frame {
    /// Scalar names the arguments were bound to
    parameters: Vec<Vec<String>>,
    /// `None` for `main`
    exit: Option<InlineExit>,
    loops: Vec<LoopLabel>,
}

pub struct ScalarLowering<'a, 'ast> {
    program: &'a ProgramUnit<'ast>,
    context: &'a mut CompileContext<'ast>,
    /// Kernel-scope declarations of function result variables
    declarations: Vec<String>,
    writer: CodeWriter,
    frames: Vec<Frame>,
    next_temporary: usize,
    next_call_site: usize,
    next_loop: usize,
    uses_store_label: bool,
    uses_skip_label: bool,
    exit_labels: Vec<(String, String)>,
}

impl<'a, 'ast> ScalarLowering<'a, 'ast> {
    pub fn lower_main(
        program: &'a ProgramUnit<'ast>,
        context: &'a mut CompileContext<'ast>,
    ) -> CompileResult<LoweredBody> {
        let Some(main) = program.main() else {
            return Err(CompileError::generation("main", "program has no entry point"));
        };

        let mut lowering = Self {
            program,
            context,
            declarations: Vec::new(),
            writer: CodeWriter::default(),
            frames: vec![Frame {
                parameters: Vec::new(),
                exit: None,
                loops: Vec::new(),
            }],
            next_temporary: 0,
            next_call_site: 0,
            next_loop: 0,
            uses_store_label: false,
            uses_skip_label: false,
            exit_labels: Vec::new(),
        };

        for statement in &main.body.statements {
            lowering.scan_statement(statement)?;
        }

        tracing::debug!(
            temporaries = lowering.next_temporary,
            inlined_calls = lowering.next_call_site,
            lines = lowering.writer.lines.len(),
            "lowered main"
        );

        let text = lowering
            .declarations
            .iter()
            .chain(&lowering.writer.lines)
            .join("\n");

        Ok(LoweredBody {
            text,
            uses_store_label: lowering.uses_store_label,
            uses_skip_label: lowering.uses_skip_label,
            exit_labels: lowering.exit_labels,
        })
    }

    fn frame(&mut self) -> &mut Frame {
        let Some(frame) = self.frames.last_mut() else {
            unreachable!("lowering always has the frame of main");
        };
        frame
    }

    fn fresh_temporary(&mut self) -> String {
        let name = format!("t{}", self.next_temporary);
        self.next_temporary += 1;
        name
    }

    /// Stores `value` in a fresh temporary and returns its name
    fn temporary(&mut self, base: BaseType, value: impl AsRef<str>) -> String {
        let name = self.fresh_temporary();
        self.writer
            .line(format!("{} {name} = {};", c_type(base), value.as_ref()));
        name
    }

    /// A value that is safe to repeat: simple values are returned as they
    /// are, anything else is evaluated once into a temporary
    fn share(&mut self, base: BaseType, value: String) -> String {
        if is_simple(&value) {
            value
        } else {
            self.temporary(base, value)
        }
    }

    fn share_all(&mut self, base: BaseType, values: Vec<String>) -> Vec<String> {
        values.into_iter().map(|v| self.share(base, v)).collect()
    }

    /// Repeats a scalar across `width` components
    fn spread(&mut self, base: BaseType, mut values: Vec<String>, width: usize) -> Vec<String> {
        if values.len() == 1 && width > 1 {
            let value = self.share(base, values.remove(0));
            vec![value; width]
        } else {
            values
        }
    }

    /// Runs `lower` against an empty writer and returns what it wrote
    /// instead of emitting it
    fn capture<T>(
        &mut self,
        lower: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<(T, Vec<String>)> {
        let outer = mem::take(&mut self.writer);
        let result = lower(self);
        let inner = mem::replace(&mut self.writer, outer);

        Ok((result?, inner.lines))
    }

    fn lower_scalar(&mut self, expression: &'ast Expression) -> CompileResult<String> {
        let mut values = self.scan_expression(expression)?;
        match values.len() {
            1 => Ok(values.remove(0)),
            count => unreachable!("scalar expression lowered to {count} components"),
        }
    }

    /// Emits a sub-statement inside braces the caller already opened
    fn lower_body(&mut self, statement: &'ast Statement) -> CompileResult<()> {
        match &statement.kind {
            StatementKind::Block(block) => {
                for statement in &block.statements {
                    self.scan_statement(statement)?;
                }
                Ok(())
            }
            _ => self.scan_statement(statement),
        }
    }

    fn lower_loop_exit(&mut self, condition: &'ast Expression) -> CompileResult<()> {
        let condition = self.lower_scalar(condition)?;
        self.writer
            .line(format!("if (!{}) break;", parenthesize(&condition)));
        Ok(())
    }

    fn push_loop(&mut self) {
        let label = format!("continue_{}", self.next_loop);
        self.next_loop += 1;
        self.frame().loops.push(LoopLabel { label, used: false });
    }

    /// Closes the innermost loop, placing its continue label if anything
    /// jumped to it
    fn pop_loop(&mut self) {
        if let Some(lowered) = self.frame().loops.pop().filter(|l| l.used) {
            self.writer.label(&lowered.label);
        }
    }

    /// Names that an assignable expression writes to
    fn lower_target(&mut self, expression: &'ast Expression) -> CompileResult<Vec<String>> {
        match &expression.kind {
            ExpressionKind::Identifier(identifier) => {
                let resolution = self.program.resolution_of(identifier.id);
                let ty = self.program.type_of(expression.id);
                self.scan_identifier(identifier, resolution, ty)
            }
            ExpressionKind::Grouping(inner) => self.lower_target(inner),
            ExpressionKind::FieldAccess {
                expression: inner,
                field,
            } => {
                let swizzle = self.swizzle_of(inner, field)?;
                let names = self.lower_target(inner)?;
                Ok(swizzle
                    .components
                    .iter()
                    .map(|&c| names[c].clone())
                    .collect())
            }
            _ => unreachable!("assignment targets are checked during resolution"),
        }
    }

    /// Inlines a user function at this call site. Returns the copied result
    /// when `keep_result` is set
    fn inline_call(
        &mut self,
        target: &'ast Identifier,
        arguments: &'ast FunctionCallArgumentList,
        keep_result: bool,
    ) -> CompileResult<Vec<String>> {
        let Some(function) = self.context.function(target.symbol) else {
            unreachable!("calls are resolved against the function table");
        };
        let site = self.next_call_site;
        self.next_call_site += 1;

        let mut parameters = Vec::with_capacity(function.parameters.len());
        for (argument, parameter) in arguments.arguments.iter().zip(&function.parameters) {
            let ty = parameter.ty.ty;
            let base = base_of(ty);
            let values = self.scan_expression(argument)?;
            let names =
                component_names(&format!("p{site}_{}", parameter.name.symbol), ty.width());

            for (name, value) in names.iter().zip(values) {
                self.writer
                    .line(format!("{} {name} = {value};", c_type(base)));
            }
            parameters.push(names);
        }

        let return_type = function.return_type.ty;
        let result = self.declare_result(function);
        let label = format!("{}_exit_{site}", function.name.symbol);

        self.frames.push(Frame {
            parameters,
            exit: Some(InlineExit {
                result: result.clone(),
                label: label.clone(),
                used: false,
            }),
            loops: Vec::new(),
        });

        self.writer.open("");
        for statement in &function.body.statements {
            self.scan_statement(statement)?;
        }
        self.writer.close();

        let exited = self.frames.pop().and_then(|f| f.exit).is_some_and(|e| e.used);
        if exited {
            self.writer.label(&label);
            self.exit_labels
                .push((function.name.symbol.value().to_owned(), label));
        }

        if !keep_result || !return_type.is_value() {
            return Ok(Vec::new());
        }

        let base = base_of(return_type);
        Ok(result
            .into_iter()
            .map(|name| self.temporary(base, name))
            .collect())
    }

    /// Result variable names of `function`, declared at kernel scope the
    /// first time any call site needs them
    fn declare_result(&mut self, function: &FunctionDefinition) -> Vec<String> {
        let ty = function.return_type.ty;
        let names = component_names(&format!("{}_res", function.name.symbol), ty.width());

        if ty.is_value() && self.context.declare_result(function.name.symbol) {
            let base = base_of(ty);
            for name in &names {
                self.declarations
                    .push(format!("{} {name} = {};", c_type(base), c_zero(base)));
            }
        }

        names
    }

    fn lower_short_circuit(
        &mut self,
        lhs: &'ast Expression,
        operator: BinaryOperatorKind,
        rhs: &'ast Expression,
    ) -> CompileResult<Vec<String>> {
        let lhs = self.lower_scalar(lhs)?;
        let (rhs, lines) = self.capture(|this| this.lower_scalar(rhs))?;

        if lines.is_empty() {
            return Ok(vec![format!("({lhs} {operator} {rhs})")]);
        }

        let result = self.temporary(BaseType::Int, &lhs);
        match operator {
            BinaryOperatorKind::LogicalAnd => self.writer.open(format!("if ({result})")),
            _ => self.writer.open(format!("if (!{result})")),
        }
        self.writer.append(lines);
        self.writer.line(format!("{result} = {rhs};"));
        self.writer.close();

        Ok(vec![result])
    }

    fn lower_sample(
        &mut self,
        arguments: &'ast FunctionCallArgumentList,
    ) -> CompileResult<Vec<String>> {
        let [sampler, position] = arguments.arguments.as_slice() else {
            unreachable!("sample takes two arguments");
        };
        let ExpressionKind::Identifier(identifier) = &sampler.kind else {
            unreachable!("samplers are only used by name");
        };
        let Resolution::Global(id) = self.program.resolution_of(identifier.id) else {
            unreachable!("samplers are globals");
        };
        let variable = self.program.global(id);
        let names = SamplerNames::new(variable.name.value());

        let helper = match variable.ty.sampler_kind() {
            Some(SamplerKind::Transformed | SamplerKind::Logical) => "lsample",
            Some(SamplerKind::FloatMap) => "fsample",
            None => unreachable!("sample is only resolved with a sampler"),
        };

        let position = self.scan_expression(position)?;
        let result = self.fresh_temporary();
        self.writer.line(format!("float {result}[4];"));
        self.writer.line(format!(
            "{helper}({}, {}, {}, {}, {}, {}, {result});",
            names.buffer, position[0], position[1], names.width, names.height, names.scan
        ));

        Ok((0..4).map(|c| format!("{result}[{c}]")).collect())
    }

    fn lower_math(
        &mut self,
        function: BuiltInFunction,
        arguments: Vec<Vec<String>>,
        ty: Type,
    ) -> CompileResult<Vec<String>> {
        use BuiltInFunction::*;

        let float = BaseType::Float;
        let width = ty.width();
        let mut arguments = arguments.into_iter();
        let mut next = || arguments.next().unwrap_or_default();

        let values = match function {
            Abs | Floor | Ceil | Sqrt | Sin | Cos | Tan | Exp | Log => {
                let name = c_math_function(function);
                next().iter().map(|a| format!("{name}({a})")).collect()
            }
            Fract => {
                let a = next();
                self.share_all(float, a)
                    .iter()
                    .map(|a| format!("({a} - floorf({a}))"))
                    .collect()
            }
            Sign => {
                let a = next();
                self.share_all(float, a)
                    .iter()
                    .map(|a| format!("({a} > 0.0f ? 1.0f : ({a} < 0.0f ? -1.0f : 0.0f))"))
                    .collect()
            }
            Min | Max | Pow => {
                let name = c_math_function(function);
                let (a, b) = (next(), next());
                let a = self.spread(float, a, width);
                let b = self.spread(float, b, width);
                a.iter()
                    .zip(&b)
                    .map(|(a, b)| format!("{name}({a}, {b})"))
                    .collect()
            }
            Mod => {
                let (a, b) = (next(), next());
                let a = self.share_all(float, a);
                let b = self.spread(float, b, width);
                let b = self.share_all(float, b);
                a.iter()
                    .zip(&b)
                    .map(|(a, b)| format!("({a} - {b} * floorf({a} / {b}))"))
                    .collect()
            }
            Step => {
                let (edge, x) = (next(), next());
                let edge = self.spread(float, edge, width);
                edge.iter()
                    .zip(&x)
                    .map(|(edge, x)| format!("({x} < {edge} ? 0.0f : 1.0f)"))
                    .collect()
            }
            Clamp => {
                let (x, low, high) = (next(), next(), next());
                let low = self.spread(float, low, width);
                let high = self.spread(float, high, width);
                itertools::izip!(&x, &low, &high)
                    .map(|(x, low, high)| format!("fminf(fmaxf({x}, {low}), {high})"))
                    .collect()
            }
            Mix => {
                let (a, b, t) = (next(), next(), next());
                let a = self.share_all(float, a);
                let t = self.spread(float, t, width);
                itertools::izip!(&a, &b, &t)
                    .map(|(a, b, t)| format!("({a} + ({b} - {a}) * {t})"))
                    .collect()
            }
            Smoothstep => {
                let (low, high, x) = (next(), next(), next());
                let low = self.spread(float, low, width);
                let low = self.share_all(float, low);
                let high = self.spread(float, high, width);
                let high = self.share_all(float, high);

                let mut values = Vec::with_capacity(width);
                for (low, high, x) in itertools::izip!(&low, &high, &x) {
                    let t = self.temporary(
                        float,
                        format!("fminf(fmaxf(({x} - {low}) / ({high} - {low}), 0.0f), 1.0f)"),
                    );
                    values.push(format!("({t} * {t} * (3.0f - 2.0f * {t}))"));
                }
                values
            }
            Dot => {
                let (a, b) = (next(), next());
                vec![format!(
                    "({})",
                    a.iter().zip(&b).map(|(a, b)| format!("{a} * {b}")).join(" + ")
                )]
            }
            Length => {
                let a = next();
                vec![self.magnitude(a)]
            }
            Distance => {
                let (a, b) = (next(), next());
                let difference = a
                    .iter()
                    .zip(&b)
                    .map(|(a, b)| format!("({a} - {b})"))
                    .collect();
                vec![self.magnitude(difference)]
            }
            Normalize => {
                let a = next();
                let a = self.share_all(float, a);
                let length = self.magnitude(a.clone());
                a.iter().map(|a| format!("({a} / {length})")).collect()
            }
            Sample => unreachable!("sample is lowered separately"),
        };

        Ok(values)
    }

    /// Euclidean length of the components, stored in a temporary
    fn magnitude(&mut self, components: Vec<String>) -> String {
        let components = self.share_all(BaseType::Float, components);
        let sum = components.iter().map(|c| format!("{c} * {c}")).join(" + ");
        self.temporary(BaseType::Float, format!("sqrtf({sum})"))
    }
}

impl<'ast> TreeScanner<'ast> for ScalarLowering<'_, 'ast> {
    type Value = Vec<String>;

    fn program(&self) -> &ProgramUnit<'ast> {
        self.program
    }

    fn scan_block(&mut self, block: &'ast Block) -> CompileResult<()> {
        self.writer.open("");
        for statement in &block.statements {
            self.scan_statement(statement)?;
        }
        self.writer.close();
        Ok(())
    }

    fn scan_local(&mut self, local: &'ast Local) -> CompileResult<()> {
        let ty = local.ty.ty;
        let base = base_of(ty);
        let names = component_names(&format!("l_{}", local.name.symbol), ty.width());

        let values = match &local.initializer {
            Some(initializer) => self.scan_expression(initializer)?,
            None => vec![c_zero(base).to_owned(); ty.width()],
        };

        for (name, value) in names.iter().zip(values) {
            self.writer
                .line(format!("{} {name} = {value};", c_type(base)));
        }

        Ok(())
    }

    fn scan_expression_statement(&mut self, expression: &'ast Expression) -> CompileResult<()> {
        match &expression.kind {
            // the old value of a postfix step is never read here
            ExpressionKind::Increment { operator, operand } => {
                let ty = self.program.type_of(expression.id);
                self.scan_increment(operator.kind, true, operand, ty)?;
            }
            ExpressionKind::FunctionCall { target, arguments }
                if BuiltInFunction::lookup(target.symbol.value()).is_none() =>
            {
                self.inline_call(target, arguments, false)?;
            }
            _ => {
                self.scan_expression(expression)?;
            }
        }

        Ok(())
    }

    fn scan_if(
        &mut self,
        condition: &'ast Expression,
        positive: &'ast Statement,
        negative: Option<&'ast Statement>,
    ) -> CompileResult<()> {
        let condition = self.lower_scalar(condition)?;

        self.writer.open(format!("if {}", parenthesize(&condition)));
        self.lower_body(positive)?;
        self.writer.close();

        if let Some(negative) = negative {
            self.writer.open("else");
            self.lower_body(negative)?;
            self.writer.close();
        }

        Ok(())
    }

    fn scan_for(
        &mut self,
        init: Option<&'ast Statement>,
        condition: Option<&'ast Expression>,
        update: Option<&'ast Expression>,
        body: &'ast Statement,
    ) -> CompileResult<()> {
        self.writer.open("");
        if let Some(init) = init {
            self.scan_statement(init)?;
        }

        self.push_loop();
        self.writer.open("for (;;)");
        if let Some(condition) = condition {
            self.lower_loop_exit(condition)?;
        }

        self.writer.open("");
        self.lower_body(body)?;
        self.writer.close();

        self.pop_loop();
        if let Some(update) = update {
            self.scan_expression_statement(update)?;
        }
        self.writer.close();
        self.writer.close();

        Ok(())
    }

    fn scan_while(
        &mut self,
        condition: &'ast Expression,
        body: &'ast Statement,
    ) -> CompileResult<()> {
        self.push_loop();
        self.writer.open("for (;;)");
        self.lower_loop_exit(condition)?;

        self.writer.open("");
        self.lower_body(body)?;
        self.writer.close();

        self.pop_loop();
        self.writer.close();

        Ok(())
    }

    fn scan_do_while(
        &mut self,
        body: &'ast Statement,
        condition: &'ast Expression,
    ) -> CompileResult<()> {
        self.push_loop();
        self.writer.open("for (;;)");

        self.writer.open("");
        self.lower_body(body)?;
        self.writer.close();

        self.pop_loop();
        self.lower_loop_exit(condition)?;
        self.writer.close();

        Ok(())
    }

    fn scan_break(&mut self) -> CompileResult<()> {
        self.writer.line("break;");
        Ok(())
    }

    fn scan_continue(&mut self) -> CompileResult<()> {
        let Some(innermost) = self.frame().loops.last_mut() else {
            unreachable!("continue outside a loop is rejected during resolution");
        };
        innermost.used = true;
        let label = innermost.label.clone();

        self.writer.line(format!("goto {label};"));
        Ok(())
    }

    fn scan_return(&mut self, expression: Option<&'ast Expression>) -> CompileResult<()> {
        let values = match expression {
            Some(expression) => self.scan_expression(expression)?,
            None => Vec::new(),
        };

        let exit = self.frame().exit.as_mut().map(|exit| {
            exit.used = true;
            (exit.result.clone(), exit.label.clone())
        });
        let Some((result, label)) = exit else {
            self.uses_store_label = true;
            self.writer.line(format!("goto {STORE_LABEL};"));
            return Ok(());
        };

        for (name, value) in result.iter().zip(values) {
            self.writer.line(format!("{name} = {value};"));
        }
        self.writer.line(format!("goto {label};"));

        Ok(())
    }

    fn scan_discard(&mut self) -> CompileResult<()> {
        self.uses_skip_label = true;
        self.writer.line(format!("goto {SKIP_LABEL};"));
        Ok(())
    }

    fn scan_literal(&mut self, value: Scalar) -> CompileResult<Vec<String>> {
        Ok(vec![value.to_c()])
    }

    fn scan_identifier(
        &mut self,
        identifier: &'ast Identifier,
        resolution: Resolution,
        ty: Type,
    ) -> CompileResult<Vec<String>> {
        let names = match resolution {
            Resolution::Local(_) => {
                component_names(&format!("l_{}", identifier.symbol), ty.width())
            }
            Resolution::Parameter(index) => self.frame().parameters[index].clone(),
            Resolution::Global(id) => {
                let variable = self.program.global(id);
                match &variable.value {
                    Some(value) => value.components.iter().map(|c| c.to_c()).collect(),
                    None => component_names(variable.name.value(), ty.width()),
                }
            }
        };

        Ok(names)
    }

    fn scan_built_in_call(
        &mut self,
        function: BuiltInFunction,
        arguments: &'ast FunctionCallArgumentList,
        ty: Type,
    ) -> CompileResult<Vec<String>> {
        if function == BuiltInFunction::Sample {
            return self.lower_sample(arguments);
        }

        let arguments = arguments
            .arguments
            .iter()
            .map(|a| self.scan_expression(a))
            .collect::<CompileResult<Vec<_>>>()?;

        self.lower_math(function, arguments, ty)
    }

    fn scan_user_call(
        &mut self,
        target: &'ast Identifier,
        arguments: &'ast FunctionCallArgumentList,
        _ty: Type,
    ) -> CompileResult<Vec<String>> {
        self.inline_call(target, arguments, true)
    }

    fn scan_constructor(
        &mut self,
        ty: &'ast TypeName,
        arguments: &'ast FunctionCallArgumentList,
    ) -> CompileResult<Vec<String>> {
        let target = ty.ty;
        let base = base_of(target);

        let mut components = Vec::with_capacity(target.width());
        for argument in &arguments.arguments {
            let from = base_of(self.program.type_of(argument.id));
            for value in self.scan_expression(argument)? {
                components.push(convert(value, from, base));
            }
        }

        Ok(self.spread(base, components, target.width()))
    }

    fn scan_swizzle(
        &mut self,
        inner: &'ast Expression,
        swizzle: &Swizzle,
        ty: Type,
    ) -> CompileResult<Vec<String>> {
        let mut values = self.scan_expression(inner)?;
        if !swizzle.is_distinct() {
            values = self.share_all(base_of(ty), values);
        }

        Ok(swizzle
            .components
            .iter()
            .map(|&c| values[c].clone())
            .collect())
    }

    fn scan_index(
        &mut self,
        array: &'ast Expression,
        index: &'ast Expression,
        ty: Type,
    ) -> CompileResult<Vec<String>> {
        let ExpressionKind::Identifier(identifier) = &array.kind else {
            unreachable!("only named arrays are indexed");
        };
        let Resolution::Global(id) = self.program.resolution_of(identifier.id) else {
            unreachable!("arrays are globals");
        };
        let variable = self.program.global(id);
        let last = variable.array_size.unwrap_or(1).saturating_sub(1);
        let name = variable.name.value();

        let index = self.lower_scalar(index)?;
        let index = self.temporary(BaseType::Int, index);
        self.writer.line(format!(
            "if ({index} < 0) {index} = 0; else if ({index} > {last}) {index} = {last};"
        ));

        let values = match ty.width() {
            1 => vec![format!("{name}[{index}]")],
            width => (0..width)
                .map(|c| format!("{name}[{index} * {width} + {c}]"))
                .collect(),
        };

        Ok(values)
    }

    fn scan_binary(
        &mut self,
        lhs: &'ast Expression,
        operator: BinaryOperatorKind,
        rhs: &'ast Expression,
        ty: Type,
    ) -> CompileResult<Vec<String>> {
        if operator.class() == BinaryOperatorClass::Logical {
            return self.lower_short_circuit(lhs, operator, rhs);
        }

        let operand_base = base_of(self.program.type_of(lhs.id));
        let lhs = self.scan_expression(lhs)?;
        let rhs = self.scan_expression(rhs)?;

        let values = match operator.class() {
            BinaryOperatorClass::Arithmetic => {
                let lhs = self.spread(operand_base, lhs, ty.width());
                let rhs = self.spread(operand_base, rhs, ty.width());
                lhs.iter()
                    .zip(&rhs)
                    .map(|(a, b)| format!("({a} {operator} {b})"))
                    .collect()
            }
            BinaryOperatorClass::Relational => {
                vec![format!("({} {operator} {})", lhs[0], rhs[0])]
            }
            BinaryOperatorClass::Equality => {
                let all = lhs
                    .iter()
                    .zip(&rhs)
                    .map(|(a, b)| format!("({a} == {b})"))
                    .join(" && ");
                let all = if lhs.len() > 1 { format!("({all})") } else { all };

                match operator {
                    BinaryOperatorKind::NotEquals => vec![format!("(!{all})")],
                    _ => vec![all],
                }
            }
            BinaryOperatorClass::Logical => unreachable!(),
        };

        Ok(values)
    }

    fn scan_unary(
        &mut self,
        operator: UnaryOperatorKind,
        operand: &'ast Expression,
        _ty: Type,
    ) -> CompileResult<Vec<String>> {
        let values = self.scan_expression(operand)?;

        Ok(match operator {
            UnaryOperatorKind::Plus => values,
            UnaryOperatorKind::Negate => values.iter().map(|v| format!("(-{v})")).collect(),
            UnaryOperatorKind::LogicalNot => values.iter().map(|v| format!("(!{v})")).collect(),
        })
    }

    fn scan_conditional(
        &mut self,
        condition: &'ast Expression,
        positive: &'ast Expression,
        negative: &'ast Expression,
        ty: Type,
    ) -> CompileResult<Vec<String>> {
        let condition = self.lower_scalar(condition)?;
        let (positive, positive_lines) = self.capture(|this| this.scan_expression(positive))?;
        let (negative, negative_lines) = self.capture(|this| this.scan_expression(negative))?;

        if positive_lines.is_empty() && negative_lines.is_empty() {
            let condition = self.share(BaseType::Int, condition);
            return Ok(positive
                .iter()
                .zip(&negative)
                .map(|(p, n)| format!("({condition} ? {p} : {n})"))
                .collect());
        }

        let base = base_of(ty);
        let results = (0..ty.width())
            .map(|_| self.fresh_temporary())
            .collect::<Vec<_>>();
        for result in &results {
            self.writer
                .line(format!("{} {result} = {};", c_type(base), c_zero(base)));
        }

        self.writer.open(format!("if {}", parenthesize(&condition)));
        self.writer.append(positive_lines);
        for (result, value) in results.iter().zip(positive) {
            self.writer.line(format!("{result} = {value};"));
        }
        self.writer.close();
        self.writer.open("else");
        self.writer.append(negative_lines);
        for (result, value) in results.iter().zip(negative) {
            self.writer.line(format!("{result} = {value};"));
        }
        self.writer.close();

        Ok(results)
    }

    fn scan_assignment(
        &mut self,
        lhs: &'ast Expression,
        operator: Option<BinaryOperatorKind>,
        rhs: &'ast Expression,
        ty: Type,
    ) -> CompileResult<Vec<String>> {
        let base = base_of(ty);
        let values = self.scan_expression(rhs)?;
        let targets = self.lower_target(lhs)?;
        let mut values = self.spread(base, values, targets.len());

        // a component written earlier must not be read by a later one
        for later in 1..values.len() {
            if targets[..later].iter().any(|t| reads(&values[later], t)) {
                let value = mem::take(&mut values[later]);
                values[later] = self.temporary(base, value);
            }
        }

        for (target, value) in targets.iter().zip(values) {
            match operator {
                None => self.writer.line(format!("{target} = {value};")),
                Some(operator) => self
                    .writer
                    .line(format!("{target} = {target} {operator} {value};")),
            }
        }

        Ok(targets)
    }

    fn scan_increment(
        &mut self,
        operator: IncrementOperatorKind,
        prefix: bool,
        operand: &'ast Expression,
        ty: Type,
    ) -> CompileResult<Vec<String>> {
        let base = base_of(ty);
        let targets = self.lower_target(operand)?;
        let one = match base {
            BaseType::Float => "1.0f",
            BaseType::Int | BaseType::Bool => "1",
        };
        let operator = operator.binary();

        let values = if prefix {
            targets.clone()
        } else {
            targets
                .iter()
                .map(|t| self.temporary(base, t))
                .collect()
        };

        for target in &targets {
            self.writer
                .line(format!("{target} = {target} {operator} {one};"));
        }

        Ok(values)
    }
}

fn base_of(ty: Type) -> BaseType {
    match ty.base() {
        Some(base) => base,
        None => unreachable!("{ty} has no scalar components"),
    }
}

fn c_math_function(function: BuiltInFunction) -> &'static str {
    match function {
        BuiltInFunction::Abs => "fabsf",
        BuiltInFunction::Floor => "floorf",
        BuiltInFunction::Ceil => "ceilf",
        BuiltInFunction::Sqrt => "sqrtf",
        BuiltInFunction::Sin => "sinf",
        BuiltInFunction::Cos => "cosf",
        BuiltInFunction::Tan => "tanf",
        BuiltInFunction::Exp => "expf",
        BuiltInFunction::Log => "logf",
        BuiltInFunction::Min => "fminf",
        BuiltInFunction::Max => "fmaxf",
        BuiltInFunction::Pow => "powf",
        other => unreachable!("{other} has no single C function"),
    }
}

/// Constructor conversion of one component
fn convert(value: String, from: BaseType, to: BaseType) -> String {
    match (from, to) {
        _ if from == to => value,
        (BaseType::Bool, BaseType::Int) => value,
        (_, BaseType::Float) => format!("((float) {})", parenthesize(&value)),
        (_, BaseType::Int) => format!("((int) {})", parenthesize(&value)),
        (_, BaseType::Bool) => format!("({} != 0)", parenthesize(&value)),
    }
}

/// Names, literals, and element or component reads
fn is_simple(value: &str) -> bool {
    let value = value.strip_prefix('-').unwrap_or(value);
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'))
}

/// Whether `value` mentions the C identifier `name`
fn reads(value: &str, name: &str) -> bool {
    value
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| token == name)
}

/// `value` wrapped in parentheses unless one pair already encloses all of it
fn parenthesize(value: &str) -> String {
    if is_wrapped(value) {
        value.to_owned()
    } else {
        format!("({value})")
    }
}

fn is_wrapped(value: &str) -> bool {
    if !(value.starts_with('(') && value.ends_with(')')) {
        return false;
    }

    let mut depth = 0usize;
    for (offset, c) in value.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && offset != value.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        frontend::{SourceFile, parser::Parser},
        middle::resolve::SymbolResolver,
    };

    fn lower(text: &str) -> LoweredBody {
        let source = SourceFile::from_memory(text);
        let module = Parser::parse_module(&source).unwrap();
        let mut context = CompileContext::new();
        let program = SymbolResolver::resolve(&module, &mut context).unwrap();

        ScalarLowering::lower_main(&program, &mut context).unwrap()
    }

    #[test]
    fn scalarizes_vector_assignment() {
        let body = lower(indoc! {"
            param float amount;
            void main() {
                float k = amount * 2.0;
                color = float4(k);
            }
        "});

        assert_eq!(
            body.text,
            indoc! {"
                float l_k = (amount * 2.0f);
                color_x = l_k;
                color_y = l_k;
                color_z = l_k;
                color_w = l_k;"}
        );
        assert!(!body.uses_store_label);
        assert!(!body.uses_skip_label);
    }

    #[test]
    fn maps_swizzles_to_components() {
        let body = lower(indoc! {"
            param float4 tint;
            void main() {
                color.bgra = tint;
                color.x = tint.a;
            }
        "});

        assert!(body.text.contains("color_z = tint_x;"));
        assert!(body.text.contains("color_x = tint_z;"));
        assert!(body.text.contains("color_w = tint_w;"));
        assert!(body.text.contains("color_x = tint_w;"));
    }

    #[test]
    fn swapping_components_goes_through_temporaries() {
        let body = lower(indoc! {"
            void main() {
                float2 v = float2(1.0, 2.0);
                v = v.yx;
                color = float4(v, 0.0, 1.0);
            }
        "});

        assert!(body.text.contains("l_v_x = l_v_y;"));
        assert!(body.text.contains("float t0 = l_v_x;"));
        assert!(body.text.contains("l_v_y = t0;"));
    }

    #[test]
    fn inlines_calls_with_one_result_declaration() {
        let body = lower(indoc! {"
            param float4 tint;
            float luma(float3 c) {
                return dot(c, float3(0.25, 0.5, 0.25));
            }
            void main() {
                float a = luma(tint.rgb);
                float b = luma(tint.gbr);
                color = float4(a, b, 0.0, 1.0);
            }
        "});

        assert_eq!(body.text.matches("float luma_res = 0.0f;").count(), 1);
        assert!(body.text.starts_with("float luma_res = 0.0f;"));
        assert!(body.text.contains("float p0_c_x = tint_x;"));
        assert!(body.text.contains("float p1_c_x = tint_y;"));
        assert!(body.text.contains("goto luma_exit_0;"));
        assert!(body.text.contains("luma_exit_1: ;"));
        assert!(body.text.contains("float l_b = t1;"));
        assert_eq!(
            body.exit_labels,
            [
                ("luma".to_owned(), "luma_exit_0".to_owned()),
                ("luma".to_owned(), "luma_exit_1".to_owned()),
            ]
        );
    }

    #[test]
    fn negated_integer_literals_are_single_constants() {
        let body = lower(indoc! {"
            param int k;
            void main() {
                int x = -2147483648;
                int y = k - -5;
                color = float4(1.0);
            }
        "});

        assert!(body.text.contains("int l_x = (-2147483647 - 1);"), "{}", body.text);
        assert!(body.text.contains("int l_y = (k - -5);"), "{}", body.text);
    }

    #[test]
    fn lowers_loops_with_continue_labels() {
        let body = lower(indoc! {"
            void main() {
                float sum = 0.0;
                for (int i = 0; i < 4; i++) {
                    if (i == 2) continue;
                    sum += 0.25;
                }
                color = float4(sum);
            }
        "});

        assert_eq!(
            body.text,
            indoc! {"
                float l_sum = 0.0f;
                {
                    int l_i = 0;
                    for (;;) {
                        if (!(l_i < 4)) break;
                        {
                            if (l_i == 2) {
                                goto continue_0;
                            }
                            l_sum = l_sum + 0.25f;
                        }
                        continue_0: ;
                        l_i = l_i + 1;
                    }
                }
                color_x = l_sum;
                color_y = l_sum;
                color_z = l_sum;
                color_w = l_sum;"}
        );
    }

    #[test]
    fn discard_and_early_return_use_kernel_labels() {
        let body = lower(indoc! {"
            param float amount;
            void main() {
                if (amount < 0.0) discard;
                if (amount > 1.0) return;
                color = float4(amount);
            }
        "});

        assert!(body.text.contains(&format!("goto {SKIP_LABEL};")));
        assert!(body.text.contains(&format!("goto {STORE_LABEL};")));
        assert!(body.uses_skip_label);
        assert!(body.uses_store_label);
    }

    #[test]
    fn samples_by_sampler_kind() {
        let body = lower(indoc! {"
            param sampler src;
            param fsampler map;
            void main() {
                float4 offset = sample(map, pos1);
                color = sample(src, pos0 + offset.xy);
            }
        "});

        assert!(body
            .text
            .contains("fsample(map, pos1_x, pos1_y, mapW, mapH, mapScan, t0);"));
        assert!(body.text.contains(
            "lsample(src, (pos0_x + l_offset_x), (pos0_y + l_offset_y), srcW, srcH, srcScan, t1);"
        ));
    }

    #[test]
    fn short_circuits_operands_with_statements() {
        let body = lower(indoc! {"
            param float4 tint;
            bool bright(float4 c) { return c.r > 0.5; }
            void main() {
                bool both = tint.a > 0.0 && bright(tint);
                color = both ? tint : float4(0.0);
            }
        "});

        assert!(body.text.contains("int t1 = (tint_w > 0.0f);"));
        assert!(body.text.contains("if (t1) {"));
        assert!(body.text.contains("t1 = t0;"));
    }

    #[test]
    fn inlines_literal_constants() {
        let body = lower(indoc! {"
            const float3 weights = float3(0.25, 0.5, 0.25);
            param float4 tint;
            void main() {
                color = float4(dot(tint.rgb, weights));
            }
        "});

        assert!(body
            .text
            .contains("(tint_x * 0.25f + tint_y * 0.5f + tint_z * 0.25f)"));
        assert!(!body.text.contains("weights"));
    }

    #[test]
    fn clamps_array_indices() {
        let body = lower(indoc! {"
            param float2 offsets[8];
            void main() {
                int i = 3;
                float2 o = offsets[i];
                color = float4(o, 0.0, 1.0);
            }
        "});

        assert!(body.text.contains("int t0 = l_i;"));
        assert!(body
            .text
            .contains("if (t0 < 0) t0 = 0; else if (t0 > 7) t0 = 7;"));
        assert!(body.text.contains("float l_o_x = offsets[t0 * 2 + 0];"));
        assert!(body.text.contains("float l_o_y = offsets[t0 * 2 + 1];"));
    }

    #[test]
    fn detects_wrapped_values() {
        assert!(is_wrapped("(a < b)"));
        assert!(!is_wrapped("(a) + (b)"));
        assert_eq!(parenthesize("l_flag"), "(l_flag)");
        assert!(reads("(l_v_y + 1.0f)", "l_v_y"));
        assert!(!reads("l_v_yy", "l_v_y"));
    }
}
