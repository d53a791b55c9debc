//! Reusable traversal over resolved function bodies
//!
//! [`TreeScanner`] walks statements and expressions of a [`ProgramUnit`] and
//! hands every construct to a hook together with what resolution learned
//! about it: expression types, identifier targets, literal values, parsed
//! swizzles and built-in function identities. Compound assignments reach the
//! same hook as plain ones. What a hook produces is up to the implementor.

use super::{
    builtins::BuiltInFunction,
    program::{ProgramUnit, Resolution},
    ty::{Swizzle, Type},
    variable::Scalar,
};
use crate::{
    error::CompileResult,
    frontend::ast::{
        BinaryOperatorKind, Block, Expression, ExpressionKind, FunctionCallArgumentList,
        Identifier, IncrementOperatorKind, Local, Statement, StatementKind, TypeName,
        UnaryOperatorKind,
    },
};

pub trait TreeScanner<'ast> {
    /// What an expression is turned into
    type Value;

    fn program(&self) -> &ProgramUnit<'ast>;

    /* Statements */

    fn scan_block(&mut self, block: &'ast Block) -> CompileResult<()> {
        self.enter_scope();

        for statement in &block.statements {
            self.scan_statement(statement)?;
        }

        self.exit_scope();

        Ok(())
    }

    fn enter_scope(&mut self) {}

    fn exit_scope(&mut self) {}

    fn scan_statement(&mut self, statement: &'ast Statement) -> CompileResult<()> {
        match &statement.kind {
            StatementKind::Declaration(locals) => {
                for local in locals {
                    self.scan_local(local)?;
                }

                Ok(())
            }
            StatementKind::Expression(expression) => self.scan_expression_statement(expression),
            StatementKind::Block(block) => self.scan_block(block),
            StatementKind::If {
                condition,
                positive,
                negative,
            } => self.scan_if(condition, positive, negative.as_deref()),
            StatementKind::For {
                init,
                condition,
                update,
                body,
            } => self.scan_for(
                init.as_deref(),
                condition.as_deref(),
                update.as_deref(),
                body,
            ),
            StatementKind::While { condition, body } => self.scan_while(condition, body),
            StatementKind::DoWhile { body, condition } => self.scan_do_while(body, condition),
            StatementKind::Break => self.scan_break(),
            StatementKind::Continue => self.scan_continue(),
            StatementKind::Return(expression) => self.scan_return(expression.as_deref()),
            StatementKind::Discard => self.scan_discard(),
            StatementKind::Empty => Ok(()),
        }
    }

    fn scan_local(&mut self, local: &'ast Local) -> CompileResult<()>;

    /// An expression evaluated only for its side effects
    fn scan_expression_statement(&mut self, expression: &'ast Expression) -> CompileResult<()> {
        self.scan_expression(expression).map(|_| ())
    }

    fn scan_if(
        &mut self,
        condition: &'ast Expression,
        positive: &'ast Statement,
        negative: Option<&'ast Statement>,
    ) -> CompileResult<()>;

    fn scan_for(
        &mut self,
        init: Option<&'ast Statement>,
        condition: Option<&'ast Expression>,
        update: Option<&'ast Expression>,
        body: &'ast Statement,
    ) -> CompileResult<()>;

    fn scan_while(&mut self, condition: &'ast Expression, body: &'ast Statement)
    -> CompileResult<()>;

    fn scan_do_while(
        &mut self,
        body: &'ast Statement,
        condition: &'ast Expression,
    ) -> CompileResult<()>;

    fn scan_break(&mut self) -> CompileResult<()>;

    fn scan_continue(&mut self) -> CompileResult<()>;

    fn scan_return(&mut self, expression: Option<&'ast Expression>) -> CompileResult<()>;

    fn scan_discard(&mut self) -> CompileResult<()>;

    /* Expressions */

    fn scan_expression(&mut self, expression: &'ast Expression) -> CompileResult<Self::Value> {
        let ty = self.program().type_of(expression.id);

        match &expression.kind {
            ExpressionKind::Literal(literal) => {
                let value = self.program().literal_value(literal.id);
                self.scan_literal(value)
            }
            ExpressionKind::Identifier(identifier) => {
                let resolution = self.program().resolution_of(identifier.id);
                self.scan_identifier(identifier, resolution, ty)
            }
            ExpressionKind::Grouping(inner) => self.scan_expression(inner),
            ExpressionKind::FunctionCall { target, arguments } => {
                match BuiltInFunction::lookup(target.symbol.value()) {
                    Some(function) => self.scan_built_in_call(function, arguments, ty),
                    None => self.scan_user_call(target, arguments, ty),
                }
            }
            ExpressionKind::Constructor {
                ty: type_name,
                arguments,
            } => self.scan_constructor(type_name, arguments),
            ExpressionKind::FieldAccess {
                expression: inner,
                field,
            } => {
                let swizzle = self.swizzle_of(inner, field)?;
                self.scan_swizzle(inner, &swizzle, ty)
            }
            ExpressionKind::Index {
                expression: array,
                index,
            } => self.scan_index(array, index, ty),
            ExpressionKind::Binary { lhs, operator, rhs } => {
                self.scan_binary(lhs, operator.kind, rhs, ty)
            }
            ExpressionKind::Unary { operator, operand } => {
                match self.program().folded_literal(expression.id) {
                    Some(value) => self.scan_literal(value),
                    None => self.scan_unary(operator.kind, operand, ty),
                }
            }
            ExpressionKind::Conditional {
                condition,
                positive,
                negative,
            } => self.scan_conditional(condition, positive, negative, ty),
            ExpressionKind::Assignment { lhs, rhs } => self.scan_assignment(lhs, None, rhs, ty),
            ExpressionKind::OperatorAssignment { operator, lhs, rhs } => {
                self.scan_assignment(lhs, Some(operator.kind.binary()), rhs, ty)
            }
            ExpressionKind::Increment { operator, operand } => {
                self.scan_increment(operator.kind, operator.prefix, operand, ty)
            }
        }
    }

    /// Parses the swizzle applied to `inner`
    fn swizzle_of(&self, inner: &Expression, field: &Identifier) -> CompileResult<Swizzle> {
        let inner_type = self.program().type_of(inner.id);

        Swizzle::parse(field.symbol.value(), inner_type.width()).map_err(|e| {
            self.program()
                .source_file()
                .semantic_error(field.span, e.to_string())
        })
    }

    fn scan_literal(&mut self, value: Scalar) -> CompileResult<Self::Value>;

    fn scan_identifier(
        &mut self,
        identifier: &'ast Identifier,
        resolution: Resolution,
        ty: Type,
    ) -> CompileResult<Self::Value>;

    fn scan_built_in_call(
        &mut self,
        function: BuiltInFunction,
        arguments: &'ast FunctionCallArgumentList,
        ty: Type,
    ) -> CompileResult<Self::Value>;

    fn scan_user_call(
        &mut self,
        target: &'ast Identifier,
        arguments: &'ast FunctionCallArgumentList,
        ty: Type,
    ) -> CompileResult<Self::Value>;

    fn scan_constructor(
        &mut self,
        ty: &'ast TypeName,
        arguments: &'ast FunctionCallArgumentList,
    ) -> CompileResult<Self::Value>;

    fn scan_swizzle(
        &mut self,
        inner: &'ast Expression,
        swizzle: &Swizzle,
        ty: Type,
    ) -> CompileResult<Self::Value>;

    fn scan_index(
        &mut self,
        array: &'ast Expression,
        index: &'ast Expression,
        ty: Type,
    ) -> CompileResult<Self::Value>;

    fn scan_binary(
        &mut self,
        lhs: &'ast Expression,
        operator: BinaryOperatorKind,
        rhs: &'ast Expression,
        ty: Type,
    ) -> CompileResult<Self::Value>;

    fn scan_unary(
        &mut self,
        operator: UnaryOperatorKind,
        operand: &'ast Expression,
        ty: Type,
    ) -> CompileResult<Self::Value>;

    fn scan_conditional(
        &mut self,
        condition: &'ast Expression,
        positive: &'ast Expression,
        negative: &'ast Expression,
        ty: Type,
    ) -> CompileResult<Self::Value>;

    /// `operator` is `Some` for compound assignments such as `+=`
    fn scan_assignment(
        &mut self,
        lhs: &'ast Expression,
        operator: Option<BinaryOperatorKind>,
        rhs: &'ast Expression,
        ty: Type,
    ) -> CompileResult<Self::Value>;

    fn scan_increment(
        &mut self,
        operator: IncrementOperatorKind,
        prefix: bool,
        operand: &'ast Expression,
        ty: Type,
    ) -> CompileResult<Self::Value>;
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use itertools::Itertools;

    use super::*;
    use crate::{
        context::CompileContext,
        frontend::{SourceFile, parser::Parser},
        middle::resolve::SymbolResolver,
    };

    /// Renders expressions back to a typed prefix form, with nothing C
    /// specific about it
    struct TypedPrinter<'a, 'ast> {
        program: &'a ProgramUnit<'ast>,
        lines: Vec<String>,
    }

    impl<'ast> TreeScanner<'ast> for TypedPrinter<'_, 'ast> {
        type Value = String;

        fn program(&self) -> &ProgramUnit<'ast> {
            self.program
        }

        fn scan_local(&mut self, local: &'ast Local) -> CompileResult<()> {
            let value = match &local.initializer {
                Some(initializer) => self.scan_expression(initializer)?,
                None => "_".to_owned(),
            };
            self.lines.push(format!("let {} = {value}", local.name.symbol));
            Ok(())
        }

        fn scan_expression_statement(&mut self, expression: &'ast Expression) -> CompileResult<()> {
            let value = self.scan_expression(expression)?;
            self.lines.push(value);
            Ok(())
        }

        fn scan_if(
            &mut self,
            condition: &'ast Expression,
            positive: &'ast Statement,
            negative: Option<&'ast Statement>,
        ) -> CompileResult<()> {
            let condition = self.scan_expression(condition)?;
            self.lines.push(format!("if {condition}"));
            self.scan_statement(positive)?;
            if let Some(negative) = negative {
                self.lines.push("else".to_owned());
                self.scan_statement(negative)?;
            }
            Ok(())
        }

        fn scan_for(
            &mut self,
            _init: Option<&'ast Statement>,
            _condition: Option<&'ast Expression>,
            _update: Option<&'ast Expression>,
            body: &'ast Statement,
        ) -> CompileResult<()> {
            self.lines.push("loop".to_owned());
            self.scan_statement(body)
        }

        fn scan_while(
            &mut self,
            _condition: &'ast Expression,
            body: &'ast Statement,
        ) -> CompileResult<()> {
            self.lines.push("loop".to_owned());
            self.scan_statement(body)
        }

        fn scan_do_while(
            &mut self,
            body: &'ast Statement,
            _condition: &'ast Expression,
        ) -> CompileResult<()> {
            self.lines.push("loop".to_owned());
            self.scan_statement(body)
        }

        fn scan_break(&mut self) -> CompileResult<()> {
            self.lines.push("break".to_owned());
            Ok(())
        }

        fn scan_continue(&mut self) -> CompileResult<()> {
            self.lines.push("continue".to_owned());
            Ok(())
        }

        fn scan_return(&mut self, _expression: Option<&'ast Expression>) -> CompileResult<()> {
            self.lines.push("return".to_owned());
            Ok(())
        }

        fn scan_discard(&mut self) -> CompileResult<()> {
            self.lines.push("discard".to_owned());
            Ok(())
        }

        fn scan_literal(&mut self, value: Scalar) -> CompileResult<String> {
            Ok(format!("{value:?}"))
        }

        fn scan_identifier(
            &mut self,
            identifier: &'ast Identifier,
            _resolution: Resolution,
            ty: Type,
        ) -> CompileResult<String> {
            Ok(format!("{}:{ty}", identifier.symbol))
        }

        fn scan_built_in_call(
            &mut self,
            function: BuiltInFunction,
            arguments: &'ast FunctionCallArgumentList,
            ty: Type,
        ) -> CompileResult<String> {
            let arguments = arguments
                .arguments
                .iter()
                .map(|a| self.scan_expression(a))
                .collect::<CompileResult<Vec<_>>>()?;
            Ok(format!("({function} {}):{ty}", arguments.join(" ")))
        }

        fn scan_user_call(
            &mut self,
            target: &'ast Identifier,
            _arguments: &'ast FunctionCallArgumentList,
            ty: Type,
        ) -> CompileResult<String> {
            Ok(format!("(call {}):{ty}", target.symbol))
        }

        fn scan_constructor(
            &mut self,
            ty: &'ast TypeName,
            arguments: &'ast FunctionCallArgumentList,
        ) -> CompileResult<String> {
            let arguments = arguments
                .arguments
                .iter()
                .map(|a| self.scan_expression(a))
                .collect::<CompileResult<Vec<_>>>()?;
            Ok(format!("({} {})", ty.ty, arguments.join(" ")))
        }

        fn scan_swizzle(
            &mut self,
            inner: &'ast Expression,
            swizzle: &Swizzle,
            ty: Type,
        ) -> CompileResult<String> {
            let inner = self.scan_expression(inner)?;
            Ok(format!("{inner}.{:?}:{ty}", swizzle.components))
        }

        fn scan_index(
            &mut self,
            _array: &'ast Expression,
            index: &'ast Expression,
            ty: Type,
        ) -> CompileResult<String> {
            let index = self.scan_expression(index)?;
            Ok(format!("[{index}]:{ty}"))
        }

        fn scan_binary(
            &mut self,
            lhs: &'ast Expression,
            operator: BinaryOperatorKind,
            rhs: &'ast Expression,
            ty: Type,
        ) -> CompileResult<String> {
            let lhs = self.scan_expression(lhs)?;
            let rhs = self.scan_expression(rhs)?;
            Ok(format!("({operator} {lhs} {rhs}):{ty}"))
        }

        fn scan_unary(
            &mut self,
            operator: UnaryOperatorKind,
            operand: &'ast Expression,
            ty: Type,
        ) -> CompileResult<String> {
            let operand = self.scan_expression(operand)?;
            Ok(format!("({operator} {operand}):{ty}"))
        }

        fn scan_conditional(
            &mut self,
            condition: &'ast Expression,
            positive: &'ast Expression,
            negative: &'ast Expression,
            ty: Type,
        ) -> CompileResult<String> {
            let parts = [condition, positive, negative]
                .into_iter()
                .map(|e| self.scan_expression(e))
                .collect::<CompileResult<Vec<_>>>()?;
            Ok(format!("(? {}):{ty}", parts.join(" ")))
        }

        fn scan_assignment(
            &mut self,
            lhs: &'ast Expression,
            operator: Option<BinaryOperatorKind>,
            rhs: &'ast Expression,
            _ty: Type,
        ) -> CompileResult<String> {
            let lhs = self.scan_expression(lhs)?;
            let rhs = self.scan_expression(rhs)?;
            let operator = operator.map(|o| o.to_string()).unwrap_or_default();
            Ok(format!("{lhs} {operator}= {rhs}"))
        }

        fn scan_increment(
            &mut self,
            operator: IncrementOperatorKind,
            prefix: bool,
            operand: &'ast Expression,
            _ty: Type,
        ) -> CompileResult<String> {
            let operand = self.scan_expression(operand)?;
            Ok(format!("{operator:?}(prefix={prefix}) {operand}"))
        }
    }

    #[test]
    fn scans_with_resolved_information() {
        let source = SourceFile::from_memory(indoc! {r#"
            param float4 tint;
            void main() {
                float k = 2.0;
                k *= 0.5;
                color.bgra = tint * k;
            }
        "#});
        let module = Parser::parse_module(&source).unwrap();
        let mut context = CompileContext::new();
        let program = SymbolResolver::resolve(&module, &mut context).unwrap();

        let mut printer = TypedPrinter {
            program: &program,
            lines: Vec::new(),
        };
        printer.scan_block(&program.main().unwrap().body).unwrap();

        assert_eq!(
            printer.lines.iter().join("\n"),
            indoc! {"
                let k = Float(2.0)
                k:float *= Float(0.5)
                color:float4.[2, 1, 0, 3]:float4 = (* tint:float4 k:float):float4"}
        );
    }
}
