//! Trait definition for an AST visitor which walks the tree in DFS order

use super::{
    Block, Expression, ExpressionKind, FunctionCallArgumentList, FunctionDefinition,
    FunctionParameter, GlobalVariable, GlueBlock, Identifier, Item, ItemKind, Literal, Local,
    Module, Statement, StatementKind, TypeName,
};

pub trait Visitor<'ast>: Sized {
    fn visit_item(&mut self, item: &'ast Item) {
        walk_item(self, item)
    }

    fn visit_global_variable(&mut self, global: &'ast GlobalVariable) {
        walk_global_variable(self, global)
    }

    fn visit_glue_block(&mut self, _glue: &'ast GlueBlock) {}

    fn visit_function_definition(&mut self, function: &'ast FunctionDefinition) {
        walk_function_definition(self, function)
    }

    fn visit_function_parameter(&mut self, parameter: &'ast FunctionParameter) {
        walk_function_parameter(self, parameter)
    }

    fn visit_identifier(&mut self, _identifier: &'ast Identifier) {}

    fn visit_type_name(&mut self, _ty: &'ast TypeName) {}

    fn visit_block(&mut self, block: &'ast Block) {
        walk_block(self, block)
    }

    fn visit_statement(&mut self, statement: &'ast Statement) {
        walk_statement(self, statement)
    }

    fn visit_local(&mut self, local: &'ast Local) {
        walk_local(self, local)
    }

    fn visit_expression(&mut self, expression: &'ast Expression) {
        walk_expression(self, expression)
    }

    fn visit_literal(&mut self, _literal: &'ast Literal) {}

    fn visit_function_call(
        &mut self,
        target: &'ast Identifier,
        arguments: &'ast FunctionCallArgumentList,
    ) {
        walk_function_call(self, target, arguments)
    }

    fn visit_function_call_argument_list(&mut self, arguments: &'ast FunctionCallArgumentList) {
        walk_function_call_argument_list(self, arguments)
    }
}

pub fn walk_module<'a>(visitor: &mut impl Visitor<'a>, module: &'a Module<'a>) {
    for item in &module.items {
        visitor.visit_item(item);
    }
}

pub fn walk_item<'a>(visitor: &mut impl Visitor<'a>, item: &'a Item) {
    match &item.kind {
        ItemKind::GlobalVariable(global) => visitor.visit_global_variable(global),
        ItemKind::FunctionDefinition(function) => visitor.visit_function_definition(function),
        ItemKind::GlueBlock(glue) => visitor.visit_glue_block(glue),
    }
}

pub fn walk_global_variable<'a>(visitor: &mut impl Visitor<'a>, global: &'a GlobalVariable) {
    visitor.visit_type_name(&global.ty);
    visitor.visit_identifier(&global.name);

    if let Some(initializer) = &global.initializer {
        visitor.visit_expression(initializer);
    }
}

pub fn walk_function_definition<'a>(
    visitor: &mut impl Visitor<'a>,
    function: &'a FunctionDefinition,
) {
    visitor.visit_type_name(&function.return_type);
    visitor.visit_identifier(&function.name);

    for parameter in &function.parameters {
        visitor.visit_function_parameter(parameter);
    }

    visitor.visit_block(&function.body);
}

pub fn walk_function_parameter<'a>(
    visitor: &mut impl Visitor<'a>,
    parameter: &'a FunctionParameter,
) {
    visitor.visit_type_name(&parameter.ty);
    visitor.visit_identifier(&parameter.name);
}

pub fn walk_block<'a>(visitor: &mut impl Visitor<'a>, block: &'a Block) {
    for statement in &block.statements {
        visitor.visit_statement(statement);
    }
}

pub fn walk_statement<'a>(visitor: &mut impl Visitor<'a>, statement: &'a Statement) {
    match &statement.kind {
        StatementKind::Declaration(locals) => locals.iter().for_each(|l| visitor.visit_local(l)),
        StatementKind::Expression(expression) => visitor.visit_expression(expression),
        StatementKind::Block(block) => visitor.visit_block(block),
        StatementKind::If {
            condition,
            positive,
            negative,
        } => {
            visitor.visit_expression(condition);
            visitor.visit_statement(positive);

            if let Some(negative) = negative {
                visitor.visit_statement(negative);
            }
        }
        StatementKind::For {
            init,
            condition,
            update,
            body,
        } => {
            if let Some(init) = init {
                visitor.visit_statement(init);
            }
            if let Some(condition) = condition {
                visitor.visit_expression(condition);
            }
            if let Some(update) = update {
                visitor.visit_expression(update);
            }
            visitor.visit_statement(body);
        }
        StatementKind::While { condition, body } | StatementKind::DoWhile { body, condition } => {
            visitor.visit_expression(condition);
            visitor.visit_statement(body);
        }
        StatementKind::Return(expression) => {
            if let Some(e) = expression {
                visitor.visit_expression(e)
            }
        }
        StatementKind::Break
        | StatementKind::Continue
        | StatementKind::Discard
        | StatementKind::Empty => {}
    }
}

pub fn walk_local<'a>(visitor: &mut impl Visitor<'a>, local: &'a Local) {
    visitor.visit_type_name(&local.ty);
    visitor.visit_identifier(&local.name);

    if let Some(initializer) = &local.initializer {
        visitor.visit_expression(initializer);
    }
}

pub fn walk_expression<'a>(visitor: &mut impl Visitor<'a>, expression: &'a Expression) {
    match &expression.kind {
        ExpressionKind::Literal(literal) => visitor.visit_literal(literal),
        ExpressionKind::Identifier(identifier) => visitor.visit_identifier(identifier),
        ExpressionKind::Grouping(expression) => visitor.visit_expression(expression),
        ExpressionKind::FunctionCall { target, arguments } => {
            visitor.visit_function_call(target, arguments)
        }
        ExpressionKind::Constructor { ty, arguments } => {
            visitor.visit_type_name(ty);
            visitor.visit_function_call_argument_list(arguments);
        }
        ExpressionKind::FieldAccess { expression, .. } => visitor.visit_expression(expression),
        ExpressionKind::Index { expression, index } => {
            visitor.visit_expression(expression);
            visitor.visit_expression(index);
        }
        ExpressionKind::Binary { lhs, rhs, .. }
        | ExpressionKind::Assignment { lhs, rhs }
        | ExpressionKind::OperatorAssignment { lhs, rhs, .. } => {
            visitor.visit_expression(lhs);
            visitor.visit_expression(rhs);
        }
        ExpressionKind::Unary { operand, .. } | ExpressionKind::Increment { operand, .. } => {
            visitor.visit_expression(operand)
        }
        ExpressionKind::Conditional {
            condition,
            positive,
            negative,
        } => {
            visitor.visit_expression(condition);
            visitor.visit_expression(positive);
            visitor.visit_expression(negative);
        }
    }
}

pub fn walk_function_call<'a>(
    visitor: &mut impl Visitor<'a>,
    target: &'a Identifier,
    arguments: &'a FunctionCallArgumentList,
) {
    visitor.visit_identifier(target);
    visitor.visit_function_call_argument_list(arguments);
}

pub fn walk_function_call_argument_list<'a>(
    visitor: &mut impl Visitor<'a>,
    arguments: &'a FunctionCallArgumentList,
) {
    for argument in &arguments.arguments {
        visitor.visit_expression(argument)
    }
}
