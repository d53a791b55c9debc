use super::{
    ast::{
        ArraySize, AssignmentOperator, AssignmentOperatorKind, BinaryOperator, BinaryOperatorKind,
        Block, Expression, ExpressionKind, FunctionCallArgumentList, FunctionDefinition,
        FunctionParameter, GlobalVariable, GlueBlock, Identifier, IncrementOperator,
        IncrementOperatorKind, Item, ItemKind, Literal, LiteralKind, Local, Module, NodeId,
        Qualifier, QualifierKind, Statement, StatementKind, TypeName, UnaryOperator,
        UnaryOperatorKind,
    },
    intern::InternedSymbol,
};
use crate::{
    error::{CompileError, CompileResult},
    frontend::{
        SourceFile,
        lexer::{Keyword, Lexer, Span, Token, TokenKind},
    },
};

#[derive(Debug)]
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    next_node_id: u32,
}

impl<'source> Parser<'source> {
    /// Parses a whole effect program. The first syntax error aborts the parse
    pub fn parse_module(source_file: &'source SourceFile) -> CompileResult<Module<'source>> {
        let mut parser = Self {
            lexer: Lexer::new(source_file),
            next_node_id: 0,
        };

        let mut module = Module {
            source_file,
            items: Vec::new(),
        };

        while parser.lexer.peek()?.is_some() {
            module.items.push(parser.parse_module_item()?);
        }

        tracing::debug!(items = module.items.len(), "parsed effect program");

        Ok(module)
    }

    fn create_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn error(&self, offending_span: Span, message: impl Into<String>) -> CompileError {
        self.lexer.source().syntax_error(offending_span, message)
    }

    fn value_of(&self, token: &Token) -> &'source str {
        self.lexer.source().value_of_span(token.span)
    }

    fn expect_peek(&mut self, expecting: &str) -> CompileResult<Token> {
        match self.lexer.peek()? {
            Some(token) => Ok(token),
            None => Err(self.error(
                self.lexer.eof_span(),
                format!("Expected {expecting} but reached end of file"),
            )),
        }
    }

    fn expect_next(&mut self, expecting: &str) -> CompileResult<Token> {
        match self.lexer.next()? {
            Some(token) => Ok(token),
            None => Err(self.error(
                self.lexer.eof_span(),
                format!("Expected {expecting} but reached end of file"),
            )),
        }
    }

    fn expect_next_to_be(&mut self, kind: TokenKind) -> CompileResult<Token> {
        let token = self.expect_next(&format!("{kind:?}"))?;

        if token.kind != kind {
            return Err(self.error(
                token.span,
                format!(
                    "Expected {:?} but found {:?} ({})",
                    kind,
                    token.kind,
                    self.value_of(&token)
                ),
            ));
        }

        Ok(token)
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> CompileResult<Token> {
        self.expect_next_to_be(TokenKind::Keyword(keyword))
    }

    fn next_is(&mut self, kind: TokenKind) -> CompileResult<bool> {
        Ok(self.lexer.peek()?.is_some_and(|t| t.kind == kind))
    }

    /// Consumes the next token if it is of the given kind
    fn eat(&mut self, kind: TokenKind) -> CompileResult<Option<Token>> {
        if self.next_is(kind)? {
            return self.lexer.next();
        }

        Ok(None)
    }

    fn is_type_keyword(kind: TokenKind) -> bool {
        matches!(kind, TokenKind::Keyword(keyword) if keyword.as_type().is_some())
    }

    fn is_precision_keyword(kind: TokenKind) -> bool {
        matches!(kind, TokenKind::Keyword(keyword) if keyword.is_precision())
    }

    fn parse_module_item(&mut self) -> CompileResult<Item> {
        let peeked = self.expect_peek("module item")?;

        if peeked.kind == TokenKind::GlueBlock {
            let glue = Box::new(self.parse_glue_block()?);

            return Ok(Item {
                id: self.create_node_id(),
                span: glue.span,
                kind: ItemKind::GlueBlock(glue),
            });
        }

        let qualifier = self.parse_qualifier()?;
        self.skip_precision()?;
        let ty = self.parse_type_name()?;
        let name = self.parse_identifier()?;

        if self.next_is(TokenKind::OpenParen)? {
            if let Some(qualifier) = qualifier {
                return Err(self.error(
                    qualifier.span,
                    "Function definitions cannot carry a variable qualifier",
                ));
            }

            let function = Box::new(self.parse_function_definition(ty, name)?);

            return Ok(Item {
                id: self.create_node_id(),
                span: function.span,
                kind: ItemKind::FunctionDefinition(function),
            });
        }

        let global = Box::new(self.parse_global_variable(qualifier, ty, name)?);

        Ok(Item {
            id: self.create_node_id(),
            span: global.span,
            kind: ItemKind::GlobalVariable(global),
        })
    }

    // {% ... %}
    fn parse_glue_block(&mut self) -> CompileResult<GlueBlock> {
        let token = self.expect_next_to_be(TokenKind::GlueBlock)?;
        let raw = self.value_of(&token);

        Ok(GlueBlock {
            id: self.create_node_id(),
            span: token.span,
            code: raw[2..raw.len() - 2].to_owned(),
        })
    }

    fn parse_qualifier(&mut self) -> CompileResult<Option<Qualifier>> {
        let kind = match self.expect_peek("qualifier or type")?.kind {
            TokenKind::Keyword(Keyword::Const) => QualifierKind::Const,
            TokenKind::Keyword(Keyword::Param) => QualifierKind::Param,
            _ => return Ok(None),
        };

        let token = self.expect_next("qualifier")?;

        Ok(Some(Qualifier {
            id: self.create_node_id(),
            span: token.span,
            kind,
        }))
    }

    /// Precision qualifiers are accepted and ignored
    fn skip_precision(&mut self) -> CompileResult<()> {
        if Self::is_precision_keyword(self.expect_peek("type")?.kind) {
            self.expect_next("precision qualifier")?;
        }

        Ok(())
    }

    // float3
    fn parse_type_name(&mut self) -> CompileResult<TypeName> {
        let token = self.expect_next("type")?;

        let TokenKind::Keyword(keyword) = token.kind else {
            return Err(self.error(
                token.span,
                format!("Expected type but found {}", self.value_of(&token)),
            ));
        };

        let Some(ty) = keyword.as_type() else {
            return Err(self.error(
                token.span,
                format!("Expected type but found keyword `{}`", self.value_of(&token)),
            ));
        };

        Ok(TypeName {
            id: self.create_node_id(),
            span: token.span,
            ty,
        })
    }

    // amount
    fn parse_identifier(&mut self) -> CompileResult<Identifier> {
        let token = self.expect_next_to_be(TokenKind::Identifier)?;

        Ok(Identifier {
            id: self.create_node_id(),
            span: token.span,
            symbol: InternedSymbol::new(self.value_of(&token)),
        })
    }

    /// qualifier type name ( "[" INTEGER "]" )? ( "=" expression )? ";"
    fn parse_global_variable(
        &mut self,
        qualifier: Option<Qualifier>,
        ty: TypeName,
        name: Identifier,
    ) -> CompileResult<GlobalVariable> {
        let start = qualifier.as_ref().map(|q| q.span).unwrap_or(ty.span);

        let array_size = if self.next_is(TokenKind::OpenBracket)? {
            Some(self.parse_array_size()?)
        } else {
            None
        };

        let initializer = if self.eat(TokenKind::Equals)?.is_some() {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };

        let semicolon = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(GlobalVariable {
            id: self.create_node_id(),
            span: start.to(semicolon.span),
            qualifier,
            ty,
            name,
            array_size,
            initializer,
        })
    }

    // [8]
    fn parse_array_size(&mut self) -> CompileResult<ArraySize> {
        let open_bracket = self.expect_next_to_be(TokenKind::OpenBracket)?;
        let length = self.expect_next("array length")?;

        if length.kind != TokenKind::IntegerLiteral {
            return Err(self.error(length.span, "Array length must be an integer literal"));
        }

        let value = self
            .value_of(&length)
            .parse::<u32>()
            .map_err(|_| self.error(length.span, "Array length is out of range"))?;

        let close_bracket = self.expect_next_to_be(TokenKind::CloseBracket)?;

        Ok(ArraySize {
            span: open_bracket.span.to(close_bracket.span),
            length: value,
        })
    }

    /// type name "(" ( parameter ( "," parameter )* )? ")" block
    fn parse_function_definition(
        &mut self,
        return_type: TypeName,
        name: Identifier,
    ) -> CompileResult<FunctionDefinition> {
        let mut parameters = Vec::new();

        self.expect_next_to_be(TokenKind::OpenParen)?;

        // `void main(void)` is spelled out in some programs
        if self.expect_peek("parameter or closing paren")?.kind == TokenKind::Keyword(Keyword::Void)
            && self
                .lexer
                .peek_nth(1)?
                .is_some_and(|t| t.kind == TokenKind::CloseParen)
        {
            self.expect_keyword(Keyword::Void)?;
        } else if !self.next_is(TokenKind::CloseParen)? {
            parameters.push(self.parse_function_parameter()?);

            while self.eat(TokenKind::Comma)?.is_some() {
                parameters.push(self.parse_function_parameter()?);
            }
        }

        self.expect_next_to_be(TokenKind::CloseParen)?;

        let body = self.parse_block()?;

        Ok(FunctionDefinition {
            id: self.create_node_id(),
            span: return_type.span.to(body.span),
            return_type,
            name,
            parameters,
            body,
        })
    }

    // float2 coord
    fn parse_function_parameter(&mut self) -> CompileResult<FunctionParameter> {
        self.skip_precision()?;
        let ty = self.parse_type_name()?;
        let name = self.parse_identifier()?;

        Ok(FunctionParameter {
            id: self.create_node_id(),
            span: ty.span.to(name.span),
            ty,
            name,
        })
    }

    // "{" ( statement )* "}"
    fn parse_block(&mut self) -> CompileResult<Block> {
        let mut statements = Vec::new();

        let open_brace = self.expect_next_to_be(TokenKind::OpenBrace)?;

        while self.expect_peek("statement or closing brace")?.kind != TokenKind::CloseBrace {
            statements.push(self.parse_statement()?);
        }

        let close_brace = self.expect_next_to_be(TokenKind::CloseBrace)?;

        Ok(Block {
            id: self.create_node_id(),
            span: open_brace.span.to(close_brace.span),
            statements,
        })
    }

    fn statement(&mut self, span: Span, kind: StatementKind) -> Statement {
        Statement {
            id: self.create_node_id(),
            span,
            kind,
        }
    }

    fn parse_statement(&mut self) -> CompileResult<Statement> {
        let peeked = self.expect_peek("statement")?;

        match peeked.kind {
            TokenKind::OpenBrace => {
                let block = self.parse_block()?;
                Ok(self.statement(block.span, StatementKind::Block(Box::new(block))))
            }
            TokenKind::Semicolon => {
                let semicolon = self.expect_next_to_be(TokenKind::Semicolon)?;
                Ok(self.statement(semicolon.span, StatementKind::Empty))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if_statement(),
            TokenKind::Keyword(Keyword::For) => self.parse_for_statement(),
            TokenKind::Keyword(Keyword::While) => self.parse_while_statement(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while_statement(),
            TokenKind::Keyword(Keyword::Break) => {
                self.parse_jump_statement(Keyword::Break, StatementKind::Break)
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.parse_jump_statement(Keyword::Continue, StatementKind::Continue)
            }
            TokenKind::Keyword(Keyword::Discard) => {
                self.parse_jump_statement(Keyword::Discard, StatementKind::Discard)
            }
            TokenKind::Keyword(Keyword::Return) => self.parse_return_statement(),
            _ if self.starts_declaration()? => self.parse_declaration(),
            _ => self.parse_expression_statement(),
        }
    }

    /// A type keyword followed by an identifier starts a declaration, while a
    /// type keyword followed by a paren is a constructor expression
    fn starts_declaration(&mut self) -> CompileResult<bool> {
        let peeked = self.expect_peek("statement")?;

        if Self::is_precision_keyword(peeked.kind) {
            return Ok(true);
        }

        if !Self::is_type_keyword(peeked.kind) {
            return Ok(false);
        }

        Ok(self
            .lexer
            .peek_nth(1)?
            .is_some_and(|t| t.kind == TokenKind::Identifier))
    }

    // float a = 1.0, b;
    fn parse_declaration(&mut self) -> CompileResult<Statement> {
        self.skip_precision()?;
        let ty = self.parse_type_name()?;
        let mut locals = Vec::new();

        loop {
            let name = self.parse_identifier()?;

            let initializer = if self.eat(TokenKind::Equals)?.is_some() {
                Some(Box::new(self.parse_assignment_expression()?))
            } else {
                None
            };

            let span = name
                .span
                .to(initializer.as_ref().map(|e| e.span).unwrap_or(name.span));

            locals.push(Local {
                id: self.create_node_id(),
                span,
                ty: ty.clone(),
                name,
                initializer,
            });

            if self.eat(TokenKind::Comma)?.is_none() {
                break;
            }
        }

        let semicolon = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(self.statement(
            ty.span.to(semicolon.span),
            StatementKind::Declaration(locals),
        ))
    }

    fn parse_expression_statement(&mut self) -> CompileResult<Statement> {
        let expression = self.parse_expression()?;
        let semicolon = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(self.statement(
            expression.span.to(semicolon.span),
            StatementKind::Expression(Box::new(expression)),
        ))
    }

    // break; continue; discard;
    fn parse_jump_statement(
        &mut self,
        keyword: Keyword,
        kind: StatementKind,
    ) -> CompileResult<Statement> {
        let keyword = self.expect_keyword(keyword)?;
        let semicolon = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(self.statement(keyword.span.to(semicolon.span), kind))
    }

    // return ( expression )? ;
    fn parse_return_statement(&mut self) -> CompileResult<Statement> {
        let return_keyword = self.expect_keyword(Keyword::Return)?;

        let expression = if self.next_is(TokenKind::Semicolon)? {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };

        let semicolon = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(self.statement(
            return_keyword.span.to(semicolon.span),
            StatementKind::Return(expression),
        ))
    }

    fn parse_parenthesized_condition(&mut self) -> CompileResult<Expression> {
        self.expect_next_to_be(TokenKind::OpenParen)?;
        let condition = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::CloseParen)?;

        Ok(condition)
    }

    /// "if" "(" expression ")" statement ( "else" statement )?
    fn parse_if_statement(&mut self) -> CompileResult<Statement> {
        let if_keyword = self.expect_keyword(Keyword::If)?;
        let condition = self.parse_parenthesized_condition()?;
        let positive = self.parse_statement()?;

        let negative = if self.eat(TokenKind::Keyword(Keyword::Else))?.is_some() {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        let end = negative.as_ref().map(|n| n.span).unwrap_or(positive.span);

        Ok(self.statement(
            if_keyword.span.to(end),
            StatementKind::If {
                condition: Box::new(condition),
                positive: Box::new(positive),
                negative,
            },
        ))
    }

    /// "for" "(" init? ";" expression? ";" expression? ")" statement
    fn parse_for_statement(&mut self) -> CompileResult<Statement> {
        let for_keyword = self.expect_keyword(Keyword::For)?;
        self.expect_next_to_be(TokenKind::OpenParen)?;

        // The init clause brings its own semicolon
        let init = if self.next_is(TokenKind::Semicolon)? {
            self.expect_next_to_be(TokenKind::Semicolon)?;
            None
        } else if self.starts_declaration()? {
            Some(Box::new(self.parse_declaration()?))
        } else {
            Some(Box::new(self.parse_expression_statement()?))
        };

        let condition = if self.next_is(TokenKind::Semicolon)? {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.expect_next_to_be(TokenKind::Semicolon)?;

        let update = if self.next_is(TokenKind::CloseParen)? {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.expect_next_to_be(TokenKind::CloseParen)?;

        let body = self.parse_statement()?;

        Ok(self.statement(
            for_keyword.span.to(body.span),
            StatementKind::For {
                init,
                condition,
                update,
                body: Box::new(body),
            },
        ))
    }

    /// "while" "(" expression ")" statement
    fn parse_while_statement(&mut self) -> CompileResult<Statement> {
        let while_keyword = self.expect_keyword(Keyword::While)?;
        let condition = self.parse_parenthesized_condition()?;
        let body = self.parse_statement()?;

        Ok(self.statement(
            while_keyword.span.to(body.span),
            StatementKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
            },
        ))
    }

    /// "do" statement "while" "(" expression ")" ";"
    fn parse_do_while_statement(&mut self) -> CompileResult<Statement> {
        let do_keyword = self.expect_keyword(Keyword::Do)?;
        let body = self.parse_statement()?;
        self.expect_keyword(Keyword::While)?;
        let condition = self.parse_parenthesized_condition()?;
        let semicolon = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(self.statement(
            do_keyword.span.to(semicolon.span),
            StatementKind::DoWhile {
                body: Box::new(body),
                condition: Box::new(condition),
            },
        ))
    }

    /// expression     -> assignment
    /// assignment     -> conditional ( ( "=" | "+=" | "-=" | "*=" | "/=" ) assignment )?
    /// conditional    -> logical_or ( "?" expression ":" assignment )?
    /// logical_or     -> logical_and ( "||" logical_and )*
    /// logical_and    -> equality ( "&&" equality )*
    /// equality       -> relational ( ( "==" | "!=" ) relational )*
    /// relational     -> term ( ( "<" | "<=" | ">" | ">=" ) term )*
    /// term           -> factor ( ( "+" | "-" ) factor )*
    /// factor         -> unary ( ( "*" | "/" ) unary )*
    /// unary          -> ( "!" | "-" | "+" | "++" | "--" ) unary
    ///                   | postfix
    /// postfix        -> primary ( "[" expression "]" | "." IDENTIFIER | "++" | "--" )*
    /// primary        -> IDENTIFIER ( "(" arguments ")" )? | NUMBER | BOOL
    ///                   | TYPE "(" arguments ")"
    ///                   | "(" expression ")"
    fn parse_expression(&mut self) -> CompileResult<Expression> {
        self.parse_assignment_expression()
    }

    fn parse_assignment_expression(&mut self) -> CompileResult<Expression> {
        let expression = self.parse_conditional_expression()?;

        if !self
            .expect_peek("assignment operator or expression")?
            .kind
            .is_assignment_operator()
        {
            return Ok(expression);
        }

        let operator = self.parse_assignment_operator()?;
        let rhs = self.parse_assignment_expression()?;
        let span = expression.span.to(rhs.span);

        // `None` is a plain "=" assignment
        let kind = match operator {
            Some(operator) => ExpressionKind::OperatorAssignment {
                operator,
                lhs: Box::new(expression),
                rhs: Box::new(rhs),
            },
            None => ExpressionKind::Assignment {
                lhs: Box::new(expression),
                rhs: Box::new(rhs),
            },
        };

        Ok(Expression {
            id: self.create_node_id(),
            span,
            kind,
        })
    }

    fn parse_assignment_operator(&mut self) -> CompileResult<Option<AssignmentOperator>> {
        let operator = self.expect_next("assignment operator")?;

        let kind = match operator.kind {
            TokenKind::PlusEquals => AssignmentOperatorKind::Add,
            TokenKind::MinusEquals => AssignmentOperatorKind::Subtract,
            TokenKind::MultiplyEquals => AssignmentOperatorKind::Multiply,
            TokenKind::DivideEquals => AssignmentOperatorKind::Divide,
            _ => return Ok(None),
        };

        Ok(Some(AssignmentOperator {
            id: self.create_node_id(),
            span: operator.span,
            kind,
        }))
    }

    fn parse_conditional_expression(&mut self) -> CompileResult<Expression> {
        let condition = self.parse_logical_or_expression()?;

        if self.eat(TokenKind::Question)?.is_none() {
            return Ok(condition);
        }

        let positive = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::Colon)?;
        let negative = self.parse_assignment_expression()?;

        Ok(Expression {
            id: self.create_node_id(),
            span: condition.span.to(negative.span),
            kind: ExpressionKind::Conditional {
                condition: Box::new(condition),
                positive: Box::new(positive),
                negative: Box::new(negative),
            },
        })
    }

    /// Parses `operand ( operator operand )*` for one precedence level
    fn parse_left_associative(
        &mut self,
        operand: fn(&mut Self) -> CompileResult<Expression>,
        operator: fn(TokenKind) -> Option<BinaryOperatorKind>,
    ) -> CompileResult<Expression> {
        let mut expression = operand(self)?;

        while let Some(kind) = self.lexer.peek()?.and_then(|t| operator(t.kind)) {
            let token = self.expect_next("binary operator")?;
            let rhs = operand(self)?;

            expression = Expression {
                id: self.create_node_id(),
                span: expression.span.to(rhs.span),
                kind: ExpressionKind::Binary {
                    lhs: Box::new(expression),
                    operator: BinaryOperator {
                        id: self.create_node_id(),
                        span: token.span,
                        kind,
                    },
                    rhs: Box::new(rhs),
                },
            }
        }

        Ok(expression)
    }

    fn parse_logical_or_expression(&mut self) -> CompileResult<Expression> {
        self.parse_left_associative(Self::parse_logical_and_expression, |kind| {
            (kind == TokenKind::LogicalOr).then_some(BinaryOperatorKind::LogicalOr)
        })
    }

    fn parse_logical_and_expression(&mut self) -> CompileResult<Expression> {
        self.parse_left_associative(Self::parse_equality_expression, |kind| {
            (kind == TokenKind::LogicalAnd).then_some(BinaryOperatorKind::LogicalAnd)
        })
    }

    fn parse_equality_expression(&mut self) -> CompileResult<Expression> {
        self.parse_left_associative(Self::parse_relational_expression, |kind| match kind {
            TokenKind::DoubleEquals => Some(BinaryOperatorKind::Equals),
            TokenKind::NotEquals => Some(BinaryOperatorKind::NotEquals),
            _ => None,
        })
    }

    fn parse_relational_expression(&mut self) -> CompileResult<Expression> {
        self.parse_left_associative(Self::parse_term_expression, |kind| match kind {
            TokenKind::LessThan => Some(BinaryOperatorKind::LessThan),
            TokenKind::LessThanOrEqualTo => Some(BinaryOperatorKind::LessThanOrEqualTo),
            TokenKind::GreaterThan => Some(BinaryOperatorKind::GreaterThan),
            TokenKind::GreaterThanOrEqualTo => Some(BinaryOperatorKind::GreaterThanOrEqualTo),
            _ => None,
        })
    }

    fn parse_term_expression(&mut self) -> CompileResult<Expression> {
        self.parse_left_associative(Self::parse_factor_expression, |kind| match kind {
            TokenKind::Plus => Some(BinaryOperatorKind::Add),
            TokenKind::Minus => Some(BinaryOperatorKind::Subtract),
            _ => None,
        })
    }

    fn parse_factor_expression(&mut self) -> CompileResult<Expression> {
        self.parse_left_associative(Self::parse_unary_expression, |kind| match kind {
            TokenKind::Asterisk => Some(BinaryOperatorKind::Multiply),
            TokenKind::Divide => Some(BinaryOperatorKind::Divide),
            _ => None,
        })
    }

    fn parse_unary_expression(&mut self) -> CompileResult<Expression> {
        let peeked = self.expect_peek("expression")?;

        if peeked.kind.is_increment_operator() {
            let operator = self.parse_increment_operator(true)?;
            let operand = self.parse_unary_expression()?;

            return Ok(Expression {
                id: self.create_node_id(),
                span: operator.span.to(operand.span),
                kind: ExpressionKind::Increment {
                    operator,
                    operand: Box::new(operand),
                },
            });
        }

        if peeked.kind.is_unary_operator() {
            let operator = self.parse_unary_operator()?;
            let operand = self.parse_unary_expression()?;

            return Ok(Expression {
                id: self.create_node_id(),
                span: operator.span.to(operand.span),
                kind: ExpressionKind::Unary {
                    operator,
                    operand: Box::new(operand),
                },
            });
        }

        self.parse_postfix_expression()
    }

    fn parse_unary_operator(&mut self) -> CompileResult<UnaryOperator> {
        let operator = self.expect_next("unary operator")?;

        let kind = match operator.kind {
            TokenKind::Bang => UnaryOperatorKind::LogicalNot,
            TokenKind::Minus => UnaryOperatorKind::Negate,
            TokenKind::Plus => UnaryOperatorKind::Plus,
            _ => unreachable!("Unexpected unary operator"),
        };

        Ok(UnaryOperator {
            id: self.create_node_id(),
            span: operator.span,
            kind,
        })
    }

    fn parse_increment_operator(&mut self, prefix: bool) -> CompileResult<IncrementOperator> {
        let operator = self.expect_next("increment operator")?;

        let kind = match operator.kind {
            TokenKind::PlusPlus => IncrementOperatorKind::Increment,
            TokenKind::MinusMinus => IncrementOperatorKind::Decrement,
            _ => unreachable!("Unexpected increment operator"),
        };

        Ok(IncrementOperator {
            id: self.create_node_id(),
            span: operator.span,
            kind,
            prefix,
        })
    }

    fn parse_postfix_expression(&mut self) -> CompileResult<Expression> {
        let mut expression = self.parse_primary_expression()?;

        loop {
            let Some(peeked) = self.lexer.peek()? else {
                break;
            };

            expression = match peeked.kind {
                TokenKind::OpenBracket => {
                    self.expect_next_to_be(TokenKind::OpenBracket)?;
                    let index = self.parse_expression()?;
                    let close_bracket = self.expect_next_to_be(TokenKind::CloseBracket)?;

                    Expression {
                        id: self.create_node_id(),
                        span: expression.span.to(close_bracket.span),
                        kind: ExpressionKind::Index {
                            expression: Box::new(expression),
                            index: Box::new(index),
                        },
                    }
                }
                TokenKind::Dot => {
                    self.expect_next_to_be(TokenKind::Dot)?;
                    let field = self.parse_identifier()?;

                    Expression {
                        id: self.create_node_id(),
                        span: expression.span.to(field.span),
                        kind: ExpressionKind::FieldAccess {
                            expression: Box::new(expression),
                            field,
                        },
                    }
                }
                kind if kind.is_increment_operator() => {
                    let operator = self.parse_increment_operator(false)?;

                    Expression {
                        id: self.create_node_id(),
                        span: expression.span.to(operator.span),
                        kind: ExpressionKind::Increment {
                            operator,
                            operand: Box::new(expression),
                        },
                    }
                }
                _ => break,
            };
        }

        Ok(expression)
    }

    fn parse_primary_expression(&mut self) -> CompileResult<Expression> {
        let peeked = self.expect_peek("expression")?;

        match peeked.kind {
            TokenKind::Identifier => {
                let identifier = self.parse_identifier()?;

                if self.next_is(TokenKind::OpenParen)? {
                    let arguments = self.parse_function_call_arguments()?;

                    return Ok(Expression {
                        id: self.create_node_id(),
                        span: identifier.span.to(arguments.span),
                        kind: ExpressionKind::FunctionCall {
                            target: identifier,
                            arguments,
                        },
                    });
                }

                Ok(Expression {
                    id: self.create_node_id(),
                    span: identifier.span,
                    kind: ExpressionKind::Identifier(identifier),
                })
            }
            kind if Self::is_type_keyword(kind) => {
                let ty = self.parse_type_name()?;
                let arguments = self.parse_function_call_arguments()?;

                Ok(Expression {
                    id: self.create_node_id(),
                    span: ty.span.to(arguments.span),
                    kind: ExpressionKind::Constructor { ty, arguments },
                })
            }
            TokenKind::OpenParen => {
                let open_paren = self.expect_next_to_be(TokenKind::OpenParen)?;
                let expression = self.parse_expression()?;
                let close_paren = self.expect_next_to_be(TokenKind::CloseParen)?;

                Ok(Expression {
                    id: self.create_node_id(),
                    span: open_paren.span.to(close_paren.span),
                    kind: ExpressionKind::Grouping(Box::new(expression)),
                })
            }
            _ => {
                let literal = self.parse_literal()?;

                Ok(Expression {
                    id: self.create_node_id(),
                    span: literal.span,
                    kind: ExpressionKind::Literal(Box::new(literal)),
                })
            }
        }
    }

    fn parse_function_call_arguments(&mut self) -> CompileResult<FunctionCallArgumentList> {
        let mut arguments = Vec::new();

        let open_paren = self.expect_next_to_be(TokenKind::OpenParen)?;

        if !self.next_is(TokenKind::CloseParen)? {
            arguments.push(self.parse_expression()?);

            while self.eat(TokenKind::Comma)?.is_some() {
                arguments.push(self.parse_expression()?);
            }
        }

        let close_paren = self.expect_next_to_be(TokenKind::CloseParen)?;

        Ok(FunctionCallArgumentList {
            id: self.create_node_id(),
            span: open_paren.span.to(close_paren.span),
            arguments,
        })
    }

    fn parse_literal(&mut self) -> CompileResult<Literal> {
        let token = self.expect_next("literal")?;

        let kind = match token.kind {
            TokenKind::BooleanLiteral => LiteralKind::Boolean,
            TokenKind::IntegerLiteral => LiteralKind::Integer,
            TokenKind::FloatLiteral => LiteralKind::Float,
            k => {
                return Err(self.error(
                    token.span,
                    format!("Expected expression but found {:?} ({})", k, self.value_of(&token)),
                ));
            }
        };

        Ok(Literal {
            id: self.create_node_id(),
            span: token.span,
            kind,
            symbol: InternedSymbol::new(self.value_of(&token)),
        })
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::middle::ty::Type;

    fn parse(source: &SourceFile) -> Module<'_> {
        Parser::parse_module(source).expect("program should parse")
    }

    #[test]
    fn parses_globals_functions_and_glue() {
        let source = SourceFile::from_memory(indoc! {r#"
            {% private float getAmount() { return 0.5f; } %}
            param sampler src;
            const float threshold = 0.5;
            param highp float weights[8];

            float luma(float3 c) { return dot(c, float3(0.3, 0.59, 0.11)); }

            void main() {
                float4 c = sample(src, pos0);
                color = c;
            }
        "#});

        let module = parse(&source);
        assert_eq!(module.items.len(), 6);

        let ItemKind::GlueBlock(glue) = &module.items[0].kind else {
            panic!("expected glue block");
        };
        assert_eq!(glue.code.trim(), "private float getAmount() { return 0.5f; }");

        let ItemKind::GlobalVariable(weights) = &module.items[3].kind else {
            panic!("expected global");
        };
        assert_eq!(weights.ty.ty, Type::FLOAT);
        assert_eq!(weights.array_size.as_ref().map(|a| a.length), Some(8));
        assert_eq!(weights.qualifier.as_ref().map(|q| q.kind), Some(QualifierKind::Param));

        let ItemKind::FunctionDefinition(luma) = &module.items[4].kind else {
            panic!("expected function");
        };
        assert_eq!(luma.name.symbol.value(), "luma");
        assert_eq!(luma.parameters.len(), 1);
    }

    #[test]
    fn parses_control_flow_and_swizzles() {
        let source = SourceFile::from_memory(indoc! {r#"
            void main() {
                float sum = 0.0, k;
                for (int i = 0; i < 4; i++) {
                    if (i == 2) continue; else sum += 1.0;
                }
                do { sum -= 0.5; } while (sum > 1.0);
                color.rgb = float3(sum) * (sum > 0.0 ? 1.0 : 0.0);
            }
        "#});

        let module = parse(&source);
        let ItemKind::FunctionDefinition(main) = &module.items[0].kind else {
            panic!("expected function");
        };

        assert_eq!(main.body.statements.len(), 4);
        assert!(matches!(
            &main.body.statements[0].kind,
            StatementKind::Declaration(locals) if locals.len() == 2
        ));
        assert!(matches!(main.body.statements[1].kind, StatementKind::For { .. }));
        assert!(matches!(main.body.statements[2].kind, StatementKind::DoWhile { .. }));

        let StatementKind::Expression(assignment) = &main.body.statements[3].kind else {
            panic!("expected expression statement");
        };
        let ExpressionKind::Assignment { lhs, .. } = &assignment.kind else {
            panic!("expected assignment");
        };
        assert!(matches!(
            &lhs.kind,
            ExpressionKind::FieldAccess { field, .. } if field.symbol.value() == "rgb"
        ));
    }

    #[test]
    fn respects_precedence() {
        let source = SourceFile::from_memory("const float k = 1.0 + 2.0 * 3.0;");
        let module = parse(&source);

        let ItemKind::GlobalVariable(global) = &module.items[0].kind else {
            panic!("expected global");
        };
        let Some(initializer) = &global.initializer else {
            panic!("expected initializer");
        };
        let ExpressionKind::Binary { operator, rhs, .. } = &initializer.kind else {
            panic!("expected binary expression");
        };

        assert_eq!(operator.kind, BinaryOperatorKind::Add);
        assert!(matches!(
            &rhs.kind,
            ExpressionKind::Binary { operator, .. } if operator.kind == BinaryOperatorKind::Multiply
        ));
    }

    #[test]
    fn syntax_error_carries_position() {
        let source = SourceFile::from_memory("param float a\nparam float b;");
        let error = Parser::parse_module(&source).unwrap_err();

        assert!(matches!(error, CompileError::Syntax { .. }));
        assert!(error.to_string().contains("(at 2:1)"), "{error}");
    }

    #[test]
    fn qualified_function_is_rejected() {
        let source = SourceFile::from_memory("param float f() { }");
        assert!(Parser::parse_module(&source).is_err());
    }
}
