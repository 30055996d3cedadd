//! JavaScript parser.
//!
//! Parses tokens into an Abstract Syntax Tree. Errors carry the span of the
//! offending token and use V8's wording, since embedders surface them to
//! users verbatim.

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};
use crate::value::number_to_string;

/// Deepest nesting of statements and expressions the parser accepts.
pub const MAX_NESTING_DEPTH: usize = 512;

/// JavaScript parser.
pub struct Parser {
    /// Tokens.
    tokens: Vec<Token>,
    /// Current position.
    pos: usize,
    /// `var` names of every function body being parsed, innermost last.
    var_scopes: Vec<Vec<String>>,
    /// Treat `in` as a loop keyword rather than an operator (for-init).
    no_in: bool,
    /// Current statement/expression nesting.
    depth: usize,
}

impl Parser {
    /// Create a new parser.
    pub fn new(source: &str) -> ParseResult<Self> {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize()?;

        Ok(Parser {
            tokens,
            pos: 0,
            var_scopes: Vec::new(),
            no_in: false,
            depth: 0,
        })
    }

    /// Parse the source as a script.
    pub fn parse_script(&mut self) -> ParseResult<Program> {
        let start = self.current_span();
        self.var_scopes.push(Vec::new());

        let mut body = Vec::new();
        while !self.is_eof() {
            body.push(self.parse_statement()?);
        }

        let var_names = self.var_scopes.pop().unwrap_or_default();
        Ok(Program {
            body,
            var_names,
            span: start.merge(self.prev_span()),
        })
    }

    /// Parse a statement.
    pub fn parse_statement(&mut self) -> ParseResult<Statement> {
        self.nested(Self::parse_statement_inner)
    }

    fn parse_statement_inner(&mut self) -> ParseResult<Statement> {
        match &self.current().kind {
            TokenKind::Semicolon => {
                let span = self.current_span();
                self.advance();
                Ok(Statement::Empty(span))
            }
            TokenKind::LeftBrace => Ok(Statement::Block(self.parse_block()?)),
            TokenKind::Var | TokenKind::Const => self.parse_variable_statement(),
            TokenKind::Let if self.peek().binding_name().is_some() => {
                self.parse_variable_statement()
            }
            TokenKind::If => self.parse_if_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::Do => self.parse_do_while_statement(),
            TokenKind::Switch => self.parse_switch_statement(),
            TokenKind::Break | TokenKind::Continue => self.parse_jump_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Throw => self.parse_throw_statement(),
            TokenKind::Try => self.parse_try_statement(),
            TokenKind::Function => self.parse_function_declaration(),
            _ => self.parse_expression_statement(),
        }
    }

    /// Parse a block.
    fn parse_block(&mut self) -> ParseResult<BlockStmt> {
        let start = self.current_span();
        self.expect(&TokenKind::LeftBrace)?;

        let mut body = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            if self.is_eof() {
                return Err(self.unexpected());
            }
            body.push(self.parse_statement()?);
        }

        self.expect(&TokenKind::RightBrace)?;

        Ok(BlockStmt {
            body,
            span: start.merge(self.prev_span()),
        })
    }

    /// Parse a `var`/`let`/`const` statement.
    fn parse_variable_statement(&mut self) -> ParseResult<Statement> {
        let decl = self.parse_variable_declaration()?;
        self.consume_semicolon()?;
        Ok(Statement::Variable(decl))
    }

    /// Parse variable declaration without the trailing semicolon.
    fn parse_variable_declaration(&mut self) -> ParseResult<VariableDecl> {
        let start = self.current_span();
        let kind = self.parse_variable_kind()?;
        let mut declarations = Vec::new();

        loop {
            let decl_start = self.current_span();
            let id = self.parse_binding_identifier()?;
            if kind == VariableKind::Var {
                self.declare_var(&id.name);
            }

            let init = if self.check(&TokenKind::Assign) {
                self.advance();
                Some(self.parse_assignment_expression()?)
            } else if kind == VariableKind::Const && !self.no_in {
                return Err(ParseError::new(
                    "Missing initializer in const declaration",
                    self.current_span(),
                ));
            } else {
                None
            };

            declarations.push(VariableDeclarator {
                id,
                init,
                span: decl_start.merge(self.prev_span()),
            });

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        Ok(VariableDecl {
            kind,
            declarations,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_variable_kind(&mut self) -> ParseResult<VariableKind> {
        let kind = match &self.current().kind {
            TokenKind::Var => VariableKind::Var,
            TokenKind::Let => VariableKind::Let,
            TokenKind::Const => VariableKind::Const,
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(kind)
    }

    /// Parse if statement.
    fn parse_if_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance();
        self.expect(&TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;

        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.check(&TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(Statement::If(IfStmt {
            test,
            consequent,
            alternate,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse `for`, `for-in` and `for-of`.
    fn parse_for_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance();
        self.expect(&TokenKind::LeftParen)?;

        let saved_no_in = self.no_in;
        self.no_in = true;
        let init = self.parse_for_init();
        self.no_in = saved_no_in;
        let init = init?;

        if self.check(&TokenKind::In) || self.check(&TokenKind::Of) {
            let is_of = self.check(&TokenKind::Of);
            let left = match init {
                Some(ForInit::Variable(decl)) => {
                    let single = decl.declarations.len() == 1 && decl.declarations[0].init.is_none();
                    match decl.declarations.into_iter().next() {
                        Some(declarator) if single => {
                            ForInLeft::Declaration(decl.kind, declarator.id)
                        }
                        _ => return Err(self.unexpected()),
                    }
                }
                Some(ForInit::Expression(expr)) if is_assignable(&expr) => ForInLeft::Target(expr),
                _ => return Err(self.unexpected()),
            };
            self.advance();
            let right = if is_of {
                self.parse_assignment_expression()?
            } else {
                self.parse_expression()?
            };
            self.expect(&TokenKind::RightParen)?;
            let body = Box::new(self.parse_statement()?);

            let stmt = ForInStmt {
                left,
                right,
                body,
                span: start.merge(self.prev_span()),
            };
            return Ok(if is_of {
                Statement::ForOf(stmt)
            } else {
                Statement::ForIn(stmt)
            });
        }

        self.expect(&TokenKind::Semicolon)?;
        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        let update = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RightParen)?;
        let body = Box::new(self.parse_statement()?);

        Ok(Statement::For(ForStmt {
            init,
            test,
            update,
            body,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_for_init(&mut self) -> ParseResult<Option<ForInit>> {
        match &self.current().kind {
            TokenKind::Semicolon => Ok(None),
            TokenKind::Var | TokenKind::Const => {
                Ok(Some(ForInit::Variable(self.parse_variable_declaration()?)))
            }
            TokenKind::Let if self.peek().binding_name().is_some() => {
                Ok(Some(ForInit::Variable(self.parse_variable_declaration()?)))
            }
            _ => Ok(Some(ForInit::Expression(self.parse_expression()?))),
        }
    }

    /// Parse while statement.
    fn parse_while_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance();
        self.expect(&TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        let body = Box::new(self.parse_statement()?);

        Ok(Statement::While(WhileStmt {
            test,
            body,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse do-while statement.
    fn parse_do_while_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance();
        let body = Box::new(self.parse_statement()?);
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        if self.check(&TokenKind::Semicolon) {
            self.advance();
        }

        Ok(Statement::DoWhile(WhileStmt {
            test,
            body,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse switch statement.
    fn parse_switch_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance();
        self.expect(&TokenKind::LeftParen)?;
        let discriminant = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        self.expect(&TokenKind::LeftBrace)?;

        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.check(&TokenKind::RightBrace) {
            let test = match &self.current().kind {
                TokenKind::Case => {
                    self.advance();
                    Some(self.parse_expression()?)
                }
                TokenKind::Default if !seen_default => {
                    seen_default = true;
                    self.advance();
                    None
                }
                TokenKind::Default => {
                    return Err(ParseError::new(
                        "More than one default clause in switch statement",
                        self.current_span(),
                    ));
                }
                _ => return Err(self.unexpected()),
            };
            self.expect(&TokenKind::Colon)?;

            let mut consequent = Vec::new();
            while !matches!(
                self.current().kind,
                TokenKind::Case | TokenKind::Default | TokenKind::RightBrace | TokenKind::Eof
            ) {
                consequent.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, consequent });
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(Statement::Switch(SwitchStmt {
            discriminant,
            cases,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse `break` or `continue`.
    fn parse_jump_statement(&mut self) -> ParseResult<Statement> {
        let span = self.current_span();
        let is_break = self.check(&TokenKind::Break);
        self.advance();
        self.consume_semicolon()?;
        Ok(if is_break {
            Statement::Break(span)
        } else {
            Statement::Continue(span)
        })
    }

    /// Parse return statement.
    fn parse_return_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance();

        let argument = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_semicolon()?;

        Ok(Statement::Return(ReturnStmt {
            argument,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse throw statement.
    fn parse_throw_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance();
        if self.current().newline_before {
            return Err(ParseError::new("Illegal newline after throw", self.current_span()));
        }
        let argument = self.parse_expression()?;
        self.consume_semicolon()?;

        Ok(Statement::Throw(ThrowStmt {
            argument,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse try statement.
    fn parse_try_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance();
        let block = self.parse_block()?;

        let handler = if self.check(&TokenKind::Catch) {
            self.advance();
            let param = if self.check(&TokenKind::LeftParen) {
                self.advance();
                let param = self.parse_binding_identifier()?;
                self.expect(&TokenKind::RightParen)?;
                Some(param)
            } else {
                None
            };
            let body = self.parse_block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };

        let finalizer = if self.check(&TokenKind::Finally) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(ParseError::new(
                "Missing catch or finally after try",
                self.current_span(),
            ));
        }

        Ok(Statement::Try(TryStmt {
            block,
            handler,
            finalizer,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse a function declaration; the name is mandatory.
    fn parse_function_declaration(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance();
        let id = self.parse_binding_identifier()?;
        let function = self.parse_function_rest(Some(id), start)?;
        Ok(Statement::Function(function))
    }

    /// Parse parameters and body of a `function`. The name, if any, has been
    /// consumed.
    fn parse_function_rest(&mut self, id: Option<Identifier>, start: Span) -> ParseResult<Rc<Function>> {
        self.expect(&TokenKind::LeftParen)?;
        self.var_scopes.push(Vec::new());

        let params = self.parse_params();
        let body = params.and_then(|params| Ok((params, self.parse_block()?)));
        let var_names = self.var_scopes.pop().unwrap_or_default();
        let (params, body) = body?;

        Ok(Rc::new(Function {
            id,
            params,
            body: FunctionBody::Block(body),
            is_arrow: false,
            var_names,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse a parameter list up to and including the closing `)`.
    fn parse_params(&mut self) -> ParseResult<Vec<Pattern>> {
        let mut params = Vec::new();

        while !self.check(&TokenKind::RightParen) {
            if self.check(&TokenKind::Ellipsis) {
                self.advance();
                let id = self.parse_binding_identifier()?;
                params.push(Pattern::Rest(id));
                if !self.check(&TokenKind::RightParen) {
                    return Err(ParseError::new(
                        "Rest parameter must be last formal parameter",
                        self.current_span(),
                    ));
                }
                break;
            }

            let id = self.parse_binding_identifier()?;
            if self.check(&TokenKind::Assign) {
                self.advance();
                let default = self.parse_assignment_expression()?;
                params.push(Pattern::Assignment(id, Box::new(default)));
            } else {
                params.push(Pattern::Identifier(id));
            }

            if !self.check(&TokenKind::RightParen) {
                self.expect(&TokenKind::Comma)?;
            }
        }

        self.expect(&TokenKind::RightParen)?;
        Ok(params)
    }

    /// Parse expression statement.
    fn parse_expression_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        let expression = self.parse_expression()?;
        self.consume_semicolon()?;

        Ok(Statement::Expression(ExpressionStmt {
            expression,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse expression (including the comma operator).
    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        let start = self.current_span();
        let first = self.parse_assignment_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }

        let mut expressions = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            expressions.push(self.parse_assignment_expression()?);
        }

        Ok(Expression::Sequence(SequenceExpr {
            expressions,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse assignment expression.
    fn parse_assignment_expression(&mut self) -> ParseResult<Expression> {
        self.nested(Self::parse_assignment_inner)
    }

    fn parse_assignment_inner(&mut self) -> ParseResult<Expression> {
        if self.current().kind.binding_name().is_some() && self.peek() == &TokenKind::Arrow {
            return self.parse_arrow_function();
        }
        if self.check(&TokenKind::LeftParen) && self.is_arrow_params() {
            return self.parse_arrow_function();
        }

        let start = self.current_span();
        let left = self.parse_conditional_expression()?;

        let operator = match self.assignment_operator() {
            Some(op) => op,
            None => return Ok(left),
        };
        if !is_assignable(&left) {
            return Err(ParseError::new(
                "Invalid left-hand side in assignment",
                left.span(),
            ));
        }
        self.advance();
        let right = self.parse_assignment_expression()?;

        Ok(Expression::Assignment(AssignmentExpr {
            operator,
            left: Box::new(left),
            right: Box::new(right),
            span: start.merge(self.prev_span()),
        }))
    }

    fn assignment_operator(&self) -> Option<AssignmentOp> {
        let op = match &self.current().kind {
            TokenKind::Assign => AssignmentOp::Assign,
            TokenKind::PlusAssign => AssignmentOp::AddAssign,
            TokenKind::MinusAssign => AssignmentOp::SubAssign,
            TokenKind::StarAssign => AssignmentOp::MulAssign,
            TokenKind::SlashAssign => AssignmentOp::DivAssign,
            TokenKind::PercentAssign => AssignmentOp::ModAssign,
            TokenKind::StarStarAssign => AssignmentOp::ExpAssign,
            TokenKind::LeftShiftAssign => AssignmentOp::LeftShiftAssign,
            TokenKind::RightShiftAssign => AssignmentOp::RightShiftAssign,
            TokenKind::UnsignedRightShiftAssign => AssignmentOp::UnsignedRightShiftAssign,
            TokenKind::AmpersandAssign => AssignmentOp::BitAndAssign,
            TokenKind::PipeAssign => AssignmentOp::BitOrAssign,
            TokenKind::CaretAssign => AssignmentOp::BitXorAssign,
            TokenKind::AmpersandAmpersandAssign => AssignmentOp::AndAssign,
            TokenKind::PipePipeAssign => AssignmentOp::OrAssign,
            TokenKind::QuestionQuestionAssign => AssignmentOp::NullishAssign,
            _ => return None,
        };
        Some(op)
    }

    /// Whether the `(` at the current position opens an arrow parameter
    /// list: scan to the matching `)` and look for `=>`.
    fn is_arrow_params(&self) -> bool {
        let mut depth = 0usize;
        let mut i = self.pos;
        while let Some(token) = self.tokens.get(i) {
            match token.kind {
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => depth += 1,
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(i + 1),
                            Some(next) if next.kind == TokenKind::Arrow && !next.newline_before
                        );
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            i += 1;
        }
        false
    }

    /// Parse an arrow function starting at its parameter list.
    fn parse_arrow_function(&mut self) -> ParseResult<Expression> {
        let start = self.current_span();
        self.var_scopes.push(Vec::new());
        let parsed = self.parse_arrow_parts();
        let var_names = self.var_scopes.pop().unwrap_or_default();
        let (params, body) = parsed?;

        Ok(Expression::Function(Rc::new(Function {
            id: None,
            params,
            body,
            is_arrow: true,
            var_names,
            span: start.merge(self.prev_span()),
        })))
    }

    fn parse_arrow_parts(&mut self) -> ParseResult<(Vec<Pattern>, FunctionBody)> {
        let params = if self.check(&TokenKind::LeftParen) {
            self.advance();
            self.parse_params()?
        } else {
            vec![Pattern::Identifier(self.parse_binding_identifier()?)]
        };
        self.expect(&TokenKind::Arrow)?;

        let body = if self.check(&TokenKind::LeftBrace) {
            FunctionBody::Block(self.parse_block()?)
        } else {
            let saved_no_in = core::mem::replace(&mut self.no_in, false);
            let body = self.parse_assignment_expression();
            self.no_in = saved_no_in;
            FunctionBody::Expression(body?)
        };
        Ok((params, body))
    }

    /// Parse conditional expression.
    fn parse_conditional_expression(&mut self) -> ParseResult<Expression> {
        let start = self.current_span();
        let test = self.parse_binary_expression(0)?;

        if !self.check(&TokenKind::Question) {
            return Ok(test);
        }
        self.advance();

        let saved_no_in = core::mem::replace(&mut self.no_in, false);
        let consequent = self.parse_assignment_expression();
        self.no_in = saved_no_in;
        let consequent = consequent?;

        self.expect(&TokenKind::Colon)?;
        let alternate = self.parse_assignment_expression()?;

        Ok(Expression::Conditional(ConditionalExpr {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse binary expression with precedence climbing.
    fn parse_binary_expression(&mut self, min_prec: u8) -> ParseResult<Expression> {
        let start = self.current_span();
        let mut left = self.parse_unary_expression()?;

        loop {
            let (op, prec) = match &self.current().kind {
                TokenKind::QuestionQuestion => (Operator::Logical(LogicalOp::Nullish), 3),
                TokenKind::PipePipe => (Operator::Logical(LogicalOp::Or), 4),
                TokenKind::AmpersandAmpersand => (Operator::Logical(LogicalOp::And), 5),
                TokenKind::Pipe => (Operator::Binary(BinaryOp::BitOr), 6),
                TokenKind::Caret => (Operator::Binary(BinaryOp::BitXor), 7),
                TokenKind::Ampersand => (Operator::Binary(BinaryOp::BitAnd), 8),
                TokenKind::Equal => (Operator::Binary(BinaryOp::Equal), 9),
                TokenKind::NotEqual => (Operator::Binary(BinaryOp::NotEqual), 9),
                TokenKind::StrictEqual => (Operator::Binary(BinaryOp::StrictEqual), 9),
                TokenKind::StrictNotEqual => (Operator::Binary(BinaryOp::StrictNotEqual), 9),
                TokenKind::LessThan => (Operator::Binary(BinaryOp::LessThan), 10),
                TokenKind::LessEqual => (Operator::Binary(BinaryOp::LessEqual), 10),
                TokenKind::GreaterThan => (Operator::Binary(BinaryOp::GreaterThan), 10),
                TokenKind::GreaterEqual => (Operator::Binary(BinaryOp::GreaterEqual), 10),
                TokenKind::In if !self.no_in => (Operator::Binary(BinaryOp::In), 10),
                TokenKind::Instanceof => (Operator::Binary(BinaryOp::Instanceof), 10),
                TokenKind::LeftShift => (Operator::Binary(BinaryOp::LeftShift), 11),
                TokenKind::RightShift => (Operator::Binary(BinaryOp::RightShift), 11),
                TokenKind::UnsignedRightShift => {
                    (Operator::Binary(BinaryOp::UnsignedRightShift), 11)
                }
                TokenKind::Plus => (Operator::Binary(BinaryOp::Add), 12),
                TokenKind::Minus => (Operator::Binary(BinaryOp::Sub), 12),
                TokenKind::Star => (Operator::Binary(BinaryOp::Mul), 13),
                TokenKind::Slash => (Operator::Binary(BinaryOp::Div), 13),
                TokenKind::Percent => (Operator::Binary(BinaryOp::Mod), 13),
                TokenKind::StarStar => (Operator::Binary(BinaryOp::Exp), 14),
                _ => break,
            };

            if prec < min_prec {
                break;
            }

            self.advance();
            // `**` is right-associative.
            let next_prec = if prec == 14 { prec } else { prec + 1 };
            let right = self.parse_binary_expression(next_prec)?;
            let span = start.merge(self.prev_span());

            left = match op {
                Operator::Logical(operator) => Expression::Logical(LogicalExpr {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                }),
                Operator::Binary(operator) => Expression::Binary(BinaryExpr {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                }),
            };
        }

        Ok(left)
    }

    /// Parse unary expression.
    fn parse_unary_expression(&mut self) -> ParseResult<Expression> {
        self.nested(Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> ParseResult<Expression> {
        let start = self.current_span();

        let operator = match &self.current().kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Typeof => UnaryOp::Typeof,
            TokenKind::Void => UnaryOp::Void,
            TokenKind::Delete => UnaryOp::Delete,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let operator = if self.check(&TokenKind::PlusPlus) {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                self.advance();
                let argument = self.parse_unary_expression()?;
                if !is_assignable(&argument) {
                    return Err(ParseError::new(
                        "Invalid left-hand side expression in prefix operation",
                        argument.span(),
                    ));
                }
                return Ok(Expression::Update(UpdateExpr {
                    operator,
                    argument: Box::new(argument),
                    prefix: true,
                    span: start.merge(self.prev_span()),
                }));
            }
            _ => return self.parse_postfix_expression(),
        };

        self.advance();
        let argument = self.parse_unary_expression()?;
        Ok(Expression::Unary(UnaryExpr {
            operator,
            argument: Box::new(argument),
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse postfix `++`/`--`.
    fn parse_postfix_expression(&mut self) -> ParseResult<Expression> {
        let start = self.current_span();
        let argument = self.parse_call_expression()?;

        let operator = match &self.current().kind {
            TokenKind::PlusPlus if !self.current().newline_before => UpdateOp::Increment,
            TokenKind::MinusMinus if !self.current().newline_before => UpdateOp::Decrement,
            _ => return Ok(argument),
        };
        if !is_assignable(&argument) {
            return Err(ParseError::new(
                "Invalid left-hand side expression in postfix operation",
                argument.span(),
            ));
        }
        self.advance();

        Ok(Expression::Update(UpdateExpr {
            operator,
            argument: Box::new(argument),
            prefix: false,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse member accesses and calls.
    fn parse_call_expression(&mut self) -> ParseResult<Expression> {
        let start = self.current_span();
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new_expression()?
        } else {
            self.parse_primary_expression()?
        };

        loop {
            match &self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.parse_property_identifier()?;
                    expr = self.member(expr, MemberProperty::Static(name), false, start);
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let property = self.parse_nested_expression()?;
                    self.expect(&TokenKind::RightBracket)?;
                    expr = self.member(expr, MemberProperty::Computed(Box::new(property)), false, start);
                }
                TokenKind::LeftParen => {
                    let arguments = self.parse_arguments()?;
                    expr = Expression::Call(CallExpr {
                        callee: Box::new(expr),
                        arguments,
                        optional: false,
                        span: start.merge(self.prev_span()),
                    });
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    if self.check(&TokenKind::LeftParen) {
                        let arguments = self.parse_arguments()?;
                        expr = Expression::Call(CallExpr {
                            callee: Box::new(expr),
                            arguments,
                            optional: true,
                            span: start.merge(self.prev_span()),
                        });
                    } else if self.check(&TokenKind::LeftBracket) {
                        self.advance();
                        let property = self.parse_nested_expression()?;
                        self.expect(&TokenKind::RightBracket)?;
                        expr = self.member(expr, MemberProperty::Computed(Box::new(property)), true, start);
                    } else {
                        let name = self.parse_property_identifier()?;
                        expr = self.member(expr, MemberProperty::Static(name), true, start);
                    }
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Parse `new Callee(args)`. The callee takes member accesses but not
    /// calls, so `new Foo(1)` passes `1` to the constructor.
    fn parse_new_expression(&mut self) -> ParseResult<Expression> {
        self.nested(Self::parse_new_inner)
    }

    fn parse_new_inner(&mut self) -> ParseResult<Expression> {
        let start = self.current_span();
        self.advance();

        let mut callee = if self.check(&TokenKind::New) {
            self.parse_new_expression()?
        } else {
            self.parse_primary_expression()?
        };
        loop {
            match &self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.parse_property_identifier()?;
                    callee = self.member(callee, MemberProperty::Static(name), false, start);
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let property = self.parse_nested_expression()?;
                    self.expect(&TokenKind::RightBracket)?;
                    callee = self.member(callee, MemberProperty::Computed(Box::new(property)), false, start);
                }
                _ => break,
            }
        }

        let arguments = if self.check(&TokenKind::LeftParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };

        Ok(Expression::New(CallExpr {
            callee: Box::new(callee),
            arguments,
            optional: false,
            span: start.merge(self.prev_span()),
        }))
    }

    fn member(&self, object: Expression, property: MemberProperty, optional: bool, start: Span) -> Expression {
        Expression::Member(MemberExpr {
            object: Box::new(object),
            property,
            optional,
            span: start.merge(self.prev_span()),
        })
    }

    /// Parse primary expression.
    fn parse_primary_expression(&mut self) -> ParseResult<Expression> {
        let start = self.current_span();

        match &self.current().kind {
            TokenKind::This => {
                self.advance();
                Ok(Expression::This(start))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expression::Literal(Literal::Null(start)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(true, start)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(false, start)))
            }
            TokenKind::Number(n) => {
                let n = *n;
                self.advance();
                Ok(Expression::Literal(Literal::Number(n, start)))
            }
            TokenKind::String(s) => {
                let s = s.clone();
                self.advance();
                Ok(Expression::Literal(Literal::String(s, start)))
            }
            TokenKind::TemplateString { .. } => self.parse_template_literal(),
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_nested_expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::LeftBracket => self.parse_array_expression(),
            TokenKind::LeftBrace => self.parse_object_expression(),
            TokenKind::Function => {
                self.advance();
                let id = if self.current().kind.binding_name().is_some() {
                    Some(self.parse_binding_identifier()?)
                } else {
                    None
                };
                Ok(Expression::Function(self.parse_function_rest(id, start)?))
            }
            kind if kind.binding_name().is_some() => {
                Ok(Expression::Identifier(self.parse_binding_identifier()?))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Parse an expression nested in brackets, where `in` is an operator
    /// again.
    fn parse_nested_expression(&mut self) -> ParseResult<Expression> {
        let saved_no_in = core::mem::replace(&mut self.no_in, false);
        let expr = self.parse_expression();
        self.no_in = saved_no_in;
        expr
    }

    /// Parse a template literal from its first chunk.
    fn parse_template_literal(&mut self) -> ParseResult<Expression> {
        let start = self.current_span();
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();

        loop {
            let (cooked, tail) = match &self.current().kind {
                TokenKind::TemplateString { cooked, tail } => (cooked.clone(), *tail),
                _ => return Err(self.unexpected()),
            };
            self.advance();
            quasis.push(cooked);
            if tail {
                break;
            }
            expressions.push(self.parse_nested_expression()?);
        }

        Ok(Expression::Template(TemplateLiteral {
            quasis,
            expressions,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse array expression.
    fn parse_array_expression(&mut self) -> ParseResult<Expression> {
        let start = self.current_span();
        self.expect(&TokenKind::LeftBracket)?;
        let saved_no_in = core::mem::replace(&mut self.no_in, false);

        let mut elements = Vec::new();
        let result = loop {
            match &self.current().kind {
                TokenKind::RightBracket => break Ok(()),
                TokenKind::Comma => {
                    self.advance();
                    elements.push(None);
                    continue;
                }
                _ => {}
            }

            match self.parse_element() {
                Ok(element) => elements.push(Some(element)),
                Err(err) => break Err(err),
            }

            if !self.check(&TokenKind::RightBracket) {
                if let Err(err) = self.expect(&TokenKind::Comma) {
                    break Err(err);
                }
            }
        };
        self.no_in = saved_no_in;
        result?;

        self.expect(&TokenKind::RightBracket)?;
        Ok(Expression::Array(ArrayExpr {
            elements,
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse an array element or call argument, spread included.
    fn parse_element(&mut self) -> ParseResult<Expression> {
        if !self.check(&TokenKind::Ellipsis) {
            return self.parse_assignment_expression();
        }
        let start = self.current_span();
        self.advance();
        let argument = self.parse_assignment_expression()?;
        Ok(Expression::Spread(SpreadElement {
            argument: Box::new(argument),
            span: start.merge(self.prev_span()),
        }))
    }

    /// Parse object expression.
    fn parse_object_expression(&mut self) -> ParseResult<Expression> {
        let start = self.current_span();
        self.expect(&TokenKind::LeftBrace)?;
        let saved_no_in = core::mem::replace(&mut self.no_in, false);

        let mut properties = Vec::new();
        let result = loop {
            if self.check(&TokenKind::RightBrace) {
                break Ok(());
            }
            match self.parse_object_property() {
                Ok(property) => properties.push(property),
                Err(err) => break Err(err),
            }
            if !self.check(&TokenKind::RightBrace) {
                if let Err(err) = self.expect(&TokenKind::Comma) {
                    break Err(err);
                }
            }
        };
        self.no_in = saved_no_in;
        result?;

        self.expect(&TokenKind::RightBrace)?;
        Ok(Expression::Object(ObjectExpr {
            properties,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_object_property(&mut self) -> ParseResult<ObjectProperty> {
        let start = self.current_span();

        if self.check(&TokenKind::Ellipsis) {
            self.advance();
            return Ok(ObjectProperty::Spread(self.parse_assignment_expression()?));
        }

        let shorthand_id = self.current().kind.binding_name().map(String::from);
        let key = match &self.current().kind {
            TokenKind::LeftBracket => {
                self.advance();
                let key = self.parse_assignment_expression()?;
                self.expect(&TokenKind::RightBracket)?;
                PropertyName::Computed(key)
            }
            TokenKind::String(s) => {
                let s = s.clone();
                self.advance();
                PropertyName::Static(s)
            }
            TokenKind::Number(n) => {
                let key = number_to_string(*n);
                self.advance();
                PropertyName::Static(key)
            }
            _ => PropertyName::Static(self.parse_property_identifier()?),
        };

        match &self.current().kind {
            TokenKind::Colon => {
                self.advance();
                let value = self.parse_assignment_expression()?;
                Ok(ObjectProperty::Property { key, value })
            }
            TokenKind::LeftParen => {
                let id = match &key {
                    PropertyName::Static(name) => Some(Identifier {
                        name: name.clone(),
                        span: start,
                    }),
                    PropertyName::Computed(_) => None,
                };
                let function = self.parse_function_rest(id, start)?;
                Ok(ObjectProperty::Property {
                    key,
                    value: Expression::Function(function),
                })
            }
            TokenKind::Comma | TokenKind::RightBrace if shorthand_id.is_some() => {
                let name = shorthand_id.unwrap_or_default();
                Ok(ObjectProperty::Property {
                    key,
                    value: Expression::Identifier(Identifier { name, span: start }),
                })
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Parse call arguments including the parentheses.
    fn parse_arguments(&mut self) -> ParseResult<Vec<Expression>> {
        self.expect(&TokenKind::LeftParen)?;
        let saved_no_in = core::mem::replace(&mut self.no_in, false);

        let mut arguments = Vec::new();
        let result = loop {
            if self.check(&TokenKind::RightParen) {
                break Ok(());
            }
            match self.parse_element() {
                Ok(argument) => arguments.push(argument),
                Err(err) => break Err(err),
            }
            if !self.check(&TokenKind::RightParen) {
                if let Err(err) = self.expect(&TokenKind::Comma) {
                    break Err(err);
                }
            }
        };
        self.no_in = saved_no_in;
        result?;

        self.expect(&TokenKind::RightParen)?;
        Ok(arguments)
    }

    /// Parse a binding identifier (contextual keywords allowed).
    fn parse_binding_identifier(&mut self) -> ParseResult<Identifier> {
        let span = self.current_span();
        match self.current().kind.binding_name() {
            Some(name) => {
                let name = String::from(name);
                self.advance();
                Ok(Identifier { name, span })
            }
            None => Err(self.unexpected()),
        }
    }

    /// Parse the name after `.` or an object literal key; reserved words
    /// are allowed.
    fn parse_property_identifier(&mut self) -> ParseResult<String> {
        match self.current().kind.property_name() {
            Some(name) => {
                let name = String::from(name);
                self.advance();
                Ok(name)
            }
            None => Err(self.unexpected()),
        }
    }

    /// Record a `var` name in the innermost function scope.
    fn declare_var(&mut self, name: &str) {
        if let Some(scope) = self.var_scopes.last_mut() {
            if !scope.iter().any(|n| n == name) {
                scope.push(String::from(name));
            }
        }
    }

    // Helper methods

    /// Run `parse` one nesting level deeper. Past the limit the source is
    /// rejected the way V8 rejects it, instead of exhausting the stack.
    fn nested<T>(&mut self, parse: fn(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::new(
                "Maximum call stack size exceeded",
                self.current_span(),
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &TokenKind {
        let index = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn current_span(&self) -> Span {
        self.current().span
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            self.current_span()
        }
    }

    fn is_eof(&self) -> bool {
        self.current().is_eof()
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        core::mem::discriminant(&self.current().kind) == core::mem::discriminant(kind)
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Whether the current token may end a statement without a `;`.
    fn at_statement_end(&self) -> bool {
        let token = self.current();
        token.newline_before
            || matches!(
                token.kind,
                TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::Eof
            )
    }

    /// Automatic semicolon insertion: a statement ends at `;`, before `}`,
    /// at end of input or at a line break.
    fn consume_semicolon(&mut self) -> ParseResult<()> {
        if self.check(&TokenKind::Semicolon) {
            self.advance();
            return Ok(());
        }
        if self.at_statement_end() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// V8-style error for the current token.
    fn unexpected(&self) -> ParseError {
        let token = self.current();
        let message = match &token.kind {
            TokenKind::Eof => String::from("Unexpected end of input"),
            TokenKind::Identifier(_) => String::from("Unexpected identifier"),
            TokenKind::String(_) => String::from("Unexpected string"),
            TokenKind::Number(_) => String::from("Unexpected number"),
            TokenKind::TemplateString { .. } => String::from("Unexpected template string"),
            TokenKind::Invalid(_) => String::from("Invalid or unexpected token"),
            kind => format!("Unexpected token {}", kind),
        };
        ParseError::new(message, token.span)
    }
}

/// Binary or logical operator while climbing precedence.
enum Operator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// Simple assignment targets: identifiers and member expressions.
fn is_assignable(expr: &Expression) -> bool {
    matches!(expr, Expression::Identifier(_) | Expression::Member(_))
}

/// Parse JavaScript source code into an AST.
pub fn parse(source: &str) -> ParseResult<Program> {
    let mut parser = Parser::new(source)?;
    parser.parse_script()
}
