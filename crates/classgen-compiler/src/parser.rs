//! Recursive descent parser
//!
//! The parser does not build a syntax tree of its own: each declaration and
//! statement is replayed on a builder [`Session`] as soon as it is recognised,
//! so scope and validation rules are the builder's.
//!
//! Simple type names are resolved through the unit's import scope, the
//! inverse of the aliasing the source emitter applies. In expression
//! position an identifier that is not a local variable and is followed by
//! `.` starts a type name; its package segments run up to the first
//! capitalised segment.

use crate::lexer::{Span, Token};
use crate::{CompileError, CompileResult};
use classgen_codegen::{BinaryOp, Expr, Modifiers, Session, TypeRef};

pub struct Parser<'a, 'cg> {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    session: &'a mut Session<'cg>,
    /// Visible locals and parameters, innermost scope last
    locals: Vec<Vec<String>>,
}

impl<'a, 'cg> Parser<'a, 'cg> {
    pub fn new(mut tokens: Vec<(Token, Span)>, session: &'a mut Session<'cg>) -> Self {
        if !matches!(tokens.last(), Some((Token::Eof, _))) {
            let span = tokens.last().map(|(_, span)| *span).unwrap_or_default();
            tokens.push((Token::Eof, span));
        }
        Self {
            tokens,
            pos: 0,
            session,
            locals: Vec::new(),
        }
    }

    // ===== Token Stream =====

    fn token_at(&self, index: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[index.min(last)].0
    }

    fn peek(&self) -> &Token {
        self.token_at(self.pos)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.token_at(self.pos + offset)
    }

    fn span(&self) -> Span {
        let last = self.tokens.len() - 1;
        self.tokens[self.pos.min(last)].1
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> CompileResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        let span = self.span();
        CompileError::Parse {
            line: span.line,
            column: span.column,
            message: message.into(),
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        self.error(format!("expected {}, found {}", expected, self.peek()))
    }

    fn ident(&mut self) -> CompileResult<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn qualified_name(&mut self) -> CompileResult<String> {
        let mut name = self.ident()?;
        while self.check(&Token::Dot) && matches!(self.peek_at(1), Token::Ident(_)) {
            self.advance();
            name.push('.');
            name.push_str(&self.ident()?);
        }
        Ok(name)
    }

    // ===== Locals =====

    fn declare(&mut self, name: String) {
        if let Some(scope) = self.locals.last_mut() {
            scope.push(name);
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals
            .iter()
            .any(|scope| scope.iter().any(|local| local == name))
    }

    // ===== Declarations =====

    /// Parse one compilation unit and close the class; returns its name
    pub fn compilation_unit(mut self) -> CompileResult<String> {
        if self.eat(&Token::Package) {
            let name = self.qualified_name()?;
            self.expect(Token::Semicolon)?;
            self.session.package(&name)?;
        }
        while self.eat(&Token::Import) {
            let name = self.qualified_name()?;
            self.expect(Token::Semicolon)?;
            self.session.import(&name)?;
        }

        let modifiers = self.modifiers();
        self.expect(Token::Class)?;
        let simple = self.ident()?;
        let superclass = if self.eat(&Token::Extends) {
            Some(self.named_type()?)
        } else {
            None
        };
        let class = self.session.class(modifiers, &simple, superclass.as_ref())?;

        self.expect(Token::LeftBrace)?;
        while !self.eat(&Token::RightBrace) {
            if self.check(&Token::Eof) {
                return Err(self.unexpected("`}`"));
            }
            self.member(&simple)?;
        }
        if !self.check(&Token::Eof) {
            return Err(self.unexpected("end of input"));
        }
        self.session.end()?;
        Ok(class.name().to_string())
    }

    fn modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::NONE;
        loop {
            let flag = match self.peek() {
                Token::Public => Modifiers::PUBLIC,
                Token::Protected => Modifiers::PROTECTED,
                Token::Private => Modifiers::PRIVATE,
                Token::Static if self.peek_at(1) != &Token::LeftBrace => Modifiers::STATIC,
                Token::Final => Modifiers::FINAL,
                Token::Abstract => Modifiers::ABSTRACT,
                _ => return modifiers,
            };
            self.advance();
            modifiers |= flag;
        }
    }

    fn member(&mut self, class: &str) -> CompileResult<()> {
        if self.check(&Token::Static) && self.peek_at(1) == &Token::LeftBrace {
            self.advance();
            self.session.static_init()?;
            self.block_statements()?;
            self.session.end()?;
            return Ok(());
        }

        let modifiers = self.modifiers();
        let is_constructor = matches!(self.peek(), Token::Ident(name) if name == class)
            && self.peek_at(1) == &Token::LeftParen;
        if is_constructor {
            self.advance();
            self.session.constructor(modifiers)?;
            return self.method_rest(true);
        }

        let ty = self.return_type()?;
        let name = self.ident()?;
        if self.check(&Token::LeftParen) {
            self.session.method(modifiers, &ty, &name)?;
            return self.method_rest(false);
        }

        if self.eat(&Token::Equal) {
            let init = self.expr()?;
            self.session.field_init(modifiers, &ty, &name, init)?;
        } else {
            self.session.field(modifiers, &ty, &name)?;
        }
        self.expect(Token::Semicolon)
    }

    /// Parameters and body of a method or constructor whose header is open
    fn method_rest(&mut self, is_constructor: bool) -> CompileResult<()> {
        self.expect(Token::LeftParen)?;
        self.locals.push(Vec::new());
        if !self.eat(&Token::RightParen) {
            loop {
                let ty = self.value_type()?;
                let name = self.ident()?;
                self.session.arg(&ty, &name)?;
                self.declare(name);
                if self.eat(&Token::RightParen) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }

        if self.eat(&Token::Semicolon) {
            self.locals.pop();
            self.session.end()?;
            return Ok(());
        }

        self.session.body()?;
        self.expect(Token::LeftBrace)?;
        if is_constructor && self.eat(&Token::Super) {
            // the superclass constructor call is implicit in the builder
            self.expect(Token::LeftParen)?;
            self.expect(Token::RightParen)?;
            self.expect(Token::Semicolon)?;
        }
        self.statements()?;
        self.locals.pop();
        self.session.end()?;
        Ok(())
    }

    // ===== Types =====

    fn resolve_type(&mut self, name: String) -> CompileResult<TypeRef> {
        let qualified = if name.contains('.') {
            name
        } else {
            self.session.registry().scope().qualify(&name)
        };
        Ok(self.session.ty(&qualified)?)
    }

    fn named_type(&mut self) -> CompileResult<TypeRef> {
        let name = self.qualified_name()?;
        self.resolve_type(name)
    }

    fn value_type(&mut self) -> CompileResult<TypeRef> {
        let mut ty = match self.peek().clone() {
            Token::Primitive(name) => {
                self.advance();
                self.session.ty(&name)?
            }
            Token::Ident(_) => self.named_type()?,
            _ => return Err(self.unexpected("type")),
        };
        while self.check(&Token::LeftBracket) && self.peek_at(1) == &Token::RightBracket {
            self.advance();
            self.advance();
            ty = self.session.array_of(&ty)?;
        }
        Ok(ty)
    }

    fn return_type(&mut self) -> CompileResult<TypeRef> {
        if self.eat(&Token::Void) {
            Ok(TypeRef::void())
        } else {
            self.value_type()
        }
    }

    // ===== Statements =====

    /// `{ statements }` in a fresh local scope
    fn block_statements(&mut self) -> CompileResult<()> {
        self.expect(Token::LeftBrace)?;
        self.locals.push(Vec::new());
        self.statements()?;
        self.locals.pop();
        Ok(())
    }

    /// Statements up to and including the closing brace
    fn statements(&mut self) -> CompileResult<()> {
        while !self.eat(&Token::RightBrace) {
            if self.check(&Token::Eof) {
                return Err(self.unexpected("`}`"));
            }
            self.statement()?;
        }
        Ok(())
    }

    fn statement(&mut self) -> CompileResult<()> {
        match self.peek().clone() {
            Token::If => self.if_statement(),
            Token::Try => self.try_statement(),
            Token::LeftBrace => {
                self.session.block()?;
                self.block_statements()?;
                self.session.end()?;
                Ok(())
            }
            Token::Return => {
                self.advance();
                if self.eat(&Token::Semicolon) {
                    self.session.ret(None)?;
                } else {
                    let value = self.expr()?;
                    self.expect(Token::Semicolon)?;
                    self.session.ret(Some(value))?;
                }
                Ok(())
            }
            Token::Throw => {
                self.advance();
                let value = self.expr()?;
                self.expect(Token::Semicolon)?;
                self.session.throw(value)?;
                Ok(())
            }
            Token::Super => {
                Err(self.error("`super()` is only allowed first in a constructor body"))
            }
            _ if self.at_declaration() => self.declaration(),
            _ => self.expression_statement(),
        }
    }

    fn if_statement(&mut self) -> CompileResult<()> {
        self.expect(Token::If)?;
        self.expect(Token::LeftParen)?;
        let cond = self.expr()?;
        self.expect(Token::RightParen)?;
        self.session.if_(cond)?;
        self.block_statements()?;
        if self.eat(&Token::Else) {
            self.session.else_()?;
            if self.check(&Token::If) {
                self.if_statement()?;
            } else {
                self.block_statements()?;
            }
        }
        self.session.end()?;
        Ok(())
    }

    fn try_statement(&mut self) -> CompileResult<()> {
        self.expect(Token::Try)?;
        self.session.try_()?;
        self.block_statements()?;
        if !self.check(&Token::Catch) {
            return Err(self.unexpected("`catch`"));
        }
        while self.eat(&Token::Catch) {
            self.expect(Token::LeftParen)?;
            let ty = self.value_type()?;
            let name = self.ident()?;
            self.expect(Token::RightParen)?;
            self.session.catch_(&ty, &name)?;
            self.locals.push(vec![name]);
            self.block_statements()?;
            self.locals.pop();
        }
        self.session.end()?;
        Ok(())
    }

    /// Whether the statement starts with `Type name`
    fn at_declaration(&self) -> bool {
        let mut i = self.pos;
        match self.token_at(i) {
            Token::Primitive(_) => return true,
            Token::Ident(_) => {}
            _ => return false,
        }
        while self.token_at(i + 1) == &Token::Dot && matches!(self.token_at(i + 2), Token::Ident(_))
        {
            i += 2;
        }
        while self.token_at(i + 1) == &Token::LeftBracket
            && self.token_at(i + 2) == &Token::RightBracket
        {
            i += 2;
        }
        matches!(self.token_at(i + 1), Token::Ident(_))
    }

    fn declaration(&mut self) -> CompileResult<()> {
        let ty = self.value_type()?;
        let name = self.ident()?;
        self.expect(Token::Equal)?;
        let value = self.expr()?;
        self.expect(Token::Semicolon)?;
        self.session.define(&ty, &name, value)?;
        self.declare(name);
        Ok(())
    }

    fn expression_statement(&mut self) -> CompileResult<()> {
        let target = self.expr()?;
        if self.eat(&Token::Equal) {
            let value = self.expr()?;
            self.expect(Token::Semicolon)?;
            self.session.assign(target, value)?;
        } else {
            self.expect(Token::Semicolon)?;
            self.session.expr(target)?;
        }
        Ok(())
    }

    // ===== Expressions =====

    pub fn expr(&mut self) -> CompileResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::PipePipe) {
            let rhs = self.and_expr()?;
            lhs = Expr::binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.equality()?;
        while self.eat(&Token::AmpAmp) {
            let rhs = self.equality()?;
            lhs = Expr::binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.relational()?;
        loop {
            let op = match self.peek() {
                Token::EqualEqual => BinaryOp::Eq,
                Token::BangEqual => BinaryOp::Ne,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.relational()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn relational(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Less => BinaryOp::Lt,
                Token::LessEqual => BinaryOp::Le,
                Token::Greater => BinaryOp::Gt,
                Token::GreaterEqual => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.additive()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn additive(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.unary()?;
        while self.eat(&Token::Star) {
            let rhs = self.unary()?;
            lhs = Expr::binary(BinaryOp::Mul, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> CompileResult<Expr> {
        if self.eat(&Token::Bang) {
            return Ok(Expr::not(self.unary()?));
        }
        if self.eat(&Token::Minus) {
            return self.negative_literal();
        }
        self.postfix()
    }

    /// `-` followed by a numeric literal; the only negation in the subset
    fn negative_literal(&mut self) -> CompileResult<Expr> {
        const INT_MIN_MAGNITUDE: u64 = 1 << 31;
        const LONG_MIN_MAGNITUDE: u64 = 1 << 63;
        match self.peek().clone() {
            Token::Int(magnitude) if magnitude <= INT_MIN_MAGNITUDE => {
                self.advance();
                Ok(Expr::int((-(magnitude as i64)) as i32))
            }
            Token::Long(magnitude) if magnitude <= LONG_MIN_MAGNITUDE => {
                self.advance();
                Ok(Expr::long((-(magnitude as i128)) as i64))
            }
            Token::Double(value) => {
                self.advance();
                Ok(Expr::double(-value))
            }
            Token::Int(_) | Token::Long(_) => Err(self.error("integer literal out of range")),
            other => Err(self.error(format!(
                "unary minus applies to numeric literals only, found {}",
                other
            ))),
        }
    }

    fn postfix(&mut self) -> CompileResult<Expr> {
        let mut expr = self.primary()?;
        while self.eat(&Token::Dot) {
            let name = self.ident()?;
            expr = if self.check(&Token::LeftParen) {
                let args = self.arguments()?;
                Expr::call(expr, name, args)
            } else {
                Expr::field(expr, name)
            };
        }
        Ok(expr)
    }

    fn primary(&mut self) -> CompileResult<Expr> {
        match self.peek().clone() {
            Token::Int(value) => {
                let value = i32::try_from(value)
                    .map_err(|_| self.error("integer literal out of range"))?;
                self.advance();
                Ok(Expr::int(value))
            }
            Token::Long(value) => {
                let value = i64::try_from(value)
                    .map_err(|_| self.error("long literal out of range"))?;
                self.advance();
                Ok(Expr::long(value))
            }
            Token::Double(value) => {
                self.advance();
                Ok(Expr::double(value))
            }
            Token::Str(value) => {
                self.advance();
                Ok(Expr::str(value))
            }
            Token::True | Token::False => {
                let value = self.advance() == Token::True;
                Ok(Expr::bool(value))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::null())
            }
            Token::This => {
                self.advance();
                Ok(Expr::This)
            }
            Token::New => {
                self.advance();
                let ty = self.named_type()?;
                let args = self.arguments()?;
                Ok(Expr::new_instance(ty, args))
            }
            Token::LeftParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                self.advance();
                self.name(name)
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// A local variable, or a static member access `Type.member`
    fn name(&mut self, first: String) -> CompileResult<Expr> {
        if self.is_local(&first) || !self.check(&Token::Dot) {
            return Ok(Expr::var(first));
        }

        let mut type_name = first;
        let mut last_is_type = starts_uppercase(&type_name);
        while !last_is_type && self.check(&Token::Dot) && matches!(self.peek_at(1), Token::Ident(_))
        {
            self.advance();
            let segment = self.ident()?;
            last_is_type = starts_uppercase(&segment);
            type_name.push('.');
            type_name.push_str(&segment);
        }
        let owner = self.resolve_type(type_name)?;

        self.expect(Token::Dot)?;
        let member = self.ident()?;
        if self.check(&Token::LeftParen) {
            let args = self.arguments()?;
            Ok(Expr::call_static(owner, member, args))
        } else {
            Ok(Expr::static_field(owner, member))
        }
    }

    fn arguments(&mut self) -> CompileResult<Vec<Expr>> {
        self.expect(Token::LeftParen)?;
        let mut args = Vec::new();
        if self.eat(&Token::RightParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::RightParen) {
                return Ok(args);
            }
            self.expect(Token::Comma)?;
        }
    }
}

fn starts_uppercase(segment: &str) -> bool {
    segment.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}
