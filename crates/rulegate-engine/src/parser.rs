//! Recursive-descent parser for the constrained rule dialect.
//!
//! Statements are parsed by keyword dispatch; expressions use precedence
//! climbing. Semicolons are consumed when present but not required
//! between statements. A nesting guard bounds recursion so pathological
//! input fails with a parse error instead of exhausting the host stack.

use std::rc::Rc;

use crate::ast::{
    AssignOp, BinaryOp, Expr, LogicalOp, MemberKey, PropKey, Stmt, SwitchCase, UnaryOp,
};
use crate::lexer::{tokenize, Spanned, Token};

const MAX_NESTING: u32 = 200;

/// Parse a complete program.
pub fn parse(source: &str) -> Result<Vec<Stmt>, String> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut stmts = Vec::new();
    while !parser.check(&Token::Eof) {
        stmts.push(parser.parse_stmt()?);
    }
    Ok(stmts)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: u32,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].token
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
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

    fn expect(&mut self, token: &Token) -> Result<(), String> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!(
                "line {}: expected `{token}`, found `{}`",
                self.line(),
                self.peek()
            ))
        }
    }

    fn is_kw(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name == keyword)
    }

    fn expect_ident(&mut self) -> Result<String, String> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(format!("line {}: expected identifier, found `{other}`", self.line())),
        }
    }

    fn enter(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(format!("line {}: expression nesting too deep", self.line()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // --- Statements ---

    fn parse_stmt(&mut self) -> Result<Stmt, String> {
        match self.peek() {
            Token::Semi => {
                self.advance();
                Ok(Stmt::Empty)
            }
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            Token::Ident(name) => match name.as_str() {
                "var" | "let" | "const" => {
                    let stmt = self.parse_var_decl()?;
                    self.eat(&Token::Semi);
                    Ok(stmt)
                }
                "function" => self.parse_function_decl(),
                "if" => self.parse_if(),
                "while" => self.parse_while(),
                "do" => self.parse_do_while(),
                "for" => self.parse_for(),
                "return" => self.parse_return(),
                "break" => {
                    self.advance();
                    self.eat(&Token::Semi);
                    Ok(Stmt::Break)
                }
                "continue" => {
                    self.advance();
                    self.eat(&Token::Semi);
                    Ok(Stmt::Continue)
                }
                "throw" => {
                    self.advance();
                    let value = self.parse_expr()?;
                    self.eat(&Token::Semi);
                    Ok(Stmt::Throw(value))
                }
                "try" => self.parse_try(),
                "switch" => self.parse_switch(),
                _ => self.parse_expr_stmt(),
            },
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_expr_stmt(&mut self) -> Result<Stmt, String> {
        let expr = self.parse_expr()?;
        self.eat(&Token::Semi);
        Ok(Stmt::Expr(expr))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, String> {
        self.expect(&Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.check(&Token::Eof) {
                return Err(format!("line {}: unterminated block", self.line()));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(&Token::RBrace)?;
        Ok(stmts)
    }

    /// `var a = 1, b, c = 2` — the keyword is consumed here; the trailing
    /// semicolon belongs to the caller (for-loop init shares this path).
    fn parse_var_decl(&mut self) -> Result<Stmt, String> {
        self.advance(); // var/let/const
        let mut decls = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let init = if self.eat(&Token::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            decls.push((name, init));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Stmt::VarDecl { decls })
    }

    fn parse_function_decl(&mut self) -> Result<Stmt, String> {
        self.advance(); // function
        let name = self.expect_ident()?;
        let params = self.parse_params()?;
        let body = Rc::new(self.parse_block()?);
        Ok(Stmt::FunctionDecl { name, params, body })
    }

    fn parse_params(&mut self) -> Result<Vec<String>, String> {
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                params.push(self.expect_ident()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        Ok(params)
    }

    fn parse_if(&mut self) -> Result<Stmt, String> {
        self.advance(); // if
        self.expect(&Token::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.is_kw("else") {
            self.advance();
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, String> {
        self.advance(); // while
        self.expect(&Token::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_do_while(&mut self) -> Result<Stmt, String> {
        self.advance(); // do
        let body = Box::new(self.parse_stmt()?);
        if !self.is_kw("while") {
            return Err(format!("line {}: expected `while` after do body", self.line()));
        }
        self.advance();
        self.expect(&Token::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        self.eat(&Token::Semi);
        Ok(Stmt::DoWhile { body, cond })
    }

    fn parse_for(&mut self) -> Result<Stmt, String> {
        self.advance(); // for
        self.expect(&Token::LParen)?;

        let init = if self.eat(&Token::Semi) {
            None
        } else if self.is_kw("var") || self.is_kw("let") || self.is_kw("const") {
            let decl = self.parse_var_decl()?;
            self.expect(&Token::Semi)?;
            Some(Box::new(decl))
        } else {
            let expr = self.parse_expr()?;
            self.expect(&Token::Semi)?;
            Some(Box::new(Stmt::Expr(expr)))
        };

        let cond = if self.check(&Token::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Token::Semi)?;

        let update = if self.check(&Token::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Token::RParen)?;

        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, String> {
        self.advance(); // return
        let value = if self.check(&Token::Semi) || self.check(&Token::RBrace) || self.check(&Token::Eof)
        {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.eat(&Token::Semi);
        Ok(Stmt::Return(value))
    }

    fn parse_try(&mut self) -> Result<Stmt, String> {
        self.advance(); // try
        let block = self.parse_block()?;

        let catch = if self.is_kw("catch") {
            self.advance();
            let param = if self.eat(&Token::LParen) {
                let name = self.expect_ident()?;
                self.expect(&Token::RParen)?;
                Some(name)
            } else {
                None
            };
            Some((param, self.parse_block()?))
        } else {
            None
        };

        let finally = if self.is_kw("finally") {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        if catch.is_none() && finally.is_none() {
            return Err(format!(
                "line {}: try statement needs a catch or finally clause",
                self.line()
            ));
        }

        Ok(Stmt::Try {
            block,
            catch,
            finally,
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt, String> {
        self.advance(); // switch
        self.expect(&Token::LParen)?;
        let disc = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        self.expect(&Token::LBrace)?;

        let mut cases = Vec::new();
        while !self.check(&Token::RBrace) {
            let test = if self.is_kw("case") {
                self.advance();
                let test = self.parse_expr()?;
                self.expect(&Token::Colon)?;
                Some(test)
            } else if self.is_kw("default") {
                self.advance();
                self.expect(&Token::Colon)?;
                None
            } else {
                return Err(format!(
                    "line {}: expected `case` or `default` in switch body",
                    self.line()
                ));
            };

            let mut body = Vec::new();
            while !self.check(&Token::RBrace) && !self.is_kw("case") && !self.is_kw("default") {
                body.push(self.parse_stmt()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.expect(&Token::RBrace)?;

        Ok(Stmt::Switch { disc, cases })
    }

    // --- Expressions ---

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, String> {
        self.enter()?;
        let result = self.parse_assignment_inner();
        self.leave();
        result
    }

    fn parse_assignment_inner(&mut self) -> Result<Expr, String> {
        // Arrow functions need lookahead before ordinary expression parsing.
        if let Token::Ident(name) = self.peek() {
            if !is_reserved(name) && self.peek_at(1) == &Token::Arrow {
                let param = self.expect_ident()?;
                self.advance(); // =>
                let body = self.parse_arrow_body()?;
                return Ok(Expr::Function {
                    name: None,
                    params: vec![param],
                    body: Rc::new(body),
                });
            }
        }
        if self.check(&Token::LParen) {
            if let Some(params_end) = self.matching_paren(self.pos) {
                if self.tokens[params_end + 1].token == Token::Arrow {
                    let params = self.parse_params()?;
                    self.expect(&Token::Arrow)?;
                    let body = self.parse_arrow_body()?;
                    return Ok(Expr::Function {
                        name: None,
                        params,
                        body: Rc::new(body),
                    });
                }
            }
        }

        let left = self.parse_conditional()?;

        let op = match self.peek() {
            Token::Assign => Some(AssignOp::Assign),
            Token::PlusAssign => Some(AssignOp::Add),
            Token::MinusAssign => Some(AssignOp::Sub),
            Token::StarAssign => Some(AssignOp::Mul),
            Token::SlashAssign => Some(AssignOp::Div),
            Token::PercentAssign => Some(AssignOp::Rem),
            _ => None,
        };

        if let Some(op) = op {
            if !matches!(left, Expr::Ident(_) | Expr::Member { .. }) {
                return Err(format!("line {}: invalid assignment target", self.line()));
            }
            self.advance();
            let value = self.parse_assignment()?;
            return Ok(Expr::Assign {
                op,
                target: Box::new(left),
                value: Box::new(value),
            });
        }

        Ok(left)
    }

    /// Index of the `)` matching the `(` at `open`, if well-nested.
    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (index, spanned) in self.tokens.iter().enumerate().skip(open) {
            match spanned.token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(index);
                    }
                }
                Token::Eof => return None,
                _ => {}
            }
        }
        None
    }

    fn parse_arrow_body(&mut self) -> Result<Vec<Stmt>, String> {
        if self.check(&Token::LBrace) {
            self.parse_block()
        } else {
            let expr = self.parse_assignment()?;
            Ok(vec![Stmt::Return(Some(expr))])
        }
    }

    fn parse_conditional(&mut self) -> Result<Expr, String> {
        let cond = self.parse_logical_or()?;
        if self.eat(&Token::Question) {
            let then = self.parse_assignment()?;
            self.expect(&Token::Colon)?;
            let other = self.parse_assignment()?;
            return Ok(Expr::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                other: Box::new(other),
            });
        }
        Ok(cond)
    }

    fn parse_logical_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_logical_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_logical_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::NotEq,
                Token::StrictEq => BinaryOp::StrictEq,
                Token::StrictNotEq => BinaryOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        self.enter()?;
        let result = self.parse_unary_inner();
        self.leave();
        result
    }

    fn parse_unary_inner(&mut self) -> Result<Expr, String> {
        let op = match self.peek() {
            Token::Not => Some(UnaryOp::Not),
            Token::Minus => Some(UnaryOp::Neg),
            Token::Plus => Some(UnaryOp::Pos),
            Token::Ident(name) if name == "typeof" => Some(UnaryOp::TypeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }

        if self.check(&Token::PlusPlus) || self.check(&Token::MinusMinus) {
            let delta = if self.advance() == Token::PlusPlus { 1.0 } else { -1.0 };
            let target = self.parse_unary()?;
            if !matches!(target, Expr::Ident(_) | Expr::Member { .. }) {
                return Err(format!("line {}: invalid increment target", self.line()));
            }
            return Ok(Expr::Update {
                delta,
                prefix: true,
                target: Box::new(target),
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_call_member()?;
        while self.check(&Token::PlusPlus) || self.check(&Token::MinusMinus) {
            if !matches!(expr, Expr::Ident(_) | Expr::Member { .. }) {
                break;
            }
            let delta = if self.advance() == Token::PlusPlus { 1.0 } else { -1.0 };
            expr = Expr::Update {
                delta,
                prefix: false,
                target: Box::new(expr),
            };
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> Result<Expr, String> {
        let mut expr = if self.is_kw("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };

        loop {
            if self.eat(&Token::Dot) {
                let name = self.expect_ident()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberKey::Dot(name),
                };
            } else if self.eat(&Token::LBracket) {
                let key = self.parse_expr()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberKey::Bracket(Box::new(key)),
                };
            } else if self.check(&Token::LParen) {
                let args = self.parse_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_new(&mut self) -> Result<Expr, String> {
        self.advance(); // new
        let mut callee = self.parse_primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = self.expect_ident()?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: MemberKey::Dot(name),
                };
            } else {
                break;
            }
        }
        let args = if self.check(&Token::LParen) {
            self.parse_args()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, String> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.parse_assignment()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.peek().clone() {
            Token::Num(value) => {
                self.advance();
                Ok(Expr::Num(value))
            }
            Token::Str(value) => {
                self.advance();
                Ok(Expr::Str(value))
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => self.parse_array_literal(),
            Token::LBrace => self.parse_object_literal(),
            Token::Ident(name) => match name.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Bool(true))
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Bool(false))
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Null)
                }
                "undefined" => {
                    self.advance();
                    Ok(Expr::Undefined)
                }
                "function" => {
                    self.advance();
                    let name = match self.peek() {
                        Token::Ident(n) if !is_reserved(n) && self.peek_at(1) == &Token::LParen => {
                            Some(self.expect_ident()?)
                        }
                        _ => None,
                    };
                    let params = self.parse_params()?;
                    let body = Rc::new(self.parse_block()?);
                    Ok(Expr::Function { name, params, body })
                }
                _ => {
                    self.advance();
                    Ok(Expr::Ident(name))
                }
            },
            other => Err(format!(
                "line {}: unexpected token `{other}` in expression",
                self.line()
            )),
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expr, String> {
        self.expect(&Token::LBracket)?;
        let mut elements = Vec::new();
        if !self.check(&Token::RBracket) {
            loop {
                elements.push(self.parse_assignment()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
                if self.check(&Token::RBracket) {
                    break; // trailing comma
                }
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(Expr::Array(elements))
    }

    fn parse_object_literal(&mut self) -> Result<Expr, String> {
        self.expect(&Token::LBrace)?;
        let mut props = Vec::new();
        if !self.check(&Token::RBrace) {
            loop {
                let key = match self.peek().clone() {
                    Token::Ident(name) => {
                        self.advance();
                        // Shorthand `{ name }` / `{ name, ... }`
                        if self.check(&Token::Comma) || self.check(&Token::RBrace) {
                            props.push((PropKey::Fixed(name.clone()), Expr::Ident(name)));
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                            if self.check(&Token::RBrace) {
                                break;
                            }
                            continue;
                        }
                        PropKey::Fixed(name)
                    }
                    Token::Str(name) => {
                        self.advance();
                        PropKey::Fixed(name)
                    }
                    Token::Num(value) => {
                        self.advance();
                        PropKey::Fixed(crate::value::format_number(value))
                    }
                    Token::LBracket => {
                        self.advance();
                        let key = self.parse_assignment()?;
                        self.expect(&Token::RBracket)?;
                        PropKey::Computed(Box::new(key))
                    }
                    other => {
                        return Err(format!(
                            "line {}: unexpected token `{other}` as object key",
                            self.line()
                        ))
                    }
                };
                self.expect(&Token::Colon)?;
                let value = self.parse_assignment()?;
                props.push((key, value));
                if !self.eat(&Token::Comma) {
                    break;
                }
                if self.check(&Token::RBrace) {
                    break; // trailing comma
                }
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::Object(props))
    }
}

/// Names that can never be arrow-function parameters or binding targets.
fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "var"
            | "let"
            | "const"
            | "function"
            | "return"
            | "if"
            | "else"
            | "while"
            | "do"
            | "for"
            | "break"
            | "continue"
            | "throw"
            | "try"
            | "catch"
            | "finally"
            | "switch"
            | "case"
            | "default"
            | "new"
            | "typeof"
            | "true"
            | "false"
            | "null"
            | "undefined"
    )
}
