//! Recursive-descent parser for Sandpiper scripts.
//!
//! Grammar follows Python's, restricted to the supported subset. Constructs
//! outside the subset are rejected with a syntax error that names them.

use std::rc::Rc;

use sandpiper_lexer::{Keyword, Lexer, Token, TokenKind};

use crate::adapter::{ParseError, TokenStream};
use crate::ast::*;
use crate::{fstring, scope};

type Result<T> = std::result::Result<T, ParseError>;

/// How deep blocks, brackets and operators may nest before a script is
/// rejected. Parsing and evaluation both recurse once per level.
pub const MAX_NESTING_DEPTH: usize = 200;

const TOO_MANY_PARENS: &str = "too many nested parentheses";
const TOO_COMPLEX: &str = "expression too complex";
const TOO_MANY_INDENTS: &str = "too many levels of indentation";
const TOO_MANY_ELIFS: &str = "too many 'elif' clauses";

pub struct Parser {
    tokens: TokenStream<Lexer>,
    /// Loops enclosing the current statement within the current function.
    loop_depth: usize,
    function_depth: usize,
    /// Blocks, brackets and operators open around the current token.
    nesting: usize,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Self {
            tokens: TokenStream::new(Lexer::new(input)),
            loop_depth: 0,
            function_depth: 0,
            nesting: 0,
        }
    }

    /// A parser for text embedded `nesting` levels deep in another script.
    pub(crate) fn nested(input: &str, nesting: usize) -> Self {
        Self {
            nesting,
            ..Self::new(input)
        }
    }

    /// Parse a whole script.
    pub fn parse_module(&mut self) -> Result<Module> {
        let mut body = Vec::new();
        loop {
            let token = self.tokens.peek()?.clone();
            match token.kind {
                TokenKind::EndOfFile => break,
                TokenKind::Newline => {
                    self.tokens.next()?;
                }
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(Module { body })
    }

    /// Parse a standalone expression, such as an f-string replacement field.
    pub fn parse_standalone_expression(&mut self) -> Result<Expr> {
        let expr = self.parse_testlist()?;
        self.tokens.eat(&TokenKind::Newline)?;
        let token = self.tokens.peek()?.clone();
        if token.kind != TokenKind::EndOfFile {
            return Err(unexpected(&token));
        }
        Ok(expr)
    }

    // ----- nesting -----

    fn enter(&mut self, token: &Token, message: &str) -> Result<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING_DEPTH {
            return Err(ParseError::at(token, message));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    /// Operator chains build their tree in a loop rather than by recursion,
    /// so their height is checked as they grow.
    fn check_height(&self, token: &Token, expr: &Expr) -> Result<()> {
        if self.nesting + expr.height() > MAX_NESTING_DEPTH {
            return Err(ParseError::at(token, TOO_COMPLEX));
        }
        Ok(())
    }

    // ----- token helpers -----

    fn check(&mut self, kind: &TokenKind) -> Result<bool> {
        Ok(self.tokens.peek_kind()? == kind)
    }

    fn check_keyword(&mut self, keyword: Keyword) -> Result<bool> {
        Ok(matches!(self.tokens.peek_kind()?, TokenKind::Keyword(kw) if *kw == keyword))
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> Result<bool> {
        if self.check_keyword(keyword)? {
            self.tokens.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<Token> {
        let token = self.tokens.peek()?.clone();
        if token.kind == *kind {
            return self.tokens.next();
        }
        Err(match token.kind {
            TokenKind::Unsupported(_) | TokenKind::Keyword(_) if is_unsupported(&token.kind) => {
                unexpected(&token)
            }
            _ => ParseError::at(&token, message),
        })
    }

    fn expect_name(&mut self) -> Result<String> {
        let token = self.tokens.next()?;
        match token.kind {
            TokenKind::Name(name) => Ok(name),
            _ => Err(unexpected(&token)),
        }
    }

    fn at_statement_end(&mut self) -> Result<bool> {
        Ok(matches!(
            self.tokens.peek_kind()?,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::EndOfFile
        ))
    }

    fn starts_expression(&mut self) -> Result<bool> {
        Ok(match self.tokens.peek_kind()? {
            TokenKind::Name(_)
            | TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::FString(_)
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::Minus
            | TokenKind::Plus
            | TokenKind::Star
            | TokenKind::Unsupported(_) => true,
            TokenKind::Keyword(kw) => matches!(
                kw,
                Keyword::Not
                    | Keyword::None
                    | Keyword::True
                    | Keyword::False
                    | Keyword::Lambda
                    | Keyword::Await
                    | Keyword::Yield
            ),
            _ => false,
        })
    }

    // ----- statements -----

    fn parse_statement(&mut self) -> Result<Vec<Stmt>> {
        let token = self.tokens.peek()?.clone();
        match &token.kind {
            TokenKind::Keyword(Keyword::If) => Ok(vec![self.parse_if()?]),
            TokenKind::Keyword(Keyword::While) => Ok(vec![self.parse_while()?]),
            TokenKind::Keyword(Keyword::For) => Ok(vec![self.parse_for()?]),
            TokenKind::Keyword(Keyword::Def) => Ok(vec![self.parse_def()?]),
            TokenKind::Keyword(Keyword::Try) => Ok(vec![self.parse_try()?]),
            TokenKind::Indent => Err(ParseError::at(&token, "unexpected indent")),
            _ => self.parse_simple_line(),
        }
    }

    /// One or more `;`-separated simple statements ending the logical line.
    fn parse_simple_line(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = vec![self.parse_simple_statement()?];
        while self.tokens.eat(&TokenKind::Semicolon)? {
            if matches!(
                self.tokens.peek_kind()?,
                TokenKind::Newline | TokenKind::EndOfFile
            ) {
                break;
            }
            stmts.push(self.parse_simple_statement()?);
        }

        let token = self.tokens.peek()?.clone();
        match token.kind {
            TokenKind::Newline => {
                self.tokens.next()?;
            }
            TokenKind::EndOfFile => {}
            _ => return Err(unexpected(&token)),
        }
        Ok(stmts)
    }

    fn parse_simple_statement(&mut self) -> Result<Stmt> {
        let token = self.tokens.peek()?.clone();
        let line = token.line;

        let kind = match &token.kind {
            TokenKind::Keyword(Keyword::Pass) => {
                self.tokens.next()?;
                StmtKind::Pass
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.tokens.next()?;
                if self.loop_depth == 0 {
                    return Err(ParseError::at(&token, "'break' outside loop"));
                }
                StmtKind::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.tokens.next()?;
                if self.loop_depth == 0 {
                    return Err(ParseError::at(&token, "'continue' not properly in loop"));
                }
                StmtKind::Continue
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.tokens.next()?;
                if self.function_depth == 0 {
                    return Err(ParseError::at(&token, "'return' outside function"));
                }
                let value = if self.at_statement_end()? {
                    None
                } else {
                    Some(self.parse_testlist()?)
                };
                StmtKind::Return(value)
            }
            TokenKind::Keyword(Keyword::Raise) => {
                self.tokens.next()?;
                let exc = if self.at_statement_end()? {
                    None
                } else {
                    Some(self.parse_test()?)
                };
                let next = self.tokens.peek()?.clone();
                if next.kind == TokenKind::Keyword(Keyword::From) {
                    return Err(ParseError::at(&next, "'raise ... from' is not supported"));
                }
                StmtKind::Raise(exc)
            }
            TokenKind::Keyword(Keyword::Global) => {
                self.tokens.next()?;
                let mut names = vec![self.expect_name()?];
                while self.tokens.eat(&TokenKind::Comma)? {
                    names.push(self.expect_name()?);
                }
                StmtKind::Global(names)
            }
            TokenKind::Keyword(Keyword::Assert) => {
                self.tokens.next()?;
                let test = self.parse_test()?;
                let msg = if self.tokens.eat(&TokenKind::Comma)? {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            TokenKind::Keyword(Keyword::Import) => {
                self.tokens.next()?;
                let mut names = vec![self.parse_import_alias()?];
                while self.tokens.eat(&TokenKind::Comma)? {
                    names.push(self.parse_import_alias()?);
                }
                StmtKind::Import(names)
            }
            TokenKind::Keyword(Keyword::From) => self.parse_from_import()?,
            TokenKind::Keyword(Keyword::Class)
            | TokenKind::Keyword(Keyword::With)
            | TokenKind::Keyword(Keyword::Async)
            | TokenKind::Keyword(Keyword::Del)
            | TokenKind::Keyword(Keyword::Nonlocal) => return Err(unexpected(&token)),
            _ => return self.parse_expression_statement(line),
        };

        Ok(Stmt::new(kind, line))
    }

    fn parse_expression_statement(&mut self, line: usize) -> Result<Stmt> {
        let start = self.tokens.peek()?.clone();
        let first = self.parse_testlist()?;
        let token = self.tokens.peek()?.clone();

        let kind = match &token.kind {
            TokenKind::Assign => {
                let mut targets = vec![first];
                self.tokens.next()?;
                let mut value = self.parse_testlist()?;
                while self.tokens.eat(&TokenKind::Assign)? {
                    let next = self.parse_testlist()?;
                    targets.push(std::mem::replace(&mut value, next));
                }
                for target in &targets {
                    check_assign_target(target, &start, true)?;
                }
                StmtKind::Assign { targets, value }
            }
            TokenKind::PlusEq
            | TokenKind::MinusEq
            | TokenKind::StarEq
            | TokenKind::SlashEq
            | TokenKind::DoubleSlashEq
            | TokenKind::PercentEq
            | TokenKind::DoubleStarEq => {
                let op = match token.kind {
                    TokenKind::PlusEq => BinOp::Add,
                    TokenKind::MinusEq => BinOp::Sub,
                    TokenKind::StarEq => BinOp::Mul,
                    TokenKind::SlashEq => BinOp::Div,
                    TokenKind::DoubleSlashEq => BinOp::FloorDiv,
                    TokenKind::PercentEq => BinOp::Mod,
                    _ => BinOp::Pow,
                };
                if !matches!(
                    first,
                    Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. }
                ) {
                    return Err(ParseError::at(
                        &start,
                        format!(
                            "'{}' is an illegal expression for augmented assignment",
                            describe(&first)
                        ),
                    ));
                }
                self.tokens.next()?;
                let value = self.parse_testlist()?;
                StmtKind::AugAssign {
                    target: first,
                    op,
                    value,
                }
            }
            TokenKind::Colon => {
                // Annotated assignment; the annotation is parsed and dropped.
                if !matches!(
                    first,
                    Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. }
                ) {
                    return Err(ParseError::at(
                        &start,
                        "only single target (not tuple) can be annotated",
                    ));
                }
                self.tokens.next()?;
                self.parse_test()?;
                if self.tokens.eat(&TokenKind::Assign)? {
                    let value = self.parse_testlist()?;
                    StmtKind::Assign {
                        targets: vec![first],
                        value,
                    }
                } else {
                    StmtKind::Pass
                }
            }
            _ => StmtKind::Expr(first),
        };

        Ok(Stmt::new(kind, line))
    }

    fn parse_dotted_name(&mut self) -> Result<String> {
        let mut name = self.expect_name()?;
        while self.tokens.eat(&TokenKind::Dot)? {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn parse_import_alias(&mut self) -> Result<Alias> {
        let name = self.parse_dotted_name()?;
        let asname = if self.eat_keyword(Keyword::As)? {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(Alias { name, asname })
    }

    fn parse_from_import(&mut self) -> Result<StmtKind> {
        self.tokens.next()?;
        let token = self.tokens.peek()?.clone();
        if token.kind == TokenKind::Dot {
            return Err(ParseError::at(&token, "relative imports are not supported"));
        }
        let module = self.parse_dotted_name()?;
        self.expect(&TokenKind::Keyword(Keyword::Import), "invalid syntax")?;

        let token = self.tokens.peek()?.clone();
        if token.kind == TokenKind::Star {
            return Err(ParseError::at(&token, "'import *' is not supported"));
        }
        let parenthesized = self.tokens.eat(&TokenKind::LParen)?;
        let mut names = Vec::new();
        loop {
            let name = self.expect_name()?;
            let asname = if self.eat_keyword(Keyword::As)? {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(Alias { name, asname });
            if !self.tokens.eat(&TokenKind::Comma)? {
                break;
            }
            if parenthesized && self.check(&TokenKind::RParen)? {
                break;
            }
        }
        if parenthesized {
            self.expect(&TokenKind::RParen, "invalid syntax")?;
        }
        Ok(StmtKind::ImportFrom { module, names })
    }

    /// Parse `: NEWLINE INDENT stmts DEDENT` or a same-line simple body.
    /// `after` describes the owning clause for the missing-block message.
    fn parse_block(&mut self, after: &str) -> Result<Vec<Stmt>> {
        self.expect(&TokenKind::Colon, "expected ':'")?;
        if !self.tokens.eat(&TokenKind::Newline)? {
            return self.parse_simple_line();
        }

        let token = self.tokens.peek()?.clone();
        if token.kind != TokenKind::Indent {
            return Err(ParseError::at(
                &token,
                format!("expected an indented block after {}", after),
            ));
        }
        self.tokens.next()?;
        self.enter(&token, TOO_MANY_INDENTS)?;

        let mut body = Vec::new();
        loop {
            match self.tokens.peek_kind()? {
                TokenKind::Dedent => {
                    self.tokens.next()?;
                    break;
                }
                TokenKind::EndOfFile => break,
                _ => body.extend(self.parse_statement()?),
            }
        }
        self.leave();
        Ok(body)
    }

    fn parse_loop_body(&mut self, after: &str) -> Result<Vec<Stmt>> {
        self.loop_depth += 1;
        let body = self.parse_block(after);
        self.loop_depth -= 1;
        body
    }

    /// Parse an `else:` clause if one follows.
    fn parse_else(&mut self) -> Result<Vec<Stmt>> {
        let token = self.tokens.peek()?.clone();
        if token.kind == TokenKind::Keyword(Keyword::Else) {
            self.tokens.next()?;
            self.parse_block(&format!("'else' statement on line {}", token.line))
        } else {
            Ok(Vec::new())
        }
    }

    /// Parse `if` or `elif` through the end of its chain.
    fn parse_if(&mut self) -> Result<Stmt> {
        let keyword = self.tokens.next()?;
        let clause = if keyword.kind == TokenKind::Keyword(Keyword::Elif) {
            "elif"
        } else {
            "if"
        };
        let test = self.parse_test()?;
        let body = self.parse_block(&format!("'{}' statement on line {}", clause, keyword.line))?;
        let orelse = if self.check_keyword(Keyword::Elif)? {
            // Each `elif` nests inside the previous clause's `else`.
            let elif = self.tokens.peek()?.clone();
            self.enter(&elif, TOO_MANY_ELIFS)?;
            let chained = self.parse_if()?;
            self.leave();
            vec![chained]
        } else {
            self.parse_else()?
        };
        Ok(Stmt::new(StmtKind::If { test, body, orelse }, keyword.line))
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        let keyword = self.tokens.next()?;
        let test = self.parse_test()?;
        let body = self.parse_loop_body(&format!("'while' statement on line {}", keyword.line))?;
        let orelse = self.parse_else()?;
        Ok(Stmt::new(StmtKind::While { test, body, orelse }, keyword.line))
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let keyword = self.tokens.next()?;
        let start = self.tokens.peek()?.clone();
        let target = self.parse_target_list()?;
        check_assign_target(&target, &start, false)?;
        self.expect(&TokenKind::Keyword(Keyword::In), "invalid syntax")?;
        let iter = self.parse_testlist()?;
        let body = self.parse_loop_body(&format!("'for' statement on line {}", keyword.line))?;
        let orelse = self.parse_else()?;
        Ok(Stmt::new(
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
            keyword.line,
        ))
    }

    /// Comma-separated targets of a `for` loop, stopping before `in`.
    fn parse_target_list(&mut self) -> Result<Expr> {
        let first = self.parse_arith()?;
        if !self.check(&TokenKind::Comma)? {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.tokens.eat(&TokenKind::Comma)? {
            if self.check_keyword(Keyword::In)? {
                break;
            }
            items.push(self.parse_arith()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_def(&mut self) -> Result<Stmt> {
        let keyword = self.tokens.next()?;
        let name = self.expect_name()?;
        self.expect(&TokenKind::LParen, "expected '('")?;
        let params = self.parse_params()?;
        if self.tokens.eat(&TokenKind::Arrow)? {
            self.parse_test()?;
        }

        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_block(&format!("function definition on line {}", keyword.line));
        self.function_depth -= 1;
        self.loop_depth = saved_loop_depth;
        let body = body?;

        let scope = scope::analyze_function(&params, &body);
        let def = FunctionDef {
            name,
            params,
            body,
            is_async: false,
            scope,
            line: keyword.line,
        };
        Ok(Stmt::new(StmtKind::FunctionDef(Rc::new(def)), keyword.line))
    }

    /// Parameters after `(`, through the closing `)`.
    fn parse_params(&mut self) -> Result<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        let mut seen_default = false;
        loop {
            let token = self.tokens.next()?;
            let name = match &token.kind {
                TokenKind::RParen => break,
                TokenKind::Star | TokenKind::DoubleStar | TokenKind::Slash => {
                    return Err(ParseError::at(&token, "star parameters are not supported"));
                }
                TokenKind::Name(name) => name.clone(),
                _ => return Err(unexpected(&token)),
            };

            if params.iter().any(|p| p.name == name) {
                return Err(ParseError::at(
                    &token,
                    format!("duplicate argument '{}' in function definition", name),
                ));
            }
            if self.tokens.eat(&TokenKind::Colon)? {
                self.parse_test()?;
            }
            let default = if self.tokens.eat(&TokenKind::Assign)? {
                seen_default = true;
                Some(self.parse_test()?)
            } else if seen_default {
                return Err(ParseError::at(
                    &token,
                    "parameter without a default follows parameter with a default",
                ));
            } else {
                None
            };
            params.push(Param { name, default });

            if !self.tokens.eat(&TokenKind::Comma)? {
                self.expect(&TokenKind::RParen, "invalid syntax")?;
                break;
            }
        }
        Ok(params)
    }

    fn parse_try(&mut self) -> Result<Stmt> {
        let keyword = self.tokens.next()?;
        let body = self.parse_block(&format!("'try' statement on line {}", keyword.line))?;

        let mut handlers: Vec<ExceptHandler> = Vec::new();
        while self.check_keyword(Keyword::Except)? {
            let except = self.tokens.next()?;
            if let Some(previous) = handlers.last() {
                if previous.typ.is_none() {
                    return Err(ParseError::syntax("default 'except:' must be last", previous.line, 1));
                }
            }
            let typ = if self.check(&TokenKind::Colon)? {
                None
            } else {
                Some(self.parse_test()?)
            };
            let name = if typ.is_some() && self.eat_keyword(Keyword::As)? {
                Some(self.expect_name()?)
            } else {
                None
            };
            let body = self.parse_block(&format!("'except' statement on line {}", except.line))?;
            handlers.push(ExceptHandler {
                typ,
                name,
                body,
                line: except.line,
            });
        }

        let orelse = if handlers.is_empty() { Vec::new() } else { self.parse_else()? };

        let token = self.tokens.peek()?.clone();
        let has_finally = token.kind == TokenKind::Keyword(Keyword::Finally);
        let finalbody = if has_finally {
            self.tokens.next()?;
            self.parse_block(&format!("'finally' statement on line {}", token.line))?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && !has_finally {
            return Err(ParseError::at(&token, "expected 'except' or 'finally' block"));
        }

        Ok(Stmt::new(
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            keyword.line,
        ))
    }

    // ----- expressions -----

    /// `test (',' test)* [',']`; more than one item makes a tuple.
    fn parse_testlist(&mut self) -> Result<Expr> {
        let first = self.parse_test()?;
        if !self.check(&TokenKind::Comma)? {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.tokens.eat(&TokenKind::Comma)? {
            if !self.starts_expression()? {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_test(&mut self) -> Result<Expr> {
        let body = self.parse_or_test()?;
        if !self.eat_keyword(Keyword::If)? {
            return Ok(body);
        }
        let test = self.parse_or_test()?;
        let keyword = self.expect(
            &TokenKind::Keyword(Keyword::Else),
            "expected 'else' after 'if' expression",
        )?;
        self.enter(&keyword, TOO_COMPLEX)?;
        let orelse = self.parse_test()?;
        self.leave();
        Ok(Expr::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn parse_or_test(&mut self) -> Result<Expr> {
        let first = self.parse_and_test()?;
        if !self.check_keyword(Keyword::Or)? {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword(Keyword::Or)? {
            values.push(self.parse_and_test()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::Or,
            values,
        })
    }

    fn parse_and_test(&mut self) -> Result<Expr> {
        let first = self.parse_not_test()?;
        if !self.check_keyword(Keyword::And)? {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword(Keyword::And)? {
            values.push(self.parse_not_test()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::And,
            values,
        })
    }

    fn parse_not_test(&mut self) -> Result<Expr> {
        if self.check_keyword(Keyword::Not)? {
            let keyword = self.tokens.next()?;
            self.enter(&keyword, TOO_COMPLEX)?;
            let operand = self.parse_not_test()?;
            self.leave();
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();

        loop {
            let kind = self.tokens.peek_kind()?.clone();
            let op = match kind {
                TokenKind::EqEq => CmpOp::Eq,
                TokenKind::NotEq => CmpOp::NotEq,
                TokenKind::Lt => CmpOp::Lt,
                TokenKind::LtEq => CmpOp::LtE,
                TokenKind::Gt => CmpOp::Gt,
                TokenKind::GtEq => CmpOp::GtE,
                TokenKind::Keyword(Keyword::In) => CmpOp::In,
                TokenKind::Keyword(Keyword::Is) => {
                    if self.tokens.peek_nth(1)?.kind == TokenKind::Keyword(Keyword::Not) {
                        self.tokens.next()?;
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                TokenKind::Keyword(Keyword::Not)
                    if self.tokens.peek_nth(1)?.kind == TokenKind::Keyword(Keyword::In) =>
                {
                    self.tokens.next()?;
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.tokens.next()?;
            ops.push(op);
            comparators.push(self.parse_arith()?);
        }

        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            ops,
            comparators,
        })
    }

    fn parse_arith(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.tokens.peek_kind()? {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let token = self.tokens.next()?;
            let right = self.parse_term()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
            self.check_height(&token, &left)?;
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.tokens.peek_kind()? {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            let token = self.tokens.next()?;
            let right = self.parse_factor()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
            self.check_height(&token, &left)?;
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        let op = match self.tokens.peek_kind()? {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        let token = self.tokens.next()?;
        self.enter(&token, TOO_COMPLEX)?;
        let operand = self.parse_factor()?;
        self.leave();
        Ok(Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if !self.check(&TokenKind::DoubleStar)? {
            return Ok(base);
        }
        let token = self.tokens.next()?;
        self.enter(&token, TOO_COMPLEX)?;
        let exponent = self.parse_factor()?;
        self.leave();
        Ok(Expr::BinOp {
            left: Box::new(base),
            op: BinOp::Pow,
            right: Box::new(exponent),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            let token = self.tokens.peek()?.clone();
            match token.kind {
                TokenKind::LParen => {
                    self.tokens.next()?;
                    self.enter(&token, TOO_MANY_PARENS)?;
                    let (args, keywords) = self.parse_call_args()?;
                    self.leave();
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        keywords,
                    };
                }
                TokenKind::LBracket => {
                    self.tokens.next()?;
                    self.enter(&token, TOO_MANY_PARENS)?;
                    let index = self.parse_subscript()?;
                    self.leave();
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Dot => {
                    self.tokens.next()?;
                    let attr = self.expect_name()?;
                    expr = Expr::Attribute {
                        value: Box::new(expr),
                        attr,
                    };
                }
                _ => break,
            }
            self.check_height(&token, &expr)?;
        }
        Ok(expr)
    }

    /// Call arguments after `(`, through the closing `)`.
    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<KeywordArg>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<KeywordArg> = Vec::new();

        loop {
            let token = self.tokens.peek()?.clone();
            match &token.kind {
                TokenKind::RParen => {
                    self.tokens.next()?;
                    break;
                }
                TokenKind::Star | TokenKind::DoubleStar => {
                    return Err(ParseError::at(&token, "star arguments are not supported"));
                }
                TokenKind::Name(name)
                    if self.tokens.peek_nth(1)?.kind == TokenKind::Assign =>
                {
                    self.tokens.next()?;
                    self.tokens.next()?;
                    if keywords.iter().any(|k| k.name == *name) {
                        return Err(ParseError::at(
                            &token,
                            format!("keyword argument repeated: {}", name),
                        ));
                    }
                    let value = self.parse_test()?;
                    keywords.push(KeywordArg {
                        name: name.clone(),
                        value,
                    });
                }
                _ => {
                    let arg = self.parse_test()?;
                    self.reject_comprehension()?;
                    if !keywords.is_empty() {
                        return Err(ParseError::at(
                            &token,
                            "positional argument follows keyword argument",
                        ));
                    }
                    args.push(arg);
                }
            }

            if !self.tokens.eat(&TokenKind::Comma)? {
                self.expect(
                    &TokenKind::RParen,
                    "invalid syntax. Perhaps you forgot a comma?",
                )?;
                break;
            }
        }
        Ok((args, keywords))
    }

    /// Subscript contents after `[`, through the closing `]`.
    fn parse_subscript(&mut self) -> Result<Expr> {
        let first = self.parse_slice_item()?;
        let index = if self.check(&TokenKind::Comma)? {
            let mut items = vec![first];
            while self.tokens.eat(&TokenKind::Comma)? {
                if self.check(&TokenKind::RBracket)? {
                    break;
                }
                items.push(self.parse_slice_item()?);
            }
            Expr::Tuple(items)
        } else {
            first
        };
        self.expect(&TokenKind::RBracket, "invalid syntax")?;
        Ok(index)
    }

    fn parse_slice_item(&mut self) -> Result<Expr> {
        let lower = if self.check(&TokenKind::Colon)? {
            None
        } else {
            let expr = self.parse_test()?;
            if !self.check(&TokenKind::Colon)? {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect(&TokenKind::Colon, "invalid syntax")?;

        let slice_end = |kind: &TokenKind| {
            matches!(kind, TokenKind::Colon | TokenKind::RBracket | TokenKind::Comma)
        };
        let upper = if slice_end(self.tokens.peek_kind()?) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.tokens.eat(&TokenKind::Colon)? {
            if matches!(
                self.tokens.peek_kind()?,
                TokenKind::RBracket | TokenKind::Comma
            ) {
                None
            } else {
                Some(Box::new(self.parse_test()?))
            }
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn reject_comprehension(&mut self) -> Result<()> {
        let token = self.tokens.peek()?.clone();
        if token.kind == TokenKind::Keyword(Keyword::For) {
            return Err(ParseError::at(&token, "comprehensions are not supported"));
        }
        Ok(())
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        let token = self.tokens.next()?;
        let expr = match token.kind {
            TokenKind::Name(name) => Expr::Name(name),
            TokenKind::Int(n) => Expr::Constant(Constant::Int(n)),
            TokenKind::Float(n) => Expr::Constant(Constant::Float(n)),
            TokenKind::Str(_) | TokenKind::FString(_) => self.parse_strings(token)?,
            TokenKind::Keyword(Keyword::True) => Expr::Constant(Constant::Bool(true)),
            TokenKind::Keyword(Keyword::False) => Expr::Constant(Constant::Bool(false)),
            TokenKind::Keyword(Keyword::None) => Expr::Constant(Constant::None),
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                self.enter(&token, TOO_MANY_PARENS)?;
                let expr = match &token.kind {
                    TokenKind::LParen => self.parse_parenthesized()?,
                    TokenKind::LBracket => self.parse_list()?,
                    _ => self.parse_dict()?,
                };
                self.leave();
                expr
            }
            TokenKind::Star => {
                return Err(ParseError::at(&token, "star expressions are not supported"));
            }
            _ => return Err(unexpected(&token)),
        };
        Ok(expr)
    }

    /// Contents after `(`: a parenthesized expression or a tuple.
    fn parse_parenthesized(&mut self) -> Result<Expr> {
        if self.tokens.eat(&TokenKind::RParen)? {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.parse_test()?;
        self.reject_comprehension()?;
        if !self.check(&TokenKind::Comma)? {
            self.expect(&TokenKind::RParen, "invalid syntax")?;
            return Ok(first);
        }
        let mut items = vec![first];
        while self.tokens.eat(&TokenKind::Comma)? {
            if self.check(&TokenKind::RParen)? {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect(&TokenKind::RParen, "invalid syntax. Perhaps you forgot a comma?")?;
        Ok(Expr::Tuple(items))
    }

    fn parse_list(&mut self) -> Result<Expr> {
        let mut items = Vec::new();
        if !self.tokens.eat(&TokenKind::RBracket)? {
            items.push(self.parse_test()?);
            self.reject_comprehension()?;
            while self.tokens.eat(&TokenKind::Comma)? {
                if self.check(&TokenKind::RBracket)? {
                    break;
                }
                items.push(self.parse_test()?);
            }
            self.expect(&TokenKind::RBracket, "invalid syntax. Perhaps you forgot a comma?")?;
        }
        Ok(Expr::List(items))
    }

    fn parse_dict(&mut self) -> Result<Expr> {
        let mut entries = Vec::new();
        if self.tokens.eat(&TokenKind::RBrace)? {
            return Ok(Expr::Dict(entries));
        }
        loop {
            let key = self.parse_test()?;
            let token = self.tokens.peek()?.clone();
            match token.kind {
                TokenKind::Colon => {
                    self.tokens.next()?;
                }
                TokenKind::Keyword(Keyword::For) => {
                    return Err(ParseError::at(&token, "comprehensions are not supported"));
                }
                _ => {
                    return Err(ParseError::at(&token, "set literals are not supported"));
                }
            }
            let value = self.parse_test()?;
            self.reject_comprehension()?;
            entries.push((key, value));
            if !self.tokens.eat(&TokenKind::Comma)? || self.check(&TokenKind::RBrace)? {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "invalid syntax. Perhaps you forgot a comma?")?;
        Ok(Expr::Dict(entries))
    }

    /// Concatenate adjacent string and f-string literals starting at `first`.
    fn parse_strings(&mut self, first: Token) -> Result<Expr> {
        let mut parts = Vec::new();
        let mut formatted = false;
        self.push_string(first, &mut parts, &mut formatted)?;
        while matches!(
            self.tokens.peek_kind()?,
            TokenKind::Str(_) | TokenKind::FString(_)
        ) {
            let token = self.tokens.next()?;
            self.push_string(token, &mut parts, &mut formatted)?;
        }

        if formatted {
            return Ok(Expr::FString(parts));
        }
        let text = parts
            .into_iter()
            .map(|part| match part {
                FStringPart::Literal(text) => text,
                FStringPart::Field { .. } => String::new(),
            })
            .collect::<String>();
        Ok(Expr::Constant(Constant::Str(text)))
    }

    fn push_string(
        &mut self,
        token: Token,
        parts: &mut Vec<FStringPart>,
        formatted: &mut bool,
    ) -> Result<()> {
        match token.kind {
            TokenKind::Str(text) => fstring::push_literal(parts, &text),
            TokenKind::FString(raw) => {
                *formatted = true;
                for part in fstring::parse_fstring(&raw, token.line, token.column, self.nesting)? {
                    match part {
                        FStringPart::Literal(text) => fstring::push_literal(parts, &text),
                        field => parts.push(field),
                    }
                }
            }
            _ => return Err(unexpected(&token)),
        }
        Ok(())
    }
}

fn is_unsupported(kind: &TokenKind) -> bool {
    match kind {
        TokenKind::Unsupported(_) => true,
        TokenKind::Keyword(kw) => matches!(
            kw,
            Keyword::Class
                | Keyword::Lambda
                | Keyword::With
                | Keyword::Yield
                | Keyword::Async
                | Keyword::Await
                | Keyword::Nonlocal
                | Keyword::Del
        ),
        _ => false,
    }
}

/// Error for a token that cannot appear where it was found.
fn unexpected(token: &Token) -> ParseError {
    let message = match &token.kind {
        TokenKind::Unsupported(op) => format!("'{}' is not supported", op),
        TokenKind::Keyword(kw) if is_unsupported(&token.kind) => {
            format!("'{}' is not supported", kw.as_str())
        }
        TokenKind::Indent => "unexpected indent".to_string(),
        TokenKind::Dedent => "unindent does not match any outer indentation level".to_string(),
        _ => "invalid syntax".to_string(),
    };
    ParseError::at(token, message)
}

/// Short description of an expression for assignment error messages.
fn describe(expr: &Expr) -> &'static str {
    match expr {
        Expr::Call { .. } => "function call",
        Expr::Constant(Constant::None) | Expr::Constant(Constant::Bool(_)) => "keyword",
        Expr::Constant(_) => "literal",
        Expr::FString(_) => "f-string expression",
        Expr::Compare { .. } => "comparison",
        Expr::IfExp { .. } => "conditional expression",
        Expr::Dict(_) => "dict literal",
        Expr::Tuple(_) => "tuple",
        Expr::List(_) => "list",
        Expr::Await(_) => "await expression",
        _ => "expression",
    }
}

/// Validate an assignment or `for` target.
fn check_assign_target(target: &Expr, start: &Token, suggest_eq: bool) -> Result<()> {
    match target {
        Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. } => Ok(()),
        Expr::Tuple(items) | Expr::List(items) => items
            .iter()
            .try_for_each(|item| check_assign_target(item, start, suggest_eq)),
        other => {
            let what = describe(other);
            let message = if suggest_eq && what != "keyword" {
                format!("cannot assign to {} here. Maybe you meant '==' instead of '='?", what)
            } else {
                format!("cannot assign to {}", what)
            };
            Err(ParseError::at(start, message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Module> {
        Parser::new(input).parse_module()
    }

    fn parse_err(input: &str) -> ParseError {
        match parse(input) {
            Ok(module) => panic!("Expected parse error, got {:?}", module),
            Err(e) => e,
        }
    }

    #[test]
    fn test_parse_empty() {
        let module = parse("").unwrap();
        assert!(module.body.is_empty());
    }

    #[test]
    fn test_parse_assignment_and_lines() {
        let module = parse("x = 1\n\ny = x + 2\n").unwrap();
        assert_eq!(module.body.len(), 2);
        assert_eq!(module.body[1].line, 3);
        match &module.body[1].kind {
            StmtKind::Assign { targets, value } => {
                assert_eq!(targets, &vec![Expr::name("y")]);
                assert!(matches!(value, Expr::BinOp { op: BinOp::Add, .. }));
            }
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_chained_assignment() {
        let module = parse("a = b = 0").unwrap();
        match &module.body[0].kind {
            StmtKind::Assign { targets, .. } => assert_eq!(targets.len(), 2),
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_precedence() {
        let module = parse("x = 1 + 2 * 3 ** 2").unwrap();
        let StmtKind::Assign { value, .. } = &module.body[0].kind else {
            panic!("Expected assignment");
        };
        match value {
            Expr::BinOp { op: BinOp::Add, right, .. } => {
                assert!(matches!(right.as_ref(), Expr::BinOp { op: BinOp::Mul, .. }));
            }
            other => panic!("Unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_elif_else() {
        let module = parse("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n").unwrap();
        let StmtKind::If { orelse, .. } = &module.body[0].kind else {
            panic!("Expected if");
        };
        assert_eq!(orelse.len(), 1);
        assert_eq!(orelse[0].line, 3);
        assert!(matches!(&orelse[0].kind, StmtKind::If { orelse, .. } if orelse.len() == 1));
    }

    #[test]
    fn test_parse_function_with_defaults() {
        let module = parse("def greet(name, greeting='Hi'):\n    return greeting + name\n").unwrap();
        let StmtKind::FunctionDef(def) = &module.body[0].kind else {
            panic!("Expected function");
        };
        assert_eq!(def.name, "greet");
        assert_eq!(def.params.len(), 2);
        assert!(def.params[1].default.is_some());
        assert!(!def.is_async);
    }

    #[test]
    fn test_parse_try_statement() {
        let source = "try:\n    x = 1\nexcept ValueError as e:\n    pass\nexcept:\n    pass\nelse:\n    pass\nfinally:\n    pass\n";
        let module = parse(source).unwrap();
        let StmtKind::Try { handlers, orelse, finalbody, .. } = &module.body[0].kind else {
            panic!("Expected try");
        };
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0].name.as_deref(), Some("e"));
        assert!(handlers[1].typ.is_none());
        assert_eq!(orelse.len(), 1);
        assert_eq!(finalbody.len(), 1);
    }

    #[test]
    fn test_parse_call_with_keywords() {
        let module = parse("print('a', 'b', sep='-', end='')").unwrap();
        let StmtKind::Expr(Expr::Call { args, keywords, .. }) = &module.body[0].kind else {
            panic!("Expected call");
        };
        assert_eq!(args.len(), 2);
        assert_eq!(keywords.len(), 2);
    }

    #[test]
    fn test_parse_slices() {
        let module = parse("a[1:]\na[::2]\na[i]").unwrap();
        assert!(matches!(
            &module.body[0].kind,
            StmtKind::Expr(Expr::Subscript { index, .. }) if matches!(index.as_ref(), Expr::Slice { upper: None, .. })
        ));
        assert!(matches!(
            &module.body[2].kind,
            StmtKind::Expr(Expr::Subscript { index, .. }) if matches!(index.as_ref(), Expr::Name(_))
        ));
    }

    #[test]
    fn test_parse_collections() {
        let module = parse("x = [1, 2,]\ny = (1,)\nz = {'a': 1, 'b': 2}\nw = ()").unwrap();
        let values: Vec<&Expr> = module
            .body
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Assign { value, .. } => value,
                other => panic!("Expected assignment, got {:?}", other),
            })
            .collect();
        assert!(matches!(values[0], Expr::List(items) if items.len() == 2));
        assert!(matches!(values[1], Expr::Tuple(items) if items.len() == 1));
        assert!(matches!(values[2], Expr::Dict(entries) if entries.len() == 2));
        assert!(matches!(values[3], Expr::Tuple(items) if items.is_empty()));
    }

    #[test]
    fn test_parse_chained_comparison() {
        let module = parse("0 <= x < 10 and y not in z and a is not None").unwrap();
        let StmtKind::Expr(Expr::BoolOp { values, .. }) = &module.body[0].kind else {
            panic!("Expected bool op");
        };
        assert!(matches!(&values[0], Expr::Compare { ops, .. } if ops == &vec![CmpOp::LtE, CmpOp::Lt]));
        assert!(matches!(&values[1], Expr::Compare { ops, .. } if ops == &vec![CmpOp::NotIn]));
        assert!(matches!(&values[2], Expr::Compare { ops, .. } if ops == &vec![CmpOp::IsNot]));
    }

    #[test]
    fn test_parse_adjacent_strings() {
        let module = parse("x = 'a' 'b'").unwrap();
        let StmtKind::Assign { value, .. } = &module.body[0].kind else {
            panic!("Expected assignment");
        };
        assert_eq!(value, &Expr::str("ab"));
    }

    #[test]
    fn test_parse_same_line_body() {
        let module = parse("while True: break").unwrap();
        assert!(matches!(&module.body[0].kind, StmtKind::While { body, .. } if body.len() == 1));
    }

    #[test]
    fn test_error_missing_colon() {
        let err = parse_err("if x\n    pass\n");
        assert_eq!(err.message(), "expected ':'");
        assert_eq!(err.line(), 1);
    }

    #[test]
    fn test_error_missing_block() {
        let err = parse_err("def f():\nreturn 1\n");
        assert_eq!(err.message(), "expected an indented block after function definition on line 1");
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn test_error_unexpected_indent() {
        let err = parse_err("x = 1\n    y = 2\n");
        assert_eq!(err.message(), "unexpected indent");
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn test_error_unsupported_constructs() {
        assert_eq!(parse_err("class A:\n    pass\n").message(), "'class' is not supported");
        assert_eq!(parse_err("f = lambda x: x\n").message(), "'lambda' is not supported");
        assert_eq!(parse_err("await g()\n").message(), "'await' is not supported");
        assert_eq!(parse_err("x = [i for i in y]\n").message(), "comprehensions are not supported");
        assert_eq!(parse_err("x = a & b\n").message(), "'&' is not supported");
    }

    #[test]
    fn test_error_bad_assignment_target() {
        let err = parse_err("f() = 1\n");
        assert!(err.message().starts_with("cannot assign to function call"), "{}", err);
    }

    #[test]
    fn test_error_flow_outside_context() {
        assert_eq!(parse_err("break\n").message(), "'break' outside loop");
        assert_eq!(parse_err("return 1\n").message(), "'return' outside function");
        assert_eq!(
            parse_err("while x:\n    def f():\n        break\n").message(),
            "'break' outside loop"
        );
    }

    #[test]
    fn test_error_bad_parameters() {
        let err = parse_err("def f(a, b, a):\n    pass\n");
        assert_eq!(err.message(), "duplicate argument 'a' in function definition");
        assert_eq!(err.column(), 13);
        assert_eq!(
            parse_err("def f(a=1, b):\n    pass\n").message(),
            "parameter without a default follows parameter with a default"
        );
    }

    /// Deep scripts are parsed on a thread with room for every nesting level.
    fn parse_on_large_stack(input: String) -> Result<usize> {
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(move || parse(&input).map(|module| module.body.len()))
            .unwrap()
            .join()
            .unwrap()
    }

    fn nested_parens(depth: usize) -> String {
        format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth))
    }

    #[test]
    fn test_nesting_within_limit() {
        assert_eq!(parse_on_large_stack(nested_parens(150)), Ok(1));
        assert_eq!(parse_on_large_stack(format!("x = {}1\n", "-".repeat(150))), Ok(1));
        assert_eq!(parse_on_large_stack(format!("x = {}1\n", "1 + ".repeat(150))), Ok(1));
    }

    #[test]
    fn test_error_too_many_nested_parentheses() {
        let err = parse_on_large_stack(nested_parens(100_000)).unwrap_err();
        assert_eq!(err.message(), "too many nested parentheses");
        assert_eq!(err.line(), 1);

        let call = format!("print({}1{})\n", "[".repeat(300), "]".repeat(300));
        let err = parse_on_large_stack(call).unwrap_err();
        assert_eq!(err.message(), "too many nested parentheses");
    }

    #[test]
    fn test_error_expression_too_complex() {
        let cases = [
            format!("x = {}1\n", "1 + ".repeat(300_000)),
            format!("x = {}1\n", "-".repeat(300_000)),
            format!("x = {}1\n", "not ".repeat(1000)),
            format!("x = {}1\n", "2 ** ".repeat(1000)),
            format!("x = a{}\n", ".b".repeat(1000)),
            format!("x = f{}\n", "()".repeat(1000)),
            format!("x = {}0\n", "1 if c else ".repeat(1000)),
        ];
        for case in cases {
            let err = parse_on_large_stack(case).unwrap_err();
            assert_eq!(err.message(), "expression too complex");
        }
    }

    #[test]
    fn test_error_chain_of_nested_chains() {
        // Each parenthesized chain stays within the limit on its own.
        let mut expr = "1".to_string();
        for _ in 0..10 {
            expr = format!("({}{})", expr, " + 1".repeat(50));
        }
        let err = parse_on_large_stack(format!("x = {}\n", expr)).unwrap_err();
        assert_eq!(err.message(), "expression too complex");
    }

    #[test]
    fn test_error_deep_blocks() {
        let mut source = String::new();
        for level in 0..250 {
            source.push_str(&" ".repeat(level));
            source.push_str("if x:\n");
        }
        source.push_str(&" ".repeat(250));
        source.push_str("pass\n");
        let err = parse_on_large_stack(source).unwrap_err();
        assert_eq!(err.message(), "too many levels of indentation");

        let elifs = format!("if x:\n    pass\n{}", "elif x:\n    pass\n".repeat(1000));
        let err = parse_on_large_stack(elifs).unwrap_err();
        assert_eq!(err.message(), "too many 'elif' clauses");
    }

    #[test]
    fn test_error_keyword_before_positional() {
        let err = parse_err("f(a=1, 2)\n");
        assert_eq!(err.message(), "positional argument follows keyword argument");
    }
}
