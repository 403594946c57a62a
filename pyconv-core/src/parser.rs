//! Recursive-descent parser producing [`ast::Module`].
//!
//! Binary operators use precedence climbing, so one level of source nesting
//! costs a handful of native frames. Every nested block and nested
//! expression goes through [`Parser::nested`], which refuses input deeper
//! than `ConvertOptions::max_depth` with `InternalLimitExceeded`.

use crate::ast::{
    Alias, BinOp, CmpOp, Comprehension, Constant, ExceptHandler, Expr, ExprKind, FStringPart,
    FunctionDef, Ident, Keyword, Module, Param, Parameters, Stmt, StmtKind, UnaryOp, WithItem,
};
use crate::error::CoreError;
use crate::lexer::{self, Token, TokenKind, lex};
use crate::options::ConvertOptions;
use crate::span::Span;
use crate::stack::ensure_sufficient_stack;

const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_COMPARE: u8 = 4;
const PREC_BITOR: u8 = 5;
const PREC_BITXOR: u8 = 6;
const PREC_BITAND: u8 = 7;
const PREC_SHIFT: u8 = 8;
const PREC_ARITH: u8 = 9;
const PREC_TERM: u8 = 10;

type PResult<T> = Result<T, CoreError>;

pub fn parse(source: &str, options: &ConvertOptions) -> Result<Module, CoreError> {
    let tokens = lex(source)?;
    let mut parser = Parser {
        source,
        tokens,
        position: 0,
        last_end: 0,
        depth: 0,
        max_depth: options.max_depth,
    };
    parser.parse_module()
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    position: usize,
    /// End offset of the last consumed non-layout token.
    last_end: u32,
    depth: usize,
    max_depth: usize,
}

impl<'src> Parser<'src> {
    fn parse_module(&mut self) -> PResult<Module> {
        let mut body = Vec::new();
        while !self.at(TokenKind::Eof) {
            if self.eat(TokenKind::Newline).is_some() {
                continue;
            }
            self.parse_statement(&mut body)?;
        }
        Ok(Module {
            body,
            span: Span::from_offsets(0, self.source.len()),
        })
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn parse_statement(&mut self, out: &mut Vec<Stmt>) -> PResult<()> {
        let start = self.peek_token().span.start;
        match self.peek() {
            TokenKind::If => out.push(self.parse_if()?),
            TokenKind::While => out.push(self.parse_while()?),
            TokenKind::For => out.push(self.parse_for(start, false)?),
            TokenKind::Try => out.push(self.parse_try()?),
            TokenKind::With => out.push(self.parse_with(start, false)?),
            TokenKind::Def => out.push(self.parse_funcdef(start, Vec::new(), false)?),
            TokenKind::Class => out.push(self.parse_classdef(start, Vec::new())?),
            TokenKind::At => out.push(self.parse_decorated()?),
            TokenKind::Async => out.push(self.parse_async(start, Vec::new())?),
            TokenKind::Indent => return Err(self.error_here("unexpected indent")),
            _ => self.parse_simple_statements(out)?,
        }
        Ok(())
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::Colon, "':'")?;
        self.nested(|p| {
            let mut body = Vec::new();
            if p.eat(TokenKind::Newline).is_some() {
                p.expect(TokenKind::Indent, "an indented block")?;
                while !p.at(TokenKind::Dedent) && !p.at(TokenKind::Eof) {
                    p.parse_statement(&mut body)?;
                }
                p.eat(TokenKind::Dedent);
            } else {
                p.parse_simple_statements(&mut body)?;
            }
            Ok(body)
        })
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        // `if` or `elif`
        let start = self.advance().span.start;
        let test = self.parse_named()?;
        let body = self.parse_block()?;
        let orelse = if self.at(TokenKind::Elif) {
            vec![self.nested(|p| p.parse_if())?]
        } else if self.eat(TokenKind::Else).is_some() {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(self.stmt(StmtKind::If { test, body, orelse }, start))
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let start = self.advance().span.start;
        let test = self.parse_named()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(self.stmt(StmtKind::While { test, body, orelse }, start))
    }

    fn parse_for(&mut self, start: u32, is_async: bool) -> PResult<Stmt> {
        self.expect(TokenKind::For, "'for'")?;
        let target = self.parse_target_list()?;
        self.expect(TokenKind::In, "'in'")?;
        let iter = self.parse_testlist_star()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(self.stmt(
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
                is_async,
            },
            start,
        ))
    }

    fn parse_else_block(&mut self) -> PResult<Vec<Stmt>> {
        if self.eat(TokenKind::Else).is_some() {
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        let start = self.advance().span.start;
        let body = self.parse_block()?;

        let mut handlers = Vec::new();
        while self.at(TokenKind::Except) {
            let handler_start = self.advance().span.start;
            self.eat(TokenKind::Star);
            let (ty, name) = if self.at(TokenKind::Colon) {
                (None, None)
            } else {
                let ty = self.parse_test()?;
                let name = if self.eat(TokenKind::As).is_some() {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                (Some(ty), name)
            };
            let body = self.parse_block()?;
            handlers.push(ExceptHandler {
                ty,
                name,
                body,
                span: self.span_from(handler_start),
            });
        }

        let orelse = self.parse_else_block()?;
        let finalbody = if self.eat(TokenKind::Finally).is_some() {
            self.parse_block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error_here("expected 'except' or 'finally' block"));
        }
        Ok(self.stmt(
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            start,
        ))
    }

    fn parse_with(&mut self, start: u32, is_async: bool) -> PResult<Stmt> {
        self.expect(TokenKind::With, "'with'")?;
        let mut items = Vec::new();
        loop {
            let context = self.parse_test()?;
            let target = if self.eat(TokenKind::As).is_some() {
                Some(self.parse_target_item()?)
            } else {
                None
            };
            items.push(WithItem { context, target });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        let body = self.parse_block()?;
        Ok(self.stmt(
            StmtKind::With {
                items,
                body,
                is_async,
            },
            start,
        ))
    }

    fn parse_decorated(&mut self) -> PResult<Stmt> {
        let start = self.peek_token().span.start;
        let mut decorators = Vec::new();
        while self.eat(TokenKind::At).is_some() {
            decorators.push(self.parse_named()?);
            self.expect(TokenKind::Newline, "newline after decorator")?;
        }
        match self.peek() {
            TokenKind::Def => self.parse_funcdef(start, decorators, false),
            TokenKind::Class => self.parse_classdef(start, decorators),
            TokenKind::Async => self.parse_async(start, decorators),
            _ => Err(self.error_here("expected function or class definition after decorator")),
        }
    }

    fn parse_async(&mut self, start: u32, decorators: Vec<Expr>) -> PResult<Stmt> {
        self.expect(TokenKind::Async, "'async'")?;
        match self.peek() {
            TokenKind::Def => self.parse_funcdef(start, decorators, true),
            TokenKind::For if decorators.is_empty() => self.parse_for(start, true),
            TokenKind::With if decorators.is_empty() => self.parse_with(start, true),
            _ => Err(self.error_here("expected 'def', 'for' or 'with' after 'async'")),
        }
    }

    fn parse_funcdef(
        &mut self,
        start: u32,
        decorators: Vec<Expr>,
        is_async: bool,
    ) -> PResult<Stmt> {
        self.expect(TokenKind::Def, "'def'")?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LParen, "'('")?;
        let params = self.parse_parameters(TokenKind::RParen, true)?;
        self.expect(TokenKind::RParen, "')'")?;
        let returns = if self.eat(TokenKind::Arrow).is_some() {
            Some(self.parse_test()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(self.stmt(
            StmtKind::FunctionDef(FunctionDef {
                name,
                params,
                returns,
                body,
                decorators,
                is_async,
            }),
            start,
        ))
    }

    fn parse_classdef(&mut self, start: u32, decorators: Vec<Expr>) -> PResult<Stmt> {
        self.expect(TokenKind::Class, "'class'")?;
        let name = self.expect_ident()?;
        let mut bases = Vec::new();
        if self.eat(TokenKind::LParen).is_some() {
            let (args, keywords) = self.parse_call_arguments()?;
            self.expect(TokenKind::RParen, "')'")?;
            bases.extend(args);
            bases.extend(keywords.into_iter().map(|keyword| keyword.value));
        }
        let body = self.parse_block()?;
        Ok(self.stmt(
            StmtKind::ClassDef {
                name,
                bases,
                body,
                decorators,
            },
            start,
        ))
    }

    fn parse_parameters(&mut self, closing: TokenKind, annotated: bool) -> PResult<Parameters> {
        let mut params = Parameters::default();
        let mut keyword_only = false;
        while !self.at(closing) {
            if self.eat(TokenKind::Slash).is_some() {
                params.positional_only.append(&mut params.args);
            } else if self.eat(TokenKind::Star).is_some() {
                keyword_only = true;
                if self.at(TokenKind::Name) {
                    params.vararg = Some(self.parse_param(annotated, false)?);
                }
            } else if self.eat(TokenKind::DoubleStar).is_some() {
                params.kwarg = Some(self.parse_param(annotated, false)?);
            } else {
                let param = self.parse_param(annotated, true)?;
                if keyword_only {
                    params.kwonly.push(param);
                } else {
                    params.args.push(param);
                }
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        Ok(params)
    }

    fn parse_param(&mut self, annotated: bool, allow_default: bool) -> PResult<Param> {
        let name = self.expect_ident()?;
        let start = name.span.start;
        let annotation = if annotated && self.eat(TokenKind::Colon).is_some() {
            Some(self.parse_test()?)
        } else {
            None
        };
        let default = if allow_default && self.eat(TokenKind::Equal).is_some() {
            Some(self.parse_test()?)
        } else {
            None
        };
        Ok(Param {
            name,
            annotation,
            default,
            span: self.span_from(start),
        })
    }

    fn parse_simple_statements(&mut self, out: &mut Vec<Stmt>) -> PResult<()> {
        loop {
            out.push(self.parse_small_statement()?);
            if self.eat(TokenKind::Semi).is_none() {
                break;
            }
            if self.at(TokenKind::Newline) || self.at(TokenKind::Eof) {
                break;
            }
        }
        if !self.at(TokenKind::Eof) {
            self.expect(TokenKind::Newline, "end of statement")?;
        }
        Ok(())
    }

    fn parse_small_statement(&mut self) -> PResult<Stmt> {
        let start = self.peek_token().span.start;
        let kind = match self.peek() {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_testlist_star()?)
                };
                StmtKind::Return(value)
            }
            TokenKind::Import => {
                self.advance();
                StmtKind::Import(self.parse_aliases(true)?)
            }
            TokenKind::From => self.parse_import_from()?,
            TokenKind::Raise => {
                self.advance();
                let exc = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_test()?)
                };
                let cause = if exc.is_some() && self.eat(TokenKind::From).is_some() {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                StmtKind::Raise { exc, cause }
            }
            TokenKind::Global => {
                self.advance();
                StmtKind::Global(self.parse_name_list()?)
            }
            TokenKind::Nonlocal => {
                self.advance();
                StmtKind::Nonlocal(self.parse_name_list()?)
            }
            TokenKind::Del => {
                self.advance();
                let targets = self.parse_target_list()?;
                match targets.kind {
                    ExprKind::Tuple(items) => StmtKind::Delete(items),
                    _ => StmtKind::Delete(vec![targets]),
                }
            }
            TokenKind::Assert => {
                self.advance();
                let test = self.parse_test()?;
                let msg = if self.eat(TokenKind::Comma).is_some() {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            _ => self.parse_expression_statement()?,
        };
        Ok(self.stmt(kind, start))
    }

    fn parse_expression_statement(&mut self) -> PResult<StmtKind> {
        let first = self.parse_yield_or_testlist()?;
        match self.peek() {
            TokenKind::AugAssign(op) => {
                self.advance();
                let value = self.parse_yield_or_testlist()?;
                Ok(StmtKind::AugAssign {
                    target: first,
                    op,
                    value,
                })
            }
            TokenKind::Colon => {
                self.advance();
                let annotation = self.parse_test()?;
                let value = if self.eat(TokenKind::Equal).is_some() {
                    Some(self.parse_yield_or_testlist()?)
                } else {
                    None
                };
                Ok(StmtKind::AnnAssign {
                    target: first,
                    annotation,
                    value,
                })
            }
            TokenKind::Equal => {
                let mut chain = vec![first];
                while self.eat(TokenKind::Equal).is_some() {
                    chain.push(self.parse_yield_or_testlist()?);
                }
                let value = chain
                    .pop()
                    .ok_or_else(|| self.error_here("expected a value to assign"))?;
                Ok(StmtKind::Assign {
                    targets: chain,
                    value,
                })
            }
            _ => Ok(StmtKind::Expr(first)),
        }
    }

    fn parse_import_from(&mut self) -> PResult<StmtKind> {
        self.expect(TokenKind::From, "'from'")?;
        let mut level = 0;
        loop {
            match self.peek() {
                TokenKind::Dot => level += 1,
                TokenKind::Ellipsis => level += 3,
                _ => break,
            }
            self.advance();
        }
        let module = if self.at(TokenKind::Name) {
            Some(self.parse_dotted_name()?)
        } else {
            None
        };
        if level == 0 && module.is_none() {
            return Err(self.error_here("expected module name"));
        }
        self.expect(TokenKind::Import, "'import'")?;
        let names = if self.eat(TokenKind::Star).is_some() {
            vec![Alias {
                name: "*".to_string(),
                asname: None,
            }]
        } else if self.eat(TokenKind::LParen).is_some() {
            let names = self.parse_aliases(false)?;
            self.expect(TokenKind::RParen, "')'")?;
            names
        } else {
            self.parse_aliases(false)?
        };
        Ok(StmtKind::ImportFrom {
            module,
            names,
            level,
        })
    }

    fn parse_aliases(&mut self, dotted: bool) -> PResult<Vec<Alias>> {
        let mut aliases = Vec::new();
        loop {
            let name = if dotted {
                self.parse_dotted_name()?
            } else {
                self.expect_ident()?.name
            };
            let asname = if self.eat(TokenKind::As).is_some() {
                Some(self.expect_ident()?.name)
            } else {
                None
            };
            aliases.push(Alias { name, asname });
            if self.eat(TokenKind::Comma).is_none() || !self.at(TokenKind::Name) {
                break;
            }
        }
        Ok(aliases)
    }

    fn parse_dotted_name(&mut self) -> PResult<String> {
        let mut name = self.expect_ident()?.name;
        while self.eat(TokenKind::Dot).is_some() {
            name.push('.');
            name.push_str(&self.expect_ident()?.name);
        }
        Ok(name)
    }

    fn parse_name_list(&mut self) -> PResult<Vec<Ident>> {
        let mut names = vec![self.expect_ident()?];
        while self.eat(TokenKind::Comma).is_some() {
            names.push(self.expect_ident()?);
        }
        Ok(names)
    }

    // -----------------------------------------------------------------
    // Expression lists and targets
    // -----------------------------------------------------------------

    fn parse_yield_or_testlist(&mut self) -> PResult<Expr> {
        if self.at(TokenKind::Yield) {
            self.parse_yield()
        } else {
            self.parse_testlist_star()
        }
    }

    fn parse_yield(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::Yield, "'yield'")?.span.start;
        if self.eat(TokenKind::From).is_some() {
            let value = self.parse_test()?;
            return Ok(self.expr(ExprKind::YieldFrom(Box::new(value)), start));
        }
        let value = if starts_expression(self.peek()) {
            Some(Box::new(self.parse_testlist_star()?))
        } else {
            None
        };
        Ok(self.expr(ExprKind::Yield(value), start))
    }

    /// Comma separated expressions; more than one becomes a tuple.
    fn parse_testlist_star(&mut self) -> PResult<Expr> {
        let start = self.peek_token().span.start;
        let first = self.parse_star_or_named()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            if !starts_expression(self.peek()) {
                break;
            }
            items.push(self.parse_star_or_named()?);
        }
        Ok(self.expr(ExprKind::Tuple(items), start))
    }

    /// Assignment-style targets for `for`, `del` and comprehensions. Parsed
    /// above the comparison level so `in` is left for the caller.
    fn parse_target_list(&mut self) -> PResult<Expr> {
        let start = self.peek_token().span.start;
        let first = self.parse_target_item()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            if !starts_expression(self.peek()) {
                break;
            }
            items.push(self.parse_target_item()?);
        }
        Ok(self.expr(ExprKind::Tuple(items), start))
    }

    fn parse_target_item(&mut self) -> PResult<Expr> {
        if self.at(TokenKind::Star) {
            let start = self.advance().span.start;
            let value = self.parse_binary(PREC_BITOR)?;
            return Ok(self.expr(ExprKind::Starred(Box::new(value)), start));
        }
        self.parse_binary(PREC_BITOR)
    }

    fn parse_star_or_named(&mut self) -> PResult<Expr> {
        if self.at(TokenKind::Star) {
            let start = self.advance().span.start;
            let value = self.parse_binary(PREC_BITOR)?;
            return Ok(self.expr(ExprKind::Starred(Box::new(value)), start));
        }
        self.parse_named()
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn parse_named(&mut self) -> PResult<Expr> {
        let start = self.peek_token().span.start;
        let expr = self.parse_test()?;
        if self.eat(TokenKind::ColonEqual).is_some() {
            let value = self.parse_test()?;
            return Ok(self.expr(
                ExprKind::NamedExpr {
                    target: Box::new(expr),
                    value: Box::new(value),
                },
                start,
            ));
        }
        Ok(expr)
    }

    fn parse_test(&mut self) -> PResult<Expr> {
        self.nested(|p| {
            if p.at(TokenKind::Lambda) {
                return p.parse_lambda();
            }
            let start = p.peek_token().span.start;
            let body = p.parse_binary(PREC_OR)?;
            if p.eat(TokenKind::If).is_none() {
                return Ok(body);
            }
            let test = p.parse_binary(PREC_OR)?;
            p.expect(TokenKind::Else, "'else' in conditional expression")?;
            let orelse = p.parse_test()?;
            Ok(p.expr(
                ExprKind::IfExp {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                start,
            ))
        })
    }

    fn parse_lambda(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::Lambda, "'lambda'")?.span.start;
        let params = self.parse_parameters(TokenKind::Colon, false)?;
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_test()?;
        Ok(self.expr(
            ExprKind::Lambda {
                params: Box::new(params),
                body: Box::new(body),
            },
            start,
        ))
    }

    /// Each operator folded into a left-deep chain counts as one level of
    /// nesting, the same as a parenthesised operand would.
    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let entered = self.depth;
        let result = self.parse_binary_chain(min_prec);
        self.depth = entered;
        result
    }

    fn parse_binary_chain(&mut self, min_prec: u8) -> PResult<Expr> {
        let start = self.peek_token().span.start;
        let mut left = if self.at(TokenKind::Not) && min_prec <= PREC_NOT {
            self.advance();
            let operand = self.nested(|p| p.parse_binary(PREC_NOT))?;
            self.expr(
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                start,
            )
        } else {
            self.parse_unary()?
        };

        while let Some(prec) = self.binary_precedence() {
            if prec < min_prec {
                break;
            }
            self.deepen()?;
            if prec == PREC_COMPARE {
                let mut ops = Vec::new();
                let mut comparators = Vec::new();
                while let Some(op) = self.eat_comparison() {
                    ops.push(op);
                    comparators.push(self.parse_binary(PREC_COMPARE + 1)?);
                }
                left = self.expr(
                    ExprKind::Compare {
                        left: Box::new(left),
                        ops,
                        comparators,
                    },
                    start,
                );
                continue;
            }
            let op = self.eat_binary_operator()?;
            let right = self.parse_binary(prec + 1)?;
            left = self.expr(
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                start,
            );
        }
        Ok(left)
    }

    fn binary_precedence(&self) -> Option<u8> {
        let prec = match self.peek() {
            TokenKind::Or => PREC_OR,
            TokenKind::And => PREC_AND,
            TokenKind::Less
            | TokenKind::Greater
            | TokenKind::EqEqual
            | TokenKind::NotEqual
            | TokenKind::LessEqual
            | TokenKind::GreaterEqual
            | TokenKind::In
            | TokenKind::Is => PREC_COMPARE,
            TokenKind::Not if self.peek_nth(1).kind == TokenKind::In => PREC_COMPARE,
            TokenKind::VBar => PREC_BITOR,
            TokenKind::Circumflex => PREC_BITXOR,
            TokenKind::Amper => PREC_BITAND,
            TokenKind::LeftShift | TokenKind::RightShift => PREC_SHIFT,
            TokenKind::Plus | TokenKind::Minus => PREC_ARITH,
            TokenKind::Star
            | TokenKind::Slash
            | TokenKind::DoubleSlash
            | TokenKind::Percent
            | TokenKind::At => PREC_TERM,
            _ => return None,
        };
        Some(prec)
    }

    fn eat_binary_operator(&mut self) -> PResult<BinOp> {
        let op = match self.peek() {
            TokenKind::Or => BinOp::Or,
            TokenKind::And => BinOp::And,
            TokenKind::VBar => BinOp::BitOr,
            TokenKind::Circumflex => BinOp::BitXor,
            TokenKind::Amper => BinOp::BitAnd,
            TokenKind::LeftShift => BinOp::LShift,
            TokenKind::RightShift => BinOp::RShift,
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::DoubleSlash => BinOp::FloorDiv,
            TokenKind::Percent => BinOp::Mod,
            TokenKind::At => BinOp::MatMul,
            _ => return Err(self.error_here("expected a binary operator")),
        };
        self.advance();
        Ok(op)
    }

    fn eat_comparison(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            TokenKind::Less => CmpOp::Lt,
            TokenKind::Greater => CmpOp::Gt,
            TokenKind::EqEqual => CmpOp::Eq,
            TokenKind::NotEqual => CmpOp::NotEq,
            TokenKind::LessEqual => CmpOp::LtE,
            TokenKind::GreaterEqual => CmpOp::GtE,
            TokenKind::In => CmpOp::In,
            TokenKind::Is => {
                self.advance();
                if self.eat(TokenKind::Not).is_some() {
                    return Some(CmpOp::IsNot);
                }
                return Some(CmpOp::Is);
            }
            TokenKind::Not if self.peek_nth(1).kind == TokenKind::In => {
                self.advance();
                self.advance();
                return Some(CmpOp::NotIn);
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            TokenKind::Tilde => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        let start = self.advance().span.start;
        if op == UnaryOp::Neg && self.at_min_int_magnitude() {
            self.advance();
            return Ok(self.expr(ExprKind::Constant(Constant::Int(i64::MIN)), start));
        }
        let operand = self.nested(|p| p.parse_unary())?;
        Ok(self.expr(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            start,
        ))
    }

    /// `-9223372036854775808` only fits once the sign is applied, so it is
    /// folded here unless the literal continues into a power or postfix.
    fn at_min_int_magnitude(&self) -> bool {
        let token = self.peek_token();
        token.kind == TokenKind::Int
            && lexer::parse_magnitude(self.text(token)) == Some(1 << 63)
            && !matches!(
                self.peek_nth(1).kind,
                TokenKind::DoubleStar | TokenKind::LParen | TokenKind::LBracket | TokenKind::Dot
            )
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let start = self.peek_token().span.start;
        let base = if self.at(TokenKind::Await) {
            self.advance();
            let operand = self.nested(|p| p.parse_primary())?;
            self.expr(ExprKind::Await(Box::new(operand)), start)
        } else {
            self.parse_primary()?
        };
        if self.eat(TokenKind::DoubleStar).is_none() {
            return Ok(base);
        }
        let exponent = self.nested(|p| p.parse_unary())?;
        Ok(self.expr(
            ExprKind::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            },
            start,
        ))
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let entered = self.depth;
        let result = self.parse_postfix_chain();
        self.depth = entered;
        result
    }

    fn parse_postfix_chain(&mut self) -> PResult<Expr> {
        let start = self.peek_token().span.start;
        let mut expr = self.parse_atom()?;
        loop {
            if matches!(
                self.peek(),
                TokenKind::LParen | TokenKind::LBracket | TokenKind::Dot
            ) {
                self.deepen()?;
            }
            match self.peek() {
                TokenKind::LParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_arguments()?;
                    self.expect(TokenKind::RParen, "')'")?;
                    expr = self.expr(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        start,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_subscript_list()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = self.expr(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        start,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_ident()?;
                    expr = self.expr(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        start,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_arguments(&mut self) -> PResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.at(TokenKind::RParen) {
            let start = self.peek_token().span.start;
            if self.eat(TokenKind::Star).is_some() {
                let value = self.parse_test()?;
                args.push(self.expr(ExprKind::Starred(Box::new(value)), start));
            } else if self.eat(TokenKind::DoubleStar).is_some() {
                let value = self.parse_test()?;
                keywords.push(Keyword {
                    arg: None,
                    value,
                    span: self.span_from(start),
                });
            } else if self.at(TokenKind::Name) && self.peek_nth(1).kind == TokenKind::Equal {
                let arg = self.expect_ident()?;
                self.advance();
                let value = self.parse_test()?;
                keywords.push(Keyword {
                    arg: Some(arg),
                    value,
                    span: self.span_from(start),
                });
            } else {
                let value = self.parse_named()?;
                if self.at_comprehension() {
                    let generators = self.parse_comprehension_clauses()?;
                    args.push(self.expr(
                        ExprKind::GeneratorExp {
                            elt: Box::new(value),
                            generators,
                        },
                        start,
                    ));
                } else {
                    args.push(value);
                }
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn parse_subscript_list(&mut self) -> PResult<Expr> {
        let start = self.peek_token().span.start;
        let first = self.parse_slice_item()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            if self.at(TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_slice_item()?);
        }
        Ok(self.expr(ExprKind::Tuple(items), start))
    }

    fn parse_slice_item(&mut self) -> PResult<Expr> {
        let start = self.peek_token().span.start;
        let lower = if self.at(TokenKind::Colon) {
            None
        } else {
            let expr = self.parse_named()?;
            if !self.at(TokenKind::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect(TokenKind::Colon, "':'")?;
        let slice_end = |kind: TokenKind| {
            matches!(kind, TokenKind::Colon | TokenKind::Comma | TokenKind::RBracket)
        };
        let upper = if slice_end(self.peek()) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.eat(TokenKind::Colon).is_some() && !slice_end(self.peek()) {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        Ok(self.expr(ExprKind::Slice { lower, upper, step }, start))
    }

    fn parse_atom(&mut self) -> PResult<Expr> {
        let token = self.peek_token();
        let start = token.span.start;
        let kind = match token.kind {
            TokenKind::Name => {
                self.advance();
                ExprKind::Name(self.text(token).to_string())
            }
            TokenKind::Int => {
                self.advance();
                let text = self.text(token);
                match lexer::parse_int(text) {
                    Some(value) => ExprKind::Constant(Constant::Int(value)),
                    None => ExprKind::Constant(Constant::BigInt(text.to_string())),
                }
            }
            TokenKind::Float => {
                self.advance();
                let value = lexer::parse_float(self.text(token))
                    .ok_or_else(|| CoreError::syntax("invalid float literal", token.span))?;
                ExprKind::Constant(Constant::Float(value))
            }
            TokenKind::Imaginary => {
                self.advance();
                let value = lexer::parse_float(self.text(token))
                    .ok_or_else(|| CoreError::syntax("invalid imaginary literal", token.span))?;
                ExprKind::Constant(Constant::Complex(value))
            }
            TokenKind::String | TokenKind::Bytes | TokenKind::FString => {
                return self.parse_strings();
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Constant(Constant::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Constant(Constant::Bool(false))
            }
            TokenKind::None => {
                self.advance();
                ExprKind::Constant(Constant::None)
            }
            TokenKind::Ellipsis => {
                self.advance();
                ExprKind::Constant(Constant::Ellipsis)
            }
            TokenKind::LParen => return self.parse_paren(),
            TokenKind::LBracket => return self.parse_list_display(),
            TokenKind::LBrace => return self.parse_brace_display(),
            _ => return Err(self.error_here("invalid syntax")),
        };
        Ok(self.expr(kind, start))
    }

    /// Adjacent string literals concatenate.
    fn parse_strings(&mut self) -> PResult<Expr> {
        let start = self.peek_token().span.start;
        let mut text = String::new();
        let mut bytes = Vec::new();
        let mut parts = Vec::new();
        let (mut saw_str, mut saw_bytes, mut saw_fstring) = (false, false, false);
        while matches!(
            self.peek(),
            TokenKind::String | TokenKind::Bytes | TokenKind::FString
        ) {
            let token = self.advance();
            let raw = self.text(token);
            match token.kind {
                TokenKind::Bytes => {
                    saw_bytes = true;
                    bytes.extend(lexer::decode_string(raw).bytes());
                }
                TokenKind::FString => {
                    saw_fstring = true;
                    self.parse_fstring(token, &mut parts)?;
                }
                _ => {
                    saw_str = true;
                    let decoded = lexer::decode_string(raw);
                    push_literal(&mut parts, &decoded);
                    text.push_str(&decoded);
                }
            }
        }
        let span = self.span_from(start);
        if saw_bytes && (saw_str || saw_fstring) {
            return Err(CoreError::syntax("cannot mix bytes and nonbytes literals", span));
        }
        let kind = if saw_fstring {
            ExprKind::FString(parts)
        } else if saw_bytes {
            ExprKind::Constant(Constant::Bytes(bytes))
        } else {
            ExprKind::Constant(Constant::Str(text))
        };
        Ok(Expr { kind, span })
    }

    /// Splits one f-string token into literal text and replacement fields.
    /// Field expressions are lexed and parsed on their own, with spans
    /// pointing back into the original source.
    fn parse_fstring(&mut self, token: Token, parts: &mut Vec<FStringPart>) -> PResult<()> {
        let raw = self.text(token);
        let (prefix, inner, offset) = lexer::split_string(raw);
        let verbatim = prefix.contains('r');
        let base = token.span.start as usize + offset;
        let at = |index: usize| Span::from_offsets(base + index, base + index + 1);

        let mut literal = String::new();
        let mut index = 0;
        while let Some(ch) = inner[index..].chars().next() {
            let next = inner[index + ch.len_utf8()..].chars().next();
            match (ch, next) {
                ('{', Some('{')) | ('}', Some('}')) => {
                    literal.push(ch);
                    index += 2;
                }
                ('}', _) => {
                    return Err(CoreError::syntax(
                        "single '}' is not allowed in an f-string",
                        at(index),
                    ));
                }
                ('{', _) => {
                    let decoded = if verbatim {
                        std::mem::take(&mut literal)
                    } else {
                        lexer::decode_escapes(&std::mem::take(&mut literal))
                    };
                    push_literal(parts, &decoded);
                    let Some((expr_end, close)) = scan_field(inner, index + 1) else {
                        return Err(CoreError::syntax("f-string field is never closed", at(index)));
                    };
                    let (expr_end, modifier) =
                        split_self_documenting(inner, index + 1, expr_end, close);
                    let value = self.parse_field(&inner[index + 1..expr_end], base + index)?;
                    parts.push(FStringPart::Field { value, modifier });
                    index = close + 1;
                }
                _ => {
                    literal.push(ch);
                    index += ch.len_utf8();
                }
            }
        }
        let decoded = if verbatim {
            literal
        } else {
            lexer::decode_escapes(&literal)
        };
        push_literal(parts, &decoded);
        Ok(())
    }

    /// Parses the expression of one replacement field. `brace` is the
    /// source offset of the opening `{`.
    fn parse_field(&mut self, text: &str, brace: usize) -> PResult<Expr> {
        let field_span = Span::from_offsets(brace, brace + text.len() + 2);
        if text.trim().is_empty() {
            return Err(CoreError::syntax(
                "f-string field has no expression",
                field_span,
            ));
        }
        // The parentheses line up with the braces, so every token span maps
        // back onto the same characters of the original source.
        let wrapped = format!("({text})");
        let tokens = lex(&wrapped)
            .map_err(|_| CoreError::syntax("invalid expression in f-string", field_span))?
            .into_iter()
            .map(|token| Token {
                kind: token.kind,
                span: Span::from_offsets(
                    brace + token.span.start as usize,
                    brace + token.span.end as usize,
                ),
            })
            .collect();
        let mut field = Parser {
            source: self.source,
            tokens,
            position: 0,
            last_end: field_span.start,
            depth: self.depth,
            max_depth: self.max_depth,
        };
        let value = field.nested(|p| p.parse_test())?;
        field.eat(TokenKind::Newline);
        if !field.at(TokenKind::Eof) {
            return Err(CoreError::syntax("invalid expression in f-string", field_span));
        }
        Ok(value)
    }

    fn parse_paren(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::LParen, "'('")?.span.start;
        if self.eat(TokenKind::RParen).is_some() {
            return Ok(self.expr(ExprKind::Tuple(Vec::new()), start));
        }
        if self.at(TokenKind::Yield) {
            let value = self.parse_yield()?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(value);
        }
        let first = self.parse_star_or_named()?;
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(self.expr(
                ExprKind::GeneratorExp {
                    elt: Box::new(first),
                    generators,
                },
                start,
            ));
        }
        if !self.at(TokenKind::Comma) {
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(first);
        }
        let items = self.parse_sequence_tail(first, TokenKind::RParen)?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(self.expr(ExprKind::Tuple(items), start))
    }

    fn parse_list_display(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::LBracket, "'['")?.span.start;
        if self.eat(TokenKind::RBracket).is_some() {
            return Ok(self.expr(ExprKind::List(Vec::new()), start));
        }
        let first = self.parse_star_or_named()?;
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(TokenKind::RBracket, "']'")?;
            return Ok(self.expr(
                ExprKind::ListComp {
                    elt: Box::new(first),
                    generators,
                },
                start,
            ));
        }
        let items = self.parse_sequence_tail(first, TokenKind::RBracket)?;
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(self.expr(ExprKind::List(items), start))
    }

    fn parse_brace_display(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::LBrace, "'{'")?.span.start;
        if self.eat(TokenKind::RBrace).is_some() {
            return Ok(self.expr(
                ExprKind::Dict {
                    keys: Vec::new(),
                    values: Vec::new(),
                },
                start,
            ));
        }

        let (first_key, first_value) = if self.eat(TokenKind::DoubleStar).is_some() {
            (None, self.parse_binary(PREC_BITOR)?)
        } else {
            let first = self.parse_star_or_named()?;
            if self.eat(TokenKind::Colon).is_none() {
                return self.finish_set_display(first, start);
            }
            (Some(first), self.parse_test()?)
        };

        if let (Some(key), true) = (&first_key, self.at_comprehension()) {
            let key = key.clone();
            let generators = self.parse_comprehension_clauses()?;
            self.expect(TokenKind::RBrace, "'}'")?;
            return Ok(self.expr(
                ExprKind::DictComp {
                    key: Box::new(key),
                    value: Box::new(first_value),
                    generators,
                },
                start,
            ));
        }

        let mut keys = vec![first_key];
        let mut values = vec![first_value];
        while self.eat(TokenKind::Comma).is_some() {
            if self.at(TokenKind::RBrace) {
                break;
            }
            if self.eat(TokenKind::DoubleStar).is_some() {
                keys.push(None);
                values.push(self.parse_binary(PREC_BITOR)?);
            } else {
                keys.push(Some(self.parse_test()?));
                self.expect(TokenKind::Colon, "':'")?;
                values.push(self.parse_test()?);
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(self.expr(ExprKind::Dict { keys, values }, start))
    }

    fn finish_set_display(&mut self, first: Expr, start: u32) -> PResult<Expr> {
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(TokenKind::RBrace, "'}'")?;
            return Ok(self.expr(
                ExprKind::SetComp {
                    elt: Box::new(first),
                    generators,
                },
                start,
            ));
        }
        let items = self.parse_sequence_tail(first, TokenKind::RBrace)?;
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(self.expr(ExprKind::Set(items), start))
    }

    fn parse_sequence_tail(&mut self, first: Expr, closing: TokenKind) -> PResult<Vec<Expr>> {
        let mut items = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            if self.at(closing) {
                break;
            }
            items.push(self.parse_star_or_named()?);
        }
        Ok(items)
    }

    fn parse_comprehension_clauses(&mut self) -> PResult<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.at_comprehension() {
            let is_async = self.eat(TokenKind::Async).is_some();
            self.expect(TokenKind::For, "'for'")?;
            let target = self.parse_target_list()?;
            self.expect(TokenKind::In, "'in'")?;
            let iter = self.parse_binary(PREC_OR)?;
            let mut ifs = Vec::new();
            while self.eat(TokenKind::If).is_some() {
                ifs.push(self.parse_binary(PREC_OR)?);
            }
            generators.push(Comprehension {
                target,
                iter,
                ifs,
                is_async,
            });
        }
        Ok(generators)
    }

    // -----------------------------------------------------------------
    // Token helpers
    // -----------------------------------------------------------------

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.deepen()?;
        let result = ensure_sufficient_stack(|| f(self));
        self.depth -= 1;
        result
    }

    /// Claims one more level of nesting. Callers restore `depth` themselves.
    fn deepen(&mut self) -> PResult<()> {
        if self.depth >= self.max_depth {
            return Err(CoreError::InternalLimitExceeded {
                limit: self.max_depth,
                span: self.peek_token().span,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn peek_nth(&self, n: usize) -> Token {
        let end = Span::from_offsets(0, self.source.len()).end;
        let index = (self.position + n).min(self.tokens.len().saturating_sub(1));
        self.tokens.get(index).copied().unwrap_or(Token {
            kind: TokenKind::Eof,
            span: Span::new(end, end),
        })
    }

    fn peek_token(&self) -> Token {
        self.peek_nth(0)
    }

    fn peek(&self) -> TokenKind {
        self.peek_token().kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Newline | TokenKind::Semi | TokenKind::Eof
        )
    }

    fn at_comprehension(&self) -> bool {
        self.at(TokenKind::For)
            || (self.at(TokenKind::Async) && self.peek_nth(1).kind == TokenKind::For)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek_token();
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
        if !matches!(
            token.kind,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof
        ) {
            self.last_end = token.span.end;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(&format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self) -> PResult<Ident> {
        let token = self.expect(TokenKind::Name, "a name")?;
        Ok(Ident {
            name: self.text(token).to_string(),
            span: token.span,
        })
    }

    fn error_here(&self, message: &str) -> CoreError {
        CoreError::syntax(message, self.peek_token().span)
    }

    fn text(&self, token: Token) -> &'src str {
        self.slice(token.span)
    }

    fn slice(&self, span: Span) -> &'src str {
        self.source
            .get(span.start as usize..span.end as usize)
            .unwrap_or("")
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.last_end.max(start))
    }

    fn stmt(&self, kind: StmtKind, start: u32) -> Stmt {
        Stmt {
            kind,
            span: self.span_from(start),
        }
    }

    fn expr(&self, kind: ExprKind, start: u32) -> Expr {
        Expr {
            kind,
            span: self.span_from(start),
        }
    }
}

fn push_literal(parts: &mut Vec<FStringPart>, text: &str) {
    if text.is_empty() {
        return;
    }
    match parts.last_mut() {
        Some(FStringPart::Literal(last)) => last.push_str(text),
        _ => parts.push(FStringPart::Literal(text.to_string())),
    }
}

/// Finds the end of a replacement field starting at `open` (just past the
/// `{`). Returns where the expression stops and the index of the closing
/// `}`; a conversion or format spec sits between the two.
fn scan_field(inner: &str, open: usize) -> Option<(usize, usize)> {
    let bytes = inner.as_bytes();
    let mut depth = 0usize;
    let mut quote = None;
    let mut modifier = None;
    let mut index = open;
    while let Some(&byte) = bytes.get(index) {
        if let Some(open_quote) = quote {
            if byte == open_quote {
                quote = None;
            }
            index += 1;
            continue;
        }
        match byte {
            b'\'' | b'"' if modifier.is_none() => quote = Some(byte),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b'}' if depth > 0 => depth -= 1,
            b'}' => return Some((modifier.unwrap_or(index), index)),
            b'!' if depth == 0 && modifier.is_none() && bytes.get(index + 1) != Some(&b'=') => {
                modifier = Some(index);
            }
            b':' if depth == 0 && modifier.is_none() => modifier = Some(index),
            _ => {}
        }
        index += 1;
    }
    None
}

/// Separates a trailing self-documenting `=` (`{x=}`) from the expression.
fn split_self_documenting(
    inner: &str,
    open: usize,
    expr_end: usize,
    close: usize,
) -> (usize, Option<String>) {
    let text = inner[open..expr_end].trim_end();
    let documenting = text.ends_with('=')
        && !["==", "!=", "<=", ">="]
            .iter()
            .any(|operator| text.ends_with(operator));
    let expr_end = if documenting {
        open + text.len() - 1
    } else {
        expr_end
    };
    let modifier = (expr_end < close).then(|| inner[expr_end..close].to_string());
    (expr_end, modifier)
}

fn starts_expression(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Name
            | TokenKind::Int
            | TokenKind::Float
            | TokenKind::Imaginary
            | TokenKind::String
            | TokenKind::Bytes
            | TokenKind::FString
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::Minus
            | TokenKind::Plus
            | TokenKind::Tilde
            | TokenKind::Not
            | TokenKind::Lambda
            | TokenKind::Await
            | TokenKind::True
            | TokenKind::False
            | TokenKind::None
            | TokenKind::Ellipsis
            | TokenKind::Star
    )
}
