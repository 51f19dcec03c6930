//! vitte-compiler — the single-pass Pratt compiler (Module H).
//!
//! Lexes and compiles source text directly into a [`vitte_core::bytecode::
//! Chunk`]: there is no intermediate AST. `compile_precedence` advances,
//! dispatches a prefix rule, then consumes infix operators whose
//! precedence is at least the requested floor — textbook Pratt parsing,
//! folded into the same pass that emits bytecode.

#![deny(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::{format, string::String, vec::Vec};
#[cfg(feature = "std")]
use std::{format, string::String, vec::Vec};

#[cfg(feature = "trace")]
use tracing::trace;

use vitte_core::bytecode::{Chunk, Op};
use vitte_core::tag::Tag;
use vitte_core::{Pos, SourceId, Span};
use vitte_lexer::{Keyword, Lexer, Token, TokenKind};

/* ───────────────────────────── Diagnostics ───────────────────────────── */

/// Severity of a reported [`Diagnostic`]. The compiler only ever emits
/// `Error` today; the enum exists so a future warning pass has somewhere
/// to hang without changing the collector's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A compile error. `had_error` is set whenever one is reported.
    Error,
}

/// One reported diagnostic, already rendered in the `[line <N>] Error ...`
/// form §6 specifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// 1-based source line.
    pub line: u32,
    /// Fully rendered message, e.g. `[line 3] Error at '+': expect expression`.
    pub message: String,
}

/// Result of a [`compile`] call: whether compilation succeeded and every
/// diagnostic collected along the way. Mirrors §7's policy — compilation
/// never aborts on a source error; it accumulates and reports as much as
/// it can.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    /// `true` iff no error was reported.
    pub success: bool,
    /// Every diagnostic reported during compilation, in source order.
    pub diagnostics: Vec<Diagnostic>,
}

/* ───────────────────────────── Precedence ────────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call | Primary => Primary,
        }
    }
}

type ParseFn<'a> = fn(&mut Compiler<'a>, bool);

struct ParseRule<'a> {
    prefix: Option<ParseFn<'a>>,
    infix: Option<ParseFn<'a>>,
    precedence: Precedence,
}

fn get_rule<'a>(kind: &TokenKind<'a>) -> ParseRule<'a> {
    macro_rules! rule {
        ($prefix:expr, $infix:expr, $prec:expr) => {
            ParseRule { prefix: $prefix, infix: $infix, precedence: $prec }
        };
    }
    match kind {
        TokenKind::LParen => rule!(Some(grouping), None, Precedence::None),
        TokenKind::Minus => rule!(Some(unary), Some(binary), Precedence::Term),
        TokenKind::Plus => rule!(None, Some(binary), Precedence::Term),
        TokenKind::Star => rule!(None, Some(binary), Precedence::Factor),
        TokenKind::Slash => rule!(None, Some(binary), Precedence::Factor),
        TokenKind::Bang => rule!(Some(unary), None, Precedence::None),
        TokenKind::BangEqual => rule!(None, Some(binary), Precedence::Equality),
        TokenKind::EqualEqual => rule!(None, Some(binary), Precedence::Equality),
        TokenKind::Greater => rule!(None, Some(binary), Precedence::Comparison),
        TokenKind::GreaterEqual => rule!(None, Some(binary), Precedence::Comparison),
        TokenKind::Less => rule!(None, Some(binary), Precedence::Comparison),
        TokenKind::LessEqual => rule!(None, Some(binary), Precedence::Comparison),
        TokenKind::Ident(_) => rule!(Some(variable), None, Precedence::None),
        TokenKind::Str(_) => rule!(Some(string), None, Precedence::None),
        TokenKind::Int(_) | TokenKind::Float(_) => rule!(Some(number), None, Precedence::None),
        TokenKind::Keyword(Keyword::And) => rule!(None, Some(and_), Precedence::And),
        TokenKind::Keyword(Keyword::Or) => rule!(None, Some(or_), Precedence::Or),
        TokenKind::Keyword(Keyword::True | Keyword::False | Keyword::Nil) => rule!(Some(literal), None, Precedence::None),
        _ => rule!(None, None, Precedence::None),
    }
}

/* ───────────────────────────── Locals ────────────────────────────────── */

struct Local<'a> {
    name: &'a str,
    /// `None` while its initializer is still being compiled — the marker
    /// `resolve_local` uses to reject a self-referential initializer.
    depth: Option<u32>,
}

/* ───────────────────────────── Compiler ──────────────────────────────── */

/// Drives one `compile` call: the embedded lexer, the current/previous
/// token pair, the flat local-variable stack, and error-recovery state.
struct Compiler<'a> {
    lexer: Lexer<'a>,
    previous: Token<'a>,
    current: Token<'a>,
    chunk: &'a mut Chunk,
    had_error: bool,
    panic_mode: bool,
    diagnostics: Vec<Diagnostic>,
    /// Flat across nested scopes: §9's redesign note folds the source's two
    /// parallel `scopes`/`uninitialized` stacks into one `Vec<Local>` keyed
    /// by an `Option<u32>` depth, so a local's index in this vec *is* its
    /// slot — no per-scope offset arithmetic needed.
    locals: Vec<Local<'a>>,
    scope_depth: u32,
}

impl<'a> Compiler<'a> {
    fn new(src: &'a str, source: SourceId, chunk: &'a mut Chunk) -> Self {
        let placeholder = Token { kind: TokenKind::Eof, lexeme: "", span: Span::new(source, Pos::ZERO, Pos::ZERO), line: 0 };
        Self {
            lexer: Lexer::new(src, source),
            previous: placeholder,
            current: placeholder,
            chunk,
            had_error: false,
            panic_mode: false,
            diagnostics: Vec::new(),
            locals: Vec::new(),
            scope_depth: 0,
        }
    }

    /* ---- token stream ---- */

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.next_token();
            if let TokenKind::Error(msg) = self.current.kind {
                self.error_at_current(msg);
                continue;
            }
            break;
        }
    }

    fn is_eof(&self) -> bool {
        matches!(self.current.kind, TokenKind::Eof)
    }

    fn check<F: Fn(&TokenKind<'a>) -> bool>(&self, pred: F) -> bool {
        pred(&self.current.kind)
    }

    fn match_tok<F: Fn(&TokenKind<'a>) -> bool>(&mut self, pred: F) -> bool {
        if self.check(pred) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect<F: Fn(&TokenKind<'a>) -> bool>(&mut self, pred: F, msg: &str) {
        if self.check(pred) {
            self.advance();
        } else {
            self.error_at_current(msg);
        }
    }

    fn expect_ident(&mut self, msg: &str) -> &'a str {
        if let TokenKind::Ident(name) = self.current.kind {
            self.advance();
            name
        } else {
            self.error_at_current(msg);
            ""
        }
    }

    fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.current.kind, TokenKind::Keyword(k) if k == kw)
    }

    fn match_keyword(&mut self, kw: Keyword) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    /* ---- diagnostics ---- */

    fn error_at_current(&mut self, msg: impl Into<String>) {
        let tok = self.current;
        self.error_at(tok, &msg.into());
    }

    fn error_at_previous(&mut self, msg: impl Into<String>) {
        let tok = self.previous;
        self.error_at(tok, &msg.into());
    }

    fn error_at(&mut self, tok: Token<'a>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        #[cfg(feature = "trace")]
        trace!(line = tok.line, %message, "entering panic mode");
        let rendered = match tok.kind {
            TokenKind::Error(_) => format!("[line {}] Error: {message}", tok.line),
            TokenKind::Eof => format!("[line {}] Error at end of file: {message}", tok.line),
            _ => format!("[line {}] Error at '{}': {message}", tok.line, tok.lexeme),
        };
        self.diagnostics.push(Diagnostic { severity: Severity::Error, line: tok.line, message: rendered });
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.is_eof() {
            if matches!(self.previous.kind, TokenKind::Semi) {
                return;
            }
            if let TokenKind::Keyword(kw) = self.current.kind {
                if kw.starts_declaration() {
                    return;
                }
            }
            self.advance();
        }
    }

    /* ---- bytecode emission ---- */

    fn emit_op(&mut self, op: Op, line: u32) {
        self.chunk.emit_op(op, line);
    }

    fn emit_unary(&mut self, op: Op, operand: u64, line: u32) {
        self.chunk.emit_unary(op, operand, line);
    }

    fn identifier_constant(&mut self, name: &str) -> usize {
        self.chunk.record_const(Tag::owned_string(name.as_bytes()))
    }

    /* ---- scopes / locals ---- */

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        let line = self.previous.line;
        while let Some(last) = self.locals.last() {
            if last.depth.map_or(false, |d| d > self.scope_depth) {
                self.locals.pop();
                self.emit_op(Op::Pop, line);
            } else {
                break;
            }
        }
    }

    /// Declares `name` in the current scope. At global scope this is a
    /// no-op — the name constant is created later, by [`Self::
    /// define_variable`], so it is recorded *after* the initializer's own
    /// constants (matching the emission order the compiler's end-to-end
    /// scenarios assume). In a local scope the local must be pushed now,
    /// still uninitialized, so a self-referential initializer can be
    /// detected while it compiles.
    fn declare_variable(&mut self, name: &'a str) {
        if self.scope_depth == 0 {
            return;
        }
        for local in self.locals.iter().rev() {
            if let Some(d) = local.depth {
                if d < self.scope_depth {
                    break;
                }
            }
            if local.name == name {
                self.error_at_previous("already a variable with this name in this scope");
                break;
            }
        }
        self.locals.push(Local { name, depth: None });
    }

    fn mark_initialized(&mut self) {
        if let Some(last) = self.locals.last_mut() {
            last.depth = Some(self.scope_depth);
        }
    }

    fn define_variable(&mut self, name: &'a str) {
        let line = self.previous.line;
        if self.scope_depth == 0 {
            let idx = self.identifier_constant(name);
            self.emit_unary(Op::DefGlobal, idx as u64, line);
        } else {
            self.mark_initialized();
            let slot = self.locals.len() - 1;
            self.emit_unary(Op::SetLocal, slot as u64, line);
        }
    }

    /// Finds `name` among the flat local stack, innermost first. Raises
    /// "local used in its own initializer" if found still uninitialized.
    fn resolve_local(&mut self, name: &str) -> Option<usize> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth.is_none() {
                    self.error_at_previous("can't read local variable in its own initializer");
                }
                return Some(i);
            }
        }
        None
    }

    fn named_variable(&mut self, name: &'a str, can_assign: bool) {
        let slot = self.resolve_local(name);
        let line = self.previous.line;
        if can_assign && self.match_tok(|k| matches!(k, TokenKind::Equal)) {
            self.expression();
            match slot {
                Some(s) => self.emit_unary(Op::SetLocal, s as u64, line),
                None => {
                    let idx = self.identifier_constant(name);
                    self.emit_unary(Op::SetGlobal, idx as u64, line);
                }
            }
        } else {
            match slot {
                Some(s) => self.emit_unary(Op::GetLocal, s as u64, line),
                None => {
                    let idx = self.identifier_constant(name);
                    self.emit_unary(Op::GetGlobal, idx as u64, line);
                }
            }
        }
    }

    /* ---- expressions ---- */

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, prec: Precedence) {
        self.advance();
        let can_assign = prec <= Precedence::Assignment;
        match get_rule(&self.previous.kind).prefix {
            Some(prefix) => prefix(self, can_assign),
            None => {
                self.error_at_previous("expect expression");
                return;
            }
        }

        while prec <= get_rule(&self.current.kind).precedence {
            self.advance();
            if let Some(infix) = get_rule(&self.previous.kind).infix {
                infix(self, can_assign);
            }
        }

        if can_assign && self.match_tok(|k| matches!(k, TokenKind::Equal)) {
            self.error_at_previous("invalid assignment target");
        }
    }

    /* ---- statements ---- */

    fn declaration(&mut self) {
        if self.match_keyword(Keyword::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        loop {
            let name = self.expect_ident("expect variable name");
            self.declare_variable(name);
            if self.match_tok(|k| matches!(k, TokenKind::Equal)) {
                self.expression();
            } else {
                let line = self.previous.line;
                self.emit_op(Op::Nil, line);
            }
            self.define_variable(name);
            if !self.match_tok(|k| matches!(k, TokenKind::Comma)) {
                break;
            }
        }
        self.expect(|k| matches!(k, TokenKind::Semi), "expect ';' after variable declaration");
    }

    fn statement(&mut self) {
        if self.match_keyword(Keyword::Print) {
            self.print_statement();
        } else if self.match_keyword(Keyword::If) {
            self.if_statement();
        } else if self.match_keyword(Keyword::While) {
            self.while_statement();
        } else if self.match_keyword(Keyword::For) {
            self.for_statement();
        } else if self.match_tok(|k| matches!(k, TokenKind::LBrace)) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(|k| matches!(k, TokenKind::RBrace)) && !self.is_eof() {
            self.declaration();
        }
        self.expect(|k| matches!(k, TokenKind::RBrace), "expect '}' after block");
    }

    fn print_statement(&mut self) {
        loop {
            self.expression();
            let line = self.previous.line;
            self.emit_op(Op::Print, line);
            if !self.match_tok(|k| matches!(k, TokenKind::Comma)) {
                break;
            }
        }
        self.expect(|k| matches!(k, TokenKind::Semi), "expect ';' after value");
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.expect(|k| matches!(k, TokenKind::Semi), "expect ';' after expression");
        let line = self.previous.line;
        self.emit_op(Op::Pop, line);
    }

    fn if_statement(&mut self) {
        self.expect(|k| matches!(k, TokenKind::LParen), "expect '(' after 'if'");
        self.expression();
        self.expect(|k| matches!(k, TokenKind::RParen), "expect ')' after condition");

        let line = self.previous.line;
        let then_jump = self.chunk.reserve_unary(line);
        self.emit_op(Op::Pop, line);
        self.statement();

        let line = self.previous.line;
        let else_jump = self.chunk.reserve_unary(line);
        self.chunk.patch_unary(then_jump, Op::JumpIfFalse);
        self.emit_op(Op::Pop, line);

        if self.match_keyword(Keyword::Else) {
            self.statement();
        }
        self.chunk.patch_unary(else_jump, Op::Jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk.len();
        self.expect(|k| matches!(k, TokenKind::LParen), "expect '(' after 'while'");
        self.expression();
        self.expect(|k| matches!(k, TokenKind::RParen), "expect ')' after condition");

        let line = self.previous.line;
        let exit_jump = self.chunk.reserve_unary(line);
        self.emit_op(Op::Pop, line);
        self.statement();

        let line = self.previous.line;
        self.chunk.emit_loop(loop_start, line);

        self.chunk.patch_unary(exit_jump, Op::JumpIfFalse);
        self.emit_op(Op::Pop, line);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.expect(|k| matches!(k, TokenKind::LParen), "expect '(' after 'for'");

        if self.match_tok(|k| matches!(k, TokenKind::Semi)) {
            // no initializer
        } else if self.check_keyword(Keyword::Var) {
            self.advance();
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk.len();
        let mut exit_jump: Option<usize> = None;
        if !self.check(|k| matches!(k, TokenKind::Semi)) {
            self.expression();
            let line = self.previous.line;
            self.expect(|k| matches!(k, TokenKind::Semi), "expect ';' after loop condition");
            exit_jump = Some(self.chunk.reserve_unary(line));
            self.emit_op(Op::Pop, line);
        } else {
            self.advance();
        }

        if !self.check(|k| matches!(k, TokenKind::RParen)) {
            let line = self.previous.line;
            let body_jump = self.chunk.reserve_unary(line);
            let increment_start = self.chunk.len();
            self.expression();
            let line = self.previous.line;
            self.emit_op(Op::Pop, line);
            self.expect(|k| matches!(k, TokenKind::RParen), "expect ')' after for clauses");
            self.chunk.emit_loop(loop_start, line);
            loop_start = increment_start;
            self.chunk.patch_unary(body_jump, Op::Jump);
        } else {
            self.advance();
        }

        self.statement();
        let line = self.previous.line;
        self.chunk.emit_loop(loop_start, line);

        if let Some(ej) = exit_jump {
            self.chunk.patch_unary(ej, Op::JumpIfFalse);
            self.emit_op(Op::Pop, line);
        }

        self.end_scope();
    }
}

/* ───────────────────────────── Parse rules ───────────────────────────── */

fn grouping<'a>(c: &mut Compiler<'a>, _can_assign: bool) {
    c.expression();
    c.expect(|k| matches!(k, TokenKind::RParen), "expect ')' after expression");
}

fn unary<'a>(c: &mut Compiler<'a>, _can_assign: bool) {
    let kind = c.previous.kind;
    let line = c.previous.line;
    c.parse_precedence(Precedence::Unary);
    match kind {
        TokenKind::Minus => c.emit_op(Op::Negate, line),
        TokenKind::Bang => c.emit_op(Op::Not, line),
        _ => unreachable!("unary dispatched for non-unary token"),
    }
}

fn binary<'a>(c: &mut Compiler<'a>, _can_assign: bool) {
    let kind = c.previous.kind;
    let line = c.previous.line;
    let rule = get_rule(&kind);
    c.parse_precedence(rule.precedence.next());
    match kind {
        TokenKind::Plus => c.emit_op(Op::Add, line),
        // Subtraction is synthesized: negate the RHS, then add.
        TokenKind::Minus => {
            c.emit_op(Op::Negate, line);
            c.emit_op(Op::Add, line);
        }
        TokenKind::Star => c.emit_op(Op::Multiply, line),
        TokenKind::Slash => c.emit_op(Op::Divide, line),
        TokenKind::EqualEqual => c.emit_op(Op::Equal, line),
        // `!=` is `==` negated, not a bare `OP_NOT` (see DESIGN.md).
        TokenKind::BangEqual => {
            c.emit_op(Op::Equal, line);
            c.emit_op(Op::Not, line);
        }
        TokenKind::Greater => c.emit_op(Op::Greater, line),
        TokenKind::GreaterEqual => {
            c.emit_op(Op::Less, line);
            c.emit_op(Op::Not, line);
        }
        TokenKind::Less => c.emit_op(Op::Less, line),
        TokenKind::LessEqual => {
            c.emit_op(Op::Greater, line);
            c.emit_op(Op::Not, line);
        }
        _ => unreachable!("binary dispatched for non-binary token"),
    }
}

fn and_<'a>(c: &mut Compiler<'a>, _can_assign: bool) {
    let line = c.previous.line;
    let end_jump = c.chunk.reserve_unary(line);
    c.emit_op(Op::Pop, line);
    c.parse_precedence(Precedence::And);
    c.chunk.patch_unary(end_jump, Op::JumpIfFalse);
}

fn or_<'a>(c: &mut Compiler<'a>, _can_assign: bool) {
    let line = c.previous.line;
    let end_jump = c.chunk.reserve_unary(line);
    c.emit_op(Op::Pop, line);
    c.parse_precedence(Precedence::Or);
    c.chunk.patch_unary(end_jump, Op::JumpIfTrue);
}

fn literal<'a>(c: &mut Compiler<'a>, _can_assign: bool) {
    let line = c.previous.line;
    match c.previous.kind {
        TokenKind::Keyword(Keyword::True) => c.emit_op(Op::True, line),
        TokenKind::Keyword(Keyword::False) => c.emit_op(Op::False, line),
        TokenKind::Keyword(Keyword::Nil) => c.emit_op(Op::Nil, line),
        _ => unreachable!("literal dispatched for non-literal token"),
    }
}

fn number<'a>(c: &mut Compiler<'a>, _can_assign: bool) {
    let line = c.previous.line;
    match c.previous.kind {
        TokenKind::Int(text) => match text.parse::<i64>() {
            Ok(v) => {
                let tag = if v >= i32::MIN as i64 && v <= i32::MAX as i64 { Tag::pair(0, v as i32) } else { Tag::boxed_int64(v) };
                let idx = c.chunk.record_const(tag);
                c.emit_unary(Op::Constant, idx as u64, line);
            }
            Err(_) => c.error_at_previous("integer literal out of range"),
        },
        TokenKind::Float(text) => match text.parse::<f64>() {
            Ok(v) if v.is_finite() => {
                let idx = c.chunk.record_const(Tag::double(v));
                c.emit_unary(Op::Constant, idx as u64, line);
            }
            _ => c.error_at_previous("float literal out of range"),
        },
        _ => unreachable!("number dispatched for non-numeric token"),
    }
}

fn string<'a>(c: &mut Compiler<'a>, _can_assign: bool) {
    if let TokenKind::Str(text) = c.previous.kind {
        let line = c.previous.line;
        let idx = c.chunk.record_const(Tag::slice(text.as_bytes()));
        c.emit_unary(Op::Constant, idx as u64, line);
    }
}

fn variable<'a>(c: &mut Compiler<'a>, can_assign: bool) {
    if let TokenKind::Ident(name) = c.previous.kind {
        c.named_variable(name, can_assign);
    }
}

/* ───────────────────────────── Entry point ───────────────────────────── */

/// Compiles `src` into `chunk`. Primes the lexer, compiles declarations
/// until EOF, emits a trailing `OP_RETURN`, and returns whether
/// compilation succeeded along with every diagnostic collected — per §7,
/// a source error never aborts the process, it only flips `success` to
/// `false`.
pub fn compile(src: &str, source: SourceId, chunk: &mut Chunk) -> CompileOutcome {
    let mut c = Compiler::new(src, source, chunk);
    c.advance();
    while !c.is_eof() {
        c.declaration();
    }
    let line = c.previous.line;
    c.emit_op(Op::Return, line);
    CompileOutcome { success: !c.had_error, diagnostics: c.diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitte_core::bytecode::op::decode_varint;
    use vitte_core::ByteReader;

    fn compiled(src: &str) -> (Chunk, CompileOutcome) {
        let mut chunk = Chunk::new();
        let outcome = compile(src, SourceId(0), &mut chunk);
        (chunk, outcome)
    }

    fn mnemonics(chunk: &Chunk) -> Vec<&'static str> {
        let mut r = ByteReader::new(chunk.code());
        let mut out = Vec::new();
        while r.remaining() > 0 {
            let op = Op::from_byte(r.read_u8().unwrap()).unwrap();
            out.push(op.mnemonic());
            if op.has_operand() {
                decode_varint(&mut r).unwrap();
            }
        }
        out
    }

    #[test]
    fn print_addition() {
        let (chunk, outcome) = compiled("print 1 + 2;");
        assert!(outcome.success);
        assert_eq!(mnemonics(&chunk), ["CONSTANT", "CONSTANT", "ADD", "PRINT", "RETURN"]);
        assert_eq!(chunk.consts().len(), 2);
    }

    #[test]
    fn global_roundtrip() {
        let (chunk, outcome) = compiled("var x = 10; x = x + 1; print x;");
        assert!(outcome.success);
        assert_eq!(
            mnemonics(&chunk),
            ["CONSTANT", "DEF_GLOBAL", "GET_GLOBAL", "CONSTANT", "ADD", "SET_GLOBAL", "POP", "GET_GLOBAL", "PRINT", "RETURN"]
        );
    }

    #[test]
    fn if_else_branches() {
        let (chunk, outcome) = compiled("if (true) print 1; else print 2;");
        assert!(outcome.success);
        assert_eq!(
            mnemonics(&chunk),
            ["TRUE", "JUMP_IF_FALSE", "POP", "CONSTANT", "PRINT", "JUMP", "POP", "CONSTANT", "PRINT", "RETURN"]
        );
    }

    #[test]
    fn nested_block_scopes_use_flat_slots() {
        let (chunk, outcome) = compiled("{ var a = 1; { var b = a; } }");
        assert!(outcome.success);
        assert_eq!(mnemonics(&chunk), ["CONSTANT", "SET_LOCAL", "GET_LOCAL", "SET_LOCAL", "POP", "POP", "RETURN"]);
    }

    #[test]
    fn and_short_circuits() {
        let (chunk, outcome) = compiled("1 and 0;");
        assert!(outcome.success);
        assert_eq!(mnemonics(&chunk), ["CONSTANT", "JUMP_IF_FALSE", "POP", "CONSTANT", "POP", "RETURN"]);
    }

    #[test]
    fn not_equal_is_equal_then_not() {
        let (chunk, outcome) = compiled("print 1 != 2;");
        assert!(outcome.success);
        assert_eq!(mnemonics(&chunk), ["CONSTANT", "CONSTANT", "EQUAL", "NOT", "PRINT", "RETURN"]);
    }

    #[test]
    fn self_referential_local_initializer_is_an_error() {
        let (_chunk, outcome) = compiled("{ var x = x; }");
        assert!(!outcome.success);
        assert!(outcome.diagnostics.iter().any(|d| d.message.contains("own initializer")));
    }

    #[test]
    fn undeclared_global_read_is_not_a_compile_error() {
        let (_chunk, outcome) = compiled("var x = x;");
        assert!(outcome.success);
    }

    #[test]
    fn while_loop_uses_parens_like_if() {
        let (chunk, outcome) = compiled("while (true) print 1;");
        assert!(outcome.success);
        assert_eq!(mnemonics(&chunk), ["TRUE", "JUMP_IF_FALSE", "POP", "CONSTANT", "PRINT", "LOOP", "POP", "RETURN"]);
    }

    #[test]
    fn for_loop_desugars_to_while_with_increment() {
        let (chunk, outcome) = compiled("for (var i = 0; i; i = i + 1) print i;");
        assert!(outcome.success);
        // init, cond check, jump over increment, body, increment, loop back, exit pop.
        assert_eq!(
            mnemonics(&chunk),
            [
                "CONSTANT", "SET_LOCAL", "GET_LOCAL", "JUMP_IF_FALSE", "POP", "JUMP", "GET_LOCAL", "CONSTANT", "ADD", "SET_LOCAL", "POP", "LOOP",
                "GET_LOCAL", "PRINT", "LOOP", "POP", "POP", "RETURN"
            ]
        );
    }

    #[test]
    fn synchronize_recovers_after_missing_semicolon() {
        let (_chunk, outcome) = compiled("var x = 1 var y = 2;");
        assert!(!outcome.success);
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn trailing_equals_on_non_lvalue_is_an_error() {
        let (_chunk, outcome) = compiled("1 + 2 = 3;");
        assert!(!outcome.success);
    }
}
