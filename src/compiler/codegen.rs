use std::collections::BTreeSet;

use crate::bytecode::verify::check_program;
use crate::bytecode::{Instruction, Opr, Program};
use crate::compiler::compile_error::{CompileError, CompileErrorKind};
use crate::compiler::quad::{Quad, QuadBuilder, QuadOp};
use crate::compiler::scope::{ScopeManager, Symbol, SymbolKind};
use crate::frontend::{Span, Spanned, Token};

/// Output of a successful compilation.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub program: Program,
    /// Every declared symbol, in declaration order.
    pub symbols: Vec<Symbol>,
    /// Quadruple form of the same program, built in the same pass.
    pub quads: Vec<Quad>,
}

/// Single-pass recursive-descent parser that emits P-Code as it goes.
///
/// Grammar (one method per nonterminal):
///
/// ```text
/// program    -> block '.'
/// block      -> [const_decl] [var_decl] {proc_decl} statement
/// const_decl -> 'const' ID '=' NUMBER {',' ID '=' NUMBER} ';'
/// var_decl   -> 'var' ID {',' ID} ';'
/// proc_decl  -> 'procedure' ID ';' block ';'
/// statement  -> assignment | call | begin_end | if_stmt | while_stmt
///             | read | write | empty
/// condition  -> 'odd' expression | expression relop expression
/// expression -> ['+'|'-'] term {('+'|'-') term}
/// term       -> factor {('*'|'/') factor}
/// factor     -> ID | NUMBER | '(' expression ')'
/// ```
///
/// Forward jumps are emitted with a 0 target and recorded in `pending`; each
/// statement patches its own jumps before returning. Expression methods also
/// return the quad operand holding their value. The first semantic or syntax
/// error aborts compilation.
pub struct CodeGen {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Span of the most recently consumed token.
    ///
    /// Used to report a useful location for errors at end of input.
    last_span: Option<Span>,
    scopes: ScopeManager,
    code: Vec<Instruction>,
    /// Indices of emitted jumps whose target is still the placeholder.
    pending: BTreeSet<usize>,
    quads: QuadBuilder,
}

impl CodeGen {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        CodeGen {
            tokens,
            pos: 0,
            last_span: None,
            scopes: ScopeManager::new(),
            code: Vec::new(),
            pending: BTreeSet::new(),
            quads: QuadBuilder::new(),
        }
    }

    // =========================================================================
    // Token cursor
    // =========================================================================

    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.current().map(|s| &s.token)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn advance(&mut self) -> Option<&Spanned> {
        let token = self.tokens.get(self.pos);
        if let Some(s) = token {
            self.last_span = Some(s.span);
        }
        self.pos += 1;
        token
    }

    /// Location of the current token, falling back to the last consumed one.
    fn here(&self) -> Span {
        self.current()
            .map(|s| s.span)
            .or(self.last_span)
            .unwrap_or(Span { line: 1, col: 1 })
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let found = self
            .peek()
            .map(|t| t.to_string())
            .unwrap_or_else(|| Token::Eof.to_string());
        CompileErrorKind::Unexpected {
            expected: expected.to_string(),
            found,
        }
        .at(self.here())
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), CompileError> {
        if self.check(&token) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, Span), CompileError> {
        match self.current() {
            Some(Spanned {
                token: Token::Ident(name),
                span,
            }) => {
                let found = (name.clone(), *span);
                self.advance();
                Ok(found)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    // =========================================================================
    // Emission and backpatching
    // =========================================================================

    fn emit(&mut self, ins: Instruction) -> usize {
        self.code.push(ins);
        self.code.len() - 1
    }

    /// Emits a jump whose target is not known yet.
    fn emit_forward(&mut self, jump: fn(usize) -> Instruction) -> usize {
        let index = self.emit(jump(0));
        self.pending.insert(index);
        index
    }

    /// Points the forward jump at `index` to the next instruction to be emitted.
    fn patch(&mut self, index: usize) -> Result<(), CompileError> {
        let target = self.code.len();
        let patched = match self.code.get(index) {
            Some(Instruction::Jmp(_)) => Instruction::Jmp(target),
            Some(Instruction::Jpc(_)) => Instruction::Jpc(target),
            other => {
                return Err(CompileErrorKind::Internal(format!(
                    "backpatch of non-jump instruction at {}: {:?}",
                    index, other
                ))
                .at(self.here()));
            }
        };

        if !self.pending.remove(&index) {
            return Err(CompileErrorKind::Internal(format!(
                "jump at {} patched twice",
                index
            ))
            .at(self.here()));
        }

        tracing::trace!(index, target, "jump patched");
        self.code[index] = patched;
        Ok(())
    }

    fn patch_quad(&mut self, index: usize) -> Result<(), CompileError> {
        self.quads
            .patch(index)
            .map_err(|msg| CompileErrorKind::Internal(msg).at(self.here()))
    }

    // =========================================================================
    // Program and declarations
    // =========================================================================

    /// Compiles the whole token stream.
    pub fn compile(mut self) -> Result<Compiled, CompileError> {
        self.block(None)?;
        self.expect(Token::Period, "'.' at end of program")?;
        if !matches!(self.peek(), Some(Token::Eof) | None) {
            return Err(self.unexpected("end of input after '.'"));
        }

        let end = self.here();
        if let Some(&index) = self.pending.iter().next() {
            return Err(
                CompileErrorKind::Internal(format!("unresolved jump at {}", index)).at(end),
            );
        }

        let program = Program::new(self.code);
        check_program(&program)
            .map_err(|e| CompileErrorKind::Internal(e.to_string()).at(end))?;
        let quads = self
            .quads
            .finish()
            .map_err(|msg| CompileErrorKind::Internal(msg).at(end))?;

        tracing::debug!(
            instructions = program.len(),
            quads = quads.len(),
            symbols = self.scopes.declared().len(),
            "program compiled"
        );

        Ok(Compiled {
            program,
            symbols: self.scopes.into_declared(),
            quads,
        })
    }

    /// Compiles one block in the innermost scope.
    ///
    /// `owner` names the procedure whose body this is (its declaring level and
    /// name) so its entry can be moved past the nested procedure bodies.
    fn block(&mut self, owner: Option<(usize, &str)>) -> Result<(), CompileError> {
        if self.check(&Token::Const) {
            self.const_decl()?;
        }
        if self.check(&Token::Var) {
            self.var_decl()?;
        }

        // Nested procedure bodies are laid out inline; one jump skips them all.
        let mut skip = None;
        while self.check(&Token::Procedure) {
            if skip.is_none() {
                skip = Some(self.emit_forward(Instruction::Jmp));
            }
            self.proc_decl()?;
        }
        if let Some(index) = skip {
            self.patch(index)?;
        }

        let entry = self.code.len();
        if let Some((level, name)) = owner {
            self.scopes
                .set_procedure_entry(level, name, entry)
                .map_err(|kind| kind.at(self.here()))?;
        }

        self.emit(Instruction::Int(self.scopes.frame_size()));
        self.statement()?;
        self.emit(Instruction::Opr(Opr::Ret));
        Ok(())
    }

    fn const_decl(&mut self) -> Result<(), CompileError> {
        self.expect(Token::Const, "'const'")?;

        loop {
            let (name, span) = self.expect_ident("constant name")?;
            self.expect(Token::Eq, "'=' in constant declaration")?;
            let value = match self.peek() {
                Some(Token::Number(n)) => *n,
                _ => return Err(self.unexpected("number in constant declaration")),
            };
            self.advance();

            self.scopes
                .define_const(&name, value)
                .map_err(|kind| kind.at(span))?;

            if self.check(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        self.expect(Token::Semicolon, "';' after constant declaration")
    }

    fn var_decl(&mut self) -> Result<(), CompileError> {
        self.expect(Token::Var, "'var'")?;

        loop {
            let (name, span) = self.expect_ident("variable name")?;
            self.scopes.define_var(&name).map_err(|kind| kind.at(span))?;

            if self.check(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        self.expect(Token::Semicolon, "';' after variable declaration")
    }

    /// The procedure is declared before its body is compiled, so the body can
    /// call itself and nested procedures can call it.
    fn proc_decl(&mut self) -> Result<(), CompileError> {
        self.expect(Token::Procedure, "'procedure'")?;
        let (name, span) = self.expect_ident("procedure name")?;
        self.expect(Token::Semicolon, "';' after procedure name")?;

        let level = self.scopes.level();
        self.scopes
            .define_procedure(&name, self.code.len())
            .map_err(|kind| kind.at(span))?;

        let label = self.quads.new_label();
        self.quads
            .emit(QuadOp::Proc, Some(name.clone()), None, Some(label));

        self.scopes.enter_scope();
        self.block(Some((level, &name)))?;
        self.scopes
            .exit_scope()
            .map_err(|kind| kind.at(self.here()))?;
        self.quads.emit(QuadOp::Ret, None, None, None);

        tracing::debug!(procedure = %name, level, "procedure compiled");

        self.expect(Token::Semicolon, "';' after procedure body")
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn statement(&mut self) -> Result<(), CompileError> {
        match self.peek() {
            Some(Token::Ident(_)) => self.assignment(),
            Some(Token::Call) => self.call(),
            Some(Token::Begin) => self.begin_end(),
            Some(Token::If) => self.if_stmt(),
            Some(Token::While) => self.while_stmt(),
            Some(Token::Read) => self.read(),
            Some(Token::Write) => self.write(),
            // empty statement
            _ => Ok(()),
        }
    }

    /// Resolves an assignable name to its `(level difference, address)`.
    fn resolve_var(&self, name: &str, span: Span) -> Result<(usize, usize), CompileError> {
        let resolved = self.scopes.lookup(name).map_err(|kind| kind.at(span))?;
        match resolved.symbol.kind {
            SymbolKind::Var { address } => Ok((resolved.depth, address)),
            other => Err(CompileErrorKind::NotAssignable {
                name: name.to_string(),
                kind: other.name(),
            }
            .at(span)),
        }
    }

    fn assignment(&mut self) -> Result<(), CompileError> {
        let (name, span) = self.expect_ident("variable name")?;
        let (level, addr) = self.resolve_var(&name, span)?;
        self.expect(Token::Becomes, "':='")?;
        let value = self.expression()?;
        self.emit(Instruction::Sto { level, addr });
        self.quads.emit(QuadOp::Assign, Some(value), None, Some(name));
        Ok(())
    }

    fn call(&mut self) -> Result<(), CompileError> {
        self.expect(Token::Call, "'call'")?;
        let (name, span) = self.expect_ident("procedure name after 'call'")?;

        let resolved = self.scopes.lookup(&name).map_err(|kind| kind.at(span))?;
        let ins = match resolved.symbol.kind {
            SymbolKind::Procedure { entry } => Instruction::Cal {
                level: resolved.depth,
                target: entry,
            },
            other => {
                return Err(CompileErrorKind::NotCallable {
                    name,
                    kind: other.name(),
                }
                .at(span));
            }
        };

        self.emit(ins);
        self.quads.emit(QuadOp::Call, Some(name), None, None);
        Ok(())
    }

    fn begin_end(&mut self) -> Result<(), CompileError> {
        self.expect(Token::Begin, "'begin'")?;
        self.statement()?;
        while self.check(&Token::Semicolon) {
            self.advance();
            self.statement()?;
        }
        self.expect(Token::End, "';' or 'end'")
    }

    fn if_stmt(&mut self) -> Result<(), CompileError> {
        self.expect(Token::If, "'if'")?;
        let cond = self.condition()?;
        self.expect(Token::Then, "'then'")?;

        let skip = self.emit_forward(Instruction::Jpc);
        let skip_quad = self.quads.emit_jz(cond);
        self.statement()?;
        self.patch(skip)?;
        self.patch_quad(skip_quad)
    }

    fn while_stmt(&mut self) -> Result<(), CompileError> {
        self.expect(Token::While, "'while'")?;

        let top = self.code.len();
        let top_quad = self.quads.next_index();
        let cond = self.condition()?;
        self.expect(Token::Do, "'do'")?;

        let exit = self.emit_forward(Instruction::Jpc);
        let exit_quad = self.quads.emit_jz(cond);
        self.statement()?;
        self.emit(Instruction::Jmp(top));
        self.quads
            .emit(QuadOp::Jmp, None, None, Some(top_quad.to_string()));
        self.patch(exit)?;
        self.patch_quad(exit_quad)
    }

    fn read(&mut self) -> Result<(), CompileError> {
        self.expect(Token::Read, "'read'")?;
        self.expect(Token::LParen, "'(' after 'read'")?;
        let (name, span) = self.expect_ident("variable name in 'read'")?;
        let (level, addr) = self.resolve_var(&name, span)?;
        self.expect(Token::RParen, "')'")?;

        self.emit(Instruction::Red);
        self.emit(Instruction::Sto { level, addr });
        self.quads.emit(QuadOp::Read, None, None, Some(name));
        Ok(())
    }

    fn write(&mut self) -> Result<(), CompileError> {
        self.expect(Token::Write, "'write'")?;
        self.expect(Token::LParen, "'(' after 'write'")?;
        let value = self.expression()?;
        self.expect(Token::RParen, "')'")?;

        self.emit(Instruction::Wrt);
        self.quads.emit(QuadOp::Write, Some(value), None, None);
        Ok(())
    }

    // =========================================================================
    // Conditions and expressions
    // =========================================================================

    /// Returns the temporary holding the truth value.
    fn condition(&mut self) -> Result<String, CompileError> {
        if self.check(&Token::Odd) {
            self.advance();
            let value = self.expression()?;
            self.emit(Instruction::Opr(Opr::Odd));
            return Ok(self.quads.emit_temp(QuadOp::Odd, value, None));
        }

        let left = self.expression()?;
        let op = match self.peek() {
            Some(Token::Eq) => Opr::Eq,
            Some(Token::Hash) => Opr::Ne,
            Some(Token::Lt) => Opr::Lt,
            Some(Token::GtEq) => Opr::Ge,
            Some(Token::Gt) => Opr::Gt,
            Some(Token::LtEq) => Opr::Le,
            _ => return Err(self.unexpected("relational operator")),
        };
        self.advance();
        let right = self.expression()?;
        self.emit(Instruction::Opr(op));
        Ok(self.quads.emit_temp(op.into(), left, Some(right)))
    }

    fn expression(&mut self) -> Result<String, CompileError> {
        let negate = match self.peek() {
            Some(Token::Minus) => true,
            Some(Token::Plus) => false,
            _ => {
                let first = self.term()?;
                return self.expression_tail(first);
            }
        };
        self.advance();
        let mut first = self.term()?;
        if negate {
            self.emit(Instruction::Opr(Opr::Neg));
            first = self.quads.emit_temp(QuadOp::Neg, first, None);
        }
        self.expression_tail(first)
    }

    fn expression_tail(&mut self, mut left: String) -> Result<String, CompileError> {
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Opr::Add,
                Some(Token::Minus) => Opr::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.term()?;
            self.emit(Instruction::Opr(op));
            left = self.quads.emit_temp(op.into(), left, Some(right));
        }
    }

    fn term(&mut self) -> Result<String, CompileError> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Opr::Mul,
                Some(Token::Slash) => Opr::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.factor()?;
            self.emit(Instruction::Opr(op));
            left = self.quads.emit_temp(op.into(), left, Some(right));
        }
    }

    /// Constants are folded into their value; variables keep their name.
    fn factor(&mut self) -> Result<String, CompileError> {
        match self.peek() {
            Some(Token::Ident(_)) => {
                let (name, span) = self.expect_ident("identifier")?;
                let resolved = self.scopes.lookup(&name).map_err(|kind| kind.at(span))?;
                let (ins, operand) = match resolved.symbol.kind {
                    SymbolKind::Const { value } => (Instruction::Lit(value), value.to_string()),
                    SymbolKind::Var { address } => (
                        Instruction::Lod {
                            level: resolved.depth,
                            addr: address,
                        },
                        name,
                    ),
                    SymbolKind::Procedure { .. } => {
                        return Err(CompileErrorKind::ProcedureAsValue(name).at(span));
                    }
                };
                self.emit(ins);
                Ok(operand)
            }
            Some(Token::Number(n)) => {
                let n = *n;
                self.advance();
                self.emit(Instruction::Lit(n));
                Ok(n.to_string())
            }
            Some(Token::LParen) => {
                self.advance();
                let value = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(value)
            }
            _ => Err(self.unexpected("identifier, number or '('")),
        }
    }
}
