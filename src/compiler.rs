//! # Single-Pass Pratt Compiler
//!
//! Parses source tokens and emits bytecode in the same pass — there is no
//! separate AST. Precedence climbing (`parse_precedence`) drives a table of
//! per-token-kind `{prefix, infix, precedence}` rules ([`get_rule`]);
//! statement parsing is straight recursive descent.
//!
//! Nested function compilation is modeled as a stack of [`FunctionScope`]s
//! (`Compiler::functions`) rather than a chain of enclosing-pointer structs:
//! compiling a nested function pushes a new scope, compiles its body against
//! it, then pops it back off once its bytecode is folded into a `CLOSURE`
//! instruction in the parent scope's chunk. This keeps local/upvalue
//! resolution (which must walk "outward" through enclosing scopes) as plain
//! indexing into `self.functions` instead of unsafe enclosing pointers.

use std::io::Write;

use crate::chunk::OpCode;
use crate::object::ObjRef;
use crate::scanner::{Scanner, Token, TokenKind};
use crate::value::Value;
use crate::vm::Vm;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum FunctionType {
    Script,
    Function,
    Method,
    Initializer,
}

struct Local {
    name: String,
    /// -1 means "declared but not yet initialized" (a read is a compile
    /// error: reading a local in its own initializer).
    depth: i32,
    is_captured: bool,
}

struct UpvalueDesc {
    index: u8,
    is_local: bool,
}

/// Per-function compiler state, one per nested `fun`/method currently being
/// compiled. `Compiler::functions` is a stack of these, innermost last.
struct FunctionScope {
    function: ObjRef, // ObjFunction
    ftype: FunctionType,
    locals: Vec<Local>,
    upvalues: Vec<UpvalueDesc>,
    scope_depth: i32,
}

/// Marks that we are compiling inside a class body, so `this` may resolve.
/// The language has no inheritance, so unlike clox's `ClassCompiler` there
/// is no `has_superclass` flag to track — the stack depth alone is the
/// nesting marker `this`-resolution needs.
struct ClassCompiler;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(u8)]
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
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn<'src, 'vm, 'out> = fn(&mut Compiler<'src, 'vm, 'out>, bool);

struct ParseRule<'src, 'vm, 'out> {
    prefix: Option<ParseFn<'src, 'vm, 'out>>,
    infix: Option<ParseFn<'src, 'vm, 'out>>,
    precedence: Precedence,
}

pub struct Compiler<'src, 'vm, 'out> {
    scanner: Scanner<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    vm: &'vm mut Vm,
    out: &'out mut dyn Write,
    functions: Vec<FunctionScope>,
    classes: Vec<ClassCompiler>,
}

/// Compile `source` into a top-level script function. Returns `None` if any
/// compile error was reported (diagnostics already written to `out`);
/// compile errors are accumulated, not fail-fast.
///
/// On success, the returned [`ObjRef`] remains anchored in
/// `vm.compiler_roots` until the caller has rooted it some other way (the
/// VM stack, typically) — see `Vm::interpret`.
pub fn compile(vm: &mut Vm, source: &[u8], out: &mut dyn Write) -> Option<ObjRef> {
    let mut c = Compiler {
        scanner: Scanner::new(source),
        previous: Token {
            kind: TokenKind::Eof,
            lexeme: &[],
            line: 0,
        },
        current: Token {
            kind: TokenKind::Eof,
            lexeme: &[],
            line: 0,
        },
        had_error: false,
        panic_mode: false,
        vm,
        out,
        functions: Vec::new(),
        classes: Vec::new(),
    };

    c.begin_function_scope(FunctionType::Script, None);
    c.advance();
    while !c.check(TokenKind::Eof) {
        c.declaration();
    }

    let scope = c.end_function_scope();
    if c.had_error {
        c.vm.compiler_roots.pop();
        None
    } else {
        Some(scope.function)
    }
}

impl<'src, 'vm, 'out> Compiler<'src, 'vm, 'out> {
    // --- Token stream -----------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let msg = self.current.lexeme_str().to_string();
            self.error_at_current(&msg);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_tok(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    // --- Error reporting ----------------------------------------------

    fn error_at_current(&mut self, message: &str) {
        let tok = self.current;
        self.error_at(tok, message);
    }

    fn error(&mut self, message: &str) {
        let tok = self.previous;
        self.error_at(tok, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let _ = write!(self.out, "[line {}] Error", token.line);
        if token.kind == TokenKind::Eof {
            let _ = write!(self.out, " at end");
        } else if token.kind == TokenKind::Error {
            // Nothing extra: the lexeme already is the diagnostic text.
        } else {
            let _ = write!(self.out, " at '{}'", token.lexeme_str());
        }
        let _ = writeln!(self.out, ": {}", message);
        self.had_error = true;
    }

    /// Skip tokens until a likely statement boundary, so a single malformed
    /// construct doesn't cascade into a wall of spurious diagnostics.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    // --- Emission -------------------------------------------------------

    fn current_line(&self) -> u32 {
        self.previous.line
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.current_line();
        self.functions.last_mut().unwrap().function.as_function_mut().chunk.write_byte(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_op_byte(&mut self, op: OpCode, b: u8) {
        self.emit_byte(op as u8);
        self.emit_byte(b);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.functions.last_mut().unwrap().function.as_function_mut().chunk.add_constant(value) {
            Some(ix) => ix,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let ix = self.make_constant(value);
        self.emit_op_byte(OpCode::Constant, ix);
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.functions.last().unwrap().function.as_function().chunk.code_len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let chunk_len = self.functions.last().unwrap().function.as_function().chunk.code_len();
        let jump = chunk_len - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        let bytes = (jump as u16).to_be_bytes();
        let chunk = &mut self.functions.last_mut().unwrap().function.as_function_mut().chunk;
        chunk.code[offset] = bytes[0];
        chunk.code[offset + 1] = bytes[1];
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let chunk_len = self.functions.last().unwrap().function.as_function().chunk.code_len();
        let offset = chunk_len - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        let bytes = (offset as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
    }

    fn emit_return(&mut self) {
        if self.functions.last().unwrap().ftype == FunctionType::Initializer {
            self.emit_op_byte(OpCode::GetLocal, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    // --- Scope management -----------------------------------------------

    fn begin_function_scope(&mut self, ftype: FunctionType, name: Option<&str>) {
        let function = self.vm.new_function();
        self.vm.compiler_roots.push(function);
        if let Some(n) = name {
            let interned = self.vm.intern(n);
            function.as_function_mut().name = Some(interned);
        }
        // Slot 0 is reserved: `this` in methods/initializers, otherwise
        // anonymous (it holds the enclosing closure itself).
        let slot0_name = if ftype == FunctionType::Method || ftype == FunctionType::Initializer {
            "this"
        } else {
            ""
        };
        self.functions.push(FunctionScope {
            function,
            ftype,
            locals: vec![Local {
                name: slot0_name.to_string(),
                depth: 0,
                is_captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
        });
    }

    /// Finishes the innermost function scope: emits the implicit return,
    /// pops it off `self.functions`, and records its resolved upvalue
    /// count. Does **not** pop `vm.compiler_roots` — the caller must do
    /// that only once the function is anchored elsewhere (embedded as a
    /// constant in the parent chunk, or rooted on the VM stack for the
    /// top-level script).
    fn end_function_scope(&mut self) -> FunctionScope {
        self.emit_return();
        let scope = self.functions.pop().unwrap();
        scope.function.as_function_mut().upvalue_count = scope.upvalues.len();

        #[cfg(feature = "trace")]
        {
            if !self.had_error {
                let name = scope
                    .function
                    .as_function()
                    .name
                    .map(|n| n.as_str().to_string())
                    .unwrap_or_else(|| "<script>".to_string());
                crate::debug::disassemble_chunk(&scope.function.as_function().chunk, &name);
            }
        }

        scope
    }

    fn begin_scope(&mut self) {
        self.functions.last_mut().unwrap().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let depth = {
            let f = self.functions.last_mut().unwrap();
            f.scope_depth -= 1;
            f.scope_depth
        };
        loop {
            let should_pop = {
                let f = self.functions.last().unwrap();
                matches!(f.locals.last(), Some(l) if l.depth > depth)
            };
            if !should_pop {
                break;
            }
            let captured = self.functions.last().unwrap().locals.last().unwrap().is_captured;
            if captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.functions.last_mut().unwrap().locals.pop();
        }
    }

    // --- Variables --------------------------------------------------

    fn identifier_constant(&mut self, token: Token<'src>) -> u8 {
        let s = token.lexeme_str().to_string();
        let r = self.vm.intern(&s);
        self.make_constant(Value::Obj(r))
    }

    fn resolve_local(&self, scope_idx: usize, name: &str) -> Option<u8> {
        let locals = &self.functions[scope_idx].locals;
        for (i, local) in locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == -1 {
                    // Can't report here (self.error needs &mut self); the
                    // caller checks for this sentinel via `depth_of`.
                    return Some(i as u8);
                }
                return Some(i as u8);
            }
        }
        None
    }

    fn local_is_uninitialized(&self, scope_idx: usize, slot: u8) -> bool {
        self.functions[scope_idx].locals[slot as usize].depth == -1
    }

    fn resolve_upvalue(&mut self, scope_idx: usize, name: &str) -> Option<u8> {
        if scope_idx == 0 {
            return None;
        }
        let enclosing_idx = scope_idx - 1;
        if let Some(local_slot) = self.resolve_local(enclosing_idx, name) {
            self.functions[enclosing_idx].locals[local_slot as usize].is_captured = true;
            return Some(self.add_upvalue(scope_idx, local_slot, true));
        }
        if let Some(up_slot) = self.resolve_upvalue(enclosing_idx, name) {
            return Some(self.add_upvalue(scope_idx, up_slot, false));
        }
        None
    }

    fn add_upvalue(&mut self, scope_idx: usize, index: u8, is_local: bool) -> u8 {
        let upvalues = &mut self.functions[scope_idx].upvalues;
        for (i, up) in upvalues.iter().enumerate() {
            if up.index == index && up.is_local == is_local {
                return i as u8;
            }
        }
        if upvalues.len() == 256 {
            self.error("Too many closure variables in function.");
            return 0;
        }
        upvalues.push(UpvalueDesc { index, is_local });
        (upvalues.len() - 1) as u8
    }

    fn declare_variable(&mut self) {
        let scope_idx = self.functions.len() - 1;
        if self.functions[scope_idx].scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme_str().to_string();
        let depth = self.functions[scope_idx].scope_depth;
        let dup = self.functions[scope_idx]
            .locals
            .iter()
            .rev()
            .take_while(|l| l.depth == -1 || l.depth >= depth)
            .any(|l| l.depth >= depth && l.name == name);
        if dup {
            self.error("Already a variable with this name in this scope.");
            return;
        }
        self.add_local(name);
    }

    fn add_local(&mut self, name: String) {
        let scope = self.functions.last_mut().unwrap();
        if scope.locals.len() == 256 {
            self.error("Too many local variables in function.");
            return;
        }
        scope.locals.push(Local {
            name,
            depth: -1,
            is_captured: false,
        });
    }

    fn mark_initialized(&mut self) {
        let scope = self.functions.last_mut().unwrap();
        if scope.scope_depth == 0 {
            return;
        }
        let depth = scope.scope_depth;
        scope.locals.last_mut().unwrap().depth = depth;
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.functions.last().unwrap().scope_depth > 0 {
            return 0;
        }
        let tok = self.previous;
        self.identifier_constant(tok)
    }

    fn define_variable(&mut self, global: u8) {
        if self.functions.last().unwrap().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op_byte(OpCode::DefineGlobal, global);
    }

    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let scope_idx = self.functions.len() - 1;
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(scope_idx, name.lexeme_str()) {
            if self.local_is_uninitialized(scope_idx, slot) {
                self.error("Can't read local variable in its own initializer.");
            }
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue(scope_idx, name.lexeme_str()) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, slot)
        } else {
            let ix = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, ix)
        };

        if can_assign && self.match_tok(TokenKind::Equal) {
            self.expression();
            self.emit_op_byte(set_op, arg);
        } else {
            self.emit_op_byte(get_op, arg);
        }
    }

    // --- Expressions ------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = get_rule(self.previous.kind).prefix;
        let prefix = match prefix {
            Some(f) => f,
            None => {
                self.error("Expect expression.");
                return;
            }
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            let infix = get_rule(self.previous.kind).infix.unwrap();
            infix(self, can_assign);
        }

        if can_assign && self.match_tok(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn number(&mut self, _can_assign: bool) {
        let n: f64 = self.previous.lexeme_str().parse().expect("scanner guarantees well-formed numbers");
        self.emit_constant(Value::Number(n));
    }

    fn string_lit(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme_str();
        let inner = &lexeme[1..lexeme.len() - 1];
        let r = self.vm.intern(inner);
        self.emit_constant(Value::Obj(r));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => unreachable!(),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let tok = self.previous;
        self.named_variable(tok, can_assign);
    }

    fn this(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        let tok = self.previous;
        self.named_variable(tok, false);
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let op = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match op {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!(),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let op = self.previous.kind;
        let rule = get_rule(op);
        self.parse_precedence(rule.precedence.next());
        match op {
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => unreachable!(),
        }
    }

    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self, _can_assign: bool) {
        let argc = self.argument_list();
        self.emit_op_byte(OpCode::Call, argc);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let tok = self.previous;
        let name = self.identifier_constant(tok);

        if can_assign && self.match_tok(TokenKind::Equal) {
            self.expression();
            self.emit_op_byte(OpCode::SetProperty, name);
        } else if self.match_tok(TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.emit_op_byte(OpCode::Invoke, name);
            self.emit_byte(argc);
        } else {
            self.emit_op_byte(OpCode::GetProperty, name);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u16 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_tok(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count as u8
    }

    // --- Statements -------------------------------------------------

    fn declaration(&mut self) {
        if self.match_tok(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_tok(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_tok(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let name_tok = self.previous;
        let name_constant = self.identifier_constant(name_tok);
        self.declare_variable();

        self.emit_op_byte(OpCode::Class, name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassCompiler);

        self.named_variable(name_tok, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_op(OpCode::Pop);

        self.classes.pop();
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let tok = self.previous;
        let constant = self.identifier_constant(tok);
        let ftype = if tok.lexeme_str() == "init" {
            FunctionType::Initializer
        } else {
            FunctionType::Method
        };
        self.function(ftype);
        self.emit_op_byte(OpCode::Method, constant);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn function(&mut self, ftype: FunctionType) {
        let name = self.previous.lexeme_str().to_string();
        self.begin_function_scope(ftype, Some(&name));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                let arity = self.functions.last().unwrap().function.as_function().arity;
                if arity == 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                self.functions.last().unwrap().function.as_function_mut().arity = arity + 1;
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_tok(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let scope = self.end_function_scope();
        let const_ix = self.make_constant(Value::Obj(scope.function));
        self.emit_op_byte(OpCode::Closure, const_ix);
        for up in &scope.upvalues {
            self.emit_byte(if up.is_local { 1 } else { 0 });
            self.emit_byte(up.index);
        }
        self.vm.compiler_roots.pop();
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_tok(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_tok(TokenKind::Print) {
            self.print_statement();
        } else if self.match_tok(TokenKind::If) {
            self.if_statement();
        } else if self.match_tok(TokenKind::While) {
            self.while_statement();
        } else if self.match_tok(TokenKind::For) {
            self.for_statement();
        } else if self.match_tok(TokenKind::Return) {
            self.return_statement();
        } else if self.match_tok(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn return_statement(&mut self) {
        if self.functions.last().unwrap().ftype == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_tok(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.functions.last().unwrap().ftype == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_tok(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.functions.last().unwrap().function.as_function().chunk.code_len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        if self.match_tok(TokenKind::Semicolon) {
            // no initializer
        } else if self.match_tok(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.functions.last().unwrap().function.as_function().chunk.code_len();

        let mut exit_jump: Option<usize> = None;
        if !self.match_tok(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_tok(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.functions.last().unwrap().function.as_function().chunk.code_len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_op(OpCode::Pop);
        }

        self.end_scope();
    }
}

fn get_rule<'src, 'vm, 'out>(kind: TokenKind) -> ParseRule<'src, 'vm, 'out> {
    use TokenKind::*;
    let (prefix, infix, precedence): (
        Option<ParseFn<'src, 'vm, 'out>>,
        Option<ParseFn<'src, 'vm, 'out>>,
        Precedence,
    ) = match kind {
        LeftParen => (Some(Compiler::grouping), Some(Compiler::call), Precedence::Call),
        Dot => (None, Some(Compiler::dot), Precedence::Call),
        Minus => (Some(Compiler::unary), Some(Compiler::binary), Precedence::Term),
        Plus => (None, Some(Compiler::binary), Precedence::Term),
        Slash => (None, Some(Compiler::binary), Precedence::Factor),
        Star => (None, Some(Compiler::binary), Precedence::Factor),
        Bang => (Some(Compiler::unary), None, Precedence::None),
        BangEqual => (None, Some(Compiler::binary), Precedence::Equality),
        EqualEqual => (None, Some(Compiler::binary), Precedence::Equality),
        Greater => (None, Some(Compiler::binary), Precedence::Comparison),
        GreaterEqual => (None, Some(Compiler::binary), Precedence::Comparison),
        Less => (None, Some(Compiler::binary), Precedence::Comparison),
        LessEqual => (None, Some(Compiler::binary), Precedence::Comparison),
        Identifier => (Some(Compiler::variable), None, Precedence::None),
        String => (Some(Compiler::string_lit), None, Precedence::None),
        Number => (Some(Compiler::number), None, Precedence::None),
        And => (None, Some(Compiler::and_), Precedence::And),
        Or => (None, Some(Compiler::or_), Precedence::Or),
        False => (Some(Compiler::literal), None, Precedence::None),
        Nil => (Some(Compiler::literal), None, Precedence::None),
        True => (Some(Compiler::literal), None, Precedence::None),
        This => (Some(Compiler::this), None, Precedence::None),
        _ => (None, None, Precedence::None),
    };
    ParseRule { prefix, infix, precedence }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Vm;

    fn compiles(src: &str) -> bool {
        let mut vm = Vm::new();
        let mut out = Vec::new();
        let result = compile(&mut vm, src.as_bytes(), &mut out);
        vm.compiler_roots.clear();
        result.is_some()
    }

    #[test]
    fn compiles_simple_expression_statement() {
        assert!(compiles("print 1 + 2;"));
    }

    #[test]
    fn reports_error_on_unterminated_string() {
        assert!(!compiles("print \"abc;"));
    }

    #[test]
    fn reports_error_on_return_at_top_level() {
        assert!(!compiles("return 1;"));
    }

    #[test]
    fn reports_error_on_this_outside_class() {
        assert!(!compiles("print this;"));
    }

    #[test]
    fn too_many_locals_is_an_error() {
        let mut src = String::from("fun f(){\n");
        for i in 0..257 {
            src.push_str(&format!("var a{} = {};\n", i, i));
        }
        src.push_str("}\n");
        assert!(!compiles(&src));
    }

    #[test]
    fn two_hundred_fifty_six_locals_is_fine() {
        let mut src = String::from("fun f(){\n");
        for i in 0..256 {
            src.push_str(&format!("var a{} = {};\n", i, i));
        }
        src.push_str("}\n");
        assert!(compiles(&src));
    }

    #[test]
    fn too_many_params_is_an_error() {
        let params: Vec<String> = (0..256).map(|i| format!("p{}", i)).collect();
        let src = format!("fun f({}) {{}}\n", params.join(", "));
        assert!(!compiles(&src));
    }

    #[test]
    fn two_hundred_fifty_five_params_is_fine() {
        let params: Vec<String> = (0..255).map(|i| format!("p{}", i)).collect();
        let src = format!("fun f({}) {{}}\n", params.join(", "));
        assert!(compiles(&src));
    }
}
