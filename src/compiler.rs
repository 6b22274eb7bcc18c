use std::rc::Rc;
use indexmap::IndexMap;
use crate::{chunk::OpCode, config::Config, debug, errors::{CompileError, Diagnostic, Location}, object::Function, scanner::{Literal, Scanner, Token, TokenKind}, value::Value, vm::Inspector};

/// Marker for an error that has already been recorded as a diagnostic.
#[derive(Debug)]
struct ParseError;

type ParseResult<T = ()> = Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

/// A local variable slot. `depth` is `None` between declaration and the end of its initializer.
#[derive(Debug, Clone)]
pub struct Local<'a> {
    pub name: &'a str,
    pub depth: Option<usize>,
    pub is_captured: bool,
}

/// Where a closure finds one of its captured variables when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDescriptor {
    pub index: u8,
    /// `true` for a local slot of the enclosing function, `false` for one of its upvalues.
    pub is_local: bool,
}

struct FunctionState<'a> {
    function: Function,
    kind: FunctionKind,
    locals: Vec<Local<'a>>,
    upvalues: Vec<UpvalueDescriptor>,
    scope_depth: usize,
    // identifier constants already in the pool
    names: IndexMap<&'a str, u16>,
}

impl<'a> FunctionState<'a> {
    fn new(kind: FunctionKind, name: Option<Rc<str>>) -> Self {
        // slot 0 holds the callee, or the receiver inside methods
        let slot_zero = match kind {
            FunctionKind::Method | FunctionKind::Initializer => "this",
            FunctionKind::Script | FunctionKind::Function => "",
        };
        Self {
            function: Function::new(name),
            kind,
            locals: vec![Local {name: slot_zero, depth: Some(0), is_captured: false}],
            upvalues: vec![],
            scope_depth: 0,
            names: IndexMap::new(),
        }
    }
    fn resolve_local(&self, name: &str) -> Result<Option<usize>, &'static str> {
        for (slot, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                return match local.depth {
                    Some(_) => Ok(Some(slot)),
                    None => Err("Can't read local variable in its own initializer."),
                };
            }
        }
        Ok(None)
    }
    fn add_upvalue(&mut self, index: u8, is_local: bool, max: usize) -> Result<usize, &'static str> {
        let descriptor = UpvalueDescriptor {index, is_local};
        if let Some(existing) = self.upvalues.iter().position(|u| *u == descriptor) {
            return Ok(existing);
        }
        if self.upvalues.len() >= max {
            return Err("Too many closure variables in function.");
        }
        self.upvalues.push(descriptor);
        Ok(self.upvalues.len() - 1)
    }
}

// Walks outward through the enclosing functions. The last state is the one resolving `name`.
fn resolve_upvalue(states: &mut [FunctionState<'_>], name: &str, max: usize) -> Result<Option<usize>, &'static str> {
    let Some((current, enclosing)) = states.split_last_mut() else {
        return Ok(None);
    };
    let Some(parent) = enclosing.last_mut() else {
        return Ok(None);
    };
    if let Some(slot) = parent.resolve_local(name)? {
        parent.locals[slot].is_captured = true;
        // capture operands are a single byte
        let slot = u8::try_from(slot).map_err(|_| "Too many local variables in function.")?;
        return current.add_upvalue(slot, true, max).map(Some);
    }
    match resolve_upvalue(enclosing, name, max)? {
        Some(index) => {
            let index = u8::try_from(index).map_err(|_| "Too many closure variables in function.")?;
            current.add_upvalue(index, false, max).map(Some)
        }
        None => Ok(None),
    }
}

struct ClassState {
    has_superclass: bool,
}

/// Token cursor and error flags shared by the whole compilation.
pub struct Parser<'a> {
    pub current: Token<'a>,
    pub previous: Token<'a>,
    pub had_error: bool,
    pub panic_mode: bool,
}

impl<'a> Parser<'a> {
    fn new() -> Self {
        Self {
            current: Token::new(TokenKind::EOF, "", 0),
            previous: Token::new(TokenKind::EOF, "", 0),
            had_error: false,
            panic_mode: false,
        }
    }
}

/// Single-pass compiler from source text to a top-level [`Function`].
pub struct Compiler<'a> {
    scanner: Scanner<'a>,
    parser: Parser<'a>,
    config: &'a Config,
    functions: Vec<FunctionState<'a>>,
    classes: Vec<ClassState>,
    diagnostics: Vec<Diagnostic>,
    inspector: Option<&'a mut dyn Inspector>,
}

/// Compiles `source` with the given limits.
pub fn compile(source: &str, config: &Config) -> Result<Function, CompileError> {
    Compiler::new(source, config).compile()
}

impl<'a> Compiler<'a> {
    pub fn new(source: &'a str, config: &'a Config) -> Self {
        Self {
            scanner: Scanner::new(source),
            parser: Parser::new(),
            config,
            functions: vec![FunctionState::new(FunctionKind::Script, None)],
            classes: vec![],
            diagnostics: vec![],
            inspector: None,
        }
    }
    pub fn with_inspector(mut self, inspector: &'a mut dyn Inspector) -> Self {
        self.inspector = Some(inspector);
        self
    }
    pub fn compile(mut self) -> Result<Function, CompileError> {
        if self.config.debug.print_progress() {
            tracing::debug!("compiling");
        }
        self.advance();

        while !self.compare(TokenKind::EOF) {
            self.declaration();
        }

        let (function, _) = self.end_function();

        if self.parser.had_error {
            Err(CompileError {diagnostics: self.diagnostics})
        }
        else {
            Ok(function)
        }
    }
    fn state(&self) -> &FunctionState<'a> {
        self.functions.last().expect("compiler always has an active function")
    }
    fn state_mut(&mut self) -> &mut FunctionState<'a> {
        self.functions.last_mut().expect("compiler always has an active function")
    }
}

// parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment,  // =
    Or,          // or
    And,         // and
    Equality,    // == !=
    Comparison,  // < > <= >=
    Term,        // + -
    Factor,      // * /
    Unary,       // ! -
    Call,        // . ()
    Primary
}

impl Precedence {
    pub fn one_higher(&self) -> Self {
        use Precedence as P;
        match *self {
            P::None => P::Assignment,
            P::Assignment => P::Or,
            P::Or => P::And,
            P::And => P::Equality,
            P::Equality => P::Comparison,
            P::Comparison => P::Term,
            P::Term => P::Factor,
            P::Factor => P::Unary,
            P::Unary => P::Call,
            P::Call => P::Primary,
            P::Primary => P::Primary,
        }
    }
}

impl<'a> Compiler<'a> {
    fn advance(&mut self) {
        let next = loop {
            let token = self.scanner.scan_token();
            if let TokenKind::Error(message) = &token.kind {
                let message = message.clone();
                self.error_at(&token, &message);
            }
            else {
                break token;
            }
        };
        self.parser.previous = std::mem::replace(&mut self.parser.current, next);
    }
    fn consume(&mut self, kind: TokenKind, msg: &str) -> ParseResult {
        if self.parser.current.kind == kind {
            self.advance();
            Ok(())
        }
        else {
            Err(self.error_at_current(msg))
        }
    }
    fn compare(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        }
        else {
            false
        }
    }
    fn check(&self, kind: TokenKind) -> bool {
        self.parser.current.kind == kind
    }
    fn parse_precedence(&mut self, prec: Precedence) -> ParseResult {
        self.advance();

        let can_assign = prec <= Precedence::Assignment;
        let Some(prefix_rule) = Self::get_rule(&self.parser.previous.kind).prefix else {
            return Err(self.error("Expect expression."));
        };
        prefix_rule(self, can_assign)?;

        while prec <= Self::get_rule(&self.parser.current.kind).precedence {
            self.advance();
            if let Some(infix_rule) = Self::get_rule(&self.parser.previous.kind).infix {
                infix_rule(self, can_assign)?;
            }
        }
        if can_assign && self.compare(TokenKind::Equal) {
            return Err(self.error("Invalid assignment target."));
        }
        Ok(())
    }
    fn declaration(&mut self) {
        let result = if self.compare(TokenKind::Class) {
            self.class_declaration()
        }
        else if self.compare(TokenKind::Fun) {
            self.fun_declaration()
        }
        else if self.compare(TokenKind::Var) {
            self.var_declaration()
        }
        else {
            self.statement()
        };
        if result.is_err() || self.parser.panic_mode {
            self.synchronize();
        }
    }
    fn statement(&mut self) -> ParseResult {
        match self.parser.current.kind {
            TokenKind::For => {self.advance(); self.for_statement()},
            TokenKind::If => {self.advance(); self.if_statement()},
            TokenKind::Return => {self.advance(); self.return_statement()},
            TokenKind::While => {self.advance(); self.while_statement()},
            TokenKind::LBrace => {self.advance(); self.scoped_block()},
            _ => self.expression_statement(),
        }
    }
    fn expression_statement(&mut self) -> ParseResult {
        self.expression()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.")?;
        self.emit_byte(OpCode::POP);
        Ok(())
    }
    // var a = 1, b, c = "three";
    fn var_declaration(&mut self) -> ParseResult {
        loop {
            let global = self.parse_variable("Expect variable name.")?;
            if self.compare(TokenKind::Equal) {
                self.expression()?;
            }
            else {
                self.emit_byte(OpCode::NIL);
            }
            self.define_variable(global);
            if !self.compare(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration(s).")
    }
    fn fun_declaration(&mut self) -> ParseResult {
        let global = self.parse_variable("Expect function name.")?;
        // the body may refer to the function itself
        self.mark_initialized();
        self.function(FunctionKind::Function)?;
        self.define_variable(global);
        Ok(())
    }
    fn function(&mut self, kind: FunctionKind) -> ParseResult {
        let name: Rc<str> = Rc::from(self.parser.previous.lexeme);
        self.functions.push(FunctionState::new(kind, Some(name)));
        self.begin_scope();

        let body = self.function_body();
        let (function, upvalues) = self.end_function();

        let index = self.make_constant(Value::Function(Rc::new(function)))?;
        self.emit_byte(OpCode::CLOSURE);
        self.emit_short(index);
        for upvalue in upvalues {
            self.emit_bytes(upvalue.is_local as u8, upvalue.index);
        }
        body
    }
    fn function_body(&mut self) -> ParseResult {
        self.consume(TokenKind::LParen, "Expect '(' after function name.")?;
        if !self.check(TokenKind::RParen) {
            loop {
                self.state_mut().function.arity += 1;
                let max = self.config.max_parameters.min(u8::MAX as usize);
                if self.state().function.arity > max {
                    let msg = format!("Can't have more than {} parameters.", max);
                    self.error_at_current(&msg);
                }
                let param = self.parse_variable("Expect parameter name.")?;
                self.define_variable(param);
                if !self.compare(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after parameters.")?;
        self.consume(TokenKind::LBrace, "Expect '{' before function body.")?;
        self.block()
    }
    fn end_function(&mut self) -> (Function, Vec<UpvalueDescriptor>) {
        self.emit_return();
        let state = self.functions.pop().expect("compiler always has an active function");
        let mut function = state.function;
        function.upvalue_count = state.upvalues.len();

        if !self.parser.had_error {
            if self.config.debug.print_progress() {
                tracing::debug!(function = %function, constants = function.chunk.constants.len(), "compiled");
            }
            if self.config.debug.print_code() {
                tracing::debug!("\n{}", debug::disassemble_function(&function));
            }
            if let Some(inspector) = self.inspector.as_deref_mut() {
                let slots: Vec<&str> = state.locals.iter().map(|local| local.name).collect();
                inspector.function_compiled(&function, &slots);
            }
        }
        (function, state.upvalues)
    }
    fn class_declaration(&mut self) -> ParseResult {
        self.consume(TokenKind::Identifier, "Expect class name.")?;
        let class_name = self.parser.previous.lexeme;
        let name_constant = self.identifier_constant(class_name)?;
        self.declare_variable()?;

        self.emit_byte(OpCode::CLASS);
        self.emit_short(name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassState {has_superclass: false});
        let body = self.class_body(class_name);
        if let Some(class) = self.classes.pop() {
            if class.has_superclass {
                self.end_scope();
            }
        }
        body
    }
    fn class_body(&mut self, class_name: &'a str) -> ParseResult {
        if self.compare(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.")?;
            self.variable(false)?;
            if self.parser.previous.lexeme == class_name {
                return Err(self.error("A class can't inherit from itself."));
            }

            self.begin_scope();
            if let Some(class) = self.classes.last_mut() {
                class.has_superclass = true;
            }
            self.add_local("super")?;
            self.define_variable(0);

            self.named_variable(class_name, false)?;
            self.emit_byte(OpCode::INHERIT);
        }

        // the class stays on the stack while its methods are attached
        self.named_variable(class_name, false)?;
        self.consume(TokenKind::LBrace, "Expect '{' before class body.")?;
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::EOF) {
            self.method()?;
        }
        self.consume(TokenKind::RBrace, "Expect '}' after class body.")?;
        self.emit_byte(OpCode::POP);
        Ok(())
    }
    fn method(&mut self) -> ParseResult {
        self.consume(TokenKind::Identifier, "Expect method name.")?;
        let name = self.parser.previous.lexeme;
        let constant = self.identifier_constant(name)?;
        let kind = if name == "init" {FunctionKind::Initializer} else {FunctionKind::Method};
        self.function(kind)?;
        self.emit_byte(OpCode::METHOD);
        self.emit_short(constant);
        Ok(())
    }
    fn begin_scope(&mut self) {
        self.state_mut().scope_depth += 1;
    }
    fn scoped_block(&mut self) -> ParseResult {
        self.begin_scope();
        let result = self.block();
        self.end_scope();
        result
    }
    fn block(&mut self) -> ParseResult {
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::EOF) {
            self.declaration();
        }
        self.consume(TokenKind::RBrace, "Expect '}' after block.")
    }
    fn end_scope(&mut self) {
        self.state_mut().scope_depth -= 1;
        let depth = self.state().scope_depth;
        while let Some(local) = self.state().locals.last() {
            if local.depth.is_some_and(|d| d <= depth) {
                break;
            }
            let op = if local.is_captured {OpCode::CLOSE_UPVALUE} else {OpCode::POP};
            self.emit_byte(op);
            self.state_mut().locals.pop();
        }
    }
    fn if_statement(&mut self) -> ParseResult {
        self.consume(TokenKind::LParen, "Expect '(' after 'if'.")?;
        self.expression()?;
        self.consume(TokenKind::RParen, "Expect ')' after condition.")?;

        let then_jump = self.emit_jump(OpCode::JUMP_IF_FALSE);
        self.emit_byte(OpCode::POP);
        self.statement()?;

        let else_jump = self.emit_jump(OpCode::JUMP);
        self.patch_jump(then_jump)?;
        self.emit_byte(OpCode::POP);

        if self.compare(TokenKind::Else) {
            self.statement()?;
        }
        self.patch_jump(else_jump)
    }
    fn while_statement(&mut self) -> ParseResult {
        let loop_start = self.current_chunk_len();
        self.consume(TokenKind::LParen, "Expect '(' after 'while'.")?;
        self.expression()?;
        self.consume(TokenKind::RParen, "Expect ')' after condition.")?;

        let exit_jump = self.emit_jump(OpCode::JUMP_IF_FALSE);
        self.emit_byte(OpCode::POP);
        self.statement()?;
        self.emit_loop(loop_start)?;

        self.patch_jump(exit_jump)?;
        self.emit_byte(OpCode::POP);
        Ok(())
    }
    fn for_statement(&mut self) -> ParseResult {
        self.begin_scope();
        let result = self.for_clauses();
        self.end_scope();
        result
    }
    fn for_clauses(&mut self) -> ParseResult {
        self.consume(TokenKind::LParen, "Expect '(' after 'for'.")?;
        if self.compare(TokenKind::Semicolon) {
            // no initializer.
        }
        else if self.compare(TokenKind::Var) {
            self.var_declaration()?;
        }
        else {
            self.expression_statement()?;
        }

        let mut loop_start = self.current_chunk_len();
        let mut exit_jump = None;
        if !self.compare(TokenKind::Semicolon) {
            self.expression()?;
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.")?;
            exit_jump = Some(self.emit_jump(OpCode::JUMP_IF_FALSE));
            self.emit_byte(OpCode::POP);
        }

        if !self.compare(TokenKind::RParen) {
            let body_jump = self.emit_jump(OpCode::JUMP);
            let increment_start = self.current_chunk_len();
            self.expression()?;
            self.emit_byte(OpCode::POP);
            self.consume(TokenKind::RParen, "Expect ')' after for clauses.")?;

            self.emit_loop(loop_start)?;
            loop_start = increment_start;

            self.patch_jump(body_jump)?;
        }

        self.statement()?;
        self.emit_loop(loop_start)?;

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump)?;
            self.emit_byte(OpCode::POP);
        }
        Ok(())
    }
    fn return_statement(&mut self) -> ParseResult {
        let kind = self.state().kind;
        if kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }
        if self.compare(TokenKind::Semicolon) {
            self.emit_return();
        }
        else {
            if kind == FunctionKind::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression()?;
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.")?;
            self.emit_byte(OpCode::RETURN);
        }
        Ok(())
    }
    fn parse_variable(&mut self, msg: &str) -> ParseResult<u16> {
        self.consume(TokenKind::Identifier, msg)?;

        self.declare_variable()?;
        if self.state().scope_depth > 0 {
            return Ok(0);
        }
        self.identifier_constant(self.parser.previous.lexeme)
    }
    fn declare_variable(&mut self) -> ParseResult {
        let state = self.state();
        if state.scope_depth == 0 {
            return Ok(());
        }
        let name = self.parser.previous.lexeme;
        let duplicate = state.locals.iter().rev()
            .take_while(|local| local.depth.map_or(true, |d| d >= state.scope_depth))
            .any(|local| local.name == name);
        if duplicate {
            return Err(self.error("Already a variable with this name in this scope."));
        }
        self.add_local(name)
    }
    fn add_local(&mut self, name: &'a str) -> ParseResult {
        if self.state().locals.len() >= self.config.max_locals {
            return Err(self.error("Too many local variables in function."));
        }
        self.state_mut().locals.push(Local {name, depth: None, is_captured: false});
        Ok(())
    }
    fn mark_initialized(&mut self) {
        let state = self.state_mut();
        if state.scope_depth == 0 {
            return;
        }
        let depth = state.scope_depth;
        if let Some(local) = state.locals.last_mut() {
            local.depth = Some(depth);
        }
    }
    fn define_variable(&mut self, global: u16) {
        if self.state().scope_depth > 0 {
            // locals live in their stack slot, nothing to emit
            self.mark_initialized();
            return;
        }
        self.emit_byte(OpCode::DEFINE_GLOBAL);
        self.emit_short(global);
    }
    fn expression(&mut self) -> ParseResult {
        self.parse_precedence(Precedence::Assignment)
    }
    fn grouping(&mut self, _can_assign: bool) -> ParseResult {
        self.expression()?;
        self.consume(TokenKind::RParen, "Expect ')' after expression.")
    }
    fn unary(&mut self, _can_assign: bool) -> ParseResult {
        let oper_kind = self.parser.previous.kind.clone();
        self.parse_precedence(Precedence::Unary)?;
        match oper_kind {
            TokenKind::Minus => self.emit_byte(OpCode::NEGATE),
            TokenKind::Bang => self.emit_byte(OpCode::NOT),
            _ => unreachable!("unary rule registered for {:?}", oper_kind),
        }
        Ok(())
    }
    fn binary(&mut self, _can_assign: bool) -> ParseResult {
        let oper_kind = self.parser.previous.kind.clone();
        let rule = Self::get_rule(&oper_kind);
        self.parse_precedence(rule.precedence.one_higher())?;

        match oper_kind {
            TokenKind::Plus => self.emit_byte(OpCode::ADD),
            TokenKind::Minus => self.emit_byte(OpCode::SUBTRACT),
            TokenKind::Star => self.emit_byte(OpCode::MULTIPLY),
            TokenKind::Slash => self.emit_byte(OpCode::DIVIDE),
            TokenKind::BangEqual => self.emit_bytes(OpCode::EQUAL, OpCode::NOT),
            TokenKind::EqualEqual => self.emit_byte(OpCode::EQUAL),
            TokenKind::Greater => self.emit_byte(OpCode::GREATER),
            TokenKind::GreaterEqual => self.emit_bytes(OpCode::LESS, OpCode::NOT),
            TokenKind::Less => self.emit_byte(OpCode::LESS),
            TokenKind::LessEqual => self.emit_bytes(OpCode::GREATER, OpCode::NOT),
            _ => unreachable!("binary rule registered for {:?}", oper_kind),
        }
        Ok(())
    }
    fn call(&mut self, _can_assign: bool) -> ParseResult {
        let arg_count = self.argument_list()?;
        self.emit_bytes(OpCode::CALL, arg_count);
        Ok(())
    }
    fn argument_list(&mut self) -> ParseResult<u8> {
        let max = self.config.max_arguments.min(u8::MAX as usize);
        let mut arg_count: usize = 0;
        if !self.check(TokenKind::RParen) {
            loop {
                self.expression()?;
                if arg_count == max {
                    let msg = format!("Can't have more than {} arguments.", max);
                    self.error(&msg);
                }
                arg_count += 1;

                if !self.compare(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after arguments.")?;
        Ok(arg_count.min(u8::MAX as usize) as u8)
    }
    fn dot(&mut self, can_assign: bool) -> ParseResult {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.")?;
        let name = self.identifier_constant(self.parser.previous.lexeme)?;

        if can_assign && self.compare(TokenKind::Equal) {
            self.expression()?;
            self.emit_byte(OpCode::SET_PROPERTY);
            self.emit_short(name);
        }
        else if self.compare(TokenKind::LParen) {
            let arg_count = self.argument_list()?;
            self.emit_byte(OpCode::INVOKE);
            self.emit_short(name);
            self.emit_byte(arg_count);
        }
        else {
            self.emit_byte(OpCode::GET_PROPERTY);
            self.emit_short(name);
        }
        Ok(())
    }
    fn and(&mut self, _can_assign: bool) -> ParseResult {
        let end_jump = self.emit_jump(OpCode::JUMP_IF_FALSE);
        self.emit_byte(OpCode::POP);
        self.parse_precedence(Precedence::And)?;
        self.patch_jump(end_jump)
    }
    fn or(&mut self, _can_assign: bool) -> ParseResult {
        let else_jump = self.emit_jump(OpCode::JUMP_IF_FALSE);
        let end_jump = self.emit_jump(OpCode::JUMP);
        self.patch_jump(else_jump)?;
        self.emit_byte(OpCode::POP);
        self.parse_precedence(Precedence::Or)?;
        self.patch_jump(end_jump)
    }
    fn this(&mut self, _can_assign: bool) -> ParseResult {
        if self.classes.is_empty() {
            return Err(self.error("Can't use 'this' outside of a class."));
        }
        self.variable(false)
    }
    fn super_(&mut self, _can_assign: bool) -> ParseResult {
        match self.classes.last() {
            None => return Err(self.error("Can't use 'super' outside of a class.")),
            Some(class) if !class.has_superclass => {
                return Err(self.error("Can't use 'super' in a class with no superclass."));
            }
            Some(_) => {}
        }
        self.consume(TokenKind::Dot, "Expect '.' after 'super'.")?;
        self.consume(TokenKind::Identifier, "Expect superclass method name.")?;
        let name = self.identifier_constant(self.parser.previous.lexeme)?;

        self.named_variable("this", false)?;
        if self.compare(TokenKind::LParen) {
            let arg_count = self.argument_list()?;
            self.named_variable("super", false)?;
            self.emit_byte(OpCode::SUPER_INVOKE);
            self.emit_short(name);
            self.emit_byte(arg_count);
        }
        else {
            self.named_variable("super", false)?;
            self.emit_byte(OpCode::GET_SUPER);
            self.emit_short(name);
        }
        Ok(())
    }
    fn variable(&mut self, can_assign: bool) -> ParseResult {
        self.named_variable(self.parser.previous.lexeme, can_assign)
    }
    fn named_variable(&mut self, name: &'a str, can_assign: bool) -> ParseResult {
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(name)? {
            (OpCode::GET_LOCAL, OpCode::SET_LOCAL, slot as u16)
        }
        else if let Some(index) = self.resolve_upvalue(name)? {
            (OpCode::GET_UPVALUE, OpCode::SET_UPVALUE, index as u16)
        }
        else {
            // globals are looked up by name at run time
            let constant = self.identifier_constant(name)?;
            (OpCode::GET_GLOBAL, OpCode::SET_GLOBAL, constant)
        };

        if can_assign && self.compare(TokenKind::Equal) {
            self.expression()?;
            self.emit_byte(set_op);
        }
        else {
            self.emit_byte(get_op);
        }
        self.emit_short(arg);
        Ok(())
    }
    fn resolve_local(&mut self, name: &str) -> ParseResult<Option<usize>> {
        let resolved = self.state().resolve_local(name);
        resolved.map_err(|msg| self.error(msg))
    }
    fn resolve_upvalue(&mut self, name: &str) -> ParseResult<Option<usize>> {
        let resolved = resolve_upvalue(&mut self.functions, name, self.config.max_upvalues);
        resolved.map_err(|msg| self.error(msg))
    }
    fn number(&mut self, _can_assign: bool) -> ParseResult {
        let Some(Literal::Number(value)) = self.parser.previous.literal else {
            return Err(self.error("Invalid number literal."));
        };
        self.emit_constant(Value::Number(value))
    }
    fn string(&mut self, _can_assign: bool) -> ParseResult {
        let Some(Literal::Str(contents)) = self.parser.previous.literal else {
            return Err(self.error("Invalid string literal."));
        };
        self.emit_constant(Value::Str(Rc::from(contents)))
    }
    fn literal(&mut self, _can_assign: bool) -> ParseResult {
        let op = match self.parser.previous.kind {
            TokenKind::True => OpCode::TRUE,
            TokenKind::False => OpCode::FALSE,
            TokenKind::Nil => OpCode::NIL,
            _ => unreachable!("literal rule registered for {:?}", self.parser.previous.kind),
        };
        self.emit_byte(op);
        Ok(())
    }
    fn synchronize(&mut self) {
        self.parser.panic_mode = false;
        while self.parser.current.kind != TokenKind::EOF {
            if self.parser.previous.kind == TokenKind::Semicolon {return;}
            match self.parser.current.kind {
                TokenKind::Class | TokenKind::Fun | TokenKind::Var | TokenKind::For
                | TokenKind::If | TokenKind::While | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }
}

// emitting bytes
impl<'a> Compiler<'a> {
    fn current_chunk_len(&self) -> usize {
        self.state().function.chunk.len()
    }
    fn emit_byte(&mut self, byte: u8) {
        let line = self.parser.previous.line;
        self.state_mut().function.chunk.write(byte, line);
    }
    fn emit_bytes(&mut self, byte1: u8, byte2: u8) {
        self.emit_byte(byte1);
        self.emit_byte(byte2);
    }
    fn emit_short(&mut self, value: u16) {
        let line = self.parser.previous.line;
        self.state_mut().function.chunk.write_short(value, line);
    }
    fn emit_return(&mut self) {
        if self.state().kind == FunctionKind::Initializer {
            self.emit_byte(OpCode::GET_LOCAL);
            self.emit_short(0);
        }
        else {
            self.emit_byte(OpCode::NIL);
        }
        self.emit_byte(OpCode::RETURN);
    }
    fn make_constant(&mut self, value: Value) -> ParseResult<u16> {
        if self.state().function.chunk.constants.len() >= self.config.max_constants {
            return Err(self.error("Too many constants in one chunk."));
        }
        let index = self.state_mut().function.chunk.add_constant(value);
        Ok(index as u16)
    }
    fn identifier_constant(&mut self, name: &'a str) -> ParseResult<u16> {
        if let Some(index) = self.state().names.get(name) {
            return Ok(*index);
        }
        let index = self.make_constant(Value::Str(Rc::from(name)))?;
        self.state_mut().names.insert(name, index);
        Ok(index)
    }
    fn emit_constant(&mut self, value: Value) -> ParseResult {
        let index = self.make_constant(value)?;
        self.emit_byte(OpCode::CONSTANT);
        self.emit_short(index);
        Ok(())
    }
    // Emits `instruction` with a placeholder operand and returns the operand's offset.
    fn emit_jump(&mut self, instruction: u8) -> usize {
        self.emit_byte(instruction);
        self.emit_short(0xFFFF);
        self.current_chunk_len() - 2
    }
    fn patch_jump(&mut self, offset: usize) -> ParseResult {
        // -2 skips the operand itself
        let jump = self.current_chunk_len() - offset - 2;
        if jump > self.config.max_jump {
            return Err(self.error("Too much code to jump over."));
        }
        self.state_mut().function.chunk.patch_short(offset, jump as u16);
        Ok(())
    }
    fn emit_loop(&mut self, loop_start: usize) -> ParseResult {
        self.emit_byte(OpCode::LOOP);
        let offset = self.current_chunk_len() - loop_start + 2;
        if offset > self.config.max_loop {
            return Err(self.error("Loop body too large."));
        }
        self.emit_short(offset as u16);
        Ok(())
    }
}

type ParseFn<'a> = fn(&mut Compiler<'a>, bool) -> ParseResult;

#[derive(Clone, Copy)]
struct ParseRule<'a> {
    prefix: Option<ParseFn<'a>>,
    infix: Option<ParseFn<'a>>,
    precedence: Precedence,
}

impl<'a> ParseRule<'a> {
    const fn new(prefix: Option<ParseFn<'a>>, infix: Option<ParseFn<'a>>, precedence: Precedence) -> Self {
        Self {prefix, infix, precedence}
    }
}

impl<'a> Compiler<'a> {
    fn get_rule(kind: &TokenKind) -> ParseRule<'a> {
        use TokenKind as TK;
        use Precedence as P;
        match kind {
            TK::LParen => ParseRule::new(Some(Self::grouping), Some(Self::call), P::Call),
            TK::Dot => ParseRule::new(None, Some(Self::dot), P::Call),
            TK::Minus => ParseRule::new(Some(Self::unary), Some(Self::binary), P::Term),
            TK::Plus => ParseRule::new(None, Some(Self::binary), P::Term),
            TK::Slash | TK::Star => ParseRule::new(None, Some(Self::binary), P::Factor),
            TK::Bang => ParseRule::new(Some(Self::unary), None, P::None),
            TK::BangEqual | TK::EqualEqual => ParseRule::new(None, Some(Self::binary), P::Equality),
            TK::Greater | TK::GreaterEqual | TK::Less | TK::LessEqual => {
                ParseRule::new(None, Some(Self::binary), P::Comparison)
            }
            TK::Identifier => ParseRule::new(Some(Self::variable), None, P::None),
            TK::String => ParseRule::new(Some(Self::string), None, P::None),
            TK::Number => ParseRule::new(Some(Self::number), None, P::None),
            TK::And => ParseRule::new(None, Some(Self::and), P::And),
            TK::Or => ParseRule::new(None, Some(Self::or), P::Or),
            TK::True | TK::False | TK::Nil => ParseRule::new(Some(Self::literal), None, P::None),
            TK::Super => ParseRule::new(Some(Self::super_), None, P::None),
            TK::This => ParseRule::new(Some(Self::this), None, P::None),
            _ => ParseRule::new(None, None, P::None),
        }
    }
}

// error handling
impl<'a> Compiler<'a> {
    fn error_at_current(&mut self, msg: &str) -> ParseError {
        let token = self.parser.current.clone();
        self.error_at(&token, msg)
    }
    fn error(&mut self, msg: &str) -> ParseError {
        let token = self.parser.previous.clone();
        self.error_at(&token, msg)
    }
    fn error_at(&mut self, token: &Token<'a>, msg: &str) -> ParseError {
        self.parser.had_error = true;
        if self.parser.panic_mode {
            return ParseError;
        }
        self.parser.panic_mode = true;
        let location = match token.kind {
            TokenKind::EOF => Location::End,
            TokenKind::Error(_) => Location::Scanner,
            _ => Location::Lexeme(token.lexeme.to_string()),
        };
        let diagnostic = Diagnostic {line: token.line, location, message: msg.to_string()};
        tracing::debug!(%diagnostic, "compile error");
        self.diagnostics.push(diagnostic);
        ParseError
    }
}
