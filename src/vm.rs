use std::{cell::RefCell, io::{self, Write}, rc::Rc};
use indexmap::IndexMap;
use crate::{
    chunk::OpCode,
    compiler::Compiler,
    config::Config,
    debug,
    errors::{InterpretError, RuntimeError, TraceLine},
    natives,
    object::{BoundMethod, Closure, Function, LoxClass, LoxInstance, NativeFn, NativeFunction, Upvalue, UpvalueRef},
    value::Value,
};

/// One active call: the closure being run, its instruction pointer and the
/// stack index of slot 0 of its window.
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    pub base: usize,
}

/// Observation points for tooling. Every method defaults to doing nothing.
pub trait Inspector {
    /// Called once per function when its compilation finishes, with the names of its local slots.
    fn function_compiled(&mut self, _function: &Function, _locals: &[&str]) {}
    fn before_instruction(&mut self, _frame: &CallFrame, _globals: &IndexMap<Rc<str>, Value>, _stack: &[Value]) {}
}

type RunResult<T = ()> = Result<T, RuntimeError>;

pub struct VM {
    config: Config,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: IndexMap<Rc<str>, Value>,
    // sorted by slot, the highest slot last
    open_upvalues: Vec<UpvalueRef>,
    init_string: Rc<str>,
    out: Box<dyn Write>,
    inspector: Option<Box<dyn Inspector>>,
}

impl VM {
    pub fn new(config: Config) -> Self {
        let mut vm = Self {
            stack: Vec::with_capacity(config.max_stack.min(u16::MAX as usize)),
            frames: Vec::with_capacity(config.max_frames.min(u8::MAX as usize)),
            config,
            globals: IndexMap::new(),
            open_upvalues: vec![],
            init_string: Rc::from("init"),
            out: Box::new(io::stdout()),
            inspector: None,
        };
        natives::define_defaults(&mut vm);
        vm
    }
    /// Replaces the sink that `print` and `println` write to.
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }
    pub fn with_inspector(mut self, inspector: Box<dyn Inspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }
    pub fn config(&self) -> &Config {
        &self.config
    }
    pub fn output(&mut self) -> &mut dyn Write {
        &mut *self.out
    }
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }
    pub fn define_native(&mut self, name: &'static str, arity: i32, function: NativeFn) {
        let native = NativeFunction {name, arity, function};
        self.globals.insert(Rc::from(name), Value::Native(Rc::new(native)));
    }

    /// Compiles and runs `source`. Globals survive between calls, the stacks do not.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        if self.config.debug.print_source() {
            tracing::debug!("source:\n{}", source);
        }
        let function = {
            let mut compiler = Compiler::new(source, &self.config);
            if let Some(inspector) = self.inspector.as_deref_mut() {
                compiler = compiler.with_inspector(inspector);
            }
            compiler.compile()?
        };

        if self.config.debug.print_progress() {
            tracing::debug!("executing");
        }
        self.reset_stack();
        let closure = Rc::new(Closure::new(Rc::new(function), vec![]));
        self.push(Value::Closure(closure.clone()))?;
        self.call(closure, 0)?;
        self.run()?;
        Ok(())
    }

    fn reset_stack(&mut self) {
        // closures that outlive the stack keep the values they captured
        self.close_upvalues(0);
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    fn run(&mut self) -> RunResult {
        macro_rules! binary_op {
            ($wrap:expr, $oper:tt) => {{
                let (Some(a), Some(b)) = (self.peek(1).as_number(), self.peek(0).as_number()) else {
                    return Err(self.runtime_error("Operands must be numbers."));
                };
                self.pop();
                self.pop();
                self.push($wrap(a $oper b))?;
            }};
        }

        loop {
            if self.config.debug.trace_execution() {
                self.trace_instruction();
            }
            if let Some(inspector) = self.inspector.as_deref_mut() {
                let frame = &self.frames[self.frames.len() - 1];
                inspector.before_instruction(frame, &self.globals, &self.stack);
            }

            match self.read_byte() {
                OpCode::CONSTANT => {
                    let constant = self.read_constant();
                    self.push(constant)?;
                }
                OpCode::NIL => self.push(Value::Nil)?,
                OpCode::TRUE => self.push(Value::Bool(true))?,
                OpCode::FALSE => self.push(Value::Bool(false))?,
                OpCode::POP => {self.pop();}
                OpCode::GET_LOCAL => {
                    let slot = self.read_short() as usize;
                    let value = self.stack[self.frame().base + slot].clone();
                    self.push(value)?;
                }
                OpCode::SET_LOCAL => {
                    let slot = self.read_short() as usize;
                    let index = self.frame().base + slot;
                    self.stack[index] = self.peek(0).clone();
                }
                OpCode::GET_GLOBAL => {
                    let name = self.read_name()?;
                    let Some(value) = self.globals.get(&name).cloned() else {
                        return Err(self.runtime_error(format!("Undefined variable '{}'.", name)));
                    };
                    self.push(value)?;
                }
                OpCode::DEFINE_GLOBAL => {
                    let name = self.read_name()?;
                    let value = self.pop();
                    self.globals.insert(name, value);
                }
                OpCode::SET_GLOBAL => {
                    let name = self.read_name()?;
                    let value = self.peek(0).clone();
                    match self.globals.get_mut(&name) {
                        Some(global) => *global = value,
                        None => return Err(self.runtime_error(format!("Undefined variable '{}'.", name))),
                    }
                }
                OpCode::GET_UPVALUE => {
                    let index = self.read_short() as usize;
                    let upvalue = self.frame().closure.upvalues[index].clone();
                    let value = match &*upvalue.borrow() {
                        Upvalue::Open(slot) => self.stack[*slot].clone(),
                        Upvalue::Closed(value) => value.clone(),
                    };
                    self.push(value)?;
                }
                OpCode::SET_UPVALUE => {
                    let index = self.read_short() as usize;
                    let upvalue = self.frame().closure.upvalues[index].clone();
                    let value = self.peek(0).clone();
                    match &mut *upvalue.borrow_mut() {
                        Upvalue::Open(slot) => self.stack[*slot] = value,
                        Upvalue::Closed(closed) => *closed = value,
                    };
                }
                OpCode::GET_PROPERTY => {
                    let Value::Instance(instance) = self.peek(0).clone() else {
                        return Err(self.runtime_error("Only instances have properties."));
                    };
                    let name = self.read_name()?;
                    let field = instance.borrow().fields.get(&name).cloned();
                    match field {
                        Some(value) => {
                            self.pop();
                            self.push(value)?;
                        }
                        None => {
                            let class = instance.borrow().class.clone();
                            self.bind_method(&class, &name)?;
                        }
                    }
                }
                OpCode::SET_PROPERTY => {
                    let Value::Instance(instance) = self.peek(1).clone() else {
                        return Err(self.runtime_error("Only instances have fields."));
                    };
                    let name = self.read_name()?;
                    let value = self.pop();
                    instance.borrow_mut().fields.insert(name, value.clone());
                    self.pop();
                    self.push(value)?;
                }
                OpCode::GET_SUPER => {
                    let name = self.read_name()?;
                    let superclass = self.pop_class()?;
                    self.bind_method(&superclass, &name)?;
                }
                OpCode::EQUAL => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b))?;
                }
                OpCode::GREATER => binary_op!(Value::Bool, >),
                OpCode::LESS => binary_op!(Value::Bool, <),
                OpCode::ADD => {
                    let b = self.pop();
                    let a = self.pop();
                    let result = match (a, b) {
                        (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                        (Value::Str(a), Value::Str(b)) => Value::Str(Rc::from(format!("{}{}", a, b))),
                        _ => return Err(self.runtime_error("Operands must be two numbers or two strings.")),
                    };
                    self.push(result)?;
                }
                OpCode::SUBTRACT => binary_op!(Value::Number, -),
                OpCode::MULTIPLY => binary_op!(Value::Number, *),
                OpCode::DIVIDE => binary_op!(Value::Number, /),
                OpCode::NOT => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()))?;
                }
                OpCode::NEGATE => {
                    let Some(n) = self.peek(0).as_number() else {
                        return Err(self.runtime_error("Operand must be a number."));
                    };
                    self.pop();
                    self.push(Value::Number(-n))?;
                }
                OpCode::JUMP => {
                    let offset = self.read_short() as usize;
                    self.frame_mut().ip += offset;
                }
                OpCode::JUMP_IF_FALSE => {
                    let offset = self.read_short() as usize;
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                OpCode::LOOP => {
                    let offset = self.read_short() as usize;
                    self.frame_mut().ip -= offset;
                }
                OpCode::CALL => {
                    let arg_count = self.read_byte() as usize;
                    let callee = self.peek(arg_count).clone();
                    self.call_value(callee, arg_count)?;
                }
                OpCode::INVOKE => {
                    let name = self.read_name()?;
                    let arg_count = self.read_byte() as usize;
                    self.invoke(&name, arg_count)?;
                }
                OpCode::SUPER_INVOKE => {
                    let name = self.read_name()?;
                    let arg_count = self.read_byte() as usize;
                    let superclass = self.pop_class()?;
                    self.invoke_from_class(&superclass, &name, arg_count)?;
                }
                OpCode::CLOSURE => {
                    let Value::Function(function) = self.read_constant() else {
                        return Err(self.runtime_error("Expected a function constant."));
                    };
                    let mut upvalues = Vec::with_capacity(function.upvalue_count);
                    for _ in 0..function.upvalue_count {
                        let is_local = self.read_byte() != 0;
                        let index = self.read_byte() as usize;
                        let upvalue = if is_local {
                            self.capture_upvalue(self.frame().base + index)
                        }
                        else {
                            self.frame().closure.upvalues[index].clone()
                        };
                        upvalues.push(upvalue);
                    }
                    self.push(Value::Closure(Rc::new(Closure::new(function, upvalues))))?;
                }
                OpCode::CLOSE_UPVALUE => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }
                OpCode::RETURN => {
                    let result = self.pop();
                    let Some(frame) = self.frames.pop() else {
                        return Ok(());
                    };
                    self.close_upvalues(frame.base);
                    self.stack.truncate(frame.base);
                    if self.frames.is_empty() {
                        return Ok(());
                    }
                    self.push(result)?;
                }
                OpCode::CLASS => {
                    let name = self.read_name()?;
                    self.push(Value::Class(Rc::new(RefCell::new(LoxClass::new(name)))))?;
                }
                OpCode::INHERIT => {
                    let Value::Class(superclass) = self.peek(1).clone() else {
                        return Err(self.runtime_error("Superclass must be a class."));
                    };
                    let Value::Class(subclass) = self.pop() else {
                        return Err(self.runtime_error("Only classes can inherit."));
                    };
                    // a copy of the table as it is right now
                    let methods = superclass.borrow().methods.clone();
                    subclass.borrow_mut().methods.extend(methods);
                }
                OpCode::METHOD => {
                    let name = self.read_name()?;
                    let (Value::Closure(method), Value::Class(class)) = (self.peek(0).clone(), self.peek(1).clone()) else {
                        return Err(self.runtime_error("Methods can only be attached to classes."));
                    };
                    class.borrow_mut().methods.insert(name, method);
                    self.pop();
                }
                op => return Err(self.runtime_error(format!("Unknown opcode {}.", op))),
            }
        }
    }

    fn call_value(&mut self, callee: Value, arg_count: usize) -> RunResult {
        let window = self.stack.len() - arg_count - 1;
        match callee {
            Value::BoundMethod(bound) => {
                self.stack[window] = bound.receiver.clone();
                self.call(bound.method.clone(), arg_count)
            }
            Value::Class(class) => {
                let instance = LoxInstance::new(class.clone());
                self.stack[window] = Value::Instance(Rc::new(RefCell::new(instance)));
                let initializer = class.borrow().methods.get(&self.init_string).cloned();
                match initializer {
                    Some(initializer) => self.call(initializer, arg_count),
                    None if arg_count != 0 => {
                        Err(self.runtime_error(format!("Expected 0 arguments but got {}.", arg_count)))
                    }
                    None => Ok(()),
                }
            }
            Value::Closure(closure) => self.call(closure, arg_count),
            Value::Native(native) => self.call_native(&native, arg_count),
            _ => Err(self.runtime_error("Can only call functions and classes.")),
        }
    }

    fn call(&mut self, closure: Rc<Closure>, arg_count: usize) -> RunResult {
        if arg_count != closure.function.arity {
            let msg = format!("Expected {} arguments but got {}.", closure.function.arity, arg_count);
            return Err(self.runtime_error(msg));
        }
        if self.frames.len() >= self.config.max_frames {
            return Err(self.runtime_error("Stack overflow."));
        }
        let base = self.stack.len() - arg_count - 1;
        self.frames.push(CallFrame {closure, ip: 0, base});
        Ok(())
    }

    fn call_native(&mut self, native: &NativeFunction, arg_count: usize) -> RunResult {
        let arity = native.arity.unsigned_abs() as usize;
        if native.arity >= 0 && arg_count != arity {
            return Err(self.runtime_error(format!("Expected {} arguments but got {}.", arity, arg_count)));
        }
        if native.arity < 0 && arg_count > arity {
            return Err(self.runtime_error(format!("Expected up to {} argument(s) but got {}.", arity, arg_count)));
        }
        let window = self.stack.len() - arg_count - 1;
        let args: Vec<Value> = self.stack[window + 1..].to_vec();
        let result = (native.function)(self, &args).map_err(|msg| self.runtime_error(msg))?;
        self.stack.truncate(window);
        self.push(result)
    }

    fn invoke(&mut self, name: &Rc<str>, arg_count: usize) -> RunResult {
        let Value::Instance(instance) = self.peek(arg_count).clone() else {
            return Err(self.runtime_error("Only instances have methods."));
        };
        let field = instance.borrow().fields.get(name).cloned();
        if let Some(value) = field {
            let window = self.stack.len() - arg_count - 1;
            self.stack[window] = value.clone();
            return self.call_value(value, arg_count);
        }
        let class = instance.borrow().class.clone();
        self.invoke_from_class(&class, name, arg_count)
    }

    fn invoke_from_class(&mut self, class: &Rc<RefCell<LoxClass>>, name: &Rc<str>, arg_count: usize) -> RunResult {
        let method = class.borrow().methods.get(name).cloned();
        match method {
            Some(method) => self.call(method, arg_count),
            None => Err(self.runtime_error(format!("Undefined property '{}'.", name))),
        }
    }

    // Replaces the receiver on top of the stack with `name` bound to it.
    fn bind_method(&mut self, class: &Rc<RefCell<LoxClass>>, name: &Rc<str>) -> RunResult {
        let method = class.borrow().methods.get(name).cloned();
        let Some(method) = method else {
            return Err(self.runtime_error(format!("Undefined property '{}'.", name)));
        };
        let receiver = self.pop();
        self.push(Value::BoundMethod(Rc::new(BoundMethod {receiver, method})))
    }

    fn capture_upvalue(&mut self, slot: usize) -> UpvalueRef {
        let mut insert_at = self.open_upvalues.len();
        for (i, upvalue) in self.open_upvalues.iter().enumerate().rev() {
            let open_slot = upvalue.borrow().slot();
            match open_slot {
                Some(s) if s == slot => return upvalue.clone(),
                Some(s) if s < slot => break,
                _ => insert_at = i,
            }
        }
        let upvalue = Rc::new(RefCell::new(Upvalue::Open(slot)));
        self.open_upvalues.insert(insert_at, upvalue.clone());
        upvalue
    }

    fn close_upvalues(&mut self, boundary: usize) {
        while let Some(upvalue) = self.open_upvalues.last() {
            let slot = upvalue.borrow().slot();
            match slot {
                Some(slot) if slot >= boundary => {
                    let value = self.stack[slot].clone();
                    *upvalue.borrow_mut() = Upvalue::Closed(value);
                    self.open_upvalues.pop();
                }
                _ => break,
            }
        }
    }

    fn pop_class(&mut self) -> RunResult<Rc<RefCell<LoxClass>>> {
        match self.pop() {
            Value::Class(class) => Ok(class),
            _ => Err(self.runtime_error("Superclass must be a class.")),
        }
    }

    fn push(&mut self, value: Value) -> RunResult {
        if self.stack.len() >= self.config.max_stack {
            return Err(self.runtime_error("Stack overflow."));
        }
        self.stack.push(value);
        Ok(())
    }
    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or_default()
    }
    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    fn frame(&self) -> &CallFrame {
        &self.frames[self.frames.len() - 1]
    }
    fn frame_mut(&mut self) -> &mut CallFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
    fn read_byte(&mut self) -> u8 {
        let frame = self.frame_mut();
        let byte = frame.closure.function.chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }
    fn read_short(&mut self) -> u16 {
        let frame = self.frame_mut();
        let short = frame.closure.function.chunk.read_short(frame.ip);
        frame.ip += 2;
        short
    }
    fn read_constant(&mut self) -> Value {
        let index = self.read_short() as usize;
        self.frame().closure.function.chunk.constants[index].clone()
    }
    fn read_name(&mut self) -> RunResult<Rc<str>> {
        match self.read_constant() {
            Value::Str(name) => Ok(name),
            other => Err(self.runtime_error(format!("Expected a name constant, found {}.", other.type_name()))),
        }
    }

    fn trace_instruction(&self) {
        let frame = self.frame();
        let stack: String = self.stack.iter().map(|value| format!("[ {} ]", value)).collect();
        let (instruction, _) = debug::disassemble_instruction(&frame.closure.function.chunk, frame.ip);
        tracing::trace!("          {}\n{}", stack, instruction);
    }

    /// Builds the error with a trace of every active frame, then resets the stacks.
    pub fn runtime_error(&mut self, message: impl Into<String>) -> RuntimeError {
        let trace = self.frames.iter().rev()
            .map(|frame| {
                let function = &frame.closure.function;
                TraceLine {
                    line: function.chunk.line(frame.ip.saturating_sub(1)),
                    function: function.name.as_ref().map(|name| name.to_string()),
                }
            })
            .collect();
        let error = RuntimeError {message: message.into(), trace};
        tracing::debug!(message = %error.message, "runtime error");
        self.reset_stack();
        error
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
