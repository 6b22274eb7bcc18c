use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};
use crate::{chunk::Chunk, value::Value, vm::VM};

/// A compiled callable unit: the top-level script, a function or a method.
#[derive(Debug, Clone)]
pub struct Function {
    /// `None` for the top-level script.
    pub name: Option<Rc<str>>,
    pub arity: usize,
    pub upvalue_count: usize,
    pub chunk: Chunk,
}

impl Function {
    pub const fn new(name: Option<Rc<str>>) -> Self {
        Self {
            name,
            arity: 0,
            upvalue_count: 0,
            chunk: Chunk::new(),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "<fn {}>", name),
            None => write!(f, "<script>"),
        }
    }
}

/// A captured variable cell.
///
/// While open it refers to a live slot on the VM's value stack; when the
/// frame owning that slot ends it is closed over a copy of the value.
#[derive(Debug, Clone)]
pub enum Upvalue {
    Open(usize),
    Closed(Value),
}

impl Upvalue {
    pub fn slot(&self) -> Option<usize> {
        match self {
            Upvalue::Open(slot) => Some(*slot),
            Upvalue::Closed(_) => None,
        }
    }
}

pub type UpvalueRef = Rc<RefCell<Upvalue>>;

pub struct Closure {
    pub function: Rc<Function>,
    pub upvalues: Box<[UpvalueRef]>,
}

impl Closure {
    pub fn new(function: Rc<Function>, upvalues: Vec<UpvalueRef>) -> Self {
        Self {function, upvalues: upvalues.into_boxed_slice()}
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Closure")
            .field("function", &self.function.to_string())
            .field("upvalues", &self.upvalues.len())
            .finish()
    }
}

pub struct LoxClass {
    pub name: Rc<str>,
    pub methods: HashMap<Rc<str>, Rc<Closure>>,
}

impl LoxClass {
    pub fn new(name: Rc<str>) -> Self {
        Self {name, methods: HashMap::new()}
    }
}

impl fmt::Debug for LoxClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut methods: Vec<&str> = self.methods.keys().map(|name| &**name).collect();
        methods.sort_unstable();
        f.debug_struct("LoxClass")
            .field("name", &self.name)
            .field("methods", &methods)
            .finish()
    }
}

pub struct LoxInstance {
    pub class: Rc<RefCell<LoxClass>>,
    pub fields: HashMap<Rc<str>, Value>,
}

impl LoxInstance {
    pub fn new(class: Rc<RefCell<LoxClass>>) -> Self {
        Self {class, fields: HashMap::new()}
    }
}

impl fmt::Debug for LoxInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut fields: Vec<&str> = self.fields.keys().map(|name| &**name).collect();
        fields.sort_unstable();
        f.debug_struct("LoxInstance")
            .field("class", &self.class.borrow().name)
            .field("fields", &fields)
            .finish()
    }
}

/// A method closure paired with the receiver it was looked up on.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: Rc<Closure>,
}

/// Host implementation of a native function. The error string becomes a runtime error.
pub type NativeFn = fn(&mut VM, &[Value]) -> Result<Value, String>;

pub struct NativeFunction {
    pub name: &'static str,
    /// Exact argument count, or when negative, up to `|arity|` arguments.
    pub arity: i32,
    pub function: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}
