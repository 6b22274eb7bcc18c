use crate::value::Value;

macro_rules! generate_opcode {
    ($n:expr;) => {};
    ($n:expr; $name:ident $(, $rest:ident)*) => {
        pub const $name: u8 = $n;

        generate_opcode!($n + 1; $($rest),*);
    };

    ($($names:ident),+ $(,)?) => {
        pub struct OpCode;
        impl OpCode {
            generate_opcode!(0; $($names),*);

            const NAMES: &'static [&'static str] = &[$(concat!("OP_", stringify!($names))),*];

            /// Mnemonic of an opcode byte, `None` for bytes that are not opcodes.
            pub fn name(op: u8) -> Option<&'static str> {
                Self::NAMES.get(op as usize).copied()
            }
        }
    };
}

generate_opcode!(
    CONSTANT,
    NIL, TRUE, FALSE,
    POP,
    GET_LOCAL, SET_LOCAL,
    GET_GLOBAL, DEFINE_GLOBAL, SET_GLOBAL,
    GET_UPVALUE, SET_UPVALUE,
    GET_PROPERTY, SET_PROPERTY,
    GET_SUPER,
    EQUAL, GREATER, LESS,
    ADD, SUBTRACT, MULTIPLY, DIVIDE,
    NOT, NEGATE,
    JUMP, JUMP_IF_FALSE, LOOP,
    CALL, INVOKE, SUPER_INVOKE,
    CLOSURE, CLOSE_UPVALUE,
    RETURN,
    CLASS, INHERIT, METHOD,
);

#[derive(Debug, Clone, PartialEq)]
struct LineEncoding {
    amount: u32,
    line: u32,
}

/// Bytecode for one function: code bytes, a run-length encoded line table
/// parallel to the code, and the constant pool.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Value>,
    lines: Vec<LineEncoding>,
}

impl Chunk {
    pub const fn new() -> Self {
        Self {
            code: vec![],
            constants: vec![],
            lines: vec![],
        }
    }
    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.add_line(line);
    }
    pub fn write_short(&mut self, value: u16, line: u32) {
        let [high, low] = value.to_be_bytes();
        self.write(high, line);
        self.write(low, line);
    }
    /// Appends a constant and returns its index in the pool.
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }
    pub fn read_short(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }
    /// Overwrites the two operand bytes at `offset`, used when backpatching jumps.
    pub fn patch_short(&mut self, offset: usize, value: u16) {
        let [high, low] = value.to_be_bytes();
        self.code[offset] = high;
        self.code[offset + 1] = low;
    }
    pub fn len(&self) -> usize {
        self.code.len()
    }
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Source line of the byte at `i`, 0 when out of range.
    pub fn line(&self, i: usize) -> u32 {
        let mut current_line: u32 = 0;
        for l in &self.lines {
            current_line += l.amount;
            if current_line as usize > i {
                return l.line;
            }
        }
        0
    }
    fn add_line(&mut self, line: u32) {
        if let Some(last) = self.lines.last_mut() {
            if last.line == line {
                last.amount += 1;
                return;
            }
        }
        self.lines.push(LineEncoding{amount: 1, line});
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Chunk::new()
    }
}
