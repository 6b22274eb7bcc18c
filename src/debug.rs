use std::fmt::Write;
use crate::{chunk::{Chunk, OpCode}, object::Function, value::Value};

/// Disassembles `function` followed by every function nested in its constant pool.
pub fn disassemble_function(function: &Function) -> String {
    let mut out = disassemble_chunk(&function.chunk, &function.to_string());
    for constant in &function.chunk.constants {
        if let Value::Function(nested) = constant {
            out.push('\n');
            out.push_str(&disassemble_function(nested));
        }
    }
    out
}

pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {} ==\n", name);
    let mut i: usize = 0;
    while i < chunk.len() {
        let (line, next) = disassemble_instruction(chunk, i);
        out.push_str(&line);
        out.push('\n');
        i = next;
    }
    out
}

/// Renders the instruction at `i` and returns it with the offset of the next instruction.
pub fn disassemble_instruction(chunk: &Chunk, i: usize) -> (String, usize) {
    let mut out = format!("{:04} ", i);
    if i > 0 && chunk.line(i) == chunk.line(i - 1) {
        out.push_str("   | ");
    }
    else {
        let _ = write!(out, "{:4} ", chunk.line(i));
    }
    let op = chunk.code[i];
    let Some(name) = OpCode::name(op) else {
        let _ = write!(out, "Unknown opcode {}", op);
        return (out, i + 1);
    };
    let next = match op {
        OpCode::CONSTANT
        | OpCode::GET_GLOBAL | OpCode::DEFINE_GLOBAL | OpCode::SET_GLOBAL
        | OpCode::GET_PROPERTY | OpCode::SET_PROPERTY | OpCode::GET_SUPER
        | OpCode::CLASS | OpCode::METHOD => constant_instruction(&mut out, name, chunk, i),
        OpCode::GET_LOCAL | OpCode::SET_LOCAL
        | OpCode::GET_UPVALUE | OpCode::SET_UPVALUE => short_instruction(&mut out, name, chunk, i),
        OpCode::CALL => byte_instruction(&mut out, name, chunk, i),
        OpCode::JUMP | OpCode::JUMP_IF_FALSE => jump_instruction(&mut out, name, 1, chunk, i),
        OpCode::LOOP => jump_instruction(&mut out, name, -1, chunk, i),
        OpCode::INVOKE | OpCode::SUPER_INVOKE => invoke_instruction(&mut out, name, chunk, i),
        OpCode::CLOSURE => closure_instruction(&mut out, name, chunk, i),
        _ => {out.push_str(name); i + 1},
    };
    (out, next)
}

fn constant_instruction(out: &mut String, name: &str, chunk: &Chunk, i: usize) -> usize {
    let constant = chunk.read_short(i + 1);
    let _ = write!(out, "{:<16} {:4} '{}'", name, constant, describe(chunk, constant));
    i + 3
}

fn short_instruction(out: &mut String, name: &str, chunk: &Chunk, i: usize) -> usize {
    let _ = write!(out, "{:<16} {:4}", name, chunk.read_short(i + 1));
    i + 3
}

fn byte_instruction(out: &mut String, name: &str, chunk: &Chunk, i: usize) -> usize {
    let _ = write!(out, "{:<16} {:4}", name, chunk.code[i + 1]);
    i + 2
}

fn jump_instruction(out: &mut String, name: &str, sign: i64, chunk: &Chunk, i: usize) -> usize {
    let jump = chunk.read_short(i + 1) as i64;
    let target = i as i64 + 3 + sign * jump;
    let _ = write!(out, "{:<16} {:4} -> {}", name, i, target);
    i + 3
}

fn invoke_instruction(out: &mut String, name: &str, chunk: &Chunk, i: usize) -> usize {
    let constant = chunk.read_short(i + 1);
    let arg_count = chunk.code[i + 3];
    let _ = write!(out, "{:<16} ({} args) {:4} '{}'", name, arg_count, constant, describe(chunk, constant));
    i + 4
}

fn closure_instruction(out: &mut String, name: &str, chunk: &Chunk, i: usize) -> usize {
    let constant = chunk.read_short(i + 1);
    let _ = write!(out, "{:<16} {:4} {}", name, constant, describe(chunk, constant));
    let mut offset = i + 3;
    let upvalue_count = match chunk.constants.get(constant as usize) {
        Some(Value::Function(function)) => function.upvalue_count,
        _ => 0,
    };
    for _ in 0..upvalue_count {
        let is_local = chunk.code[offset] != 0;
        let index = chunk.code[offset + 1];
        let _ = write!(
            out, "\n{:04}      |                     {} {}",
            offset, if is_local {"local"} else {"upvalue"}, index
        );
        offset += 2;
    }
    offset
}

fn describe(chunk: &Chunk, constant: u16) -> String {
    match chunk.constants.get(constant as usize) {
        Some(value) => value.to_string(),
        None => "<invalid constant>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compiler::compile, config::Config};

    #[test]
    fn simple_chunk_listing() {
        let mut chunk = Chunk::new();
        let constant = chunk.add_constant(Value::Number(1.2)) as u16;
        chunk.write(OpCode::CONSTANT, 123);
        chunk.write_short(constant, 123);
        chunk.write(OpCode::NEGATE, 123);
        chunk.write(OpCode::RETURN, 124);
        assert_eq!(
            disassemble_chunk(&chunk, "test"),
            "== test ==\n\
             0000  123 OP_CONSTANT         0 '1.2'\n\
             0003    | OP_NEGATE\n\
             0004  124 OP_RETURN\n"
        );
    }

    #[test]
    fn jumps_show_their_targets() {
        let mut chunk = Chunk::new();
        chunk.write(OpCode::JUMP, 1);
        chunk.write_short(2, 1);
        chunk.write(OpCode::NIL, 1);
        chunk.write(OpCode::POP, 1);
        chunk.write(OpCode::LOOP, 1);
        chunk.write_short(8, 1);
        let (line, next) = disassemble_instruction(&chunk, 0);
        assert_eq!(line, "0000    1 OP_JUMP             0 -> 5");
        assert_eq!(next, 3);
        let (line, _) = disassemble_instruction(&chunk, 5);
        assert_eq!(line, "0005    | OP_LOOP             5 -> 0");
    }

    #[test]
    fn unknown_opcode_advances_one_byte() {
        let mut chunk = Chunk::new();
        chunk.write(0xFF, 1);
        let (line, next) = disassemble_instruction(&chunk, 0);
        assert_eq!(line, "0000    1 Unknown opcode 255");
        assert_eq!(next, 1);
    }

    #[test]
    fn nested_functions_are_listed_with_captures() {
        let source = "fun outer() { var x = 1; fun inner() { return x; } return inner; }";
        let function = compile(source, &Config::default()).unwrap();
        let listing = disassemble_function(&function);
        assert!(listing.starts_with("== <script> ==\n"));
        assert!(listing.contains("== <fn outer> ==\n"));
        assert!(listing.contains("== <fn inner> ==\n"));
        assert!(listing.contains("OP_CLOSURE"));
        assert!(listing.contains("local 1"));
        assert!(listing.contains("OP_GET_UPVALUE"));
    }
}
