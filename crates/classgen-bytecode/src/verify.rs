//! Bytecode verification
//!
//! Checks every method of a class file before it is loaded: instructions
//! decode cleanly, jumps and exception ranges land on instruction boundaries,
//! pool and local references are in range, the operand stack has a single
//! consistent depth at every instruction, and no path runs off the end of the
//! code.

use crate::classfile::{ClassFile, MethodInfo};
use crate::encoder::{BytecodeReader, Instruction, Operands};
use crate::opcode::Opcode;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Maximum operand stack depth accepted by the verifier
pub const MAX_STACK_DEPTH: i32 = 1024;

/// Bytecode verification errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// Instruction stream could not be decoded
    #[error("{method}: decode error: {reason}")]
    Decode {
        /// Display name of the offending method
        method: String,
        /// What went wrong
        reason: String,
    },

    /// Stack underflow
    #[error("{method}: stack underflow at offset {offset}")]
    StackUnderflow {
        /// Display name of the offending method
        method: String,
        /// Bytecode offset of the instruction
        offset: usize,
    },

    /// Stack overflow
    #[error("{method}: stack overflow at offset {offset} (depth: {depth})")]
    StackOverflow {
        /// Display name of the offending method
        method: String,
        /// Bytecode offset of the instruction
        offset: usize,
        /// Stack depth reached
        depth: i32,
    },

    /// Two paths reach an instruction with different stack depths
    #[error("{method}: inconsistent stack depth at offset {offset} ({first} vs {second})")]
    InconsistentStack {
        /// Display name of the offending method
        method: String,
        /// Bytecode offset of the instruction
        offset: usize,
        /// Depth recorded by the first path
        first: i32,
        /// Depth recorded by the conflicting path
        second: i32,
    },

    /// Invalid jump target
    #[error("{method}: invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget {
        /// Display name of the offending method
        method: String,
        /// Absolute jump target
        target: usize,
        /// Bytecode offset of the instruction
        offset: usize,
    },

    /// Invalid constant pool reference
    #[error("{method}: invalid constant pool reference {index} at offset {offset}")]
    InvalidConstantRef {
        /// Display name of the offending method
        method: String,
        /// Constant pool index
        index: u32,
        /// Bytecode offset of the instruction
        offset: usize,
    },

    /// Invalid local variable reference
    #[error("{method}: invalid local variable {index} (max {max}) at offset {offset}")]
    InvalidLocalRef {
        /// Display name of the offending method
        method: String,
        /// Local slot index
        index: usize,
        /// Number of local slots of the method
        max: usize,
        /// Bytecode offset of the instruction
        offset: usize,
    },

    /// Malformed exception table entry
    #[error("{method}: invalid exception table entry {index}")]
    InvalidExceptionEntry {
        /// Display name of the offending method
        method: String,
        /// Position in the exception table
        index: usize,
    },

    /// Execution falls off end
    #[error("{method}: execution falls off end of code at offset {offset}")]
    FallOffEnd {
        /// Display name of the offending method
        method: String,
        /// Bytecode offset of the instruction
        offset: usize,
    },

    /// Code presence does not match the abstract flag
    #[error("{method}: {reason}")]
    InvalidCode {
        /// Display name of the offending method
        method: String,
        /// What went wrong
        reason: String,
    },
}

/// Verify every method of a class file
pub fn verify_class(class: &ClassFile) -> Result<(), VerifyError> {
    for method in &class.methods {
        verify_method(method, class)?;
    }
    Ok(())
}

fn verify_method(method: &MethodInfo, class: &ClassFile) -> Result<(), VerifyError> {
    let name = format!("{}.{}{}", class.this_class, method.name, method.descriptor);

    if method.access.is_abstract() {
        if !method.code.is_empty() {
            return Err(VerifyError::InvalidCode {
                method: name,
                reason: "abstract method has code".to_string(),
            });
        }
        return Ok(());
    }
    if method.code.is_empty() {
        return Err(VerifyError::InvalidCode {
            method: name,
            reason: "method has no code".to_string(),
        });
    }
    let receiver = u16::from(!method.access.is_static());
    if method.param_count + receiver > method.max_locals {
        return Err(VerifyError::InvalidCode {
            method: name,
            reason: format!(
                "max_locals {} cannot hold {} parameters",
                method.max_locals, method.param_count
            ),
        });
    }

    let instructions = parse_instructions(&method.code, &name)?;
    let by_offset: FxHashMap<usize, usize> = instructions
        .iter()
        .enumerate()
        .map(|(i, instr)| (instr.offset, i))
        .collect();
    let code_len = method.code.len();

    // Jump targets
    for instr in &instructions {
        if let Operands::Jump(target) = instr.operands {
            if !by_offset.contains_key(&target) {
                return Err(VerifyError::InvalidJumpTarget {
                    method: name,
                    target,
                    offset: instr.offset,
                });
            }
        }
    }

    // Exception table
    for (index, entry) in method.exception_table.iter().enumerate() {
        let start = entry.start as usize;
        let end = entry.end as usize;
        let handler = entry.handler as usize;
        let end_ok = end == code_len || by_offset.contains_key(&end);
        if start >= end
            || !by_offset.contains_key(&start)
            || !end_ok
            || !by_offset.contains_key(&handler)
        {
            return Err(VerifyError::InvalidExceptionEntry {
                method: name,
                index,
            });
        }
    }

    verify_constant_refs(&instructions, class, &name)?;
    verify_local_refs(&instructions, method, &name)?;
    verify_stack_depth(&instructions, &by_offset, method, &name)?;

    Ok(())
}

fn parse_instructions(code: &[u8], method: &str) -> Result<Vec<Instruction>, VerifyError> {
    let mut instructions = Vec::new();
    let mut reader = BytecodeReader::new(code);
    while reader.has_more() {
        let instr = reader.read_instruction().map_err(|e| VerifyError::Decode {
            method: method.to_string(),
            reason: e.to_string(),
        })?;
        instructions.push(instr);
    }
    Ok(instructions)
}

/// Pool indices referenced by an instruction
fn pool_refs(operands: &Operands) -> Vec<u32> {
    match *operands {
        Operands::Pool(index) => vec![index],
        Operands::Virtual { name, .. } => vec![name],
        Operands::Qualified { class, name, .. } | Operands::Static { class, name } => {
            vec![class, name]
        }
        Operands::New { class, .. } => vec![class],
        _ => Vec::new(),
    }
}

fn verify_constant_refs(
    instructions: &[Instruction],
    class: &ClassFile,
    method: &str,
) -> Result<(), VerifyError> {
    for instr in instructions {
        for index in pool_refs(&instr.operands) {
            if class.constants.get_string(index).is_none() {
                return Err(VerifyError::InvalidConstantRef {
                    method: method.to_string(),
                    index,
                    offset: instr.offset,
                });
            }
        }
    }
    Ok(())
}

fn verify_local_refs(
    instructions: &[Instruction],
    info: &MethodInfo,
    method: &str,
) -> Result<(), VerifyError> {
    let max = info.max_locals as usize;
    for instr in instructions {
        if let Operands::Local(index) = instr.operands {
            if index as usize >= max {
                return Err(VerifyError::InvalidLocalRef {
                    method: method.to_string(),
                    index: index as usize,
                    max,
                    offset: instr.offset,
                });
            }
        }
    }
    Ok(())
}

/// Stack effect of an instruction (pops, pushes)
fn stack_effect(instr: &Instruction) -> (i32, i32) {
    match (instr.opcode, &instr.operands) {
        (Opcode::CallVirtual, Operands::Virtual { argc, .. }) => (*argc as i32 + 1, 1),
        (Opcode::CallSpecial, Operands::Qualified { argc, .. }) => (*argc as i32 + 1, 1),
        (Opcode::CallStatic, Operands::Qualified { argc, .. }) => (*argc as i32, 1),
        (Opcode::New, Operands::New { argc, .. }) => (*argc as i32, 1),
        (opcode, _) => match opcode {
            Opcode::Nop | Opcode::Jmp | Opcode::ReturnVoid => (0, 0),
            Opcode::Pop | Opcode::StoreLocal | Opcode::StoreStatic => (1, 0),
            Opcode::JmpIfFalse | Opcode::JmpIfTrue | Opcode::Return | Opcode::Throw => (1, 0),
            Opcode::Dup => (1, 2),
            Opcode::ConstNull
            | Opcode::ConstTrue
            | Opcode::ConstFalse
            | Opcode::ConstI32
            | Opcode::ConstI64
            | Opcode::ConstF64
            | Opcode::ConstStr
            | Opcode::LoadLocal
            | Opcode::LoadStatic => (0, 1),
            Opcode::Not | Opcode::LoadField => (1, 1),
            Opcode::StoreField => (2, 0),
            Opcode::Nadd
            | Opcode::Nsub
            | Opcode::Nmul
            | Opcode::Eq
            | Opcode::Ne
            | Opcode::Lt
            | Opcode::Le
            | Opcode::Gt
            | Opcode::Ge => (2, 1),
            // Calls always carry their decoded operands
            Opcode::CallVirtual | Opcode::CallSpecial | Opcode::CallStatic | Opcode::New => {
                (0, 1)
            }
        },
    }
}

/// Abstract interpretation over stack depths, following jumps and handlers
fn verify_stack_depth(
    instructions: &[Instruction],
    by_offset: &FxHashMap<usize, usize>,
    info: &MethodInfo,
    method: &str,
) -> Result<(), VerifyError> {
    let mut depths: Vec<Option<i32>> = vec![None; instructions.len()];
    let mut worklist: Vec<(usize, i32)> = vec![(0, 0)];

    for entry in &info.exception_table {
        if let Some(&index) = by_offset.get(&(entry.handler as usize)) {
            worklist.push((index, 1));
        }
    }

    while let Some((index, depth)) = worklist.pop() {
        let instr = &instructions[index];
        match depths[index] {
            Some(seen) if seen == depth => continue,
            Some(seen) => {
                return Err(VerifyError::InconsistentStack {
                    method: method.to_string(),
                    offset: instr.offset,
                    first: seen,
                    second: depth,
                })
            }
            None => depths[index] = Some(depth),
        }

        let (pops, pushes) = stack_effect(instr);
        if depth < pops {
            return Err(VerifyError::StackUnderflow {
                method: method.to_string(),
                offset: instr.offset,
            });
        }
        let next_depth = depth - pops + pushes;
        if next_depth > MAX_STACK_DEPTH {
            return Err(VerifyError::StackOverflow {
                method: method.to_string(),
                offset: instr.offset,
                depth: next_depth,
            });
        }

        if let Operands::Jump(target) = instr.operands {
            if let Some(&target_index) = by_offset.get(&target) {
                worklist.push((target_index, next_depth));
            }
        }
        if !instr.opcode.ends_flow() {
            if index + 1 >= instructions.len() {
                return Err(VerifyError::FallOffEnd {
                    method: method.to_string(),
                    offset: instr.offset,
                });
            }
            worklist.push((index + 1, next_depth));
        }
    }

    Ok(())
}
