//! Class file format for generated classes
//!
//! This crate provides the bytecode instruction set, the single-class file
//! format with its constant pool and exception tables, a verifier, and a
//! disassembler.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod classfile;
pub mod constants;
pub mod disasm;
pub mod encoder;
pub mod opcode;
pub mod verify;

pub use classfile::{
    descriptor, parse_descriptor, AccessFlags, ClassFile, ClassFileError, ExceptionEntry,
    FieldInfo, Metadata, MethodInfo, CONSTRUCTOR_NAME, STATIC_INIT_NAME,
};
pub use constants::ConstantPool;
pub use disasm::PrettyPrint;
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError, Instruction, Operands};
pub use opcode::Opcode;
pub use verify::{verify_class, VerifyError};
