//! Bytecode encoding and decoding utilities
//!
//! [`BytecodeWriter`] emits instructions and raw little-endian values,
//! [`BytecodeReader`] reads them back. Both are shared by the class file codec
//! and by the code generator's binary backend.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that can occur during bytecode decoding
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Unexpected end of bytecode stream
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string
    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#04x} at offset {1}")]
    InvalidOpcode(u8, usize),
}

/// Bytecode writer for encoding instructions
///
/// Provides methods for emitting opcodes and their operands into a binary buffer.
#[derive(Debug, Clone)]
pub struct BytecodeWriter {
    pub(crate) buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new bytecode writer with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Get the current bytecode buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (little-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer (little-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit signed integer (little-endian)
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer (little-endian)
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit float (little-endian)
    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a length-prefixed UTF-8 string (u32 length + bytes)
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Emit raw bytes
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    // ===== Opcode Emission =====

    /// Emit an opcode without operands
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit POP instruction
    pub fn emit_pop(&mut self) {
        self.emit_opcode(Opcode::Pop);
    }

    /// Emit DUP instruction
    pub fn emit_dup(&mut self) {
        self.emit_opcode(Opcode::Dup);
    }

    /// Emit CONST_NULL instruction
    pub fn emit_const_null(&mut self) {
        self.emit_opcode(Opcode::ConstNull);
    }

    /// Emit CONST_TRUE or CONST_FALSE
    pub fn emit_const_bool(&mut self, value: bool) {
        self.emit_opcode(if value {
            Opcode::ConstTrue
        } else {
            Opcode::ConstFalse
        });
    }

    /// Emit CONST_I32 instruction with value
    pub fn emit_const_i32(&mut self, value: i32) {
        self.emit_opcode(Opcode::ConstI32);
        self.emit_i32(value);
    }

    /// Emit CONST_I64 instruction with value
    pub fn emit_const_i64(&mut self, value: i64) {
        self.emit_opcode(Opcode::ConstI64);
        self.emit_i64(value);
    }

    /// Emit CONST_F64 instruction with value
    pub fn emit_const_f64(&mut self, value: f64) {
        self.emit_opcode(Opcode::ConstF64);
        self.emit_f64(value);
    }

    /// Emit CONST_STR instruction with constant pool index
    pub fn emit_const_str(&mut self, index: u32) {
        self.emit_opcode(Opcode::ConstStr);
        self.emit_u32(index);
    }

    // ===== Local Variables =====

    /// Emit LOAD_LOCAL instruction
    pub fn emit_load_local(&mut self, index: u16) {
        self.emit_opcode(Opcode::LoadLocal);
        self.emit_u16(index);
    }

    /// Emit STORE_LOCAL instruction
    pub fn emit_store_local(&mut self, index: u16) {
        self.emit_opcode(Opcode::StoreLocal);
        self.emit_u16(index);
    }

    // ===== Control Flow =====

    /// Emit a jump whose offset is filled in later; returns the patch offset
    pub fn emit_jump_placeholder(&mut self, opcode: Opcode) -> usize {
        debug_assert!(opcode.is_jump());
        self.emit_opcode(opcode);
        self.reserve_i32()
    }

    /// Emit a jump to an already known target
    #[cfg(test)]
    pub(crate) fn emit_jump_to(&mut self, opcode: Opcode, target: usize) {
        debug_assert!(opcode.is_jump());
        self.emit_opcode(opcode);
        let patch = self.offset();
        self.emit_i32(target as i32 - (patch as i32 + 4));
    }

    /// Point the jump operand at `patch` to the current offset
    pub fn patch_jump_here(&mut self, patch: usize) {
        let target = self.offset();
        self.patch_i32(patch, target as i32 - (patch as i32 + 4));
    }

    // ===== Calls =====

    /// Emit CALL_VIRTUAL instruction
    pub fn emit_call_virtual(&mut self, name_index: u32, arg_count: u16) {
        self.emit_opcode(Opcode::CallVirtual);
        self.emit_u32(name_index);
        self.emit_u16(arg_count);
    }

    /// Emit CALL_SPECIAL instruction
    pub fn emit_call_special(&mut self, class_index: u32, name_index: u32, arg_count: u16) {
        self.emit_opcode(Opcode::CallSpecial);
        self.emit_u32(class_index);
        self.emit_u32(name_index);
        self.emit_u16(arg_count);
    }

    /// Emit CALL_STATIC instruction
    pub fn emit_call_static(&mut self, class_index: u32, name_index: u32, arg_count: u16) {
        self.emit_opcode(Opcode::CallStatic);
        self.emit_u32(class_index);
        self.emit_u32(name_index);
        self.emit_u16(arg_count);
    }

    /// Emit RETURN instruction
    pub fn emit_return(&mut self) {
        self.emit_opcode(Opcode::Return);
    }

    /// Emit RETURN_VOID instruction
    pub fn emit_return_void(&mut self) {
        self.emit_opcode(Opcode::ReturnVoid);
    }

    // ===== Object Operations =====

    /// Emit NEW instruction
    pub fn emit_new(&mut self, class_index: u32, arg_count: u16) {
        self.emit_opcode(Opcode::New);
        self.emit_u32(class_index);
        self.emit_u16(arg_count);
    }

    /// Emit LOAD_FIELD instruction
    pub fn emit_load_field(&mut self, name_index: u32) {
        self.emit_opcode(Opcode::LoadField);
        self.emit_u32(name_index);
    }

    /// Emit STORE_FIELD instruction
    pub fn emit_store_field(&mut self, name_index: u32) {
        self.emit_opcode(Opcode::StoreField);
        self.emit_u32(name_index);
    }

    /// Emit LOAD_STATIC instruction
    pub fn emit_load_static(&mut self, class_index: u32, name_index: u32) {
        self.emit_opcode(Opcode::LoadStatic);
        self.emit_u32(class_index);
        self.emit_u32(name_index);
    }

    /// Emit STORE_STATIC instruction
    pub fn emit_store_static(&mut self, class_index: u32, name_index: u32) {
        self.emit_opcode(Opcode::StoreStatic);
        self.emit_u32(class_index);
        self.emit_u32(name_index);
    }

    /// Emit THROW instruction
    pub fn emit_throw(&mut self) {
        self.emit_opcode(Opcode::Throw);
    }

    // ===== Patching (for forward jumps) =====

    /// Patch a previously emitted i32 value at the given offset
    pub fn patch_i32(&mut self, offset: usize, value: i32) {
        let bytes = value.to_le_bytes();
        self.buffer[offset..offset + 4].copy_from_slice(&bytes);
    }

    /// Patch a previously emitted u32 value at the given offset
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        let bytes = value.to_le_bytes();
        self.buffer[offset..offset + 4].copy_from_slice(&bytes);
    }

    /// Reserve space for an i32 value (returns offset for later patching)
    pub fn reserve_i32(&mut self) -> usize {
        let offset = self.offset();
        self.emit_i32(0);
        offset
    }
}

impl Default for BytecodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytecode reader for decoding instructions
///
/// Provides methods for reading opcodes and their operands from a binary buffer.
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new bytecode reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Get the current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get the remaining bytes in the buffer
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Seek to a specific position
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self
            .position
            .checked_add(N)
            .filter(|end| *end <= self.buffer.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.buffer[self.position..end]);
        self.position = end;
        Ok(bytes)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    /// Read a 64-bit signed integer (little-endian)
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take()?))
    }

    /// Read a 64-bit float (little-endian)
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    /// Read a length-prefixed string (u32 length + UTF-8 bytes)
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(start))
    }

    /// Read a fixed number of bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, DecodeError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|end| *end <= self.buffer.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let bytes = self.buffer[self.position..end].to_vec();
        self.position = end;
        Ok(bytes)
    }

    /// Read an opcode
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, self.position - 1))
    }
}

/// A decoded instruction with its operands
#[derive(Debug, Clone, PartialEq)]
pub enum Operands {
    /// No operands
    None,
    /// CONST_I32
    I32(i32),
    /// CONST_I64
    I64(i64),
    /// CONST_F64
    F64(f64),
    /// LOAD_LOCAL / STORE_LOCAL
    Local(u16),
    /// Jump with its absolute target offset
    Jump(usize),
    /// CONST_STR, LOAD_FIELD, STORE_FIELD
    Pool(u32),
    /// CALL_VIRTUAL
    Virtual {
        /// Pool index of the method name
        name: u32,
        /// Argument count, receiver excluded
        argc: u16,
    },
    /// CALL_SPECIAL / CALL_STATIC
    Qualified {
        /// Pool index of the owner class name
        class: u32,
        /// Pool index of the method name
        name: u32,
        /// Argument count, receiver excluded
        argc: u16,
    },
    /// NEW
    New {
        /// Pool index of the instantiated class name
        class: u32,
        /// Constructor argument count
        argc: u16,
    },
    /// LOAD_STATIC / STORE_STATIC
    Static {
        /// Pool index of the owner class name
        class: u32,
        /// Pool index of the field name
        name: u32,
    },
}

/// One instruction: offset, opcode and operands
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Offset of the opcode byte
    pub offset: usize,
    /// The opcode
    pub opcode: Opcode,
    /// Decoded operands
    pub operands: Operands,
}

impl<'a> BytecodeReader<'a> {
    /// Decode the next full instruction
    pub fn read_instruction(&mut self) -> Result<Instruction, DecodeError> {
        let offset = self.position;
        let opcode = self.read_opcode()?;
        let operands = match opcode {
            Opcode::ConstI32 => Operands::I32(self.read_i32()?),
            Opcode::ConstI64 => Operands::I64(self.read_i64()?),
            Opcode::ConstF64 => Operands::F64(self.read_f64()?),
            Opcode::LoadLocal | Opcode::StoreLocal => Operands::Local(self.read_u16()?),
            Opcode::Jmp | Opcode::JmpIfFalse | Opcode::JmpIfTrue => {
                let rel = self.read_i32()? as i64;
                let target = self.position as i64 + rel;
                Operands::Jump(target.max(0) as usize)
            }
            Opcode::ConstStr | Opcode::LoadField | Opcode::StoreField => {
                Operands::Pool(self.read_u32()?)
            }
            Opcode::CallVirtual => Operands::Virtual {
                name: self.read_u32()?,
                argc: self.read_u16()?,
            },
            Opcode::CallSpecial | Opcode::CallStatic => Operands::Qualified {
                class: self.read_u32()?,
                name: self.read_u32()?,
                argc: self.read_u16()?,
            },
            Opcode::New => Operands::New {
                class: self.read_u32()?,
                argc: self.read_u16()?,
            },
            Opcode::LoadStatic | Opcode::StoreStatic => Operands::Static {
                class: self.read_u32()?,
                name: self.read_u32()?,
            },
            _ => Operands::None,
        };
        Ok(Instruction {
            offset,
            opcode,
            operands,
        })
    }
}

#[cfg(test)]
#[allow(clippy::approx_constant)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_emission() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u8(0x42);
        writer.emit_u16(0x1234);
        writer.emit_u32(0xABCD_EF01);

        let bytes = writer.buffer();
        assert_eq!(bytes[0], 0x42);
        assert_eq!(bytes[1], 0x34); // Little-endian
        assert_eq!(bytes[2], 0x12);
        assert_eq!(bytes[3], 0x01);
        assert_eq!(bytes[6], 0xAB);
    }

    #[test]
    fn test_call_emission() {
        let mut writer = BytecodeWriter::new();
        writer.emit_call_static(3, 7, 2);

        let bytes = writer.buffer();
        assert_eq!(bytes[0], Opcode::CallStatic.to_u8());
        assert_eq!(u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]), 3);
        assert_eq!(u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]), 7);
        assert_eq!(u16::from_le_bytes([bytes[9], bytes[10]]), 2);
        assert_eq!(writer.offset(), 1 + Opcode::CallStatic.operand_size());
    }

    #[test]
    fn test_forward_jump_patching() {
        let mut writer = BytecodeWriter::new();
        let patch = writer.emit_jump_placeholder(Opcode::JmpIfFalse);
        writer.emit_const_i32(42);
        writer.emit_pop();
        writer.patch_jump_here(patch);
        writer.emit_return_void();

        let mut reader = BytecodeReader::new(writer.buffer());
        let jump = reader.read_instruction().unwrap();
        assert_eq!(jump.opcode, Opcode::JmpIfFalse);
        // 5 bytes jump + 5 bytes const + 1 byte pop
        assert_eq!(jump.operands, Operands::Jump(11));
    }

    #[test]
    fn test_backward_jump() {
        let mut writer = BytecodeWriter::new();
        writer.emit_const_null();
        writer.emit_pop();
        writer.emit_jump_to(Opcode::Jmp, 0);

        let mut reader = BytecodeReader::new(writer.buffer());
        reader.seek(2);
        let jump = reader.read_instruction().unwrap();
        assert_eq!(jump.operands, Operands::Jump(0));
    }

    #[test]
    fn test_reader_primitives() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u8(0x42);
        writer.emit_u16(0x1234);
        writer.emit_u32(0xABCD_EF01);
        writer.emit_i32(-42);
        writer.emit_i64(-7_000_000_000);
        writer.emit_f64(3.14159);
        writer.emit_string("hello");

        let mut reader = BytecodeReader::new(writer.buffer());
        assert_eq!(reader.read_u8().unwrap(), 0x42);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0xABCD_EF01);
        assert_eq!(reader.read_i32().unwrap(), -42);
        assert_eq!(reader.read_i64().unwrap(), -7_000_000_000);
        assert!((reader.read_f64().unwrap() - 3.14159).abs() < 0.00001);
        assert_eq!(reader.read_string().unwrap(), "hello");
        assert!(!reader.has_more());
    }

    #[test]
    fn test_reader_bounds_checking() {
        let bytes = vec![0x01, 0x02];
        let mut reader = BytecodeReader::new(&bytes);

        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.remaining(), 1);
        assert_eq!(reader.read_u16(), Err(DecodeError::UnexpectedEnd(1)));
    }

    #[test]
    fn test_reader_invalid_utf8() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u32(2);
        writer.emit_bytes(&[0xFF, 0xFE]);

        let mut reader = BytecodeReader::new(writer.buffer());
        assert_eq!(reader.read_string(), Err(DecodeError::InvalidUtf8(4)));
    }

    #[test]
    fn test_reader_invalid_opcode() {
        let bytes = vec![0xFF];
        let mut reader = BytecodeReader::new(&bytes);

        assert_eq!(reader.read_opcode(), Err(DecodeError::InvalidOpcode(0xFF, 0)));
    }

    #[test]
    fn test_instruction_decoding() {
        let mut writer = BytecodeWriter::new();
        writer.emit_const_i64(9);
        writer.emit_load_local(5);
        writer.emit_new(1, 0);
        writer.emit_store_static(2, 3);
        writer.emit_throw();

        let mut reader = BytecodeReader::new(writer.buffer());
        assert_eq!(reader.read_instruction().unwrap().operands, Operands::I64(9));
        assert_eq!(reader.read_instruction().unwrap().operands, Operands::Local(5));
        assert_eq!(
            reader.read_instruction().unwrap().operands,
            Operands::New { class: 1, argc: 0 }
        );
        assert_eq!(
            reader.read_instruction().unwrap().operands,
            Operands::Static { class: 2, name: 3 }
        );
        let throw = reader.read_instruction().unwrap();
        assert_eq!(throw.opcode, Opcode::Throw);
        assert_eq!(throw.operands, Operands::None);
    }
}
