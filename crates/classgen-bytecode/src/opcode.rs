//! Bytecode opcodes for generated classes
//!
//! The instruction set covers exactly what the code generator needs to lower
//! its statement and expression forms: constants, locals, a handful of
//! arithmetic and comparison operators, forward/backward jumps, calls, object
//! and field access, and `throw`. Exception handling is table driven (see
//! [`crate::classfile::ExceptionEntry`]) rather than opcode driven.

/// Bytecode opcode enumeration
///
/// All opcodes are single-byte instructions. Some opcodes take additional operands
/// that follow the opcode byte in the bytecode stream.
///
/// Opcodes are organized into categories:
/// - 0x00-0x0F: Stack manipulation & constants
/// - 0x10-0x1F: Local variables
/// - 0x40-0x4F: Number arithmetic (generic)
/// - 0x70-0x7F: Generic comparison & logical
/// - 0x90-0x9F: Control flow
/// - 0xA0-0xAF: Calls and returns
/// - 0xB0-0xBF: Object operations
/// - 0xE0-0xEF: Error handling
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,
    /// Duplicate top stack value
    Dup = 0x02,

    /// Push null constant
    ConstNull = 0x04,
    /// Push true constant
    ConstTrue = 0x05,
    /// Push false constant
    ConstFalse = 0x06,
    /// Push 32-bit integer constant (operand: i32)
    ConstI32 = 0x07,
    /// Push 64-bit float constant (operand: f64)
    ConstF64 = 0x08,
    /// Push string constant from pool (operand: u32 index)
    ConstStr = 0x09,
    /// Push 64-bit integer constant (operand: i64)
    ConstI64 = 0x0B,

    // ===== Local Variables (0x10-0x1F) =====
    /// Load local variable onto stack (operand: u16 index)
    LoadLocal = 0x10,
    /// Store top of stack to local variable (operand: u16 index)
    StoreLocal = 0x11,

    // ===== Number Arithmetic - Generic (0x40-0x4F) =====
    /// Number addition: pop b, pop a, push a + b
    Nadd = 0x40,
    /// Number subtraction: pop b, pop a, push a - b
    Nsub = 0x41,
    /// Number multiplication: pop b, pop a, push a * b
    Nmul = 0x42,

    // ===== Generic Comparison & Logical (0x70-0x7F) =====
    /// Equality: pop b, pop a, push a == b
    Eq = 0x70,
    /// Inequality: pop b, pop a, push a != b
    Ne = 0x71,
    /// Logical NOT: pop a, push !a
    Not = 0x74,
    /// Less than: pop b, pop a, push a < b
    Lt = 0x78,
    /// Less or equal: pop b, pop a, push a <= b
    Le = 0x79,
    /// Greater than: pop b, pop a, push a > b
    Gt = 0x7A,
    /// Greater or equal: pop b, pop a, push a >= b
    Ge = 0x7B,

    // ===== Control Flow (0x90-0x9F) =====
    /// Unconditional jump (operand: i32 offset)
    Jmp = 0x90,
    /// Jump if false: pop a, if !a jump (operand: i32 offset)
    JmpIfFalse = 0x91,
    /// Jump if true: pop a, if a jump (operand: i32 offset)
    JmpIfTrue = 0x92,

    // ===== Calls (0xA0-0xAF) =====
    /// Virtual call on the receiver below the arguments
    /// (operands: u32 name index, u16 argCount)
    CallVirtual = 0xA1,
    /// Return from method (pop return value)
    Return = 0xA2,
    /// Return from void method
    ReturnVoid = 0xA3,
    /// Non-virtual call of a specific class's method, used for superclass
    /// constructors (operands: u32 class index, u32 name index, u16 argCount)
    CallSpecial = 0xA5,
    /// Static call (operands: u32 class index, u32 name index, u16 argCount)
    CallStatic = 0xA6,

    // ===== Object Operations (0xB0-0xBF) =====
    /// Allocate and construct an instance (operands: u32 class index, u16 argCount)
    New = 0xB0,
    /// Load instance field: pop object, push object.field (operand: u32 name index)
    LoadField = 0xB1,
    /// Store instance field: pop value, pop object (operand: u32 name index)
    StoreField = 0xB2,
    /// Load static field (operands: u32 class index, u32 name index)
    LoadStatic = 0xB8,
    /// Store static field: pop value (operands: u32 class index, u32 name index)
    StoreStatic = 0xB9,

    // ===== Error Handling (0xE0-0xEF) =====
    /// Throw exception: pop exception object
    Throw = 0xE3,
}

impl Opcode {
    /// Convert a byte to an opcode
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Pop),
            0x02 => Some(Self::Dup),
            0x04 => Some(Self::ConstNull),
            0x05 => Some(Self::ConstTrue),
            0x06 => Some(Self::ConstFalse),
            0x07 => Some(Self::ConstI32),
            0x08 => Some(Self::ConstF64),
            0x09 => Some(Self::ConstStr),
            0x0B => Some(Self::ConstI64),

            0x10 => Some(Self::LoadLocal),
            0x11 => Some(Self::StoreLocal),

            0x40 => Some(Self::Nadd),
            0x41 => Some(Self::Nsub),
            0x42 => Some(Self::Nmul),

            0x70 => Some(Self::Eq),
            0x71 => Some(Self::Ne),
            0x74 => Some(Self::Not),
            0x78 => Some(Self::Lt),
            0x79 => Some(Self::Le),
            0x7A => Some(Self::Gt),
            0x7B => Some(Self::Ge),

            0x90 => Some(Self::Jmp),
            0x91 => Some(Self::JmpIfFalse),
            0x92 => Some(Self::JmpIfTrue),

            0xA1 => Some(Self::CallVirtual),
            0xA2 => Some(Self::Return),
            0xA3 => Some(Self::ReturnVoid),
            0xA5 => Some(Self::CallSpecial),
            0xA6 => Some(Self::CallStatic),

            0xB0 => Some(Self::New),
            0xB1 => Some(Self::LoadField),
            0xB2 => Some(Self::StoreField),
            0xB8 => Some(Self::LoadStatic),
            0xB9 => Some(Self::StoreStatic),

            0xE3 => Some(Self::Throw),

            _ => None,
        }
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the mnemonic name of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Pop => "POP",
            Self::Dup => "DUP",
            Self::ConstNull => "CONST_NULL",
            Self::ConstTrue => "CONST_TRUE",
            Self::ConstFalse => "CONST_FALSE",
            Self::ConstI32 => "CONST_I32",
            Self::ConstF64 => "CONST_F64",
            Self::ConstStr => "CONST_STR",
            Self::ConstI64 => "CONST_I64",
            Self::LoadLocal => "LOAD_LOCAL",
            Self::StoreLocal => "STORE_LOCAL",
            Self::Nadd => "NADD",
            Self::Nsub => "NSUB",
            Self::Nmul => "NMUL",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Not => "NOT",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::Jmp => "JMP",
            Self::JmpIfFalse => "JMP_IF_FALSE",
            Self::JmpIfTrue => "JMP_IF_TRUE",
            Self::CallVirtual => "CALL_VIRTUAL",
            Self::Return => "RETURN",
            Self::ReturnVoid => "RETURN_VOID",
            Self::CallSpecial => "CALL_SPECIAL",
            Self::CallStatic => "CALL_STATIC",
            Self::New => "NEW",
            Self::LoadField => "LOAD_FIELD",
            Self::StoreField => "STORE_FIELD",
            Self::LoadStatic => "LOAD_STATIC",
            Self::StoreStatic => "STORE_STATIC",
            Self::Throw => "THROW",
        }
    }

    /// Size in bytes of the operands that follow the opcode byte
    pub fn operand_size(self) -> usize {
        match self {
            Self::ConstI32 | Self::ConstStr => 4,
            Self::ConstF64 | Self::ConstI64 => 8,
            Self::LoadLocal | Self::StoreLocal => 2,
            Self::Jmp | Self::JmpIfFalse | Self::JmpIfTrue => 4,
            Self::CallVirtual => 4 + 2,
            Self::CallSpecial | Self::CallStatic => 4 + 4 + 2,
            Self::New => 4 + 2,
            Self::LoadField | Self::StoreField => 4,
            Self::LoadStatic | Self::StoreStatic => 4 + 4,
            _ => 0,
        }
    }

    /// Check if this opcode is a jump instruction
    pub fn is_jump(self) -> bool {
        matches!(self, Self::Jmp | Self::JmpIfFalse | Self::JmpIfTrue)
    }

    /// Check if this opcode is a call instruction
    pub fn is_call(self) -> bool {
        matches!(
            self,
            Self::CallVirtual | Self::CallSpecial | Self::CallStatic | Self::New
        )
    }

    /// Check if this opcode is a return instruction
    pub fn is_return(self) -> bool {
        matches!(self, Self::Return | Self::ReturnVoid)
    }

    /// Check if this opcode terminates a basic block
    pub fn is_terminator(self) -> bool {
        self.is_jump() || self.is_return() || matches!(self, Self::Throw)
    }

    /// Check if execution never continues with the next instruction
    pub fn ends_flow(self) -> bool {
        self.is_return() || matches!(self, Self::Jmp | Self::Throw)
    }
}
