//! Class file format
//!
//! A class file describes exactly one class: its name, superclass, modifiers,
//! fields and methods. Method bodies are bytecode whose pool operands index
//! into the class file's own [`ConstantPool`]. Try/catch regions are described
//! by a per-method exception table.

use crate::constants::ConstantPool;
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use std::fmt;
use thiserror::Error;

/// Magic number for class files: "CGCF"
pub const MAGIC: [u8; 4] = *b"CGCF";

/// Current class file version
pub const VERSION: u32 = 1;

/// Size of the fixed header preceding the checksummed payload
pub const HEADER_SIZE: usize = 16;

/// Name of constructors in the method table
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Name of the static initializer in the method table
pub const STATIC_INIT_NAME: &str = "<clinit>";

/// Class file encoding/decoding errors
#[derive(Debug, Error)]
pub enum ClassFileError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected CGCF, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum computed over the payload
        actual: u32,
    },

    /// Bytes left over after the metadata section
    #[error("Trailing data: {0} bytes after end of class file")]
    TrailingData(usize),
}

/// Class file flags
pub mod flags {
    /// Methods carry local variable names
    pub const HAS_DEBUG_INFO: u32 = 1 << 0;
}

/// Access and property modifiers of classes and members
///
/// Bit values follow the JVM access flag layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    /// No modifiers (package-private)
    pub const NONE: Self = Self(0);
    /// `public`
    pub const PUBLIC: Self = Self(0x0001);
    /// `private`
    pub const PRIVATE: Self = Self(0x0002);
    /// `protected`
    pub const PROTECTED: Self = Self(0x0004);
    /// `static`
    pub const STATIC: Self = Self(0x0008);
    /// `final`
    pub const FINAL: Self = Self(0x0010);
    /// `abstract`
    pub const ABSTRACT: Self = Self(0x0400);

    const ORDERED: [(Self, &'static str); 6] = [
        (Self::PUBLIC, "public"),
        (Self::PROTECTED, "protected"),
        (Self::PRIVATE, "private"),
        (Self::ABSTRACT, "abstract"),
        (Self::STATIC, "static"),
        (Self::FINAL, "final"),
    ];

    /// Raw bits
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Whether every flag in `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the `static` flag is set
    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    /// Whether the `abstract` flag is set
    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    /// Modifier keywords in canonical source order
    pub fn keywords(self) -> Vec<&'static str> {
        Self::ORDERED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, kw)| *kw)
            .collect()
    }
}

impl std::ops::BitOr for AccessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for AccessFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keywords().join(" "))
    }
}

/// Build a method descriptor such as `(int,boolean)void`
pub fn descriptor<'a>(params: impl IntoIterator<Item = &'a str>, ret: Option<&str>) -> String {
    let params: Vec<&str> = params.into_iter().collect();
    format!("({}){}", params.join(","), ret.unwrap_or("void"))
}

/// Split a method descriptor into parameter type names and return type name
pub fn parse_descriptor(desc: &str) -> Option<(Vec<&str>, &str)> {
    let rest = desc.strip_prefix('(')?;
    let close = rest.find(')')?;
    let params = &rest[..close];
    let ret = &rest[close + 1..];
    if ret.is_empty() {
        return None;
    }
    let params = if params.is_empty() {
        Vec::new()
    } else {
        params.split(',').collect()
    };
    Some((params, ret))
}

/// Field table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Fully-qualified type name (`int`, `java.lang.String`, `int[]`)
    pub type_name: String,
    /// Modifiers
    pub access: AccessFlags,
}

impl FieldInfo {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_string(&self.type_name);
        writer.emit_u16(self.access.bits());
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            name: reader.read_string()?,
            type_name: reader.read_string()?,
            access: AccessFlags(reader.read_u16()?),
        })
    }
}

/// Exception table entry: `[start, end)` is guarded, control transfers to
/// `handler` with the exception as the only stack value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionEntry {
    /// First guarded offset
    pub start: u32,
    /// One past the last guarded offset
    pub end: u32,
    /// Handler offset
    pub handler: u32,
    /// Caught class name; `None` catches everything
    pub catch_type: Option<String>,
}

impl ExceptionEntry {
    /// Whether `pc` lies inside the guarded range
    pub fn covers(&self, pc: usize) -> bool {
        (self.start as usize..self.end as usize).contains(&pc)
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.start);
        writer.emit_u32(self.end);
        writer.emit_u32(self.handler);
        match &self.catch_type {
            Some(name) => {
                writer.emit_u8(1);
                writer.emit_string(name);
            }
            None => writer.emit_u8(0),
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let start = reader.read_u32()?;
        let end = reader.read_u32()?;
        let handler = reader.read_u32()?;
        let catch_type = if reader.read_u8()? != 0 {
            Some(reader.read_string()?)
        } else {
            None
        };
        Ok(Self {
            start,
            end,
            handler,
            catch_type,
        })
    }
}

/// Method table entry
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    /// Method name (`<init>` for constructors, `<clinit>` for the static initializer)
    pub name: String,
    /// Descriptor, e.g. `(int,boolean)void`
    pub descriptor: String,
    /// Modifiers
    pub access: AccessFlags,
    /// Number of declared parameters (the receiver is not counted)
    pub param_count: u16,
    /// Number of local slots, receiver and parameters included
    pub max_locals: u16,
    /// Bytecode; empty for abstract methods
    pub code: Vec<u8>,
    /// Exception table, innermost ranges first
    pub exception_table: Vec<ExceptionEntry>,
    /// Local slot names (only encoded with [`flags::HAS_DEBUG_INFO`])
    pub local_names: Vec<String>,
}

impl MethodInfo {
    /// Whether this entry is a constructor
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Local slot of the first declared parameter
    pub fn first_param_slot(&self) -> u16 {
        if self.access.is_static() {
            0
        } else {
            1
        }
    }

    fn encode(&self, writer: &mut BytecodeWriter, debug: bool) {
        writer.emit_string(&self.name);
        writer.emit_string(&self.descriptor);
        writer.emit_u16(self.access.bits());
        writer.emit_u16(self.param_count);
        writer.emit_u16(self.max_locals);

        writer.emit_u32(self.code.len() as u32);
        writer.emit_bytes(&self.code);

        writer.emit_u32(self.exception_table.len() as u32);
        for entry in &self.exception_table {
            entry.encode(writer);
        }

        if debug {
            writer.emit_u32(self.local_names.len() as u32);
            for name in &self.local_names {
                writer.emit_string(name);
            }
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>, debug: bool) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let descriptor = reader.read_string()?;
        let access = AccessFlags(reader.read_u16()?);
        let param_count = reader.read_u16()?;
        let max_locals = reader.read_u16()?;

        let code_len = reader.read_u32()? as usize;
        let code = reader.read_bytes(code_len)?;

        let entry_count = reader.read_u32()? as usize;
        let mut exception_table = Vec::with_capacity(entry_count.min(1024));
        for _ in 0..entry_count {
            exception_table.push(ExceptionEntry::decode(reader)?);
        }

        let mut local_names = Vec::new();
        if debug {
            let count = reader.read_u32()? as usize;
            for _ in 0..count {
                local_names.push(reader.read_string()?);
            }
        }

        Ok(Self {
            name,
            descriptor,
            access,
            param_count,
            max_locals,
            code,
            exception_table,
            local_names,
        })
    }
}

/// Class file metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Originating source file name
    pub source_file: Option<String>,
}

impl Metadata {
    fn encode(&self, writer: &mut BytecodeWriter) {
        match &self.source_file {
            Some(path) => {
                writer.emit_u8(1);
                writer.emit_string(path);
            }
            None => writer.emit_u8(0),
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let source_file = if reader.read_u8()? != 0 {
            Some(reader.read_string()?)
        } else {
            None
        };
        Ok(Self { source_file })
    }
}

/// A single compiled class
#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Class file version
    pub version: u32,
    /// Class file flags
    pub flags: u32,
    /// Constant pool
    pub constants: ConstantPool,
    /// Fully-qualified class name
    pub this_class: String,
    /// Fully-qualified superclass name
    pub super_class: String,
    /// Class modifiers
    pub access: AccessFlags,
    /// Fields in declaration order
    pub fields: Vec<FieldInfo>,
    /// Methods and constructors in declaration order
    pub methods: Vec<MethodInfo>,
    /// Metadata
    pub metadata: Metadata,
}

impl ClassFile {
    /// Create an empty class file
    pub fn new(this_class: impl Into<String>, super_class: impl Into<String>) -> Self {
        Self {
            version: VERSION,
            flags: 0,
            constants: ConstantPool::new(),
            this_class: this_class.into(),
            super_class: super_class.into(),
            access: AccessFlags::PUBLIC,
            fields: Vec::new(),
            methods: Vec::new(),
            metadata: Metadata::default(),
        }
    }

    /// Whether methods carry local variable names
    pub fn has_debug_info(&self) -> bool {
        self.flags & flags::HAS_DEBUG_INFO != 0
    }

    /// Find a method by name and descriptor
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Encode the class file to binary format
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + flags (u32) + checksum (u32)
    /// - Constant pool
    /// - this class, super class, access flags
    /// - Field table
    /// - Method table
    /// - Metadata
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();

        writer.emit_bytes(&MAGIC);
        writer.emit_u32(self.version);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.offset();
        writer.emit_u32(0);

        self.constants.encode(&mut writer);

        writer.emit_string(&self.this_class);
        writer.emit_string(&self.super_class);
        writer.emit_u16(self.access.bits());

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            field.encode(&mut writer);
        }

        let debug = self.has_debug_info();
        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(&mut writer, debug);
        }

        self.metadata.encode(&mut writer);

        // CRC32 of everything after the header
        let checksum = crc32fast::hash(&writer.buffer()[HEADER_SIZE..]);
        writer.patch_u32(checksum_offset, checksum);

        writer.into_bytes()
    }

    /// Decode a class file from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ClassFileError> {
        let mut reader = BytecodeReader::new(data);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&reader.read_bytes(4)?);
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ClassFileError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored_checksum = reader.read_u32()?;

        let calculated_checksum = crc32fast::hash(&data[HEADER_SIZE..]);
        if stored_checksum != calculated_checksum {
            return Err(ClassFileError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }

        let constants = ConstantPool::decode(&mut reader)?;

        let this_class = reader.read_string()?;
        let super_class = reader.read_string()?;
        let access = AccessFlags(reader.read_u16()?);

        let field_count = reader.read_u32()? as usize;
        let mut fields = Vec::with_capacity(field_count.min(1024));
        for _ in 0..field_count {
            fields.push(FieldInfo::decode(&mut reader)?);
        }

        let debug = flags & flags::HAS_DEBUG_INFO != 0;
        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count.min(1024));
        for _ in 0..method_count {
            methods.push(MethodInfo::decode(&mut reader, debug)?);
        }

        let metadata = Metadata::decode(&mut reader)?;

        if reader.has_more() {
            return Err(ClassFileError::TrailingData(reader.remaining()));
        }

        Ok(Self {
            version,
            flags,
            constants,
            this_class,
            super_class,
            access,
            fields,
            methods,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClassFile {
        let mut class = ClassFile::new("demo.Counter", "java.lang.Object");
        class.fields.push(FieldInfo {
            name: "count".to_string(),
            type_name: "int".to_string(),
            access: AccessFlags::PRIVATE,
        });

        let mut writer = BytecodeWriter::new();
        writer.emit_const_i32(42);
        writer.emit_return();
        class.methods.push(MethodInfo {
            name: "answer".to_string(),
            descriptor: descriptor([], Some("int")),
            access: AccessFlags::PUBLIC,
            param_count: 0,
            max_locals: 1,
            code: writer.into_bytes(),
            exception_table: vec![ExceptionEntry {
                start: 0,
                end: 5,
                handler: 5,
                catch_type: Some("java.lang.RuntimeException".to_string()),
            }],
            local_names: vec!["this".to_string()],
        });
        class
    }

    #[test]
    fn test_access_flags() {
        let flags = AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL;
        assert!(flags.is_static());
        assert!(!flags.is_abstract());
        assert_eq!(flags.bits(), 0x19);
        assert_eq!(flags.to_string(), "public static final");
        assert_eq!(AccessFlags::NONE.to_string(), "");
    }

    #[test]
    fn test_descriptors() {
        assert_eq!(descriptor(["int", "boolean"], None), "(int,boolean)void");
        assert_eq!(descriptor([], Some("int")), "()int");

        let (params, ret) = parse_descriptor("(int,java.lang.String)boolean").unwrap();
        assert_eq!(params, vec!["int", "java.lang.String"]);
        assert_eq!(ret, "boolean");

        let (params, ret) = parse_descriptor("()void").unwrap();
        assert!(params.is_empty());
        assert_eq!(ret, "void");

        assert!(parse_descriptor("int").is_none());
        assert!(parse_descriptor("(int)").is_none());
    }

    #[test]
    fn test_class_file_encoding() {
        let mut class = sample();
        class.metadata.source_file = Some("Counter.java".to_string());

        let decoded = ClassFile::decode(&class.encode()).unwrap();

        assert_eq!(decoded.this_class, "demo.Counter");
        assert_eq!(decoded.super_class, "java.lang.Object");
        assert_eq!(decoded.fields, class.fields);
        assert_eq!(decoded.methods.len(), 1);
        assert_eq!(decoded.methods[0].code, class.methods[0].code);
        assert_eq!(decoded.methods[0].exception_table, class.methods[0].exception_table);
        assert_eq!(decoded.metadata.source_file.as_deref(), Some("Counter.java"));
        // Debug names are dropped without the flag
        assert!(decoded.methods[0].local_names.is_empty());
    }

    #[test]
    fn test_debug_names_kept_with_flag() {
        let mut class = sample();
        class.flags |= flags::HAS_DEBUG_INFO;

        let decoded = ClassFile::decode(&class.encode()).unwrap();
        assert!(decoded.has_debug_info());
        assert_eq!(decoded.methods[0].local_names, vec!["this"]);
    }

    #[test]
    fn test_checksum_validation() {
        let mut bytes = sample().encode();
        bytes[HEADER_SIZE + 2] ^= 0xFF;

        let result = ClassFile::decode(&bytes);
        assert!(matches!(result, Err(ClassFileError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_invalid_magic_number() {
        let mut bytes = b"XXXX".to_vec();
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let result = ClassFile::decode(&bytes);
        assert!(matches!(result, Err(ClassFileError::InvalidMagic(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&999u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let result = ClassFile::decode(&bytes);
        assert!(matches!(result, Err(ClassFileError::UnsupportedVersion(999))));
    }

    #[test]
    fn test_truncated_input() {
        let bytes = sample().encode();
        let result = ClassFile::decode(&bytes[..10]);
        assert!(matches!(result, Err(ClassFileError::DecodeError(_))));
    }

    #[test]
    fn test_lookup_helpers() {
        let class = sample();
        assert!(class.method("answer", "()int").is_some());
        assert!(class.method("answer", "()void").is_none());
        assert_eq!(class.field("count").map(|f| f.type_name.as_str()), Some("int"));
        assert_eq!(class.methods[0].first_param_slot(), 1);
        assert!(!class.methods[0].is_constructor());
    }
}
