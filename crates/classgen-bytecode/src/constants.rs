//! Constant pool for class files
//!
//! The pool holds every string an instruction refers to: class names, member
//! names, descriptors and string literals. Entries are deduplicated so that an
//! index identifies a string uniquely within one class file.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use rustc_hash::FxHashMap;

/// Maximum number of entries a pool can hold
pub const MAX_POOL_ENTRIES: usize = u16::MAX as usize;

/// Constant pool containing string constants
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// String constants in index order
    pub strings: Vec<String>,
    index: FxHashMap<String, u32>,
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index of `s`, adding it if absent
    ///
    /// Returns `None` once the pool is full.
    pub fn intern(&mut self, s: &str) -> Option<u32> {
        if let Some(&index) = self.index.get(s) {
            return Some(index);
        }
        if self.strings.len() >= MAX_POOL_ENTRIES {
            return None;
        }
        let index = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), index);
        Some(index)
    }

    /// Look up an existing entry without adding it
    pub fn find(&self, s: &str) -> Option<u32> {
        self.index.get(s).copied()
    }

    /// Get a string constant by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(|s| s.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether the pool has no entries
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Encode the constant pool to binary format
    ///
    /// Format:
    /// - String count (u32)
    /// - For each string: length (u32) + UTF-8 bytes
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }
    }

    /// Decode the constant pool from binary format
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let mut pool = ConstantPool::new();
        let string_count = reader.read_u32()? as usize;
        pool.strings.reserve(string_count.min(MAX_POOL_ENTRIES));
        for i in 0..string_count {
            let s = reader.read_string()?;
            // Duplicates in foreign input keep their first index.
            pool.index.entry(s.clone()).or_insert(i as u32);
            pool.strings.push(s);
        }
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut pool = ConstantPool::new();

        let a = pool.intern("trace").unwrap();
        let b = pool.intern("Flow").unwrap();
        let c = pool.intern("trace").unwrap();

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get_string(b), Some("Flow"));
        assert_eq!(pool.find("Flow"), Some(b));
        assert_eq!(pool.find("missing"), None);
    }

    #[test]
    fn test_constant_pool_encoding() {
        let mut pool = ConstantPool::new();
        pool.intern("hello");
        pool.intern("world");

        let mut writer = BytecodeWriter::new();
        pool.encode(&mut writer);

        let mut reader = BytecodeReader::new(writer.buffer());
        let decoded = ConstantPool::decode(&mut reader).unwrap();

        assert_eq!(decoded.strings, vec!["hello", "world"]);
        assert_eq!(decoded.find("world"), Some(1));
    }

    #[test]
    fn test_pool_overflow() {
        let mut pool = ConstantPool::new();
        for i in 0..MAX_POOL_ENTRIES {
            assert!(pool.intern(&i.to_string()).is_some());
        }
        assert_eq!(pool.intern("one more"), None);
        // Existing entries still resolve
        assert_eq!(pool.intern("0"), Some(0));
    }
}
