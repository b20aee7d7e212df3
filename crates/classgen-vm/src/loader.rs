//! Class loading
//!
//! Bytes are decoded, checked against the requested name, verified and then
//! defined; the static initializer runs as part of loading.

use crate::class::ClassHandle;
use crate::interpreter::Vm;
use crate::{VmError, VmResult};
use classgen_bytecode::{verify_class, ClassFile};
use log::debug;

/// Turns class file bytes into a usable class
pub trait ClassLoader {
    /// Load the class `name` from `bytes`
    fn load(&mut self, bytes: &[u8], name: &str) -> VmResult<ClassHandle>;
}

/// Decode and verify without defining anything
pub fn decode_class(bytes: &[u8], name: &str) -> VmResult<ClassFile> {
    let file = ClassFile::decode(bytes)?;
    if file.this_class != name {
        return Err(VmError::NameMismatch {
            expected: name.to_string(),
            found: file.this_class,
        });
    }
    verify_class(&file)?;
    Ok(file)
}

impl ClassLoader for Vm {
    fn load(&mut self, bytes: &[u8], name: &str) -> VmResult<ClassHandle> {
        debug!("loading {} ({} bytes)", name, bytes.len());
        let file = decode_class(bytes, name)?;
        self.define_class(file)
    }
}
