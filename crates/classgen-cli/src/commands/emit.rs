//! `classgen emit`: write a suite class file

use anyhow::Context;
use classgen_codegen::CodegenOptions;
use classgen_flowtest::emit_class;
use std::path::Path;

pub fn execute(class: &str, out: &Path, options: &CodegenOptions) -> anyhow::Result<()> {
    let bytes = emit_class(class, None, options).with_context(|| format!("cannot emit {}", class))?;
    std::fs::write(out, &bytes).with_context(|| format!("cannot write {}", out.display()))?;
    println!("Wrote {} ({} bytes) to {}", class, bytes.len(), out.display());
    Ok(())
}
