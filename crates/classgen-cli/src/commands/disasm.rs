//! `classgen disasm`: list a class file

use anyhow::Context;
use classgen_bytecode::{ClassFile, PrettyPrint};
use std::path::Path;

pub fn listing(file: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(file).with_context(|| format!("cannot read {}", file.display()))?;
    let class = ClassFile::decode(&bytes)
        .with_context(|| format!("{} is not a valid class file", file.display()))?;
    Ok(class.pretty_print())
}

pub fn execute(file: &Path) -> anyhow::Result<()> {
    print!("{}", listing(file)?);
    Ok(())
}
