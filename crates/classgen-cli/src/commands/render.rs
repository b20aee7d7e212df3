//! `classgen render`: print a suite class as source

use anyhow::Context;
use classgen_codegen::CodegenOptions;
use classgen_flowtest::render_class;

pub fn execute(class: &str, method: Option<&str>, options: &CodegenOptions) -> anyhow::Result<()> {
    let text = render_class(class, method, options)
        .with_context(|| format!("cannot render {}", class))?;
    print!("{}", text);
    Ok(())
}
