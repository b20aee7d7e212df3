//! `classgen flow`: run the conformance suite

use crate::output::{self, StyledOutput};
use anyhow::{anyhow, bail};
use classgen_codegen::CodegenOptions;
use classgen_flowtest::{run_suite, Backend};

pub struct FlowArgs {
    pub backend: String,
    pub case: Option<String>,
    pub color: String,
}

/// `both`, `binary` or `source`
pub fn parse_backends(name: &str) -> anyhow::Result<Vec<Backend>> {
    if name == "both" {
        return Ok(Backend::ALL.to_vec());
    }
    let backend = name.parse::<Backend>().map_err(|e| anyhow!(e))?;
    Ok(vec![backend])
}

pub fn execute(args: FlowArgs, options: &CodegenOptions) -> anyhow::Result<()> {
    let backends = parse_backends(&args.backend)?;
    let report = run_suite(&backends, args.case.as_deref(), options)?;
    let mut out = StyledOutput::new(output::resolve_color_choice(&args.color));

    for case in &report.cases {
        if case.passed() {
            out.pass_badge();
        } else {
            out.fail_badge();
        }
        out.plain(&format!(" {} ", case.case.name));
        out.dim(&format!("[{}] {}", case.backend, case.observed));
        out.newline();
        if !case.passed() {
            out.dim(&format!("       expected: {}", case.case));
            out.newline();
        }
    }

    out.newline();
    for (backend, elapsed) in &report.builds {
        out.dim(&format!("{} artifacts built in {:.2?}", backend, elapsed));
        out.newline();
    }
    let divergent = report.divergent();
    if !divergent.is_empty() {
        out.warning(&format!("backends disagree on: {}", divergent.join(", ")));
        out.newline();
    }

    let failed = report.failures().count();
    let total = report.cases.len();
    out.bold("Cases: ");
    if failed == 0 {
        out.success(&format!("{} passed", total));
    } else {
        out.error(&format!("{} failed", failed));
        out.plain(&format!(", {} passed", total - failed));
    }
    out.plain(&format!(", {} total", total));
    out.newline();

    if failed > 0 {
        bail!("{} of {} flow cases failed", failed, total);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backends() {
        assert_eq!(parse_backends("both").unwrap(), Backend::ALL.to_vec());
        assert_eq!(parse_backends("source").unwrap(), vec![Backend::Source]);
        assert!(parse_backends("jit").is_err());
    }
}
