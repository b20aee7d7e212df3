//! Backend drivers and case execution
//!
//! The binary backend encodes each suite class directly. The source backend
//! renders each class, writes it to a scratch directory and compiles the
//! file back with `classgen-compiler`. Either way the artifacts are loaded
//! into a fresh VM next to the host `ControlBase`.

use crate::cases::select;
use crate::control::ControlBase;
use crate::dsl::{FlowCase, Outcome};
use crate::program::{build_class, simple_name, CLASSES, FLOW_CLASS};
use crate::{FlowError, FlowResult};
use classgen_codegen::{Codegen, CodegenOptions, Target};
use classgen_compiler::Compiler;
use classgen_vm::{ClassLoader, Value, Vm, VmError};
use log::{debug, info};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Binary,
    Source,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Binary, Backend::Source];

    pub fn name(self) -> &'static str {
        match self {
            Backend::Binary => "binary",
            Backend::Source => "source",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Backend::Binary),
            "source" => Ok(Backend::Source),
            other => Err(format!("unknown backend `{}`", other)),
        }
    }
}

// ===== Artifacts =====

/// Render one suite class as source text
pub fn render_class(
    class: &str,
    only: Option<&str>,
    options: &CodegenOptions,
) -> FlowResult<String> {
    let mut cg = Codegen::with_options(options.clone());
    let mut s = cg.session();
    build_class(&mut s, class, only)?;
    let artifact = s.emit(Target::Source)?;
    Ok(artifact.as_source().unwrap_or_default().to_string())
}

/// Encode one suite class directly
pub fn emit_class(class: &str, only: Option<&str>, options: &CodegenOptions) -> FlowResult<Vec<u8>> {
    let mut cg = Codegen::with_options(options.clone());
    let mut s = cg.session();
    build_class(&mut s, class, only)?;
    Ok(s.emit_binary()?)
}

/// Loadable class files of the whole suite for one backend
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub backend: Backend,
    /// `(class name, class file)` in load order
    pub classes: Vec<(String, Vec<u8>)>,
    pub elapsed: Duration,
}

impl Artifacts {
    pub fn build(backend: Backend, options: &CodegenOptions) -> FlowResult<Self> {
        let start = Instant::now();
        let classes = match backend {
            Backend::Binary => CLASSES
                .iter()
                .map(|&class| -> FlowResult<(String, Vec<u8>)> {
                    Ok((class.to_string(), emit_class(class, None, options)?))
                })
                .collect::<FlowResult<Vec<_>>>()?,
            Backend::Source => {
                let dir = tempfile::tempdir()?;
                let compiler = Compiler::with_options(options.clone());
                let mut classes = Vec::with_capacity(CLASSES.len());
                for class in CLASSES {
                    let path = dir.path().join(format!("{}.java", simple_name(class)));
                    std::fs::write(&path, render_class(class, None, options)?)?;
                    let compiled = compiler.compile_file(&path)?;
                    debug!("compiled {} from {}", compiled.name, path.display());
                    classes.push((compiled.name, compiled.bytes));
                }
                classes
            }
        };
        let elapsed = start.elapsed();
        info!(
            "{} backend: {} classes in {:.2?}",
            backend,
            classes.len(),
            elapsed
        );
        Ok(Self {
            backend,
            classes,
            elapsed,
        })
    }
}

// ===== Execution =====

/// Recorded trace and uncaught exception of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub trace: Vec<i32>,
    pub thrown: Option<String>,
}

impl Observation {
    /// What `case` should observe
    pub fn expected(case: &FlowCase) -> Self {
        Self {
            trace: case.expected_trace(),
            thrown: match &case.outcome {
                Outcome::Return => None,
                Outcome::Throws(class) => Some(class.clone()),
            },
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.trace)?;
        match &self.thrown {
            None => f.write_str(" then return"),
            Some(class) => write!(f, " then {}", class),
        }
    }
}

/// A VM holding one backend's artifacts
pub struct FlowRunner {
    backend: Backend,
    vm: Vm,
    control: Rc<ControlBase>,
}

impl FlowRunner {
    pub fn new(artifacts: &Artifacts) -> FlowResult<Self> {
        let control = Rc::new(ControlBase::new());
        let mut vm = Vm::new();
        vm.define_native(control.clone())?;
        for (name, bytes) in &artifacts.classes {
            vm.load(bytes, name)?;
        }
        Ok(Self {
            backend: artifacts.backend,
            vm,
            control,
        })
    }

    pub fn for_backend(backend: Backend, options: &CodegenOptions) -> FlowResult<Self> {
        Self::new(&Artifacts::build(backend, options)?)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Invoke the case's method on a new `Flow` under the case's script
    pub fn run(&mut self, case: &FlowCase) -> FlowResult<Observation> {
        self.control.arm(case.points.clone());
        let flow = self.vm.new_instance(FLOW_CLASS, Vec::new())?;
        let args = case.args.iter().map(|&arg| Value::Bool(arg)).collect();
        let thrown = match self.vm.invoke(&flow, &case.method, args) {
            Ok(_) => None,
            Err(VmError::UncaughtException { class, .. }) => Some(class),
            Err(err) => return Err(err.into()),
        };
        let observation = Observation {
            trace: self.control.recorded(),
            thrown,
        };
        debug!("{} [{}]: {}", case.name, self.backend, observation);
        Ok(observation)
    }

    /// Run `case` and fail unless the observation matches its expectation
    pub fn check(&mut self, case: &FlowCase) -> FlowResult<Observation> {
        let observed = self.run(case)?;
        let expected = Observation::expected(case);
        if observed != expected {
            return Err(FlowError::Mismatch {
                case: case.name.clone(),
                backend: self.backend,
                expected,
                observed,
            });
        }
        Ok(observed)
    }
}

// ===== Suite =====

#[derive(Debug, Clone)]
pub struct CaseReport {
    pub case: FlowCase,
    pub backend: Backend,
    pub observed: Observation,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        self.observed == Observation::expected(&self.case)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    /// Artifact build time per backend
    pub builds: Vec<(Backend, Duration)>,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.cases.iter().all(CaseReport::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|report| !report.passed())
    }

    /// Cases whose observations differ between backends
    pub fn divergent(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for report in &self.cases {
            let differs = self.cases.iter().any(|other| {
                other.case.name == report.case.name
                    && other.backend != report.backend
                    && other.observed != report.observed
            });
            if differs && !names.contains(&report.case.name.as_str()) {
                names.push(&report.case.name);
            }
        }
        names
    }
}

/// Run the selected cases on each backend
pub fn run_suite(
    backends: &[Backend],
    filter: Option<&str>,
    options: &CodegenOptions,
) -> FlowResult<SuiteReport> {
    let cases = select(filter)?;
    let mut report = SuiteReport::default();
    for &backend in backends {
        let artifacts = Artifacts::build(backend, options)?;
        report.builds.push((backend, artifacts.elapsed));
        let mut runner = FlowRunner::new(&artifacts)?;
        for case in &cases {
            let observed = runner.run(case)?;
            report.cases.push(CaseReport {
                case: case.clone(),
                backend,
                observed,
            });
        }
    }
    Ok(report)
}
