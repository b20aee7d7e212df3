//! classgen command line
//!
//! Runs the control-flow conformance suite on either backend, renders the
//! suite's classes as source, and writes or disassembles class files.

mod commands;
mod output;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use classgen_codegen::CodegenOptions;
use log::debug;
use simplelog::{Config, LevelFilter, SimpleLogger};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "classgen")]
#[command(about = "Class generation with source and binary backends", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML file with a [codegen] table
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Color output: auto, always, never
    #[arg(long, default_value = "auto", global = true)]
    color: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control-flow conformance suite
    Flow {
        /// Backend to exercise: binary, source or both
        #[arg(long, default_value = "both")]
        backend: String,
        /// Run only the case, or all cases of the method, with this name
        #[arg(long)]
        case: Option<String>,
    },

    /// Print a suite class as source
    Render {
        /// Render only this method of the Flow class
        #[arg(long)]
        method: Option<String>,
        /// Class to render
        #[arg(long, default_value = "flow.Flow")]
        class: String,
    },

    /// Disassemble a class file
    Disasm {
        /// Class file to list
        file: PathBuf,
    },

    /// Write a suite class file produced by the binary backend
    Emit {
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
        /// Class to emit
        #[arg(long, default_value = "flow.Flow")]
        class: String,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // a logger may already be installed when embedded
    let _ = SimpleLogger::init(level, Config::default());
}

fn load_options(path: Option<&Path>) -> anyhow::Result<CodegenOptions> {
    match path {
        Some(path) => {
            let options = CodegenOptions::load(path)
                .with_context(|| format!("cannot load config {}", path.display()))?;
            debug!("codegen options from {}: {:?}", path.display(), options);
            Ok(options)
        }
        None => Ok(CodegenOptions::default()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let options = load_options(cli.config.as_deref())?;

    match cli.command {
        Commands::Flow { backend, case } => commands::flow::execute(
            commands::flow::FlowArgs {
                backend,
                case,
                color: cli.color,
            },
            &options,
        ),
        Commands::Render { method, class } => {
            commands::render::execute(&class, method.as_deref(), &options)
        }
        Commands::Disasm { file } => commands::disasm::execute(&file),
        Commands::Emit { out, class } => commands::emit::execute(&class, &out, &options),
    }
}
