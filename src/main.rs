//! const-promotion - CLI

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use const_promotion::middle::passes::{AnalysisReport, Analyzer, BodySummary, ItemValue};
use const_promotion::middle::pretty::MirPrinter;
use const_promotion::middle::ModuleIR;
use const_promotion::util::config::{Config, OutputFormat};
use const_promotion::util::diagnostic::emitter::LspDiagnostic;
use const_promotion::util::diagnostic::{EmitterConfig, JsonEmitter, TextEmitter};
use const_promotion::util::{loader, logger};
use const_promotion::{NAME, VERSION};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Promote constant temporaries and check const code in IR modules
#[derive(Parser, Debug)]
#[command(name = NAME)]
#[command(version = VERSION)]
#[command(about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Extra configuration file, applied over user and project config
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, global = true)]
    format: Option<OutputFormat>,

    /// Disable colored diagnostics
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the whole pipeline and print the promoted IR
    Promote {
        /// Module file (.ron or .json), or a directory of them
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write the transformed module to this file
        #[arg(long, value_name = "FILE")]
        emit: Option<PathBuf>,
    },

    /// Check const legality and const safety only
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Evaluate `const` and `static` items and print their values
    Eval {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the IR of a module as it was loaded
    Dump {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

impl Commands {
    fn file(&self) -> &Path {
        match self {
            Commands::Promote { file, .. }
            | Commands::Check { file }
            | Commands::Eval { file }
            | Commands::Dump { file } => file,
        }
    }
}

/// JSON output for one input file
#[derive(Serialize)]
struct FileReport<'a> {
    file: String,
    bodies: Vec<BodySummary>,
    items: &'a [ItemValue],
    diagnostics: Vec<LspDiagnostic>,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    logger::init_cli(args.verbose);

    let input = args.command.file();
    let mut config =
        Config::load(Some(input), args.config.as_deref()).context("failed to load configuration")?;
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if args.no_color || !std::io::stderr().is_terminal() {
        config.output.color = false;
    }
    debug!("configuration: {:?}", config);

    let files = collect_inputs(input)?;
    if files.is_empty() {
        bail!("no .ron or .json modules found in {}", input.display());
    }
    if files.len() > 1 && matches!(args.command, Commands::Promote { emit: Some(_), .. }) {
        bail!("--emit needs a single input file");
    }

    let mut failed = false;
    for file in &files {
        info!("processing {}", file.display());
        let module = loader::load_module(file).with_context(|| format!("failed to load {}", file.display()))?;
        failed |= match &args.command {
            Commands::Promote { emit, .. } => promote(&config, file, module, emit.as_deref())?,
            Commands::Check { .. } => check(&config, file, &module)?,
            Commands::Eval { .. } => eval(&config, file, module)?,
            Commands::Dump { .. } => dump(&config, &module)?,
        };
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// `path` itself, or every module file below it in name order
fn collect_inputs(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
        if entry.file_type().is_file() && loader::ModuleFormat::from_path(entry.path()).is_some() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn promote(
    config: &Config,
    file: &Path,
    mut module: ModuleIR,
    emit: Option<&Path>,
) -> Result<bool> {
    let report = Analyzer::new(config.clone())
        .run(&mut module)
        .with_context(|| format!("failed to promote {}", file.display()))?;
    match config.output.format {
        OutputFormat::Text => {
            print!("{}", MirPrinter::new(&module).module_to_string());
            emit_text(config, file, &report);
        }
        OutputFormat::Json => emit_json(file, &report)?,
    }
    if let Some(path) = emit {
        loader::write_module(path, &module).with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote {}", path.display());
    }
    Ok(report.has_errors())
}

fn check(
    config: &Config,
    file: &Path,
    module: &ModuleIR,
) -> Result<bool> {
    let report = Analyzer::new(config.clone()).check(module);
    match config.output.format {
        OutputFormat::Text => {
            emit_text(config, file, &report);
            if report.diagnostics.is_empty() {
                println!("{}: ok", file.display());
            }
        }
        OutputFormat::Json => emit_json(file, &report)?,
    }
    Ok(report.has_errors())
}

fn eval(
    config: &Config,
    file: &Path,
    mut module: ModuleIR,
) -> Result<bool> {
    let report = Analyzer::new(config.clone())
        .run(&mut module)
        .with_context(|| format!("failed to evaluate {}", file.display()))?;
    match config.output.format {
        OutputFormat::Text => {
            for item in &report.items {
                println!("{}: {} = {}", item.name, item.ty, item.value);
            }
            emit_text(config, file, &report);
        }
        OutputFormat::Json => emit_json(file, &report)?,
    }
    Ok(report.has_errors())
}

fn dump(
    config: &Config,
    module: &ModuleIR,
) -> Result<bool> {
    match config.output.format {
        OutputFormat::Text => print!("{}", MirPrinter::new(module).module_to_string()),
        OutputFormat::Json => {
            println!("{}", loader::module_to_string(module, loader::ModuleFormat::Json)?)
        }
    }
    Ok(false)
}

fn emit_text(
    config: &Config,
    file: &Path,
    report: &AnalysisReport,
) {
    if report.diagnostics.is_empty() {
        return;
    }
    let emitter = TextEmitter::with_config(EmitterConfig {
        use_colors: config.output.color,
        file_name: Some(file.display().to_string()),
        ..EmitterConfig::default()
    });
    eprint!("{}", emitter.render_all(&report.diagnostics));
}

fn emit_json(
    file: &Path,
    report: &AnalysisReport,
) -> Result<()> {
    let output = FileReport {
        file: file.display().to_string(),
        bodies: report.bodies.iter().map(|body| body.summary()).collect(),
        items: &report.items,
        diagnostics: report.diagnostics.iter().map(JsonEmitter::to_lsp_diagnostic).collect(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
