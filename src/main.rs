//! dmfront Command Line Interface
//!
//! Usage:
//!   dmfront [OPTIONS] <input-file>
//!   dmfront --help
//!
//! Examples:
//!   dmfront code.dm                          # Compile and report diagnostics
//!   dmfront --emit=ops code.dm               # Print the operations of every proc
//!   dmfront --emit=tokens code.dm            # Dump the lexer output
//!   dmfront --werror --suppress=EmptyBlock code.dm

use clap::{Parser, ValueEnum};
use dmfront::compile::{self, MemoryTree};
use dmfront::frontend::Lexer;
use dmfront::utils::{Diagnostics, ErrorCode, FileId, FrontendConfig, SourceMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::fs;
use anyhow::{bail, Context, Result};
use log::{info, debug};

/// dmfront - front end for DM compilers
#[derive(Parser, Debug)]
#[command(name = "dmfront")]
#[command(author = "dmfront contributors")]
#[command(version)]
#[command(about = "Lex, parse and compile DM source", long_about = None)]
struct Cli {
    /// Input file (.dm)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// What to emit
    #[arg(long, default_value = "diagnostics")]
    emit: EmitKind,

    /// Treat warnings as errors
    #[arg(long)]
    werror: bool,

    /// Disable a diagnostic code (`OD3100`, `3100` or `EmptyBlock`)
    #[arg(long, value_name = "CODE", value_parser = parse_code)]
    suppress: Vec<ErrorCode>,

    /// Do not report code after an unconditional return or loop exit
    #[arg(long)]
    no_unreachable: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// Lexer tokens, one per line
    Tokens,
    /// Abstract Syntax Tree after constant folding
    Ast,
    /// Operations recorded for every proc
    Ops,
    /// Diagnostics only
    Diagnostics,
}

fn parse_code(text: &str) -> Result<ErrorCode, String> {
    text.parse()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("dmfront v{}", dmfront::VERSION);
    debug!("Input file: {:?}", cli.input);

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read input file: {:?}", cli.input))?;
    let source_map = SourceMap::new(cli.input.display().to_string(), source.clone());

    if matches!(cli.emit, EmitKind::Tokens) {
        let output: Vec<String> = Lexer::from_source(&source, FileId(0))
            .map(|token| format!("{:?} {}", token.kind, token))
            .collect();
        return write_output(&cli.output, &output.join("\n"));
    }

    let config = Arc::new(build_config(&cli));
    debug!("Frontend config: {:?}", config);

    info!("Parsing...");
    let (file, mut diagnostics) =
        dmfront::frontend::parse_source_with(&source, FileId(0), Diagnostics::with_config(config));

    if matches!(cli.emit, EmitKind::Ast) {
        report(&source_map, &diagnostics, cli.quiet);
        return write_output(&cli.output, &format!("{:#?}", file));
    }

    info!("Compiling procs...");
    let mut tree = MemoryTree::from_file(&file);
    compile::resolve_globals(&tree, &mut diagnostics);
    let compiled = compile::compile_file(&file, &mut tree, &mut diagnostics);

    if matches!(cli.emit, EmitKind::Ops) {
        let mut output = String::new();
        for (proc, emitter) in &compiled {
            output.push_str(&format!("{} ({} locals, {})\n", proc.path, proc.local_count, proc.termination));
            output.push_str(&emitter.to_string());
            output.push('\n');
        }
        write_output(&cli.output, &output)?;
    }

    report(&source_map, &diagnostics, cli.quiet);
    info!(
        "{} procs, {} errors, {} warnings",
        compiled.len(),
        diagnostics.error_count(),
        diagnostics.warning_count()
    );

    if diagnostics.has_errors() {
        bail!("compilation failed with {} errors", diagnostics.error_count());
    }
    Ok(())
}

fn build_config(cli: &Cli) -> FrontendConfig {
    let mut config = FrontendConfig {
        warnings_as_errors: cli.werror,
        report_unreachable_code: !cli.no_unreachable,
        ..Default::default()
    };
    for code in &cli.suppress {
        config.suppress(*code);
    }
    config
}

fn report(source_map: &SourceMap, diagnostics: &Diagnostics, quiet: bool) {
    for diagnostic in diagnostics.iter() {
        if quiet && !diagnostic.is_error() {
            continue;
        }
        let Some(span) = diagnostic.span.filter(|span| !span.is_dummy()) else {
            eprintln!("{}", diagnostic);
            continue;
        };
        eprintln!("{}: {} {}: {}", source_map.describe(&span), diagnostic.severity, diagnostic.code, diagnostic.message);
        if let Some(line) = source_map.line(span.start_line) {
            eprintln!("    {}", line);
        }
        for note in &diagnostic.notes {
            eprintln!("    = {}", note);
        }
    }
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content)
                .with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
