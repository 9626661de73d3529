//! pl0 - compile and run PL/0 programs on the P-Code machine.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pl0::bytecode::Program;
use pl0::bytecode::disasm::{print_program, print_symbols};
use pl0::compiler::quad::print_quads;
use pl0::frontend::Lexer;
use pl0::frontend::token_dumper::TokenDumper;
use pl0::runtime::io::{ReaderInput, WriterOutput};
use pl0::runtime::{Input, Vm, VmConfig};

#[derive(Parser, Debug)]
#[command(name = "pl0")]
#[command(about = "Compile a PL/0 program to P-Code and run it")]
struct Cli {
    /// PL/0 source (.pl0), P-Code listing (.pcode) or binary program (.pcb)
    file: PathBuf,

    /// Print the token stream and lexical errors, then exit
    #[arg(long)]
    tokens: bool,

    /// Disable colors in the token listing
    #[arg(long)]
    no_color: bool,

    /// Print the disassembled program
    #[arg(long)]
    code: bool,

    /// Print the symbol table (source input only)
    #[arg(long)]
    symbols: bool,

    /// Print the quadruple intermediate code (source input only)
    #[arg(long)]
    quads: bool,

    /// Values for `read`, separated by spaces or commas; stdin is used if absent
    #[arg(long)]
    input: Option<String>,

    /// Write the compiled program to this path
    #[arg(long)]
    emit: Option<PathBuf>,

    /// Emit the binary form instead of the text listing
    #[arg(long)]
    binary: bool,

    /// Compile (and emit) without running
    #[arg(long)]
    no_run: bool,

    /// Instruction budget; 0 disables the limit
    #[arg(long, default_value = "1000000")]
    max_steps: usize,

    /// Stack size limit in slots
    #[arg(long, default_value = "10000")]
    max_stack: usize,

    /// Procedure call nesting limit
    #[arg(long, default_value = "1000")]
    max_depth: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pl0=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    if cli.tokens {
        let source = read_source(&cli.file)?;
        let lexed = Lexer::new(&source).tokenize_recovering();
        let mut dumper = TokenDumper::new();
        if cli.no_color {
            dumper = dumper.no_color();
        }
        dumper.dump(&lexed.tokens, &lexed.errors);
        if lexed.has_errors() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let program = load_program(&cli)?;

    if cli.code {
        print_program(&program);
    }

    if let Some(path) = &cli.emit {
        emit_program(&program, path, cli.binary)?;
    }

    if cli.no_run {
        return Ok(());
    }

    let config = VmConfig {
        max_steps: (cli.max_steps > 0).then_some(cli.max_steps),
        max_stack_size: cli.max_stack,
        max_call_depth: cli.max_depth,
    };

    let mut input: Box<dyn Input> = match &cli.input {
        Some(values) => Box::new(parse_input(values)?),
        None => Box::new(ReaderInput::new(BufReader::new(io::stdin()))),
    };
    let mut output = WriterOutput::new(io::stdout().lock());

    Vm::with_config(config).run(&program, input.as_mut(), &mut output)?;
    Ok(())
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))
}

/// Compiles source files; loads listings and binaries as they are.
fn load_program(cli: &Cli) -> anyhow::Result<Program> {
    let path = cli.file.as_path();
    match path.extension().and_then(|e| e.to_str()) {
        Some("pcode") => {
            warn_source_only(cli);
            Ok(Program::from_listing(&read_source(path)?)?)
        }
        Some("pcb") => {
            warn_source_only(cli);
            let bytes = fs::read(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            Ok(Program::from_bytes(&bytes)?)
        }
        Some("pl0") => {
            let compiled = pl0::compile_source(&read_source(path)?)?;
            if cli.symbols {
                print_symbols(&compiled.symbols);
            }
            if cli.quads {
                print_quads(&compiled.quads);
            }
            Ok(compiled.program)
        }
        _ => bail!(
            "expected a .pl0, .pcode or .pcb file, got '{}'",
            path.display()
        ),
    }
}

fn warn_source_only(cli: &Cli) {
    if cli.symbols {
        tracing::warn!("symbol table is only available when compiling source");
    }
    if cli.quads {
        tracing::warn!("quadruples are only available when compiling source");
    }
}

fn emit_program(program: &Program, path: &Path, binary: bool) -> anyhow::Result<()> {
    let written = if binary {
        fs::write(path, program.to_bytes()?)
    } else {
        fs::write(path, program.to_listing())
    };
    written.with_context(|| format!("failed to write '{}'", path.display()))?;

    tracing::info!(path = %path.display(), binary, "program written");
    Ok(())
}

fn parse_input(values: &str) -> anyhow::Result<VecDeque<i64>> {
    values
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("invalid input value '{}'", s))
        })
        .collect()
}
