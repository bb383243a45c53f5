//! The `prove` command-line driver.
//!
//! A thin dispatcher: all compilation logic lives in `prove-compile`.
//!
//! - `prove check <files>` — run the pipeline, print diagnostics and the
//!   contract coverage summary; exit 0 when error-free, 1 otherwise
//! - `prove emit-c <files>` — additionally write the generated `.c` units
//! - `prove build <files>` — additionally invoke the system C compiler and
//!   exit with its code

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use prove_base::{diag, Style};
use prove_compile::compile::{compile, invoke_cc, write_units, Compilation};
use prove_compile::manifest::Manifest;

#[derive(Parser)]
#[command(name = "prove", version, about = "The Prove compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the project manifest.
    #[arg(long, default_value = "prove.toml", global = true)]
    manifest: PathBuf,

    /// Emit diagnostics as JSON lines instead of rendered text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Type-check and verify without emitting anything.
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Check and write the generated C translation units.
    EmitC {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, default_value = "prove-out")]
        out_dir: PathBuf,
    },
    /// Check, emit, and invoke the system C compiler.
    Build {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, default_value = "prove-out")]
        out_dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, prove_base::FatalError> {
    let manifest = Manifest::load(&cli.manifest)?;

    match cli.command {
        Commands::Check { files } => {
            let compilation = compile(&files, &manifest)?;
            report(&compilation, &manifest, cli.json);
            Ok(exit_code(&compilation))
        }
        Commands::EmitC { files, out_dir } => {
            let compilation = compile(&files, &manifest)?;
            report(&compilation, &manifest, cli.json);
            if !compilation.success() {
                return Ok(ExitCode::FAILURE);
            }
            let written = write_units(&compilation, &out_dir)?;
            for path in written {
                println!("wrote {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Build { files, out_dir } => {
            let compilation = compile(&files, &manifest)?;
            report(&compilation, &manifest, cli.json);
            if !compilation.success() {
                return Ok(ExitCode::FAILURE);
            }
            let written = write_units(&compilation, &out_dir)?;
            let code = invoke_cc(&compilation, &written, &manifest, &out_dir)?;
            Ok(ExitCode::from(code.clamp(0, 255) as u8))
        }
    }
}

fn report(compilation: &Compilation, manifest: &Manifest, json: bool) {
    if json {
        for diagnostic in compilation.diagnostics.iter() {
            println!("{}", diag::render_json(diagnostic, &compilation.sources));
        }
        return;
    }
    let style = Style::colored();
    for diagnostic in compilation.diagnostics.iter() {
        eprint!("{}", diag::render(diagnostic, &compilation.sources, &style));
        eprintln!();
    }
    for (module, summary) in &compilation.coverage {
        eprint!("[{module}] {}", summary.render());
    }
    if compilation.diagnostics.has_errors() {
        eprintln!(
            "error: {} error(s) emitted compiling {} v{}",
            compilation.diagnostics.error_count(),
            manifest.package.name,
            manifest.package.version
        );
    }
}

fn exit_code(compilation: &Compilation) -> ExitCode {
    if compilation.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
