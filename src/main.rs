use std::{path::PathBuf, process::ExitCode};

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use colored::Colorize;
use effectc::{CompileError, CompileOptions, GenCode, SourceFile};

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Effect program to compile
    source_file: PathBuf,

    /// Effect class the peer works for
    #[arg(long)]
    effect: String,

    /// Name of the generated peer class. Defaults to `SSE<effect>Peer`
    #[arg(long)]
    peer: Option<String>,

    /// Render state type the peer is generic over
    #[arg(long)]
    generics: Option<String>,

    /// Interface the peer implements
    #[arg(long)]
    interface: Option<String>,

    /// Java package of the peer
    #[arg(long, default_value = "com.sun.scenario.effect.impl.sw.sse")]
    package: String,

    /// Where `<peer>.java` and `<peer>.c` are written
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if !args.source_file.is_file() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Source file '{}' does not exist!", args.source_file.display()),
            )
            .exit()
    }

    let peer = args
        .peer
        .clone()
        .unwrap_or_else(|| format!("SSE{}Peer", args.effect));
    let mut options = CompileOptions::new(&args.effect, &peer).with_package(&args.package);
    if let Some(generics) = &args.generics {
        options = options.with_generics(generics);
    }
    if let Some(interface) = &args.interface {
        options = options.with_interface(interface);
    }

    let source_file = match SourceFile::load(&args.source_file) {
        Ok(source_file) => source_file,
        Err(error) => {
            eprintln!("{} {error}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let result = effectc::compile(&source_file, &options)
        .and_then(|code| write_artifacts(&args.out_dir, &peer, &code));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report(&source_file, &error);
            ExitCode::FAILURE
        }
    }
}

fn write_artifacts(out_dir: &std::path::Path, peer: &str, code: &GenCode) -> Result<(), CompileError> {
    std::fs::create_dir_all(out_dir)?;

    let glue = out_dir.join(format!("{peer}.java"));
    let native = out_dir.join(format!("{peer}.c"));
    std::fs::write(&glue, &code.glue)?;
    std::fs::write(&native, &code.native)?;

    tracing::info!(glue = %glue.display(), native = %native.display(), "wrote artifacts");
    Ok(())
}

fn report(source_file: &SourceFile, error: &CompileError) {
    eprintln!("{} {error}", format!("error[{}]:", error.stage()).red().bold());

    if let Some(span) = error.span() {
        eprintln!("  {} {}", "-->".blue(), source_file.format_span_position(span));
        eprintln!("{}", source_file.highlight_span(span));
    }
}
