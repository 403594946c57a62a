use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use pyconv_core::wire::{self, WireRequest, WireResponse};
use pyconv_core::{ConvertOptions, Target, convert};

/// Convert a Python subset into C or C++ source.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file to convert (reads stdin when omitted)
    #[arg(short, long)]
    input: Option<String>,

    /// Where to write the generated code (writes stdout when omitted)
    #[arg(short, long)]
    output: Option<String>,

    #[arg(short, long, value_enum, default_value_t = TargetArg::C)]
    target: TargetArg,

    #[arg(
        long,
        value_name = "N",
        default_value_t = pyconv_core::options::DEFAULT_MAX_DEPTH,
        help = "Maximum nesting of blocks and expressions"
    )]
    max_depth: usize,

    #[arg(
        long,
        value_name = "N",
        default_value_t = pyconv_core::options::DEFAULT_INDENT_WIDTH,
        help = "Spaces per indentation level in generated code"
    )]
    indent: usize,

    #[arg(
        long,
        help = "Read a JSON request {sourceText, target} and write a JSON response"
    )]
    json: bool,

    #[arg(short, long, help = "Log pipeline stages to stderr")]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TargetArg {
    C,
    Cpp,
}

impl From<TargetArg> for Target {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::C => Target::C,
            TargetArg::Cpp => Target::Cpp,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli)
}

/// Installs a stderr subscriber when `RUST_LOG` is set or `--verbose` is
/// given.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        return;
    };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let source = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {path}"))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            buffer
        }
    };
    let options = ConvertOptions::default()
        .with_max_depth(cli.max_depth)
        .with_indent_width(cli.indent);

    if cli.json {
        let request: WireRequest =
            serde_json::from_str(&source).context("input is not a valid conversion request")?;
        let response = wire::handle(&request, &options);
        let mut text = serde_json::to_string_pretty(&response)?;
        text.push('\n');
        write_output(cli.output.as_deref(), &text)?;
        if let WireResponse::Failure(failure) = response {
            bail!("conversion failed: {}", failure.error);
        }
        return Ok(());
    }

    let result = convert(&source, cli.target.into(), &options);
    let origin = cli.input.as_deref().unwrap_or("<stdin>");
    for diagnostic in &result.diagnostics {
        eprintln!("{origin}:{diagnostic}");
    }
    if let Some(error) = result.error {
        bail!("conversion failed: {error}");
    }
    write_output(cli.output.as_deref(), &result.generated_code)
}

fn write_output(path: Option<&str>, text: &str) -> Result<()> {
    let Some(path) = path else {
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(text.as_bytes())
            .context("failed to write stdout")?;
        return Ok(());
    };
    if let Some(parent) = PathBuf::from(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, text).with_context(|| format!("failed to write output file {path}"))?;
    Ok(())
}
