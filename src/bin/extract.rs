//! Extractor binary: indexes a delimited automobile file and writes the
//! transformed feature matrix.
//!
//! ## Output
//!
//! Delimited text, one line per row: the header first (one-hot fields expanded
//! to `{field}_{value}` columns), then one line per eligible record. Records
//! with a missing value (`-`) in any selected field are left out. Encoded
//! byte values are written back as UTF-8, lossily.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin extract -- --input data/autos.txt --output autos.csv
//! cargo run --release --bin extract -- --input data/autos.txt --config selection.json --mmap
//! ```

use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use autoextractor::automobile;
use clap::Parser;
use fieldstream::{Row, Session, SourceKind, load_config};
use indicatif::{HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use tracing::info;

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(about = "Extract a feature matrix from a delimited automobile file")]
struct Args {
    /// Delimited input file, header line first.
    #[arg(long)]
    input: PathBuf,

    /// JSON selection file. The built-in automobile selection is used when
    /// omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output file. Rows go to stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Read field values through a memory map instead of seek + read.
    #[arg(long, default_value_t = false)]
    mmap: bool,

    /// Field delimiter of the input (and output), overriding the selection file.
    #[arg(long)]
    delimiter: Option<char>,
}

fn write_line<W, T>(out: &mut W, items: impl IntoIterator<Item = T>, delimiter: char) -> io::Result<()>
where
    W: Write,
    T: Display,
{
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            write!(out, "{delimiter}")?;
        }
        write!(out, "{item}")?;
    }
    writeln!(out)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path, automobile::catalog())?,
        None => automobile::default_config()?,
    };
    if let Some(c) = args.delimiter {
        if !c.is_ascii() {
            return Err(format!("delimiter {c:?} is not an ASCII character").into());
        }
        config.options.delimiter = c as u8;
    }
    let delimiter = config.options.delimiter as char;

    info!("Input:    {}", args.input.display());
    info!(
        "Features: {}",
        config
            .selection
            .fields()
            .iter()
            .filter_map(|f| config.selection.catalog().name(*f))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let source = if args.mmap {
        SourceKind::Mapped
    } else {
        SourceKind::File
    };
    let mut session = Session::new(config)?.with_source(source);

    let start = Instant::now();
    let total = session.index(&args.input)?.len() as u64;

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut out = BufWriter::new(sink);

    let pb = ProgressBar::new(total);
    pb.set_style(ProgressStyle::with_template(
        "  Extracting {bar:40.cyan/blue} {pos}/{len} rows [{elapsed_precise}]",
    )?);

    let mut written = 0u64;
    for row in session.rows(&args.input)? {
        match row? {
            Row::Header(names) => write_line(&mut out, &names, delimiter)?,
            Row::Record { values, .. } => write_line(&mut out, &values, delimiter)?,
        }
        written += 1;
        pb.inc(1);
    }
    out.flush()?;
    pb.finish_and_clear();

    info!(
        "Wrote {} rows in {}",
        HumanCount(written),
        HumanDuration(start.elapsed())
    );
    if let Some(path) = &args.output {
        info!("Output:   {}", path.display());
    }
    Ok(())
}
