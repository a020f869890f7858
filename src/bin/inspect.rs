//! Inspect how a delimited automobile file indexes: record counts, sample
//! index entries with their decoded field text, and the category maps of the
//! one-hot fields.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin inspect -- --input data/autos.txt
//! cargo run --release --bin inspect -- --input data/autos.txt --config selection.json --sample-records 10
//! ```

use std::path::PathBuf;

use autoextractor::automobile;
use clap::Parser;
use fieldstream::source::{FileSource, read_field};
use fieldstream::{Session, load_config};

#[derive(Parser, Debug)]
#[command(about = "Inspect the offset index of a delimited automobile file")]
struct Args {
    /// Delimited input file, header line first.
    #[arg(long)]
    input: PathBuf,

    /// JSON selection file. The built-in automobile selection is used when
    /// omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of index entries to dump (0 to skip).
    #[arg(long, default_value_t = 5)]
    sample_records: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path, automobile::catalog())?,
        None => automobile::default_config()?,
    };
    let mut session = Session::new(config)?;
    session.index(&args.input)?;
    let index = session.offset_index().ok_or("file was not indexed")?;

    // ── Overview ──────────────────────────────────────────────────────────
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  File: {}", args.input.display());
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Records:      {:>10}", index.records_seen());
    println!("║  Indexed:      {:>10} (header included)", index.len());
    println!("║  Skipped:      {:>10} (missing values)", index.skipped());
    println!("║  Empty lines:  {:>10}", index.empty_lines());
    println!("║  Fields/entry: {:>10}", index.width());
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // ── Sample entries ───────────────────────────────────────────────────
    if args.sample_records > 0 {
        let selection = session.selection();
        let mut source = FileSource::open(&args.input)?;
        println!("── First {} index entries ──", args.sample_records);
        for (key, spans) in index.iter().take(args.sample_records) {
            println!("  record {key}");
            for (slot, span) in spans.iter().enumerate() {
                let name = selection.field_name(slot);
                let raw = read_field(&mut source, key, name, *span)?;
                println!(
                    "    {name:<20} @{:<10} +{:<4} {:?}",
                    span.offset, span.len, raw
                );
            }
        }
        println!();
    }

    // ── Category maps ────────────────────────────────────────────────────
    let one_hot: Vec<usize> = session.selection().one_hot_slots().collect();
    if !one_hot.is_empty() {
        drop(session.rows(&args.input)?);
        let selection = session.selection();
        for slot in one_hot {
            let field = selection.field(slot);
            let Some(map) = session.categories().get(field) else {
                continue;
            };
            println!(
                "── {} ({} categories) ──",
                selection.field_name(slot),
                map.len()
            );
            for (i, value) in map.values().enumerate() {
                println!("  {i:>4}  {value}");
            }
        }
    }

    Ok(())
}
