use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tailpack::codec::DEFAULT_COMPRESSION_LEVEL;
use tailpack::{AppendOptions, Appender, CodecId, Extractor};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tailpack", about = "Append named blocks to the tail of a file and read them back")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append files as blocks onto an existing file and write the index
    Append {
        /// File to append to; must already exist
        target: PathBuf,
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
        /// Codec: zstd (default), lz4, brotli, none
        #[arg(short, long, default_value = "zstd")]
        codec: String,
        /// Compression level (zstd 1-22; brotli 0-11; ignored otherwise)
        #[arg(short, long, default_value_t = DEFAULT_COMPRESSION_LEVEL)]
        level: i32,
        /// Block names to use instead of the input base names, in input order
        #[arg(short, long)]
        name: Vec<String>,
        /// fsync the file after the index is written
        #[arg(long)]
        sync: bool,
    },
    /// List the blocks in a container
    List {
        input: PathBuf,
    },
    /// Stream one block to stdout
    Cat {
        input: PathBuf,
        name:  String,
    },
    /// Write every block into a directory
    Extract {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Show container metadata
    Info {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match cli.command {

        // ── Append ───────────────────────────────────────────────────────────
        Commands::Append { target, inputs, codec, level, name, sync } => {
            let codec = CodecId::from_name(&codec)
                .ok_or_else(|| format!("unknown codec '{codec}' (expected zstd, lz4, brotli or none)"))?;
            if !name.is_empty() && name.len() != inputs.len() {
                return Err(format!(
                    "--name given {} time(s) for {} input(s)",
                    name.len(),
                    inputs.len()
                )
                .into());
            }

            let opts = AppendOptions { codec, level, sync_on_close: sync };
            let appender = Appender::with_options(&target, opts)?;
            for (i, path) in inputs.iter().enumerate() {
                let desc = match name.get(i) {
                    Some(n) => appender.append_file_as(n.clone(), path)?,
                    None    => appender.append_file(path)?,
                };
                println!("  appended  {}  ({} B at {})",
                    path.display(), desc.compressed_length, desc.start_offset);
            }
            appender.finalize()?;
            println!("Finalized: {}", target.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            let ex = Extractor::open(&input)?;
            println!("Container: {}", input.display());
            println!("{:<32} {:>12} {:>12} {:>7}", "Name", "Offset", "Compressed", "Codec");
            for (name, desc) in &ex.index().blocks {
                println!("{:<32} {:>12} {:>12} {:>7}",
                    name, desc.start_offset, desc.compressed_length, desc.codec);
            }
        }

        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat { input, name } => {
            let ex = Extractor::open(&input)?;
            let mut reader = ex.reader(&name)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            io::copy(&mut reader, &mut out)?;
            out.flush()?;
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir } => {
            let ex = Extractor::open(&input)?;
            let n = ex.extract_all(&output_dir)?;
            println!("Extracted {} block(s) to: {}", n, output_dir.display());
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let ex = Extractor::open(&input)?;
            let body: u64 = ex.index().body_len();
            println!("── tailpack container ───────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Format version {}", ex.format_version());
            println!("  Index offset   {} B", ex.index_offset());
            println!("  Blocks         {}", ex.len());
            println!("  Block bytes    {} B", body);
        }
    }

    Ok(())
}
