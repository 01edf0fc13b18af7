use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use lsm2npz_rs::logger;
use lsm2npz_rs::volume_pipeline::config::{DEFAULT_CHANNEL_MAP, DEFAULT_DS, DEFAULT_SIGMA};
use lsm2npz_rs::volume_pipeline::{
    ChannelMap, ConvertConfig, StackReader, StackToNpzPipeline, TiffStackReader, discover_files,
};

#[derive(Parser)]
#[command(name = "lsm2npz")]
#[command(
    about = "Convert LSM/TIFF confocal stacks into NPZ bundles (r, g, b + meta.json) for the browser volume viewer"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a stack file or a directory of stacks.
    Convert(ConvertArgs),

    /// Print stack geometry without converting.
    Info {
        /// Path to the stack file to inspect.
        input: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct ConvertArgs {
    /// Path to a single stack OR a directory to process.
    input: PathBuf,

    /// Output NPZ path (for a single file) OR output directory (for batch).
    output: PathBuf,

    /// XY downsample stride (1 keeps full resolution).
    #[arg(long, default_value_t = DEFAULT_DS)]
    ds: NonZeroUsize,

    /// Gaussian background sigma in pixels; 0 disables subtraction.
    #[arg(long, default_value_t = DEFAULT_SIGMA)]
    sigma: f32,

    /// Channel map 'r,g,b': the source channel index feeding each display channel.
    #[arg(long, default_value_t = DEFAULT_CHANNEL_MAP)]
    map: ChannelMap,

    /// Recurse into subdirectories (only relevant when input is a directory).
    #[arg(long)]
    recursive: bool,

    /// Also process .tif/.tiff files (default processes only .lsm).
    #[arg(long)]
    include_tiff: bool,
}

fn main() -> anyhow::Result<()> {
    logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert(args) => run_convert(&args),
        Commands::Info { input } => run_info(&input),
    }
}

fn run_convert(args: &ConvertArgs) -> anyhow::Result<()> {
    info!("Starting lsm2npz...");

    let config = ConvertConfig::builder()
        .ds(args.ds)
        .sigma(args.sigma)
        .channel_map(args.map)
        .build();
    let pipeline = StackToNpzPipeline::new(config);

    info!("Stack to NPZ pipeline initialized");
    info!("Decimation stride: {}", pipeline.config().ds);
    info!("Background sigma: {}", pipeline.config().sigma);
    info!("Channel map: {}", pipeline.config().channel_map);

    let files = discover_files(&args.input, args.include_tiff, args.recursive);
    if files.is_empty() {
        bail!("no matching input files under {}", args.input.display());
    }

    if args.input.is_file() {
        // Single-file mode: failures abort the run.
        let output = single_output_path(&args.input, &args.output);
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output directory {}", parent.display()))?;
        }
        pipeline.convert_file(&args.input, &output)?;
        return Ok(());
    }

    // Batch mode: per-file failures are logged and the run keeps going.
    fs::create_dir_all(&args.output)
        .with_context(|| format!("create output directory {}", args.output.display()))?;

    let mut failed = 0usize;
    for file in &files {
        let output = args.output.join(npz_file_name(file));
        if let Err(e) = pipeline.convert_file(file, &output) {
            failed += 1;
            error!("Conversion failed for {}: {}", file.display(), e);
        }
    }

    info!(converted = files.len() - failed, failed, "Batch complete");
    Ok(())
}

/// Mirrors the batch naming rule for a lone input: an output path that is a
/// directory or lacks the `.npz` extension receives the input's stem.
fn single_output_path(input: &Path, output: &Path) -> PathBuf {
    let is_npz = output
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("npz"));
    if output.is_dir() || !is_npz {
        output.join(npz_file_name(input))
    } else {
        output.to_path_buf()
    }
}

fn npz_file_name(input: &Path) -> PathBuf {
    // Appending keeps dotted stems intact; with_extension would eat
    // everything after the stem's last dot.
    let mut name = input.file_stem().unwrap_or(input.as_os_str()).to_os_string();
    name.push(".npz");
    PathBuf::from(name)
}

fn run_info(input: &Path) -> anyhow::Result<()> {
    let bytes = fs::read(input).with_context(|| format!("read {}", input.display()))?;
    let stack = TiffStackReader.read_stack(&bytes)?;

    let shape = stack.data.shape();
    let channels = match shape.len() {
        3 => Some(1),
        4 => Some(shape[1]),
        5 => Some(shape[2]),
        _ => None,
    };

    println!("{}", input.display());
    println!("  shape:      {shape:?} ({})", axis_labels(shape.len()));
    if let Some(channels) = channels {
        println!("  channels:   {channels}");
    }
    println!(
        "  voxel um:   {} x {} x {} (X x Y x Z)",
        voxel_um_label(stack.voxel_size.x),
        voxel_um_label(stack.voxel_size.y),
        voxel_um_label(stack.voxel_size.z),
    );

    Ok(())
}

fn axis_labels(rank: usize) -> &'static str {
    match rank {
        3 => "Z x Y x X",
        4 => "Z x C x Y x X",
        5 => "T x Z x C x Y x X",
        _ => "unrecognized layout",
    }
}

fn voxel_um_label(meters: Option<f64>) -> String {
    match meters {
        Some(m) => format!("{:.3}", m * 1e6),
        None => "1.000 (default)".to_string(),
    }
}
