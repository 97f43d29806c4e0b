use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use splat_glb::convert::{convert_to_glb_file, convert_to_ply_file, ConvertOptions};
use splat_glb::glb_format::read_glb;
use splat_glb::outlier_filter::{PointFilter, StatisticalOutlierFilter};
use splat_glb::ply_format::load_point_set;
use std::path::{Path, PathBuf};
use vek::Vec3;

#[derive(Args)]
struct DenoiseArgs {
    #[arg(long)]
    /// Remove statistical outliers before writing.
    denoise: bool,

    #[arg(long)]
    /// Neighbors considered per point when denoising [default: 200]
    neighbor_count: Option<usize>,

    #[arg(long)]
    /// Standard deviation multiplier for the outlier threshold [default: 2.0]
    std_ratio: Option<f32>,

    #[arg(long, value_name = "FILE")]
    /// JSON file with conversion options. Flags given on the command line take precedence.
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a splat .ply file to a .glb point cloud
    Glb {
        #[arg(value_name = "INPUT")]
        /// The input .ply file
        input: PathBuf,

        #[arg(value_name = "OUTPUT")]
        /// The output .glb file
        output: PathBuf,

        #[arg(short, long)]
        /// Also write scale, rotation and higher order spherical harmonics.
        extended: bool,

        #[arg(short, long)]
        /// Store colors as normalized 8 bit values instead of floats.
        compact: bool,

        #[arg(long)]
        /// Pack buffer views back to back without 4 byte alignment.
        unaligned: bool,

        #[command(flatten)]
        denoise: DenoiseArgs,
    },

    /// Convert a splat .ply file to a .ply file with 8 bit colors
    Ply {
        #[arg(value_name = "INPUT")]
        /// The input .ply file
        input: PathBuf,

        #[arg(value_name = "OUTPUT")]
        /// The output .ply file
        output: PathBuf,

        #[arg(short, long)]
        /// Keep the f_rest_0 .. f_rest_44 properties.
        with_rest: bool,

        #[command(flatten)]
        denoise: DenoiseArgs,
    },

    /// Print the structure of a .ply or .glb file
    Info {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    better_panic::install();
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Glb {
            input,
            output,
            extended,
            compact,
            unaligned,
            denoise,
        } => {
            let mut options = base_options(&denoise)?;
            options.extended_attributes |= extended;
            options.compact_color |= compact;
            options.align_buffer_views &= !unaligned;
            let filter = StatisticalOutlierFilter::new();
            convert_to_glb_file(&input, &output, &options, Some(&filter as &dyn PointFilter))
                .with_context(|| format!("Converting {} to glb", input.display()))?;
        }
        Commands::Ply {
            input,
            output,
            with_rest,
            denoise,
        } => {
            let mut options = base_options(&denoise)?;
            options.extended_attributes |= with_rest;
            let filter = StatisticalOutlierFilter::new();
            convert_to_ply_file(&input, &output, &options, Some(&filter as &dyn PointFilter))
                .with_context(|| format!("Converting {} to ply", input.display()))?;
        }
        Commands::Info { input } => {
            info(&input)?;
        }
    }
    Ok(())
}

fn base_options(args: &DenoiseArgs) -> Result<ConvertOptions> {
    let mut options = match &args.config {
        Some(path) => ConvertOptions::from_json_path(path)
            .with_context(|| format!("Reading config {}", path.display()))?,
        None => ConvertOptions::default(),
    };
    options.denoise |= args.denoise;
    if let Some(neighbor_count) = args.neighbor_count {
        options.neighbor_count = neighbor_count;
    }
    if let Some(std_ratio) = args.std_ratio {
        options.std_ratio = std_ratio;
    }
    Ok(options)
}

fn info(input: &Path) -> Result<()> {
    let extension = input
        .extension()
        .and_then(|s| s.to_str())
        .ok_or(anyhow::anyhow!("No extension"))?;
    match extension {
        "glb" => {
            let bytes = std::fs::read(input)?;
            let container = read_glb(&bytes)?;
            println!("{}", serde_json::to_string_pretty(&container.json)?);
            println!("Binary chunk: {} bytes", container.binary.len());
        }
        "ply" => {
            let points = load_point_set(input)?;
            println!("Points: {}", points.len());
            println!(
                "Higher order spherical harmonics: {}",
                if points.extended.is_some() { "yes" } else { "no" }
            );

            let mut min = Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
            let mut max = Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
            for p in points.positions() {
                min = Vec3::partial_min(min, *p);
                max = Vec3::partial_max(max, *p);
            }
            println!("Bounding box: min: {}, max: {}", min, max);
            println!("Center: {}", (min + max) / 2.0);
        }
        other => anyhow::bail!("Unsupported file extension: {}", other),
    }
    Ok(())
}
