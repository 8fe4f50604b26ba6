//! CLI tool for shrinking the images embedded in PowerPoint files.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use pptslim_core::{ImageTranscoder, OptimizeMode, OptimizerConfig, RunReport};
use pptslim_pptx::PresentationOptimizer;
use pptslim_transcode::{ConvertToLossyFormat, LosslessRecompress};
use std::path::PathBuf;

/// Shrink the PNG images inside a .pptx file.
#[derive(Parser, Debug)]
#[command(name = "pptslim")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["optipng", "png_to_jpg"])))]
struct Args {
    /// Recompress PNG images losslessly with optipng
    #[arg(long)]
    optipng: bool,

    /// Convert PNG images to JPEG wherever the JPEG is smaller
    #[arg(long = "png-to-jpg")]
    png_to_jpg: bool,

    /// Input PowerPoint file (.pptx)
    input: PathBuf,

    /// Output PowerPoint file
    output: PathBuf,

    /// Number of images processed in parallel (default: number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Also rewrite references from slide layouts, masters and notes
    #[arg(long)]
    all_rels: bool,

    /// Do not register new image extensions in [Content_Types].xml
    #[arg(long)]
    keep_content_types: bool,

    /// optipng executable
    #[arg(long, default_value = "optipng")]
    optipng_bin: PathBuf,

    /// optipng optimization level
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u8).range(0..=7))]
    level: u8,

    /// ImageMagick convert executable
    #[arg(long, default_value = "convert")]
    convert_bin: PathBuf,

    /// JPEG quality (default: ImageMagick's choice)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: Option<u8>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn mode(&self) -> OptimizeMode {
        if self.png_to_jpg {
            OptimizeMode::PngToJpg
        } else {
            OptimizeMode::Optipng
        }
    }

    fn config(&self) -> OptimizerConfig {
        let mut config = OptimizerConfig::new().with_content_types(!self.keep_content_types);
        if let Some(jobs) = self.jobs {
            config = config.with_workers(jobs);
        }
        if self.all_rels {
            config = config.with_all_relationships();
        }
        config
    }

    fn transcoder(&self) -> Box<dyn ImageTranscoder> {
        match self.mode() {
            OptimizeMode::Optipng => Box::new(
                LosslessRecompress::new()
                    .with_program(&self.optipng_bin)
                    .with_level(self.level),
            ),
            OptimizeMode::PngToJpg => Box::new(
                ConvertToLossyFormat::new()
                    .with_program(&self.convert_bin)
                    .with_quality(self.jpeg_quality),
            ),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    if args.verbose {
        eprintln!("Processing: {} ({})", args.input.display(), args.mode());
    }

    let optimizer = PresentationOptimizer::new(args.transcoder(), args.config());
    let report = optimizer
        .optimize_file(&args.input, &args.output)
        .with_context(|| format!("Failed to optimize {}", args.input.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", json);
    }

    if args.verbose {
        print_summary(&report);
        eprintln!("Written to: {}", args.output.display());
    }

    Ok(())
}

/// Print a short human-readable summary of a run.
fn print_summary(report: &RunReport) {
    eprintln!("  Members: {}", report.members);
    eprintln!(
        "  Images: {} examined, {} replaced, {} kept",
        report.images_examined, report.images_replaced, report.images_kept
    );
    if report.mode == OptimizeMode::PngToJpg {
        eprintln!("  References rewritten: {}", report.references_rewritten);
    }
    eprintln!(
        "  Image bytes: {} -> {} ({} saved)",
        report.image_bytes_before,
        report.image_bytes_after,
        report.bytes_saved()
    );
}
