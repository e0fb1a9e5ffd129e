use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{info, warn};
use plugscan::{
    ClassificationPipeline, ClassificationResult, ConnectorCatalog, ConnectorInfo, DecodedImage, LabelTable,
    ModelBundle, Offer, Outcome, PixelFormat, RawFrame, RuntimeConfig, StreamWorker,
};
use serde::Serialize;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model bundle directory (defaults to $PLUGSCAN_BUNDLE, then the user data directory)
    #[arg(short, long, global = true)]
    bundle: Option<PathBuf>,

    /// Intra-op threads used for inference
    #[arg(short, long, default_value_t = 4, global = true)]
    threads: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify imported image files
    Classify {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Number of ranked scores to show
        #[arg(long, default_value_t = 3)]
        top: usize,
        /// Print one JSON object per image
        #[arg(long)]
        json: bool,
    },
    /// Replay a directory of images as a live camera stream
    Stream {
        dir: PathBuf,
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Number of frames to emit
        #[arg(long, default_value_t = 300)]
        frames: usize,
    },
    /// Print the label table
    Labels,
    /// Verify the model checksum
    Verify,
}

#[derive(Serialize)]
struct Report<'a> {
    path: &'a Path,
    #[serde(flatten)]
    result: &'a ClassificationResult,
    info: Option<&'a ConnectorInfo>,
}

fn build_pipeline(bundle: &ModelBundle, threads: usize) -> anyhow::Result<ClassificationPipeline> {
    let start_time = Instant::now();
    let pipeline = ClassificationPipeline::builder()
        .with_runtime_config(RuntimeConfig::default().with_intra_threads(threads))
        .with_bundle(bundle)?
        .build()?;
    info!("Pipeline built in {:.2?}", start_time.elapsed());
    Ok(pipeline)
}

fn load_catalog(bundle: &ModelBundle) -> ConnectorCatalog {
    bundle.load_catalog().unwrap_or_else(|e| {
        warn!("Ignoring technical-info catalog: {}", e);
        ConnectorCatalog::default()
    })
}

fn print_result(result: &ClassificationResult, labels: &LabelTable, catalog: &ConnectorCatalog, top: usize) {
    println!("  Predicted class: {}", result.label);
    println!("  Confidence: {:.1}%", result.confidence * 100.0);
    println!("  Scores (top {}):", top);
    for (label, score) in result.ranked(labels, top) {
        println!("    {}: {:.1}%", label, score * 100.0);
    }
    if let Some(info) = catalog.lookup(&result.label) {
        println!("  Compatibility: {}", info.compatibility);
        println!("  Speed: {}", info.speed);
        println!("  Power: {}", info.power);
        println!("  Uses: {}", info.uses);
    }
}

fn classify(bundle: &ModelBundle, threads: usize, images: &[PathBuf], top: usize, json: bool) -> anyhow::Result<()> {
    let pipeline = build_pipeline(bundle, threads)?;
    let catalog = load_catalog(bundle);
    let mut failures = 0;

    for path in images {
        let start_time = Instant::now();
        match pipeline.classify_file(path) {
            Outcome::Success(result) => {
                if json {
                    let report = Report {
                        path,
                        result: &result,
                        info: catalog.lookup(&result.label),
                    };
                    println!("{}", serde_json::to_string(&report)?);
                } else {
                    println!("\n{} ({:.2?}):", path.display(), start_time.elapsed());
                    print_result(&result, pipeline.labels(), &catalog, top);
                }
            }
            Outcome::Failed(err) => {
                failures += 1;
                eprintln!("\n{}: classification failed: {}", path.display(), err);
            }
            other => {
                failures += 1;
                eprintln!("\n{}: no result ({:?})", path.display(), other);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} images could not be classified", failures, images.len());
    }
    Ok(())
}

fn load_frames(dir: &Path) -> anyhow::Result<Vec<(u32, u32, Vec<u8>)>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut frames = Vec::new();
    for path in paths {
        match DecodedImage::open(&path) {
            Ok(image) => {
                let rgb = image.as_dynamic().to_rgb8();
                frames.push((rgb.width(), rgb.height(), rgb.into_raw()));
            }
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    if frames.is_empty() {
        bail!("No decodable images in {}", dir.display());
    }
    Ok(frames)
}

fn stream(bundle: &ModelBundle, threads: usize, dir: &Path, fps: u32, count: usize) -> anyhow::Result<()> {
    let frames = load_frames(dir)?;
    let pipeline = Arc::new(build_pipeline(bundle, threads)?);
    let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let worker = StreamWorker::spawn(Arc::clone(&pipeline), move |result| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        println!("[{}] {} ({:.1}%)", n, result.label, result.confidence * 100.0);
    })?;

    info!("=== Streaming {} frames at {} fps ===", count, fps);
    let (mut queued, mut dropped, mut skipped) = (0, 0, 0);
    let start_time = Instant::now();
    for i in 0..count {
        let (width, height, data) = &frames[i % frames.len()];
        let frame = RawFrame::new(*width, *height, PixelFormat::Rgb8, data.clone());
        match worker.offer(frame) {
            Offer::Queued => queued += 1,
            Offer::Dropped => dropped += 1,
            Offer::Skipped => skipped += 1,
        }
        thread::sleep(interval);
    }
    worker.stop();

    let stats = pipeline.gate_stats();
    info!("=== Stream complete in {:.2?} ===", start_time.elapsed());
    println!("\nFrames offered: {}", count);
    println!("  Queued: {}", queued);
    println!("  Dropped while busy: {}", dropped);
    println!("  Skipped: {}", skipped);
    println!("  Results delivered: {}", delivered.load(Ordering::SeqCst));
    println!("  Gate: {} admitted, {} released", stats.admitted, stats.released);
    Ok(())
}

fn print_labels(bundle: &ModelBundle) -> anyhow::Result<()> {
    let labels = bundle.load_labels()?.unwrap_or_else(LabelTable::reference);
    for (i, label) in labels.iter().enumerate() {
        println!("{:>3}  {}", i, label);
    }
    Ok(())
}

fn verify(bundle: &ModelBundle) -> anyhow::Result<()> {
    match bundle.verify_model()? {
        Some(true) => println!("{}: checksum OK", bundle.model_path().display()),
        Some(false) => bail!("{}: checksum mismatch", bundle.model_path().display()),
        None => println!("{}: no checksum to verify against", bundle.root().display()),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let bundle = args
        .bundle
        .map(ModelBundle::new)
        .unwrap_or_else(ModelBundle::new_default);

    match args.command {
        Command::Classify { images, top, json } => classify(&bundle, args.threads, &images, top, json),
        Command::Stream { dir, fps, frames } => stream(&bundle, args.threads, &dir, fps, frames),
        Command::Labels => print_labels(&bundle),
        Command::Verify => verify(&bundle),
    }
}
