use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::*;
use std::fs::File;
use std::io::{BufWriter, Write};

use facetrack::args::Args;
use facetrack::{FacePipeline, PipelineConfig};

fn main() -> Result<()> {
    let args = Args::parse();

    let config = PipelineConfig::load()?;
    let mut pipeline = FacePipeline::with_onnx(config)?;

    let mut frame_paths: Vec<_> = std::fs::read_dir(&args.frames)
        .with_context(|| format!("reading frame directory {}", args.frames.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("png" | "jpg" | "jpeg" | "bmp")
            )
        })
        .collect();
    frame_paths.sort();
    if frame_paths.is_empty() {
        bail!("no frame images found in {}", args.frames.display());
    }
    println!("Replaying {} frames at {} fps", frame_paths.len(), args.fps);

    let mut dump = match &args.dump {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => None,
    };

    let dt = 1.0 / args.fps.max(1.0);
    let mut tracked = 0usize;
    let mut skipped = 0usize;

    for path in &frame_paths {
        let frame = image::open(path)
            .with_context(|| format!("decoding {}", path.display()))?
            .to_rgb8();

        let processed = pipeline.process_frame(&frame, dt)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if processed {
            tracked += 1;
            let region = pipeline.region().expect("processed frame must have a region");
            let c = region.bounds.center();
            println!(
                "{} {}  region ({:.3}, {:.3}) size {:.3} roll {:.1}°",
                "track".green(),
                name,
                c.x,
                c.y,
                region.bounds.extent().x,
                region.angle.to_degrees()
            );
            if let Some(out) = dump.as_mut() {
                serde_json::to_writer(&mut *out, pipeline.refined_landmarks())?;
                writeln!(out)?;
            }
        } else {
            skipped += 1;
            println!("{} {}  (low confidence, region unchanged)", "skip ".yellow(), name);
        }
    }

    println!(
        "\n{} tracked, {} skipped of {} frames",
        tracked.to_string().green(),
        skipped.to_string().yellow(),
        frame_paths.len()
    );
    Ok(())
}
