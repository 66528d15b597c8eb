use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory of frame images, replayed in sorted filename order
    #[arg(short, long)]
    pub frames: PathBuf,

    /// Nominal frame rate of the sequence
    #[arg(long, default_value_t = 30.0)]
    pub fps: f32,

    /// Write the refined landmarks of every frame as JSON lines
    #[arg(long)]
    pub dump: Option<PathBuf>,
}
