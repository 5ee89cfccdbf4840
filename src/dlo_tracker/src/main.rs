mod output;
mod params;
mod pointcloud;

use anyhow::{Context, Result};
use clap::Parser;
use dlo_tracking::{FrameOutcome, TrackingSession};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use output::{write_record, FrameRecord};
use params::TrackerParams;

const NODE_NAME: &str = "dlo_tracker";

/// Replay recorded point cloud frames through the DLO node tracker
#[derive(Parser, Debug)]
#[command(name = "dlo_tracker", version)]
struct Args {
    /// Directory of frame files (`x y z` per line)
    #[arg(short, long)]
    input: PathBuf,

    /// Parameter file (YAML); defaults are used when omitted
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Output file for JSON-lines records (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the number of nodes fitted on the first frame
    #[arg(long)]
    node_count: Option<usize>,

    /// Override the registration iteration limit
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Keep the variance fixed across frames
    #[arg(long)]
    carry_over_variance: bool,

    /// Emit projected pixel coordinates
    #[arg(long)]
    project: bool,
}

impl Args {
    fn apply_overrides(&self, params: &mut TrackerParams) {
        if let Some(node_count) = self.node_count {
            params.initialization.node_count = node_count;
        }
        if let Some(max_iterations) = self.max_iterations {
            params.registration.max_iterations = max_iterations;
        }
        if self.carry_over_variance {
            params.registration.carry_over_variance = true;
        }
        if self.project {
            params.camera.enabled = true;
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dlo_tracker=info,dlo_tracking=info")),
        )
        .init();

    let args = Args::parse();
    info!("{NODE_NAME} started");

    let mut params = match &args.params {
        Some(path) => TrackerParams::load(path)?,
        None => TrackerParams::default(),
    };
    args.apply_overrides(&mut params);

    let mut session = TrackingSession::new(params.to_tracker_config())
        .context("Invalid tracker configuration")?;
    let camera = params.camera.to_projection();

    let seeds = params.segments.seed_sequences();
    if !seeds.is_empty() {
        let report = session
            .initialize_from_seeds(&seeds, params.segments.seed_variance)
            .context("Failed to install seed nodes")?;
        info!(
            "Initialized from {} seed segments: {:?}",
            seeds.len(),
            report.segment_lengths
        );
    }

    let mut frames = pointcloud::list_frames(&args.input, &params.io.frame_extension)?;
    if params.io.max_frames > 0 {
        frames.truncate(params.io.max_frames);
    }
    info!("Replaying {} frames from {}", frames.len(), args.input.display());

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let mut failed = 0;
    for (index, path) in frames.iter().enumerate() {
        let cloud = pointcloud::load_frame(path)?;
        let outcome = session.process_frame(&cloud);

        match &outcome {
            Ok(FrameOutcome::Initialized(report)) if !report.sorted => {
                warn!("Frame {index}: nodes could not be sorted into one chain")
            }
            Ok(FrameOutcome::Tracked(result)) if !result.status.is_converged() => {
                warn!(
                    "Frame {index}: no convergence after {} iterations",
                    result.iterations
                )
            }
            Err(e) => {
                failed += 1;
                warn!("Frame {index} ({}): {e}", path.display());
            }
            Ok(_) => {}
        }

        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let record = FrameRecord::new(index, source, &outcome, &session, camera.as_ref());
        write_record(&mut writer, &record)?;
    }
    writer.flush().context("Failed to flush output")?;

    info!(
        "Processed {} frames ({} failed), final variance {:?}",
        frames.len(),
        failed,
        session.sigma2()
    );
    Ok(())
}
