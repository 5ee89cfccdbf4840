//! Per-frame JSON-lines output

use anyhow::{Context, Result};
use dlo_tracking::{
    CameraProjection, ConvergenceStatus, FrameOutcome, IterationDebug, TrackingSession,
};
use serde::Serialize;
use std::io::Write;

/// What happened to a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Initialized,
    Tracked,
    Failed,
}

/// One output line
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    pub frame: usize,
    pub source: String,
    pub kind: FrameKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConvergenceStatus>,
    pub iterations: usize,
    pub sigma2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorted: Option<bool>,
    /// Node positions, one list per segment
    pub segments: Vec<Vec<[f64; 3]>>,
    /// Projected node pixels, one list per segment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixels: Option<Vec<Vec<[i64; 2]>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub iteration_debug: Vec<IterationDebug>,
}

impl FrameRecord {
    /// Build a record from the session state after a frame.
    pub fn new(
        frame: usize,
        source: String,
        outcome: &dlo_tracking::Result<FrameOutcome>,
        session: &TrackingSession,
        camera: Option<&CameraProjection>,
    ) -> Self {
        let mut record = Self {
            frame,
            source,
            kind: FrameKind::Failed,
            status: None,
            iterations: 0,
            sigma2: session.sigma2(),
            sorted: None,
            segments: Vec::new(),
            pixels: None,
            error: None,
            iteration_debug: Vec::new(),
        };

        match outcome {
            Ok(FrameOutcome::Initialized(report)) => {
                record.kind = FrameKind::Initialized;
                record.sorted = Some(report.sorted);
            }
            Ok(FrameOutcome::Tracked(result)) => {
                record.kind = FrameKind::Tracked;
                record.status = Some(result.status);
                record.iterations = result.iterations;
                record.iteration_debug = result.iteration_debug.clone();
            }
            Err(e) => record.error = Some(e.to_string()),
        }

        if let Some(segments) = session.segments() {
            record.segments = segments.iter().map(|s| s.to_points()).collect();
        }

        if let (Some(camera), Some(nodes)) = (camera, session.nodes()) {
            let projected = camera.project_nodes(nodes);
            let pixels = session
                .layout()
                .ranges()
                .into_iter()
                .map(|range| {
                    projected
                        .iter()
                        .filter(|p| range.contains(&p.index))
                        .map(|p| [p.u, p.v])
                        .collect()
                })
                .collect();
            record.pixels = Some(pixels);
        }

        record
    }
}

/// Write one record as a JSON line.
pub fn write_record<W: Write>(writer: &mut W, record: &FrameRecord) -> Result<()> {
    serde_json::to_writer(&mut *writer, record).context("Failed to serialize frame record")?;
    writeln!(writer).context("Failed to write frame record")?;
    Ok(())
}
