//! Point cloud file loading
//!
//! Frames are ASCII files with one `x y z` point per line. Blank lines and
//! lines starting with `#` are ignored; extra columns are ignored.

use anyhow::{bail, Context, Result};
use dlo_tracking::PointCloud;
use std::path::{Path, PathBuf};

/// Parse points from the text of one frame file
pub fn parse_points(text: &str) -> Result<Vec<[f64; 3]>> {
    let mut points = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let mut point = [0.0; 3];
        for value in point.iter_mut() {
            let Some(field) = fields.next() else {
                bail!("line {}: expected 3 coordinates, got '{line}'", line_no + 1);
            };
            *value = field
                .parse()
                .with_context(|| format!("line {}: invalid coordinate '{field}'", line_no + 1))?;
        }
        points.push(point);
    }
    Ok(points)
}

/// Load one frame file into a point cloud
pub fn load_frame(path: &Path) -> Result<PointCloud> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read frame {}", path.display()))?;
    let points =
        parse_points(&text).with_context(|| format!("Failed to parse frame {}", path.display()))?;
    Ok(PointCloud::from_points(&points))
}

/// List frame files in `dir` with the given extension, in lexicographic order
pub fn list_frames(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list frames in {}", dir.display()))?;

    let mut frames = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let text = "# header\n0.1 0.2 0.3\n\n  # indented comment\n-1 2.5e-1 4 255\n";
        let points = parse_points(text).unwrap();

        assert_eq!(points.len(), 2);
        assert_relative_eq!(points[0][2], 0.3);
        assert_relative_eq!(points[1][1], 0.25);
    }

    #[test]
    fn test_parse_rejects_short_lines() {
        let err = parse_points("0.1 0.2 0.3\n0.4 0.5\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_parse_rejects_bad_numbers() {
        assert!(parse_points("0.1 abc 0.3\n").is_err());
    }

    #[test]
    fn test_load_drops_non_finite_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.txt");
        std::fs::write(&path, "0 0 0.5\nnan 0 0.5\n0.01 0 0.5\n").unwrap();

        let cloud = load_frame(&path).unwrap();
        assert_eq!(cloud.len(), 2);
    }

    #[test]
    fn test_frames_listed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_0002.txt", "frame_0000.txt", "notes.md", "frame_0001.txt"] {
            std::fs::write(dir.path().join(name), "0 0 0\n").unwrap();
        }

        let frames = list_frames(dir.path(), "txt").unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["frame_0000.txt", "frame_0001.txt", "frame_0002.txt"]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_frames(&dir.path().join("missing"), "txt").is_err());
    }
}
