use std::path::{Path, PathBuf};

/// Accepted range for the subtitle font scale
pub const MIN_SCALE: f64 = 1.0;
pub const MAX_SCALE: f64 = 100.0;

/// Path of the subtitle companion for `video`: same directory, same base
/// name, `extension` swapped in.
pub fn companion_path(video: &Path, extension: &str) -> PathBuf {
    video.with_extension(extension)
}

/// Returns the companion subtitle if it exists as a regular file.
pub fn find_companion(video: &Path, extension: &str) -> Option<PathBuf> {
    let candidate = companion_path(video, extension);
    if candidate == video {
        return None;
    }
    candidate.is_file().then_some(candidate)
}

pub fn check_scale(scale: f64) -> Result<(), String> {
    if scale.is_finite() && (MIN_SCALE..=MAX_SCALE).contains(&scale) {
        Ok(())
    } else {
        Err(format!(
            "subtitle scale must be between {} and {}, got {}",
            MIN_SCALE, MAX_SCALE, scale
        ))
    }
}

/// clap value parser for `--subtitle-scale`
pub fn parse_scale(value: &str) -> Result<f64, String> {
    let scale: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    check_scale(scale)?;
    Ok(scale)
}
