use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::classify::{classify, ContainerKind};
use crate::error::Result;
use crate::media::{HandlerSet, MediaCandidate};
use crate::subtitle::find_companion;

/// Files in `source_dir` that match a known container and have a subtitle
/// companion with `subtitle_extension`, sorted by path.
///
/// Only file content is inspected, no external tool runs. Subdirectories are
/// not searched.
pub fn scan(source_dir: &Path, subtitle_extension: &str) -> Result<Vec<MediaCandidate>> {
    info!("Scanning {}", source_dir.display());

    let mut files = Vec::new();
    for entry in WalkDir::new(source_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            std::io::Error::other(format!("Cannot list {}: {}", source_dir.display(), e))
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();

    let mut matches = Vec::new();
    for path in files {
        let Some(kind) = classify(&path) else {
            debug!("Skipping {}: unknown format", path.display());
            continue;
        };
        let Some(subtitle_path) = find_companion(&path, subtitle_extension) else {
            debug!("Skipping {}: no .{} subtitles", path.display(), subtitle_extension);
            continue;
        };
        matches.push(MediaCandidate { path, kind, subtitle_path });
    }
    Ok(matches)
}

/// Container kinds present in `candidates`, each listed once
pub fn kinds_present(candidates: &[MediaCandidate]) -> Vec<ContainerKind> {
    let kinds: BTreeSet<ContainerKind> = candidates.iter().map(|c| c.kind).collect();
    kinds.into_iter().collect()
}

/// Keep the candidates whose handler confirms a video track, in order
pub async fn confirm_video(
    candidates: Vec<MediaCandidate>,
    handlers: &HandlerSet,
) -> Result<Vec<MediaCandidate>> {
    let mut confirmed = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !handlers.get(candidate.kind)?.has_video_track(&candidate.path).await? {
            debug!("Skipping {}: no video track", candidate.path.display());
            continue;
        }
        debug!("Selected {} ({})", candidate.path.display(), candidate.kind);
        confirmed.push(candidate);
    }

    info!("Found {} candidate(s)", confirmed.len());
    Ok(confirmed)
}

/// Find the files in `source_dir` worth hardsubbing: [`scan`] followed by
/// [`confirm_video`].
pub async fn discover(
    source_dir: &Path,
    handlers: &HandlerSet,
    subtitle_extension: &str,
) -> Result<Vec<MediaCandidate>> {
    let matches = scan(source_dir, subtitle_extension)?;
    confirm_video(matches, handlers).await
}
