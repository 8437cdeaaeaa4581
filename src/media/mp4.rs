use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::classify::ContainerKind;
use crate::config::{Config, EncodeConfig, Tool, ToolsConfig};
use crate::error::{HardsubError, ProcessError, Result};
use crate::process::{ExternalCommand, ProcessSupervisor, ProgressPattern};
use super::{
    mencoder_command, remove_artifacts, unique_destination, AudioTrack, CodecHint, FormatHandler,
    MediaCandidate, VideoCodec, PERCENT_PROGRESS,
};

pub const REQUIRED_TOOLS: &[Tool] = &[Tool::Mencoder, Tool::Mp4info, Tool::Mp4box];

static VIDEO_TRACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\d+\s+video\b").expect("valid regex"));
static AUDIO_TRACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(\d+)\s+audio\s+(.*)$").expect("valid regex"));

/// MPEG-4 sources: mp4info to probe, MP4Box to extract and rebuild
pub struct Mp4Handler {
    tools: ToolsConfig,
    encode: EncodeConfig,
    supervisor: Arc<ProcessSupervisor>,
}

impl Mp4Handler {
    pub fn new(config: &Config, supervisor: Arc<ProcessSupervisor>) -> Self {
        Self {
            tools: config.tools.clone(),
            encode: config.encode.clone(),
            supervisor,
        }
    }

    fn info_command(&self, path: &Path) -> ExternalCommand {
        ExternalCommand::new(&self.tools.mp4info).path(path)
    }

    fn encode_command(&self, candidate: &MediaCandidate, output: &Path, subtitle_scale: f64) -> ExternalCommand {
        let codec = VideoCodec {
            name: "x264",
            options_flag: "-x264encopts",
            options: &self.encode.x264_options,
            raw_output: true,
        };
        mencoder_command(
            &self.tools.mencoder,
            candidate,
            output,
            subtitle_scale,
            &codec,
            &self.encode.extra_options,
        )
    }

    fn extract_command(&self, source: &Path, track: &AudioTrack, destination: &Path) -> ExternalCommand {
        ExternalCommand::new(&self.tools.mp4box)
            .arg("-out")
            .path(destination)
            .arg("-raw")
            .arg(track.index.to_string())
            .path(source)
            .progress(ProgressPattern::percent(&PERCENT_PROGRESS))
    }

    fn remux_command(&self, artifacts: &[PathBuf], destination: &Path) -> ExternalCommand {
        let mut command = ExternalCommand::new(&self.tools.mp4box).arg("-quiet");
        for artifact in artifacts {
            command = command.arg("-add").path(artifact);
        }
        command
            .path(destination)
            .progress(ProgressPattern::percent(&PERCENT_PROGRESS))
    }
}

pub fn has_video(info_output: &str) -> bool {
    VIDEO_TRACK.is_match(info_output)
}

/// Audio tracks from `mp4info` output, in the order listed
pub fn parse_audio_tracks(info_output: &str) -> Vec<AudioTrack> {
    AUDIO_TRACK
        .captures_iter(info_output)
        .filter_map(|caps| {
            let index = caps.get(1)?.as_str().parse().ok()?;
            let codec = CodecHint::from_description(caps.get(2).map_or("", |m| m.as_str()));
            Some(AudioTrack { index, codec })
        })
        .collect()
}

#[async_trait]
impl FormatHandler for Mp4Handler {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Mp4
    }

    async fn has_video_track(&self, path: &Path) -> Result<bool> {
        match self.supervisor.capture(&self.info_command(path)).await {
            Ok(output) => Ok(has_video(&output)),
            Err(ProcessError::NonZeroExit { code, .. }) => {
                warn!("mp4info cannot read {} (exit code {})", path.display(), code);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn encode(&self, candidate: &MediaCandidate, output_dir: &Path, subtitle_scale: f64) -> Result<PathBuf> {
        let output = output_dir.join(format!("{}.264", candidate.stem()));
        info!("Encoding {} -> {}", candidate.path.display(), output.display());

        let command = self.encode_command(candidate, &output, subtitle_scale);
        self.supervisor.run(&command, "Video Encoding: ").await?;
        Ok(output)
    }

    async fn extract_audio(&self, candidate: &MediaCandidate, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let info_output = self.supervisor.capture(&self.info_command(&candidate.path)).await?;
        let tracks = parse_audio_tracks(&info_output);
        info!("Found {} audio track(s) in {}", tracks.len(), candidate.path.display());

        let stem = candidate.stem();
        let mut extracted = Vec::with_capacity(tracks.len());
        for track in &tracks {
            let destination = track.artifact_path(output_dir, &stem);
            // MP4Box adds the track to an existing -out file instead of replacing it
            if tokio::fs::try_exists(&destination).await? {
                debug!("Removing stale {}", destination.display());
                tokio::fs::remove_file(&destination).await?;
            }

            let command = self.extract_command(&candidate.path, track, &destination);
            self.supervisor
                .run(&command, &format!("Extract audio track {}: ", track.index))
                .await?;
            extracted.push(destination);
        }
        Ok(extracted)
    }

    async fn remux(&self, candidate: &MediaCandidate, artifacts: &[PathBuf], output_dir: &Path) -> Result<PathBuf> {
        if artifacts.is_empty() {
            return Err(HardsubError::Media(format!(
                "Nothing to remux for {}", candidate.path.display()
            )));
        }

        let destination = unique_destination(output_dir, &candidate.path);
        let command = self.remux_command(artifacts, &destination);
        self.supervisor.run(&command, "Rebuilding file: ").await?;

        remove_artifacts(artifacts).await?;
        info!("Rebuilt {}", destination.display());
        Ok(destination)
    }
}
