use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

use crate::classify::ContainerKind;
use crate::config::{Config, EncodeConfig, Tool, ToolsConfig};
use crate::error::{HardsubError, ProcessError, Result};
use crate::process::{ExternalCommand, ProcessSupervisor, ProgressPattern};
use super::{
    mencoder_command, remove_artifacts, unique_destination, AudioTrack, CodecHint, FormatHandler,
    MediaCandidate, VideoCodec, PERCENT_PROGRESS,
};

pub const REQUIRED_TOOLS: &[Tool] = &[Tool::Mencoder, Tool::Mkvmerge, Tool::Mkvextract];

/// mkvtoolnix exits with 1 when it only emitted warnings
const MKVTOOLNIX_EXIT_CODES: [i32; 2] = [0, 1];

static VIDEO_TRACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Track ID \d+: video").expect("valid regex"));
static AUDIO_TRACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Track ID (\d+): audio(?: \(([^)]*)\))?").expect("valid regex"));

/// Matroska sources: mkvmerge to probe and rebuild, mkvextract for audio
pub struct MatroskaHandler {
    tools: ToolsConfig,
    encode: EncodeConfig,
    supervisor: Arc<ProcessSupervisor>,
}

impl MatroskaHandler {
    pub fn new(config: &Config, supervisor: Arc<ProcessSupervisor>) -> Self {
        Self {
            tools: config.tools.clone(),
            encode: config.encode.clone(),
            supervisor,
        }
    }

    fn identify_command(&self, path: &Path) -> ExternalCommand {
        ExternalCommand::new(&self.tools.mkvmerge)
            .arg("-i")
            .path(path)
            .accept_exit_codes(MKVTOOLNIX_EXIT_CODES)
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
        ExternalCommand::new(&self.tools.mkvextract)
            .arg("tracks")
            .path(source)
            .arg(format!("{}:{}", track.index, destination.display()))
            .progress(ProgressPattern::percent(&PERCENT_PROGRESS))
            .accept_exit_codes(MKVTOOLNIX_EXIT_CODES)
    }

    /// Every artifact holds a single track with ID 0; compression is
    /// disabled per input so players that ignore header stripping still work.
    fn remux_command(&self, artifacts: &[PathBuf], destination: &Path) -> ExternalCommand {
        let mut command = ExternalCommand::new(&self.tools.mkvmerge)
            .arg("-o")
            .path(destination);
        for artifact in artifacts {
            command = command.args(["--compression", "0:none"]).path(artifact);
        }
        command
            .progress(ProgressPattern::percent(&PERCENT_PROGRESS))
            .accept_exit_codes(MKVTOOLNIX_EXIT_CODES)
    }
}

pub fn has_video(identify_output: &str) -> bool {
    VIDEO_TRACK.is_match(identify_output)
}

/// Audio tracks from `mkvmerge -i` output, in the order listed
pub fn parse_audio_tracks(identify_output: &str) -> Vec<AudioTrack> {
    AUDIO_TRACK
        .captures_iter(identify_output)
        .filter_map(|caps| {
            let index = caps.get(1)?.as_str().parse().ok()?;
            let codec = caps
                .get(2)
                .map(|m| CodecHint::from_description(m.as_str()))
                .unwrap_or(CodecHint::Generic);
            Some(AudioTrack { index, codec })
        })
        .collect()
}

#[async_trait]
impl FormatHandler for MatroskaHandler {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Matroska
    }

    async fn has_video_track(&self, path: &Path) -> Result<bool> {
        match self.supervisor.capture(&self.identify_command(path)).await {
            Ok(output) => Ok(has_video(&output)),
            Err(ProcessError::NonZeroExit { code, .. }) => {
                warn!("mkvmerge cannot identify {} (exit code {})", path.display(), code);
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
        let identify = self.supervisor.capture(&self.identify_command(&candidate.path)).await?;
        let tracks = parse_audio_tracks(&identify);
        info!("Found {} audio track(s) in {}", tracks.len(), candidate.path.display());

        let stem = candidate.stem();
        let mut extracted = Vec::with_capacity(tracks.len());
        for track in &tracks {
            let destination = track.artifact_path(output_dir, &stem);
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
