use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
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

pub const REQUIRED_TOOLS: &[Tool] = &[Tool::Mencoder, Tool::Mplayer, Tool::Ffmpeg, Tool::Ffprobe];

const VIDEO_TOKEN: &str = "ID_VIDEO_FORMAT";

static AUDIO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ID_AUDIO_ID=(\d+)").expect("valid regex"));
static FFMPEG_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"frame=\s*(\d+)").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    nb_frames: Option<String>,
}

/// AVI sources: mplayer to probe and dump audio, ffmpeg to rebuild
pub struct AviHandler {
    tools: ToolsConfig,
    encode: EncodeConfig,
    supervisor: Arc<ProcessSupervisor>,
}

impl AviHandler {
    pub fn new(config: &Config, supervisor: Arc<ProcessSupervisor>) -> Self {
        Self {
            tools: config.tools.clone(),
            encode: config.encode.clone(),
            supervisor,
        }
    }

    fn identify_command(&self, path: &Path) -> ExternalCommand {
        ExternalCommand::new(&self.tools.mplayer)
            .args(["-noconfig", "all", "-cache-min", "0", "-vo", "null", "-ao", "null"])
            .args(["-frames", "0", "-identify"])
            .path(path)
    }

    /// mencoder keeps its default AVI muxer here; ffmpeg copies the stream out later
    fn encode_command(&self, candidate: &MediaCandidate, output: &Path, subtitle_scale: f64) -> ExternalCommand {
        let codec = VideoCodec {
            name: "xvid",
            options_flag: "-xvidencopts",
            options: &self.encode.xvid_options,
            raw_output: false,
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
        ExternalCommand::new(&self.tools.mplayer)
            .arg("-aid")
            .arg(track.index.to_string())
            .arg("-dumpaudio")
            .arg("-dumpfile")
            .path(destination)
            .path(source)
            .progress(ProgressPattern::percent(&PERCENT_PROGRESS))
    }

    fn frame_count_command(&self, video: &Path) -> ExternalCommand {
        ExternalCommand::new(&self.tools.ffprobe)
            .args(["-v", "error", "-select_streams", "v:0"])
            .args(["-show_entries", "stream=nb_frames", "-of", "json"])
            .path(video)
    }

    /// `artifacts[0]` is the video, the rest are audio tracks mapped in order
    fn remux_command(&self, artifacts: &[PathBuf], destination: &Path, total_frames: u64) -> ExternalCommand {
        let mut command = ExternalCommand::new(&self.tools.ffmpeg).args(["-y", "-nostdin"]);
        for artifact in artifacts {
            command = command.arg("-i").path(artifact);
        }
        command = command.args(["-c", "copy"]);
        for input in 0..artifacts.len() {
            command = command.arg("-map").arg(format!("{}:0", input));
        }
        command
            .path(destination)
            .progress(ProgressPattern::new(&FFMPEG_FRAME, total_frames))
    }

    /// Total frames of the encoded video, used to scale ffmpeg's frame counter.
    /// Falls back to 1 when ffprobe cannot tell.
    async fn total_frames(&self, video: &Path) -> Result<u64> {
        let output = match self.supervisor.capture(&self.frame_count_command(video)).await {
            Ok(output) => output,
            Err(ProcessError::NonZeroExit { code, .. }) => {
                warn!("ffprobe failed on {} (exit code {})", video.display(), code);
                return Ok(1);
            }
            Err(e) => return Err(e.into()),
        };

        match parse_frame_count(&output) {
            Ok(Some(frames)) => Ok(frames),
            Ok(None) => {
                warn!("Frame count of {} unknown, progress will be approximate", video.display());
                Ok(1)
            }
            Err(e) => {
                warn!("Unreadable ffprobe output for {}: {}", video.display(), e);
                Ok(1)
            }
        }
    }
}

pub fn has_video(identify_output: &str) -> bool {
    identify_output.contains(VIDEO_TOKEN)
}

/// Audio stream IDs from `mplayer -identify` output, first mention wins
pub fn parse_audio_tracks(identify_output: &str) -> Vec<AudioTrack> {
    let mut tracks: Vec<AudioTrack> = Vec::new();
    for caps in AUDIO_ID.captures_iter(identify_output) {
        let Some(index) = caps.get(1).and_then(|m| m.as_str().parse().ok()) else {
            continue;
        };
        if !tracks.iter().any(|t| t.index == index) {
            tracks.push(AudioTrack { index, codec: CodecHint::Generic });
        }
    }
    tracks
}

/// Frame count of the first stream; `None` when ffprobe reports none
pub fn parse_frame_count(ffprobe_json: &str) -> Result<Option<u64>> {
    let output: FfprobeOutput = serde_json::from_str(ffprobe_json)?;
    Ok(output
        .streams
        .first()
        .and_then(|stream| stream.nb_frames.as_deref())
        .and_then(|frames| frames.parse().ok())
        .filter(|&frames| frames > 0))
}

#[async_trait]
impl FormatHandler for AviHandler {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Avi
    }

    async fn has_video_track(&self, path: &Path) -> Result<bool> {
        match self.supervisor.capture(&self.identify_command(path)).await {
            Ok(output) => Ok(has_video(&output)),
            Err(ProcessError::NonZeroExit { code, .. }) => {
                warn!("mplayer cannot identify {} (exit code {})", path.display(), code);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn encode(&self, candidate: &MediaCandidate, output_dir: &Path, subtitle_scale: f64) -> Result<PathBuf> {
        let output = output_dir.join(format!("{}.xvid", candidate.stem()));
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
        let Some(video) = artifacts.first() else {
            return Err(HardsubError::Media(format!(
                "Nothing to remux for {}", candidate.path.display()
            )));
        };

        let total_frames = self.total_frames(video).await?;
        let destination = unique_destination(output_dir, &candidate.path);
        let command = self.remux_command(artifacts, &destination, total_frames);
        self.supervisor.run(&command, "Rebuilding file: ").await?;

        remove_artifacts(artifacts).await?;
        info!("Rebuilt {}", destination.display());
        Ok(destination)
    }
}
