// Container-specific media handling
//
// One FormatHandler per ContainerKind, all sharing the same four stages:
// - probe: does the file carry a video track, which audio tracks does it have
// - encode: re-encode the video with the subtitles burned in
// - extract: dump every audio track untouched
// - remux: rebuild the container from the produced artifacts

pub mod avi;
pub mod matroska;
pub mod mp4;

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::classify::ContainerKind;
use crate::config::{Config, Tool};
use crate::error::{HardsubError, Result};
use crate::process::{ExternalCommand, ProcessSupervisor, ProgressPattern};

/// mencoder status line: `Pos: 3.2s 80f ( 7%) ...`
static MENCODER_PROGRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*(\d+)%\)").expect("valid regex"));

/// `NN%` or `NN.N%` as printed by mkvtoolnix, MP4Box and mplayer dumps
pub(crate) static PERCENT_PROGRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(?:\.\d+)?%").expect("valid regex"));

/// A source video selected for hardsubbing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCandidate {
    pub path: PathBuf,
    pub kind: ContainerKind,
    pub subtitle_path: PathBuf,
}

impl MediaCandidate {
    /// Base name shared by every artifact derived from this file
    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.stem())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecHint {
    Aac,
    Generic,
}

impl CodecHint {
    pub fn from_description(description: &str) -> Self {
        if description.to_ascii_uppercase().contains("AAC") {
            CodecHint::Aac
        } else {
            CodecHint::Generic
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            CodecHint::Aac => "aac",
            CodecHint::Generic => "audio",
        }
    }
}

/// An audio track as reported by a probe tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTrack {
    pub index: u32,
    pub codec: CodecHint,
}

impl AudioTrack {
    /// `<output>/<stem>_<index>.<aac|audio>`
    pub fn artifact_path(&self, output_dir: &Path, stem: &str) -> PathBuf {
        output_dir.join(format!("{}_{}.{}", stem, self.index, self.codec.extension()))
    }
}

/// Uniform per-container contract
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FormatHandler: Send + Sync {
    fn kind(&self) -> ContainerKind;

    /// Probe the file and confirm it carries a video stream
    async fn has_video_track(&self, path: &Path) -> Result<bool>;

    /// Re-encode the video with the subtitles burned in, returning the raw video artifact
    async fn encode(&self, candidate: &MediaCandidate, output_dir: &Path, subtitle_scale: f64) -> Result<PathBuf>;

    /// Extract every audio track, in probe order
    async fn extract_audio(&self, candidate: &MediaCandidate, output_dir: &Path) -> Result<Vec<PathBuf>>;

    /// Assemble `artifacts` (video first) into the final container, then delete them
    async fn remux(&self, candidate: &MediaCandidate, artifacts: &[PathBuf], output_dir: &Path) -> Result<PathBuf>;
}

/// Handlers keyed by container kind
pub struct HandlerSet {
    handlers: HashMap<ContainerKind, Arc<dyn FormatHandler>>,
}

impl HandlerSet {
    /// Build the stock handlers from configuration
    pub fn new(config: &Config, supervisor: Arc<ProcessSupervisor>) -> Self {
        Self::from_handlers(vec![
            Arc::new(avi::AviHandler::new(config, supervisor.clone())) as Arc<dyn FormatHandler>,
            Arc::new(matroska::MatroskaHandler::new(config, supervisor.clone())),
            Arc::new(mp4::Mp4Handler::new(config, supervisor)),
        ])
    }

    pub fn from_handlers(handlers: Vec<Arc<dyn FormatHandler>>) -> Self {
        Self {
            handlers: handlers.into_iter().map(|h| (h.kind(), h)).collect(),
        }
    }

    pub fn get(&self, kind: ContainerKind) -> Result<&dyn FormatHandler> {
        self.handlers
            .get(&kind)
            .map(|handler| handler.as_ref())
            .ok_or_else(|| HardsubError::Media(format!("No handler for {} files", kind)))
    }
}

/// Executables a container kind needs
pub fn required_tools(kind: ContainerKind) -> &'static [Tool] {
    match kind {
        ContainerKind::Avi => avi::REQUIRED_TOOLS,
        ContainerKind::Matroska => matroska::REQUIRED_TOOLS,
        ContainerKind::Mp4 => mp4::REQUIRED_TOOLS,
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Destination for the rebuilt file.
///
/// Never overwrites: if `<output>/<name>` exists the first free
/// `<stem>_<n>.<ext>` is used instead.
pub fn unique_destination(output_dir: &Path, source: &Path) -> PathBuf {
    let file_name = source.file_name().map(PathBuf::from).unwrap_or_default();
    let preferred = output_dir.join(&file_name);
    if !preferred.exists() {
        return preferred;
    }

    let stem = file_stem(source);
    let extension = source.extension().map(|e| e.to_string_lossy().to_string());
    let mut counter = 1u32;
    loop {
        let name = match &extension {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let candidate = output_dir.join(name);
        if !candidate.exists() {
            warn!(
                "{} already exists, writing {} instead",
                preferred.display(),
                candidate.display()
            );
            return candidate;
        }
        counter += 1;
    }
}

/// Delete intermediate artifacts once they have been consumed
pub async fn remove_artifacts(artifacts: &[PathBuf]) -> Result<()> {
    for artifact in artifacts {
        debug!("Removing {}", artifact.display());
        tokio::fs::remove_file(artifact).await?;
    }
    Ok(())
}

/// Video codec selection for the mencoder encode stage
pub(crate) struct VideoCodec<'a> {
    /// Value of `-ovc`
    pub name: &'a str,
    /// Flag carrying the codec options, e.g. `-x264encopts`
    pub options_flag: &'a str,
    pub options: &'a str,
    /// Write a raw elementary stream instead of an AVI file
    pub raw_output: bool,
}

/// Common mencoder invocation used by every handler's encode stage
pub(crate) fn mencoder_command(
    mencoder: &str,
    candidate: &MediaCandidate,
    output: &Path,
    subtitle_scale: f64,
    codec: &VideoCodec<'_>,
    extra_options: &[String],
) -> ExternalCommand {
    let mut command = ExternalCommand::new(mencoder).arg("-o").path(output);
    if codec.raw_output {
        command = command.args(["-of", "rawvideo"]);
    }

    command
        .args(["-nosound", "-noautosub", "-noskip", "-mc", "0"])
        .arg("-sub")
        .path(&candidate.subtitle_path)
        .arg("-subfont-text-scale")
        .arg(subtitle_scale.to_string())
        .args(["-ovc", codec.name, codec.options_flag, codec.options])
        .args(extra_options.iter().cloned())
        .path(&candidate.path)
        .progress(ProgressPattern::percent(&MENCODER_PROGRESS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProgressScanner;

    fn candidate(path: &str) -> MediaCandidate {
        MediaCandidate {
            path: PathBuf::from(path),
            kind: ContainerKind::Matroska,
            subtitle_path: PathBuf::from(path).with_extension("srt"),
        }
    }

    #[test]
    fn test_candidate_names() {
        let c = candidate("/videos/movie.mkv");
        assert_eq!(c.stem(), "movie");
        assert_eq!(c.file_name(), "movie.mkv");
    }

    #[test]
    fn test_codec_hint() {
        assert_eq!(CodecHint::from_description("AAC"), CodecHint::Aac);
        assert_eq!(CodecHint::from_description("MPEG-4 AAC LC, 5.000 secs"), CodecHint::Aac);
        assert_eq!(CodecHint::from_description("A_AC3"), CodecHint::Generic);
    }

    #[test]
    fn test_audio_artifact_path() {
        let aac = AudioTrack { index: 0, codec: CodecHint::Aac };
        let other = AudioTrack { index: 2, codec: CodecHint::Generic };
        assert_eq!(aac.artifact_path(Path::new("/out"), "movie"), PathBuf::from("/out/movie_0.aac"));
        assert_eq!(other.artifact_path(Path::new("/out"), "movie"), PathBuf::from("/out/movie_2.audio"));
    }

    #[test]
    fn test_unique_destination() {
        let dir = tempfile::tempdir().unwrap();
        let source = Path::new("/videos/movie.mkv");

        assert_eq!(unique_destination(dir.path(), source), dir.path().join("movie.mkv"));

        std::fs::write(dir.path().join("movie.mkv"), b"").unwrap();
        assert_eq!(unique_destination(dir.path(), source), dir.path().join("movie_1.mkv"));

        std::fs::write(dir.path().join("movie_1.mkv"), b"").unwrap();
        assert_eq!(unique_destination(dir.path(), source), dir.path().join("movie_2.mkv"));
    }

    #[test]
    fn test_mencoder_command() {
        let c = candidate("/videos/movie.mkv");
        let codec = VideoCodec {
            name: "x264",
            options_flag: "-x264encopts",
            options: "crf=21:preset=slow:level_idc=31",
            raw_output: true,
        };
        let command = mencoder_command(
            "/usr/bin/mencoder",
            &c,
            Path::new("/out/movie.264"),
            2.5,
            &codec,
            &["-vf".to_string(), "scale=1280:-2".to_string()],
        );

        assert_eq!(
            command.to_string(),
            "/usr/bin/mencoder -o /out/movie.264 -of rawvideo -nosound -noautosub -noskip -mc 0 \
             -sub /videos/movie.srt -subfont-text-scale 2.5 -ovc x264 -x264encopts \
             crf=21:preset=slow:level_idc=31 -vf scale=1280:-2 /videos/movie.mkv"
        );
        assert_eq!(command.progress.as_ref().map(|p| p.scale()), Some(100));
    }

    #[tokio::test]
    async fn test_remove_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.264");
        let audio = dir.path().join("movie_0.aac");
        std::fs::write(&video, b"v").unwrap();
        std::fs::write(&audio, b"a").unwrap();

        remove_artifacts(&[video.clone(), audio.clone()]).await.unwrap();
        assert!(!video.exists());
        assert!(!audio.exists());
    }

    #[test]
    fn test_handler_set_lookup() {
        let mut mock = MockFormatHandler::new();
        mock.expect_kind().return_const(ContainerKind::Mp4);
        let set = HandlerSet::from_handlers(vec![Arc::new(mock)]);

        assert!(set.get(ContainerKind::Mp4).is_ok());
        assert!(matches!(set.get(ContainerKind::Avi), Err(HardsubError::Media(_))));
    }

    #[test]
    fn test_fractional_percent_keeps_integer_part() {
        let pattern = ProgressPattern::percent(&PERCENT_PROGRESS);
        let mut scanner = ProgressScanner::new(&pattern);
        assert_eq!(scanner.feed("dump: 1048576 bytes written (~62.5%)\r"), vec![62]);
        assert_eq!(scanner.feed("Progress: 7%\n"), vec![7]);
    }
}
