use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, HardsubError};

/// Name of the configuration file looked up in the current directory
pub const DEFAULT_CONFIG_FILE: &str = "hardsub.toml";

fn default_debug_log() -> PathBuf {
    PathBuf::from("/tmp/hardsub.log")
}

fn default_subtitle_scale() -> f64 {
    2.5
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub encode: EncodeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// External executables. Bare names are looked up on PATH at startup;
/// after resolution every field holds an absolute path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub mencoder: String,
    pub mplayer: String,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub mkvmerge: String,
    pub mkvextract: String,
    pub mp4info: String,
    pub mp4box: String,
}

/// One of the external executables listed in `[tools]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tool {
    Mencoder,
    Mplayer,
    Ffmpeg,
    Ffprobe,
    Mkvmerge,
    Mkvextract,
    Mp4info,
    Mp4box,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// Options passed to `-x264encopts` (Matroska and MP4 sources)
    pub x264_options: String,
    /// Options passed to `-xvidencopts` (AVI sources)
    pub xvid_options: String,
    /// Additional mencoder arguments, inserted before the input file.
    /// Example: ["-vf", "scale=1280:-2"]
    pub extra_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Extension of the subtitle companion file, without the dot
    pub subtitle_extension: String,
    /// Subtitle font scale, between 1 and 100
    pub subtitle_scale: f64,
    /// What to do when a candidate fails
    pub failure_policy: FailurePolicy,
    /// Transcript file written in debug mode (appended to, never truncated)
    pub debug_log: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the whole run at the first failing stage
    #[default]
    FailFast,
    /// Record the failure, skip the rest of that file and move on
    Continue,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mencoder: "mencoder".to_string(),
            mplayer: "mplayer".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            mkvmerge: "mkvmerge".to_string(),
            mkvextract: "mkvextract".to_string(),
            mp4info: "mp4info".to_string(),
            mp4box: "MP4Box".to_string(),
        }
    }
}

impl ToolsConfig {
    pub fn get(&self, tool: Tool) -> &str {
        match tool {
            Tool::Mencoder => &self.mencoder,
            Tool::Mplayer => &self.mplayer,
            Tool::Ffmpeg => &self.ffmpeg,
            Tool::Ffprobe => &self.ffprobe,
            Tool::Mkvmerge => &self.mkvmerge,
            Tool::Mkvextract => &self.mkvextract,
            Tool::Mp4info => &self.mp4info,
            Tool::Mp4box => &self.mp4box,
        }
    }

    pub fn set(&mut self, tool: Tool, value: String) {
        let slot = match tool {
            Tool::Mencoder => &mut self.mencoder,
            Tool::Mplayer => &mut self.mplayer,
            Tool::Ffmpeg => &mut self.ffmpeg,
            Tool::Ffprobe => &mut self.ffprobe,
            Tool::Mkvmerge => &mut self.mkvmerge,
            Tool::Mkvextract => &mut self.mkvextract,
            Tool::Mp4info => &mut self.mp4info,
            Tool::Mp4box => &mut self.mp4box,
        };
        *slot = value;
    }
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            x264_options: "crf=21:preset=slow:level_idc=31".to_string(),
            xvid_options: "fixed_quant=2".to_string(),
            extra_options: Vec::new(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            subtitle_extension: "srt".to_string(),
            subtitle_scale: default_subtitle_scale(),
            failure_policy: FailurePolicy::FailFast,
            debug_log: default_debug_log(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HardsubError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| HardsubError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Explicit path, then `hardsub.toml` in the current directory, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let extension = &self.pipeline.subtitle_extension;
        if extension.is_empty() || extension.contains(['.', '/']) {
            return Err(HardsubError::Config(format!(
                "Invalid subtitle extension '{}'", extension
            )));
        }
        crate::subtitle::check_scale(self.pipeline.subtitle_scale)
            .map_err(HardsubError::Config)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tools.mp4box, "MP4Box");
        assert_eq!(config.encode.x264_options, "crf=21:preset=slow:level_idc=31");
        assert_eq!(config.pipeline.subtitle_extension, "srt");
        assert_eq!(config.pipeline.subtitle_scale, 2.5);
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.pipeline.debug_log, PathBuf::from("/tmp/hardsub.log"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [tools]
            mencoder = "/opt/mplayer/bin/mencoder"

            [pipeline]
            failure_policy = "continue"
            "#,
        )
        .unwrap();

        assert_eq!(config.tools.mencoder, "/opt/mplayer/bin/mencoder");
        assert_eq!(config.tools.mkvmerge, "mkvmerge");
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.pipeline.subtitle_scale, 2.5);
        assert_eq!(config.encode.xvid_options, "fixed_quant=2");
    }

    #[test]
    fn test_printed_config_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hardsub.toml");

        let mut config = Config::default();
        config.encode.extra_options = vec!["-vf".to_string(), "scale=1280:-2".to_string()];
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.encode.extra_options, config.encode.extra_options);
        assert_eq!(loaded.tools, config.tools);
    }

    #[test]
    fn test_invalid_subtitle_extension_rejected() {
        let mut config = Config::default();
        config.pipeline.subtitle_extension = ".srt".to_string();
        assert!(matches!(config.validate(), Err(HardsubError::Config(_))));
    }

    #[test]
    fn test_malformed_file_is_a_toml_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hardsub.toml");
        std::fs::write(&path, "[pipeline\nsubtitle_scale = ").unwrap();

        match Config::from_file(&path) {
            Err(e @ HardsubError::Toml(_)) => assert_eq!(e.exit_code(), 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
