use thiserror::Error;

/// Failure of a single external command run by the process supervisor.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error while supervising process: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} exited with code {code}")]
    NonZeroExit { program: String, code: i32 },

    #[error("{program} was terminated by a signal")]
    Terminated { program: String },
}

#[derive(Error, Debug)]
pub enum HardsubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported platform: {0}")]
    PlatformUnsupported(String),

    #[error("Missing dependencies: {}", .0.join(", "))]
    MissingDependency(Vec<String>),

    #[error("Invalid arguments: {}", .0.join("; "))]
    InvalidArgument(Vec<String>),

    #[error("No video files to hardsub in {0}")]
    NoCandidates(String),

    #[error("Output directory is not empty: {0}")]
    OutputNotEmpty(String),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Media processing error: {0}")]
    Media(String),
}

impl HardsubError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            HardsubError::PlatformUnsupported(_) => 1,
            HardsubError::MissingDependency(_) => 2,
            HardsubError::InvalidArgument(_) | HardsubError::Config(_) | HardsubError::Toml(_) => 3,
            HardsubError::NoCandidates(_) => 4,
            HardsubError::OutputNotEmpty(_) => 5,
            HardsubError::Io(_)
            | HardsubError::Json(_)
            | HardsubError::Process(_)
            | HardsubError::Media(_) => 6,
        }
    }
}

pub type Result<T> = std::result::Result<T, HardsubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(HardsubError::PlatformUnsupported("macos".into()).exit_code(), 1);
        assert_eq!(HardsubError::MissingDependency(vec!["mencoder".into()]).exit_code(), 2);
        assert_eq!(HardsubError::InvalidArgument(vec![]).exit_code(), 3);
        assert_eq!(HardsubError::NoCandidates("src".into()).exit_code(), 4);
        assert_eq!(HardsubError::OutputNotEmpty("out".into()).exit_code(), 5);

        let process = ProcessError::NonZeroExit { program: "mkvmerge".into(), code: 2 };
        assert_eq!(HardsubError::from(process).exit_code(), 6);
    }

    #[test]
    fn test_missing_dependency_message_lists_tools() {
        let err = HardsubError::MissingDependency(vec!["mplayer".into(), "MP4Box".into()]);
        assert_eq!(err.to_string(), "Missing dependencies: mplayer, MP4Box");
    }
}
