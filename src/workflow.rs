use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::FailurePolicy;
use crate::error::{HardsubError, Result};
use crate::media::{FormatHandler, HandlerSet, MediaCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Encode,
    ExtractAudio,
    Remux,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Encode => "encode",
            Stage::ExtractAudio => "audio extraction",
            Stage::Remux => "remux",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Success,
    Failed,
}

/// Result of one stage for one candidate
#[derive(Debug, Clone)]
pub struct WorkOutcome {
    pub candidate: MediaCandidate,
    pub stage: Stage,
    pub status: StageStatus,
    pub error: Option<String>,
}

impl WorkOutcome {
    pub fn is_failure(&self) -> bool {
        self.status == StageStatus::Failed
    }
}

/// Refuse to write into a directory that already holds files, unless forced.
pub fn check_output_dir(output_dir: &Path, force: bool, verbose: bool) -> Result<()> {
    let occupied = std::fs::read_dir(output_dir)?.next().is_some();
    if !occupied {
        return Ok(());
    }
    if !force {
        return Err(HardsubError::OutputNotEmpty(output_dir.display().to_string()));
    }
    if verbose {
        println!("Output directory {} is not empty, using it anyway", output_dir.display());
    }
    Ok(())
}

/// Candidates whose processing failed at some stage, in processing order
pub fn failed_candidates(outcomes: &[WorkOutcome]) -> Vec<&MediaCandidate> {
    outcomes
        .iter()
        .filter(|outcome| outcome.is_failure())
        .map(|outcome| &outcome.candidate)
        .collect()
}

/// Drives every candidate through encode, audio extraction and remux
pub struct Workflow {
    handlers: HandlerSet,
    policy: FailurePolicy,
}

impl Workflow {
    pub fn new(handlers: HandlerSet, policy: FailurePolicy) -> Self {
        Self { handlers, policy }
    }

    /// Process `candidates` in order, one stage at a time.
    ///
    /// With [`FailurePolicy::FailFast`] the first failure is returned as an
    /// error. With [`FailurePolicy::Continue`] it is recorded as a failed
    /// outcome and the next candidate is started.
    pub async fn run(
        &self,
        candidates: &[MediaCandidate],
        output_dir: &Path,
        subtitle_scale: f64,
    ) -> Result<Vec<WorkOutcome>> {
        let mut outcomes = Vec::new();
        let total = candidates.len();

        for (index, candidate) in candidates.iter().enumerate() {
            println!("Start work on {} ({}/{})", candidate.file_name(), index + 1, total);

            let result = self
                .process_candidate(candidate, output_dir, subtitle_scale, &mut outcomes)
                .await;

            match result {
                Ok(destination) => info!("Finished {}", destination.display()),
                Err(e) if self.policy == FailurePolicy::Continue => {
                    error!("Giving up on {}: {}", candidate.path.display(), e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(outcomes)
    }

    async fn process_candidate(
        &self,
        candidate: &MediaCandidate,
        output_dir: &Path,
        subtitle_scale: f64,
        outcomes: &mut Vec<WorkOutcome>,
    ) -> Result<PathBuf> {
        let handler: &dyn FormatHandler = self.handlers.get(candidate.kind)?;
        info!("Processing {} as {}", candidate.path.display(), candidate.kind);

        let video = record(
            outcomes,
            candidate,
            Stage::Encode,
            handler.encode(candidate, output_dir, subtitle_scale).await,
        )?;
        let audio = record(
            outcomes,
            candidate,
            Stage::ExtractAudio,
            handler.extract_audio(candidate, output_dir).await,
        )?;

        let mut artifacts = Vec::with_capacity(audio.len() + 1);
        artifacts.push(video);
        artifacts.extend(audio);

        record(
            outcomes,
            candidate,
            Stage::Remux,
            handler.remux(candidate, &artifacts, output_dir).await,
        )
    }
}

fn record<T>(
    outcomes: &mut Vec<WorkOutcome>,
    candidate: &MediaCandidate,
    stage: Stage,
    result: Result<T>,
) -> Result<T> {
    let (status, error) = match &result {
        Ok(_) => (StageStatus::Success, None),
        Err(e) => (StageStatus::Failed, Some(e.to_string())),
    };
    outcomes.push(WorkOutcome {
        candidate: candidate.clone(),
        stage,
        status,
        error,
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{fixtures, ContainerKind};
    use crate::config::Config;
    use crate::error::ProcessError;
    use crate::media::MockFormatHandler;
    use crate::process::testing::fake_tool;
    use crate::process::{ProcessSupervisor, RunOptions};
    use std::sync::Arc;

    fn candidate(name: &str) -> MediaCandidate {
        let path = PathBuf::from("/videos").join(name);
        MediaCandidate {
            subtitle_path: path.with_extension("srt"),
            path,
            kind: ContainerKind::Matroska,
        }
    }

    fn encode_failure() -> HardsubError {
        HardsubError::Process(ProcessError::NonZeroExit {
            program: "mencoder".to_string(),
            code: 1,
        })
    }

    /// Matroska handler whose encode fails for files named `broken.*`
    fn mock_handler() -> MockFormatHandler {
        let mut mock = MockFormatHandler::new();
        mock.expect_kind().return_const(ContainerKind::Matroska);
        mock.expect_encode().returning(|candidate, dir, _| {
            if candidate.stem() == "broken" {
                Err(encode_failure())
            } else {
                Ok(dir.join(format!("{}.264", candidate.stem())))
            }
        });
        mock.expect_extract_audio().returning(|candidate, dir| {
            Ok(vec![
                dir.join(format!("{}_1.aac", candidate.stem())),
                dir.join(format!("{}_2.audio", candidate.stem())),
            ])
        });
        mock
    }

    fn workflow(mock: MockFormatHandler, policy: FailurePolicy) -> Workflow {
        Workflow::new(HandlerSet::from_handlers(vec![Arc::new(mock)]), policy)
    }

    #[tokio::test]
    async fn test_artifacts_passed_video_first() {
        let mut mock = mock_handler();
        mock.expect_remux()
            .withf(|_, artifacts, _| {
                artifacts.to_vec()
                    == vec![
                        PathBuf::from("/out/movie.264"),
                        PathBuf::from("/out/movie_1.aac"),
                        PathBuf::from("/out/movie_2.audio"),
                    ]
            })
            .times(1)
            .returning(|candidate, _, dir| Ok(dir.join(candidate.file_name())));

        let outcomes = workflow(mock, FailurePolicy::FailFast)
            .run(&[candidate("movie.mkv")], Path::new("/out"), 2.5)
            .await
            .unwrap();

        let stages: Vec<_> = outcomes.iter().map(|o| (o.stage, o.status)).collect();
        assert_eq!(
            stages,
            vec![
                (Stage::Encode, StageStatus::Success),
                (Stage::ExtractAudio, StageStatus::Success),
                (Stage::Remux, StageStatus::Success),
            ]
        );
    }

    #[tokio::test]
    async fn test_fail_fast_stops_the_run() {
        let mut mock = mock_handler();
        mock.expect_remux().never();

        let err = workflow(mock, FailurePolicy::FailFast)
            .run(&[candidate("broken.mkv"), candidate("movie.mkv")], Path::new("/out"), 2.5)
            .await
            .unwrap_err();

        assert!(matches!(err, HardsubError::Process(ProcessError::NonZeroExit { code: 1, .. })));
        assert_eq!(err.exit_code(), 6);
    }

    #[tokio::test]
    async fn test_continue_records_failure_and_moves_on() {
        let mut mock = mock_handler();
        mock.expect_remux()
            .times(1)
            .returning(|candidate, _, dir| Ok(dir.join(candidate.file_name())));

        let outcomes = workflow(mock, FailurePolicy::Continue)
            .run(&[candidate("broken.mkv"), candidate("movie.mkv")], Path::new("/out"), 2.5)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[0].stage, Stage::Encode);
        assert!(outcomes[0].is_failure());
        assert!(outcomes[0].error.as_deref().unwrap().contains("mencoder"));
        assert!(outcomes[1..].iter().all(|o| !o.is_failure()));

        let failed = failed_candidates(&outcomes);
        assert_eq!(failed, vec![&candidate("broken.mkv")]);
    }

    #[test]
    fn test_output_guard() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_output_dir(dir.path(), false, false).is_ok());

        std::fs::write(dir.path().join("old.mkv"), b"").unwrap();
        let err = check_output_dir(dir.path(), false, false).unwrap_err();
        assert!(matches!(err, HardsubError::OutputNotEmpty(_)));
        assert_eq!(err.exit_code(), 5);

        assert!(check_output_dir(dir.path(), true, true).is_ok());
    }

    #[tokio::test]
    async fn test_matroska_end_to_end() {
        let tools = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.tools.mencoder = fake_tool(
            tools.path(),
            "mencoder",
            r#"out="$2"
printf 'Pos: 1.0s 25f (50%%) \r'
echo video > "$out"
"#,
        );
        config.tools.mkvmerge = fake_tool(
            tools.path(),
            "mkvmerge",
            r#"if [ "$1" = "-i" ]; then
  echo "File '$2': container: Matroska"
  echo "Track ID 0: audio (AAC)"
  echo "Track ID 1: video (MPEG-4p10/AVC/H.264)"
  exit 0
fi
echo "Progress: 100%"
echo muxed > "$2"
exit 1
"#,
        );
        config.tools.mkvextract = fake_tool(
            tools.path(),
            "mkvextract",
            r#"dest="${3#*:}"
echo "Progress: 100%"
echo audio > "$dest"
"#,
        );

        std::fs::write(source.path().join("movie.mkv"), fixtures::MATROSKA).unwrap();
        std::fs::write(source.path().join("movie.srt"), "1\n00:00:01,000 --> 00:00:02,000\nHi\n").unwrap();

        check_output_dir(output.path(), false, false).unwrap();

        let supervisor = Arc::new(ProcessSupervisor::new(RunOptions::default()));
        let handlers = HandlerSet::new(&config, supervisor);
        let candidates = crate::discovery::discover(source.path(), &handlers, "srt")
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, ContainerKind::Matroska);

        let outcomes = Workflow::new(handlers, FailurePolicy::FailFast)
            .run(&candidates, output.path(), 2.5)
            .await
            .unwrap();

        assert!(outcomes.iter().all(|o| !o.is_failure()));
        assert!(output.path().join("movie.mkv").is_file());
        assert!(!output.path().join("movie.264").exists());
        assert!(!output.path().join("movie_0.aac").exists());
    }
}
