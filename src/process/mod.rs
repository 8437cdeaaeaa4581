// External process supervision
//
// Every external tool runs through the ProcessSupervisor:
// - Command: what to run, how to read its progress, which exit codes are fine
// - Progress: incremental output scanning and the console indicator

pub mod command;
pub mod progress;

use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

pub use command::{ExternalCommand, ProgressPattern};
pub use progress::{Progress, ProgressScanner};

use crate::error::ProcessError;

/// Log target of the debug transcript
pub const TRANSCRIPT_TARGET: &str = "hardsub::transcript";

const READ_CHUNK: usize = 4096;

/// Flags that change what the supervisor reports, never what it runs
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Echo every command line before running it
    pub verbose: bool,
    /// Write command lines and full output to the transcript log
    pub debug: bool,
    /// Draw progress bars on the console
    pub show_progress: bool,
}

pub struct ProcessSupervisor {
    options: RunOptions,
}

struct Execution {
    code: Option<i32>,
    output: String,
}

impl ProcessSupervisor {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    /// Run a command with a progress indicator labelled `label`.
    pub async fn run(&self, command: &ExternalCommand, label: &str) -> Result<(), ProcessError> {
        let progress = if self.options.show_progress {
            Progress::new(label)
        } else {
            Progress::hidden()
        };

        let result = self.supervise(command, Some(&progress), false).await;
        if result.is_err() {
            progress.abandon();
        }
        result.map(|_| ())
    }

    /// Run a probe command and return its combined output.
    pub async fn capture(&self, command: &ExternalCommand) -> Result<String, ProcessError> {
        self.supervise(command, None, true).await
    }

    async fn supervise(
        &self,
        command: &ExternalCommand,
        progress: Option<&Progress>,
        keep_output: bool,
    ) -> Result<String, ProcessError> {
        let execution = self.execute(command, progress, keep_output).await?;

        match execution.code {
            Some(code) if command.accepts(code) => Ok(execution.output),
            Some(code) => {
                warn!("{} exited with unexpected code {}", command.program_name(), code);
                Err(ProcessError::NonZeroExit {
                    program: command.program_name(),
                    code,
                })
            }
            None => Err(ProcessError::Terminated {
                program: command.program_name(),
            }),
        }
    }

    async fn execute(
        &self,
        command: &ExternalCommand,
        progress: Option<&Progress>,
        keep_output: bool,
    ) -> Result<Execution, ProcessError> {
        if let Some(line) = self.echo_line(command) {
            println!("{}", line);
        }
        if self.options.debug {
            debug!(target: TRANSCRIPT_TARGET, "$ {}", command);
        }

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: command.program_name(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ProcessError::Io(std::io::Error::other("stdout was not captured"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ProcessError::Io(std::io::Error::other("stderr was not captured"))
        })?;

        let (out, err) = tokio::join!(
            self.drain(stdout, command, progress, keep_output),
            self.drain(stderr, command, progress, keep_output),
        );
        let mut output = out?;
        output.push_str(&err?);

        let status = child.wait().await?;

        // Both streams are at end of file: the tool is done, whatever it last printed
        if let Some(progress) = progress {
            progress.complete();
        }
        if self.options.debug {
            debug!(target: TRANSCRIPT_TARGET, "exit status: {}", status);
        }

        Ok(Execution {
            code: status.code(),
            output,
        })
    }

    /// Console echo of a command line, only in verbose mode
    fn echo_line(&self, command: &ExternalCommand) -> Option<String> {
        self.options.verbose.then(|| command.to_string())
    }

    /// Read a stream until end of file, feeding progress and the transcript.
    async fn drain<R: AsyncRead + Unpin>(
        &self,
        mut reader: R,
        command: &ExternalCommand,
        progress: Option<&Progress>,
        keep_output: bool,
    ) -> Result<String, ProcessError> {
        let mut scanner = command.progress.as_ref().map(ProgressScanner::new);
        let mut buffer = vec![0u8; READ_CHUNK];
        let mut output = String::new();

        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            let chunk = String::from_utf8_lossy(&buffer[..read]);

            if let (Some(scanner), Some(progress)) = (scanner.as_mut(), progress) {
                for percent in scanner.feed(&chunk) {
                    progress.update(percent);
                }
            }
            if self.options.debug {
                debug!(target: TRANSCRIPT_TARGET, "{}", chunk.trim_end());
            }
            if keep_output {
                output.push_str(&chunk);
            }
        }

        if let (Some(scanner), Some(progress)) = (scanner.as_mut(), progress) {
            for percent in scanner.finish() {
                progress.update(percent);
            }
        }

        Ok(output)
    }
}
