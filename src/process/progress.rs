use indicatif::{ProgressBar, ProgressStyle};

use super::command::ProgressPattern;

/// Incremental matcher over a process output stream.
///
/// Output arrives in arbitrary chunks. Encoders redraw their status line
/// with `\r`, so both `\r` and `\n` end a segment. The unterminated tail is
/// kept until more output arrives or the stream ends.
pub struct ProgressScanner<'a> {
    pattern: &'a ProgressPattern,
    pending: String,
}

impl<'a> ProgressScanner<'a> {
    pub fn new(pattern: &'a ProgressPattern) -> Self {
        Self {
            pattern,
            pending: String::new(),
        }
    }

    /// Feed a chunk, returning the percentages found in every segment it completes
    pub fn feed(&mut self, chunk: &str) -> Vec<u64> {
        self.pending.push_str(chunk);
        let Some(last_break) = self.pending.rfind(['\r', '\n']) else {
            return Vec::new();
        };

        let tail = self.pending.split_off(last_break + 1);
        let complete = std::mem::replace(&mut self.pending, tail);
        self.matches(&complete)
    }

    /// Match whatever is left once the stream has ended
    pub fn finish(&mut self) -> Vec<u64> {
        let rest = std::mem::take(&mut self.pending);
        self.matches(&rest)
    }

    fn matches(&self, text: &str) -> Vec<u64> {
        text.split(['\r', '\n'])
            .flat_map(|segment| self.pattern.regex().captures_iter(segment))
            .filter_map(|caps| caps.get(1)?.as_str().trim().parse::<u64>().ok())
            .map(|captured| self.pattern.rescale(captured))
            .collect()
    }
}

/// Console progress indicator bounded to [0, 100]
#[derive(Clone)]
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}{percent:>3}% [{bar:40}] {eta}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(label.to_string());
        Self { bar }
    }

    /// Tracks position without drawing anything
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn update(&self, percent: u64) {
        self.bar.set_position(percent.min(100));
    }

    /// Force completion, whatever the last reported value was
    pub fn complete(&self) {
        self.bar.set_position(100);
        self.bar.finish();
    }

    /// Stop drawing, leaving the bar where it is
    pub fn abandon(&self) {
        self.bar.abandon();
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}
