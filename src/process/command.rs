use regex::Regex;
use std::fmt;
use std::path::Path;

/// Pattern used to read progress out of a tool's output.
///
/// The regular expression must have exactly one capturing group that
/// yields an integer; `scale` is the value that integer reaches at 100%.
#[derive(Debug, Clone)]
pub struct ProgressPattern {
    regex: Regex,
    scale: u64,
}

impl ProgressPattern {
    pub fn new(regex: &Regex, scale: u64) -> Self {
        debug_assert_eq!(regex.captures_len(), 2, "progress pattern needs one capture group");
        Self {
            regex: regex.clone(),
            scale: scale.max(1),
        }
    }

    /// Pattern whose captured value is already a percentage
    pub fn percent(regex: &Regex) -> Self {
        Self::new(regex, 100)
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn scale(&self) -> u64 {
        self.scale
    }

    /// `100 * captured / scale`, clamped to 100
    pub fn rescale(&self, captured: u64) -> u64 {
        (captured.saturating_mul(100) / self.scale).min(100)
    }
}

/// A fully built external command: executable, arguments, how to read its
/// progress and which exit codes count as success.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub progress: Option<ProgressPattern>,
    pub accepted_exit_codes: Vec<i32>,
}

impl ExternalCommand {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            progress: None,
            accepted_exit_codes: vec![0],
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add a path argument
    pub fn path<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn progress(mut self, pattern: ProgressPattern) -> Self {
        self.progress = Some(pattern);
        self
    }

    pub fn accept_exit_codes<I: IntoIterator<Item = i32>>(mut self, codes: I) -> Self {
        self.accepted_exit_codes = codes.into_iter().collect();
        self
    }

    pub fn accepts(&self, code: i32) -> bool {
        self.accepted_exit_codes.contains(&code)
    }

    /// Short program name, used in error messages
    pub fn program_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.clone())
    }
}

impl fmt::Display for ExternalCommand {
    /// Shell-like rendering, quoting arguments that need it
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
