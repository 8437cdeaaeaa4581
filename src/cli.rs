use clap::Parser;
use std::path::PathBuf;

use crate::subtitle::parse_scale;

/// Burn subtitles into every video of a directory
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory holding the videos and their subtitle files
    pub source_dir: PathBuf,

    /// Directory receiving the hardsubbed videos
    #[arg(short, long)]
    pub output: PathBuf,

    /// Subtitle font scale, between 1 and 100 [default: 2.5]
    #[arg(short, long, value_parser = parse_scale)]
    pub subtitle_scale: Option<f64>,

    /// Print every external command before running it
    #[arg(short, long)]
    pub verbose: bool,

    /// Use the output directory even if it is not empty
    #[arg(short, long)]
    pub force: bool,

    /// Append commands and their full output to the debug log
    #[arg(long)]
    pub debug: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Keep processing the remaining files when one fails
    #[arg(short, long)]
    pub keep_going: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}
