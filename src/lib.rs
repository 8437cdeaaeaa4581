//! Hardsub - Batch Subtitle Burning
//!
//! Finds every video in a directory that has a companion subtitle file,
//! re-encodes it with the subtitles burned in using mencoder and rebuilds
//! the original container with mkvtoolnix, MP4Box or ffmpeg.

pub mod cli;
pub mod config;
pub mod error;
pub mod setup;
pub mod process;
pub mod classify;
pub mod media;
pub mod discovery;
pub mod workflow;
pub mod subtitle;
