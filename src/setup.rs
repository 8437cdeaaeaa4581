use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::classify::ContainerKind;
use crate::config::{Tool, ToolsConfig};
use crate::error::{HardsubError, Result};
use crate::media::required_tools;

/// Only Linux builds of the external tools are supported.
pub fn check_platform() -> Result<()> {
    if cfg!(target_os = "linux") {
        Ok(())
    } else {
        Err(HardsubError::PlatformUnsupported(std::env::consts::OS.to_string()))
    }
}

/// Source and output must both be existing directories. Every problem found
/// is reported at once.
pub fn check_directories(source_dir: &Path, output_dir: &Path) -> Result<()> {
    let mut problems = Vec::new();
    for (role, dir) in [("Source", source_dir), ("Output", output_dir)] {
        if !dir.exists() {
            problems.push(format!("{} directory {} does not exist", role, dir.display()));
        } else if !dir.is_dir() {
            problems.push(format!("{} {} is not a directory", role, dir.display()));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(HardsubError::InvalidArgument(problems))
    }
}

/// Tools needed to process files of the given kinds
pub fn required_tools_for(kinds: &[ContainerKind]) -> BTreeSet<Tool> {
    kinds
        .iter()
        .flat_map(|&kind| required_tools(kind).iter().copied())
        .collect()
}

/// Resolve the tools needed for `kinds` to absolute paths.
///
/// Bare names are searched on PATH; absolute paths are kept if they point at
/// a file. Tools of other kinds are left untouched. All missing tools are
/// listed in the returned error.
pub fn resolve_tools(tools: &ToolsConfig, kinds: &[ContainerKind]) -> Result<ToolsConfig> {
    let mut resolved = tools.clone();
    let mut missing = Vec::new();

    for tool in required_tools_for(kinds) {
        let name = tools.get(tool);
        let path = Path::new(name);
        if path.is_absolute() {
            if path.is_file() {
                debug!("Using {}", name);
            } else {
                missing.push(name.to_string());
            }
            continue;
        }

        match which::which(name) {
            Ok(found) => {
                debug!("Found {} at {}", name, found.display());
                resolved.set(tool, found.to_string_lossy().to_string());
            }
            Err(_) => missing.push(name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(HardsubError::MissingDependency(missing));
    }
    info!("External tools found");
    Ok(resolved)
}
