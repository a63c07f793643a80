//! Checks that run before any merge is attempted.

use crate::config::MergePlan;
use crate::MergeError;
use log::{debug, error, info};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Runs `<executable> --version` and returns the reported version.
///
/// The version is the first whitespace-separated token of the tool's standard output.
pub fn check_fontforge(executable: &Path) -> Result<String, MergeError> {
    debug!("Probing {:?} --version", executable);
    let output = match Command::new(executable).arg("--version").output() {
        Ok(output) => output,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            error!("FontForge not found");
            return Err(MergeError::ToolNotFound {
                tool: "FontForge".to_string(),
                suggestion: "Install: brew install fontforge (or apt install fontforge)"
                    .to_string(),
            });
        }
        Err(e) => {
            return Err(MergeError::ToolFailed {
                tool: "FontForge".to_string(),
                status: None,
                stderr: e.to_string(),
            })
        }
    };

    if !output.status.success() {
        error!("FontForge not properly installed");
        return Err(MergeError::ToolFailed {
            tool: "FontForge".to_string(),
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = first_token(&stdout).unwrap_or("unknown").to_string();
    info!("✓ FontForge: {}", version);
    Ok(version)
}

fn first_token(text: &str) -> Option<&str> {
    text.split_whitespace().next()
}

/// Returns the subset of `paths` that do not exist.
pub fn missing_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths.iter().filter(|p| !p.exists()).cloned().collect()
}

/// Verifies that every font the plan reads is present under `root`.
pub fn check_fonts_exist(plan: &MergePlan, root: &Path) -> Result<(), MergeError> {
    let fonts = plan.referenced_fonts(root)?;
    let missing = missing_files(&fonts);
    if !missing.is_empty() {
        error!("Missing font files:");
        for font in &missing {
            error!("  - {}", font.display());
        }
        return Err(MergeError::MissingFonts { paths: missing });
    }
    info!("✓ All source fonts found");
    Ok(())
}
