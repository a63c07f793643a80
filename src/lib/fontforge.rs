//! Runs FontForge on a generated script.

use crate::MergeError;
use log::{debug, trace};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Captured result of a successful FontForge run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Handle on the FontForge executable.
#[derive(Debug, Clone)]
pub struct FontForge {
    executable: PathBuf,
}

impl Default for FontForge {
    fn default() -> Self {
        FontForge::new("fontforge")
    }
}

impl FontForge {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        FontForge {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Writes `script` to a temporary `.pe` file and runs `fontforge -script <file>`.
    ///
    /// The temporary file is removed whatever the outcome. When `keep_as` is given, a copy
    /// of the script is also written there for inspection.
    pub fn run_script(&self, script: &str, keep_as: Option<&Path>) -> Result<ToolOutput, MergeError> {
        let mut file = tempfile::Builder::new()
            .prefix("temp_merge_script_")
            .suffix(".pe")
            .tempfile()
            .map_err(|e| MergeError::io(e, &std::env::temp_dir()))?;
        file.write_all(script.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| MergeError::io(e, file.path()))?;
        debug!("Wrote FontForge script to {:?}", file.path());
        trace!("Script:\n{}", script);

        if let Some(copy) = keep_as {
            fs::write(copy, script).map_err(|e| MergeError::io(e, copy))?;
            debug!("Kept a copy of the script at {:?}", copy);
        }

        let result = Command::new(&self.executable)
            .arg("-script")
            .arg(file.path())
            .output();
        // `file` is dropped (and deleted) when this function returns.
        let output = match result {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MergeError::ToolNotFound {
                    tool: "FontForge".to_string(),
                    suggestion: "Install: brew install fontforge (or pass --fontforge <PATH>)"
                        .to_string(),
                })
            }
            Err(e) => {
                return Err(MergeError::ToolFailed {
                    tool: "FontForge".to_string(),
                    status: None,
                    stderr: e.to_string(),
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stderr.is_empty() {
            trace!("FontForge stderr:\n{}", stderr);
        }

        if !output.status.success() {
            return Err(MergeError::ToolFailed {
                tool: "FontForge".to_string(),
                status: output.status.code(),
                stderr,
            });
        }
        Ok(ToolOutput { stdout, stderr })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn fake_tool(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-fontforge");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn successful_run_captures_output() {
        let dir = tempdir().unwrap();
        let tool = fake_tool(dir.path(), "cat \"$2\"");
        let output = FontForge::new(tool).run_script("Open(\"x\")\n", None).unwrap();
        assert_eq!(output.stdout, "Open(\"x\")\n");
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let dir = tempdir().unwrap();
        let tool = fake_tool(dir.path(), "echo 'cannot open' >&2; exit 3");
        let err = FontForge::new(tool).run_script("", None).unwrap_err();
        match err {
            MergeError::ToolFailed { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert!(stderr.contains("cannot open"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn script_is_removed_and_copy_kept() {
        let dir = tempdir().unwrap();
        let record = dir.path().join("seen.txt");
        let tool = fake_tool(
            dir.path(),
            &format!("echo \"$2\" > '{}'", record.display()),
        );
        let keep = dir.path().join("kept.pe");
        FontForge::new(tool)
            .run_script("Generate(\"x\")\n", Some(&keep))
            .unwrap();
        let used = fs::read_to_string(&record).unwrap();
        assert!(!Path::new(used.trim()).exists());
        assert_eq!(fs::read_to_string(&keep).unwrap(), "Generate(\"x\")\n");
    }

    #[test]
    fn missing_tool_is_not_found() {
        let err = FontForge::new("/nonexistent/fontforge")
            .run_script("", None)
            .unwrap_err();
        assert!(matches!(err, MergeError::ToolNotFound { .. }));
    }
}
