//! Sequencing of a full build: preflight, one FontForge run per output, post-processing.

use crate::config::{MergePlan, OutputSpec};
use crate::fontforge::FontForge;
use crate::{glyph_restore, kerning, preflight, script, MergeError};
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

const BANNER_WIDTH: usize = 60;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Knobs for a build that do not belong in the merge plan.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory the plan's relative paths are resolved against
    pub project_root: PathBuf,
    /// FontForge executable
    pub fontforge: PathBuf,
    /// Output file names or family names to build; empty builds everything
    pub only: Vec<String>,
    /// Print the scripts instead of running FontForge
    pub dry_run: bool,
    /// Leave each generated script next to its output as `<output>.pe`
    pub keep_scripts: bool,
    /// Skip kana restoration and kerning transplant
    pub skip_postprocess: bool,
}

impl RunOptions {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        RunOptions {
            project_root: project_root.into(),
            fontforge: PathBuf::from("fontforge"),
            only: Vec::new(),
            dry_run: false,
            keep_scripts: false,
            skip_postprocess: false,
        }
    }
}

/// Result of building one output font.
#[derive(Debug, Clone)]
pub struct OutputReport {
    pub file: String,
    pub description: String,
    pub path: PathBuf,
    /// Size of the finished font in bytes; `None` for dry runs and failures
    pub size: Option<u64>,
    /// Error text when the output could not be built
    pub error: Option<String>,
}

impl OutputReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-output results of a run, in plan order.
#[derive(Debug, Clone, Default)]
pub struct MergeSummary {
    pub outputs: Vec<OutputReport>,
}

impl MergeSummary {
    pub fn succeeded(&self) -> usize {
        self.outputs.iter().filter(|o| o.succeeded()).count()
    }

    pub fn total(&self) -> usize {
        self.outputs.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.total()
    }
}

fn banner() -> String {
    "=".repeat(BANNER_WIDTH)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Outputs of `plan` selected by `only` (all of them when `only` is empty).
pub fn select_outputs<'a>(
    plan: &'a MergePlan,
    only: &[String],
) -> Result<Vec<&'a OutputSpec>, MergeError> {
    if only.is_empty() {
        return Ok(plan.outputs.iter().collect());
    }
    for name in only {
        if !plan
            .outputs
            .iter()
            .any(|o| &o.file == name || &o.family == name)
        {
            let known: Vec<&str> = plan.outputs.iter().map(|o| o.file.as_str()).collect();
            return Err(MergeError::config(
                format!("no output named '{}'", name),
                format!("Use one of: {}", known.join(", ")),
            ));
        }
    }
    Ok(plan
        .outputs
        .iter()
        .filter(|o| only.iter().any(|n| n == &o.file || n == &o.family))
        .collect())
}

/// Builds every selected output of `plan`.
///
/// Preflight failures abort the run. A failing output is recorded in the summary
/// and the remaining outputs are still attempted.
pub fn run(plan: &MergePlan, options: &RunOptions) -> Result<MergeSummary, MergeError> {
    let root = options.project_root.as_path();
    let selected = select_outputs(plan, &options.only)?;

    info!("K-Shoot MANIA v2 Font Merge Script");
    info!("{}", banner());
    if options.dry_run {
        info!("Dry run: FontForge will not be started");
    } else {
        preflight::check_fontforge(&options.fontforge)?;
    }
    preflight::check_fonts_exist(plan, root)?;

    let tool = FontForge::new(&options.fontforge);
    let mut summary = MergeSummary::default();
    for output in selected {
        let path = plan.output_path(root, output);
        let result = merge_output(plan, output, options, &tool).and_then(|size| {
            if size.is_some() && wants_postprocess(plan, output, options) {
                postprocess_output(plan, root, &path)?;
                return output_size(&path).map(Some);
            }
            Ok(size)
        });

        let report = match result {
            Ok(size) => OutputReport {
                file: output.file.clone(),
                description: output.description.clone(),
                path,
                size,
                error: None,
            },
            Err(e) => {
                error!("✗ Error: {}", e);
                OutputReport {
                    file: output.file.clone(),
                    description: output.description.clone(),
                    path,
                    size: None,
                    error: Some(e.to_string()),
                }
            }
        };
        summary.outputs.push(report);
    }

    log_summary(&summary);
    Ok(summary)
}

fn wants_postprocess(plan: &MergePlan, output: &OutputSpec, options: &RunOptions) -> bool {
    plan.postprocess.enabled && output.postprocess && !options.skip_postprocess
}

fn output_size(path: &Path) -> Result<u64, MergeError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| MergeError::io(e, path))
}

/// Generates the script for `output` and runs FontForge on it.
///
/// Returns the size of the produced font, or `None` for a dry run.
pub fn merge_output(
    plan: &MergePlan,
    output: &OutputSpec,
    options: &RunOptions,
    tool: &FontForge,
) -> Result<Option<u64>, MergeError> {
    let root = options.project_root.as_path();
    let inputs = plan.input_paths(root, output)?;
    let path = plan.output_path(root, output);

    info!("");
    info!("{}", banner());
    info!("Merging: {}", output.description);
    info!("{}", banner());
    for (i, input) in inputs.iter().enumerate() {
        info!("  {}. {}", i + 1, file_name(input));
    }

    let script = script::fontforge_script(&inputs, &path, &output.family, &plan.subfamily)?;
    let keep_as = options.keep_scripts.then(|| path.with_extension("pe"));

    if options.dry_run {
        info!("Script for {}:", output.file);
        for line in script.lines() {
            info!("  {}", line);
        }
        if let Some(copy) = &keep_as {
            ensure_parent(copy)?;
            fs::write(copy, &script).map_err(|e| MergeError::io(e, copy))?;
        }
        return Ok(None);
    }

    ensure_parent(&path)?;
    if path.exists() {
        debug!("Removing previous {}", path.display());
        fs::remove_file(&path).map_err(|e| MergeError::io(e, &path))?;
    }

    let result = tool.run_script(&script, keep_as.as_deref())?;
    if !result.stdout.trim().is_empty() {
        debug!("FontForge output:\n{}", result.stdout.trim_end());
    }

    let size = match fs::metadata(&path) {
        Ok(meta) if meta.len() > 0 => meta.len(),
        _ => return Err(MergeError::EmptyOutput { path }),
    };
    info!("✓ Complete: {}", path.display());
    info!("  Size: {:.2} MB", size as f64 / BYTES_PER_MB);
    Ok(Some(size))
}

fn ensure_parent(path: &Path) -> Result<(), MergeError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| MergeError::io(e, parent))
        }
        _ => Ok(()),
    }
}

/// Restores kana glyphs, then kerning tables, in the font at `path`.
pub fn postprocess_output(plan: &MergePlan, root: &Path, path: &Path) -> Result<(), MergeError> {
    let spec = &plan.postprocess;

    match &spec.kana_donor {
        Some(key) if !spec.kana_ranges.is_empty() => {
            let donor = plan.font_path(root, key)?;
            info!("Restoring kana from {}", file_name(&donor));
            let report = glyph_restore::restore_glyphs_in_file(path, &donor, &spec.kana_ranges)?;
            if report.is_empty() {
                warn!("  No glyphs restored");
            }
        }
        _ => debug!("No kana donor configured"),
    }

    match &spec.kerning_donor {
        Some(key) if !spec.kerning_tables.is_empty() => {
            let donor = plan.font_path(root, key)?;
            info!("Copying {} from {}", spec.kerning_tables.join("/"), file_name(&donor));
            let report = kerning::copy_kerning_in_file(path, &donor, &spec.kerning_tables)?;
            if report.dropped_pairs > 0 {
                info!(
                    "  kern: {} pairs kept, {} dropped",
                    report.kern_pairs, report.dropped_pairs
                );
            }
            if !report.incompatible.is_empty() {
                warn!(
                    "  Left out {}: glyph order differs from the donor",
                    report.incompatible.join(", ")
                );
            }
        }
        _ => debug!("No kerning donor configured"),
    }
    Ok(())
}

fn log_summary(summary: &MergeSummary) {
    info!("");
    info!("{}", banner());
    info!(
        "Complete: {}/{} successful",
        summary.succeeded(),
        summary.total()
    );
    info!("{}", banner());

    if summary.all_succeeded() {
        info!("");
        info!("Generated fonts:");
        for output in &summary.outputs {
            info!("  - {} ({})", output.file, output.description);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_plan, ConfigSource};

    fn report(error: Option<&str>) -> OutputReport {
        OutputReport {
            file: "X.ttf".to_string(),
            description: "X".to_string(),
            path: PathBuf::from("X.ttf"),
            size: None,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn summary_counts_successes() {
        let summary = MergeSummary {
            outputs: vec![report(None), report(Some("boom")), report(None)],
        };
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.total(), 3);
        assert!(!summary.all_succeeded());
        assert!(MergeSummary::default().all_succeeded());
    }

    #[test]
    fn only_selects_by_file_or_family() {
        let plan = load_plan(ConfigSource::Default).unwrap();
        let all = select_outputs(&plan, &[]).unwrap();
        assert_eq!(all.len(), 3);

        let picked = select_outputs(
            &plan,
            &["KSM-TC-Medium.ttf".to_string(), "KSM-System-JA".to_string()],
        )
        .unwrap();
        let files: Vec<_> = picked.iter().map(|o| o.file.as_str()).collect();
        assert_eq!(files, ["KSM-JA-Medium.ttf", "KSM-TC-Medium.ttf"]);

        let err = select_outputs(&plan, &["KSM-KO".to_string()]).unwrap_err();
        assert!(err.to_string().contains("KSM-KO"));
    }

    #[test]
    fn options_default_to_plain_fontforge() {
        let options = RunOptions::new("/proj");
        assert_eq!(options.fontforge, PathBuf::from("fontforge"));
        assert!(!options.dry_run && !options.keep_scripts && !options.skip_postprocess);
    }

    #[test]
    fn postprocess_respects_all_switches() {
        let plan = load_plan(ConfigSource::Default).unwrap();
        let mut options = RunOptions::new(".");
        assert!(wants_postprocess(&plan, &plan.outputs[0], &options));
        options.skip_postprocess = true;
        assert!(!wants_postprocess(&plan, &plan.outputs[0], &options));
    }

    #[test]
    fn file_name_falls_back_to_display() {
        assert_eq!(file_name(Path::new("/a/b/Font.ttf")), "Font.ttf");
        assert_eq!(file_name(Path::new("/")), "/");
    }
}
