/// Command-line argument parsing module
///
/// This module defines the CLI structure using clap with derive macros.
/// It supports:
/// - Standard verbosity flags: -v, -vv
/// - Quiet flag: -q
/// - Verbose level flag: --verbose-level=LEVEL
/// - Environment variable RUST_LOG integration
use clap::Parser;
use std::path::PathBuf;

/// Build the composite KSM system fonts
///
/// Merges the source fonts under `<project-root>/src_fonts` into the JA, SC and TC
/// system fonts with FontForge, then restores the kana glyphs and kerning tables
/// that the merge loses.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct MergeAllFontsArgs {
    /// Project root holding `src_fonts/`; outputs are written here by default
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project_root: PathBuf,

    /// Merge plan to use instead of `<project-root>/ksm-fonts.toml` or the built-in one
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// FontForge executable
    #[arg(long, value_name = "PATH", default_value = "fontforge")]
    pub fontforge: PathBuf,

    /// Only build this output (file or family name); may be repeated
    #[arg(long, value_name = "NAME")]
    pub only: Vec<String>,

    /// Skip kana restoration and kerning transplant
    #[arg(long)]
    pub skip_postprocess: bool,

    /// Print the FontForge scripts without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Keep each generated script next to its output as `<output>.pe`
    #[arg(long)]
    pub keep_scripts: bool,

    /// Print the built-in merge plan and exit
    #[arg(long)]
    pub print_default_config: bool,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Decrease verbosity level (suppress most output except errors)
    #[arg(short)]
    pub quiet: bool,

    /// Set explicit verbosity level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub verbose_level: Option<String>,
}

impl MergeAllFontsArgs {
    /// Determine the effective log level based on CLI flags and environment variables
    ///
    /// Priority:
    /// 1. RUST_LOG environment variable (highest priority)
    /// 2. --verbose-level flag
    /// 3. -q flag, then the count of -v flags (lowest priority)
    pub fn effective_log_level(&self) -> String {
        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            return rust_log;
        }

        if let Some(level) = &self.verbose_level {
            return level.clone();
        }

        if self.quiet {
            return "error".to_string();
        }

        match self.verbose {
            0 => "info".to_string(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}
