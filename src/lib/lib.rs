//! The ksm_font_merge library builds the composite system fonts used by the game client.
//!
//! Three output fonts (Japanese/Korean, Simplified Chinese and Traditional Chinese) are
//! produced from the same set of source fonts: a display font, a logo font and a family of
//! regional Noto Sans variants. The heavy lifting of concatenating glyph tables is done by
//! FontForge, driven through a generated script; this crate sequences those runs and then
//! patches the merged files to restore kana glyphs and kerning data that FontForge drops.
//!
//! ```text
//! +-------------+     +----------------+     +-----------------+     +---------------+
//! | Merge plan  |     | Preflight      |     | FontForge run   |     | Post-process  |
//! | (TOML)      | --> | - tool version | --> | - script per    | --> | - kana glyphs |
//! | - fonts     |     | - input files  |     |   output font   |     | - GPOS / kern |
//! | - outputs   |     |                |     | - exit status   |     |               |
//! +-------------+     +----------------+     +-----------------+     +---------------+
//! ```
//!
//! Basic usage mirrors what the `merge_all_fonts` binary does:
//! ```no_run
//! use ksm_font_merge::config::{load_plan, ConfigSource};
//! use ksm_font_merge::pipeline::{run, RunOptions};
//! use std::error::Error;
//!
//! fn example() -> Result<(), Box<dyn Error>> {
//!     let plan = load_plan(ConfigSource::Default)?;
//!     let options = RunOptions::new(".");
//!     let summary = run(&plan, &options)?;
//!     assert!(summary.all_succeeded());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod fontforge;
pub mod glyph_restore;
pub mod kerning;
mod outline;
pub mod pipeline;
pub mod preflight;
pub mod script;
pub mod sfnt;

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors raised while preparing, running or patching a font merge.
#[derive(Debug)]
pub enum MergeError {
    /// The external font tool could not be started at all
    ToolNotFound { tool: String, suggestion: String },
    /// The external font tool ran but reported failure
    ToolFailed {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },
    /// One or more input fonts are missing
    MissingFonts { paths: Vec<PathBuf> },
    /// The merge plan is invalid
    ConfigError { message: String, suggestion: String },
    /// A filesystem operation failed
    IoError {
        message: String,
        path: String,
        suggestion: String,
    },
    /// A font could not be parsed or is not in a supported shape
    FontError { font: String, message: String },
    /// The tool exited successfully but left no usable output
    EmptyOutput { path: PathBuf },
    /// No requested table could be transplanted because glyph ids differ between fonts
    IncompatibleGlyphOrder {
        table: String,
        donor_glyph: u32,
        target_glyph: Option<u32>,
    },
    /// Appending glyphs would overflow the 16-bit glyph index space
    TooManyGlyphs { requested: usize },
}

impl Error for MergeError {}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MergeError::ToolNotFound { tool, suggestion } => {
                write!(f, "❌ {} not found", tool)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            MergeError::ToolFailed {
                tool,
                status,
                stderr,
            } => {
                write!(f, "❌ {} failed", tool)?;
                if let Some(code) = status {
                    write!(f, " (exit status {})", code)?;
                }
                if !stderr.trim().is_empty() {
                    write!(f, "\nOutput:\n{}", stderr.trim_end())?;
                }
                Ok(())
            }
            MergeError::MissingFonts { paths } => {
                write!(f, "❌ Missing font files:")?;
                for path in paths {
                    write!(f, "\n  - {}", path.display())?;
                }
                write!(
                    f,
                    "\n💡 Suggestion: Place the source fonts under the project's src_fonts directory"
                )
            }
            MergeError::ConfigError {
                message,
                suggestion,
            } => {
                write!(f, "❌ Configuration Error: {}", message)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            MergeError::IoError {
                message,
                path,
                suggestion,
            } => {
                write!(f, "❌ File Error: {}", message)?;
                write!(f, "\n📁 Path: {}", path)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            MergeError::FontError { font, message } => {
                write!(f, "❌ Font Error in '{}': {}", font, message)
            }
            MergeError::EmptyOutput { path } => {
                write!(f, "❌ Merge produced no output")?;
                write!(f, "\n📁 Path: {}", path.display())?;
                write!(
                    f,
                    "\n💡 Suggestion: Run with -v to see the generated FontForge script"
                )
            }
            MergeError::IncompatibleGlyphOrder {
                table,
                donor_glyph,
                target_glyph,
            } => {
                write!(
                    f,
                    "❌ Cannot copy '{}': donor glyph {} maps to ",
                    table, donor_glyph
                )?;
                match target_glyph {
                    Some(gid) => write!(f, "glyph {} in the merged font", gid)?,
                    None => write!(f, "no glyph in the merged font")?,
                }
                write!(
                    f,
                    "\n💡 Suggestion: Only 'kern' can follow a changed glyph order; add \"kern\" to kerning_tables or remove '{}' from it",
                    table
                )
            }
            MergeError::TooManyGlyphs { requested } => {
                write!(
                    f,
                    "❌ Font would need {} glyphs, more than the 65535 allowed",
                    requested
                )
            }
        }
    }
}

impl MergeError {
    /// Wraps an I/O failure on `path`
    pub fn io(message: impl fmt::Display, path: &Path) -> Self {
        MergeError::IoError {
            message: message.to_string(),
            path: path.display().to_string(),
            suggestion: "Check that the path exists and you have read/write permissions"
                .to_string(),
        }
    }

    /// Creates a font error for the font identified by `font`
    pub fn font(font: impl Into<String>, message: impl fmt::Display) -> Self {
        MergeError::FontError {
            font: font.into(),
            message: message.to_string(),
        }
    }

    /// Creates a plan error with a hint for the user
    pub fn config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        MergeError::ConfigError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}
