//! FontForge native-script generation.
//!
//! Each output font is produced by one legacy (`.pe`) script: the first input is opened as
//! the base font, every further input is merged into it, the naming is rewritten and the
//! result is generated as TrueType.

use crate::MergeError;
use std::path::Path;

/// Windows platform, US English
const WINDOWS_EN_US: u16 = 0x409;
/// Macintosh platform, Roman/English
const MAC_ROMAN: u16 = 0x0;
/// Typographic family name
const NAME_ID_TYPO_FAMILY: u16 = 16;
/// Typographic subfamily name
const NAME_ID_TYPO_SUBFAMILY: u16 = 17;

/// Quotes `value` as a FontForge script string literal.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn path_literal(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// Builds the merge script for one output font.
///
/// # Example
/// ```rust
/// use ksm_font_merge::script::fontforge_script;
/// use std::path::PathBuf;
///
/// let inputs = vec![PathBuf::from("/f/Base.ttf"), PathBuf::from("/f/Extra.ttf")];
/// let script = fontforge_script(&inputs, &PathBuf::from("/out/X.ttf"), "X", "Medium").unwrap();
/// assert!(script.starts_with("#!/usr/bin/env fontforge\nOpen(\"/f/Base.ttf\")\n"));
/// assert!(script.contains("MergeFonts(\"/f/Extra.ttf\")\n"));
/// assert!(script.ends_with("Generate(\"/out/X.ttf\")\n"));
/// ```
pub fn fontforge_script<P: AsRef<Path>>(
    inputs: &[P],
    output: &Path,
    family: &str,
    subfamily: &str,
) -> Result<String, MergeError> {
    let (base, rest) = inputs.split_first().ok_or_else(|| {
        MergeError::config(
            format!("no input fonts for '{}'", family),
            "List at least one font key in `inputs`",
        )
    })?;

    let family = quote(family);
    let subfamily = quote(subfamily);

    let mut script = String::from("#!/usr/bin/env fontforge\n");
    script.push_str(&format!("Open({})\n", path_literal(base.as_ref())));
    for font in rest {
        script.push_str(&format!("MergeFonts({})\n", path_literal(font.as_ref())));
    }
    script.push_str(&format!("SetFontNames({0}, {0}, {0})\n", family));
    for platform in [WINDOWS_EN_US, MAC_ROMAN] {
        script.push_str(&format!(
            "SetTTFName({:#x}, {}, {})\n",
            platform, NAME_ID_TYPO_FAMILY, family
        ));
        script.push_str(&format!(
            "SetTTFName({:#x}, {}, {})\n",
            platform, NAME_ID_TYPO_SUBFAMILY, subfamily
        ));
    }
    script.push_str(&format!("Generate({})\n", path_literal(output)));
    Ok(script)
}
