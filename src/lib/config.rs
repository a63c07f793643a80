//! Merge plan loading.
//!
//! The merge plan describes which source fonts exist, which composite fonts are built from
//! them (and in what order the sources are merged), and how the merged files are patched
//! afterwards. It is written in TOML:
//!
//! ```toml
//! font_dir = "src_fonts"
//! output_dir = "."
//! subfamily = "Medium"
//!
//! [fonts]
//! tektur = "tektur-ksm/Tektur-KSM-Medium.ttf"
//! noto_sans_jp = "noto-sans-jp/NotoSansJP-Medium.ttf"
//!
//! [[output]]
//! file = "KSM-JA-Medium.ttf"
//! description = "Japanese/Korean"
//! family = "KSM-System-JA"
//! inputs = ["tektur", "noto_sans_jp"]
//! postprocess = true
//!
//! [postprocess]
//! enabled = true
//! kana_donor = "noto_sans_jp"
//! kana_ranges = ["3040-309F", "30A0-30FF"]
//! kerning_donor = "tektur"
//! kerning_tables = ["GPOS", "kern"]
//! ```
//!
//! The built-in plan (see [`default_plan_toml`]) reproduces the three fonts shipped with
//! the game. A project can override it with a `ksm-fonts.toml` next to `src_fonts`.

use crate::MergeError;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use toml::Value;

const DEFAULT_PLAN: &str = include_str!("default_plan.toml");

/// File name looked up in the project root when no plan is given explicitly.
pub const PROJECT_PLAN_FILE: &str = "ksm-fonts.toml";

/// Where the merge plan should be loaded from.
#[derive(Debug, Clone)]
pub enum ConfigSource<'a> {
    /// Use the built-in plan
    Default,
    /// Load the plan from a file path
    File(&'a Path),
    /// Use a TOML string supplied by the caller
    Embedded(&'a str),
}

/// An inclusive range of Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodepointRange {
    pub start: u32,
    pub end: u32,
}

impl CodepointRange {
    pub fn contains(&self, codepoint: u32) -> bool {
        (self.start..=self.end).contains(&codepoint)
    }
}

impl FromStr for CodepointRange {
    type Err = String;

    /// Accepts `"3040-309F"`, `"U+3040-U+309F"` or a single `"3042"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn hex(part: &str) -> Result<u32, String> {
            let part = part.trim();
            let digits = part
                .strip_prefix("U+")
                .or_else(|| part.strip_prefix("u+"))
                .or_else(|| part.strip_prefix("0x"))
                .unwrap_or(part);
            let value = u32::from_str_radix(digits, 16)
                .map_err(|_| format!("'{}' is not a hexadecimal codepoint", part))?;
            if value > 0x10FFFF {
                return Err(format!("'{}' is beyond U+10FFFF", part));
            }
            Ok(value)
        }

        let (start, end) = match s.split_once('-') {
            Some((a, b)) => (hex(a)?, hex(b)?),
            None => {
                let v = hex(s)?;
                (v, v)
            }
        };
        if start > end {
            return Err(format!("range '{}' ends before it starts", s));
        }
        Ok(CodepointRange { start, end })
    }
}

impl fmt::Display for CodepointRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U+{:04X}-U+{:04X}", self.start, self.end)
    }
}

/// One composite font to build.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    /// Output file name, relative to the plan's output directory
    pub file: String,
    /// Human readable description used in progress output
    pub description: String,
    /// Family name written into the name table
    pub family: String,
    /// Font keys in merge order; the first one is the base font
    pub inputs: Vec<String>,
    /// Whether post-processing runs for this output
    pub postprocess: bool,
}

/// Patching applied to merged fonts.
#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessSpec {
    pub enabled: bool,
    pub kana_donor: Option<String>,
    pub kana_ranges: Vec<CodepointRange>,
    pub kerning_donor: Option<String>,
    pub kerning_tables: Vec<String>,
}

impl Default for PostProcessSpec {
    fn default() -> Self {
        PostProcessSpec {
            enabled: false,
            kana_donor: None,
            kana_ranges: default_kana_ranges(),
            kerning_donor: None,
            kerning_tables: vec!["GPOS".to_string(), "kern".to_string()],
        }
    }
}

/// Hiragana, Katakana, Katakana Phonetic Extensions and halfwidth Katakana.
pub fn default_kana_ranges() -> Vec<CodepointRange> {
    vec![
        CodepointRange { start: 0x3040, end: 0x309F },
        CodepointRange { start: 0x30A0, end: 0x30FF },
        CodepointRange { start: 0x31F0, end: 0x31FF },
        CodepointRange { start: 0xFF65, end: 0xFF9F },
    ]
}

/// The complete description of a build.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub font_dir: PathBuf,
    pub output_dir: PathBuf,
    pub subfamily: String,
    pub fonts: BTreeMap<String, PathBuf>,
    pub outputs: Vec<OutputSpec>,
    pub postprocess: PostProcessSpec,
}

impl MergePlan {
    /// Absolute-or-root-relative path of the font registered under `key`.
    pub fn font_path(&self, root: &Path, key: &str) -> Result<PathBuf, MergeError> {
        let relative = self.fonts.get(key).ok_or_else(|| {
            MergeError::config(
                format!("unknown font '{}'", key),
                "Add the font to the [fonts] table of the merge plan",
            )
        })?;
        Ok(root.join(&self.font_dir).join(relative))
    }

    /// Input paths of `output` in merge order.
    pub fn input_paths(&self, root: &Path, output: &OutputSpec) -> Result<Vec<PathBuf>, MergeError> {
        output
            .inputs
            .iter()
            .map(|key| self.font_path(root, key))
            .collect()
    }

    pub fn output_path(&self, root: &Path, output: &OutputSpec) -> PathBuf {
        root.join(&self.output_dir).join(&output.file)
    }

    /// Every font file the plan will read, in first-use order and without duplicates.
    ///
    /// Donor fonts are included only when post-processing is switched on.
    pub fn referenced_fonts(&self, root: &Path) -> Result<Vec<PathBuf>, MergeError> {
        let mut keys: Vec<&str> = Vec::new();
        for output in &self.outputs {
            for key in &output.inputs {
                if !keys.contains(&key.as_str()) {
                    keys.push(key);
                }
            }
        }
        if self.postprocess.enabled {
            for donor in [&self.postprocess.kana_donor, &self.postprocess.kerning_donor]
                .into_iter()
                .flatten()
            {
                if !keys.contains(&donor.as_str()) {
                    keys.push(donor);
                }
            }
        }
        keys.into_iter().map(|key| self.font_path(root, key)).collect()
    }

    /// Checks that every key the plan uses is defined and every output is buildable.
    pub fn validate(&self) -> Result<(), MergeError> {
        if self.outputs.is_empty() {
            return Err(MergeError::config(
                "the merge plan defines no outputs",
                "Add at least one [[output]] section",
            ));
        }
        for output in &self.outputs {
            if output.inputs.is_empty() {
                return Err(MergeError::config(
                    format!("output '{}' has no inputs", output.file),
                    "List at least one font key in `inputs`",
                ));
            }
            if output.family.trim().is_empty() {
                return Err(MergeError::config(
                    format!("output '{}' has an empty family name", output.file),
                    "Set `family` for the output",
                ));
            }
            for key in &output.inputs {
                self.ensure_font_key(key)?;
            }
        }
        let donors = [&self.postprocess.kana_donor, &self.postprocess.kerning_donor];
        for donor in donors.into_iter().flatten() {
            self.ensure_font_key(donor)?;
        }
        Ok(())
    }

    fn ensure_font_key(&self, key: &str) -> Result<(), MergeError> {
        if self.fonts.contains_key(key) {
            Ok(())
        } else {
            Err(MergeError::config(
                format!("unknown font '{}'", key),
                "Add the font to the [fonts] table of the merge plan",
            ))
        }
    }
}

/// Returns the built-in plan as TOML text.
pub fn default_plan_toml() -> &'static str {
    DEFAULT_PLAN
}

/// Loads and validates a merge plan.
///
/// # Example
/// ```rust
/// use ksm_font_merge::config::{load_plan, ConfigSource};
///
/// let plan = load_plan(ConfigSource::Default).unwrap();
/// assert_eq!(plan.outputs.len(), 3);
/// assert_eq!(plan.outputs[0].family, "KSM-System-JA");
/// ```
pub fn load_plan(source: ConfigSource) -> Result<MergePlan, MergeError> {
    match source {
        ConfigSource::Default => parse_plan_string(DEFAULT_PLAN),
        ConfigSource::File(path) => {
            let content = fs::read_to_string(path).map_err(|e| MergeError::io(e, path))?;
            parse_plan_string(&content)
        }
        ConfigSource::Embedded(content) => parse_plan_string(content),
    }
}

/// Parses a TOML merge plan and validates it.
pub fn parse_plan_string(plan_str: &str) -> Result<MergePlan, MergeError> {
    let config: Value = toml::from_str(plan_str).map_err(|e| {
        MergeError::config(
            format!("invalid TOML: {}", e),
            "Compare with the output of --print-default-config",
        )
    })?;

    let font_dir = config
        .get("font_dir")
        .and_then(|v| v.as_str())
        .unwrap_or("src_fonts");
    let output_dir = config
        .get("output_dir")
        .and_then(|v| v.as_str())
        .unwrap_or(".");
    let subfamily = config
        .get("subfamily")
        .and_then(|v| v.as_str())
        .unwrap_or("Medium");

    let mut fonts = BTreeMap::new();
    if let Some(table) = config.get("fonts").and_then(|v| v.as_table()) {
        for (key, value) in table {
            let path = value.as_str().ok_or_else(|| {
                MergeError::config(
                    format!("font '{}' must be a path string", key),
                    "Write fonts as `key = \"dir/File.ttf\"`",
                )
            })?;
            fonts.insert(key.clone(), PathBuf::from(path));
        }
    }

    let postprocess = parse_postprocess(config.get("postprocess"))?;

    let mut outputs = Vec::new();
    if let Some(entries) = config.get("output").and_then(|v| v.as_array()) {
        for entry in entries {
            outputs.push(parse_output(entry)?);
        }
    }

    let plan = MergePlan {
        font_dir: PathBuf::from(font_dir),
        output_dir: PathBuf::from(output_dir),
        subfamily: subfamily.to_string(),
        fonts,
        outputs,
        postprocess,
    };
    plan.validate()?;
    Ok(plan)
}

fn required_str(entry: &Value, field: &str) -> Result<String, MergeError> {
    entry
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            MergeError::config(
                format!("[[output]] is missing `{}`", field),
                "Every output needs file, description, family and inputs",
            )
        })
}

fn string_list(value: Option<&Value>, field: &str) -> Result<Option<Vec<String>>, MergeError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let array = value.as_array().ok_or_else(|| {
        MergeError::config(
            format!("`{}` must be an array of strings", field),
            format!("Write `{} = [\"...\"]`", field),
        )
    })?;
    array
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                MergeError::config(
                    format!("`{}` contains a non-string entry", field),
                    format!("Write `{} = [\"...\"]`", field),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn parse_output(entry: &Value) -> Result<OutputSpec, MergeError> {
    let file = required_str(entry, "file")?;
    let family = required_str(entry, "family")?;
    let description = entry
        .get("description")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| family.clone());
    let inputs = string_list(entry.get("inputs"), "inputs")?.unwrap_or_default();
    let postprocess = entry
        .get("postprocess")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    Ok(OutputSpec {
        file,
        description,
        family,
        inputs,
        postprocess,
    })
}

fn parse_postprocess(value: Option<&Value>) -> Result<PostProcessSpec, MergeError> {
    let Some(section) = value else {
        return Ok(PostProcessSpec::default());
    };
    let defaults = PostProcessSpec::default();

    let kana_ranges = match string_list(section.get("kana_ranges"), "kana_ranges")? {
        Some(items) => items
            .iter()
            .map(|s| {
                s.parse::<CodepointRange>().map_err(|e| {
                    MergeError::config(
                        format!("bad kana range: {}", e),
                        "Use hexadecimal ranges such as \"3040-309F\"",
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => defaults.kana_ranges,
    };

    let kerning_tables = match string_list(section.get("kerning_tables"), "kerning_tables")? {
        Some(tags) => {
            for tag in &tags {
                if tag.is_empty() || tag.len() > 4 || !tag.is_ascii() {
                    return Err(MergeError::config(
                        format!("'{}' is not a table tag", tag),
                        "Table tags are one to four ASCII characters, e.g. \"GPOS\"",
                    ));
                }
            }
            tags
        }
        None => defaults.kerning_tables,
    };

    Ok(PostProcessSpec {
        enabled: section
            .get("enabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
        kana_donor: section
            .get("kana_donor")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        kana_ranges,
        kerning_donor: section
            .get("kerning_donor")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        kerning_tables,
    })
}
