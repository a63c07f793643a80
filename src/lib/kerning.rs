//! Transplanting kerning and positioning tables from a donor font.
//!
//! MergeFonts keeps the glyphs of the base font but not its `GPOS`/`kern` data, so the
//! display font's spacing is lost. The tables are copied back from the donor here.
//! Glyph ids in the merged font need not match the donor's: a donor→target glyph
//! correspondence is built first (by glyph name, or by shared codepoints when names
//! are unavailable). The classic `kern` table is remapped pair by pair; every other
//! table is copied byte for byte, which is only sound when the correspondence is
//! the identity. When it is not, such tables are skipped with a warning and the
//! remapped `kern` table is still written.

use crate::sfnt::{self, FontTables};
use crate::MergeError;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};
use skrifa::{FontRef, MetadataProvider};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor};
use std::path::Path;
use write_fonts::types::Tag;

const TARGET: &str = "merged font";
const DONOR: &str = "kerning donor";

const KERN: Tag = Tag::new(b"kern");
const MAXP: Tag = Tag::new(b"maxp");
const POST: Tag = Tag::new(b"post");

const KERN_SUBTABLE_HEADER: usize = 6;
const KERN_FORMAT0_HEADER: usize = 8;
const KERN_PAIR_LEN: usize = 6;

/// Outcome of a kerning transplant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KerningReport {
    /// Tables written into the merged font
    pub copied: Vec<String>,
    /// Tables the donor does not have
    pub missing: Vec<String>,
    /// Kern pairs carried over after remapping
    pub kern_pairs: usize,
    /// Kern pairs dropped because a glyph has no counterpart
    pub dropped_pairs: usize,
    /// Tables left out because they cannot follow a changed glyph order
    pub incompatible: Vec<String>,
}

/// One kerning pair of a format 0 subtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KernPair {
    pub left: u16,
    pub right: u16,
    pub value: i16,
}

/// A subtable of a version 0 (OpenType) `kern` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernSubtable {
    /// Ordered list of pairs
    Format0 { coverage: u16, pairs: Vec<KernPair> },
    /// Any other format, kept as raw bytes including its header
    Other { coverage: u16, data: Vec<u8> },
}

/// A parsed OpenType `kern` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernTable {
    pub subtables: Vec<KernSubtable>,
}

impl KernTable {
    /// Parses a version 0 `kern` table. Returns `None` for the Apple (version 1) layout.
    pub fn from_bytes(data: &[u8]) -> io::Result<Option<Self>> {
        let mut cursor = Cursor::new(data);
        if cursor.read_u16::<BigEndian>()? != 0 {
            return Ok(None);
        }
        let count = cursor.read_u16::<BigEndian>()?;
        let mut subtables = Vec::with_capacity(count as usize);
        let mut pos = 4usize;
        for _ in 0..count {
            cursor.set_position(pos as u64);
            let _version = cursor.read_u16::<BigEndian>()?;
            let length = cursor.read_u16::<BigEndian>()? as usize;
            let coverage = cursor.read_u16::<BigEndian>()?;
            if coverage >> 8 == 0 {
                let n = cursor.read_u16::<BigEndian>()? as usize;
                cursor.set_position((pos + KERN_SUBTABLE_HEADER + KERN_FORMAT0_HEADER) as u64);
                let mut pairs = Vec::with_capacity(n);
                for _ in 0..n {
                    pairs.push(KernPair {
                        left: cursor.read_u16::<BigEndian>()?,
                        right: cursor.read_u16::<BigEndian>()?,
                        value: cursor.read_i16::<BigEndian>()?,
                    });
                }
                // The 16-bit length overflows for large subtables; trust the pair count.
                pos += KERN_SUBTABLE_HEADER + KERN_FORMAT0_HEADER + n * KERN_PAIR_LEN;
                subtables.push(KernSubtable::Format0 { coverage, pairs });
            } else {
                let raw = data.get(pos..pos + length).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "kern subtable is truncated")
                })?;
                subtables.push(KernSubtable::Other {
                    coverage,
                    data: raw.to_vec(),
                });
                pos += length.max(KERN_SUBTABLE_HEADER);
            }
        }
        Ok(Some(KernTable { subtables }))
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_u16::<BigEndian>(0)?;
        buf.write_u16::<BigEndian>(self.subtables.len() as u16)?;
        for subtable in &self.subtables {
            match subtable {
                KernSubtable::Format0 { coverage, pairs } => {
                    let n = pairs.len();
                    let length = KERN_SUBTABLE_HEADER + KERN_FORMAT0_HEADER + n * KERN_PAIR_LEN;
                    let (search_range, entry_selector, range_shift) = search_params(n);
                    buf.write_u16::<BigEndian>(0)?;
                    buf.write_u16::<BigEndian>((length & 0xFFFF) as u16)?;
                    buf.write_u16::<BigEndian>(*coverage)?;
                    buf.write_u16::<BigEndian>(n as u16)?;
                    buf.write_u16::<BigEndian>(search_range)?;
                    buf.write_u16::<BigEndian>(entry_selector)?;
                    buf.write_u16::<BigEndian>(range_shift)?;
                    for pair in pairs {
                        buf.write_u16::<BigEndian>(pair.left)?;
                        buf.write_u16::<BigEndian>(pair.right)?;
                        buf.write_i16::<BigEndian>(pair.value)?;
                    }
                }
                KernSubtable::Other { data, .. } => buf.extend_from_slice(data),
            }
        }
        Ok(buf)
    }

    /// Rewrites glyph ids through `map`, dropping pairs that touch an unmapped glyph.
    ///
    /// Returns the number of dropped pairs. Subtables other than format 0 cannot be
    /// remapped and are removed.
    pub fn remap(&mut self, map: &[Option<u32>]) -> usize {
        let lookup = |gid: u16| -> Option<u16> {
            map.get(gid as usize)
                .copied()
                .flatten()
                .and_then(|g| u16::try_from(g).ok())
        };
        let mut dropped = 0;
        self.subtables.retain_mut(|subtable| match subtable {
            KernSubtable::Format0 { pairs, .. } => {
                let before = pairs.len();
                let mut remapped: Vec<KernPair> = pairs
                    .iter()
                    .filter_map(|p| {
                        Some(KernPair {
                            left: lookup(p.left)?,
                            right: lookup(p.right)?,
                            value: p.value,
                        })
                    })
                    .collect();
                remapped.sort_by_key(|p| (p.left, p.right));
                remapped.dedup_by_key(|p| (p.left, p.right));
                dropped += before - remapped.len();
                *pairs = remapped;
                true
            }
            KernSubtable::Other { coverage, .. } => {
                warn!(
                    "Dropping kern subtable format {}: it cannot be remapped",
                    *coverage >> 8
                );
                false
            }
        });
        dropped
    }

    pub fn pair_count(&self) -> usize {
        self.subtables
            .iter()
            .map(|s| match s {
                KernSubtable::Format0 { pairs, .. } => pairs.len(),
                KernSubtable::Other { .. } => 0,
            })
            .sum()
    }
}

/// Binary search header fields for `n` six-byte records.
fn search_params(n: usize) -> (u16, u16, u16) {
    if n == 0 {
        return (0, 0, 0);
    }
    let mut power = 1usize;
    let mut selector = 0u16;
    while power * 2 <= n {
        power *= 2;
        selector += 1;
    }
    let search_range = power * KERN_PAIR_LEN;
    let range_shift = n * KERN_PAIR_LEN - search_range;
    (search_range as u16, selector, range_shift as u16)
}

fn glyph_count(tables: &FontTables) -> io::Result<u16> {
    sfnt::read_u16(tables.require(MAXP)?, sfnt::MAXP_NUM_GLYPHS)
}

fn glyph_names(tables: &FontTables, num_glyphs: u16) -> Option<Vec<String>> {
    let post = tables.get(POST)?;
    sfnt::post_glyph_names(post, num_glyphs)
        .ok()
        .flatten()
        .filter(|names| names.iter().any(|n| !n.is_empty()))
}

/// Maps every donor glyph id to the id of the same glyph in the target.
///
/// Glyphs are matched by name when both fonts carry names; otherwise by the
/// codepoints they are mapped from. Glyph 0 always maps to glyph 0.
pub fn glyph_correspondence(
    donor_data: &[u8],
    target_data: &[u8],
) -> Result<Vec<Option<u32>>, MergeError> {
    let donor_tables = FontTables::from_font(donor_data).map_err(|e| MergeError::font(DONOR, e))?;
    let target_tables =
        FontTables::from_font(target_data).map_err(|e| MergeError::font(TARGET, e))?;
    let donor_count = glyph_count(&donor_tables).map_err(|e| MergeError::font(DONOR, e))?;
    let target_count = glyph_count(&target_tables).map_err(|e| MergeError::font(TARGET, e))?;

    let mut map: Vec<Option<u32>> = vec![None; donor_count as usize];
    if let Some(first) = map.first_mut() {
        *first = (target_count > 0).then_some(0);
    }

    match (
        glyph_names(&donor_tables, donor_count),
        glyph_names(&target_tables, target_count),
    ) {
        (Some(donor_names), Some(target_names)) => {
            debug!("Matching glyphs by name");
            let mut by_name: HashMap<&str, u32> = HashMap::new();
            for (gid, name) in target_names.iter().enumerate() {
                if !name.is_empty() {
                    by_name.entry(name.as_str()).or_insert(gid as u32);
                }
            }
            for (gid, name) in donor_names.iter().enumerate().skip(1) {
                map[gid] = by_name.get(name.as_str()).copied();
            }
        }
        _ => {
            debug!("Matching glyphs by codepoint");
            let donor = FontRef::new(donor_data).map_err(|e| MergeError::font(DONOR, e))?;
            let target = FontRef::new(target_data).map_err(|e| MergeError::font(TARGET, e))?;
            let target_cmap = target.charmap();
            for (codepoint, gid) in donor.charmap().mappings() {
                if let Some(slot) = map.get_mut(gid.to_u32() as usize) {
                    if slot.is_none() {
                        *slot = target_cmap.map(codepoint).map(|g| g.to_u32());
                    }
                }
            }
        }
    }
    Ok(map)
}

/// Finds the first donor glyph that does not keep its id in the target.
fn first_moved_glyph(map: &[Option<u32>]) -> Option<(u32, Option<u32>)> {
    map.iter()
        .enumerate()
        .find(|(gid, target)| **target != Some(*gid as u32))
        .map(|(gid, target)| (gid as u32, *target))
}

/// Replaces `tags` in the merged font with the donor's tables.
pub fn copy_kerning(
    target_data: &[u8],
    donor_data: &[u8],
    tags: &[String],
) -> Result<(Vec<u8>, KerningReport), MergeError> {
    let mut tables =
        FontTables::from_font(target_data).map_err(|e| MergeError::font(TARGET, e))?;
    let donor_tables = FontTables::from_font(donor_data).map_err(|e| MergeError::font(DONOR, e))?;
    let map = glyph_correspondence(donor_data, target_data)?;
    let moved = first_moved_glyph(&map);

    let mut report = KerningReport::default();
    for name in tags {
        let tag = Tag::new_checked(name.as_bytes()).map_err(|e| {
            MergeError::config(
                format!("bad table tag '{}': {}", name, e),
                "Use four-character table tags such as \"GPOS\"",
            )
        })?;
        let Some(data) = donor_tables.get(tag) else {
            warn!("Donor font has no '{}' table, skipping", name);
            report.missing.push(name.clone());
            continue;
        };

        if tag == KERN && moved.is_some() {
            match KernTable::from_bytes(data).map_err(|e| MergeError::font(DONOR, e))? {
                Some(mut kern) => {
                    let dropped = kern.remap(&map);
                    if kern.subtables.is_empty() {
                        warn!("No kern subtables left after remapping, skipping 'kern'");
                        continue;
                    }
                    report.kern_pairs += kern.pair_count();
                    report.dropped_pairs += dropped;
                    if dropped > 0 {
                        debug!("Dropped {} kern pairs without a counterpart", dropped);
                    }
                    let bytes = kern.to_bytes().map_err(|e| MergeError::font(DONOR, e))?;
                    tables.insert(tag, bytes);
                    report.copied.push(name.clone());
                    continue;
                }
                None => debug!("Apple 'kern' layout cannot be remapped"),
            }
        }

        if let Some((donor_glyph, target_glyph)) = moved {
            warn!(
                "Skipping '{}': donor glyph {} is {} in the merged font",
                name,
                donor_glyph,
                match target_glyph {
                    Some(gid) => format!("glyph {}", gid),
                    None => "missing".to_string(),
                }
            );
            report.incompatible.push(name.clone());
            continue;
        }
        if tag == KERN {
            if let Ok(Some(kern)) = KernTable::from_bytes(data) {
                report.kern_pairs += kern.pair_count();
            }
        }
        tables.insert(tag, data.to_vec());
        report.copied.push(name.clone());
    }

    if report.copied.is_empty() {
        // Nothing could be placed at all: a changed glyph order is fatal here.
        if let (Some(table), Some((donor_glyph, target_glyph))) =
            (report.incompatible.first(), moved)
        {
            return Err(MergeError::IncompatibleGlyphOrder {
                table: table.clone(),
                donor_glyph,
                target_glyph,
            });
        }
        return Ok((target_data.to_vec(), report));
    }
    info!("  Copied {} from donor", report.copied.join(", "));
    let font = tables.build().map_err(|e| MergeError::font(TARGET, e))?;
    Ok((font, report))
}

/// Replaces `tags` in the font at `target_path` with the donor's, rewriting it in place.
pub fn copy_kerning_in_file(
    target_path: &Path,
    donor_path: &Path,
    tags: &[String],
) -> Result<KerningReport, MergeError> {
    let target = fs::read(target_path).map_err(|e| MergeError::io(e, target_path))?;
    let donor = fs::read(donor_path).map_err(|e| MergeError::io(e, donor_path))?;
    let (patched, report) = copy_kerning(&target, &donor, tags).map_err(|e| match e {
        MergeError::FontError { font, message } if font == DONOR => {
            MergeError::font(donor_path.display().to_string(), message)
        }
        MergeError::FontError { font, message } if font == TARGET => {
            MergeError::font(target_path.display().to_string(), message)
        }
        other => other,
    })?;
    if !report.copied.is_empty() {
        fs::write(target_path, patched).map_err(|e| MergeError::io(e, target_path))?;
    }
    Ok(report)
}
