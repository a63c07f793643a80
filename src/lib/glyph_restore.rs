//! Restoring Unicode-range glyphs from a donor font.
//!
//! FontForge keeps the first glyph it sees for each codepoint, so after merging the
//! display font, kana in the composite come from whichever input happened to cover
//! them first. This module copies the glyphs of selected ranges from a designated
//! donor back into the merged TrueType font.
//!
//! The donor may be TrueType or CFF: outlines are drawn through skrifa at the
//! target's units-per-em and re-encoded as simple glyphs, so scaling, cubic
//! conversion and component flattening all happen in one place. A donor glyph whose
//! name already exists in the merged font replaces that glyph; any other is
//! appended. Every table that depends on the glyph count is updated to match.

use crate::config::CodepointRange;
use crate::outline::TrueTypePen;
use crate::sfnt::{self, FontTables, GlyphStore, LocaOffsets, LongMetrics};
use crate::MergeError;
use log::{debug, info, warn};
use skrifa::outline::DrawSettings;
use skrifa::prelude::{LocationRef, Size};
use skrifa::raw::TableProvider;
use skrifa::{FontRef, MetadataProvider};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use write_fonts::tables::cmap::Cmap;
use write_fonts::tables::glyf::Bbox;
use write_fonts::types::{GlyphId, Tag};

const TARGET: &str = "merged font";
const DONOR: &str = "glyph donor";

const GLYF: Tag = Tag::new(b"glyf");
const LOCA: Tag = Tag::new(b"loca");
const HEAD: Tag = Tag::new(b"head");
const MAXP: Tag = Tag::new(b"maxp");
const HHEA: Tag = Tag::new(b"hhea");
const HMTX: Tag = Tag::new(b"hmtx");
const VHEA: Tag = Tag::new(b"vhea");
const VMTX: Tag = Tag::new(b"vmtx");
const POST: Tag = Tag::new(b"post");
const CMAP: Tag = Tag::new(b"cmap");

/// Tables holding per-glyph data that cannot be regenerated here.
const GLYPH_COUNT_DEPENDENT: [Tag; 3] = [Tag::new(b"hdmx"), Tag::new(b"LTSH"), Tag::new(b"DSIG")];

const HEAD_UNITS_PER_EM: usize = 18;
const MAXP_VERSION_1: u32 = 0x0001_0000;

/// What a restore pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Donor codepoints found inside the requested ranges
    pub codepoints: usize,
    /// Glyphs overwritten in place (matched by name)
    pub replaced: usize,
    /// Glyphs added at the end of the glyph order
    pub appended: usize,
    /// Codepoints whose cmap entry now points at a different glyph
    pub remapped: usize,
}

impl RestoreReport {
    pub fn is_empty(&self) -> bool {
        self.replaced == 0 && self.appended == 0
    }
}

/// Per-glyph metrics table paired with its header.
struct MetricsPair {
    header: Tag,
    table: Tag,
    metrics: LongMetrics,
}

/// Copies the donor glyphs of `ranges` into `target_path`, rewriting it in place.
pub fn restore_glyphs_in_file(
    target_path: &Path,
    donor_path: &Path,
    ranges: &[CodepointRange],
) -> Result<RestoreReport, MergeError> {
    let target = fs::read(target_path).map_err(|e| MergeError::io(e, target_path))?;
    let donor = fs::read(donor_path).map_err(|e| MergeError::io(e, donor_path))?;

    let (patched, report) = restore_glyphs(&target, &donor, ranges)
        .map_err(|e| relabel(e, target_path, donor_path))?;
    if !report.is_empty() {
        fs::write(target_path, patched).map_err(|e| MergeError::io(e, target_path))?;
    }
    Ok(report)
}

fn relabel(err: MergeError, target: &Path, donor: &Path) -> MergeError {
    match err {
        MergeError::FontError { font, message } if font == TARGET => {
            MergeError::font(target.display().to_string(), message)
        }
        MergeError::FontError { font, message } if font == DONOR => {
            MergeError::font(donor.display().to_string(), message)
        }
        other => other,
    }
}

/// Returns `target` with the donor glyphs of `ranges` copied in.
///
/// When the donor has no glyph in the ranges the target is returned unchanged.
pub fn restore_glyphs(
    target_data: &[u8],
    donor_data: &[u8],
    ranges: &[CodepointRange],
) -> Result<(Vec<u8>, RestoreReport), MergeError> {
    let target_err = |e: std::io::Error| MergeError::font(TARGET, e);

    let donor = FontRef::new(donor_data).map_err(|e| MergeError::font(DONOR, e))?;
    let target = FontRef::new(target_data).map_err(|e| MergeError::font(TARGET, e))?;
    let mut tables = FontTables::from_font(target_data).map_err(target_err)?;
    if !tables.contains(GLYF) {
        return Err(MergeError::font(
            TARGET,
            "not a TrueType font (no 'glyf' table); glyphs can only be restored into glyf fonts",
        ));
    }

    // Donor glyph -> the codepoints it covers inside the ranges
    let mut selected: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for (codepoint, gid) in donor.charmap().mappings() {
        if ranges.iter().any(|r| r.contains(codepoint)) {
            selected.entry(gid.to_u32()).or_default().push(codepoint);
        }
    }
    let mut report = RestoreReport {
        codepoints: selected.values().map(Vec::len).sum(),
        ..Default::default()
    };
    if selected.is_empty() {
        warn!("Donor font has no glyphs in the requested ranges");
        return Ok((target_data.to_vec(), report));
    }

    let head = tables.require(HEAD).map_err(target_err)?;
    let upem = sfnt::read_u16(head, HEAD_UNITS_PER_EM).map_err(target_err)?;
    let short_loca = sfnt::read_i16(head, sfnt::HEAD_INDEX_TO_LOC_FORMAT).map_err(target_err)? == 0;
    let maxp = tables.require(MAXP).map_err(target_err)?;
    let num_glyphs = sfnt::read_u16(maxp, sfnt::MAXP_NUM_GLYPHS).map_err(target_err)?;

    let loca = LocaOffsets::from_bytes(tables.require(LOCA).map_err(target_err)?, num_glyphs, short_loca)
        .map_err(target_err)?;
    let mut store =
        GlyphStore::from_tables(tables.require(GLYF).map_err(target_err)?, &loca).map_err(target_err)?;

    let mut horizontal = read_metrics(&tables, HHEA, HMTX, num_glyphs)?
        .ok_or_else(|| MergeError::font(TARGET, "missing 'hhea' or 'hmtx' table"))?;
    let mut vertical = read_metrics(&tables, VHEA, VMTX, num_glyphs)?;
    let vertical_ascent = match tables.get(VHEA) {
        Some(vhea) => sfnt::read_i16(vhea, sfnt::HHEA_ASCENDER).map_err(target_err)?,
        None => 0,
    };

    let mut names = match tables.get(POST) {
        Some(post) => sfnt::post_glyph_names(post, num_glyphs).map_err(target_err)?,
        None => None,
    };
    let name_index: HashMap<String, usize> = names
        .iter()
        .flatten()
        .enumerate()
        .filter(|(_, name)| !name.is_empty())
        .map(|(gid, name)| (name.clone(), gid))
        .collect();
    let donor_names = match donor.table_data(skrifa::Tag::new(b"post")) {
        Some(post) => {
            let count = donor.maxp().map(|m| m.num_glyphs()).unwrap_or(0);
            sfnt::post_glyph_names(post.as_bytes(), count).unwrap_or(None)
        }
        None => None,
    };

    let mut cmap: BTreeMap<u32, u32> = target
        .charmap()
        .mappings()
        .map(|(cp, gid)| (cp, gid.to_u32()))
        .collect();

    let cff = donor.table_data(skrifa::Tag::new(b"CFF ")).is_some()
        || donor.table_data(skrifa::Tag::new(b"CFF2")).is_some();
    let size = Size::new(upem as f32);
    let outlines = donor.outline_glyphs();
    let donor_metrics = donor.glyph_metrics(size, LocationRef::default());

    let mut max_points = 0usize;
    let mut max_contours = 0usize;
    let mut restored_bounds: Option<Bbox> = None;
    let mut cmap_changed = false;

    for (donor_gid, codepoints) in &selected {
        let gid = skrifa::GlyphId::new(*donor_gid);
        let outline = outlines
            .get(gid)
            .ok_or_else(|| MergeError::font(DONOR, format!("no outline for glyph {}", donor_gid)))?;
        let mut pen = TrueTypePen::new();
        outline
            .draw(DrawSettings::unhinted(size, LocationRef::default()), &mut pen)
            .map_err(|e| MergeError::font(DONOR, format!("glyph {}: {}", donor_gid, e)))?;
        let glyph = pen.into_glyph(cff);

        let points: usize = glyph.contours.iter().map(|c| c.len()).sum();
        max_points = max_points.max(points);
        max_contours = max_contours.max(glyph.contours.len());

        let data = if glyph.contours.is_empty() {
            Vec::new()
        } else {
            write_fonts::dump_table(&glyph)
                .map_err(|e| MergeError::font(DONOR, format!("glyph {}: {}", donor_gid, e)))?
        };
        let advance = donor_metrics
            .advance_width(gid)
            .unwrap_or(0.0)
            .round()
            .clamp(0.0, u16::MAX as f32) as u16;
        let (lsb, y_max) = if glyph.contours.is_empty() {
            (0, 0)
        } else {
            restored_bounds = Some(match restored_bounds {
                Some(bounds) => union(bounds, glyph.bbox),
                None => glyph.bbox,
            });
            (glyph.bbox.x_min, glyph.bbox.y_max)
        };
        let vertical_entry = (upem, vertical_ascent.saturating_sub(y_max));

        let name = donor_names
            .as_ref()
            .and_then(|n| n.get(*donor_gid as usize))
            .filter(|n| !n.is_empty())
            .cloned()
            .unwrap_or_else(|| codepoint_glyph_name(codepoints[0]));

        let target_gid = match name_index.get(&name) {
            Some(&existing) => {
                store.replace(existing, data).map_err(target_err)?;
                horizontal.metrics.entries[existing] = (advance, lsb);
                if let Some(v) = vertical.as_mut() {
                    v.metrics.entries[existing] = vertical_entry;
                }
                report.replaced += 1;
                debug!("Replaced glyph '{}' (gid {})", name, existing);
                existing
            }
            None => {
                let added = store.push(data);
                horizontal.metrics.entries.push((advance, lsb));
                if let Some(v) = vertical.as_mut() {
                    v.metrics.entries.push(vertical_entry);
                }
                if let Some(n) = names.as_mut() {
                    n.push(name.clone());
                }
                report.appended += 1;
                debug!("Appended glyph '{}' as gid {}", name, added);
                added
            }
        };

        for &codepoint in codepoints {
            if cmap.insert(codepoint, target_gid as u32) != Some(target_gid as u32) {
                cmap_changed = true;
                report.remapped += 1;
            }
        }
    }

    let new_count = store.len();
    if new_count > u16::MAX as usize {
        return Err(MergeError::TooManyGlyphs {
            requested: new_count,
        });
    }

    let (glyf, loca) = store.build();
    let loca_bytes = loca.to_bytes().map_err(target_err)?;
    tables.insert(GLYF, glyf);
    tables.insert(LOCA, loca_bytes);
    let head = tables.require_mut(HEAD).map_err(target_err)?;
    sfnt::write_u16(head, sfnt::HEAD_INDEX_TO_LOC_FORMAT, loca.format).map_err(target_err)?;
    if let Some(bounds) = restored_bounds {
        widen_head_bounds(head, bounds).map_err(target_err)?;
    }

    update_maxp(&mut tables, new_count as u16, max_points, max_contours).map_err(target_err)?;
    write_metrics(&mut tables, &horizontal).map_err(target_err)?;
    if let Some(v) = &vertical {
        write_metrics(&mut tables, v).map_err(target_err)?;
    }

    if report.appended > 0 {
        if let Some(names) = &names {
            let post = tables.require(POST).map_err(target_err)?;
            let rebuilt = sfnt::post_with_names(post, names).map_err(target_err)?;
            tables.insert(POST, rebuilt);
        }
    }

    if cmap_changed {
        rebuild_cmap(&mut tables, &cmap)?;
    }

    if new_count != num_glyphs as usize {
        for tag in GLYPH_COUNT_DEPENDENT {
            if tables.remove(tag).is_some() {
                debug!("Dropped '{}' after changing the glyph count", tag);
            }
        }
    }

    info!(
        "  Restored {} glyphs ({} replaced, {} appended, {} codepoints remapped)",
        report.replaced + report.appended,
        report.replaced,
        report.appended,
        report.remapped
    );
    let font = tables.build().map_err(target_err)?;
    Ok((font, report))
}

/// Name given to a donor glyph that has none of its own.
fn codepoint_glyph_name(codepoint: u32) -> String {
    if codepoint <= 0xFFFF {
        format!("uni{:04X}", codepoint)
    } else {
        format!("u{:05X}", codepoint)
    }
}

fn read_metrics(
    tables: &FontTables,
    header: Tag,
    table: Tag,
    num_glyphs: u16,
) -> Result<Option<MetricsPair>, MergeError> {
    let (Some(head), Some(data)) = (tables.get(header), tables.get(table)) else {
        return Ok(None);
    };
    let num_long = sfnt::read_u16(head, sfnt::HHEA_NUM_LONG_METRICS)
        .map_err(|e| MergeError::font(TARGET, e))?;
    let metrics = LongMetrics::from_bytes(data, num_long, num_glyphs)
        .map_err(|e| MergeError::font(TARGET, format!("'{}': {}", table, e)))?;
    Ok(Some(MetricsPair {
        header,
        table,
        metrics,
    }))
}

fn write_metrics(tables: &mut FontTables, pair: &MetricsPair) -> std::io::Result<()> {
    tables.insert(pair.table, pair.metrics.to_bytes()?);
    let header = tables.require_mut(pair.header)?;
    sfnt::write_u16(header, sfnt::HHEA_NUM_LONG_METRICS, pair.metrics.num_long())?;
    sfnt::write_u16(header, sfnt::HHEA_ADVANCE_MAX, pair.metrics.max_advance())
}

fn union(a: Bbox, b: Bbox) -> Bbox {
    Bbox {
        x_min: a.x_min.min(b.x_min),
        y_min: a.y_min.min(b.y_min),
        x_max: a.x_max.max(b.x_max),
        y_max: a.y_max.max(b.y_max),
    }
}

/// Grows the font bounding box in `head` so it covers `bounds`.
fn widen_head_bounds(head: &mut [u8], bounds: Bbox) -> std::io::Result<()> {
    let current = Bbox {
        x_min: sfnt::read_i16(head, sfnt::HEAD_X_MIN)?,
        y_min: sfnt::read_i16(head, sfnt::HEAD_Y_MIN)?,
        x_max: sfnt::read_i16(head, sfnt::HEAD_X_MAX)?,
        y_max: sfnt::read_i16(head, sfnt::HEAD_Y_MAX)?,
    };
    let widened = union(current, bounds);
    sfnt::write_u16(head, sfnt::HEAD_X_MIN, widened.x_min as u16)?;
    sfnt::write_u16(head, sfnt::HEAD_Y_MIN, widened.y_min as u16)?;
    sfnt::write_u16(head, sfnt::HEAD_X_MAX, widened.x_max as u16)?;
    sfnt::write_u16(head, sfnt::HEAD_Y_MAX, widened.y_max as u16)?;
    Ok(())
}

fn update_maxp(
    tables: &mut FontTables,
    num_glyphs: u16,
    points: usize,
    contours: usize,
) -> std::io::Result<()> {
    let maxp = tables.require_mut(MAXP)?;
    sfnt::write_u16(maxp, sfnt::MAXP_NUM_GLYPHS, num_glyphs)?;
    if sfnt::read_u32(maxp, 0)? == MAXP_VERSION_1 {
        let old_points = sfnt::read_u16(maxp, sfnt::MAXP_MAX_POINTS)?;
        let old_contours = sfnt::read_u16(maxp, sfnt::MAXP_MAX_CONTOURS)?;
        let new_points = old_points.max(points.min(u16::MAX as usize) as u16);
        let new_contours = old_contours.max(contours.min(u16::MAX as usize) as u16);
        sfnt::write_u16(maxp, sfnt::MAXP_MAX_POINTS, new_points)?;
        sfnt::write_u16(maxp, sfnt::MAXP_MAX_CONTOURS, new_contours)?;
    }
    Ok(())
}

fn rebuild_cmap(tables: &mut FontTables, mappings: &BTreeMap<u32, u32>) -> Result<(), MergeError> {
    if tables.get(CMAP).is_some_and(has_variation_subtable) {
        warn!("Rebuilding 'cmap' drops its Unicode variation sequences (format 14)");
    }
    let cmap = Cmap::from_mappings(
        mappings
            .iter()
            .filter_map(|(&cp, &gid)| char::from_u32(cp).map(|c| (c, GlyphId::new(gid)))),
    )
    .map_err(|e| MergeError::font(TARGET, format!("cannot rebuild cmap: {}", e)))?;
    let data = write_fonts::dump_table(&cmap)
        .map_err(|e| MergeError::font(TARGET, format!("cannot rebuild cmap: {}", e)))?;
    tables.insert(CMAP, data);
    Ok(())
}

fn has_variation_subtable(cmap: &[u8]) -> bool {
    let count = sfnt::read_u16(cmap, 2).unwrap_or(0) as usize;
    (0..count).any(|i| {
        sfnt::read_u32(cmap, 4 + i * 8 + 4)
            .and_then(|offset| sfnt::read_u16(cmap, offset as usize))
            .map(|format| format == 14)
            .unwrap_or(false)
    })
}
