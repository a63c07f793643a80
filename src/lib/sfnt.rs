//! Binary-level table surgery on TrueType fonts.
//!
//! The merged fonts are patched table by table: glyph data is rebuilt from raw
//! glyf/loca slices, metrics are re-encoded, and a few header fields are rewritten
//! in place. Everything here works on plain byte buffers; the callers decide which
//! tables to touch.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use read_fonts::tables::post::DEFAULT_GLYPH_NAMES;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Error, ErrorKind};
use write_fonts::types::Tag;
use write_fonts::FontBuilder;

/// `head.checkSumAdjustment` is computed so the whole font sums to this value.
const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;
const HEAD_CHECKSUM_ADJUSTMENT: usize = 8;
/// Offsets of `head.xMin`, `yMin`, `xMax` and `yMax`
pub const HEAD_X_MIN: usize = 36;
pub const HEAD_Y_MIN: usize = 38;
pub const HEAD_X_MAX: usize = 40;
pub const HEAD_Y_MAX: usize = 42;
/// Offset of `head.indexToLocFormat`
pub const HEAD_INDEX_TO_LOC_FORMAT: usize = 50;
/// Offset of `maxp.numGlyphs`
pub const MAXP_NUM_GLYPHS: usize = 4;
/// Offset of `maxp.maxPoints` (version 1.0 only)
pub const MAXP_MAX_POINTS: usize = 6;
/// Offset of `maxp.maxContours` (version 1.0 only)
pub const MAXP_MAX_CONTOURS: usize = 8;
/// Offset of `hhea.advanceWidthMax` / `vhea.advanceHeightMax`
pub const HHEA_ADVANCE_MAX: usize = 10;
/// Offset of `hhea.numberOfHMetrics` / `vhea.numOfLongVerMetrics`
pub const HHEA_NUM_LONG_METRICS: usize = 34;
/// Offset of `hhea.ascender` / `vhea.vertTypoAscender`
pub const HHEA_ASCENDER: usize = 4;

fn truncated(what: &str) -> Error {
    Error::new(ErrorKind::UnexpectedEof, format!("{} is truncated", what))
}

pub fn read_u16(data: &[u8], offset: usize) -> io::Result<u16> {
    let bytes = data.get(offset..offset + 2).ok_or_else(|| truncated("table"))?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub fn read_i16(data: &[u8], offset: usize) -> io::Result<i16> {
    read_u16(data, offset).map(|v| v as i16)
}

pub fn read_u32(data: &[u8], offset: usize) -> io::Result<u32> {
    let bytes = data.get(offset..offset + 4).ok_or_else(|| truncated("table"))?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn write_u16(data: &mut [u8], offset: usize, value: u16) -> io::Result<()> {
    let slot = data
        .get_mut(offset..offset + 2)
        .ok_or_else(|| truncated("table"))?;
    slot.copy_from_slice(&value.to_be_bytes());
    Ok(())
}

pub fn write_u32(data: &mut [u8], offset: usize, value: u32) -> io::Result<()> {
    let slot = data
        .get_mut(offset..offset + 4)
        .ok_or_else(|| truncated("table"))?;
    slot.copy_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Owned copy of every table in a font, keyed by tag.
#[derive(Debug, Clone, Default)]
pub struct FontTables {
    tables: BTreeMap<Tag, Vec<u8>>,
}

impl FontTables {
    /// Copies all tables out of a single (non-collection) font file.
    pub fn from_font(font_data: &[u8]) -> io::Result<Self> {
        let num_tables = read_u16(font_data, 4)? as usize;
        let mut tables = BTreeMap::new();
        for i in 0..num_tables {
            let record = 12 + i * 16;
            let raw = font_data
                .get(record..record + 4)
                .ok_or_else(|| truncated("table directory"))?;
            let tag = Tag::new(&[raw[0], raw[1], raw[2], raw[3]]);
            let offset = read_u32(font_data, record + 8)? as usize;
            let length = read_u32(font_data, record + 12)? as usize;
            let data = font_data
                .get(offset..offset + length)
                .ok_or_else(|| truncated("table data"))?;
            tables.insert(tag, data.to_vec());
        }
        Ok(FontTables { tables })
    }

    pub fn get(&self, tag: Tag) -> Option<&[u8]> {
        self.tables.get(&tag).map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, tag: Tag) -> Option<&mut Vec<u8>> {
        self.tables.get_mut(&tag)
    }

    /// Returns the table or a `NotFound` error naming it.
    pub fn require(&self, tag: Tag) -> io::Result<&[u8]> {
        self.get(tag).ok_or_else(|| {
            Error::new(ErrorKind::NotFound, format!("font has no '{}' table", tag))
        })
    }

    pub fn require_mut(&mut self, tag: Tag) -> io::Result<&mut Vec<u8>> {
        self.tables.get_mut(&tag).ok_or_else(|| {
            Error::new(ErrorKind::NotFound, format!("font has no '{}' table", tag))
        })
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.tables.contains_key(&tag)
    }

    pub fn insert(&mut self, tag: Tag, data: Vec<u8>) {
        self.tables.insert(tag, data);
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Vec<u8>> {
        self.tables.remove(&tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.tables.keys().copied()
    }

    /// Assembles the font and fixes up `head.checkSumAdjustment`.
    pub fn build(mut self) -> io::Result<Vec<u8>> {
        let head_tag = Tag::new(b"head");
        if let Some(head) = self.tables.get_mut(&head_tag) {
            write_u32(head, HEAD_CHECKSUM_ADJUSTMENT, 0)?;
        }

        let mut builder = FontBuilder::new();
        for (tag, data) in &self.tables {
            builder.add_raw(*tag, data.as_slice());
        }
        let mut font = builder.build();

        if self.tables.contains_key(&head_tag) {
            let head_offset = find_table_offset(&font, head_tag)?;
            write_u32(&mut font, head_offset + HEAD_CHECKSUM_ADJUSTMENT, 0)?;
            let adjustment = CHECKSUM_MAGIC.wrapping_sub(checksum(&font));
            write_u32(&mut font, head_offset + HEAD_CHECKSUM_ADJUSTMENT, adjustment)?;
        }
        Ok(font)
    }
}

fn find_table_offset(font_data: &[u8], tag: Tag) -> io::Result<usize> {
    let num_tables = read_u16(font_data, 4)? as usize;
    for i in 0..num_tables {
        let record = 12 + i * 16;
        if font_data.get(record..record + 4) == Some(tag.to_be_bytes().as_slice()) {
            return Ok(read_u32(font_data, record + 8)? as usize);
        }
    }
    Err(Error::new(
        ErrorKind::NotFound,
        format!("'{}' missing from table directory", tag),
    ))
}

/// Sum of the data as big-endian u32 words, zero-padded to a multiple of four.
pub fn checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

/// Represents offsets from the loca table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaOffsets {
    /// Offsets of each glyph in the glyf table, plus the end offset
    pub offsets: Vec<u32>,
    /// Format: 0 for short offsets (divide by 2), 1 for long offsets
    pub format: u16,
}

impl LocaOffsets {
    /// Parse the loca table from raw bytes
    pub fn from_bytes(data: &[u8], num_glyphs: u16, is_short_format: bool) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut offsets = Vec::with_capacity(num_glyphs as usize + 1);

        if is_short_format {
            for _ in 0..=num_glyphs {
                let offset = cursor.read_u16::<BigEndian>()? as u32 * 2;
                offsets.push(offset);
            }
        } else {
            for _ in 0..=num_glyphs {
                offsets.push(cursor.read_u32::<BigEndian>()?);
            }
        }

        Ok(LocaOffsets {
            offsets,
            format: if is_short_format { 0 } else { 1 },
        })
    }

    /// Serialize back to bytes
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let width = if self.format == 0 { 2 } else { 4 };
        let mut buf = Vec::with_capacity(self.offsets.len() * width);

        if self.format == 0 {
            for offset in &self.offsets {
                buf.write_u16::<BigEndian>((offset / 2) as u16)?;
            }
        } else {
            for offset in &self.offsets {
                buf.write_u32::<BigEndian>(*offset)?;
            }
        }

        Ok(buf)
    }
}

/// Raw per-glyph data of a glyf table.
///
/// Existing glyphs are kept byte for byte, so composites and hinting instructions
/// survive untouched; only replaced or appended glyphs are re-encoded.
#[derive(Debug, Clone, Default)]
pub struct GlyphStore {
    glyphs: Vec<Vec<u8>>,
}

impl GlyphStore {
    pub fn from_tables(glyf: &[u8], loca: &LocaOffsets) -> io::Result<Self> {
        let glyphs = loca
            .offsets
            .windows(2)
            .map(|pair| {
                let (start, end) = (pair[0] as usize, pair[1] as usize);
                if start > end {
                    return Err(Error::new(
                        ErrorKind::InvalidData,
                        "loca offsets are not ascending",
                    ));
                }
                glyf.get(start..end)
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| truncated("glyf"))
            })
            .collect::<io::Result<Vec<_>>>()?;
        Ok(GlyphStore { glyphs })
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn get(&self, glyph_id: usize) -> Option<&[u8]> {
        self.glyphs.get(glyph_id).map(Vec::as_slice)
    }

    pub fn replace(&mut self, glyph_id: usize, data: Vec<u8>) -> io::Result<()> {
        let slot = self.glyphs.get_mut(glyph_id).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("glyph {} does not exist", glyph_id),
            )
        })?;
        *slot = data;
        Ok(())
    }

    /// Appends a glyph and returns its id.
    pub fn push(&mut self, data: Vec<u8>) -> usize {
        self.glyphs.push(data);
        self.glyphs.len() - 1
    }

    /// Concatenates the glyphs into new glyf and loca tables.
    ///
    /// Every glyph is padded to an even length so the short loca format stays
    /// usable; the format is chosen from the final size.
    pub fn build(&self) -> (Vec<u8>, LocaOffsets) {
        let mut glyf = Vec::new();
        let mut offsets = Vec::with_capacity(self.glyphs.len() + 1);
        offsets.push(0u32);
        for glyph in &self.glyphs {
            glyf.extend_from_slice(glyph);
            if glyf.len() % 2 == 1 {
                glyf.push(0);
            }
            offsets.push(glyf.len() as u32);
        }

        let format = if (glyf.len() / 2) <= u16::MAX as usize {
            0
        } else {
            1
        };
        (glyf, LocaOffsets { offsets, format })
    }
}

/// Advance and side bearing of every glyph, as stored in hmtx or vmtx.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LongMetrics {
    pub entries: Vec<(u16, i16)>,
}

impl LongMetrics {
    /// Parses `num_long` full records followed by bare side bearings up to `num_glyphs`.
    pub fn from_bytes(data: &[u8], num_long: u16, num_glyphs: u16) -> io::Result<Self> {
        if num_long == 0 && num_glyphs > 0 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "metrics table declares no long records",
            ));
        }
        let mut cursor = Cursor::new(data);
        let mut entries = Vec::with_capacity(num_glyphs as usize);
        let mut last_advance = 0;
        for i in 0..num_glyphs {
            if i < num_long {
                last_advance = cursor.read_u16::<BigEndian>()?;
                let side = cursor.read_i16::<BigEndian>()?;
                entries.push((last_advance, side));
            } else {
                let side = cursor.read_i16::<BigEndian>()?;
                entries.push((last_advance, side));
            }
        }
        Ok(LongMetrics { entries })
    }

    /// Number of full records needed: the trailing run of equal advances is folded.
    pub fn num_long(&self) -> u16 {
        let Some(&(last, _)) = self.entries.last() else {
            return 0;
        };
        let run = self
            .entries
            .iter()
            .rev()
            .take_while(|(advance, _)| *advance == last)
            .count();
        (self.entries.len() - run + 1) as u16
    }

    pub fn max_advance(&self) -> u16 {
        self.entries.iter().map(|(a, _)| *a).max().unwrap_or(0)
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let num_long = self.num_long() as usize;
        let mut buf = Vec::with_capacity(num_long * 4 + (self.entries.len() - num_long) * 2);
        for (i, (advance, side)) in self.entries.iter().enumerate() {
            if i < num_long {
                buf.write_u16::<BigEndian>(*advance)?;
            }
            buf.write_i16::<BigEndian>(*side)?;
        }
        Ok(buf)
    }
}

const POST_V1: u32 = 0x0001_0000;
const POST_V2: u32 = 0x0002_0000;
const POST_HEADER_LEN: usize = 32;

/// Glyph names from a post table, indexed by glyph id.
///
/// Returns `None` for post versions that carry no names (3.0) or that are not
/// supported (2.5).
pub fn post_glyph_names(post: &[u8], num_glyphs: u16) -> io::Result<Option<Vec<String>>> {
    match read_u32(post, 0)? {
        POST_V1 => Ok(Some(
            (0..num_glyphs as usize)
                .map(|gid| DEFAULT_GLYPH_NAMES.get(gid).copied().unwrap_or("").to_string())
                .collect(),
        )),
        POST_V2 => {
            let count = read_u16(post, POST_HEADER_LEN)? as usize;
            let mut indices = Vec::with_capacity(count);
            for i in 0..count {
                indices.push(read_u16(post, POST_HEADER_LEN + 2 + i * 2)? as usize);
            }

            let mut strings = Vec::new();
            let mut pos = POST_HEADER_LEN + 2 + count * 2;
            while pos < post.len() {
                let len = post[pos] as usize;
                let raw = post
                    .get(pos + 1..pos + 1 + len)
                    .ok_or_else(|| truncated("post name data"))?;
                strings.push(String::from_utf8_lossy(raw).into_owned());
                pos += 1 + len;
            }

            let names = (0..num_glyphs as usize)
                .map(|gid| match indices.get(gid) {
                    Some(&idx) if idx < DEFAULT_GLYPH_NAMES.len() => {
                        DEFAULT_GLYPH_NAMES[idx].to_string()
                    }
                    Some(&idx) => strings
                        .get(idx - DEFAULT_GLYPH_NAMES.len())
                        .cloned()
                        .unwrap_or_default(),
                    None => String::new(),
                })
                .collect();
            Ok(Some(names))
        }
        _ => Ok(None),
    }
}

/// Re-encodes `post` as version 2.0 carrying `names`.
///
/// The 32-byte header (italic angle, underline metrics, memory hints) is kept.
pub fn post_with_names(post: &[u8], names: &[String]) -> io::Result<Vec<u8>> {
    let header = post
        .get(..POST_HEADER_LEN)
        .ok_or_else(|| truncated("post header"))?;
    let mut buf = Vec::with_capacity(POST_HEADER_LEN + 2 + names.len() * 12);
    buf.write_u32::<BigEndian>(POST_V2)?;
    buf.extend_from_slice(&header[4..]);
    buf.write_u16::<BigEndian>(names.len() as u16)?;

    let standard: HashMap<&str, usize> = DEFAULT_GLYPH_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| (*name, i))
        .collect();
    let mut custom: Vec<&str> = Vec::new();
    let mut custom_index: HashMap<&str, usize> = HashMap::new();
    for name in names {
        let index = match standard.get(name.as_str()) {
            Some(&i) => i,
            None => {
                let next = custom.len();
                let i = *custom_index.entry(name.as_str()).or_insert_with(|| {
                    custom.push(name.as_str());
                    next
                });
                DEFAULT_GLYPH_NAMES.len() + i
            }
        };
        let index = u16::try_from(index)
            .map_err(|_| Error::new(ErrorKind::InvalidData, "too many glyph names"))?;
        buf.write_u16::<BigEndian>(index)?;
    }
    for name in custom {
        let len = u8::try_from(name.len()).map_err(|_| {
            Error::new(
                ErrorKind::InvalidData,
                format!("glyph name '{}' is longer than 255 bytes", name),
            )
        })?;
        buf.write_u8(len)?;
        buf.extend_from_slice(name.as_bytes());
    }
    Ok(buf)
}
