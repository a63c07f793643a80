//! Synthetic TrueType fonts for integration tests.
#![allow(dead_code)]

use ksm_font_merge::kerning::{KernPair, KernSubtable, KernTable};
use ksm_font_merge::sfnt::{self, FontTables, GlyphStore};
use read_fonts::tables::glyf::CurvePoint;
use skrifa::outline::{DrawSettings, OutlinePen};
use skrifa::prelude::{LocationRef, Size};
use skrifa::{FontRef, GlyphId, MetadataProvider};
use write_fonts::tables::cmap::Cmap;
use write_fonts::tables::glyf::{Bbox, Contour, SimpleGlyph};
use write_fonts::types::{GlyphId as WriteGlyphId, Tag};

/// One glyph of a test font: a filled rectangle, or nothing.
#[derive(Debug, Clone)]
pub struct TestGlyph {
    pub name: &'static str,
    pub codepoints: Vec<u32>,
    pub advance: u16,
    pub rect: Option<(i16, i16, i16, i16)>,
}

pub fn glyph(
    name: &'static str,
    codepoints: &[u32],
    advance: u16,
    rect: Option<(i16, i16, i16, i16)>,
) -> TestGlyph {
    TestGlyph {
        name,
        codepoints: codepoints.to_vec(),
        advance,
        rect,
    }
}

pub fn notdef(advance: u16) -> TestGlyph {
    glyph(".notdef", &[], advance, None)
}

/// Options for [`build_font`].
#[derive(Debug, Clone, Default)]
pub struct FontSpec {
    pub units_per_em: u16,
    pub glyphs: Vec<TestGlyph>,
    /// Write a version 2 post table with the glyph names; otherwise version 3
    pub names: bool,
    pub kern: Option<Vec<KernPair>>,
    pub extra_tables: Vec<(Tag, Vec<u8>)>,
}

impl FontSpec {
    pub fn new(units_per_em: u16, glyphs: Vec<TestGlyph>) -> Self {
        FontSpec {
            units_per_em,
            glyphs,
            names: true,
            ..Default::default()
        }
    }
}

fn be16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn be32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn rect_glyph((x0, y0, x1, y1): (i16, i16, i16, i16)) -> SimpleGlyph {
    // clockwise
    let points = vec![
        CurvePoint::on_curve(x0, y0),
        CurvePoint::on_curve(x0, y1),
        CurvePoint::on_curve(x1, y1),
        CurvePoint::on_curve(x1, y0),
    ];
    SimpleGlyph {
        bbox: Bbox {
            x_min: x0,
            y_min: y0,
            x_max: x1,
            y_max: y1,
        },
        contours: vec![Contour::from(points)],
        instructions: Vec::new(),
    }
}

fn head(units_per_em: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    be32(&mut buf, 0x0001_0000); // version
    be32(&mut buf, 0x0001_0000); // fontRevision
    be32(&mut buf, 0); // checkSumAdjustment
    be32(&mut buf, 0x5F0F_3CF5); // magicNumber
    be16(&mut buf, 0x000B); // flags
    be16(&mut buf, units_per_em);
    buf.extend_from_slice(&[0; 16]); // created, modified
    for v in [0i16, 0, units_per_em as i16, units_per_em as i16] {
        be16(&mut buf, v as u16);
    }
    be16(&mut buf, 0); // macStyle
    be16(&mut buf, 8); // lowestRecPPEM
    be16(&mut buf, 2); // fontDirectionHint
    be16(&mut buf, 0); // indexToLocFormat, patched later
    be16(&mut buf, 0); // glyphDataFormat
    buf
}

fn hhea(units_per_em: u16, num_long: u16, max_advance: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    be32(&mut buf, 0x0001_0000);
    be16(&mut buf, (units_per_em as f32 * 0.8) as u16); // ascender
    be16(&mut buf, (-(units_per_em as f32 * 0.2) as i16) as u16); // descender
    be16(&mut buf, 0); // lineGap
    be16(&mut buf, max_advance);
    buf.extend_from_slice(&[0; 6]); // minLSB, minRSB, xMaxExtent
    be16(&mut buf, 1); // caretSlopeRise
    be16(&mut buf, 0); // caretSlopeRun
    buf.extend_from_slice(&[0; 12]); // caretOffset, reserved, metricDataFormat
    be16(&mut buf, num_long);
    buf
}

fn maxp(num_glyphs: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    be32(&mut buf, 0x0001_0000);
    be16(&mut buf, num_glyphs);
    be16(&mut buf, 4); // maxPoints
    be16(&mut buf, 1); // maxContours
    be16(&mut buf, 0); // maxCompositePoints
    be16(&mut buf, 0); // maxCompositeContours
    be16(&mut buf, 2); // maxZones
    buf.extend_from_slice(&[0; 16]);
    buf
}

fn post_header(version: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    be32(&mut buf, version);
    buf.extend_from_slice(&[0; 28]);
    buf
}

/// Builds a TrueType font from `spec`.
pub fn build_font(spec: &FontSpec) -> Vec<u8> {
    let mut store = GlyphStore::default();
    let mut hmtx = Vec::new();
    let mut mappings = Vec::new();
    for (gid, g) in spec.glyphs.iter().enumerate() {
        let (data, lsb) = match g.rect {
            Some(rect) => (write_fonts::dump_table(&rect_glyph(rect)).unwrap(), rect.0),
            None => (Vec::new(), 0),
        };
        store.push(data);
        be16(&mut hmtx, g.advance);
        be16(&mut hmtx, lsb as u16);
        for &cp in &g.codepoints {
            mappings.push((char::from_u32(cp).unwrap(), WriteGlyphId::new(gid as u32)));
        }
    }
    let (glyf, loca) = store.build();
    let num_glyphs = spec.glyphs.len() as u16;
    let max_advance = spec.glyphs.iter().map(|g| g.advance).max().unwrap_or(0);

    let mut head = head(spec.units_per_em);
    sfnt::write_u16(&mut head, sfnt::HEAD_INDEX_TO_LOC_FORMAT, loca.format).unwrap();

    let post = if spec.names {
        let names: Vec<String> = spec.glyphs.iter().map(|g| g.name.to_string()).collect();
        sfnt::post_with_names(&post_header(0x0001_0000), &names).unwrap()
    } else {
        post_header(0x0003_0000)
    };

    let mut tables = FontTables::default();
    tables.insert(Tag::new(b"head"), head);
    tables.insert(
        Tag::new(b"hhea"),
        hhea(spec.units_per_em, num_glyphs, max_advance),
    );
    tables.insert(Tag::new(b"maxp"), maxp(num_glyphs));
    tables.insert(Tag::new(b"hmtx"), hmtx);
    tables.insert(Tag::new(b"glyf"), glyf);
    tables.insert(Tag::new(b"loca"), loca.to_bytes().unwrap());
    tables.insert(
        Tag::new(b"cmap"),
        write_fonts::dump_table(&Cmap::from_mappings(mappings).unwrap()).unwrap(),
    );
    tables.insert(Tag::new(b"post"), post);
    if let Some(pairs) = &spec.kern {
        let kern = KernTable {
            subtables: vec![KernSubtable::Format0 {
                coverage: 0x0001,
                pairs: pairs.clone(),
            }],
        };
        tables.insert(Tag::new(b"kern"), kern.to_bytes().unwrap());
    }
    for (tag, data) in &spec.extra_tables {
        tables.insert(*tag, data.clone());
    }
    tables.build().unwrap()
}

/// Glyph the font maps `codepoint` to.
pub fn glyph_for(font: &[u8], codepoint: u32) -> Option<u32> {
    let font = FontRef::new(font).unwrap();
    font.charmap().map(codepoint).map(|g| g.to_u32())
}

/// Unscaled advance width of `gid`.
pub fn advance_of(font: &[u8], gid: u32) -> Option<f32> {
    let font = FontRef::new(font).unwrap();
    font.glyph_metrics(Size::unscaled(), LocationRef::default())
        .advance_width(GlyphId::new(gid))
}

#[derive(Default)]
struct BoundsPen {
    bounds: Option<(f32, f32, f32, f32)>,
}

impl BoundsPen {
    fn add(&mut self, x: f32, y: f32) {
        self.bounds = Some(match self.bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
}

impl OutlinePen for BoundsPen {
    fn move_to(&mut self, x: f32, y: f32) {
        self.add(x, y);
    }
    fn line_to(&mut self, x: f32, y: f32) {
        self.add(x, y);
    }
    fn quad_to(&mut self, cx0: f32, cy0: f32, x: f32, y: f32) {
        self.add(cx0, cy0);
        self.add(x, y);
    }
    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        self.add(cx0, cy0);
        self.add(cx1, cy1);
        self.add(x, y);
    }
    fn close(&mut self) {}
}

/// Control box of the outline of `gid`, in font units.
pub fn bounds_of(font: &[u8], gid: u32) -> Option<(f32, f32, f32, f32)> {
    let font = FontRef::new(font).unwrap();
    let outline = font.outline_glyphs().get(GlyphId::new(gid))?;
    let mut pen = BoundsPen::default();
    outline
        .draw(
            DrawSettings::unhinted(Size::unscaled(), LocationRef::default()),
            &mut pen,
        )
        .unwrap();
    pen.bounds
}

/// Glyph names from the font's post table.
pub fn names_of(font: &[u8]) -> Option<Vec<String>> {
    let tables = FontTables::from_font(font).unwrap();
    let count = sfnt::read_u16(tables.get(Tag::new(b"maxp")).unwrap(), sfnt::MAXP_NUM_GLYPHS).unwrap();
    sfnt::post_glyph_names(tables.get(Tag::new(b"post")).unwrap(), count).unwrap()
}

pub fn glyph_count(font: &[u8]) -> u16 {
    let tables = FontTables::from_font(font).unwrap();
    sfnt::read_u16(tables.get(Tag::new(b"maxp")).unwrap(), sfnt::MAXP_NUM_GLYPHS).unwrap()
}

pub fn table(font: &[u8], tag: &[u8; 4]) -> Option<Vec<u8>> {
    let tables = FontTables::from_font(font).unwrap();
    tables.get(Tag::new(tag)).map(<[u8]>::to_vec)
}

/// One glyph of a CFF test font, drawn by a Type 2 charstring.
#[derive(Debug, Clone)]
pub struct CffGlyph {
    pub codepoints: Vec<u32>,
    pub advance: u16,
    pub charstring: Vec<u8>,
}

/// Encodes Type 2 charstring operations, each a list of operands and an operator.
pub fn charstring(ops: &[(Vec<i16>, u8)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (operands, operator) in ops {
        for &v in operands {
            out.push(28);
            be16(&mut out, v as u16);
        }
        out.push(*operator);
    }
    out
}

fn cff_index(items: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    be16(&mut buf, items.len() as u16);
    if items.is_empty() {
        return buf;
    }
    buf.push(2); // offSize
    let mut offset = 1u16;
    be16(&mut buf, offset);
    for item in items {
        offset += item.len() as u16;
        be16(&mut buf, offset);
    }
    for item in items {
        buf.extend_from_slice(item);
    }
    buf
}

fn cff_table(charstrings: &[Vec<u8>]) -> Vec<u8> {
    let header = [1u8, 0, 4, 2];
    let names = cff_index(&[b"KanaTest".to_vec()]);
    let top_dict = |offset: i32| {
        let mut dict = vec![29];
        dict.extend_from_slice(&offset.to_be_bytes());
        dict.push(17); // CharStrings
        dict
    };
    let empty = cff_index(&[]);
    let prefix = header.len() + names.len() + cff_index(&[top_dict(0)]).len() + 2 * empty.len();

    let mut buf = header.to_vec();
    buf.extend_from_slice(&names);
    buf.extend_from_slice(&cff_index(&[top_dict(prefix as i32)]));
    buf.extend_from_slice(&empty); // strings
    buf.extend_from_slice(&empty); // global subroutines
    buf.extend_from_slice(&cff_index(charstrings));
    buf
}

/// Builds a CFF-flavoured font without glyph names.
pub fn build_cff_font(units_per_em: u16, glyphs: &[CffGlyph]) -> Vec<u8> {
    let num_glyphs = glyphs.len() as u16;
    let mut hmtx = Vec::new();
    let mut mappings = Vec::new();
    for (gid, g) in glyphs.iter().enumerate() {
        be16(&mut hmtx, g.advance);
        be16(&mut hmtx, 0);
        for &cp in &g.codepoints {
            mappings.push((char::from_u32(cp).unwrap(), WriteGlyphId::new(gid as u32)));
        }
    }
    let max_advance = glyphs.iter().map(|g| g.advance).max().unwrap_or(0);
    let mut maxp = Vec::new();
    be32(&mut maxp, 0x0000_5000);
    be16(&mut maxp, num_glyphs);
    let charstrings: Vec<Vec<u8>> = glyphs.iter().map(|g| g.charstring.clone()).collect();

    let mut tables = FontTables::default();
    tables.insert(Tag::new(b"head"), head(units_per_em));
    tables.insert(
        Tag::new(b"hhea"),
        hhea(units_per_em, num_glyphs, max_advance),
    );
    tables.insert(Tag::new(b"maxp"), maxp);
    tables.insert(Tag::new(b"hmtx"), hmtx);
    tables.insert(Tag::new(b"CFF "), cff_table(&charstrings));
    tables.insert(
        Tag::new(b"cmap"),
        write_fonts::dump_table(&Cmap::from_mappings(mappings).unwrap()).unwrap(),
    );
    tables.insert(Tag::new(b"post"), post_header(0x0003_0000));
    tables.build().unwrap()
}

/// Collects the points of every contour in drawing order, control points included.
#[derive(Default)]
struct PointsPen {
    contours: Vec<Vec<(f32, f32)>>,
}

impl PointsPen {
    fn add(&mut self, x: f32, y: f32) {
        if let Some(contour) = self.contours.last_mut() {
            contour.push((x, y));
        }
    }
}

impl OutlinePen for PointsPen {
    fn move_to(&mut self, x: f32, y: f32) {
        self.contours.push(vec![(x, y)]);
    }
    fn line_to(&mut self, x: f32, y: f32) {
        self.add(x, y);
    }
    fn quad_to(&mut self, cx0: f32, cy0: f32, x: f32, y: f32) {
        self.add(cx0, cy0);
        self.add(x, y);
    }
    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        self.add(cx0, cy0);
        self.add(cx1, cy1);
        self.add(x, y);
    }
    fn close(&mut self) {}
}

/// Shoelace area of each contour of `gid`; negative means clockwise.
pub fn contour_areas(font: &[u8], gid: u32) -> Vec<f32> {
    let font = FontRef::new(font).unwrap();
    let outline = font.outline_glyphs().get(GlyphId::new(gid)).unwrap();
    let mut pen = PointsPen::default();
    outline
        .draw(
            DrawSettings::unhinted(Size::unscaled(), LocationRef::default()),
            &mut pen,
        )
        .unwrap();
    pen.contours
        .iter()
        .map(|points| {
            let doubled: f32 = points
                .iter()
                .zip(points.iter().cycle().skip(1))
                .map(|((x0, y0), (x1, y1))| x0 * y1 - x1 * y0)
                .sum();
            doubled / 2.0
        })
        .collect()
}

/// Contour and point counts of simple glyph `gid`, read straight from `glyf`.
pub fn glyf_point_counts(font: &[u8], gid: u32) -> (u16, u16) {
    let tables = FontTables::from_font(font).unwrap();
    let head = tables.get(Tag::new(b"head")).unwrap();
    let loca = tables.get(Tag::new(b"loca")).unwrap();
    let glyf = tables.get(Tag::new(b"glyf")).unwrap();
    let start = match sfnt::read_u16(head, sfnt::HEAD_INDEX_TO_LOC_FORMAT).unwrap() {
        0 => sfnt::read_u16(loca, gid as usize * 2).unwrap() as usize * 2,
        _ => sfnt::read_u32(loca, gid as usize * 4).unwrap() as usize,
    };
    let glyph = &glyf[start..];
    let contours = sfnt::read_u16(glyph, 0).unwrap();
    assert!(contours > 0 && contours < 0x8000, "not a simple glyph");
    let last_end = sfnt::read_u16(glyph, 10 + 2 * (contours as usize - 1)).unwrap();
    (contours, last_end + 1)
}
