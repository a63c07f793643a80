//! Converting donor outlines into TrueType simple glyphs.

use kurbo::{CubicBez, Point};
use read_fonts::tables::glyf::CurvePoint;
use skrifa::outline::OutlinePen;
use write_fonts::tables::glyf::{Bbox, Contour, SimpleGlyph};

/// Maximum distance, in font units, between a cubic and its quadratic approximation.
const CUBIC_TOLERANCE: f64 = 0.5;

/// Collects drawing commands as TrueType contours.
///
/// Cubic segments (from CFF outlines) are split into quadratics. Coordinates are
/// rounded to integer font units as they arrive.
#[derive(Debug, Default)]
pub(crate) struct TrueTypePen {
    contours: Vec<Vec<CurvePoint>>,
    current: Vec<CurvePoint>,
    last: Point,
}

fn round(v: f64) -> i16 {
    v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

impl TrueTypePen {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, x: f64, y: f64, on_curve: bool) {
        self.current.push(CurvePoint::new(round(x), round(y), on_curve));
    }

    fn finish_contour(&mut self) {
        let mut contour = std::mem::take(&mut self.current);
        // closing segment ending on the start point is implicit in TrueType
        if contour.len() > 1 {
            let first = contour[0];
            if let Some(last) = contour.last() {
                if *last == first {
                    contour.pop();
                }
            }
        }
        if !contour.is_empty() {
            self.contours.push(contour);
        }
    }

    /// Finishes drawing and returns the glyph.
    ///
    /// With `reverse` set, every contour direction is flipped, turning the
    /// counter-clockwise outer contours of PostScript outlines into TrueType's
    /// clockwise ones.
    pub(crate) fn into_glyph(mut self, reverse: bool) -> SimpleGlyph {
        self.finish_contour();
        let mut contours = self.contours;
        if reverse {
            for contour in &mut contours {
                reverse_contour(contour);
            }
        }
        let bbox = bounding_box(&contours);
        SimpleGlyph {
            bbox,
            contours: contours.into_iter().map(Contour::from).collect(),
            instructions: Vec::new(),
        }
    }
}

impl OutlinePen for TrueTypePen {
    fn move_to(&mut self, x: f32, y: f32) {
        self.finish_contour();
        self.push(x as f64, y as f64, true);
        self.last = Point::new(x as f64, y as f64);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.push(x as f64, y as f64, true);
        self.last = Point::new(x as f64, y as f64);
    }

    fn quad_to(&mut self, cx0: f32, cy0: f32, x: f32, y: f32) {
        self.push(cx0 as f64, cy0 as f64, false);
        self.push(x as f64, y as f64, true);
        self.last = Point::new(x as f64, y as f64);
    }

    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        let cubic = CubicBez::new(
            self.last,
            Point::new(cx0 as f64, cy0 as f64),
            Point::new(cx1 as f64, cy1 as f64),
            Point::new(x as f64, y as f64),
        );
        for (_, _, quad) in cubic.to_quads(CUBIC_TOLERANCE) {
            self.push(quad.p1.x, quad.p1.y, false);
            self.push(quad.p2.x, quad.p2.y, true);
        }
        self.last = Point::new(x as f64, y as f64);
    }

    fn close(&mut self) {
        self.finish_contour();
    }
}

/// Reverses a closed contour while keeping its first point.
fn reverse_contour(points: &mut [CurvePoint]) {
    if points.len() > 2 {
        points[1..].reverse();
    }
}

fn bounding_box(contours: &[Vec<CurvePoint>]) -> Bbox {
    let mut points = contours.iter().flatten();
    let Some(first) = points.next() else {
        return Bbox::default();
    };
    points.fold(
        Bbox {
            x_min: first.x,
            y_min: first.y,
            x_max: first.x,
            y_max: first.y,
        },
        |bbox, p| Bbox {
            x_min: bbox.x_min.min(p.x),
            y_min: bbox.y_min.min(p.y),
            x_max: bbox.x_max.max(p.x),
            y_max: bbox.y_max.max(p.y),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(glyph: &SimpleGlyph, contour: usize) -> Vec<(i16, i16, bool)> {
        let points: Vec<CurvePoint> = glyph.contours[contour].clone().into();
        points.iter().map(|p| (p.x, p.y, p.on_curve)).collect()
    }

    #[test]
    fn square_drops_closing_duplicate() {
        let mut pen = TrueTypePen::new();
        pen.move_to(0.0, 0.0);
        pen.line_to(0.0, 100.0);
        pen.line_to(100.0, 100.0);
        pen.line_to(100.0, 0.0);
        pen.line_to(0.0, 0.0);
        pen.close();
        let glyph = pen.into_glyph(false);
        assert_eq!(glyph.contours.len(), 1);
        assert_eq!(
            points(&glyph, 0),
            [(0, 0, true), (0, 100, true), (100, 100, true), (100, 0, true)]
        );
        assert_eq!(
            glyph.bbox,
            Bbox {
                x_min: 0,
                y_min: 0,
                x_max: 100,
                y_max: 100
            }
        );
    }

    #[test]
    fn reversal_keeps_start_point() {
        let mut pen = TrueTypePen::new();
        pen.move_to(0.0, 0.0);
        pen.line_to(100.0, 0.0);
        pen.quad_to(100.0, 100.0, 0.0, 100.0);
        pen.close();
        let glyph = pen.into_glyph(true);
        assert_eq!(
            points(&glyph, 0),
            [(0, 0, true), (0, 100, true), (100, 100, false), (100, 0, true)]
        );
    }

    #[test]
    fn cubic_becomes_quadratics() {
        let mut pen = TrueTypePen::new();
        pen.move_to(0.0, 0.0);
        pen.curve_to(0.0, 200.0, 300.0, 200.0, 300.0, 0.0);
        pen.close();
        let glyph = pen.into_glyph(false);
        let pts = points(&glyph, 0);
        assert!(pts.len() >= 3);
        assert!(pts.iter().any(|p| !p.2));
        assert_eq!(pts.last(), Some(&(300, 0, true)));
        assert!(glyph.bbox.y_max > 100 && glyph.bbox.y_max <= 200);
    }

    #[test]
    fn empty_outline_gives_empty_glyph() {
        let glyph = TrueTypePen::new().into_glyph(true);
        assert!(glyph.contours.is_empty());
        assert_eq!(glyph.bbox, Bbox::default());
    }

    #[test]
    fn coordinates_round_and_clamp() {
        assert_eq!(round(10.5), 11);
        assert_eq!(round(-0.4), 0);
        assert_eq!(round(1e9), i16::MAX);
    }
}
