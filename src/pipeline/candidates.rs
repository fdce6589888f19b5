//! Figure candidate generation: region proposals on one raster.
//!
//! ```text
//! gray ─▶ adaptive threshold (inv) ─▶ dilate ─▶ external contours ─▶ boxes
//!                                                                    │
//!        ┌──── area / side filter ◀──────────────────────────────────┘
//!        ▼
//!      pad + clamp ─▶ text density (threshold ─▶ close ─▶ components) ─▶ sort by area ↓
//! ```
//!
//! Dilation merges the strokes of a chart or drawing into one blob, so its
//! outer contour approximates the whole figure. Paragraphs merge too, which
//! is why every proposal carries a text-density score for the classifier.
//!
//! All pixel work goes through [`VisionToolkit`]; this module only composes
//! the primitives and does the geometry.

use crate::config::{CandidateParams, GlyphFilter};
use image::GrayImage;
use vision_kit::{BoundingBox, ComponentStats, VisionToolkit};

/// A proposed figure region, prior to classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FigureCandidate {
    /// Padded box, always inside the source image.
    pub bbox: BoundingBox,
    /// Text-like components per `density_scale` pixels of `bbox`.
    pub text_density: f64,
    /// Area of the unpadded contour box; the sort key.
    pub area: u64,
}

/// Propose candidate regions on `gray`, largest first.
pub fn propose(
    toolkit: &dyn VisionToolkit,
    gray: &GrayImage,
    params: &CandidateParams,
) -> Vec<FigureCandidate> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let mask = toolkit.adaptive_threshold_inv(gray, params.block_size, params.threshold_offset);
    let blobs = toolkit.dilate(&mask, params.dilate_kernel, params.dilate_iterations);

    let image_area = width as f64 * height as f64;
    let min_area = image_area * params.min_area_fraction;
    let max_area = image_area * params.max_area_fraction;

    let mut candidates: Vec<FigureCandidate> = toolkit
        .external_boxes(&blobs)
        .into_iter()
        .filter(|b| {
            let area = b.area() as f64;
            area >= min_area
                && area <= max_area
                && b.width >= params.min_side
                && b.height >= params.min_side
        })
        .map(|b| {
            let bbox = pad_and_clamp(b, width, height, params.padding_fraction);
            let region = crop(gray, bbox);
            FigureCandidate {
                bbox,
                text_density: text_density(toolkit, &region, params),
                area: b.area(),
            }
        })
        .collect();

    // Stable: equal areas keep contour order, which the toolkit fixes.
    candidates.sort_by(|a, b| b.area.cmp(&a.area));
    candidates
}

/// Grow `b` by `fraction` of its width / height on every side, then clip it
/// to `[0, width) × [0, height)`.
pub fn pad_and_clamp(b: BoundingBox, width: u32, height: u32, fraction: f64) -> BoundingBox {
    let pad_x = (b.width as f64 * fraction).floor() as u32;
    let pad_y = (b.height as f64 * fraction).floor() as u32;

    let left = b.x.min(width).saturating_sub(pad_x);
    let top = b.y.min(height).saturating_sub(pad_y);
    let right = b.right().saturating_add(pad_x).min(width);
    let bottom = b.bottom().saturating_add(pad_y).min(height);

    BoundingBox::new(
        left,
        top,
        right.saturating_sub(left),
        bottom.saturating_sub(top),
    )
}

/// Text-like components per `density_scale` pixels of `region`.
pub fn text_density(toolkit: &dyn VisionToolkit, region: &GrayImage, params: &CandidateParams) -> f64 {
    let pixels = region.width() as f64 * region.height() as f64;
    if pixels == 0.0 {
        return 0.0;
    }
    let mask = toolkit.adaptive_threshold_inv(
        region,
        params.density_block_size,
        params.density_threshold_offset,
    );
    let closed = toolkit.close(&mask, params.close_kernel);
    let glyphs = toolkit
        .components(&closed)
        .iter()
        .filter(|c| is_glyph(c, &params.glyph))
        .count();
    glyphs as f64 / pixels * params.density_scale
}

/// Whether a component has the size and shape of a printed character.
pub fn is_glyph(c: &ComponentStats, f: &GlyphFilter) -> bool {
    let w = c.bounds.width;
    let h = c.bounds.height;
    if !(h > f.min_height && h < f.max_height && w > f.min_width && w < f.max_width) {
        return false;
    }
    let aspect = w as f64 / h as f64;
    aspect > f.min_aspect && aspect < f.max_aspect && c.area > f.min_area
}

/// Owned copy of `bbox` from `gray`.
pub fn crop(gray: &GrayImage, bbox: BoundingBox) -> GrayImage {
    image::imageops::crop_imm(gray, bbox.x, bbox.y, bbox.width, bbox.height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{glyphs, ScriptedToolkit};
    use image::Luma;
    use vision_kit::ImageprocToolkit;

    fn white(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([255]))
    }

    #[test]
    fn single_chart_is_padded_five_percent() {
        let kit = ScriptedToolkit {
            boxes: vec![BoundingBox::new(100, 100, 300, 300)],
            ..Default::default()
        };
        let found = propose(&kit, &white(1000, 1000), &CandidateParams::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].bbox, BoundingBox::new(85, 85, 330, 330));
        assert_eq!(found[0].area, 90_000);
        assert_eq!(found[0].text_density, 0.0);
    }

    #[test]
    fn filters_by_area_fraction_and_side() {
        let kit = ScriptedToolkit {
            boxes: vec![
                BoundingBox::new(10, 10, 50, 50),   // 0.25 % of the page
                BoundingBox::new(0, 0, 90, 500),    // too narrow
                BoundingBox::new(0, 0, 900, 900),   // 81 % of the page
                BoundingBox::new(600, 600, 120, 99), // too short
                BoundingBox::new(500, 500, 200, 200),
                BoundingBox::new(100, 100, 300, 300),
            ],
            ..Default::default()
        };
        let found = propose(&kit, &white(1000, 1000), &CandidateParams::default());
        let areas: Vec<u64> = found.iter().map(|c| c.area).collect();
        assert_eq!(areas, vec![90_000, 40_000]);
    }

    #[test]
    fn padding_never_leaves_the_image() {
        let (w, h) = (1000, 800);
        let kit = ScriptedToolkit {
            boxes: vec![
                BoundingBox::new(0, 0, 200, 200),
                BoundingBox::new(880, 680, 120, 120),
                BoundingBox::new(3, 700, 400, 100),
            ],
            ..Default::default()
        };
        for c in propose(&kit, &white(w, h), &CandidateParams::default()) {
            assert!(c.bbox.fits_within(w, h), "{:?} escapes {}x{}", c.bbox, w, h);
        }
        assert_eq!(
            pad_and_clamp(BoundingBox::new(0, 0, 200, 200), w, h, 0.05),
            BoundingBox::new(0, 0, 210, 210)
        );
        assert_eq!(
            pad_and_clamp(BoundingBox::new(880, 680, 120, 120), w, h, 0.05),
            BoundingBox::new(874, 674, 126, 126)
        );
    }

    #[test]
    fn density_counts_glyph_shaped_components() {
        let kit = ScriptedToolkit {
            components: {
                let mut c = glyphs(9);
                // A horizontal rule and a large blob are not text.
                c.push(ComponentStats {
                    bounds: BoundingBox::new(0, 0, 300, 2),
                    area: 600,
                });
                c.push(ComponentStats {
                    bounds: BoundingBox::new(0, 0, 80, 80),
                    area: 6000,
                });
                c
            },
            ..Default::default()
        };
        let d = text_density(&kit, &white(100, 100), &CandidateParams::default());
        assert!((d - 9.0).abs() < 1e-9, "density {d}");
    }

    #[test]
    fn glyph_filter_bounds_are_exclusive() {
        let f = GlyphFilter::default();
        let comp = |w, h, area| ComponentStats {
            bounds: BoundingBox::new(0, 0, w, h),
            area,
        };
        assert!(is_glyph(&comp(10, 20, 100), &f));
        assert!(!is_glyph(&comp(10, 5, 40), &f));
        assert!(!is_glyph(&comp(10, 50, 400), &f));
        assert!(!is_glyph(&comp(3, 20, 50), &f));
        assert!(!is_glyph(&comp(10, 20, 20), &f));
        // 60 / 6 = 10: aspect upper bound is exclusive.
        assert!(!is_glyph(&comp(60, 6, 300), &f));
    }

    #[test]
    fn sort_is_largest_first() {
        let kit = ScriptedToolkit {
            boxes: vec![
                BoundingBox::new(0, 0, 150, 150),
                BoundingBox::new(300, 300, 400, 400),
                BoundingBox::new(0, 600, 250, 250),
            ],
            ..Default::default()
        };
        let found = propose(&kit, &white(1000, 1000), &CandidateParams::default());
        let areas: Vec<u64> = found.iter().map(|c| c.area).collect();
        assert_eq!(areas, vec![160_000, 62_500, 22_500]);
    }

    #[test]
    fn drawn_chart_is_found_by_the_real_toolkit() {
        let mut page = white(1000, 1000);
        // 3-pixel dark frame around (200, 200, 400, 300).
        for y in 200..500u32 {
            for x in 200..600u32 {
                let edge = x < 203 || x >= 597 || y < 203 || y >= 497;
                if edge {
                    page.put_pixel(x, y, Luma([0]));
                }
            }
        }
        let found = propose(&ImageprocToolkit, &page, &CandidateParams::default());
        assert_eq!(found.len(), 1, "{found:?}");
        let b = found[0].bbox;
        assert!(b.fits_within(1000, 1000));
        assert!(b.x <= 200 && b.y <= 200);
        assert!(b.right() >= 600 && b.bottom() >= 500);
        assert!(found[0].text_density < 2.0);
    }

    #[test]
    fn empty_image_has_no_candidates() {
        let kit = ScriptedToolkit {
            boxes: vec![BoundingBox::new(0, 0, 10, 10)],
            ..Default::default()
        };
        assert!(propose(&kit, &GrayImage::new(0, 0), &CandidateParams::default()).is_empty());
    }
}
