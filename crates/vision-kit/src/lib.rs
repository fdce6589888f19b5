//! # vision-kit
//!
//! The raster primitives the figure detector composes: grayscale conversion,
//! locally-varying thresholding, square-kernel morphology, external contour
//! boxes, connected-component statistics and Canny edges.
//!
//! The detector in `edgequake-figex` only ever talks to the [`VisionToolkit`]
//! trait. [`ImageprocToolkit`] is the production implementation backed by
//! [`imageproc`]; tests substitute fakes that return scripted boxes and
//! components so the region-proposal and classification logic can be checked
//! without depending on pixel-exact toolkit behaviour.
//!
//! ## Conventions
//!
//! | Concept | Representation |
//! |---------|----------------|
//! | Binary mask | `GrayImage`, foreground = 255, background = 0 |
//! | Box | [`BoundingBox`], half-open: `[x, x + width) × [y, y + height)` |
//! | Connectivity | 8-connected for components, external borders for contours |
//!
//! ## Usage
//!
//! ```rust
//! use image::{DynamicImage, GrayImage, Luma};
//! use vision_kit::{ImageprocToolkit, VisionToolkit};
//!
//! let page = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([255])));
//! let kit = ImageprocToolkit;
//! let gray = kit.grayscale(&page);
//! let mask = kit.adaptive_threshold_inv(&gray, 25, 15.0);
//! assert!(kit.external_boxes(&mask).is_empty());
//! ```

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::region_labelling::{connected_components, Connectivity};

// ── Geometry ─────────────────────────────────────────────────────────────────

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Pixel area (`width × height`).
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// True when the box lies entirely inside a `width × height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

/// Shape statistics of one connected foreground component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComponentStats {
    /// Tight bounding box of the component.
    pub bounds: BoundingBox,
    /// Number of foreground pixels in the component.
    pub area: u64,
}

// ── Toolkit trait ────────────────────────────────────────────────────────────

/// The primitive operations the figure detector is allowed to use.
///
/// Implementations must be deterministic: the same input always produces the
/// same output, which is what lets serial and parallel runs agree.
pub trait VisionToolkit: Send + Sync {
    /// Convert any decoded raster to 8-bit single channel.
    fn grayscale(&self, image: &DynamicImage) -> GrayImage;

    /// Gaussian-weighted adaptive threshold, inverted.
    ///
    /// A pixel becomes foreground when it is at least `c` below the weighted
    /// mean of its `block_size × block_size` neighbourhood, so dark marks on a
    /// light page end up white in the mask.
    fn adaptive_threshold_inv(&self, gray: &GrayImage, block_size: u32, c: f32) -> GrayImage;

    /// Dilate with a square `kernel × kernel` structuring element, repeated
    /// `iterations` times.
    fn dilate(&self, mask: &GrayImage, kernel: u32, iterations: u32) -> GrayImage;

    /// Morphological closing with a square `kernel × kernel` element.
    fn close(&self, mask: &GrayImage, kernel: u32) -> GrayImage;

    /// Bounding boxes of the outermost contours in a binary mask.
    fn external_boxes(&self, mask: &GrayImage) -> Vec<BoundingBox>;

    /// Statistics of every 8-connected foreground component (background excluded).
    fn components(&self, mask: &GrayImage) -> Vec<ComponentStats>;

    /// Canny edge map with hysteresis thresholds `low` / `high`.
    fn edges(&self, gray: &GrayImage, low: f32, high: f32) -> GrayImage;

    /// Number of non-zero pixels.
    fn count_nonzero(&self, mask: &GrayImage) -> u64 {
        mask.pixels().filter(|p| p.0[0] != 0).count() as u64
    }
}

// ── imageproc implementation ─────────────────────────────────────────────────

/// Production toolkit backed by [`imageproc`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageprocToolkit;

impl VisionToolkit for ImageprocToolkit {
    fn grayscale(&self, image: &DynamicImage) -> GrayImage {
        match image {
            DynamicImage::ImageLuma8(gray) => gray.clone(),
            other => other.to_luma8(),
        }
    }

    fn adaptive_threshold_inv(&self, gray: &GrayImage, block_size: u32, c: f32) -> GrayImage {
        let sigma = gaussian_sigma_for_block(block_size);
        let mean = imageproc::filter::gaussian_blur_f32(gray, sigma);

        let mut out = GrayImage::new(gray.width(), gray.height());
        for (x, y, px) in gray.enumerate_pixels() {
            let threshold = mean.get_pixel(x, y).0[0] as f32 - c;
            if px.0[0] as f32 <= threshold {
                out.put_pixel(x, y, Luma([255]));
            }
        }
        out
    }

    fn dilate(&self, mask: &GrayImage, kernel: u32, iterations: u32) -> GrayImage {
        let radius = (kernel / 2).saturating_mul(iterations);
        if radius == 0 {
            return mask.clone();
        }
        imageproc::morphology::dilate(mask, Norm::LInf, radius.min(u8::MAX as u32) as u8)
    }

    fn close(&self, mask: &GrayImage, kernel: u32) -> GrayImage {
        let radius = kernel / 2;
        if radius == 0 {
            return mask.clone();
        }
        imageproc::morphology::close(mask, Norm::LInf, radius.min(u8::MAX as u32) as u8)
    }

    fn external_boxes(&self, mask: &GrayImage) -> Vec<BoundingBox> {
        find_contours::<i32>(mask)
            .into_iter()
            .filter(|c| c.parent.is_none() && c.border_type == BorderType::Outer)
            .filter_map(|c| {
                let min_x = c.points.iter().map(|p| p.x).min()?;
                let max_x = c.points.iter().map(|p| p.x).max()?;
                let min_y = c.points.iter().map(|p| p.y).min()?;
                let max_y = c.points.iter().map(|p| p.y).max()?;
                Some(BoundingBox::new(
                    min_x.max(0) as u32,
                    min_y.max(0) as u32,
                    (max_x - min_x + 1) as u32,
                    (max_y - min_y + 1) as u32,
                ))
            })
            .collect()
    }

    fn components(&self, mask: &GrayImage) -> Vec<ComponentStats> {
        let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

        // label → (min_x, min_y, max_x, max_y, area); label 0 is background.
        let mut extents: Vec<Option<(u32, u32, u32, u32, u64)>> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label.0[0] as usize;
            if label == 0 {
                continue;
            }
            if extents.len() < label {
                extents.resize(label, None);
            }
            let slot = &mut extents[label - 1];
            *slot = Some(match *slot {
                None => (x, y, x, y, 1),
                Some((x0, y0, x1, y1, area)) => {
                    (x0.min(x), y0.min(y), x1.max(x), y1.max(y), area + 1)
                }
            });
        }

        extents
            .into_iter()
            .flatten()
            .map(|(x0, y0, x1, y1, area)| ComponentStats {
                bounds: BoundingBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1),
                area,
            })
            .collect()
    }

    fn edges(&self, gray: &GrayImage, low: f32, high: f32) -> GrayImage {
        imageproc::edges::canny(gray, low, high)
    }
}

/// Gaussian sigma for an odd block size, using the same rule of thumb as
/// common vision libraries derive from an aperture.
pub fn gaussian_sigma_for_block(block_size: u32) -> f32 {
    let block = block_size.max(3) as f32;
    0.3 * ((block - 1.0) * 0.5 - 1.0) + 0.8
}
