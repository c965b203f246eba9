//! Gradient saliency overlays for classifier predictions.
//!
//! The pipeline: extract the class-score gradient from the classifier,
//! reduce it to one value per pixel, resize to display geometry, restrict
//! scoring to a centered circular region (MRI borders and skull edges
//! otherwise dominate), normalize and threshold within that region, smooth,
//! colorize, and blend the result over the attenuated upload.
//!
//! Everything here is deterministic: the same classifier, tensor, and class
//! index produce a byte-identical composite.

use image::{imageops, imageops::FilterType, ImageBuffer, Luma, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use log::debug;
use ndarray::{Array2, Array4, Axis};

use crate::classifier::Classifier;
use crate::colormap;
use crate::error::Error;

type GrayF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Pixels between the circular region of interest and the nearest edge
/// along the shorter image dimension.
pub const DEFAULT_MASK_MARGIN: u32 = 10;

/// Percentile of in-mask importance below which pixels are muted, leaving
/// only the hottest ~20% of the region visible.
pub const DEFAULT_THRESHOLD_PERCENTILE: f32 = 80.0;

/// Gaussian sigma for softening thresholding artifacts. 2.0 is the sigma an
/// 11x11 kernel with auto-computed spread works out to.
pub const DEFAULT_SMOOTHING_SIGMA: f32 = 2.0;

/// Tuning knobs for the saliency composite. The defaults reproduce the
/// reference rendering; only the output geometry has no sensible default.
#[derive(Debug, Clone, Copy)]
pub struct SaliencyConfig {
    /// Display geometry of the composite, as (width, height).
    pub output_size: (u32, u32),
    pub mask_margin: u32,
    pub threshold_percentile: f32,
    pub smoothing_sigma: f32,
    /// Heatmap contribution to the blend. The heatmap deliberately
    /// dominates so hot regions stay legible over anatomy.
    pub heatmap_weight: f32,
    /// Upload contribution to the blend.
    pub image_weight: f32,
}

impl SaliencyConfig {
    pub fn new(output_size: (u32, u32)) -> Self {
        Self {
            output_size,
            mask_margin: DEFAULT_MASK_MARGIN,
            threshold_percentile: DEFAULT_THRESHOLD_PERCENTILE,
            smoothing_sigma: DEFAULT_SMOOTHING_SIGMA,
            heatmap_weight: 0.7,
            image_weight: 0.3,
        }
    }
}

/// Centered circular region of interest. Pixels outside it are treated as
/// background and excluded from normalization statistics.
#[derive(Debug, Clone, Copy)]
pub struct CircularMask {
    center_x: i64,
    center_y: i64,
    radius: i64,
}

impl CircularMask {
    /// A circle centered on a (width x height) image, with `margin` pixels
    /// held back from every edge. The radius is clamped against all four
    /// edge distances so even-sized images keep the full margin on the far
    /// edges too. Images smaller than twice the margin yield an empty mask.
    pub fn centered((width, height): (u32, u32), margin: u32) -> Self {
        let center_x = (width / 2) as i64;
        let center_y = (height / 2) as i64;
        let to_edge = center_x
            .min(center_y)
            .min(width as i64 - 1 - center_x)
            .min(height as i64 - 1 - center_y);
        let radius = (to_edge - margin as i64).max(0);
        Self { center_x, center_y, radius }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        if self.radius == 0 {
            return false;
        }
        let dx = x as i64 - self.center_x;
        let dy = y as i64 - self.center_y;
        dx * dx + dy * dy <= self.radius * self.radius
    }
}

/// Renders the saliency composite for `class_index` over `original`.
///
/// `input` must be the single-image NHWC batch the classifier was given for
/// prediction; `original` is the uploaded scan (any size — it is resized to
/// the output geometry for blending). The composite is returned, not
/// written anywhere; persisting it is the caller's decision (see
/// storage::persist_composite()).
///
/// Fails fast on an out-of-range class index and on classifiers without the
/// gradient capability. A degenerate (constant) gradient map is *not* an
/// error: normalization is skipped and the composite degrades to the
/// attenuated upload under a flat low-end tint.
pub fn generate_saliency_map(
    classifier: &dyn Classifier,
    input: &Array4<f32>,
    class_index: usize,
    original: &RgbImage,
    config: &SaliencyConfig,
) -> Result<RgbImage, Error> {
    classifier.ensure_class_index(class_index)?;

    let gradients = classifier.class_gradient(input, class_index)?;
    let reduced = channel_reduce(&gradients);
    let mut map = resize_map(&reduced, config.output_size);

    let mask = CircularMask::centered(config.output_size, config.mask_margin);
    apply_mask(&mut map, &mask);
    normalize_in_mask(&mut map, &mask);

    let mut in_mask = in_mask_values(&map, &mask);
    match percentile(&mut in_mask, config.threshold_percentile) {
        Some(threshold) => threshold_below(&mut map, threshold),
        None => debug!("Empty saliency mask for output size {:?}; skipping threshold", config.output_size),
    }

    let map = gaussian_blur_f32(&map, config.smoothing_sigma);
    let heatmap = colormap::colorize(&map);

    let original = fit_to_output(original, config.output_size);
    Ok(composite_over(&original, &heatmap, config))
}

/// Collapses an NHWC gradient batch to one importance value per pixel:
/// absolute value, then the maximum across channels. Max (not mean) keeps
/// the single most sensitive channel per pixel from being washed out.
fn channel_reduce(gradients: &Array4<f32>) -> Array2<f32> {
    let spatial = gradients.index_axis(Axis(0), 0);
    spatial.fold_axis(Axis(2), 0.0f32, |acc, v| acc.max(v.abs()))
}

fn resize_map(map: &Array2<f32>, (width, height): (u32, u32)) -> GrayF32 {
    let (rows, cols) = map.dim();
    let buffer = GrayF32::from_fn(cols as u32, rows as u32, |x, y| {
        Luma([map[[y as usize, x as usize]]])
    });
    if (cols as u32, rows as u32) == (width, height) {
        return buffer;
    }
    imageops::resize(&buffer, width, height, FilterType::Triangle)
}

fn apply_mask(map: &mut GrayF32, mask: &CircularMask) {
    for (x, y, pixel) in map.enumerate_pixels_mut() {
        if !mask.contains(x, y) {
            pixel.0[0] = 0.0;
        }
    }
}

fn in_mask_values(map: &GrayF32, mask: &CircularMask) -> Vec<f32> {
    map.enumerate_pixels()
        .filter(|(x, y, _)| mask.contains(*x, *y))
        .map(|(_, _, pixel)| pixel.0[0])
        .collect()
}

/// Rescales in-mask values to [0, 1] using the mask region's own min and
/// max, so background pixels never skew the contrast. A zero-variance
/// region is left untouched — that is the degenerate-gradient case and must
/// not divide by zero.
fn normalize_in_mask(map: &mut GrayF32, mask: &CircularMask) {
    let values = in_mask_values(map, mask);
    let Some((min, max)) = min_max(&values) else {
        return;
    };
    if max <= min {
        return;
    }

    let range = max - min;
    for (x, y, pixel) in map.enumerate_pixels_mut() {
        if mask.contains(x, y) {
            pixel.0[0] = (pixel.0[0] - min) / range;
        }
    }
}

fn min_max(values: &[f32]) -> Option<(f32, f32)> {
    let mut iter = values.iter().copied();
    let first = iter.next()?;
    Some(iter.fold((first, first), |(min, max), v| (min.min(v), max.max(v))))
}

/// Mutes every pixel strictly below `threshold`, in and out of the mask.
fn threshold_below(map: &mut GrayF32, threshold: f32) {
    for pixel in map.pixels_mut() {
        if pixel.0[0] < threshold {
            pixel.0[0] = 0.0;
        }
    }
}

/// Percentile with linear interpolation between order statistics. None for
/// an empty sample.
fn percentile(values: &mut [f32], pct: f32) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);

    let rank = (values.len() - 1) as f32 * (pct / 100.0).clamp(0.0, 1.0);
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        return Some(values[low]);
    }
    let fraction = rank - low as f32;
    Some(values[low] + fraction * (values[high] - values[low]))
}

fn fit_to_output(original: &RgbImage, (width, height): (u32, u32)) -> RgbImage {
    if (original.width(), original.height()) == (width, height) {
        original.clone()
    } else {
        imageops::resize(original, width, height, FilterType::Triangle)
    }
}

/// `image_weight * original + heatmap_weight * heatmap`, clamped to u8.
/// Both images must already share the output geometry.
fn composite_over(original: &RgbImage, heatmap: &RgbImage, config: &SaliencyConfig) -> RgbImage {
    RgbImage::from_fn(original.width(), original.height(), |x, y| {
        let base = original.get_pixel(x, y).0;
        let heat = heatmap.get_pixel(x, y).0;
        image::Rgb([
            blend_channel(base[0], heat[0], config),
            blend_channel(base[1], heat[1], config),
            blend_channel(base[2], heat[2], config),
        ])
    })
}

fn blend_channel(base: u8, heat: u8, config: &SaliencyConfig) -> u8 {
    (config.image_weight * base as f32 + config.heatmap_weight * heat as f32).clamp(0.0, 255.0)
        as u8
}
