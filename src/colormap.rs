//! Jet-style palette used to colorize saliency maps: blue = low importance,
//! red = high. Applied through a 256-entry lookup table so colorization is
//! quantized and byte-deterministic.

use image::{ImageBuffer, Luma, Rgb, RgbImage};

/// Anchor stops of the jet palette.
const JET_ANCHORS: [(f32, [u8; 3]); 6] = [
    (0.0, [0, 0, 128]),
    (0.125, [0, 0, 255]),
    (0.375, [0, 255, 255]),
    (0.625, [255, 255, 0]),
    (0.875, [255, 0, 0]),
    (1.0, [128, 0, 0]),
];

/// Linear interpolation between the palette anchors for a value in [0, 1].
fn jet(val01: f32) -> Rgb<u8> {
    let x = val01.clamp(0.0, 1.0);
    let mut i = 0;
    while i + 1 < JET_ANCHORS.len() && x > JET_ANCHORS[i + 1].0 {
        i += 1;
    }
    let (x0, c0) = JET_ANCHORS[i];
    let (x1, c1) = JET_ANCHORS[i.min(JET_ANCHORS.len() - 2) + 1];
    let t = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.0 };
    let lerp = |a: u8, b: u8| -> u8 { (a as f32 + t * (b as f32 - a as f32)).round() as u8 };
    Rgb([lerp(c0[0], c1[0]), lerp(c0[1], c1[1]), lerp(c0[2], c1[2])])
}

/// The palette quantized to 256 levels, matching how an 8-bit colormap
/// application behaves.
pub fn jet_lut() -> [[u8; 3]; 256] {
    core::array::from_fn(|level| jet(level as f32 / 255.0).0)
}

/// Maps a single-channel [0, 1] intensity image through the palette,
/// producing an RGB heatmap of the same dimensions. Out-of-range values are
/// clamped rather than wrapped.
pub fn colorize(map: &ImageBuffer<Luma<f32>, Vec<f32>>) -> RgbImage {
    let lut = jet_lut();
    RgbImage::from_fn(map.width(), map.height(), |x, y| {
        let v = map.get_pixel(x, y).0[0];
        let level = (v.clamp(0.0, 1.0) * 255.0) as usize;
        Rgb(lut[level])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_end_is_blue_hot_end_is_red() {
        let lut = jet_lut();
        let [r_lo, g_lo, b_lo] = lut[0];
        let [r_hi, g_hi, b_hi] = lut[255];

        assert!(b_lo > r_lo && b_lo > g_lo);
        assert!(r_hi > g_hi && r_hi > b_hi);
    }

    #[test]
    fn midpoint_is_green_dominant() {
        let Rgb([r, g, b]) = jet(0.5);
        assert!(g > r && g > b);
    }

    #[test]
    fn colorize_clamps_out_of_range_values() {
        let mut map = ImageBuffer::<Luma<f32>, Vec<f32>>::new(2, 1);
        map.put_pixel(0, 0, Luma([-3.0]));
        map.put_pixel(1, 0, Luma([7.5]));

        let heatmap = colorize(&map);
        let lut = jet_lut();

        assert_eq!(heatmap.get_pixel(0, 0).0, lut[0]);
        assert_eq!(heatmap.get_pixel(1, 0).0, lut[255]);
    }

    #[test]
    fn colorize_preserves_dimensions() {
        let map = ImageBuffer::<Luma<f32>, Vec<f32>>::new(13, 7);
        let heatmap = colorize(&map);
        assert_eq!((heatmap.width(), heatmap.height()), (13, 7));
    }
}
