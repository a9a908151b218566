// ============================================================
// Layer 4 — Patch Sampling and Augmentation
// ============================================================
// Training runs on small aligned crops instead of whole images:
//
//   LR image (w × h)            HR image (w·s × h·s)
//   ┌──────────────┐            ┌────────────────────────────┐
//   │  (x,y)       │            │  (x·s, y·s)                │
//   │   ┌──┐       │     ↔      │    ┌──────┐                │
//   │   └──┘ ps    │            │    └──────┘ ps·s           │
//   └──────────────┘            └────────────────────────────┘
//
// The offset is drawn in LR coordinates and scaled for HR, so
// every LR pixel keeps covering the same s×s HR block. The
// flips and the transpose are then applied to both crops with
// the same draw, which keeps that correspondence intact.

use anyhow::{bail, Result};
use image::{imageops, RgbImage};
use rand::Rng;

/// An aligned low-res / high-res crop.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchPair {
    pub lr: RgbImage,
    pub hr: RgbImage,
}

/// Draw a top-left LR offset. Both bounds are inclusive and the
/// last column/row that would still fit is never chosen.
pub fn patch_offset<R: Rng + ?Sized>(
    lr_width:   u32,
    lr_height:  u32,
    patch_size: u32,
    rng:        &mut R,
) -> (u32, u32) {
    let x = rng.gen_range(0..=lr_width.saturating_sub(patch_size + 1));
    let y = rng.gen_range(0..=lr_height.saturating_sub(patch_size + 1));
    (x, y)
}

/// Crop an aligned patch pair at a random offset.
pub fn get_patch<R: Rng + ?Sized>(
    lr:         &RgbImage,
    hr:         &RgbImage,
    patch_size: u32,
    scale:      u32,
    rng:        &mut R,
) -> Result<PatchPair> {
    let (lr_w, lr_h) = lr.dimensions();
    if lr_w < patch_size || lr_h < patch_size {
        bail!("LR image {lr_w}x{lr_h} is smaller than patch size {patch_size}");
    }

    let (x, y) = patch_offset(lr_w, lr_h, patch_size, rng);
    crop_pair(lr, hr, x, y, patch_size, scale)
}

/// Crop at a fixed LR offset; the HR offset is `scale` times it.
pub fn crop_pair(
    lr:         &RgbImage,
    hr:         &RgbImage,
    x:          u32,
    y:          u32,
    patch_size: u32,
    scale:      u32,
) -> Result<PatchPair> {
    let (lr_w, lr_h) = lr.dimensions();
    if x + patch_size > lr_w || y + patch_size > lr_h {
        bail!("LR image {lr_w}x{lr_h} cannot hold a {patch_size}px patch at ({x}, {y})");
    }

    let (hr_x, hr_y, hr_ps) = (x * scale, y * scale, patch_size * scale);
    let (hr_w, hr_h) = hr.dimensions();
    if hr_x + hr_ps > hr_w || hr_y + hr_ps > hr_h {
        bail!(
            "HR image {hr_w}x{hr_h} cannot hold a {hr_ps}px patch at ({hr_x}, {hr_y}); \
             is scale {scale} correct?"
        );
    }

    Ok(PatchPair {
        lr: imageops::crop_imm(lr, x, y, patch_size, patch_size).to_image(),
        hr: imageops::crop_imm(hr, hr_x, hr_y, hr_ps, hr_ps).to_image(),
    })
}

// ─── Augmentation ─────────────────────────────────────────────────────────────

/// One draw of the geometric augmentations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transform {
    pub hflip:     bool,
    pub vflip:     bool,
    /// Swap the two spatial axes (a 90° rotation combined with a flip)
    pub transpose: bool,
}

impl Transform {
    /// Independent coin flips, each gated by its run flag.
    pub fn sample<R: Rng + ?Sized>(flip: bool, rot: bool, rng: &mut R) -> Self {
        Self {
            hflip:     flip && rng.gen_bool(0.5),
            vflip:     flip && rng.gen_bool(0.5),
            transpose: rot && rng.gen_bool(0.5),
        }
    }

    pub fn apply(&self, img: &RgbImage) -> RgbImage {
        let mut out = img.clone();
        if self.hflip {
            imageops::flip_horizontal_in_place(&mut out);
        }
        if self.vflip {
            imageops::flip_vertical_in_place(&mut out);
        }
        if self.transpose {
            out = transpose(&out);
        }
        out
    }

    pub fn apply_pair(&self, pair: PatchPair) -> PatchPair {
        PatchPair { lr: self.apply(&pair.lr), hr: self.apply(&pair.hr) }
    }
}

/// Randomly flip / transpose both halves of a pair identically.
pub fn augment<R: Rng + ?Sized>(pair: PatchPair, flip: bool, rot: bool, rng: &mut R) -> PatchPair {
    Transform::sample(flip, rot, rng).apply_pair(pair)
}

fn transpose(img: &RgbImage) -> RgbImage {
    RgbImage::from_fn(img.height(), img.width(), |x, y| *img.get_pixel(y, x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::{rngs::StdRng, SeedableRng};

    /// LR pixel (x, y) stores its own coordinates; every HR pixel
    /// stores the coordinates of the LR pixel it upsamples.
    fn coordinate_pair(w: u32, h: u32, scale: u32) -> (RgbImage, RgbImage) {
        let lr = RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 0]));
        let hr = RgbImage::from_fn(w * scale, h * scale, |x, y| {
            Rgb([(x / scale) as u8, (y / scale) as u8, 255])
        });
        (lr, hr)
    }

    /// Every HR pixel must point back at the LR pixel covering it.
    fn assert_aligned(pair: &PatchPair, scale: u32) {
        for (x, y, px) in pair.hr.enumerate_pixels() {
            let lr_px = pair.lr.get_pixel(x / scale, y / scale);
            assert_eq!(&px.0[..2], &lr_px.0[..2], "HR ({x},{y}) lost its LR partner");
        }
    }

    #[test]
    fn test_patch_shapes_and_offsets_for_many_sizes() {
        let mut rng = StdRng::seed_from_u64(7);
        for scale in 1..=4u32 {
            for ps in [1u32, 3, 8, 16] {
                let (lr, hr) = coordinate_pair(40, 24, scale);
                for _ in 0..10 {
                    let pair = get_patch(&lr, &hr, ps, scale, &mut rng).unwrap();
                    assert_eq!(pair.lr.dimensions(), (ps, ps));
                    assert_eq!(pair.hr.dimensions(), (ps * scale, ps * scale));

                    // top-left HR pixel comes from the top-left LR pixel
                    let lr_origin = pair.lr.get_pixel(0, 0);
                    let hr_origin = pair.hr.get_pixel(0, 0);
                    assert_eq!(&lr_origin.0[..2], &hr_origin.0[..2]);
                    assert_aligned(&pair, scale);
                }
            }
        }
    }

    #[test]
    fn test_offset_never_reaches_last_fitting_position() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..500 {
            let (x, y) = patch_offset(10, 6, 4, &mut rng);
            assert!(x <= 5);
            assert!(y <= 1);
        }
    }

    #[test]
    fn test_patch_equal_to_image_uses_origin() {
        let mut rng = StdRng::seed_from_u64(3);
        let (lr, hr) = coordinate_pair(8, 8, 2);
        let pair = get_patch(&lr, &hr, 8, 2, &mut rng).unwrap();
        assert_eq!(pair.lr, lr);
        assert_eq!(pair.hr, hr);
    }

    #[test]
    fn test_too_small_image_is_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let (lr, hr) = coordinate_pair(4, 4, 2);
        assert!(get_patch(&lr, &hr, 5, 2, &mut rng).is_err());
    }

    #[test]
    fn test_mismatched_hr_is_rejected() {
        let (lr, _) = coordinate_pair(8, 8, 2);
        let (_, small_hr) = coordinate_pair(8, 8, 1);
        assert!(crop_pair(&lr, &small_hr, 2, 2, 4, 2).is_err());
    }

    #[test]
    fn test_every_transform_keeps_pairs_aligned() {
        let (lr, hr) = coordinate_pair(6, 4, 3);
        let base = crop_pair(&lr, &hr, 1, 0, 4, 3).unwrap();
        for bits in 0..8u8 {
            let t = Transform {
                hflip:     bits & 1 != 0,
                vflip:     bits & 2 != 0,
                transpose: bits & 4 != 0,
            };
            let out = t.apply_pair(base.clone());
            assert_aligned(&out, 3);
        }
    }

    #[test]
    fn test_transpose_swaps_axes() {
        let img = RgbImage::from_fn(3, 2, |x, y| Rgb([x as u8, y as u8, 0]));
        let t = transpose(&img);
        assert_eq!(t.dimensions(), (2, 3));
        assert_eq!(t.get_pixel(1, 2).0, [2, 1, 0]);
    }

    #[test]
    fn test_disabled_flags_never_transform() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            assert_eq!(Transform::sample(false, false, &mut rng), Transform::default());
        }
    }
}
