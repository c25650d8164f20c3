//! Slip transform: byte-distinct, visually identical variants.
//!
//! Each variant nudges the RGB channels of visible pixels by a tiny signed
//! delta. Alpha is never touched and fully transparent pixels are skipped,
//! so the result composites exactly like the source.

use std::collections::HashSet;

use image::{DynamicImage, RgbaImage};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::TransformError;
use crate::naming::variant_name;
use crate::normalize::{decode, encode_png};
use crate::types::{ImageFile, PixelMethod, UniquenessSpec};

/// Probability that `Sparse` selects a given visible pixel.
const SPARSE_PIXEL_PROBABILITY: f64 = 0.1;

/// Regeneration attempts per variant before giving up on uniqueness.
const MAX_ATTEMPTS_PER_VARIANT: u32 = 16;

/// Returns a perturbed copy of `src` according to `method`.
pub fn perturb<R: Rng + ?Sized>(src: &RgbaImage, method: PixelMethod, rng: &mut R) -> RgbaImage {
    let mut out = src.clone();
    let mut touched = false;

    for pixel in out.pixels_mut() {
        if pixel[3] == 0 {
            continue;
        }
        match method {
            PixelMethod::Every => {
                nudge(&mut pixel.0, 1, rng);
                touched = true;
            }
            PixelMethod::Sparse => {
                if rng.gen_bool(SPARSE_PIXEL_PROBABILITY) {
                    nudge(&mut pixel.0, 3, rng);
                    touched = true;
                }
            }
        }
    }

    // Sparse selection can miss every pixel on small images.
    if !touched {
        let visible: Vec<usize> = out
            .pixels()
            .enumerate()
            .filter(|(_, p)| p[3] != 0)
            .map(|(i, _)| i)
            .collect();
        if !visible.is_empty() {
            let pick = visible[rng.gen_range(0..visible.len())];
            let (w, _) = out.dimensions();
            let px = out.get_pixel_mut(pick as u32 % w, pick as u32 / w);
            nudge(&mut px.0, method.max_delta(), rng);
        }
    }

    out
}

/// Moves each RGB channel by a random non-zero delta in `±1..=±max`, clamped.
fn nudge<R: Rng + ?Sized>(rgba: &mut [u8; 4], max: u8, rng: &mut R) {
    for channel in rgba.iter_mut().take(3) {
        let magnitude = i16::from(rng.gen_range(1..=max));
        let delta = if rng.gen_bool(0.5) { magnitude } else { -magnitude };
        *channel = (i16::from(*channel) + delta).clamp(0, 255) as u8;
    }
}

fn digest(img: &RgbaImage) -> String {
    hex::encode(Sha256::digest(img.as_raw()))
}

/// Produces `spec.copy_count` distinct variants of `file`, named
/// `<base>_<n>.png`.
///
/// Every variant is guaranteed to differ from the source and from every
/// other variant; when that cannot be achieved (e.g. a fully transparent
/// image) the whole input fails with [`TransformError::NotUnique`]. A
/// `copy_count` outside `1..=MAX_COPY_COUNT` fails with
/// [`TransformError::InvalidCopyCount`] before anything is decoded.
pub fn slip_variants<R: Rng + ?Sized>(
    file: &ImageFile,
    spec: &UniquenessSpec,
    rng: &mut R,
) -> Result<Vec<ImageFile>, TransformError> {
    spec.validate()?;
    let src = decode(file)?.to_rgba8();
    let mut seen = HashSet::from([digest(&src)]);
    let mut variants = Vec::with_capacity(spec.copy_count as usize);

    for index in 1..=spec.copy_count {
        let mut attempt = 0;
        let variant = loop {
            attempt += 1;
            let candidate = perturb(&src, spec.pixel_method, rng);
            if seen.insert(digest(&candidate)) {
                break candidate;
            }
            if attempt >= MAX_ATTEMPTS_PER_VARIANT {
                warn!(name = %file.name, index, "slip variant collided repeatedly");
                return Err(TransformError::NotUnique {
                    name: file.name.clone(),
                    copy_count: spec.copy_count,
                });
            }
        };

        let name = variant_name(&file.name, index);
        let data = encode_png(&DynamicImage::ImageRgba8(variant), &name)?;
        variants.push(ImageFile::new(name, data));
    }

    debug!(
        name = %file.name,
        copies = variants.len(),
        method = ?spec.pixel_method,
        "slip variants generated"
    );
    Ok(variants)
}
