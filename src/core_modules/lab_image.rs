// THEORY:
// Hints are expressed in the chrominance plane of CIELAB (D65): `a` runs green to
// red and `b` blue to yellow, both nominally within [-128, 127]. Lightness stays in
// the grayscale rendition, so a hint only has to carry `(a, b)`.
//
// `LabImage` is a planar, row-major copy of an RGB raster in that space. Planar
// storage lets the selectors run scalar filters over one channel at a time.

use image::RgbImage;
use palette::{FromColor, Lab, Srgb};

/// A planar CIELAB rendition of an RGB image.
#[derive(Debug, Clone, PartialEq)]
pub struct LabImage {
    pub width: usize,
    pub height: usize,
    /// Lightness, 0..100.
    pub l: Vec<f32>,
    /// Green-red chrominance.
    pub a: Vec<f32>,
    /// Blue-yellow chrominance.
    pub b: Vec<f32>,
}

impl LabImage {
    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let (width, height) = (rgb.width() as usize, rgb.height() as usize);
        let n = width * height;
        let mut l = Vec::with_capacity(n);
        let mut a = Vec::with_capacity(n);
        let mut b = Vec::with_capacity(n);
        for pixel in rgb.pixels() {
            let lab = rgb_to_lab(pixel.0);
            l.push(lab.l);
            a.push(lab.a);
            b.push(lab.b);
        }
        Self {
            width,
            height,
            l,
            a,
            b,
        }
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// `(a, b)` at an image-space position.
    pub fn ab(&self, row: usize, col: usize) -> (f32, f32) {
        let i = self.index(row, col);
        (self.a[i], self.b[i])
    }
}

/// Convert one 8-bit sRGB pixel to Lab (D65).
pub fn rgb_to_lab([r, g, b]: [u8; 3]) -> Lab {
    let srgb = Srgb::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    Lab::from_color(srgb)
}
