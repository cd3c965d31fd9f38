use crate::transforms::pipeline::MAX_PIXEL_VAL;

use super::pipeline::Transform;
use burn::{
    prelude::Backend,
    tensor::{Tensor, cast::ToElement, s},
};

use rand::Rng;

impl<B: Backend> Transform<B> {
    /// Adds `value` to every pixel of the image, clamped to the valid
    /// range. Positive values brighten, negative values darken; boxes and
    /// labels are untouched.
    pub fn brightness(&mut self, value: i32) -> Self {
        self.image = self
            .image
            .clone()
            .add_scalar(value as f32)
            .clamp(0.0, MAX_PIXEL_VAL);

        self.clone()
    }

    /// Computes the average complementary color of an image section.
    /// Used to pick an overlay color that stays readable on top of the
    /// section.
    pub fn complementary(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> [u8; 3] {
        let image_section = self.crop_area(x1 as usize, y1 as usize, x2 as usize, y2 as usize);
        let r = image_section.clone().slice(s![0]);
        let g = image_section.clone().slice(s![1]);
        let b = image_section.clone().slice(s![2]);

        let r_ave =
            (r.clone().sum().into_scalar().to_f64() / r.shape().num_elements().to_f64()).to_f32();
        let g_ave =
            (g.clone().sum().into_scalar().to_f64() / g.shape().num_elements().to_f64()).to_f32();
        let b_ave =
            (b.clone().sum().into_scalar().to_f64() / b.shape().num_elements().to_f64()).to_f32();

        [255 - r_ave as u8, 255 - b_ave as u8, 255 - g_ave as u8]
    }

    /// Scales pixel intensity differences around the mid-point by
    /// `contrast` percent. `0.0` leaves the image unchanged, positive
    /// values increase contrast, negative values flatten it.
    pub fn contrast(&mut self, contrast: f32) -> Self {
        let percent = ((100.0 + contrast) / 100.0).powi(2);
        self.image = self
            .image
            .clone()
            .div_scalar(MAX_PIXEL_VAL)
            .sub_scalar(0.5)
            .mul_scalar(percent)
            .add_scalar(0.5)
            .mul_scalar(MAX_PIXEL_VAL)
            .clamp(0.0, MAX_PIXEL_VAL);

        self.clone()
    }

    /// Rotates the hue of the image by `angle` degrees, directly in RGB
    /// space via a rotation matrix (no HSV round trip). Underwater footage
    /// is heavily blue-green shifted, so hue jitter during training keeps
    /// the classifier from latching onto the water column's tint.
    pub fn hue_rotate(&mut self, angle: f32) -> Self {
        let cosv = angle.to_radians().cos();
        let sinv = angle.to_radians().sin();

        let coeffs: [f32; 9] = [
            // Reds
            0.213 + cosv * 0.787 - sinv * 0.213,
            0.715 - cosv * 0.715 - sinv * 0.715,
            0.072 - cosv * 0.072 + sinv * 0.928,
            // Greens
            0.213 - cosv * 0.213 + sinv * 0.143,
            0.715 + cosv * 0.285 + sinv * 0.140,
            0.072 - cosv * 0.072 - sinv * 0.283,
            // Blues
            0.213 - cosv * 0.213 - sinv * 0.787,
            0.715 - cosv * 0.715 + sinv * 0.715,
            0.072 + cosv * 0.928 + sinv * 0.072,
        ];

        let chunks = self.image.clone().split(1, 0);

        let red = chunks[0]
            .clone()
            .mul_scalar(coeffs[0])
            .add(chunks[1].clone().mul_scalar(coeffs[1]))
            .add(chunks[2].clone().mul_scalar(coeffs[2]));

        let green = chunks[0]
            .clone()
            .mul_scalar(coeffs[3])
            .add(chunks[1].clone().mul_scalar(coeffs[4]))
            .add(chunks[2].clone().mul_scalar(coeffs[5]));

        let blue = chunks[0]
            .clone()
            .mul_scalar(coeffs[6])
            .add(chunks[1].clone().mul_scalar(coeffs[7]))
            .add(chunks[2].clone().mul_scalar(coeffs[8]));

        self.image = Tensor::cat(vec![red, green, blue], 0).clamp(0.0, MAX_PIXEL_VAL);

        self.clone()
    }

    /// Applies the photometric distortions of the original SSD augmentation
    /// chain: brightness, contrast and hue, each independently with
    /// probability `p` and a factor sampled uniformly from its range.
    ///
    /// # Arguments
    ///
    /// * `brightness` – `(min, max)` as a fraction of the pixel range,
    ///   `-1.0 ≤ min ≤ max ≤ 1.0`.
    /// * `contrast` – `(min, max)` fractional contrast change, same bounds.
    /// * `hue` – `(min, max)` as a fraction of a 180° rotation.
    /// * `p` – per-distortion application probability.
    ///
    /// Bounding boxes and labels are unaffected.
    pub fn random_photometric_distort(
        &mut self,
        brightness: (f32, f32),
        contrast: (f32, f32),
        hue: (f32, f32),
        p: f32,
    ) -> Self {
        if self.should_apply(p) {
            let r_bright = (self
                .rng
                .random_range(brightness.0.clamp(-1.0, 1.0)..brightness.1.clamp(-1.0, 1.0))
                * MAX_PIXEL_VAL) as i32;
            self.brightness(r_bright);
        }

        if self.should_apply(p) {
            let r_contrast = self
                .rng
                .random_range(contrast.0.clamp(-1.0, 1.0)..contrast.1.clamp(-1.0, 1.0))
                * 100.0;
            self.contrast(r_contrast);
        }

        if self.should_apply(p) {
            let r_hue_rot = self
                .rng
                .random_range(hue.0.clamp(-1.0, 1.0)..hue.1.clamp(-1.0, 1.0))
                * 180.0;

            self.hue_rotate(r_hue_rot);
        }

        self.clone()
    }
}
