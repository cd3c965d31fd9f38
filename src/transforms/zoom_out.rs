use crate::broadcast;

use super::pipeline::Transform;
use burn::{
    prelude::Backend,
    tensor::{ElementConversion, Tensor},
};
use rand::Rng;

pub trait RandomZoomOut<B: Backend> {
    fn random_zoom_out(&mut self, fill: [f32; 3], side_range: (f32, f32), p: f32) -> Self;
}

impl<B: Backend> RandomZoomOut<B> for Transform<B> {
    /// "Zoom out" expansion from the SSD augmentation strategy: the canvas
    /// grows by a random factor from `side_range`, the image lands at a
    /// random position inside it, and the border is filled with the
    /// dataset mean color so the padding disappears once the mean is
    /// subtracted during normalization. Makes every object proportionally
    /// smaller, which is what trains the fine-grained stride-4 anchors.
    ///
    /// # Arguments
    ///
    /// * `fill` – per-channel RGB fill value for the padded border.
    /// * `side_range` – `(min, max)` canvas scale relative to the input,
    ///   `min ≥ 1.0`.
    /// * `p` – probability that the expansion is applied at all.
    ///
    /// Bounding boxes are shifted by the image's offset inside the canvas.
    fn random_zoom_out(&mut self, fill: [f32; 3], side_range: (f32, f32), p: f32) -> Self {
        if !self.should_apply(p) {
            return self.clone();
        }

        let image = self.image.clone();

        let [_ch, height, width] = image.dims();

        if side_range.0 < 1.0 || side_range.0 > side_range.1 {
            panic!("Invalid side range provided {:#?}.", side_range);
        }

        let r = self.rng.random_range(side_range.0..=side_range.1);

        let canvas_width = (width as f32 * r) as usize;
        let canvas_height = (height as f32 * r) as usize;

        let r = (self.rng.random::<f32>(), self.rng.random::<f32>());

        let left = ((canvas_width - width) as f32 * r.0) as usize;
        let top = ((canvas_height - height) as f32 * r.1) as usize;
        let right = canvas_width - (left + width);
        let bottom = canvas_height - (top + height);

        // Pad channel by channel; each channel gets its own mean fill
        let channels = image.split(1, 0);
        let mut padded = vec![];

        for (channel, fill) in channels.into_iter().zip(fill) {
            padded.push(channel.pad(
                (left, right, top, bottom),
                ElementConversion::elem::<f32>(fill),
            ));
        }

        self.image = Tensor::cat(padded, 0);

        // Translate bounding boxes into the canvas
        if let Some(bboxes) = self.bboxes.as_mut() {
            let trans = Tensor::<B, 2>::from_data(
                [[left as f32, top as f32, left as f32, top as f32]],
                &self.device,
            );
            let (a, b) = broadcast!(trans: Tensor<B,2>, bboxes: Tensor<2>);

            self.bboxes = Some(a + b);
        }

        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::{NdArray, ndarray::NdArrayDevice};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::config::MEAN_COLOR;
    use crate::transforms::pipeline::{Transform, bbox_as_tensor, create_test_image};

    #[test]
    fn zoom_out_grows_canvas_and_shifts_boxes() {
        let device = &NdArrayDevice::default();
        type B = NdArray<f32>;

        let image = create_test_image(32, 32, [50, 60, 70]);
        let image_t = Transform::<B>::rgb_img_as_tensor(image, device);
        let bboxes = bbox_as_tensor::<B>([4.0, 4.0, 12.0, 12.0], device);

        let t = Transform::new_seeded(
            image_t,
            Some(bboxes),
            None,
            StdRng::seed_from_u64(7),
        );

        let (out, bboxes, _) = t
            .clone()
            .random_zoom_out(MEAN_COLOR, (2.0, 2.0), 1.0)
            .finish()
            .unwrap();

        // A fixed factor of 2 doubles both canvas sides
        assert_eq!(out.dims(), [3, 64, 64]);

        // The box keeps its 8x8 size, wherever it landed
        let b = bboxes.unwrap().to_data().to_vec::<f32>().unwrap();
        assert_eq!(b[2] - b[0], 8.0);
        assert_eq!(b[3] - b[1], 8.0);

        // Total intensity difference is exactly the border area times the
        // mean fill, channel by channel
        let border_px = (64 * 64 - 32 * 32) as f32;
        let sums = out.sum_dim(1).sum_dim(2).reshape([3]);
        let sums = sums.to_data().to_vec::<f32>().unwrap();

        for (i, original) in [50.0f32, 60.0, 70.0].iter().enumerate() {
            let expected = original * (32.0 * 32.0) + MEAN_COLOR[i] * border_px;
            assert!((sums[i] - expected).abs() < 1.0);
        }
    }

    #[test]
    #[should_panic]
    fn zoom_out_rejects_shrinking_range() {
        let device = &NdArrayDevice::default();
        type B = NdArray<f32>;

        let image = create_test_image(8, 8, [0, 0, 0]);
        let image_t = Transform::<B>::rgb_img_as_tensor(image, device);

        Transform::new_seeded(image_t, None, None, StdRng::seed_from_u64(1))
            .random_zoom_out(MEAN_COLOR, (0.5, 2.0), 1.0);
    }
}
