use crate::{
    anchors::{boxes_to_components, get_iou},
    broadcast,
};

use super::pipeline::Transform;
use burn::{
    prelude::Backend,
    tensor::{Int, Tensor, cast::ToElement},
};
use rand::Rng;

impl<B: Backend> Transform<B> {
    /// Extracts the pixel rectangle `(c_x1, c_y1)..(c_x2, c_y2)` from the
    /// image tensor without touching boxes or labels.
    ///
    /// Panics on degenerate or out-of-bounds rectangles; callers sample
    /// their coordinates from the image dimensions.
    pub fn crop_area(&self, c_x1: usize, c_y1: usize, c_x2: usize, c_y2: usize) -> Tensor<B, 3> {
        let [ch, image_height, image_width] = self.image.dims();

        if c_x2 <= c_x1 || c_y2 <= c_y1 {
            panic!(
                "Box size error x2 and y2 cannot be smaller or equal to x1 or y1: {c_x1},{c_y1},{c_x2},{c_y2}"
            );
        };

        if c_x2 >= image_width || c_y2 >= image_height {
            panic!(
                "Box size error x2 or y2 can not be larger than image dimensions: {c_x2},{c_y2},{image_width},{image_height}"
            );
        }

        let crop_width = c_x2 - c_x1;
        let crop_height = c_y2 - c_y1;

        // Mask with the crop area and location
        let mask = Tensor::<B, 3, Int>::ones([3, crop_height, crop_width], &self.device);
        let mask = mask.pad((c_x1, image_width - c_x2, c_y1, image_height - c_y2), 0);
        let mask = Tensor::cat(mask.flatten::<1>(0, 2).bool().nonzero(), 0);

        // Crop the image using the index of unmasked pixels
        let image = self.clone().image.flatten::<1>(0, 2);
        image.select(0, mask).reshape([ch, crop_height, crop_width])
    }

    /// Crops the image to the given rectangle and keeps boxes and labels
    /// consistent: boxes entirely outside the crop are removed together
    /// with their labels, boxes partially inside are clipped to the crop
    /// boundary, and all remaining coordinates are shifted into the crop's
    /// frame of reference.
    pub fn crop(&mut self, c_x1: usize, c_y1: usize, c_x2: usize, c_y2: usize) -> Self {
        let cropped = self.crop_area(c_x1, c_y1, c_x2, c_y2);

        if let Some(bboxes) = self.bboxes.clone() {
            let (x1, y1, x2, y2) = boxes_to_components(bboxes.clone());
            let (c_x1, c_x2, c_y1, c_y2) = (c_x1 as i32, c_x2 as i32, c_y1 as i32, c_y2 as i32);

            // Two rectangles overlap iff each starts before the other ends
            let mask = x1
                .clone()
                .lower_elem(c_x2)
                .bool_and(x2.clone().greater_elem(c_x1))
                .bool_and(y1.clone().lower_elem(c_y2))
                .bool_and(y2.clone().greater_elem(c_y1))
                .flatten::<1>(0, 1);

            let valid_index = Tensor::cat(mask.clone().nonzero(), 0);
            let valid_boxes = bboxes.clone().select(0, valid_index.clone());

            if let Some(labels) = self.labels.clone() {
                self.labels = Some(labels.clone().select(0, valid_index.clone()));
            }

            let (x1, y1, x2, y2) = boxes_to_components(valid_boxes);

            // Clip the surviving boxes to the crop rectangle, then shift
            // into the cropped image's coordinates

            let c_x1_t = Tensor::from_data([c_x1], &self.device);
            let (a, b) = broadcast!(x1: Tensor<B, 2>, c_x1_t: Tensor<1>);
            let i_x1 = a.max_pair(b);

            let c_y1_t = Tensor::from_data([c_y1], &self.device);
            let (a, b) = broadcast!(y1: Tensor<B, 2>, c_y1_t: Tensor<1>);
            let i_y1 = a.max_pair(b);

            let c_x2_t = Tensor::from_data([c_x2], &self.device);
            let (a, b) = broadcast!(x2: Tensor<B, 2>, c_x2_t: Tensor<1>);
            let i_x2 = a.min_pair(b);

            let c_y2_t = Tensor::from_data([c_y2], &self.device);
            let (a, b) = broadcast!(y2: Tensor<B, 2>, c_y2_t: Tensor<1>);
            let i_y2 = a.min_pair(b);

            let x1 = i_x1 - c_x1;
            let y1 = i_y1 - c_y1;
            let x2 = i_x2 - c_x1;
            let y2 = i_y2 - c_y1;

            self.bboxes = Some(Tensor::cat(vec![x1, y1, x2, y2], 1));
        }

        self.image = cropped;

        self.clone()
    }

    /// Random patch sampling constrained by IoU with the ground truth, the
    /// "zoom in" half of the SSD augmentation strategy.
    ///
    /// Up to 40 attempts: each samples a crop window and a minimum-IoU
    /// threshold from `[0.3, 0.5, 0.7, 0.9, 1.0]`, and the first window
    /// whose IoU with at least one ground truth box clears the threshold is
    /// applied via `crop`. When no attempt succeeds the sample is left
    /// unchanged.
    pub fn random_iou_crop(&mut self, p: f32) -> Self {
        if !self.should_apply(p) {
            return self.clone();
        }

        let [_ch, height, width] = self.image.dims();

        for _ in 0..40 {
            let thresholds = [0.3, 0.5, 0.7, 0.9, 1.0];
            let rdm_threshold = thresholds[self.rng.random_range(0..thresholds.len())];

            let x1 = self.rng.random_range(0..(width));
            let y1 = self.rng.random_range(0..(height));
            let x2 = self.rng.random_range((x1)..width);
            let y2 = self.rng.random_range((y1)..height);
            let rdm_box = Tensor::from_data(
                [[x1 as f32, y1 as f32, x2 as f32, y2 as f32]],
                &self.image.device(),
            );

            let iou = get_iou(rdm_box.clone(), self.bboxes.clone().unwrap());
            let threshold_mask = iou.clone().max_dim(0).greater_elem(rdm_threshold);

            if threshold_mask.int().sum().into_scalar().to_i32() > 0 {
                self.crop(x1, y1, x2, y2);
                break;
            }
        }

        self.clone()
    }
}
