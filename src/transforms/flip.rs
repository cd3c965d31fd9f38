use crate::{anchors::boxes_to_components, transforms::pipeline::Transform};
use burn::{prelude::Backend, tensor::Tensor};

impl<B: Backend> Transform<B> {
    /// Vertical flip (top ↔ bottom) applied with probability `p`.
    pub fn random_vertical_flip(&mut self, p: f32) -> Self {
        if !self.should_apply(p) {
            return self.clone();
        }

        self.vertical_flip()
    }

    /// Mirrors the image along the horizontal axis (top ↔ bottom) and
    /// reflects the bounding boxes to stay aligned with the moved pixels.
    pub fn vertical_flip(&mut self) -> Self {
        let [_ch, height, _width] = self.image.dims();

        self.image = self.image.clone().flip([1]);

        if let Some(bboxes) = self.bboxes.as_mut() {
            let (x1, y1, x2, y2) = boxes_to_components(bboxes.clone());

            // y1 and y2 swap roles when reflected so the box stays
            // top-left / bottom-right ordered
            let temp_y1 = y2.clone() + (height as f32 / 2.0 - y2) * 2.0;
            let temp_y2 = y1.clone() + (height as f32 / 2.0 - y1) * 2.0;

            self.bboxes = Some(Tensor::cat(vec![x1, temp_y1, x2, temp_y2], 1));
        }

        self.clone()
    }

    /// Mirrors the image along the vertical axis (left ↔ right) and
    /// reflects the bounding box `x` coordinates; `y` coordinates are
    /// untouched.
    pub fn horizontal_flip(&mut self) -> Self {
        let [_ch, _height, width] = self.image.dims();

        self.image = self.image.clone().flip([2]);

        if let Some(bboxes) = self.bboxes.as_mut() {
            let (x1, y1, x2, y2) = boxes_to_components(bboxes.clone());

            let temp_x1 = x2.clone() + (width as f32 / 2.0 - x2) * 2.0;
            let temp_x2 = x1.clone() + (width as f32 / 2.0 - x1) * 2.0;

            self.bboxes = Some(Tensor::cat(vec![temp_x1, y1, temp_x2, y2], 1));
        }

        self.clone()
    }

    /// Horizontal flip (left ↔ right) applied with probability `p`. The
    /// workhorse geometric augmentation of the SSD chain.
    pub fn random_horizontal_flip(&mut self, p: f32) -> Self {
        if !self.should_apply(p) {
            return self.clone();
        }
        self.horizontal_flip()
    }
}
