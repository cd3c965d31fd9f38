use crate::anchors::boxes_to_components;

use super::pipeline::Transform;
use burn::{prelude::Backend, tensor::Tensor};

impl<B: Backend> Transform<B> {
    /// Drops malformed bounding boxes and their labels.
    ///
    /// A box survives when `x2 > x1`, `y2 > y1`, it lies inside the image,
    /// and it covers at least one pixel. Augmentation chains can produce
    /// degenerate boxes (a crop may clip a box down to a sliver), and a
    /// degenerate box poisons the log-space regression targets.
    ///
    /// # Returns
    ///
    /// - `Ok(Self)` with only valid boxes remaining.
    /// - `Err(String)` when not a single box survives; the caller decides
    ///   whether to re-augment or drop the sample.
    pub fn clean_boxes(&mut self) -> Result<Self, String> {
        if let Some(bboxes) = self.bboxes.as_mut() {
            let (x1, y1, x2, y2) = boxes_to_components(bboxes.clone());
            let [_, image_height, image_width] = self.image.dims();

            // (x2 =< x1) || (y2 =< y1) || (x2 > image_width) || (y2 > image_height)

            let mask = x2
                .clone()
                .lower_equal(x1.clone())
                .bool_or(y2.clone().lower_equal(y1.clone()))
                .bool_or(x2.clone().greater_elem(image_width as f32))
                .bool_or(y2.clone().greater_elem(image_height as f32));

            let areas = (x2.clone() - x1.clone()) * (y2.clone() - y1.clone());
            let mask = mask.bool_or(areas.lower_elem(1.0));
            let valid_boxes = mask.bool_not().flatten::<1>(0, 1).nonzero();

            if valid_boxes.is_empty() {
                return Err("List contains no bounding boxes".into());
            }

            let valid_boxes = Tensor::cat(valid_boxes, 0);

            self.bboxes = Some(bboxes.clone().select(0, valid_boxes.clone()));
            self.labels = Some(self.labels.clone().unwrap().select(0, valid_boxes));
        }

        Ok(self.clone())
    }
}
