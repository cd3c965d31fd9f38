use crate::anchors::boxes_to_components;
use crate::config::MEAN_COLOR;

use super::pipeline::Transform;
use burn::{
    prelude::Backend,
    tensor::{Device, Tensor},
};

/// Input normalization matching the converted pretrained backbone: the
/// per-channel dataset mean is subtracted and the channels are reordered
/// RGB → BGR. Pixel values keep their 0–255 scale; the Caffe-lineage VGG
/// weights were trained that way, not on 0–1 inputs.
#[derive(Clone)]
pub struct MeanColorNormalizer<B: Backend> {
    pub mean: Tensor<B, 3>,
}

impl<B: Backend> MeanColorNormalizer<B> {
    /// Creates a new normalizer with the dataset mean color.
    pub fn new(device: &Device<B>) -> Self {
        let mean = Tensor::<B, 1>::from_floats(MEAN_COLOR, device).reshape([3, 1, 1]);
        Self { mean }
    }

    /// Subtracts the mean and flips the channel dimension to BGR.
    pub fn normalize(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        (input - self.mean.clone()).flip([0])
    }
}

impl<B: Backend> Transform<B> {
    /// Normalizes the sample for the network:
    ///
    /// 1. **Bounding boxes** – converted from pixel coordinates to the
    ///    `[0, 1]` range the default boxes live in.
    /// 2. **Image** – per-channel mean subtraction and RGB → BGR reorder
    ///    via [`MeanColorNormalizer`].
    ///
    /// This is the last step of both the training and the validation
    /// chain.
    pub fn normalize(&mut self) -> Self {
        let [_ch, height, width] = self.image.dims();

        if let Some(bboxes) = self.bboxes.as_mut() {
            let (x1, y1, x2, y2) = boxes_to_components(bboxes.clone());
            let x1 = x1 / width as f32;
            let y1 = y1 / height as f32;
            let x2 = x2 / width as f32;
            let y2 = y2 / height as f32;

            let normalized_bboxes = Tensor::cat(vec![x1, y1, x2, y2], 1);

            self.bboxes = Some(normalized_bboxes);
        }

        self.image = MeanColorNormalizer::new(&self.device).normalize(self.image.clone());

        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::pipeline::{bbox_as_tensor, create_test_image};
    use burn::backend::{NdArray, ndarray::NdArrayDevice};

    #[test]
    fn normalize_subtracts_mean_and_swaps_to_bgr() {
        let device = &NdArrayDevice::default();
        type B = NdArray<f32>;

        let image = create_test_image(4, 4, [127, 128, 255]);
        let image_t = Transform::<B>::rgb_img_as_tensor(image, device);

        let (out, _, _) = Transform::from_tensors(image_t, None, None)
            .normalize()
            .finish()
            .unwrap();

        let means = out.mean_dim(1).mean_dim(2).reshape([3]);

        // RGB (127, 128, 255) minus (123, 117, 104) is (4, 11, 151);
        // after the BGR reorder the blue channel comes first
        Tensor::<B, 1>::from_data([151.0, 11.0, 4.0], device)
            .into_data()
            .assert_eq(&means.to_data(), false);
    }

    #[test]
    fn normalize_scales_boxes_to_unit_range() {
        let device = &NdArrayDevice::default();
        type B = NdArray<f32>;

        let image = create_test_image(100, 50, [0, 0, 0]);
        let image_t = Transform::<B>::rgb_img_as_tensor(image, device);
        let bboxes = bbox_as_tensor::<B>([10.0, 10.0, 60.0, 35.0], device);

        let (_, bboxes, _) = Transform::from_tensors(image_t, Some(bboxes), None)
            .normalize()
            .finish()
            .unwrap();

        Tensor::<B, 2>::from_data([[0.1, 0.2, 0.6, 0.7]], device)
            .into_data()
            .assert_eq(&bboxes.unwrap().to_data(), false);
    }
}
