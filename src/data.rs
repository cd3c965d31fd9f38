use burn::data::dataloader::batcher::Batcher;
use burn::tensor::cast::ToElement;
use burn::tensor::{Int, Tensor, TensorData, backend::Backend, s};

use crate::config::{HEIGHT, MEAN_COLOR, WIDTH};
use crate::dataset::VocSample;
use crate::transforms::pipeline::Transform;
use crate::transforms::zoom_out::RandomZoomOut;

/// Whether a batch is headed for the optimizer or for validation.
///
/// Training batches run the full SSD augmentation chain; validation
/// batches are only resized and normalized, so the validation loss is
/// comparable across epochs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BatchType {
    Train,
    Valid,
}

/// One batch of images with their ground truth.
///
/// Ground truth boxes are `[0, 1]`-normalized xyxy, padded with zero rows
/// to the largest box count in the batch; `target_padding` records how many
/// trailing rows of each image are padding so the loss can strip them
/// again. `sample_weights` carries the per-image boosting weights (1.0
/// everywhere when the dataset has none).
#[derive(Clone, Debug)]
pub struct SSDBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub gt_boxes: Tensor<B, 3>,
    pub target_labels: Tensor<B, 2, Int>,
    pub target_padding: Tensor<B, 2, Int>,
    pub sample_weights: Tensor<B, 1>,
    pub batch_ids: Vec<String>,
}

#[derive(Clone)]
pub struct SSDBatcher {
    batch_type: BatchType,
}

impl SSDBatcher {
    pub fn new(batch_type: BatchType) -> Self {
        SSDBatcher { batch_type }
    }
}

/// Removes the `target_padding` trailing rows the batcher appended, giving
/// back the image's real labels and boxes.
pub fn strip_padding<B: Backend>(
    gt_boxes: Tensor<B, 2>,
    target_labels: Tensor<B, 1, Int>,
    target_padding: Tensor<B, 1, Int>,
) -> (Tensor<B, 1, Int>, Tensor<B, 2>) {
    let pad = target_padding.into_scalar().to_usize();
    let [count, _] = gt_boxes.dims();
    let keep = count - pad;

    (
        target_labels.slice(s![0..keep]),
        gt_boxes.slice(s![0..keep, ..]),
    )
}

/// Runs one decoded sample through the augmentation (or validation)
/// pipeline, returning the network-ready image and its normalized boxes
/// and labels.
fn process_sample<B: Backend>(
    batch_type: BatchType,
    image: image::RgbImage,
    bboxes: Tensor<B, 2>,
    labels: Tensor<B, 1, Int>,
    device: &B::Device,
) -> (Tensor<B, 3>, Tensor<B, 2>, Tensor<B, 1, Int>) {
    let base = Transform::new(image, Some(bboxes), Some(labels), device);

    let augmented = match batch_type {
        BatchType::Train => base
            .clone()
            .random_photometric_distort((-0.125, 0.125), (-0.5, 0.5), (-0.1, 0.1), 0.5)
            .random_zoom_out(MEAN_COLOR, (1.0, 4.0), 0.5)
            .random_iou_crop(0.5)
            .random_horizontal_flip(0.5)
            .resize_bilinear(WIDTH, HEIGHT)
            .clean_boxes(),
        BatchType::Valid => base.clone().resize_bilinear(WIDTH, HEIGHT).clean_boxes(),
    };

    let (image, bboxes, labels) = match augmented {
        Ok(mut t) => t.normalize().finish().unwrap(),
        // The sampled augmentations clipped away every box; fall back to
        // the plain resized frame rather than emit an empty target set
        Err(_) => base
            .clone()
            .resize_bilinear(WIDTH, HEIGHT)
            .normalize()
            .finish()
            .unwrap(),
    };

    (image, bboxes.unwrap(), labels.unwrap())
}

impl<B: Backend> Batcher<B, VocSample, SSDBatch<B>> for SSDBatcher {
    fn batch(&self, items: Vec<VocSample>, device: &B::Device) -> SSDBatch<B> {
        let mut images = vec![];
        let mut gt_boxes = vec![];
        let mut target_labels = vec![];
        let mut weights = vec![];
        let mut batch_ids = vec![];

        for item in items {
            let image = image::open(&item.image_path)
                .unwrap_or_else(|_| panic!("Couldn't open image {}", item.image_path.display()))
                .to_rgb8();

            let flat: Vec<f32> = item.boxes.iter().flatten().copied().collect();
            let bboxes = Tensor::<B, 2>::from_data(
                TensorData::new(flat, [item.boxes.len(), 4]).convert::<B::FloatElem>(),
                device,
            );

            let labels: Vec<i32> = item.labels.iter().map(|&l| l as i32).collect();
            let labels = Tensor::<B, 1, Int>::from_data(labels.as_slice(), device);

            let (image, bboxes, labels) =
                process_sample(self.batch_type, image, bboxes, labels, device);

            images.push(image);
            gt_boxes.push(bboxes);
            target_labels.push(labels);
            weights.push(item.weight);
            batch_ids.push(item.id);
        }

        // Pad every image's targets to the widest box count in the batch
        // so they stack into one rectangular tensor

        let max_boxes = gt_boxes
            .iter()
            .map(|b| b.dims()[0])
            .max()
            .expect("batch must not be empty");

        let mut target_padding = vec![];

        for (boxes, labels) in gt_boxes.iter_mut().zip(target_labels.iter_mut()) {
            let pad = max_boxes - boxes.dims()[0];

            if pad > 0 {
                *boxes = Tensor::cat(
                    vec![boxes.clone(), Tensor::zeros([pad, 4], device)],
                    0,
                );
                *labels = Tensor::cat(
                    vec![labels.clone(), Tensor::zeros([pad], device)],
                    0,
                );
            }

            target_padding.push(Tensor::<B, 1, Int>::from_data([pad as i32], device));
        }

        SSDBatch {
            images: Tensor::stack(images, 0),
            gt_boxes: Tensor::stack(gt_boxes, 0),
            target_labels: Tensor::stack(target_labels, 0),
            target_padding: Tensor::stack(target_padding, 0),
            sample_weights: Tensor::<B, 1>::from_data(weights.as_slice(), device),
            batch_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::ClassMap;
    use burn::backend::{NdArray, ndarray::NdArrayDevice};
    use std::path::PathBuf;

    type B = NdArray<f32>;

    #[test]
    fn strip_padding_removes_trailing_rows() {
        let device = &NdArrayDevice::default();

        let gt_boxes = Tensor::<B, 2>::from_data(
            [
                [0.1, 0.1, 0.4, 0.4],
                [0.5, 0.5, 0.9, 0.9],
                [0.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0, 0.0],
            ],
            device,
        );
        let labels = Tensor::<B, 1, Int>::from_data([2, 3, 0, 0], device);
        let padding = Tensor::<B, 1, Int>::from_data([2], device);

        let (labels, boxes) = strip_padding(gt_boxes, labels, padding);

        assert_eq!(boxes.dims(), [2, 4]);
        Tensor::<B, 1, Int>::from_data([2, 3], device)
            .into_data()
            .assert_eq(&labels.to_data(), true);
    }

    fn write_test_image(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("seadet-batcher-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        crate::transforms::pipeline::create_test_image(16, 16, [120, 130, 140])
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn valid_batch_pads_and_normalizes() {
        let device = &NdArrayDevice::default();
        let classes = ClassMap::new();

        let a = VocSample {
            id: "000001".into(),
            image_path: write_test_image("a.png"),
            boxes: vec![[4.0, 4.0, 12.0, 12.0]],
            labels: vec![classes.name_to_id("seaurchin").unwrap()],
            weight: 1.0,
        };

        let b = VocSample {
            id: "000002".into(),
            image_path: write_test_image("b.png"),
            boxes: vec![
                [0.0, 0.0, 8.0, 8.0],
                [8.0, 8.0, 16.0, 16.0],
                [2.0, 2.0, 14.0, 14.0],
            ],
            labels: vec![1, 2, 3],
            weight: 0.5,
        };

        let batcher = SSDBatcher::new(BatchType::Valid);
        let batch: SSDBatch<B> = batcher.batch(vec![a, b], device);

        assert_eq!(batch.images.dims(), [2, 3, 512, 512]);
        assert_eq!(batch.gt_boxes.dims(), [2, 3, 4]);
        assert_eq!(batch.target_labels.dims(), [2, 3]);
        assert_eq!(batch.batch_ids, vec!["000001", "000002"]);

        // First sample carries two rows of padding, second none
        Tensor::<B, 2, Int>::from_data([[2], [0]], device)
            .into_data()
            .assert_eq(&batch.target_padding.to_data(), true);

        Tensor::<B, 1>::from_data([1.0, 0.5], device)
            .into_data()
            .assert_eq(&batch.sample_weights.to_data(), false);

        // The 16px box scales with the resize and ends up unit-normalized:
        // [4, 4, 12, 12] * 32 / 512 = [0.25, 0.25, 0.75, 0.75]
        let first = batch.gt_boxes.slice(s![0..1, 0..1, ..]).reshape([4]);
        let first = first.to_data().to_vec::<f32>().unwrap();
        for (got, want) in first.iter().zip([0.25, 0.25, 0.75, 0.75]) {
            assert!((got - want).abs() < 1e-6);
        }
    }
}
