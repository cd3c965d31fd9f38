use burn::tensor::{Int, Tensor, TensorData, backend::Backend};
use image::RgbImage;

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Maximum pixel value for a RGB8 pixel
pub const MAX_PIXEL_VAL: f32 = 255.0;

/// A pipeline for chained image transformations and augmentations.
///
/// `Transform` wraps an image tensor along with optional bounding boxes and
/// labels so a whole augmentation chain keeps the three in sync:
/// photometric adjustments leave the geometry alone, geometric ops
/// (flip, crop, zoom-out, resize) move the boxes with the pixels, and the
/// final normalization step converts both into the representation the
/// network trains on.
///
/// # Fields
///
/// * `image` – The 3-channel image tensor in `[C, H, W]` format, pixel
///   values 0–255 until `normalize` runs.
/// * `bboxes` – Optional `[N, 4]` boxes in `[x1, y1, x2, y2]` pixel format.
/// * `labels` – Optional `[N]` class labels for the boxes.
/// * `rng` – Random number generator driving the stochastic augmentations.
#[derive(Clone, Debug)]
pub struct Transform<B, R = StdRng>
where
    B: Backend,
    R: rand::Rng,
{
    pub image: Tensor<B, 3>,
    pub bboxes: Option<Tensor<B, 2>>,
    pub labels: Option<Tensor<B, 1, Int>>,
    pub device: <B as Backend>::Device,
    pub rng: R,
}

impl<B: Backend, R: rand::Rng> Transform<B, R> {
    /// Creates a pipeline with an explicitly provided random number
    /// generator, for reproducible augmentation in tests.
    pub fn new_seeded(
        image: Tensor<B, 3>,
        bboxes: Option<Tensor<B, 2>>,
        labels: Option<Tensor<B, 1, Int>>,
        rng: R,
    ) -> Self {
        let device = image.device().clone();
        Self {
            image,
            bboxes,
            rng,
            device,
            labels,
        }
    }
}

impl<B: Backend> Transform<B> {
    /// Creates a pipeline directly from already-built tensors.
    pub fn from_tensors(
        image: Tensor<B, 3>,
        bboxes: Option<Tensor<B, 2>>,
        labels: Option<Tensor<B, 1, Int>>,
    ) -> Self {
        let rng = StdRng::from_os_rng();
        let device = image.device().clone();
        Self {
            rng,
            image,
            bboxes,
            device,
            labels,
        }
    }

    /// Creates a pipeline from a decoded `RgbImage` plus optional boxes and
    /// labels, placing the image tensor on `device`.
    pub fn new(
        image: image::RgbImage,
        bboxes: Option<Tensor<B, 2>>,
        labels: Option<Tensor<B, 1, Int>>,
        device: &<B as Backend>::Device,
    ) -> Self {
        let rng = StdRng::from_os_rng();
        let image = Self::rgb_img_as_tensor(image, device);

        Self {
            rng,
            image,
            bboxes,
            device: device.clone(),
            labels,
        }
    }

    /// Returns `true` with probability `p` (clamped to [0, 1]).
    pub fn should_apply(&mut self, p: f32) -> bool {
        self.rng.random::<f32>() < p.clamp(0.0, 1.0)
    }

    /// Finalizes the chain and hands back the processed tensors:
    /// the `[3, H, W]` image, the optional `[N, 4]` boxes and the optional
    /// `[N]` labels.
    ///
    /// Returns `Err` only when an earlier step flagged the sample as
    /// unusable (see `clean_boxes`).
    #[allow(clippy::type_complexity)]
    pub fn finish(
        self,
    ) -> Result<
        (
            Tensor<B, 3>,
            Option<Tensor<B, 2>>,
            Option<Tensor<B, 1, Int>>,
        ),
        String,
    > {
        Ok((self.image, self.bboxes, self.labels))
    }

    /// Converts an `image::RgbImage` into a `[3, H, W]` float tensor.
    ///
    /// Pixel values stay in the 0–255 range; `normalize` applies the
    /// dataset mean subtraction later in the chain.
    pub fn rgb_img_as_tensor(image: image::RgbImage, device: &B::Device) -> Tensor<B, 3> {
        let img_vec = image.clone().into_raw().iter().map(|&p| p as f32).collect();
        Tensor::<B, 3>::from_data(
            TensorData::new(
                img_vec,
                [image.height() as usize, image.width() as usize, 3],
            )
            .convert::<B::FloatElem>(),
            device,
        )
        .permute([2, 0, 1])
    }
}

/// Converts a single `[x1, y1, x2, y2]` box into a `[1, 4]` tensor row.
pub fn bbox_as_tensor<B: Backend>(coords: [f32; 4], device: &B::Device) -> Tensor<B, 2> {
    Tensor::<B, 2>::from_data([coords], device)
}

/// Creates a solid-color RGB test image.
pub fn create_test_image(width: u32, height: u32, pattern: [u8; 3]) -> RgbImage {
    let mut img = RgbImage::new(width, height);
    let img_pattern: image::Rgb<u8> = image::Rgb(pattern);

    for px in img.pixels_mut() {
        *px = img_pattern;
    }

    img
}
