use crate::config::VGG_WEIGHTS_FILE;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2d;
use burn::nn::conv::Conv2dConfig;
use burn::nn::conv::ConvTranspose2d;
use burn::nn::conv::ConvTranspose2dConfig;
use burn::nn::pool::MaxPool2dConfig;

use crate::layers::FusionLayers;
use crate::models;
use crate::models::head::PredictionHead;

use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use models::vgg::VGG16;

/// SSD512 detector with top-down feature fusion.
///
/// The bottom-up path is the standard SSD recipe: VGG16 through conv5_3,
/// fc6/fc7 converted to a dilated conv6 and a 1×1 conv7 (à trous, Liu et
/// al. pg. 7), then two strided extra blocks (conv8, conv9). The top-down
/// path upsamples each deeper map with a stride-2 transposed convolution
/// and sums it with the matching bottom-up map, so the high-resolution
/// layers see deep semantics too. Detection runs on the five fused maps
/// listed in `FusionLayers`; the stride-4 map exists because most of the
/// animals in the underwater footage are only tens of pixels across.
#[derive(Module, Debug)]
pub struct SSD<B: Backend> {
    pub vgg16: VGG16<B>,
    conv_6: Conv2d<B>,
    conv_7: Conv2d<B>,
    conv8_1: Conv2d<B>,
    conv8_2: Conv2d<B>,
    conv9_1: Conv2d<B>,
    conv9_2: Conv2d<B>,
    upconv6_2: ConvTranspose2d<B>,
    upconv5_2: ConvTranspose2d<B>,
    upconv4_2: ConvTranspose2d<B>,
    upconv3_2: ConvTranspose2d<B>,
    pub ssd_pred_heads: Vec<PredictionHead<B>>,
    cls_cnt: usize,
}

impl<B: Backend> SSD<B> {
    pub fn new(device: &B::Device, record: Option<SSDRecord<B>>, cls_cnt: usize) -> Self {
        let vgg_mod: VGG16<B> = match record {
            Some(_) => VGG16::new_vgg_ssd(device),
            None => {
                log::info!(
                    "Training a new model, loading pre-trained VGG16 weights from {}",
                    VGG_WEIGHTS_FILE
                );
                VGG16::from_file(VGG_WEIGHTS_FILE, device)
            }
        };

        let ssd = Self::init(device, vgg_mod, cls_cnt);

        match record {
            Some(record) => {
                log::info!("Loading pretrained SSD model weights...");
                ssd.load_record(record)
            }
            None => ssd,
        }
    }

    /// Builds the module graph around an already-constructed backbone.
    pub fn init(device: &B::Device, mut vgg_mod: VGG16<B>, cls_cnt: usize) -> Self {
        // Pool5 becomes 3x3 stride 1 so conv6 keeps the 32x32 resolution
        vgg_mod.maxpool2d5 = MaxPool2dConfig::new([3, 3])
            .with_strides([1, 1])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        // 32x32 - conv6: 3x3x1024 dilated, replaces fc6
        let conv_6 = Conv2dConfig::new([512, 1024], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(2, 2))
            .with_dilation([2, 2])
            .init(device);

        // 32x32 - conv7: 1x1x1024, replaces fc7
        let conv_7: Conv2d<B> = Conv2dConfig::new([1024, 1024], [1, 1]).init(device);

        // 32x32 => 16x16 - conv8_1: 1x1x256 / conv8_2: 3x3x512-s2
        let conv8_1: Conv2d<B> = Conv2dConfig::new([1024, 256], [1, 1]).init(device);
        let conv8_2: Conv2d<B> = Conv2dConfig::new([256, 512], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_stride([2, 2])
            .init(device);

        // 16x16 => 8x8 - conv9_1: 1x1x128 / conv9_2: 3x3x256-s2
        let conv9_1: Conv2d<B> = Conv2dConfig::new([512, 128], [1, 1]).init(device);
        let conv9_2: Conv2d<B> = Conv2dConfig::new([128, 256], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_stride([2, 2])
            .init(device);

        // Top-down path: each transposed convolution doubles the spatial
        // size and matches the channel depth of the bottom-up map it is
        // summed with
        let upconv6_2 = ConvTranspose2dConfig::new([256, 512], [2, 2])
            .with_stride([2, 2])
            .init(device);
        let upconv5_2 = ConvTranspose2dConfig::new([512, 1024], [2, 2])
            .with_stride([2, 2])
            .init(device);
        let upconv4_2 = ConvTranspose2dConfig::new([1024, 512], [2, 2])
            .with_stride([2, 2])
            .init(device);
        let upconv3_2 = ConvTranspose2dConfig::new([512, 256], [2, 2])
            .with_stride([2, 2])
            .init(device);

        // One prediction head per fused map:
        // deconv3_2, deconv4_2, deconv5_2, deconv6_2, conv9_2

        let mut ssd_pred_heads = Vec::new();

        for conv_layer in FusionLayers::as_list().iter() {
            ssd_pred_heads.push(PredictionHead::new(device, conv_layer, cls_cnt));
        }

        SSD {
            vgg16: vgg_mod,
            conv_6,
            conv_7,
            conv8_1,
            conv8_2,
            conv9_1,
            conv9_2,
            upconv6_2,
            upconv5_2,
            upconv4_2,
            upconv3_2,
            ssd_pred_heads,
            cls_cnt,
        }
    }

    /// Performs a forward pass through the backbone, extra layers, fusion
    /// path and prediction heads.
    ///
    /// # Parameters
    /// - `input`: `[B, 3, H, W]` image batch; `H` and `W` must be
    ///   divisible by 64 (512 in training).
    ///
    /// # Returns
    /// A tuple containing:
    /// 1. **Class predictions** — `Tensor<B, 3>` `(B, num_boxes, num_classes)`,
    ///    classification logits concatenated over all five heads.
    /// 2. **Box predictions** — `Tensor<B, 3>` `(B, num_boxes, 4)`,
    ///    regression offsets per default box.
    /// 3. **Feature maps** — `[Tensor<B, 4>; 5]`, the fused maps in
    ///    `FusionLayers` order; the anchor generator reads its grid sizes
    ///    from these.
    ///
    /// At 512×512 input `num_boxes` is 98 176: four default boxes per cell
    /// on the 128×128 map and six on each of the other four maps.
    pub fn forward(&self, input: Tensor<B, 4>) -> (Tensor<B, 3>, Tensor<B, 3>, [Tensor<B, 4>; 5]) {
        let (conv3_3_out, conv4_3_out, conv5_3_out) = self.vgg16.partial_forward(input);

        // Dilated conv6 / conv7 - 32x32
        let pool5_out = self.vgg16.maxpool2d5.forward(conv5_3_out);
        let conv_6_out = self.conv_6.forward(pool5_out);
        let relu_6_out = burn::tensor::activation::relu(conv_6_out);
        let conv_7_out = self.conv_7.forward(relu_6_out);
        let conv_7_32x32_out = burn::tensor::activation::relu(conv_7_out);

        // Extra block 8 - 16x16
        let conv_8_1_out = self.conv8_1.forward(conv_7_32x32_out.clone());
        let relu_8_1_out = burn::tensor::activation::relu(conv_8_1_out);
        let conv_8_2_out = self.conv8_2.forward(relu_8_1_out);
        let conv_8_2_16x16_out = burn::tensor::activation::relu(conv_8_2_out);

        // Extra block 9 - 8x8
        let conv_9_1_out = self.conv9_1.forward(conv_8_2_16x16_out.clone());
        let relu_9_1_out = burn::tensor::activation::relu(conv_9_1_out);
        let conv_9_2_out = self.conv9_2.forward(relu_9_1_out);
        let conv_9_2_8x8_out = burn::tensor::activation::relu(conv_9_2_out);

        // Top-down fusion: upsample the deeper map and sum with the
        // bottom-up map of the same resolution

        let deconv_6_2_out = burn::tensor::activation::relu(
            self.upconv6_2.forward(conv_9_2_8x8_out.clone()) + conv_8_2_16x16_out,
        );

        let deconv_5_2_out = burn::tensor::activation::relu(
            self.upconv5_2.forward(deconv_6_2_out.clone()) + conv_7_32x32_out,
        );

        let deconv_4_2_out = burn::tensor::activation::relu(
            self.upconv4_2.forward(deconv_5_2_out.clone()) + conv4_3_out,
        );

        let deconv_3_2_out = burn::tensor::activation::relu(
            self.upconv3_2.forward(deconv_4_2_out.clone()) + conv3_3_out,
        );

        let outputs = [
            deconv_3_2_out,
            deconv_4_2_out,
            deconv_5_2_out,
            deconv_6_2_out,
            conv_9_2_8x8_out,
        ];

        let mut class_predictors = vec![];
        let mut box_predictors = vec![];

        for (i, conv_out) in outputs.iter().enumerate() {
            let box_pred = self.ssd_pred_heads[i].conv_bbox.forward(conv_out.clone());
            let class_pred = self.ssd_pred_heads[i]
                .conv_classifier
                .forward(conv_out.clone());

            let [batch_size, _, height, width] = class_pred.shape().dims();

            // B = Batch Size
            // A = Anchor Boxes per cell
            // H = Feature Height
            // W = Feature Width
            // N = Number Of Classes
            //
            // (B, A * N, H, W) -> (B, H, W, A, N) -> (B, H*W*A, N)
            //
            // so the per-box class logits line up with the order the anchor
            // generator tiles the default boxes in

            let class_pred = class_pred.reshape([
                batch_size as i32,
                -1,
                self.cls_cnt as i32,
                height as i32,
                width as i32,
            ]);

            let class_pred = class_pred.permute([0, 3, 4, 1, 2]);
            let class_pred = class_pred.reshape([batch_size as i32, -1, self.cls_cnt as i32]);

            class_predictors.push(class_pred);

            // (B, A * 4, H, W) -> (B, H, W, A, 4) -> (B, H*W*A, 4)

            let box_pred = box_pred.reshape([
                batch_size as i32,
                -1,
                4, // 4 coordinates
                height as i32,
                width as i32,
            ]);

            let box_pred = box_pred.permute([0, 3, 4, 1, 2]);
            let box_pred = box_pred.reshape([batch_size as i32, -1, 4]);

            box_predictors.push(box_pred);
        }

        // Shape { dims: [B, 98176, cls_cnt] }
        let class_predictors = Tensor::cat(class_predictors, 1);

        // Shape { dims: [B, 98176, 4] }
        let box_predictions = Tensor::cat(box_predictors, 1);

        (class_predictors, box_predictions, outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::generate_all_default_boxes;
    use burn::backend::{NdArray, ndarray::NdArrayDevice};

    #[test]
    fn ssd_forward_shapes_line_up_with_anchors() {
        let device = &NdArrayDevice::default();
        type B = NdArray<f32>;

        let ssd_model: SSD<B> = SSD::init(device, VGG16::new_vgg_ssd(device), 4);

        // 64x64 keeps the CPU test fast; every stride divides evenly so
        // the fusion sums line up exactly as they do at 512
        let t = Tensor::<B, 4>::ones([1, 3, 64, 64], device);
        let (class_preds, box_preds, outputs) = ssd_model.forward(t);

        assert_eq!(outputs[0].dims(), [1, 256, 16, 16]);
        assert_eq!(outputs[1].dims(), [1, 512, 8, 8]);
        assert_eq!(outputs[2].dims(), [1, 1024, 4, 4]);
        assert_eq!(outputs[3].dims(), [1, 512, 2, 2]);
        assert_eq!(outputs[4].dims(), [1, 256, 1, 1]);

        // 4*16^2 + 6*(8^2 + 4^2 + 2^2 + 1) = 1534 boxes
        assert_eq!(class_preds.dims(), [1, 1534, 4]);
        assert_eq!(box_preds.dims(), [1, 1534, 4]);

        // One default box per prediction row
        let dflt = generate_all_default_boxes(outputs);
        assert_eq!(dflt.dims(), [1, 1534, 4]);
    }
}
