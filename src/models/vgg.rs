use crate::config::VGG_WEIGHTS_FILE;
use burn::nn::Dropout;
use burn::nn::Linear;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2d;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::MaxPool2d;
use burn::nn::pool::MaxPool2dConfig;
use burn::record::FullPrecisionSettings;
use burn::record::Recorder;
use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

/// VGG-16 type D backbone, truncated for detection.
///
/// “Very Deep Convolutional Networks for Large-Scale Image Recognition”
/// Authors: Karen Simonyan, Andrew Zisserman
/// Link (official): https://arxiv.org/abs/1409.1556
///
/// The detector keeps the thirteen convolutional layers and drops the
/// fully-connected head (fc6 and fc7 are replaced by dilated convolutions
/// in the SSD module, fc8 is removed entirely, per Liu et al. pg. 7). The
/// fully-connected fields stay in the record as `Option`s so the converted
/// pretrained weights file loads without renaming.
///
/// Feature maps exposed for detection at 512×512 input:
///
///   conv3_3  256 × 128 × 128   (stride 4)
///   conv4_3  512 ×  64 ×  64   (stride 8)
///   conv5_3  512 ×  32 ×  32   (stride 16)
#[derive(Module, Debug)]
pub struct VGG16<B: Backend> {
    conv2d1: Conv2d<B>,
    conv2d2: Conv2d<B>,
    maxpool2d1: MaxPool2d,

    conv2d3: Conv2d<B>,
    conv2d4: Conv2d<B>,
    maxpool2d2: MaxPool2d,

    conv2d5: Conv2d<B>,
    conv2d6: Conv2d<B>,
    conv2d7: Conv2d<B>,
    maxpool2d3: MaxPool2d,

    conv2d8: Conv2d<B>,
    conv2d9: Conv2d<B>,
    conv2d10: Conv2d<B>,
    maxpool2d4: MaxPool2d,

    conv2d11: Conv2d<B>,
    conv2d12: Conv2d<B>,
    conv2d13: Conv2d<B>,
    pub maxpool2d5: MaxPool2d,

    gemm1: Option<Linear<B>>,
    dropout1: Option<Dropout>,
    gemm2: Option<Linear<B>>,
    dropout2: Option<Dropout>,
    gemm3: Option<Linear<B>>,
}

impl<B: Backend> Default for VGG16<B> {
    fn default() -> Self {
        Self::from_file(VGG_WEIGHTS_FILE, &Default::default())
    }
}

impl<B: Backend> VGG16<B> {
    pub fn from_file(file: &str, device: &B::Device) -> Self {
        let record = burn::record::NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(file.into(), device)
            .expect("Couldn't find the converted VGG16 weights file, please execute the ./scripts/get_models.sh script and try again.");
        Self::new_vgg_ssd(device).load_record(record)
    }

    pub fn new_vgg_ssd(device: &B::Device) -> Self {
        // 64 out 3x3 (x2) conv1 block
        let conv1_1 = Conv2dConfig::new([3, 64], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv1_2 = Conv2dConfig::new([64, 64], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let maxpool2d1 = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        // out -> 128 3x3 (x2) conv2 block
        let conv2_1 = Conv2dConfig::new([64, 128], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv2_2 = Conv2dConfig::new([128, 128], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let maxpool2d2 = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        // out -> 256 3x3 (x3) conv3 block, conv3_3 feeds the stride-4 head
        let conv3_1 = Conv2dConfig::new([128, 256], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv3_2 = Conv2dConfig::new([256, 256], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv3_3 = Conv2dConfig::new([256, 256], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let maxpool2d3 = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        // out -> 512 3x3 (x3) conv4 block
        let conv4_1 = Conv2dConfig::new([256, 512], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv4_2 = Conv2dConfig::new([512, 512], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv4_3 = Conv2dConfig::new([512, 512], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let maxpool2d4 = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        // out -> 512 3x3 (x3) conv5 block
        let conv5_1 = Conv2dConfig::new([512, 512], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv5_2 = Conv2dConfig::new([512, 512], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv5_3 = Conv2dConfig::new([512, 512], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        // Pool5 is reconfigured by the SSD module (3x3, stride 1) so the
        // dilated conv6 keeps the 32x32 resolution
        let maxpool2d5 = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        // The fully-connected head is not constructed; fc6/fc7 become
        // convolutions in the SSD module and fc8 is removed
        Self {
            conv2d1: conv1_1,
            conv2d2: conv1_2,
            maxpool2d1,
            conv2d3: conv2_1,
            conv2d4: conv2_2,
            maxpool2d2,
            conv2d5: conv3_1,
            conv2d6: conv3_2,
            conv2d7: conv3_3,
            maxpool2d3,
            conv2d8: conv4_1,
            conv2d9: conv4_2,
            conv2d10: conv4_3,
            maxpool2d4,
            conv2d11: conv5_1,
            conv2d12: conv5_2,
            conv2d13: conv5_3,
            maxpool2d5,
            gemm1: None,
            dropout1: None,
            gemm2: None,
            dropout2: None,
            gemm3: None,
        }
    }

    /// Runs the convolutional blocks and returns the three feature maps the
    /// detector taps: `(conv3_3, conv4_3, conv5_3)`.
    pub fn partial_forward(
        &self,
        input: Tensor<B, 4>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>) {
        // Convolutional block 1
        let conv1_1_out = self.conv2d1.forward(input);
        let relu1_1_out = burn::tensor::activation::relu(conv1_1_out);
        let conv1_2_out = self.conv2d2.forward(relu1_1_out);
        let relu1_2_out = burn::tensor::activation::relu(conv1_2_out);

        let maxpool_1_out = self.maxpool2d1.forward(relu1_2_out); // 256x256

        // Convolutional block 2
        let conv2_1_out = self.conv2d3.forward(maxpool_1_out);
        let relu2_1_out = burn::tensor::activation::relu(conv2_1_out);
        let conv2_2_out = self.conv2d4.forward(relu2_1_out);
        let relu2_2_out = burn::tensor::activation::relu(conv2_2_out);

        let maxpool_2_out = self.maxpool2d2.forward(relu2_2_out); // 128x128

        // Convolutional block 3
        let conv3_1_out = self.conv2d5.forward(maxpool_2_out);
        let relu3_1_out = burn::tensor::activation::relu(conv3_1_out);
        let conv3_2_out = self.conv2d6.forward(relu3_1_out);
        let relu3_2_out = burn::tensor::activation::relu(conv3_2_out);
        let conv3_3_out = self.conv2d7.forward(relu3_2_out);
        let conv3_3_out = burn::tensor::activation::relu(conv3_3_out);

        let maxpool_3_out = self.maxpool2d3.forward(conv3_3_out.clone()); // 64x64

        // Convolutional block 4
        let conv4_1_out = self.conv2d8.forward(maxpool_3_out);
        let relu4_1_out = burn::tensor::activation::relu(conv4_1_out);
        let conv4_2_out = self.conv2d9.forward(relu4_1_out);
        let relu4_2_out = burn::tensor::activation::relu(conv4_2_out);
        let conv4_3_out = self.conv2d10.forward(relu4_2_out);
        let conv4_3_out = burn::tensor::activation::relu(conv4_3_out);

        let maxpool_4_out = self.maxpool2d4.forward(conv4_3_out.clone()); // 32x32

        // Convolutional block 5
        let conv5_1_out = self.conv2d11.forward(maxpool_4_out);
        let relu5_1_out = burn::tensor::activation::relu(conv5_1_out);
        let conv5_2_out = self.conv2d12.forward(relu5_1_out);
        let relu5_2_out = burn::tensor::activation::relu(conv5_2_out);
        let conv5_3_out = self.conv2d13.forward(relu5_2_out);
        let conv5_3_out = burn::tensor::activation::relu(conv5_3_out);

        (conv3_3_out, conv4_3_out, conv5_3_out)
    }
}
