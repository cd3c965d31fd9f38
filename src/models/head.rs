use burn::nn::PaddingConfig2d;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::{module::Module, tensor::backend::Backend};

use crate::anchors::get_box_count_for_layer;
use crate::layers::FusionLayers;

/// Per-layer prediction head.
///
/// Each fused feature map gets a pair of 3×3 convolutions: one producing
/// `boxes_per_cell * num_classes` classification logits and one producing
/// `boxes_per_cell * 4` box regression offsets at every spatial location.
#[derive(Module, Debug)]
pub struct PredictionHead<B: Backend> {
    pub conv_classifier: Conv2d<B>,
    pub conv_bbox: Conv2d<B>,
}

impl<B: Backend> PredictionHead<B> {
    pub fn new(device: &B::Device, layer: &FusionLayers, cls_cnt: usize) -> Self {
        let boxes = get_box_count_for_layer(layer);
        let depth = layer.output_size();

        let conv_classifier = Conv2dConfig::new([depth, boxes * cls_cnt], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let conv_bbox = Conv2dConfig::new([depth, boxes * 4], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        PredictionHead {
            conv_classifier,
            conv_bbox,
        }
    }
}
