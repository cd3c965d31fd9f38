use burn::nn::loss::HuberLossConfig;
use burn::tensor::Tensor;
use burn::tensor::cast::ToElement;
use burn::tensor::s;

use crate::anchors::{
    encode_box_offsets, generate_all_default_boxes, get_overlapping_dflt_boxes,
    target_lbls_to_default_boxes,
};
use crate::config::VARIANCES;
use crate::data::{SSDBatch, strip_padding};

use burn::prelude::*;

/// Ratio of hard-mined background boxes to positive boxes.
const NEG_POS_RATIO: i32 = 3;

/// Weight of the localization term against the confidence term.
const ALPHA: f32 = 1.0;

/// IoU above which a default box is matched to a ground truth box.
const POS_IOU_THRESHOLD: f32 = 0.5;

/// Multi-class cross-entropy over integer class targets, no one-hot
/// encoding needed.
///
/// Log-softmax over the class dimension turns the logits into
/// log-probabilities; gathering at the target index and negating yields the
/// per-box negative log-likelihood.
///
/// # Arguments
/// * `logits` - `[num_boxes, num_classes]` raw scores.
/// * `targets` - `[num_boxes]` class ids in `[0, num_classes)`.
///
/// # Returns
/// `[num_boxes]` per-box loss, unreduced so the caller can hard-mine.
fn cross_entropy_loss<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    let [box_count] = targets.dims();

    let log_probabilities = burn::tensor::activation::log_softmax(logits, 1);
    let targets = targets.clone().reshape([box_count, 1]);

    let nll = log_probabilities.gather(1, targets) * -1;

    nll.reshape([box_count])
}

/// Computes the SSD training objective for a batch.
///
/// Per image: the default boxes are matched against the ground truth,
/// matched boxes get variance-encoded regression targets and a Huber
/// localization loss, every box gets a cross-entropy confidence loss, and
/// the background boxes are hard-negative-mined down to `NEG_POS_RATIO`
/// times the positive count before the two terms are combined:
///
///                 ⎛1⎞
/// L(x, c, l, g) = ⎜─⎟ ⋅ (Lconf(x, c) + α ⋅ Lloc(x, l, g))
///                 ⎝N⎠
///
/// with N the number of matched default boxes (loss is 0 when N = 0), per
/// the training objective of Liu et al. pg. 5. The per-image loss is then
/// scaled by the image's sample weight, which is how the boosting-style
/// reweighting of hard images enters training.
///
/// # Arguments
/// - `class_logits`: `[batch, num_boxes, num_classes]` confidence scores.
/// - `bbox_logits`: `[batch, num_boxes, 4]` predicted offsets.
/// - `layer_outputs`: the five fused feature maps, for anchor generation.
/// - `ssd_batch`: images, ground truth, padding info and sample weights.
///
/// # Returns
/// A tuple containing:
/// 1. `Tensor<B, 2>`: weighted loss per batch element, `[batch, 1]`.
/// 2. `Tensor<B, 2, Int>`: per-anchor class targets, `[batch, num_boxes]`.
pub fn calculate_loss<B: Backend>(
    class_logits: Tensor<B, 3>,
    bbox_logits: Tensor<B, 3>,
    layer_outputs: [Tensor<B, 4>; 5],
    ssd_batch: &SSDBatch<B>,
) -> (Tensor<B, 2>, Tensor<B, 2, Int>) {
    let device = &class_logits.device();

    // Default boxes are governed by the shape of the layer outputs
    let dflt_bxs = generate_all_default_boxes(layer_outputs);

    let gt_boxes = ssd_batch.gt_boxes.clone();

    let [batch_size, _, _] = gt_boxes.shape().dims();

    let mut loss_b = vec![];
    let mut class_targets_b = vec![];

    for i in 0..batch_size {
        let gt_boxes: Tensor<B, 2> = gt_boxes.clone().slice(i).squeeze(0);
        let target_labels = ssd_batch.target_labels.clone().slice(i).squeeze(0);
        let target_padding: Tensor<B, 1, Int> =
            ssd_batch.target_padding.clone().slice(i).squeeze(0);

        let dflt_bxs: Tensor<B, 2> = dflt_bxs.clone().slice(i).squeeze(0);
        let bbox_logits: Tensor<B, 2> = bbox_logits.clone().slice(i).squeeze(0);
        let class_logits: Tensor<B, 2> = class_logits.clone().slice(i).squeeze(0);

        // Strip the batch padding before matching
        let (target_labels, gt_boxes) = strip_padding(gt_boxes, target_labels, target_padding);

        let matching_dflt_boxes =
            get_overlapping_dflt_boxes(gt_boxes.clone(), dflt_bxs.clone(), POS_IOU_THRESHOLD);

        // Indexes of the matched (positive) default boxes

        let dflt_indexes = matching_dflt_boxes
            .clone()
            .add_scalar(1)
            .bool()
            .clone()
            .nonzero()[0]
            .clone();

        // Pair each positive default box with its ground truth box and
        // compute the offsets the regression head should have produced

        let gt_bx_matches = gt_boxes.clone().select(
            0,
            matching_dflt_boxes.clone().select(0, dflt_indexes.clone()),
        );

        let dflt_bx_matches = dflt_bxs.clone().select(0, dflt_indexes.clone());

        let box_trans = encode_box_offsets(gt_bx_matches, dflt_bx_matches, VARIANCES);

        let pred_boxes_trans: Tensor<B, 2> = bbox_logits.select(0, dflt_indexes.clone());

        // Localization: Huber (smooth L1) between predicted and target
        // offsets, positives only
        let pred_box_loss = HuberLossConfig::new(0.5)
            .init()
            .forward_no_reduction(pred_boxes_trans.clone(), box_trans.clone());

        // Confidence: per-anchor class targets (0 = background), then
        // cross entropy over every default box
        let cls_boxes =
            target_lbls_to_default_boxes(&matching_dflt_boxes, target_labels.clone(), dflt_bxs);

        let conf_loss = cross_entropy_loss(class_logits.clone(), cls_boxes.clone());

        // Hard negative mining - Liu et al. pg. 6. After matching, almost
        // all default boxes are background; keeping them all would swamp
        // the positives. Sort the background boxes by confidence loss and
        // keep the worst offenders at a NEG_POS_RATIO : 1 ratio.

        let fg_label_mask = cls_boxes.clone().greater_elem(0);

        let hard_neg_cnt_max =
            fg_label_mask.clone().int().sum().into_scalar().to_i32() * NEG_POS_RATIO;

        let fg_index_map = Tensor::cat(fg_label_mask.nonzero(), 0);

        // Sink the positive positions to -inf so the sort surfaces only
        // background boxes
        let hrd_neg_loss = conf_loss.clone().select_assign(
            0,
            fg_index_map.clone(),
            Tensor::full(fg_index_map.shape(), f32::NEG_INFINITY, device),
        );

        let (_vals, bg_index_map) = hrd_neg_loss.sort_descending_with_indices(0);
        let bg_index_map = bg_index_map.slice(0..hard_neg_cnt_max).clone();

        let n = dflt_indexes.shape().num_elements().to_i32();

        let loss = if n >= 1 {
            let lconf = conf_loss.clone().select(0, fg_index_map).sum()
                + conf_loss.select(0, bg_index_map.clone()).sum();

            let lloc = pred_box_loss.clone().sum();

            (lconf + ALPHA * lloc) / n
        } else {
            Tensor::zeros([1], device)
        };

        // Boosting-style per-image weight
        let weight = ssd_batch.sample_weights.clone().slice(s![i..i + 1]);
        let loss = loss * weight;

        loss_b.push(loss);
        class_targets_b.push(cls_boxes);
    }

    (Tensor::stack(loss_b, 0), Tensor::stack(class_targets_b, 0))
}
