use crate::{broadcast, check_nan, layers::FusionLayers};

use burn::{
    prelude::Backend,
    tensor::{Int, Tensor, s},
};

/// Default box scales per prediction layer, as a fraction of the input
/// image side. Entry `k` is the scale of layer id `k+1`; the final entry
/// only feeds the extra aspect-ratio-1 box of the deepest layer.
///
/// The paper spaces scales regularly between 0.2 and 0.9. Sea cucumbers,
/// urchins and scallops are small relative to the frame, so the table is
/// shifted down aggressively and starts at 0.04 (about 20 pixels at 512).
pub const SCALES: [f32; 6] = [0.04, 0.07, 0.15, 0.3, 0.45, 0.6];

/// Aspect ratios for the default boxes of a given prediction layer.
///
/// The stride-4 layer carries the reduced set; everything below it uses the
/// full set, as in Fig. 2 of “SSD: Single Shot MultiBox Detector”
/// (Liu et al., https://arxiv.org/abs/1512.02325).
pub fn ar(layer: &FusionLayers) -> Vec<f32> {
    match layer {
        FusionLayers::Deconv3_2 => vec![1., 2., 1.0 / 2.0],
        FusionLayers::Deconv4_2 => vec![1., 2., 1.0 / 2.0, 3., 1.0 / 3.0],
        FusionLayers::Deconv5_2 => vec![1., 2., 1.0 / 2.0, 3., 1.0 / 3.0],
        FusionLayers::Deconv6_2 => vec![1., 2., 1.0 / 2.0, 3., 1.0 / 3.0],
        FusionLayers::Conv9_2 => vec![1., 2., 1.0 / 2.0, 3., 1.0 / 3.0],
    }
}

/// Number of default boxes generated at each cell of the given layer:
/// one per configured aspect ratio plus the extra aspect-ratio-1 box at
/// the intermediate scale.
pub fn get_box_count_for_layer(conv: &FusionLayers) -> usize {
    ar(conv).len() + 1
}

/// Scale of the default boxes for layer id `k` (1-based).
fn sk(k: usize) -> f32 {
    SCALES[k - 1]
}

/// Width of a default box with aspect ratio `ar` on layer `k`.
fn wk(k: usize, ar: f32) -> f32 {
    sk(k) * f32::sqrt(ar)
}

/// Height of a default box with aspect ratio `ar` on layer `k`.
fn hk(k: usize, ar: f32) -> f32 {
    sk(k) / f32::sqrt(ar)
}

/// For the aspect ratio of 1 an extra default box is added whose scale is
/// the geometric mean of this layer's scale and the next one's:
/// s'k = sqrt(sk · sk+1).
fn ar1(k: usize) -> (f32, f32) {
    let s1 = f32::sqrt(sk(k) * sk(k + 1));
    (s1, s1)
}

/// Center coordinates of the default boxes on a square `fk`-cell feature
/// map: (i + 0.5) / fk for i in [0, fk). The 0.5 offset puts each box at
/// the middle of its cell.
fn get_default_box_centers(fk: usize) -> (Vec<f32>, Vec<f32>) {
    (
        (0..fk).map(|i| (i as f32 + 0.5) / fk as f32).collect(),
        (0..fk).map(|j| (j as f32 + 0.5) / fk as f32).collect(),
    )
}

/// Returns the `(width, height)` of every default box shape for one
/// prediction layer, in relative scale (fractions of the input image).
///
/// The extra aspect-ratio-1 box comes first, then one box per entry of
/// `ar(conv)` in order.
pub fn get_default_boxes(conv: &FusionLayers) -> Vec<(f32, f32)> {
    let mut box_sizes = Vec::<(f32, f32)>::default();

    let k = conv.get_id();

    box_sizes.push(ar1(k));

    for ar in ar(conv).iter() {
        box_sizes.push((wk(k, *ar), hk(k, *ar)));
    }

    box_sizes
}

/// Generates all default boxes for the five prediction feature maps.
///
/// The boxes tile each feature map in a convolutional manner: at every cell
/// the layer's box shapes are centered on the cell middle, so the position
/// of each box relative to its cell is fixed. Coordinates are normalized to
/// [0, 1] in xyxy format and are not clipped at the image boundary.
///
/// # Arguments
///
/// * `feature_maps` - The five fused feature maps, each of shape
///   `[batch, channels, height, width]`. Only the spatial sizes are read.
///
/// # Returns
///
/// * `Tensor<B, 3>` of shape `[batch, num_default_boxes, 4]` — all boxes of
///   one image, repeated per batch element. 98 176 boxes at 512×512 input.
pub fn generate_all_default_boxes<B: Backend>(feature_maps: [Tensor<B, 4>; 5]) -> Tensor<B, 3> {
    let mut default_box_vec = vec![];

    let conv_list = FusionLayers::as_list();
    let device = feature_maps[0].device();

    for (i, conv) in conv_list.iter().enumerate() {
        let [_batch, _depth, width, _] = feature_maps[i].shape().dims();

        let (cx_vec, cy_vec) = get_default_box_centers(width);

        let mut grid_pos: Vec<f32> = vec![];

        for cy in &cy_vec {
            for cx in &cx_vec {
                for (w, h) in get_default_boxes(conv) {
                    // convert from cx,cy,w,h to x1,y1,x2,y2
                    let xyxy = cxcywh_to_x1y1x2y2_f32(cx, cy, &w, &h);
                    grid_pos.extend(xyxy);
                }
            }
        }

        // Group the flat coordinate list into rows of 4
        let boxes = Tensor::<B, 1>::from_floats(grid_pos.as_slice(), &device);
        let boxes = boxes.reshape([grid_pos.len() / 4, 4]);

        default_box_vec.push(boxes);
    }

    // Cat the per-layer boxes together and repeat the result once per image
    // in the batch

    let [batch_size, _, _, _] = feature_maps[0].shape().dims();

    let default_box_vec = [Tensor::cat(default_box_vec, 0)];

    let default_box_vec = default_box_vec
        .iter()
        .cycle()
        .take(default_box_vec.len() * batch_size)
        .cloned()
        .collect::<Vec<Tensor<B, 2>>>();

    Tensor::stack(default_box_vec, 0)
}

/// Computes the Intersection over Union (IoU) between two sets of bounding
/// boxes in `xyxy` format.
///
/// # Arguments
/// * `gt_boxes` - Tensor of shape `[N, 4]` containing ground truth boxes.
/// * `dflt_boxes` - Tensor of shape `[M, 4]` containing default boxes.
///
/// # Returns
/// * `Tensor<B, 2>` - IoU matrix of shape `[N, M]` where entry `(i, j)` is
///   the IoU between ground truth box `i` and default box `j`.
pub fn get_iou<B: Backend>(gt_boxes: Tensor<B, 2>, dflt_boxes: Tensor<B, 2>) -> Tensor<B, 2> {
    let (gtx1, gty1, gtx2, gty2) = boxes_to_components(gt_boxes.clone());
    let (dfx1, dfy1, dfx2, dfy2) = boxes_to_components(dflt_boxes.clone());

    // Intersection top-left corner
    let dfx1_b = dfx1.clone().reshape([1, -1]);
    let (a, b) = broadcast!(gtx1: Tensor<B, 2>, dfx1_b: Tensor<2>);
    let x1_max = a.max_pair(b);

    let dfy1_b = dfy1.clone().reshape([1, -1]);
    let (a, b) = broadcast!(gty1: Tensor<B, 2>, dfy1_b: Tensor<2>);
    let y1_max = a.max_pair(b);

    // Intersection bottom-right corner
    let dfx2_b = dfx2.clone().reshape([1, -1]);
    let (a, b) = broadcast!(gtx2: Tensor<B, 2>, dfx2_b: Tensor<2>);
    let x2_min = a.min_pair(b);

    let dfy2_b = dfy2.clone().reshape([1, -1]);
    let (a, b) = broadcast!(gty2: Tensor<B, 2>, dfy2_b: Tensor<2>);
    let y2_min = a.min_pair(b);

    let area_gt = (gtx2 - gtx1) * (gty2 - gty1);
    let area_dflt = (dfx2 - dfx1) * (dfy2 - dfy1);

    // Width and height of the intersection, clamped at 0 so disjoint boxes
    // contribute no area
    let intersection_area = (x2_min - x1_max).clamp_min(0) * (y2_min - y1_max).clamp_min(0);

    let area_dflt_b = area_dflt.reshape([1, -1]);
    let (a, b) = broadcast!(area_gt: Tensor<B, 2>, area_dflt_b: Tensor<2>);
    let union = (a + b) - intersection_area.clone();

    intersection_area / union
}

/// Matches default boxes against ground truth boxes.
///
/// Matching runs in two steps, as in Liu et al. pg. 6:
///
/// 1. every ground truth box claims the default box it overlaps best
///    (bipartite step), so each object owns at least one anchor;
/// 2. every remaining default box with Jaccard overlap of at least
///    `threshold` with some ground truth box is matched to it as well
///    ("multi" matching), so the network may predict high scores for
///    several overlapping default boxes instead of having to pick one.
///
/// Default boxes below the threshold that were not claimed in step 1 are
/// background.
///
/// # Arguments
///
/// * `gt_boxes` - `[num_gt_boxes, 4]` ground truth boxes, xyxy, normalized.
/// * `dflt_bxs` - `[num_default_boxes, 4]` default boxes, xyxy, normalized.
/// * `threshold` - minimum IoU for the multi-matching step.
///
/// # Returns
///
/// * `Tensor<B, 1, Int>` of shape `[num_default_boxes]` holding the index
///   of the matched ground truth box, or `-1` for background.
pub fn get_overlapping_dflt_boxes<B: Backend>(
    gt_boxes: Tensor<B, 2>,
    dflt_bxs: Tensor<B, 2>,
    threshold: f32,
) -> Tensor<B, 1, Int> {
    let device = &gt_boxes.device();

    let [gt_bx_cnt, _] = gt_boxes.shape().dims();

    let iou = get_iou(gt_boxes, dflt_bxs);

    // Per default box: the best-overlapping ground truth index, or -1 when
    // the best overlap stays below the threshold
    let (val, index) = iou.clone().max_dim_with_indices(0);
    let threshold_mask = val.lower_elem(threshold);
    let min_iou_thresh = index.mask_fill(threshold_mask, -1);

    // Per ground truth box: the index of its best-overlapping default box.
    // These assignments are forced regardless of the threshold so no object
    // goes unmatched.
    let (_, max_iou_boxes) = iou.max_dim_with_indices(1);
    let max_iou_boxes = max_iou_boxes.reshape([1, -1]);

    let mut best_matches = min_iou_thresh.to_data().to_vec::<i64>().unwrap();

    for (i, max_iou_box) in max_iou_boxes.iter_dim(1).enumerate() {
        if i == gt_bx_cnt {
            break;
        }

        let max_iou_box = max_iou_box.to_data().as_mut_slice::<i64>().unwrap()[0];

        if max_iou_box < 0 {
            continue;
        }

        best_matches[max_iou_box as usize] = i as i64;
    }

    Tensor::<B, 1, Int>::from_data(best_matches.as_slice(), device)
}

/// Maps ground truth class labels onto the default boxes.
///
/// The result acts as an associative array: the index is the default box
/// number and the value is the class id assigned to that box, with 0
/// (background) everywhere no ground truth box was matched.
///
/// # Arguments
///
/// * `matching_boxes` - `[num_default_boxes]` ground-truth indices from
///   `get_overlapping_dflt_boxes` (-1 for background).
/// * `target_labels` - `[num_ground_truth_boxes]` class labels.
/// * `dflt_boxes` - `[num_default_boxes, 4]` default box coordinates.
///
/// # Returns
///
/// * `Tensor<B, 1, Int>` of shape `[num_default_boxes]` containing the
///   class label assigned to each default box.
pub fn target_lbls_to_default_boxes<B: Backend>(
    matching_boxes: &Tensor<B, 1, Int>,
    target_labels: Tensor<B, 1, Int>,
    dflt_boxes: Tensor<B, 2>,
) -> Tensor<B, 1, Int> {
    let device = &matching_boxes.device();

    // Indexes of all the default boxes that matched a ground truth box
    let mb_mask = matching_boxes.clone().greater_elem(-1);
    let labels_index = Tensor::cat(mb_mask.clone().nonzero(), 0);

    let index_map: Tensor<B, 1, Int> = Tensor::from_data(
        (0..mb_mask.shape().num_elements())
            .map(|x| x as i32)
            .collect::<Vec<i32>>()
            .as_slice(),
        device,
    );

    let boxes_index = matching_boxes.clone().select(0, labels_index.clone());

    // Scatter the matched labels into a background-initialized tensor
    Tensor::zeros([dflt_boxes.shape().num_elements() / 4], device).scatter(
        0,
        index_map.select(0, labels_index),
        target_labels.select(0, boxes_index),
    )
}

/// Computes variance-scaled box regression targets.
///
/// Ground truth boxes `g` and default boxes `d` (both xyxy) are converted
/// to center form and turned into the offsets the regression heads learn:
///
/// - tx = (Gx - Px) / Pw / v0
/// - ty = (Gy - Py) / Ph / v1
/// - tw = log(Gw / Pw) / v2
/// - th = log(Gh / Ph) / v3
///
/// The log keeps size corrections scale-invariant; the variances
/// (`config::VARIANCES`, typically `[0.1, 0.1, 0.2, 0.2]`) rescale the
/// targets so center and size components contribute comparably to the
/// localization loss. This is the R-CNN parameterization (Girshick et al.,
/// https://arxiv.org/abs/1311.2524, Appendix C) that SSD inherits.
///
/// # Arguments
///
/// * `g` - `[num_boxes, 4]` ground truth boxes, xyxy.
/// * `d` - `[num_boxes, 4]` default boxes, xyxy.
/// * `variances` - `[cx, cy, w, h]` scale divisors.
///
/// # Returns
///
/// * `Tensor<B, 2>` of shape `[num_boxes, 4]` holding `(tx, ty, tw, th)`.
pub fn encode_box_offsets<B: Backend>(
    g: Tensor<B, 2>,
    d: Tensor<B, 2>,
    variances: [f32; 4],
) -> Tensor<B, 2> {
    let (gx, gy, gw, gh) = boxes_to_components(x1y1x2y2_to_cxcywh(g));
    let (px, py, pw, ph) = boxes_to_components(x1y1x2y2_to_cxcywh(d));

    let tx = (gx - px) / pw.clone() / variances[0];
    let ty = (gy - py) / ph.clone() / variances[1];

    let tw = (gw.clone() / pw.clone()).log() / variances[2];
    check_nan!(tw, gw, pw);

    let th = (gh / ph).log() / variances[3];

    Tensor::cat(vec![tx, ty, tw, th], 1)
}

/// Reconstructs predicted boxes from regression outputs and default boxes.
///
/// The inverse of `encode_box_offsets`: predicted offsets `p` are unscaled
/// by the variances and applied to the default boxes `d`, producing boxes
/// in xyxy format:
///
/// - pcx = dx·v0·Pw + Px
/// - pcy = dy·v1·Ph + Py
/// - pw = exp(dw·v2)·Pw
/// - ph = exp(dh·v3)·Ph
pub fn decode_box_offsets<B: Backend>(
    p: Tensor<B, 2>,
    d: Tensor<B, 2>,
    variances: [f32; 4],
) -> Tensor<B, 2> {
    let (center_x, center_y, w, h) = boxes_to_components(x1y1x2y2_to_cxcywh(d));

    let (mut dx, mut dy, mut dw, mut dh) = boxes_to_components(p);

    dx = dx * variances[0];
    dy = dy * variances[1];
    dw = dw * variances[2];
    dh = dh * variances[3];

    let pcx = dx * w.clone() + center_x;
    let pcy = dy * h.clone() + center_y;
    let pw = dw.exp() * w;
    let ph = dh.exp() * h;

    let cxcywh = Tensor::cat(vec![pcx, pcy, pw, ph], 1);

    cxcywh_to_x1y1x2y2(cxcywh)
}

/// Splits a tensor of bounding boxes in any 4 component format (cxcywh,
/// xyxy, ...) into its individual component columns, each `[num_boxes, 1]`.
pub fn boxes_to_components<B: Backend>(
    boxes: Tensor<B, 2>,
) -> (Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>) {
    let c1 = s![.., 0];
    let c2 = s![.., 2];
    let c3 = s![.., 1];
    let c4 = s![.., 3];
    (
        boxes.clone().slice(c1),
        boxes.clone().slice(c3),
        boxes.clone().slice(c2),
        boxes.slice(c4),
    )
}

/// Converts boxes from center format (cx, cy, w, h) to corner format
/// (x1, y1, x2, y2).
pub fn cxcywh_to_x1y1x2y2<B: Backend>(a: Tensor<B, 2>) -> Tensor<B, 2> {
    let (cx, cy, w, h) = boxes_to_components(a);

    Tensor::cat(
        vec![
            cx.clone() - w.clone() * 0.5,
            cy.clone() - h.clone() * 0.5,
            cx + w * 0.5,
            cy + h * 0.5,
        ],
        1,
    )
}

/// Converts boxes from corner format (x1, y1, x2, y2) to center format
/// (cx, cy, w, h).
pub fn x1y1x2y2_to_cxcywh<B: Backend>(a: Tensor<B, 2>) -> Tensor<B, 2> {
    let (x1, y1, x2, y2) = boxes_to_components(a);

    let w = x2.clone() - x1.clone();
    let h = y2.clone() - y1.clone();
    let cx = x1.clone() + w.clone() * 0.5;
    let cy = y1.clone() + h.clone() * 0.5;

    Tensor::cat(vec![cx, cy, w, h], 1)
}

/// Scalar variant of `cxcywh_to_x1y1x2y2` used while tiling the anchor
/// grid.
pub fn cxcywh_to_x1y1x2y2_f32(cx: &f32, cy: &f32, w: &f32, h: &f32) -> Vec<f32> {
    vec![cx - w * 0.5, cy - h * 0.5, cx + w * 0.5, cy + h * 0.5]
}

#[cfg(test)]
mod tests {
    use crate::config::VARIANCES;
    use crate::debug::assert_approx_eq;

    use super::*;
    use burn::{
        backend::{NdArray, ndarray::NdArrayDevice},
        tensor::{Shape, Tolerance, ops::FloatElem},
    };

    fn get_output(batches: usize) -> [Tensor<NdArray, 4>; 5] {
        let device = &NdArrayDevice::default();
        type B = NdArray<f32>;
        [
            Tensor::<B, 4>::ones(Shape::new([batches, 256, 128, 128]), device), // Deconv3_2
            Tensor::<B, 4>::ones(Shape::new([batches, 512, 64, 64]), device),   // Deconv4_2
            Tensor::<B, 4>::ones(Shape::new([batches, 1024, 32, 32]), device),  // Deconv5_2
            Tensor::<B, 4>::ones(Shape::new([batches, 512, 16, 16]), device),   // Deconv6_2
            Tensor::<B, 4>::ones(Shape::new([batches, 256, 8, 8]), device),     // Conv9_2
        ]
    }

    #[test]
    fn generate_default_boxes_test() {
        let batches = 2;
        let output = get_output(batches);

        let default_boxes = generate_all_default_boxes(output);

        // 4 boxes per cell on the 128x128 map, 6 everywhere else:
        // 4*128^2 + 6*(64^2 + 32^2 + 16^2 + 8^2) = 98176
        assert_eq!(default_boxes.shape().dims, [batches, 98176, 4]);
    }

    #[test]
    fn test_spacing() {
        let (ch, cw) = get_default_box_centers(8);

        assert_eq!(
            [0.0625, 0.1875, 0.3125, 0.4375, 0.5625, 0.6875, 0.8125, 0.9375],
            ch.as_slice()
        );
        assert_eq!(
            [0.0625, 0.1875, 0.3125, 0.4375, 0.5625, 0.6875, 0.8125, 0.9375],
            cw.as_slice()
        );
    }

    #[test]
    fn test_box_counts_per_layer() {
        assert_eq!(get_box_count_for_layer(&FusionLayers::Deconv3_2), 4);
        assert_eq!(get_box_count_for_layer(&FusionLayers::Deconv4_2), 6);
        assert_eq!(get_box_count_for_layer(&FusionLayers::Deconv5_2), 6);
        assert_eq!(get_box_count_for_layer(&FusionLayers::Deconv6_2), 6);
        assert_eq!(get_box_count_for_layer(&FusionLayers::Conv9_2), 6);
    }

    #[test]
    fn feature_box_test() {
        // Stride-4 layer, scale 0.04, extra box sqrt(0.04 * 0.07)
        for (a, b) in [
            (0.0529, 0.0529),
            (0.0400, 0.0400),
            (0.0566, 0.0283),
            (0.0283, 0.0566),
        ]
        .iter()
        .zip(get_default_boxes(&FusionLayers::Deconv3_2))
        {
            assert_approx_eq(&a.0, &b.0, 1e-3);
            assert_approx_eq(&a.1, &b.1, 1e-3);
        }

        // Stride-8 layer, scale 0.07, extra box sqrt(0.07 * 0.15)
        for (a, b) in [
            (0.1025, 0.1025),
            (0.0700, 0.0700),
            (0.0990, 0.0495),
            (0.0495, 0.0990),
            (0.1212, 0.0404),
            (0.0404, 0.1212),
        ]
        .iter()
        .zip(get_default_boxes(&FusionLayers::Deconv4_2))
        {
            assert_approx_eq(&a.0, &b.0, 1e-3);
            assert_approx_eq(&a.1, &b.1, 1e-3);
        }

        // Deepest layer, scale 0.45, extra box sqrt(0.45 * 0.6)
        for (a, b) in [
            (0.5196, 0.5196),
            (0.4500, 0.4500),
            (0.6364, 0.3182),
            (0.3182, 0.6364),
            (0.7794, 0.2598),
            (0.2598, 0.7794),
        ]
        .iter()
        .zip(get_default_boxes(&FusionLayers::Conv9_2))
        {
            assert_approx_eq(&a.0, &b.0, 1e-3);
            assert_approx_eq(&a.1, &b.1, 1e-3);
        }
    }

    #[test]
    fn test_iou() {
        let device = &NdArrayDevice::default();
        type B = NdArray<f32>;

        let boxes1 = Tensor::<B, 2>::from_data(
            [
                [0.12, 0.15, 0.30, 0.40],
                [0.05, 0.05, 0.25, 0.20],
                [0.33, 0.20, 0.50, 0.45],
                [0.60, 0.10, 0.85, 0.35],
            ],
            &device,
        );

        let boxes2 = Tensor::<B, 2>::from_data(
            [
                [0.10, 0.10, 0.30, 0.30],
                [0.20, 0.25, 0.40, 0.45],
                [0.60, 0.50, 0.80, 0.70],
                [0.35, 0.15, 0.55, 0.35],
                [0.50, 0.60, 0.70, 0.80],
                [0.25, 0.40, 0.45, 0.60],
            ],
            &device,
        );

        let iou = get_iou(boxes1, boxes2);

        Tensor::<B, 2>::from_data(
            [
                [0.46551722, 0.21428573, 0.0, 0.0, 0.0, 0.0],
                [0.27272725, 0.0, 0.0, 0.0, 0.0, 0.0],
                [0.0, 0.20437954, 0.0, 0.375, 0.0, 0.07843133],
                [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ],
            &device,
        )
        .into_data()
        .assert_approx_eq::<FloatElem<B>>(&iou.to_data(), Tolerance::default());
    }

    #[test]
    fn test_check_bboxes_overlap() {
        let device = &NdArrayDevice::default();
        type B = NdArray<f32>;

        let boxes1 = Tensor::<B, 2>::from_data(
            [
                [0.12, 0.15, 0.30, 0.40],
                [0.05, 0.05, 0.25, 0.20],
                [0.33, 0.20, 0.50, 0.45],
                [0.60, 0.10, 0.85, 0.35],
                [0.40, 0.60, 0.65, 0.85],
                [0.15, 0.30, 0.35, 0.55],
                [0.70, 0.70, 0.90, 0.95],
                [0.25, 0.25, 0.45, 0.50],
                [0.50, 0.40, 0.75, 0.65],
                [0.10, 0.60, 0.30, 0.80],
                [0.55, 0.20, 0.75, 0.40],
                [0.20, 0.10, 0.45, 0.35],
                [0.35, 0.50, 0.60, 0.75],
                [0.65, 0.30, 0.85, 0.55],
            ],
            &device,
        );

        let boxes2 = Tensor::<B, 2>::from_data(
            [
                [0.10, 0.10, 0.30, 0.30],
                [0.20, 0.25, 0.40, 0.45],
                [0.60, 0.50, 0.80, 0.70],
                [0.35, 0.15, 0.55, 0.35],
                [0.50, 0.60, 0.70, 0.80],
                [0.25, 0.40, 0.45, 0.60],
                [0.05, 0.65, 0.25, 0.85],
                [0.70, 0.25, 0.90, 0.45],
                [0.10, 0.50, 0.30, 0.70],
                [0.55, 0.05, 0.75, 0.25],
                [0.45, 0.75, 0.65, 0.95],
                [0.20, 0.60, 0.40, 0.80],
                [0.65, 0.40, 0.85, 0.60],
                [0.30, 0.35, 0.50, 0.55],
                [0.15, 0.20, 0.35, 0.40],
                [0.40, 0.10, 0.60, 0.30],
            ],
            &device,
        );

        let matching = get_overlapping_dflt_boxes(boxes1, boxes2, 0.5);

        Tensor::<B, 1, Int>::from_data(
            [6, 7, 8, 2, 12, -1, 9, -1, -1, 10, -1, -1, 13, -1, 11, -1],
            device,
        )
        .into_data()
        .assert_eq(&matching.to_data(), true);
    }

    #[test]
    fn test_assign_target_labels_to_default_boxes() {
        let device = &NdArrayDevice::default();
        type B = NdArray<f32>;

        let target_labels =
            Tensor::<B, 1, Int>::from_data([1, 2, 0, 1, 3, 1, 2, 3, 1, 2, 3, 3, 1, 2], device);

        let gt_boxes = Tensor::<B, 2>::from_data(
            [
                [0.12, 0.15, 0.30, 0.40],
                [0.05, 0.05, 0.25, 0.20],
                [0.33, 0.20, 0.50, 0.45],
                [0.60, 0.10, 0.85, 0.35],
                [0.40, 0.60, 0.65, 0.85],
                [0.15, 0.30, 0.35, 0.55],
                [0.70, 0.70, 0.90, 0.95],
                [0.25, 0.25, 0.45, 0.50],
                [0.50, 0.40, 0.75, 0.65],
                [0.10, 0.60, 0.30, 0.80],
                [0.55, 0.20, 0.75, 0.40],
                [0.20, 0.10, 0.45, 0.35],
                [0.35, 0.50, 0.60, 0.75],
                [0.65, 0.30, 0.85, 0.55],
            ],
            device,
        );

        let dflt_boxes = Tensor::<B, 2>::from_data(
            [
                [0.10, 0.10, 0.30, 0.30],
                [0.20, 0.25, 0.40, 0.45],
                [0.60, 0.50, 0.80, 0.70],
                [0.35, 0.15, 0.55, 0.35],
                [0.50, 0.60, 0.70, 0.80],
                [0.25, 0.40, 0.45, 0.60],
                [0.05, 0.65, 0.25, 0.85],
                [0.70, 0.25, 0.90, 0.45],
                [0.10, 0.50, 0.30, 0.70],
                [0.55, 0.05, 0.75, 0.25],
                [0.45, 0.75, 0.65, 0.95],
                [0.20, 0.60, 0.40, 0.80],
                [0.65, 0.40, 0.85, 0.60],
                [0.30, 0.35, 0.50, 0.55],
                [0.15, 0.20, 0.35, 0.40],
                [0.40, 0.10, 0.60, 0.30],
            ],
            device,
        );

        let matching = get_overlapping_dflt_boxes(gt_boxes.clone(), dflt_boxes.clone(), 0.5);

        let trget_lbs = target_lbls_to_default_boxes(&matching, target_labels, dflt_boxes);

        // matching: [6, 7, 8, 2, 12, -1, 9, -1, -1, 10, -1, -1, 13, -1, 11, -1]
        // labels :  gt 6 -> 2, gt 7 -> 3, gt 8 -> 1, gt 2 -> 0, gt 12 -> 1,
        //           gt 9 -> 2, gt 10 -> 3, gt 13 -> 2, gt 11 -> 3
        Tensor::<B, 1, Int>::from_data(
            [2, 3, 1, 0, 1, 0, 2, 0, 0, 3, 0, 0, 2, 0, 3, 0],
            device,
        )
        .into_data()
        .assert_eq(&trget_lbs.to_data(), true);
    }

    #[test]
    fn test_encode_decode_offsets() {
        let device = &NdArrayDevice::default();
        type B = NdArray<f32>;
        type FT = FloatElem<B>;
        let gt_boxes =
            Tensor::<B, 2>::from_data([[0.35725, 0.51429164, 0.61651564, 0.7677916]], device);

        let dflt_bxs =
            Tensor::<B, 2>::from_data([[0.4080761, 0.42141542, 0.5919239, 0.7891109]], device);

        let offsets = encode_box_offsets(gt_boxes.clone(), dflt_bxs.clone(), VARIANCES);

        // 1/variance of [0.1, 0.1, 0.2, 0.2] gives the familiar
        // (10, 10, 5, 5) scaling
        Tensor::<B, 2>::from_data([[-0.7134, 0.9730, 1.718, -1.859]], device)
            .into_data()
            .assert_approx_eq::<FT>(&offsets.to_data(), Tolerance::default());

        // Decoding the encoded offsets must give back the ground truth box
        let round_trip = decode_box_offsets(offsets, dflt_bxs, VARIANCES);

        gt_boxes
            .into_data()
            .assert_approx_eq::<FT>(&round_trip.to_data(), Tolerance::default());
    }

    #[test]
    fn test_forced_match_below_threshold() {
        let device = &NdArrayDevice::default();
        type B = NdArray<f32>;

        // A single small ground truth box that overlaps nothing above 0.5:
        // the bipartite step must still claim its best anchor
        let gt = Tensor::<B, 2>::from_data([[0.02, 0.02, 0.06, 0.06]], device);
        let dflt = Tensor::<B, 2>::from_data(
            [[0.0, 0.0, 0.2, 0.2], [0.5, 0.5, 0.9, 0.9]],
            device,
        );

        let matching = get_overlapping_dflt_boxes(gt, dflt, 0.5);

        Tensor::<B, 1, Int>::from_data([0, -1], device)
            .into_data()
            .assert_eq(&matching.to_data(), true);
    }
}
